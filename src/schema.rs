table! {
    players (player_id) {
        player_id -> Bigint,
        player_name -> Text,
        rating -> Double,
        races_played -> Integer,
        banned -> Bool,
    }
}

table! {
    races (race_id) {
        race_id -> Integer,
        race_name -> Text,
        created_by -> Nullable<Bigint>,
        created_at -> Timestamp,
        started_at -> Nullable<Timestamp>,
        ended_at -> Nullable<Timestamp>,
        status -> Integer,
        ranked -> Bool,
        seed_preset -> Nullable<Text>,
        seed_hash -> Nullable<Text>,
        seed_code -> Nullable<Text>,
        seed_url -> Nullable<Text>,
        channel_id -> Nullable<Bigint>,
    }
}

table! {
    race_entries (race_id, player_id) {
        race_id -> Integer,
        player_id -> Bigint,
        joined_at -> Timestamp,
        status -> Integer,
        finish_seconds -> Nullable<Integer>,
    }
}

table! {
    async_races (race_id) {
        race_id -> Integer,
        race_name -> Text,
        created_by -> Nullable<Bigint>,
        started_at -> Timestamp,
        ended_at -> Nullable<Timestamp>,
        status -> Integer,
        ranked -> Bool,
        invitational -> Bool,
        seed_preset -> Nullable<Text>,
        seed_hash -> Nullable<Text>,
        seed_code -> Nullable<Text>,
        seed_url -> Nullable<Text>,
        submission_channel_id -> Nullable<Bigint>,
        results_channel_id -> Nullable<Bigint>,
        spoiler_channel_id -> Nullable<Bigint>,
        spoiler_role_id -> Nullable<Bigint>,
    }
}

table! {
    async_submissions (race_id, player_id) {
        race_id -> Integer,
        player_id -> Bigint,
        submitted_at -> Timestamp,
        finish_seconds -> Integer,
        collection_rate -> Integer,
    }
}

table! {
    async_invites (race_id, player_id) {
        race_id -> Integer,
        player_id -> Bigint,
        invite_status -> Integer,
    }
}

table! {
    global_settings (scope_id) {
        scope_id -> Binary,
        history_channel_id -> Nullable<Bigint>,
        ranking_channel_id -> Nullable<Bigint>,
        submission_category_id -> Nullable<Bigint>,
    }
}

allow_tables_to_appear_in_same_query!(
    players,
    races,
    race_entries,
    async_races,
    async_submissions,
    async_invites,
    global_settings,
);
