use std::fmt;

use chrono::{offset::Utc, NaiveDateTime};
use diesel::{
    backend::Backend,
    deserialize,
    deserialize::FromSql,
    expression::AsExpression,
    helper_types::AsExprOf,
    insert_into,
    prelude::*,
    sql_types::Integer,
    sqlite::SqliteConnection,
};

use crate::{
    collab::{AsyncChannelSet, SeedDescriptor},
    schema::{async_invites, async_races, async_submissions},
};

pub mod lifecycle;

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromSqlRow)]
pub enum AsyncStatus {
    Open,
    Closed,
    Purged,
}

impl<DB> FromSql<Integer, DB> for AsyncStatus
where
    DB: Backend,
    i32: FromSql<Integer, DB>,
{
    fn from_sql(bytes: Option<&DB::RawValue>) -> deserialize::Result<Self> {
        match i32::from_sql(bytes)? {
            0 => Ok(AsyncStatus::Open),
            1 => Ok(AsyncStatus::Closed),
            2 => Ok(AsyncStatus::Purged),
            x => Err(format!("Unrecognized async race status {}", x).into()),
        }
    }
}

impl AsExpression<Integer> for AsyncStatus {
    type Expression = AsExprOf<i32, Integer>;

    fn as_expression(self) -> Self::Expression {
        <i32 as AsExpression<Integer>>::as_expression(self as i32)
    }
}

impl<'a> AsExpression<Integer> for &'a AsyncStatus {
    type Expression = AsExprOf<i32, Integer>;

    fn as_expression(self) -> Self::Expression {
        <i32 as AsExpression<Integer>>::as_expression(*self as i32)
    }
}

impl fmt::Display for AsyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            AsyncStatus::Open => write!(f, "open"),
            AsyncStatus::Closed => write!(f, "closed"),
            AsyncStatus::Purged => write!(f, "purged"),
        }
    }
}

// invitations are a first-class record, not a bit smuggled into some other
// status integer
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromSqlRow)]
pub enum InviteStatus {
    Pending,
    Accepted,
}

impl<DB> FromSql<Integer, DB> for InviteStatus
where
    DB: Backend,
    i32: FromSql<Integer, DB>,
{
    fn from_sql(bytes: Option<&DB::RawValue>) -> deserialize::Result<Self> {
        match i32::from_sql(bytes)? {
            0 => Ok(InviteStatus::Pending),
            1 => Ok(InviteStatus::Accepted),
            x => Err(format!("Unrecognized invite status {}", x).into()),
        }
    }
}

impl AsExpression<Integer> for InviteStatus {
    type Expression = AsExprOf<i32, Integer>;

    fn as_expression(self) -> Self::Expression {
        <i32 as AsExpression<Integer>>::as_expression(self as i32)
    }
}

impl<'a> AsExpression<Integer> for &'a InviteStatus {
    type Expression = AsExprOf<i32, Integer>;

    fn as_expression(self) -> Self::Expression {
        <i32 as AsExpression<Integer>>::as_expression(*self as i32)
    }
}

impl fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            InviteStatus::Pending => write!(f, "pending"),
            InviteStatus::Accepted => write!(f, "accepted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable)]
#[table_name = "async_races"]
#[primary_key(race_id)]
pub struct AsyncRace {
    pub race_id: i32,
    pub race_name: String,
    pub created_by: Option<i64>,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub status: AsyncStatus,
    pub ranked: bool,
    pub invitational: bool,
    pub seed_preset: Option<String>,
    pub seed_hash: Option<String>,
    pub seed_code: Option<String>,
    pub seed_url: Option<String>,
    pub submission_channel_id: Option<i64>,
    pub results_channel_id: Option<i64>,
    pub spoiler_channel_id: Option<i64>,
    pub spoiler_role_id: Option<i64>,
}

impl AsyncRace {
    pub fn channel_set(&self) -> Option<AsyncChannelSet> {
        Some(AsyncChannelSet {
            submission_channel_id: self.submission_channel_id?,
            results_channel_id: self.results_channel_id?,
            spoiler_channel_id: self.spoiler_channel_id?,
            spoiler_role_id: self.spoiler_role_id?,
        })
    }
}

#[derive(Debug, Insertable)]
#[table_name = "async_races"]
pub struct NewAsyncRace<'a> {
    pub race_name: &'a str,
    pub created_by: Option<i64>,
    pub started_at: NaiveDateTime,
    pub status: AsyncStatus,
    pub ranked: bool,
    pub invitational: bool,
    pub seed_preset: Option<&'a str>,
    pub seed_hash: Option<&'a str>,
    pub seed_code: Option<&'a str>,
    pub seed_url: Option<&'a str>,
    pub submission_channel_id: Option<i64>,
    pub results_channel_id: Option<i64>,
    pub spoiler_channel_id: Option<i64>,
    pub spoiler_role_id: Option<i64>,
}

impl<'a> NewAsyncRace<'a> {
    pub fn new(
        race_name: &'a str,
        created_by: Option<i64>,
        ranked: bool,
        invitational: bool,
        seed_preset: Option<&'a str>,
        seed: &'a SeedDescriptor,
        channels: Option<AsyncChannelSet>,
    ) -> Self {
        NewAsyncRace {
            race_name,
            created_by,
            started_at: Utc::now().naive_utc(),
            status: AsyncStatus::Open,
            ranked,
            invitational,
            seed_preset,
            seed_hash: seed.hash.as_deref(),
            seed_code: seed.code.as_deref(),
            seed_url: seed.url.as_deref(),
            submission_channel_id: channels.map(|c| c.submission_channel_id),
            results_channel_id: channels.map(|c| c.results_channel_id),
            spoiler_channel_id: channels.map(|c| c.spoiler_channel_id),
            spoiler_role_id: channels.map(|c| c.spoiler_role_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Insertable, Identifiable, Associations)]
#[belongs_to(parent = "AsyncRace", foreign_key = "race_id")]
#[table_name = "async_submissions"]
#[primary_key(race_id, player_id)]
pub struct AsyncSubmission {
    pub race_id: i32,
    pub player_id: i64,
    pub submitted_at: NaiveDateTime,
    pub finish_seconds: i32,
    pub collection_rate: i32,
}

impl AsyncSubmission {
    pub fn new(race_id: i32, player_id: i64, finish_seconds: i32, collection_rate: i32) -> Self {
        AsyncSubmission {
            race_id,
            player_id,
            submitted_at: Utc::now().naive_utc(),
            finish_seconds,
            collection_rate,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Identifiable, Associations)]
#[belongs_to(parent = "AsyncRace", foreign_key = "race_id")]
#[table_name = "async_invites"]
#[primary_key(race_id, player_id)]
pub struct AsyncInvite {
    pub race_id: i32,
    pub player_id: i64,
    pub invite_status: InviteStatus,
}

pub fn create_async_race(
    conn: &SqliteConnection,
    new_race: &NewAsyncRace,
) -> QueryResult<AsyncRace> {
    use crate::schema::async_races::columns::race_id;
    use crate::schema::async_races::dsl::async_races;

    conn.transaction(|| {
        insert_into(async_races).values(new_race).execute(conn)?;
        async_races.order(race_id.desc()).first(conn)
    })
}

#[inline]
pub fn get_async_race(conn: &SqliteConnection, this_race: i32) -> QueryResult<AsyncRace> {
    use crate::schema::async_races::dsl::async_races;

    async_races.find(this_race).get_result(conn)
}

// everything that still counts against the concurrent-race cap
pub fn get_active_async_races(conn: &SqliteConnection) -> QueryResult<Vec<AsyncRace>> {
    use crate::schema::async_races::dsl::*;

    async_races
        .filter(status.ne(AsyncStatus::Purged))
        .load(conn)
}

pub fn get_async_race_by_channel(
    conn: &SqliteConnection,
    channel: i64,
) -> QueryResult<Option<AsyncRace>> {
    use crate::schema::async_races::dsl::*;

    async_races
        .filter(submission_channel_id.eq(channel))
        .filter(status.ne(AsyncStatus::Purged))
        .first(conn)
        .optional()
}

// submissions ordered for a leaderboard; the default sentinel keeps
// forfeits at the bottom
pub fn submissions_for_race(
    conn: &SqliteConnection,
    this_race: i32,
) -> QueryResult<Vec<AsyncSubmission>> {
    use crate::schema::async_submissions::dsl::*;

    async_submissions
        .filter(race_id.eq(this_race))
        .order((finish_seconds.asc(), submitted_at.asc()))
        .load(conn)
}
