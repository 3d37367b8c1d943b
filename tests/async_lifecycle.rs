use diesel::{prelude::*, sqlite::SqliteConnection};

use houlihan::{
    async_races::{
        self, lifecycle, AsyncRace, AsyncStatus, AsyncSubmission, InviteStatus, NewAsyncRace,
    },
    collab::{AsyncChannelSet, SeedDescriptor},
    error::AsyncRaceError,
    schema::async_invites::dsl as invite_dsl,
};

mod common;
use common::{add_player, open_async_race, test_conn};

fn get_race(conn: &SqliteConnection, id: i32) -> AsyncRace {
    async_races::get_async_race(conn, id).unwrap()
}

fn submissions(conn: &SqliteConnection, id: i32) -> Vec<AsyncSubmission> {
    async_races::submissions_for_race(conn, id).unwrap()
}

#[test]
fn resubmission_overwrites_the_earlier_row() {
    let conn = test_conn();
    add_player(&conn, 1, "alpha");
    let race = open_async_race(&conn, "weekly async", true, false);

    lifecycle::submit(&conn, race.race_id, 1, 3661, 80).unwrap();
    lifecycle::submit(&conn, race.race_id, 1, 3000, 85).unwrap();

    let rows = submissions(&conn, race.race_id);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].finish_seconds, 3000);
    assert_eq!(rows[0].collection_rate, 85);
}

#[test]
fn submission_window_follows_status() {
    let conn = test_conn();
    add_player(&conn, 1, "alpha");
    add_player(&conn, 2, "beta");
    let race = open_async_race(&conn, "weekly async", true, false);

    lifecycle::submit(&conn, race.race_id, 1, 4000, 100).unwrap();
    lifecycle::close(&conn, race.race_id).unwrap();
    let closed = get_race(&conn, race.race_id);
    assert_eq!(closed.status, AsyncStatus::Closed);
    assert!(closed.ended_at.is_some());
    assert_eq!(
        lifecycle::submit(&conn, race.race_id, 2, 4100, 90),
        Err(AsyncRaceError::NotOpen)
    );
    assert_eq!(
        lifecycle::close(&conn, race.race_id),
        Err(AsyncRaceError::NotOpen)
    );

    // a reopen clears the end date and takes submissions again
    lifecycle::reopen(&conn, race.race_id).unwrap();
    let reopened = get_race(&conn, race.race_id);
    assert_eq!(reopened.status, AsyncStatus::Open);
    assert!(reopened.ended_at.is_none());
    lifecycle::submit(&conn, race.race_id, 2, 4100, 90).unwrap();
    assert_eq!(
        lifecycle::reopen(&conn, race.race_id),
        Err(AsyncRaceError::NotClosed)
    );
}

#[test]
fn purge_requires_a_close_and_is_terminal() {
    let conn = test_conn();
    add_player(&conn, 1, "alpha");
    add_player(&conn, 2, "beta");
    let race = open_async_race(&conn, "weekly async", true, false);
    lifecycle::submit(&conn, race.race_id, 1, 4000, 100).unwrap();
    lifecycle::submit(&conn, race.race_id, 2, 4200, 95).unwrap();

    assert_eq!(
        lifecycle::purge(&conn, race.race_id),
        Err(AsyncRaceError::MustCloseFirst)
    );
    lifecycle::close(&conn, race.race_id).unwrap();
    let closed_at = get_race(&conn, race.race_id).ended_at;

    let report = lifecycle::purge(&conn, race.race_id).unwrap();
    assert!(report.archived);
    assert_eq!(report.results.len(), 2);
    let purged = get_race(&conn, race.race_id);
    assert_eq!(purged.status, AsyncStatus::Purged);
    assert_eq!(purged.ended_at, closed_at);

    // no way back from the archive
    assert_eq!(
        lifecycle::reopen(&conn, race.race_id),
        Err(AsyncRaceError::NotClosed)
    );
    assert_eq!(
        lifecycle::purge(&conn, race.race_id),
        Err(AsyncRaceError::MustCloseFirst)
    );
}

#[test]
fn lone_submission_purges_without_archiving() {
    let conn = test_conn();
    add_player(&conn, 1, "alpha");
    let race = open_async_race(&conn, "quiet async", true, false);
    lifecycle::submit(&conn, race.race_id, 1, 4000, 100).unwrap();
    lifecycle::close(&conn, race.race_id).unwrap();

    let report = lifecycle::purge(&conn, race.race_id).unwrap();
    assert!(!report.archived);
    assert_eq!(report.results.len(), 1);
    assert_eq!(get_race(&conn, race.race_id).status, AsyncStatus::Purged);
}

#[test]
fn invitational_races_gate_submissions() {
    let conn = test_conn();
    add_player(&conn, 1, "alpha");
    add_player(&conn, 2, "beta");
    let race = open_async_race(&conn, "closed door", true, true);

    assert_eq!(
        lifecycle::submit(&conn, race.race_id, 1, 4000, 100),
        Err(AsyncRaceError::NotInvited)
    );
    lifecycle::invite(&conn, race.race_id, 1).unwrap();
    // inviting twice is harmless
    lifecycle::invite(&conn, race.race_id, 1).unwrap();
    lifecycle::submit(&conn, race.race_id, 1, 4000, 100).unwrap();

    let invite = invite_dsl::async_invites
        .find((race.race_id, 1i64))
        .get_result::<houlihan::async_races::AsyncInvite>(&conn)
        .unwrap();
    assert_eq!(invite.invite_status, InviteStatus::Accepted);

    // the open variant takes no invites
    let open = open_async_race(&conn, "open door", true, false);
    assert_eq!(
        lifecycle::invite(&conn, open.race_id, 2),
        Err(AsyncRaceError::NotInvitational)
    );
}

#[test]
fn active_count_drops_when_a_race_purges() {
    let conn = test_conn();
    add_player(&conn, 1, "alpha");
    add_player(&conn, 2, "beta");
    let first = open_async_race(&conn, "one", false, false);
    let _second = open_async_race(&conn, "two", false, false);
    assert_eq!(async_races::get_active_async_races(&conn).unwrap().len(), 2);

    lifecycle::submit(&conn, first.race_id, 1, 4000, 100).unwrap();
    lifecycle::submit(&conn, first.race_id, 2, 4300, 90).unwrap();
    lifecycle::close(&conn, first.race_id).unwrap();
    lifecycle::purge(&conn, first.race_id).unwrap();
    assert_eq!(async_races::get_active_async_races(&conn).unwrap().len(), 1);
}

#[test]
fn async_races_resolve_from_their_submission_channel() {
    let conn = test_conn();
    add_player(&conn, 1, "alpha");
    let set = AsyncChannelSet {
        submission_channel_id: 9001,
        results_channel_id: 9002,
        spoiler_channel_id: 9003,
        spoiler_role_id: 9004,
    };
    let race = async_races::create_async_race(
        &conn,
        &NewAsyncRace::new(
            "routed",
            Some(1),
            false,
            false,
            None,
            &SeedDescriptor::default(),
            Some(set),
        ),
    )
    .unwrap();

    let found = async_races::get_async_race_by_channel(&conn, 9001)
        .unwrap()
        .unwrap();
    assert_eq!(found.race_id, race.race_id);
    assert_eq!(found.channel_set(), Some(set));

    // purged races release the channel
    lifecycle::close(&conn, race.race_id).unwrap();
    lifecycle::purge(&conn, race.race_id).unwrap();
    assert!(async_races::get_async_race_by_channel(&conn, 9001)
        .unwrap()
        .is_none());
}

#[test]
fn missing_race_reports_not_found() {
    let conn = test_conn();
    add_player(&conn, 1, "alpha");
    assert_eq!(
        lifecycle::submit(&conn, 42, 1, 4000, 100),
        Err(AsyncRaceError::NotFound)
    );
    assert_eq!(lifecycle::close(&conn, 42), Err(AsyncRaceError::NotFound));
}
