use std::cmp;

use chrono::{offset::Utc, Duration, NaiveDateTime};
use diesel::{insert_into, prelude::*, sqlite::SqliteConnection};

use crate::{
    error::RaceError,
    helpers::FORFEIT_SENTINEL,
    races::{EntryStatus, Race, RaceEntry, RaceStatus},
};

// runners get a countdown between "everyone is ready" and the actual start;
// the start date is written ahead of wall clock by this much
pub const COUNTDOWN_OFFSET_SECONDS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadyCount {
    pub ready: i64,
    pub total: i64,
    // set when this call tripped the start; the caller owes the runners a
    // countdown display before times start landing
    pub started_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishReport {
    // completion-order rank; None for a forfeit
    pub position: Option<i64>,
    pub done: i64,
    pub total: i64,
    pub finished: bool,
}

pub fn join(conn: &SqliteConnection, this_race: i32, this_player: i64) -> Result<(), RaceError> {
    use crate::schema::race_entries::dsl::race_entries;
    use crate::schema::races::dsl::races;

    conn.transaction(|| {
        let race: Race = races.find(this_race).get_result(conn)?;
        if race.status != RaceStatus::Open {
            return Err(RaceError::NotOpen);
        }
        let existing: Option<RaceEntry> = race_entries
            .find((this_race, this_player))
            .get_result(conn)
            .optional()?;
        if existing.is_some() {
            return Err(RaceError::AlreadyJoined);
        }
        insert_into(race_entries)
            .values(&RaceEntry::new(this_race, this_player))
            .execute(conn)?;

        Ok(())
    })
}

pub fn leave(conn: &SqliteConnection, this_race: i32, this_player: i64) -> Result<(), RaceError> {
    use crate::schema::race_entries::dsl::race_entries;
    use crate::schema::races::dsl::races;

    conn.transaction(|| {
        let entry: RaceEntry = race_entries
            .find((this_race, this_player))
            .get_result(conn)
            .optional()?
            .ok_or(RaceError::NotFound)?;
        let race: Race = races.find(this_race).get_result(conn)?;
        if race.status != RaceStatus::Open {
            return Err(RaceError::RaceStarted);
        }
        if entry.status != EntryStatus::Joined {
            return Err(RaceError::AlreadyReady);
        }
        diesel::delete(&entry).execute(conn)?;

        Ok(())
    })
}

pub fn ready(
    conn: &SqliteConnection,
    this_race: i32,
    this_player: i64,
) -> Result<ReadyCount, RaceError> {
    use crate::schema::race_entries::dsl::{race_entries, race_id, status};

    conn.transaction(|| {
        let race: Race = crate::races::get_race(conn, this_race)?;
        if race.status != RaceStatus::Open {
            return Err(RaceError::NotOpen);
        }
        let entry: RaceEntry = race_entries
            .find((this_race, this_player))
            .get_result(conn)
            .optional()?
            .ok_or(RaceError::NotFound)?;
        if entry.status != EntryStatus::Joined {
            return Err(RaceError::AlreadyReady);
        }
        diesel::update(&entry)
            .set(status.eq(EntryStatus::Ready))
            .execute(conn)?;
        let total: i64 = race_entries
            .filter(race_id.eq(this_race))
            .count()
            .get_result(conn)?;
        let ready_count: i64 = race_entries
            .filter(race_id.eq(this_race))
            .filter(status.eq(EntryStatus::Ready))
            .count()
            .get_result(conn)?;
        let mut begins = None;
        if ready_count == total && total >= 2 {
            begins = Some(start_race(conn, this_race)?);
        }

        Ok(ReadyCount {
            ready: ready_count,
            total,
            started_at: begins,
        })
    })
}

pub fn unready(
    conn: &SqliteConnection,
    this_race: i32,
    this_player: i64,
) -> Result<(), RaceError> {
    use crate::schema::race_entries::dsl::{race_entries, status};

    conn.transaction(|| {
        let race: Race = crate::races::get_race(conn, this_race)?;
        if race.status != RaceStatus::Open {
            return Err(RaceError::NotOpen);
        }
        let entry: RaceEntry = race_entries
            .find((this_race, this_player))
            .get_result(conn)
            .optional()?
            .ok_or(RaceError::NotFound)?;
        if entry.status != EntryStatus::Ready {
            return Err(RaceError::NotReady);
        }
        diesel::update(&entry)
            .set(status.eq(EntryStatus::Joined))
            .execute(conn)?;

        Ok(())
    })
}

pub fn force_start(conn: &SqliteConnection, this_race: i32) -> Result<NaiveDateTime, RaceError> {
    use crate::schema::race_entries::dsl::{race_entries, race_id, status};

    conn.transaction(|| {
        let race: Race = crate::races::get_race(conn, this_race)?;
        if race.status != RaceStatus::Open {
            return Err(RaceError::NotOpen);
        }
        let total: i64 = race_entries
            .filter(race_id.eq(this_race))
            .count()
            .get_result(conn)?;
        if total < 2 {
            return Err(RaceError::TooFewPlayers);
        }
        diesel::update(
            race_entries
                .filter(race_id.eq(this_race))
                .filter(status.eq(EntryStatus::Joined)),
        )
        .set(status.eq(EntryStatus::Ready))
        .execute(conn)?;

        start_race(conn, this_race)
    })
}

// OPEN -> STARTED plus the countdown offset, inside the caller's transaction
fn start_race(conn: &SqliteConnection, this_race: i32) -> Result<NaiveDateTime, RaceError> {
    use crate::schema::races::dsl::{races, started_at, status};

    let begins = Utc::now().naive_utc() + Duration::seconds(COUNTDOWN_OFFSET_SECONDS);
    diesel::update(races.find(this_race))
        .set((status.eq(RaceStatus::Started), started_at.eq(begins)))
        .execute(conn)?;

    Ok(begins)
}

pub fn done(
    conn: &SqliteConnection,
    this_race: i32,
    this_player: i64,
) -> Result<FinishReport, RaceError> {
    use crate::schema::race_entries::dsl::{finish_seconds, race_entries, race_id, status};

    conn.transaction(|| {
        let (race, entry) = finishing_entry(conn, this_race, this_player)?;
        let start = race.started_at.ok_or(RaceError::RaceNotStarted)?;
        let elapsed = (Utc::now().naive_utc() - start).num_seconds();
        if elapsed <= 0 {
            // countdown still running; nothing is committed
            return Err(RaceError::TooEarly);
        }
        let secs = cmp::min(elapsed, (FORFEIT_SENTINEL - 1) as i64) as i32;
        // rank by completion order: whoever was recorded done before us
        let ahead: i64 = race_entries
            .filter(race_id.eq(this_race))
            .filter(status.eq(EntryStatus::Done))
            .filter(finish_seconds.lt(FORFEIT_SENTINEL))
            .count()
            .get_result(conn)?;
        diesel::update(&entry)
            .set((status.eq(EntryStatus::Done), finish_seconds.eq(secs)))
            .execute(conn)?;

        finish_tail(conn, this_race, Some(ahead + 1))
    })
}

pub fn forfeit(
    conn: &SqliteConnection,
    this_race: i32,
    this_player: i64,
) -> Result<FinishReport, RaceError> {
    use crate::schema::race_entries::dsl::{finish_seconds, status};

    conn.transaction(|| {
        let (_race, entry) = finishing_entry(conn, this_race, this_player)?;
        diesel::update(&entry)
            .set((
                status.eq(EntryStatus::Done),
                finish_seconds.eq(FORFEIT_SENTINEL),
            ))
            .execute(conn)?;

        finish_tail(conn, this_race, None)
    })
}

pub fn undone(conn: &SqliteConnection, this_race: i32, this_player: i64) -> Result<(), RaceError> {
    use crate::schema::race_entries::dsl::{finish_seconds, race_entries, status};

    conn.transaction(|| {
        let race: Race = crate::races::get_race(conn, this_race)?;
        if race.status != RaceStatus::Started {
            return Err(RaceError::NotStarted);
        }
        let entry: RaceEntry = race_entries
            .find((this_race, this_player))
            .get_result(conn)
            .optional()?
            .ok_or(RaceError::NotJoined)?;
        if entry.status != EntryStatus::Done {
            return Err(RaceError::NotDone);
        }
        diesel::update(&entry)
            .set((status.eq(EntryStatus::Ready), finish_seconds.eq(None::<i32>)))
            .execute(conn)?;

        Ok(())
    })
}

pub fn force_end(conn: &SqliteConnection, this_race: i32) -> Result<FinishReport, RaceError> {
    use crate::schema::race_entries::dsl::{finish_seconds, race_entries, race_id, status};

    conn.transaction(|| {
        let race: Race = crate::races::get_race(conn, this_race)?;
        if race.status != RaceStatus::Started {
            return Err(RaceError::NotStarted);
        }
        // whoever has not come in yet is recorded as a forfeit
        diesel::update(
            race_entries
                .filter(race_id.eq(this_race))
                .filter(status.eq(EntryStatus::Ready)),
        )
        .set((
            status.eq(EntryStatus::Done),
            finish_seconds.eq(FORFEIT_SENTINEL),
        ))
        .execute(conn)?;

        finish_tail(conn, this_race, None)
    })
}

// a race still OPEN can be scrapped without leaving a terminal record
pub fn cancel(conn: &SqliteConnection, this_race: i32) -> Result<Race, RaceError> {
    use crate::schema::race_entries::dsl::{race_entries, race_id};
    use crate::schema::races::dsl::races;

    conn.transaction(|| {
        let race: Race = races.find(this_race).get_result(conn)?;
        if race.status != RaceStatus::Open {
            return Err(RaceError::NotOpen);
        }
        diesel::delete(race_entries.filter(race_id.eq(this_race))).execute(conn)?;
        diesel::delete(races.find(this_race)).execute(conn)?;

        Ok(race)
    })
}

// shared guards for done/forfeit
fn finishing_entry(
    conn: &SqliteConnection,
    this_race: i32,
    this_player: i64,
) -> Result<(Race, RaceEntry), RaceError> {
    use crate::schema::race_entries::dsl::race_entries;

    let race: Race = crate::races::get_race(conn, this_race)?;
    if race.status != RaceStatus::Started {
        return Err(RaceError::RaceNotStarted);
    }
    let entry: RaceEntry = race_entries
        .find((this_race, this_player))
        .get_result(conn)
        .optional()?
        .ok_or(RaceError::NotFound)?;
    match entry.status {
        EntryStatus::Joined => Err(RaceError::NotJoined),
        EntryStatus::Done => Err(RaceError::AlreadyDone),
        EntryStatus::Ready => Ok((race, entry)),
    }
}

// after any finishing mutation: recount, and close the race out when the
// last runner is in
fn finish_tail(
    conn: &SqliteConnection,
    this_race: i32,
    position: Option<i64>,
) -> Result<FinishReport, RaceError> {
    use crate::schema::race_entries::dsl::{race_entries, race_id, status};
    use crate::schema::races::dsl::{ended_at, races, status as race_status};

    let total: i64 = race_entries
        .filter(race_id.eq(this_race))
        .count()
        .get_result(conn)?;
    let done_count: i64 = race_entries
        .filter(race_id.eq(this_race))
        .filter(status.eq(EntryStatus::Done))
        .count()
        .get_result(conn)?;
    let mut finished = false;
    if done_count == total {
        diesel::update(races.find(this_race))
            .set((
                race_status.eq(RaceStatus::Finished),
                ended_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        finished = true;
    }

    Ok(FinishReport {
        position,
        done: done_count,
        total,
        finished,
    })
}
