use chrono::offset::Utc;
use diesel::{insert_or_ignore_into, prelude::*, replace_into, sqlite::SqliteConnection};

use crate::{
    async_races::{
        get_async_race, submissions_for_race, AsyncInvite, AsyncRace, AsyncStatus,
        AsyncSubmission, InviteStatus,
    },
    error::AsyncRaceError,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PurgeReport {
    pub race: AsyncRace,
    pub results: Vec<AsyncSubmission>,
    // a single submission is not worth a history entry
    pub archived: bool,
}

// last submission wins; a runner corrects a typo by submitting again
pub fn submit(
    conn: &SqliteConnection,
    this_race: i32,
    this_player: i64,
    seconds: i32,
    collection: i32,
) -> Result<(), AsyncRaceError> {
    use crate::schema::async_invites::dsl::{async_invites, invite_status};
    use crate::schema::async_submissions::dsl::async_submissions;

    conn.transaction(|| {
        let race = get_async_race(conn, this_race)?;
        if race.status != AsyncStatus::Open {
            return Err(AsyncRaceError::NotOpen);
        }
        if race.invitational {
            let invite: Option<AsyncInvite> = async_invites
                .find((this_race, this_player))
                .get_result(conn)
                .optional()?;
            match invite {
                None => return Err(AsyncRaceError::NotInvited),
                Some(i) if i.invite_status == InviteStatus::Pending => {
                    diesel::update(&i)
                        .set(invite_status.eq(InviteStatus::Accepted))
                        .execute(conn)?;
                }
                Some(_) => (),
            }
        }
        replace_into(async_submissions)
            .values(&AsyncSubmission::new(
                this_race,
                this_player,
                seconds,
                collection,
            ))
            .execute(conn)?;

        Ok(())
    })
}

pub fn invite(
    conn: &SqliteConnection,
    this_race: i32,
    this_player: i64,
) -> Result<(), AsyncRaceError> {
    use crate::schema::async_invites::dsl::async_invites;

    conn.transaction(|| {
        let race = get_async_race(conn, this_race)?;
        if !race.invitational {
            return Err(AsyncRaceError::NotInvitational);
        }
        if race.status != AsyncStatus::Open {
            return Err(AsyncRaceError::NotOpen);
        }
        insert_or_ignore_into(async_invites)
            .values(&AsyncInvite {
                race_id: this_race,
                player_id: this_player,
                invite_status: InviteStatus::Pending,
            })
            .execute(conn)?;

        Ok(())
    })
}

pub fn close(conn: &SqliteConnection, this_race: i32) -> Result<(), AsyncRaceError> {
    use crate::schema::async_races::dsl::{async_races, ended_at, status};

    conn.transaction(|| {
        let race = get_async_race(conn, this_race)?;
        if race.status != AsyncStatus::Open {
            return Err(AsyncRaceError::NotOpen);
        }
        diesel::update(async_races.find(this_race))
            .set((
                status.eq(AsyncStatus::Closed),
                ended_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        Ok(())
    })
}

// walks a close back; the submission window opens again
pub fn reopen(conn: &SqliteConnection, this_race: i32) -> Result<(), AsyncRaceError> {
    use crate::schema::async_races::dsl::{async_races, ended_at, status};

    conn.transaction(|| {
        let race = get_async_race(conn, this_race)?;
        if race.status != AsyncStatus::Closed {
            return Err(AsyncRaceError::NotClosed);
        }
        diesel::update(async_races.find(this_race))
            .set((
                status.eq(AsyncStatus::Open),
                ended_at.eq(None::<chrono::NaiveDateTime>),
            ))
            .execute(conn)?;

        Ok(())
    })
}

// terminal; there is deliberately no way back from here
pub fn purge(conn: &SqliteConnection, this_race: i32) -> Result<PurgeReport, AsyncRaceError> {
    use crate::schema::async_races::dsl::{async_races, status};

    conn.transaction(|| {
        let race = get_async_race(conn, this_race)?;
        if race.status != AsyncStatus::Closed {
            return Err(AsyncRaceError::MustCloseFirst);
        }
        diesel::update(async_races.find(this_race))
            .set(status.eq(AsyncStatus::Purged))
            .execute(conn)?;
        let results = submissions_for_race(conn, this_race)?;
        let archived = results.len() >= 2;
        let race = get_async_race(conn, this_race)?;

        Ok(PurgeReport {
            race,
            results,
            archived,
        })
    })
}
