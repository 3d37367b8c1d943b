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
    collab::SeedDescriptor,
    schema::{race_entries, races},
};

pub mod lifecycle;

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromSqlRow)]
pub enum RaceStatus {
    Open,
    Started,
    Finished,
}

impl<DB> FromSql<Integer, DB> for RaceStatus
where
    DB: Backend,
    i32: FromSql<Integer, DB>,
{
    fn from_sql(bytes: Option<&DB::RawValue>) -> deserialize::Result<Self> {
        match i32::from_sql(bytes)? {
            0 => Ok(RaceStatus::Open),
            1 => Ok(RaceStatus::Started),
            2 => Ok(RaceStatus::Finished),
            x => Err(format!("Unrecognized race status {}", x).into()),
        }
    }
}

impl AsExpression<Integer> for RaceStatus {
    type Expression = AsExprOf<i32, Integer>;

    fn as_expression(self) -> Self::Expression {
        <i32 as AsExpression<Integer>>::as_expression(self as i32)
    }
}

impl<'a> AsExpression<Integer> for &'a RaceStatus {
    type Expression = AsExprOf<i32, Integer>;

    fn as_expression(self) -> Self::Expression {
        <i32 as AsExpression<Integer>>::as_expression(*self as i32)
    }
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RaceStatus::Open => write!(f, "open"),
            RaceStatus::Started => write!(f, "started"),
            RaceStatus::Finished => write!(f, "finished"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromSqlRow)]
pub enum EntryStatus {
    Joined,
    Ready,
    Done,
}

impl<DB> FromSql<Integer, DB> for EntryStatus
where
    DB: Backend,
    i32: FromSql<Integer, DB>,
{
    fn from_sql(bytes: Option<&DB::RawValue>) -> deserialize::Result<Self> {
        match i32::from_sql(bytes)? {
            0 => Ok(EntryStatus::Joined),
            1 => Ok(EntryStatus::Ready),
            2 => Ok(EntryStatus::Done),
            x => Err(format!("Unrecognized entry status {}", x).into()),
        }
    }
}

impl AsExpression<Integer> for EntryStatus {
    type Expression = AsExprOf<i32, Integer>;

    fn as_expression(self) -> Self::Expression {
        <i32 as AsExpression<Integer>>::as_expression(self as i32)
    }
}

impl<'a> AsExpression<Integer> for &'a EntryStatus {
    type Expression = AsExprOf<i32, Integer>;

    fn as_expression(self) -> Self::Expression {
        <i32 as AsExpression<Integer>>::as_expression(*self as i32)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EntryStatus::Joined => write!(f, "joined"),
            EntryStatus::Ready => write!(f, "ready"),
            EntryStatus::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable)]
#[table_name = "races"]
#[primary_key(race_id)]
pub struct Race {
    pub race_id: i32,
    pub race_name: String,
    pub created_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
    pub status: RaceStatus,
    pub ranked: bool,
    pub seed_preset: Option<String>,
    pub seed_hash: Option<String>,
    pub seed_code: Option<String>,
    pub seed_url: Option<String>,
    pub channel_id: Option<i64>,
}

#[derive(Debug, Insertable)]
#[table_name = "races"]
pub struct NewRace<'a> {
    pub race_name: &'a str,
    pub created_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub status: RaceStatus,
    pub ranked: bool,
    pub seed_preset: Option<&'a str>,
    pub seed_hash: Option<&'a str>,
    pub seed_code: Option<&'a str>,
    pub seed_url: Option<&'a str>,
    pub channel_id: Option<i64>,
}

impl<'a> NewRace<'a> {
    pub fn new(
        race_name: &'a str,
        created_by: Option<i64>,
        ranked: bool,
        seed_preset: Option<&'a str>,
        seed: &'a SeedDescriptor,
        channel_id: Option<i64>,
    ) -> Self {
        NewRace {
            race_name,
            created_by,
            created_at: Utc::now().naive_utc(),
            status: RaceStatus::Open,
            ranked,
            seed_preset,
            seed_hash: seed.hash.as_deref(),
            seed_code: seed.code.as_deref(),
            seed_url: seed.url.as_deref(),
            channel_id,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Identifiable, Associations)]
#[belongs_to(parent = "Race", foreign_key = "race_id")]
#[table_name = "race_entries"]
#[primary_key(race_id, player_id)]
pub struct RaceEntry {
    pub race_id: i32,
    pub player_id: i64,
    pub joined_at: NaiveDateTime,
    pub status: EntryStatus,
    pub finish_seconds: Option<i32>,
}

impl RaceEntry {
    pub fn new(race_id: i32, player_id: i64) -> Self {
        RaceEntry {
            race_id,
            player_id,
            joined_at: Utc::now().naive_utc(),
            status: EntryStatus::Joined,
            finish_seconds: None,
        }
    }
}

pub fn create_race(conn: &SqliteConnection, new_race: &NewRace) -> QueryResult<Race> {
    use crate::schema::races::columns::race_id;
    use crate::schema::races::dsl::races;

    conn.transaction(|| {
        insert_into(races).values(new_race).execute(conn)?;
        races.order(race_id.desc()).first(conn)
    })
}

#[inline]
pub fn get_race(conn: &SqliteConnection, this_race: i32) -> QueryResult<Race> {
    use crate::schema::races::dsl::races;

    races.find(this_race).get_result(conn)
}

// the command layer looks races up by the channel the command came from
pub fn get_race_by_channel(
    conn: &SqliteConnection,
    channel: i64,
) -> QueryResult<Option<Race>> {
    use crate::schema::races::dsl::*;

    races
        .filter(channel_id.eq(channel))
        .filter(status.ne(RaceStatus::Finished))
        .first(conn)
        .optional()
}

// finished rows ordered for standings; the sentinel pushes forfeits last
pub fn race_results(conn: &SqliteConnection, this_race: i32) -> QueryResult<Vec<RaceEntry>> {
    use crate::schema::race_entries::dsl::*;

    race_entries
        .filter(race_id.eq(this_race))
        .filter(status.eq(EntryStatus::Done))
        .order(finish_seconds.asc())
        .load(conn)
}
