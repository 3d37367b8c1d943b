use chrono::Duration;
use diesel::{prelude::*, sqlite::SqliteConnection};

use houlihan::{
    async_races::{self, AsyncRace, NewAsyncRace},
    collab::SeedDescriptor,
    helpers, players,
    races::{self, NewRace, Race},
};

pub fn test_conn() -> SqliteConnection {
    let conn = SqliteConnection::establish(":memory:").expect("in-memory database");
    helpers::run_migrations(&conn).expect("migrations");
    conn
}

pub fn add_player(conn: &SqliteConnection, id: i64, name: &str) {
    players::ensure_player(conn, id, name).expect("player");
}

pub fn open_race(conn: &SqliteConnection, name: &str, ranked: bool) -> Race {
    let seed = SeedDescriptor::default();
    races::create_race(
        conn,
        &NewRace::new(name, Some(1), ranked, None, &seed, Some(777)),
    )
    .expect("race")
}

pub fn open_async_race(
    conn: &SqliteConnection,
    name: &str,
    ranked: bool,
    invitational: bool,
) -> AsyncRace {
    let seed = SeedDescriptor::default();
    async_races::create_async_race(
        conn,
        &NewAsyncRace::new(name, Some(1), ranked, invitational, None, &seed, None),
    )
    .expect("async race")
}

// pushes a started race's clock into the past so elapsed times come out
// positive and predictable
pub fn backdate_start(conn: &SqliteConnection, race: i32, seconds: i64) {
    use houlihan::schema::races::dsl;

    let race_row: Race = dsl::races.find(race).get_result(conn).expect("race row");
    let start = race_row.started_at.expect("race started") - Duration::seconds(seconds);
    diesel::update(dsl::races.find(race))
        .set(dsl::started_at.eq(start))
        .execute(conn)
        .expect("backdate");
}
