use std::env;

use anyhow::{anyhow, Result};
use chrono::{offset::Utc, Duration};
use diesel::{prelude::*, sqlite::SqliteConnection};
use dotenv::dotenv;

use houlihan::{
    export::{collect_history, render_table, replay_history, RaceKind, Window},
    helpers,
};

// offline results export: walks the closed-out races in the store and
// prints the recomputed standings. Usage: houlihan [days] [sync|async]
fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let args: Vec<String> = env::args().collect();
    let days: i64 = args
        .get(1)
        .map(|d| d.parse())
        .transpose()
        .map_err(|_| anyhow!("Day window must be a number"))?
        .unwrap_or(30);
    let kind = match args.get(2).map(|s| s.as_str()) {
        Some("sync") => Some(RaceKind::Sync),
        Some("async") => Some(RaceKind::Async),
        Some(other) => return Err(anyhow!("Unknown race kind filter: {}", other)),
        None => None,
    };

    let conn = SqliteConnection::establish(&database_url)?;
    helpers::run_migrations(&conn)?;
    let now = Utc::now().naive_utc();
    let window = Window {
        from: now - Duration::days(days),
        to: now,
    };
    let history = collect_history(&conn, &window, kind)?;
    let replay = replay_history(&history);
    print!("{}", render_table(&replay));

    Ok(())
}
