use std::error::Error;

use anyhow::{anyhow, Result};
use diesel::{
    connection::SimpleConnection,
    r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection},
    sqlite::SqliteConnection,
};
use uuid::Uuid;

pub type BoxedError = Box<dyn Error + Send + Sync>;
pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

// stored in place of a missing time so forfeits always sort last (99:59:59)
pub const FORFEIT_SENTINEL: i32 = 359_999;

embed_migrations!("migrations");

pub fn run_migrations(conn: &SqliteConnection) -> Result<()> {
    embedded_migrations::run(conn)?;

    Ok(())
}

#[derive(Debug)]
struct ScopeConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ScopeConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

#[inline]
pub fn get_pool(database_url: &str) -> Result<SqlitePool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .connection_customizer(Box::new(ScopeConnectionOptions))
        .build(manager)
        .expect("Failed to create pool.");

    Ok(pool)
}

#[inline]
pub fn new_uuid() -> Vec<u8> {
    let new_uuid = Uuid::new_v4().as_bytes().to_vec();

    new_uuid
}

pub fn format_seconds(secs: i32) -> String {
    if secs >= FORFEIT_SENTINEL {
        return String::from("DNF");
    }
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub fn parse_hms(text: &str) -> Result<i32> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    let numbers = parts
        .iter()
        .map(|p| p.parse::<i32>())
        .collect::<Result<Vec<i32>, _>>()
        .map_err(|_| anyhow!("Unrecognized time: \"{}\"", text))?;
    if numbers.iter().any(|&n| n < 0) {
        return Err(anyhow!("Unrecognized time: \"{}\"", text));
    }
    let secs = match numbers.as_slice() {
        [s] => *s,
        [m, s] if *s < 60 => m * 60 + s,
        [h, m, s] if *m < 60 && *s < 60 => h * 3600 + m * 60 + s,
        _ => return Err(anyhow!("Unrecognized time: \"{}\"", text)),
    };

    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_times() {
        assert_eq!(format_seconds(3661), "1:01:01");
        assert_eq!(format_seconds(59), "0:00:59");
        assert_eq!(format_seconds(36000), "10:00:00");
        assert_eq!(format_seconds(FORFEIT_SENTINEL), "DNF");
    }

    #[test]
    fn parses_times() {
        assert_eq!(parse_hms("1:01:01").unwrap(), 3661);
        assert_eq!(parse_hms("59:59").unwrap(), 3599);
        assert_eq!(parse_hms("90").unwrap(), 90);
        assert!(parse_hms("1:61:00").is_err());
        assert!(parse_hms("banana").is_err());
        assert!(parse_hms("-1:00").is_err());
    }
}
