use std::{cmp::Ordering, collections::HashMap, fmt};

use chrono::NaiveDateTime;
use diesel::{prelude::*, sqlite::SqliteConnection};

use crate::{
    async_races::{AsyncRace, AsyncStatus, AsyncSubmission},
    helpers::{format_seconds, FORFEIT_SENTINEL},
    players,
    races::{Race, RaceEntry, RaceStatus},
    rating::{race_deltas, Standing, STARTING_RATING},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceKind {
    Sync,
    Async,
}

impl fmt::Display for RaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RaceKind::Sync => write!(f, "live"),
            RaceKind::Async => write!(f, "async"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub player_id: i64,
    pub player_name: String,
    pub seconds: i32,
    pub collection_rate: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct HistoryRace {
    pub name: String,
    pub kind: RaceKind,
    pub ended_at: NaiveDateTime,
    pub rows: Vec<HistoryRow>,
}

// closed-out races inside the window, oldest first, grouped per race.
// Races that never drew two results are dropped here and never rated.
pub fn collect_history(
    conn: &SqliteConnection,
    window: &Window,
    kind: Option<RaceKind>,
) -> QueryResult<Vec<HistoryRace>> {
    let names: HashMap<i64, String> = players::all_players(conn)?
        .into_iter()
        .map(|p| (p.player_id, p.player_name))
        .collect();
    let mut history: Vec<HistoryRace> = Vec::new();

    if kind != Some(RaceKind::Async) {
        use crate::schema::races::dsl::*;

        let finished: Vec<Race> = races
            .filter(status.eq(RaceStatus::Finished))
            .filter(ended_at.ge(window.from))
            .filter(ended_at.lt(window.to))
            .order(ended_at.asc())
            .load(conn)?;
        let grouped: Vec<Vec<RaceEntry>> = RaceEntry::belonging_to(&finished)
            .load::<RaceEntry>(conn)?
            .grouped_by(&finished);
        for (race, mut entries) in finished.into_iter().zip(grouped) {
            if entries.len() < 2 {
                continue;
            }
            entries.sort_by_key(|e| e.finish_seconds.unwrap_or(FORFEIT_SENTINEL));
            let rows = entries
                .iter()
                .map(|e| HistoryRow {
                    player_id: e.player_id,
                    player_name: display_name(&names, e.player_id),
                    seconds: e.finish_seconds.unwrap_or(FORFEIT_SENTINEL),
                    collection_rate: None,
                })
                .collect();
            history.push(HistoryRace {
                name: race.race_name,
                kind: RaceKind::Sync,
                ended_at: race.ended_at.unwrap_or(race.created_at),
                rows,
            });
        }
    }

    if kind != Some(RaceKind::Sync) {
        use crate::schema::async_races::dsl::*;

        let purged: Vec<AsyncRace> = async_races
            .filter(status.eq(AsyncStatus::Purged))
            .filter(ended_at.ge(window.from))
            .filter(ended_at.lt(window.to))
            .order(ended_at.asc())
            .load(conn)?;
        let grouped: Vec<Vec<AsyncSubmission>> = AsyncSubmission::belonging_to(&purged)
            .load::<AsyncSubmission>(conn)?
            .grouped_by(&purged);
        for (race, mut subs) in purged.into_iter().zip(grouped) {
            if subs.len() < 2 {
                continue;
            }
            subs.sort_by_key(|s| (s.finish_seconds, s.submitted_at));
            let rows = subs
                .iter()
                .map(|s| HistoryRow {
                    player_id: s.player_id,
                    player_name: display_name(&names, s.player_id),
                    seconds: s.finish_seconds,
                    collection_rate: Some(s.collection_rate),
                })
                .collect();
            history.push(HistoryRace {
                name: race.race_name,
                kind: RaceKind::Async,
                ended_at: race.ended_at.unwrap_or(race.started_at),
                rows,
            });
        }
    }

    history.sort_by_key(|r| r.ended_at);

    Ok(history)
}

fn display_name(names: &HashMap<i64, String>, id: i64) -> String {
    names
        .get(&id)
        .cloned()
        .unwrap_or_else(|| format!("runner-{}", id))
}

#[derive(Debug, Clone)]
pub struct ReplayRow {
    pub position: usize,
    pub player_name: String,
    pub seconds: i32,
    pub collection_rate: Option<i32>,
    pub rating: f64,
}

#[derive(Debug, Clone)]
pub struct ReplaySection {
    pub name: String,
    pub kind: RaceKind,
    pub ended_at: NaiveDateTime,
    pub rows: Vec<ReplayRow>,
}

#[derive(Debug, Clone)]
pub struct PlayerCard {
    pub player_name: String,
    pub races: i32,
    pub rating: f64,
}

#[derive(Debug, Clone)]
pub struct Replay {
    pub sections: Vec<ReplaySection>,
    pub standings: Vec<PlayerCard>,
}

// walks the buckets oldest-first, rebuilding every rating from scratch.
// The same window always produces the same trajectory, and a full-history
// walk lands on the live registry values.
pub fn replay_history(history: &[HistoryRace]) -> Replay {
    let mut table: HashMap<i64, (String, i32, f64)> = HashMap::new();
    let mut sections = Vec::with_capacity(history.len());
    for race in history {
        let field: Vec<Standing> = race
            .rows
            .iter()
            .map(|r| Standing {
                player_id: r.player_id,
                rating: table
                    .get(&r.player_id)
                    .map(|t| t.2)
                    .unwrap_or(STARTING_RATING),
                seconds: r.seconds,
            })
            .collect();
        let deltas = race_deltas(&field);
        let mut rows = Vec::with_capacity(race.rows.len());
        for (i, r) in race.rows.iter().enumerate() {
            let entry = table
                .entry(r.player_id)
                .or_insert_with(|| (r.player_name.clone(), 0, STARTING_RATING));
            entry.1 += 1;
            entry.2 += deltas[i];
            rows.push(ReplayRow {
                position: i + 1,
                player_name: r.player_name.clone(),
                seconds: r.seconds,
                collection_rate: r.collection_rate,
                rating: entry.2,
            });
        }
        sections.push(ReplaySection {
            name: race.name.clone(),
            kind: race.kind,
            ended_at: race.ended_at,
            rows,
        });
    }
    let mut standings: Vec<PlayerCard> = table
        .into_values()
        .map(|(player_name, races, rating)| PlayerCard {
            player_name,
            races,
            rating,
        })
        .collect();
    standings.sort_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap_or(Ordering::Equal));

    Replay {
        sections,
        standings,
    }
}

pub fn render_table(replay: &Replay) -> String {
    let mut out = String::with_capacity(replay.sections.len() * 256 + 256);
    for section in &replay.sections {
        out.push_str(
            format!(
                "{} ({}) - {}\n",
                section.name,
                section.kind,
                section.ended_at.date()
            )
            .as_str(),
        );
        for row in &section.rows {
            out.push_str(
                format!(
                    "{}) {} - {}",
                    row.position,
                    row.player_name,
                    format_seconds(row.seconds)
                )
                .as_str(),
            );
            if let Some(collection) = row.collection_rate {
                out.push_str(format!(" - {}", collection).as_str());
            }
            out.push_str(format!(" - {:.0}\n", row.rating).as_str());
        }
        out.push('\n');
    }
    out.push_str("Standings:\n");
    for (i, card) in replay.standings.iter().enumerate() {
        out.push_str(
            format!(
                "{}) {} - {:.0} ({} races)\n",
                i + 1,
                card.player_name,
                card.rating,
                card.races
            )
            .as_str(),
        );
    }

    out
}
