use std::collections::HashMap;

use diesel::{prelude::*, sqlite::SqliteConnection};

use crate::helpers::FORFEIT_SENTINEL;

pub const STARTING_RATING: f64 = 1500.0;
const RATING_SWING: f64 = 100.0;

// a pre-race snapshot of one participant; deltas are computed against these
// ratings only, never against rows mutated mid-loop
#[derive(Debug, Clone, Copy)]
pub struct Standing {
    pub player_id: i64,
    pub rating: f64,
    pub seconds: i32,
}

#[inline]
pub fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) / 400.0))
}

pub fn race_deltas(field: &[Standing]) -> Vec<f64> {
    let mut deltas = vec![0.0; field.len()];
    for (i, a) in field.iter().enumerate() {
        for (j, b) in field.iter().enumerate() {
            if i == j {
                continue;
            }
            let a_forfeit = a.seconds >= FORFEIT_SENTINEL;
            let b_forfeit = b.seconds >= FORFEIT_SENTINEL;
            // two forfeits have nothing to settle between them
            if a_forfeit && b_forfeit {
                continue;
            }
            let result = if a_forfeit {
                0.0
            } else if b_forfeit {
                1.0
            } else if a.seconds < b.seconds {
                1.0
            } else if a.seconds > b.seconds {
                0.0
            } else {
                0.5
            };
            deltas[i] += RATING_SWING * (result - expected_score(a.rating, b.rating));
        }
    }

    deltas
}

// applies one finished race to the registry: snapshot, deltas, counters, all
// in a single transaction. Races with fewer than two participants are not
// rated so an offline replay sees the same trajectory.
pub fn apply_race_ratings(conn: &SqliteConnection, results: &[(i64, i32)]) -> QueryResult<()> {
    use crate::schema::players::dsl::*;

    if results.len() < 2 {
        return Ok(());
    }
    conn.transaction(|| {
        let ids: Vec<i64> = results.iter().map(|r| r.0).collect();
        let snapshot: HashMap<i64, f64> = players
            .select((player_id, rating))
            .filter(player_id.eq_any(ids))
            .load::<(i64, f64)>(conn)?
            .into_iter()
            .collect();
        let field: Vec<Standing> = results
            .iter()
            .map(|&(pid, secs)| Standing {
                player_id: pid,
                rating: snapshot.get(&pid).copied().unwrap_or(STARTING_RATING),
                seconds: secs,
            })
            .collect();
        let deltas = race_deltas(&field);
        for (standing, delta) in field.iter().zip(deltas.iter()) {
            diesel::update(players.find(standing.player_id))
                .set((
                    rating.eq(standing.rating + delta),
                    races_played.eq(races_played + 1),
                ))
                .execute(conn)?;
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standing(pid: i64, rating: f64, seconds: i32) -> Standing {
        Standing {
            player_id: pid,
            rating,
            seconds,
        }
    }

    #[test]
    fn expected_scores_are_complementary() {
        let a = expected_score(1500.0, 1700.0);
        let b = expected_score(1700.0, 1500.0);
        assert!((a + b - 1.0).abs() < 1e-12);
        assert!(a < 0.5);
    }

    #[test]
    fn even_match_swings_fifty_points() {
        let field = vec![standing(1, 1500.0, 3600), standing(2, 1500.0, 3700)];
        let deltas = race_deltas(&field);
        assert!((deltas[0] - 50.0).abs() < 1e-9);
        assert!((deltas[1] + 50.0).abs() < 1e-9);
    }

    #[test]
    fn exact_tie_moves_nothing_between_equals() {
        let field = vec![standing(1, 1500.0, 3600), standing(2, 1500.0, 3600)];
        let deltas = race_deltas(&field);
        assert!(deltas[0].abs() < 1e-9);
        assert!(deltas[1].abs() < 1e-9);
    }

    #[test]
    fn forfeit_loses_to_any_finisher() {
        let field = vec![
            standing(1, 1400.0, FORFEIT_SENTINEL),
            standing(2, 1600.0, 359_000),
        ];
        let deltas = race_deltas(&field);
        // the underdog forfeited: small loss for them, small gain for the favorite
        assert!(deltas[0] < 0.0);
        assert!(deltas[1] > 0.0);
        assert!((deltas[0] + deltas[1]).abs() < 1e-9);
    }

    #[test]
    fn double_forfeit_is_not_compared() {
        let field = vec![
            standing(1, 1500.0, FORFEIT_SENTINEL),
            standing(2, 1500.0, FORFEIT_SENTINEL),
            standing(3, 1500.0, 4000),
        ];
        let deltas = race_deltas(&field);
        // each forfeiter loses exactly one pairing, against the finisher
        assert!((deltas[0] + 50.0).abs() < 1e-9);
        assert!((deltas[1] + 50.0).abs() < 1e-9);
        assert!((deltas[2] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn deltas_are_zero_sum() {
        let field = vec![
            standing(1, 1512.5, 3600),
            standing(2, 1433.0, 3700),
            standing(3, 1688.25, FORFEIT_SENTINEL),
            standing(4, 1501.0, 3700),
            standing(5, 1599.75, 3500),
        ];
        let deltas = race_deltas(&field);
        let sum: f64 = deltas.iter().sum();
        assert!(sum.abs() < 1e-9);
    }
}
