use diesel::{insert_or_ignore_into, prelude::*, sqlite::SqliteConnection};

use crate::schema::players;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[table_name = "players"]
#[primary_key(player_id)]
pub struct Player {
    pub player_id: i64,
    pub player_name: String,
    pub rating: f64,
    pub races_played: i32,
    pub banned: bool,
}

#[derive(Debug, Insertable)]
#[table_name = "players"]
pub struct NewPlayer<'a> {
    pub player_id: i64,
    pub player_name: &'a str,
}

// idempotent get-or-create; rating and race counter only ever move through
// the rating application
pub fn ensure_player(
    conn: &SqliteConnection,
    id: i64,
    display_name: &str,
) -> QueryResult<Player> {
    use crate::schema::players::columns::player_name;
    use crate::schema::players::dsl::players;

    insert_or_ignore_into(players)
        .values(&NewPlayer {
            player_id: id,
            player_name: display_name,
        })
        .execute(conn)?;
    let player: Player = players.find(id).get_result(conn)?;
    // a changed handle refreshes the stored name but an empty one never
    // erases what we have
    if !display_name.is_empty() && player.player_name != display_name {
        diesel::update(&player)
            .set(player_name.eq(display_name))
            .execute(conn)?;
        return players.find(id).get_result(conn);
    }

    Ok(player)
}

#[inline]
pub fn get_player(conn: &SqliteConnection, id: i64) -> QueryResult<Player> {
    use crate::schema::players::dsl::players;

    players.find(id).get_result(conn)
}

#[inline]
pub fn load_players(conn: &SqliteConnection, ids: &[i64]) -> QueryResult<Vec<Player>> {
    use crate::schema::players::dsl::*;

    players.filter(player_id.eq_any(ids.to_vec())).load(conn)
}

#[inline]
pub fn all_players(conn: &SqliteConnection) -> QueryResult<Vec<Player>> {
    use crate::schema::players::dsl::players;

    players.load(conn)
}

pub fn set_banned(conn: &SqliteConnection, id: i64, flag: bool) -> QueryResult<()> {
    use crate::schema::players::dsl::*;

    diesel::update(players.find(id))
        .set(banned.eq(flag))
        .execute(conn)?;

    Ok(())
}
