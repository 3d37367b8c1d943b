use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;
use futures::join;
use serde_json::{json, Value};

use crate::{
    async_races::{
        self, lifecycle as async_lifecycle, lifecycle::PurgeReport, AsyncRace, NewAsyncRace,
    },
    collab::{ArchivalSink, ChannelProvisioner, CountdownPresenter, SeedDescriptor, SeedProvider},
    config::{self, CachedChannel, SeedPreset},
    error::{AsyncRaceError, RaceError},
    helpers::{format_seconds, parse_hms, PooledConn, SqlitePool, FORFEIT_SENTINEL},
    players,
    races::{self, lifecycle, lifecycle::FinishReport, lifecycle::ReadyCount, NewRace, Race},
    rating,
};

// creation is refused once this many async races are running at once
pub const MAX_ACTIVE_ASYNC_RACES: usize = 10;

// Ties the engines to their collaborators. Slow collaborator I/O is always
// sequenced outside the store transactions: provisioning before the insert
// commits, archival/rating/teardown after the terminal transition commits,
// and the countdown display as a detached task that can fail without
// touching the committed start.
pub struct Coordinator {
    pool: SqlitePool,
    seeds: Arc<dyn SeedProvider>,
    channels: Arc<dyn ChannelProvisioner>,
    archive: Arc<dyn ArchivalSink>,
    countdown: Arc<dyn CountdownPresenter>,
}

impl Coordinator {
    pub fn new(
        pool: SqlitePool,
        seeds: Arc<dyn SeedProvider>,
        channels: Arc<dyn ChannelProvisioner>,
        archive: Arc<dyn ArchivalSink>,
        countdown: Arc<dyn CountdownPresenter>,
    ) -> Self {
        Coordinator {
            pool,
            seeds,
            channels,
            archive,
            countdown,
        }
    }

    fn race_conn(&self) -> Result<PooledConn, RaceError> {
        self.pool
            .get()
            .map_err(|e| RaceError::Storage(e.to_string()))
    }

    fn async_conn(&self) -> Result<PooledConn, AsyncRaceError> {
        self.pool
            .get()
            .map_err(|e| AsyncRaceError::Storage(e.to_string()))
    }

    pub async fn create_race(
        &self,
        race_name: &str,
        creator: i64,
        creator_name: &str,
        ranked: bool,
        preset: Option<&SeedPreset>,
    ) -> Result<Race> {
        let conn = self.pool.get()?;
        let player = players::ensure_player(&conn, creator, creator_name)?;
        if player.banned {
            return Err(anyhow!(
                "Runner \"{}\" is banned from racing",
                player.player_name
            ));
        }
        let seed = self.roll_seed(preset).await?;
        let channel = self
            .channels
            .create_race_channel(race_name)
            .await
            .map_err(|e| anyhow!("Could not provision race channel: {}", e))?;
        let race = races::create_race(
            &conn,
            &NewRace::new(
                race_name,
                Some(creator),
                ranked,
                preset.map(|p| p.label.as_str()),
                &seed,
                Some(channel),
            ),
        )?;
        info!("Opened race \"{}\" ({})", race.race_name, race.race_id);

        Ok(race)
    }

    pub async fn join_race(
        &self,
        this_race: i32,
        this_player: i64,
        player_name: &str,
    ) -> Result<(), RaceError> {
        let conn = self.race_conn()?;
        let player = players::ensure_player(&conn, this_player, player_name)?;
        if player.banned {
            return Err(RaceError::Banned);
        }

        lifecycle::join(&conn, this_race, this_player)
    }

    pub async fn leave_race(&self, this_race: i32, this_player: i64) -> Result<(), RaceError> {
        let conn = self.race_conn()?;

        lifecycle::leave(&conn, this_race, this_player)
    }

    pub async fn ready_up(
        &self,
        this_race: i32,
        this_player: i64,
    ) -> Result<ReadyCount, RaceError> {
        let conn = self.race_conn()?;
        let report = lifecycle::ready(&conn, this_race, this_player)?;
        if report.started_at.is_some() {
            info!("Race {} started with {} runners", this_race, report.total);
            self.spawn_countdown(&conn, this_race);
        }

        Ok(report)
    }

    pub async fn unready(&self, this_race: i32, this_player: i64) -> Result<(), RaceError> {
        let conn = self.race_conn()?;

        lifecycle::unready(&conn, this_race, this_player)
    }

    pub async fn force_start(&self, this_race: i32) -> Result<NaiveDateTime, RaceError> {
        let conn = self.race_conn()?;
        let begins = lifecycle::force_start(&conn, this_race)?;
        info!("Race {} force-started", this_race);
        self.spawn_countdown(&conn, this_race);

        Ok(begins)
    }

    pub async fn finish(
        &self,
        this_race: i32,
        this_player: i64,
    ) -> Result<FinishReport, RaceError> {
        let conn = self.race_conn()?;
        let report = lifecycle::done(&conn, this_race, this_player)?;
        if report.finished {
            self.seal_race(&conn, this_race).await;
        }

        Ok(report)
    }

    pub async fn forfeit(
        &self,
        this_race: i32,
        this_player: i64,
    ) -> Result<FinishReport, RaceError> {
        let conn = self.race_conn()?;
        let report = lifecycle::forfeit(&conn, this_race, this_player)?;
        if report.finished {
            self.seal_race(&conn, this_race).await;
        }

        Ok(report)
    }

    pub async fn undo_finish(&self, this_race: i32, this_player: i64) -> Result<(), RaceError> {
        let conn = self.race_conn()?;

        lifecycle::undone(&conn, this_race, this_player)
    }

    pub async fn force_end(&self, this_race: i32) -> Result<FinishReport, RaceError> {
        let conn = self.race_conn()?;
        let report = lifecycle::force_end(&conn, this_race)?;
        if report.finished {
            self.seal_race(&conn, this_race).await;
        }

        Ok(report)
    }

    pub async fn cancel_race(&self, this_race: i32) -> Result<()> {
        let conn = self.pool.get()?;
        let race = lifecycle::cancel(&conn, this_race)?;
        info!("Cancelled race \"{}\" ({})", race.race_name, race.race_id);
        if let Some(channel) = race.channel_id {
            if let Err(e) = self.channels.delete_race_channel(channel).await {
                warn!("Error deleting channel for cancelled race: {}", e);
            }
        }

        Ok(())
    }

    pub async fn create_async_race(
        &self,
        race_name: &str,
        creator: i64,
        creator_name: &str,
        ranked: bool,
        invitational: bool,
        preset: Option<&SeedPreset>,
    ) -> Result<AsyncRace> {
        let conn = self.pool.get()?;
        let player = players::ensure_player(&conn, creator, creator_name)?;
        if player.banned {
            return Err(anyhow!(
                "Runner \"{}\" is banned from racing",
                player.player_name
            ));
        }
        let active = async_races::get_active_async_races(&conn)?;
        if active.len() >= MAX_ACTIVE_ASYNC_RACES {
            return Err(anyhow!(
                "Cannot run more than {} async races at once",
                MAX_ACTIVE_ASYNC_RACES
            ));
        }
        let seed = self.roll_seed(preset).await?;
        let channels = self
            .channels
            .create_async_channels(race_name)
            .await
            .map_err(|e| anyhow!("Could not provision async race channels: {}", e))?;
        let race = async_races::create_async_race(
            &conn,
            &NewAsyncRace::new(
                race_name,
                Some(creator),
                ranked,
                invitational,
                preset.map(|p| p.label.as_str()),
                &seed,
                Some(channels),
            ),
        )?;
        info!(
            "Opened async race \"{}\" ({})",
            race.race_name, race.race_id
        );

        Ok(race)
    }

    pub async fn invite_runner(
        &self,
        this_race: i32,
        this_player: i64,
        player_name: &str,
    ) -> Result<(), AsyncRaceError> {
        let conn = self.async_conn()?;
        players::ensure_player(&conn, this_player, player_name)?;

        async_lifecycle::invite(&conn, this_race, this_player)
    }

    pub async fn submit_async(
        &self,
        this_race: i32,
        this_player: i64,
        player_name: &str,
        time_text: &str,
        collection: i32,
    ) -> Result<(), AsyncRaceError> {
        let conn = self.async_conn()?;
        let player = players::ensure_player(&conn, this_player, player_name)?;
        if player.banned {
            return Err(AsyncRaceError::Banned);
        }
        let seconds = parse_hms(time_text).map_err(|_| AsyncRaceError::BadTime)?;
        async_lifecycle::submit(&conn, this_race, this_player, seconds, collection)?;
        info!(
            "Accepted submission from \"{}\" for async race {}",
            player.player_name, this_race
        );

        Ok(())
    }

    pub async fn forfeit_async(
        &self,
        this_race: i32,
        this_player: i64,
        player_name: &str,
    ) -> Result<(), AsyncRaceError> {
        let conn = self.async_conn()?;
        let player = players::ensure_player(&conn, this_player, player_name)?;
        if player.banned {
            return Err(AsyncRaceError::Banned);
        }

        async_lifecycle::submit(&conn, this_race, this_player, FORFEIT_SENTINEL, 0)
    }

    pub async fn close_async(&self, this_race: i32) -> Result<(), AsyncRaceError> {
        let conn = self.async_conn()?;

        async_lifecycle::close(&conn, this_race)
    }

    pub async fn reopen_async(&self, this_race: i32) -> Result<(), AsyncRaceError> {
        let conn = self.async_conn()?;

        async_lifecycle::reopen(&conn, this_race)
    }

    pub async fn purge_async(&self, this_race: i32) -> Result<PurgeReport, AsyncRaceError> {
        let conn = self.async_conn()?;
        let report = async_lifecycle::purge(&conn, this_race)?;
        // the purge is committed; everything from here is best effort
        if report.race.ranked && report.results.len() >= 2 {
            let outcome: Vec<(i64, i32)> = report
                .results
                .iter()
                .map(|s| (s.player_id, s.finish_seconds))
                .collect();
            if let Err(e) = rating::apply_race_ratings(&conn, &outcome) {
                error!("Error applying ratings for async race {}: {}", this_race, e);
            }
        }
        let archive_fut = async {
            if !report.archived {
                return;
            }
            let rows: Vec<(String, i32, Option<i32>)> = {
                let names = self.name_map(&conn, report.results.iter().map(|s| s.player_id));
                report
                    .results
                    .iter()
                    .map(|s| {
                        (
                            names
                                .get(&s.player_id)
                                .cloned()
                                .unwrap_or_else(|| format!("runner-{}", s.player_id)),
                            s.finish_seconds,
                            Some(s.collection_rate),
                        )
                    })
                    .collect()
            };
            let (summary, embed) =
                build_summary(&report.race.race_name, report.race.ended_at, &rows);
            match self.archive.publish(&summary, &embed).await {
                Ok(msg) => info!("Archived async race {} as message {}", this_race, msg),
                Err(e) => warn!("Error archiving async race {}: {}", this_race, e),
            }
        };
        let teardown_fut = async {
            if let Some(set) = report.race.channel_set() {
                if let Err(e) = self.channels.delete_async_channels(&set).await {
                    warn!("Error tearing down async race channels: {}", e);
                }
            }
        };
        join!(archive_fut, teardown_fut);

        Ok(report)
    }

    // cached per scope so the channel is only ever provisioned once
    pub async fn ensure_cached_channel(&self, which: CachedChannel) -> Result<i64> {
        let conn = self.pool.get()?;
        let settings = config::init_settings(&conn)?;
        if let Some(id) = settings.cached(which) {
            return Ok(id);
        }
        let id = self
            .channels
            .create_race_channel(which.channel_name())
            .await
            .map_err(|e| anyhow!("Could not provision {} channel: {}", which.channel_name(), e))?;
        config::set_cached_channel(&conn, &settings, which, id)?;

        Ok(id)
    }

    async fn roll_seed(&self, preset: Option<&SeedPreset>) -> Result<SeedDescriptor> {
        let seed = match preset {
            Some(p) => self
                .seeds
                .roll_seed(p)
                .await
                .map_err(|e| anyhow!("Seed roll failed: {}", e))?
                .unwrap_or_default(),
            None => SeedDescriptor::default(),
        };
        seed.validated()
            .map_err(|e| anyhow!("Seed descriptor rejected: {}", e))
    }

    fn spawn_countdown(&self, conn: &PooledConn, this_race: i32) {
        let channel = match races::get_race(conn, this_race) {
            Ok(r) => r.channel_id,
            Err(e) => {
                warn!("Error loading race {} for countdown: {}", this_race, e);
                None
            }
        };
        if let Some(chan) = channel {
            let presenter = Arc::clone(&self.countdown);
            tokio::spawn(async move {
                presenter
                    .run_countdown(chan, lifecycle::COUNTDOWN_OFFSET_SECONDS)
                    .await;
            });
        }
    }

    // a finished race is archived and, when ranked, rated. Failures here are
    // logged and swallowed: the finish already committed.
    async fn seal_race(&self, conn: &PooledConn, this_race: i32) {
        let race = match races::get_race(conn, this_race) {
            Ok(r) => r,
            Err(e) => {
                error!("Error loading finished race {}: {}", this_race, e);
                return;
            }
        };
        let results = match races::race_results(conn, this_race) {
            Ok(r) => r,
            Err(e) => {
                error!("Error loading results for race {}: {}", this_race, e);
                return;
            }
        };
        if race.ranked {
            let outcome: Vec<(i64, i32)> = results
                .iter()
                .map(|e| (e.player_id, e.finish_seconds.unwrap_or(FORFEIT_SENTINEL)))
                .collect();
            if let Err(e) = rating::apply_race_ratings(conn, &outcome) {
                error!("Error applying ratings for race {}: {}", this_race, e);
            }
        }
        let names = self.name_map(conn, results.iter().map(|e| e.player_id));
        let rows: Vec<(String, i32, Option<i32>)> = results
            .iter()
            .map(|e| {
                (
                    names
                        .get(&e.player_id)
                        .cloned()
                        .unwrap_or_else(|| format!("runner-{}", e.player_id)),
                    e.finish_seconds.unwrap_or(FORFEIT_SENTINEL),
                    None,
                )
            })
            .collect();
        let (summary, embed) = build_summary(&race.race_name, race.ended_at, &rows);
        match self.archive.publish(&summary, &embed).await {
            Ok(msg) => info!("Archived race {} as message {}", this_race, msg),
            Err(e) => warn!("Error archiving race {}: {}", this_race, e),
        }
    }

    fn name_map<I>(&self, conn: &PooledConn, ids: I) -> HashMap<i64, String>
    where
        I: Iterator<Item = i64>,
    {
        let ids: Vec<i64> = ids.collect();
        match players::load_players(conn, &ids) {
            Ok(found) => found
                .into_iter()
                .map(|p| (p.player_id, p.player_name))
                .collect(),
            Err(e) => {
                warn!("Error loading runner names: {}", e);
                HashMap::new()
            }
        }
    }
}

fn build_summary(
    race_name: &str,
    ended: Option<NaiveDateTime>,
    rows: &[(String, i32, Option<i32>)],
) -> (String, Value) {
    let mut text = String::with_capacity(rows.len() * 40 + 64);
    text.push_str(format!("Results for {}:", race_name).as_str());
    let mut entries = Vec::with_capacity(rows.len());
    for (position, (runner, seconds, collection)) in rows.iter().enumerate() {
        text.push_str(
            format!(
                "\n{}) {} - {}",
                position + 1,
                runner,
                format_seconds(*seconds)
            )
            .as_str(),
        );
        if let Some(c) = collection {
            text.push_str(format!(" - {}", c).as_str());
        }
        entries.push(json!({
            "position": position + 1,
            "runner": runner,
            "time": format_seconds(*seconds),
            "seconds": seconds,
            "collection": collection,
        }));
    }
    let embed = json!({
        "race": race_name,
        "ended": ended.map(|d| d.to_string()),
        "results": entries,
    });

    (text, embed)
}
