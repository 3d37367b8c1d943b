use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use diesel::{
    r2d2::{ConnectionManager, Pool},
    sqlite::SqliteConnection,
};
use serde_json::Value;

use houlihan::{
    collab::{
        ArchivalSink, AsyncChannelSet, ChannelProvisioner, CountdownPresenter, SeedDescriptor,
        SeedProvider,
    },
    config::{CachedChannel, SeedPreset},
    coordinator::{Coordinator, MAX_ACTIVE_ASYNC_RACES},
    error::{AsyncRaceError, RaceError},
    helpers::{self, BoxedError, SqlitePool},
    players,
    races::lifecycle::COUNTDOWN_OFFSET_SECONDS,
};

mod common;
use common::backdate_start;

struct StaticSeeds;

#[async_trait]
impl SeedProvider for StaticSeeds {
    async fn roll_seed(
        &self,
        preset: &SeedPreset,
    ) -> Result<Option<SeedDescriptor>, BoxedError> {
        Ok(Some(SeedDescriptor {
            hash: Some(String::from("Bow Boots Mirror")),
            code: Some(preset.settings.clone()),
            url: Some(String::from("https://example.com/seed/1")),
            spoiler_attachment: None,
        }))
    }
}

#[derive(Default)]
struct FakeChannels {
    next_id: AtomicI64,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<i64>>,
    deleted_sets: Mutex<Vec<AsyncChannelSet>>,
}

impl FakeChannels {
    fn next(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1000
    }
}

#[async_trait]
impl ChannelProvisioner for FakeChannels {
    async fn create_race_channel(&self, race_name: &str) -> Result<i64, BoxedError> {
        self.created.lock().unwrap().push(race_name.to_owned());
        Ok(self.next())
    }

    async fn create_async_channels(
        &self,
        race_name: &str,
    ) -> Result<AsyncChannelSet, BoxedError> {
        self.created.lock().unwrap().push(race_name.to_owned());
        Ok(AsyncChannelSet {
            submission_channel_id: self.next(),
            results_channel_id: self.next(),
            spoiler_channel_id: self.next(),
            spoiler_role_id: self.next(),
        })
    }

    async fn delete_race_channel(&self, channel_id: i64) -> Result<(), BoxedError> {
        self.deleted.lock().unwrap().push(channel_id);
        Ok(())
    }

    async fn delete_async_channels(&self, channels: &AsyncChannelSet) -> Result<(), BoxedError> {
        self.deleted_sets.lock().unwrap().push(*channels);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingArchive {
    published: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl ArchivalSink for RecordingArchive {
    async fn publish(&self, summary: &str, embed: &Value) -> Result<i64, BoxedError> {
        let mut published = self.published.lock().unwrap();
        published.push((summary.to_owned(), embed.clone()));
        Ok(published.len() as i64)
    }
}

#[derive(Default)]
struct RecordingCountdown {
    runs: Mutex<Vec<(i64, i64)>>,
}

#[async_trait]
impl CountdownPresenter for RecordingCountdown {
    async fn run_countdown(&self, channel_id: i64, seconds: i64) {
        self.runs.lock().unwrap().push((channel_id, seconds));
    }
}

struct Rig {
    pool: SqlitePool,
    channels: Arc<FakeChannels>,
    archive: Arc<RecordingArchive>,
    countdown: Arc<RecordingCountdown>,
    coordinator: Coordinator,
}

fn rig() -> Rig {
    // a single-connection pool keeps every handle on the same in-memory store
    let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    helpers::run_migrations(&pool.get().unwrap()).unwrap();

    let channels = Arc::new(FakeChannels::default());
    let archive = Arc::new(RecordingArchive::default());
    let countdown = Arc::new(RecordingCountdown::default());
    let coordinator = Coordinator::new(
        pool.clone(),
        Arc::new(StaticSeeds),
        Arc::clone(&channels) as Arc<dyn ChannelProvisioner>,
        Arc::clone(&archive) as Arc<dyn ArchivalSink>,
        Arc::clone(&countdown) as Arc<dyn CountdownPresenter>,
    );

    Rig {
        pool,
        channels,
        archive,
        countdown,
        coordinator,
    }
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn full_sync_race_flows_through_the_collaborators() {
    let rig = rig();
    let preset = SeedPreset {
        label: String::from("Casual"),
        settings: String::from("open 7/7"),
    };

    let race = rig
        .coordinator
        .create_race("weekly", 1, "alpha", true, Some(&preset))
        .await
        .unwrap();
    assert_eq!(race.seed_hash.as_deref(), Some("Bow Boots Mirror"));
    assert_eq!(race.seed_preset.as_deref(), Some("Casual"));
    assert!(race.channel_id.is_some());

    rig.coordinator
        .join_race(race.race_id, 1, "alpha")
        .await
        .unwrap();
    rig.coordinator
        .join_race(race.race_id, 2, "beta")
        .await
        .unwrap();
    let count = rig
        .coordinator
        .ready_up(race.race_id, 1)
        .await
        .unwrap();
    assert!(count.started_at.is_none());
    let count = rig
        .coordinator
        .ready_up(race.race_id, 2)
        .await
        .unwrap();
    assert!(count.started_at.is_some());

    settle().await;
    let runs = rig.countdown.runs.lock().unwrap().clone();
    assert_eq!(runs, vec![(race.channel_id.unwrap(), COUNTDOWN_OFFSET_SECONDS)]);

    backdate_start(&rig.pool.get().unwrap(), race.race_id, 3600);
    let report = rig.coordinator.finish(race.race_id, 1).await.unwrap();
    assert_eq!(report.position, Some(1));
    assert!(!report.finished);
    let report = rig.coordinator.forfeit(race.race_id, 2).await.unwrap();
    assert!(report.finished);

    // the finish committed, then the race was rated and archived
    let published = rig.archive.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    let (summary, embed) = &published[0];
    assert!(summary.contains("alpha"));
    assert!(summary.contains("DNF"));
    assert_eq!(embed["race"], "weekly");

    let conn = rig.pool.get().unwrap();
    let alpha = players::get_player(&conn, 1).unwrap();
    let beta = players::get_player(&conn, 2).unwrap();
    assert!(alpha.rating > 1500.0);
    assert!(beta.rating < 1500.0);
    assert_eq!(alpha.races_played, 1);
}

#[tokio::test]
async fn async_race_flows_through_the_collaborators() {
    let rig = rig();

    let race = rig
        .coordinator
        .create_async_race("monthly", 1, "alpha", true, false, None)
        .await
        .unwrap();
    assert!(race.submission_channel_id.is_some());

    rig.coordinator
        .submit_async(race.race_id, 1, "alpha", "1:01:01", 80)
        .await
        .unwrap();
    assert_eq!(
        rig.coordinator
            .submit_async(race.race_id, 2, "beta", "sixty", 80)
            .await,
        Err(AsyncRaceError::BadTime)
    );
    rig.coordinator
        .submit_async(race.race_id, 2, "beta", "59:30", 95)
        .await
        .unwrap();

    rig.coordinator.close_async(race.race_id).await.unwrap();
    let report = rig.coordinator.purge_async(race.race_id).await.unwrap();
    assert!(report.archived);

    let published = rig.archive.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert!(published[0].0.contains("beta"));
    let deleted = rig.channels.deleted_sets.lock().unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(
        Some(deleted[0].submission_channel_id),
        race.submission_channel_id
    );

    let conn = rig.pool.get().unwrap();
    let beta = players::get_player(&conn, 2).unwrap();
    assert!(beta.rating > 1500.0);
}

#[tokio::test]
async fn async_races_are_capped_per_scope() {
    let rig = rig();
    for n in 0..MAX_ACTIVE_ASYNC_RACES {
        rig.coordinator
            .create_async_race(&format!("race {}", n), 1, "alpha", false, false, None)
            .await
            .unwrap();
    }
    let overflow = rig
        .coordinator
        .create_async_race("one too many", 1, "alpha", false, false, None)
        .await;
    assert!(overflow.is_err());
}

#[tokio::test]
async fn banned_runners_are_turned_away() {
    let rig = rig();
    let race = rig
        .coordinator
        .create_race("weekly", 1, "alpha", false, None)
        .await
        .unwrap();
    {
        let conn = rig.pool.get().unwrap();
        players::ensure_player(&conn, 2, "beta").unwrap();
        players::set_banned(&conn, 2, true).unwrap();
    }
    assert_eq!(
        rig.coordinator.join_race(race.race_id, 2, "beta").await,
        Err(RaceError::Banned)
    );
}

#[tokio::test]
async fn cancel_tears_the_channel_down() {
    let rig = rig();
    let race = rig
        .coordinator
        .create_race("doomed", 1, "alpha", false, None)
        .await
        .unwrap();
    rig.coordinator.cancel_race(race.race_id).await.unwrap();
    let deleted = rig.channels.deleted.lock().unwrap();
    assert_eq!(deleted.as_slice(), &[race.channel_id.unwrap()]);
}

#[tokio::test]
async fn cached_channels_are_provisioned_once() {
    let rig = rig();
    let first = rig
        .coordinator
        .ensure_cached_channel(CachedChannel::History)
        .await
        .unwrap();
    let second = rig
        .coordinator
        .ensure_cached_channel(CachedChannel::History)
        .await
        .unwrap();
    assert_eq!(first, second);
    let created = rig.channels.created.lock().unwrap();
    assert_eq!(created.iter().filter(|n| n.as_str() == "history").count(), 1);
}
