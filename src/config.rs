use std::{collections::HashMap, fs, path::Path};

use anyhow::Result;
use diesel::{insert_or_ignore_into, prelude::*, sqlite::SqliteConnection};
use serde::Deserialize;

use crate::{helpers::new_uuid, schema::global_settings};

// one row per deployment scope holding channel ids we only want to create
// once. The engine never provisions these itself; the calling collaborator
// creates lazily and writes the id back here.
#[derive(Debug, Clone, Queryable, Insertable, Identifiable)]
#[table_name = "global_settings"]
#[primary_key(scope_id)]
pub struct ScopeSettings {
    pub scope_id: Vec<u8>,
    pub history_channel_id: Option<i64>,
    pub ranking_channel_id: Option<i64>,
    pub submission_category_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedChannel {
    History,
    Ranking,
    SubmissionCategory,
}

impl CachedChannel {
    pub fn channel_name(self) -> &'static str {
        match self {
            CachedChannel::History => "history",
            CachedChannel::Ranking => "ranking",
            CachedChannel::SubmissionCategory => "submissions",
        }
    }
}

impl ScopeSettings {
    pub fn cached(&self, which: CachedChannel) -> Option<i64> {
        match which {
            CachedChannel::History => self.history_channel_id,
            CachedChannel::Ranking => self.ranking_channel_id,
            CachedChannel::SubmissionCategory => self.submission_category_id,
        }
    }
}

pub fn load_settings(conn: &SqliteConnection) -> QueryResult<Option<ScopeSettings>> {
    use crate::schema::global_settings::dsl::global_settings;

    global_settings.first(conn).optional()
}

pub fn init_settings(conn: &SqliteConnection) -> QueryResult<ScopeSettings> {
    use crate::schema::global_settings::dsl::global_settings;

    if let Some(existing) = load_settings(conn)? {
        return Ok(existing);
    }
    let fresh = ScopeSettings {
        scope_id: new_uuid(),
        history_channel_id: None,
        ranking_channel_id: None,
        submission_category_id: None,
    };
    insert_or_ignore_into(global_settings)
        .values(&fresh)
        .execute(conn)?;

    Ok(fresh)
}

pub fn set_cached_channel(
    conn: &SqliteConnection,
    settings: &ScopeSettings,
    which: CachedChannel,
    channel: i64,
) -> QueryResult<()> {
    use crate::schema::global_settings::dsl::*;

    match which {
        CachedChannel::History => {
            diesel::update(settings)
                .set(history_channel_id.eq(Some(channel)))
                .execute(conn)?;
        }
        CachedChannel::Ranking => {
            diesel::update(settings)
                .set(ranking_channel_id.eq(Some(channel)))
                .execute(conn)?;
        }
        CachedChannel::SubmissionCategory => {
            diesel::update(settings)
                .set(submission_category_id.eq(Some(channel)))
                .execute(conn)?;
        }
    };

    Ok(())
}

// named presets the seed provider understands, supplied by operators as yaml
#[derive(Debug, Clone, Deserialize)]
pub struct SeedPreset {
    pub label: String,
    pub settings: String,
}

#[derive(Debug, Deserialize)]
pub struct PresetFile {
    pub presets: HashMap<String, SeedPreset>,
}

impl PresetFile {
    #[inline]
    pub fn get(&self, name: &str) -> Option<&SeedPreset> {
        self.presets.get(name)
    }
}

pub fn load_presets(path: &Path) -> Result<PresetFile> {
    let bytes = fs::read(path)?;
    let file: PresetFile = serde_yaml::from_slice(&bytes)?;

    Ok(file)
}
