use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::{config::SeedPreset, helpers::BoxedError};

// whatever the randomizer service hands back; stored as-is and never
// interpreted beyond a syntax check on the permalink
#[derive(Debug, Clone, Default)]
pub struct SeedDescriptor {
    pub hash: Option<String>,
    pub code: Option<String>,
    pub url: Option<String>,
    pub spoiler_attachment: Option<String>,
}

impl SeedDescriptor {
    pub fn validated(self) -> Result<Self, BoxedError> {
        if let Some(u) = self.url.as_deref() {
            Url::parse(u)?;
        }

        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncChannelSet {
    pub submission_channel_id: i64,
    pub results_channel_id: i64,
    pub spoiler_channel_id: i64,
    pub spoiler_role_id: i64,
}

#[async_trait]
pub trait SeedProvider: Send + Sync {
    async fn roll_seed(&self, preset: &SeedPreset) -> Result<Option<SeedDescriptor>, BoxedError>;
}

#[async_trait]
pub trait ChannelProvisioner: Send + Sync {
    async fn create_race_channel(&self, race_name: &str) -> Result<i64, BoxedError>;

    async fn create_async_channels(&self, race_name: &str)
        -> Result<AsyncChannelSet, BoxedError>;

    async fn delete_race_channel(&self, channel_id: i64) -> Result<(), BoxedError>;

    async fn delete_async_channels(&self, channels: &AsyncChannelSet) -> Result<(), BoxedError>;
}

#[async_trait]
pub trait ArchivalSink: Send + Sync {
    // returns a reference to the published message
    async fn publish(&self, summary: &str, embed: &Value) -> Result<i64, BoxedError>;
}

#[async_trait]
pub trait CountdownPresenter: Send + Sync {
    async fn run_countdown(&self, channel_id: i64, seconds: i64);
}
