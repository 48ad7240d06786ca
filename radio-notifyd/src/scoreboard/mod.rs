pub mod client;
pub mod duration;
pub mod error;

use async_trait::async_trait;
use shared::types::{MusicInfo, ScoreboardAddress};

pub use client::ScoreboardClient;

/// Source of "now playing" records for a station.
///
/// Failures of any kind come back as `None`; the next poll round is the retry.
#[async_trait]
pub trait NowPlayingSource: Send + Sync {
    async fn fetch(&self, address: Option<&ScoreboardAddress>) -> Option<MusicInfo>;
}
