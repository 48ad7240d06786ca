use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use shared::types::{ActivityRecord, ChannelId, GuildId};
use crate::catalog::StationCatalog;
use crate::store_manager::StoreHandle;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Unknown station: {0}")]
    UnknownStation(String),

    #[error("Invalid stream address for {0}: {1}")]
    InvalidStream(String, url::ParseError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Result of starting playback in a guild
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackStarted {
    /// Stream URL the voice connection should play
    pub listen_url: String,
    /// The guild opted out of now-playing messages
    pub silenced: bool,
}

/// Keeps activity bindings in lockstep with voice playback.
#[derive(Clone)]
pub struct PlaybackLifecycle {
    store: StoreHandle,
    catalog: Arc<StationCatalog>,
}

impl PlaybackLifecycle {
    pub fn new(store: StoreHandle, catalog: Arc<StationCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Bind `guild_id` to `station`, replacing whatever it played before.
    pub async fn start(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        station: &str,
    ) -> Result<PlaybackStarted, PlaybackError> {
        let entry = self
            .catalog
            .get(station)
            .ok_or_else(|| PlaybackError::UnknownStation(station.to_string()))?;
        let listen_url = entry
            .stream
            .listen_url()
            .map_err(|e| PlaybackError::InvalidStream(station.to_string(), e))?;

        self.store
            .replace_activity(ActivityRecord::new(guild_id, channel_id, station))
            .await?;
        let silenced = self.store.is_silenced(guild_id).await?;

        tracing::info!("Guild {} started {} (channel {})", guild_id, station, channel_id);
        Ok(PlaybackStarted { listen_url, silenced })
    }

    /// Drop the guild's binding. Returns false if it had none.
    pub async fn stop(&self, guild_id: GuildId) -> anyhow::Result<bool> {
        let removed = self.store.clear_activity(guild_id).await?;
        if removed > 0 {
            tracing::info!("Guild {} stopped playback", guild_id);
        }
        Ok(removed > 0)
    }

    /// Stop and disconnect every voice session left without human listeners.
    /// Returns the guilds that were released.
    pub async fn sweep_idle<V>(&self, voice: &V) -> anyhow::Result<Vec<GuildId>>
    where
        V: VoiceSessions + ?Sized,
    {
        let mut released = Vec::new();

        for session in voice.sessions().await {
            if session.has_listeners() {
                continue;
            }
            tracing::info!(
                "Voice channel {} of guild {} has no listeners, disconnecting",
                session.channel_id,
                session.guild_id
            );
            self.store.clear_activity(session.guild_id).await?;
            voice.disconnect(session.guild_id).await;
            released.push(session.guild_id);
        }

        Ok(released)
    }
}

/// A member currently in a voice channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceMember {
    pub id: u64,
    #[serde(default)]
    pub bot: bool,
}

/// The voice channel a guild is streaming into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSession {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub members: Vec<VoiceMember>,
}

impl VoiceSession {
    /// At least one non-bot member is present
    pub fn has_listeners(&self) -> bool {
        self.members.iter().any(|m| !m.bot)
    }
}

/// Live voice connections, owned by the voice collaborator
#[async_trait]
pub trait VoiceSessions: Send + Sync {
    async fn sessions(&self) -> Vec<VoiceSession>;

    async fn disconnect(&self, guild_id: GuildId);
}

/// Voice sessions as last reported through the control API
#[derive(Debug, Default)]
pub struct VoiceRegistry {
    sessions: RwLock<HashMap<GuildId, VoiceSession>>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update(&self, session: VoiceSession) {
        self.sessions.write().await.insert(session.guild_id, session);
    }

    pub async fn get(&self, guild_id: GuildId) -> Option<VoiceSession> {
        self.sessions.read().await.get(&guild_id).cloned()
    }

    pub async fn remove(&self, guild_id: GuildId) -> Option<VoiceSession> {
        self.sessions.write().await.remove(&guild_id)
    }
}

#[async_trait]
impl VoiceSessions for VoiceRegistry {
    async fn sessions(&self) -> Vec<VoiceSession> {
        self.sessions.read().await.values().cloned().collect()
    }

    async fn disconnect(&self, guild_id: GuildId) {
        self.remove(guild_id).await;
    }
}

/// Periodic idle-session sweep
pub async fn run_liveness<V>(
    playback: PlaybackLifecycle,
    voice: Arc<V>,
    interval: Duration,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    V: VoiceSessions + ?Sized,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                playback.sweep_idle(voice.as_ref()).await?;
            }
            _ = cancel.cancelled() => {
                tracing::info!("Liveness sweep shutting down");
                break;
            }
        }
    }

    Ok(())
}
