use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Discord-style snowflake identifiers.
pub type GuildId = u64;
pub type ChannelId = u64;

/// Query parameters, ordered so rendered URLs are stable.
pub type QueryParams = BTreeMap<String, String>;

/// Where the audio stream of a station lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationAddress {
    pub url: String,

    #[serde(default)]
    pub params: QueryParams,
}

impl StationAddress {
    /// Stream URL with its query parameters appended.
    pub fn listen_url(&self) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(&self.url)?;
        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(self.params.iter());
        }
        Ok(url.to_string())
    }
}

/// "Now playing" metadata endpoint of a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreboardAddress {
    pub url: String,

    /// `None` means polling is explicitly disabled for this station.
    #[serde(default)]
    pub params: Option<QueryParams>,
}

/// A named internet radio station.
/// Immutable once loaded into the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    /// Unique station name, e.g. "Japan Hits"
    pub name: String,

    /// Audio stream address
    pub stream: StationAddress,

    /// Metadata endpoint; stations without one are never polled
    #[serde(default)]
    pub scoreboard: Option<ScoreboardAddress>,
}

/// Binding of a guild's text channel to the station it is playing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Station name
    pub station: String,

    /// Guild playing the station. A guild has at most one binding.
    pub guild_id: GuildId,

    /// Text channel receiving notifications
    pub channel_id: ChannelId,

    /// When playback started
    pub started_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(guild_id: GuildId, channel_id: ChannelId, station: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            guild_id,
            channel_id,
            started_at: Utc::now(),
        }
    }

    /// Same guild, channel and station. `started_at` is ignored.
    pub fn same_binding(&self, other: &ActivityRecord) -> bool {
        self.guild_id == other.guild_id
            && self.channel_id == other.channel_id
            && self.station == other.station
    }
}

/// Which of the two per-station scoreboard snapshots to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// Most recently announced value
    Last,
    /// Most recently fetched value
    Current,
}

/// Track currently playing on a station, as reported by its scoreboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicInfo {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub year: Option<String>,
    /// Normalized `mm:ss.mmm`
    pub duration: Option<String>,
    pub composer: Option<String>,
}

const UNKNOWN: &str = "Unknown";

/// The rendered text is both the notification body and the value stored in
/// scoreboard snapshots, so it must stay deterministic.
impl fmt::Display for MusicInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = |v: &Option<String>| v.as_deref().unwrap_or(UNKNOWN).to_owned();
        write!(
            f,
            "Music: {} - {}\nYear: {}\nDuration: {}\nComposer: {}",
            field(&self.artist),
            field(&self.title),
            field(&self.year),
            field(&self.duration),
            field(&self.composer),
        )
    }
}
