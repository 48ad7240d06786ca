/// Query parameter carrying the cache-busting timestamp on scoreboard requests
pub const CACHE_BUST_PARAM: &str = "_";

/// Scoreboard response field holding the currently playing track
pub const SCOREBOARD_PAYLOAD_FIELD: &str = "m_Item2";

/// Scoreboard track fields
pub const FIELD_ARTIST: &str = "Artist";
pub const FIELD_TITLE: &str = "Title";
pub const FIELD_YEAR: &str = "Year";
pub const FIELD_DURATION: &str = "Duration";
pub const FIELD_COMPOSER: &str = "Composer";

/// Display value for an unparseable track duration
pub const FALLBACK_DURATION: &str = "00:00.000";

/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Text delivered to a channel when its station changes track.
pub fn notification_text(station: &str, data: &str) -> String {
    format!("Radio: {}\n{}", station, data)
}
