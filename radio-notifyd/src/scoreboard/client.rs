//! HTTP client for station scoreboards

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use shared::protocol::{
    CACHE_BUST_PARAM, FIELD_ARTIST, FIELD_COMPOSER, FIELD_DURATION, FIELD_TITLE, FIELD_YEAR,
    SCOREBOARD_PAYLOAD_FIELD,
};
use shared::types::{MusicInfo, QueryParams, ScoreboardAddress};
use url::Url;
use super::duration::normalize_duration;
use super::error::{Result, ScoreboardError};
use super::NowPlayingSource;

/// Fetches "now playing" records from station scoreboards.
///
/// Every request carries a fresh `_=<epoch seconds>` parameter, without it
/// the upstream keeps serving stale responses.
#[derive(Debug, Clone)]
pub struct ScoreboardClient {
    client: Client,
    headers: HeaderMap,
    timeout: Duration,
}

impl ScoreboardClient {
    /// Share a connection pool with other components
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            headers: HeaderMap::new(),
            timeout,
        }
    }

    /// Headers sent with every scoreboard request
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Load request headers from a JSON object file, e.g.
    /// `{"User-Agent": "...", "Referer": "..."}`.
    pub fn load_headers(path: impl AsRef<Path>) -> anyhow::Result<HeaderMap> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read headers file: {}", path.display()))?;
        let raw: HashMap<String, String> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse headers file: {}", path.display()))?;

        let mut headers = HeaderMap::with_capacity(raw.len());
        for (name, value) in raw {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name: {}", name))?;
            let header_value = HeaderValue::from_str(&value)
                .with_context(|| format!("Invalid value for header {}", name))?;
            headers.insert(header_name, header_value);
        }

        Ok(headers)
    }

    /// Fetch and parse one scoreboard response
    pub async fn try_fetch(&self, url: &str, params: &QueryParams) -> Result<MusicInfo> {
        let mut url = Url::parse(url)?;
        url.query_pairs_mut().extend_pairs(cache_busted(params).iter());

        tracing::trace!("Fetching scoreboard: {}", url);

        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ScoreboardError::Status(response.status()));
        }

        let body = response.text().await?;
        parse_payload(&body)
    }
}

#[async_trait]
impl NowPlayingSource for ScoreboardClient {
    async fn fetch(&self, address: Option<&ScoreboardAddress>) -> Option<MusicInfo> {
        let address = address?;
        // Scoreboard present but without params: polling disabled
        let params = address.params.as_ref()?;

        match self.try_fetch(&address.url, params).await {
            Ok(info) => Some(info),
            Err(e) if e.is_transient() => {
                tracing::debug!("Scoreboard {} unavailable: {}", address.url, e);
                None
            }
            Err(e) => {
                tracing::warn!("Scoreboard {} is unusable: {}", address.url, e);
                None
            }
        }
    }
}

/// Copy of `params` with the cache-busting timestamp set
fn cache_busted(params: &QueryParams) -> QueryParams {
    let mut params = params.clone();
    params.insert(CACHE_BUST_PARAM.to_string(), Utc::now().timestamp().to_string());
    params
}

/// Extract the current track from a scoreboard response body
pub fn parse_payload(body: &str) -> Result<MusicInfo> {
    let content: Value = serde_json::from_str(body)?;

    let track = match content.get(SCOREBOARD_PAYLOAD_FIELD) {
        None | Some(Value::Null) => {
            return Err(ScoreboardError::MissingPayload(SCOREBOARD_PAYLOAD_FIELD))
        }
        Some(Value::Object(track)) if !track.is_empty() => track,
        Some(other) => {
            return Err(ScoreboardError::unexpected(format!(
                "{} is not a track: {}",
                SCOREBOARD_PAYLOAD_FIELD, other
            )))
        }
    };

    let field = |name: &str| -> Result<Option<String>> {
        match track.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(ScoreboardError::unexpected(format!(
                "{} has unexpected value {}",
                name, other
            ))),
        }
    };

    Ok(MusicInfo {
        artist: field(FIELD_ARTIST)?,
        title: field(FIELD_TITLE)?,
        year: field(FIELD_YEAR)?,
        duration: field(FIELD_DURATION)?.map(|d| normalize_duration(&d)),
        composer: field(FIELD_COMPOSER)?,
    })
}
