use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shared::protocol::API_PREFIX;
use shared::types::{ActivityRecord, ChannelId, GuildId, SnapshotKind, Station};
use crate::catalog::StationCatalog;
use crate::playback::{PlaybackError, PlaybackLifecycle, PlaybackStarted, VoiceMember, VoiceRegistry, VoiceSession};
use crate::store_manager::StoreHandle;

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub catalog: Arc<StationCatalog>,
    pub playback: PlaybackLifecycle,
    pub voice: Arc<VoiceRegistry>,
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub channel_id: ChannelId,
    pub station: String,
}

#[derive(Deserialize)]
pub struct VoiceUpdate {
    pub channel_id: ChannelId,
    #[serde(default)]
    pub members: Vec<VoiceMember>,
}

#[derive(Serialize)]
pub struct SilenceResponse {
    pub silenced: bool,
}

#[derive(Serialize)]
pub struct SnapshotResponse {
    pub station: String,
    pub last: Option<String>,
    pub current: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/stations", get(get_stations))
        .route("/activity", get(get_activity))
        .route("/guilds/:guild/playback", put(start_playback).delete(stop_playback))
        .route("/guilds/:guild/silence", put(silence_on).delete(silence_off))
        .route("/guilds/:guild/voice", get(get_voice).put(update_voice))
        .route("/snapshots/:station", get(get_snapshots).delete(reset_snapshots));

    Router::new().nest(API_PREFIX, v1).with_state(state)
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    tracing::error!("Store request failed: {:#}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn get_stations(State(state): State<AppState>) -> Json<Vec<Station>> {
    Json(state.catalog.iter().cloned().collect())
}

async fn get_activity(
    State(state): State<AppState>,
) -> Result<Json<Vec<ActivityRecord>>, StatusCode> {
    state.store.list_activity().await.map(Json).map_err(internal_error)
}

async fn start_playback(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
    Json(req): Json<StartRequest>,
) -> Result<Json<PlaybackStarted>, (StatusCode, String)> {
    state
        .playback
        .start(guild, req.channel_id, &req.station)
        .await
        .map(Json)
        .map_err(|e| match e {
            PlaybackError::UnknownStation(_) => (StatusCode::NOT_FOUND, e.to_string()),
            PlaybackError::InvalidStream(..) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            PlaybackError::Store(e) => (internal_error(e), String::new()),
        })
}

async fn stop_playback(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> Result<StatusCode, StatusCode> {
    state.voice.remove(guild).await;
    let stopped = state.playback.stop(guild).await.map_err(internal_error)?;
    Ok(if stopped { StatusCode::NO_CONTENT } else { StatusCode::NOT_FOUND })
}

async fn silence_on(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> Result<Json<SilenceResponse>, StatusCode> {
    state.store.set_silenced(guild).await.map_err(internal_error)?;
    tracing::info!("Guild {} silenced notifications", guild);
    Ok(Json(SilenceResponse { silenced: true }))
}

async fn silence_off(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> Result<Json<SilenceResponse>, StatusCode> {
    state.store.clear_silenced(guild).await.map_err(internal_error)?;
    tracing::info!("Guild {} resumed notifications", guild);
    Ok(Json(SilenceResponse { silenced: false }))
}

async fn update_voice(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
    Json(update): Json<VoiceUpdate>,
) -> StatusCode {
    state
        .voice
        .update(VoiceSession {
            guild_id: guild,
            channel_id: update.channel_id,
            members: update.members,
        })
        .await;
    StatusCode::NO_CONTENT
}

async fn get_voice(
    State(state): State<AppState>,
    Path(guild): Path<GuildId>,
) -> Result<Json<VoiceSession>, StatusCode> {
    state.voice.get(guild).await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn get_snapshots(
    State(state): State<AppState>,
    Path(station): Path<String>,
) -> Result<Json<SnapshotResponse>, StatusCode> {
    if state.catalog.get(&station).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    let last = state
        .store
        .get_snapshot(SnapshotKind::Last, station.clone())
        .await
        .map_err(internal_error)?;
    let current = state
        .store
        .get_snapshot(SnapshotKind::Current, station.clone())
        .await
        .map_err(internal_error)?;

    Ok(Json(SnapshotResponse { station, last, current }))
}

/// Forget both snapshots, so the next fetch is announced even if unchanged.
async fn reset_snapshots(
    State(state): State<AppState>,
    Path(station): Path<String>,
) -> Result<StatusCode, StatusCode> {
    if state.catalog.get(&station).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    for kind in [SnapshotKind::Last, SnapshotKind::Current] {
        state
            .store
            .clear_snapshot(kind, station.clone())
            .await
            .map_err(internal_error)?;
    }

    tracing::info!("Reset scoreboard snapshots of {}", station);
    Ok(StatusCode::NO_CONTENT)
}
