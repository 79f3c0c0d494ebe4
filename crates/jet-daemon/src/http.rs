//! HTTP API surface.
//!
//! Thin layer: catalog and library reads go straight to the shared
//! clients, playback commands are forwarded to the session task over its
//! channel. The one non-trivial handler is `play`, which runs the audio
//! resolution chain before handing the track to the session.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use jet_core::cache::{CacheStats, ResponseCache};
use jet_core::library::LibraryStore;
use jet_core::metadata::{ChartKind, MetadataClient, SearchKind, SearchResults};
use jet_core::model::Track;
use jet_core::resolver::AudioResolver;

use crate::session::{SessionCommand, SessionSnapshot};

#[derive(Clone)]
struct HttpState {
    session_tx: mpsc::Sender<SessionCommand>,
    metadata: Arc<MetadataClient>,
    resolver: Arc<AudioResolver>,
    library: Arc<LibraryStore>,
    cache: Arc<ResponseCache>,
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    #[serde(default = "default_kind")]
    kind: String,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_kind() -> String {
    "track".to_string()
}

fn default_limit() -> u32 {
    20
}

#[derive(Deserialize)]
struct ReorderBody {
    from: usize,
    to: usize,
}

#[derive(Deserialize)]
struct NewPlaylistBody {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Serialize)]
struct PlayReply {
    full_audio: bool,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    session_tx: mpsc::Sender<SessionCommand>,
    metadata: Arc<MetadataClient>,
    resolver: Arc<AudioResolver>,
    library: Arc<LibraryStore>,
    cache: Arc<ResponseCache>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app_state = HttpState {
            session_tx,
            metadata,
            resolver,
            library,
            cache,
        };

        let app = Router::new()
            .route("/health", get(health))
            // playback
            .route("/api/state", get(get_state))
            .route("/api/play", post(play))
            .route("/api/playpause", get(play_pause).post(play_pause))
            .route("/api/next", get(next).post(next))
            .route("/api/prev", get(prev).post(prev))
            .route("/api/stop", get(stop).post(stop))
            .route("/api/seek/:percent", get(seek).post(seek))
            .route("/api/volume/:volume", get(set_volume).post(set_volume))
            .route("/api/speed/:speed", get(set_speed).post(set_speed))
            .route("/api/shuffle", post(toggle_shuffle))
            .route("/api/repeat", post(toggle_repeat))
            // queue
            .route("/api/queue", post(queue_add).delete(queue_clear))
            .route("/api/queue/reorder", post(queue_reorder))
            // catalog
            .route("/api/search", get(search))
            .route("/api/track/:id", get(get_track))
            .route("/api/album/:id", get(get_album))
            .route("/api/artist/:id", get(get_artist))
            .route("/api/artist/:id/top", get(artist_top))
            .route("/api/artist/:id/albums", get(artist_albums))
            .route("/api/artist/:id/related", get(related_artists))
            .route("/api/chart/:kind", get(chart))
            // library
            .route("/api/library/likes", get(liked_songs).post(like))
            .route("/api/library/likes/:id", delete(unlike))
            .route(
                "/api/library/playlists",
                get(playlists).post(create_playlist),
            )
            .route(
                "/api/library/playlists/:id",
                get(get_playlist).delete(delete_playlist),
            )
            .route(
                "/api/library/playlists/:id/tracks",
                post(playlist_add_track).put(playlist_reorder),
            )
            .route(
                "/api/library/playlists/:id/tracks/:track_id",
                delete(playlist_remove_track),
            )
            .route(
                "/api/library/recent",
                get(recently_played).delete(clear_recent),
            )
            // cache
            .route("/api/cache/stats", get(cache_stats))
            .route("/api/cache", delete(cache_clear))
            .layer(CorsLayer::permissive())
            .with_state(app_state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn health() -> &'static str {
    "ok"
}

// ── playback ─────────────────────────────────────────────────────────────────

async fn get_state(State(state): State<HttpState>) -> Result<Json<SessionSnapshot>, StatusCode> {
    let (reply_tx, reply_rx) = oneshot::channel();
    if state
        .session_tx
        .send(SessionCommand::Snapshot(reply_tx))
        .await
        .is_err()
    {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    match reply_rx.await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Resolve full audio for the track, then hand it to the session. If
/// resolution fails at every stage the provider preview URL plays as-is.
async fn play(
    State(state): State<HttpState>,
    Json(mut track): Json<Track>,
) -> Result<Json<PlayReply>, StatusCode> {
    if track.audio_url.is_empty() && !track.has_full_audio {
        warn!("HTTP API: play request for '{}' has no audio URL", track.title);
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    if !track.has_full_audio {
        if let Some(resolution) = state.resolver.resolve(&track).await {
            track.audio_url = resolution.audio_url;
            track.has_full_audio = true;
        } else {
            info!(
                "HTTP API: no full audio for '{}', playing preview",
                track.title
            );
        }
    }

    let full_audio = track.has_full_audio;
    if state
        .session_tx
        .send(SessionCommand::Play(track))
        .await
        .is_err()
    {
        error!("Failed to send play command");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(PlayReply { full_audio }))
}

async fn forward(state: &HttpState, command: SessionCommand, what: &str) -> StatusCode {
    if state.session_tx.send(command).await.is_err() {
        error!("Failed to send {} command", what);
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn play_pause(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Play/pause");
    forward(&state, SessionCommand::PlayPause, "playpause").await
}

async fn next(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Next");
    forward(&state, SessionCommand::Next, "next").await
}

async fn prev(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Previous");
    forward(&state, SessionCommand::Prev, "prev").await
}

async fn stop(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Stop");
    forward(&state, SessionCommand::Stop, "stop").await
}

async fn seek(State(state): State<HttpState>, Path(percent): Path<f64>) -> StatusCode {
    info!("HTTP API: Seek to {}%", percent);
    forward(&state, SessionCommand::Seek(percent), "seek").await
}

async fn set_volume(State(state): State<HttpState>, Path(volume): Path<i32>) -> StatusCode {
    let vol = volume as f32 / 100.0;
    info!("HTTP API: Set volume to {}%", volume);
    forward(&state, SessionCommand::Volume(vol), "volume").await
}

async fn set_speed(State(state): State<HttpState>, Path(speed): Path<i32>) -> StatusCode {
    let speed = speed as f32 / 100.0;
    info!("HTTP API: Set speed to {}", speed);
    forward(&state, SessionCommand::Speed(speed), "speed").await
}

async fn toggle_shuffle(State(state): State<HttpState>) -> StatusCode {
    forward(&state, SessionCommand::ToggleShuffle, "shuffle").await
}

async fn toggle_repeat(State(state): State<HttpState>) -> StatusCode {
    forward(&state, SessionCommand::ToggleRepeat, "repeat").await
}

// ── queue ────────────────────────────────────────────────────────────────────

async fn queue_add(State(state): State<HttpState>, Json(track): Json<Track>) -> StatusCode {
    info!("HTTP API: Queue '{}'", track.title);
    forward(&state, SessionCommand::QueueAdd(track), "queue add").await
}

async fn queue_clear(State(state): State<HttpState>) -> StatusCode {
    forward(&state, SessionCommand::QueueClear, "queue clear").await
}

async fn queue_reorder(
    State(state): State<HttpState>,
    Json(body): Json<ReorderBody>,
) -> StatusCode {
    forward(
        &state,
        SessionCommand::QueueReorder {
            from: body.from,
            to: body.to,
        },
        "queue reorder",
    )
    .await
}

// ── catalog ──────────────────────────────────────────────────────────────────

async fn search(
    State(state): State<HttpState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, StatusCode> {
    let Some(kind) = SearchKind::parse(&params.kind) else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let results = state.metadata.search(&params.q, kind, params.limit).await;
    Ok(Json(results))
}

async fn get_track(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Json<Track>, StatusCode> {
    match state.metadata.track(&id).await {
        Some(track) => Ok(Json(track)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn get_album(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Json<jet_core::metadata::Album>, StatusCode> {
    match state.metadata.album(&id).await {
        Some(album) => Ok(Json(album)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn get_artist(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Json<jet_core::metadata::Artist>, StatusCode> {
    match state.metadata.artist(&id).await {
        Some(artist) => Ok(Json(artist)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn artist_top(State(state): State<HttpState>, Path(id): Path<String>) -> Json<Vec<Track>> {
    Json(state.metadata.artist_top(&id, 10).await)
}

async fn artist_albums(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Json<Vec<jet_core::metadata::AlbumSummary>> {
    Json(state.metadata.artist_albums(&id, 20).await)
}

async fn related_artists(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Json<Vec<jet_core::metadata::ArtistSummary>> {
    Json(state.metadata.related_artists(&id).await)
}

async fn chart(
    State(state): State<HttpState>,
    Path(kind): Path<String>,
) -> Result<Json<SearchResults>, StatusCode> {
    let Some(kind) = ChartKind::parse(&kind) else {
        return Err(StatusCode::BAD_REQUEST);
    };
    Ok(Json(state.metadata.chart(kind, 20).await))
}

// ── library ──────────────────────────────────────────────────────────────────

async fn liked_songs(State(state): State<HttpState>) -> Json<Vec<Track>> {
    Json(state.library.liked_songs())
}

async fn like(State(state): State<HttpState>, Json(track): Json<Track>) -> StatusCode {
    state.library.like(track);
    StatusCode::OK
}

async fn unlike(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    state.library.unlike(&id);
    StatusCode::OK
}

async fn playlists(State(state): State<HttpState>) -> Json<Vec<jet_core::model::Playlist>> {
    Json(state.library.playlists())
}

async fn create_playlist(
    State(state): State<HttpState>,
    Json(body): Json<NewPlaylistBody>,
) -> Result<Json<jet_core::model::Playlist>, StatusCode> {
    if body.name.trim().is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    Ok(Json(
        state.library.create_playlist(&body.name, &body.description),
    ))
}

async fn get_playlist(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Json<jet_core::model::Playlist>, StatusCode> {
    match state.library.playlist(&id) {
        Some(playlist) => Ok(Json(playlist)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn delete_playlist(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    state.library.delete_playlist(&id);
    StatusCode::OK
}

async fn playlist_add_track(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Json(track): Json<Track>,
) -> StatusCode {
    state.library.add_track(&id, track);
    StatusCode::OK
}

async fn playlist_reorder(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Json(tracks): Json<Vec<Track>>,
) -> StatusCode {
    state.library.reorder(&id, tracks);
    StatusCode::OK
}

async fn playlist_remove_track(
    State(state): State<HttpState>,
    Path((id, track_id)): Path<(String, String)>,
) -> StatusCode {
    state.library.remove_track(&id, &track_id);
    StatusCode::OK
}

async fn recently_played(State(state): State<HttpState>) -> Json<Vec<Track>> {
    Json(state.library.recently_played())
}

async fn clear_recent(State(state): State<HttpState>) -> StatusCode {
    state.library.clear_recently_played();
    StatusCode::OK
}

// ── cache ────────────────────────────────────────────────────────────────────

async fn cache_stats(State(state): State<HttpState>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

#[derive(Serialize)]
struct CacheCleared {
    cleared: usize,
}

async fn cache_clear(State(state): State<HttpState>) -> Json<CacheCleared> {
    let cleared = state.cache.clear_all();
    info!("HTTP API: cleared {} cache entries", cleared);
    Json(CacheCleared { cleared })
}
