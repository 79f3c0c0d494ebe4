//! Catalog metadata client (Deezer-compatible API surface).
//!
//! Every lookup consults the response cache under a deterministic key
//! before touching the network, and every failure degrades to an empty
//! result instead of an error: callers treat absence as "unavailable".

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::cache::ResponseCache;
use crate::config::MetadataConfig;
use crate::model::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Track,
    Album,
    Artist,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Track => "track",
            SearchKind::Album => "album",
            SearchKind::Artist => "artist",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "track" => Some(SearchKind::Track),
            "album" => Some(SearchKind::Album),
            "artist" => Some(SearchKind::Artist),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Tracks,
    Albums,
    Artists,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Tracks => "tracks",
            ChartKind::Albums => "albums",
            ChartKind::Artists => "artists",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tracks" => Some(ChartKind::Tracks),
            "albums" => Some(ChartKind::Albums),
            "artists" => Some(ChartKind::Artists),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "lowercase")]
pub enum SearchResults {
    Tracks(Vec<Track>),
    Albums(Vec<AlbumSummary>),
    Artists(Vec<ArtistSummary>),
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        match self {
            SearchResults::Tracks(v) => v.is_empty(),
            SearchResults::Albums(v) => v.is_empty(),
            SearchResults::Artists(v) => v.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumSummary {
    pub id: String,
    pub title: String,
    pub cover_image: String,
    pub artist_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub cover_image: String,
    pub release_date: String,
    pub artist_name: String,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistSummary {
    pub id: String,
    pub name: String,
    pub picture: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub picture: String,
    pub picture_xl: String,
    pub fans: u64,
}

// ── provider wire shapes ──────────────────────────────────────────────────────

/// List responses arrive as `{ "data": [...] }`.
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    id: u64,
    title: String,
    #[serde(default)]
    duration: u32,
    #[serde(default)]
    preview: String,
    artist: ApiTrackArtist,
    #[serde(default)]
    album: Option<ApiTrackAlbum>,
}

#[derive(Debug, Deserialize)]
struct ApiTrackArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiTrackAlbum {
    title: String,
    #[serde(default)]
    cover_medium: String,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    id: u64,
    title: String,
    #[serde(default)]
    cover_medium: String,
    #[serde(default)]
    release_date: String,
    artist: ApiTrackArtist,
    #[serde(default)]
    tracks: Option<DataEnvelope<ApiTrack>>,
}

#[derive(Debug, Deserialize)]
struct ApiAlbumSummary {
    id: u64,
    title: String,
    #[serde(default)]
    cover_medium: String,
    #[serde(default)]
    artist: Option<ApiTrackArtist>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    id: u64,
    name: String,
    #[serde(default)]
    picture_medium: String,
    #[serde(default)]
    picture_xl: String,
    #[serde(default)]
    nb_fan: u64,
}

impl ApiTrack {
    fn into_track(self) -> Track {
        let (album_title, cover_image) = match self.album {
            Some(a) => (a.title, a.cover_medium),
            None => (String::new(), String::new()),
        };
        Track {
            id: self.id.to_string(),
            title: self.title,
            artist: self.artist.name,
            album_title,
            cover_image,
            duration_secs: self.duration,
            audio_url: self.preview,
            has_full_audio: false,
        }
    }

    /// Album track listings omit the album object; fill it from the parent.
    fn into_album_track(self, album_title: &str, cover_image: &str) -> Track {
        let mut track = self.into_track();
        if track.album_title.is_empty() {
            track.album_title = album_title.to_string();
        }
        if track.cover_image.is_empty() {
            track.cover_image = cover_image.to_string();
        }
        track
    }
}

impl ApiAlbumSummary {
    fn into_summary(self) -> AlbumSummary {
        AlbumSummary {
            id: self.id.to_string(),
            title: self.title,
            cover_image: self.cover_medium,
            artist_name: self.artist.map(|a| a.name).unwrap_or_default(),
        }
    }
}

impl ApiArtist {
    fn into_summary(self) -> ArtistSummary {
        ArtistSummary {
            id: self.id.to_string(),
            name: self.name,
            picture: self.picture_medium,
        }
    }

    fn into_artist(self) -> Artist {
        Artist {
            id: self.id.to_string(),
            name: self.name,
            picture: self.picture_medium,
            picture_xl: self.picture_xl,
            fans: self.nb_fan,
        }
    }
}

// ── client ────────────────────────────────────────────────────────────────────

pub struct MetadataClient {
    http: reqwest::Client,
    config: MetadataConfig,
    cache: Arc<ResponseCache>,
}

impl MetadataClient {
    pub fn new(config: MetadataConfig, cache: Arc<ResponseCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, config, cache }
    }

    fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.config.search_ttl_secs)
    }

    fn entity_ttl(&self) -> Duration {
        Duration::from_secs(self.config.entity_ttl_secs)
    }

    /// Final request URL for a provider endpoint, routed through the
    /// CORS relay when one is configured.
    fn request_url(&self, endpoint: &str) -> String {
        let full = format!("{}{}", self.config.api_base, endpoint);
        match &self.config.relay_url {
            Some(relay) => {
                let encoded: String = url::form_urlencoded::byte_serialize(full.as_bytes()).collect();
                format!("{}{}", relay, encoded)
            }
            None => full,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, endpoint: &str) -> anyhow::Result<T> {
        let response = self.http.get(self.request_url(endpoint)).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("provider returned status {}", response.status());
        }
        Ok(response.json().await?)
    }

    // ── search ───────────────────────────────────────────────────────────────

    pub async fn search(&self, query: &str, kind: SearchKind, limit: u32) -> SearchResults {
        match kind {
            SearchKind::Track => SearchResults::Tracks(self.search_tracks(query, limit).await),
            SearchKind::Album => SearchResults::Albums(self.search_albums(query, limit).await),
            SearchKind::Artist => SearchResults::Artists(self.search_artists(query, limit).await),
        }
    }

    pub async fn search_tracks(&self, query: &str, limit: u32) -> Vec<Track> {
        let key = format!("search_track_{}_{}", query, limit);
        if let Some(hit) = self.cache.get::<Vec<Track>>(&key) {
            return hit;
        }
        let endpoint = format!("/search/track?q={}&limit={}", encode(query), limit);
        match self.fetch::<DataEnvelope<ApiTrack>>(&endpoint).await {
            Ok(envelope) => {
                let tracks: Vec<Track> =
                    envelope.data.into_iter().map(ApiTrack::into_track).collect();
                self.cache.set_with_ttl(&key, &tracks, self.search_ttl());
                tracks
            }
            Err(e) => {
                warn!("metadata: track search '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }

    pub async fn search_albums(&self, query: &str, limit: u32) -> Vec<AlbumSummary> {
        let key = format!("search_album_{}_{}", query, limit);
        if let Some(hit) = self.cache.get::<Vec<AlbumSummary>>(&key) {
            return hit;
        }
        let endpoint = format!("/search/album?q={}&limit={}", encode(query), limit);
        match self.fetch::<DataEnvelope<ApiAlbumSummary>>(&endpoint).await {
            Ok(envelope) => {
                let albums: Vec<AlbumSummary> = envelope
                    .data
                    .into_iter()
                    .map(ApiAlbumSummary::into_summary)
                    .collect();
                self.cache.set_with_ttl(&key, &albums, self.search_ttl());
                albums
            }
            Err(e) => {
                warn!("metadata: album search '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }

    pub async fn search_artists(&self, query: &str, limit: u32) -> Vec<ArtistSummary> {
        let key = format!("search_artist_{}_{}", query, limit);
        if let Some(hit) = self.cache.get::<Vec<ArtistSummary>>(&key) {
            return hit;
        }
        let endpoint = format!("/search/artist?q={}&limit={}", encode(query), limit);
        match self.fetch::<DataEnvelope<ApiArtist>>(&endpoint).await {
            Ok(envelope) => {
                let artists: Vec<ArtistSummary> = envelope
                    .data
                    .into_iter()
                    .map(ApiArtist::into_summary)
                    .collect();
                self.cache.set_with_ttl(&key, &artists, self.search_ttl());
                artists
            }
            Err(e) => {
                warn!("metadata: artist search '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }

    // ── entity lookups ───────────────────────────────────────────────────────

    pub async fn track(&self, id: &str) -> Option<Track> {
        let key = format!("track_{}", id);
        if let Some(hit) = self.cache.get::<Track>(&key) {
            return Some(hit);
        }
        match self.fetch::<ApiTrack>(&format!("/track/{}", id)).await {
            Ok(api) => {
                let track = api.into_track();
                self.cache.set_with_ttl(&key, &track, self.entity_ttl());
                Some(track)
            }
            Err(e) => {
                warn!("metadata: track {} lookup failed: {}", id, e);
                None
            }
        }
    }

    pub async fn album(&self, id: &str) -> Option<Album> {
        let key = format!("album_{}", id);
        if let Some(hit) = self.cache.get::<Album>(&key) {
            return Some(hit);
        }
        match self.fetch::<ApiAlbum>(&format!("/album/{}", id)).await {
            Ok(api) => {
                let tracks = api
                    .tracks
                    .map(|env| {
                        env.data
                            .into_iter()
                            .map(|t| t.into_album_track(&api.title, &api.cover_medium))
                            .collect()
                    })
                    .unwrap_or_default();
                let album = Album {
                    id: api.id.to_string(),
                    title: api.title,
                    cover_image: api.cover_medium,
                    release_date: api.release_date,
                    artist_name: api.artist.name,
                    tracks,
                };
                self.cache.set_with_ttl(&key, &album, self.entity_ttl());
                Some(album)
            }
            Err(e) => {
                warn!("metadata: album {} lookup failed: {}", id, e);
                None
            }
        }
    }

    pub async fn artist(&self, id: &str) -> Option<Artist> {
        let key = format!("artist_{}", id);
        if let Some(hit) = self.cache.get::<Artist>(&key) {
            return Some(hit);
        }
        match self.fetch::<ApiArtist>(&format!("/artist/{}", id)).await {
            Ok(api) => {
                let artist = api.into_artist();
                self.cache.set_with_ttl(&key, &artist, self.entity_ttl());
                Some(artist)
            }
            Err(e) => {
                warn!("metadata: artist {} lookup failed: {}", id, e);
                None
            }
        }
    }

    pub async fn artist_top(&self, id: &str, limit: u32) -> Vec<Track> {
        let key = format!("artist_top_{}_{}", id, limit);
        if let Some(hit) = self.cache.get::<Vec<Track>>(&key) {
            return hit;
        }
        let endpoint = format!("/artist/{}/top?limit={}", id, limit);
        match self.fetch::<DataEnvelope<ApiTrack>>(&endpoint).await {
            Ok(envelope) => {
                let tracks: Vec<Track> =
                    envelope.data.into_iter().map(ApiTrack::into_track).collect();
                self.cache.set_with_ttl(&key, &tracks, self.search_ttl());
                tracks
            }
            Err(e) => {
                warn!("metadata: artist {} top tracks failed: {}", id, e);
                Vec::new()
            }
        }
    }

    pub async fn artist_albums(&self, id: &str, limit: u32) -> Vec<AlbumSummary> {
        let key = format!("artist_albums_{}_{}", id, limit);
        if let Some(hit) = self.cache.get::<Vec<AlbumSummary>>(&key) {
            return hit;
        }
        let endpoint = format!("/artist/{}/albums?limit={}", id, limit);
        match self.fetch::<DataEnvelope<ApiAlbumSummary>>(&endpoint).await {
            Ok(envelope) => {
                let albums: Vec<AlbumSummary> = envelope
                    .data
                    .into_iter()
                    .map(ApiAlbumSummary::into_summary)
                    .collect();
                self.cache.set_with_ttl(&key, &albums, self.search_ttl());
                albums
            }
            Err(e) => {
                warn!("metadata: artist {} albums failed: {}", id, e);
                Vec::new()
            }
        }
    }

    pub async fn related_artists(&self, id: &str) -> Vec<ArtistSummary> {
        let key = format!("related_artists_{}", id);
        if let Some(hit) = self.cache.get::<Vec<ArtistSummary>>(&key) {
            return hit;
        }
        let endpoint = format!("/artist/{}/related?limit=10", id);
        match self.fetch::<DataEnvelope<ApiArtist>>(&endpoint).await {
            Ok(envelope) => {
                let artists: Vec<ArtistSummary> = envelope
                    .data
                    .into_iter()
                    .map(ApiArtist::into_summary)
                    .collect();
                self.cache.set_with_ttl(&key, &artists, self.search_ttl());
                artists
            }
            Err(e) => {
                warn!("metadata: related artists for {} failed: {}", id, e);
                Vec::new()
            }
        }
    }

    // ── charts ───────────────────────────────────────────────────────────────

    pub async fn chart(&self, kind: ChartKind, limit: u32) -> SearchResults {
        match kind {
            ChartKind::Tracks => SearchResults::Tracks(self.chart_tracks(limit).await),
            ChartKind::Albums => SearchResults::Albums(self.chart_albums(limit).await),
            ChartKind::Artists => SearchResults::Artists(self.chart_artists(limit).await),
        }
    }

    pub async fn chart_tracks(&self, limit: u32) -> Vec<Track> {
        let key = format!("chart_tracks_{}", limit);
        if let Some(hit) = self.cache.get::<Vec<Track>>(&key) {
            return hit;
        }
        let endpoint = format!("/chart/0/tracks?limit={}", limit);
        match self.fetch::<DataEnvelope<ApiTrack>>(&endpoint).await {
            Ok(envelope) => {
                let tracks: Vec<Track> =
                    envelope.data.into_iter().map(ApiTrack::into_track).collect();
                self.cache.set_with_ttl(&key, &tracks, self.entity_ttl());
                tracks
            }
            Err(e) => {
                warn!("metadata: chart tracks failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn chart_albums(&self, limit: u32) -> Vec<AlbumSummary> {
        let key = format!("chart_albums_{}", limit);
        if let Some(hit) = self.cache.get::<Vec<AlbumSummary>>(&key) {
            return hit;
        }
        let endpoint = format!("/chart/0/albums?limit={}", limit);
        match self.fetch::<DataEnvelope<ApiAlbumSummary>>(&endpoint).await {
            Ok(envelope) => {
                let albums: Vec<AlbumSummary> = envelope
                    .data
                    .into_iter()
                    .map(ApiAlbumSummary::into_summary)
                    .collect();
                self.cache.set_with_ttl(&key, &albums, self.entity_ttl());
                albums
            }
            Err(e) => {
                warn!("metadata: chart albums failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn chart_artists(&self, limit: u32) -> Vec<ArtistSummary> {
        let key = format!("chart_artists_{}", limit);
        if let Some(hit) = self.cache.get::<Vec<ArtistSummary>>(&key) {
            return hit;
        }
        let endpoint = format!("/chart/0/artists?limit={}", limit);
        match self.fetch::<DataEnvelope<ApiArtist>>(&endpoint).await {
            Ok(envelope) => {
                let artists: Vec<ArtistSummary> = envelope
                    .data
                    .into_iter()
                    .map(ApiArtist::into_summary)
                    .collect();
                self.cache.set_with_ttl(&key, &artists, self.entity_ttl());
                artists
            }
            Err(e) => {
                warn!("metadata: chart artists failed: {}", e);
                Vec::new()
            }
        }
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_transform() {
        let api: ApiTrack = serde_json::from_value(serde_json::json!({
            "id": 3135556,
            "title": "Harder, Better, Faster, Stronger",
            "duration": 224,
            "preview": "https://cdn.example/preview/3135556.mp3",
            "artist": { "name": "Daft Punk" },
            "album": { "title": "Discovery", "cover_medium": "https://cdn.example/cover.jpg" }
        }))
        .unwrap();
        let track = api.into_track();
        assert_eq!(track.id, "3135556");
        assert_eq!(track.artist, "Daft Punk");
        assert_eq!(track.album_title, "Discovery");
        assert_eq!(track.duration_secs, 224);
        assert!(track.audio_url.contains("preview"));
        assert!(!track.has_full_audio);
    }

    #[test]
    fn test_album_track_inherits_parent_cover() {
        let api: ApiTrack = serde_json::from_value(serde_json::json!({
            "id": 1,
            "title": "One More Time",
            "duration": 320,
            "preview": "https://cdn.example/p.mp3",
            "artist": { "name": "Daft Punk" }
        }))
        .unwrap();
        let track = api.into_album_track("Discovery", "https://cdn.example/cover.jpg");
        assert_eq!(track.album_title, "Discovery");
        assert_eq!(track.cover_image, "https://cdn.example/cover.jpg");
    }

    #[test]
    fn test_envelope_tolerates_missing_data() {
        let envelope: DataEnvelope<ApiArtist> = serde_json::from_str("{}").unwrap();
        assert!(envelope.data.is_empty());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(SearchKind::parse("track"), Some(SearchKind::Track));
        assert_eq!(SearchKind::parse("podcast"), None);
        assert_eq!(ChartKind::parse("albums"), Some(ChartKind::Albums));
    }
}
