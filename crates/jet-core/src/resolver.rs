//! Full-length audio resolution via a secondary video search source.
//!
//! Order is strict: cached resolution, then the credentialed primary
//! search API, then each public mirror in configured order, then give up.
//! Resolution is expensive and the artist/title to video-id association
//! is durable, so successes are cached for a long TTL (24 h default).
//!
//! Nothing here returns an error: every call site has a guaranteed
//! fallback (the provider's ~30 s preview URL), so failures are logged
//! and converted to `None`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::config::ResolverConfig;
use crate::model::Track;

/// A successful track-id → video-id mapping plus the derived playable URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioResolution {
    pub track_id: String,
    pub video_id: String,
    pub audio_url: String,
    pub resolved_at_ms: i64,
}

pub struct AudioResolver {
    http: reqwest::Client,
    config: ResolverConfig,
    cache: Arc<ResponseCache>,
}

impl AudioResolver {
    pub fn new(config: ResolverConfig, cache: Arc<ResponseCache>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            cache,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.config
            .api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }

    fn mirror_timeout(&self) -> Duration {
        Duration::from_secs(self.config.mirror_timeout_secs)
    }

    fn resolution_ttl(&self) -> Duration {
        Duration::from_secs(self.config.resolution_ttl_secs)
    }

    /// Resolve the best available full-length URL for `track`.
    /// `None` means the caller must keep the preview URL.
    pub async fn resolve(&self, track: &Track) -> Option<AudioResolution> {
        let key = cache_key(&track.id);
        if let Some(hit) = self.cache.get::<AudioResolution>(&key) {
            debug!("resolver: cached resolution for track {}", track.id);
            return Some(hit);
        }

        let query = format!("{} {} official audio", track.artist, track.title);

        let mut video_id = None;
        if self.has_credential() {
            video_id = self.search_primary(&query).await;
        }
        if video_id.is_none() {
            video_id = self.search_mirrors(&query).await;
        }

        let video_id = video_id?;
        let resolution = AudioResolution {
            track_id: track.id.clone(),
            audio_url: watch_url(&video_id),
            video_id,
            resolved_at_ms: crate::cache::now_ms(),
        };
        self.cache
            .set_with_ttl(&key, &resolution, self.resolution_ttl());
        info!(
            "resolver: track {} -> video {}",
            track.id, resolution.video_id
        );
        Some(resolution)
    }

    /// Credentialed search endpoint: one top result from the music
    /// category. Any failure falls through to the mirrors.
    async fn search_primary(&self, query: &str) -> Option<String> {
        let url = format!("{}/search", self.config.api_base);
        let key = self.config.api_key.as_deref().unwrap_or_default();

        let response = match self
            .http
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("type", "video"),
                ("videoCategoryId", "10"),
                ("maxResults", "1"),
                ("key", key),
            ])
            .timeout(self.mirror_timeout())
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("resolver: primary search failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                "resolver: primary search returned status {}",
                response.status()
            );
            return None;
        }

        let body: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!("resolver: primary search body unreadable: {}", e);
                return None;
            }
        };

        // The API reports quota/key problems inside a 200 body.
        if let Some(err) = body.get("error") {
            warn!("resolver: primary search declared error: {}", err);
            return None;
        }

        let video_id = body["items"][0]["id"]["videoId"].as_str()?.to_string();
        debug!("resolver: primary search hit {}", video_id);
        Some(video_id)
    }

    /// Unauthenticated mirror search, sequential with a hard per-attempt
    /// timeout. Sequential on purpose: racing all mirrors would multiply
    /// load on public infrastructure.
    async fn search_mirrors(&self, query: &str) -> Option<String> {
        for instance in &self.config.mirrors {
            let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
            let target = format!("{}/api/v1/search?q={}&type=video&page=1", instance, encoded);
            let request_url = match &self.config.relay_url {
                Some(relay) => {
                    let wrapped: String =
                        url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
                    format!("{}{}", relay, wrapped)
                }
                None => target,
            };

            let response = match self
                .http
                .get(&request_url)
                .timeout(self.mirror_timeout())
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("resolver: mirror {} failed: {}", instance, e);
                    continue;
                }
            };

            if !response.status().is_success() {
                warn!(
                    "resolver: mirror {} returned status {}",
                    instance,
                    response.status()
                );
                continue;
            }

            let results: Vec<serde_json::Value> = match response.json().await {
                Ok(v) => v,
                Err(e) => {
                    warn!("resolver: mirror {} body unreadable: {}", instance, e);
                    continue;
                }
            };

            if let Some(video_id) = results
                .first()
                .and_then(|r| r["videoId"].as_str())
                .map(str::to_string)
            {
                debug!("resolver: mirror {} hit {}", instance, video_id);
                return Some(video_id);
            }
            warn!("resolver: mirror {} returned no results", instance);
        }

        warn!("resolver: all mirrors exhausted for '{}'", query);
        None
    }
}

fn cache_key(track_id: &str) -> String {
    format!("audio_{}", track_id)
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

pub fn embed_url(video_id: &str) -> String {
    format!(
        "https://www.youtube.com/embed/{}?autoplay=1&enablejsapi=1",
        video_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_helpers() {
        assert_eq!(
            watch_url("dQw4w9WgXcQ"),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert!(embed_url("abc").starts_with("https://www.youtube.com/embed/abc?"));
    }

    #[test]
    fn test_cache_key_is_track_scoped() {
        assert_eq!(cache_key("3135556"), "audio_3135556");
        assert_ne!(cache_key("1"), cache_key("2"));
    }
}
