//! Resolution-chain behavior against local mock servers: primary API
//! first when a credential exists, mirrors in configured order, cache
//! short-circuits repeat lookups.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{response::Json, routing::get, Router};
use tempfile::TempDir;

use jet_core::cache::ResponseCache;
use jet_core::config::ResolverConfig;
use jet_core::model::Track;
use jet_core::resolver::AudioResolver;

/// Serve `router` on an ephemeral local port, returning the base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Invidious-shaped mirror: `/api/v1/search` returning a fixed result
/// list, counting hits.
async fn mirror(results: serde_json::Value, hits: Arc<AtomicUsize>) -> String {
    let router = Router::new().route(
        "/api/v1/search",
        get(move || {
            let results = results.clone();
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(results)
            }
        }),
    );
    serve(router).await
}

/// Credentialed-API-shaped server: `/search` returning the given body,
/// counting hits.
async fn primary(body: serde_json::Value, hits: Arc<AtomicUsize>) -> String {
    let router = Router::new().route(
        "/search",
        get(move || {
            let body = body.clone();
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(body)
            }
        }),
    );
    serve(router).await
}

fn track() -> Track {
    Track {
        id: "3135556".to_string(),
        title: "Harder, Better, Faster, Stronger".to_string(),
        artist: "Daft Punk".to_string(),
        audio_url: "https://cdn.example/preview.mp3".to_string(),
        ..Track::default()
    }
}

fn resolver(config: ResolverConfig) -> (TempDir, AudioResolver) {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(ResponseCache::new(dir.path(), Duration::from_secs(60)));
    (dir, AudioResolver::new(config, cache))
}

fn mirror_only_config(mirrors: Vec<String>) -> ResolverConfig {
    ResolverConfig {
        api_key: None,
        mirrors,
        mirror_timeout_secs: 2,
        resolution_ttl_secs: 3600,
        ..ResolverConfig::default()
    }
}

#[tokio::test]
async fn mirrors_are_tried_in_configured_order() {
    let first_hits = Arc::new(AtomicUsize::new(0));
    let second_hits = Arc::new(AtomicUsize::new(0));
    let third_hits = Arc::new(AtomicUsize::new(0));

    // First mirror has nothing, second has the answer, third must never
    // be reached.
    let first = mirror(serde_json::json!([]), Arc::clone(&first_hits)).await;
    let second = mirror(
        serde_json::json!([{ "videoId": "vid-from-second" }]),
        Arc::clone(&second_hits),
    )
    .await;
    let third = mirror(
        serde_json::json!([{ "videoId": "vid-from-third" }]),
        Arc::clone(&third_hits),
    )
    .await;

    let (_dir, resolver) = resolver(mirror_only_config(vec![first, second, third]));
    let resolution = resolver.resolve(&track()).await.unwrap();

    assert_eq!(resolution.video_id, "vid-from-second");
    assert!(resolution.audio_url.contains("vid-from-second"));
    assert_eq!(first_hits.load(Ordering::SeqCst), 1);
    assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    assert_eq!(third_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn primary_error_body_falls_back_to_mirrors() {
    let primary_hits = Arc::new(AtomicUsize::new(0));
    let mirror_hits = Arc::new(AtomicUsize::new(0));

    // Quota problems arrive inside a 200 response.
    let primary_url = primary(
        serde_json::json!({ "error": { "code": 403, "message": "quotaExceeded" } }),
        Arc::clone(&primary_hits),
    )
    .await;
    let mirror_url = mirror(
        serde_json::json!([{ "videoId": "vid-from-mirror" }]),
        Arc::clone(&mirror_hits),
    )
    .await;

    let config = ResolverConfig {
        api_key: Some("test-key".to_string()),
        api_base: primary_url,
        mirrors: vec![mirror_url],
        mirror_timeout_secs: 2,
        resolution_ttl_secs: 3600,
        ..ResolverConfig::default()
    };
    let (_dir, resolver) = resolver(config);
    let resolution = resolver.resolve(&track()).await.unwrap();

    assert_eq!(resolution.video_id, "vid-from-mirror");
    assert_eq!(primary_hits.load(Ordering::SeqCst), 1);
    assert_eq!(mirror_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn primary_success_skips_mirrors() {
    let primary_hits = Arc::new(AtomicUsize::new(0));
    let mirror_hits = Arc::new(AtomicUsize::new(0));

    let primary_url = primary(
        serde_json::json!({ "items": [{ "id": { "videoId": "vid-from-primary" } }] }),
        Arc::clone(&primary_hits),
    )
    .await;
    let mirror_url = mirror(
        serde_json::json!([{ "videoId": "vid-from-mirror" }]),
        Arc::clone(&mirror_hits),
    )
    .await;

    let config = ResolverConfig {
        api_key: Some("test-key".to_string()),
        api_base: primary_url,
        mirrors: vec![mirror_url],
        mirror_timeout_secs: 2,
        resolution_ttl_secs: 3600,
        ..ResolverConfig::default()
    };
    let (_dir, resolver) = resolver(config);
    let resolution = resolver.resolve(&track()).await.unwrap();

    assert_eq!(resolution.video_id, "vid-from-primary");
    assert_eq!(primary_hits.load(Ordering::SeqCst), 1);
    assert_eq!(mirror_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn exhausted_chain_returns_none() {
    let hits = Arc::new(AtomicUsize::new(0));
    let empty = mirror(serde_json::json!([]), Arc::clone(&hits)).await;
    // Nothing listens on this port.
    let dead = "http://127.0.0.1:1".to_string();

    let (_dir, resolver) = resolver(mirror_only_config(vec![dead, empty]));
    let started = std::time::Instant::now();
    let resolution = resolver.resolve(&track()).await;

    assert!(resolution.is_none());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    // Each attempt is bounded by the per-mirror timeout.
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn second_resolve_is_served_from_cache() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mirror_url = mirror(
        serde_json::json!([{ "videoId": "vid-cached" }]),
        Arc::clone(&hits),
    )
    .await;

    let (_dir, resolver) = resolver(mirror_only_config(vec![mirror_url]));
    let first = resolver.resolve(&track()).await.unwrap();
    let second = resolver.resolve(&track()).await.unwrap();

    assert_eq!(first.audio_url, second.audio_url);
    assert_eq!(first.video_id, second.video_id);
    // One network round-trip total.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
