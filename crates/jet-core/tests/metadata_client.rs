//! Metadata client against a local provider-shaped mock: responses are
//! cached under deterministic keys and failures degrade to empty results.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{response::Json, routing::get, Router};
use tempfile::TempDir;

use jet_core::cache::ResponseCache;
use jet_core::config::MetadataConfig;
use jet_core::metadata::MetadataClient;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn counted(body: serde_json::Value, hits: Arc<AtomicUsize>) -> axum::routing::MethodRouter {
    get(move || {
        let body = body.clone();
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Json(body)
        }
    })
}

fn client(api_base: String) -> (TempDir, MetadataClient) {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(ResponseCache::new(dir.path(), Duration::from_secs(60)));
    let config = MetadataConfig {
        api_base,
        ..MetadataConfig::default()
    };
    (dir, MetadataClient::new(config, cache))
}

fn track_payload() -> serde_json::Value {
    serde_json::json!({
        "data": [{
            "id": 3135556,
            "title": "Harder, Better, Faster, Stronger",
            "duration": 224,
            "preview": "https://cdn.example/preview/3135556.mp3",
            "artist": { "name": "Daft Punk" },
            "album": { "title": "Discovery", "cover_medium": "https://cdn.example/cover.jpg" }
        }]
    })
}

#[tokio::test]
async fn repeated_search_hits_the_cache() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(Router::new().route("/search/track", counted(track_payload(), Arc::clone(&hits)))).await;
    let (_dir, client) = client(base);

    let first = client.search_tracks("daft punk", 20).await;
    let second = client.search_tracks("daft punk", 20).await;

    assert_eq!(first.len(), 1);
    assert_eq!(first[0].id, second[0].id);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn different_limits_are_cached_separately() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(Router::new().route("/search/track", counted(track_payload(), Arc::clone(&hits)))).await;
    let (_dir, client) = client(base);

    client.search_tracks("daft punk", 20).await;
    client.search_tracks("daft punk", 5).await;

    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn entity_lookup_is_cached() {
    let hits = Arc::new(AtomicUsize::new(0));
    let body = serde_json::json!({
        "id": 3135556,
        "title": "Harder, Better, Faster, Stronger",
        "duration": 224,
        "preview": "https://cdn.example/preview/3135556.mp3",
        "artist": { "name": "Daft Punk" },
        "album": { "title": "Discovery", "cover_medium": "https://cdn.example/cover.jpg" }
    });
    let base = serve(Router::new().route("/track/:id", counted(body, Arc::clone(&hits)))).await;
    let (_dir, client) = client(base);

    let first = client.track("3135556").await.unwrap();
    let second = client.track("3135556").await.unwrap();

    assert_eq!(first.title, second.title);
    assert_eq!(first.duration_secs, 224);
    assert!(!first.has_full_audio);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn network_failure_degrades_to_empty() {
    // Nothing listens here.
    let (_dir, client) = client("http://127.0.0.1:1".to_string());

    let tracks = client.search_tracks("daft punk", 20).await;
    assert!(tracks.is_empty());

    let chart = client.chart_tracks(20).await;
    assert!(chart.is_empty());

    assert!(client.track("3135556").await.is_none());
}

#[tokio::test]
async fn chart_results_are_cached() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(Router::new().route("/chart/0/tracks", counted(track_payload(), Arc::clone(&hits)))).await;
    let (_dir, client) = client(base);

    let first = client.chart_tracks(20).await;
    let second = client.chart_tracks(20).await;

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
