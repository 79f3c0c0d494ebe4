mod http;
mod output;
mod session;

use std::sync::Arc;
use std::time::Duration;

use jet_core::cache::ResponseCache;
use jet_core::config::Config;
use jet_core::library::LibraryStore;
use jet_core::metadata::MetadataClient;
use jet_core::platform;
use jet_core::resolver::AudioResolver;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::session::PlaybackSession;

/// Expired cache entries are reaped on this interval; reads also evict
/// lazily, so the sweep only reclaims disk space.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File logging: the daemon is meant to run detached.
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,jet_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let cache = Arc::new(ResponseCache::new(
        config.cache.dir.clone(),
        Duration::from_secs(config.cache.default_ttl_secs),
    ));
    let reclaimed = cache.clear_expired();
    if reclaimed > 0 {
        info!("Reclaimed {} expired cache entries at startup", reclaimed);
    }

    // Periodic sweep so a long-running daemon does not accumulate stale
    // entries that are never read again.
    {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CACHE_SWEEP_INTERVAL);
            interval.tick().await; // immediate first tick already handled above
            loop {
                interval.tick().await;
                cache.clear_expired();
            }
        });
    }

    let library = Arc::new(LibraryStore::new(config.library.dir.clone()));
    let metadata = Arc::new(MetadataClient::new(
        config.metadata.clone(),
        Arc::clone(&cache),
    ));
    let resolver = Arc::new(AudioResolver::new(
        config.resolver.clone(),
        Arc::clone(&cache),
    ));
    if resolver.has_credential() {
        info!("Audio resolver: primary API credential present");
    } else {
        info!("Audio resolver: no credential, mirrors only");
    }

    let session_tx = spawn_session(&config, Arc::clone(&library), Arc::clone(&resolver));

    if !config.http.enabled {
        anyhow::bail!("HTTP API disabled in config; nothing to serve");
    }

    let server = http::start_server(
        config.http.bind_address.clone(),
        config.http.port,
        session_tx,
        metadata,
        resolver,
        library,
        cache,
    );
    server.await?;

    Ok(())
}

#[cfg(unix)]
fn spawn_session(
    config: &Config,
    library: Arc<LibraryStore>,
    resolver: Arc<AudioResolver>,
) -> tokio::sync::mpsc::Sender<session::SessionCommand> {
    if platform::find_mpv_binary().is_none() {
        tracing::warn!("mpv binary not found, playback is a no-op");
        let session = PlaybackSession::new(
            output::NullOutput,
            library,
            Some(resolver),
            config.playback.default_volume,
            config.playback.default_speed,
        );
        return session::spawn(session);
    }
    let session = PlaybackSession::new(
        output::MpvOutput::new(),
        library,
        Some(resolver),
        config.playback.default_volume,
        config.playback.default_speed,
    );
    session::spawn(session)
}

#[cfg(not(unix))]
fn spawn_session(
    config: &Config,
    library: Arc<LibraryStore>,
    resolver: Arc<AudioResolver>,
) -> tokio::sync::mpsc::Sender<session::SessionCommand> {
    info!("No media output driver for this platform, playback is a no-op");
    let session = PlaybackSession::new(
        output::NullOutput,
        library,
        Some(resolver),
        config.playback.default_volume,
        config.playback.default_speed,
    );
    session::spawn(session)
}
