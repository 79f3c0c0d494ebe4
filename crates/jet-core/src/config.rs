use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Catalog metadata provider (Deezer-compatible API surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_metadata_base")]
    pub api_base: String,
    /// Optional CORS-relay prefix. When set, every provider URL is
    /// percent-encoded and appended to it before the request goes out.
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(default = "default_search_ttl_secs")]
    pub search_ttl_secs: u64,
    #[serde(default = "default_entity_ttl_secs")]
    pub entity_ttl_secs: u64,
}

/// Secondary-source audio resolution (video search API + public mirrors).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Credential for the primary search API. Absent means mirrors only.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_resolver_base")]
    pub api_base: String,
    /// Ordered list of unauthenticated mirror instances, tried first to last.
    #[serde(default = "default_mirrors")]
    pub mirrors: Vec<String>,
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(default = "default_mirror_timeout_secs")]
    pub mirror_timeout_secs: u64,
    #[serde(default = "default_resolution_ttl_secs")]
    pub resolution_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_cache_ttl_secs")]
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_library_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    #[serde(default = "default_speed")]
    pub default_speed: f32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            api_base: default_metadata_base(),
            relay_url: None,
            search_ttl_secs: default_search_ttl_secs(),
            entity_ttl_secs: default_entity_ttl_secs(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_resolver_base(),
            mirrors: default_mirrors(),
            relay_url: None,
            mirror_timeout_secs: default_mirror_timeout_secs(),
            resolution_ttl_secs: default_resolution_ttl_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            default_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            dir: default_library_dir(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            default_speed: default_speed(),
        }
    }
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_metadata_base() -> String {
    "https://api.deezer.com".to_string()
}

fn default_resolver_base() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

fn default_mirrors() -> Vec<String> {
    vec![
        "https://invidious.privacyredirect.com".to_string(),
        "https://inv.riverside.rocks".to_string(),
        "https://invidious.snopyta.org".to_string(),
    ]
}

fn default_mirror_timeout_secs() -> u64 {
    5
}

fn default_resolution_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_search_ttl_secs() -> u64 {
    30 * 60
}

fn default_entity_ttl_secs() -> u64 {
    60 * 60
}

fn default_cache_ttl_secs() -> u64 {
    30 * 60
}

fn default_cache_dir() -> PathBuf {
    platform::cache_dir().join("api")
}

fn default_library_dir() -> PathBuf {
    platform::data_dir().join("library")
}

fn default_volume() -> f32 {
    0.7
}

fn default_speed() -> f32 {
    1.0
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            config.save()?;
            config
        };

        // Credential can come from the environment instead of the file.
        if config.resolver.api_key.is_none() {
            if let Ok(key) = std::env::var("JETSTREAM_API_KEY") {
                if !key.trim().is_empty() {
                    config.resolver.api_key = Some(key);
                }
            }
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
