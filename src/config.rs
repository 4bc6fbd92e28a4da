use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::player::{DeviceClass, NetworkHint, RewardGate};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub environment: EnvironmentConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub ad_library: AdLibraryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Continuous active time before a watch is rewarded.
    #[serde(default = "default_dwell_seconds")]
    pub dwell_seconds: u64,

    #[serde(default = "default_reward_points")]
    pub reward_points: u64,

    #[serde(default)]
    pub reward_gate: RewardGate,

    /// Delays between rejected autoplay attempts.
    #[serde(default = "default_play_retry_delays")]
    pub play_retry_delays_ms: Vec<u64>,

    /// How long a failing source may take to fall back before the slot gives up.
    #[serde(default = "default_fallback_timeout")]
    pub source_fallback_timeout_ms: u64,

    #[serde(default = "default_canonical_marker")]
    pub canonical_marker: String,

    #[serde(default = "default_mobile_marker")]
    pub mobile_marker: String,

    #[serde(default = "default_mobile_marker")]
    pub slow_network_marker: String,

    #[serde(default = "default_true")]
    pub prefer_manifest: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_preload_behind")]
    pub preload_behind: usize,

    #[serde(default = "default_preload_ahead")]
    pub preload_ahead: usize,

    #[serde(default = "default_mobile_preload_ahead")]
    pub mobile_preload_ahead: usize,

    /// Extra distance past the preload window before a slot is released.
    #[serde(default = "default_eviction_margin")]
    pub eviction_margin: usize,

    /// Slots whose projected position is within this many viewport heights
    /// of the current scroll offset may start loading.
    #[serde(default = "default_viewport_margin")]
    pub viewport_margin: f64,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: f64,

    #[serde(default = "default_scroll_debounce")]
    pub scroll_debounce_ms: u64,

    /// Ask for more ads once the active index is this close to the end.
    #[serde(default = "default_grow_threshold")]
    pub grow_threshold: usize,

    #[serde(default = "default_max_length")]
    pub max_length: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_dir: Option<PathBuf>,

    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub device_class: DeviceClass,

    #[serde(default)]
    pub network_hint: NetworkHint,

    #[serde(default)]
    pub supports_manifest: bool,

    /// When set, device class is derived from this user agent instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub anon_key: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdLibraryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_ad_library_url")]
    pub api_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default = "default_countries")]
    pub countries: Vec<String>,

    /// Brand name to advertiser page id.
    #[serde(default = "default_brand_pages")]
    pub brand_pages: BTreeMap<String, String>,

    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            config.save()?;
            Ok(config.with_env_overrides())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        info!("Config loaded successfully");
        Ok(config.with_env_overrides())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    /// Secrets are usually injected by the environment rather than written to disk.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("ADREEL_BACKEND_URL") {
            self.backend.url = url;
        }
        if let Ok(key) = std::env::var("ADREEL_BACKEND_KEY") {
            self.backend.anon_key = Some(key);
        }
        if let Ok(token) = std::env::var("ADREEL_META_TOKEN") {
            self.ad_library.access_token = Some(token);
        }
        self
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("adreel").join("config.toml"))
    }
}

impl PlaybackConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_secs(self.dwell_seconds)
    }

    pub fn play_retry_delays(&self) -> Vec<Duration> {
        self.play_retry_delays_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }

    pub fn source_fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.source_fallback_timeout_ms)
    }
}

impl FeedConfig {
    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && self.anon_key.is_some()
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            dwell_seconds: default_dwell_seconds(),
            reward_points: default_reward_points(),
            reward_gate: RewardGate::default(),
            play_retry_delays_ms: default_play_retry_delays(),
            source_fallback_timeout_ms: default_fallback_timeout(),
            canonical_marker: default_canonical_marker(),
            mobile_marker: default_mobile_marker(),
            slow_network_marker: default_mobile_marker(),
            prefer_manifest: default_true(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            preload_behind: default_preload_behind(),
            preload_ahead: default_preload_ahead(),
            mobile_preload_ahead: default_mobile_preload_ahead(),
            eviction_margin: default_eviction_margin(),
            viewport_margin: default_viewport_margin(),
            viewport_height: default_viewport_height(),
            scroll_debounce_ms: default_scroll_debounce(),
            grow_threshold: default_grow_threshold(),
            max_length: default_max_length(),
            catalog_path: None,
            media_dir: None,
            url_prefix: default_url_prefix(),
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            device_class: DeviceClass::default(),
            network_hint: NetworkHint::default(),
            supports_manifest: false,
            user_agent: None,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for AdLibraryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_ad_library_url(),
            access_token: None,
            countries: default_countries(),
            brand_pages: default_brand_pages(),
            page_limit: default_page_limit(),
        }
    }
}

// Default value functions
fn default_dwell_seconds() -> u64 { 5 }
fn default_reward_points() -> u64 { 1 }
fn default_play_retry_delays() -> Vec<u64> { vec![250, 1000] }
fn default_fallback_timeout() -> u64 { 3000 }
fn default_canonical_marker() -> String { "_1080p".to_string() }
fn default_mobile_marker() -> String { "_480p".to_string() }
fn default_true() -> bool { true }
fn default_preload_behind() -> usize { 1 }
fn default_preload_ahead() -> usize { 2 }
fn default_mobile_preload_ahead() -> usize { 1 }
fn default_eviction_margin() -> usize { 2 }
fn default_viewport_margin() -> f64 { 1.5 }
fn default_viewport_height() -> f64 { 844.0 }
fn default_scroll_debounce() -> u64 { 100 }
fn default_grow_threshold() -> usize { 5 }
fn default_max_length() -> usize { 50 }
fn default_url_prefix() -> String { "/videos".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_ad_library_url() -> String { "https://graph.facebook.com/v21.0/ads_archive".to_string() }
fn default_page_limit() -> u32 { 20 }

fn default_countries() -> Vec<String> {
    ["US", "GB", "CA", "AU", "DE", "FR"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_brand_pages() -> BTreeMap<String, String> {
    [
        ("Apple", "434174436675167"),
        ("Nike", "15087023423"),
        ("Samsung", "662885103766745"),
        ("Coca-Cola", "40796308305"),
    ]
    .into_iter()
    .map(|(brand, page)| (brand.to_string(), page.to_string()))
    .collect()
}
