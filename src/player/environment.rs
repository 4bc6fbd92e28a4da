use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tracing::debug;

use super::traits::EnvironmentProbe;
use super::types::{DeviceClass, NetworkHint};
use crate::config::EnvironmentConfig;

static MOBILE_AGENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)iPhone|iPad|iPod|Android|webOS|BlackBerry|IEMobile|Opera Mini")
        .expect("mobile user agent pattern")
});

static APPLE_TOUCH_AGENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"iPad|iPhone|iPod").expect("apple touch user agent pattern"));

/// Small screens with touch input are treated as phones even with a desktop agent.
const SMALL_SCREEN_WIDTH: f64 = 768.0;
const SLOW_DOWNLINK_MBPS: f64 = 1.5;

/// Probe with fixed answers, typically straight from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedProbe {
    pub device_class: DeviceClass,
    pub network_hint: NetworkHint,
    pub supports_manifest: bool,
}

impl FixedProbe {
    pub fn desktop() -> Self {
        Self {
            device_class: DeviceClass::Desktop,
            network_hint: NetworkHint::Fast,
            supports_manifest: false,
        }
    }

    pub fn mobile() -> Self {
        Self {
            device_class: DeviceClass::Mobile,
            network_hint: NetworkHint::Fast,
            supports_manifest: false,
        }
    }

    pub fn with_manifest_support(mut self, supported: bool) -> Self {
        self.supports_manifest = supported;
        self
    }

    pub fn with_network(mut self, hint: NetworkHint) -> Self {
        self.network_hint = hint;
        self
    }
}

impl From<&EnvironmentConfig> for FixedProbe {
    fn from(config: &EnvironmentConfig) -> Self {
        Self {
            device_class: config.device_class,
            network_hint: config.network_hint,
            supports_manifest: config.supports_manifest,
        }
    }
}

impl EnvironmentProbe for FixedProbe {
    fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    fn network_hint(&self) -> NetworkHint {
        self.network_hint
    }

    fn supports_manifest(&self) -> bool {
        self.supports_manifest
    }
}

/// Connection quality as reported by the client (Network Information API shape).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionReport {
    /// `slow-2g`, `2g`, `3g` or `4g`.
    #[serde(default)]
    pub effective_type: Option<String>,
    #[serde(default)]
    pub downlink_mbps: Option<f64>,
    #[serde(default)]
    pub cellular: bool,
}

impl ConnectionReport {
    pub fn network_hint(&self) -> NetworkHint {
        let effective = self.effective_type.as_deref().unwrap_or_default();
        if matches!(effective, "slow-2g" | "2g") {
            return NetworkHint::Slow;
        }

        let slow_downlink = self
            .downlink_mbps
            .is_some_and(|downlink| downlink > 0.0 && downlink < SLOW_DOWNLINK_MBPS);

        if self.cellular && (effective == "3g" || slow_downlink) {
            return NetworkHint::Slow;
        }
        if slow_downlink {
            return NetworkHint::Slow;
        }

        NetworkHint::Fast
    }
}

/// Probe fed with what the client tells us about itself.
#[derive(Debug)]
pub struct ClientHints {
    user_agent: String,
    platform: String,
    max_touch_points: u32,
    viewport_width: f64,
    /// A companion HLS library is loaded on the client.
    manifest_library: bool,
    connection: RwLock<Option<ConnectionReport>>,
}

impl ClientHints {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            platform: String::new(),
            max_touch_points: 0,
            viewport_width: 1280.0,
            manifest_library: false,
            connection: RwLock::new(None),
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_touch(mut self, max_touch_points: u32, viewport_width: f64) -> Self {
        self.max_touch_points = max_touch_points;
        self.viewport_width = viewport_width;
        self
    }

    pub fn with_manifest_library(mut self, loaded: bool) -> Self {
        self.manifest_library = loaded;
        self
    }

    /// Connection quality changes over a session; the next resolve sees it.
    pub fn update_connection(&self, report: Option<ConnectionReport>) {
        debug!("Connection report updated: {:?}", report);
        if let Ok(mut connection) = self.connection.write() {
            *connection = report;
        }
    }

    pub fn is_apple_touch(&self) -> bool {
        APPLE_TOUCH_AGENT.is_match(&self.user_agent)
            || (self.platform == "MacIntel" && self.max_touch_points > 1)
    }

    fn has_small_touch_screen(&self) -> bool {
        self.max_touch_points > 0 && self.viewport_width <= SMALL_SCREEN_WIDTH
    }
}

impl EnvironmentProbe for ClientHints {
    fn device_class(&self) -> DeviceClass {
        if MOBILE_AGENT.is_match(&self.user_agent)
            || self.is_apple_touch()
            || self.has_small_touch_screen()
        {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }

    fn network_hint(&self) -> NetworkHint {
        self.connection
            .read()
            .ok()
            .and_then(|connection| connection.as_ref().map(ConnectionReport::network_hint))
            .unwrap_or_default()
    }

    fn supports_manifest(&self) -> bool {
        // Safari on iPhone/iPad plays HLS natively.
        self.is_apple_touch() || self.manifest_library
    }
}

/// Builds the probe the configuration asks for.
pub fn probe_from_config(config: &EnvironmentConfig) -> Box<dyn EnvironmentProbe> {
    match &config.user_agent {
        Some(agent) => Box::new(ClientHints::new(agent.clone()).with_manifest_library(config.supports_manifest)),
        None => Box::new(FixedProbe::from(config)),
    }
}
