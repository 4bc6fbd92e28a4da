//! Candidate source selection for a feed slot.
//!
//! Resolution is a pure string transformation over the canonical URL. The
//! variants it produces are naming conventions, not guarantees: the platform
//! falls through the candidate list on load failure, which is why the
//! canonical URL always closes the list.

use tracing::trace;

use super::traits::EnvironmentProbe;
use super::types::{DeviceClass, NetworkHint};
use crate::config::PlaybackConfig;
use crate::models::{MANIFEST_MIME_TYPE, MediaSource};

const MANIFEST_DIR: &str = "hls";
const MANIFEST_FILE: &str = "playlist.m3u8";

/// Device and network facts captured at resolve time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    pub device_class: DeviceClass,
    pub network_hint: NetworkHint,
    pub supports_manifest: bool,
}

impl EnvironmentSnapshot {
    pub fn capture(probe: &dyn EnvironmentProbe) -> Self {
        Self {
            device_class: probe.device_class(),
            network_hint: probe.network_hint(),
            supports_manifest: probe.supports_manifest(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceResolver {
    canonical_marker: String,
    mobile_marker: String,
    slow_network_marker: String,
    prefer_manifest: bool,
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

impl From<&PlaybackConfig> for SourceResolver {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            canonical_marker: config.canonical_marker.clone(),
            mobile_marker: config.mobile_marker.clone(),
            slow_network_marker: config.slow_network_marker.clone(),
            prefer_manifest: config.prefer_manifest,
        }
    }
}

impl SourceResolver {
    /// Ordered candidates for `source_url`, most preferred first. Never empty.
    pub fn resolve(&self, source_url: &str, env: EnvironmentSnapshot) -> Vec<MediaSource> {
        let canonical = MediaSource::new(source_url, mime_type_for(source_url));

        if env.device_class == DeviceClass::Desktop {
            return vec![canonical];
        }

        let mut candidates = Vec::with_capacity(3);

        if self.prefer_manifest && env.supports_manifest {
            if let Some(manifest) = manifest_url(source_url) {
                candidates.push(MediaSource::new(manifest, MANIFEST_MIME_TYPE));
            }
        }

        let marker = match env.network_hint {
            NetworkHint::Fast => &self.mobile_marker,
            NetworkHint::Slow => &self.slow_network_marker,
        };
        if let Some(variant) = variant_url(source_url, &self.canonical_marker, marker) {
            let mime = mime_type_for(&variant);
            candidates.push(MediaSource::new(variant, mime));
        }

        candidates.push(canonical);
        trace!("Resolved {} candidate(s) for {}", candidates.len(), source_url);
        candidates
    }

    pub fn resolve_with(&self, source_url: &str, probe: &dyn EnvironmentProbe) -> Vec<MediaSource> {
        self.resolve(source_url, EnvironmentSnapshot::capture(probe))
    }
}

/// Swap the resolution marker in the file name. `None` when there is nothing to swap.
pub fn variant_url(url: &str, from: &str, to: &str) -> Option<String> {
    if from.is_empty() || from == to {
        return None;
    }

    let (path, suffix) = split_suffix(url);
    let file_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let at = path[file_start..].rfind(from)? + file_start;

    Some(format!(
        "{}{}{}{}",
        &path[..at],
        to,
        &path[at + from.len()..],
        suffix
    ))
}

/// `<mediaDir>/hls/<basename>/playlist.m3u8` for a progressive file.
pub fn manifest_url(url: &str) -> Option<String> {
    let (path, _) = split_suffix(url);
    let (dir, file) = match path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, path),
    };

    let (stem, extension) = file.rsplit_once('.')?;
    if stem.is_empty() || extension.eq_ignore_ascii_case("m3u8") {
        return None;
    }

    Some(match dir {
        Some(dir) => format!("{dir}/{MANIFEST_DIR}/{stem}/{MANIFEST_FILE}"),
        None => format!("{MANIFEST_DIR}/{stem}/{MANIFEST_FILE}"),
    })
}

pub fn mime_type_for(url: &str) -> &'static str {
    let (path, _) = split_suffix(url);
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("m3u8") => MANIFEST_MIME_TYPE,
        _ => "video/mp4",
    }
}

/// Split off `?query` / `#fragment` so path edits leave them intact.
fn split_suffix(url: &str) -> (&str, &str) {
    match url.find(['?', '#']) {
        Some(i) => url.split_at(i),
        None => (url, ""),
    }
}
