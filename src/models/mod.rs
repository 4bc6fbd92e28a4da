mod identifiers;
pub mod stats;

pub use identifiers::{AdId, UserId};
pub use stats::{AggregateStats, WatchRecord, WithdrawalRequest, WithdrawalStatus};

use serde::{Deserialize, Serialize};

/// One branded video in the feed. Never mutated once it is in the feed list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAd {
    pub id: AdId,
    /// Canonical, highest-quality media file.
    #[serde(alias = "videoUrl")]
    pub source_url: String,
    pub brand: String,
    pub description: String,
}

impl VideoAd {
    pub fn new(
        id: impl Into<AdId>,
        source_url: impl Into<String>,
        brand: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            brand: brand.into(),
            description: description.into(),
        }
    }
}

/// A candidate the platform may try to play, in preference order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaSource {
    pub uri: String,
    pub mime_type: String,
}

impl MediaSource {
    pub fn new(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn is_manifest(&self) -> bool {
        self.mime_type == MANIFEST_MIME_TYPE
    }
}

pub const MANIFEST_MIME_TYPE: &str = "application/vnd.apple.mpegurl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session issued by the hosted auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: User,
}

impl Session {
    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }
}
