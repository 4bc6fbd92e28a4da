
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::traits::AdSource;
use crate::config::AdLibraryConfig;
use crate::models::VideoAd;
use crate::utils::AppError;

const AD_FIELDS: &str = "id,ad_snapshot_url,page_name,ad_creative_bodies,ad_delivery_start_time";
const UNKNOWN_PAGE_ID: &str = "FIND_PAGE_ID";

/// Whole-match patterns first, then JSON fields whose value is captured.
static VIDEO_URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"https://video[^"'\s]+\.mp4"#,
        r#"https://[^"'\s]*fbcdn[^"'\s]+\.mp4"#,
        r#""playable_url":"([^"]+)""#,
        r#""playable_url_quality_hd":"([^"]+)""#,
        r#""video_url":"([^"]+)""#,
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

#[derive(Debug, Deserialize)]
struct AdsArchiveResponse {
    #[serde(default)]
    data: Vec<ArchivedAd>,
    #[serde(default)]
    paging: Option<Paging>,
    #[serde(default)]
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct ArchivedAd {
    id: String,
    ad_snapshot_url: String,
    #[serde(default)]
    ad_creative_bodies: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: i64,
}

#[derive(Debug, Deserialize)]
struct PageMatch {
    page_id: String,
    #[serde(default)]
    page_name: String,
}

#[derive(Debug, Deserialize)]
struct PageSearchResponse {
    #[serde(default)]
    data: Vec<PageMatch>,
}

#[derive(Debug, Clone, PartialEq)]
enum PageCursor {
    Start,
    Next(String),
    Done,
}

/// Video ads from the public ad library, one search per brand page.
#[derive(Debug)]
pub struct MetaAdLibrary {
    client: reqwest::Client,
    api_url: String,
    access_token: String,
    countries: Vec<String>,
    brand_pages: Vec<(String, String)>,
    page_limit: u32,
    cursors: Mutex<HashMap<String, PageCursor>>,
}

impl MetaAdLibrary {
    pub fn new(config: &AdLibraryConfig) -> Result<Self> {
        let access_token = config
            .access_token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AppError::Configuration("ad_library.access_token is not set".to_string())
            })?;

        if !access_token.starts_with("EAA") {
            warn!("Ad library access token does not look like a user token");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let brand_pages = config
            .brand_pages
            .iter()
            .filter(|(brand, page_id)| {
                let known = page_id.as_str() != UNKNOWN_PAGE_ID && !page_id.is_empty();
                if !known {
                    warn!("No page id for {}, skipping", brand);
                }
                known
            })
            .map(|(brand, page_id)| (brand.clone(), page_id.clone()))
            .collect();

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            access_token,
            countries: config.countries.clone(),
            brand_pages,
            page_limit: config.page_limit,
            cursors: Mutex::new(HashMap::new()),
        })
    }

    /// Cheap request that fails fast when the token lacks `ads_read`.
    pub async fn verify_token(&self) -> Result<()> {
        let response: AdsArchiveResponse = self
            .client
            .get(&self.api_url)
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("fields", "id"),
                ("limit", "1"),
            ])
            .send()
            .await
            .context("Failed to connect to the ad library")?
            .json()
            .await
            .context("Failed to parse ad library response")?;

        match response.error {
            Some(error) => Err(AppError::Authentication(format!(
                "ad library rejected the token ({}): {}",
                error.code, error.message
            ))
            .into()),
            None => Ok(()),
        }
    }

    /// First page id whose ads match `brand`.
    pub async fn find_page_id(&self, brand: &str) -> Result<Option<String>> {
        let response: PageSearchResponse = self
            .client
            .get(&self.api_url)
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("search_terms", brand),
                ("ad_reached_countries", r#"["US"]"#),
                ("ad_active_status", "ALL"),
                ("fields", "page_id,page_name"),
                ("limit", "5"),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to search pages for {}", brand))?
            .json()
            .await
            .context("Failed to parse page search")?;

        for page in &response.data {
            debug!("Page match for {}: {} ({})", brand, page.page_name, page.page_id);
        }
        Ok(response.data.into_iter().next().map(|page| page.page_id))
    }

    async fn fetch_brand(&self, brand: &str, page_id: &str) -> Result<Vec<VideoAd>> {
        let cursor = self
            .cursors
            .lock()
            .await
            .get(brand)
            .cloned()
            .unwrap_or(PageCursor::Start);

        let request = match &cursor {
            PageCursor::Done => return Ok(Vec::new()),
            PageCursor::Next(url) => self.client.get(url),
            PageCursor::Start => {
                let countries = serde_json::to_string(&self.countries)?;
                let limit = self.page_limit.to_string();
                self.client.get(&self.api_url).query(&[
                    ("access_token", self.access_token.as_str()),
                    ("search_page_ids", page_id),
                    ("ad_reached_countries", countries.as_str()),
                    ("ad_active_status", "ALL"),
                    ("ad_type", "ALL"),
                    ("media_type", "VIDEO"),
                    ("fields", AD_FIELDS),
                    ("limit", limit.as_str()),
                ])
            }
        };

        let response: AdsArchiveResponse = request
            .send()
            .await
            .with_context(|| format!("Failed to fetch {} ads", brand))?
            .json()
            .await
            .with_context(|| format!("Failed to parse {} ads", brand))?;

        if let Some(error) = response.error {
            return Err(anyhow!("ad library error for {}: {}", brand, error.message));
        }

        let next = match response.paging.and_then(|paging| paging.next) {
            Some(url) => PageCursor::Next(url),
            None => PageCursor::Done,
        };
        self.cursors.lock().await.insert(brand.to_string(), next);

        let snapshots = response
            .data
            .iter()
            .map(|ad| self.extract_video_from_snapshot(&ad.ad_snapshot_url));
        let urls = join_all(snapshots).await;

        let ads: Vec<VideoAd> = response
            .data
            .into_iter()
            .zip(urls)
            .filter_map(|(ad, url)| {
                let url = url?;
                let description = ad
                    .ad_creative_bodies
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| format!("{} video ad", brand));
                Some(VideoAd::new(ad.id, url, brand, description))
            })
            .collect();

        info!("{}: found {} video ad(s)", brand, ads.len());
        Ok(ads)
    }

    async fn extract_video_from_snapshot(&self, snapshot_url: &str) -> Option<String> {
        let html = match self.client.get(snapshot_url).send().await {
            Ok(response) => response.text().await.ok()?,
            Err(e) => {
                warn!("Failed to load ad snapshot {}: {}", snapshot_url, e);
                return None;
            }
        };
        extract_video_url(&html)
    }
}

#[async_trait]
impl AdSource for MetaAdLibrary {
    async fn fetch_more(&self) -> Result<Vec<VideoAd>> {
        let fetches = self
            .brand_pages
            .iter()
            .map(|(brand, page_id)| self.fetch_brand(brand, page_id));

        let mut ads = Vec::new();
        for (result, (brand, _)) in join_all(fetches).await.into_iter().zip(&self.brand_pages) {
            match result {
                Ok(batch) => ads.extend(batch),
                Err(e) => warn!("Skipping {}: {:#}", brand, e),
            }
        }
        Ok(ads)
    }

    fn name(&self) -> &str {
        "meta-ad-library"
    }
}

/// Find a playable video URL in an ad snapshot page.
pub fn extract_video_url(html: &str) -> Option<String> {
    VIDEO_URL_PATTERNS.iter().find_map(|pattern| {
        let captures = pattern.captures(html)?;
        let raw = captures.get(1).or_else(|| captures.get(0))?.as_str();
        let url = raw
            .replace("\\u002F", "/")
            .replace('\\', "")
            .trim_matches(|c| c == '"' || c == '\'')
            .to_string();
        (!url.is_empty()).then_some(url)
    })
}
