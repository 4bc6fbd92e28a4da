use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use super::traits::AdSource;
use crate::config::FeedConfig;
use crate::models::VideoAd;

const BUILTIN_CATALOG: &str = include_str!("../../../assets/catalog.json");

/// Filename fragment to brand, first match wins.
const BRANDS: &[(&str, &str)] = &[
    ("NIKE", "Nike"),
    ("Apple", "Apple"),
    ("WHOOP", "WHOOP"),
    ("adidas", "Adidas"),
    ("Samsung", "Samsung"),
    ("Cluely", "Cluely"),
    ("Lovable", "Lovable"),
    ("Luma-AI", "Luma AI"),
    ("Saucony", "Saucony"),
    ("Oakley", "Oakley"),
];

/// A fixed ad list that is handed out again every time the feed asks for more.
#[derive(Debug)]
pub struct LocalCatalog {
    ads: Vec<VideoAd>,
    rounds: AtomicUsize,
}

impl LocalCatalog {
    pub fn new(ads: Vec<VideoAd>) -> Self {
        Self {
            ads,
            rounds: AtomicUsize::new(0),
        }
    }

    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self> {
        let ads: Vec<VideoAd> =
            serde_json::from_str(BUILTIN_CATALOG).context("Built-in catalog is malformed")?;
        Ok(Self::new(ads))
    }

    pub async fn from_json(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        let ads: Vec<VideoAd> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse catalog {}", path.display()))?;
        info!("Loaded {} ad(s) from {}", ads.len(), path.display());
        Ok(Self::new(ads))
    }

    /// One ad per `*.mp4` in `dir`, sorted by file name, ids counting from 1.
    pub async fn scan_directory(dir: &Path, url_prefix: &str) -> Result<Self> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read media directory {}", dir.display()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".mp4") {
                files.push(name);
            }
        }
        files.sort();

        let prefix = url_prefix.trim_end_matches('/');
        let ads: Vec<VideoAd> = files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let brand = brand_for(file);
                let description = description_for(brand, file);
                VideoAd::new((i + 1).to_string(), format!("{}/{}", prefix, file), brand, description)
            })
            .collect();

        if ads.is_empty() {
            warn!("No video files found in {}", dir.display());
        } else {
            info!("Found {} video file(s) in {}", ads.len(), dir.display());
        }
        Ok(Self::new(ads))
    }

    /// Explicit catalog file, then media directory, then the built-in list.
    pub async fn from_config(config: &FeedConfig) -> Result<Self> {
        if let Some(path) = &config.catalog_path {
            return Self::from_json(path).await;
        }
        if let Some(dir) = &config.media_dir {
            return Self::scan_directory(dir, &config.url_prefix).await;
        }
        Self::builtin()
    }

    pub fn ads(&self) -> &[VideoAd] {
        &self.ads
    }

    pub fn is_empty(&self) -> bool {
        self.ads.is_empty()
    }
}

#[async_trait]
impl AdSource for LocalCatalog {
    async fn fetch_more(&self) -> Result<Vec<VideoAd>> {
        let round = self.rounds.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Local catalog round {} ({} ads)", round, self.ads.len());
        Ok(self.ads.clone())
    }

    fn name(&self) -> &str {
        "local"
    }
}

pub fn brand_for(file_name: &str) -> &'static str {
    BRANDS
        .iter()
        .find(|(fragment, _)| file_name.contains(fragment))
        .map(|(_, brand)| *brand)
        .unwrap_or("Unknown Brand")
}

pub fn description_for(brand: &str, file_name: &str) -> String {
    let text = match brand {
        "Nike" => "Why Do It - Just Do It. Push your limits and achieve greatness.",
        "Apple" if file_name.contains("AirPods") => {
            "Introducing AirPods Pro 3 - Revolutionary sound. Adaptive audio. Pure magic."
        }
        "Apple" => {
            "Great ideas start on Mac - Where creativity meets innovation. Build something amazing."
        }
        "WHOOP" => {
            "The Best Obsess - Track your recovery, strain, and sleep. Optimize your performance."
        }
        "Adidas" => {
            "You Got This - Impossible is nothing. Believe in yourself and achieve the impossible."
        }
        "Samsung" => "The Next Big Thing Is You - Innovation that empowers you to do more.",
        "Cluely" => {
            "Introducing the Cluely Marketing Team - Building the future of marketing together."
        }
        "Lovable" => {
            "Lovable 2.0 is here - Multiplayer vibe. Code together, build together, ship together."
        }
        "Luma AI" => {
            "Introducing Modify Video - Transform your videos with AI. Create, edit, and enhance with ease."
        }
        "Saucony" => {
            "Run As One - Find your stride. Every runner has a story, every run is a journey."
        }
        "Oakley" => {
            "Meta Vanguard - Athletic Intelligence. Performance meets innovation in every frame."
        }
        _ => return format!("{} video advertisement", brand),
    };
    text.to_string()
}
