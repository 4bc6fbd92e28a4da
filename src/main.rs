use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use adreel::backends::{
    AdSource, AuthProvider, LocalAuth, LocalCatalog, MemoryStore, MetaAdLibrary, StatsStore,
    SupabaseAuth, SupabaseBackend, WithdrawalStore,
};
use adreel::config::Config;
use adreel::events::{EventBus, EventPayload};
use adreel::feed::{FeedCollaborators, FeedCoordinator, FeedHandle};
use adreel::models::{Session, VideoAd};
use adreel::player::{
    EnvironmentProbe, HeadlessElement, MediaElement, MediaElementFactory, ReadinessLevel,
    probe_from_config,
};
use adreel::services::withdrawals::{points_to_usd, quote};
use adreel::services::{AuthService, RewardService, WithdrawalService};

/// Who the rewards are saved for.
enum Account {
    Hosted(AuthService),
    Local(Arc<LocalAuth>),
}

struct App {
    feed: FeedHandle,
    rewards: Arc<RewardService>,
    withdrawals: WithdrawalService,
    auth: Arc<dyn AuthProvider>,
    account: Account,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adreel=debug")),
        )
        .init();

    info!("Starting adreel");

    let config = Config::load().context("Failed to load configuration")?;
    let event_bus = Arc::new(EventBus::default());
    let shutdown = CancellationToken::new();

    let probe: Arc<dyn EnvironmentProbe> =
        Arc::from(probe_from_config(&config.environment));
    info!(
        "Device {:?}, network {:?}, manifest support {}",
        probe.device_class(),
        probe.network_hint(),
        probe.supports_manifest()
    );

    let (ad_source, ads) = ad_source(&config).await?;

    let Stores {
        stats,
        withdrawals: withdrawal_store,
        auth,
        account,
    } = stores(&config, &event_bus)?;

    let rewards = Arc::new(RewardService::new(
        stats.clone(),
        auth.clone(),
        event_bus.clone(),
        &config.playback,
    ));
    let withdrawals = WithdrawalService::new(withdrawal_store, stats, event_bus.clone());

    let factory: Arc<dyn MediaElementFactory> = Arc::new(|_index: usize| {
        Box::new(HeadlessElement::new(ReadinessLevel::CanPlay)) as Box<dyn MediaElement>
    });

    let feed = FeedCoordinator::spawn(
        config.feed.clone(),
        &config.playback,
        ads,
        FeedCollaborators {
            probe,
            factory,
            ad_source,
            rewards: rewards.clone(),
            event_bus: event_bus.clone(),
        },
        shutdown.clone(),
    );
    feed.resize(config.feed.viewport_height)?;

    tokio::spawn(log_events(event_bus.clone(), shutdown.clone()));

    let app = App {
        feed,
        rewards,
        withdrawals,
        auth,
        account,
    };
    let result = app.read_commands().await;

    shutdown.cancel();
    info!("Goodbye");
    result
}

struct Stores {
    stats: Arc<dyn StatsStore>,
    withdrawals: Arc<dyn WithdrawalStore>,
    auth: Arc<dyn AuthProvider>,
    account: Account,
}

/// The hosted backend when configured, process memory otherwise.
fn stores(config: &Config, event_bus: &Arc<EventBus>) -> Result<Stores> {
    if config.backend.is_configured() {
        let backend = Arc::new(SupabaseBackend::from_config(&config.backend)?);
        let hosted = Arc::new(SupabaseAuth::new(backend.api().clone()));
        return Ok(Stores {
            stats: backend.clone(),
            withdrawals: backend,
            auth: hosted.clone(),
            account: Account::Hosted(AuthService::new(hosted, event_bus.clone())),
        });
    }

    info!("No hosted backend configured, keeping stats in memory");
    let store = Arc::new(MemoryStore::new());
    let local = Arc::new(LocalAuth::signed_out());
    Ok(Stores {
        stats: store.clone(),
        withdrawals: store,
        auth: local.clone(),
        account: Account::Local(local),
    })
}

/// The configured ad library, falling back to the local catalog when it
/// is disabled or returns nothing.
async fn ad_source(config: &Config) -> Result<(Arc<dyn AdSource>, Vec<VideoAd>)> {
    if config.ad_library.enabled {
        match MetaAdLibrary::new(&config.ad_library) {
            Ok(library) => {
                let library = Arc::new(library);
                match library.fetch_more().await {
                    Ok(ads) if !ads.is_empty() => {
                        info!("Loaded {} ad(s) from the ad library", ads.len());
                        return Ok((library as Arc<dyn AdSource>, ads));
                    }
                    Ok(_) => warn!("Ad library returned no video ads, using the local catalog"),
                    Err(e) => warn!("Ad library unavailable ({:#}), using the local catalog", e),
                }
            }
            Err(e) => warn!("Ad library misconfigured ({:#}), using the local catalog", e),
        }
    }

    let catalog = Arc::new(LocalCatalog::from_config(&config.feed).await?);
    let ads = catalog.ads().to_vec();
    info!("Loaded {} ad(s) from the local catalog", ads.len());
    Ok((catalog as Arc<dyn AdSource>, ads))
}

async fn log_events(event_bus: Arc<EventBus>, shutdown: CancellationToken) {
    let mut subscriber = event_bus.subscribe();
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = subscriber.recv() => event,
        };
        match event {
            Ok(event) => match &event.payload {
                EventPayload::Points { total, delta } => {
                    info!("Points {} ({:+}), worth ${:.3}", total, delta, points_to_usd(*total));
                }
                payload => info!("{}: {:?}", event.event_type.as_str(), payload),
            },
            Err(e) => {
                debug!("Event log stopped: {}", e);
                break;
            }
        }
    }
}

impl App {
    async fn read_commands(&self) -> Result<()> {
        println!(
            "Commands: scroll <px>, swipe up|down, jump <index>, tap, mute, retry, stats, \
             signin <email> [password], signout, payout <id>, withdraw <amount> <method> [detail], \
             withdrawals, quit"
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let words: Vec<&str> = line.split_whitespace().collect();
            let Some((&command, args)) = words.split_first() else {
                continue;
            };
            if command == "quit" || command == "exit" {
                break;
            }
            if let Err(e) = self.run_command(command, args).await {
                warn!("{}: {:#}", command, e);
            }
        }

        self.feed.shutdown().ok();
        Ok(())
    }

    async fn run_command(&self, command: &str, args: &[&str]) -> Result<()> {
        match (command, args) {
            ("scroll", [offset]) => self.feed.scroll(offset.parse().context("Invalid offset")?)?,
            ("swipe", ["up"]) => self.feed.swipe(-1)?,
            ("swipe", ["down"]) => self.feed.swipe(1)?,
            ("jump", [index]) => self.feed.jump_to(index.parse().context("Invalid index")?)?,
            ("tap", []) => {
                let playing = self.feed.toggle_pause().await?;
                println!("{}", if playing { "Playing" } else { "Paused" });
            }
            ("mute", []) => {
                let muted = self.feed.toggle_mute().await?;
                println!("{}", if muted { "Muted" } else { "Sound on" });
            }
            ("retry", []) => self.feed.retry().await?,
            ("stats", []) => self.print_stats().await?,
            ("signin", [email, rest @ ..]) => self.sign_in(email, rest.first().copied()).await?,
            ("signout", []) => match &self.account {
                Account::Hosted(service) => service.sign_out().await?,
                Account::Local(local) => local.sign_out(),
            },
            ("payout", [payout_id]) => {
                let session = self.require_session().await?;
                self.withdrawals
                    .save_payout_id(session.user_id(), payout_id)
                    .await?;
            }
            ("withdraw", [amount, method, detail @ ..]) => {
                let amount = amount.parse().context("Invalid amount")?;
                self.withdraw(amount, method, detail.first().copied()).await?
            }
            ("withdrawals", []) => {
                let session = self.require_session().await?;
                for request in self.withdrawals.get_withdrawal_history(session.user_id()).await? {
                    println!(
                        "${:.2} via {} ({:?})",
                        request.amount, request.payout_method, request.status
                    );
                }
            }
            _ => println!("Unknown command: {} {}", command, args.join(" ")),
        }
        Ok(())
    }

    async fn print_stats(&self) -> Result<()> {
        let snapshot = self.feed.snapshot().await?;
        println!(
            "Slot {}/{} active, mounted {:?}",
            snapshot.cursor.active_index + 1,
            snapshot.cursor.length,
            snapshot.mounted
        );
        if let Some(slot) = self.feed.active_slot().await? {
            let slot = slot.snapshot().await?;
            println!(
                "{} ({}): {}{}",
                slot.ad.brand,
                slot.ad.id,
                slot.load_state.as_str(),
                if slot.has_awarded_reward { ", rewarded" } else { "" }
            );
        }

        if let Some(stats) = self.rewards.refresh_from_backend().await? {
            println!(
                "{} watched, {} points, {}s watched",
                stats.total_watched, stats.total_points, stats.total_watch_seconds
            );
            for record in self.rewards.recent_watches(5).await? {
                println!("  {} {} +{}", record.brand, record.ad_id, record.points_earned);
            }
        } else {
            println!("{} points on this device", self.rewards.local_points());
        }
        Ok(())
    }

    async fn sign_in(&self, email: &str, password: Option<&str>) -> Result<()> {
        match &self.account {
            Account::Hosted(service) => {
                let password = password.context("A password is required")?;
                service.sign_in(email, password).await?;
            }
            Account::Local(local) => local.sign_in(email),
        }
        self.rewards.refresh_from_backend().await?;
        Ok(())
    }

    async fn withdraw(&self, amount: f64, method: &str, detail: Option<&str>) -> Result<()> {
        let session = self.require_session().await?;
        let available = self.withdrawals.available_points(session.user_id()).await?;
        let quote = quote(amount, available)?;

        // Without a detail the saved payout id is used.
        let details: HashMap<String, String> = detail
            .map(|detail| HashMap::from([(method.to_string(), detail.to_string())]))
            .unwrap_or_default();
        let request = self
            .withdrawals
            .request_withdrawal(session.user_id(), amount, quote.points_needed, method, details)
            .await?;
        self.rewards
            .set_local_points(available - request.points_used)
            .await;
        println!("Requested ${:.2} for {} points", request.amount, request.points_used);
        Ok(())
    }

    async fn require_session(&self) -> Result<Session> {
        self.auth
            .current_session()
            .await
            .context("Sign in first")
    }
}
