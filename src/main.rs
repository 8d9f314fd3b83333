use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use novelty::cli::{self, Args};
use novelty::config::Config;
use novelty::delivery::{LocalNotificationCenter, StaticAuthorization};
use novelty::evaluator::{self, Decision};
use novelty::lifecycle;
use novelty::policy::{PolicyProvider, ProfileManager};
use novelty::scheduler::NotificationScheduler;
use novelty::status::{self, SchedulerMetrics};
use novelty::store::{JsonFileStore, KeyValueStore};
use novelty::time::{weekday_code, weekday_name, Clock, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args();

    if args.help {
        cli::print_help();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("novelty=info".parse().context("invalid log directive")?),
        )
        .init();

    if !args.errors.is_empty() {
        for e in &args.errors {
            error!("{}", e);
        }
        cli::print_help();
        std::process::exit(2);
    }

    info!("Novelty scheduler v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = Config::from_env()?;
    if let Some(hour) = args.hour {
        config.daily_hour = hour;
    }
    info!("Configuration loaded");
    info!("  Store: {}", config.store_path.display());
    info!("  Slot: {}", config.slot_id);
    info!("  Daily hour: {}", config.daily_hour);
    info!(
        "  Time zone: {}",
        config.timezone.as_deref().unwrap_or("system local")
    );

    // Handle --validate mode
    if args.validate {
        info!("Validating configuration...");
        match config.validate() {
            Ok(()) => {
                info!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    run(config, args).await
}

async fn run(config: Config, args: Args) -> Result<()> {
    let clock: Arc<dyn Clock> = match config.zone()? {
        Some(zone) => Arc::new(SystemClock::in_zone(zone)),
        None => Arc::new(SystemClock::local()),
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(
        JsonFileStore::open(&config.store_path)
            .with_context(|| format!("opening store at {}", config.store_path.display()))?,
    );
    let profiles = Arc::new(ProfileManager::load(store.clone()));

    // Handle --check mode (read-only)
    if let Some(at) = args.check {
        print_check(profiles.as_ref(), at);
        return Ok(());
    }

    let authorization = Arc::new(StaticAuthorization::new(
        config.notification_settings()?,
        config.grant_on_request,
    ));
    let center = Arc::new(LocalNotificationCenter::new(clock.clone()));
    let metrics = Arc::new(SchedulerMetrics::new());

    let scheduler = Arc::new(
        NotificationScheduler::new(
            config.scheduler_settings(),
            profiles,
            authorization,
            center.clone(),
            store,
            clock,
        )
        .with_metrics(metrics),
    );
    scheduler.restore().await;

    let cancel_token = CancellationToken::new();
    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Received Ctrl-C, shutting down");
        shutdown.cancel();
    });
    let tick_every = Duration::from_secs(config.tick_secs);

    // Handle --delay mode; stay up until the delayed slot fires
    if let Some(secs) = args.delay {
        let outcome = scheduler.delay(Duration::from_secs(secs)).await?;
        info!("Delay: {}", outcome);
        lifecycle::run_until_delivered(&scheduler, &center, tick_every, cancel_token).await;
        return Ok(());
    }

    // Run a single foreground pass (for testing)
    if args.once {
        info!("Running single foreground pass (--once mode)");
        lifecycle::foreground_pass(&scheduler).await;
        lifecycle::run_until_delivered(&scheduler, &center, tick_every, cancel_token).await;
        return Ok(());
    }

    // Start status server if configured
    if let Some(port) = config.status_port {
        let scheduler = scheduler.clone();
        let cancel = cancel_token.clone();
        tokio::spawn(async move {
            status::run_status_server(port, scheduler, cancel).await;
        });
    }

    lifecycle::run_foreground_loop(
        scheduler,
        center,
        Duration::from_secs(config.foreground_interval_secs),
        tick_every,
        cancel_token,
    )
    .await;

    Ok(())
}

fn print_check(policy: &dyn PolicyProvider, at: chrono::NaiveDateTime) {
    let weekday = weekday_name(weekday_code(&at));
    match evaluator::evaluate(&policy.policy(), at) {
        Decision::Allowed(reason) => {
            println!("{} {}: allowed ({:?})", weekday, at, reason);
        }
        Decision::Blocked(block) => {
            println!(
                "{} {}: blocked by '{}' ({:?})",
                weekday,
                at,
                block.period_name.as_deref().unwrap_or("Unnamed"),
                block.half
            );
        }
    }
}
