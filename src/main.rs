//! RDP Sentinel
//!
//! Watches successful-logon audit records, picks out Remote Desktop logins
//! and sends one deduplicated alert per connection.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rdp_sentinel::alerts::startup_message;
use rdp_sentinel::collector::{Collector, RecordSource};
use rdp_sentinel::config::{self, AppConfig};
use rdp_sentinel::engine::LoginEventHandler;
use rdp_sentinel::notifier::{build_notifier, AlertDispatcher};
use rdp_sentinel::state::DedupCache;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Time allowed for in-flight notifications after Ctrl+C
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "rdp-sentinel")]
#[command(about = "Remote Desktop login monitor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Override logging level (e.g., error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor audit records in the foreground
    Run {
        /// Force console output
        #[arg(long)]
        console: bool,
        /// NDJSON file of raw audit records (defaults to stdin)
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// Send one message through the configured notifier and exit
    TestNotify {
        /// Message text (defaults to the startup banner)
        #[arg(long)]
        message: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = Builder::new_multi_thread().enable_all().build()?;

    let result = match cli.command {
        Some(Commands::Run { console, input }) => {
            runtime.block_on(run_monitor(console, input, cli.log_level))
        }
        None => runtime.block_on(run_monitor(false, None, cli.log_level)),
        Some(Commands::TestNotify { message }) => {
            runtime.block_on(run_test_notify(message, cli.log_level))
        }
    };

    // A stdin read parked on a blocking thread would otherwise hold the
    // runtime open after Ctrl+C.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

fn load_config(force_console: bool, log_level_override: Option<String>) -> Result<AppConfig> {
    let mut cfg = match AppConfig::new() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("Failed to load configuration: {}", err);
            eprintln!("Hint: check config.toml and RDP__* environment overrides.");
            return Err(anyhow::anyhow!("Failed to load configuration: {}", err));
        }
    };
    if force_console {
        cfg.logging.console_output = true;
    }
    if let Some(level) = log_level_override {
        if !level.trim().is_empty() {
            cfg.logging.level = level;
        }
    }
    Ok(cfg)
}

/// Initialize operational logging.
/// Returns the file writer guard, which MUST be kept alive for the duration of the program
fn init_logging(cfg: &config::AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let (file_layer, guard) = if cfg.logging.file_output {
        if let Err(err) = std::fs::create_dir_all(&cfg.logging.directory)
            .with_context(|| format!("Failed to create log directory {:?}", cfg.logging.directory))
        {
            eprintln!("{}", err);
        }

        let app_file = rolling::daily(&cfg.logging.directory, &cfg.logging.filename);
        let (app_writer, app_guard) = tracing_appender::non_blocking(app_file);
        let layer = fmt::layer()
            .with_writer(app_writer)
            .compact()
            .with_ansi(false)
            .with_target(true)
            .with_filter(EnvFilter::new(&cfg.logging.level));
        (Some(layer), Some(app_guard))
    } else {
        (None, None)
    };

    let console_layer = if cfg.logging.console_output {
        Some(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(EnvFilter::new(&cfg.logging.level)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}

fn spawn_shutdown_handler(collector: Arc<Collector>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
                collector.shutdown();
            }
            Err(err) => {
                error!("Failed to listen for Ctrl+C: {}", err);
            }
        }
    })
}

fn spawn_eviction_task(
    cache: Arc<DedupCache>,
    handler: Arc<LoginEventHandler>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = cache.evict_now();
            if evicted.cleared > 0 {
                warn!(
                    target: "state",
                    cleared = evicted.cleared,
                    expired = evicted.expired,
                    "Dedup cache exceeded its ceiling and was cleared"
                );
            } else {
                debug!(
                    target: "state",
                    expired = evicted.expired,
                    remaining = evicted.remaining,
                    "Dedup cache eviction pass"
                );
            }

            let stats = handler.stats();
            info!(
                target: "engine",
                received = stats.received,
                alerted = stats.alerted,
                malformed = stats.malformed,
                filtered = stats.filtered,
                not_human = stats.not_human,
                not_remote = stats.not_remote,
                duplicate = stats.duplicate,
                fault = stats.fault,
                cache_entries = evicted.remaining,
                "Pipeline stats"
            );
        }
    })
}

async fn run_monitor(
    force_console: bool,
    input: Option<PathBuf>,
    log_level_override: Option<String>,
) -> Result<()> {
    // 1. Configuration and logging (keep the guard alive until return)
    let cfg = load_config(force_console, log_level_override)?;
    let _guard = init_logging(&cfg);

    info!(
        target: "rdp_sentinel",
        version = env!("CARGO_PKG_VERSION"),
        log_name = %cfg.monitor.log_name,
        event_id = cfg.monitor.event_id,
        logs_dir = ?cfg.logging.directory,
        "RDP sentinel starting"
    );

    // 2. Notifier and its delivery worker
    let notifier = build_notifier(&cfg.telegram).context("Failed to initialize notifier")?;
    info!(target: "rdp_sentinel", notifier = notifier.name(), "Notifier ready");
    if cfg.monitor.notify_on_start {
        if let Err(err) = notifier.send(&startup_message(&cfg.monitor)).await {
            warn!(
                target: "rdp_sentinel",
                error = %err,
                "Startup notification failed, continuing"
            );
        }
    }
    let (dispatcher, dispatch_handle) =
        AlertDispatcher::new(Arc::clone(&notifier), cfg.telegram.queue_capacity);

    // 3. Dedup state and the pipeline
    let cache = Arc::new(DedupCache::with_system_clock(
        cfg.monitor.retention(),
        cfg.monitor.max_entries,
    ));
    let handler = Arc::new(LoginEventHandler::new(&cfg, Arc::clone(&cache), dispatcher));
    let eviction_task = spawn_eviction_task(
        Arc::clone(&cache),
        Arc::clone(&handler),
        cfg.monitor.eviction_interval(),
    );

    // 4. Collection until end of input or Ctrl+C
    let collector = Arc::new(Collector::new(cfg.monitor.queue_capacity));
    let shutdown_handler = spawn_shutdown_handler(Arc::clone(&collector));

    info!("Press Ctrl+C to stop gracefully");
    let result = collector
        .run(RecordSource::from_path(input), handler.clone())
        .await;

    shutdown_handler.abort();
    eviction_task.abort();
    // Ensures the task's handler reference is released before draining.
    let _ = eviction_task.await;

    let stats = handler.stats();
    info!(
        target: "rdp_sentinel",
        received = stats.received,
        alerted = stats.alerted,
        duplicate = stats.duplicate,
        cache_entries = cache.len(),
        "Monitor stopped"
    );

    // 5. Drain pending alerts: dropping the last dispatcher ends the worker.
    drop(handler);
    if collector.is_shutdown() {
        match tokio::time::timeout(SHUTDOWN_GRACE, dispatch_handle).await {
            Ok(Ok(sent)) => {
                info!(sent = sent.sent, failed = sent.failed, "Dispatch worker finished")
            }
            Ok(Err(e)) => error!("Failed to join dispatch worker: {}", e),
            Err(_) => warn!("Pending alerts abandoned after shutdown grace period"),
        }
    } else {
        match dispatch_handle.await {
            Ok(sent) => info!(sent = sent.sent, failed = sent.failed, "Dispatch worker finished"),
            Err(e) => error!("Failed to join dispatch worker: {}", e),
        }
    }

    result.context("Failed to read audit records")?;
    info!("Shutdown complete");
    Ok(())
}

async fn run_test_notify(
    message: Option<String>,
    log_level_override: Option<String>,
) -> Result<()> {
    let cfg = load_config(true, log_level_override)?;
    let _guard = init_logging(&cfg);

    let notifier = build_notifier(&cfg.telegram).context("Failed to initialize notifier")?;
    let text = message.unwrap_or_else(|| startup_message(&cfg.monitor));
    notifier
        .send(&text)
        .await
        .with_context(|| format!("{} notifier failed", notifier.name()))?;

    info!(notifier = notifier.name(), "Test notification sent");
    Ok(())
}
