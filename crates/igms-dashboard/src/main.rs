//! IGMS Dashboard - a headless shell for the grievance statistics dashboard.
//!
//! Logs in (two-phase: token first, profile in the background), renders one
//! statistic card per department through the call cache, and re-initializes
//! the shell whenever the session store asks for a reload.

mod app;

use std::io;

use anyhow::Result;
use chrono::Local;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{default_window, render_card, Dashboard};
use igms_core::Config;

/// Demo account used when no credentials are given
const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin";

/// Log file name inside `IGMS_LOG_DIR`
const LOG_FILE_PREFIX: &str = "igms-dashboard.log";

const USAGE: &str = "Usage: igms-dashboard [USERNAME [PASSWORD]] [--logout]

Environment:
  RUST_LOG              log filter (default: warn)
  IGMS_LOG_DIR          also write daily log files to this directory
  IGMS_PASSWORD         password when not given as an argument
  IGMS_STORAGE          memory | file
  IGMS_STORAGE_DIR      directory for file storage
  IGMS_RELOAD_POLICY    reload | notify | disabled
  IGMS_SESSION_KEY      storage key holding the session
  IGMS_CACHE_TTL_SECS   freshness window for cached statistics
  IGMS_SESSION_LIFETIME_MINUTES
                        sessions older than this read back as logged out
  IGMS_HYDRATION_DELAY_MS, IGMS_STATISTICS_LATENCY_MS
                        simulated latency of the mock backends
  IGMS_STATISTICS_URL   REST backend instead of mock statistics";

/// Initialize the tracing subscriber for logging.
/// The returned guard must be held until exit to flush the log file.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=igms_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os("IGMS_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{}", USAGE);
        return Ok(());
    }
    let logout_after = args.iter().any(|a| a == "--logout");
    let mut positional = args.iter().filter(|a| !a.starts_with("--"));

    let mut config = Config::load()?;
    config.apply_env(|key| std::env::var(key).ok());

    let username = positional
        .next()
        .cloned()
        .or_else(|| config.last_username.clone())
        .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
    let password = positional
        .next()
        .cloned()
        .or_else(|| std::env::var("IGMS_PASSWORD").ok())
        .unwrap_or_else(|| DEFAULT_PASSWORD.to_string());

    info!("IGMS dashboard starting");
    let mut dashboard = Dashboard::new(&config)?;
    println!("{}", dashboard.header());

    let hydration = if dashboard.is_authenticated() {
        None
    } else {
        let hydration = dashboard.login(&username, &password).await?;
        println!("{}", dashboard.header());

        if config.last_username.as_deref() != Some(username.as_str()) {
            config.last_username = Some(username);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
        }
        Some(hydration)
    };

    let (from, to) = default_window(Local::now().date_naive());
    println!("\nGrievances {} to {}", from, to);
    for card in dashboard.load_cards(from, to).await {
        println!("  {}", render_card(&card));
    }

    if let Some(hydration) = hydration {
        if let Err(e) = hydration.wait().await {
            warn!(error = %e, "Profile not loaded");
        }
        if dashboard.handle_events() {
            println!("\n{}", dashboard.header());
            if let Some(email) = dashboard.session().and_then(|s| s.email.as_deref()) {
                println!("Signed in as {}", email);
            }
            // Same queries again: served from the cache
            let cards = dashboard.load_cards(from, to).await;
            println!("  {} cards re-rendered, {} cached", cards.len(), dashboard.cached_entries());
        }
    }

    if logout_after {
        dashboard.logout()?;
        println!("\n{}", dashboard.header());
    }

    info!(reloads = dashboard.reloads(), "IGMS dashboard shutting down");
    Ok(())
}
