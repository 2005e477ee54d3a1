//! Background trip detection.
//!
//! Periodically runs a skip-mode detection pass for every user in the photo
//! index, so new uploads end up in trips without anyone running the CLI.
//!
//! ## Usage
//!
//! ```bash
//! tripdetect-daemon              # Run in foreground
//! tripdetect-daemon --once       # Run one pass and exit
//! ```
//!
//! ## systemd Service
//!
//! ```bash
//! sudo cp tripdetect.service /etc/systemd/system/
//! sudo systemctl enable --now tripdetect
//! ```

use anyhow::{Context, Result};
use chrono::{Local, NaiveTime};
use clap::Parser;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use tripdetect::config::Config;
use tripdetect::db::{Database, PhotoIndex};
use tripdetect::logging::{self, LogTarget};
use tripdetect::notify;
use tripdetect::trips::candidates::PathFilter;
use tripdetect::trips::{SeasonDetector, TripDetector};

#[derive(Parser)]
#[command(name = "tripdetect-daemon", version)]
#[command(about = "Background trip detection for the photo index", long_about = None)]
struct Args {
    /// Run one detection pass and exit
    #[arg(short = '1', long)]
    once: bool,

    /// Seconds between passes (default: daemon.poll_interval from config)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(None, LogTarget::System, "info")?;

    info!("tripdetect daemon starting...");

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Config loaded");

    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    db.initialize()?;
    info!("Database opened at {:?}", config.db_path);

    if args.once {
        info!("Running in single-shot mode");
        run_pass(&db, &config)?;
    } else {
        let poll_interval = args.interval.unwrap_or(config.daemon.poll_interval);
        info!("Running in daemon mode, polling every {} seconds", poll_interval);
        run_daemon_loop(&db, &config, poll_interval);
    }

    info!("tripdetect daemon stopped");
    Ok(())
}

fn run_daemon_loop(db: &Database, config: &Config, poll_interval: u64) {
    loop {
        if should_process_now(config.daemon.hours_start, config.daemon.hours_end) {
            if let Err(e) = run_pass(db, config) {
                error!("Detection pass failed: {:#}", e);
            }
        } else {
            info!("Outside hours of operation, skipping this cycle");
        }

        thread::sleep(Duration::from_secs(poll_interval));
    }
}

/// One skip-mode detection run per user. A failing user is logged and the
/// pass moves on.
fn run_pass(db: &Database, config: &Config) -> Result<()> {
    let users = db.user_ids().context("Failed to list users")?;
    if users.is_empty() {
        info!("No users with photos");
        return Ok(());
    }

    let seasons = SeasonDetector::new(config.detection.season_labels);
    let notifier = notify::from_config(&config.notifications, db);
    let detector = TripDetector::new(db, &seasons, &notifier)
        .with_path_filter(PathFilter::new(config.filters.excluded_dirs.clone()));

    let mut total = 0;
    for user in users {
        let options = config.detection.options(Some(user.clone()));
        match detector.detect_trips(&options) {
            Ok(created) => total += created,
            Err(e) => warn!("Trip detection for {} failed: {:#}", user, e),
        }
    }

    info!("Detection pass complete: {} new trips", total);
    Ok(())
}

fn should_process_now(hours_start: Option<u8>, hours_end: Option<u8>) -> bool {
    within_hours(Local::now().time(), hours_start, hours_end)
}

fn within_hours(now: NaiveTime, hours_start: Option<u8>, hours_end: Option<u8>) -> bool {
    let (start, end) = match (hours_start, hours_end) {
        (Some(s), Some(e)) => (s, e),
        _ => return true, // No hours configured, always process
    };

    let start_time = NaiveTime::from_hms_opt(start as u32, 0, 0).unwrap_or(NaiveTime::MIN);
    let end_time = NaiveTime::from_hms_opt(end as u32, 0, 0).unwrap_or(NaiveTime::MIN);

    if start <= end {
        // Normal range: 9:00 - 17:00
        now >= start_time && now < end_time
    } else {
        // Overnight range: 22:00 - 06:00
        now >= start_time || now < end_time
    }
}
