use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::error;

use tripdetect::config::Config;
use tripdetect::db::{Database, TripStore};
use tripdetect::logging::{self, LogTarget};
use tripdetect::notify;
use tripdetect::trips::candidates::PathFilter;
use tripdetect::trips::{Algorithm, DetectOptions, SeasonDetector, TripDetector};

#[derive(Parser)]
#[command(name = "tripdetect", version)]
#[command(about = "Detect trips in a geotagged photo index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: $XDG_CONFIG_HOME/tripdetect/config.toml,
    /// or TRIPDETECT_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log to stderr instead of journald or the log file
    #[arg(long, global = true)]
    log_stderr: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster photos into trips and store them
    Detect {
        /// Delete existing trips in scope and re-cluster every photo
        #[arg(short, long)]
        force: bool,

        /// Maximum seconds between photos of one trip (timegap only)
        #[arg(long)]
        max_time_gap: Option<i64>,

        /// Minimum photos per trip
        #[arg(long)]
        min_photos: Option<usize>,

        /// Clustering algorithm: timegap or hdbscan
        #[arg(short, long)]
        algorithm: Option<Algorithm>,

        /// Weight of capture-time distance (hdbscan only)
        #[arg(long)]
        time_weight: Option<f64>,

        /// Weight of spatial distance (hdbscan only)
        #[arg(long)]
        location_weight: Option<f64>,

        /// Only process this user's photos
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Delete detected trips
    Cleanup {
        /// Only delete this user's trips
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List detected trips
    List {
        /// Only list this user's trips
        #[arg(short, long)]
        user: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let target = if cli.log_stderr {
        LogTarget::Stderr
    } else {
        LogTarget::System
    };
    let level = if cli.verbose { "debug" } else { "info" };
    if let Err(e) = logging::init(None, target, level) {
        eprintln!("Warning: failed to initialize logging: {:#}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db_path) = cli.db {
        config.db_path = db_path;
    }

    // Reject bad detection options before the database is touched.
    let detect_options = match &cli.command {
        Commands::Detect {
            force,
            max_time_gap,
            min_photos,
            algorithm,
            time_weight,
            location_weight,
            user,
        } => {
            let mut options = config.detection.options(user.clone());
            options.force = *force;
            if let Some(gap) = *max_time_gap {
                options.max_time_gap = gap;
            }
            if let Some(min) = *min_photos {
                options.min_photos = min;
            }
            if let Some(algorithm) = *algorithm {
                options.algorithm = algorithm;
            }
            if let Some(weight) = *time_weight {
                options.time_weight = weight;
            }
            if let Some(weight) = *location_weight {
                options.location_weight = weight;
            }
            options.cluster_params()?;
            Some(options)
        }
        _ => None,
    };

    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    db.initialize().context("Failed to initialize database schema")?;

    match cli.command {
        Commands::Detect { .. } => {
            let options: DetectOptions = detect_options.unwrap_or_default();
            let seasons = SeasonDetector::new(config.detection.season_labels);
            let notifier = notify::from_config(&config.notifications, &db);
            let detector = TripDetector::new(&db, &seasons, &notifier)
                .with_path_filter(PathFilter::new(config.filters.excluded_dirs.clone()));

            let started = Instant::now();
            let count = detector.detect_trips(&options)?;
            println!(
                "Found {} trips in {:.2} seconds",
                count,
                started.elapsed().as_secs_f64()
            );
        }
        Commands::Cleanup { user } => {
            let scope = user.as_deref();
            let photos = db.count_trip_photos(scope)?;
            let trips = db.delete_trips(scope)?;
            println!("Deleted {} trips and {} trip photo associations", trips, photos);
        }
        Commands::List { user } => {
            let trips = db.list_trips(user.as_deref())?;
            if trips.is_empty() {
                println!("No trips found");
                return Ok(());
            }
            for trip in &trips {
                println!(
                    "{:>5}  {:<10}  {:<28}  {:>4} photos  {:>8.1} km  {}",
                    trip.id,
                    trip.user_id,
                    trip.timeframe,
                    trip.photo_count,
                    trip.distance_km,
                    trip.descriptive_name
                );
            }
            println!("{} trips", trips.len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_algorithm_flag_parses_into_enum() {
        let cli = Cli::try_parse_from(["tripdetect", "detect", "--algorithm", "HDBSCAN"]).unwrap();
        match cli.command {
            Commands::Detect { algorithm, .. } => assert_eq!(algorithm, Some(Algorithm::Hdbscan)),
            _ => panic!("expected detect"),
        }
    }

    #[test]
    fn test_unknown_algorithm_rejected_at_parse_time() {
        assert!(Cli::try_parse_from(["tripdetect", "detect", "--algorithm", "kmeans"]).is_err());
    }

    #[test]
    fn test_invalid_options_leave_database_untouched() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        let db_path = dir.path().join("photos.db");
        Config::default().save_to(&config_path).unwrap();

        let cli = Cli::try_parse_from([
            "tripdetect",
            "--config",
            config_path.to_str().unwrap(),
            "--db",
            db_path.to_str().unwrap(),
            "detect",
            "--time-weight",
            "1.5",
        ])
        .unwrap();

        assert!(run(cli).is_err());
        assert!(!db_path.exists());
    }
}
