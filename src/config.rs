use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::trips::candidates::default_excluded_dirs;
use crate::trips::{
    Algorithm, DetectOptions, DEFAULT_LOCATION_WEIGHT, DEFAULT_MAX_TIME_GAP, DEFAULT_MIN_PHOTOS,
    DEFAULT_SELECTION_EPSILON, DEFAULT_TIME_WEIGHT,
};

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "TRIPDETECT_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Seconds between two photos of the same trip (time-gap strategy).
    #[serde(default = "default_max_time_gap")]
    pub max_time_gap: i64,

    #[serde(default = "default_min_photos")]
    pub min_photos: usize,

    #[serde(default = "default_time_weight")]
    pub time_weight: f64,

    #[serde(default = "default_location_weight")]
    pub location_weight: f64,

    #[serde(default = "default_selection_epsilon")]
    pub selection_epsilon: f64,

    /// Leave trips alone until their newest photo is this many days old.
    #[serde(default)]
    pub settle_days: Option<u32>,

    /// Prefix trip names with a season ("Early Summer in Rome").
    #[serde(default = "default_season_labels")]
    pub season_labels: bool,
}

fn default_max_time_gap() -> i64 {
    DEFAULT_MAX_TIME_GAP
}

fn default_min_photos() -> usize {
    DEFAULT_MIN_PHOTOS
}

fn default_time_weight() -> f64 {
    DEFAULT_TIME_WEIGHT
}

fn default_location_weight() -> f64 {
    DEFAULT_LOCATION_WEIGHT
}

fn default_selection_epsilon() -> f64 {
    DEFAULT_SELECTION_EPSILON
}

fn default_season_labels() -> bool {
    true
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            max_time_gap: default_max_time_gap(),
            min_photos: default_min_photos(),
            time_weight: default_time_weight(),
            location_weight: default_location_weight(),
            selection_epsilon: default_selection_epsilon(),
            settle_days: None,
            season_labels: default_season_labels(),
        }
    }
}

impl DetectionConfig {
    /// Detection options for a skip-mode run over `user`.
    pub fn options(&self, user: Option<String>) -> DetectOptions {
        DetectOptions {
            force: false,
            max_time_gap: self.max_time_gap,
            min_photos: self.min_photos,
            algorithm: self.algorithm,
            time_weight: self.time_weight,
            location_weight: self.location_weight,
            user,
            selection_epsilon: self.selection_epsilon,
            settle_days: self.settle_days,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Path components marking internal storage (previews, caches).
    /// Directories starting with `appdata_` are always excluded.
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            excluded_dirs: default_excluded_dirs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_notifications_enabled")]
    pub enabled: bool,

    /// Keep notifications in the database inbox.
    #[serde(default = "default_store_in_db")]
    pub store_in_db: bool,

    /// Optional endpoint receiving each notification as JSON.
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_notifications_enabled() -> bool {
    true
}

fn default_store_in_db() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_notifications_enabled(),
            store_in_db: default_store_in_db(),
            webhook_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between detection passes.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Hour of day (0-23) detection may start.
    #[serde(default)]
    pub hours_start: Option<u8>,

    /// Hour of day (0-23) detection must stop.
    #[serde(default)]
    pub hours_end: Option<u8>,
}

fn default_poll_interval() -> u64 {
    3600
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            hours_start: None,
            hours_end: None,
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripdetect")
        .join("tripdetect.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            detection: DetectionConfig::default(),
            filters: FilterConfig::default(),
            notifications: NotificationConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults there if missing.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tripdetect")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.detection.min_photos, DEFAULT_MIN_PHOTOS);
        assert_eq!(config.detection.algorithm, Algorithm::TimeGap);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.filters.excluded_dirs, config.filters.excluded_dirs);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
db_path = "/tmp/photos.db"

[detection]
algorithm = "hdbscan"
min_photos = 8

[daemon]
hours_start = 22
hours_end = 6
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/photos.db"));
        assert_eq!(config.detection.algorithm, Algorithm::Hdbscan);
        assert_eq!(config.detection.min_photos, 8);
        assert_eq!(config.detection.max_time_gap, DEFAULT_MAX_TIME_GAP);
        assert!(config.detection.season_labels);
        assert_eq!(config.daemon.hours_start, Some(22));
        assert_eq!(config.daemon.poll_interval, 3600);
        assert!(config.notifications.enabled);
    }

    #[test]
    fn test_invalid_algorithm_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detection]\nalgorithm = \"kmeans\"\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_detection_options_from_config() {
        let detection = DetectionConfig {
            settle_days: Some(2),
            ..DetectionConfig::default()
        };
        let options = detection.options(Some("alice".to_string()));
        assert!(!options.force);
        assert_eq!(options.user.as_deref(), Some("alice"));
        assert_eq!(options.settle_days, Some(2));
    }
}
