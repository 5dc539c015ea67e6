use directories::{BaseDirs, ProjectDirs};
use eyre::{eyre, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

static CONFIG_DIR_OVERRIDE: Lazy<RwLock<Option<PathBuf>>> = Lazy::new(|| RwLock::new(None));

/// Override the configuration directory for the current process.
/// Subsequent calls replace the previous override.
pub fn set_config_dir<P: AsRef<Path>>(path: P) {
    *CONFIG_DIR_OVERRIDE.write() = Some(path.as_ref().to_path_buf());
}

/// Clear any previously configured override.
pub fn clear_config_dir_override() {
    CONFIG_DIR_OVERRIDE.write().take();
}

/// Return the current override path, if one has been set.
pub fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE.read().clone()
}

/// Resolve the configuration directory.
/// Priority: explicit override -> platform standard -> ~/.config/sync-engine
pub fn config_dir() -> Result<PathBuf> {
    if let Some(path) = CONFIG_DIR_OVERRIDE.read().clone() {
        return Ok(path);
    }

    if let Some(proj) = ProjectDirs::from("com", "sync-engine", "sync-engine") {
        return Ok(proj.config_dir().to_path_buf());
    }

    if let Some(base) = BaseDirs::new() {
        return Ok(base.home_dir().join(".config").join("sync-engine"));
    }

    Err(eyre!(
        "unable to determine configuration directory (no override and no platform default)"
    ))
}

/// Safety-guard thresholds for the planner's big-delete guard (spec S5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Below this baseline size, the guard never trips.
    pub big_delete_min_items: usize,
    /// Absolute count of delete-class actions that trips the guard.
    pub big_delete_max_count: usize,
    /// Percentage (strictly greater than) of baseline size that trips the guard.
    pub big_delete_max_percent: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            big_delete_min_items: 10,
            big_delete_max_count: 1000,
            big_delete_max_percent: 50.0,
        }
    }
}

/// Buffer/debounce and watch-loop knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub safety: SafetyConfig,
    /// `0` means unlimited, per spec §4.1.
    pub buffer_max_paths: usize,
    pub debounce: Duration,
    pub remote_poll_interval: Duration,
    pub remote_backoff_initial: Duration,
    pub remote_backoff_cap: Duration,
    /// Watch-mode per-path failure tracker (spec §7, §9 open question).
    pub failure_threshold: u32,
    pub failure_window: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            safety: SafetyConfig::default(),
            buffer_max_paths: 0,
            debounce: Duration::from_millis(500),
            remote_poll_interval: Duration::from_secs(30),
            remote_backoff_initial: Duration::from_secs(5),
            remote_backoff_cap: Duration::from_secs(300),
            failure_threshold: 3,
            failure_window: Duration::from_secs(30 * 60),
        }
    }
}

impl SyncConfig {
    /// Load configuration from `<config_dir>/config.toml`, falling back to defaults
    /// when the file is absent. A present-but-invalid file is an error.
    pub fn load() -> Result<Self> {
        let path = config_dir()?.join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| eyre!("reading config file {}: {e}", path.display()))?;
        toml::from_str(&raw).map_err(|e| eyre!("parsing config file {}: {e}", path.display()))
    }
}
