use eyre::{Context, Result};
use std::sync::Arc;
use sync_core::baseline_store::BaselineStore;
use sync_core::config::SyncConfig;
use sync_core::failure_tracker::FailureTracker;

pub struct AppContext {
    pub config: SyncConfig,
    pub store: Arc<BaselineStore>,
    /// Lives for the process lifetime, so a long-running watch loop built
    /// on top of repeated `run` cycles accumulates failures across cycles
    /// rather than forgetting them each time (spec §7).
    pub failures: Arc<FailureTracker>,
}

impl AppContext {
    pub fn load(db_path: &str) -> Result<Self> {
        let config = SyncConfig::load().unwrap_or_else(|err| {
            log::warn!("failed to load config, using defaults: {err:?}");
            SyncConfig::default()
        });
        let store = if db_path == ":memory:" {
            BaselineStore::open_in_memory()
        } else {
            BaselineStore::open(db_path)
        }
        .context("opening baseline store")?;
        let failures = Arc::new(FailureTracker::new(config.failure_threshold, config.failure_window));
        Ok(Self {
            config,
            store: Arc::new(store),
            failures,
        })
    }
}
