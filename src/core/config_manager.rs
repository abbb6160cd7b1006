use crate::app::config::SageConfig;
use anyhow::Error;
use parking_lot::{RwLock, RwLockReadGuard};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Loads the local config file and hands out read snapshots. Keeping
/// the reload path here leaves room for a file watcher later without
/// touching callers.
pub struct ConfigManager {
    path: PathBuf,
    cfg: Arc<RwLock<SageConfig>>,
    started: AtomicBool,
}

impl ConfigManager {
    fn reload(&self) -> Result<(), Error> {
        let cfg = SageConfig::load(&self.path)?;
        *self.cfg.write() = cfg;

        Ok(())
    }

    pub fn new(cfg_path: PathBuf) -> ConfigManager {
        ConfigManager {
            path: cfg_path,
            cfg: Arc::new(RwLock::new(SageConfig::default())),
            started: AtomicBool::new(false),
        }
    }

    /// Loads initial config
    pub fn start(&self) -> Result<(), Error> {
        self.reload()?;
        self.started.store(true, Ordering::Release);

        Ok(())
    }

    /// Get an immutable read for the current config
    pub fn get(&self) -> RwLockReadGuard<'_, SageConfig> {
        if !self.started.load(Ordering::Acquire) {
            panic!("ConfigManager not started yet but fetching config");
        }

        self.cfg.read()
    }
}
