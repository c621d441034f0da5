//! Demo service - manage demo mode
//!
//! Demo mode runs the client against the in-process demo bank, so it can be
//! tried without a bank server. Its transaction history is kept apart from
//! real history, under demo_logs/.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;

/// Demo service for managing demo mode
pub struct DemoService {
    ebank_dir: PathBuf,
}

impl DemoService {
    pub fn new(ebank_dir: &Path) -> Self {
        Self {
            ebank_dir: ebank_dir.to_path_buf(),
        }
    }

    /// Check if demo mode is currently enabled
    pub fn is_enabled(&self) -> Result<bool> {
        let config = Config::load(&self.ebank_dir)?;
        Ok(config.demo_mode)
    }

    /// Enable demo mode, starting from an empty demo history
    pub fn enable(&self) -> Result<()> {
        self.remove_demo_logs()?;

        let mut config = Config::load(&self.ebank_dir).unwrap_or_default();
        config.enable_demo_mode();
        config.save(&self.ebank_dir)?;
        Ok(())
    }

    /// Disable demo mode; with `clean`, also delete the demo history
    pub fn disable(&self, clean: bool) -> Result<()> {
        let mut config = Config::load(&self.ebank_dir).unwrap_or_default();
        config.disable_demo_mode();
        config.save(&self.ebank_dir)?;

        if clean {
            self.remove_demo_logs()?;
        }
        Ok(())
    }

    pub fn demo_log_dir(&self) -> PathBuf {
        self.ebank_dir.join("demo_logs")
    }

    fn remove_demo_logs(&self) -> Result<()> {
        let dir = self.demo_log_dir();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
        }
        Ok(())
    }
}
