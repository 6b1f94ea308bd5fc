//! File-backed rule configuration store.
//!
//! One JSON file (`renaming-rules.json`) under the configured directory.
//! First run seeds the built-in defaults; every save rotates a timestamped
//! backup (five kept) and writes atomically via temp-then-rename.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use metafuse_core::Result;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::defaults::default_config;
use crate::model::RuleConfig;

const CONFIG_FILE: &str = "renaming-rules.json";
const BACKUP_PREFIX: &str = "renaming-rules.backup.";
const BACKUPS_KEPT: usize = 5;

/// Loads and saves the rule configuration file.
pub struct RuleConfigStore {
    config_dir: PathBuf,
}

impl RuleConfigStore {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Load the current configuration.
    ///
    /// A missing file seeds the built-in defaults (and writes them, so the
    /// UI has something to edit). A file that fails to parse falls back to
    /// the defaults without touching the broken file.
    pub fn load(&self) -> RuleConfig {
        let path = self.config_path();
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<RuleConfig>(&raw) {
                Ok(config) => {
                    debug!(rules = config.rules.len(), "loaded rule config");
                    config
                }
                Err(e) => {
                    warn!("failed to parse {}, using defaults: {e}", path.display());
                    default_config()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no rule config found, seeding defaults");
                let config = default_config();
                if let Err(e) = self.write_config(&config) {
                    warn!("could not seed default rule config: {e}");
                }
                config
            }
            Err(e) => {
                warn!("failed to read {}, using defaults: {e}", path.display());
                default_config()
            }
        }
    }

    /// Persist a new configuration.
    ///
    /// Backs up the current file, strips `isDefault`, stamps
    /// `lastModified`, fills any missing rule ids, and writes atomically.
    /// Returns the stamped config as written.
    pub fn save(&self, mut config: RuleConfig) -> Result<RuleConfig> {
        self.backup_current()?;

        config.is_default = false;
        config.last_modified = Some(Utc::now());
        for rule in &mut config.rules {
            if rule.id.trim().is_empty() {
                rule.id = Uuid::new_v4().to_string();
            }
        }
        if let Some(default_rule) = &mut config.default_rule {
            if default_rule.id.trim().is_empty() {
                default_rule.id = Uuid::new_v4().to_string();
            }
        }

        self.write_config(&config)?;
        info!(rules = config.rules.len(), "saved rule config");
        Ok(config)
    }

    fn write_config(&self, config: &RuleConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir)?;
        let path = self.config_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(config)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn backup_current(&self) -> Result<()> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(());
        }
        let backup = self
            .config_dir
            .join(format!("{BACKUP_PREFIX}{}.json", Utc::now().timestamp_millis()));
        fs::copy(&path, &backup)?;
        self.prune_backups()?;
        Ok(())
    }

    fn prune_backups(&self) -> Result<()> {
        let mut backups: Vec<PathBuf> = fs::read_dir(&self.config_dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| is_backup(p))
            .collect();
        // Name order is chronological: the prefix is epoch milliseconds.
        backups.sort();
        while backups.len() > BACKUPS_KEPT {
            let oldest = backups.remove(0);
            debug!("pruning old backup {}", oldest.display());
            fs::remove_file(oldest)?;
        }
        Ok(())
    }
}

fn is_backup(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(".json"))
}
