use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use strata_core::{Result, StrataError};

use crate::schema::{StrataConfig, WarningSeverity};

/// Loads and optionally hot-reloads the Strata configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<StrataConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > STRATA_CONFIG env > ~/.strata/strata.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("STRATA_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".strata")
            .join("strata.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::parse_file(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            StrataConfig::default()
        };

        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Parse a TOML string with the same overrides and validation as [`ConfigLoader::load`].
    pub fn from_toml_str(raw: &str) -> Result<StrataConfig> {
        let config = toml::from_str::<StrataConfig>(raw)
            .map_err(|e| StrataError::Config(format!("failed to parse config: {}", e)))?;
        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;
        Ok(config)
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> StrataConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<StrataConfig>> {
        Arc::clone(&self.config)
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn parse_file(path: &Path) -> Result<StrataConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<StrataConfig>(&raw).map_err(|e| {
            StrataError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Validate, logging non-fatal findings.
    fn check(config: &StrataConfig) -> Result<()> {
        for w in config.validate()? {
            match w.severity {
                WarningSeverity::Info => info!("{}", w),
                _ => warn!("{}", w),
            }
        }
        Ok(())
    }

    /// Apply env var overrides (STRATA_LOG_LEVEL, STRATA_DEFAULT_TTL, etc.)
    fn apply_env_overrides(config: StrataConfig) -> StrataConfig {
        Self::apply_overrides_from(config, |key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`. Unparseable numeric values are ignored.
    pub fn apply_overrides_from(
        mut config: StrataConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> StrataConfig {
        if let Some(v) = lookup("STRATA_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = lookup("STRATA_LOG_FORMAT") {
            config.logging.format = v;
        }
        if let Some(v) = lookup("STRATA_DEFAULT_TTL") {
            match v.parse::<u64>() {
                Ok(secs) => config.memory.default_ttl_secs = secs,
                Err(_) => warn!(value = %v, "ignoring invalid STRATA_DEFAULT_TTL"),
            }
        }
        if let Some(v) = lookup("STRATA_SWEEP_INTERVAL") {
            match v.parse::<u64>() {
                Ok(secs) => config.memory.sweep_interval_secs = secs,
                Err(_) => warn!(value = %v, "ignoring invalid STRATA_SWEEP_INTERVAL"),
            }
        }
        if let Some(v) = lookup("STRATA_EMBEDDING_DIMS") {
            match v.parse::<usize>() {
                Ok(dims) => config.memory.embedding_dims = dims,
                Err(_) => warn!(value = %v, "ignoring invalid STRATA_EMBEDDING_DIMS"),
            }
        }
        config
    }

    /// Reload the config from disk. An invalid file leaves the current config in place.
    pub fn reload(&self) -> Result<()> {
        if !self.config_path.exists() {
            return Err(StrataError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::parse_file(&self.config_path)?);
        Self::check(&new_config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    /// Start a background file watcher that reloads when the config file changes.
    /// Returns a handle to the watcher (must be kept alive for watching to continue).
    pub fn watch(&self) -> Result<notify::RecommendedWatcher> {
        let config = Arc::clone(&self.config);
        let config_path = self.config_path.clone();

        info!(?config_path, "starting config file watcher");

        let path_for_event = config_path.clone();
        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let is_our_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == path_for_event.file_name());
                    if !is_our_file {
                        return;
                    }

                    info!("config file changed, reloading");
                    let reloaded = ConfigLoader::parse_file(&path_for_event)
                        .map(ConfigLoader::apply_env_overrides)
                        .and_then(|c| ConfigLoader::check(&c).map(|_| c));
                    match reloaded {
                        Ok(new_config) => {
                            *config.write() = new_config;
                            info!("configuration hot-reloaded successfully");
                        }
                        Err(e) => {
                            warn!(error = %e, "config file has errors, keeping current config");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "file watcher error");
                }
            },
        )
        .map_err(|e| StrataError::Config(format!("failed to create file watcher: {}", e)))?;

        // Watch the parent directory (some editors write a temp file and rename)
        let watch_path = match self.config_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| StrataError::Config(format!("failed to watch config directory: {}", e)))?;

        Ok(watcher)
    }
}
