use serde::{Deserialize, Serialize};
use std::time::Duration;

use strata_core::StrataError;

/// Root configuration, mapped from `strata.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    pub memory: MemoryConfig,
    pub logging: LoggingConfig,
}

// ── Memory ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Default TTL of short-term records, in seconds. 0 = never expire.
    pub default_ttl_secs: u64,
    /// Background TTL sweep period, in seconds. 0 = no background sweep.
    pub sweep_interval_secs: u64,
    /// Embedding dimension. 0 = fixed by the first inserted embedding.
    pub embedding_dims: usize,
    /// Similarity metric for the vector index. Only "cosine" is supported.
    pub vector_metric: String,
    /// Length (in chars) of cached vector previews.
    pub preview_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 86_400,
            sweep_interval_secs: 300,
            embedding_dims: 1536,
            vector_metric: "cosine".into(),
            preview_chars: 200,
        }
    }
}

impl MemoryConfig {
    /// `None` means short-term records never expire by default.
    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_secs > 0).then(|| Duration::from_secs(self.default_ttl_secs))
    }

    /// `None` means no background sweeper should run.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn embedding_dims(&self) -> Option<usize> {
        (self.embedding_dims > 0).then_some(self.embedding_dims)
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

pub const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
pub const VALID_FORMATS: [&str; 3] = ["pretty", "json", "compact"];
pub const VALID_METRICS: [&str; 1] = ["cosine"];

/// A config validation finding.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "{} {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl StrataConfig {
    /// Check the config for problems. Non-fatal findings are returned;
    /// any `Error`-severity finding fails with `ConfigValidation`.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, StrataError> {
        let mut warnings = Vec::new();

        // ── Memory ───
        let metric = self.memory.vector_metric.as_str();
        if !VALID_METRICS.contains(&metric) {
            warnings.push(ConfigWarning {
                field: "memory.vector_metric".into(),
                message: format!("unsupported metric '{}'", metric),
                severity: WarningSeverity::Error,
                hint: Some(format!("Valid values: {}", VALID_METRICS.join(", "))),
            });
        }

        if self.memory.preview_chars == 0 {
            warnings.push(ConfigWarning {
                field: "memory.preview_chars".into(),
                message: "preview length is 0, previews will be empty".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 200".into()),
            });
        }

        if self.memory.default_ttl_secs == 0 {
            warnings.push(ConfigWarning {
                field: "memory.default_ttl_secs".into(),
                message: "short-term records never expire by default".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        } else if self.memory.sweep_interval_secs > self.memory.default_ttl_secs {
            warnings.push(ConfigWarning {
                field: "memory.sweep_interval_secs".into(),
                message: format!(
                    "sweep interval {}s exceeds default TTL {}s, expired entries linger in memory",
                    self.memory.sweep_interval_secs, self.memory.default_ttl_secs
                ),
                severity: WarningSeverity::Warning,
                hint: Some("Lower the sweep interval or raise the default TTL".into()),
            });
        }

        if self.memory.sweep_interval_secs == 0 && self.memory.default_ttl_secs > 0 {
            warnings.push(ConfigWarning {
                field: "memory.sweep_interval_secs".into(),
                message: "background sweep disabled, expired entries are only evicted on read".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }

        // ── Logging ───
        let level = self.logging.level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Error,
                hint: Some(format!("Valid values: {}", VALID_LEVELS.join(", "))),
            });
        }

        if !VALID_FORMATS.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}', falling back to pretty", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", VALID_FORMATS.join(", "))),
            });
        }

        let errors: Vec<&ConfigWarning> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .collect();

        if let Some(first) = errors.first() {
            let mut reason = first.message.clone();
            if errors.len() > 1 {
                let rest: Vec<&str> = errors[1..].iter().map(|w| w.field.as_str()).collect();
                reason.push_str(&format!(" (also invalid: {})", rest.join(", ")));
            }
            return Err(StrataError::ConfigValidation {
                field: first.field.clone(),
                reason,
            });
        }

        Ok(warnings)
    }
}
