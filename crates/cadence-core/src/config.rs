use crate::error::{CoreError, Result};
use crate::io;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for external collaborator calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Scheduler scan period. The domain tolerates minutes of jitter.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Bound on concurrently executing lifecycle steps.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Timeout on each external collaborator call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_version() -> u32 {
    1
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_max_workers() -> usize {
    8
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            tick_interval_secs: default_tick_interval_secs(),
            max_workers: default_max_workers(),
            call_timeout_ms: default_call_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(CoreError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: EngineConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.max_workers == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "max_workers is 0: no lifecycle step can ever run".into(),
            });
        }
        if self.retry.attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "retry.attempts is 0: every transient failure degrades immediately"
                    .into(),
            });
        }
        if self.tick_interval_secs < 1 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "tick_interval_secs below 1s: the domain only needs minute precision"
                    .into(),
            });
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                    self.retry.base_delay_ms, self.retry.max_delay_ms
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = EngineConfig::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: EngineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.tick_interval_secs, 60);
        assert_eq!(parsed.max_workers, 8);
        assert_eq!(parsed.retry, RetryConfig::default());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg: EngineConfig = serde_yaml::from_str("tick_interval_secs: 120\n").unwrap();
        assert_eq!(cfg.tick_interval_secs, 120);
        assert_eq!(cfg.max_workers, 8);
        assert_eq!(cfg.retry.attempts, 3);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = EngineConfig::default();
        cfg.max_workers = 2;
        cfg.save(dir.path()).unwrap();
        let loaded = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.max_workers, 2);
    }

    #[test]
    fn load_uninitialized_root_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            EngineConfig::load(dir.path()),
            Err(CoreError::NotInitialized)
        ));
    }

    #[test]
    fn validate_clean_config_no_warnings() {
        assert!(EngineConfig::default().validate().is_empty());
    }

    #[test]
    fn validate_zero_workers_is_error() {
        let mut cfg = EngineConfig::default();
        cfg.max_workers = 0;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("max_workers")));
    }

    #[test]
    fn validate_inverted_backoff_warns() {
        let mut cfg = EngineConfig::default();
        cfg.retry.base_delay_ms = 60_000;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("base_delay_ms")));
    }
}
