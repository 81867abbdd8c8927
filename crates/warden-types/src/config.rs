//! Engine configuration types.
//!
//! `EngineConfig` represents the top-level `config.toml` that controls the
//! event bus, optimistic resolution retries, and the isolation tier table.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sandbox::{EffectiveLimits, IsolationLevel};

/// Top-level configuration for the engine.
///
/// Loaded from `~/.warden/config.toml`. All fields have defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the broadcast event bus.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// How many times an install re-resolves when the installed set changed
    /// between resolution and commit.
    #[serde(default = "default_max_resolve_retries")]
    pub max_resolve_retries: u32,

    /// Isolation level of newly provisioned sandbox configs.
    #[serde(default)]
    pub default_isolation_level: IsolationLevel,

    #[serde(default)]
    pub isolation: IsolationTable,
}

fn default_event_bus_capacity() -> usize {
    1024
}

fn default_max_resolve_retries() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
            max_resolve_retries: default_max_resolve_retries(),
            default_isolation_level: IsolationLevel::default(),
            isolation: IsolationTable::default(),
        }
    }
}

impl EngineConfig {
    /// Reject tier tables that break the ordering the sandbox engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_bus_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_bus_capacity must be greater than zero".to_string(),
            ));
        }
        self.isolation.validate()
    }
}

/// Defaults and ceilings for one isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationTier {
    /// Ceilings used when no explicit limit is set.
    pub defaults: EffectiveLimits,
    /// Hard maximum; explicit limits above it are clamped down.
    pub ceiling: EffectiveLimits,
}

/// Tier table for every isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationTable {
    #[serde(default = "default_strict")]
    pub strict: IsolationTier,
    #[serde(default = "default_moderate")]
    pub moderate: IsolationTier,
    #[serde(default = "default_permissive")]
    pub permissive: IsolationTier,
}

fn default_strict() -> IsolationTier {
    IsolationTier {
        defaults: EffectiveLimits {
            max_memory_mb: 128,
            max_execution_time_ms: 5_000,
            max_file_size_kb: 256,
        },
        ceiling: EffectiveLimits {
            max_memory_mb: 256,
            max_execution_time_ms: 10_000,
            max_file_size_kb: 512,
        },
    }
}

fn default_moderate() -> IsolationTier {
    IsolationTier {
        defaults: EffectiveLimits {
            max_memory_mb: 512,
            max_execution_time_ms: 30_000,
            max_file_size_kb: 1_024,
        },
        ceiling: EffectiveLimits {
            max_memory_mb: 1_024,
            max_execution_time_ms: 45_000,
            max_file_size_kb: 4_096,
        },
    }
}

fn default_permissive() -> IsolationTier {
    IsolationTier {
        defaults: EffectiveLimits {
            max_memory_mb: 1_024,
            max_execution_time_ms: 45_000,
            max_file_size_kb: 4_096,
        },
        ceiling: EffectiveLimits {
            max_memory_mb: 2_048,
            max_execution_time_ms: 60_000,
            max_file_size_kb: 10_240,
        },
    }
}

impl Default for IsolationTable {
    fn default() -> Self {
        Self {
            strict: default_strict(),
            moderate: default_moderate(),
            permissive: default_permissive(),
        }
    }
}

impl IsolationTable {
    pub fn tier(&self, level: IsolationLevel) -> &IsolationTier {
        match level {
            IsolationLevel::Strict => &self.strict,
            IsolationLevel::Moderate => &self.moderate,
            IsolationLevel::Permissive => &self.permissive,
        }
    }

    /// Every default must sit under its ceiling, no ceiling may be zero, and
    /// ceilings must be ordered strict <= moderate <= permissive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for level in IsolationLevel::ALL {
            let tier = self.tier(level);
            let ceiling = tier.ceiling;
            if ceiling.max_memory_mb == 0
                || ceiling.max_execution_time_ms == 0
                || ceiling.max_file_size_kb == 0
            {
                return Err(ConfigError::Invalid(format!(
                    "{level} ceiling must be non-zero in every dimension"
                )));
            }
            if !tier.defaults.within(&ceiling) {
                return Err(ConfigError::Invalid(format!(
                    "{level} defaults exceed the {level} ceiling"
                )));
            }
        }

        if !self.strict.ceiling.within(&self.moderate.ceiling)
            || !self.moderate.ceiling.within(&self.permissive.ceiling)
        {
            return Err(ConfigError::Invalid(
                "isolation ceilings must be ordered strict <= moderate <= permissive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.event_bus_capacity, 1024);
        assert_eq!(config.max_resolve_retries, 3);
        assert_eq!(config.default_isolation_level, IsolationLevel::Moderate);
        config.validate().unwrap();
    }

    #[test]
    fn test_engine_config_deserialize_with_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_engine_config_deserialize_with_values() {
        let toml_str = r#"
event_bus_capacity = 64
default_isolation_level = "strict"

[isolation.strict.defaults]
max_memory_mb = 64
max_execution_time_ms = 1000
max_file_size_kb = 128

[isolation.strict.ceiling]
max_memory_mb = 128
max_execution_time_ms = 2000
max_file_size_kb = 256
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.event_bus_capacity, 64);
        assert_eq!(config.default_isolation_level, IsolationLevel::Strict);
        assert_eq!(config.isolation.strict.ceiling.max_memory_mb, 128);
        // Unspecified tiers keep their defaults.
        assert_eq!(config.isolation.moderate, default_moderate());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_default_above_ceiling() {
        let mut config = EngineConfig::default();
        config.isolation.moderate.defaults.max_memory_mb = 4_096;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unordered_ceilings() {
        let mut config = EngineConfig::default();
        config.isolation.strict.ceiling.max_execution_time_ms = 50_000;
        config.isolation.strict.defaults.max_execution_time_ms = 50_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_ceiling() {
        let mut config = EngineConfig::default();
        config.isolation.strict.ceiling.max_file_size_kb = 0;
        config.isolation.strict.defaults.max_file_size_kb = 0;
        assert!(config.validate().is_err());
    }
}
