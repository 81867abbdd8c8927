//! Effective-policy derivation and update validation.
//!
//! Each isolation level has a tier of default ceilings and a hard maximum.
//! An explicit limit replaces the default but is clamped to the maximum, so
//! explicit values can tighten but never loosen a level. Disabling the
//! sandbox is a separate transition that needs explicit confirmation.

use chrono::{DateTime, Utc};
use warden_types::config::IsolationTable;
use warden_types::error::SandboxError;
use warden_types::sandbox::{
    EffectiveLimits, EffectivePolicy, IsolationLevel, ResourceKind, ResourceLimits, SandboxConfig,
    SandboxUpdate,
};

/// Stateless policy engine over an isolation tier table.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    table: IsolationTable,
}

impl SandboxPolicy {
    pub fn new(table: IsolationTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &IsolationTable {
        &self.table
    }

    /// Explicit limits overlaid onto the level's defaults, clamped to the
    /// level's ceiling in every dimension.
    pub fn effective_limits(&self, level: IsolationLevel, explicit: &ResourceLimits) -> EffectiveLimits {
        let tier = self.table.tier(level);
        let (defaults, ceiling) = (tier.defaults, tier.ceiling);

        EffectiveLimits {
            max_memory_mb: explicit
                .max_memory_mb
                .unwrap_or(defaults.max_memory_mb)
                .min(ceiling.max_memory_mb),
            max_execution_time_ms: explicit
                .max_execution_time_ms
                .unwrap_or(defaults.max_execution_time_ms)
                .min(ceiling.max_execution_time_ms),
            max_file_size_kb: explicit
                .max_file_size_kb
                .unwrap_or(defaults.max_file_size_kb)
                .min(ceiling.max_file_size_kb),
        }
    }

    /// Clamp stored explicit limits to the widest ceiling of any level.
    /// Per-level clamping still happens in [`Self::effective_limits`]; this
    /// only keeps absurd requests out of storage.
    fn bounded(&self, limits: ResourceLimits) -> ResourceLimits {
        let Some(widest) = IsolationLevel::ALL
            .iter()
            .map(|level| self.table.tier(*level).ceiling)
            .reduce(|acc, c| EffectiveLimits {
                max_memory_mb: acc.max_memory_mb.max(c.max_memory_mb),
                max_execution_time_ms: acc.max_execution_time_ms.max(c.max_execution_time_ms),
                max_file_size_kb: acc.max_file_size_kb.max(c.max_file_size_kb),
            })
        else {
            return limits;
        };
        ResourceLimits {
            max_memory_mb: limits.max_memory_mb.map(|v| v.min(widest.max_memory_mb)),
            max_execution_time_ms: limits
                .max_execution_time_ms
                .map(|v| v.min(widest.max_execution_time_ms)),
            max_file_size_kb: limits.max_file_size_kb.map(|v| v.min(widest.max_file_size_kb)),
        }
    }

    /// What the execution runtime enforces for `config`.
    pub fn effective(&self, config: &SandboxConfig) -> EffectivePolicy {
        EffectivePolicy {
            plugin_id: config.plugin_id.clone(),
            user_id: config.user_id.clone(),
            enforced: config.enabled,
            isolation_level: config.isolation_level,
            limits: config
                .enabled
                .then(|| self.effective_limits(config.isolation_level, &config.resource_limits)),
        }
    }

    /// Merge a partial update into `current`, producing the full replacement
    /// config. Fails without touching anything when the update would disable
    /// an enabled sandbox without confirmation, or sets a zero limit.
    pub fn apply(
        &self,
        current: &SandboxConfig,
        update: &SandboxUpdate,
        now: DateTime<Utc>,
    ) -> Result<SandboxConfig, SandboxError> {
        let enabled = update.enabled.unwrap_or(current.enabled);
        if current.enabled && !enabled && !update.confirm_disable {
            return Err(SandboxError::DisableNotConfirmed {
                plugin_id: current.plugin_id.clone(),
            });
        }

        let resource_limits = match &update.resource_limits {
            Some(patch) => {
                validate_limits(patch)?;
                self.bounded(current.resource_limits.merged_with(patch))
            }
            None => current.resource_limits,
        };

        Ok(SandboxConfig {
            plugin_id: current.plugin_id.clone(),
            user_id: current.user_id.clone(),
            enabled,
            isolation_level: update.isolation_level.unwrap_or(current.isolation_level),
            resource_limits,
            updated_at: now,
        })
    }
}

/// Reject explicit zero limits; a plugin with zero memory could never run.
pub fn validate_limits(limits: &ResourceLimits) -> Result<(), SandboxError> {
    let zero = |resource| {
        Err(SandboxError::InvalidLimit {
            resource,
            reason: "must be greater than zero".to_string(),
        })
    };
    if limits.max_memory_mb == Some(0) {
        return zero(ResourceKind::Memory);
    }
    if limits.max_execution_time_ms == Some(0) {
        return zero(ResourceKind::ExecutionTime);
    }
    if limits.max_file_size_kb == Some(0) {
        return zero(ResourceKind::FileSize);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SandboxPolicy {
        SandboxPolicy::new(IsolationTable::default())
    }

    fn config(level: IsolationLevel, limits: ResourceLimits) -> SandboxConfig {
        let mut c = SandboxConfig::provisioned("p", "u", level);
        c.resource_limits = limits;
        c
    }

    #[test]
    fn defaults_apply_without_explicit_limits() {
        let limits = engine().effective_limits(IsolationLevel::Moderate, &ResourceLimits::default());
        assert_eq!(
            limits,
            EffectiveLimits {
                max_memory_mb: 512,
                max_execution_time_ms: 30_000,
                max_file_size_kb: 1_024,
            }
        );
    }

    #[test]
    fn explicit_limit_above_ceiling_is_clamped() {
        let explicit = ResourceLimits {
            max_memory_mb: Some(4_096),
            max_execution_time_ms: Some(1_000),
            max_file_size_kb: None,
        };
        let limits = engine().effective_limits(IsolationLevel::Strict, &explicit);
        assert_eq!(limits.max_memory_mb, 256);
        assert_eq!(limits.max_execution_time_ms, 1_000);
        assert_eq!(limits.max_file_size_kb, 256);
    }

    #[test]
    fn effective_never_exceeds_ceiling_over_grid() {
        let engine = engine();
        let memory = [None, Some(1), Some(128), Some(700), Some(2_048), Some(u32::MAX)];
        let time = [None, Some(1), Some(5_000), Some(44_999), Some(u64::MAX)];
        let file = [None, Some(1), Some(512), Some(10_240), Some(u32::MAX)];

        for level in IsolationLevel::ALL {
            let ceiling = engine.table().tier(level).ceiling;
            for m in memory {
                for t in time {
                    for f in file {
                        let explicit = ResourceLimits {
                            max_memory_mb: m,
                            max_execution_time_ms: t,
                            max_file_size_kb: f,
                        };
                        let limits = engine.effective_limits(level, &explicit);
                        assert!(limits.within(&ceiling), "{level} {explicit:?} -> {limits:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn disabled_config_is_not_enforced() {
        let mut c = config(IsolationLevel::Strict, ResourceLimits::default());
        c.enabled = false;
        let policy = engine().effective(&c);
        assert!(!policy.enforced);
        assert!(policy.limits.is_none());
        assert_eq!(policy.isolation_level, IsolationLevel::Strict);
    }

    #[test]
    fn disabling_requires_confirmation() {
        let current = config(IsolationLevel::Moderate, ResourceLimits::default());
        let update = SandboxUpdate {
            enabled: Some(false),
            ..Default::default()
        };
        let err = engine().apply(&current, &update, Utc::now()).unwrap_err();
        assert!(matches!(err, SandboxError::DisableNotConfirmed { .. }));

        let confirmed = SandboxUpdate {
            enabled: Some(false),
            confirm_disable: true,
            ..Default::default()
        };
        let next = engine().apply(&current, &confirmed, Utc::now()).unwrap();
        assert!(!next.enabled);
        assert_eq!(next.isolation_level, IsolationLevel::Moderate);
    }

    #[test]
    fn partial_update_replaces_whole_config() {
        let current = config(
            IsolationLevel::Moderate,
            ResourceLimits {
                max_memory_mb: Some(300),
                max_execution_time_ms: None,
                max_file_size_kb: Some(100),
            },
        );
        let update = SandboxUpdate {
            isolation_level: Some(IsolationLevel::Permissive),
            resource_limits: Some(ResourceLimits {
                max_memory_mb: Some(900),
                ..Default::default()
            }),
            ..Default::default()
        };
        let next = engine().apply(&current, &update, Utc::now()).unwrap();
        assert!(next.enabled);
        assert_eq!(next.isolation_level, IsolationLevel::Permissive);
        assert_eq!(next.resource_limits.max_memory_mb, Some(900));
        assert_eq!(next.resource_limits.max_file_size_kb, Some(100));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let current = config(IsolationLevel::Moderate, ResourceLimits::default());
        let update = SandboxUpdate {
            resource_limits: Some(ResourceLimits {
                max_file_size_kb: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = engine().apply(&current, &update, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            SandboxError::InvalidLimit {
                resource: ResourceKind::FileSize,
                ..
            }
        ));
    }

    #[test]
    fn re_enabling_needs_no_confirmation() {
        let mut current = config(IsolationLevel::Moderate, ResourceLimits::default());
        current.enabled = false;
        let update = SandboxUpdate {
            enabled: Some(true),
            ..Default::default()
        };
        assert!(engine().apply(&current, &update, Utc::now()).unwrap().enabled);
    }

    #[test]
    fn huge_explicit_limit_is_stored_at_widest_ceiling() {
        let current = config(IsolationLevel::Strict, ResourceLimits::default());
        let update = SandboxUpdate {
            resource_limits: Some(ResourceLimits {
                max_execution_time_ms: Some(u64::MAX),
                ..ResourceLimits::default()
            }),
            ..SandboxUpdate::default()
        };
        let next = engine().apply(&current, &update, Utc::now()).unwrap();
        let widest = IsolationTable::default().permissive.ceiling;
        assert_eq!(
            next.resource_limits.max_execution_time_ms,
            Some(widest.max_execution_time_ms)
        );
        assert_eq!(
            engine()
                .effective_limits(IsolationLevel::Strict, &next.resource_limits)
                .max_execution_time_ms,
            IsolationTable::default().strict.ceiling.max_execution_time_ms
        );
    }
}
