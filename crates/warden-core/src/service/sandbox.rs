//! Sandbox service: reads and replaces the per-pair sandbox config.

use std::sync::Arc;

use chrono::Utc;
use warden_types::error::SandboxError;
use warden_types::event::EngineEvent;
use warden_types::sandbox::{EffectivePolicy, SandboxConfig, SandboxUpdate};

use super::EngineContext;
use crate::repository::manifest::ManifestRepository;
use crate::repository::state::{PairWrite, SandboxWrite, StateRepository};

pub struct SandboxService<M: ManifestRepository, S: StateRepository> {
    ctx: Arc<EngineContext<M, S>>,
}

impl<M: ManifestRepository, S: StateRepository> SandboxService<M, S> {
    pub fn new(ctx: Arc<EngineContext<M, S>>) -> Self {
        Self { ctx }
    }

    /// The stored config, or the config install would provision when none
    /// is stored yet.
    pub async fn get(&self, plugin_id: &str, user_id: &str) -> Result<SandboxConfig, SandboxError> {
        let snapshot = self.ctx.state.snapshot(user_id, plugin_id).await?;
        match snapshot.sandbox {
            Some(config) => Ok(config),
            None => self.default_config(plugin_id, user_id).await,
        }
    }

    /// Merge `update` into the current config and store the result as a
    /// full replacement.
    #[tracing::instrument(name = "update_sandbox", skip(self, update), fields(plugin_id = %plugin_id, user_id = %user_id))]
    pub async fn update(
        &self,
        plugin_id: &str,
        user_id: &str,
        update: &SandboxUpdate,
    ) -> Result<SandboxConfig, SandboxError> {
        let _guard = self.ctx.locks.pair(user_id, plugin_id).await;

        let current = match self.ctx.state.snapshot(user_id, plugin_id).await?.sandbox {
            Some(config) => config,
            None => self.default_config(plugin_id, user_id).await?,
        };
        let next = self.ctx.policy.apply(&current, update, Utc::now())?;

        let mut write = PairWrite::new(user_id, plugin_id);
        write.sandbox = SandboxWrite::Put(next.clone());
        self.ctx.commit(&write).await?;

        if current.enabled && !next.enabled {
            tracing::warn!("sandbox disabled, no limits are enforced for this plugin");
            self.ctx.events.publish(EngineEvent::SandboxDisabled {
                user_id: user_id.to_string(),
                plugin_id: plugin_id.to_string(),
            });
        } else {
            tracing::info!(
                enabled = next.enabled,
                isolation_level = %next.isolation_level,
                "sandbox updated"
            );
        }
        self.ctx.events.publish(EngineEvent::SandboxUpdated { config: next.clone() });

        Ok(next)
    }

    /// What the execution runtime enforces for the pair right now.
    pub async fn effective(&self, plugin_id: &str, user_id: &str) -> Result<EffectivePolicy, SandboxError> {
        let config = self.get(plugin_id, user_id).await?;
        Ok(self.ctx.policy.effective(&config))
    }

    async fn default_config(&self, plugin_id: &str, user_id: &str) -> Result<SandboxConfig, SandboxError> {
        if self.ctx.latest(plugin_id).await?.is_none() {
            return Err(SandboxError::UnknownPlugin(plugin_id.to_string()));
        }
        Ok(SandboxConfig::provisioned(
            plugin_id,
            user_id,
            self.ctx.config.default_isolation_level,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{engine, manifest, publish_all};
    use warden_types::sandbox::{IsolationLevel, ResourceKind, ResourceLimits, ResourceUsage};

    #[tokio::test]
    async fn get_defaults_before_anything_is_stored() {
        let engine = engine();
        publish_all(&engine, &[manifest("p", "1.0.0")]).await;
        let config = engine.sandbox().get("p", "u1").await.unwrap();
        assert!(config.enabled);
        assert_eq!(config.isolation_level, IsolationLevel::Moderate);
        assert!(matches!(
            engine.sandbox().get("ghost", "u1").await,
            Err(SandboxError::UnknownPlugin(_))
        ));
    }

    #[tokio::test]
    async fn update_merges_and_clamps_effective_limits() {
        let engine = engine();
        publish_all(&engine, &[manifest("p", "1.0.0")]).await;
        let sandbox = engine.sandbox();

        let update = SandboxUpdate {
            isolation_level: Some(IsolationLevel::Strict),
            resource_limits: Some(ResourceLimits {
                max_memory_mb: Some(4_096),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = sandbox.update("p", "u1", &update).await.unwrap();
        assert_eq!(config.resource_limits.max_memory_mb, Some(4_096));

        let policy = sandbox.effective("p", "u1").await.unwrap();
        let limits = policy.limits.unwrap();
        assert_eq!(limits.max_memory_mb, 256);
        assert_eq!(limits.max_execution_time_ms, 5_000);

        // A second partial update keeps the earlier fields.
        let update = SandboxUpdate {
            resource_limits: Some(ResourceLimits {
                max_file_size_kb: Some(100),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = sandbox.update("p", "u1", &update).await.unwrap();
        assert_eq!(config.isolation_level, IsolationLevel::Strict);
        assert_eq!(config.resource_limits.max_memory_mb, Some(4_096));
        assert_eq!(config.resource_limits.max_file_size_kb, Some(100));
    }

    #[tokio::test]
    async fn disabling_requires_confirmation() {
        let engine = engine();
        publish_all(&engine, &[manifest("p", "1.0.0")]).await;
        let mut rx = engine.events().subscribe();
        let sandbox = engine.sandbox();

        let mut update = SandboxUpdate {
            enabled: Some(false),
            ..Default::default()
        };
        assert!(matches!(
            sandbox.update("p", "u1", &update).await,
            Err(SandboxError::DisableNotConfirmed { .. })
        ));
        assert!(sandbox.get("p", "u1").await.unwrap().enabled);

        update.confirm_disable = true;
        let config = sandbox.update("p", "u1", &update).await.unwrap();
        assert!(!config.enabled);

        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::SandboxDisabled { .. }));
        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::SandboxUpdated { .. }));

        let policy = sandbox.effective("p", "u1").await.unwrap();
        assert!(!policy.enforced);
        assert!(policy.limits.is_none());
        let usage = ResourceUsage {
            memory_mb: u32::MAX,
            execution_time_ms: u64::MAX,
            file_size_kb: u32::MAX,
        };
        assert!(policy.check_usage(&usage).is_ok());
    }

    #[tokio::test]
    async fn effective_policy_reports_exceeded_ceiling() {
        let engine = engine();
        publish_all(&engine, &[manifest("p", "1.0.0")]).await;
        let policy = engine.sandbox().effective("p", "u1").await.unwrap();
        let usage = ResourceUsage {
            memory_mb: 100,
            execution_time_ms: 31_000,
            file_size_kb: 10,
        };
        match policy.check_usage(&usage) {
            Err(SandboxError::LimitExceeded { resource, used, limit, .. }) => {
                assert_eq!(resource, ResourceKind::ExecutionTime);
                assert_eq!(used, 31_000);
                assert_eq!(limit, 30_000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let engine = engine();
        publish_all(&engine, &[manifest("p", "1.0.0")]).await;
        let update = SandboxUpdate {
            resource_limits: Some(ResourceLimits {
                max_execution_time_ms: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            engine.sandbox().update("p", "u1", &update).await,
            Err(SandboxError::InvalidLimit { .. })
        ));
    }
}
