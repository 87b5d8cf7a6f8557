//! Migration and transfer execution
//!
//! Runs claimed environment migrations and resource transfers. The actual
//! config and data movement goes through the `ResourceMover` collaborator;
//! this module owns step ordering, progress reporting, and terminal reports.

use anyhow::{Context, Result};
use async_trait::async_trait;
use berth_core::domain::migration::{EnvironmentMigration, execution_order};
use berth_core::domain::resource::ResourceRef;
use berth_core::domain::transfer::{ResourceTransfer, TransferMode};
use berth_core::dto::migration::{CompleteMigration, MigrationProgress};
use berth_core::dto::transfer::TransferProgress;
use berth_core::error::LifecycleError;
use berth_client::OrchestratorClient;
use std::sync::Arc;
use tracing::{error, info};

/// Moves resource configuration and data between servers.
///
/// Production shells out to the target server's tooling; tests script it.
#[async_trait]
pub trait ResourceMover: Send + Sync {
    /// Apply a resource's configuration on the target server.
    ///
    /// `update_existing` overwrites a matching resource on the target;
    /// otherwise the apply creates a new one and fails on a name collision.
    async fn copy_config(
        &self,
        resource: ResourceRef,
        config: &serde_json::Value,
        target_server_ref: &str,
        update_existing: bool,
    ) -> Result<(), LifecycleError>;

    /// Copy a resource's persisted data to the target server.
    ///
    /// `tables` filters database copies; empty means everything. Returns the
    /// number of bytes moved.
    async fn copy_data(
        &self,
        resource: ResourceRef,
        target_server_ref: &str,
        tables: &[String],
    ) -> Result<i64, LifecycleError>;

    /// Estimate the data volume of a resource before copying.
    async fn estimate_bytes(&self, resource: ResourceRef) -> Result<i64, LifecycleError>;
}

/// Podman-backed mover: configuration lands as a secret on the target
/// connection, data moves as a volume tarball through the local workspace.
pub struct ShellResourceMover {
    workspace_base: String,
}

impl ShellResourceMover {
    pub fn new(workspace_base: String) -> Self {
        Self { workspace_base }
    }

    async fn run(args: &[&str]) -> Result<(), LifecycleError> {
        let output = tokio::process::Command::new("podman")
            .args(args)
            .output()
            .await
            .map_err(|e| LifecycleError::TransientInfra(format!("failed to spawn podman: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(LifecycleError::TransientInfra(format!(
                "podman {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    fn volume_name(resource: ResourceRef) -> String {
        format!("berth-data-{}", resource.id)
    }
}

#[async_trait]
impl ResourceMover for ShellResourceMover {
    async fn copy_config(
        &self,
        resource: ResourceRef,
        config: &serde_json::Value,
        target_server_ref: &str,
        update_existing: bool,
    ) -> Result<(), LifecycleError> {
        let path = format!("{}/config-{}.json", self.workspace_base, resource.id);
        let body = serde_json::to_vec_pretty(config)
            .map_err(|e| LifecycleError::TransientInfra(format!("serialize config: {}", e)))?;

        tokio::fs::create_dir_all(&self.workspace_base)
            .await
            .map_err(|e| LifecycleError::TransientInfra(format!("workspace: {}", e)))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| LifecycleError::TransientInfra(format!("write config: {}", e)))?;

        let secret = format!("berth-{}-{}-config", resource.kind, resource.id);
        let mut args = vec!["--connection", target_server_ref, "secret", "create"];
        if update_existing {
            args.push("--replace");
        }
        args.push(&secret);
        args.push(&path);
        let result = Self::run(&args).await;

        let _ = tokio::fs::remove_file(&path).await;
        result
    }

    async fn copy_data(
        &self,
        resource: ResourceRef,
        target_server_ref: &str,
        tables: &[String],
    ) -> Result<i64, LifecycleError> {
        let volume = Self::volume_name(resource);
        let archive = format!("{}/data-{}.tar", self.workspace_base, resource.id);

        tokio::fs::create_dir_all(&self.workspace_base)
            .await
            .map_err(|e| LifecycleError::TransientInfra(format!("workspace: {}", e)))?;

        // A table filter narrows the dump to the named tables before the
        // volume leaves the source server.
        if !tables.is_empty() {
            let container = format!("berth-db-{}", resource.id);
            let mut args: Vec<&str> = vec![
                "exec",
                &container,
                "pg_dump",
                "-f",
                "/var/lib/postgresql/data/partial.sql",
            ];
            for table in tables {
                args.push("-t");
                args.push(table);
            }
            Self::run(&args).await?;
        }

        Self::run(&["volume", "export", "-o", &archive, &volume]).await?;

        let bytes = tokio::fs::metadata(&archive)
            .await
            .map(|m| m.len() as i64)
            .unwrap_or(0);

        let result = Self::run(&[
            "--connection",
            target_server_ref,
            "volume",
            "import",
            &volume,
            &archive,
        ])
        .await;

        let _ = tokio::fs::remove_file(&archive).await;
        result.map(|_| bytes)
    }

    async fn estimate_bytes(&self, _resource: ResourceRef) -> Result<i64, LifecycleError> {
        // Volume size is only known after export; zero reads as "unknown".
        Ok(0)
    }
}

// =============================================================================
// Environment Migrations
// =============================================================================

pub struct MigrationRunner {
    client: Arc<OrchestratorClient>,
    mover: Arc<dyn ResourceMover>,
}

impl MigrationRunner {
    pub fn new(client: Arc<OrchestratorClient>, mover: Arc<dyn ResourceMover>) -> Self {
        Self { client, mover }
    }

    /// Executes one claimed migration to a terminal state.
    pub async fn run(&self, migration: EnvironmentMigration) -> Result<()> {
        info!(
            "Executing migration {} ({} -> server {})",
            migration.id, migration.source, migration.target_server_ref
        );

        let result = self.execute(&migration).await;

        let report = match &result {
            Ok(()) => CompleteMigration {
                success: true,
                error_message: None,
            },
            Err(e) => {
                error!("Migration {} failed: {}", migration.id, e);
                CompleteMigration {
                    success: false,
                    error_message: Some(e.to_string()),
                }
            }
        };

        self.client
            .complete_migration(migration.id, report)
            .await
            .context("Failed to report migration completion")?;

        result.map_err(Into::into)
    }

    async fn execute(&self, migration: &EnvironmentMigration) -> Result<(), LifecycleError> {
        // The source leads its linked group, then dependents in rank order.
        let mut group = vec![migration.source];
        group.extend(migration.linked_resources.iter().copied());
        let ordered = execution_order(&group);

        let total = ordered.len() as i32;
        let payload = migration_payload(migration);

        for (index, resource) in ordered.iter().enumerate() {
            let step = format!("migrating {}", resource);
            self.report_progress(migration, (index as i32 * 100) / total, &step)
                .await;

            // Linked resources carry their config inside the captured source
            // config; the source resource uses it directly. Volume data never
            // moves here; the transfer pipeline owns data movement.
            self.mover
                .copy_config(
                    *resource,
                    &payload,
                    &migration.target_server_ref,
                    migration.options.update_existing,
                )
                .await?;
        }

        self.report_progress(migration, 100, "finalizing").await;
        Ok(())
    }

    async fn report_progress(&self, migration: &EnvironmentMigration, progress: i32, step: &str) {
        let req = MigrationProgress {
            progress,
            current_step: step.to_string(),
        };
        if let Err(e) = self.client.migration_progress(migration.id, req).await {
            tracing::warn!(
                "Failed to report progress for migration {}: {}",
                migration.id,
                e
            );
        }
    }
}

/// Shapes the captured source configuration for the target: env vars and
/// volume definitions ride along only when the options ask for them.
fn migration_payload(migration: &EnvironmentMigration) -> serde_json::Value {
    let mut config = migration
        .rollback_snapshot
        .as_ref()
        .map(|s| s.source_config.clone())
        .unwrap_or(serde_json::Value::Null);

    if let Some(map) = config.as_object_mut() {
        if !migration.options.copy_env_vars {
            map.remove("env_vars");
        }
        if !migration.options.copy_volume_config {
            map.remove("volumes");
        }
    }

    config
}

// =============================================================================
// Resource Transfers
// =============================================================================

pub struct TransferRunner {
    client: Arc<OrchestratorClient>,
    mover: Arc<dyn ResourceMover>,
}

impl TransferRunner {
    pub fn new(client: Arc<OrchestratorClient>, mover: Arc<dyn ResourceMover>) -> Self {
        Self { client, mover }
    }

    /// Executes one claimed transfer to a terminal state.
    pub async fn run(&self, transfer: ResourceTransfer) -> Result<()> {
        info!(
            "Executing transfer {} ({} -> server {}, mode {:?})",
            transfer.id, transfer.source, transfer.target_server_ref, transfer.mode
        );

        let result = self.execute(&transfer).await;

        let report = match &result {
            Ok(()) => CompleteMigration {
                success: true,
                error_message: None,
            },
            Err(e) => {
                error!("Transfer {} failed: {}", transfer.id, e);
                CompleteMigration {
                    success: false,
                    error_message: Some(e.to_string()),
                }
            }
        };

        self.client
            .complete_transfer(transfer.id, report)
            .await
            .context("Failed to report transfer completion")?;

        result.map_err(Into::into)
    }

    async fn execute(&self, transfer: &ResourceTransfer) -> Result<(), LifecycleError> {
        let bytes_total = self.mover.estimate_bytes(transfer.source).await?;

        self.report_progress(transfer, 0, bytes_total, "estimating")
            .await;

        // Clone mode replicates configuration before data; data-only modes
        // leave target configuration untouched.
        if transfer.mode == TransferMode::Clone {
            if let Some(snapshot) = &transfer.rollback_snapshot {
                self.report_progress(transfer, 0, bytes_total, "copying configuration")
                    .await;
                self.mover
                    .copy_config(
                        transfer.source,
                        &snapshot.source_config,
                        &transfer.target_server_ref,
                        false,
                    )
                    .await?;
            }
        }

        self.report_progress(transfer, 0, bytes_total, "copying data")
            .await;

        let bytes_copied = self
            .mover
            .copy_data(transfer.source, &transfer.target_server_ref, &transfer.tables)
            .await?;

        self.report_progress(transfer, bytes_copied, bytes_total.max(bytes_copied), "done")
            .await;

        Ok(())
    }

    async fn report_progress(
        &self,
        transfer: &ResourceTransfer,
        bytes_copied: i64,
        bytes_total: i64,
        step: &str,
    ) {
        let req = TransferProgress {
            bytes_copied,
            bytes_total,
            current_step: step.to_string(),
        };
        if let Err(e) = self.client.transfer_progress(transfer.id, req).await {
            tracing::warn!(
                "Failed to report progress for transfer {}: {}",
                transfer.id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::domain::migration::{MigrationOptions, MigrationStatus, RollbackSnapshot};
    use berth_core::domain::resource::ResourceKind;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingMover {
        config_calls: AtomicU32,
        data_calls: AtomicU32,
        last_update_existing: Mutex<Option<bool>>,
    }

    #[async_trait]
    impl ResourceMover for RecordingMover {
        async fn copy_config(
            &self,
            _resource: ResourceRef,
            _config: &serde_json::Value,
            _target_server_ref: &str,
            update_existing: bool,
        ) -> Result<(), LifecycleError> {
            self.config_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_update_existing.lock().unwrap() = Some(update_existing);
            Ok(())
        }

        async fn copy_data(
            &self,
            _resource: ResourceRef,
            _target_server_ref: &str,
            _tables: &[String],
        ) -> Result<i64, LifecycleError> {
            self.data_calls.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }

        async fn estimate_bytes(&self, _resource: ResourceRef) -> Result<i64, LifecycleError> {
            Ok(0)
        }
    }

    fn test_migration(options: MigrationOptions) -> EnvironmentMigration {
        EnvironmentMigration {
            id: Uuid::new_v4(),
            source: ResourceRef::new(ResourceKind::Application, Uuid::new_v4()),
            source_environment_id: Uuid::new_v4(),
            target_environment_id: Uuid::new_v4(),
            target_server_ref: "prod-1".into(),
            options,
            status: MigrationStatus::InProgress,
            requires_approval: false,
            requested_by: None,
            approved_by: None,
            decided_at: None,
            rejection_reason: None,
            rollback_snapshot: Some(RollbackSnapshot {
                source_config: serde_json::json!({
                    "image": "registry.example.com/web:v3",
                    "env_vars": {"DATABASE_URL": "postgres://db/web"},
                    "volumes": [{"name": "web-data", "mount": "/data"}],
                }),
                target_config: None,
                captured_at: chrono::Utc::now(),
            }),
            linked_resources: vec![],
            progress: 0,
            current_step: None,
            error_message: None,
            worker_id: Some("w1".into()),
            created_at: chrono::Utc::now(),
            started_at: Some(chrono::Utc::now()),
            completed_at: None,
        }
    }

    // Progress reports fail against the unroutable address and are only
    // warned about, so execution itself is observable through the mover.
    fn runner(mover: Arc<RecordingMover>) -> MigrationRunner {
        let client = Arc::new(OrchestratorClient::new("http://127.0.0.1:1".to_string()));
        MigrationRunner::new(client, mover)
    }

    #[test]
    fn test_group_ordering_puts_databases_first() {
        let app = ResourceRef::new(ResourceKind::Application, Uuid::new_v4());
        let db = ResourceRef::new(ResourceKind::Database, Uuid::new_v4());
        let svc = ResourceRef::new(ResourceKind::Service, Uuid::new_v4());

        let ordered = execution_order(&[app, svc, db]);
        assert_eq!(ordered[0], db);
        assert_eq!(ordered[1], svc);
        assert_eq!(ordered[2], app);
    }

    #[tokio::test]
    async fn test_migration_copies_configuration_never_volume_data() {
        let mover = Arc::new(RecordingMover::default());
        let migration = test_migration(MigrationOptions::default());

        runner(mover.clone()).execute(&migration).await.unwrap();

        assert_eq!(mover.config_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mover.data_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_existing_reaches_the_mover() {
        let mover = Arc::new(RecordingMover::default());
        let migration = test_migration(MigrationOptions {
            update_existing: true,
            ..Default::default()
        });

        runner(mover.clone()).execute(&migration).await.unwrap();

        assert_eq!(*mover.last_update_existing.lock().unwrap(), Some(true));
    }

    #[test]
    fn test_payload_keeps_everything_by_default() {
        let migration = test_migration(MigrationOptions::default());
        let payload = migration_payload(&migration);

        assert!(payload.get("env_vars").is_some());
        assert!(payload.get("volumes").is_some());
    }

    #[test]
    fn test_payload_strips_env_vars_when_not_copied() {
        let migration = test_migration(MigrationOptions {
            copy_env_vars: false,
            ..Default::default()
        });
        let payload = migration_payload(&migration);

        assert!(payload.get("env_vars").is_none());
        assert!(payload.get("volumes").is_some());
    }

    #[test]
    fn test_payload_strips_volume_config_when_not_copied() {
        let migration = test_migration(MigrationOptions {
            copy_volume_config: false,
            ..Default::default()
        });
        let payload = migration_payload(&migration);

        assert!(payload.get("volumes").is_none());
        assert!(payload.get("image").is_some());
    }
}
