//! Monitoring pipeline: diffing fetched registry state against the store, emitting
//! alerts, and scheduling checks.

pub mod alerts;
pub mod config;
pub mod diff;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod sweep;
pub mod tasks;
pub mod watchlist;

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use ukci_registry::RegistryApi;
use ukci_store::MonitorStore;
use uuid::Uuid;

pub use alerts::AlertEmitter;
pub use config::{ConfigError, MonitorConfig, MonitorPolicy};
pub use diff::{ChangeSet, DiffEngine};
pub use pipeline::{CheckError, CheckSummary, CompanyChecker, ErrorClass};
pub use retry::RetryPolicy;
pub use scheduler::{BatchSummary, CheckScheduler};
pub use sweep::AlertSweeper;
pub use tasks::{TaskRecord, TaskState, TaskTracker};
pub use watchlist::{BulkImportReport, Watchlist, WatchlistError, MAX_BULK_IMPORT};

pub const CRATE_NAME: &str = "ukci-monitor";

/// Entry point shared by the API and the worker: trigger operations run as tracked
/// background tasks whose status can be polled.
pub struct Monitor {
    scheduler: Arc<CheckScheduler>,
    watchlist: Arc<Watchlist>,
    sweeper: Arc<AlertSweeper>,
    tasks: Arc<TaskTracker>,
}

impl Monitor {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        registry: Arc<dyn RegistryApi>,
        policy: MonitorPolicy,
        retry: RetryPolicy,
        max_concurrent_checks: usize,
    ) -> Self {
        let sweeper = Arc::new(AlertSweeper::new(store.clone(), &policy));
        let checker = Arc::new(CompanyChecker::new(store, registry, policy));
        Self {
            scheduler: Arc::new(CheckScheduler::new(
                checker.clone(),
                retry,
                max_concurrent_checks,
            )),
            watchlist: Arc::new(Watchlist::new(checker)),
            sweeper,
            tasks: Arc::new(TaskTracker::default()),
        }
    }

    pub async fn from_config(
        config: &MonitorConfig,
        store: Arc<dyn MonitorStore>,
    ) -> Result<Self, ConfigError> {
        let policy = config.load_policy()?;
        let registry = config.build_registry().await?;
        Ok(Self::new(
            store,
            registry,
            policy,
            config.retry,
            config.max_concurrent_checks,
        ))
    }

    pub fn store(&self) -> &Arc<dyn MonitorStore> {
        self.scheduler.checker().store()
    }

    pub fn registry(&self) -> &Arc<dyn RegistryApi> {
        self.scheduler.checker().registry()
    }

    pub fn policy(&self) -> &MonitorPolicy {
        self.scheduler.checker().policy()
    }

    pub fn scheduler(&self) -> &Arc<CheckScheduler> {
        &self.scheduler
    }

    pub fn watchlist(&self) -> &Arc<Watchlist> {
        &self.watchlist
    }

    pub fn sweeper(&self) -> &Arc<AlertSweeper> {
        &self.sweeper
    }

    /// Queues an on-demand check of one company on behalf of its tenant.
    pub async fn check_company(&self, tenant_id: Uuid, company_id: Uuid) -> TaskRecord {
        let scheduler = self.scheduler.clone();
        self.spawn_tracked("check_company", Some(tenant_id), async move {
            scheduler.check_now(company_id).await
        })
        .await
    }

    /// Queues a due pass; `None` covers every active tenant.
    pub async fn check_all_due(&self, tenant_id: Option<Uuid>) -> TaskRecord {
        let scheduler = self.scheduler.clone();
        self.spawn_tracked("check_all_due", tenant_id, async move {
            scheduler.run_due_pass(tenant_id).await
        })
        .await
    }

    /// Validates the batch up front, then imports in the background.
    pub async fn bulk_import(
        &self,
        tenant_id: Uuid,
        numbers: Vec<String>,
    ) -> Result<TaskRecord, WatchlistError> {
        if numbers.is_empty() || numbers.len() > MAX_BULK_IMPORT {
            return Err(WatchlistError::BatchSize(numbers.len()));
        }
        let watchlist = self.watchlist.clone();
        Ok(self
            .spawn_tracked("bulk_import", Some(tenant_id), async move {
                watchlist.bulk_import(tenant_id, &numbers).await
            })
            .await)
    }

    pub async fn task_status(&self, task_id: Uuid) -> Option<TaskRecord> {
        self.tasks.get(task_id).await
    }

    /// Task lookup scoped to the tenant that triggered it.
    pub async fn tenant_task_status(&self, tenant_id: Uuid, task_id: Uuid) -> Option<TaskRecord> {
        self.tasks.get_for_tenant(tenant_id, task_id).await
    }

    async fn spawn_tracked<T, E, F>(
        &self,
        kind: &str,
        tenant_id: Option<Uuid>,
        work: F,
    ) -> TaskRecord
    where
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let record = self.tasks.create(kind, tenant_id).await;
        let tasks = self.tasks.clone();
        let task_id = record.id;
        let kind = kind.to_string();
        tokio::spawn(async move {
            tasks.start(task_id).await;
            match work.await {
                Ok(summary) => {
                    let summary = serde_json::to_value(summary).unwrap_or(JsonValue::Null);
                    tasks.succeed(task_id, summary).await;
                }
                Err(err) => {
                    error!(%task_id, kind = %kind, error = %err, "task failed");
                    tasks.fail(task_id, err.to_string()).await;
                }
            }
        });
        record
    }

    /// Cron jobs for the due pass and the alert sweep, when the scheduler is enabled.
    pub async fn maybe_build_scheduler(
        self: &Arc<Self>,
        config: &MonitorConfig,
    ) -> Result<Option<JobScheduler>> {
        if !config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;

        let monitor = self.clone();
        let due_job = Job::new_async(config.monitor_cron.as_str(), move |_uuid, _l| {
            let monitor = monitor.clone();
            Box::pin(async move {
                match monitor.scheduler.run_due_pass(None).await {
                    Ok(batch) => info!(selected = batch.selected, "scheduled due pass done"),
                    Err(err) => error!(error = %err, "scheduled due pass failed"),
                }
                monitor.tasks.prune_finished(Utc::now()).await;
            })
        })
        .with_context(|| format!("creating scheduler job for cron {}", config.monitor_cron))?;
        sched.add(due_job).await.context("adding due-pass job")?;

        let monitor = self.clone();
        let sweep_job = Job::new_async(config.sweep_cron.as_str(), move |_uuid, _l| {
            let monitor = monitor.clone();
            Box::pin(async move {
                if let Err(err) = monitor.sweeper.sweep(Utc::now()).await {
                    error!(error = %err, "scheduled alert sweep failed");
                }
                if let Err(err) = monitor.sweeper.unread_digest().await {
                    error!(error = %err, "unread digest failed");
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {}", config.sweep_cron))?;
        sched.add(sweep_job).await.context("adding sweep job")?;

        info!(
            monitor_cron = %config.monitor_cron,
            sweep_cron = %config.sweep_cron,
            "scheduler jobs registered"
        );
        Ok(Some(sched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;
    use ukci_core::{NewTenant, SubscriptionTier};
    use ukci_registry::FixtureRegistry;
    use ukci_store::MemoryStore;

    async fn monitor() -> (Arc<Monitor>, Uuid) {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/companies");
        let registry = Arc::new(FixtureRegistry::from_dir(root).await.expect("fixtures"));
        let store = Arc::new(MemoryStore::new());
        let tenant = store
            .create_tenant(NewTenant {
                name: "Acme Risk".into(),
                subscription_tier: SubscriptionTier::Free,
            })
            .await
            .expect("tenant");
        let monitor = Monitor::new(
            store,
            registry,
            MonitorPolicy::default(),
            RetryPolicy::no_retry(),
            2,
        );
        (Arc::new(monitor), tenant.id)
    }

    async fn wait_finished(monitor: &Monitor, task_id: Uuid) -> TaskRecord {
        for _ in 0..200 {
            if let Some(record) = monitor.task_status(task_id).await {
                if record.state.is_finished() {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {task_id} did not finish");
    }

    #[tokio::test]
    async fn refresh_task_reports_summary() {
        let (monitor, tenant_id) = monitor().await;
        let company = monitor
            .watchlist()
            .add_company(tenant_id, "00445790")
            .await
            .expect("add");

        let task = monitor.check_company(tenant_id, company.id).await;
        let done = wait_finished(&monitor, task.id).await;
        assert_eq!(done.state, TaskState::Succeeded);
        assert_eq!(done.tenant_id, Some(tenant_id));
        let summary = done.summary.expect("summary");
        assert_eq!(summary["registration_number"], "00445790");
        assert_eq!(summary["alerts_created"], 0);
    }

    #[tokio::test]
    async fn failed_task_records_the_error() {
        let (monitor, tenant_id) = monitor().await;
        let task = monitor.check_company(tenant_id, Uuid::new_v4()).await;
        let done = wait_finished(&monitor, task.id).await;
        assert_eq!(done.state, TaskState::Failed);
        assert!(done.error.expect("error").contains("not on any watchlist"));
    }

    #[tokio::test]
    async fn due_pass_task_counts_companies() {
        let (monitor, tenant_id) = monitor().await;
        let task = monitor
            .bulk_import(tenant_id, vec!["00445790".into()])
            .await
            .expect("queued");
        let imported = wait_finished(&monitor, task.id).await;
        assert_eq!(imported.state, TaskState::Succeeded);
        assert!(monitor
            .tenant_task_status(tenant_id, task.id)
            .await
            .is_some());
        assert!(monitor
            .tenant_task_status(Uuid::new_v4(), task.id)
            .await
            .is_none());

        let task = monitor.check_all_due(Some(tenant_id)).await;
        let done = wait_finished(&monitor, task.id).await;
        assert_eq!(done.summary.expect("summary")["selected"], 0);

        assert!(matches!(
            monitor.bulk_import(tenant_id, Vec::new()).await,
            Err(WatchlistError::BatchSize(0))
        ));
    }

    #[tokio::test]
    async fn scheduler_is_off_unless_enabled() {
        let (monitor, _tenant_id) = monitor().await;
        let config = MonitorConfig {
            scheduler_enabled: false,
            ..MonitorConfig::from_env()
        };
        assert!(monitor
            .maybe_build_scheduler(&config)
            .await
            .expect("build")
            .is_none());
    }
}
