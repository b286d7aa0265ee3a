//! Due selection and bounded, failure-isolated dispatch of company checks.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use ukci_store::StoreError;
use uuid::Uuid;

use crate::pipeline::{CheckError, CheckSummary, CompanyChecker, ErrorClass};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub not_found: usize,
    pub updates: usize,
    pub alerts_created: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &Result<CheckSummary, CheckError>) {
        match outcome {
            Ok(summary) => {
                self.succeeded += 1;
                self.updates += summary.updates();
                self.alerts_created += summary.alerts_created;
            }
            Err(err) if err.class() == ErrorClass::NotFound => self.not_found += 1,
            Err(_) => self.failed += 1,
        }
    }
}

pub struct CheckScheduler {
    checker: Arc<CompanyChecker>,
    retry: RetryPolicy,
    max_concurrent: usize,
}

impl CheckScheduler {
    pub fn new(checker: Arc<CompanyChecker>, retry: RetryPolicy, max_concurrent: usize) -> Self {
        Self {
            checker,
            retry,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn checker(&self) -> &Arc<CompanyChecker> {
        &self.checker
    }

    /// On-demand check: skips the interval test but still shares the rate limiter
    /// and the retry budget.
    pub async fn check_now(&self, company_id: Uuid) -> Result<CheckSummary, CheckError> {
        let (result, _) = run_with_retry(&self.checker, self.retry, company_id).await;
        result
    }

    /// Checks every due company, oldest cursor first. A failing company is logged and
    /// left due; it never aborts its siblings.
    pub async fn run_due_pass(&self, tenant_id: Option<Uuid>) -> Result<BatchSummary, StoreError> {
        let policy = self.checker.policy();
        let cutoff = Utc::now() - policy.check_interval();
        let due = self
            .checker
            .store()
            .select_due(cutoff, tenant_id, policy.due_batch_limit)
            .await?;

        let mut batch = BatchSummary {
            selected: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return Ok(batch);
        }
        info!(count = due.len(), tenant_id = ?tenant_id, "checking due companies");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        for company in due {
            let semaphore = semaphore.clone();
            let checker = self.checker.clone();
            let retry = self.retry;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let (result, attempts) = run_with_retry(&checker, retry, company.id).await;
                if let Err(err) = &result {
                    error!(
                        company_id = %company.id,
                        registration_number = %company.registration_number,
                        attempts,
                        error = %err,
                        "company check abandoned"
                    );
                }
                result
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => batch.record(&outcome),
                Err(err) => {
                    error!(error = %err, "company check task panicked");
                    batch.failed += 1;
                }
            }
        }

        info!(
            selected = batch.selected,
            succeeded = batch.succeeded,
            failed = batch.failed,
            not_found = batch.not_found,
            alerts_created = batch.alerts_created,
            "due pass finished"
        );
        Ok(batch)
    }
}

async fn run_with_retry(
    checker: &CompanyChecker,
    retry: RetryPolicy,
    company_id: Uuid,
) -> (Result<CheckSummary, CheckError>, usize) {
    let label = company_id.to_string();
    retry
        .run(&label, CheckError::is_retryable, |attempt| {
            if attempt > 1 {
                warn!(%company_id, attempt, "retrying company check");
            }
            checker.check_company(company_id, Utc::now())
        })
        .await
}
