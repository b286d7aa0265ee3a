//! Adding and removing companies from a tenant's watchlist.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use ukci_core::{normalize_registration_number, Company, NewCompany};
use ukci_registry::RegistryError;
use ukci_store::StoreError;
use uuid::Uuid;

use crate::pipeline::CompanyChecker;

pub const MAX_BULK_IMPORT: usize = 100;

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("invalid company number {0:?}")]
    InvalidNumber(String),
    #[error("tenant {0} not found")]
    UnknownTenant(Uuid),
    #[error("company {0} not found")]
    UnknownCompany(Uuid),
    #[error("company {0} is already being monitored")]
    AlreadyMonitored(String),
    #[error("company {0} does not exist in the registry")]
    NotInRegistry(String),
    #[error("bulk import takes between 1 and {MAX_BULK_IMPORT} company numbers, got {0}")]
    BatchSize(usize),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Added,
    AlreadyMonitored,
    Invalid,
    NotFound,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub input: String,
    pub status: ImportStatus,
    pub company_id: Option<Uuid>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkImportReport {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<ImportOutcome>,
}

pub struct Watchlist {
    checker: Arc<CompanyChecker>,
}

impl Watchlist {
    pub fn new(checker: Arc<CompanyChecker>) -> Self {
        Self { checker }
    }

    /// Starts monitoring `number` for the tenant and records a baseline check.
    ///
    /// A company the tenant stopped monitoring is switched back on. A failed baseline
    /// check is logged and leaves the company due for the next pass.
    pub async fn add_company(
        &self,
        tenant_id: Uuid,
        number: &str,
    ) -> Result<Company, WatchlistError> {
        let store = self.checker.store();
        let number = normalize_registration_number(number)
            .ok_or_else(|| WatchlistError::InvalidNumber(number.to_string()))?;
        if store.get_tenant(tenant_id).await?.is_none() {
            return Err(WatchlistError::UnknownTenant(tenant_id));
        }

        let company = match store.find_company(tenant_id, &number).await? {
            Some(existing) if existing.is_monitored => {
                return Err(WatchlistError::AlreadyMonitored(number));
            }
            Some(existing) => store
                .set_monitoring(tenant_id, existing.id, true)
                .await?
                .ok_or(WatchlistError::UnknownCompany(existing.id))?,
            None => {
                let profile = self
                    .checker
                    .registry()
                    .fetch_profile(&number)
                    .await?
                    .ok_or_else(|| WatchlistError::NotInRegistry(number.clone()))?;
                match store
                    .insert_company(NewCompany::from_profile(tenant_id, &profile))
                    .await
                {
                    Ok(company) => company,
                    Err(StoreError::Conflict) => {
                        return Err(WatchlistError::AlreadyMonitored(number));
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        let emitter = self.checker.emitter();
        emitter
            .emit(store.as_ref(), emitter.monitoring_started(&company))
            .await?;
        info!(
            %tenant_id,
            company_id = %company.id,
            registration_number = %number,
            "monitoring started"
        );

        if let Err(err) = self.checker.check_company(company.id, Utc::now()).await {
            warn!(
                company_id = %company.id,
                error = %err,
                "baseline check failed; company stays due"
            );
        }
        Ok(store
            .get_company(tenant_id, company.id)
            .await?
            .unwrap_or(company))
    }

    /// Adds each number in turn, recording a per-number outcome instead of failing fast.
    pub async fn bulk_import(
        &self,
        tenant_id: Uuid,
        numbers: &[String],
    ) -> Result<BulkImportReport, WatchlistError> {
        if numbers.is_empty() || numbers.len() > MAX_BULK_IMPORT {
            return Err(WatchlistError::BatchSize(numbers.len()));
        }
        if self.checker.store().get_tenant(tenant_id).await?.is_none() {
            return Err(WatchlistError::UnknownTenant(tenant_id));
        }

        let mut report = BulkImportReport::default();
        for input in numbers {
            let outcome = match self.add_company(tenant_id, input).await {
                Ok(company) => ImportOutcome {
                    input: input.clone(),
                    status: ImportStatus::Added,
                    company_id: Some(company.id),
                    error: None,
                },
                Err(err) => {
                    let status = match &err {
                        WatchlistError::InvalidNumber(_) => ImportStatus::Invalid,
                        WatchlistError::AlreadyMonitored(_) => ImportStatus::AlreadyMonitored,
                        WatchlistError::NotInRegistry(_) => ImportStatus::NotFound,
                        _ => ImportStatus::Failed,
                    };
                    ImportOutcome {
                        input: input.clone(),
                        status,
                        company_id: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            match outcome.status {
                ImportStatus::Added => report.added += 1,
                ImportStatus::AlreadyMonitored => report.skipped += 1,
                _ => report.failed += 1,
            }
            report.results.push(outcome);
        }
        info!(
            %tenant_id,
            added = report.added,
            skipped = report.skipped,
            failed = report.failed,
            "bulk import finished"
        );
        Ok(report)
    }

    pub async fn set_monitoring(
        &self,
        tenant_id: Uuid,
        company_id: Uuid,
        monitored: bool,
    ) -> Result<Company, WatchlistError> {
        self.checker
            .store()
            .set_monitoring(tenant_id, company_id, monitored)
            .await?
            .ok_or(WatchlistError::UnknownCompany(company_id))
    }
}
