//! Persistence for tenants, watched companies, their filings and officers, and alerts.
//!
//! `PgStore` is the production backend; `MemoryStore` mirrors its semantics for tests
//! and offline runs.

mod memory;
mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::error::{DatabaseError, ErrorKind};
use thiserror::Error;
use ukci_core::{
    Alert, AlertType, Company, CompanySnapshotUpdate, Filing, NewAlert, NewCompany, NewTenant,
    Officer, Tenant,
};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const CRATE_NAME: &str = "ukci-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// Unique constraint hit; the record already exists.
    #[error("record already exists")]
    Conflict,

    #[error("related record not found")]
    InvalidReference,

    #[error("storage error")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        if matches!(error, sqlx::Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::Conflict,
            Some(ErrorKind::ForeignKeyViolation) => Self::InvalidReference,
            Some(_) | None => Self::Database(error),
        }
    }
}

/// Status transition gated by compare-and-set on the stored status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusWrite {
    pub previous: Option<String>,
    pub current: String,
    pub alert: NewAlert,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilingWrite {
    pub filing: Filing,
    /// Written only when this commit actually inserts the filing row.
    pub alert: Option<NewAlert>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfficerWrite {
    pub officer: Officer,
    pub alert: Option<NewAlert>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResignationWrite {
    pub officer_id: String,
    pub resigned_on: NaiveDate,
    pub alert: NewAlert,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilingDueWrite {
    /// Skip the alert if a `filing_due` alert exists at or after this instant.
    pub dedup_since: DateTime<Utc>,
    pub alert: NewAlert,
}

/// Everything one successful check writes, applied in a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckCommit {
    pub tenant_id: Uuid,
    pub company_id: Uuid,
    pub checked_at: DateTime<Utc>,
    pub snapshot: CompanySnapshotUpdate,
    pub status: Option<StatusWrite>,
    pub filings: Vec<FilingWrite>,
    pub officers: Vec<OfficerWrite>,
    pub resignations: Vec<ResignationWrite>,
    pub filing_due: Option<FilingDueWrite>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub status_changed: bool,
    pub filings_added: usize,
    pub officers_added: usize,
    pub resignations: usize,
    pub alerts_created: usize,
    /// Writes skipped because another check already applied them.
    pub conflicts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub company_id: Option<Uuid>,
    pub alert_type: Option<AlertType>,
    #[serde(default = "default_alert_limit")]
    pub limit: i64,
}

fn default_alert_limit() -> i64 {
    50
}

impl Default for AlertQuery {
    fn default() -> Self {
        Self {
            unread_only: false,
            company_id: None,
            alert_type: None,
            limit: default_alert_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub read_expired: u64,
    pub past_expiry: u64,
}

/// Transactional store scoped per tenant.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Creates a tenant with a slug derived from its name, suffixed on collision.
    async fn create_tenant(&self, tenant: NewTenant) -> Result<Tenant, StoreError>;
    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError>;
    async fn list_active_tenants(&self) -> Result<Vec<Tenant>, StoreError>;
    /// Cascades to the tenant's companies, filings, officers and alerts.
    async fn delete_tenant(&self, tenant_id: Uuid) -> Result<bool, StoreError>;

    /// Fails with `Conflict` when the tenant already tracks this registration number.
    async fn insert_company(&self, company: NewCompany) -> Result<Company, StoreError>;
    async fn get_company(&self, tenant_id: Uuid, company_id: Uuid)
        -> Result<Option<Company>, StoreError>;
    /// Unscoped lookup used by background checks that only carry a company id.
    async fn get_company_by_id(&self, company_id: Uuid) -> Result<Option<Company>, StoreError>;
    async fn find_company(
        &self,
        tenant_id: Uuid,
        registration_number: &str,
    ) -> Result<Option<Company>, StoreError>;
    async fn list_companies(
        &self,
        tenant_id: Uuid,
        monitored: Option<bool>,
    ) -> Result<Vec<Company>, StoreError>;
    async fn set_monitoring(
        &self,
        tenant_id: Uuid,
        company_id: Uuid,
        monitored: bool,
    ) -> Result<Option<Company>, StoreError>;
    async fn delete_company(&self, tenant_id: Uuid, company_id: Uuid) -> Result<bool, StoreError>;

    /// Monitored companies of active tenants never checked or last checked before
    /// `cutoff`, never-checked first and then oldest first.
    async fn select_due(
        &self,
        cutoff: DateTime<Utc>,
        tenant_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Company>, StoreError>;

    async fn filing_ids(&self, company_id: Uuid) -> Result<HashSet<String>, StoreError>;
    async fn list_filings(&self, company_id: Uuid, limit: i64) -> Result<Vec<Filing>, StoreError>;
    async fn list_officers(&self, company_id: Uuid) -> Result<Vec<Officer>, StoreError>;
    async fn last_alert_at(
        &self,
        company_id: Uuid,
        alert_type: AlertType,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Applies one check atomically. Alerts are written only alongside the row
    /// changes that justify them, so a retried or racing check cannot duplicate them.
    async fn commit_check(&self, commit: CheckCommit) -> Result<CommitReport, StoreError>;

    async fn insert_alert(&self, alert: NewAlert) -> Result<Alert, StoreError>;
    async fn list_alerts(&self, tenant_id: Uuid, query: &AlertQuery)
        -> Result<Vec<Alert>, StoreError>;
    async fn mark_alert_read(&self, tenant_id: Uuid, alert_id: Uuid) -> Result<bool, StoreError>;
    async fn count_unread(&self, tenant_id: Uuid) -> Result<i64, StoreError>;
    /// Deletes read alerts created before `read_before` and alerts past their expiry.
    async fn sweep_alerts(
        &self,
        read_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, StoreError>;
}

fn statuses_match(stored: Option<&str>, expected: Option<&str>) -> bool {
    stored.map(ukci_core::normalize_status) == expected.map(ukci_core::normalize_status)
}
