use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, info_span, Instrument};
use ukci_core::{AlertType, Company};
use ukci_registry::{RegistryApi, RegistryError};
use ukci_store::{CheckCommit, CommitReport, MonitorStore, StoreError};
use uuid::Uuid;

use crate::alerts::AlertEmitter;
use crate::config::MonitorPolicy;
use crate::diff::{DiffEngine, FetchedSnapshot, PersistedSnapshot};

/// Where a failure sits in the retry taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    NotFound,
    RateLimited,
    Transient,
    DataConflict,
    Configuration,
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("company {0} is not on any watchlist")]
    UnknownCompany(Uuid),

    #[error("company {number} does not exist in the registry")]
    NotFound { number: String },

    #[error("registry request for {number} failed: {source}")]
    Registry {
        number: String,
        #[source]
        source: RegistryError,
    },

    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
}

impl CheckError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownCompany(_) | Self::NotFound { .. } => ErrorClass::NotFound,
            Self::Registry { source, .. } if source.is_configuration() => {
                ErrorClass::Configuration
            }
            Self::Registry {
                source: RegistryError::RateLimited { .. },
                ..
            } => ErrorClass::RateLimited,
            Self::Registry { .. } => ErrorClass::Transient,
            Self::Store(StoreError::Conflict) => ErrorClass::DataConflict,
            Self::Store(StoreError::NotFound) => ErrorClass::NotFound,
            Self::Store(_) => ErrorClass::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Registry { source, .. } => source.is_retryable(),
            Self::Store(StoreError::Database(_)) => true,
            _ => false,
        }
    }
}

/// Outcome of one committed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub company_id: Uuid,
    pub registration_number: String,
    pub status_changed: bool,
    pub filings_added: usize,
    pub officers_added: usize,
    pub resignations: usize,
    pub alerts_created: usize,
    pub conflicts: usize,
}

impl CheckSummary {
    fn new(company_id: Uuid, registration_number: String, report: CommitReport) -> Self {
        Self {
            company_id,
            registration_number,
            status_changed: report.status_changed,
            filings_added: report.filings_added,
            officers_added: report.officers_added,
            resignations: report.resignations,
            alerts_created: report.alerts_created,
            conflicts: report.conflicts,
        }
    }

    /// Rows written by the check, alerts excluded.
    pub fn updates(&self) -> usize {
        usize::from(self.status_changed)
            + self.filings_added
            + self.officers_added
            + self.resignations
    }
}

/// Runs one fetch, diff and commit cycle for a single company.
pub struct CompanyChecker {
    store: Arc<dyn MonitorStore>,
    registry: Arc<dyn RegistryApi>,
    policy: MonitorPolicy,
    diff: DiffEngine,
    emitter: AlertEmitter,
}

impl CompanyChecker {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        registry: Arc<dyn RegistryApi>,
        policy: MonitorPolicy,
    ) -> Self {
        let diff = DiffEngine::new(&policy);
        Self {
            store,
            registry,
            emitter: AlertEmitter::new(diff.clone()),
            diff,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn MonitorStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<dyn RegistryApi> {
        &self.registry
    }

    pub fn policy(&self) -> &MonitorPolicy {
        &self.policy
    }

    pub fn emitter(&self) -> &AlertEmitter {
        &self.emitter
    }

    /// Nothing is written unless every registry read succeeds; the store applies the
    /// result in one transaction, so a failed attempt leaves the company due.
    pub async fn check_company(
        &self,
        company_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CheckSummary, CheckError> {
        let prepared = self.prepare(company_id, now).await?;
        self.commit(prepared).await
    }

    /// Fetches the registry view and diffs it against the store without writing.
    pub async fn prepare(
        &self,
        company_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PreparedCheck, CheckError> {
        let company = self
            .store
            .get_company_by_id(company_id)
            .await?
            .ok_or(CheckError::UnknownCompany(company_id))?;
        let number = company.registration_number.clone();
        let span = info_span!("check_company", %company_id, registration_number = %number);

        async {
            let registry_err = |source| CheckError::Registry {
                number: number.clone(),
                source,
            };

            let profile = self
                .registry
                .fetch_profile(&number)
                .await
                .map_err(registry_err)?
                .ok_or_else(|| CheckError::NotFound {
                    number: number.clone(),
                })?;
            let since = company.last_checked_at.map(|cursor| {
                (cursor - self.policy.filing_lookback()).date_naive()
            });
            let filings = self
                .registry
                .fetch_filings(&number, since)
                .await
                .map_err(registry_err)?;
            let officers = self
                .registry
                .fetch_officers(&number)
                .await
                .map_err(registry_err)?;
            let charges = self
                .registry
                .fetch_charges(&number)
                .await
                .map_err(registry_err)?;

            let filing_ids = self.store.filing_ids(company.id).await?;
            let persisted_officers = self.store.list_officers(company.id).await?;
            let last_filing_due_alert = self
                .store
                .last_alert_at(company.id, AlertType::FilingDue)
                .await?;

            let changes = self.diff.compute_changes(
                &PersistedSnapshot {
                    company: &company,
                    filing_ids: &filing_ids,
                    officers: &persisted_officers,
                    last_filing_due_alert,
                },
                &FetchedSnapshot {
                    profile: &profile,
                    filings: &filings,
                    officers: &officers,
                },
                company.last_checked_at,
                now,
            );
            debug!(
                filings = changes.new_filings.len(),
                officers = changes.new_officers.len(),
                resignations = changes.resignations.len(),
                "changes detected"
            );
            let commit = self
                .emitter
                .plan_commit(&company, &profile, &charges, &changes, now);
            Ok::<_, CheckError>(PreparedCheck { company, commit })
        }
        .instrument(span)
        .await
    }

    pub async fn commit(&self, prepared: PreparedCheck) -> Result<CheckSummary, CheckError> {
        let PreparedCheck { company, commit } = prepared;
        let report = self.store.commit_check(commit).await?;
        info!(
            company_id = %company.id,
            registration_number = %company.registration_number,
            status_changed = report.status_changed,
            filings_added = report.filings_added,
            officers_added = report.officers_added,
            resignations = report.resignations,
            alerts_created = report.alerts_created,
            conflicts = report.conflicts,
            "company check committed"
        );
        Ok(CheckSummary::new(
            company.id,
            company.registration_number,
            report,
        ))
    }
}

/// A diffed check waiting to be committed.
#[derive(Debug, Clone)]
pub struct PreparedCheck {
    pub company: Company,
    pub commit: CheckCommit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::path::Path;
    use ukci_core::{NewCompany, NewTenant, SubscriptionTier};
    use ukci_registry::{FixtureRegistry, RegistryOp};
    use ukci_store::MemoryStore;

    const NUMBER: &str = "00445790";
    const PERSON_LINK: &str = "/officers/kX9zQ2mR1aBcDeFgHiJkLmNoPqR/appointments";

    struct Harness {
        store: Arc<MemoryStore>,
        registry: Arc<FixtureRegistry>,
        checker: CompanyChecker,
        tenant_id: Uuid,
        company_id: Uuid,
    }

    async fn harness() -> Harness {
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
        let profile = registry
            .fetch_profile(NUMBER)
            .await
            .expect("fetch")
            .expect("profile");
        let company = store
            .insert_company(NewCompany::from_profile(tenant.id, &profile))
            .await
            .expect("company");
        let checker =
            CompanyChecker::new(store.clone(), registry.clone(), MonitorPolicy::default());
        Harness {
            store,
            registry,
            checker,
            tenant_id: tenant.id,
            company_id: company.id,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .expect("date")
            .and_utc()
    }

    #[tokio::test]
    async fn baseline_check_persists_history_quietly() {
        let h = harness().await;
        let summary = h
            .checker
            .check_company(h.company_id, at(2026, 10, 18))
            .await
            .expect("check");

        assert_eq!(summary.filings_added, 3);
        assert_eq!(summary.officers_added, 2);
        assert!(!summary.status_changed);
        assert_eq!(summary.alerts_created, 0);

        let company = h
            .store
            .get_company_by_id(h.company_id)
            .await
            .expect("get")
            .expect("company");
        assert_eq!(company.last_checked_at, Some(at(2026, 10, 18)));
        assert_eq!(company.risk_score, 1, "one outstanding charge");
    }

    #[tokio::test]
    async fn repeated_checks_without_changes_create_no_alerts() {
        let h = harness().await;
        h.checker
            .check_company(h.company_id, at(2026, 10, 18))
            .await
            .expect("first");
        let second = h
            .checker
            .check_company(h.company_id, at(2026, 10, 19))
            .await
            .expect("second");
        assert_eq!(second.updates(), 0);
        assert_eq!(second.alerts_created, 0);
    }

    #[tokio::test]
    async fn dissolution_produces_one_status_alert() {
        let h = harness().await;
        h.checker
            .check_company(h.company_id, at(2026, 10, 18))
            .await
            .expect("baseline");
        h.registry.set_status(NUMBER, "dissolved").await;

        let summary = h
            .checker
            .check_company(h.company_id, at(2026, 10, 19))
            .await
            .expect("check");
        assert!(summary.status_changed);
        h.checker
            .check_company(h.company_id, at(2026, 10, 20))
            .await
            .expect("replay");

        assert_eq!(
            h.store
                .alert_count(h.company_id, AlertType::StatusChange)
                .await,
            1
        );
        let alerts = h
            .store
            .list_alerts(h.tenant_id, &Default::default())
            .await
            .expect("alerts");
        let status = alerts
            .iter()
            .find(|a| a.alert_type == AlertType::StatusChange)
            .expect("status alert");
        assert_eq!(status.severity, ukci_core::Severity::Medium);
        assert!(status.title.contains("TESCO PLC"));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_company_due() {
        let h = harness().await;
        h.registry.fail_next(NUMBER, RegistryOp::Officers, 1).await;

        let err = h
            .checker
            .check_company(h.company_id, at(2026, 10, 18))
            .await
            .expect_err("injected failure");
        assert!(err.is_retryable());
        assert_eq!(err.class(), ErrorClass::Transient);

        let company = h
            .store
            .get_company_by_id(h.company_id)
            .await
            .expect("get")
            .expect("company");
        assert!(company.last_checked_at.is_none());
        assert_eq!(h.store.filing_count(h.company_id).await, 0);
    }

    #[tokio::test]
    async fn missing_registry_entry_is_terminal() {
        let h = harness().await;
        h.registry.remove_profile(NUMBER).await;
        let err = h
            .checker
            .check_company(h.company_id, at(2026, 10, 18))
            .await
            .expect_err("not found");
        assert_eq!(err.class(), ErrorClass::NotFound);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn new_watched_filing_alerts_once() {
        let h = harness().await;
        h.checker
            .check_company(h.company_id, at(2026, 10, 18))
            .await
            .expect("baseline");
        h.registry
            .push_filing(
                NUMBER,
                json!({
                    "transaction_id": "MzQ1NjE4OTAxMmFkaXF6a2N4",
                    "category": "accounts",
                    "type": "AA",
                    "date": "2026-10-19",
                    "description": "accounts-with-accounts-type-group",
                }),
            )
            .await;

        for day in [19, 20] {
            h.checker
                .check_company(h.company_id, at(2026, 10, day))
                .await
                .expect("check");
        }
        assert_eq!(h.store.filing_count(h.company_id).await, 4);
        assert_eq!(
            h.store.alert_count(h.company_id, AlertType::NewFiling).await,
            1
        );
    }

    #[tokio::test]
    async fn officer_resignation_alerts_once() {
        let h = harness().await;
        h.checker
            .check_company(h.company_id, at(2026, 10, 18))
            .await
            .expect("baseline");
        h.registry
            .set_officers(
                NUMBER,
                vec![
                    json!({
                        "name": "MURPHY, Ken",
                        "officer_role": "director",
                        "appointed_on": "2020-10-01",
                        "resigned_on": "2026-10-18",
                        "links": {
                            "self": "/company/00445790/appointments/Ab3dE5fG7hJ9kL1mN3pQ5rS7tV9",
                            "officer": { "appointments": PERSON_LINK }
                        }
                    }),
                ],
            )
            .await;
        for day in [19, 20] {
            h.checker
                .check_company(h.company_id, at(2026, 10, day))
                .await
                .expect("check");
        }
        assert_eq!(
            h.store
                .alert_count(h.company_id, AlertType::DirectorResignation)
                .await,
            1
        );
    }

    #[tokio::test]
    async fn past_role_of_a_sitting_director_is_not_a_resignation() {
        let h = harness().await;
        h.registry
            .set_officers(
                NUMBER,
                vec![
                    json!({
                        "name": "MURPHY, Ken",
                        "officer_role": "director",
                        "appointed_on": "2020-10-01",
                        "links": {
                            "self": "/company/00445790/appointments/Ab3dE5fG7hJ9kL1mN3pQ5rS7tV9",
                            "officer": { "appointments": PERSON_LINK }
                        }
                    }),
                    json!({
                        "name": "MURPHY, Ken",
                        "officer_role": "secretary",
                        "appointed_on": "2010-03-01",
                        "resigned_on": "2015-06-30",
                        "links": {
                            "self": "/company/00445790/appointments/Ce5fG7hJ9kL1mN3pQ5rS7tV9wX1",
                            "officer": { "appointments": PERSON_LINK }
                        }
                    }),
                ],
            )
            .await;

        let baseline = h
            .checker
            .check_company(h.company_id, at(2026, 10, 18))
            .await
            .expect("baseline");
        assert_eq!(baseline.officers_added, 2);
        let second = h
            .checker
            .check_company(h.company_id, at(2026, 10, 19))
            .await
            .expect("second");
        assert_eq!(second.updates(), 0);
        assert_eq!(
            h.store
                .alert_count(h.company_id, AlertType::DirectorResignation)
                .await,
            0
        );

        let officers = h.store.list_officers(h.company_id).await.expect("officers");
        assert_eq!(officers.len(), 2);
        let director = officers
            .iter()
            .find(|o| o.role.as_deref() == Some("director"))
            .expect("director");
        assert!(director.is_active());
    }

    #[tokio::test]
    async fn filing_due_is_deduplicated_for_seven_days() {
        let h = harness().await;
        h.registry
            .set_accounts_due(NUMBER, NaiveDate::from_ymd_opt(2026, 11, 10).expect("date"))
            .await;
        for day in [18, 20, 24] {
            h.checker
                .check_company(h.company_id, at(2026, 10, day))
                .await
                .expect("check");
        }
        assert_eq!(
            h.store.alert_count(h.company_id, AlertType::FilingDue).await,
            1
        );
        h.checker
            .check_company(h.company_id, at(2026, 10, 26))
            .await
            .expect("check");
        assert_eq!(
            h.store.alert_count(h.company_id, AlertType::FilingDue).await,
            2
        );
    }

    #[tokio::test]
    async fn racing_checks_write_one_filing_and_one_alert() {
        let h = harness().await;
        h.checker
            .check_company(h.company_id, at(2026, 10, 18))
            .await
            .expect("baseline");
        h.registry
            .push_filing(
                NUMBER,
                json!({
                    "transaction_id": "race-tx",
                    "category": "confirmation-statement",
                    "type": "CS01",
                    "date": "2026-10-19",
                }),
            )
            .await;

        let first = h
            .checker
            .prepare(h.company_id, at(2026, 10, 19))
            .await
            .expect("first");
        let second = h
            .checker
            .prepare(h.company_id, at(2026, 10, 19))
            .await
            .expect("second");
        let winner = h.checker.commit(first).await.expect("winner");
        let loser = h.checker.commit(second).await.expect("loser");

        assert_eq!(winner.filings_added, 1);
        assert_eq!(winner.alerts_created, 1);
        assert_eq!(loser.filings_added, 0);
        assert_eq!(loser.conflicts, 1);
        assert_eq!(loser.alerts_created, 0);
        assert_eq!(h.store.filing_count(h.company_id).await, 4);
        assert_eq!(
            h.store.alert_count(h.company_id, AlertType::NewFiling).await,
            1
        );
    }
}
