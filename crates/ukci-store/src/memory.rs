use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use ukci_core::{
    slugify, unique_slug, Alert, AlertType, Company, Filing, NewAlert, NewCompany, NewTenant,
    Officer, Tenant,
};
use uuid::Uuid;

use crate::{
    statuses_match, AlertQuery, CheckCommit, CommitReport, MonitorStore, StoreError, SweepReport,
};

#[derive(Debug, Clone)]
struct FilingRow {
    filing: Filing,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tenants: HashMap<Uuid, Tenant>,
    companies: HashMap<Uuid, Company>,
    filings: HashMap<Uuid, HashMap<String, FilingRow>>,
    officers: HashMap<Uuid, HashMap<String, Officer>>,
    alerts: Vec<Alert>,
}

impl MemoryState {
    fn push_alert(&mut self, alert: NewAlert, created_at: DateTime<Utc>) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4(),
            tenant_id: alert.tenant_id,
            company_id: alert.company_id,
            alert_type: alert.alert_type,
            title: alert.title,
            description: alert.description,
            severity: alert.severity,
            payload: alert.payload,
            is_read: false,
            expires_at: alert.expires_at,
            created_at,
        };
        self.alerts.push(alert.clone());
        alert
    }

    fn remove_company_rows(&mut self, company_id: Uuid) {
        self.filings.remove(&company_id);
        self.officers.remove(&company_id);
        self.alerts.retain(|a| a.company_id != Some(company_id));
    }
}

/// In-process store with the same transactional semantics as `PgStore`.
///
/// A single async mutex serializes every operation, so `commit_check` is atomic and
/// concurrent commits for one company observe each other's writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles a tenant's active flag; inactive tenants are skipped by due selection.
    pub async fn set_tenant_active(&self, tenant_id: Uuid, active: bool) -> bool {
        let mut state = self.state.lock().await;
        match state.tenants.get_mut(&tenant_id) {
            Some(tenant) => {
                tenant.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Rewrites a company's check cursor.
    pub async fn set_last_checked(&self, company_id: Uuid, at: Option<DateTime<Utc>>) {
        if let Some(company) = self.state.lock().await.companies.get_mut(&company_id) {
            company.last_checked_at = at;
        }
    }

    pub async fn alert_count(&self, company_id: Uuid, alert_type: AlertType) -> usize {
        self.state
            .lock()
            .await
            .alerts
            .iter()
            .filter(|a| a.company_id == Some(company_id) && a.alert_type == alert_type)
            .count()
    }

    pub async fn filing_count(&self, company_id: Uuid) -> usize {
        self.state
            .lock()
            .await
            .filings
            .get(&company_id)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn create_tenant(&self, tenant: NewTenant) -> Result<Tenant, StoreError> {
        let mut state = self.state.lock().await;
        let taken = state
            .tenants
            .values()
            .map(|t| t.slug.clone())
            .collect::<HashSet<_>>();
        let slug = unique_slug(&slugify(&tenant.name), |s| taken.contains(s));
        let created = Tenant {
            id: Uuid::new_v4(),
            name: tenant.name.trim().to_string(),
            slug,
            subscription_tier: tenant.subscription_tier,
            is_active: true,
            created_at: Utc::now(),
        };
        state.tenants.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError> {
        Ok(self.state.lock().await.tenants.get(&tenant_id).cloned())
    }

    async fn list_active_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let state = self.state.lock().await;
        let mut tenants = state
            .tenants
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .collect::<Vec<_>>();
        tenants.sort_by_key(|t| t.created_at);
        Ok(tenants)
    }

    async fn delete_tenant(&self, tenant_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.tenants.remove(&tenant_id).is_none() {
            return Ok(false);
        }
        let owned = state
            .companies
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .map(|c| c.id)
            .collect::<Vec<_>>();
        for company_id in owned {
            state.companies.remove(&company_id);
            state.remove_company_rows(company_id);
        }
        state.alerts.retain(|a| a.tenant_id != tenant_id);
        Ok(true)
    }

    async fn insert_company(&self, company: NewCompany) -> Result<Company, StoreError> {
        let mut state = self.state.lock().await;
        if !state.tenants.contains_key(&company.tenant_id) {
            return Err(StoreError::InvalidReference);
        }
        if state.companies.values().any(|c| {
            c.tenant_id == company.tenant_id && c.registration_number == company.registration_number
        }) {
            return Err(StoreError::Conflict);
        }
        let now = Utc::now();
        let created = Company {
            id: Uuid::new_v4(),
            tenant_id: company.tenant_id,
            registration_number: company.registration_number,
            name: company.name,
            status: company.status,
            incorporation_date: company.incorporation_date,
            address: company.address,
            sic_codes: company.sic_codes,
            is_monitored: company.is_monitored,
            last_checked_at: None,
            risk_score: company.risk_score,
            raw_payload: company.raw_payload,
            created_at: now,
            updated_at: now,
        };
        state.companies.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_company(
        &self,
        tenant_id: Uuid,
        company_id: Uuid,
    ) -> Result<Option<Company>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .companies
            .get(&company_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_company_by_id(&self, company_id: Uuid) -> Result<Option<Company>, StoreError> {
        Ok(self.state.lock().await.companies.get(&company_id).cloned())
    }

    async fn find_company(
        &self,
        tenant_id: Uuid,
        registration_number: &str,
    ) -> Result<Option<Company>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .companies
            .values()
            .find(|c| c.tenant_id == tenant_id && c.registration_number == registration_number)
            .cloned())
    }

    async fn list_companies(
        &self,
        tenant_id: Uuid,
        monitored: Option<bool>,
    ) -> Result<Vec<Company>, StoreError> {
        let state = self.state.lock().await;
        let mut companies = state
            .companies
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .filter(|c| monitored.map_or(true, |m| c.is_monitored == m))
            .cloned()
            .collect::<Vec<_>>();
        companies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(companies)
    }

    async fn set_monitoring(
        &self,
        tenant_id: Uuid,
        company_id: Uuid,
        monitored: bool,
    ) -> Result<Option<Company>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state
            .companies
            .get_mut(&company_id)
            .filter(|c| c.tenant_id == tenant_id)
            .map(|c| {
                c.is_monitored = monitored;
                c.updated_at = Utc::now();
                c.clone()
            }))
    }

    async fn delete_company(&self, tenant_id: Uuid, company_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let owned = state
            .companies
            .get(&company_id)
            .is_some_and(|c| c.tenant_id == tenant_id);
        if !owned {
            return Ok(false);
        }
        state.companies.remove(&company_id);
        state.remove_company_rows(company_id);
        Ok(true)
    }

    async fn select_due(
        &self,
        cutoff: DateTime<Utc>,
        tenant_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Company>, StoreError> {
        let state = self.state.lock().await;
        let mut due = state
            .companies
            .values()
            .filter(|c| c.is_monitored)
            .filter(|c| tenant_id.map_or(true, |t| c.tenant_id == t))
            .filter(|c| state.tenants.get(&c.tenant_id).is_some_and(|t| t.is_active))
            .filter(|c| c.last_checked_at.map_or(true, |at| at < cutoff))
            .cloned()
            .collect::<Vec<_>>();
        // None sorts before Some, which puts never-checked companies first.
        due.sort_by_key(|c| (c.last_checked_at, c.created_at));
        due.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn filing_ids(&self, company_id: Uuid) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .filings
            .get(&company_id)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_filings(&self, company_id: Uuid, limit: i64) -> Result<Vec<Filing>, StoreError> {
        let state = self.state.lock().await;
        let mut rows = state
            .filings
            .get(&company_id)
            .map(|rows| rows.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        rows.sort_by(|a, b| {
            b.filing
                .date
                .cmp(&a.filing.date)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(rows
            .into_iter()
            .take(usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
            .map(|row| row.filing)
            .collect())
    }

    async fn list_officers(&self, company_id: Uuid) -> Result<Vec<Officer>, StoreError> {
        let state = self.state.lock().await;
        let mut officers = state
            .officers
            .get(&company_id)
            .map(|rows| rows.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        officers.sort_by(|a, b| b.appointed_on.cmp(&a.appointed_on).then(a.name.cmp(&b.name)));
        Ok(officers)
    }

    async fn last_alert_at(
        &self,
        company_id: Uuid,
        alert_type: AlertType,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .alerts
            .iter()
            .filter(|a| a.company_id == Some(company_id) && a.alert_type == alert_type)
            .map(|a| a.created_at)
            .max())
    }

    async fn commit_check(&self, commit: CheckCommit) -> Result<CommitReport, StoreError> {
        let mut state = self.state.lock().await;
        let stored_status = state
            .companies
            .get(&commit.company_id)
            .filter(|c| c.tenant_id == commit.tenant_id)
            .ok_or(StoreError::NotFound)?
            .status
            .clone();

        let mut report = CommitReport::default();
        let at = commit.checked_at;

        if let Some(status) = commit.status {
            if statuses_match(stored_status.as_deref(), status.previous.as_deref()) {
                state.push_alert(status.alert, at);
                report.status_changed = true;
                report.alerts_created += 1;
            } else {
                report.conflicts += 1;
            }
        }

        for write in commit.filings {
            let rows = state.filings.entry(commit.company_id).or_default();
            if rows.contains_key(&write.filing.transaction_id) {
                report.conflicts += 1;
                continue;
            }
            rows.insert(
                write.filing.transaction_id.clone(),
                FilingRow {
                    filing: write.filing,
                    created_at: at,
                },
            );
            report.filings_added += 1;
            if let Some(alert) = write.alert {
                state.push_alert(alert, at);
                report.alerts_created += 1;
            }
        }

        for write in commit.officers {
            let rows = state.officers.entry(commit.company_id).or_default();
            if rows.contains_key(&write.officer.officer_id) {
                report.conflicts += 1;
                continue;
            }
            rows.insert(write.officer.officer_id.clone(), write.officer);
            report.officers_added += 1;
            if let Some(alert) = write.alert {
                state.push_alert(alert, at);
                report.alerts_created += 1;
            }
        }

        for write in commit.resignations {
            let updated = state
                .officers
                .get_mut(&commit.company_id)
                .and_then(|rows| rows.get_mut(&write.officer_id))
                .filter(|officer| officer.resigned_on.is_none())
                .map(|officer| officer.resigned_on = Some(write.resigned_on))
                .is_some();
            if updated {
                state.push_alert(write.alert, at);
                report.resignations += 1;
                report.alerts_created += 1;
            } else {
                report.conflicts += 1;
            }
        }

        if let Some(due) = commit.filing_due {
            let recent = state.alerts.iter().any(|a| {
                a.company_id == Some(commit.company_id)
                    && a.alert_type == AlertType::FilingDue
                    && a.created_at >= due.dedup_since
            });
            if recent {
                report.conflicts += 1;
            } else {
                state.push_alert(due.alert, at);
                report.alerts_created += 1;
            }
        }

        if let Some(company) = state.companies.get_mut(&commit.company_id) {
            let snapshot = commit.snapshot;
            company.name = snapshot.name;
            company.status = snapshot.status;
            company.incorporation_date = snapshot.incorporation_date;
            company.address = snapshot.address;
            company.sic_codes = snapshot.sic_codes;
            company.risk_score = snapshot.risk_score;
            company.raw_payload = Some(snapshot.raw_payload);
            company.last_checked_at = Some(at);
            company.updated_at = at;
        }

        Ok(report)
    }

    async fn insert_alert(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        let mut state = self.state.lock().await;
        if !state.tenants.contains_key(&alert.tenant_id) {
            return Err(StoreError::InvalidReference);
        }
        if let Some(company_id) = alert.company_id {
            if !state.companies.contains_key(&company_id) {
                return Err(StoreError::InvalidReference);
            }
        }
        Ok(state.push_alert(alert, Utc::now()))
    }

    async fn list_alerts(
        &self,
        tenant_id: Uuid,
        query: &AlertQuery,
    ) -> Result<Vec<Alert>, StoreError> {
        let state = self.state.lock().await;
        let mut alerts = state
            .alerts
            .iter()
            .filter(|a| a.tenant_id == tenant_id)
            .filter(|a| !query.unread_only || !a.is_read)
            .filter(|a| query.company_id.map_or(true, |id| a.company_id == Some(id)))
            .filter(|a| query.alert_type.map_or(true, |ty| a.alert_type == ty))
            .cloned()
            .collect::<Vec<_>>();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts.truncate(usize::try_from(query.limit.max(0)).unwrap_or(usize::MAX));
        Ok(alerts)
    }

    async fn mark_alert_read(&self, tenant_id: Uuid, alert_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id && a.tenant_id == tenant_id)
        {
            Some(alert) => {
                alert.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_unread(&self, tenant_id: Uuid) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .alerts
            .iter()
            .filter(|a| a.tenant_id == tenant_id && !a.is_read)
            .count() as i64)
    }

    async fn sweep_alerts(
        &self,
        read_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, StoreError> {
        let mut state = self.state.lock().await;
        let mut report = SweepReport::default();
        state.alerts.retain(|a| {
            if a.is_read && a.created_at < read_before {
                report.read_expired += 1;
                false
            } else if a.expires_at.is_some_and(|exp| exp <= now) {
                report.past_expiry += 1;
                false
            } else {
                true
            }
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use ukci_core::{CompanySnapshotUpdate, RegisteredAddress, Severity};

    use crate::{FilingWrite, StatusWrite};

    async fn seeded() -> (MemoryStore, Tenant, Company) {
        let store = MemoryStore::new();
        let tenant = store
            .create_tenant(NewTenant {
                name: "Acme Ltd".into(),
                subscription_tier: Default::default(),
            })
            .await
            .expect("tenant");
        let company = store
            .insert_company(NewCompany {
                tenant_id: tenant.id,
                registration_number: "00445790".into(),
                name: "TESCO PLC".into(),
                status: Some("active".into()),
                incorporation_date: None,
                address: RegisteredAddress::default(),
                sic_codes: vec![],
                is_monitored: true,
                risk_score: 0,
                raw_payload: None,
            })
            .await
            .expect("company");
        (store, tenant, company)
    }

    fn alert(tenant: &Tenant, company: &Company, alert_type: AlertType) -> NewAlert {
        NewAlert {
            tenant_id: tenant.id,
            company_id: Some(company.id),
            alert_type,
            title: format!("{alert_type}: {}", company.name),
            description: String::new(),
            severity: Severity::Medium,
            payload: json!({}),
            expires_at: None,
        }
    }

    fn commit(tenant: &Tenant, company: &Company, at: DateTime<Utc>) -> CheckCommit {
        CheckCommit {
            tenant_id: tenant.id,
            company_id: company.id,
            checked_at: at,
            snapshot: CompanySnapshotUpdate {
                name: company.name.clone(),
                status: Some("dissolved".into()),
                incorporation_date: None,
                address: RegisteredAddress::default(),
                sic_codes: vec![],
                risk_score: 4,
                raw_payload: json!({}),
            },
            status: None,
            filings: vec![],
            officers: vec![],
            resignations: vec![],
            filing_due: None,
        }
    }

    #[tokio::test]
    async fn tenant_slugs_are_unique() {
        let store = MemoryStore::new();
        let a = store
            .create_tenant(NewTenant {
                name: "Acme".into(),
                subscription_tier: Default::default(),
            })
            .await
            .expect("a");
        let b = store
            .create_tenant(NewTenant {
                name: "ACME".into(),
                subscription_tier: Default::default(),
            })
            .await
            .expect("b");
        assert_eq!(a.slug, "acme");
        assert_eq!(b.slug, "acme-1");
    }

    #[tokio::test]
    async fn duplicate_registration_number_conflicts_within_tenant() {
        let (store, tenant, company) = seeded().await;
        let err = store
            .insert_company(NewCompany {
                tenant_id: tenant.id,
                registration_number: company.registration_number.clone(),
                name: "dup".into(),
                status: None,
                incorporation_date: None,
                address: RegisteredAddress::default(),
                sic_codes: vec![],
                is_monitored: true,
                risk_score: 0,
                raw_payload: None,
            })
            .await
            .expect_err("conflict");
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn status_alert_is_written_once_across_replayed_commits() {
        let (store, tenant, company) = seeded().await;
        let now = Utc::now();
        let mut first = commit(&tenant, &company, now);
        first.status = Some(StatusWrite {
            previous: Some("active".into()),
            current: "dissolved".into(),
            alert: alert(&tenant, &company, AlertType::StatusChange),
        });
        let replay = first.clone();

        let report = store.commit_check(first).await.expect("first");
        assert!(report.status_changed);
        let report = store.commit_check(replay).await.expect("replay");
        assert!(!report.status_changed);
        assert_eq!(report.conflicts, 1);
        assert_eq!(store.alert_count(company.id, AlertType::StatusChange).await, 1);

        let stored = store
            .get_company(tenant.id, company.id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(stored.status.as_deref(), Some("dissolved"));
        assert_eq!(stored.last_checked_at, Some(now));
    }

    #[tokio::test]
    async fn filing_alert_follows_row_insert() {
        let (store, tenant, company) = seeded().await;
        let filing = Filing {
            transaction_id: "tx-1".into(),
            category: Some("accounts".into()),
            filing_type: Some("AA".into()),
            date: None,
            description: None,
            paper_filed: false,
            raw: json!({}),
        };
        for _ in 0..2 {
            let mut c = commit(&tenant, &company, Utc::now());
            c.filings.push(FilingWrite {
                filing: filing.clone(),
                alert: Some(alert(&tenant, &company, AlertType::NewFiling)),
            });
            store.commit_check(c).await.expect("commit");
        }
        assert_eq!(store.filing_count(company.id).await, 1);
        assert_eq!(store.alert_count(company.id, AlertType::NewFiling).await, 1);
    }

    #[tokio::test]
    async fn due_selection_orders_never_checked_first_and_skips_inactive_tenants() {
        let (store, tenant, company) = seeded().await;
        let now = Utc::now();
        let second = store
            .insert_company(NewCompany {
                tenant_id: tenant.id,
                registration_number: "SC123456".into(),
                name: "HIGHLAND LTD".into(),
                status: None,
                incorporation_date: None,
                address: RegisteredAddress::default(),
                sic_codes: vec![],
                is_monitored: true,
                risk_score: 0,
                raw_payload: None,
            })
            .await
            .expect("second");
        store
            .set_last_checked(company.id, Some(now - Duration::hours(7)))
            .await;

        let due = store
            .select_due(now - Duration::hours(6), None, 50)
            .await
            .expect("due");
        assert_eq!(
            due.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![second.id, company.id]
        );

        store.set_tenant_active(tenant.id, false).await;
        assert!(store
            .select_due(now - Duration::hours(6), None, 50)
            .await
            .expect("due")
            .is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_old_read_and_expired_alerts() {
        let (store, tenant, company) = seeded().await;
        let read = store
            .insert_alert(alert(&tenant, &company, AlertType::NewFiling))
            .await
            .expect("read");
        store
            .insert_alert(alert(&tenant, &company, AlertType::NewDirector))
            .await
            .expect("unread");
        let mut expiring = alert(&tenant, &company, AlertType::FilingDue);
        expiring.expires_at = Some(Utc::now() - Duration::minutes(1));
        store.insert_alert(expiring).await.expect("expiring");
        assert!(store.mark_alert_read(tenant.id, read.id).await.expect("mark"));

        let report = store
            .sweep_alerts(Utc::now() + Duration::seconds(1), Utc::now())
            .await
            .expect("sweep");
        assert_eq!(report.read_expired, 1);
        assert_eq!(report.past_expiry, 1);
        assert_eq!(store.count_unread(tenant.id).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn deleting_tenant_cascades() {
        let (store, tenant, company) = seeded().await;
        store
            .insert_alert(alert(&tenant, &company, AlertType::MonitoringStarted))
            .await
            .expect("alert");
        assert!(store.delete_tenant(tenant.id).await.expect("delete"));
        assert!(store.get_company_by_id(company.id).await.expect("get").is_none());
        assert_eq!(store.alert_count(company.id, AlertType::MonitoringStarted).await, 0);
    }
}
