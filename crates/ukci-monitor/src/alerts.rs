//! Turns a `ChangeSet` into alert drafts and the single commit that persists them.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::json;
use ukci_core::{
    AlertType, Charge, Company, CompanySnapshotUpdate, Filing, NewAlert, Officer, Profile,
    RiskIndicators, Severity,
};
use ukci_store::{
    CheckCommit, FilingDueWrite, FilingWrite, MonitorStore, OfficerWrite, ResignationWrite,
    StatusWrite, StoreError,
};

use crate::diff::{ChangeSet, DiffEngine, FilingDue, StatusChange};

#[derive(Debug, Clone)]
pub struct AlertEmitter {
    diff: DiffEngine,
}

impl AlertEmitter {
    pub fn new(diff: DiffEngine) -> Self {
        Self { diff }
    }

    /// Persists one standalone alert. Alerts tied to a check go through `plan_commit`.
    pub async fn emit(
        &self,
        store: &dyn MonitorStore,
        alert: NewAlert,
    ) -> Result<ukci_core::Alert, StoreError> {
        let alert = store.insert_alert(alert).await?;
        tracing::info!(
            alert_id = %alert.id,
            tenant_id = %alert.tenant_id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            "alert emitted"
        );
        Ok(alert)
    }

    pub fn monitoring_started(&self, company: &Company) -> NewAlert {
        draft(
            company,
            AlertType::MonitoringStarted,
            format!("Now monitoring {}", company.name),
            format!(
                "Company {} has been added to your monitoring list.",
                company.registration_number
            ),
            Severity::Low,
            json!({ "company_number": company.registration_number }),
        )
    }

    pub fn status_change(&self, company: &Company, change: &StatusChange) -> NewAlert {
        draft(
            company,
            AlertType::StatusChange,
            format!("Status Change: {}", company.name),
            format!(
                "Company status changed from {} to {}",
                change.old, change.new
            ),
            Severity::Medium,
            json!({ "old_status": change.old, "new_status": change.new }),
        )
    }

    pub fn new_filing(&self, company: &Company, filing: &Filing) -> NewAlert {
        let what = filing
            .description
            .as_deref()
            .or(filing.filing_type.as_deref())
            .unwrap_or("filing");
        let description = match filing.date {
            Some(date) => format!("New {what} filed on {date}"),
            None => format!("New {what} filed"),
        };
        draft(
            company,
            AlertType::NewFiling,
            format!("New Filing: {}", company.name),
            description,
            Severity::Low,
            json!({
                "transaction_id": filing.transaction_id,
                "category": filing.category,
                "type": filing.filing_type,
                "date": filing.date,
            }),
        )
    }

    pub fn new_director(&self, company: &Company, officer: &Officer) -> NewAlert {
        let role = officer.role.as_deref().unwrap_or("officer");
        let description = match officer.appointed_on {
            Some(date) => format!("{} appointed as {role} on {date}", officer.name),
            None => format!("{} appointed as {role}", officer.name),
        };
        draft(
            company,
            AlertType::NewDirector,
            format!("New Director: {}", company.name),
            description,
            Severity::Medium,
            json!({
                "officer_id": officer.officer_id,
                "officer_name": officer.name,
                "role": officer.role,
                "appointed_on": officer.appointed_on,
            }),
        )
    }

    pub fn director_resignation(
        &self,
        company: &Company,
        officer: &Officer,
        resigned_on: NaiveDate,
    ) -> NewAlert {
        let role = officer.role.as_deref().unwrap_or("officer");
        draft(
            company,
            AlertType::DirectorResignation,
            format!("Director Resignation: {}", company.name),
            format!("{} resigned as {role} on {resigned_on}", officer.name),
            Severity::Medium,
            json!({
                "officer_id": officer.officer_id,
                "officer_name": officer.name,
                "role": officer.role,
                "resigned_on": resigned_on,
            }),
        )
    }

    /// Expires the day after the deadline; the sweep removes it from then on.
    pub fn filing_due(&self, company: &Company, due: &FilingDue) -> NewAlert {
        let mut alert = draft(
            company,
            AlertType::FilingDue,
            format!("Filing Due: {}", company.name),
            format!(
                "Accounts filing due on {} ({} days remaining)",
                due.due_on, due.days_remaining
            ),
            Severity::High,
            json!({ "due_date": due.due_on, "days_remaining": due.days_remaining }),
        );
        alert.expires_at = (due.due_on + Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .map(|at| at.and_utc());
        alert
    }

    /// Builds the transactional write for one check: snapshot overwrite, the rows the
    /// diff found, and the alert each row justifies.
    pub fn plan_commit(
        &self,
        company: &Company,
        profile: &Profile,
        charges: &[Charge],
        changes: &ChangeSet,
        now: DateTime<Utc>,
    ) -> CheckCommit {
        let risk = RiskIndicators::assess(profile, charges);
        let snapshot = CompanySnapshotUpdate {
            name: profile.name.clone(),
            status: profile.status.clone(),
            incorporation_date: profile.incorporation_date,
            address: profile.address.clone(),
            sic_codes: profile.sic_codes.clone(),
            risk_score: risk.score,
            raw_payload: json!({
                "profile": profile.raw,
                "risk": risk,
                "fetched_at": now,
            }),
        };

        CheckCommit {
            tenant_id: company.tenant_id,
            company_id: company.id,
            checked_at: now,
            snapshot,
            status: changes.status_change.as_ref().map(|change| StatusWrite {
                previous: Some(change.old.clone()),
                current: change.new.clone(),
                alert: self.status_change(company, change),
            }),
            filings: changes
                .new_filings
                .iter()
                .map(|f| FilingWrite {
                    filing: f.filing.clone(),
                    alert: f.alert_worthy.then(|| self.new_filing(company, &f.filing)),
                })
                .collect(),
            officers: changes
                .new_officers
                .iter()
                .map(|o| OfficerWrite {
                    officer: o.officer.clone(),
                    alert: o.recent.then(|| self.new_director(company, &o.officer)),
                })
                .collect(),
            resignations: changes
                .resignations
                .iter()
                .map(|r| ResignationWrite {
                    officer_id: r.officer.officer_id.clone(),
                    resigned_on: r.resigned_on,
                    alert: self.director_resignation(company, &r.officer, r.resigned_on),
                })
                .collect(),
            filing_due: changes.filing_due.as_ref().map(|due| FilingDueWrite {
                dedup_since: self.diff.filing_due_dedup_since(now),
                alert: self.filing_due(company, due),
            }),
        }
    }
}

fn draft(
    company: &Company,
    alert_type: AlertType,
    title: String,
    description: String,
    severity: Severity,
    payload: serde_json::Value,
) -> NewAlert {
    NewAlert {
        tenant_id: company.tenant_id,
        company_id: Some(company.id),
        alert_type,
        title,
        description,
        severity,
        payload,
        expires_at: None,
    }
}
