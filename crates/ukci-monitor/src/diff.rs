//! Pure comparison of a freshly fetched company against what is already persisted.
//!
//! Baseline rule: the first observation of a value is recorded, not reported. A
//! company with no stored status gets its status silently; a company with no check
//! cursor only reports filings and appointments that fall inside the recency window.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use ukci_core::{normalize_status, Company, Filing, Officer, Profile};

use crate::config::{policy_days, MonitorPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewFiling {
    pub filing: Filing,
    pub alert_worthy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOfficer {
    pub officer: Officer,
    /// Appointed within the recency window of the check.
    pub recent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resignation {
    pub officer: Officer,
    pub resigned_on: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilingDue {
    pub due_on: NaiveDate,
    pub days_remaining: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    pub status_change: Option<StatusChange>,
    pub new_filings: Vec<NewFiling>,
    pub new_officers: Vec<NewOfficer>,
    pub resignations: Vec<Resignation>,
    pub filing_due: Option<FilingDue>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.status_change.is_none()
            && self.new_filings.is_empty()
            && self.new_officers.is_empty()
            && self.resignations.is_empty()
            && self.filing_due.is_none()
    }
}

/// What the store already knows about a company.
#[derive(Debug, Clone, Copy)]
pub struct PersistedSnapshot<'a> {
    pub company: &'a Company,
    pub filing_ids: &'a HashSet<String>,
    pub officers: &'a [Officer],
    pub last_filing_due_alert: Option<DateTime<Utc>>,
}

/// One cycle's registry reads, all issued after the same profile fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchedSnapshot<'a> {
    pub profile: &'a Profile,
    pub filings: &'a [Filing],
    pub officers: &'a [Officer],
}

#[derive(Debug, Clone)]
pub struct DiffEngine {
    officer_recency_days: i64,
    filing_due_window_days: i64,
    filing_due_dedup_days: i64,
    watched_categories: HashSet<String>,
}

impl DiffEngine {
    pub fn new(policy: &MonitorPolicy) -> Self {
        Self {
            officer_recency_days: policy_days(policy.officer_recency_days),
            filing_due_window_days: policy_days(policy.filing_due_window_days),
            filing_due_dedup_days: policy_days(policy.filing_due_dedup_days),
            watched_categories: policy
                .watched_filing_categories
                .iter()
                .map(|c| c.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn compute_changes(
        &self,
        persisted: &PersistedSnapshot<'_>,
        fetched: &FetchedSnapshot<'_>,
        cursor: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ChangeSet {
        let today = now.date_naive();
        ChangeSet {
            status_change: self.status_change(persisted.company, fetched.profile),
            new_filings: self.new_filings(persisted.filing_ids, fetched.filings, cursor, today),
            new_officers: self.new_officers(persisted.officers, fetched.officers, today),
            resignations: self.resignations(persisted.officers, fetched.officers),
            filing_due: self.filing_due(fetched.profile, persisted.last_filing_due_alert, now),
        }
    }

    fn status_change(&self, company: &Company, profile: &Profile) -> Option<StatusChange> {
        let old = company.status.as_deref()?;
        let new = profile.status.as_deref()?;
        if normalize_status(old) == normalize_status(new) {
            return None;
        }
        Some(StatusChange {
            old: old.trim().to_string(),
            new: new.trim().to_string(),
        })
    }

    fn within_recency(&self, date: NaiveDate, today: NaiveDate) -> bool {
        let age = (today - date).num_days();
        (0..=self.officer_recency_days).contains(&age)
    }

    fn filing_alert_worthy(
        &self,
        filing: &Filing,
        cursor: Option<DateTime<Utc>>,
        today: NaiveDate,
    ) -> bool {
        let watched = filing
            .category
            .as_deref()
            .is_some_and(|c| self.watched_categories.contains(&c.trim().to_ascii_lowercase()));
        if !watched {
            return false;
        }
        match (cursor, filing.date) {
            (Some(cursor), Some(date)) => date >= cursor.date_naive(),
            (Some(_), None) => true,
            (None, Some(date)) => self.within_recency(date, today),
            (None, None) => false,
        }
    }

    fn new_filings(
        &self,
        persisted: &HashSet<String>,
        fetched: &[Filing],
        cursor: Option<DateTime<Utc>>,
        today: NaiveDate,
    ) -> Vec<NewFiling> {
        let mut seen = HashSet::new();
        fetched
            .iter()
            .filter(|f| !persisted.contains(&f.transaction_id))
            .filter(|f| seen.insert(f.transaction_id.clone()))
            .map(|f| NewFiling {
                alert_worthy: self.filing_alert_worthy(f, cursor, today),
                filing: f.clone(),
            })
            .collect()
    }

    fn new_officers(
        &self,
        persisted: &[Officer],
        fetched: &[Officer],
        today: NaiveDate,
    ) -> Vec<NewOfficer> {
        let known = persisted
            .iter()
            .map(|o| o.officer_id.as_str())
            .collect::<HashSet<_>>();
        let mut seen = HashSet::new();
        fetched
            .iter()
            .filter(|o| !known.contains(o.officer_id.as_str()))
            .filter(|o| seen.insert(o.officer_id.clone()))
            .map(|o| NewOfficer {
                recent: o.is_active()
                    && o.appointed_on
                        .is_some_and(|d| self.within_recency(d, today)),
                officer: o.clone(),
            })
            .collect()
    }

    fn resignations(&self, persisted: &[Officer], fetched: &[Officer]) -> Vec<Resignation> {
        let active = persisted
            .iter()
            .filter(|o| o.is_active())
            .map(|o| (o.officer_id.as_str(), o))
            .collect::<HashMap<_, _>>();
        fetched
            .iter()
            .filter(|o| active.contains_key(o.officer_id.as_str()))
            .filter_map(|o| {
                o.resigned_on.map(|resigned_on| Resignation {
                    officer: o.clone(),
                    resigned_on,
                })
            })
            .collect()
    }

    fn filing_due(
        &self,
        profile: &Profile,
        last_alert: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<FilingDue> {
        let due_on = profile.accounts.next_due?;
        let days_remaining = (due_on - now.date_naive()).num_days();
        if !(0..=self.filing_due_window_days).contains(&days_remaining) {
            return None;
        }
        if last_alert.is_some_and(|at| at >= self.filing_due_dedup_since(now)) {
            return None;
        }
        Some(FilingDue {
            due_on,
            days_remaining,
        })
    }

    /// Start of the window in which an earlier `filing_due` alert suppresses a new one.
    pub fn filing_due_dedup_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::days(self.filing_due_dedup_days)
    }
}
