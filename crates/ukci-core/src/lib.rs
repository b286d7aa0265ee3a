//! Core domain model for the UKCI company monitor.
//!
//! Everything here is plain data plus a handful of pure helpers (slugs,
//! registration numbers, risk scoring). Fetching and persistence live in the
//! `ukci-registry` and `ukci-store` crates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const CRATE_NAME: &str = "ukci-core";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Starter,
    Professional,
    Enterprise,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

impl FromStr for SubscriptionTier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "professional" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(UnknownVariant::new("subscription tier", other)),
        }
    }
}

/// Returned when a stored label does not map onto one of the known enum variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Isolation boundary. Owns users, companies and alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub subscription_tier: SubscriptionTier,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTenant {
    pub name: String,
    #[serde(default)]
    pub subscription_tier: SubscriptionTier,
}

/// Lower-case, hyphen-separated slug for a tenant display name.
pub fn slugify(name: &str) -> String {
    let slug = name
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "tenant".to_string()
    } else {
        slug
    }
}

/// Resolves slug collisions by suffixing a counter: `acme`, `acme-1`, `acme-2`, ...
pub fn unique_slug(base: &str, mut taken: impl FnMut(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut counter = 1u32;
    loop {
        let candidate = format!("{base}-{counter}");
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Normalizes user input into the 8-character Companies House number format.
///
/// Purely numeric input is left-padded with zeros (`445790` becomes `00445790`);
/// prefixed numbers such as `SC123456` are upper-cased. Returns `None` for anything
/// that cannot be a registration number.
pub fn normalize_registration_number(input: &str) -> Option<String> {
    let compact = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    if compact.is_empty()
        || compact.len() > 8
        || !compact.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    if compact.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("{compact:0>8}"));
    }
    if compact.len() == 8 {
        Some(compact)
    } else {
        None
    }
}

/// Lower-cased, trimmed lifecycle label used for status comparisons.
pub fn normalize_status(status: &str) -> String {
    status.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredAddress {
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl RegisteredAddress {
    /// Single-line rendering used in search results and alert descriptions.
    pub fn one_line(&self) -> String {
        [
            &self.address_line_1,
            &self.address_line_2,
            &self.locality,
            &self.region,
            &self.postal_code,
            &self.country,
        ]
        .iter()
        .filter_map(|part| part.as_deref())
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Tenant-scoped mirror of one registry record, holding the last-known snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub registration_number: String,
    pub name: String,
    pub status: Option<String>,
    pub incorporation_date: Option<NaiveDate>,
    pub address: RegisteredAddress,
    pub sic_codes: Vec<String>,
    pub is_monitored: bool,
    /// Check cursor: when the last successful check committed.
    pub last_checked_at: Option<DateTime<Utc>>,
    pub risk_score: i32,
    pub raw_payload: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCompany {
    pub tenant_id: Uuid,
    pub registration_number: String,
    pub name: String,
    pub status: Option<String>,
    pub incorporation_date: Option<NaiveDate>,
    pub address: RegisteredAddress,
    pub sic_codes: Vec<String>,
    pub is_monitored: bool,
    pub risk_score: i32,
    pub raw_payload: Option<JsonValue>,
}

impl NewCompany {
    /// Seeds a watchlist entry from a freshly fetched profile.
    ///
    /// The check cursor starts empty, so the first check treats everything it sees
    /// as baseline.
    pub fn from_profile(tenant_id: Uuid, profile: &Profile) -> Self {
        Self {
            tenant_id,
            registration_number: profile.registration_number.clone(),
            name: profile.name.clone(),
            status: profile.status.clone(),
            incorporation_date: profile.incorporation_date,
            address: profile.address.clone(),
            sic_codes: profile.sic_codes.clone(),
            is_monitored: true,
            risk_score: RiskIndicators::assess(profile, &[]).score,
            raw_payload: Some(profile.raw.clone()),
        }
    }
}

/// Snapshot fields overwritten on every successful check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySnapshotUpdate {
    pub name: String,
    pub status: Option<String>,
    pub incorporation_date: Option<NaiveDate>,
    pub address: RegisteredAddress,
    pub sic_codes: Vec<String>,
    pub risk_score: i32,
    pub raw_payload: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    StatusChange,
    NewFiling,
    NewDirector,
    DirectorResignation,
    FilingDue,
    MonitoringStarted,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusChange => "status_change",
            Self::NewFiling => "new_filing",
            Self::NewDirector => "new_director",
            Self::DirectorResignation => "director_resignation",
            Self::FilingDue => "filing_due",
            Self::MonitoringStarted => "monitoring_started",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status_change" => Ok(Self::StatusChange),
            "new_filing" => Ok(Self::NewFiling),
            "new_director" => Ok(Self::NewDirector),
            "director_resignation" => Ok(Self::DirectorResignation),
            "filing_due" => Ok(Self::FilingDue),
            "monitoring_started" => Ok(Self::MonitoringStarted),
            other => Err(UnknownVariant::new("alert type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(UnknownVariant::new("severity", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub company_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub payload: JsonValue,
    pub is_read: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub tenant_id: Uuid,
    pub company_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub payload: JsonValue,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsInfo {
    pub next_due: Option<NaiveDate>,
    pub overdue: bool,
    pub last_made_up_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationStatementInfo {
    pub next_due: Option<NaiveDate>,
    pub overdue: bool,
    pub last_made_up_to: Option<NaiveDate>,
}

/// Normalized company profile as returned by the registry client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub registration_number: String,
    pub name: String,
    pub status: Option<String>,
    pub status_detail: Option<String>,
    pub company_type: Option<String>,
    pub incorporation_date: Option<NaiveDate>,
    pub dissolution_date: Option<NaiveDate>,
    pub jurisdiction: Option<String>,
    pub address: RegisteredAddress,
    pub sic_codes: Vec<String>,
    pub accounts: AccountsInfo,
    pub confirmation_statement: ConfirmationStatementInfo,
    pub has_charges: bool,
    pub has_insolvency_history: bool,
    /// Untouched registry document, retained for audit and debugging.
    pub raw: JsonValue,
}

impl Profile {
    pub fn is_active(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| normalize_status(s) == "active")
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filing {
    pub transaction_id: String,
    pub category: Option<String>,
    pub filing_type: Option<String>,
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
    pub paper_filed: bool,
    pub raw: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Officer {
    pub officer_id: String,
    pub name: String,
    pub role: Option<String>,
    pub appointed_on: Option<NaiveDate>,
    pub resigned_on: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub country_of_residence: Option<String>,
    pub occupation: Option<String>,
    pub raw: JsonValue,
}

impl Officer {
    pub fn is_active(&self) -> bool {
        self.resigned_on.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub charge_id: String,
    pub charge_number: Option<i64>,
    pub status: Option<String>,
    pub classification: Option<String>,
    pub created_on: Option<NaiveDate>,
    pub delivered_on: Option<NaiveDate>,
    pub satisfied_on: Option<NaiveDate>,
}

impl Charge {
    pub fn is_outstanding(&self) -> bool {
        match self.status.as_deref().map(normalize_status) {
            Some(status) => status == "outstanding" || status == "part-satisfied",
            None => self.satisfied_on.is_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySearchHit {
    pub registration_number: String,
    pub name: String,
    pub status: Option<String>,
    pub company_type: Option<String>,
    pub incorporation_date: Option<NaiveDate>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    pub total_results: u64,
    pub items: Vec<CompanySearchHit>,
}

/// Derived risk flags and the integer score persisted on the company.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskIndicators {
    pub overdue_accounts: bool,
    pub overdue_confirmation_statement: bool,
    pub has_outstanding_charges: bool,
    pub has_insolvency_history: bool,
    pub is_inactive: bool,
    pub score: i32,
}

impl RiskIndicators {
    pub fn assess(profile: &Profile, charges: &[Charge]) -> Self {
        let mut indicators = Self {
            overdue_accounts: profile.accounts.overdue,
            overdue_confirmation_statement: profile.confirmation_statement.overdue,
            has_outstanding_charges: charges.iter().any(Charge::is_outstanding),
            has_insolvency_history: profile.has_insolvency_history,
            is_inactive: !profile.is_active(),
            score: 0,
        };
        if indicators.overdue_accounts {
            indicators.score += 3;
        }
        if indicators.overdue_confirmation_statement {
            indicators.score += 2;
        }
        if indicators.has_outstanding_charges {
            indicators.score += 1;
        }
        if indicators.has_insolvency_history {
            indicators.score += 5;
        }
        if indicators.is_inactive {
            indicators.score += 4;
        }
        indicators
    }
}
