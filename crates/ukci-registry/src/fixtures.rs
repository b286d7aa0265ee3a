//! Offline registry backed by Companies House JSON documents.
//!
//! Documents pass through the same normalization as live responses, so a fixture
//! directory captured from the real API behaves like the API.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value as JsonValue};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::info;
use ukci_core::{Charge, Filing, Officer, Profile, SearchResults};

use crate::error::RegistryError;
use crate::normalize::{
    filings_since, list_items, parse_charge, parse_filing, parse_officer, parse_profile,
    parse_search,
};
use crate::RegistryApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryOp {
    Profile,
    Filings,
    Officers,
    Charges,
    Search,
}

#[derive(Debug, Clone, Default)]
struct FixtureCompany {
    profile: Option<JsonValue>,
    filings: Vec<JsonValue>,
    officers: Vec<JsonValue>,
    charges: Vec<JsonValue>,
}

#[derive(Debug, Default)]
struct CallCounters {
    profile: AtomicUsize,
    filings: AtomicUsize,
    officers: AtomicUsize,
    charges: AtomicUsize,
    search: AtomicUsize,
}

impl CallCounters {
    fn slot(&self, op: RegistryOp) -> &AtomicUsize {
        match op {
            RegistryOp::Profile => &self.profile,
            RegistryOp::Filings => &self.filings,
            RegistryOp::Officers => &self.officers,
            RegistryOp::Charges => &self.charges,
            RegistryOp::Search => &self.search,
        }
    }
}

#[derive(Debug, Default)]
pub struct FixtureRegistry {
    companies: RwLock<HashMap<String, FixtureCompany>>,
    failures: RwLock<HashMap<(String, RegistryOp), usize>>,
    calls: CallCounters,
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `<root>/<number>/{profile,filing-history,officers,charges}.json`.
    /// Missing list files mean an empty list; a missing profile means 404.
    pub async fn from_dir(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let registry = Self::new();
        let mut entries = fs::read_dir(root)
            .await
            .with_context(|| format!("reading fixture directory {}", root.display()))?;

        let mut loaded = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let number = entry.file_name().to_string_lossy().to_string();
            let dir = entry.path();
            let company = FixtureCompany {
                profile: read_optional_json(&dir.join("profile.json")).await?,
                filings: read_items(&dir.join("filing-history.json")).await?,
                officers: read_items(&dir.join("officers.json")).await?,
                charges: read_items(&dir.join("charges.json")).await?,
            };
            registry.companies.write().await.insert(number, company);
            loaded += 1;
        }
        info!(root = %root.display(), companies = loaded, "loaded registry fixtures");
        Ok(registry)
    }

    pub async fn set_profile(&self, number: &str, profile: JsonValue) {
        self.companies
            .write()
            .await
            .entry(number.to_string())
            .or_default()
            .profile = Some(profile);
    }

    pub async fn remove_profile(&self, number: &str) {
        if let Some(company) = self.companies.write().await.get_mut(number) {
            company.profile = None;
        }
    }

    /// Rewrites `company_status` on an existing profile document.
    pub async fn set_status(&self, number: &str, status: &str) {
        let mut companies = self.companies.write().await;
        let company = companies.entry(number.to_string()).or_default();
        let profile = company
            .profile
            .get_or_insert_with(|| json!({ "company_number": number }));
        if let Some(obj) = profile.as_object_mut() {
            obj.insert("company_status".into(), JsonValue::String(status.to_string()));
        }
    }

    /// Patches `accounts.next_accounts.due_on`.
    pub async fn set_accounts_due(&self, number: &str, due_on: NaiveDate) {
        let mut companies = self.companies.write().await;
        let company = companies.entry(number.to_string()).or_default();
        let profile = company
            .profile
            .get_or_insert_with(|| json!({ "company_number": number }));
        if let Some(obj) = profile.as_object_mut() {
            obj.insert(
                "accounts".into(),
                json!({ "next_accounts": { "due_on": due_on.to_string(), "overdue": false } }),
            );
        }
    }

    pub async fn set_filings(&self, number: &str, filings: Vec<JsonValue>) {
        self.companies
            .write()
            .await
            .entry(number.to_string())
            .or_default()
            .filings = filings;
    }

    /// Prepends a filing; the registry lists newest first.
    pub async fn push_filing(&self, number: &str, filing: JsonValue) {
        self.companies
            .write()
            .await
            .entry(number.to_string())
            .or_default()
            .filings
            .insert(0, filing);
    }

    pub async fn set_officers(&self, number: &str, officers: Vec<JsonValue>) {
        self.companies
            .write()
            .await
            .entry(number.to_string())
            .or_default()
            .officers = officers;
    }

    pub async fn set_charges(&self, number: &str, charges: Vec<JsonValue>) {
        self.companies
            .write()
            .await
            .entry(number.to_string())
            .or_default()
            .charges = charges;
    }

    /// Makes the next `times` calls of `op` for `number` fail with a retryable error.
    pub async fn fail_next(&self, number: &str, op: RegistryOp, times: usize) {
        self.failures
            .write()
            .await
            .insert((number.to_string(), op), times);
    }

    pub fn calls(&self, op: RegistryOp) -> usize {
        self.calls.slot(op).load(Ordering::SeqCst)
    }

    async fn enter(&self, number: &str, op: RegistryOp) -> Result<(), RegistryError> {
        self.calls.slot(op).fetch_add(1, Ordering::SeqCst);
        let mut failures = self.failures.write().await;
        if let Some(remaining) = failures.get_mut(&(number.to_string(), op)) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RegistryError::Injected(format!("{op:?} for {number}")));
            }
        }
        Ok(())
    }

    async fn company(&self, number: &str) -> Option<FixtureCompany> {
        self.companies.read().await.get(number).cloned()
    }
}

async fn read_optional_json(path: &Path) -> Result<Option<JsonValue>> {
    if !fs::try_exists(path)
        .await
        .with_context(|| format!("checking {}", path.display()))?
    {
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let doc = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(doc))
}

async fn read_items(path: &Path) -> Result<Vec<JsonValue>> {
    Ok(read_optional_json(path)
        .await?
        .map(|doc| list_items(&doc).to_vec())
        .unwrap_or_default())
}

#[async_trait]
impl RegistryApi for FixtureRegistry {
    async fn fetch_profile(&self, number: &str) -> Result<Option<Profile>, RegistryError> {
        self.enter(number, RegistryOp::Profile).await?;
        match self.company(number).await.and_then(|c| c.profile) {
            Some(doc) => parse_profile(&doc).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_filings(
        &self,
        number: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<Filing>, RegistryError> {
        self.enter(number, RegistryOp::Filings).await?;
        let filings = self
            .company(number)
            .await
            .map(|c| c.filings.iter().filter_map(parse_filing).collect())
            .unwrap_or_default();
        Ok(filings_since(filings, since))
    }

    async fn fetch_officers(&self, number: &str) -> Result<Vec<Officer>, RegistryError> {
        self.enter(number, RegistryOp::Officers).await?;
        Ok(self
            .company(number)
            .await
            .map(|c| c.officers.iter().filter_map(parse_officer).collect())
            .unwrap_or_default())
    }

    async fn fetch_charges(&self, number: &str) -> Result<Vec<Charge>, RegistryError> {
        self.enter(number, RegistryOp::Charges).await?;
        Ok(self
            .company(number)
            .await
            .map(|c| c.charges.iter().filter_map(parse_charge).collect())
            .unwrap_or_default())
    }

    async fn search_companies(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<SearchResults, RegistryError> {
        self.enter(query, RegistryOp::Search).await?;
        let needle = query.trim().to_ascii_lowercase();
        let companies = self.companies.read().await;
        let mut items = companies
            .iter()
            .filter_map(|(number, c)| {
                let profile = c.profile.as_ref()?;
                let name = profile.get("company_name")?.as_str()?;
                let matched = name.to_ascii_lowercase().contains(&needle)
                    || number.eq_ignore_ascii_case(&needle);
                matched.then(|| {
                    json!({
                        "company_number": number,
                        "title": name,
                        "company_status": profile.get("company_status"),
                        "company_type": profile.get("type"),
                        "date_of_creation": profile.get("date_of_creation"),
                    })
                })
            })
            .collect::<Vec<_>>();
        items.sort_by(|a, b| a["company_number"].as_str().cmp(&b["company_number"].as_str()));
        let total = items.len();
        items.truncate(limit);
        Ok(parse_search(&json!({ "total_results": total, "items": items })))
    }
}
