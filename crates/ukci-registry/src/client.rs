use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use tracing::{debug, info_span, warn, Instrument};
use ukci_core::{Charge, Filing, Officer, Profile, SearchResults};

use crate::error::RegistryError;
use crate::limiter::SlidingWindowLimiter;
use crate::normalize::{
    filings_since, list_items, list_total, parse_charge, parse_filing, parse_officer,
    parse_profile, parse_search,
};
use crate::RegistryApi;

pub const DEFAULT_BASE_URL: &str = "https://api.company-information.service.gov.uk";

#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("ukci-monitor/{}", env!("CARGO_PKG_VERSION")),
            page_size: 100,
            max_pages: 20,
        }
    }
}

/// Live Companies House client. Cheap to clone; clones share the limiter.
#[derive(Debug, Clone)]
pub struct CompaniesHouseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: usize,
    max_pages: usize,
    limiter: Arc<SlidingWindowLimiter>,
}

impl CompaniesHouseClient {
    pub fn new(
        config: RegistryClientConfig,
        limiter: Arc<SlidingWindowLimiter>,
    ) -> Result<Self, RegistryError> {
        let api_key = config
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(RegistryError::MissingApiKey)?;

        let http = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(RegistryError::Build)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            page_size: config.page_size.clamp(1, 100),
            max_pages: config.max_pages.max(1),
            limiter,
        })
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    /// GET a JSON document. `Ok(None)` means 404.
    ///
    /// Waits on the shared limiter before every attempt; a 429 puts the limiter into
    /// cool-down and re-issues the request once capacity is back.
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<JsonValue>, RegistryError> {
        let url = format!("{}{}", self.base_url, path);
        let budget = self.limiter.config().max_wait;
        let started = Instant::now();

        loop {
            let remaining = budget.saturating_sub(started.elapsed());
            self.limiter.acquire(remaining).await?;

            let span = info_span!("registry_get", url = %url);
            let response = self
                .http
                .get(&url)
                .basic_auth(&self.api_key, Some(""))
                .query(query)
                .send()
                .instrument(span)
                .await
                .map_err(|err| request_error(&url, err))?;

            match response.status() {
                status if status.is_success() => {
                    let doc = response
                        .json::<JsonValue>()
                        .await
                        .map_err(|err| RegistryError::Decode(format!("{url}: {err}")))?;
                    return Ok(Some(doc));
                }
                StatusCode::NOT_FOUND => {
                    debug!(%url, "registry returned 404");
                    return Ok(None);
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    warn!(
                        %url,
                        cooldown_secs = self.limiter.config().cooldown.as_secs(),
                        "registry returned 429, cooling down"
                    );
                    self.limiter.back_off();
                    if started.elapsed() >= budget {
                        return Err(RegistryError::RateLimited {
                            waited: started.elapsed(),
                        });
                    }
                }
                status => {
                    return Err(RegistryError::Status {
                        status: status.as_u16(),
                        url,
                    });
                }
            }
        }
    }

    /// Collects list items page by page until the advertised total, an empty page,
    /// the page cap, or `stop` says the remaining pages are not needed.
    async fn get_paged(
        &self,
        path: &str,
        mut stop: impl FnMut(&[JsonValue]) -> bool + Send,
    ) -> Result<Vec<JsonValue>, RegistryError> {
        let mut collected = Vec::new();
        for page in 0..self.max_pages {
            let query = [
                ("items_per_page", self.page_size.to_string()),
                ("start_index", collected.len().to_string()),
            ];
            let Some(doc) = self.get_json(path, &query).await? else {
                break;
            };
            let items = list_items(&doc);
            if items.is_empty() {
                break;
            }
            let done = stop(items);
            collected.extend(items.iter().cloned());
            if done || list_total(&doc).is_some_and(|total| collected.len() >= total) {
                break;
            }
            if page + 1 == self.max_pages {
                warn!(path, pages = self.max_pages, "page cap reached, list truncated");
            }
        }
        Ok(collected)
    }
}

fn request_error(url: &str, err: reqwest::Error) -> RegistryError {
    if err.is_timeout() {
        RegistryError::Timeout {
            url: url.to_string(),
        }
    } else {
        RegistryError::Transport {
            url: url.to_string(),
            source: err,
        }
    }
}

fn page_predates(items: &[JsonValue], since: NaiveDate) -> bool {
    items
        .iter()
        .filter_map(parse_filing)
        .filter_map(|f| f.date)
        .any(|d| d < since)
}

#[async_trait]
impl RegistryApi for CompaniesHouseClient {
    async fn fetch_profile(&self, number: &str) -> Result<Option<Profile>, RegistryError> {
        match self.get_json(&format!("/company/{number}"), &[]).await? {
            Some(doc) => parse_profile(&doc).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_filings(
        &self,
        number: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<Filing>, RegistryError> {
        let items = self
            .get_paged(&format!("/company/{number}/filing-history"), |page| {
                since.is_some_and(|since| page_predates(page, since))
            })
            .await?;
        let filings = items.iter().filter_map(parse_filing).collect();
        Ok(filings_since(filings, since))
    }

    async fn fetch_officers(&self, number: &str) -> Result<Vec<Officer>, RegistryError> {
        let items = self
            .get_paged(&format!("/company/{number}/officers"), |_| false)
            .await?;
        Ok(items.iter().filter_map(parse_officer).collect())
    }

    async fn fetch_charges(&self, number: &str) -> Result<Vec<Charge>, RegistryError> {
        let items = self
            .get_paged(&format!("/company/{number}/charges"), |_| false)
            .await?;
        Ok(items.iter().filter_map(parse_charge).collect())
    }

    async fn search_companies(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<SearchResults, RegistryError> {
        let params = [
            ("q", query.to_string()),
            ("items_per_page", limit.clamp(1, 100).to_string()),
            ("start_index", "0".to_string()),
        ];
        Ok(self
            .get_json("/search/companies", &params)
            .await?
            .map(|doc| parse_search(&doc))
            .unwrap_or_default())
    }
}
