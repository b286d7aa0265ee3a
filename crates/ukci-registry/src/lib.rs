//! Companies House registry access: rate limiting, HTTP transport, normalization,
//! and an offline fixture registry.

mod client;
mod error;
mod fixtures;
mod limiter;
pub mod normalize;

use async_trait::async_trait;
use chrono::NaiveDate;
use ukci_core::{Charge, Filing, Officer, Profile, SearchResults};

pub use client::{CompaniesHouseClient, RegistryClientConfig, DEFAULT_BASE_URL};
pub use error::{classify_reqwest_error, classify_status, RegistryError, RetryDisposition};
pub use fixtures::{FixtureRegistry, RegistryOp};
pub use limiter::{Clock, ManualClock, RateLimitConfig, SlidingWindowLimiter, SystemClock};

pub const CRATE_NAME: &str = "ukci-registry";

/// Read-only view of the external company registry.
///
/// A company that does not exist is `Ok(None)` from `fetch_profile` and an empty list
/// from the list operations. Errors are transport or decode faults and carry their
/// own retry disposition.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn fetch_profile(&self, number: &str) -> Result<Option<Profile>, RegistryError>;

    /// Filings dated on or after `since` (all filings when `None`), newest first.
    async fn fetch_filings(
        &self,
        number: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<Filing>, RegistryError>;

    async fn fetch_officers(&self, number: &str) -> Result<Vec<Officer>, RegistryError>;

    async fn fetch_charges(&self, number: &str) -> Result<Vec<Charge>, RegistryError>;

    async fn search_companies(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<SearchResults, RegistryError>;
}
