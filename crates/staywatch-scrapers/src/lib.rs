pub mod detail;
pub mod fetch;
pub mod field;
pub mod listing;
pub mod scheduler;
pub mod session;
#[cfg(test)]
mod testing;

use async_trait::async_trait;
use staywatch_core::{FetchError, Result, RunParams};
use url::Url;

pub use detail::DetailParser;
pub use fetch::{FetcherConfig, HttpFetcher};
pub use field::{Extracted, Outcome};
pub use listing::ListingParser;
pub use scheduler::RunScheduler;
pub use session::{ExtractionSession, RunOutcome, RunOutput, RunReport, RunState, SessionConfig};

pub const DEFAULT_BASE_URL: &str = "https://www.booking.com/";

/// Raw markup of a successfully retrieved page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub url: Url,
    pub body: String,
}

/// Retrieves pages. How (headers, proxies, retries) is up to the implementation;
/// a failure must come back as a [`FetchError`], never as an empty body.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> std::result::Result<RawDocument, FetchError>;
}

/// Search-results query for one run.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub params: RunParams,
}

impl SearchQuery {
    pub fn new(params: RunParams) -> Self {
        Self { params }
    }

    /// Hotel-only results for the region, priced in euros, for the run's stay.
    pub fn to_url(&self, base_url: &Url) -> Result<Url> {
        let mut url = base_url.join("searchresults.es.html")?;
        url.query_pairs_mut()
            .append_pair("lang", "es")
            .append_pair("dest_id", &self.params.region.id)
            .append_pair("dest_type", "region")
            .append_pair("ac_langcode", "es")
            .append_pair("nflt", "ht_id=204")
            .append_pair("shw_aparth", "0")
            .append_pair("selected_currency", "EUR")
            .append_pair("checkin", &self.params.check_in.format("%Y-%m-%d").to_string())
            .append_pair("checkout", &self.params.check_out.format("%Y-%m-%d").to_string());
        Ok(url)
    }
}
