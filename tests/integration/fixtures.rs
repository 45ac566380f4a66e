use async_trait::async_trait;
use chrono::NaiveDate;
use staywatch_core::{FetchError, Region, RunParams};
use staywatch_scrapers::{ExtractionSession, PageFetcher, RawDocument, SessionConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const BASE_URL: &str = "http://mirror.test/";

const LISTING: &str = include_str!("../fixtures/listing_almeria.html");
const DETAIL_SOL: &str = include_str!("../fixtures/detail_sol.html");
const DETAIL_CORTIJO: &str = include_str!("../fixtures/detail_cortijo.html");

/// Serves saved pages by URL path; any other path answers with `status`.
pub struct SavedSite {
    pages: HashMap<String, String>,
    status: u16,
    requests: Mutex<Vec<String>>,
}

impl SavedSite {
    /// The Almería listing with two of its three detail pages available.
    pub fn almeria() -> Self {
        let mut pages = HashMap::new();
        pages.insert("/searchresults.es.html".to_string(), LISTING.to_string());
        pages.insert("/hotel/es/sol-almeria.es.html".to_string(), DETAIL_SOL.to_string());
        pages.insert("/hotel/es/cortijo-nijar.es.html".to_string(), DETAIL_CORTIJO.to_string());
        Self {
            pages,
            status: 503,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn down() -> Self {
        Self {
            pages: HashMap::new(),
            status: 502,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requested_paths(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for SavedSite {
    async fn fetch(&self, url: &Url) -> Result<RawDocument, FetchError> {
        self.requests.lock().unwrap().push(url.path().to_string());
        match self.pages.get(url.path()).cloned() {
            Some(body) => Ok(RawDocument {
                url: url.clone(),
                body,
            }),
            None => Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: self.status,
            }),
        }
    }
}

pub fn session(site: Arc<SavedSite>) -> ExtractionSession {
    let config = SessionConfig {
        concurrency: 2,
        min_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        fetch_timeout: Duration::from_secs(5),
        ..SessionConfig::new(Url::parse(BASE_URL).unwrap())
    };
    ExtractionSession::new(site, config).unwrap()
}

pub fn almeria_params() -> RunParams {
    RunParams::new(
        Region::from_id("1363"),
        NaiveDate::from_ymd_opt(2025, 5, 15).unwrap(),
        NaiveDate::from_ymd_opt(2025, 5, 16).unwrap(),
    )
    .unwrap()
}
