//! In-memory fetcher shared by the session and scheduler tests.

use crate::{PageFetcher, RawDocument};
use async_trait::async_trait;
use staywatch_core::{
    CanonicalRecord, FetchError, NdjsonSink, RecordSink, Result, RunParams, StaywatchError,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

pub(crate) const LISTING_PATH: &str = "searchresults.es.html";

#[derive(Clone)]
pub(crate) enum Page {
    Html(String),
    Slow(Duration, String),
    Fail(u16),
    /// Cancels the token, then never answers.
    CancelAndHang(CancellationToken),
}

/// Serves the listing for any search URL and detail pages by exact URL.
/// Unknown detail URLs answer 404.
pub(crate) struct FixtureFetcher {
    listings: HashMap<String, Page>,
    default_listing: Page,
    details: HashMap<String, Page>,
    calls: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub(crate) fn new(listing: Page) -> Self {
        Self {
            listings: HashMap::new(),
            default_listing: listing,
            details: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Listing served when the search URL has `dest_id=<region_id>`.
    pub(crate) fn with_region_listing(mut self, region_id: &str, page: Page) -> Self {
        self.listings.insert(region_id.to_string(), page);
        self
    }

    pub(crate) fn with_detail(mut self, url: &str, page: Page) -> Self {
        self.details.insert(url.to_string(), page);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<RawDocument, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }

        let page = if url.path().ends_with(LISTING_PATH) {
            url.query_pairs()
                .find(|(key, _)| key == "dest_id")
                .and_then(|(_, id)| self.listings.get(id.as_ref()).cloned())
                .unwrap_or_else(|| self.default_listing.clone())
        } else {
            self.details.get(url.as_str()).cloned().unwrap_or(Page::Fail(404))
        };

        match page {
            Page::Html(body) => Ok(RawDocument {
                url: url.clone(),
                body,
            }),
            Page::Slow(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(RawDocument {
                    url: url.clone(),
                    body,
                })
            }
            Page::Fail(status) => Err(FetchError::HttpStatus {
                url: url.to_string(),
                status,
            }),
            Page::CancelAndHang(token) => {
                token.cancel();
                futures::future::pending().await
            }
        }
    }
}

/// Writes like [`NdjsonSink`] except for one region, which fails as an
/// unwritable target would.
pub(crate) struct RejectingSink {
    pub(crate) inner: NdjsonSink,
    pub(crate) region_id: String,
}

impl RecordSink for RejectingSink {
    fn write(&self, params: &RunParams, records: &[CanonicalRecord]) -> Result<PathBuf> {
        if params.region.id == self.region_id {
            return Err(StaywatchError::SinkWrite {
                path: self.inner.dir().join(params.output_file_name()),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.inner.write(params, records)
    }
}

pub(crate) fn card(href: &str, name: &str) -> String {
    format!(
        r#"<div data-testid="property-card">
            <a data-testid="title-link" href="{href}"><div data-testid="title">{name}</div></a>
            <span data-testid="address">Almería, España</span>
            <div data-testid="review-score"><div>8,0</div><div>Muy bien</div><div>10 comentarios</div></div>
            <span data-testid="price-and-discounted-price">€ 100</span>
        </div>"#
    )
}

pub(crate) fn listing(cards: &[String]) -> String {
    format!("<html><body>{}</body></html>", cards.concat())
}

pub(crate) fn detail(brand: &str) -> String {
    format!(
        r#"<html><head>
            <meta property="booking_com:location:latitude" content="36.84">
            <meta property="booking_com:location:longitude" content="-2.46">
        </head><body>
            <div class="d7b319a0ec"><div class="b08850ce41">{brand}</div></div>
            <p data-testid="property-description">Cerca de la playa.</p>
        </body></html>"#
    )
}
