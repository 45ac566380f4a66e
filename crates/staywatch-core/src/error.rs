use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a page could not be retrieved. Kept apart from an empty body so callers
/// never mistake a failed fetch for a document with no cards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    #[error("unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url }
            | FetchError::HttpStatus { url, .. }
            | FetchError::Network { url, .. } => url,
        }
    }
}

#[derive(Debug, Error)]
pub enum StaywatchError {
    #[error("Listing fetch failed: {0}")]
    ListingFetch(#[source] FetchError),
    #[error("Sink write failed for {}: {source}", .path.display())]
    SinkWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid selector: {0}")]
    Selector(String),
    #[error("Invalid pattern: {0}")]
    Pattern(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, StaywatchError>;
