use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

mod assemble;
mod display;
mod error;
pub mod schedule;
pub mod sink;

pub use assemble::assemble;
pub use display::{create_record_table, summarize_records, RecordTableRow};
pub use error::{FetchError, Result, StaywatchError};
pub use schedule::{DailyTrigger, RunPlan};
pub use sink::{read_records, NdjsonSink, RecordSink};

/// Destination ids the search site uses for Andalusian provinces.
const KNOWN_REGIONS: &[(&str, &str)] = &[
    ("1363", "Almería"),
    ("755", "Granada"),
    ("766", "Málaga"),
    ("747", "Cádiz"),
    ("774", "Sevilla"),
    ("758", "Huelva"),
    ("750", "Córdoba"),
    ("759", "Jaén"),
];

/// A searchable region: the site's destination id plus a display name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Region {
    pub id: String,
    pub name: String,
}

impl Region {
    /// Builds a region from a destination id. Unknown ids are kept and named
    /// after the id itself.
    pub fn from_id(id: &str) -> Self {
        let id = id.trim();
        let name = KNOWN_REGIONS
            .iter()
            .find(|(known, _)| *known == id)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| id.to_string());

        Self {
            id: id.to_string(),
            name,
        }
    }

    pub fn known() -> Vec<Region> {
        KNOWN_REGIONS.iter().map(|(id, _)| Region::from_id(id)).collect()
    }

    /// Lowercased name with spaces replaced by underscores, used in file names.
    pub fn slug(&self) -> String {
        self.name.to_lowercase().replace(' ', "_")
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

impl FromStr for Region {
    type Err = String;

    /// Accepts a destination id or the name of a known region (case-insensitive).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Region cannot be empty".to_string());
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Region::from_id(s));
        }

        let wanted = s.to_lowercase();
        KNOWN_REGIONS
            .iter()
            .find(|(_, name)| name.to_lowercase() == wanted)
            .map(|(id, _)| Region::from_id(id))
            .ok_or_else(|| {
                format!(
                    "Unknown region: {}. Use a destination id or one of: {}",
                    s,
                    KNOWN_REGIONS
                        .iter()
                        .map(|(_, name)| *name)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// One unit of extraction work: a region and a stay window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub region: Region,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl RunParams {
    pub fn new(region: Region, check_in: NaiveDate, check_out: NaiveDate) -> Result<Self> {
        if check_out <= check_in {
            return Err(StaywatchError::Config(format!(
                "check-out {} must be after check-in {}",
                check_out, check_in
            )));
        }
        Ok(Self {
            region,
            check_in,
            check_out,
        })
    }

    /// Deterministic output name: region slug plus check-in date.
    pub fn output_file_name(&self) -> String {
        format!("{}_{}.ndjson", self.region.slug(), self.check_in.format("%Y%m%d"))
    }
}

impl fmt::Display for RunParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}..{}", self.region, self.check_in, self.check_out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Returns `None` when either value is outside the valid geographic range.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// One property card from a search-results page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub source_url: Option<Url>,
    pub item_id: Option<String>,
    pub name: Option<String>,
    pub locality: Option<String>,
    pub raw_address: Option<String>,
    pub review_score: Option<f64>,
    pub review_opinion_label: Option<String>,
    pub review_count: Option<u32>,
    pub price_minor: Option<i64>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl SummaryRecord {
    /// Key used to pair this card with its detail page. Cards without a
    /// usable link have none and are never enriched.
    pub fn detail_key(&self) -> Option<&Url> {
        self.source_url.as_ref()
    }
}

/// Fields taken from a property's own detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub source_url: Url,
    pub brand: Option<String>,
    pub highlights: Vec<String>,
    pub coordinates: Option<Coordinates>,
    pub amenities: Vec<String>,
    pub description: Option<String>,
    pub detailed_address: Option<String>,
}

impl EnrichmentRecord {
    pub fn empty(source_url: Url) -> Self {
        Self {
            source_url,
            brand: None,
            highlights: Vec::new(),
            coordinates: None,
            amenities: Vec::new(),
            description: None,
            detailed_address: None,
        }
    }
}

/// The emitted record. Absent keys mean "unknown": every `None` and every
/// empty list is left out of the serialized object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amenities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_opinion_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_minor: Option<i64>,
    /// Set when the detail page could not be fetched or the card had no
    /// usable identity.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

impl CanonicalRecord {
    /// True when the record carries a non-empty identity and was fully enriched.
    pub fn is_complete(&self) -> bool {
        !self.partial
            && self.source_url.is_some()
            && self.item_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}
