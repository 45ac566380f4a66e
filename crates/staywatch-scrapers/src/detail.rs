use crate::field::{child_elements, collapsed_text, Extracted, Rule};
use regex::Regex;
use scraper::{ElementRef, Html};
use staywatch_core::{Coordinates, EnrichmentRecord, Result, StaywatchError};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

const BADGES: &str = r#"span.hp__hotel_ratings.pp-header__badges.pp-header__badges--combined div[data-capla-component-boundary="b-property-web-property-page/Badges"]"#;
const BADGE_ITEMS: &str = "span, div";
const BRAND: &str = "div.d7b319a0ec div.b08850ce41";
const MAP_PIN: &str = "a#map_trigger_header_pin";
const LATITUDE_META: &str = r#"meta[property="booking_com:location:latitude"]"#;
const LONGITUDE_META: &str = r#"meta[property="booking_com:location:longitude"]"#;
const GEO_POSITION_META: &str = r#"meta[name="geo.position"]"#;
const AMENITIES: &str = "div.hp--popular_facilities ul.e9f7361569 li.b0bf4dc58f div.aa8988bf9c span.f006e3fcbd";
const DESCRIPTION: &str = r#"p[data-testid="property-description"]"#;
const ADDRESS: &str = "div.b99b6ef58f.cb4b7a25d9";

/// Two badge texts glued together during text extraction leave a lowercase
/// letter directly before an uppercase one, e.g. `ParkingFree`. Requiring two
/// more letters before the boundary spares short brand-style words such as
/// `WiFi`, at the cost of missing merges whose first part is two letters or
/// ends in one after a hyphen (`TvBar`, `Wi-FiPiscina`).
const CONCATENATED_WORDS: &str = r"\p{L}{2}\p{Ll}\p{Lu}";

/// Parses a property's own page into an enrichment record.
#[derive(Debug, Clone)]
pub struct DetailParser {
    badges: Rule,
    badge_items: Rule,
    brand: Rule,
    map_pin: Rule,
    latitude_meta: Rule,
    longitude_meta: Rule,
    geo_position_meta: Rule,
    amenities: Rule,
    description: Rule,
    address: Rule,
    concatenated: Regex,
    country_token: String,
}

impl DetailParser {
    /// `country_token` bounds the detailed address: text after its first
    /// occurrence is discarded.
    pub fn new(country_token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            badges: Rule::text(BADGES)?,
            badge_items: Rule::text(BADGE_ITEMS)?,
            brand: Rule::text(BRAND)?,
            map_pin: Rule::attr(MAP_PIN, "data-atlas-latlng")?,
            latitude_meta: Rule::attr(LATITUDE_META, "content")?,
            longitude_meta: Rule::attr(LONGITUDE_META, "content")?,
            geo_position_meta: Rule::attr(GEO_POSITION_META, "content")?,
            amenities: Rule::text(AMENITIES)?,
            description: Rule::prose(DESCRIPTION)?,
            address: Rule::text(ADDRESS)?,
            concatenated: Regex::new(CONCATENATED_WORDS)
                .map_err(|e| StaywatchError::Pattern(e.to_string()))?,
            country_token: country_token.into(),
        })
    }

    pub fn parse(&self, source_url: Url, html: &str) -> EnrichmentRecord {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let record = EnrichmentRecord {
            brand: self.brand.extract(root).log("brand"),
            highlights: self.highlights(root),
            coordinates: self.coordinates(root).log("coordinates"),
            amenities: self.amenities.extract_all(root),
            description: self.description.extract(root).log("description"),
            detailed_address: self.detailed_address(root).log("detailed_address"),
            source_url,
        };
        debug!(
            url = %record.source_url,
            highlights = record.highlights.len(),
            amenities = record.amenities.len(),
            "Parsed detail page"
        );
        record
    }

    fn highlights(&self, root: ElementRef<'_>) -> Vec<String> {
        match self.badges.first(root) {
            Some(container) => self.filter_highlights(self.badge_items.extract_all(container)),
            None => {
                debug!(field = "highlights", "Field absent");
                Vec::new()
            }
        }
    }

    /// Drops glued-together candidates and repeats, keeping first-seen order.
    pub fn filter_highlights<I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .map(Into::into)
            .map(|c: String| c.trim().to_string())
            .filter(|c| !c.is_empty() && !self.looks_concatenated(c))
            .filter(|c| seen.insert(c.clone()))
            .collect()
    }

    pub fn looks_concatenated(&self, text: &str) -> bool {
        self.concatenated.is_match(text)
    }

    /// Map pin attribute, then the latitude/longitude meta pair, then the
    /// combined geo-position meta tag. The first to yield two numbers wins.
    fn coordinates(&self, root: ElementRef<'_>) -> Extracted<Coordinates> {
        self.map_pin
            .extract(root)
            .and_then(|raw| parse_lat_lon(&raw))
            .or_else(|| {
                self.latitude_meta
                    .extract(root)
                    .zip(self.longitude_meta.extract(root))
                    .and_then(|(lat, lon)| parse_pair(&lat, &lon))
            })
            .or_else(|| {
                self.geo_position_meta
                    .extract(root)
                    .and_then(|raw| parse_lat_lon(&raw))
            })
    }

    /// Container text minus its second child's text, cut after the country
    /// token.
    fn detailed_address(&self, root: ElementRef<'_>) -> Extracted<String> {
        let Some(container) = self.address.first(root) else {
            return Extracted::Absent;
        };
        let full = collapsed_text(container);
        let label = child_elements(container)
            .nth(1)
            .map(collapsed_text)
            .filter(|text| !text.is_empty());

        let head = match &label {
            Some(label) => full.split_once(label.as_str()).map_or(full.as_str(), |(head, _)| head),
            None => full.as_str(),
        };

        let address = truncate_after(head.trim(), &self.country_token);
        if address.is_empty() {
            Extracted::Absent
        } else {
            Extracted::Found(address.to_string())
        }
    }
}

/// `text` up to and including the first `token`; all of `text` when the token
/// does not occur.
pub fn truncate_after<'a>(text: &'a str, token: &str) -> &'a str {
    if token.is_empty() {
        return text;
    }
    match text.find(token) {
        Some(idx) => &text[..idx + token.len()],
        None => text,
    }
}

/// Parses `"lat,lon"` (or `"lat;lon"`).
pub fn parse_lat_lon(raw: &str) -> Extracted<Coordinates> {
    let mut parts = raw.split([',', ';']);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lat), Some(lon), None) => parse_pair(lat, lon),
        _ => Extracted::Malformed(raw.to_string()),
    }
}

fn parse_pair(lat: &str, lon: &str) -> Extracted<Coordinates> {
    let parsed = lat
        .trim()
        .parse::<f64>()
        .ok()
        .zip(lon.trim().parse::<f64>().ok())
        .and_then(|(lat, lon)| Coordinates::new(lat, lon));

    match parsed {
        Some(coordinates) => Extracted::Found(coordinates),
        None => Extracted::Malformed(format!("{},{}", lat.trim(), lon.trim())),
    }
}
