use crate::field::{child_elements, collapsed_text, parse_selector, to_count, to_decimal, to_integer, Extracted, Rule};
use scraper::{ElementRef, Html, Selector};
use staywatch_core::{Result, RunParams, SummaryRecord};
use tracing::{debug, info};
use url::Url;

const CARD: &str = r#"div[data-testid="property-card"]"#;
const TITLE_LINK: &str = r#"a[data-testid="title-link"]"#;
const TITLE: &str = r#"div[data-testid="title"]"#;
const ADDRESS: &str = r#"span[data-testid="address"]"#;
const REVIEW_SCORE: &str = r#"div[data-testid="review-score"]"#;
const PRICE: &str = r#"span[data-testid="price-and-discounted-price"]"#;
const PRICE_FALLBACK: &str = r#"div[data-testid="price-and-discounted-price"] span"#;

/// Query parameter carrying the searched locality on card links.
const LOCALITY_PARAM: &str = "ss";

/// Query parameters that only identify the browsing session or search
/// position. They are dropped so the same property always has the same URL.
const TRACKING_PARAMS: &[&str] = &[
    "aid",
    "label",
    "sid",
    "srpvid",
    "srepoch",
    "sr_order",
    "ucfs",
    "arphpl",
    "hpos",
    "hapos",
    "dest_id",
    "dest_type",
    "dist",
    "type",
    "activeTab",
    "all_sr_blocks",
    "highlighted_blocks",
    "matching_block_id",
    "sr_pri_blocks",
    "from",
    "from_sustainable_property_sr",
    "from_beach_key_ufi_sr",
];

/// Parses a search-results page into one summary per property card.
#[derive(Debug, Clone)]
pub struct ListingParser {
    base_url: Url,
    card: Selector,
    title_link: Rule,
    title: Rule,
    address: Rule,
    review: Selector,
    price: Rule,
    price_fallback: Rule,
}

/// The three values read positionally from a card's review container.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewBlock {
    pub score: Extracted<f64>,
    pub label: Extracted<String>,
    pub count: Extracted<u32>,
}

impl ListingParser {
    /// `base_url` resolves relative card links.
    pub fn new(base_url: Url) -> Result<Self> {
        Ok(Self {
            base_url,
            card: parse_selector(CARD)?,
            title_link: Rule::attr(TITLE_LINK, "href")?,
            title: Rule::text(TITLE)?,
            address: Rule::text(ADDRESS)?,
            review: parse_selector(REVIEW_SCORE)?,
            price: Rule::text(PRICE)?,
            price_fallback: Rule::text(PRICE_FALLBACK)?,
        })
    }

    /// Cards in document order. Stay dates come from `params`, not the page.
    pub fn parse(&self, html: &str, params: &RunParams) -> Vec<SummaryRecord> {
        let document = Html::parse_document(html);
        let summaries: Vec<SummaryRecord> = document
            .select(&self.card)
            .map(|card| self.parse_card(card, params))
            .collect();

        info!("Found {} property cards for {}", summaries.len(), params);
        summaries
    }

    fn parse_card(&self, card: ElementRef<'_>, params: &RunParams) -> SummaryRecord {
        let raw_link = self
            .title_link
            .extract(card)
            .and_then(|href| match self.base_url.join(&href) {
                Ok(url) => Extracted::Found(url),
                Err(_) => Extracted::Malformed(href),
            })
            .log("source_url");

        let source_url = raw_link.as_ref().map(canonical_url);
        let item_id = source_url
            .as_ref()
            .map_or(Extracted::Absent, item_id_from_url)
            .log("item_id");

        let raw_address = self.address.extract(card).log("raw_address");
        let locality = raw_link
            .as_ref()
            .map_or(Extracted::Absent, locality_from_url)
            .or_else(|| {
                raw_address
                    .as_deref()
                    .map_or(Extracted::Absent, locality_from_address)
            })
            .log("locality");

        let review = parse_review_block(card.select(&self.review).next());

        let price_minor = self
            .price
            .extract(card)
            .or_else(|| self.price_fallback.extract(card))
            .and_then(|text| parse_price(&text))
            .log("price_minor");

        let summary = SummaryRecord {
            source_url,
            item_id,
            name: self.title.extract(card).log("name"),
            locality,
            raw_address,
            review_score: review.score.log("review_score"),
            review_opinion_label: review.label.log("review_opinion_label"),
            review_count: review.count.log("review_count"),
            price_minor,
            check_in: params.check_in,
            check_out: params.check_out,
        };
        debug!(item_id = ?summary.item_id, name = ?summary.name, "Parsed card");
        summary
    }
}

/// Drops tracking parameters and the fragment, keeping the remaining query in
/// its original order.
pub fn canonical_url(raw: &Url) -> Url {
    let mut url = raw.clone();
    url.set_fragment(None);

    let kept: Vec<(String, String)> = raw
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url
}

/// Last path segment up to its first `.`: `/hotel/es/sol-y-mar.es.html`
/// gives `sol-y-mar`.
pub fn item_id_from_url(url: &Url) -> Extracted<String> {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last());

    match segment {
        Some(segment) => {
            let id = segment.split('.').next().unwrap_or_default();
            if id.is_empty() {
                Extracted::Malformed(segment.to_string())
            } else {
                Extracted::Found(id.to_string())
            }
        }
        None => Extracted::Absent,
    }
}

/// Locality carried in the card link's search parameter.
pub fn locality_from_url(url: &Url) -> Extracted<String> {
    let value = url
        .query_pairs()
        .find(|(key, _)| key == LOCALITY_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty());
    Extracted::from_option(value)
}

/// Text before the first comma of the card's address line.
pub fn locality_from_address(address: &str) -> Extracted<String> {
    let head = address.split(',').next().unwrap_or_default().trim();
    if head.is_empty() {
        Extracted::Absent
    } else {
        Extracted::Found(head.to_string())
    }
}

/// Reads score, opinion label and review count from the container's direct
/// children by position. Each value fails on its own. The count is the first
/// number in its child's text (`1.234 comentarios`, `Basado en 87`), so a
/// label that puts another number ahead of the count yields that number.
pub fn parse_review_block(container: Option<ElementRef<'_>>) -> ReviewBlock {
    let children: Vec<String> = container
        .map(|c| child_elements(c).map(collapsed_text).collect())
        .unwrap_or_default();
    let child = |index: usize| {
        Extracted::from_option(children.get(index).filter(|text| !text.is_empty()).cloned())
    };

    ReviewBlock {
        score: child(0).and_then(|text| parse_score(&text)),
        label: child(1),
        count: child(2).and_then(|text| to_count(&text)),
    }
}

/// Review scores live on a 0 to 10 scale.
pub fn parse_score(text: &str) -> Extracted<f64> {
    to_decimal(text).and_then(|score| {
        if (0.0..=10.0).contains(&score) {
            Extracted::Found(score)
        } else {
            Extracted::Malformed(text.to_string())
        }
    })
}

/// Whole-currency amount from a price label; fractions are truncated.
pub fn parse_price(text: &str) -> Extracted<i64> {
    to_integer(text).and_then(|amount| {
        if amount >= 0 {
            Extracted::Found(amount)
        } else {
            Extracted::Malformed(text.to_string())
        }
    })
}
