use crate::{CanonicalRecord, EnrichmentRecord, Region, SummaryRecord};
use tracing::{debug, warn};

/// Merges a listing card with its detail page into the emitted record.
///
/// Identity, review and price fields always come from the card. Brand,
/// highlights, coordinates, amenities, description and the long-form address
/// come from the detail page when one is supplied. Without it the record is
/// built from the card alone and flagged `partial`; enrichment fields are left
/// out entirely rather than written as nulls.
///
/// An enrichment keyed to a different URL than the card is discarded.
pub fn assemble(
    region: &Region,
    summary: SummaryRecord,
    enrichment: Option<EnrichmentRecord>,
) -> CanonicalRecord {
    let enrichment = enrichment.filter(|detail| {
        let matches = summary.detail_key() == Some(&detail.source_url);
        if !matches {
            warn!(
                card = ?summary.source_url.as_ref().map(|u| u.as_str()),
                detail = %detail.source_url,
                "Discarding detail record keyed to a different URL"
            );
        }
        matches
    });

    let has_identity = summary.source_url.is_some()
        && summary.item_id.as_deref().is_some_and(|id| !id.is_empty());
    let partial = enrichment.is_none() || !has_identity;

    let mut record = CanonicalRecord {
        source_url: summary.source_url,
        item_id: summary.item_id,
        name: summary.name,
        brand: None,
        highlights: Vec::new(),
        region: Some(region.name.clone()),
        locality: summary.locality,
        raw_address: summary.raw_address,
        detailed_address: None,
        coordinates: None,
        amenities: Vec::new(),
        description: None,
        review_score: summary.review_score,
        review_opinion_label: summary.review_opinion_label,
        review_count: summary.review_count,
        check_in: Some(summary.check_in),
        check_out: Some(summary.check_out),
        price_minor: summary.price_minor,
        partial,
    };

    if let Some(detail) = enrichment {
        record.brand = detail.brand;
        record.highlights = detail.highlights;
        record.coordinates = detail.coordinates;
        record.amenities = detail.amenities;
        record.description = detail.description;
        record.detailed_address = detail.detailed_address;
    }

    prune(&mut record);
    debug!(item_id = ?record.item_id, partial = record.partial, "Assembled record");
    record
}

/// Blank strings carry no information; treat them like missing values.
fn prune(record: &mut CanonicalRecord) {
    for field in [
        &mut record.item_id,
        &mut record.name,
        &mut record.brand,
        &mut record.locality,
        &mut record.raw_address,
        &mut record.detailed_address,
        &mut record.description,
        &mut record.review_opinion_label,
    ] {
        if field.as_deref().is_some_and(|s| s.trim().is_empty()) {
            *field = None;
        }
    }
    record.highlights.retain(|h| !h.trim().is_empty());
    record.amenities.retain(|a| !a.trim().is_empty());
}
