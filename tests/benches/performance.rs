use async_trait::async_trait;
use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use staywatch_core::{assemble, FetchError, Region, RunParams};
use staywatch_scrapers::{
    DetailParser, ExtractionSession, ListingParser, PageFetcher, RawDocument, SessionConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use url::Url;

const BASE_URL: &str = "http://bench.test/";
const DETAIL: &str = include_str!("../fixtures/detail_sol.html");

fn params() -> RunParams {
    RunParams::new(
        Region::from_id("766"),
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 7, 3).unwrap(),
    )
    .unwrap()
}

// Listing page with `count` cards, every fifth one missing its price and reviews
fn generate_listing(count: usize) -> String {
    let cards: String = (0..count)
        .map(|i| {
            if i % 5 == 4 {
                format!(
                    r#"<div data-testid="property-card">
                        <a data-testid="title-link" href="/hotel/es/h{i}.es.html?aid=1&ss=M%C3%A1laga">
                        <div data-testid="title">Hotel {i}</div></a>
                        <span data-testid="address">Málaga, España</span>
                    </div>"#
                )
            } else {
                format!(
                    r#"<div data-testid="property-card">
                        <a data-testid="title-link" href="/hotel/es/h{i}.es.html?aid=1&label=x&ss=M%C3%A1laga">
                        <div data-testid="title">Hotel {i}</div></a>
                        <span data-testid="address">Málaga, España</span>
                        <div data-testid="review-score"><div>8,{d}</div><div>Muy bien</div><div>1.{i:03} comentarios</div></div>
                        <span data-testid="price-and-discounted-price">€ 1.{i:03}</span>
                    </div>"#,
                    d = i % 10
                )
            }
        })
        .collect();
    format!("<html><body>{}</body></html>", cards)
}

struct InMemorySite {
    listing: String,
}

#[async_trait]
impl PageFetcher for InMemorySite {
    async fn fetch(&self, url: &Url) -> Result<RawDocument, FetchError> {
        let body = if url.path().ends_with("searchresults.es.html") {
            self.listing.clone()
        } else {
            DETAIL.to_string()
        };
        Ok(RawDocument {
            url: url.clone(),
            body,
        })
    }
}

fn bench_parsing(c: &mut Criterion) {
    let listing_parser = ListingParser::new(Url::parse(BASE_URL).unwrap()).unwrap();
    let detail_parser = DetailParser::new("España").unwrap();
    let params = params();

    let mut group = c.benchmark_group("parsing");
    group.sample_size(20);

    for size in [10, 25, 100].iter() {
        let html = generate_listing(*size);
        group.bench_with_input(BenchmarkId::new("listing", size), &html, |b, html| {
            b.iter(|| black_box(listing_parser.parse(black_box(html), &params)));
        });
    }

    let detail_url = Url::parse("http://bench.test/hotel/es/h1.es.html").unwrap();
    group.bench_function("detail", |b| {
        b.iter(|| black_box(detail_parser.parse(detail_url.clone(), black_box(DETAIL))));
    });

    let summaries = listing_parser.parse(&generate_listing(25), &params);
    let enrichment = detail_parser.parse(detail_url.clone(), DETAIL);
    group.bench_function("assemble", |b| {
        b.iter(|| {
            for summary in &summaries {
                black_box(assemble(&params.region, summary.clone(), Some(enrichment.clone())));
            }
        });
    });

    group.finish();
}

fn bench_session(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("session");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    for concurrency in [1usize, 4].iter() {
        let site = Arc::new(InMemorySite {
            listing: generate_listing(25),
        });
        let config = SessionConfig {
            concurrency: *concurrency,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..SessionConfig::new(Url::parse(BASE_URL).unwrap())
        };
        let session = ExtractionSession::new(site, config).unwrap();
        let params = params();

        group.bench_with_input(
            BenchmarkId::new("run_once", concurrency),
            concurrency,
            |b, _| {
                b.to_async(&rt)
                    .iter(|| async { black_box(session.run_once(&params).await.unwrap()) });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_parsing, bench_session);
criterion_main!(benches);
