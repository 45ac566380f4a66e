use crate::fixtures::{almeria_params, session, SavedSite};
use chrono::NaiveDate;
use serde_json::Value;
use staywatch_core::{Coordinates, NdjsonSink, Region, RunPlan, StaywatchError};
use staywatch_scrapers::RunState;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn lines(path: &std::path::Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_full_run_writes_records_in_listing_order() {
    let site = Arc::new(SavedSite::almeria());
    let dir = tempdir().unwrap();
    let sink = NdjsonSink::new(dir.path());

    let outcome = session(site.clone())
        .run_and_write(&almeria_params(), &sink)
        .await
        .unwrap();

    assert_eq!(outcome.final_state, RunState::Done);
    assert_eq!(outcome.report.cards, 3);
    assert_eq!(outcome.report.details_fetched, 2);
    assert_eq!(outcome.report.details_failed, 1);

    let path = outcome.path.unwrap();
    assert_eq!(path, dir.path().join("almería_20250515.ndjson"));

    let records = lines(&path);
    let ids: Vec<&str> = records.iter().map(|r| r["itemId"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["sol-almeria", "mar-y-sierra", "cortijo-nijar"]);

    let sol = &records[0];
    assert_eq!(
        sol["sourceUrl"],
        "http://mirror.test/hotel/es/sol-almeria.es.html?ss=Almer%C3%ADa"
    );
    assert_eq!(sol["name"], "Hotel Sol Almería");
    assert_eq!(sol["region"], "Almería");
    assert_eq!(sol["locality"], "Almería");
    assert_eq!(sol["reviewScore"], 8.6);
    assert_eq!(sol["reviewOpinionLabel"], "Fabuloso");
    assert_eq!(sol["reviewCount"], 1234);
    assert_eq!(sol["priceMinor"], 1250);
    assert_eq!(sol["checkIn"], "2025-05-15");
    assert_eq!(sol["checkOut"], "2025-05-16");
    assert_eq!(sol["brand"], "Sol Hotels & Resorts");
    assert_eq!(sol["highlights"], serde_json::json!(["Free WiFi", "Sostenible"]));
    assert_eq!(
        sol["amenities"],
        serde_json::json!(["Piscina al aire libre", "Parking gratis"])
    );
    assert_eq!(sol["coordinates"]["latitude"], 36.8381);
    assert_eq!(sol["coordinates"]["longitude"], -2.4597);
    assert_eq!(
        sol["description"],
        "A pocos pasos de la playa del Zapillo. Desayuno buffet incluido."
    );
    assert_eq!(sol["detailedAddress"], "Paseo Marítimo 12, 04007 Almería, España");
    assert!(sol.get("partial").is_none());

    let mar = records[1].as_object().unwrap();
    assert_eq!(mar["partial"], true);
    assert_eq!(mar["locality"], "Roquetas de Mar");
    assert_eq!(mar["priceMinor"], 96);
    assert_eq!(mar["reviewScore"], 7.9);
    for key in ["brand", "highlights", "coordinates", "amenities", "description", "detailedAddress"] {
        assert!(!mar.contains_key(key), "unexpected key {}", key);
    }

    let cortijo = records[2].as_object().unwrap();
    assert_eq!(cortijo["locality"], "Níjar");
    assert!(!cortijo.contains_key("priceMinor"));
    assert!(!cortijo.contains_key("reviewScore"));
    assert!(!cortijo.contains_key("brand"));
    assert!(!cortijo.contains_key("partial"));

    let requested = site.requested_paths();
    assert_eq!(requested.len(), 4);
    assert_eq!(requested[0], "/searchresults.es.html");
}

#[tokio::test]
async fn test_output_is_utf8_without_escapes_and_round_trips() {
    let dir = tempdir().unwrap();
    let sink = NdjsonSink::new(dir.path());

    let outcome = session(Arc::new(SavedSite::almeria()))
        .run_and_write(&almeria_params(), &sink)
        .await
        .unwrap();
    let path = outcome.path.unwrap();

    let raw = fs::read(&path).unwrap();
    assert!(!raw.starts_with(&[0xEF, 0xBB, 0xBF]));
    let text = String::from_utf8(raw).unwrap();
    assert!(text.contains("Cortijo Níjar"));
    assert!(!text.contains("\\u00ed"));
    assert!(!text.contains("null"));
    assert!(text.ends_with('\n'));

    let records = staywatch_core::read_records(&path).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].coordinates, Coordinates::new(36.9669, -2.2063));
    assert!(records[1].partial);
}

#[tokio::test]
async fn test_rerun_overwrites_previous_file() {
    let dir = tempdir().unwrap();
    let sink = NdjsonSink::new(dir.path());
    let target = dir.path().join("almería_20250515.ndjson");
    fs::write(&target, "stale\nstale\nstale\nstale\nstale\n").unwrap();

    session(Arc::new(SavedSite::almeria()))
        .run_and_write(&almeria_params(), &sink)
        .await
        .unwrap();

    assert_eq!(lines(&target).len(), 3);
}

#[tokio::test]
async fn test_listing_failure_writes_nothing() {
    let site = Arc::new(SavedSite::down());
    let dir = tempdir().unwrap();
    let sink = NdjsonSink::new(dir.path().join("runs"));

    let error = session(site.clone())
        .run_and_write(&almeria_params(), &sink)
        .await
        .unwrap_err();

    assert!(matches!(error, StaywatchError::ListingFetch(_)));
    assert!(!dir.path().join("runs").exists());
    assert_eq!(site.requested_paths().len(), 1);
}

#[tokio::test]
async fn test_plan_runs_write_one_file_per_window() {
    let site = Arc::new(SavedSite::almeria());
    let dir = tempdir().unwrap();
    let sink = NdjsonSink::new(dir.path());
    let plan = RunPlan::new(vec![Region::from_id("1363")], 2, 1).unwrap();
    let session = session(site.clone());

    let start = NaiveDate::from_ymd_opt(2025, 5, 15).unwrap();
    for params in plan.runs_for(start) {
        let outcome = session.run_and_write(&params, &sink).await.unwrap();
        assert_eq!(outcome.report.emitted(), 3);
    }

    for day in ["20250515", "20250516"] {
        let path = dir.path().join(format!("almería_{}.ndjson", day));
        assert_eq!(lines(&path).len(), 3);
    }
    let listings = site
        .requested_paths()
        .iter()
        .filter(|path| path.as_str() == "/searchresults.es.html")
        .count();
    assert_eq!(listings, 2);
}
