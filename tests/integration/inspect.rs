use crate::fixtures::{almeria_params, session, SavedSite};
use staywatch_core::{create_record_table, read_records, summarize_records, NdjsonSink};
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_written_run_renders_as_table() {
    colored::control::set_override(false);
    let dir = tempdir().unwrap();
    let sink = NdjsonSink::new(dir.path());

    let outcome = session(Arc::new(SavedSite::almeria()))
        .run_and_write(&almeria_params(), &sink)
        .await
        .unwrap();
    let records = read_records(outcome.path.unwrap()).unwrap();

    let table = create_record_table(&records);
    assert!(table.contains("Hotel Sol Almería"));
    assert!(table.contains("1250€"));
    assert!(table.contains("Roquetas de Mar"));
    assert!(table.contains("N/A"));

    assert_eq!(summarize_records(&records), "3 records (1 partial)");
}
