use crate::CanonicalRecord;
use colored::Colorize;
use tabled::settings::{object::Columns, Modify, Style, Width};
use tabled::{Table, Tabled};

#[derive(Tabled)]
pub struct RecordTableRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Score", display_with = "display_right_5")]
    pub score: String,
    #[tabled(rename = "Reviews", display_with = "display_right_7")]
    pub reviews: String,
    #[tabled(rename = "Price", display_with = "display_right_7")]
    pub price: String,
    #[tabled(rename = "Locality")]
    pub locality: String,
    #[tabled(rename = "Partial")]
    pub partial: String,
}

fn display_right_5(s: &str) -> String {
    format!("{:>5}", s)
}

fn display_right_7(s: &str) -> String {
    format!("{:>7}", s)
}

impl RecordTableRow {
    pub fn from_record(record: &CanonicalRecord) -> Self {
        let na = || "N/A".to_string();

        Self {
            name: record.name.clone().unwrap_or_else(na),
            score: record
                .review_score
                .map(|s| format!("{:.1}", s))
                .unwrap_or_else(na),
            reviews: record.review_count.map(|c| c.to_string()).unwrap_or_else(na),
            price: record
                .price_minor
                .map(|p| format!("{}€", p))
                .unwrap_or_else(na),
            locality: record.locality.clone().unwrap_or_else(na),
            partial: if record.partial { "yes" } else { "" }.to_string(),
        }
    }
}

pub fn create_record_table(records: &[CanonicalRecord]) -> String {
    let rows: Vec<RecordTableRow> = records.iter().map(RecordTableRow::from_record).collect();

    let mut table = Table::new(&rows);
    table
        .with(Style::modern())
        .with(Modify::new(Columns::single(0)).with(Width::truncate(40)))
        .with(Modify::new(Columns::single(4)).with(Width::wrap(30)));

    table.to_string()
}

/// One-line run summary, e.g. `12 records (2 partial)`.
pub fn summarize_records(records: &[CanonicalRecord]) -> String {
    let partial = records.iter().filter(|r| r.partial).count();
    let partial_text = format!("{} partial", partial);
    let partial_text = if partial > 0 {
        partial_text.yellow().to_string()
    } else {
        partial_text
    };
    format!("{} records ({})", records.len().to_string().bold(), partial_text)
}
