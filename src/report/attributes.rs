use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use super::columns::ColumnIndex;
use super::{ReportCounts, ReportPage, STORED_DATE_FORMAT, VISIT_ATTRIBUTES_DIMENSIONS, VISIT_ATTRIBUTES_METRICS};
use crate::db::{Document, DocumentStore, VISIT_ATTRIBUTES};
use crate::error::Result;

/// Stored field name ← report column.
const FIELD_COLUMNS: &[(&str, &str)] = &[
    ("demandbase_sid", "ga:dimension11"),
    ("clientId", "ga:dimension2"),
    ("pagePath", "ga:pagePath"),
    ("source", "ga:source"),
    ("medium", "ga:medium"),
    ("visits", "ga:visits"),
    ("users", "ga:users"),
];

/// One page-visit observation. Fields whose column did not resolve are
/// left out.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitAttributeRecord {
    pub fields: Vec<(&'static str, String)>,
    pub date: String,
}

impl VisitAttributeRecord {
    pub fn from_row(columns: &ColumnIndex, row: &[String], day: NaiveDate) -> Self {
        let fields = FIELD_COLUMNS
            .iter()
            .filter_map(|(field, column)| columns.cell(row, column).map(|v| (*field, v.to_string())))
            .collect();
        VisitAttributeRecord {
            fields,
            date: day.format(STORED_DATE_FORMAT).to_string(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn to_document(&self) -> Document {
        let mut doc: Document = self
            .fields
            .iter()
            .map(|(f, v)| (f.to_string(), Value::String(v.clone())))
            .collect();
        doc.insert("date".into(), Value::String(self.date.clone()));
        doc
    }
}

/// Map a visit-attributes page into records, or nothing when the page is
/// sampled.
pub fn map_page(page: &ReportPage, day: NaiveDate) -> Vec<VisitAttributeRecord> {
    if page.contains_sampled_data {
        return Vec::new();
    }

    let requested: Vec<&str> = VISIT_ATTRIBUTES_METRICS
        .iter()
        .chain(VISIT_ATTRIBUTES_DIMENSIONS)
        .copied()
        .collect();
    let columns = ColumnIndex::resolve(&requested, &page.column_headers);
    if !columns.missing().is_empty() {
        warn!(missing = ?columns.missing(), "Requested report columns absent from response");
    }

    page.rows
        .iter()
        .map(|row| VisitAttributeRecord::from_row(&columns, row, day))
        .collect()
}

/// Insert every row of a visit-attributes page. No deduplication.
pub fn ingest_page<D: DocumentStore>(
    store: &D,
    page: &ReportPage,
    day: NaiveDate,
    counts: &mut ReportCounts,
) -> Result<()> {
    if page.total_results == 0 {
        info!(%day, "No visit attributes data");
        return Ok(());
    }
    if page.contains_sampled_data {
        info!(%day, rows = page.rows.len(), "Excluding visit attributes page with sampled data");
        counts.sampled_pages_skipped += 1;
        return Ok(());
    }

    for record in map_page(page, day) {
        store.insert(VISIT_ATTRIBUTES, &record.to_document())?;
        counts.attributes_inserted += 1;
    }
    Ok(())
}
