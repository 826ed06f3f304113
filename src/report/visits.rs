use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ReportCounts, ReportPage, STORED_DATE_FORMAT};
use crate::db::{Document, DocumentStore, VISITED_COMPANIES};
use crate::error::{IngestError, Result};

pub const NATURAL_KEY: &str = "demandbase_sid";
pub const FIRST_VISIT_DATE: &str = "firstVisitDate";

/// The JSON blob the tracking snippet stores in the first report column.
#[derive(Debug, Deserialize)]
struct VisitPayload {
    #[serde(default)]
    demandbase_sid: Option<String>,
    // Visitor IP is never persisted.
    #[serde(default, rename = "ip")]
    _ip: Option<Value>,
    // Only the store decides the first visit date.
    #[serde(default, rename = "firstVisitDate")]
    _first_visit_date: Option<Value>,
    #[serde(flatten)]
    attributes: Document,
}

/// A company visit observation, keyed by `demandbase_sid`.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitRecord {
    pub demandbase_sid: Option<String>,
    pub attributes: Document,
    pub first_visit_date: Option<String>,
}

impl VisitRecord {
    /// Parse the embedded payload. Anything but a JSON object of scalar
    /// fields is rejected.
    pub fn from_payload(raw: &str) -> Result<Self> {
        let payload: VisitPayload = serde_json::from_str(raw)
            .map_err(|e| IngestError::RecordRejected(format!("unreadable visit payload: {}", e)))?;

        if let Some((field, _)) = payload
            .attributes
            .iter()
            .find(|(_, v)| v.is_object() || v.is_array())
        {
            return Err(IngestError::RecordRejected(format!(
                "visit payload field {:?} is not a scalar",
                field
            )));
        }

        Ok(VisitRecord {
            demandbase_sid: payload.demandbase_sid,
            attributes: payload.attributes,
            first_visit_date: None,
        })
    }

    /// The natural key, if present and non-empty.
    pub fn key(&self) -> Option<&str> {
        self.demandbase_sid.as_deref().filter(|k| !k.is_empty())
    }

    pub fn to_document(&self) -> Document {
        let mut doc = self.attributes.clone();
        if let Some(sid) = &self.demandbase_sid {
            doc.insert(NATURAL_KEY.into(), Value::String(sid.clone()));
        }
        if let Some(date) = &self.first_visit_date {
            doc.insert(FIRST_VISIT_DATE.into(), Value::String(date.clone()));
        }
        doc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    Rejected,
}

/// Store `record` as the single document for its key.
///
/// Every field comes from `record` except `firstVisitDate`, which is carried
/// over from the document being replaced, or set to `day` on first sight.
pub fn upsert_visit<D: DocumentStore>(
    store: &D,
    mut record: VisitRecord,
    day: NaiveDate,
) -> Result<UpsertOutcome> {
    let Some(key) = record.key().map(str::to_string) else {
        debug!("Skipping visit without {}", NATURAL_KEY);
        return Ok(UpsertOutcome::Rejected);
    };

    let previous = store.find_and_remove(VISITED_COMPANIES, NATURAL_KEY, &key)?;
    let outcome = match previous {
        Some(prev) => {
            record.first_visit_date = prev
                .get(FIRST_VISIT_DATE)
                .and_then(Value::as_str)
                .map(str::to_string);
            UpsertOutcome::Replaced
        }
        None => {
            record.first_visit_date = Some(day.format(STORED_DATE_FORMAT).to_string());
            UpsertOutcome::Inserted
        }
    };

    store.insert(VISITED_COMPANIES, &record.to_document())?;
    Ok(outcome)
}

/// Upsert every row of a visited-companies page.
pub fn ingest_page<D: DocumentStore>(
    store: &D,
    page: &ReportPage,
    day: NaiveDate,
    counts: &mut ReportCounts,
) -> Result<()> {
    if page.total_results == 0 {
        info!(%day, "No visited companies data");
        return Ok(());
    }

    for row in &page.rows {
        let Some(raw) = row.first() else {
            counts.companies_rejected += 1;
            continue;
        };
        let record = match VisitRecord::from_payload(raw) {
            Ok(r) => r,
            Err(e) => {
                warn!("{}", e);
                counts.companies_rejected += 1;
                continue;
            }
        };
        match upsert_visit(store, record, day)? {
            UpsertOutcome::Inserted => counts.companies_inserted += 1,
            UpsertOutcome::Replaced => counts.companies_replaced += 1,
            UpsertOutcome::Rejected => counts.companies_rejected += 1,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;
    use crate::db::SqliteStore;
    use crate::report::testing::page;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    /// Counts writes, stores nothing.
    #[derive(Default)]
    struct CountingStore {
        writes: Cell<usize>,
    }

    impl DocumentStore for CountingStore {
        fn insert(&self, _: &str, _: &Document) -> Result<()> {
            self.writes.set(self.writes.get() + 1);
            Ok(())
        }

        fn find_and_remove(&self, _: &str, _: &str, _: &str) -> Result<Option<Document>> {
            self.writes.set(self.writes.get() + 1);
            Ok(None)
        }
    }

    #[test]
    fn payload_drops_ip() {
        let r = VisitRecord::from_payload(
            r#"{"demandbase_sid":"abc123","ip":"192.0.2.4","company_name":"Acme","employee_count":120}"#,
        )
        .unwrap();
        assert_eq!(r.key(), Some("abc123"));
        assert!(r.attributes.get("ip").is_none());
        assert_eq!(r.attributes["company_name"], "Acme");
        assert_eq!(r.attributes["employee_count"], 120);
    }

    #[test]
    fn payload_shape_is_validated() {
        assert!(matches!(
            VisitRecord::from_payload("not json"),
            Err(IngestError::RecordRejected(_))
        ));
        assert!(matches!(
            VisitRecord::from_payload(r#"["abc"]"#),
            Err(IngestError::RecordRejected(_))
        ));
        assert!(matches!(
            VisitRecord::from_payload(r#"{"demandbase_sid":"a","hq":{"city":"Dallas"}}"#),
            Err(IngestError::RecordRejected(_))
        ));
    }

    #[test]
    fn first_visit_date_is_sticky() {
        let store = SqliteStore::open_in_memory();
        let first = VisitRecord::from_payload(r#"{"demandbase_sid":"abc123","foo":"x"}"#).unwrap();
        let later = VisitRecord::from_payload(r#"{"demandbase_sid":"abc123","foo":"y"}"#).unwrap();

        assert_eq!(upsert_visit(&store, first, day(1)).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(upsert_visit(&store, later, day(3)).unwrap(), UpsertOutcome::Replaced);

        let all = store.fetch_all(VISITED_COMPANIES).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(
            serde_json::Value::Object(all[0].clone()),
            json!({"demandbase_sid": "abc123", "foo": "y", "firstVisitDate": "2024/05/01"})
        );
    }

    #[test]
    fn candidate_date_is_overwritten_by_stored_one() {
        let store = SqliteStore::open_in_memory();
        let first = VisitRecord::from_payload(r#"{"demandbase_sid":"k"}"#).unwrap();
        upsert_visit(&store, first, day(2)).unwrap();

        let mut again = VisitRecord::from_payload(r#"{"demandbase_sid":"k"}"#).unwrap();
        again.first_visit_date = Some("2030/01/01".into());
        upsert_visit(&store, again, day(9)).unwrap();

        let all = store.fetch_all(VISITED_COMPANIES).unwrap();
        assert_eq!(all[0][FIRST_VISIT_DATE], "2024/05/02");
    }

    #[test]
    fn payload_first_visit_date_is_ignored() {
        let r = VisitRecord::from_payload(r#"{"demandbase_sid":"k","firstVisitDate":"2099/01/01"}"#).unwrap();
        assert!(r.attributes.get(FIRST_VISIT_DATE).is_none());

        // A stored document without a date must not let the payload's through.
        let store = SqliteStore::open_in_memory();
        let mut bare = Document::new();
        bare.insert(NATURAL_KEY.into(), json!("k"));
        store.insert(VISITED_COMPANIES, &bare).unwrap();
        upsert_visit(&store, r, day(4)).unwrap();

        let all = store.fetch_all(VISITED_COMPANIES).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].get(FIRST_VISIT_DATE).is_none());
    }

    #[test]
    fn missing_or_empty_key_writes_nothing() {
        let store = CountingStore::default();
        let missing = VisitRecord::from_payload(r#"{"company_name":"Acme"}"#).unwrap();
        let empty = VisitRecord::from_payload(r#"{"demandbase_sid":"","company_name":"Acme"}"#).unwrap();

        assert_eq!(upsert_visit(&store, missing, day(1)).unwrap(), UpsertOutcome::Rejected);
        assert_eq!(upsert_visit(&store, empty, day(1)).unwrap(), UpsertOutcome::Rejected);
        assert_eq!(store.writes.get(), 0);
    }

    #[test]
    fn page_rows_are_upserted_and_bad_rows_counted() {
        let store = SqliteStore::open_in_memory();
        let p = page(
            &["ga:dimension20", "ga:visits"],
            vec![
                vec![r#"{"demandbase_sid":"a"}"#, "1"],
                vec![r#"{"demandbase_sid":"b"}"#, "2"],
                vec![r#"{"company_name":"no key"}"#, "1"],
                vec!["{broken", "1"],
                vec![r#"{"demandbase_sid":"a"}"#, "4"],
            ],
            false,
        );
        let mut counts = ReportCounts::default();
        ingest_page(&store, &p, day(1), &mut counts).unwrap();

        assert_eq!(counts.companies_inserted, 2);
        assert_eq!(counts.companies_replaced, 1);
        assert_eq!(counts.companies_rejected, 2);
        assert_eq!(store.count(VISITED_COMPANIES).unwrap(), 2);
    }

    #[test]
    fn rerun_of_a_day_creates_no_duplicates() {
        let store = SqliteStore::open_in_memory();
        let p = page(&["ga:dimension20"], vec![vec![r#"{"demandbase_sid":"a"}"#]], false);
        let mut counts = ReportCounts::default();
        ingest_page(&store, &p, day(1), &mut counts).unwrap();
        ingest_page(&store, &p, day(1), &mut counts).unwrap();
        assert_eq!(store.count(VISITED_COMPANIES).unwrap(), 1);
    }
}
