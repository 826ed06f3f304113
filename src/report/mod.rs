pub mod attributes;
pub mod client;
pub mod columns;
pub mod paginator;
pub mod visits;

use std::future::Future;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use crate::db::DocumentStore;
use crate::error::Result;

pub const VISITED_COMPANIES_METRICS: &[&str] = &["ga:visits"];
pub const VISITED_COMPANIES_DIMENSIONS: &[&str] = &["ga:dimension20"];

pub const VISIT_ATTRIBUTES_METRICS: &[&str] =
    &["ga:visits", "ga:users", "ga:pageviews", "ga:sessionDuration"];
pub const VISIT_ATTRIBUTES_DIMENSIONS: &[&str] = &[
    "ga:dimension11",
    "ga:dimension2",
    "ga:dimension3",
    "ga:pagePath",
    "ga:source",
    "ga:medium",
];

/// Format of every date written to the store.
pub const STORED_DATE_FORMAT: &str = "%Y/%m/%d";

/// One report request. Pagination produces a fresh copy per page.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    pub profile_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
    pub filter: String,
    pub page_size: u32,
    pub offset: u32,
}

impl ReportQuery {
    pub fn new(profile_id: &str, metrics: &[&str], dimensions: &[&str], filter: &str) -> Self {
        ReportQuery {
            profile_id: profile_id.to_string(),
            start_date: NaiveDate::MIN,
            end_date: NaiveDate::MIN,
            metrics: metrics.iter().map(|s| s.to_string()).collect(),
            dimensions: dimensions.iter().map(|s| s.to_string()).collect(),
            filter: filter.to_string(),
            page_size: 0,
            offset: 0,
        }
    }

    /// This query restricted to a single day, at the given page.
    pub fn for_page(&self, day: NaiveDate, page_size: u32, offset: u32) -> Self {
        ReportQuery {
            start_date: day,
            end_date: day,
            page_size,
            offset,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    pub name: String,
    #[serde(default)]
    pub column_type: String,
    #[serde(default)]
    pub data_type: String,
}

/// One page of report results as returned by the source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPage {
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub column_headers: Vec<ColumnHeader>,
    #[serde(default)]
    pub contains_sampled_data: bool,
    #[serde(default)]
    pub next_link: Option<String>,
    #[serde(default)]
    pub total_results: u64,
}

impl ReportPage {
    pub fn has_next(&self) -> bool {
        self.next_link.as_deref().is_some_and(|l| !l.is_empty())
    }
}

/// Where report pages come from.
pub trait ReportSource {
    fn fetch(&self, query: &ReportQuery) -> impl Future<Output = Result<ReportPage>>;
}

/// What one report run did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReportCounts {
    pub pages: usize,
    pub companies_inserted: usize,
    pub companies_replaced: usize,
    pub companies_rejected: usize,
    pub attributes_inserted: usize,
    pub sampled_pages_skipped: usize,
}

impl ReportCounts {
    pub fn print(&self) {
        println!(
            "Fetched {} pages: {} new companies, {} updated, {} rejected, {} visit attribute rows ({} sampled pages skipped).",
            self.pages,
            self.companies_inserted,
            self.companies_replaced,
            self.companies_rejected,
            self.attributes_inserted,
            self.sampled_pages_skipped,
        );
    }
}

/// Everything a report run needs, built once in `main`.
pub struct ReportContext<'a, R, D> {
    pub source: &'a R,
    pub store: &'a D,
    pub profile_id: String,
    pub filter: String,
    pub page_size: u32,
}

impl<R: ReportSource, D: DocumentStore> ReportContext<'_, R, D> {
    /// Ingest both reports for every day in `start..=end`.
    ///
    /// The first error stops the run; whatever was written before it stays.
    pub async fn ingest_range(&self, start: NaiveDate, end: NaiveDate) -> Result<ReportCounts> {
        let companies_query = ReportQuery::new(
            &self.profile_id,
            VISITED_COMPANIES_METRICS,
            VISITED_COMPANIES_DIMENSIONS,
            &self.filter,
        );
        let attributes_query = ReportQuery::new(
            &self.profile_id,
            VISIT_ATTRIBUTES_METRICS,
            VISIT_ATTRIBUTES_DIMENSIONS,
            &self.filter,
        );

        let mut counts = ReportCounts::default();
        for day in paginator::days(start, end) {
            info!(%day, "Ingesting visited companies");
            let pages = paginator::paginate_day(self.source, &companies_query, self.page_size, day, |page| {
                visits::ingest_page(self.store, page, day, &mut counts)
            })
            .await?;
            counts.pages += pages;

            info!(%day, "Ingesting visit attributes");
            let pages = paginator::paginate_day(self.source, &attributes_query, self.page_size, day, |page| {
                attributes::ingest_page(self.store, page, day, &mut counts)
            })
            .await?;
            counts.pages += pages;
        }
        Ok(counts)
    }
}
