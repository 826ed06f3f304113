use chrono::NaiveDate;
use tracing::debug;

use super::{ReportPage, ReportQuery, ReportSource};
use crate::error::Result;

/// Every calendar day in `start..=end`, in order.
pub fn days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

/// Fetch every page of `template` for `day`, handing each page to `on_page`
/// before the next one is requested.
///
/// Offsets start at 0 and advance by `page_size` for as long as the previous
/// page carried a non-empty next link. Returns the number of pages fetched.
pub async fn paginate_day<S, F>(
    source: &S,
    template: &ReportQuery,
    page_size: u32,
    day: NaiveDate,
    mut on_page: F,
) -> Result<usize>
where
    S: ReportSource,
    F: FnMut(&ReportPage) -> Result<()>,
{
    let mut offset = 0;
    let mut fetched = 0;
    loop {
        let query = template.for_page(day, page_size, offset);
        debug!(%day, offset, "Fetching report page");
        let page = source.fetch(&query).await?;
        fetched += 1;
        on_page(&page)?;

        if !page.has_next() {
            return Ok(fetched);
        }
        offset = query.offset + page_size;
    }
}
