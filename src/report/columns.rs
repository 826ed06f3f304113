use std::collections::HashMap;

use super::ColumnHeader;

/// Positions of requested report columns within a page's rows.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
    missing: Vec<String>,
}

impl ColumnIndex {
    /// Match each requested name against the headers by exact name. On
    /// duplicate headers the first occurrence wins.
    pub fn resolve(requested: &[&str], headers: &[ColumnHeader]) -> Self {
        let mut index = ColumnIndex::default();
        for name in requested {
            match headers.iter().position(|h| h.name == *name) {
                Some(pos) => {
                    index.positions.insert(name.to_string(), pos);
                }
                None => index.missing.push(name.to_string()),
            }
        }
        index
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// The cell for `name` in `row`, if the column resolved and the row is
    /// long enough to hold it.
    pub fn cell<'r>(&self, row: &'r [String], name: &str) -> Option<&'r str> {
        self.position(name)
            .and_then(|i| row.get(i))
            .map(String::as_str)
    }

    /// Requested names absent from the headers.
    pub fn missing(&self) -> &[String] {
        &self.missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<ColumnHeader> {
        names
            .iter()
            .map(|n| ColumnHeader {
                name: n.to_string(),
                column_type: "METRIC".into(),
                data_type: "INTEGER".into(),
            })
            .collect()
    }

    #[test]
    fn order_independent() {
        let idx = ColumnIndex::resolve(
            &["ga:users", "ga:visits"],
            &headers(&["ga:visits", "ga:users"]),
        );
        assert_eq!(idx.position("ga:users"), Some(1));
        assert_eq!(idx.position("ga:visits"), Some(0));
        assert!(idx.missing().is_empty());
    }

    #[test]
    fn first_duplicate_wins() {
        let idx = ColumnIndex::resolve(
            &["ga:source"],
            &headers(&["ga:medium", "ga:source", "ga:source"]),
        );
        assert_eq!(idx.position("ga:source"), Some(1));
    }

    #[test]
    fn missing_name_is_reported_not_fatal() {
        let idx = ColumnIndex::resolve(
            &["ga:visits", "ga:dimension2"],
            &headers(&["ga:visits"]),
        );
        assert_eq!(idx.position("ga:visits"), Some(0));
        assert_eq!(idx.position("ga:dimension2"), None);
        assert_eq!(idx.missing(), ["ga:dimension2".to_string()]);
    }

    #[test]
    fn cell_tolerates_short_rows() {
        let idx = ColumnIndex::resolve(&["a", "b"], &headers(&["a", "b"]));
        let row = vec!["1".to_string()];
        assert_eq!(idx.cell(&row, "a"), Some("1"));
        assert_eq!(idx.cell(&row, "b"), None);
    }
}
