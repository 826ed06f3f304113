use serde::Deserialize;
use tracing::debug;

use super::{ReportPage, ReportQuery, ReportSource};
use crate::error::{IngestError, Result};
use crate::settings::ReportSettings;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Core Reporting API client, authorized with a bearer token.
pub struct ReportClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    code: i64,
    message: String,
}

impl ReportClient {
    pub fn from_settings(settings: &ReportSettings) -> Result<Self> {
        let token = settings
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                IngestError::Auth(
                    "no access token configured; set ANALYTICS__REPORT__ACCESS_TOKEN".into(),
                )
            })?;
        if token.starts_with("Enter") {
            return Err(IngestError::Auth(
                "access token is still the placeholder value".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("analytics_batch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ReportClient {
            http,
            base_url: settings.api_base.trim_end_matches('/').to_string(),
            access_token: token.to_string(),
        })
    }
}

/// Query-string parameters for one page. The API's start index is 1-based
/// and is only sent past the first page.
fn query_params(query: &ReportQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("ids", query.profile_id.clone()),
        ("start-date", query.start_date.format(DATE_FORMAT).to_string()),
        ("end-date", query.end_date.format(DATE_FORMAT).to_string()),
        ("metrics", query.metrics.join(",")),
        ("max-results", query.page_size.to_string()),
    ];
    if !query.dimensions.is_empty() {
        params.push(("dimensions", query.dimensions.join(",")));
    }
    if !query.filter.is_empty() {
        params.push(("filters", query.filter.clone()));
    }
    if query.offset > 0 {
        params.push(("start-index", (query.offset + 1).to_string()));
    }
    params
}

/// Turn a non-success response body into a service error.
fn service_error(status: u16, body: &str) -> IngestError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => IngestError::Service {
            code: env.error.code,
            message: env.error.message,
        },
        Err(_) => IngestError::Service {
            code: i64::from(status),
            message: body.trim().to_string(),
        },
    }
}

impl ReportSource for ReportClient {
    async fn fetch(&self, query: &ReportQuery) -> Result<ReportPage> {
        let url = format!("{}/data/ga", self.base_url);
        debug!(%url, offset = query.offset, "GET report page");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&query_params(query))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(service_error(status.as_u16(), &body));
        }
        Ok(response.json::<ReportPage>().await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn settings(token: Option<&str>) -> ReportSettings {
        ReportSettings {
            api_base: "https://www.googleapis.com/analytics/v3/".into(),
            access_token: token.map(String::from),
            profile_id: "ga:88176229".into(),
            page_size: 5000,
            filter: String::new(),
        }
    }

    #[test]
    fn missing_token_is_auth_error() {
        assert!(matches!(ReportClient::from_settings(&settings(None)), Err(IngestError::Auth(_))));
        assert!(matches!(ReportClient::from_settings(&settings(Some("  "))), Err(IngestError::Auth(_))));
        assert!(matches!(
            ReportClient::from_settings(&settings(Some("Enter your token"))),
            Err(IngestError::Auth(_))
        ));
    }

    #[test]
    fn base_url_is_normalized() {
        let c = ReportClient::from_settings(&settings(Some("ya29.a0"))).unwrap();
        assert_eq!(c.base_url, "https://www.googleapis.com/analytics/v3");
    }

    #[test]
    fn params_for_first_and_later_pages() {
        let day = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        let template = ReportQuery::new(
            "ga:88176229",
            &["ga:visits", "ga:users"],
            &["ga:dimension11"],
            "ga:dimension11!=(Non-Company Visitor)",
        );

        let first = query_params(&template.for_page(day, 5000, 0));
        assert!(first.contains(&("start-date", "2024-07-04".to_string())));
        assert!(first.contains(&("end-date", "2024-07-04".to_string())));
        assert!(first.contains(&("metrics", "ga:visits,ga:users".to_string())));
        assert!(first.contains(&("max-results", "5000".to_string())));
        assert!(first.iter().all(|(k, _)| *k != "start-index"));

        let second = query_params(&template.for_page(day, 5000, 5000));
        assert!(second.contains(&("start-index", "5001".to_string())));
    }

    #[test]
    fn structured_service_error_is_surfaced() {
        let body = r#"{"error":{"errors":[],"code":403,"message":"User does not have sufficient permissions for this profile."}}"#;
        match service_error(403, body) {
            IngestError::Service { code, message } => {
                assert_eq!(code, 403);
                assert_eq!(message, "User does not have sufficient permissions for this profile.");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unstructured_error_keeps_status() {
        match service_error(502, "Bad Gateway\n") {
            IngestError::Service { code, message } => {
                assert_eq!(code, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
