use std::path::PathBuf;

use anyhow::{bail, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "analytics_batch";
const ENV_PREFIX: &str = "ANALYTICS";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_path: PathBuf,
    pub report: ReportSettings,
    pub mail: MailSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportSettings {
    pub api_base: String,
    /// OAuth bearer token for the reporting API. Required by `report`.
    pub access_token: Option<String>,
    pub profile_id: String,
    pub page_size: u32,
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailSettings {
    pub spool_dir: PathBuf,
    pub inbox_folder: String,
    pub processed_folder: String,
}

impl Settings {
    /// Defaults, then `analytics_batch.toml` if present, then
    /// `ANALYTICS__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self> {
        let settings = Self::builder()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        settings.try_deserialize::<Settings>()?.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.report.page_size == 0 {
            bail!("report.page_size must be greater than 0");
        }
        Ok(self)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("database_path", "data/analytics.sqlite")?
            .set_default("report.api_base", "https://www.googleapis.com/analytics/v3")?
            .set_default("report.profile_id", "ga:88176229")?
            .set_default("report.page_size", 5000)?
            .set_default("report.filter", "ga:dimension11!=(Non-Company Visitor)")?
            .set_default("mail.spool_dir", "data/mail")?
            .set_default("mail.inbox_folder", "INBOX/Form Fills/To Process")?
            .set_default("mail.processed_folder", "INBOX/Form Fills/Processed")?)
    }
}
