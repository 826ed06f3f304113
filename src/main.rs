mod db;
mod error;
mod mail;
mod report;
mod settings;

use std::time::Instant;

use anyhow::{bail, Context};
use chrono::{Days, Local, NaiveDate};
use clap::{Parser, Subcommand};

use db::SqliteStore;
use mail::mailbox::SpoolMailbox;
use mail::MailContext;
use report::client::ReportClient;
use report::ReportContext;
use settings::Settings;

#[derive(Parser)]
#[command(name = "analytics_batch", about = "Ingest analytics reports and inquiry mail into a document store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch visited-company and visit-attribute reports, one day at a time
    Report {
        /// First day to ingest, YYYY-MM-DD (default: yesterday)
        start: Option<NaiveDate>,
        /// Last day to ingest, YYYY-MM-DD (default: same as start)
        end: Option<NaiveDate>,
    },
    /// Turn inbox form-fill emails into mail records and archive them
    Mail,
    /// Show document counts per collection
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load configuration")?;

    let result = match cli.command {
        Commands::Report { start, end } => {
            let (start, end) = date_range(start, end, Local::now().date_naive())?;
            // Credentials are checked before anything is opened or fetched.
            let client = ReportClient::from_settings(&settings.report)?;
            let store = SqliteStore::open(&settings.database_path)?;
            println!("Retrieving for dates {} to {}", start, end);

            let ctx = ReportContext {
                source: &client,
                store: &store,
                profile_id: settings.report.profile_id.clone(),
                filter: settings.report.filter.clone(),
                page_size: settings.report.page_size,
            };
            let counts = ctx.ingest_range(start, end).await?;
            counts.print();
            Ok(())
        }
        Commands::Mail => {
            let store = SqliteStore::open(&settings.database_path)?;
            let mut mailbox = SpoolMailbox::open(&settings.mail.spool_dir)
                .with_context(|| format!("Failed to open mail spool {:?}", settings.mail.spool_dir))?;

            let counts = MailContext {
                mailbox: &mut mailbox,
                store: &store,
                inbox: settings.mail.inbox_folder.clone(),
                processed: settings.mail.processed_folder.clone(),
            }
            .process_inbox()?;
            mailbox.close()?;
            counts.print();
            Ok(())
        }
        Commands::Stats => {
            let store = SqliteStore::open(&settings.database_path)?;
            for collection in [db::VISITED_COMPANIES, db::VISIT_ATTRIBUTES, db::MAIL] {
                println!("{:<18} {}", format!("{}:", collection), store.count(collection)?);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Resolve the CLI dates. No dates means yesterday; a lone start date means
/// that single day.
fn date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> anyhow::Result<(NaiveDate, NaiveDate)> {
    let yesterday = today
        .checked_sub_days(Days::new(1))
        .context("no previous day")?;
    let start = start.unwrap_or(yesterday);
    let end = end.unwrap_or(start);
    if end < start {
        bail!("end date {} is before start date {}", end, start);
    }
    Ok((start, end))
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
