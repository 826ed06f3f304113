pub mod fields;
pub mod lines;
pub mod mailbox;
pub mod subject;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{info, warn};

use crate::db::{Document, DocumentStore, MAIL};
use crate::error::Result;
use fields::ExtractedFields;
use mailbox::{MailMessage, MailSource};
use subject::classify_subject;

const SENT_DATE_FORMAT: &str = "%Y/%m/%d";
const SENT_TIME_FORMAT: &str = "%H:%M:%S";

/// A processed inquiry email.
#[derive(Debug, Clone, PartialEq)]
pub struct MailRecord {
    pub country: &'static str,
    pub product: &'static str,
    pub sent_date: String,
    pub sent_time: String,
    pub extracted: ExtractedFields,
}

impl MailRecord {
    pub fn from_message(msg: &MailMessage) -> Result<Self> {
        let sent = msg.sent_at()?.with_timezone(&Local);
        let class = classify_subject(&msg.subject);
        let extracted = fields::extract_body(msg.body()?);
        Ok(MailRecord {
            country: class.country,
            product: class.product,
            sent_date: sent.format(SENT_DATE_FORMAT).to_string(),
            sent_time: sent.format(SENT_TIME_FORMAT).to_string(),
            extracted,
        })
    }

    /// Flatten into a document. Body fields are written last and win over
    /// same-named header-derived ones.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        let mut put = |k: &str, v: &str| {
            doc.insert(k.to_string(), Value::String(v.to_string()));
        };
        put("sentDate", &self.sent_date);
        put("sentTime", &self.sent_time);
        put("country", self.country);
        put("product", self.product);

        let ex = &self.extracted;
        for (label, value) in &ex.fields {
            put(label, value);
        }
        if let Some(url) = &ex.url {
            put("url", url);
        }
        if let Some(params) = &ex.url_parameters {
            put("urlParameters", params);
        }
        if let Some(q) = &ex.question {
            put(lines::QUESTION_LABEL, q);
        }
        doc
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MailCounts {
    pub processed: usize,
    pub skipped: usize,
}

impl MailCounts {
    pub fn print(&self) {
        println!(
            "Stored {} messages ({} skipped as unreadable).",
            self.processed, self.skipped
        );
    }
}

/// Everything a mail run needs, built once in `main`.
pub struct MailContext<'a, M, D> {
    pub mailbox: &'a mut M,
    pub store: &'a D,
    pub inbox: String,
    pub processed: String,
}

impl<M: MailSource, D: DocumentStore> MailContext<'_, M, D> {
    /// Store one record per inbox message, then archive and flag the message.
    ///
    /// Unreadable messages are skipped and stay in the inbox. A store failure
    /// ends the run before the current message is archived.
    pub fn process_inbox(&mut self) -> Result<MailCounts> {
        let total = self.mailbox.message_count(&self.inbox)?;
        info!(folder = %self.inbox, total, "Processing inbox");

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let mut counts = MailCounts::default();
        for index in 0..total {
            pb.inc(1);
            let read = self
                .mailbox
                .message(&self.inbox, index)
                .and_then(|msg| MailRecord::from_message(&msg).map(|r| (msg, r)));

            let (msg, record) = match read {
                Ok(read) => read,
                Err(e) if !e.is_fatal() => {
                    warn!("Skipping message: {}", e);
                    counts.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.store.insert(MAIL, &record.to_document())?;
            self.mailbox.archive(&msg, &self.inbox, &self.processed)?;
            self.mailbox.mark_deleted(&msg)?;
            counts.processed += 1;
        }

        pb.finish_and_clear();
        Ok(counts)
    }
}
