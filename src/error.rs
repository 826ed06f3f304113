use thiserror::Error;

/// Everything that can go wrong while ingesting reports or mail.
///
/// `Auth`, `Service` and the transport variants end the run. The rest are
/// absorbed by the pipeline that raised them: a rejected record is dropped,
/// an unreadable message is skipped and left in its folder.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("There was a service error: {code} : {message}")]
    Service { code: i64, message: String },

    #[error("report source transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("document store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("mailbox error: {0}")]
    Mailbox(#[from] std::io::Error),

    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("record rejected: {0}")]
    RecordRejected(String),

    #[error("unreadable message {id}: {reason}")]
    MessageContent { id: String, reason: String },
}

impl IngestError {
    /// Whether this error must abort the current run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            IngestError::RecordRejected(_) | IngestError::MessageContent { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
