use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9-]+):\s*(.*)$").unwrap());

const MESSAGE_EXT: &str = "eml";

/// One message as read from a folder.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    pub sent_at: Option<DateTime<FixedOffset>>,
    path: PathBuf,
    body: Vec<u8>,
}

impl MailMessage {
    /// Split an RFC 822 message into the headers we use and the raw body.
    pub fn parse(id: &str, path: PathBuf, raw: &[u8]) -> Self {
        let (head, body) = split_head(raw);
        let mut subject = String::new();
        let mut date = None;

        for header in unfold(&String::from_utf8_lossy(head)) {
            let Some(caps) = HEADER_RE.captures(&header) else {
                continue;
            };
            let value = caps[2].trim().to_string();
            match caps[1].to_ascii_lowercase().as_str() {
                "subject" => subject = value,
                "date" => date = Some(value),
                _ => {}
            }
        }

        MailMessage {
            id: id.to_string(),
            subject,
            sent_at: date.and_then(|d| DateTime::parse_from_rfc2822(&d).ok()),
            path,
            body: body.to_vec(),
        }
    }

    /// The body as text. A body that is not UTF-8 cannot be read.
    pub fn body(&self) -> Result<&str> {
        std::str::from_utf8(&self.body).map_err(|e| IngestError::MessageContent {
            id: self.id.clone(),
            reason: format!("body is not UTF-8: {}", e),
        })
    }

    pub fn sent_at(&self) -> Result<DateTime<FixedOffset>> {
        self.sent_at.ok_or_else(|| IngestError::MessageContent {
            id: self.id.clone(),
            reason: "missing or invalid Date header".into(),
        })
    }
}

fn split_head(raw: &[u8]) -> (&[u8], &[u8]) {
    for (sep, len) in [(&b"\r\n\r\n"[..], 4), (&b"\n\n"[..], 2)] {
        if let Some(pos) = raw.windows(len).position(|w| w == sep) {
            return (&raw[..pos], &raw[pos + len..]);
        }
    }
    (raw, &[])
}

/// Join folded header continuation lines onto their header.
fn unfold(head: &str) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for line in head.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some(last) = headers.last_mut() {
                last.push(' ');
                last.push_str(line.trim());
                continue;
            }
        }
        headers.push(line.to_string());
    }
    headers
}

/// Create `name` in `dir`, or `stem-N.ext` when that name is taken, so an
/// existing file is never overwritten.
fn create_unique(dir: &Path, name: &str) -> io::Result<fs::File> {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    for n in 0u32.. {
        let candidate = match (n, ext) {
            (0, _) => name.to_string(),
            (n, Some(ext)) => format!("{}-{}.{}", stem, n, ext),
            (n, None) => format!("{}-{}", stem, n),
        };
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&candidate))
        {
            Ok(file) => return Ok(file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {:?} in {:?}", name, dir),
    ))
}

/// What the mail pipeline needs from a mailbox.
pub trait MailSource {
    fn message_count(&mut self, folder: &str) -> Result<usize>;
    fn message(&mut self, folder: &str, index: usize) -> Result<MailMessage>;
    /// Copy `msg` from one folder into another.
    fn archive(&mut self, msg: &MailMessage, from: &str, to: &str) -> Result<()>;
    /// Flag `msg` for removal when the mailbox is closed.
    fn mark_deleted(&mut self, msg: &MailMessage) -> Result<()>;
}

/// A mailbox kept on disk: each folder is a directory of `.eml` files.
///
/// Messages flagged deleted are removed when the mailbox is closed or
/// dropped, whichever comes first.
pub struct SpoolMailbox {
    root: PathBuf,
    listings: HashMap<String, Vec<PathBuf>>,
    deleted: Vec<PathBuf>,
}

impl SpoolMailbox {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(IngestError::Mailbox(io::Error::new(
                io::ErrorKind::NotFound,
                format!("mail spool {:?} does not exist", root),
            )));
        }
        Ok(SpoolMailbox {
            root: root.to_path_buf(),
            listings: HashMap::new(),
            deleted: Vec::new(),
        })
    }

    fn folder_dir(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    /// Folder contents, listed once and kept stable until close.
    fn listing(&mut self, folder: &str) -> Result<&Vec<PathBuf>> {
        if !self.listings.contains_key(folder) {
            let dir = self.folder_dir(folder);
            let mut files = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_file() && path.extension().is_some_and(|e| e == MESSAGE_EXT) {
                    files.push(path);
                }
            }
            files.sort();
            debug!(folder, count = files.len(), "Listed folder");
            self.listings.insert(folder.to_string(), files);
        }
        Ok(&self.listings[folder])
    }

    /// Remove every message flagged deleted.
    pub fn close(mut self) -> Result<()> {
        self.expunge()?;
        Ok(())
    }

    fn expunge(&mut self) -> io::Result<()> {
        while let Some(path) = self.deleted.pop() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    self.deleted.push(path);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

impl Drop for SpoolMailbox {
    fn drop(&mut self) {
        if let Err(e) = self.expunge() {
            warn!("Failed to expunge deleted messages: {}", e);
        }
    }
}

impl MailSource for SpoolMailbox {
    fn message_count(&mut self, folder: &str) -> Result<usize> {
        Ok(self.listing(folder)?.len())
    }

    fn message(&mut self, folder: &str, index: usize) -> Result<MailMessage> {
        let path = self.listing(folder)?.get(index).cloned().ok_or_else(|| {
            IngestError::Mailbox(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no message {} in {:?}", index, folder),
            ))
        })?;
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let raw = fs::read(&path).map_err(|e| IngestError::MessageContent {
            id: id.clone(),
            reason: format!("cannot read message: {}", e),
        })?;
        Ok(MailMessage::parse(&id, path, &raw))
    }

    fn archive(&mut self, msg: &MailMessage, from: &str, to: &str) -> Result<()> {
        if msg.path.parent() != Some(self.folder_dir(from).as_path()) {
            return Err(IngestError::Mailbox(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("message {} is not in {:?}", msg.id, from),
            )));
        }
        let target = self.folder_dir(to);
        fs::create_dir_all(&target)?;
        let mut src = fs::File::open(&msg.path)?;
        let mut dst = create_unique(&target, &msg.id)?;
        io::copy(&mut src, &mut dst)?;
        Ok(())
    }

    fn mark_deleted(&mut self, msg: &MailMessage) -> Result<()> {
        if !self.deleted.contains(&msg.path) {
            self.deleted.push(msg.path.clone());
        }
        Ok(())
    }
}
