//! Maildir mailbox adapters
//!
//! A mailbox is a directory with `tmp/`, `new/` and `cur/` subdirectories.
//! Each record travels as one message whose body holds `Key: value` lines.
//! The input marks consumed messages as seen by moving them from `new/` to
//! `cur/`; the output delivers through `tmp/` so readers never observe a
//! partially written message.

use crate::config::{FieldMapping, ParameterSet};
use crate::error::{Result, TransferError};
use crate::etl::{Adapter, AdapterState, InputAdapter, Lifecycle, OutputAdapter};
use crate::record::Record;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const MAILDIR_INPUT_PLUGIN: &str = "MAILDIR_INPUT_PLUGIN";
pub const MAILDIR_OUTPUT_PLUGIN: &str = "MAILDIR_OUTPUT_PLUGIN";

const INPUT_HELP: &str = "Maildir input plugin parameters:\n\
    --ip \"maildir=<path to a maildir with new/ and cur/>[|subject=<text the subject must contain>]\
    [|mapping=Key:item_field~Key2:item_field2]\"\n\
    Every body line of the form 'Key: value' becomes a field. Read messages are marked seen.";

const OUTPUT_HELP: &str = "Maildir output plugin parameters:\n\
    --op \"maildir=<path to the maildir>|email=<sender address>|subject=<subject>\
    [|bodyfilepath=<text file prepended to every body>][|mapping=Key:item_field~Key2:item_field2]\"\n\
    The recipient is the first item field whose name contains 'email'.";

/// Seen flag suffix for messages moved into `cur/`
const SEEN_INFO: &str = ":2,S";

/// Delivery sequence shared by every output instance in the process
static DELIVERIES: AtomicU64 = AtomicU64::new(0);

/// Body values are written on one line: `\`, LF and CR are backslash-escaped
fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Reverse of [`escape_value`]; unknown escapes are kept as written
fn unescape_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some('\\') => unescaped.push('\\'),
            Some(other) => {
                unescaped.push('\\');
                unescaped.push(other);
            }
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

fn has_line_break(value: &str) -> bool {
    value.contains(['\r', '\n'])
}

/// Header and body of a message file
struct Message {
    headers: Vec<(String, String)>,
    body: String,
}

impl Message {
    fn parse(text: &str) -> Self {
        let (head, body) = text
            .split_once("\r\n\r\n")
            .or_else(|| text.split_once("\n\n"))
            .unwrap_or((text, ""));

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in head.lines() {
            if line.starts_with([' ', '\t']) {
                // folded continuation of the previous header
                if let Some((_, value)) = headers.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
            } else if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        Self {
            headers,
            body: body.to_string(),
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `Key: value` body lines as a raw record
    fn fields(&self) -> Record {
        self.body
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim(), unescape_value(value.trim())))
            .filter(|(key, _)| !key.is_empty())
            .collect()
    }
}

/// Reads unseen messages from a maildir
pub struct MaildirInput {
    lifecycle: Lifecycle,
    root: PathBuf,
    subject: Option<String>,
    mapping: Option<FieldMapping>,
    pending: VecDeque<PathBuf>,
}

impl MaildirInput {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(MAILDIR_INPUT_PLUGIN),
            root: PathBuf::new(),
            subject: None,
            mapping: None,
            pending: VecDeque::new(),
        }
    }

    pub fn help_text() -> &'static str {
        INPUT_HELP
    }

    /// Move a message from `new/` to `cur/` with the seen flag
    fn mark_seen(&self, path: &Path) -> std::io::Result<()> {
        let Some(name) = path.file_name() else {
            return Ok(());
        };
        let mut seen = name.to_os_string();
        seen.push(SEEN_INFO);
        std::fs::rename(path, self.root.join("cur").join(seen))
    }
}

impl Default for MaildirInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for MaildirInput {
    fn name(&self) -> &'static str {
        MAILDIR_INPUT_PLUGIN
    }

    fn help(&self) -> &'static str {
        INPUT_HELP
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn close(&mut self) -> Result<()> {
        if self.lifecycle.close() {
            log::debug!("Disposing maildir input plugin");
            self.pending.clear();
        }
        Ok(())
    }
}

#[async_trait]
impl InputAdapter for MaildirInput {
    async fn init(&mut self, config: &ParameterSet) -> Result<()> {
        self.lifecycle.begin_init()?;
        let root = PathBuf::from(config.require(self.name(), "maildir")?);
        let subject = config
            .get("subject")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let mapping = config.mapping()?;

        for sub in ["new", "cur"] {
            if !root.join(sub).is_dir() {
                return Err(TransferError::init(
                    self.name(),
                    format!("'{}' is not a maildir (missing {}/)", root.display(), sub),
                ));
            }
        }

        let mut pending = Vec::new();
        for entry in std::fs::read_dir(root.join("new"))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                pending.push(entry.path());
            }
        }
        // unique names start with the delivery time
        pending.sort();

        log::info!(
            "Maildir input plugin found {} new message(s) in {}",
            pending.len(),
            root.display()
        );
        self.root = root;
        self.subject = subject;
        self.mapping = mapping;
        self.pending = pending.into();
        self.lifecycle.mark_ready();
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Record>> {
        self.lifecycle.enter("read")?;
        while let Some(path) = self.pending.pop_front() {
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::debug!("{} was taken by another reader", path.display());
                    continue;
                }
                Err(e) => {
                    return Err(TransferError::item(format!("{}: {}", path.display(), e)));
                }
            };

            let message = Message::parse(&text);
            if let Some(filter) = &self.subject {
                let subject = message.header("Subject").unwrap_or_default();
                if !subject.contains(filter.as_str()) {
                    log::debug!("Skipping message with subject '{}'", subject);
                    continue;
                }
            }

            let raw = message.fields();
            let record = match &self.mapping {
                Some(mapping) => mapping.project(&raw)?,
                None => raw,
            };

            if let Err(e) = self.mark_seen(&path) {
                log::warn!("Failed to mark {} as seen: {}", path.display(), e);
            }
            return Ok(Some(record));
        }
        Ok(None)
    }
}

/// Delivers one message per record into a maildir
pub struct MaildirOutput {
    lifecycle: Lifecycle,
    root: PathBuf,
    sender: String,
    subject: String,
    preamble: String,
    mapping: Option<FieldMapping>,
    delivered: u64,
}

impl MaildirOutput {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(MAILDIR_OUTPUT_PLUGIN),
            root: PathBuf::new(),
            sender: String::new(),
            subject: String::new(),
            preamble: String::new(),
            mapping: None,
            delivered: 0,
        }
    }

    pub fn help_text() -> &'static str {
        OUTPUT_HELP
    }

    fn compose(&self, recipient: &str, record: &Record) -> Result<String> {
        let fields = match &self.mapping {
            Some(mapping) => mapping.select(record),
            None => record.clone(),
        };

        let mut message = format!(
            "From: {}\nTo: {}\nSubject: {}\nMIME-Version: 1.0\n\
             Content-Type: text/plain; charset=utf-8\n\n",
            self.sender, recipient, self.subject
        );
        if !self.preamble.is_empty() {
            message.push_str(self.preamble.trim_end());
            message.push_str("\n\n");
        }
        for (name, value) in fields.iter() {
            if name.contains(':') || has_line_break(name) {
                return Err(TransferError::item(format!(
                    "field name {:?} cannot be written as a body line",
                    name
                )));
            }
            message.push_str(&format!("{}: {}\n", name, escape_value(&value.to_string())));
        }
        Ok(message)
    }

    /// Unique file name: `<secs>.M<micros>P<pid>Q<sequence>.<host>`
    ///
    /// The sequence is process-wide, so instances sharing a maildir never
    /// produce the same name.
    fn unique_name() -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let sequence = DELIVERIES.fetch_add(1, Ordering::Relaxed) + 1;
        let host = std::env::var("HOSTNAME")
            .unwrap_or_else(|_| "localhost".to_string())
            .replace(['/', ':'], "_");
        format!(
            "{}.M{:06}P{}Q{}.{}",
            now.as_secs(),
            now.subsec_micros(),
            std::process::id(),
            sequence,
            host
        )
    }

    /// Stage in `tmp/`, then link into `new/`; an existing name is an error
    fn deliver(&mut self, message: &str) -> std::io::Result<PathBuf> {
        let name = Self::unique_name();
        let staged = self.root.join("tmp").join(&name);
        let target = self.root.join("new").join(&name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged)?;
        let written = file
            .write_all(message.as_bytes())
            .and_then(|()| file.sync_all())
            .and_then(|()| std::fs::hard_link(&staged, &target));
        let cleanup = std::fs::remove_file(&staged);
        written?;
        cleanup?;

        self.delivered += 1;
        Ok(target)
    }
}

impl Default for MaildirOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// The first non-empty field whose name contains "email"
fn recipient(record: &Record) -> Option<String> {
    record
        .iter()
        .find(|(name, value)| name.to_lowercase().contains("email") && !value.is_null())
        .map(|(_, value)| value.to_string())
        .filter(|address| !address.trim().is_empty())
}

impl Adapter for MaildirOutput {
    fn name(&self) -> &'static str {
        MAILDIR_OUTPUT_PLUGIN
    }

    fn help(&self) -> &'static str {
        OUTPUT_HELP
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn close(&mut self) -> Result<()> {
        if self.lifecycle.close() {
            log::debug!(
                "Disposing maildir output plugin after {} message(s)",
                self.delivered
            );
        }
        Ok(())
    }
}

#[async_trait]
impl OutputAdapter for MaildirOutput {
    async fn init(&mut self, config: &ParameterSet) -> Result<()> {
        self.lifecycle.begin_init()?;
        let root = PathBuf::from(config.require(self.name(), "maildir")?);
        let sender = config.require(self.name(), "email")?.to_string();
        let subject = config.require(self.name(), "subject")?.to_string();
        if has_line_break(&sender) || has_line_break(&subject) {
            return Err(TransferError::init(
                self.name(),
                "'email' and 'subject' must be single lines",
            ));
        }
        let mapping = config.mapping()?;
        let preamble = match config.get("bodyfilepath").filter(|p| !p.is_empty()) {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                TransferError::init(
                    MAILDIR_OUTPUT_PLUGIN,
                    format!("failed to read body file '{}': {}", path, e),
                )
            })?,
            None => String::new(),
        };

        super::check_parent_dir(self.name(), &root)?;
        for sub in ["tmp", "new", "cur"] {
            std::fs::create_dir_all(root.join(sub)).map_err(|e| {
                TransferError::init(
                    MAILDIR_OUTPUT_PLUGIN,
                    format!("failed to create {}/{}: {}", root.display(), sub, e),
                )
            })?;
        }

        log::info!("Maildir output plugin delivering to {}", root.display());
        self.root = root;
        self.sender = sender;
        self.subject = subject;
        self.preamble = preamble;
        self.mapping = mapping;
        self.lifecycle.mark_ready();
        Ok(())
    }

    async fn write(&mut self, record: &Record) -> Result<()> {
        self.lifecycle.enter("write")?;
        let Some(to) = recipient(record) else {
            return Err(TransferError::item("no recipient: item has no email field"));
        };

        if has_line_break(&to) {
            return Err(TransferError::item(format!(
                "recipient {:?} contains a line break",
                to
            )));
        }

        let message = self.compose(&to, record)?;
        let delivered = self
            .deliver(&message)
            .map_err(|e| TransferError::item(format!("delivery to {} failed: {}", to, e)))?;
        log::debug!("Message for {} delivered as {}", to, delivered.display());
        Ok(())
    }
}
