//! NDJSON (Newline Delimited JSON) file adapters

use super::{check_parent_dir, hold, path_lock};
use crate::config::{FieldMapping, ParameterSet};
use crate::error::{Result, TransferError};
use crate::etl::{Adapter, AdapterState, InputAdapter, Lifecycle, OutputAdapter};
use crate::record::Record;

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const NDJSON_INPUT_PLUGIN: &str = "NDJSON_INPUT_PLUGIN";
pub const NDJSON_OUTPUT_PLUGIN: &str = "NDJSON_OUTPUT_PLUGIN";

const INPUT_HELP: &str = "NDJSON input plugin parameters:\n\
    --ip \"filepath=<path to an existing .ndjson file>[|mapping=key:item_field~key2:item_field2]\"\n\
    Each non-blank line must hold one JSON object.";

const OUTPUT_HELP: &str = "NDJSON output plugin parameters:\n\
    --op \"filepath=<path to the .ndjson file>[|append=<true|false>]\
    [|mapping=key:item_field~key2:item_field2]\"\n\
    The file is truncated unless append=true.";

/// Reads one record per NDJSON line
pub struct NdjsonInput {
    lifecycle: Lifecycle,
    lines: Option<Lines<BufReader<File>>>,
    mapping: Option<FieldMapping>,
    line: u64,
}

impl NdjsonInput {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(NDJSON_INPUT_PLUGIN),
            lines: None,
            mapping: None,
            line: 0,
        }
    }

    pub fn help_text() -> &'static str {
        INPUT_HELP
    }

    /// Parse one line into a raw record keyed by the object's keys
    fn parse_line(&self, line: &str) -> Result<Record> {
        match serde_json::from_str(line) {
            Ok(serde_json::Value::Object(object)) => Ok(Record::from_json_object(object)),
            Ok(other) => Err(TransferError::item(format!(
                "line {}: expected a JSON object, found {}",
                self.line,
                json_kind(&other)
            ))),
            Err(e) => Err(TransferError::item(format!("line {}: {}", self.line, e))),
        }
    }
}

impl Default for NdjsonInput {
    fn default() -> Self {
        Self::new()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

impl Adapter for NdjsonInput {
    fn name(&self) -> &'static str {
        NDJSON_INPUT_PLUGIN
    }

    fn help(&self) -> &'static str {
        INPUT_HELP
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn close(&mut self) -> Result<()> {
        if self.lifecycle.close() {
            log::debug!("Disposing ndjson input plugin");
            self.lines = None;
        }
        Ok(())
    }
}

#[async_trait]
impl InputAdapter for NdjsonInput {
    async fn init(&mut self, config: &ParameterSet) -> Result<()> {
        self.lifecycle.begin_init()?;
        let path = Path::new(config.require(self.name(), "filepath")?);
        let mapping = config.mapping()?;

        let file = File::open(path).map_err(|e| {
            TransferError::init(
                NDJSON_INPUT_PLUGIN,
                format!("failed to open '{}': {}", path.display(), e),
            )
        })?;

        self.lines = Some(BufReader::new(file).lines());
        self.mapping = mapping;
        self.lifecycle.mark_ready();
        log::info!("NDJSON input plugin reading {}", path.display());
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Record>> {
        self.lifecycle.enter("read")?;
        loop {
            let Some(next) = self.lines.as_mut().and_then(Iterator::next) else {
                return Ok(None);
            };
            let line = next?;
            self.line += 1;
            if line.trim().is_empty() {
                continue;
            }

            let raw = self.parse_line(&line)?;
            return match &self.mapping {
                Some(mapping) => mapping.project(&raw).map(Some),
                None => Ok(Some(raw)),
            };
        }
    }
}

/// Writes one JSON object per record
pub struct NdjsonOutput {
    lifecycle: Lifecycle,
    file: Option<File>,
    lock: Option<Arc<Mutex<()>>>,
    mapping: Option<FieldMapping>,
    path: PathBuf,
}

impl NdjsonOutput {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(NDJSON_OUTPUT_PLUGIN),
            file: None,
            lock: None,
            mapping: None,
            path: PathBuf::new(),
        }
    }

    pub fn help_text() -> &'static str {
        OUTPUT_HELP
    }
}

impl Default for NdjsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for NdjsonOutput {
    fn name(&self) -> &'static str {
        NDJSON_OUTPUT_PLUGIN
    }

    fn help(&self) -> &'static str {
        OUTPUT_HELP
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn close(&mut self) -> Result<()> {
        if !self.lifecycle.close() {
            return Ok(());
        }
        log::debug!("Disposing ndjson output plugin");
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

#[async_trait]
impl OutputAdapter for NdjsonOutput {
    async fn init(&mut self, config: &ParameterSet) -> Result<()> {
        self.lifecycle.begin_init()?;
        let path = PathBuf::from(config.require(self.name(), "filepath")?);
        let append = config.bool(self.name(), "append")?.unwrap_or(false);
        let mapping = config.mapping()?;
        check_parent_dir(self.name(), &path)?;

        let lock = path_lock(&path);
        let file = {
            let _guard = hold(&lock);
            // Always opened for append so writers sharing the file never
            // overwrite each other's lines
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .and_then(|file| match append {
                    true => Ok(file),
                    false => file.set_len(0).map(|()| file),
                })
                .map_err(|e| {
                    TransferError::init(
                        NDJSON_OUTPUT_PLUGIN,
                        format!("failed to open '{}': {}", path.display(), e),
                    )
                })?
        };

        log::info!(
            "NDJSON output plugin writing {} (append={})",
            path.display(),
            append
        );
        self.path = path;
        self.file = Some(file);
        self.lock = Some(lock);
        self.mapping = mapping;
        self.lifecycle.mark_ready();
        Ok(())
    }

    async fn write(&mut self, record: &Record) -> Result<()> {
        self.lifecycle.enter("write")?;
        let Some(file) = self.file.as_mut() else {
            return Err(TransferError::item("ndjson file is not open"));
        };

        let line = match &self.mapping {
            Some(mapping) => serde_json::to_string(&mapping.select(record)),
            None => serde_json::to_string(record),
        }
        .map_err(TransferError::item)?;

        let _guard = self.lock.as_deref().map(hold);
        writeln!(file, "{}", line)
            .and_then(|()| file.flush())
            .map_err(|e| TransferError::item(format!("{}: {}", self.path.display(), e)))
    }
}
