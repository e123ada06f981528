//! Delimited file adapters

use super::{check_parent_dir, hold, path_lock};
use crate::config::{FieldMapping, ParameterSet};
use crate::error::{Result, TransferError};
use crate::etl::{Adapter, AdapterState, InputAdapter, Lifecycle, OutputAdapter};
use crate::record::Record;

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const CSV_INPUT_PLUGIN: &str = "CSV_INPUT_PLUGIN";
pub const CSV_OUTPUT_PLUGIN: &str = "CSV_OUTPUT_PLUGIN";

const INPUT_HELP: &str = "CSV input plugin parameters:\n\
    --ip \"filepath=<path to an existing csv file>|separator=<one character, e.g. , or ; or tab>|\
    hasheader=<true|false>[|mapping=column_name:item_field~column_name2:item_field2]\"\n\
    Without a header, columns are named by position: 0, 1, 2, ...";

const OUTPUT_HELP: &str = "CSV output plugin parameters:\n\
    --op \"filepath=<path to the csv file, its directory must exist>|separator=<one character>|\
    hasheader=<true|false>|mapping=column_name:item_field~column_name2:item_field2\"\n\
    Rows are appended; the header is written only to an empty file.";

/// Parse a one-character separator (`tab` and `\t` mean a tab)
fn separator(adapter: &str, config: &ParameterSet) -> Result<u8> {
    let raw = config.get("separator").unwrap_or_default();
    match raw {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        s if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        "" => Err(TransferError::init(adapter, "missing 'separator' parameter")),
        s => Err(TransferError::init(
            adapter,
            format!("separator must be a single ASCII character, got '{}'", s),
        )),
    }
}

/// Reads records from a delimited file
pub struct CsvInput {
    lifecycle: Lifecycle,
    rows: Option<::csv::StringRecordsIntoIter<File>>,
    columns: Vec<String>,
    mapping: Option<FieldMapping>,
    row: u64,
}

impl CsvInput {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(CSV_INPUT_PLUGIN),
            rows: None,
            columns: Vec::new(),
            mapping: None,
            row: 0,
        }
    }

    pub fn help_text() -> &'static str {
        INPUT_HELP
    }
}

impl Default for CsvInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for CsvInput {
    fn name(&self) -> &'static str {
        CSV_INPUT_PLUGIN
    }

    fn help(&self) -> &'static str {
        INPUT_HELP
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn close(&mut self) -> Result<()> {
        if self.lifecycle.close() {
            log::debug!("Disposing csv input plugin");
            self.rows = None;
        }
        Ok(())
    }
}

#[async_trait]
impl InputAdapter for CsvInput {
    async fn init(&mut self, config: &ParameterSet) -> Result<()> {
        self.lifecycle.begin_init()?;
        log::debug!("Checking if all required parameters exist");

        let path = config.require(self.name(), "filepath")?;
        let delimiter = separator(self.name(), config)?;
        let has_header = config.require_bool(self.name(), "hasheader")?;
        let mapping = config.mapping()?;

        if !Path::new(path).is_file() {
            return Err(TransferError::init(
                self.name(),
                format!("file '{}' does not exist", path),
            ));
        }

        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(has_header)
            .trim(::csv::Trim::Headers)
            .from_path(path)
            .map_err(|e| TransferError::init(CSV_INPUT_PLUGIN, e.to_string()))?;

        // Without a header this peeks at the first row without consuming it
        let first = reader
            .headers()
            .map_err(|e| TransferError::init(CSV_INPUT_PLUGIN, e.to_string()))?;
        let columns: Vec<String> = if has_header {
            first.iter().map(str::to_string).collect()
        } else {
            (0..first.len()).map(|i| i.to_string()).collect()
        };

        if let Some(mapping) = &mapping {
            mapping.check_columns(columns.iter().map(String::as_str))?;
        }

        log::debug!(
            "Plugin parameters: filepath: {} separator: {:?} hasheader: {}",
            path,
            delimiter as char,
            has_header
        );

        self.columns = columns;
        self.mapping = mapping;
        self.rows = Some(reader.into_records());
        self.lifecycle.mark_ready();
        log::info!("CSV input plugin initialized");
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Record>> {
        self.lifecycle.enter("read")?;
        let Some(rows) = self.rows.as_mut() else {
            return Ok(None);
        };

        let row = match rows.next() {
            None => return Ok(None),
            Some(row) => {
                self.row += 1;
                row
            }
        };

        let row = match row {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => return Err(TransferError::item(format!("row {}: {}", self.row, e))),
        };

        let raw: Record = self
            .columns
            .iter()
            .map(String::as_str)
            .zip(row.iter())
            .collect();

        match &self.mapping {
            Some(mapping) => mapping.project(&raw).map(Some),
            None => Ok(Some(raw)),
        }
    }
}

/// Appends records to a delimited file
pub struct CsvOutput {
    lifecycle: Lifecycle,
    writer: Option<::csv::Writer<File>>,
    lock: Option<Arc<Mutex<()>>>,
    mapping: Option<FieldMapping>,
    path: PathBuf,
}

impl CsvOutput {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(CSV_OUTPUT_PLUGIN),
            writer: None,
            lock: None,
            mapping: None,
            path: PathBuf::new(),
        }
    }

    pub fn help_text() -> &'static str {
        OUTPUT_HELP
    }
}

impl Default for CsvOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for CsvOutput {
    fn name(&self) -> &'static str {
        CSV_OUTPUT_PLUGIN
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
        log::debug!("Disposing csv output plugin");
        if let Some(mut writer) = self.writer.take() {
            let _guard = self.lock.as_deref().map(hold);
            writer.flush()?;
        }
        Ok(())
    }
}

#[async_trait]
impl OutputAdapter for CsvOutput {
    async fn init(&mut self, config: &ParameterSet) -> Result<()> {
        self.lifecycle.begin_init()?;
        log::debug!("Checking if all required parameters exist");

        let path = PathBuf::from(config.require(self.name(), "filepath")?);
        let delimiter = separator(self.name(), config)?;
        let has_header = config.require_bool(self.name(), "hasheader")?;
        let mapping = config.require_mapping(self.name())?;
        check_parent_dir(self.name(), &path)?;

        let lock = path_lock(&path);
        let writer = {
            let _guard = hold(&lock);
            log::debug!("Creating csv writer for {}", path.display());
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| TransferError::init(CSV_OUTPUT_PLUGIN, e.to_string()))?;
            let empty = file.metadata()?.len() == 0;

            let mut writer = ::csv::WriterBuilder::new()
                .delimiter(delimiter)
                .from_writer(file);
            if has_header && empty {
                log::info!("Writing item's header");
                writer.write_record(mapping.columns())?;
                writer.flush()?;
            }
            writer
        };

        log::debug!(
            "Plugin parameters: filepath: {} separator: {:?} hasheader: {}",
            path.display(),
            delimiter as char,
            has_header
        );

        self.path = path;
        self.writer = Some(writer);
        self.lock = Some(lock);
        self.mapping = Some(mapping);
        self.lifecycle.mark_ready();
        log::info!("CSV output plugin initialized");
        Ok(())
    }

    async fn write(&mut self, record: &Record) -> Result<()> {
        self.lifecycle.enter("write")?;
        let (Some(writer), Some(mapping)) = (self.writer.as_mut(), self.mapping.as_ref()) else {
            return Err(TransferError::item("csv writer is not open"));
        };

        let fields: Vec<String> = mapping
            .select(record)
            .values()
            .map(ToString::to_string)
            .collect();

        let _guard = self.lock.as_deref().map(hold);
        writer
            .write_record(&fields)
            .and_then(|()| writer.flush().map_err(Into::into))
            .map_err(|e| {
                TransferError::item(format!("{}: {}", self.path.display(), e))
            })?;
        log::debug!("Item written to csv file");
        Ok(())
    }
}
