//! SQLite table adapters

use crate::config::{FieldMapping, ParameterSet};
use crate::error::{Result, TransferError};
use crate::etl::{Adapter, AdapterState, InputAdapter, Lifecycle, OutputAdapter};
use crate::record::{Record, Value};

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, OpenFlags, ToSql, params, params_from_iter};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::OnceLock;

pub const SQLITE_INPUT_PLUGIN: &str = "SQLITE_INPUT_PLUGIN";
pub const SQLITE_OUTPUT_PLUGIN: &str = "SQLITE_OUTPUT_PLUGIN";

const DEFAULT_BATCH_SIZE: usize = 500;

const INPUT_HELP: &str = "SQLite input plugin parameters:\n\
    --ip \"connectionstring=<path to an existing database file>|table=<table name>|\
    mapping=column_name:item_field~column_name2:item_field2[|batchsize=<rows per query, default 500>]\"";

const OUTPUT_HELP: &str = "SQLite output plugin parameters:\n\
    --op \"connectionstring=<path to the database file>|table=<table name>|\
    mapping=column_name:item_field~column_name2:item_field2[|createtable=<true|false>]\"\n\
    With createtable=true a missing table is created with TEXT columns.";

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Boolean(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    /// Blobs are carried as base64 text
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Float(f),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => {
                Value::Text(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        }
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass
fn table_name<'a>(adapter: &str, config: &'a ParameterSet) -> Result<&'a str> {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    let pattern = IDENTIFIER.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
    });

    let table = config.require(adapter, "table")?;
    if pattern.is_match(table) {
        Ok(table)
    } else {
        Err(TransferError::init(
            adapter,
            format!("'{}' is not a valid table name", table),
        ))
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Column names of `table`, empty when the table does not exist
fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let columns = stmt.query_map([], |row| row.get::<_, String>(1))?;
    columns.collect()
}

/// Reads a table in rowid order, one batch at a time
pub struct SqliteInput {
    lifecycle: Lifecycle,
    conn: Option<Connection>,
    mapping: Option<FieldMapping>,
    columns: Vec<String>,
    query: String,
    batch_size: usize,
    last_rowid: i64,
    buffer: VecDeque<Record>,
    exhausted: bool,
}

impl SqliteInput {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(SQLITE_INPUT_PLUGIN),
            conn: None,
            mapping: None,
            columns: Vec::new(),
            query: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            last_rowid: i64::MIN,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn help_text() -> &'static str {
        INPUT_HELP
    }

    fn fetch_batch(&mut self) -> Result<()> {
        let Some(conn) = self.conn.as_ref() else {
            self.exhausted = true;
            return Ok(());
        };

        let mut stmt = conn.prepare_cached(&self.query)?;
        let mut rows = stmt.query(params![self.last_rowid, self.batch_size as i64])?;
        let mut fetched = 0;
        while let Some(row) = rows.next()? {
            self.last_rowid = row.get(0)?;
            let mut raw = Record::with_capacity(self.columns.len());
            for (i, column) in self.columns.iter().enumerate() {
                raw.insert(column.as_str(), Value::from(row.get_ref(i + 1)?));
            }
            self.buffer.push_back(raw);
            fetched += 1;
        }

        log::debug!("Fetched {} row(s) after rowid {}", fetched, self.last_rowid);
        if fetched < self.batch_size {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Default for SqliteInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for SqliteInput {
    fn name(&self) -> &'static str {
        SQLITE_INPUT_PLUGIN
    }

    fn help(&self) -> &'static str {
        INPUT_HELP
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn close(&mut self) -> Result<()> {
        if !self.lifecycle.close() {
            return Ok(());
        }
        log::debug!("Disposing sqlite input plugin");
        self.buffer.clear();
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| e)?;
        }
        Ok(())
    }
}

#[async_trait]
impl InputAdapter for SqliteInput {
    async fn init(&mut self, config: &ParameterSet) -> Result<()> {
        self.lifecycle.begin_init()?;
        log::debug!("Checking if all required parameters exist");

        let path = config.require(self.name(), "connectionstring")?;
        let table = table_name(self.name(), config)?;
        let mapping = config.require_mapping(self.name())?;
        let batch_size = match config.get("batchsize") {
            None => DEFAULT_BATCH_SIZE,
            Some(raw) => raw.parse().ok().filter(|&n: &usize| n > 0).ok_or_else(|| {
                TransferError::init(
                    SQLITE_INPUT_PLUGIN,
                    format!("batchsize must be a positive number, got '{}'", raw),
                )
            })?,
        };

        if !Path::new(path).is_file() {
            return Err(TransferError::init(
                self.name(),
                format!("database '{}' does not exist", path),
            ));
        }

        let init_err = |e: rusqlite::Error| TransferError::init(SQLITE_INPUT_PLUGIN, e.to_string());
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(init_err)?;

        let available = table_columns(&conn, table).map_err(init_err)?;
        if available.is_empty() {
            return Err(TransferError::init(
                self.name(),
                format!("table '{}' does not exist", table),
            ));
        }
        mapping.check_columns(available.iter().map(String::as_str))?;

        let columns: Vec<String> = mapping.columns().map(str::to_string).collect();
        let query = format!(
            "SELECT rowid, {} FROM {} WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
            columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            quote(table)
        );
        conn.prepare_cached(&query).map_err(init_err)?;

        log::debug!("Plugin parameters: database: {} table: {}", path, table);
        self.conn = Some(conn);
        self.columns = columns;
        self.query = query;
        self.batch_size = batch_size;
        self.mapping = Some(mapping);
        self.lifecycle.mark_ready();
        log::info!("SQLite input plugin initialized");
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Record>> {
        self.lifecycle.enter("read")?;
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_batch()?;
        }

        match (self.buffer.pop_front(), &self.mapping) {
            (Some(raw), Some(mapping)) => mapping.project(&raw).map(Some),
            (Some(raw), None) => Ok(Some(raw)),
            (None, _) => Ok(None),
        }
    }
}

/// Inserts one row per record
pub struct SqliteOutput {
    lifecycle: Lifecycle,
    conn: Option<Connection>,
    mapping: Option<FieldMapping>,
    table: String,
    insert: String,
}

impl SqliteOutput {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(SQLITE_OUTPUT_PLUGIN),
            conn: None,
            mapping: None,
            table: String::new(),
            insert: String::new(),
        }
    }

    pub fn help_text() -> &'static str {
        OUTPUT_HELP
    }
}

impl Default for SqliteOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for SqliteOutput {
    fn name(&self) -> &'static str {
        SQLITE_OUTPUT_PLUGIN
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
        log::debug!("Disposing sqlite output plugin");
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| e)?;
        }
        Ok(())
    }
}

#[async_trait]
impl OutputAdapter for SqliteOutput {
    async fn init(&mut self, config: &ParameterSet) -> Result<()> {
        self.lifecycle.begin_init()?;
        log::debug!("Checking if all required parameters exist");

        let path = config.require(self.name(), "connectionstring")?;
        let table = table_name(self.name(), config)?;
        let mapping = config.require_mapping(self.name())?;
        let create = config.bool(self.name(), "createtable")?.unwrap_or(false);
        super::check_parent_dir(self.name(), Path::new(path))?;

        let init_err =
            |e: rusqlite::Error| TransferError::init(SQLITE_OUTPUT_PLUGIN, e.to_string());
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if create {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(path, flags).map_err(init_err)?;

        let available = table_columns(&conn, table).map_err(init_err)?;
        if available.is_empty() {
            if !create {
                return Err(TransferError::init(
                    self.name(),
                    format!("table '{}' does not exist", table),
                ));
            }
            let definition = mapping
                .columns()
                .map(|c| format!("{} TEXT", quote(c)))
                .collect::<Vec<_>>()
                .join(", ");
            log::info!("Creating table {}", table);
            conn.execute_batch(&format!("CREATE TABLE {} ({})", quote(table), definition))
                .map_err(init_err)?;
        } else {
            mapping.check_columns(available.iter().map(String::as_str))?;
        }

        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table),
            mapping.columns().map(quote).collect::<Vec<_>>().join(", "),
            (1..=mapping.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ")
        );
        conn.prepare_cached(&insert).map_err(init_err)?;

        log::debug!("Plugin parameters: database: {} table: {}", path, table);
        self.conn = Some(conn);
        self.table = table.to_string();
        self.insert = insert;
        self.mapping = Some(mapping);
        self.lifecycle.mark_ready();
        log::info!("SQLite output plugin initialized");
        Ok(())
    }

    async fn write(&mut self, record: &Record) -> Result<()> {
        self.lifecycle.enter("write")?;
        let (Some(conn), Some(mapping)) = (self.conn.as_ref(), self.mapping.as_ref()) else {
            return Err(TransferError::item("database connection is not open"));
        };

        let row = mapping.select(record);
        let mut stmt = conn.prepare_cached(&self.insert)?;
        stmt.execute(params_from_iter(row.values()))
            .map_err(|e| TransferError::item(format!("insert into {}: {}", self.table, e)))?;
        log::debug!("Item inserted into {}", self.table);
        Ok(())
    }
}
