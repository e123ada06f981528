//! In-memory adapters for unit tests

use super::{Adapter, AdapterState, InputAdapter, Lifecycle, OutputAdapter};
use crate::config::ParameterSet;
use crate::error::{Result, TransferError};
use crate::record::Record;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared observation point for adapter releases and written records
#[derive(Debug, Clone, Default)]
pub(crate) struct Tally {
    closes: Arc<AtomicUsize>,
    written: Arc<Mutex<Vec<String>>>,
}

impl Tally {
    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }
}

pub(crate) fn ids(ids: &[&str]) -> Vec<Record> {
    ids.iter()
        .map(|id| [("id", *id)].into_iter().collect::<Record>())
        .collect()
}

fn id_of(record: &Record) -> String {
    record.get("id").map(|v| v.to_string()).unwrap_or_default()
}

pub(crate) struct VecInput {
    lifecycle: Lifecycle,
    records: VecDeque<Record>,
    position: usize,
    fail_read_at: Option<usize>,
    fail_close: bool,
    tally: Tally,
}

impl VecInput {
    pub(crate) fn uninitialized(records: Vec<Record>, tally: &Tally) -> Self {
        Self {
            lifecycle: Lifecycle::new("VEC_INPUT_PLUGIN"),
            records: records.into(),
            position: 0,
            fail_read_at: None,
            fail_close: false,
            tally: tally.clone(),
        }
    }

    pub(crate) fn ready(records: Vec<Record>, tally: &Tally) -> Self {
        let mut input = Self::uninitialized(records, tally);
        input.lifecycle.mark_ready();
        input
    }

    pub(crate) fn failing_read_at(mut self, index: usize) -> Self {
        self.fail_read_at = Some(index);
        self
    }

    pub(crate) fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

impl Adapter for VecInput {
    fn name(&self) -> &'static str {
        "VEC_INPUT_PLUGIN"
    }

    fn help(&self) -> &'static str {
        "in-memory input"
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn close(&mut self) -> Result<()> {
        if self.lifecycle.close() {
            self.tally.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(TransferError::Io(std::io::Error::other("close failed")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl InputAdapter for VecInput {
    async fn init(&mut self, _config: &ParameterSet) -> Result<()> {
        self.lifecycle.begin_init()?;
        self.lifecycle.mark_ready();
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Record>> {
        self.lifecycle.enter("read")?;
        let index = self.position;
        match self.records.pop_front() {
            None => Ok(None),
            Some(record) => {
                self.position += 1;
                if self.fail_read_at == Some(index) {
                    Err(TransferError::item(format!("unreadable row {}", index)))
                } else {
                    Ok(Some(record))
                }
            }
        }
    }
}

pub(crate) struct RecordingOutput {
    lifecycle: Lifecycle,
    fail_on: Vec<String>,
    fatal_on: Vec<String>,
    tally: Tally,
}

impl RecordingOutput {
    pub(crate) fn uninitialized(tally: &Tally) -> Self {
        Self {
            lifecycle: Lifecycle::new("RECORDING_OUTPUT_PLUGIN"),
            fail_on: Vec::new(),
            fatal_on: Vec::new(),
            tally: tally.clone(),
        }
    }

    pub(crate) fn ready(tally: &Tally) -> Self {
        let mut output = Self::uninitialized(tally);
        output.lifecycle.mark_ready();
        output
    }

    pub(crate) fn failing_on(mut self, id: &str) -> Self {
        self.fail_on.push(id.to_string());
        self
    }

    pub(crate) fn fatal_on(mut self, id: &str) -> Self {
        self.fatal_on.push(id.to_string());
        self
    }
}

impl Adapter for RecordingOutput {
    fn name(&self) -> &'static str {
        "RECORDING_OUTPUT_PLUGIN"
    }

    fn help(&self) -> &'static str {
        "in-memory output"
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    fn close(&mut self) -> Result<()> {
        if self.lifecycle.close() {
            self.tally.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl OutputAdapter for RecordingOutput {
    async fn init(&mut self, _config: &ParameterSet) -> Result<()> {
        self.lifecycle.begin_init()?;
        self.lifecycle.mark_ready();
        Ok(())
    }

    async fn write(&mut self, record: &Record) -> Result<()> {
        self.lifecycle.enter("write")?;
        let id = id_of(record);
        if self.fail_on.contains(&id) {
            return Err(TransferError::item(format!("output rejected {}", id)));
        }
        if self.fatal_on.contains(&id) {
            return Err(TransferError::InvalidMapping(format!(
                "field for {} is gone",
                id
            )));
        }
        self.tally.written.lock().unwrap().push(id);
        Ok(())
    }
}
