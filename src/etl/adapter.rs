//! Plugin capability traits
//!
//! Every plugin is an [`Adapter`]: it carries static help text, reports its
//! lifecycle state and can be closed any number of times. On top of that an
//! input plugin reads records, an output plugin writes them and a transfer
//! manager drives one input into one output.
//!
//! # Example
//! ```no_run
//! use async_trait::async_trait;
//! use record_transfer::config::ParameterSet;
//! use record_transfer::error::Result;
//! use record_transfer::etl::{Adapter, AdapterState, InputAdapter, Lifecycle};
//! use record_transfer::record::Record;
//!
//! struct Countdown {
//!     lifecycle: Lifecycle,
//!     left: i64,
//! }
//!
//! impl Adapter for Countdown {
//!     fn name(&self) -> &'static str { "COUNTDOWN_INPUT_PLUGIN" }
//!     fn help(&self) -> &'static str { "start=<n>" }
//!     fn state(&self) -> AdapterState { self.lifecycle.state() }
//!     fn close(&mut self) -> Result<()> { self.lifecycle.close(); Ok(()) }
//! }
//!
//! #[async_trait]
//! impl InputAdapter for Countdown {
//!     async fn init(&mut self, config: &ParameterSet) -> Result<()> {
//!         self.lifecycle.begin_init()?;
//!         self.left = config.require(self.name(), "start")?.parse().unwrap_or(0);
//!         self.lifecycle.mark_ready();
//!         Ok(())
//!     }
//!
//!     async fn read(&mut self) -> Result<Option<Record>> {
//!         self.lifecycle.enter("read")?;
//!         if self.left == 0 {
//!             return Ok(None);
//!         }
//!         self.left -= 1;
//!         Ok(Some([("n", self.left)].into_iter().collect()))
//!     }
//! }
//! ```

use super::AdapterState;
use super::TransferResult;
use crate::config::ParameterSet;
use crate::error::Result;
use crate::record::Record;

use async_trait::async_trait;

/// Capabilities shared by every plugin
pub trait Adapter: Send {
    /// Registered plugin name
    fn name(&self) -> &'static str;

    /// Static usage text listing the configuration keys
    fn help(&self) -> &'static str;

    fn state(&self) -> AdapterState;

    /// Release every resource held by the adapter
    ///
    /// Idempotent: closing a closed adapter is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Source of records
#[async_trait]
pub trait InputAdapter: Adapter {
    /// Validate the configuration and open the source
    ///
    /// # Errors
    /// [`AdapterInit`](crate::TransferError::AdapterInit) for missing or invalid
    /// parameters and unreachable sources,
    /// [`InvalidMapping`](crate::TransferError::InvalidMapping) when the mapping
    /// names columns the source does not have.
    async fn init(&mut self, config: &ParameterSet) -> Result<()>;

    /// Read the next record; `None` once the source is exhausted
    ///
    /// # Errors
    /// [`ItemTransfer`](crate::TransferError::ItemTransfer) when one record
    /// cannot be read (the cursor has already moved past it); any other error
    /// is fatal.
    async fn read(&mut self) -> Result<Option<Record>>;
}

/// Destination of records
#[async_trait]
pub trait OutputAdapter: Adapter {
    /// Validate the configuration and open the destination
    async fn init(&mut self, config: &ParameterSet) -> Result<()>;

    /// Write one record
    ///
    /// # Errors
    /// [`ItemTransfer`](crate::TransferError::ItemTransfer) when this record was
    /// rejected; any other error is fatal.
    async fn write(&mut self, record: &Record) -> Result<()>;
}

/// Drives records from one input into one output
#[async_trait]
pub trait TransferManager: Adapter {
    async fn init(&mut self, config: &ParameterSet) -> Result<()>;

    /// Run the transfer; the manager takes ownership of both adapters and
    /// closes them before returning
    async fn transfer(
        &mut self,
        input: Box<dyn InputAdapter>,
        output: Box<dyn OutputAdapter>,
    ) -> TransferResult;
}
