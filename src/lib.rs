//! Record Transfer
//!
//! A pluggable pipeline that moves records from an input plugin to an output
//! plugin under a transfer manager, configured by `key=value|key=value`
//! parameter strings.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod etl;
pub mod record;
pub mod registry;
pub mod storage;

// Re-exports for convenience
pub use config::{FieldMapping, ParameterSet, TransferJob, parse_mapping, parse_parameters};
pub use error::{Result, TransferError};
pub use etl::{
    Adapter, InputAdapter, OutputAdapter, Pipeline, TransferManager, TransferPolicy,
    TransferResult, TransferStatus,
};
pub use record::{Record, Value};
pub use registry::{Capability, Registry};
