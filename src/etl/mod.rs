//! Core transfer abstractions
//!
//! This module defines the plugin capability traits, the adapter lifecycle,
//! field mapping resolution and the pipeline that moves records from an
//! input adapter to an output adapter.

mod adapter;
mod lifecycle;
mod manager;
mod pipeline;
mod resolver;
mod result;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{Adapter, InputAdapter, OutputAdapter, TransferManager};
pub use lifecycle::{AdapterState, Lifecycle};
pub use manager::{DEFAULT_TRANSFER_MANAGER, DefaultTransferManager};
pub use pipeline::{Pipeline, PipelineState, TransferPolicy};
pub use result::{TransferResult, TransferStatus};
