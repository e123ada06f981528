//! Adapter lifecycle state machine
//!
//! `Uninitialized → Ready → Active* → Closed`

use crate::error::{Result, TransferError};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdapterState {
    #[default]
    Uninitialized,
    /// Initialized, nothing read or written yet
    Ready,
    /// At least one read or write happened
    Active,
    Closed,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Lifecycle bookkeeping embedded in every adapter
///
/// # Example
/// ```
/// use record_transfer::etl::{AdapterState, Lifecycle};
///
/// let mut lifecycle = Lifecycle::new("CSV_INPUT_PLUGIN");
/// assert!(lifecycle.enter("read").is_err());
///
/// lifecycle.begin_init().unwrap();
/// lifecycle.mark_ready();
/// lifecycle.enter("read").unwrap();
/// assert_eq!(lifecycle.state(), AdapterState::Active);
///
/// assert!(lifecycle.close());
/// assert!(!lifecycle.close());
/// ```
#[derive(Debug, Clone)]
pub struct Lifecycle {
    adapter: &'static str,
    state: AdapterState,
}

impl Lifecycle {
    pub fn new(adapter: &'static str) -> Self {
        Self {
            adapter,
            state: AdapterState::Uninitialized,
        }
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// Check that `init` is allowed (only once, never after close)
    pub fn begin_init(&self) -> Result<()> {
        self.expect(&[AdapterState::Uninitialized], "init")
    }

    pub fn mark_ready(&mut self) {
        if self.state == AdapterState::Uninitialized {
            self.state = AdapterState::Ready;
        }
    }

    /// Check that a read/write/transfer is allowed and record the activity
    pub fn enter(&mut self, operation: &'static str) -> Result<()> {
        self.expect(&[AdapterState::Ready, AdapterState::Active], operation)?;
        self.state = AdapterState::Active;
        Ok(())
    }

    /// Move to `Closed`; returns `false` when already closed
    pub fn close(&mut self) -> bool {
        if self.state == AdapterState::Closed {
            return false;
        }
        self.state = AdapterState::Closed;
        true
    }

    fn expect(&self, allowed: &[AdapterState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TransferError::AdapterState {
                adapter: self.adapter.to_string(),
                operation,
                state: self.state,
            })
        }
    }
}
