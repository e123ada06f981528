//! Transfer outcome reporting

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferStatus {
    Success,
    /// Completed, but the lenient policy skipped items
    PartialFailure,
    Failed,
}

impl TransferStatus {
    /// Numeric status code reported to callers
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 1,
            Self::Failed => 2,
            Self::PartialFailure => 3,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PartialFailure => write!(f, "partial failure"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Final report of one transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    status: TransferStatus,
    message: String,
    items_transferred: usize,
    items_skipped: usize,
}

impl TransferResult {
    pub fn success(items_transferred: usize) -> Self {
        Self {
            status: TransferStatus::Success,
            message: "Success".to_string(),
            items_transferred,
            items_skipped: 0,
        }
    }

    pub fn partial(items_transferred: usize, items_skipped: usize) -> Self {
        Self {
            status: TransferStatus::PartialFailure,
            message: format!("Completed, {} item(s) skipped", items_skipped),
            items_transferred,
            items_skipped,
        }
    }

    pub fn failed(cause: impl fmt::Display, items_transferred: usize) -> Self {
        Self {
            status: TransferStatus::Failed,
            message: format!("Transfer not completed: {}", cause),
            items_transferred,
            items_skipped: 0,
        }
    }

    pub(crate) fn with_skipped(mut self, items_skipped: usize) -> Self {
        self.items_skipped = items_skipped;
        self
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn code(&self) -> i32 {
        self.status.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn items_transferred(&self) -> usize {
        self.items_transferred
    }

    pub fn items_skipped(&self) -> usize {
        self.items_skipped
    }

    pub fn is_success(&self) -> bool {
        self.status == TransferStatus::Success
    }
}

impl fmt::Display for TransferResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} item(s) transferred",
            self.message, self.status.code(), self.items_transferred
        )?;
        if self.items_skipped > 0 {
            write!(f, ", {} skipped", self.items_skipped)?;
        }
        Ok(())
    }
}
