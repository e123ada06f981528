//! Error taxonomy shared by the parser, registry, adapters and orchestrator

use crate::etl::AdapterState;
use crate::registry::Capability;

/// Errors produced while configuring or running a transfer.
///
/// Only [`TransferError::ItemTransfer`] is recoverable: the orchestrator's
/// per-item policy decides whether it aborts the run or skips the item.
/// Everything else is fatal to the whole run.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// A configuration or mapping string could not be parsed.
    #[error("invalid configuration token '{token}': {reason}")]
    ConfigParse { token: String, reason: String },

    /// No factory is registered for the capability/name pair.
    #[error("{capability} '{name}' isn't registered")]
    PluginResolution { capability: Capability, name: String },

    /// The capability/name pair was registered twice.
    #[error("{capability} '{name}' is already registered")]
    DuplicatePlugin { capability: Capability, name: String },

    /// A required parameter is missing or invalid, or the endpoint is unreachable.
    #[error("{adapter} initialization failed: {reason}")]
    AdapterInit { adapter: String, reason: String },

    /// A mapping references a column or field that does not exist.
    #[error("invalid mapping: {0}")]
    InvalidMapping(String),

    /// Reading or writing a single record failed.
    #[error("item transfer failed: {0}")]
    ItemTransfer(String),

    /// An adapter was used in a lifecycle state that does not allow the operation.
    #[error("{adapter} cannot {operation} while {state}")]
    AdapterState {
        adapter: String,
        operation: &'static str,
        state: AdapterState,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TransferError {
    pub fn config(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigParse {
            token: token.into(),
            reason: reason.into(),
        }
    }

    pub fn init(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AdapterInit {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }

    pub fn item(reason: impl std::fmt::Display) -> Self {
        Self::ItemTransfer(reason.to_string())
    }

    /// Whether the per-item policy may skip this error
    pub fn is_item_error(&self) -> bool {
        matches!(self, Self::ItemTransfer(_))
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T, E = TransferError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_item_errors_are_recoverable() {
        assert!(TransferError::item("row 3 rejected").is_item_error());
        assert!(!TransferError::config("bad", "missing '='").is_item_error());
        assert!(!TransferError::InvalidMapping("column 'x'".into()).is_item_error());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(!TransferError::Io(io).is_item_error());
    }

    #[test]
    fn config_error_carries_token() {
        let err = TransferError::config("filepath", "missing '='");
        assert_eq!(
            err.to_string(),
            "invalid configuration token 'filepath': missing '='"
        );
    }

    #[test]
    fn resolution_error_names_capability() {
        let err = TransferError::PluginResolution {
            capability: Capability::Input,
            name: "XML_INPUT_PLUGIN".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "input plugin 'XML_INPUT_PLUGIN' isn't registered"
        );
    }

    #[test]
    fn state_error_displays() {
        let err = TransferError::AdapterState {
            adapter: "CSV_INPUT_PLUGIN".to_string(),
            operation: "read",
            state: AdapterState::Uninitialized,
        };
        assert_eq!(
            err.to_string(),
            "CSV_INPUT_PLUGIN cannot read while uninitialized"
        );
    }
}
