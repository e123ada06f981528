//! `column:field~column:field` mapping strings

use crate::error::{Result, TransferError};
use std::fmt;
use std::str::FromStr;

/// Separator between mapping entries
pub const ENTRY_SEPARATOR: char = '~';
/// Separator between the external column and the canonical field
pub const COLUMN_FIELD_SEPARATOR: char = ':';

/// One `column:field` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// Column (or key) name on the external endpoint
    pub column: String,
    /// Canonical record field name
    pub field: String,
}

/// Ordered correspondence between external columns and record fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    entries: Vec<MappingEntry>,
}

/// Parse a mapping string
///
/// Entries are separated by `~` and split on the first `:`; both sides are
/// trimmed. Empty input, an entry without `:`, an empty column or field, or a
/// repeated column is a [`TransferError::ConfigParse`].
///
/// # Example
/// ```
/// use record_transfer::config::parse_mapping;
///
/// let mapping = parse_mapping("col1:f1~col2:f2").unwrap();
/// let pairs: Vec<_> = mapping.iter().map(|e| (e.column.as_str(), e.field.as_str())).collect();
/// assert_eq!(pairs, vec![("col1", "f1"), ("col2", "f2")]);
/// assert!(parse_mapping("bad").is_err());
/// ```
pub fn parse_mapping(raw: &str) -> Result<FieldMapping> {
    if raw.trim().is_empty() {
        return Err(TransferError::config(raw, "empty mapping"));
    }

    let mut entries: Vec<MappingEntry> = Vec::new();
    for entry in raw.split(ENTRY_SEPARATOR) {
        let (column, field) = entry
            .split_once(COLUMN_FIELD_SEPARATOR)
            .ok_or_else(|| TransferError::config(entry, "missing ':'"))?;
        let column = column.trim();
        let field = field.trim();
        if column.is_empty() {
            return Err(TransferError::config(entry, "empty column"));
        }
        if field.is_empty() {
            return Err(TransferError::config(entry, "empty field"));
        }
        if entries.iter().any(|e| e.column == column) {
            return Err(TransferError::config(entry, "duplicate column"));
        }
        entries.push(MappingEntry {
            column: column.to_string(),
            field: field.to_string(),
        });
    }

    Ok(FieldMapping { entries })
}

impl FromStr for FieldMapping {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        parse_mapping(s)
    }
}

impl FieldMapping {
    /// Identity mapping over the given names (column == field)
    pub fn identity<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            entries: names
                .into_iter()
                .map(|n| MappingEntry {
                    column: n.as_ref().to_string(),
                    field: n.as_ref().to_string(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.column.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.field.as_str())
    }
}

impl fmt::Display for FieldMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", ENTRY_SEPARATOR)?;
            }
            write!(f, "{}{}{}", e.column, COLUMN_FIELD_SEPARATOR, e.field)?;
        }
        Ok(())
    }
}
