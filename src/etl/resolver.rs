//! Field mapping resolution
//!
//! Input side: [`FieldMapping::project`] turns a raw source row (keyed by
//! external column) into a record keyed by canonical field. A mapped column
//! the row does not have is an error.
//!
//! Output side: [`FieldMapping::select`] picks canonical fields out of a
//! record and keys them by external column. A field the record does not have
//! becomes [`Value::Null`].

use crate::config::FieldMapping;
use crate::error::{Result, TransferError};
use crate::record::{Record, Value};

impl FieldMapping {
    /// Project a raw row onto canonical field names
    ///
    /// # Example
    /// ```
    /// use record_transfer::config::parse_mapping;
    /// use record_transfer::record::Record;
    ///
    /// let mapping = parse_mapping("First Name:first_name").unwrap();
    /// let raw: Record = [("First Name", "Ada"), ("Ignored", "x")].into_iter().collect();
    ///
    /// let record = mapping.project(&raw).unwrap();
    /// assert_eq!(record.get("first_name").and_then(|v| v.as_str()), Some("Ada"));
    /// assert!(!record.contains("Ignored"));
    /// ```
    pub fn project(&self, raw: &Record) -> Result<Record> {
        let mut record = Record::with_capacity(self.len());
        for entry in self.iter() {
            let value = raw.get(&entry.column).ok_or_else(|| {
                TransferError::InvalidMapping(format!(
                    "column '{}' does not exist in the source",
                    entry.column
                ))
            })?;
            if record.insert(entry.field.as_str(), value.clone()).is_some() {
                return Err(TransferError::InvalidMapping(format!(
                    "field '{}' is mapped from more than one column",
                    entry.field
                )));
            }
        }
        Ok(record)
    }

    /// Select the mapped fields of a record, keyed by external column
    pub fn select(&self, record: &Record) -> Record {
        self.iter()
            .map(|entry| {
                let value = record.get(&entry.field).cloned().unwrap_or(Value::Null);
                (entry.column.as_str(), value)
            })
            .collect()
    }

    /// Check that every mapped column is one of `available`
    pub fn check_columns<'a>(&self, available: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let available: Vec<&str> = available.into_iter().collect();
        let missing: Vec<&str> = self
            .columns()
            .filter(|c| !available.contains(c))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TransferError::InvalidMapping(format!(
                "column(s) {} do not exist in the source",
                missing
                    .iter()
                    .map(|c| format!("'{}'", c))
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }
}
