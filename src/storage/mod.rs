//! Built-in endpoint adapters
//!
//! This module holds the adapters for local endpoints:
//! - Delimited (CSV) files
//! - NDJSON (newline delimited JSON) files
//! - SQLite tables
//! - Maildir mailboxes

mod csv;
mod maildir;
mod ndjson;
mod sqlite;

pub use self::csv::{CSV_INPUT_PLUGIN, CSV_OUTPUT_PLUGIN, CsvInput, CsvOutput};
pub use maildir::{MAILDIR_INPUT_PLUGIN, MAILDIR_OUTPUT_PLUGIN, MaildirInput, MaildirOutput};
pub use ndjson::{NDJSON_INPUT_PLUGIN, NDJSON_OUTPUT_PLUGIN, NdjsonInput, NdjsonOutput};
pub use sqlite::{SQLITE_INPUT_PLUGIN, SQLITE_OUTPUT_PLUGIN, SqliteInput, SqliteOutput};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Process-wide lock for one physical file
///
/// Output adapters hold it while writing so that several instances writing
/// the same file never interleave partial rows.
pub(crate) fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    locks.entry(key).or_default().clone()
}

/// Acquire a path lock, ignoring poisoning (the guarded data is `()`)
pub(crate) fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The directory a file will be created in must already exist
pub(crate) fn check_parent_dir(adapter: &str, path: &Path) -> crate::error::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(crate::error::TransferError::init(
                adapter,
                format!("directory '{}' does not exist", parent.display()),
            ))
        }
        _ => Ok(()),
    }
}
