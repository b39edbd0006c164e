//! The three primitives the spec assumes the spreadsheet backend provides
//! (spec §1, §10.5): bulk read, single-range write, append-row. Row
//! deletion is modeled too since every DLQ/History transition needs it,
//! even though the real Sheets API has no direct primitive for it (the
//! `google` backend synthesizes it with a `batchUpdate` delete-dimension
//! request).

use crate::error::PermanentKind;

/// Failure reported by a concrete backend, before the Gateway's retry
/// policy decides what to do with it.
#[derive(Debug, Clone)]
pub enum BackendError {
    /// Rate-limit denial, 5xx, timeout, connection reset — worth retrying.
    Transient(String),
    /// Auth, not-found, malformed range — retrying cannot help.
    Permanent(PermanentKind, String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Transient(msg) => write!(f, "transient: {msg}"),
            BackendError::Permanent(kind, msg) => write!(f, "permanent ({kind}): {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// One backend call == one request. No partial writes.
pub trait SheetBackend: Send {
    fn read_all(&mut self, sheet: &str) -> Result<Vec<Vec<String>>, BackendError>;
    fn append(&mut self, sheet: &str, row: &[String]) -> Result<(), BackendError>;
    fn update_row(&mut self, sheet: &str, index: usize, row: &[String]) -> Result<(), BackendError>;
    fn delete_row(&mut self, sheet: &str, index: usize) -> Result<(), BackendError>;
}

/// In-memory fake used by unit and integration tests in place of a real
/// spreadsheet. Rows are stored in insertion order per sheet, matching
/// the "iterate in sheet order" requirement the claim protocol relies on.
#[cfg(any(test, feature = "test-util"))]
#[derive(Default)]
pub struct MemoryBackend {
    sheets: std::collections::HashMap<String, Vec<Vec<String>>>,
}

#[cfg(any(test, feature = "test-util"))]
impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: inspect a sheet's raw rows.
    pub fn rows(&self, sheet: &str) -> Vec<Vec<String>> {
        self.sheets.get(sheet).cloned().unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl SheetBackend for MemoryBackend {
    fn read_all(&mut self, sheet: &str) -> Result<Vec<Vec<String>>, BackendError> {
        Ok(self.sheets.get(sheet).cloned().unwrap_or_default())
    }

    fn append(&mut self, sheet: &str, row: &[String]) -> Result<(), BackendError> {
        self.sheets
            .entry(sheet.to_string())
            .or_default()
            .push(row.to_vec());
        Ok(())
    }

    fn update_row(&mut self, sheet: &str, index: usize, row: &[String]) -> Result<(), BackendError> {
        let rows = self.sheets.entry(sheet.to_string()).or_default();
        match rows.get_mut(index) {
            Some(slot) => {
                *slot = row.to_vec();
                Ok(())
            }
            None => Err(BackendError::Permanent(
                PermanentKind::MalformedRange,
                format!("row {index} out of range in {sheet}"),
            )),
        }
    }

    fn delete_row(&mut self, sheet: &str, index: usize) -> Result<(), BackendError> {
        let rows = self.sheets.entry(sheet.to_string()).or_default();
        if index >= rows.len() {
            return Err(BackendError::Permanent(
                PermanentKind::MalformedRange,
                format!("row {index} out of range in {sheet}"),
            ));
        }
        rows.remove(index);
        Ok(())
    }
}
