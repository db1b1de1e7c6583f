//! Total order over records.
//!
//! The comparator is a plain descriptor (tag + parameters) rather than a
//! shared object. Every stage that needs ordering (partition lookup, the
//! shuffle sort, the file writer, the merge scanner) rebuilds the same
//! descriptor, and files record it in their file-info block so readers can
//! refuse to mix orders.
//!
//! Row keys always compare as unsigned bytes, matching the store's native
//! region order. The descriptor only decides how cells of the same row
//! break ties.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Record;

/// Direction for the timestamp tie-break of [`KeyComparator::Cell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampOrder {
    Ascending,
    /// Newest version first, the store's native cell order.
    #[default]
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyComparator {
    /// Row bytes only. Cells of one row are equal to each other.
    #[default]
    Lexicographic,
    /// Row, family, qualifier, then timestamp.
    Cell {
        #[serde(default)]
        timestamp: TimestampOrder,
    },
}

impl KeyComparator {
    /// The store's native cell comparator.
    pub fn cell() -> Self {
        KeyComparator::Cell {
            timestamp: TimestampOrder::Descending,
        }
    }

    /// Order of two row keys. Identical for every descriptor.
    #[inline]
    pub fn compare_rows(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let rows = self.compare_rows(a.row(), b.row());
        match self {
            KeyComparator::Lexicographic => rows,
            KeyComparator::Cell { timestamp } => rows
                .then_with(|| a.family().cmp(b.family()))
                .then_with(|| a.qualifier().cmp(b.qualifier()))
                .then_with(|| match timestamp {
                    TimestampOrder::Ascending => a.timestamp().cmp(&b.timestamp()),
                    TimestampOrder::Descending => b.timestamp().cmp(&a.timestamp()),
                }),
        }
    }

    /// Stable string form written into file metadata and plan files.
    pub fn to_descriptor(&self) -> String {
        // Serializing this enum cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_descriptor(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| Error::Corruption(format!("bad comparator descriptor {s:?}: {e}")))
    }
}
