//! The store's native immutable file format.
//!
//! ```text
//! ┌────────────────────────┐
//! │ Data blocks            │  one family per block, cell order preserved
//! │ Bloom blocks           │  one per family with bloom type != NONE
//! │ Index block            │  last key, location, family, crc per block
//! │ File info (JSON)       │  partition, comparator, family table
//! │ Footer (48B)           │
//! └────────────────────────┘
//! ```

pub mod block;
pub mod builder;
pub mod footer;
pub mod iterator;
pub mod reader;

use crate::error::{Error, Result};

/// Largest row accepted by the cell key encoding.
pub const MAX_ROW_LEN: usize = u16::MAX as usize;

/// Encode the in-block key of a cell: [row_len(2B)][row][qualifier][ts(8B BE)].
///
/// The family is not part of the key: a block belongs to one family and the
/// index entry names it.
pub(crate) fn encode_cell_key(row: &[u8], qualifier: &[u8], timestamp: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + row.len() + qualifier.len() + 8);
    key.extend_from_slice(&(row.len() as u16).to_le_bytes());
    key.extend_from_slice(row);
    key.extend_from_slice(qualifier);
    key.extend_from_slice(&timestamp.to_be_bytes());
    key
}

/// Split a cell key back into (row, qualifier, timestamp).
pub(crate) fn decode_cell_key(key: &[u8]) -> Result<(&[u8], &[u8], i64)> {
    if key.len() < 10 {
        return Err(Error::Corruption("cell key too short".into()));
    }
    let row_len = u16::from_le_bytes([key[0], key[1]]) as usize;
    if 2 + row_len + 8 > key.len() {
        return Err(Error::Corruption("cell key row overflows key".into()));
    }
    let row = &key[2..2 + row_len];
    let qualifier = &key[2 + row_len..key.len() - 8];
    let ts = i64::from_be_bytes(key[key.len() - 8..].try_into().unwrap());
    Ok((row, qualifier, ts))
}

/// Row of a cell key.
pub(crate) fn cell_key_row(key: &[u8]) -> Result<&[u8]> {
    decode_cell_key(key).map(|(row, _, _)| row)
}

/// Bloom key for ROWCOL granularity.
pub(crate) fn row_col_bloom_key(row: &[u8], qualifier: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + row.len() + qualifier.len());
    key.extend_from_slice(&(row.len() as u32).to_le_bytes());
    key.extend_from_slice(row);
    key.extend_from_slice(qualifier);
    key
}
