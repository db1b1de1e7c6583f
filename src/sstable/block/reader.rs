use crate::error::{Error, Result};
use crate::schema::BlockEncoding;
use crate::sstable::block::builder::BLOCK_TRAILER;

/// A decoded data block.
///
/// Entries are materialized on decode: PREFIX blocks need a front-to-back
/// pass anyway, and blocks are small.
pub struct Block {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    encoding: BlockEncoding,
}

impl Block {
    pub fn decode(data: Vec<u8>) -> Result<Self> {
        if data.len() < BLOCK_TRAILER {
            return Err(Error::Corruption("block too short".into()));
        }
        let encoding = BlockEncoding::from_id(data[data.len() - 1])?;
        let count_at = data.len() - BLOCK_TRAILER;
        let count = read_u32(&data, count_at)? as usize;

        let offsets_len = count
            .checked_mul(4)
            .filter(|n| *n <= count_at)
            .ok_or_else(|| Error::Corruption("block offset array overflows block".into()))?;
        let data_end = count_at - offsets_len;

        let mut entries = Vec::with_capacity(count);
        let mut prev_key: Vec<u8> = Vec::new();
        for i in 0..count {
            let off = read_u32(&data, data_end + i * 4)? as usize;
            if off >= data_end {
                return Err(Error::Corruption(format!("entry offset {off} past block data")));
            }
            let (key, value) = match encoding {
                BlockEncoding::None => {
                    let key_len = read_u16(&data, off)? as usize;
                    let val_len = read_u32(&data, off + 2)? as usize;
                    let start = off + 6;
                    let key = slice(&data, start, key_len, data_end)?.to_vec();
                    let value = slice(&data, start + key_len, val_len, data_end)?.to_vec();
                    (key, value)
                }
                BlockEncoding::Prefix => {
                    let shared = read_u16(&data, off)? as usize;
                    let unshared = read_u16(&data, off + 2)? as usize;
                    let val_len = read_u32(&data, off + 4)? as usize;
                    if shared > prev_key.len() {
                        return Err(Error::Corruption(format!(
                            "entry {i} shares {shared} bytes with a {}-byte key",
                            prev_key.len()
                        )));
                    }
                    let start = off + 8;
                    let mut key = prev_key[..shared].to_vec();
                    key.extend_from_slice(slice(&data, start, unshared, data_end)?);
                    let value = slice(&data, start + unshared, val_len, data_end)?.to_vec();
                    (key, value)
                }
            };
            prev_key.clone_from(&key);
            entries.push((key, value));
        }

        Ok(Block { entries, encoding })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encoding(&self) -> BlockEncoding {
        self.encoding
    }

    /// Exact key lookup. Entries follow the writer's comparator, which is
    /// not byte order over encoded keys, so this is a scan.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_slice() == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn into_entries(self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries
    }

    pub fn entries(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.entries
    }
}

fn read_u16(data: &[u8], at: usize) -> Result<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| Error::Corruption("block truncated".into()))
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::Corruption("block truncated".into()))
}

fn slice(data: &[u8], start: usize, len: usize, end: usize) -> Result<&[u8]> {
    if start + len > end {
        return Err(Error::Corruption("block entry exceeds block data".into()));
    }
    Ok(&data[start..start + len])
}
