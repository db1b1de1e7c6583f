use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{BlockEncoding, BloomType};

/// Magic number to identify partition files.
pub const SSTABLE_MAGIC: u64 = 0x424C_4B5F_5353_5401; // "BLK_SST\x01"

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Location of a block inside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

/// Per-family trailer metadata. Downstream loaders validate these fields,
/// so they are written exactly as the family policy configured them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyInfo {
    pub name: Vec<u8>,
    pub bloom_type: BloomType,
    pub block_encoding: BlockEncoding,
    pub entry_count: u64,
    /// `None` when the bloom type is NONE or the family got no cells.
    pub bloom: Option<BlockHandle>,
}

/// File-info block, stored as JSON between the index block and the footer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Partition index the file was written for.
    pub partition: usize,
    pub entry_count: u64,
    pub first_row: Vec<u8>,
    pub last_row: Vec<u8>,
    /// Comparator descriptor the records were sorted with.
    pub comparator: String,
    /// Wall-clock creation time, milliseconds since the epoch.
    pub created_at_ms: u64,
    pub families: Vec<FamilyInfo>,
}

impl FileInfo {
    pub fn family(&self, name: &[u8]) -> Option<&FamilyInfo> {
        self.families.iter().find(|f| f.name == name)
    }
}

/// An entry in the index block. Maps a block's last cell key to its
/// location, its family and its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Encoded cell key of the last entry in the block.
    pub last_key: Vec<u8>,
    pub offset: u64,
    pub size: u64,
    /// Position of the block's family in `FileInfo::families`.
    pub family_id: u16,
    /// CRC32 of the block bytes.
    pub crc: u32,
}

impl IndexEntry {
    /// Format: [key_len(2B)][key][offset(8B)][size(8B)][family_id(2B)][crc(4B)]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.last_key.len() + 22);
        buf.extend_from_slice(&(self.last_key.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.last_key);
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.extend_from_slice(&self.family_id.to_le_bytes());
        buf.extend_from_slice(&self.crc.to_le_bytes());
        buf
    }

    /// Decode an index entry from bytes, returning (entry, bytes_consumed).
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 2 {
            return Err(Error::Corruption("index entry too short".into()));
        }
        let key_len = u16::from_le_bytes([data[0], data[1]]) as usize;
        let total = 2 + key_len + 22;
        if data.len() < total {
            return Err(Error::Corruption("index entry truncated".into()));
        }
        let k = 2 + key_len;
        let last_key = data[2..k].to_vec();
        let offset = u64::from_le_bytes(data[k..k + 8].try_into().unwrap());
        let size = u64::from_le_bytes(data[k + 8..k + 16].try_into().unwrap());
        let family_id = u16::from_le_bytes([data[k + 16], data[k + 17]]);
        let crc = u32::from_le_bytes(data[k + 18..k + 22].try_into().unwrap());
        Ok((
            IndexEntry {
                last_key,
                offset,
                size,
                family_id,
                crc,
            },
            total,
        ))
    }
}

/// The footer sits at the end of the file and points at the index and
/// file-info blocks.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ Index block offset (8B)              │
/// │ Index block size (8B)                │
/// │ File info offset (8B)                │
/// │ File info size (8B)                  │
/// │ Format version (4B) | reserved (4B)  │
/// │ Magic number (8B)                    │
/// └──────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub index: BlockHandle,
    pub info: BlockHandle,
    pub version: u32,
}

impl Footer {
    /// Size of the footer in bytes (fixed).
    pub const SIZE: usize = 8 * 6;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.index.offset.to_le_bytes());
        buf.extend_from_slice(&self.index.size.to_le_bytes());
        buf.extend_from_slice(&self.info.offset.to_le_bytes());
        buf.extend_from_slice(&self.info.size.to_le_bytes());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&SSTABLE_MAGIC.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Corruption("footer too short".into()));
        }
        let u64_at = |i: usize| u64::from_le_bytes(data[i..i + 8].try_into().unwrap());
        let magic = u64_at(40);
        if magic != SSTABLE_MAGIC {
            return Err(Error::Corruption(format!(
                "bad magic: expected {SSTABLE_MAGIC:#x}, got {magic:#x}"
            )));
        }
        let version = u32::from_le_bytes(data[32..36].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(Error::Corruption(format!("unsupported format version {version}")));
        }
        Ok(Footer {
            index: BlockHandle {
                offset: u64_at(0),
                size: u64_at(8),
            },
            info: BlockHandle {
                offset: u64_at(16),
                size: u64_at(24),
            },
            version,
        })
    }
}
