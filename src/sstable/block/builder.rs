use crate::schema::BlockEncoding;

/// Accumulates sorted entries of a single column family and serializes them
/// into a block.
///
/// On-disk layout of a block:
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │ NONE:   [key_len(2B)][val_len(4B)][key][value]                │
/// │ PREFIX: [shared(2B)][unshared(2B)][val_len(4B)][suffix][value]│
/// │ ...                                                          │
/// ├──────────────────────────────────────────────────────────────┤
/// │ Offset array: [off_0(4B)]...[off_N(4B)]                       │
/// │ Num entries (4B)                                             │
/// │ Encoding id (1B)                                             │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// PREFIX entries only store the part of the key not shared with the
/// previous entry, so they must be decoded front to back.
pub struct BlockBuilder {
    data: Vec<u8>,
    offsets: Vec<u32>,
    block_size: usize,
    encoding: BlockEncoding,
    last_key: Vec<u8>,
}

/// Bytes after the entry data besides the offsets: count + encoding id.
pub(crate) const BLOCK_TRAILER: usize = 4 + 1;

impl BlockBuilder {
    pub fn new(block_size: usize, encoding: BlockEncoding) -> Self {
        BlockBuilder {
            data: Vec::new(),
            offsets: Vec::new(),
            block_size,
            encoding,
            last_key: Vec::new(),
        }
    }

    /// Add an entry. Returns false if the block is full.
    /// The first entry is always accepted even if it exceeds block_size.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> bool {
        let shared = match self.encoding {
            BlockEncoding::None => 0,
            BlockEncoding::Prefix if self.offsets.is_empty() => 0,
            BlockEncoding::Prefix => common_prefix(&self.last_key, key).min(u16::MAX as usize),
        };
        let header = match self.encoding {
            BlockEncoding::None => 2 + 4,
            BlockEncoding::Prefix => 2 + 2 + 4,
        };
        let entry_size = header + key.len() - shared + value.len() + 4;

        if !self.offsets.is_empty() && self.estimated_size() + entry_size > self.block_size {
            return false;
        }

        self.offsets.push(self.data.len() as u32);
        match self.encoding {
            BlockEncoding::None => {
                self.data.extend_from_slice(&(key.len() as u16).to_le_bytes());
            }
            BlockEncoding::Prefix => {
                self.data.extend_from_slice(&(shared as u16).to_le_bytes());
                self.data
                    .extend_from_slice(&((key.len() - shared) as u16).to_le_bytes());
            }
        }
        self.data.extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.data.extend_from_slice(&key[shared..]);
        self.data.extend_from_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        true
    }

    /// Finalize the block: append offset array, entry count, encoding id.
    pub fn build(self) -> Vec<u8> {
        let mut block = self.data;
        for offset in &self.offsets {
            block.extend_from_slice(&offset.to_le_bytes());
        }
        block.extend_from_slice(&(self.offsets.len() as u32).to_le_bytes());
        block.push(self.encoding.id());
        block
    }

    /// Current estimated size of the block (data + offsets + trailer).
    pub fn estimated_size(&self) -> usize {
        self.data.len() + self.offsets.len() * 4 + BLOCK_TRAILER
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Key of the most recently added entry.
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
