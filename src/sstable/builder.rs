use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::bloom::builder::BloomFilterBuilder;
use crate::comparator::KeyComparator;
use crate::error::{Error, Result};
use crate::schema::{BloomType, FamilyPolicies};
use crate::sstable::block::builder::BlockBuilder;
use crate::sstable::footer::{
    BlockHandle, FORMAT_VERSION, FamilyInfo, FileInfo, Footer, IndexEntry,
};
use crate::sstable::{MAX_ROW_LEN, encode_cell_key, row_col_bloom_key};
use crate::types::Record;

/// Knobs for a single file build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SSTableOptions {
    /// Partition index recorded in the file info.
    pub partition: usize,
    pub block_size: usize,
    pub bloom_fpr: f64,
    pub comparator: KeyComparator,
}

impl Default for SSTableOptions {
    fn default() -> Self {
        SSTableOptions {
            partition: 0,
            block_size: 64 * 1024,
            bloom_fpr: 0.01,
            comparator: KeyComparator::default(),
        }
    }
}

/// Result of a finished build.
#[derive(Debug, Clone)]
pub struct SSTableMeta {
    pub file_size: u64,
    pub info: FileInfo,
}

struct FamilyState {
    info: FamilyInfo,
    bloom: Option<BloomFilterBuilder>,
}

/// Builds a partition file from records in comparator order.
///
/// Records are written exactly in the order they are added. A data block
/// only ever holds one family: it is cut when full or when the next record
/// belongs to another family, and encoded with that family's encoding.
/// Bloom filters are accumulated per family and written after the data.
pub struct SSTableBuilder {
    /// Current block being filled with entries.
    block_builder: BlockBuilder,
    /// Family of the current block.
    block_family: Option<u16>,
    /// Index entries: one per flushed data block.
    index_entries: Vec<IndexEntry>,
    /// Tracks current write position in the file.
    data_offset: u64,
    writer: BufWriter<File>,
    options: SSTableOptions,
    policies: FamilyPolicies,
    /// Families in order of first appearance; position is the family id.
    families: Vec<FamilyState>,
    first_row: Option<Vec<u8>>,
    last_row: Option<Vec<u8>>,
    entry_count: u64,
}

impl SSTableBuilder {
    /// Create (or truncate) a file at `path` and build into it.
    pub fn create(path: &Path, policies: FamilyPolicies, options: SSTableOptions) -> Result<Self> {
        Ok(Self::new(File::create(path)?, policies, options))
    }

    /// Build into an already opened, empty file.
    pub fn new(file: File, policies: FamilyPolicies, options: SSTableOptions) -> Self {
        SSTableBuilder {
            block_builder: BlockBuilder::new(options.block_size, Default::default()),
            block_family: None,
            index_entries: Vec::new(),
            data_offset: 0,
            writer: BufWriter::new(file),
            options,
            policies,
            families: Vec::new(),
            first_row: None,
            last_row: None,
            entry_count: 0,
        }
    }

    /// Append a record. Callers are responsible for comparator order.
    pub fn add(&mut self, record: &Record) -> Result<()> {
        let row = record.row();
        if row.len() > MAX_ROW_LEN || 2 + row.len() + record.qualifier().len() + 8 > u16::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "cell key too large ({} byte row, {} byte qualifier)",
                row.len(),
                record.qualifier().len()
            )));
        }

        let family_id = self.family_id(record.family())?;
        let state = &mut self.families[family_id as usize];
        state.info.entry_count += 1;
        if let Some(bloom) = state.bloom.as_mut() {
            match state.info.bloom_type {
                BloomType::RowCol => bloom.add_key(&row_col_bloom_key(row, record.qualifier())),
                _ => bloom.add_key(row),
            }
        }

        if self.first_row.is_none() {
            self.first_row = Some(row.to_vec());
        }
        if self.last_row.as_deref() != Some(row) {
            self.last_row = Some(row.to_vec());
        }
        self.entry_count += 1;

        let key = encode_cell_key(row, record.qualifier(), record.timestamp());
        if self.block_family != Some(family_id) {
            self.flush_block()?;
            self.start_block(family_id);
        }
        if self.block_builder.add(&key, record.value()) {
            return Ok(());
        }

        // Block is full: flush, then start a fresh block of the same family
        self.flush_block()?;
        self.start_block(family_id);
        // An empty block always takes its first entry
        let added = self.block_builder.add(&key, record.value());
        debug_assert!(added);
        Ok(())
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    fn family_id(&mut self, family: &[u8]) -> Result<u16> {
        if let Some(pos) = self.families.iter().position(|f| f.info.name == family) {
            return Ok(pos as u16);
        }
        let policy = self.policies.get(family)?;
        let bloom = (policy.bloom_type != BloomType::None)
            .then(|| BloomFilterBuilder::new(self.options.bloom_fpr));
        self.families.push(FamilyState {
            info: FamilyInfo {
                name: family.to_vec(),
                bloom_type: policy.bloom_type,
                block_encoding: policy.block_encoding,
                entry_count: 0,
                bloom: None,
            },
            bloom,
        });
        Ok((self.families.len() - 1) as u16)
    }

    fn start_block(&mut self, family_id: u16) {
        let encoding = self.families[family_id as usize].info.block_encoding;
        self.block_builder = BlockBuilder::new(self.options.block_size, encoding);
        self.block_family = Some(family_id);
    }

    /// Flush the current block to disk and record an index entry.
    fn flush_block(&mut self) -> Result<()> {
        let Some(family_id) = self.block_family.take() else {
            return Ok(());
        };
        if self.block_builder.is_empty() {
            return Ok(());
        }

        let old_builder = std::mem::replace(
            &mut self.block_builder,
            BlockBuilder::new(self.options.block_size, Default::default()),
        );
        let last_key = old_builder.last_key().to_vec();
        let block_data = old_builder.build();
        let block_size = block_data.len() as u64;

        self.writer.write_all(&block_data)?;
        self.index_entries.push(IndexEntry {
            last_key,
            offset: self.data_offset,
            size: block_size,
            family_id,
            crc: crc32fast::hash(&block_data),
        });

        self.data_offset += block_size;
        Ok(())
    }

    /// Finalize: flush the last block, write bloom blocks, index, file
    /// info, footer, then fsync.
    pub fn finish(mut self) -> Result<SSTableMeta> {
        self.flush_block()?;

        for state in &mut self.families {
            let Some(filter) = state.bloom.take().and_then(BloomFilterBuilder::build) else {
                continue;
            };
            let bytes = filter.serialize();
            self.writer.write_all(&bytes)?;
            state.info.bloom = Some(BlockHandle {
                offset: self.data_offset,
                size: bytes.len() as u64,
            });
            self.data_offset += bytes.len() as u64;
        }

        let mut index_data = Vec::new();
        for entry in &self.index_entries {
            index_data.extend_from_slice(&entry.encode());
        }
        let index = BlockHandle {
            offset: self.data_offset,
            size: index_data.len() as u64,
        };
        self.writer.write_all(&index_data)?;
        self.data_offset += index.size;

        let info = FileInfo {
            partition: self.options.partition,
            entry_count: self.entry_count,
            first_row: self.first_row.take().unwrap_or_default(),
            last_row: self.last_row.take().unwrap_or_default(),
            comparator: self.options.comparator.to_descriptor(),
            created_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            families: self.families.drain(..).map(|f| f.info).collect(),
        };
        let info_data = serde_json::to_vec(&info)?;
        let info_handle = BlockHandle {
            offset: self.data_offset,
            size: info_data.len() as u64,
        };
        self.writer.write_all(&info_data)?;
        self.data_offset += info_handle.size;

        let footer = Footer {
            index,
            info: info_handle,
            version: FORMAT_VERSION,
        };
        self.writer.write_all(&footer.encode())?;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        Ok(SSTableMeta {
            file_size: self.data_offset + Footer::SIZE as u64,
            info,
        })
    }
}
