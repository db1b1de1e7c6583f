use std::cell::RefCell;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::bloom::BloomFilter;
use crate::comparator::KeyComparator;
use crate::error::{Error, Result};
use crate::schema::BloomType;
use crate::sstable::block::reader::Block;
use crate::sstable::footer::{BlockHandle, FamilyInfo, FileInfo, Footer, IndexEntry};
use crate::sstable::iterator::SSTableScanner;
use crate::sstable::{cell_key_row, decode_cell_key, row_col_bloom_key};
use crate::types::Record;

/// An opened partition file. Supports point reads and forward scans.
///
/// On open:
/// 1. Read footer (last 48 bytes) → find index and file-info blocks
/// 2. Parse file info → comparator, family table
/// 3. Parse index block, load bloom filters
/// 4. Data blocks are read on demand
pub struct SSTable {
    path: PathBuf,
    /// Wrapped in RefCell so reads can seek through `&self`.
    file: RefCell<File>,
    index: Vec<IndexEntry>,
    /// Row of each index entry's last key, decoded once.
    last_rows: Vec<Vec<u8>>,
    info: FileInfo,
    comparator: KeyComparator,
    /// Bloom filter per family id.
    blooms: Vec<Option<BloomFilter>>,
    file_size: u64,
}

impl SSTable {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;

        let file_size = file.metadata()?.len();
        if file_size < Footer::SIZE as u64 {
            return Err(Error::Corruption(format!(
                "{}: file too short to contain footer",
                path.display()
            )));
        }

        file.seek(SeekFrom::Start(file_size - Footer::SIZE as u64))?;
        let mut footer_buf = vec![0u8; Footer::SIZE];
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::decode(&footer_buf)?;

        let info_buf = read_handle(&mut file, footer.info, file_size)?;
        let info: FileInfo = serde_json::from_slice(&info_buf)?;
        let comparator = KeyComparator::from_descriptor(&info.comparator)?;

        let index_buf = read_handle(&mut file, footer.index, file_size)?;
        let mut index = Vec::new();
        let mut last_rows = Vec::new();
        let mut offset = 0usize;
        while offset < index_buf.len() {
            let (entry, consumed) = IndexEntry::decode(&index_buf[offset..])?;
            if entry.family_id as usize >= info.families.len() {
                return Err(Error::Corruption(format!(
                    "index entry names family {} of {}",
                    entry.family_id,
                    info.families.len()
                )));
            }
            last_rows.push(cell_key_row(&entry.last_key)?.to_vec());
            index.push(entry);
            offset += consumed;
        }

        let mut blooms = Vec::with_capacity(info.families.len());
        for fam in &info.families {
            let bloom = match fam.bloom {
                Some(handle) => Some(BloomFilter::deserialize(&read_handle(
                    &mut file, handle, file_size,
                )?)?),
                None => None,
            };
            blooms.push(bloom);
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: RefCell::new(file),
            index,
            last_rows,
            info,
            comparator,
            blooms,
            file_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn comparator(&self) -> KeyComparator {
        self.comparator
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    pub fn family(&self, name: &[u8]) -> Option<&FamilyInfo> {
        self.info.family(name)
    }

    /// False only if the file definitely has no cell of `family` in `row`.
    pub fn may_contain_row(&self, family: &[u8], row: &[u8]) -> bool {
        let Some(id) = self.family_id(family) else {
            return false;
        };
        match (&self.blooms[id], self.info.families[id].bloom_type) {
            (Some(bloom), BloomType::Row) => bloom.may_contain(row),
            _ => true,
        }
    }

    /// False only if the file definitely lacks the `row`/`qualifier` cell.
    pub fn may_contain_cell(&self, family: &[u8], row: &[u8], qualifier: &[u8]) -> bool {
        let Some(id) = self.family_id(family) else {
            return false;
        };
        match (&self.blooms[id], self.info.families[id].bloom_type) {
            (Some(bloom), BloomType::Row) => bloom.may_contain(row),
            (Some(bloom), BloomType::RowCol) => {
                bloom.may_contain(&row_col_bloom_key(row, qualifier))
            }
            _ => true,
        }
    }

    /// All cells of `row`, optionally limited to one family, in file order.
    pub fn get_row(&self, row: &[u8], family: Option<&[u8]>) -> Result<Vec<Record>> {
        let cmp = self.comparator;
        if self.info.entry_count == 0
            || cmp.compare_rows(row, &self.info.first_row) == Ordering::Less
            || cmp.compare_rows(row, &self.info.last_row) == Ordering::Greater
        {
            return Ok(Vec::new());
        }
        if let Some(fam) = family {
            if !self.may_contain_row(fam, row) {
                return Ok(Vec::new());
            }
        }

        let mut out = Vec::new();
        for idx in self.first_block_for(row)..self.index.len() {
            if family.is_some_and(|f| self.family_name(idx) != f) {
                if cmp.compare_rows(&self.last_rows[idx], row) == Ordering::Greater {
                    break;
                }
                continue;
            }
            let mut past = false;
            for record in self.read_block(idx)? {
                match cmp.compare_rows(record.row(), row) {
                    Ordering::Less => {}
                    Ordering::Equal => out.push(record),
                    Ordering::Greater => {
                        past = true;
                        break;
                    }
                }
            }
            if past {
                break;
            }
        }
        Ok(out)
    }

    /// Forward-only scanner positioned at the first record.
    pub fn scanner(self) -> Result<SSTableScanner> {
        SSTableScanner::new(self)
    }

    /// First block whose last row is not below `row`.
    pub(crate) fn first_block_for(&self, row: &[u8]) -> usize {
        self.last_rows
            .partition_point(|last| self.comparator.compare_rows(last, row) == Ordering::Less)
    }

    /// Read, verify and decode block `idx` into records.
    pub(crate) fn read_block(&self, idx: usize) -> Result<Vec<Record>> {
        let entry = &self.index[idx];
        let data = {
            let mut file = self.file.borrow_mut();
            read_handle(
                &mut file,
                BlockHandle {
                    offset: entry.offset,
                    size: entry.size,
                },
                self.file_size,
            )?
        };
        if crc32fast::hash(&data) != entry.crc {
            return Err(Error::Corruption(format!(
                "{}: checksum mismatch in block {idx}",
                self.path.display()
            )));
        }

        let family = self.family_name(idx).to_vec();
        Block::decode(data)?
            .into_entries()
            .into_iter()
            .map(|(key, value)| {
                let (row, qualifier, ts) = decode_cell_key(&key)?;
                Ok(Record::new(row, family.clone(), qualifier, ts, value))
            })
            .collect()
    }

    fn family_name(&self, idx: usize) -> &[u8] {
        &self.info.families[self.index[idx].family_id as usize].name
    }

    fn family_id(&self, family: &[u8]) -> Option<usize> {
        self.info.families.iter().position(|f| f.name == family)
    }
}

fn read_handle(file: &mut File, handle: BlockHandle, file_size: u64) -> Result<Vec<u8>> {
    if handle.offset.saturating_add(handle.size) > file_size {
        return Err(Error::Corruption(format!(
            "block [{}, +{}) past end of file ({file_size} bytes)",
            handle.offset, handle.size
        )));
    }
    file.seek(SeekFrom::Start(handle.offset))?;
    let mut buf = vec![0u8; handle.size as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
