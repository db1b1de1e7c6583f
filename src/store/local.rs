use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::comparator::KeyComparator;
use crate::error::{Error, FailedFile, Result};
use crate::iterator::RecordScanner;
use crate::schema::{FamilyPolicies, TableSchema};
use crate::sstable::builder::{SSTableBuilder, SSTableOptions};
use crate::sstable::reader::SSTable;
use crate::store::{BulkLoadReport, LoadedFile, TableAdmin};
use crate::types::{Key, Record, TableName};

const TABLE_META: &str = "table.json";
const STAGING_DIR: &str = ".staging";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegionMeta {
    start_key: Key,
    id: u64,
    files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableMeta {
    name: String,
    schema: TableSchema,
    regions: Vec<RegionMeta>,
    next_id: u64,
}

impl TableMeta {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn alloc_file_name(&mut self) -> String {
        format!("{:016x}.sst", self.alloc_id())
    }

    /// Region holding `row`. The first region always starts at the empty key.
    fn region_for(&self, row: &[u8]) -> usize {
        self.regions
            .partition_point(|r| r.start_key.as_slice() <= row)
            .saturating_sub(1)
    }

    fn start_keys(&self) -> Vec<Key> {
        self.regions.iter().map(|r| r.start_key.clone()).collect()
    }
}

/// Files registered with one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionFiles {
    pub start_key: Key,
    pub files: Vec<PathBuf>,
}

/// Filesystem-backed table store.
///
/// Each table is a directory holding `table.json` (schema and region layout)
/// and one sub-directory per region with that region's files. Regions can be
/// split and merged while a job runs. `bulk_load` routes files by the layout
/// at the moment it takes the table lock, splitting any file that straddles
/// a region boundary, and either registers every file or none.
///
/// ```text
/// root/
///   <table>/
///     table.json
///     region-0000000000000001/
///       00000000000000a3.sst
///     .staging/            only while a bulk load is in flight
/// ```
pub struct LocalStore {
    root: PathBuf,
    tables: Mutex<BTreeMap<TableName, TableMeta>>,
}

impl LocalStore {
    /// Open (or create) a store rooted at `root`, loading every table found.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let mut tables = BTreeMap::new();
        for entry in fs::read_dir(root)? {
            let dir = entry?.path();
            let meta_path = dir.join(TABLE_META);
            if !meta_path.is_file() {
                continue;
            }
            let meta: TableMeta = serde_json::from_slice(&fs::read(&meta_path)?)?;
            let staging = dir.join(STAGING_DIR);
            if staging.exists() {
                warn!("discarding unfinished bulk load in {}", staging.display());
                fs::remove_dir_all(&staging)?;
            }
            tables.insert(TableName::new(meta.name.clone()), meta);
        }
        debug!("opened store at {} with {} table(s)", root.display(), tables.len());
        Ok(LocalStore {
            root: root.to_path_buf(),
            tables: Mutex::new(tables),
        })
    }

    /// Create a table pre-split at `split_keys`. The empty key is always the
    /// first region start.
    pub fn create_table(
        &self,
        name: &TableName,
        schema: TableSchema,
        split_keys: Vec<Key>,
    ) -> Result<()> {
        schema.policies()?;
        let mut tables = self.tables.lock();
        if tables.contains_key(name) {
            return Err(Error::InvalidArgument(format!("table '{name}' already exists")));
        }

        let mut keys: Vec<Key> = split_keys.into_iter().filter(|k| !k.is_empty()).collect();
        keys.sort();
        keys.dedup();

        let mut meta = TableMeta {
            name: name.to_string(),
            schema,
            regions: Vec::with_capacity(keys.len() + 1),
            next_id: 0,
        };
        for start_key in std::iter::once(Vec::new()).chain(keys) {
            let id = meta.alloc_id();
            fs::create_dir_all(self.region_dir(name, id))?;
            meta.regions.push(RegionMeta {
                start_key,
                id,
                files: Vec::new(),
            });
        }
        self.persist(name, &meta)?;
        info!("created table {name} with {} region(s)", meta.regions.len());
        tables.insert(name.clone(), meta);
        Ok(())
    }

    /// Split the region containing `split_key` so a new region starts there.
    /// Files of the parent region are divided between the two.
    pub fn split_region(&self, name: &TableName, split_key: &[u8]) -> Result<()> {
        let mut tables = self.tables.lock();
        let meta = tables.get_mut(name).ok_or_else(|| no_such_table(name))?;
        if split_key.is_empty() || meta.regions.iter().any(|r| r.start_key == split_key) {
            return Err(Error::InvalidArgument(format!(
                "{:?} is already a region boundary",
                String::from_utf8_lossy(split_key)
            )));
        }

        let mut next = meta.clone();
        let policies = next.schema.policies()?;
        let parent = next.region_for(split_key);
        let child_id = next.alloc_id();
        fs::create_dir_all(self.region_dir(name, child_id))?;
        next.regions.insert(
            parent + 1,
            RegionMeta {
                start_key: split_key.to_vec(),
                id: child_id,
                files: Vec::new(),
            },
        );

        let parent_id = next.regions[parent].id;
        let parent_files = std::mem::take(&mut next.regions[parent].files);
        let bounds = next.start_keys();
        let mut created = Vec::new();
        let mut replaced = Vec::new();
        let outcome = (|| -> Result<()> {
            for file in parent_files {
                let path = self.region_dir(name, parent_id).join(&file);
                let table = SSTable::open(&path)?;
                let first = next.region_for(&table.info().first_row);
                let last = next.region_for(&table.info().last_row);
                if first == last {
                    if first == parent {
                        next.regions[parent].files.push(file);
                    } else {
                        let dest_name = next.alloc_file_name();
                        let dest = self.region_dir(name, child_id).join(&dest_name);
                        fs::copy(&path, &dest)?;
                        created.push(dest);
                        next.regions[first].files.push(dest_name);
                        replaced.push(path);
                    }
                    continue;
                }

                let mut names = Vec::new();
                let pieces = split_file(table, &bounds, &policies, &mut |region| {
                    let dest_name = next.alloc_file_name();
                    let dir_id = if region == parent { parent_id } else { child_id };
                    names.push((region, dest_name.clone()));
                    self.region_dir(name, dir_id).join(dest_name)
                });
                let pieces = pieces.inspect_err(|_| {
                    for (region, n) in &names {
                        let dir_id = if *region == parent { parent_id } else { child_id };
                        let _ = fs::remove_file(self.region_dir(name, dir_id).join(n));
                    }
                })?;
                created.extend(pieces);
                for (region, n) in names {
                    next.regions[region].files.push(n);
                }
                replaced.push(path);
            }
            self.persist(name, &next)
        })();

        if let Err(e) = outcome {
            for path in &created {
                let _ = fs::remove_file(path);
            }
            let _ = fs::remove_dir(self.region_dir(name, child_id));
            return Err(e);
        }
        for path in replaced {
            let _ = fs::remove_file(path);
        }
        info!(
            "split region {parent} of {name} at {:?}",
            String::from_utf8_lossy(split_key)
        );
        *meta = next;
        Ok(())
    }

    /// Merge the region starting at `start_key` into the region before it.
    pub fn merge_regions(&self, name: &TableName, start_key: &[u8]) -> Result<()> {
        let mut tables = self.tables.lock();
        let meta = tables.get_mut(name).ok_or_else(|| no_such_table(name))?;
        let Some(pos) = meta
            .regions
            .iter()
            .position(|r| r.start_key == start_key)
            .filter(|&p| p > 0)
        else {
            return Err(Error::InvalidArgument(format!(
                "no mergeable region starts at {:?}",
                String::from_utf8_lossy(start_key)
            )));
        };

        let mut next = meta.clone();
        let gone = next.regions.remove(pos);
        let into_id = next.regions[pos - 1].id;
        for file in &gone.files {
            fs::rename(
                self.region_dir(name, gone.id).join(file),
                self.region_dir(name, into_id).join(file),
            )?;
        }
        next.regions[pos - 1].files.extend(gone.files);
        self.persist(name, &next)?;
        let _ = fs::remove_dir(self.region_dir(name, gone.id));
        info!("merged region {pos} of {name} into its predecessor");
        *meta = next;
        Ok(())
    }

    /// Every cell of `row` in `family`, in cell order.
    pub fn get_row(&self, name: &TableName, family: &[u8], row: &[u8]) -> Result<Vec<Record>> {
        let tables = self.tables.lock();
        let meta = tables.get(name).ok_or_else(|| no_such_table(name))?;
        let region = &meta.regions[meta.region_for(row)];
        let mut out = Vec::new();
        for file in &region.files {
            let table = SSTable::open(&self.region_dir(name, region.id).join(file))?;
            out.extend(table.get_row(row, Some(family))?);
        }
        let cmp = KeyComparator::cell();
        out.sort_by(|a, b| cmp.compare(a, b));
        Ok(out)
    }

    /// Every record in the table, ordered by row. Cells of one row keep
    /// file order.
    pub fn scan_table(&self, name: &TableName) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        for region in self.region_files(name)? {
            let mut records = Vec::new();
            for path in &region.files {
                let mut scanner = SSTable::open(path)?.scanner()?;
                while let Some(record) = scanner.next()? {
                    records.push(record);
                }
            }
            records.sort_by(|a, b| a.row().cmp(b.row()));
            out.extend(records);
        }
        Ok(out)
    }

    /// Current regions and their files, in key order.
    pub fn region_files(&self, name: &TableName) -> Result<Vec<RegionFiles>> {
        let tables = self.tables.lock();
        let meta = tables.get(name).ok_or_else(|| no_such_table(name))?;
        Ok(meta
            .regions
            .iter()
            .map(|r| RegionFiles {
                start_key: r.start_key.clone(),
                files: r
                    .files
                    .iter()
                    .map(|f| self.region_dir(name, r.id).join(f))
                    .collect(),
            })
            .collect())
    }

    fn table_dir(&self, name: &TableName) -> PathBuf {
        self.root.join(name.as_str().replace(':', "__"))
    }

    fn region_dir(&self, name: &TableName, id: u64) -> PathBuf {
        self.table_dir(name).join(format!("region-{id:016x}"))
    }

    /// Replace `table.json` atomically.
    fn persist(&self, name: &TableName, meta: &TableMeta) -> Result<()> {
        let dir = self.table_dir(name);
        let tmp = dir.join(format!("{TABLE_META}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(meta)?)?;
        fs::rename(&tmp, dir.join(TABLE_META))?;
        Ok(())
    }

    /// Copy (or split) `source` into the staging area. Returns the report
    /// entry and the staged pieces as `(region, staged path, final name)`.
    fn stage_file(
        &self,
        source: &Path,
        meta: &mut TableMeta,
        policies: &FamilyPolicies,
        staging: &Path,
    ) -> Result<(LoadedFile, Vec<(usize, PathBuf, String)>)> {
        let table = SSTable::open(source)?;
        for family in &table.info().families {
            policies.get(&family.name)?;
        }
        if table.info().entry_count == 0 {
            return Err(Error::InvalidArgument("file holds no records".into()));
        }

        let first = meta.region_for(&table.info().first_row);
        let last = meta.region_for(&table.info().last_row);
        if first == last {
            let name = meta.alloc_file_name();
            let staged = staging.join(&name);
            fs::copy(source, &staged)?;
            let loaded = LoadedFile {
                source: source.to_path_buf(),
                region_start_keys: vec![meta.regions[first].start_key.clone()],
                split: false,
            };
            return Ok((loaded, vec![(first, staged, name)]));
        }

        let bounds = meta.start_keys();
        let mut pieces = Vec::new();
        split_file(table, &bounds, policies, &mut |region| {
            let name = meta.alloc_file_name();
            let staged = staging.join(&name);
            pieces.push((region, staged.clone(), name));
            staged
        })?;
        debug!("{} straddles {} region(s), split", source.display(), pieces.len());
        let loaded = LoadedFile {
            source: source.to_path_buf(),
            region_start_keys: pieces.iter().map(|(r, _, _)| bounds[*r].clone()).collect(),
            split: true,
        };
        Ok((loaded, pieces))
    }
}

impl TableAdmin for LocalStore {
    fn region_start_keys(&self, table: &TableName) -> Result<Vec<Key>> {
        let tables = self.tables.lock();
        let meta = tables.get(table).ok_or_else(|| no_such_table(table))?;
        Ok(meta.start_keys())
    }

    fn table_schema(&self, table: &TableName) -> Result<TableSchema> {
        let tables = self.tables.lock();
        let meta = tables.get(table).ok_or_else(|| no_such_table(table))?;
        Ok(meta.schema.clone())
    }

    fn bulk_load(&self, table: &TableName, files: &[PathBuf]) -> Result<BulkLoadReport> {
        let mut tables = self.tables.lock();
        let meta = tables.get_mut(table).ok_or_else(|| no_such_table(table))?;
        let policies = meta.schema.policies()?;

        let staging = self.table_dir(table).join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let mut next = meta.clone();
        let mut report = BulkLoadReport::default();
        let mut staged = Vec::new();
        for source in files {
            match self.stage_file(source, &mut next, &policies, &staging) {
                Ok((loaded, pieces)) => {
                    report.loaded.push(loaded);
                    staged.extend(pieces);
                }
                Err(e) => report.failed.push(FailedFile {
                    path: source.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        if !report.failed.is_empty() {
            warn!(
                "bulk load into {table} refused: {} of {} file(s) unusable",
                report.failed.len(),
                files.len()
            );
            report.loaded.clear();
            fs::remove_dir_all(&staging)?;
            return Ok(report);
        }

        for (region, path, name) in staged {
            let id = next.regions[region].id;
            fs::rename(&path, self.region_dir(table, id).join(&name))?;
            next.regions[region].files.push(name);
        }
        self.persist(table, &next)?;
        fs::remove_dir_all(&staging)?;
        info!(
            "bulk loaded {} file(s) into {table} ({} split)",
            report.loaded.len(),
            report.split_count()
        );
        *meta = next;
        Ok(report)
    }
}

fn no_such_table(name: &TableName) -> Error {
    Error::InvalidArgument(format!("table '{name}' does not exist"))
}

/// Rewrite `table` as one file per region its rows fall in. `dest` names the
/// file for a region; returns the written paths.
fn split_file(
    table: SSTable,
    bounds: &[Key],
    policies: &FamilyPolicies,
    dest: &mut dyn FnMut(usize) -> PathBuf,
) -> Result<Vec<PathBuf>> {
    let options = SSTableOptions {
        partition: table.info().partition,
        comparator: table.comparator(),
        ..SSTableOptions::default()
    };
    let region_of = |row: &[u8]| {
        bounds
            .partition_point(|k| k.as_slice() <= row)
            .saturating_sub(1)
    };

    let mut written = Vec::new();
    let mut current: Option<(usize, SSTableBuilder)> = None;
    let mut scanner = table.scanner()?;
    while let Some(record) = scanner.next()? {
        let region = region_of(record.row());
        if current.as_ref().is_none_or(|(r, _)| *r != region) {
            if let Some((_, builder)) = current.take() {
                builder.finish()?;
            }
            let path = dest(region);
            written.push(path.clone());
            current = Some((
                region,
                SSTableBuilder::create(&path, policies.clone(), options)?,
            ));
        }
        if let Some((_, builder)) = current.as_mut() {
            builder.add(&record)?;
        }
    }
    if let Some((_, builder)) = current {
        builder.finish()?;
    }
    Ok(written)
}
