//! Per-family storage policy, resolved once from the target schema.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Granularity of a family's bloom filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BloomType {
    None,
    /// Keyed on the row only.
    #[default]
    Row,
    /// Keyed on row + qualifier.
    RowCol,
}

/// Encoding applied to a family's data blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockEncoding {
    #[default]
    None,
    /// Each key stores only the bytes it doesn't share with the previous key.
    Prefix,
}

impl BlockEncoding {
    pub(crate) fn id(self) -> u8 {
        match self {
            BlockEncoding::None => 0,
            BlockEncoding::Prefix => 1,
        }
    }

    pub(crate) fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(BlockEncoding::None),
            1 => Ok(BlockEncoding::Prefix),
            other => Err(Error::Corruption(format!("unknown block encoding id {other}"))),
        }
    }
}

impl fmt::Display for BloomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BloomType::None => "NONE",
            BloomType::Row => "ROW",
            BloomType::RowCol => "ROWCOL",
        })
    }
}

impl fmt::Display for BlockEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockEncoding::None => "NONE",
            BlockEncoding::Prefix => "PREFIX",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnFamilyPolicy {
    pub bloom_type: BloomType,
    pub block_encoding: BlockEncoding,
}

/// Column family declaration as the store's schema reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyDescriptor {
    pub name: Vec<u8>,
    pub policy: ColumnFamilyPolicy,
}

impl FamilyDescriptor {
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        FamilyDescriptor {
            name: name.into(),
            policy: ColumnFamilyPolicy::default(),
        }
    }

    pub fn with_bloom_type(mut self, bloom_type: BloomType) -> Self {
        self.policy.bloom_type = bloom_type;
        self
    }

    pub fn with_block_encoding(mut self, encoding: BlockEncoding) -> Self {
        self.policy.block_encoding = encoding;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub families: Vec<FamilyDescriptor>,
}

impl TableSchema {
    pub fn new(families: Vec<FamilyDescriptor>) -> Self {
        TableSchema { families }
    }

    /// Freeze the schema into the policy map used for the rest of the job.
    pub fn policies(&self) -> Result<FamilyPolicies> {
        if self.families.is_empty() {
            return Err(Error::InvalidArgument("table has no column families".into()));
        }
        let mut by_name = BTreeMap::new();
        for fam in &self.families {
            if by_name.insert(fam.name.clone(), fam.policy).is_some() {
                return Err(Error::InvalidArgument(format!(
                    "duplicate column family '{}'",
                    String::from_utf8_lossy(&fam.name)
                )));
            }
        }
        Ok(FamilyPolicies { by_name })
    }
}

/// Immutable family → policy map. Cheap to clone into writer threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyPolicies {
    by_name: BTreeMap<Vec<u8>, ColumnFamilyPolicy>,
}

impl FamilyPolicies {
    pub fn get(&self, family: &[u8]) -> Result<ColumnFamilyPolicy> {
        self.by_name
            .get(family)
            .copied()
            .ok_or_else(|| Error::UnknownFamily(String::from_utf8_lossy(family).into_owned()))
    }

    pub fn families(&self) -> impl Iterator<Item = &[u8]> {
        self.by_name.keys().map(Vec::as_slice)
    }
}
