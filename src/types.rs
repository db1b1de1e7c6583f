use std::fmt;

/// Raw row key bytes.
pub type Key = Vec<u8>;

/// Raw value bytes.
pub type Value = Vec<u8>;

/// Timestamp given to cells that are added without one. The job replaces it
/// with its write timestamp before records are partitioned.
pub const LATEST_TIMESTAMP: i64 = i64::MAX;

/// Name of a table in the target store, optionally namespaced
/// (`namespace:table`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        TableName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace part, or `None` for the default namespace.
    pub fn namespace(&self) -> Option<&str> {
        self.0.split_once(':').map(|(ns, _)| ns)
    }

    /// Qualifier part (the table name without its namespace).
    pub fn qualifier(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(_, q)| q)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single cell destined for the target store.
///
/// The row is the routing key: partitioning only ever looks at it. Family,
/// qualifier and timestamp take part in ordering only when the comparator
/// asks for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    row: Key,
    family: Vec<u8>,
    qualifier: Vec<u8>,
    timestamp: i64,
    value: Value,
}

impl Record {
    pub fn new(
        row: impl Into<Key>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: i64,
        value: impl Into<Value>,
    ) -> Self {
        Record {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            value: value.into(),
        }
    }

    pub fn row(&self) -> &[u8] {
        &self.row
    }

    pub fn family(&self) -> &[u8] {
        &self.family
    }

    pub fn qualifier(&self) -> &[u8] {
        &self.qualifier
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Copy of this record with `LATEST_TIMESTAMP` replaced by `ts`.
    pub(crate) fn with_write_timestamp(mut self, ts: i64) -> Self {
        if self.timestamp == LATEST_TIMESTAMP {
            self.timestamp = ts;
        }
        self
    }
}

/// A row mutation covering one or more column families.
///
/// Bulk-load input usually arrives as puts; each cell becomes its own
/// `Record` before partitioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    row: Key,
    cells: Vec<(Vec<u8>, Vec<u8>, i64, Value)>,
}

impl Put {
    pub fn new(row: impl Into<Key>) -> Self {
        Put {
            row: row.into(),
            cells: Vec::new(),
        }
    }

    /// Add a cell stamped at write time.
    pub fn add_column(
        self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        value: impl Into<Value>,
    ) -> Self {
        self.add_column_at(family, qualifier, LATEST_TIMESTAMP, value)
    }

    pub fn add_column_at(
        mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: i64,
        value: impl Into<Value>,
    ) -> Self {
        self.cells
            .push((family.into(), qualifier.into(), timestamp, value.into()));
        self
    }

    pub fn row(&self) -> &[u8] {
        &self.row
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Expand into one record per cell, in the order cells were added.
    pub fn into_records(self) -> Vec<Record> {
        let row = self.row;
        self.cells
            .into_iter()
            .map(|(family, qualifier, ts, value)| {
                Record::new(row.clone(), family, qualifier, ts, value)
            })
            .collect()
    }
}
