use log::{debug, warn};

use crate::comparator::KeyComparator;
use crate::error::{Error, Result};
use crate::region::PartitionBoundaries;
use crate::store::TableAdmin;
use crate::types::TableName;

/// Snapshot the table's current region start keys as partition boundaries.
///
/// The result is sorted, deduplicated and starts at the empty key, so it
/// covers the whole key space. Any failure to read the region table, or an
/// empty region table, is `MetadataUnavailable`. There is no retry here.
pub fn resolve_boundaries(
    admin: &dyn TableAdmin,
    table: &TableName,
    comparator: &KeyComparator,
) -> Result<PartitionBoundaries> {
    let unavailable = |reason: String| Error::MetadataUnavailable {
        table: table.to_string(),
        reason,
    };

    let mut start_keys = admin.region_start_keys(table).map_err(|e| {
        warn!("cannot read regions of {table}: {e}");
        unavailable(e.to_string())
    })?;
    if start_keys.is_empty() {
        return Err(unavailable("table reports no regions".into()));
    }

    start_keys.sort_by(|a, b| comparator.compare_rows(a, b));
    start_keys.dedup();
    if start_keys.first().is_some_and(|k| !k.is_empty()) {
        start_keys.insert(0, Vec::new());
    }

    debug!("resolved {} region boundaries for {table}", start_keys.len());
    PartitionBoundaries::new(start_keys, comparator).map_err(|e| unavailable(e.to_string()))
}
