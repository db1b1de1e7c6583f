use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::comparator::KeyComparator;
use crate::error::{Error, Result};
use crate::region::PartitionBoundaries;

/// The boundary list a job partitioned by, persisted next to its output.
///
/// On-disk format, one framed record after another:
/// ```text
/// ┌──────────┬─────────┬──────────┬────────────┬───────────┬─────────────┐
/// │ CRC (4B) │ Len (4B)│ Type (1B)│ Key Len(4B)│ Key (var) │ Value (var) │
/// └──────────┴─────────┴──────────┴────────────┴───────────┴─────────────┘
/// ```
/// The CRC covers everything after itself. The first record names the
/// comparator, then one record per start key (value = region index, u32 LE),
/// then an optional limit record. A plan must be complete: any bad record
/// fails the load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub comparator: KeyComparator,
    pub boundaries: PartitionBoundaries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanRecordType {
    Comparator = 0x01,
    Boundary = 0x02,
    Limit = 0x03,
}

impl PlanRecordType {
    fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(PlanRecordType::Comparator),
            0x02 => Ok(PlanRecordType::Boundary),
            0x03 => Ok(PlanRecordType::Limit),
            _ => Err(Error::Corruption(format!("invalid plan record type: {byte}"))),
        }
    }
}

#[derive(Debug)]
struct PlanRecord {
    record_type: PlanRecordType,
    key: Vec<u8>,
    value: Vec<u8>,
}

const CRC_SIZE: usize = 4;
const LEN_SIZE: usize = 4;
const TYPE_SIZE: usize = 1;
const KEY_LEN_SIZE: usize = 4;
const HEADER_SIZE: usize = CRC_SIZE + LEN_SIZE + TYPE_SIZE + KEY_LEN_SIZE;

impl PlanRecord {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        let payload_len = TYPE_SIZE + KEY_LEN_SIZE + self.key.len() + self.value.len();

        buf.extend_from_slice(&[0u8; CRC_SIZE]);
        buf.extend_from_slice(&(payload_len as u32).to_le_bytes());
        buf.push(self.record_type as u8);
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&buf[start + CRC_SIZE..]);
        buf[start..start + CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
    }

    /// Decode one record; returns it with the number of bytes consumed.
    fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Corruption("plan record too short".into()));
        }
        let stored_crc = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let payload_len = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;

        let total_len = CRC_SIZE + LEN_SIZE + payload_len;
        if payload_len < TYPE_SIZE + KEY_LEN_SIZE || data.len() < total_len {
            return Err(Error::Corruption("plan record truncated".into()));
        }
        if crc32fast::hash(&data[CRC_SIZE..total_len]) != stored_crc {
            return Err(Error::Corruption("plan record CRC mismatch".into()));
        }

        let mut offset = CRC_SIZE + LEN_SIZE;
        let record_type = PlanRecordType::from_u8(data[offset])?;
        offset += TYPE_SIZE;

        let key_len = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
        offset += KEY_LEN_SIZE;
        if offset + key_len > total_len {
            return Err(Error::Corruption("key length exceeds plan record".into()));
        }
        let key = data[offset..offset + key_len].to_vec();
        offset += key_len;
        let value = data[offset..total_len].to_vec();

        Ok((
            PlanRecord {
                record_type,
                key,
                value,
            },
            total_len,
        ))
    }
}

impl PartitionPlan {
    pub fn new(comparator: KeyComparator, boundaries: PartitionBoundaries) -> Self {
        PartitionPlan {
            comparator,
            boundaries,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        PlanRecord {
            record_type: PlanRecordType::Comparator,
            key: self.comparator.to_descriptor().into_bytes(),
            value: Vec::new(),
        }
        .encode_into(&mut buf);

        for (key, region) in self
            .boundaries
            .start_keys()
            .iter()
            .zip(self.boundaries.region_indices())
        {
            PlanRecord {
                record_type: PlanRecordType::Boundary,
                key: key.clone(),
                value: (*region as u32).to_le_bytes().to_vec(),
            }
            .encode_into(&mut buf);
        }

        if let Some(limit) = self.boundaries.limit() {
            PlanRecord {
                record_type: PlanRecordType::Limit,
                key: limit.to_vec(),
                value: Vec::new(),
            }
            .encode_into(&mut buf);
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let mut comparator = None;
        let mut start_keys = Vec::new();
        let mut region_indices = Vec::new();
        let mut limit = None;

        while offset < data.len() {
            let (record, used) = PlanRecord::decode(&data[offset..])?;
            offset += used;

            match record.record_type {
                PlanRecordType::Comparator => {
                    if comparator.is_some() {
                        return Err(Error::Corruption("plan names two comparators".into()));
                    }
                    let descriptor = String::from_utf8(record.key)
                        .map_err(|_| Error::Corruption("comparator descriptor is not utf-8".into()))?;
                    comparator = Some(KeyComparator::from_descriptor(&descriptor)?);
                }
                PlanRecordType::Boundary => {
                    if limit.is_some() {
                        return Err(Error::Corruption("boundary after plan limit".into()));
                    }
                    let region: [u8; 4] = record
                        .value
                        .as_slice()
                        .try_into()
                        .map_err(|_| Error::Corruption("bad region index in plan".into()))?;
                    start_keys.push(record.key);
                    region_indices.push(u32::from_le_bytes(region) as usize);
                }
                PlanRecordType::Limit => limit = Some(record.key),
            }
        }

        let comparator =
            comparator.ok_or_else(|| Error::Corruption("plan has no comparator record".into()))?;
        let boundaries =
            PartitionBoundaries::with_region_indices(start_keys, region_indices, limit, &comparator)
                .map_err(|e| Error::Corruption(format!("invalid plan boundaries: {e}")))?;
        Ok(PartitionPlan {
            comparator,
            boundaries,
        })
    }

    /// Write the plan to `path`, fsynced.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(&self.encode())?;
        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::decode(&fs::read(path)?)
    }
}
