//! Backup stream format shared by every backend.
//!
//! A backup is the magic header followed by a flat sequence of records:
//! `key_len: u32 LE | key | value_len: u32 LE | value`. Only live entries are
//! written; deletions are not recorded, so restoring an incremental backup
//! on top of an older one never resurrects anything the older one lacks.

use std::io::{ErrorKind, Read, Write};

use crate::{KeyValueStore, StoreError};

pub const MAGIC: &[u8; 8] = b"TNGLBAK1";

const MAX_PART_LEN: usize = 64 * 1024 * 1024;

pub fn write_header(writer: &mut dyn Write) -> Result<(), StoreError> {
    writer.write_all(MAGIC)?;
    Ok(())
}

pub fn write_record(writer: &mut dyn Write, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
    for part in [key, value] {
        let len = u32::try_from(part.len())
            .map_err(|_| StoreError::Serialization(format!("record part of {} bytes", part.len())))?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(part)?;
    }
    Ok(())
}

/// Read every record of a backup stream.
pub fn read_records(reader: &mut dyn Read) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(StoreError::Corruption("backup header mismatch".into()));
    }

    let mut records = Vec::new();
    loop {
        let key = match read_part(reader) {
            Ok(key) => key,
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };
        let value = read_part(reader)?;
        records.push((key, value));
    }
    Ok(records)
}

/// Load a backup stream into `store`, overwriting existing keys.
pub fn restore(reader: &mut dyn Read, store: &dyn KeyValueStore) -> Result<usize, StoreError> {
    let records = read_records(reader)?;
    let count = records.len();
    for (key, value) in records {
        store.set(&key, &value)?;
    }
    Ok(count)
}

fn read_part(reader: &mut dyn Read) -> Result<Vec<u8>, StoreError> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_PART_LEN {
        return Err(StoreError::Corruption(format!("record part of {len} bytes")));
    }
    let mut part = vec![0u8; len];
    reader.read_exact(&mut part)?;
    Ok(part)
}
