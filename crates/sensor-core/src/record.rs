//! On-disk client state record.
//!
//! Format: length (4 bytes, native endian) || payload. Zero-length state is
//! represented by the absence of the file.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut};
use tracing::{debug, warn};

use crate::errors::PersistenceError;

/// File name of the client state inside the storage directory.
pub const STATE_FILE_NAME: &str = "user-state-sensor.bin";

/// Width of the length field.
pub const LENGTH_FIELD_BYTES: usize = 4;

/// Encode a payload into a record.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, PersistenceError> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        PersistenceError::CorruptRecord(format!(
            "state of {} bytes does not fit the length field",
            payload.len()
        ))
    })?;
    let mut record = Vec::with_capacity(LENGTH_FIELD_BYTES + payload.len());
    record.put_u32_ne(len);
    record.extend_from_slice(payload);
    Ok(record)
}

/// Decode a complete record. The declared length must match the payload exactly.
pub fn decode(record: &[u8]) -> Result<Vec<u8>, PersistenceError> {
    if record.len() < LENGTH_FIELD_BYTES {
        return Err(PersistenceError::CorruptRecord(format!(
            "truncated length field: {} of {} bytes",
            record.len(),
            LENGTH_FIELD_BYTES
        )));
    }
    let mut buf = record;
    let declared = buf.get_u32_ne() as usize;
    if buf.remaining() != declared {
        return Err(PersistenceError::CorruptRecord(format!(
            "length field says {} bytes, found {}",
            declared,
            buf.remaining()
        )));
    }
    Ok(buf.to_vec())
}

/// Read the record at `path`. A missing file means no state.
pub fn read(path: &Path) -> Result<Option<Vec<u8>>, PersistenceError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let payload = decode(&raw)?;
    debug!("Read {} bytes of client state from {:?}", payload.len(), path);
    Ok(Some(payload))
}

/// Replace the record at `path`; an empty payload deletes it.
///
/// The record is written to a sibling temporary file, synced, and renamed
/// over the target, so a failed write leaves the previous record intact.
pub fn write(path: &Path, payload: &[u8]) -> Result<(), PersistenceError> {
    if payload.is_empty() {
        return remove(path);
    }
    let record = encode(payload)?;
    let tmp = temp_path(path);
    let result = write_synced(&tmp, &record).and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                warn!("Could not remove temporary state file {:?}: {}", tmp, cleanup);
            }
        }
        return Err(e.into());
    }
    debug!("Wrote {} bytes of client state to {:?}", payload.len(), path);
    Ok(())
}

/// Delete the record at `path`. Deleting a missing record succeeds.
pub fn remove(path: &Path) -> Result<(), PersistenceError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed client state file {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| STATE_FILE_NAME.into());
    name.push(".tmp");
    path.with_file_name(name)
}
