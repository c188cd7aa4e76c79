use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::airports::AirportReference;
use crate::errors::{DepartureError, Result};

const MAGIC_BYTES: &[u8; 8] = b"BUSYAPT1";
/// Magic bytes followed by the payload CRC32
const HEADER_SIZE: usize = 12;

/// File-backed snapshot of every resolved airport reference.
///
/// Layout: `MAGIC (8) | crc32(payload) (4, LE) | bincode(BTreeMap<String, AirportReference>)`.
/// The whole map is read and written as one unit; a write goes to a unique `<path>.<id>.tmp` and is
/// renamed into place so readers never observe a half-written store.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    path: PathBuf,
}

impl ReferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored references.
    ///
    /// Returns `Ok(None)` when no store exists yet. Any other failure, including a store
    /// that exists but cannot be decoded, is an error and must not be partially trusted.
    pub fn load(&self) -> Result<Option<BTreeMap<String, AirportReference>>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No airport reference store at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let references = self.decode(&bytes)?;
        info!(
            "Loaded {} airport references from {:?}",
            references.len(),
            self.path
        );
        Ok(Some(references))
    }

    /// Write the full set of references, replacing any previous store
    pub fn save(&self, references: &BTreeMap<String, AirportReference>) -> Result<()> {
        let payload = bincode::serialize(references).map_err(|e| {
            DepartureError::Io(std::io::Error::other(format!(
                "failed to encode airport references: {}",
                e
            )))
        })?;
        let checksum = crc32fast::hash(&payload);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(MAGIC_BYTES);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        bytes.extend_from_slice(&payload);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.tmp_path();
        std::fs::write(&tmp_path, &bytes)?;
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(
            "Saved {} airport references ({} bytes) to {:?}",
            references.len(),
            bytes.len(),
            self.path
        );
        Ok(())
    }

    /// Unique per save, so concurrent writers never rename each other's file
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        PathBuf::from(name)
    }

    fn corrupt(&self, reason: impl Into<String>) -> DepartureError {
        DepartureError::StoreCorrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<BTreeMap<String, AirportReference>> {
        if bytes.len() < HEADER_SIZE {
            return Err(self.corrupt(format!("truncated header ({} bytes)", bytes.len())));
        }
        if &bytes[0..8] != MAGIC_BYTES {
            return Err(self.corrupt("invalid magic bytes"));
        }

        let expected_checksum = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let payload = &bytes[HEADER_SIZE..];
        let actual_checksum = crc32fast::hash(payload);
        if actual_checksum != expected_checksum {
            return Err(self.corrupt(format!(
                "checksum mismatch (expected {:08x}, got {:08x})",
                expected_checksum, actual_checksum
            )));
        }

        let references: BTreeMap<String, AirportReference> = bincode::deserialize(payload)
            .map_err(|e| self.corrupt(format!("undecodable payload: {}", e)))?;

        for (key, reference) in &references {
            reference
                .validate()
                .map_err(|e| self.corrupt(format!("invalid record {}: {}", key, e)))?;
        }

        Ok(references)
    }
}
