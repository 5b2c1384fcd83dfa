//! Local State Storage
//!
//! Small JSON files kept in the data directory:
//! - the profile handoff, a one-shot copy of a Profile passed between flows
//! - pending tip records whose transfer went through but whose record call
//!   did not confirm

use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::registry::Profile;
use crate::tip::PendingRecord;

/// Handoff file name inside the data directory
const HANDOFF_FILE: &str = "profile_handoff.json";

/// Pending record file name inside the data directory
const PENDING_FILE: &str = "pending_records.json";

/// Write JSON with owner-only permissions, creating parent directories
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(value).map_err(|e| Error::Storage(e.to_string()))?;

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(json.as_bytes())?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, json)?;
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json)
        .map_err(|e| Error::Storage(format!("failed to parse {}: {}", path.display(), e)))
}

/// One-shot Profile handoff between flows
#[derive(Debug, Clone)]
pub struct ProfileHandoff {
    path: PathBuf,
}

impl ProfileHandoff {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(HANDOFF_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a profile, replacing any previous handoff
    pub fn put(&self, profile: &Profile) -> Result<()> {
        write_json(&self.path, profile)?;
        debug!("Stored profile handoff for '{}'", profile.username);
        Ok(())
    }

    /// Read and remove the handoff. An unreadable handoff is removed and
    /// reported as absent.
    pub fn take(&self) -> Option<Profile> {
        if !self.path.exists() {
            return None;
        }

        let profile = match read_json::<Profile>(&self.path) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("Discarding unreadable profile handoff: {}", e);
                None
            }
        };

        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove profile handoff: {}", e);
        }
        profile
    }
}

/// Persisted records awaiting a retry of the record step
#[derive(Debug, Clone)]
pub struct PendingRecordStore {
    path: PathBuf,
}

impl PendingRecordStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PENDING_FILE),
        }
    }

    /// All pending records, oldest first
    pub fn load(&self) -> Result<Vec<PendingRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_json(&self.path)
    }

    pub fn push(&self, record: PendingRecord) -> Result<()> {
        let mut records = self.load()?;
        records.push(record);
        write_json(&self.path, &records)
    }

    /// Drop the record for a transfer once its record call confirmed
    pub fn remove(&self, transfer_tx: &str) -> Result<()> {
        let mut records = self.load()?;
        records.retain(|r| r.transfer_tx != transfer_tx);
        if records.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        write_json(&self.path, &records)
    }
}
