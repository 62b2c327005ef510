//! JSON file state store
//!
//! One file per run in the state directory:
//! - `<run_id>.json` is the durable state
//! - `<run_id>.backup.json` is the previous durable state
//! - `<run_id>.json.tmp` is a save in progress and is never read

use crate::state::CrawlState;
use crate::storage::traits::{StateStore, StorageError, StorageResult};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const STATE_SUFFIX: &str = ".json";
const BACKUP_SUFFIX: &str = ".backup.json";
const TEMP_SUFFIX: &str = ".json.tmp";

/// State store backed by JSON files in a directory
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    /// Opens a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the durable state file for `run_id`
    pub fn state_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", run_id, STATE_SUFFIX))
    }

    /// Path of the backup state file for `run_id`
    pub fn backup_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", run_id, BACKUP_SUFFIX))
    }

    fn temp_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", run_id, TEMP_SUFFIX))
    }

    /// Run ids that have a durable state file, in no particular order
    pub fn run_ids(&self) -> StorageResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(BACKUP_SUFFIX) {
                continue;
            }
            if let Some(run_id) = name.strip_suffix(STATE_SUFFIX) {
                ids.push(run_id.to_string());
            }
        }
        Ok(ids)
    }
}

/// Reads and checks one state file
fn read_state(path: &Path, run_id: &str) -> StorageResult<CrawlState> {
    let bytes = fs::read(path)?;
    let state: CrawlState = serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    if state.run_id != run_id {
        return Err(StorageError::Corrupt {
            path: path.display().to_string(),
            reason: format!("file holds run '{}'", state.run_id),
        });
    }

    state
        .check_consistency()
        .map_err(|reason| StorageError::Corrupt {
            path: path.display().to_string(),
            reason,
        })?;

    Ok(state)
}

fn is_not_found(err: &StorageError) -> bool {
    matches!(err, StorageError::Io(e) if e.kind() == ErrorKind::NotFound)
}

fn remove_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl StateStore for JsonStateStore {
    fn load(&self, run_id: &str) -> StorageResult<Option<CrawlState>> {
        let primary = self.state_path(run_id);
        let primary_err = match read_state(&primary, run_id) {
            Ok(state) => return Ok(Some(state)),
            Err(e) => e,
        };

        let backup = self.backup_path(run_id);
        if !backup.exists() {
            if is_not_found(&primary_err) {
                debug!("No stored state for run {}", run_id);
                return Ok(None);
            }
            return Err(primary_err);
        }

        warn!(
            "Falling back to backup state for run {}: {}",
            run_id, primary_err
        );
        read_state(&backup, run_id).map(Some)
    }

    fn save(&mut self, state: &CrawlState) -> StorageResult<()> {
        let encoded = serde_json::to_vec_pretty(state)?;

        let state_path = self.state_path(&state.run_id);
        if state_path.exists() {
            fs::copy(&state_path, self.backup_path(&state.run_id))?;
        }

        // Write atomically using temp file
        let temp_path = self.temp_path(&state.run_id);
        let mut file = File::create(&temp_path)?;
        file.write_all(&encoded)?;
        file.sync_all()?;

        fs::rename(&temp_path, &state_path)?;
        debug!("Saved state for run {} to {}", state.run_id, state_path.display());
        Ok(())
    }

    fn latest_incomplete_run(&self) -> StorageResult<Option<String>> {
        let mut latest: Option<CrawlState> = None;

        for run_id in self.run_ids()? {
            let state = match self.load(&run_id) {
                Ok(Some(state)) => state,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping unreadable state for run {}: {}", run_id, e);
                    continue;
                }
            };

            if state.is_completed {
                continue;
            }

            let newer = latest
                .as_ref()
                .map_or(true, |l| state.last_updated_at > l.last_updated_at);
            if newer {
                latest = Some(state);
            }
        }

        Ok(latest.map(|s| s.run_id))
    }

    fn remove(&mut self, run_id: &str) -> StorageResult<()> {
        remove_if_exists(&self.state_path(run_id))?;
        remove_if_exists(&self.backup_path(run_id))?;
        remove_if_exists(&self.temp_path(run_id))?;
        Ok(())
    }
}
