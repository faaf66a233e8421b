use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::RwLock;

use tracing::info;

use crate::error::AppError;

/// Monotonic set of (class, user) pairs for which a submission exists. Marks
/// are never cleared (a submission is never retracted); the set is snapshotted
/// at shutdown and restored at startup, and between snapshots it is only an
/// optimization — the store's submission rows stay authoritative.
pub struct SubmissionSet {
    set: RwLock<HashSet<(String, String)>>,
}

impl Default for SubmissionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionSet {
    pub fn new() -> Self {
        Self {
            set: RwLock::new(HashSet::new()),
        }
    }

    pub fn mark(&self, class_id: &str, user_id: &str) {
        self.set
            .write()
            .unwrap()
            .insert((class_id.to_string(), user_id.to_string()));
    }

    pub fn exists(&self, class_id: &str, user_id: &str) -> bool {
        self.set
            .read()
            .unwrap()
            .contains(&(class_id.to_string(), user_id.to_string()))
    }

    pub fn clear(&self) {
        self.set.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.set.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.read().unwrap().is_empty()
    }

    /// Replaces the set with the snapshot at `path`. A missing file is not
    /// an error: the process simply starts with an empty set.
    pub fn restore(&self, path: &Path) -> Result<(), AppError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no submission snapshot at {}", path.display());
                return Ok(());
            }
            Err(e) => return Err(AppError::Snapshot(e.to_string())),
        };
        let pairs: Vec<(String, String)> =
            bincode::deserialize(&bytes).map_err(|e| AppError::Snapshot(e.to_string()))?;
        let mut set = self.set.write().unwrap();
        *set = pairs.into_iter().collect();
        info!("restored {} submission marks from snapshot", set.len());
        Ok(())
    }

    /// Writes the whole set to `path`, overwriting any previous snapshot.
    pub fn persist(&self, path: &Path) -> Result<(), AppError> {
        let pairs: Vec<(String, String)> =
            self.set.read().unwrap().iter().cloned().collect();
        let bytes =
            bincode::serialize(&pairs).map_err(|e| AppError::Snapshot(e.to_string()))?;
        std::fs::write(path, bytes).map_err(|e| AppError::Snapshot(e.to_string()))?;
        info!("persisted {} submission marks to {}", pairs.len(), path.display());
        Ok(())
    }
}
