//! JSON state file holding the snapshots of persisted entities.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use temporary_entities::{EntityId, EntityRegistry, EntitySnapshot, RegistryError};

use crate::types::{McpError, McpResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    entities: BTreeMap<String, Value>,
}

/// On-disk snapshots, keyed by entity id.
///
/// Entries are kept raw so one corrupt entry only affects its own entity.
/// Also serves as the manager's external registry: removing an entity
/// drops its entry from disk immediately.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

impl SnapshotStore {
    /// Open the state file, creating its directory if needed. A missing or
    /// empty file is an empty store; an unreadable one is an error.
    pub fn open(path: impl AsRef<Path>) -> McpResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| McpError::Storage(format!("Failed to read {}: {e}", path.display())))?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                let state: StateFile = serde_json::from_str(&text).map_err(|e| {
                    McpError::Storage(format!("Corrupt state file {}: {e}", path.display()))
                })?;
                state.entities
            }
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    McpError::Storage(format!("Failed to create directory {}: {e}", parent.display()))
                })?;
            }
            BTreeMap::new()
        };

        tracing::info!("Opened state file {} with {} entities", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw persisted entries as `(id, snapshot)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(id, raw)| (id.as_str(), raw))
    }

    /// Replace every entry with `snapshots`.
    pub fn replace(&mut self, snapshots: Vec<EntitySnapshot>) {
        self.entries = snapshots
            .into_iter()
            .map(|snapshot| (snapshot.id.to_string(), snapshot.to_value()))
            .collect();
    }

    /// Write the file atomically: a temp file next to it, then rename.
    pub fn save(&self) -> McpResult<()> {
        let state = StateFile {
            entities: self.entries.clone(),
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &state)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path)
            .map_err(|e| McpError::Storage(format!("Failed to write {}: {e}", self.path.display())))?;

        tracing::debug!("Saved {} entities to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}

impl EntityRegistry for SnapshotStore {
    fn deregister(&mut self, id: &EntityId) -> Result<(), RegistryError> {
        if self.entries.remove(id.as_str()).is_none() {
            return Ok(());
        }
        self.save().map_err(|e| RegistryError(e.to_string()))
    }
}
