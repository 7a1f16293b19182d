//! The state tracker: last-known container handle per service name,
//! persisted as a JSON file so repeated invocations can recognize what
//! they already deployed.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use stevedore_core::{ContainerHandle, Error, LifecycleState, Result};

/// One persisted record per service name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub container_id: Option<String>,
    pub state: LifecycleState,
    pub image: String,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRecord {
    pub fn from_handle(handle: &ContainerHandle, image: &str) -> Self {
        Self {
            name: handle.name.clone(),
            container_id: handle.id.clone(),
            state: handle.state,
            image: image.to_string(),
            updated_at: Utc::now(),
        }
    }

    /// Rebuilds the tracked handle, e.g. for teardown after an interrupt.
    pub fn handle(&self) -> ContainerHandle {
        ContainerHandle {
            name: self.name.clone(),
            id: self.container_id.clone(),
            state: self.state,
        }
    }
}

/// Loads, queries and atomically rewrites the state file.
///
/// Accessed only by the orchestrator task; the file is the unit of
/// persistence, rewritten in full (temp file + rename) after every change so
/// a crash never leaves a half-written record.
#[derive(Debug)]
pub struct StateTracker {
    path: PathBuf,
    records: HashMap<String, ServiceRecord>,
}

impl StateTracker {
    /// Opens the tracker at `path`. A missing file is an empty tracker; a
    /// corrupt one is an error, so we never lose track of a running
    /// container by silently starting over.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::State(format!("corrupt state file {:?}: {}", path, e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&ServiceRecord> {
        self.records.get(name)
    }

    /// All records, sorted by name for stable listing.
    pub fn all(&self) -> Vec<&ServiceRecord> {
        let mut records: Vec<&ServiceRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Upserts the record for `handle` and writes the file.
    pub fn record(&mut self, handle: &ContainerHandle, image: &str) -> Result<()> {
        debug!("State: {} -> {}", handle.name, handle.state);
        self.records.insert(
            handle.name.clone(),
            ServiceRecord::from_handle(handle, image),
        );
        self.save()
    }

    /// Drops the record for `name` and writes the file.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        if self.records.remove(name).is_some() {
            self.save()?;
        }
        Ok(())
    }

    /// Writes atomically: serialize to a sibling temp file, fsync, rename.
    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| Error::State(format!("failed to serialize state: {}", e)))?;

        let temp_path = self.path.with_extension("tmp");
        let mut temp_file = std::fs::File::create(&temp_path)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.sync_all()?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
