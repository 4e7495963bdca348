use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Durable at-most-once bookkeeping. `processed_ids` only ever grows; a
/// re-run against the same state never reprocesses an id already present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessingState {
    #[serde(default)]
    pub processed_ids: BTreeSet<String>,
    #[serde(default)]
    pub last_message_id: Option<String>,
}

/// JSON-file persistence for ProcessingState. Concurrent runs against the
/// same file are unsafe; callers must serialize runs themselves.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "applog") {
            Ok(proj_dirs.data_dir().join("state.json"))
        } else {
            Ok(PathBuf::from("state.json"))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absent file means a fresh, empty state.
    pub fn load(&self) -> Result<ProcessingState> {
        if !self.path.exists() {
            return Ok(ProcessingState::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid state file: {}", self.path.display()))
    }

    pub fn save(&self, state: &ProcessingState) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> StateStore {
        let path = std::env::temp_dir().join(format!(
            "applog-state-{}-{}.json",
            std::process::id(),
            tag
        ));
        let _ = std::fs::remove_file(&path);
        StateStore::new(path)
    }

    #[test]
    fn test_missing_file_loads_empty_state() {
        let store = temp_store("missing");
        let state = store.load().unwrap();
        assert!(state.processed_ids.is_empty());
        assert!(state.last_message_id.is_none());
    }

    #[test]
    fn test_round_trip() {
        let store = temp_store("roundtrip");
        let mut state = ProcessingState::default();
        state.processed_ids.insert("m1".to_string());
        state.processed_ids.insert("m2".to_string());
        state.last_message_id = Some("m2".to_string());

        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn test_state_file_shape_is_stable() {
        let mut state = ProcessingState::default();
        state.processed_ids.insert("m1".to_string());
        state.last_message_id = Some("m1".to_string());

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"processed_ids\":[\"m1\"]"));
        assert!(json.contains("\"last_message_id\":\"m1\""));
    }
}
