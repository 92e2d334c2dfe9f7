//! Persistence for the blocked set and named presets.
//!
//! The engine treats this store as an external collaborator: load failures
//! of any kind degrade to an empty state, never a crash, so a corrupt or
//! missing file can at worst forget bookkeeping that the next
//! reconciliation rebuilds.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::EngineError;
use crate::models::{BlockedSet, Preset};

const BLOCKED_FILE: &str = "blocked.json";
const PRESETS_FILE: &str = "presets.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct BlockedState {
    #[serde(default)]
    codes: BTreeSet<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PresetFile {
    #[serde(default)]
    presets: Vec<Preset>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// File-backed state store under the config directory.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn blocked_path(&self) -> PathBuf {
        self.dir.join(BLOCKED_FILE)
    }

    fn presets_path(&self) -> PathBuf {
        self.dir.join(PRESETS_FILE)
    }

    fn load_json<T: Default + for<'de> Deserialize<'de>>(&self, path: &Path) -> T {
        if !path.exists() {
            return T::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(value) => value,
                Err(err) => {
                    warn!("Ignoring corrupt state file {}: {}", path.display(), err);
                    T::default()
                }
            },
            Err(err) => {
                warn!("Cannot read state file {}: {}", path.display(), err);
                T::default()
            }
        }
    }

    fn save_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), EngineError> {
        let write = || -> anyhow::Result<()> {
            std::fs::create_dir_all(&self.dir)
                .with_context(|| format!("Failed to create state dir {}", self.dir.display()))?;
            let content = serde_json::to_string_pretty(value)?;
            let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
            temp.write_all(content.as_bytes())?;
            temp.flush()?;
            temp.persist(path)?;
            Ok(())
        };
        write().map_err(|err| EngineError::PersistenceUnavailable(format!("{:#}", err)))
    }

    /// The persisted blocked set; missing or corrupt state loads as empty.
    pub fn load_blocked(&self) -> BlockedSet {
        let state: BlockedState = self.load_json(&self.blocked_path());
        state.codes.into_iter().collect()
    }

    pub fn save_blocked(&self, blocked: &BlockedSet) -> Result<(), EngineError> {
        let state = BlockedState {
            codes: blocked.codes().clone(),
            updated_at: Some(Utc::now()),
        };
        self.save_json(&self.blocked_path(), &state)
    }

    pub fn load_presets(&self) -> Vec<Preset> {
        let file: PresetFile = self.load_json(&self.presets_path());
        file.presets
    }

    pub fn get_preset(&self, name: &str) -> Option<Preset> {
        self.load_presets().into_iter().find(|p| p.name == name)
    }

    /// Save a preset, replacing any existing preset with the same name.
    /// Returns whether the preset was newly created.
    pub fn add_preset(&self, preset: Preset) -> Result<bool, EngineError> {
        let mut presets = self.load_presets();
        let existed = presets.iter().any(|p| p.name == preset.name);
        presets.retain(|p| p.name != preset.name);
        presets.push(preset);
        presets.sort_by(|a, b| a.name.cmp(&b.name));
        self.save_presets(&presets)?;
        Ok(!existed)
    }

    /// Delete a preset by name; returns whether it existed.
    pub fn delete_preset(&self, name: &str) -> Result<bool, EngineError> {
        let mut presets = self.load_presets();
        let before = presets.len();
        presets.retain(|p| p.name != name);
        if presets.len() == before {
            return Ok(false);
        }
        self.save_presets(&presets)?;
        Ok(true)
    }

    fn save_presets(&self, presets: &[Preset]) -> Result<(), EngineError> {
        let file = PresetFile {
            presets: presets.to_vec(),
            updated_at: Some(Utc::now()),
        };
        self.save_json(&self.presets_path(), &file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[test]
    fn test_blocked_roundtrip() {
        let (_dir, store) = store();
        let mut blocked = BlockedSet::new();
        blocked.insert("sgp");
        blocked.insert("hkg");

        store.save_blocked(&blocked).unwrap();
        assert_eq!(store.load_blocked(), blocked);
    }

    #[test]
    fn test_missing_blocked_loads_empty() {
        let (_dir, store) = store();
        assert!(store.load_blocked().is_empty());
    }

    #[test]
    fn test_corrupt_blocked_loads_empty() {
        let (dir, store) = store();
        std::fs::write(dir.path().join(BLOCKED_FILE), "}{ nonsense").unwrap();
        assert!(store.load_blocked().is_empty());
    }

    #[test]
    fn test_preset_crud() {
        let (_dir, store) = store();
        let preset = Preset {
            name: "asia-only".to_string(),
            servers: vec!["sgp".to_string(), "hkg".to_string()],
            clustered: false,
        };

        assert!(store.add_preset(preset.clone()).unwrap());
        assert_eq!(store.get_preset("asia-only"), Some(preset.clone()));

        // Replacing an existing preset reports not-created.
        let mut updated = preset;
        updated.servers.push("tyo".to_string());
        assert!(!store.add_preset(updated.clone()).unwrap());
        assert_eq!(store.get_preset("asia-only"), Some(updated));

        assert!(store.delete_preset("asia-only").unwrap());
        assert!(!store.delete_preset("asia-only").unwrap());
        assert!(store.load_presets().is_empty());
    }

    #[test]
    fn test_presets_sorted_by_name() {
        let (_dir, store) = store();
        for name in ["zulu", "alpha", "mike"] {
            store
                .add_preset(Preset {
                    name: name.to_string(),
                    servers: vec![],
                    clustered: false,
                })
                .unwrap();
        }
        let names: Vec<String> = store.load_presets().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["alpha", "mike", "zulu"]);
    }

    #[test]
    fn test_save_into_missing_dir_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deep").join("state");
        let store = StateStore::new(nested);
        let mut blocked = BlockedSet::new();
        blocked.insert("sgp");
        store.save_blocked(&blocked).unwrap();
        assert_eq!(store.load_blocked(), blocked);
    }
}
