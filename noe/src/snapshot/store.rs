//! Atomic snapshot store
//!
//! One JSON record, written temp-file-then-fsync-then-rename so the
//! canonical file is always complete. The previous snapshot survives as
//! `.prev` and is the fallback when the canonical copy fails to parse.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    EngineState, Goal, Interest, LoopState, Pattern, Skill, Thought, WakeState,
};

/// Current on-disk schema
pub const SCHEMA_VERSION: SchemaVersion = SchemaVersion { major: 1, minor: 0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Condensed view of the hypergraph carried in snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypergraphSummary {
    pub node_count: usize,
    pub edge_count: usize,
    pub top_patterns: Vec<Pattern>,
}

/// Everything needed to resume the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreSnapshot {
    pub schema_version: SchemaVersion,
    pub taken_at: DateTime<Utc>,
    pub loop_state: LoopState,
    pub engine_states: Vec<EngineState>,
    pub wake_state: WakeState,
    pub goals: Vec<Goal>,
    pub skills: Vec<Skill>,
    pub interests: Vec<Interest>,
    pub recent_thoughts: Vec<Thought>,
    pub hypergraph_summary: HypergraphSummary,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("schema major version mismatch: found {found}, current {current}")]
    SchemaMismatch {
        found: SchemaVersion,
        current: SchemaVersion,
    },
}

/// How a load resolved
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Box<CoreSnapshot>),
    /// Canonical failed; `.prev` carried the day
    RecoveredFromPrev(Box<CoreSnapshot>),
    /// Neither file usable (or none present): start fresh
    Fresh,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn prev_path(&self) -> PathBuf {
        let mut p = self.path.as_os_str().to_owned();
        p.push(".prev");
        PathBuf::from(p)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut p = self.path.as_os_str().to_owned();
        p.push(".tmp");
        PathBuf::from(p)
    }

    /// Serialize, fsync a temp file in the same directory, then atomically
    /// replace the canonical snapshot (demoting it to `.prev` first)
    pub fn save(&self, snapshot: &CoreSnapshot) -> Result<(), SnapshotError> {
        debug!(path = %self.path.display(), "SnapshotStore::save");
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }

        if self.path.exists() {
            fs::rename(&self.path, self.prev_path())?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(bytes = bytes.len(), "snapshot written");
        Ok(())
    }

    /// Load canonical, falling back to `.prev`, falling back to fresh.
    /// Recovery paths are logged; a fresh start is never an error.
    pub fn load(&self) -> LoadOutcome {
        match self.read_one(&self.path) {
            Ok(Some(snapshot)) => return LoadOutcome::Loaded(Box::new(snapshot)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "canonical snapshot unusable, trying .prev"),
        }

        match self.read_one(&self.prev_path()) {
            Ok(Some(snapshot)) => {
                info!("recovered state from previous snapshot");
                LoadOutcome::RecoveredFromPrev(Box::new(snapshot))
            }
            Ok(None) => LoadOutcome::Fresh,
            Err(e) => {
                warn!(error = %e, "previous snapshot also unusable, starting fresh");
                LoadOutcome::Fresh
            }
        }
    }

    fn read_one(&self, path: &Path) -> Result<Option<CoreSnapshot>, SnapshotError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        Ok(Some(Self::migrate(value)?))
    }

    /// Minor-version forward migration: unknown fields are dropped and new
    /// fields take their serde defaults. A major mismatch refuses to load.
    fn migrate(value: serde_json::Value) -> Result<CoreSnapshot, SnapshotError> {
        let found: SchemaVersion = value
            .get("schema_version")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or(SchemaVersion { major: 0, minor: 0 });

        if found.major != SCHEMA_VERSION.major {
            return Err(SnapshotError::SchemaMismatch {
                found,
                current: SCHEMA_VERSION,
            });
        }
        if found.minor != SCHEMA_VERSION.minor {
            debug!(%found, current = %SCHEMA_VERSION, "minor version migration");
        }

        let mut snapshot: CoreSnapshot = serde_json::from_value(value)?;
        snapshot.schema_version = SCHEMA_VERSION;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EngineId, StepIdx, ThoughtKind, ThoughtSource};
    use std::time::Duration;
    use tempfile::tempdir;

    fn sample_snapshot() -> CoreSnapshot {
        CoreSnapshot {
            schema_version: SCHEMA_VERSION,
            taken_at: Utc::now(),
            loop_state: LoopState {
                cycle_count: 3,
                current_step: StepIdx::new(7).unwrap(),
                step_started_at: Utc::now(),
                step_duration: Duration::from_millis(100),
                fatigue: 0.25,
                coherence: 0.875,
            },
            engine_states: EngineId::ALL.map(EngineState::new).to_vec(),
            wake_state: WakeState::AwakeActive,
            goals: vec![Goal::new("map the cove", 0.7)],
            skills: vec![Skill::new("navigation", 0.5)],
            interests: vec![Interest::new("tide pools", 0.8, 0.01)],
            recent_thoughts: vec![Thought::new(
                ThoughtKind::Observation,
                ThoughtSource::Perception,
                "gulls",
            )],
            hypergraph_summary: HypergraphSummary {
                node_count: 12,
                edge_count: 20,
                top_patterns: Vec::new(),
            },
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path().join("core.json"));
        let snapshot = sample_snapshot();

        store.save(&snapshot).unwrap();
        match store.load() {
            LoadOutcome::Loaded(loaded) => assert_eq!(*loaded, snapshot),
            other => panic!("expected Loaded, got {:?}", other),
        }
    }

    #[test]
    fn test_numeric_fields_round_trip_exactly() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path().join("core.json"));
        let mut snapshot = sample_snapshot();
        snapshot.loop_state.fatigue = 0.1 + 0.2; // a classic float
        store.save(&snapshot).unwrap();

        let LoadOutcome::Loaded(loaded) = store.load() else {
            panic!("expected Loaded");
        };
        assert_eq!(loaded.loop_state.fatigue, snapshot.loop_state.fatigue);
        assert_eq!(loaded.loop_state.coherence, snapshot.loop_state.coherence);
    }

    #[test]
    fn test_snapshot_load_snapshot_is_byte_equal() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path().join("core.json"));
        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        let first_bytes = fs::read(store.path()).unwrap();

        let LoadOutcome::Loaded(loaded) = store.load() else {
            panic!("expected Loaded");
        };
        store.save(&loaded).unwrap();
        let second_bytes = fs::read(store.path()).unwrap();

        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn test_missing_files_start_fresh() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path().join("core.json"));
        assert!(matches!(store.load(), LoadOutcome::Fresh));
    }

    #[test]
    fn test_corrupt_canonical_falls_back_to_prev() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path().join("core.json"));
        let snapshot = sample_snapshot();

        store.save(&snapshot).unwrap(); // becomes .prev after next save
        store.save(&snapshot).unwrap();
        fs::write(store.path(), b"{ corrupted").unwrap();

        match store.load() {
            LoadOutcome::RecoveredFromPrev(loaded) => assert_eq!(*loaded, snapshot),
            other => panic!("expected RecoveredFromPrev, got {:?}", other),
        }
    }

    #[test]
    fn test_both_corrupt_starts_fresh() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path().join("core.json"));
        store.save(&sample_snapshot()).unwrap();
        store.save(&sample_snapshot()).unwrap();
        fs::write(store.path(), b"nope").unwrap();
        fs::write(store.prev_path(), b"also nope").unwrap();

        assert!(matches!(store.load(), LoadOutcome::Fresh));
    }

    #[test]
    fn test_major_mismatch_refuses_load() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path().join("core.json"));
        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();

        // Rewrite canonical with a bumped major version
        let mut value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        value["schema_version"]["major"] = serde_json::json!(99);
        fs::write(store.path(), serde_json::to_vec(&value).unwrap()).unwrap();

        // Canonical refused; .prev (same content, old version) absent here,
        // so the load comes up fresh
        assert!(matches!(store.load(), LoadOutcome::Fresh));
    }

    #[test]
    fn test_minor_version_forward_migration() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::new(temp.path().join("core.json"));
        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();

        // A future minor version with an extra unknown field still loads
        let mut value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        value["schema_version"]["minor"] = serde_json::json!(SCHEMA_VERSION.minor + 1);
        value["experimental_field"] = serde_json::json!({"ignored": true});
        fs::write(store.path(), serde_json::to_vec(&value).unwrap()).unwrap();

        match store.load() {
            LoadOutcome::Loaded(loaded) => {
                assert_eq!(loaded.schema_version, SCHEMA_VERSION);
                assert_eq!(loaded.loop_state.cycle_count, 3);
            }
            other => panic!("expected Loaded, got {:?}", other),
        }
    }
}
