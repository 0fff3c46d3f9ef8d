//! Keyframe timeline persistence.
//!
//! Timelines are written as `{output_dir}/blendshapes-{id}.json`, the pretty
//! printed JSON array the avatar client fetches. Writes are atomic (temp file
//! + fsync + rename) so a client never reads a half-written file.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{Result, VisemeError};
use crate::viseme::Timeline;

const FILE_PREFIX: &str = "blendshapes-";
const FILE_SUFFIX: &str = ".json";

/// Persists timelines and hands back a retrieval handle.
pub trait KeyframeStore: Send + Sync {
    /// Persist `timeline` under `id` and return its retrieval handle.
    ///
    /// # Errors
    ///
    /// Returns [`VisemeError::Store`] if the timeline cannot be written.
    fn save(&self, timeline: &Timeline, id: &str) -> Result<String>;
}

/// Generate a collision-free request id.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Filesystem-backed keyframe store.
#[derive(Debug, Clone)]
pub struct FsKeyframeStore {
    output_dir: PathBuf,
    url_prefix: String,
}

impl FsKeyframeStore {
    /// Create a store, creating `output_dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`VisemeError::Store`] if the directory cannot be created.
    pub fn new(output_dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|e| {
            VisemeError::Store(format!(
                "failed to create output directory {}: {e}",
                output_dir.display()
            ))
        })?;
        Ok(Self {
            output_dir,
            url_prefix: url_prefix.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Create a store from configuration.
    ///
    /// # Errors
    ///
    /// Same as [`FsKeyframeStore::new`].
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::new(&config.output_dir, config.url_prefix.clone())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn file_name(id: &str) -> String {
        format!("{FILE_PREFIX}{id}{FILE_SUFFIX}")
    }

    /// Path of the file holding timeline `id`.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.output_dir.join(Self::file_name(id))
    }

    /// Retrieval handle for timeline `id`, e.g. `/blendshapes-<id>.json`.
    pub fn handle_for(&self, id: &str) -> String {
        format!("{}/{}", self.url_prefix, Self::file_name(id))
    }

    /// Read timeline `id` back, validating its invariants.
    ///
    /// # Errors
    ///
    /// Returns [`VisemeError::Store`] if the file is missing or not a valid timeline.
    pub fn load(&self, id: &str) -> Result<Timeline> {
        let path = self.path_for(id);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            VisemeError::Store(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            VisemeError::Store(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Remove keyframe files last modified more than `max_age` ago.
    ///
    /// Returns the number of files removed. Files that cannot be inspected
    /// or removed are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`VisemeError::Store`] if the output directory cannot be listed.
    pub fn prune_older_than(&self, max_age: Duration) -> Result<usize> {
        let entries = std::fs::read_dir(&self.output_dir).map_err(|e| {
            VisemeError::Store(format!(
                "failed to list {}: {e}",
                self.output_dir.display()
            ))
        })?;

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)) {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            let Some(age) = age else {
                continue;
            };
            if age <= max_age {
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!("failed to remove {}: {e}", entry.path().display()),
            }
        }

        if removed > 0 {
            info!(
                "pruned {removed} keyframe files from {}",
                self.output_dir.display()
            );
        }
        Ok(removed)
    }

    fn write_atomic(&self, id: &str, json: &str) -> Result<PathBuf> {
        let path = self.path_for(id);
        let tmp_path = self.output_dir.join(format!(".{id}.tmp"));
        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| {
            VisemeError::Store(format!(
                "failed to write temp file {}: {e}",
                tmp_path.display()
            ))
        })?;

        if let Ok(file) = std::fs::File::open(&tmp_path) {
            let _ = file.sync_all();
        }

        std::fs::rename(&tmp_path, &path).map_err(|e| {
            VisemeError::Store(format!(
                "failed to rename temp file to {}: {e}",
                path.display()
            ))
        })?;
        Ok(path)
    }
}

impl KeyframeStore for FsKeyframeStore {
    fn save(&self, timeline: &Timeline, id: &str) -> Result<String> {
        if id.is_empty() || id.contains(['/', '\\', '.']) {
            return Err(VisemeError::Store(format!("invalid timeline id: {id:?}")));
        }
        let json = serde_json::to_string_pretty(timeline)
            .map_err(|e| VisemeError::Store(format!("failed to serialize timeline: {e}")))?;
        let path = self.write_atomic(id, &json)?;
        debug!(
            "wrote {} keyframes to {}",
            timeline.len(),
            path.display()
        );
        Ok(self.handle_for(id))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::phoneme::{PhonemeSequence, TimedPhoneme};
    use crate::viseme::TimelineSynthesizer;

    fn sample_timeline() -> Timeline {
        let seq = PhonemeSequence::Timed(vec![
            TimedPhoneme::new("tS", 80),
            TimedPhoneme::new("a", 120),
        ]);
        TimelineSynthesizer::default()
            .synthesize(&seq, 0.2)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn save_writes_file_and_returns_handle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyframeStore::new(dir.path(), "").unwrap();
        let handle = store.save(&sample_timeline(), "abc123").unwrap();

        assert_eq!(handle, "/blendshapes-abc123.json");
        assert!(dir.path().join("blendshapes-abc123.json").exists());
        assert!(!dir.path().join(".abc123.tmp").exists());
    }

    #[test]
    fn url_prefix_is_joined_without_double_slash() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyframeStore::new(dir.path(), "https://cdn.example/avatar/").unwrap();
        assert_eq!(
            store.handle_for("x1"),
            "https://cdn.example/avatar/blendshapes-x1.json"
        );
    }

    #[test]
    fn saved_timeline_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyframeStore::new(dir.path(), "").unwrap();
        let timeline = sample_timeline();
        store.save(&timeline, "roundtrip").unwrap();

        let loaded = store.load("roundtrip").unwrap();
        assert_eq!(loaded.len(), timeline.len());
        assert_eq!(loaded.duration(), 0.2);
    }

    #[test]
    fn persisted_format_is_array_of_time_and_blendshapes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyframeStore::new(dir.path(), "").unwrap();
        store.save(&sample_timeline(), "format").unwrap();

        let raw = std::fs::read_to_string(store.path_for("format")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        for frame in value.as_array().unwrap() {
            let obj = frame.as_object().unwrap();
            assert_eq!(obj.len(), 2);
            assert!(obj["time"].is_number());
            assert_eq!(obj["blendshapes"].as_object().unwrap().len(), 55);
        }
    }

    #[test]
    fn load_rejects_invalid_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyframeStore::new(dir.path(), "").unwrap();
        std::fs::write(store.path_for("bad"), "[]").unwrap();
        let err = store.load("bad").unwrap_err();
        assert!(matches!(err, VisemeError::Store(_)));
    }

    #[test]
    fn save_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyframeStore::new(dir.path(), "").unwrap();
        for id in ["", "../escape", "a/b", "x.y"] {
            assert!(store.save(&sample_timeline(), id).is_err(), "{id}");
        }
    }

    #[test]
    fn prune_removes_only_old_keyframe_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyframeStore::new(dir.path(), "").unwrap();
        store.save(&sample_timeline(), "old").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(store.prune_older_than(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(store.prune_older_than(Duration::from_millis(1)).unwrap(), 1);
        assert!(!store.path_for("old").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn request_ids_are_unique_and_file_safe() {
        let a = new_request_id();
        let b = new_request_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
