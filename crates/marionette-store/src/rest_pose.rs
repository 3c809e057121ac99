//! Persistent rest pose
//!
//! The rest pose is the arms-down baseline overlaid under every emitted
//! frame so a clip that is silent about a bone does not leave the avatar
//! in the host's stiff reference T-pose. The built-in default rotates the
//! arms down from the T-pose; a captured pose replaces it on disk.

use std::fs;
use std::io;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, info};

use marionette_core::{Bone, BoneMap, MarionetteError, MarionetteResult, Quat, HIPS_BONE};

/// File name under the data root.
pub const REST_POSE_FILE: &str = "vmc_rest_pose.json";

/// Default rest pose: arm Z rotations only, identity implied elsewhere.
fn default_pose() -> BoneMap {
    let bone = |z: f32, w: f32| Bone::from_rotation(Quat::new(0.0, 0.0, z, w));
    BoneMap::from([
        ("LeftUpperArm".to_string(), bone(0.5736, 0.8192)), // ~70 deg Z
        ("RightUpperArm".to_string(), bone(-0.5736, 0.8192)),
        ("LeftLowerArm".to_string(), bone(0.0436, 0.9990)), // ~5 deg Z
        ("RightLowerArm".to_string(), bone(-0.0436, 0.9990)),
    ])
}

/// Process-wide rest pose with lazy load and atomic persistence.
pub struct RestPoseStore {
    path: PathBuf,
    pose: Mutex<Option<BoneMap>>,
}

impl RestPoseStore {
    /// Store backed by `<data_dir>/vmc_rest_pose.json`.
    pub fn new(data_dir: &std::path::Path) -> Self {
        RestPoseStore {
            path: data_dir.join(REST_POSE_FILE),
            pose: Mutex::new(None),
        }
    }

    /// Current rest pose. The file is read on first access; parse
    /// failures fall back silently to the built-in default.
    pub fn get(&self) -> BoneMap {
        let mut pose = self.pose.lock();
        pose.get_or_insert_with(|| self.load_from_disk()).clone()
    }

    fn load_from_disk(&self) -> BoneMap {
        match fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str::<BoneMap>(&text) {
                Ok(bones) => {
                    info!(bones = bones.len(), "loaded custom rest pose");
                    bones
                }
                Err(e) => {
                    debug!(error = %e, "rest pose file unparsable, using default");
                    default_pose()
                }
            },
            Err(_) => default_pose(),
        }
    }

    /// Replace the rest pose with captured bones and persist it.
    /// `Hips` is stripped so the pose can never move the avatar root.
    pub fn set(&self, bones: BoneMap) -> MarionetteResult<()> {
        let filtered: BoneMap = bones
            .into_iter()
            .filter(|(name, _)| name != HIPS_BONE)
            .collect();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| MarionetteError::Storage(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&filtered)
            .map_err(|e| MarionetteError::Storage(e.to_string()))?;

        // Write-then-rename keeps a reader from ever seeing a torn file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| MarionetteError::Storage(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| MarionetteError::Storage(e.to_string()))?;

        info!(bones = filtered.len(), "rest pose saved");
        *self.pose.lock() = Some(filtered);
        Ok(())
    }

    /// Revert to the default pose and delete the persisted file.
    pub fn reset(&self) -> MarionetteResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(MarionetteError::Storage(e.to_string())),
        }
        *self.pose.lock() = Some(default_pose());
        info!("rest pose reset to default");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_when_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = RestPoseStore::new(dir.path());
        let pose = store.get();
        assert_eq!(pose.len(), 4);
        assert!(pose.contains_key("LeftUpperArm"));
    }

    #[test]
    fn test_set_strips_hips_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = RestPoseStore::new(dir.path());

        let mut bones = BoneMap::new();
        bones.insert("Hips".to_string(), Bone::default());
        bones.insert("Head".to_string(), Bone::default());
        store.set(bones).unwrap();

        let pose = store.get();
        assert!(!pose.contains_key("Hips"));
        assert!(pose.contains_key("Head"));

        // A fresh store sees the persisted pose, not the default.
        let reloaded = RestPoseStore::new(dir.path());
        assert_eq!(reloaded.get().len(), 1);
    }

    #[test]
    fn test_reset_restores_default_and_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = RestPoseStore::new(dir.path());
        store.set(BoneMap::from([("Head".to_string(), Bone::default())])).unwrap();

        store.reset().unwrap();
        assert_eq!(store.get().len(), 4);
        assert!(!dir.path().join(REST_POSE_FILE).exists());
    }

    #[test]
    fn test_unparsable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(REST_POSE_FILE), "not json").unwrap();
        let store = RestPoseStore::new(dir.path());
        assert_eq!(store.get().len(), 4);
    }
}
