//! JSON preset storage
//!
//! A flat directory of `<name>.json` documents. Names are trusted here;
//! the REST layer sanitizes user input before it reaches the store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use marionette_core::{ClipMode, Frame, MarionetteError, MarionetteResult, Preset};

/// Directory name under the data root.
pub const PRESETS_DIR: &str = "vmc_presets";

/// Listing entry: everything but the frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetSummary {
    pub name: String,
    pub duration_ms: u64,
    pub frame_count: usize,
    pub mode: ClipMode,
}

/// Flat-directory preset store.
pub struct PresetStore {
    dir: PathBuf,
}

impl PresetStore {
    /// Store rooted at `<data_dir>/vmc_presets`.
    pub fn new(data_dir: &Path) -> Self {
        PresetStore {
            dir: data_dir.join(PRESETS_DIR),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn ensure_dir(&self) -> MarionetteResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| MarionetteError::Storage(e.to_string()))
    }

    /// Save frames under `name`, overwriting any existing preset.
    pub fn save(&self, name: &str, frames: Vec<Frame>, mode: ClipMode) -> MarionetteResult<PathBuf> {
        self.ensure_dir()?;
        let duration_ms = frames.last().map(|f| f.t).unwrap_or(0);
        let preset = Preset {
            name: name.to_string(),
            mode,
            duration_ms,
            frame_count: frames.len(),
            frames,
        };

        let path = self.path_for(name);
        let json = serde_json::to_string_pretty(&preset)
            .map_err(|e| MarionetteError::Storage(e.to_string()))?;
        fs::write(&path, json).map_err(|e| MarionetteError::Storage(e.to_string()))?;
        info!(
            name,
            frames = preset.frame_count,
            duration_ms, "preset saved"
        );
        Ok(path)
    }

    /// Load a preset by name.
    pub fn load(&self, name: &str) -> MarionetteResult<Preset> {
        let path = self.path_for(name);
        let text = fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => MarionetteError::PresetNotFound(name.to_string()),
            _ => MarionetteError::Storage(e.to_string()),
        })?;
        serde_json::from_str(&text).map_err(|e| MarionetteError::InvalidPreset {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// List all presets, sorted by file name. Unparsable documents are
    /// skipped and do not appear.
    pub fn list(&self) -> MarionetteResult<Vec<PresetSummary>> {
        self.ensure_dir()?;
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(|e| MarionetteError::Storage(e.to_string()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut summaries = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = fs::read_to_string(&path)
                .ok()
                .and_then(|text| serde_json::from_str::<Preset>(&text).ok());
            match parsed {
                Some(preset) => summaries.push(PresetSummary {
                    name: preset.name,
                    duration_ms: preset.duration_ms,
                    frame_count: preset.frame_count,
                    mode: preset.mode,
                }),
                None => debug!(path = %path.display(), "skipping unparsable preset"),
            }
        }
        Ok(summaries)
    }

    /// Delete a preset. Returns whether a file was removed.
    pub fn delete(&self, name: &str) -> MarionetteResult<bool> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MarionetteError::Storage(e.to_string())),
        }
    }
}
