//! Frames, clips, and the absolute/relative distinction
//!
//! A frame is one timestamped sample of blendshape weights plus an
//! optional bone opinion. A clip is an ordered frame sequence tagged with
//! the coordinate mode its values are expressed in:
//!
//! - `Absolute`: values in host space, directly emittable (idle clips)
//! - `Relative`: deltas from the clip's first frame, composable on top of
//!   whatever the idle layer currently emits (action clips)

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::math::Quat;

/// Blendshape name to weight. Weights are meaningful in [0, 1] for
/// absolute values and may be signed in relative frames.
pub type BlendshapeMap = BTreeMap<String, f32>;

/// Bone name to pose.
pub type BoneMap = BTreeMap<String, Bone>;

/// The avatar root bone. Never forwarded to the host: moving it would
/// teleport the model.
pub const HIPS_BONE: &str = "Hips";

/// Named joint pose. Positions are carried for wire-format symmetry but
/// the mixer always emits them zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub pos: [f32; 3],
    pub rot: Quat,
}

impl Bone {
    /// A bone carrying only a rotation.
    pub fn from_rotation(rot: Quat) -> Self {
        Bone {
            pos: [0.0, 0.0, 0.0],
            rot,
        }
    }
}

impl Default for Bone {
    fn default() -> Self {
        Bone::from_rotation(Quat::IDENTITY)
    }
}

/// One timestamped pose sample.
///
/// An empty `bones` map means "no bone opinion from this clip at this
/// moment" and is omitted from the JSON form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Milliseconds since clip start. Non-decreasing across a clip.
    pub t: u64,
    #[serde(default)]
    pub blendshapes: BlendshapeMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bones: BoneMap,
}

impl Frame {
    pub fn at(t: u64) -> Self {
        Frame {
            t,
            ..Frame::default()
        }
    }

    pub fn has_bones(&self) -> bool {
        !self.bones.is_empty()
    }
}

/// Coordinate mode of a clip's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipMode {
    #[default]
    Absolute,
    Relative,
}

/// Ordered frame sequence with a mode tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub mode: ClipMode,
    pub frames: Vec<Frame>,
}

impl Clip {
    pub fn new(mode: ClipMode, frames: Vec<Frame>) -> Self {
        Clip { mode, frames }
    }

    /// Duration is the timestamp of the last frame. A single-frame clip
    /// has zero duration and acts as a static pose.
    pub fn duration_ms(&self) -> u64 {
        self.frames.last().map(|f| f.t).unwrap_or(0)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Every blendshape name mentioned anywhere in the clip.
    pub fn blendshape_names(&self) -> BTreeSet<String> {
        self.frames
            .iter()
            .flat_map(|f| f.blendshapes.keys().cloned())
            .collect()
    }

    /// Every bone name mentioned anywhere in the clip.
    pub fn bone_names(&self) -> BTreeSet<String> {
        self.frames
            .iter()
            .flat_map(|f| f.bones.keys().cloned())
            .collect()
    }
}

/// On-disk preset document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    #[serde(default)]
    pub mode: ClipMode,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub frame_count: usize,
    pub frames: Vec<Frame>,
}

impl Preset {
    pub fn clip(&self) -> Clip {
        Clip::new(self.mode, self.frames.clone())
    }
}

/// Convert absolute frames to deltas from frame 0.
///
/// Blendshapes subtract the reference value (deltas may be negative).
/// Bone rotations become `normalize(inverse(ref) * current)`, the rotation
/// that carries the reference pose onto the sampled pose; positions are
/// zeroed. Missing rotations on either side substitute identity.
pub fn convert_to_relative(frames: &[Frame]) -> Vec<Frame> {
    let Some(reference) = frames.first() else {
        return Vec::new();
    };

    frames
        .iter()
        .map(|frame| {
            let mut out = Frame::at(frame.t);

            let names: BTreeSet<&String> = frame
                .blendshapes
                .keys()
                .chain(reference.blendshapes.keys())
                .collect();
            for name in names {
                let cur = frame.blendshapes.get(name).copied().unwrap_or(0.0);
                let base = reference.blendshapes.get(name).copied().unwrap_or(0.0);
                out.blendshapes.insert(name.clone(), cur - base);
            }

            if frame.has_bones() || reference.has_bones() {
                let names: BTreeSet<&String> =
                    frame.bones.keys().chain(reference.bones.keys()).collect();
                for name in names {
                    let cur = frame
                        .bones
                        .get(name)
                        .map(|b| b.rot)
                        .unwrap_or(Quat::IDENTITY);
                    let base = reference
                        .bones
                        .get(name)
                        .map(|b| b.rot)
                        .unwrap_or(Quat::IDENTITY);
                    out.bones.insert(
                        name.clone(),
                        Bone::from_rotation((base.inverse() * cur).normalize()),
                    );
                }
            }

            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(t: u64, shapes: &[(&str, f32)]) -> Frame {
        let mut f = Frame::at(t);
        for (name, value) in shapes {
            f.blendshapes.insert((*name).to_string(), *value);
        }
        f
    }

    #[test]
    fn test_clip_duration() {
        let clip = Clip::new(ClipMode::Absolute, vec![frame(0, &[]), frame(500, &[])]);
        assert_eq!(clip.duration_ms(), 500);
        assert_eq!(Clip::default().duration_ms(), 0);
    }

    #[test]
    fn test_bones_field_omitted_when_empty() {
        let json = serde_json::to_string(&frame(0, &[("Joy", 1.0)])).unwrap();
        assert!(!json.contains("bones"));

        let mut with_bones = frame(0, &[]);
        with_bones
            .bones
            .insert("Head".to_string(), Bone::default());
        let json = serde_json::to_string(&with_bones).unwrap();
        assert!(json.contains("bones"));
    }

    #[test]
    fn test_relative_frame_zero_is_neutral() {
        let mut f0 = frame(0, &[("Joy", 1.0)]);
        f0.bones.insert(
            "Head".to_string(),
            Bone::from_rotation(Quat::from_euler_deg(10.0, 0.0, 0.0)),
        );
        let mut f1 = frame(40, &[("Joy", 0.5)]);
        f1.bones.insert(
            "Head".to_string(),
            Bone::from_rotation(Quat::from_euler_deg(20.0, 0.0, 0.0)),
        );

        let relative = convert_to_relative(&[f0, f1]);
        assert_eq!(relative.len(), 2);

        // Frame 0 of a relative clip carries zero deltas and identity
        // rotations by construction.
        assert_eq!(relative[0].blendshapes["Joy"], 0.0);
        let rot0 = relative[0].bones["Head"].rot;
        assert!((rot0.x - 0.0).abs() < 1e-6);
        assert!((rot0.w - 1.0).abs() < 1e-6);

        assert!((relative[1].blendshapes["Joy"] - (-0.5)).abs() < 1e-6);
        // inverse(10 deg) * 20 deg is a 10 degree X rotation.
        let expected = Quat::from_euler_deg(10.0, 0.0, 0.0);
        let rot1 = relative[1].bones["Head"].rot;
        assert!((rot1.x - expected.x).abs() < 1e-5);
        assert!((rot1.w - expected.w).abs() < 1e-5);
    }

    #[test]
    fn test_relative_union_of_names() {
        let f0 = frame(0, &[("Joy", 0.8)]);
        let f1 = frame(40, &[("Sorrow", 0.4)]);
        let relative = convert_to_relative(&[f0, f1]);

        // Frame 1 mentions both the new name and the reference-only name.
        assert!((relative[1].blendshapes["Sorrow"] - 0.4).abs() < 1e-6);
        assert!((relative[1].blendshapes["Joy"] - (-0.8)).abs() < 1e-6);
    }

    #[test]
    fn test_preset_roundtrip() {
        let preset = Preset {
            name: "wave".to_string(),
            mode: ClipMode::Relative,
            duration_ms: 40,
            frame_count: 2,
            frames: vec![frame(0, &[("Joy", 0.0)]), frame(40, &[("Joy", 0.5)])],
        };
        let json = serde_json::to_string_pretty(&preset).unwrap();
        assert!(json.contains("\"mode\": \"relative\""));
        let back: Preset = serde_json::from_str(&json).unwrap();
        assert_eq!(back.frames, preset.frames);
        assert_eq!(back.mode, ClipMode::Relative);
    }
}
