//! Synthetic starter presets
//!
//! Relative clips built from closed-form envelopes so the avatar has a
//! gesture vocabulary before anything was recorded from the host. All of
//! these are ordinary relative clips from the mixer's point of view.

use std::f32::consts::PI;

use tracing::{debug, info};

use marionette_core::{Bone, ClipMode, Frame, MarionetteResult, Quat};
use marionette_store::PresetStore;

/// Frame rate of generated clips.
pub const STARTER_FPS: f32 = 30.0;

/// All starter presets by name.
pub const STARTER_PRESETS: [(&str, fn() -> Vec<Frame>); 7] = [
    ("smile", gen_smile),
    ("sad", gen_sad),
    ("angry", gen_angry),
    ("surprised", gen_surprised),
    ("nod", gen_nod),
    ("shake_head", gen_shake_head),
    ("thinking", gen_thinking),
];

/// Cubic ease-in-out over [0, 1].
fn ease_in_out(t: f32) -> f32 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Sample `build` at the starter frame rate across `duration_s` seconds.
/// `build` receives normalized time in [0, 1].
fn make_frames(duration_s: f32, build: impl Fn(f32) -> Frame) -> Vec<Frame> {
    let count = ((duration_s * STARTER_FPS) as usize).max(2);
    (0..count)
        .map(|i| {
            let t_norm = i as f32 / (count - 1) as f32;
            let mut frame = build(t_norm);
            frame.t = (t_norm * duration_s * 1000.0) as u64;
            frame
        })
        .collect()
}

/// Attack-hold-release envelope over normalized time.
fn envelope(t: f32, attack_end: f32, release_start: f32) -> f32 {
    if t < attack_end {
        ease_in_out(t / attack_end)
    } else if t < release_start {
        1.0
    } else {
        ease_in_out(1.0 - (t - release_start) / (1.0 - release_start))
    }
}

fn blendshape_frame(name: &str, value: f32) -> Frame {
    let mut frame = Frame::default();
    frame.blendshapes.insert(name.to_string(), value);
    frame
}

fn head_frame(rot: Quat) -> Frame {
    let mut frame = Frame::default();
    frame
        .bones
        .insert("Head".to_string(), Bone::from_rotation(rot));
    frame
}

fn gen_smile() -> Vec<Frame> {
    make_frames(1.5, |t| blendshape_frame("Joy", envelope(t, 0.2, 0.7)))
}

fn gen_sad() -> Vec<Frame> {
    make_frames(2.0, |t| {
        blendshape_frame("Sorrow", envelope(t, 0.25, 0.7) * 0.8)
    })
}

fn gen_angry() -> Vec<Frame> {
    make_frames(1.5, |t| {
        blendshape_frame("Angry", envelope(t, 0.15, 0.7) * 0.9)
    })
}

fn gen_surprised() -> Vec<Frame> {
    make_frames(1.2, |t| blendshape_frame("Surprised", envelope(t, 0.1, 0.5)))
}

/// Fade envelope for the oscillating head gestures.
fn sine_fade(t: f32) -> f32 {
    if t < 0.1 {
        t / 0.1
    } else if t > 0.85 {
        (1.0 - t) / 0.15
    } else {
        1.0
    }
}

fn gen_nod() -> Vec<Frame> {
    make_frames(1.2, |t| {
        // Two nod cycles, +/- 12 degrees around X.
        let angle = (t * PI * 4.0).sin() * 12.0 * sine_fade(t);
        head_frame(Quat::from_euler_deg(angle, 0.0, 0.0))
    })
}

fn gen_shake_head() -> Vec<Frame> {
    make_frames(1.4, |t| {
        // Two shake cycles, +/- 15 degrees around Y.
        let angle = (t * PI * 4.0).sin() * 15.0 * sine_fade(t);
        head_frame(Quat::from_euler_deg(0.0, angle, 0.0))
    })
}

fn gen_thinking() -> Vec<Frame> {
    make_frames(2.0, |t| {
        let v = envelope(t, 0.2, 0.75);
        let mut frame = head_frame(Quat::from_euler_deg(-5.0 * v, 0.0, 8.0 * v));
        frame.blendshapes.insert("LookUp".to_string(), v * 0.3);
        frame
    })
}

/// Generate all starter presets, skipping names that already exist unless
/// `overwrite` is set. Returns the names that were created.
pub fn generate_starter_presets(
    store: &PresetStore,
    overwrite: bool,
) -> MarionetteResult<Vec<String>> {
    let existing: Vec<String> = store.list()?.into_iter().map(|p| p.name).collect();
    let mut created = Vec::new();

    for (name, generate) in STARTER_PRESETS {
        if !overwrite && existing.iter().any(|e| e == name) {
            debug!(name, "skipping existing preset");
            continue;
        }
        let frames = generate();
        info!(name, frames = frames.len(), "generated starter preset");
        store.save(name, frames, ClipMode::Relative)?;
        created.push(name.to_string());
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ease_in_out_endpoints() {
        assert!(ease_in_out(0.0).abs() < 1e-6);
        assert!((ease_in_out(0.5) - 0.5).abs() < 1e-6);
        assert!((ease_in_out(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_make_frames_timing() {
        let frames = make_frames(1.0, |_| Frame::default());
        assert_eq!(frames.len(), 30);
        assert_eq!(frames[0].t, 0);
        assert_eq!(frames.last().unwrap().t, 1000);
        assert!(frames.windows(2).all(|w| w[0].t <= w[1].t));
    }

    #[test]
    fn test_nod_is_head_only() {
        let frames = gen_nod();
        assert!(frames.iter().all(|f| f.blendshapes.is_empty()));
        assert!(frames.iter().all(|f| f.bones.len() == 1 && f.bones.contains_key("Head")));
        // The gesture starts and ends near identity.
        let first = frames.first().unwrap().bones["Head"].rot;
        let last = frames.last().unwrap().bones["Head"].rot;
        assert!((first.w - 1.0).abs() < 1e-3);
        assert!((last.w - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_smile_peaks_at_one() {
        let frames = gen_smile();
        let peak = frames
            .iter()
            .map(|f| f.blendshapes["Joy"])
            .fold(0.0f32, f32::max);
        assert!((peak - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_generate_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());

        let created = generate_starter_presets(&store, false).unwrap();
        assert_eq!(created.len(), STARTER_PRESETS.len());

        let again = generate_starter_presets(&store, false).unwrap();
        assert!(again.is_empty());

        let forced = generate_starter_presets(&store, true).unwrap();
        assert_eq!(forced.len(), STARTER_PRESETS.len());
    }

    #[test]
    fn test_generated_presets_are_relative() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        generate_starter_presets(&store, false).unwrap();

        let preset = store.load("nod").unwrap();
        assert_eq!(preset.mode, ClipMode::Relative);
        assert!(preset.duration_ms > 0);
    }
}
