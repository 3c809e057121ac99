//! Blendshape sanitization
//!
//! VRM expression presets like Joy and Angry internally close the eyes.
//! When explicit eye-blink blendshapes ride on top, the combined weight
//! can exceed 1.0 and drive the lids through the face mesh. The sanitizer
//! clamps everything to [0, 1] and caps blink weights while a whole-face
//! expression is active.

use crate::frame::BlendshapeMap;

/// Blink blendshape spellings across VRM 0.x / 1.0 / ARKit naming.
pub const EYE_BLINK_NAMES: [&str; 9] = [
    "Blink",
    "Blink_L",
    "Blink_R",
    "BlinkLeft",
    "BlinkRight",
    "EyeBlinkLeft",
    "EyeBlinkRight",
    "eyeBlinkLeft",
    "eyeBlinkRight",
];

/// Expressions that close the eyes as a side effect.
pub const EXPRESSIONS_AFFECTING_EYES: [&str; 2] = ["Joy", "Angry"];

/// Fraction of an expression's weight that the host applies to the lids.
pub const EYE_CLOSE_FACTOR: f32 = 0.7;

/// Expression weight below which no blink capping is applied.
pub const EXPRESSION_EYE_THRESHOLD: f32 = 0.05;

/// Clamp all values to [0, 1] and resolve eye conflicts.
pub fn sanitize(blendshapes: &BlendshapeMap) -> BlendshapeMap {
    let mut result: BlendshapeMap = blendshapes
        .iter()
        .map(|(name, value)| (name.clone(), value.clamp(0.0, 1.0)))
        .collect();

    let expression = EXPRESSIONS_AFFECTING_EYES
        .iter()
        .filter_map(|name| result.get(*name).copied())
        .fold(0.0f32, f32::max);

    if expression > EXPRESSION_EYE_THRESHOLD {
        let cap = (1.0 - expression * EYE_CLOSE_FACTOR).max(0.0);
        for name in EYE_BLINK_NAMES {
            if let Some(value) = result.get_mut(name) {
                *value = value.min(cap);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn map(entries: &[(&str, f32)]) -> BlendshapeMap {
        entries
            .iter()
            .map(|(name, value)| ((*name).to_string(), *value))
            .collect()
    }

    #[test]
    fn test_clamps_out_of_range() {
        let out = sanitize(&map(&[("Joy", 1.5), ("Sorrow", -0.2)]));
        assert_eq!(out["Joy"], 1.0);
        assert_eq!(out["Sorrow"], 0.0);
    }

    #[test]
    fn test_eye_conflict_caps_blinks() {
        let out = sanitize(&map(&[("Joy", 1.0), ("EyeBlinkLeft", 1.0)]));
        // cap = 1 - 0.7 * 1.0
        assert!((out["EyeBlinkLeft"] - 0.3).abs() < 1e-6);
        assert_eq!(out["Joy"], 1.0);
    }

    #[test]
    fn test_cap_uses_strongest_expression() {
        let out = sanitize(&map(&[("Joy", 0.2), ("Angry", 0.8), ("Blink", 1.0)]));
        let cap = 1.0 - 0.8 * EYE_CLOSE_FACTOR;
        assert!((out["Blink"] - cap).abs() < 1e-6);
    }

    #[test]
    fn test_weak_expression_leaves_blinks_alone() {
        let out = sanitize(&map(&[("Joy", 0.04), ("Blink", 0.9)]));
        assert_eq!(out["Blink"], 0.9);
    }

    #[test]
    fn test_blink_below_cap_untouched() {
        let out = sanitize(&map(&[("Joy", 0.5), ("Blink", 0.1)]));
        assert_eq!(out["Blink"], 0.1);
    }

    proptest! {
        #[test]
        fn prop_output_in_unit_range(joy in -2.0f32..2.0, blink in -2.0f32..2.0,
                                     other in -2.0f32..2.0) {
            let out = sanitize(&map(&[("Joy", joy), ("Blink", blink), ("A", other)]));
            for value in out.values() {
                prop_assert!((0.0..=1.0).contains(value));
            }
        }

        #[test]
        fn prop_blinks_respect_cap(expr in 0.06f32..1.0, blink in 0.0f32..1.0) {
            let out = sanitize(&map(&[("Angry", expr), ("BlinkRight", blink)]));
            let cap = (1.0 - expr * EYE_CLOSE_FACTOR).max(0.0);
            prop_assert!(out["BlinkRight"] <= cap + 1e-6);
        }
    }
}
