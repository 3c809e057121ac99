//! Typed VMC messages over raw OSC

use marionette_core::{Bone, MarionetteError, MarionetteResult, Quat};

use crate::osc::{encode_message, for_each_message, OscArg, OscReader};

/// Blendshape magnitude: `string name, float value`.
pub const BLEND_VAL_ADDRESS: &str = "/VMC/Ext/Blend/Val";

/// Commit barrier for staged blendshapes. No arguments.
pub const BLEND_APPLY_ADDRESS: &str = "/VMC/Ext/Blend/Apply";

/// Bone pose: `string name, float px py pz, float rx ry rz rw`.
pub const BONE_POS_ADDRESS: &str = "/VMC/Ext/Bone/Pos";

/// The three VMC messages the bridge speaks, in both directions.
#[derive(Debug, Clone, PartialEq)]
pub enum VmcMessage {
    BlendVal { name: String, value: f32 },
    BlendApply,
    BonePos { name: String, bone: Bone },
}

impl VmcMessage {
    pub fn blend_val(name: impl Into<String>, value: f32) -> Self {
        VmcMessage::BlendVal {
            name: name.into(),
            value,
        }
    }

    pub fn bone_pos(name: impl Into<String>, pos: [f32; 3], rot: Quat) -> Self {
        VmcMessage::BonePos {
            name: name.into(),
            bone: Bone { pos, rot },
        }
    }

    /// Encode to a single OSC datagram payload.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            VmcMessage::BlendVal { name, value } => {
                encode_message(BLEND_VAL_ADDRESS, &[OscArg::Str(name), OscArg::Float(*value)])
            }
            VmcMessage::BlendApply => encode_message(BLEND_APPLY_ADDRESS, &[]),
            VmcMessage::BonePos { name, bone } => encode_message(
                BONE_POS_ADDRESS,
                &[
                    OscArg::Str(name),
                    OscArg::Float(bone.pos[0]),
                    OscArg::Float(bone.pos[1]),
                    OscArg::Float(bone.pos[2]),
                    OscArg::Float(bone.rot.x),
                    OscArg::Float(bone.rot.y),
                    OscArg::Float(bone.rot.z),
                    OscArg::Float(bone.rot.w),
                ],
            ),
        }
    }
}

/// Parse a received datagram into VMC messages.
///
/// `#bundle` containers are flattened. Messages with unrecognized
/// addresses are skipped; malformed framing or argument shapes error out
/// and the caller decides whether to drop the packet.
pub fn parse_packet(buf: &[u8]) -> MarionetteResult<Vec<VmcMessage>> {
    let mut messages = Vec::new();
    for_each_message(buf, &mut |raw| {
        if let Some(message) = parse_message(raw)? {
            messages.push(message);
        }
        Ok(())
    })?;
    Ok(messages)
}

fn parse_message(buf: &[u8]) -> MarionetteResult<Option<VmcMessage>> {
    let mut reader = OscReader::new(buf);
    let address = reader.read_str()?;
    let tags = reader.read_str()?;
    let tags = tags
        .strip_prefix(',')
        .ok_or_else(|| MarionetteError::InvalidPacket("missing type tag string".into()))?;

    let mismatch = |address: &str, tags: &str| MarionetteError::ArgumentMismatch {
        address: address.to_string(),
        tags: tags.to_string(),
    };

    match address {
        BLEND_VAL_ADDRESS => {
            if tags != "sf" {
                return Err(mismatch(address, tags));
            }
            let name = reader.read_str()?.to_string();
            let value = reader.read_f32()?;
            Ok(Some(VmcMessage::BlendVal { name, value }))
        }
        BLEND_APPLY_ADDRESS => {
            // Some hosts attach stray arguments; the barrier ignores them.
            Ok(Some(VmcMessage::BlendApply))
        }
        BONE_POS_ADDRESS => {
            if tags != "sfffffff" {
                return Err(mismatch(address, tags));
            }
            let name = reader.read_str()?.to_string();
            let mut values = [0.0f32; 7];
            for value in values.iter_mut() {
                *value = reader.read_f32()?;
            }
            Ok(Some(VmcMessage::BonePos {
                name,
                bone: Bone {
                    pos: [values[0], values[1], values[2]],
                    rot: Quat::new(values[3], values[4], values[5], values[6]),
                },
            }))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osc::encode_bundle;
    use proptest::prelude::*;

    #[test]
    fn test_blend_val_roundtrip() {
        let message = VmcMessage::blend_val("Joy", 0.75);
        let parsed = parse_packet(&message.encode()).unwrap();
        assert_eq!(parsed, vec![message]);
    }

    #[test]
    fn test_blend_apply_roundtrip() {
        let parsed = parse_packet(&VmcMessage::BlendApply.encode()).unwrap();
        assert_eq!(parsed, vec![VmcMessage::BlendApply]);
    }

    #[test]
    fn test_bone_pos_roundtrip() {
        let message = VmcMessage::bone_pos(
            "Head",
            [0.0, 1.5, 0.0],
            Quat::from_euler_deg(10.0, 0.0, 0.0),
        );
        let parsed = parse_packet(&message.encode()).unwrap();
        assert_eq!(parsed, vec![message]);
    }

    #[test]
    fn test_unknown_address_skipped() {
        let other = encode_message("/VMC/Ext/Root/Pos", &[OscArg::Str("root")]);
        assert_eq!(parse_packet(&other).unwrap(), vec![]);
    }

    #[test]
    fn test_wrong_arity_is_error() {
        let bad = encode_message(BLEND_VAL_ADDRESS, &[OscArg::Str("Joy")]);
        assert!(matches!(
            parse_packet(&bad),
            Err(MarionetteError::ArgumentMismatch { .. })
        ));
    }

    #[test]
    fn test_bundle_of_messages() {
        let bundle = encode_bundle(&[
            VmcMessage::blend_val("Joy", 1.0).encode(),
            VmcMessage::BlendApply.encode(),
        ]);
        let parsed = parse_packet(&bundle).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1], VmcMessage::BlendApply);
    }

    proptest! {
        #[test]
        fn prop_blend_val_roundtrip(name in "[A-Za-z_][A-Za-z0-9_]{0,24}",
                                    value in -2.0f32..2.0) {
            let message = VmcMessage::blend_val(name, value);
            prop_assert_eq!(parse_packet(&message.encode()).unwrap(), vec![message]);
        }

        #[test]
        fn prop_bone_pos_roundtrip(name in "[A-Za-z][A-Za-z0-9]{0,16}",
                                   px in -1.0f32..1.0, qx in -1.0f32..1.0,
                                   qw in -1.0f32..1.0) {
            let message = VmcMessage::bone_pos(name, [px, 0.0, 0.0], Quat::new(qx, 0.0, 0.0, qw));
            prop_assert_eq!(parse_packet(&message.encode()).unwrap(), vec![message]);
        }
    }
}
