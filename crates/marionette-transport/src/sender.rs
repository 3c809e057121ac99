//! VMC message sender
//!
//! Owns the UDP client toward the host. The socket is bound lazily on the
//! first send so constructing a sender is free and infallible.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::OnceCell;
use tracing::debug;

use marionette_core::{
    blend::sanitize, BlendshapeMap, BoneMap, Frame, MarionetteError, MarionetteResult, Quat,
    HIPS_BONE,
};
use marionette_store::RestPoseStore;
use marionette_wire::VmcMessage;

/// Default host endpoint (VSeeFace receives on 39540).
pub const DEFAULT_SEND_ADDR: &str = "127.0.0.1:39540";

/// Sends VMC messages to the avatar host.
pub struct VmcSender {
    target: SocketAddr,
    rest_pose: Arc<RestPoseStore>,
    socket: OnceCell<Arc<UdpSocket>>,
}

impl VmcSender {
    pub fn new(target: SocketAddr, rest_pose: Arc<RestPoseStore>) -> Self {
        VmcSender {
            target,
            rest_pose,
            socket: OnceCell::new(),
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    async fn socket(&self) -> MarionetteResult<&Arc<UdpSocket>> {
        self.socket
            .get_or_try_init(|| async {
                let socket = UdpSocket::bind("0.0.0.0:0")
                    .await
                    .map_err(|e| MarionetteError::Transport(e.to_string()))?;
                debug!(target = %self.target, "VMC send socket bound");
                Ok(Arc::new(socket))
            })
            .await
    }

    async fn send(&self, message: &VmcMessage) -> MarionetteResult<()> {
        let socket = self.socket().await?;
        socket
            .send_to(&message.encode(), self.target)
            .await
            .map_err(|e| MarionetteError::Transport(e.to_string()))?;
        Ok(())
    }

    /// Send a single blendshape value.
    pub async fn send_blendshape(&self, name: &str, value: f32) -> MarionetteResult<()> {
        self.send(&VmcMessage::blend_val(name, value)).await
    }

    /// Signal the host to apply all staged blendshape values.
    pub async fn send_blendshape_apply(&self) -> MarionetteResult<()> {
        self.send(&VmcMessage::BlendApply).await
    }

    /// Sanitize and send a blendshape map, then the apply barrier.
    pub async fn send_blendshapes(&self, blendshapes: &BlendshapeMap) -> MarionetteResult<()> {
        for (name, value) in sanitize(blendshapes) {
            self.send(&VmcMessage::BlendVal { name, value }).await?;
        }
        self.send_blendshape_apply().await
    }

    /// Send one bone pose verbatim.
    pub async fn send_bone(&self, name: &str, pos: [f32; 3], rot: Quat) -> MarionetteResult<()> {
        self.send(&VmcMessage::bone_pos(name, pos, rot)).await
    }

    /// Send a bone map verbatim (captured data echo; no rest-pose overlay
    /// and no position zeroing).
    pub async fn send_bones(&self, bones: &BoneMap) -> MarionetteResult<()> {
        for (name, bone) in bones {
            self.send(&VmcMessage::bone_pos(name, bone.pos, bone.rot))
                .await?;
        }
        Ok(())
    }

    /// Send the rest pose once: the quick un-T-pose escape hatch.
    pub async fn apply_rest_pose(&self) -> MarionetteResult<()> {
        for (name, bone) in self.rest_pose.get() {
            if name == HIPS_BONE {
                continue;
            }
            self.send(&VmcMessage::bone_pos(name, [0.0, 0.0, 0.0], bone.rot))
                .await?;
        }
        Ok(())
    }

    /// Send a complete frame: the render loop's unit operation.
    ///
    /// Blendshapes are sanitized and committed behind one apply barrier.
    /// Bones start from the live rest pose; when `include_bones` is set
    /// the frame's own bones override matching entries. Positions are
    /// forced to zero and `Hips` never leaves the process.
    pub async fn send_frame(&self, frame: &Frame, include_bones: bool) -> MarionetteResult<()> {
        for (name, value) in sanitize(&frame.blendshapes) {
            self.send(&VmcMessage::BlendVal { name, value }).await?;
        }
        self.send_blendshape_apply().await?;

        let mut bones = self.rest_pose.get();
        if include_bones {
            for (name, bone) in &frame.bones {
                bones.insert(name.clone(), *bone);
            }
        }
        for (name, bone) in bones {
            if name == HIPS_BONE {
                continue;
            }
            self.send(&VmcMessage::bone_pos(name, [0.0, 0.0, 0.0], bone.rot))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marionette_core::Bone;
    use marionette_wire::parse_packet;
    use std::time::Duration;

    async fn receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    async fn recv_messages(socket: &UdpSocket, count: usize) -> Vec<VmcMessage> {
        let mut buf = [0u8; 2048];
        let mut messages = Vec::new();
        while messages.len() < count {
            let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
                .await
                .expect("timed out waiting for datagram")
                .unwrap();
            messages.extend(parse_packet(&buf[..len]).unwrap());
        }
        messages
    }

    fn sender_for(addr: SocketAddr, dir: &std::path::Path) -> VmcSender {
        VmcSender::new(addr, Arc::new(RestPoseStore::new(dir)))
    }

    #[tokio::test]
    async fn test_blendshapes_sanitized_before_apply() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, addr) = receiver().await;
        let sender = sender_for(addr, dir.path());

        let mut shapes = BlendshapeMap::new();
        shapes.insert("Joy".to_string(), 1.0);
        shapes.insert("EyeBlinkLeft".to_string(), 1.0);
        sender.send_blendshapes(&shapes).await.unwrap();

        let messages = recv_messages(&socket, 3).await;
        let mut joy = None;
        let mut blink = None;
        for message in &messages[..2] {
            match message {
                VmcMessage::BlendVal { name, value } if name == "Joy" => joy = Some(*value),
                VmcMessage::BlendVal { name, value } if name == "EyeBlinkLeft" => {
                    blink = Some(*value)
                }
                other => panic!("unexpected message before apply: {other:?}"),
            }
        }
        assert_eq!(joy, Some(1.0));
        assert!((blink.unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(messages[2], VmcMessage::BlendApply);
    }

    #[tokio::test]
    async fn test_frame_suppresses_hips_and_zeroes_positions() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, addr) = receiver().await;
        let sender = sender_for(addr, dir.path());

        // Rest pose that illegally contains Hips, fed straight to disk.
        let mut pose = BoneMap::new();
        pose.insert(
            "Hips".to_string(),
            Bone {
                pos: [0.0, 1.0, 0.0],
                rot: Quat::IDENTITY,
            },
        );
        pose.insert(
            "Head".to_string(),
            Bone {
                pos: [0.0, 1.6, 0.0],
                rot: Quat::from_euler_deg(5.0, 0.0, 0.0),
            },
        );
        let json = serde_json::to_string(&pose).unwrap();
        std::fs::write(dir.path().join(marionette_store::REST_POSE_FILE), json).unwrap();

        sender.send_frame(&Frame::at(0), false).await.unwrap();

        // Apply barrier plus one bone message per non-Hips rest bone.
        let messages = recv_messages(&socket, 2).await;
        assert_eq!(messages[0], VmcMessage::BlendApply);
        match &messages[1] {
            VmcMessage::BonePos { name, bone } => {
                assert_eq!(name, "Head");
                assert_eq!(bone.pos, [0.0, 0.0, 0.0]);
            }
            other => panic!("expected bone message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_frame_bones_override_rest_pose() {
        let dir = tempfile::tempdir().unwrap();
        let (socket, addr) = receiver().await;
        let sender = sender_for(addr, dir.path());

        let nod = Quat::from_euler_deg(12.0, 0.0, 0.0);
        let mut frame = Frame::at(0);
        frame
            .bones
            .insert("LeftUpperArm".to_string(), Bone::from_rotation(nod));
        sender.send_frame(&frame, true).await.unwrap();

        // Apply + the 4 default rest bones (LeftUpperArm overridden).
        let messages = recv_messages(&socket, 5).await;
        let overridden = messages.iter().find_map(|m| match m {
            VmcMessage::BonePos { name, bone } if name == "LeftUpperArm" => Some(bone.rot),
            _ => None,
        });
        let rot = overridden.expect("LeftUpperArm missing");
        assert!((rot.x - nod.x).abs() < 1e-6);
        assert!((rot.w - nod.w).abs() < 1e-6);
    }
}
