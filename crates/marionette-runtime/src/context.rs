//! Application root
//!
//! One `Bridge` owns every stateful sub-object: the sender, the recorder,
//! the mixer, both stores, and the emotion classifier. All REST handlers
//! and embedding applications go through it; nothing in the workspace is
//! a global singleton.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use marionette_capture::Recorder;
use marionette_core::{convert_to_relative, ClipMode, MarionetteError, MarionetteResult};
use marionette_emote::{preset_for_emotion, EmotionClassifier};
use marionette_store::{PresetStore, RestPoseStore};
use marionette_transport::VmcSender;

use crate::mixer::Mixer;

/// Bridge configuration. Defaults encode the VSeeFace conventions.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Where the recorder listens for host traffic.
    pub listen_addr: SocketAddr,
    /// Where outgoing frames are sent.
    pub send_addr: SocketAddr,
    /// REST surface bind address.
    pub http_addr: SocketAddr,
    /// Root for presets and the rest-pose file.
    pub data_dir: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 39539)),
            send_addr: SocketAddr::from(([127, 0, 0, 1], 39540)),
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8044)),
            data_dir: PathBuf::from("data"),
        }
    }
}

/// The application root context.
pub struct Bridge {
    config: BridgeConfig,
    sender: Arc<VmcSender>,
    recorder: Arc<Recorder>,
    mixer: Arc<Mixer>,
    presets: PresetStore,
    rest_pose: Arc<RestPoseStore>,
    classifier: EmotionClassifier,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let rest_pose = Arc::new(RestPoseStore::new(&config.data_dir));
        let sender = Arc::new(VmcSender::new(config.send_addr, Arc::clone(&rest_pose)));
        let recorder = Arc::new(Recorder::new(config.listen_addr));
        let mixer = Arc::new(Mixer::new(Arc::clone(&sender)));
        let presets = PresetStore::new(&config.data_dir);
        info!(data_dir = %config.data_dir.display(), "bridge context created");

        Bridge {
            config,
            sender,
            recorder,
            mixer,
            presets,
            rest_pose,
            classifier: EmotionClassifier::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn sender(&self) -> &Arc<VmcSender> {
        &self.sender
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    pub fn presets(&self) -> &PresetStore {
        &self.presets
    }

    pub fn rest_pose(&self) -> &Arc<RestPoseStore> {
        &self.rest_pose
    }

    pub fn classifier(&self) -> &EmotionClassifier {
        &self.classifier
    }

    /// Load a preset and layer it as an action on top of whatever is
    /// playing. Absolute presets are converted to relative deltas first;
    /// the mixer only ever sees deltas on the action layer.
    pub fn play_preset(&self, name: &str, looping: bool) -> MarionetteResult<()> {
        let preset = self.presets.load(name)?;
        let frames = match preset.mode {
            ClipMode::Absolute => convert_to_relative(&preset.frames),
            ClipMode::Relative => preset.frames,
        };
        self.mixer.play_action(frames, looping);
        Ok(())
    }

    /// Load a preset and start looping it as the idle baseline.
    pub fn set_idle_preset(&self, name: &str) -> MarionetteResult<()> {
        let preset = self.presets.load(name)?;
        self.mixer.set_idle(preset.frames, name);
        Ok(())
    }

    /// Detect an emotion in `text` and trigger its mapped preset.
    ///
    /// Returns the triggered preset name. Every failure mode (no signal,
    /// unmapped emotion, missing preset, anything else) is swallowed into
    /// a log line: a generated reply must never fail because the avatar
    /// could not gesture.
    pub fn trigger_emotion(&self, text: &str) -> Option<&'static str> {
        let emotion = self.classifier.detect(text)?;
        let preset = preset_for_emotion(emotion)?;

        match self.play_preset(preset, false) {
            Ok(()) => {
                info!(emotion, preset, "emotion animation triggered");
                Some(preset)
            }
            Err(MarionetteError::PresetNotFound(_)) => {
                debug!(preset, "emotion preset not found, record or generate it first");
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to trigger emotion animation");
                None
            }
        }
    }

    /// Stop all playback and join the render task.
    pub async fn shutdown(&self) {
        self.mixer.stop().await;
        info!("bridge stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marionette_emote::generate_starter_presets;

    fn bridge(dir: &std::path::Path) -> Bridge {
        Bridge::new(BridgeConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            send_addr: SocketAddr::from(([127, 0, 0, 1], 9)), // discard
            data_dir: dir.to_path_buf(),
            ..BridgeConfig::default()
        })
    }

    #[tokio::test]
    async fn test_play_preset_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(dir.path());
        assert!(matches!(
            bridge.play_preset("nope", false),
            Err(MarionetteError::PresetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_trigger_emotion_without_presets_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(dir.path());
        // Strong joy signal but no presets on disk: swallowed.
        assert_eq!(
            bridge.trigger_emotion("That's wonderful, I'm so happy!"),
            None
        );
        assert_eq!(bridge.trigger_emotion("The weather exists."), None);
    }

    #[tokio::test]
    async fn test_trigger_emotion_plays_generated_preset() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge(dir.path());
        generate_starter_presets(bridge.presets(), false).unwrap();

        let preset = bridge.trigger_emotion("Yes, absolutely, I agree completely!");
        assert_eq!(preset, Some("nod"));
        assert!(bridge.mixer().is_playing());
        bridge.shutdown().await;
    }
}
