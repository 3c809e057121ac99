//! VMC recorder
//!
//! Owns the listener lifecycle and all capture state. Message handling is
//! synchronous under one mutex so the receive task, the render thread,
//! and REST callers observe a consistent snapshot.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use marionette_core::{BlendshapeMap, BoneMap, Frame, MarionetteError, MarionetteResult};
use marionette_wire::{parse_packet, VmcMessage};

/// Default listen endpoint (VSeeFace sends on 39539).
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:39539";

/// Capture rate cap: `Blend/Apply` barriers closer together than this are
/// ignored while recording.
const SAMPLE_INTERVAL: Duration = Duration::from_micros(1_000_000 / 30);

/// Deep copy of the latest values received from the host.
#[derive(Debug, Clone, Default)]
pub struct CurrentState {
    pub blendshapes: BlendshapeMap,
    pub bones: BoneMap,
}

#[derive(Default)]
struct CaptureState {
    recording: bool,
    start: Option<Instant>,
    last_sample: Option<Instant>,
    frames: Vec<Frame>,
    blendshapes: BlendshapeMap,
    bones: BoneMap,
}

/// Records the incoming VMC stream into timestamped frames.
pub struct Recorder {
    listen_addr: SocketAddr,
    state: Mutex<CaptureState>,
    server: OnceCell<Arc<UdpSocket>>,
}

impl Recorder {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Recorder {
            listen_addr,
            state: Mutex::new(CaptureState::default()),
            server: OnceCell::new(),
        }
    }

    /// Bind the listener and spawn the receive task. Idempotent: a second
    /// call observes the already-bound socket and changes nothing.
    pub async fn start_server(self: &Arc<Self>) -> MarionetteResult<SocketAddr> {
        let socket = self
            .server
            .get_or_try_init(|| async {
                let socket = UdpSocket::bind(self.listen_addr)
                    .await
                    .map_err(|e| MarionetteError::Transport(e.to_string()))?;
                let socket = Arc::new(socket);

                let recorder = Arc::clone(self);
                let task_socket = Arc::clone(&socket);
                tokio::spawn(async move {
                    recorder.receive_loop(task_socket).await;
                });

                info!(addr = %self.listen_addr, "VMC recorder listening");
                Ok::<_, MarionetteError>(socket)
            })
            .await?;

        socket
            .local_addr()
            .map_err(|e| MarionetteError::Transport(e.to_string()))
    }

    async fn receive_loop(&self, socket: Arc<UdpSocket>) {
        let mut buf = vec![0u8; 8192];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, _)) => match parse_packet(&buf[..len]) {
                    Ok(messages) => {
                        let now = Instant::now();
                        for message in messages {
                            self.handle_message(message, now);
                        }
                    }
                    Err(e) => debug!(error = %e, "dropping malformed packet"),
                },
                Err(e) => warn!("UDP receive error: {}", e),
            }
        }
    }

    /// Apply one received message to the capture state.
    ///
    /// `Val` and `Pos` update the live snapshot unconditionally; the
    /// `Apply` barrier commits a frame when recording and the rate cap
    /// allows it. The committed frame reflects the latest values at that
    /// barrier, not the values at any rejected one.
    pub fn handle_message(&self, message: VmcMessage, now: Instant) {
        match message {
            VmcMessage::BlendVal { name, value } => {
                self.state.lock().blendshapes.insert(name, value);
            }
            VmcMessage::BonePos { name, bone } => {
                let mut state = self.state.lock();
                if state.bones.is_empty() {
                    info!(bone = %name, "first bone received from host");
                }
                state.bones.insert(name, bone);
            }
            VmcMessage::BlendApply => self.commit_frame(now),
        }
    }

    fn commit_frame(&self, now: Instant) {
        let mut state = self.state.lock();
        if !state.recording {
            return;
        }
        if let Some(last) = state.last_sample {
            if now.saturating_duration_since(last) < SAMPLE_INTERVAL {
                return;
            }
        }
        let Some(start) = state.start else {
            return;
        };

        // Saturating arithmetic clamps clock anomalies to t = 0.
        let elapsed = now.saturating_duration_since(start);
        let mut frame = Frame::at((elapsed.as_secs_f64() * 1000.0).round() as u64);
        frame.blendshapes = state.blendshapes.clone();
        if !state.bones.is_empty() {
            frame.bones = state.bones.clone();
        }
        state.frames.push(frame);
        state.last_sample = Some(now);
    }

    /// Begin capturing frames. Resets the frame list, the live snapshot,
    /// and the timing fields.
    pub fn start_recording(&self) {
        let mut state = self.state.lock();
        state.frames.clear();
        state.blendshapes.clear();
        state.bones.clear();
        state.start = Some(Instant::now());
        state.last_sample = None;
        state.recording = true;
        info!("VMC recording started");
    }

    /// Stop capturing and return the accumulated absolute frames. An
    /// empty capture returns an empty vector; the caller decides whether
    /// that is an error.
    pub fn stop_recording(&self) -> Vec<Frame> {
        let mut state = self.state.lock();
        state.recording = false;
        let frames = std::mem::take(&mut state.frames);
        info!(frames = frames.len(), "VMC recording stopped");
        frames
    }

    /// Snapshot the latest host values, recording or not.
    pub fn get_current_state(&self) -> CurrentState {
        let state = self.state.lock();
        CurrentState {
            blendshapes: state.blendshapes.clone(),
            bones: state.bones.clone(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    pub fn frame_count(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Number of distinct bones currently tracked.
    pub fn bone_count(&self) -> usize {
        self.state.lock().bones.len()
    }

    /// Names of bones currently tracked.
    pub fn bone_names(&self) -> Vec<String> {
        self.state.lock().bones.keys().cloned().collect()
    }
}
