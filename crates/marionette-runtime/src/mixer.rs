//! Layered animation mixer
//!
//! All layer state lives under one mutex. A render task runs while any
//! layer is active and halts otherwise; it is spawned lazily by
//! `set_idle`/`play_action` and exits on its own once both layers
//! quiesce, emitting a neutral reset on the way out. The lock is never
//! held across an await: each tick computes the merged frame under the
//! lock, releases it, then sends.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use marionette_core::{Bone, Frame, Quat, HIPS_BONE};
use marionette_transport::VmcSender;

/// Render cadence of the outgoing stream.
pub const RENDER_FPS: f64 = 30.0;

/// Ceiling on the idle loop-boundary crossfade.
pub const CROSSFADE_MS: f64 = 500.0;

/// The crossfade never exceeds this fraction of the idle duration.
const CROSSFADE_FRACTION: f64 = 0.3;

const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// One playing action layer.
struct ActiveAction {
    frames: Vec<Frame>,
    looping: bool,
    started: Instant,
}

#[derive(Default)]
struct MixerState {
    idle_frames: Vec<Frame>,
    idle_active: bool,
    idle_name: String,
    /// Ordered: later entries compose on top of earlier ones.
    actions: Vec<ActiveAction>,
    /// Names ever written by any action since the last quiescence.
    dirty_blendshapes: BTreeSet<String>,
    dirty_bones: BTreeSet<String>,
}

/// Two-layer animation mixer emitting the merged stream to the host.
pub struct Mixer {
    sender: Arc<VmcSender>,
    state: Mutex<MixerState>,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Mixer {
    pub fn new(sender: Arc<VmcSender>) -> Self {
        Mixer {
            sender,
            state: Mutex::new(MixerState::default()),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Replace the idle clip and start looping it. Frames must be
    /// absolute; callers holding a relative clip convert or re-record.
    pub fn set_idle(self: &Arc<Self>, frames: Vec<Frame>, name: &str) {
        {
            let mut state = self.state.lock();
            state.idle_frames = frames;
            state.idle_active = true;
            state.idle_name = name.to_string();
        }
        info!(name, "idle animation set");
        self.ensure_task();
    }

    /// Stop the idle loop; running actions continue.
    pub fn stop_idle(&self) {
        let mut state = self.state.lock();
        state.idle_active = false;
        state.idle_name.clear();
    }

    /// Layer a new action on top of everything currently playing.
    /// Frames must be relative deltas; absolute clips are converted by
    /// the caller before they reach the mixer.
    pub fn play_action(self: &Arc<Self>, frames: Vec<Frame>, looping: bool) {
        if frames.is_empty() {
            return;
        }
        {
            let mut state = self.state.lock();
            for frame in &frames {
                state
                    .dirty_blendshapes
                    .extend(frame.blendshapes.keys().cloned());
                state.dirty_bones.extend(frame.bones.keys().cloned());
            }
            state.actions.push(ActiveAction {
                frames,
                looping,
                started: Instant::now(),
            });
        }
        self.ensure_task();
    }

    /// Stop all actions; idle survives.
    pub fn stop_action(&self) {
        self.state.lock().actions.clear();
    }

    /// Stop everything and join the render task.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            state.idle_active = false;
            state.idle_name.clear();
            state.actions.clear();
            state.dirty_blendshapes.clear();
            state.dirty_bones.clear();
        }
        self.running.store(false, Ordering::SeqCst);

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_JOIN_TIMEOUT, handle).await.is_err() {
                warn!("render task did not stop in time; a stale frame may remain on the host");
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.idle_active || !state.actions.is_empty()
    }

    pub fn is_idle_active(&self) -> bool {
        self.state.lock().idle_active
    }

    pub fn idle_name(&self) -> String {
        self.state.lock().idle_name.clone()
    }

    fn ensure_task(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mixer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            mixer.render_loop().await;
            mixer.running.store(false, Ordering::SeqCst);
        });
        *self.task.lock() = Some(handle);
    }

    async fn render_loop(&self) {
        debug!("render loop started");
        let interval = Duration::from_secs_f64(1.0 / RENDER_FPS);
        let idle_epoch = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let t0 = Instant::now();

            let merged = {
                let mut state = self.state.lock();
                if !state.idle_active && state.actions.is_empty() {
                    break;
                }

                let idle_frame = if state.idle_active && !state.idle_frames.is_empty() {
                    sample_idle(&state.idle_frames, t0.saturating_duration_since(idle_epoch))
                } else {
                    None
                };
                let action_frames = sample_actions(&mut state.actions, t0);
                let mut merged = merge_stack(idle_frame, action_frames);

                if let Some(frame) = merged.as_mut() {
                    apply_dirty_names(frame, &state.dirty_blendshapes, &state.dirty_bones);
                    // Quiescence reached this very tick: the tracked names
                    // were just neutralized above, so tracking can stop.
                    if !state.idle_active && state.actions.is_empty() {
                        state.dirty_blendshapes.clear();
                        state.dirty_bones.clear();
                    }
                }
                merged
            };

            if let Some(frame) = merged {
                let include_bones = frame.has_bones();
                if let Err(e) = self.sender.send_frame(&frame, include_bones).await {
                    debug!(error = %e, "frame send failed");
                }
            }

            let elapsed = t0.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }

        // The host would otherwise freeze on the last expression.
        self.send_reset().await;
        debug!("render loop stopped");
    }

    /// Zero every blendshape the stopped playback may have left behind.
    async fn send_reset(&self) {
        let frame = {
            let mut state = self.state.lock();
            let mut names: BTreeSet<String> = std::mem::take(&mut state.dirty_blendshapes);
            state.dirty_bones.clear();
            for action in &state.actions {
                for frame in &action.frames {
                    names.extend(frame.blendshapes.keys().cloned());
                }
            }
            for frame in &state.idle_frames {
                names.extend(frame.blendshapes.keys().cloned());
            }
            if names.is_empty() {
                None
            } else {
                let mut frame = Frame::default();
                for name in names {
                    frame.blendshapes.insert(name, 0.0);
                }
                Some(frame)
            }
        };

        if let Some(frame) = frame {
            if let Err(e) = self.sender.send_frame(&frame, false).await {
                debug!(error = %e, "neutral reset send failed");
            }
        }
    }
}

/// Nearest frame at or before `target_ms`. With duplicate timestamps the
/// last one wins.
fn find_frame(frames: &[Frame], target_ms: f64) -> &Frame {
    let mut best = &frames[0];
    for frame in frames {
        if frame.t as f64 <= target_ms {
            best = frame;
        } else {
            break;
        }
    }
    best
}

/// Linear blend of two frames at parameter `t`: blendshapes lerp over the
/// name union, bone rotations nlerp with positions zeroed.
fn blend_frames(a: &Frame, b: &Frame, t: f32) -> Frame {
    let mut out = Frame::at(a.t);

    let names: BTreeSet<&String> = a.blendshapes.keys().chain(b.blendshapes.keys()).collect();
    for name in names {
        let va = a.blendshapes.get(name).copied().unwrap_or(0.0);
        let vb = b.blendshapes.get(name).copied().unwrap_or(0.0);
        out.blendshapes.insert(name.clone(), va + (vb - va) * t);
    }

    if a.has_bones() || b.has_bones() {
        let names: BTreeSet<&String> = a.bones.keys().chain(b.bones.keys()).collect();
        for name in names {
            let ra = a.bones.get(name).map(|b| b.rot).unwrap_or(Quat::IDENTITY);
            let rb = b.bones.get(name).map(|b| b.rot).unwrap_or(Quat::IDENTITY);
            out.bones
                .insert(name.clone(), Bone::from_rotation(ra.nlerp(rb, t)));
        }
    }
    out
}

/// Sample the idle clip at `elapsed` since the loop epoch, crossfading
/// toward frame 0 near the loop boundary.
fn sample_idle(frames: &[Frame], elapsed: Duration) -> Option<Frame> {
    if frames.is_empty() {
        return None;
    }
    let duration_ms = frames.last().map(|f| f.t).unwrap_or(0) as f64;
    if duration_ms <= 0.0 {
        return Some(frames[0].clone());
    }

    let elapsed_ms = (elapsed.as_secs_f64() * 1000.0) % duration_ms;
    let mut current = find_frame(frames, elapsed_ms).clone();

    let crossfade_ms = CROSSFADE_MS.min(duration_ms * CROSSFADE_FRACTION);
    if crossfade_ms > 0.0 && elapsed_ms > duration_ms - crossfade_ms {
        let blend = ((elapsed_ms - (duration_ms - crossfade_ms)) / crossfade_ms) as f32;
        current = blend_frames(&current, &frames[0], blend);
    }
    Some(current)
}

/// Current frame of every active action. Finished one-shots are removed;
/// looping actions restart from `now`.
fn sample_actions(actions: &mut Vec<ActiveAction>, now: Instant) -> Vec<Frame> {
    let mut sampled = Vec::new();
    actions.retain_mut(|action| {
        let duration_ms = action.frames.last().map(|f| f.t).unwrap_or(0) as f64;
        let mut elapsed_ms = now.saturating_duration_since(action.started).as_secs_f64() * 1000.0;

        if elapsed_ms >= duration_ms {
            if action.looping {
                action.started = now;
                elapsed_ms = 0.0;
            } else {
                return false;
            }
        }
        sampled.push(find_frame(&action.frames, elapsed_ms).clone());
        true
    });
    sampled
}

/// Merge an absolute base frame with one relative delta frame:
/// blendshapes are `clamp(base + delta, 0, 1)` over the name union, bone
/// rotations compose by right-multiplication and renormalize, positions
/// stay zeroed.
fn merge_layers(base: &Frame, delta: &Frame) -> Frame {
    let mut out = Frame::at(base.t);

    let names: BTreeSet<&String> = base
        .blendshapes
        .keys()
        .chain(delta.blendshapes.keys())
        .collect();
    for name in names {
        let b = base.blendshapes.get(name).copied().unwrap_or(0.0);
        let d = delta.blendshapes.get(name).copied().unwrap_or(0.0);
        out.blendshapes.insert(name.clone(), (b + d).clamp(0.0, 1.0));
    }

    if base.has_bones() || delta.has_bones() {
        let names: BTreeSet<&String> = base.bones.keys().chain(delta.bones.keys()).collect();
        for name in names {
            let br = base.bones.get(name).map(|b| b.rot).unwrap_or(Quat::IDENTITY);
            let dr = delta.bones.get(name).map(|b| b.rot).unwrap_or(Quat::IDENTITY);
            out.bones
                .insert(name.clone(), Bone::from_rotation((br * dr).normalize()));
        }
    }
    out
}

/// Fold action frames onto the idle in insertion order. With no idle the
/// first action passes through as-is and later ones fold onto it.
fn merge_stack(idle: Option<Frame>, action_frames: Vec<Frame>) -> Option<Frame> {
    let mut result = idle;
    for frame in action_frames {
        result = Some(match result {
            Some(base) => merge_layers(&base, &frame),
            None => frame,
        });
    }
    result
}

/// Neutralize dirty names the merged frame is silent about: zero for
/// blendshapes, identity for bones (never `Hips`).
fn apply_dirty_names(
    frame: &mut Frame,
    dirty_blendshapes: &BTreeSet<String>,
    dirty_bones: &BTreeSet<String>,
) {
    for name in dirty_blendshapes {
        frame.blendshapes.entry(name.clone()).or_insert(0.0);
    }
    for name in dirty_bones {
        if name != HIPS_BONE {
            frame.bones.entry(name.clone()).or_insert_with(Bone::default);
        }
    }
}
