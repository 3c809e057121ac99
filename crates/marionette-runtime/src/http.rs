//! REST collaborator surface
//!
//! Thin dispatch into the [`Bridge`]: every handler validates, calls one
//! context operation, and maps failures to explicit status codes. No
//! animation logic lives here.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use marionette_core::{BlendshapeMap, ClipMode, MarionetteError};
use marionette_emote::{generate_starter_presets, preset_for_emotion, EMOTION_PRESET_MAP};

use crate::context::Bridge;

/// Build the REST router over a shared bridge.
pub fn router(bridge: Arc<Bridge>) -> Router {
    Router::new()
        .route("/record/start", post(record_start))
        .route("/record/stop", post(record_stop))
        .route("/record/status", get(record_status))
        .route("/presets", get(presets_list))
        .route("/presets/generate", post(presets_generate))
        .route("/presets/:name", get(preset_get).delete(preset_delete))
        .route("/play", post(play))
        .route("/play/stop", post(play_stop))
        .route("/play/status", get(play_status))
        .route("/idle/set", post(idle_set))
        .route("/idle/stop", post(idle_stop))
        .route("/idle/status", get(idle_status))
        .route("/rest-pose", get(rest_pose_get))
        .route("/rest-pose/apply", post(rest_pose_apply))
        .route("/rest-pose/capture", post(rest_pose_capture))
        .route("/rest-pose/reset", post(rest_pose_reset))
        .route("/blendshapes", post(blendshapes_send))
        .route("/emotion/detect", post(emotion_detect))
        .route("/emotion/mappings", get(emotion_mappings))
        .route("/emotion/trigger", post(emotion_trigger))
        .with_state(bridge)
}

// ── Requests ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PresetNameRequest {
    name: String,
}

#[derive(Deserialize)]
struct PlayRequest {
    name: String,
    #[serde(default, rename = "loop")]
    looping: bool,
}

#[derive(Deserialize)]
struct BlendshapeRequest {
    blendshapes: BlendshapeMap,
}

#[derive(Deserialize)]
struct TextRequest {
    text: String,
}

// ── Error mapping ────────────────────────────────────────────────────

struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        ApiError {
            status,
            detail: detail.into(),
        }
    }

    fn conflict(detail: &str) -> Self {
        ApiError::new(StatusCode::CONFLICT, detail)
    }

    fn bad_request(detail: &str) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, detail)
    }
}

impl From<MarionetteError> for ApiError {
    fn from(e: MarionetteError) -> Self {
        match e {
            MarionetteError::PresetNotFound(name) => ApiError::new(
                StatusCode::NOT_FOUND,
                format!("Preset '{name}' not found"),
            ),
            other => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

// ── Recording ────────────────────────────────────────────────────────

async fn record_start(State(bridge): State<Arc<Bridge>>) -> ApiResult {
    let recorder = bridge.recorder();
    if recorder.is_recording() {
        return Err(ApiError::conflict("Already recording"));
    }
    recorder.start_server().await?;
    recorder.start_recording();
    Ok(Json(json!({ "status": "recording" })))
}

async fn record_stop(
    State(bridge): State<Arc<Bridge>>,
    Json(request): Json<PresetNameRequest>,
) -> ApiResult {
    let recorder = bridge.recorder();
    if !recorder.is_recording() {
        return Err(ApiError::conflict("Not recording"));
    }
    // The listener keeps running so state snapshots stay available.
    let frames = recorder.stop_recording();
    if frames.is_empty() {
        return Err(ApiError::bad_request("No frames captured"));
    }

    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Preset name is required"));
    }

    let duration_ms = frames.last().map(|f| f.t).unwrap_or(0);
    let frame_count = frames.len();
    let bone_frames = frames.iter().filter(|f| f.has_bones()).count();
    let bone_count = frames.iter().map(|f| f.bones.len()).max().unwrap_or(0);
    bridge.presets().save(name, frames, ClipMode::Absolute)?;

    Ok(Json(json!({
        "status": "saved",
        "name": name,
        "frame_count": frame_count,
        "duration_ms": duration_ms,
        "bone_frames": bone_frames,
        "bone_count": bone_count,
    })))
}

async fn record_status(State(bridge): State<Arc<Bridge>>) -> ApiResult {
    let recorder = bridge.recorder();
    Ok(Json(json!({
        "recording": recorder.is_recording(),
        "frame_count": recorder.frame_count(),
        "bone_count": recorder.bone_count(),
    })))
}

// ── Presets ──────────────────────────────────────────────────────────

async fn presets_list(State(bridge): State<Arc<Bridge>>) -> ApiResult {
    let presets = bridge.presets().list()?;
    Ok(Json(serde_json::to_value(presets).unwrap_or_default()))
}

async fn preset_get(
    State(bridge): State<Arc<Bridge>>,
    Path(name): Path<String>,
) -> ApiResult {
    let preset = bridge.presets().load(&name)?;
    Ok(Json(serde_json::to_value(preset).unwrap_or_default()))
}

async fn preset_delete(
    State(bridge): State<Arc<Bridge>>,
    Path(name): Path<String>,
) -> ApiResult {
    if !bridge.presets().delete(&name)? {
        return Err(MarionetteError::PresetNotFound(name).into());
    }
    Ok(Json(json!({ "status": "deleted", "name": name })))
}

async fn presets_generate(State(bridge): State<Arc<Bridge>>) -> ApiResult {
    let created = generate_starter_presets(bridge.presets(), false)?;
    Ok(Json(json!({
        "status": "ok",
        "count": created.len(),
        "created": created,
    })))
}

// ── Playback ─────────────────────────────────────────────────────────

async fn play(
    State(bridge): State<Arc<Bridge>>,
    Json(request): Json<PlayRequest>,
) -> ApiResult {
    bridge.play_preset(&request.name, request.looping)?;
    Ok(Json(json!({
        "status": "playing",
        "name": request.name,
        "loop": request.looping,
    })))
}

async fn play_stop(State(bridge): State<Arc<Bridge>>) -> ApiResult {
    bridge.mixer().stop_action();
    Ok(Json(json!({ "status": "stopped" })))
}

async fn play_status(State(bridge): State<Arc<Bridge>>) -> ApiResult {
    Ok(Json(json!({ "playing": bridge.mixer().is_playing() })))
}

// ── Idle ─────────────────────────────────────────────────────────────

async fn idle_set(
    State(bridge): State<Arc<Bridge>>,
    Json(request): Json<PresetNameRequest>,
) -> ApiResult {
    bridge.set_idle_preset(&request.name)?;
    Ok(Json(json!({ "status": "idle_started", "name": request.name })))
}

async fn idle_stop(State(bridge): State<Arc<Bridge>>) -> ApiResult {
    bridge.mixer().stop_idle();
    Ok(Json(json!({ "status": "idle_stopped" })))
}

async fn idle_status(State(bridge): State<Arc<Bridge>>) -> ApiResult {
    let mixer = bridge.mixer();
    Ok(Json(json!({
        "active": mixer.is_idle_active(),
        "name": mixer.idle_name(),
    })))
}

// ── Rest pose ────────────────────────────────────────────────────────

async fn rest_pose_get(State(bridge): State<Arc<Bridge>>) -> ApiResult {
    let pose = bridge.rest_pose().get();
    Ok(Json(json!({
        "bone_count": pose.len(),
        "bones": pose.keys().collect::<Vec<_>>(),
    })))
}

async fn rest_pose_apply(State(bridge): State<Arc<Bridge>>) -> ApiResult {
    bridge.sender().apply_rest_pose().await?;
    Ok(Json(json!({ "status": "applied" })))
}

async fn rest_pose_capture(State(bridge): State<Arc<Bridge>>) -> ApiResult {
    bridge.recorder().start_server().await?;
    let bones = bridge.recorder().get_current_state().bones;
    if bones.is_empty() {
        return Err(ApiError::bad_request(
            "No bone data received from the host. Make sure VMC sending is enabled.",
        ));
    }
    let bone_count = bones.len();
    bridge.rest_pose().set(bones)?;
    Ok(Json(json!({ "status": "captured", "bone_count": bone_count })))
}

async fn rest_pose_reset(State(bridge): State<Arc<Bridge>>) -> ApiResult {
    bridge.rest_pose().reset()?;
    Ok(Json(json!({ "status": "reset" })))
}

// ── Direct control ───────────────────────────────────────────────────

async fn blendshapes_send(
    State(bridge): State<Arc<Bridge>>,
    Json(request): Json<BlendshapeRequest>,
) -> ApiResult {
    bridge.sender().send_blendshapes(&request.blendshapes).await?;
    Ok(Json(json!({
        "status": "sent",
        "count": request.blendshapes.len(),
    })))
}

// ── Emotion ──────────────────────────────────────────────────────────

async fn emotion_detect(
    State(bridge): State<Arc<Bridge>>,
    Json(request): Json<TextRequest>,
) -> ApiResult {
    let emotion = bridge.classifier().detect(&request.text);
    let preset = emotion.and_then(preset_for_emotion);
    Ok(Json(json!({ "emotion": emotion, "preset": preset })))
}

async fn emotion_mappings(State(_bridge): State<Arc<Bridge>>) -> ApiResult {
    let mappings: BTreeMap<&str, &str> = EMOTION_PRESET_MAP.into_iter().collect();
    Ok(Json(serde_json::to_value(mappings).unwrap_or_default()))
}

async fn emotion_trigger(
    State(bridge): State<Arc<Bridge>>,
    Json(request): Json<TextRequest>,
) -> ApiResult {
    match bridge.trigger_emotion(&request.text) {
        Some(preset) => Ok(Json(json!({ "status": "triggered", "preset": preset }))),
        None => Ok(Json(json!({ "status": "none", "preset": Value::Null }))),
    }
}
