//! Error types for the Marionette bridge

use thiserror::Error;

/// Core Marionette errors
#[derive(Error, Debug)]
pub enum MarionetteError {
    // Wire errors
    #[error("Invalid OSC packet: {0}")]
    InvalidPacket(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown OSC address: {0}")]
    UnknownAddress(String),

    #[error("Unexpected arguments for {address}: {tags}")]
    ArgumentMismatch { address: String, tags: String },

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    // Storage errors
    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    #[error("Invalid preset document '{name}': {reason}")]
    InvalidPreset { name: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for Marionette operations
pub type MarionetteResult<T> = Result<T, MarionetteError>;
