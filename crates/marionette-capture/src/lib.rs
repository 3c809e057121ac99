//! Marionette Capture - Inbound VMC stream and frame recording
//!
//! A background task listens for host datagrams and keeps a live snapshot
//! of the latest blendshape and bone values. While recording is active,
//! every `Blend/Apply` barrier commits the snapshot as a timestamped
//! frame, rate-capped to the capture frequency.

pub mod recorder;

pub use recorder::*;
