//! Marionette Transport - Outbound UDP toward the avatar host
//!
//! Fire-and-forget datagrams: no send awaits acknowledgement, and loss is
//! tolerated by design. The host applies blendshapes only at the
//! `Blend/Apply` barrier; bone updates take effect individually.

pub mod sender;

pub use sender::*;
