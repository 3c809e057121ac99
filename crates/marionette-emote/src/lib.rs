//! Marionette Emote - Text-driven animation triggering
//!
//! Keyword-based emotion scoring over generated text, a fixed
//! emotion-to-preset table, and synthetic starter clips so an avatar has
//! animations before anything was ever recorded from the host.

pub mod emotion;
pub mod starters;

pub use emotion::*;
pub use starters::*;
