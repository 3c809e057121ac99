//! Marionette Store - On-disk clip presets and the persistent rest pose
//!
//! Presets live as one JSON document per clip under `<data>/vmc_presets/`.
//! The rest pose is a single bone map at `<data>/vmc_rest_pose.json` with
//! a built-in arms-down default when no file exists.

pub mod presets;
pub mod rest_pose;

pub use presets::*;
pub use rest_pose::*;
