//! Marionette Wire - OSC framing and the VMC message set
//!
//! The bridge speaks three OSC addresses in each direction:
//! - `/VMC/Ext/Blend/Val <string> <float>` - blendshape magnitude
//! - `/VMC/Ext/Blend/Apply` - commit all staged blendshapes
//! - `/VMC/Ext/Bone/Pos <string> <7 floats>` - named bone pose
//!
//! Hosts commonly wrap messages in `#bundle` containers; parsing flattens
//! those transparently.

pub mod message;
pub mod osc;

pub use message::*;
pub use osc::*;
