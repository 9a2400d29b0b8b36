//! Interactive hardware ray-traced scene viewer.
//!
//! The crate is split into the host-side application state (scenes, settings,
//! camera, input) and the `render_system`, which owns every GPU object and
//! drives the per-frame rebuild/render state machine.

pub mod camera;
pub mod error;
pub mod input;
pub mod menu;
pub mod render_system;
pub mod scene;
pub mod settings;
pub mod timing;
