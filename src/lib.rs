//! Brick arena driving sandbox.
//!
//! A raycast-suspension car in an arena of trees, rocks and stacked bricks.
//! Rigid body dynamics run on rapier; this crate adds the fixed-step driver
//! with its sleep policy, the vehicle controller, the scene graph and the
//! reconciler that keeps scene nodes in step with their bodies.

pub mod arena;
pub mod body;
pub mod bricks;
pub mod config;
pub mod debug_builders;
pub mod error;
pub mod input;
pub mod net;
pub mod physics;
pub mod reconcile;
pub mod scene;
pub mod simulation;
pub mod state;
pub mod suspension_contact;
pub mod tire;
pub mod vehicle;

pub use error::{Result, SandboxError};
pub use simulation::{FrameReport, Simulation};
