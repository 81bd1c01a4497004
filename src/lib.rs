//! Progressive Monte Carlo path tracer.
//!
//! A frame traces one path per pixel against an intersection engine hidden
//! behind [`render_system::accel::AccelerationStructure`], then folds the
//! result into a running per-pixel mean. Repeated frames of a static view
//! converge on the rendering-equation estimate. The
//! [`render_system::frame::Renderer`] records frames onto an ordered queue
//! with a bounded number in flight, so callers can overlap submission with
//! rendering.

pub mod camera;
pub mod error;
pub mod render_system;
