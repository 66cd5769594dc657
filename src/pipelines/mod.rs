//! Render pipelines.
//!
//! - `basic` draws opaque meshes with the standard material shader
//! - `transparent` draws alpha blended meshes (the video screen) after them
//! - `light` holds the spotlight and its uniform

pub mod basic;
pub mod light;
pub mod transparent;
