//! Scene data structures: graph, materials, meshes, textures and instances.
//!
//! - `scene_graph` is the node arena the scene setup works on
//! - `material` describes standard materials and the textures they sample
//! - `model` contains the vertex layout, GPU meshes and the draw helper
//! - `texture` wraps GPU textures and their creation
//! - `instance` holds node transforms and their per-instance GPU layout

pub mod instance;
pub mod material;
pub mod model;
pub mod scene_graph;
pub mod texture;
