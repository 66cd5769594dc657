//! tv-scene
//!
//! An interactive wgpu scene of a television on a cabinet playing a looping
//! video, for native windows and the browser. The camera zooms in on the
//! screen once the page opens and is handed to the user afterwards.
//!
//! High-level modules
//! - `app`: the winit application and [`app::run`], the entry point
//! - `scene`: the scene orchestrator and the setup stages run on the loaded model
//! - `camera`: the orbit camera, its projection and uniforms
//! - `animation`: property tweens with completion handles
//! - `context`: window, surface, device and queue
//! - `data_structures`: the CPU scene graph, materials and GPU meshes/textures
//! - `pipelines`: render pipelines and the spotlight
//! - `render`: draws the scene graph
//! - `resources`: glTF and video loading
//! - `loading`, `inspector`: loading indicator and debug inspector
//!

pub mod animation;
pub mod app;
pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod inspector;
pub mod loading;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod scene;

pub use config::SceneConfig;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Start the scene once the document has been parsed.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or("no document")?;
    if still_parsing(&document.ready_state()) {
        let on_ready = Closure::once_into_js(launch);
        document.add_event_listener_with_callback("DOMContentLoaded", on_ready.unchecked_ref())?;
    } else {
        launch();
    }
    Ok(())
}

/// `document.readyState` before `DOMContentLoaded` fired.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn still_parsing(ready_state: &str) -> bool {
    ready_state == "loading"
}

#[cfg(target_arch = "wasm32")]
fn launch() {
    if let Err(e) = app::run(SceneConfig::default()) {
        log::error!("tv-scene stopped: {e:#}");
    }
}
