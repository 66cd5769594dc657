//! Debug inspector.
//!
//! A plain text report of the scene graph, materials, camera and light. In
//! the browser it is kept up to date in a `<pre>` overlay, natively it is
//! written to the log.

use std::fmt::Write as _;
use std::time::Duration;

use crate::{
    camera::ArcRotateCamera,
    data_structures::scene_graph::SceneGraph,
    pipelines::light::SpotLight,
    scene::Stage,
};

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

pub fn report(graph: &SceneGraph, camera: &Stage<ArcRotateCamera>, light: &SpotLight) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "nodes ({})", graph.len());
    let mut stack: Vec<(usize, usize)> = graph.roots().iter().rev().map(|&r| (r, 0)).collect();
    while let Some((id, depth)) = stack.pop() {
        let Some(node) = graph.node(id) else { continue };
        let flags = node.flags();
        let p = node.world_position();
        let _ = write!(
            out,
            "{:indent$}#{id} {} @ ({:.2}, {:.2}, {:.2})",
            "",
            node.name(),
            p.x,
            p.y,
            p.z,
            indent = 2 * depth + 2
        );
        if node.is_mesh() {
            let materials: Vec<&str> = node
                .primitives()
                .iter()
                .map(|p| {
                    p.material
                        .and_then(|m| graph.material(m))
                        .map_or("default", |m| m.name.as_str())
                })
                .collect();
            let _ = write!(
                out,
                " mesh[{}] pickable={} sync_bounds={} frozen={}",
                materials.join(", "),
                flags.pickable,
                flags.sync_bounding_info,
                flags.world_matrix_frozen
            );
        }
        out.push('\n');
        stack.extend(node.children().iter().rev().map(|&c| (c, depth + 1)));
    }

    let _ = writeln!(out, "materials ({})", graph.materials().len());
    for material in graph.materials() {
        let texture_name = |t: Option<usize>| {
            t.and_then(|t| graph.texture(t))
                .map_or("-", |t| t.name.as_str())
        };
        let _ = writeln!(
            out,
            "  {} diffuse={} emissive={:?}+{} alpha_from_diffuse={}",
            material.name,
            texture_name(material.diffuse_texture),
            material.emissive_colour,
            texture_name(material.emissive_texture),
            material.use_alpha_from_diffuse_texture
        );
    }

    match camera {
        Stage::Uninitialized => {
            let _ = writeln!(out, "camera: not ready");
        }
        Stage::Ready(camera) => {
            let t = camera.target();
            let _ = writeln!(
                out,
                "camera {}: alpha={:.3} beta={:.3} radius={:.3} target=({:.2}, {:.2}, {:.2}) attached={}",
                camera.name,
                camera.alpha,
                camera.beta,
                camera.radius,
                t.x,
                t.y,
                t.z,
                camera.is_attached()
            );
        }
    }
    let _ = writeln!(
        out,
        "light {}: position=({:.2}, {:.2}, {:.2}) angle={:.3} exponent={} intensity={}",
        light.name,
        light.position.x,
        light.position.y,
        light.position.z,
        light.angle,
        light.exponent,
        light.intensity
    );
    out
}

#[derive(Debug, Default)]
pub struct Inspector {
    shown: bool,
    since_refresh: Duration,
    #[cfg(target_arch = "wasm32")]
    overlay: Option<web_sys::HtmlElement>,
}

impl Inspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn show(&mut self, report: String) {
        if self.shown {
            return;
        }
        self.shown = true;
        #[cfg(target_arch = "wasm32")]
        {
            self.overlay = create_overlay();
        }
        self.publish(report);
    }

    /// Publish a fresh report at most once per second.
    pub fn refresh(&mut self, dt: Duration, report: impl FnOnce() -> String) {
        if !self.shown {
            return;
        }
        self.since_refresh += dt;
        if self.since_refresh >= REFRESH_INTERVAL {
            self.since_refresh = Duration::ZERO;
            self.publish(report());
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn publish(&mut self, report: String) {
        log::debug!("scene inspector\n{report}");
    }

    #[cfg(target_arch = "wasm32")]
    fn publish(&mut self, report: String) {
        if let Some(overlay) = &self.overlay {
            overlay.set_text_content(Some(&report));
        } else {
            log::debug!("scene inspector\n{report}");
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn create_overlay() -> Option<web_sys::HtmlElement> {
    use wasm_bindgen::JsCast;

    let document = web_sys::window()?.document()?;
    let pre: web_sys::HtmlElement = document.create_element("pre").ok()?.dyn_into().ok()?;
    let style = pre.style();
    for (property, value) in [
        ("position", "fixed"),
        ("top", "0"),
        ("right", "0"),
        ("max-height", "100%"),
        ("overflow", "auto"),
        ("margin", "0"),
        ("padding", "8px"),
        ("background", "rgba(0, 0, 0, 0.7)"),
        ("color", "#e0e0e0"),
        ("font-size", "11px"),
        ("z-index", "20"),
    ] {
        let _ = style.set_property(property, value);
    }
    document.body()?.append_child(&pre).ok()?;
    Some(pre)
}
