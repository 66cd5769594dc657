//! CPU-side material and texture descriptions.
//!
//! Materials and textures are declared here without touching the GPU so the
//! scene setup can be expressed (and tested) as plain data. The renderer
//! realises a [`StandardMaterial`] into a bind group the first time a node
//! using it is drawn.

use crate::resources::video::VideoTextureDesc;

/// Index into [`crate::data_structures::scene_graph::SceneGraph`]'s materials.
pub type MaterialId = usize;
/// Index into [`crate::data_structures::scene_graph::SceneGraph`]'s textures.
pub type TextureId = usize;

/// Where the pixels of a texture come from.
#[derive(Clone, Debug, PartialEq)]
pub enum TextureSource {
    /// An image decoded while loading a model, by position in the model's image list.
    Image(usize),
    /// Frames streamed from a video.
    Video(VideoTextureDesc),
}

/// A texture as seen by materials. Several materials may share one.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureInfo {
    pub name: String,
    pub source: TextureSource,
    pub has_alpha: bool,
    /// Derive alpha from the luminance of the RGB channels instead of the A channel.
    pub get_alpha_from_rgb: bool,
}

impl TextureInfo {
    pub fn new(name: impl Into<String>, source: TextureSource) -> Self {
        Self {
            name: name.into(),
            source,
            has_alpha: false,
            get_alpha_from_rgb: false,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self.source, TextureSource::Video(_))
    }
}

/// A Blinn-Phong material with optional diffuse and emissive maps.
#[derive(Clone, Debug, PartialEq)]
pub struct StandardMaterial {
    pub name: String,
    pub diffuse_colour: [f32; 3],
    pub alpha: f32,
    pub emissive_colour: [f32; 3],
    /// Multiplied with the scene's ambient colour.
    pub ambient_colour: [f32; 3],
    pub diffuse_texture: Option<TextureId>,
    pub emissive_texture: Option<TextureId>,
    pub use_alpha_from_diffuse_texture: bool,
}

impl StandardMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse_colour: [1.0, 1.0, 1.0],
            alpha: 1.0,
            emissive_colour: [0.0, 0.0, 0.0],
            ambient_colour: [0.0, 0.0, 0.0],
            diffuse_texture: None,
            emissive_texture: None,
            use_alpha_from_diffuse_texture: false,
        }
    }

    /// Whether fragments of this material can be partially transparent.
    ///
    /// `textures` resolves the material's texture ids.
    pub fn needs_alpha_blending(&self, textures: &[TextureInfo]) -> bool {
        let diffuse_has_alpha = self
            .diffuse_texture
            .and_then(|t| textures.get(t))
            .is_some_and(|t| t.has_alpha);
        self.alpha < 1.0 || (self.use_alpha_from_diffuse_texture && diffuse_has_alpha)
    }

    /// Textures that must exist on the GPU before the material can be drawn.
    pub fn textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.diffuse_texture.iter().chain(self.emissive_texture.iter()).copied()
    }
}

pub const WHITE: [f32; 3] = [1.0, 1.0, 1.0];
pub const BLACK: [f32; 3] = [0.0, 0.0, 0.0];

/// Material constants as laid out in the standard shader.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    diffuse: [f32; 4],
    emissive: [f32; 4],
    ambient: [f32; 4],
    // x: alpha from diffuse texture, y: alpha from rgb, z: has emissive texture
    flags: [f32; 4],
}

impl MaterialUniform {
    /// `textures` resolves the material's texture ids.
    pub fn new(material: &StandardMaterial, textures: &[TextureInfo]) -> Self {
        let diffuse = material.diffuse_texture.and_then(|t| textures.get(t));
        let alpha_from_diffuse = material.use_alpha_from_diffuse_texture
            && diffuse.is_some_and(|t| t.has_alpha);
        let alpha_from_rgb = alpha_from_diffuse && diffuse.is_some_and(|t| t.get_alpha_from_rgb);
        let has_emissive_texture = material.emissive_texture.is_some();
        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        let [r, g, b] = material.diffuse_colour;
        let [er, eg, eb] = material.emissive_colour;
        let [ar, ag, ab] = material.ambient_colour;
        Self {
            diffuse: [r, g, b, material.alpha],
            emissive: [er, eg, eb, 1.0],
            ambient: [ar, ag, ab, 1.0],
            flags: [
                flag(alpha_from_diffuse),
                flag(alpha_from_rgb),
                flag(has_emissive_texture),
                0.0,
            ],
        }
    }
}
