//! Scene configuration.
//!
//! Everything the scene needs to know before it is constructed lives in
//! [`SceneConfig`]. There are no config files or environment variables: the
//! entry point builds a config (usually [`SceneConfig::default`]) and hands it
//! to [`crate::scene::TvScene::new`].

/// Construction-time settings for [`crate::scene::TvScene`].
#[derive(Clone, Debug, PartialEq)]
pub struct SceneConfig {
    /// DOM id of the `<canvas>` the scene renders into (web only).
    pub canvas_id: String,
    /// Native window title. The loading indicator appends to it.
    pub title: String,
    /// glTF binary, relative to the asset root.
    pub model_path: String,
    /// Video played on the `Screen` mesh, relative to the asset root.
    pub video_source: String,
    /// Overlay a scene inspector once [`crate::scene::TvScene::run`] is called.
    pub debug_inspector: bool,
    pub clear_colour: wgpu::Color,
    /// Hex notation, e.g. `#ffffff`.
    pub ambient_colour: String,
}

impl SceneConfig {
    pub const CANVAS_ID: &'static str = "renderCanvas";
    pub const MODEL_PATH: &'static str = "models/tv.glb";

    // Browsers decode the mp4 for us, native builds play an animated gif of the same clip.
    #[cfg(target_arch = "wasm32")]
    pub const VIDEO_SOURCE: &'static str = "videoplayback.mp4";
    #[cfg(not(target_arch = "wasm32"))]
    pub const VIDEO_SOURCE: &'static str = "videoplayback.gif";

    pub fn with_debug_inspector(mut self, enabled: bool) -> Self {
        self.debug_inspector = enabled;
        self
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            canvas_id: Self::CANVAS_ID.to_string(),
            title: "tv-scene".to_string(),
            model_path: Self::MODEL_PATH.to_string(),
            video_source: Self::VIDEO_SOURCE.to_string(),
            debug_inspector: false,
            clear_colour: wgpu::Color {
                r: 0.1,
                g: 0.1,
                b: 0.1,
                a: 1.0,
            },
            ambient_colour: "#ffffff".to_string(),
        }
    }
}

/// Parse `#rrggbb` into linear-ish `[r, g, b]` in `0.0..=1.0`.
///
/// Values are taken as-is (no sRGB decoding).
pub fn colour_from_hex(hex: &str) -> anyhow::Result<[f32; 3]> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.is_ascii() {
        anyhow::bail!("expected a colour of the form #rrggbb, got {hex:?}");
    }
    let channel = |range: std::ops::Range<usize>| -> anyhow::Result<f32> {
        let value = u8::from_str_radix(&digits[range], 16)
            .map_err(|e| anyhow::anyhow!("invalid colour {hex:?}: {e}"))?;
        Ok(f32::from(value) / 255.0)
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_inspector_is_off_by_default() {
        let config = SceneConfig::default();
        assert!(!config.debug_inspector);
        assert!(config.with_debug_inspector(true).debug_inspector);
    }

    #[test]
    fn default_points_at_the_tv_assets() {
        let config = SceneConfig::default();
        assert_eq!(config.canvas_id, "renderCanvas");
        assert_eq!(config.model_path, "models/tv.glb");
        assert_eq!(config.clear_colour.r, 0.1);
        assert_eq!(config.clear_colour.a, 1.0);
    }

    #[test]
    fn parses_hex_colours() {
        assert_eq!(colour_from_hex("#ffffff").unwrap(), [1.0, 1.0, 1.0]);
        let [r, g, b] = colour_from_hex("#f0f0f0").unwrap();
        assert!((r - 240.0 / 255.0).abs() < f32::EPSILON);
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(colour_from_hex("000000").unwrap(), [0.0; 3]);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(colour_from_hex("#fff").is_err());
        assert!(colour_from_hex("#gggggg").is_err());
        assert!(colour_from_hex("#ffffffff").is_err());
    }
}
