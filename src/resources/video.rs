//! Video textures.
//!
//! A [`VideoTexture`] is a GPU texture whose pixels are replaced every frame
//! by a [`VideoSource`]. Browsers decode the video for us through an
//! `HtmlVideoElement`; native builds play a pre-decoded animated GIF as a
//! [`FrameSequence`].

use std::time::Duration;

use crate::data_structures::texture::Texture;

/// Playback behaviour of a video texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoTextureSettings {
    pub muted: bool,
    pub autoplay: bool,
    pub looping: bool,
}

impl Default for VideoTextureSettings {
    fn default() -> Self {
        Self {
            muted: false,
            autoplay: true,
            looping: true,
        }
    }
}

/// Everything needed to create a video texture once a device is at hand.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoTextureDesc {
    pub name: String,
    /// Candidate sources, the first one that loads wins.
    pub sources: Vec<String>,
    /// Keep the frame's first row at the top of the texture (v = 0).
    pub invert_y: bool,
    pub settings: VideoTextureSettings,
}

pub trait VideoSource {
    /// Frame size in pixels, `[0, 0]` while unknown.
    fn dimensions(&self) -> [u32; 2];

    fn play(&mut self);

    fn is_playing(&self) -> bool;

    /// Advance playback by `dt` and copy the current frame into `target` if it changed.
    fn present(&mut self, dt: Duration, queue: &wgpu::Queue, target: &Texture);
}

#[cfg(not(target_arch = "wasm32"))]
pub type BoxedVideoSource = Box<dyn VideoSource + Send>;
#[cfg(target_arch = "wasm32")]
pub type BoxedVideoSource = Box<dyn VideoSource>;

/// Something a [`ReadyAction::PlayVideo`](crate::data_structures::scene_graph::ReadyAction) can start.
pub trait Playback {
    fn play(&mut self);
}

impl<S: VideoSource + ?Sized> Playback for Box<S> {
    fn play(&mut self) {
        VideoSource::play(self.as_mut());
    }
}

pub struct VideoTexture {
    pub desc: VideoTextureDesc,
    pub texture: Texture,
    source: BoxedVideoSource,
}

impl std::fmt::Debug for VideoTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoTexture")
            .field("desc", &self.desc)
            .field("dimensions", &self.source.dimensions())
            .field("playing", &self.source.is_playing())
            .finish()
    }
}

impl Playback for VideoTexture {
    fn play(&mut self) {
        log::info!("starting playback of {}", self.desc.name);
        VideoSource::play(self.source.as_mut());
    }
}

impl VideoTexture {
    pub fn new(device: &wgpu::Device, desc: VideoTextureDesc, source: BoxedVideoSource) -> Self {
        let texture = Texture::create_video_target(device, source.dimensions(), &desc.name);
        Self {
            desc,
            texture,
            source,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.source.is_playing()
    }

    /// Push the current frame to the GPU.
    ///
    /// Returns `true` when the target texture had to be recreated because the
    /// video size became known or changed; bind groups sampling it are stale then.
    pub fn present(&mut self, dt: Duration, device: &wgpu::Device, queue: &wgpu::Queue) -> bool {
        let [width, height] = self.source.dimensions();
        let size = self.texture.texture.size();
        let resized = width > 0 && height > 0 && (size.width != width || size.height != height);
        if resized {
            log::debug!("video {} is {width}x{height}", self.desc.name);
            self.texture = Texture::create_video_target(device, [width, height], &self.desc.name);
        }
        self.source.present(dt, queue, &self.texture);
        resized
    }
}

/// Load the first source of `desc` that works.
pub async fn load_video_source(desc: &VideoTextureDesc) -> anyhow::Result<BoxedVideoSource> {
    let mut last_error = anyhow::anyhow!("video texture {} has no sources", desc.name);
    for source in &desc.sources {
        #[cfg(not(target_arch = "wasm32"))]
        let loaded = match super::texture::load_binary(source).await {
            Ok(bytes) => FrameSequence::decode_gif(&bytes, desc.settings).map(|mut video| {
                // Decoded rows run top to bottom, which is what `invert_y` asks for
                if !desc.invert_y {
                    video.flip_vertically();
                }
                Box::new(video) as BoxedVideoSource
            }),
            Err(e) => Err(e),
        };
        #[cfg(target_arch = "wasm32")]
        let loaded = web::HtmlVideoSource::new(source, desc.settings, desc.invert_y)
            .map(|video| Box::new(video) as BoxedVideoSource);

        match loaded {
            Ok(video) => return Ok(video),
            Err(e) => {
                log::warn!("video source {source} failed: {e:#}");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// A decoded frame and how long it stays on screen.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub rgba: Vec<u8>,
    pub delay: Duration,
}

/// Pre-decoded frames played back on a timer.
#[derive(Debug)]
pub struct FrameSequence {
    frames: Vec<VideoFrame>,
    size: [u32; 2],
    settings: VideoTextureSettings,
    current: usize,
    position: Duration,
    playing: bool,
    uploaded: Option<usize>,
}

impl FrameSequence {
    /// Browsers treat shorter GIF delays as this.
    const MIN_FRAME_DELAY: Duration = Duration::from_millis(20);
    const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

    /// Delays shorter than 20 ms are raised to 20 ms.
    pub fn new(
        mut frames: Vec<VideoFrame>,
        size: [u32; 2],
        settings: VideoTextureSettings,
    ) -> anyhow::Result<Self> {
        if frames.is_empty() {
            anyhow::bail!("a video needs at least one frame");
        }
        let expected = 4 * size[0] as usize * size[1] as usize;
        if let Some(bad) = frames.iter().position(|f| f.rgba.len() != expected) {
            anyhow::bail!("frame {bad} does not match the video size {size:?}");
        }
        // A zero delay would never let the playhead leave its frame
        for frame in &mut frames {
            frame.delay = frame.delay.max(Self::MIN_FRAME_DELAY);
        }
        Ok(Self {
            frames,
            size,
            settings,
            current: 0,
            position: Duration::ZERO,
            playing: settings.autoplay,
            uploaded: None,
        })
    }

    pub fn decode_gif(bytes: &[u8], settings: VideoTextureSettings) -> anyhow::Result<Self> {
        use image::AnimationDecoder;

        let decoder = image::codecs::gif::GifDecoder::new(std::io::Cursor::new(bytes))?;
        let frames = decoder.into_frames().collect_frames()?;
        let size = frames
            .first()
            .map(|f| [f.buffer().width(), f.buffer().height()])
            .unwrap_or([0, 0]);
        let frames = frames
            .into_iter()
            .map(|frame| {
                let (numer, denom) = frame.delay().numer_denom_ms();
                let millis = if denom == 0 { 0 } else { numer / denom };
                let delay = match Duration::from_millis(u64::from(millis)) {
                    d if d.is_zero() => Self::DEFAULT_FRAME_DELAY,
                    d => d,
                };
                VideoFrame {
                    rgba: frame.into_buffer().into_raw(),
                    delay,
                }
            })
            .collect();
        Self::new(frames, size, settings)
    }

    /// Mirror every frame top to bottom.
    pub fn flip_vertically(&mut self) {
        let row = 4 * self.size[0] as usize;
        if row == 0 {
            return;
        }
        for frame in &mut self.frames {
            let flipped: Vec<u8> = frame.rgba.chunks_exact(row).rev().flatten().copied().collect();
            frame.rgba = flipped;
        }
        self.uploaded = None;
    }

    pub fn current_frame(&self) -> usize {
        self.current
    }

    pub fn settings(&self) -> VideoTextureSettings {
        self.settings
    }

    /// Advance the playhead. Returns `true` if the visible frame changed.
    pub fn advance(&mut self, dt: Duration) -> bool {
        if !self.playing {
            return false;
        }
        let before = self.current;
        self.position += dt;
        while self.position >= self.frames[self.current].delay {
            self.position -= self.frames[self.current].delay;
            if self.current + 1 < self.frames.len() {
                self.current += 1;
            } else if self.settings.looping {
                self.current = 0;
            } else {
                self.playing = false;
                self.position = Duration::ZERO;
                break;
            }
        }
        self.current != before
    }
}

impl VideoSource for FrameSequence {
    fn dimensions(&self) -> [u32; 2] {
        self.size
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn present(&mut self, dt: Duration, queue: &wgpu::Queue, target: &Texture) {
        self.advance(dt);
        if self.uploaded != Some(self.current) {
            target.write_rgba(queue, &self.frames[self.current].rgba, self.size);
            self.uploaded = Some(self.current);
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub mod web {
    use std::time::Duration;

    use anyhow::Context as _;
    use wasm_bindgen::JsCast;

    use super::{VideoSource, VideoTextureSettings};
    use crate::{data_structures::texture::Texture, resources::texture::format_url};

    /// `HAVE_CURRENT_DATA` in the HTMLMediaElement ready states.
    const HAVE_CURRENT_DATA: u16 = 2;

    pub struct HtmlVideoSource {
        video: web_sys::HtmlVideoElement,
        flip_y: bool,
    }

    impl HtmlVideoSource {
        pub fn new(
            source: &str,
            settings: VideoTextureSettings,
            invert_y: bool,
        ) -> anyhow::Result<Self> {
            let document = web_sys::window()
                .and_then(|w| w.document())
                .context("no document to create a <video> in")?;
            let video: web_sys::HtmlVideoElement = document
                .create_element("video")
                .map_err(|e| anyhow::anyhow!("cannot create <video>: {e:?}"))?
                .dyn_into()
                .map_err(|_| anyhow::anyhow!("<video> is not an HtmlVideoElement"))?;
            video.set_muted(settings.muted);
            video.set_autoplay(settings.autoplay);
            video.set_loop(settings.looping);
            video.set_cross_origin(Some("anonymous"));
            let _ = video.set_attribute("playsinline", "");
            video.set_src(format_url(source)?.as_str());
            Ok(Self {
                video,
                flip_y: !invert_y,
            })
        }
    }

    impl VideoSource for HtmlVideoSource {
        fn dimensions(&self) -> [u32; 2] {
            [self.video.video_width(), self.video.video_height()]
        }

        fn play(&mut self) {
            if let Err(e) = self.video.play() {
                log::warn!("video playback was refused: {e:?}");
            }
        }

        fn is_playing(&self) -> bool {
            !self.video.paused()
        }

        fn present(&mut self, _: Duration, queue: &wgpu::Queue, target: &Texture) {
            let [width, height] = self.dimensions();
            let size = target.texture.size();
            if self.video.ready_state() < HAVE_CURRENT_DATA
                || size.width != width
                || size.height != height
            {
                return;
            }
            queue.copy_external_image_to_texture(
                &wgpu::CopyExternalImageSourceInfo {
                    source: wgpu::ExternalImageSource::HTMLVideoElement(self.video.clone()),
                    origin: wgpu::Origin2d::ZERO,
                    flip_y: self.flip_y,
                },
                wgpu::CopyExternalImageDestInfo {
                    texture: &target.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                    color_space: wgpu::PredefinedColorSpace::Srgb,
                    premultiplied_alpha: false,
                },
                size,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(delays_ms: &[u64]) -> Vec<VideoFrame> {
        delays_ms
            .iter()
            .map(|&ms| VideoFrame {
                rgba: vec![0; 4],
                delay: Duration::from_millis(ms),
            })
            .collect()
    }

    fn settings(autoplay: bool, looping: bool) -> VideoTextureSettings {
        VideoTextureSettings {
            muted: true,
            autoplay,
            looping,
        }
    }

    #[test]
    fn looping_playback_wraps_around() {
        let mut video = FrameSequence::new(frames(&[100, 100, 100]), [1, 1], settings(true, true)).unwrap();
        assert!(!video.advance(Duration::from_millis(50)));
        assert!(video.advance(Duration::from_millis(60)));
        assert_eq!(video.current_frame(), 1);
        video.advance(Duration::from_millis(200));
        assert_eq!(video.current_frame(), 0);
        assert!(video.is_playing());
    }

    #[test]
    fn stops_on_the_last_frame_without_loop() {
        let mut video = FrameSequence::new(frames(&[100, 100]), [1, 1], settings(true, false)).unwrap();
        video.advance(Duration::from_secs(5));
        assert_eq!(video.current_frame(), 1);
        assert!(!video.is_playing());
    }

    #[test]
    fn waits_for_play_without_autoplay() {
        let mut video = FrameSequence::new(frames(&[30, 30]), [1, 1], settings(false, true)).unwrap();
        assert!(!video.advance(Duration::from_secs(1)));
        video.play();
        assert!(video.advance(Duration::from_millis(35)));
    }

    #[test]
    fn zero_delays_are_raised_to_the_minimum() {
        let mut video = FrameSequence::new(frames(&[0]), [1, 1], settings(true, true)).unwrap();
        assert_eq!(video.frames[0].delay, FrameSequence::MIN_FRAME_DELAY);
        // A single looping frame wraps onto itself and returns
        assert!(!video.advance(Duration::from_millis(16)));
        assert!(!video.advance(Duration::from_secs(1)));
        assert!(video.is_playing());

        let mut video = FrameSequence::new(frames(&[0, 0, 0]), [1, 1], settings(true, true)).unwrap();
        video.advance(Duration::from_millis(45));
        assert_eq!(video.current_frame(), 2);
    }

    #[test]
    fn flips_frames_upside_down() {
        let top = [1, 1, 1, 1, 2, 2, 2, 2];
        let bottom = [3, 3, 3, 3, 4, 4, 4, 4];
        let frame = VideoFrame {
            rgba: [top, bottom].concat(),
            delay: Duration::from_millis(100),
        };
        let mut video = FrameSequence::new(vec![frame], [2, 2], settings(true, true)).unwrap();
        video.flip_vertically();
        assert_eq!(video.frames[0].rgba, [bottom, top].concat());
    }

    #[test]
    fn rejects_empty_or_mis_sized_frames() {
        assert!(FrameSequence::new(Vec::new(), [1, 1], settings(true, true)).is_err());
        assert!(FrameSequence::new(frames(&[10]), [2, 2], settings(true, true)).is_err());
    }

    #[test]
    fn decodes_animated_gifs() {
        use image::{Delay, Frame, RgbaImage, codecs::gif::GifEncoder};

        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut bytes);
            let red = RgbaImage::from_pixel(4, 2, image::Rgba([255, 0, 0, 255]));
            let blue = RgbaImage::from_pixel(4, 2, image::Rgba([0, 0, 255, 255]));
            encoder
                .encode_frames([
                    Frame::from_parts(red, 0, 0, Delay::from_numer_denom_ms(50, 1)),
                    Frame::from_parts(blue, 0, 0, Delay::from_numer_denom_ms(0, 1)),
                ])
                .unwrap();
        }
        let video = FrameSequence::decode_gif(&bytes, settings(true, true)).unwrap();
        assert_eq!(video.dimensions(), [4, 2]);
        assert_eq!(video.frames.len(), 2);
        assert_eq!(video.frames[0].delay, Duration::from_millis(50));
        assert_eq!(video.frames[1].delay, FrameSequence::DEFAULT_FRAME_DELAY);
        assert_eq!(&video.frames[1].rgba[..4], &[0, 0, 255, 255]);
    }
}
