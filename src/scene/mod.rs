//! The television scene.
//!
//! [`TvScene`] owns the GPU context, the scene graph and everything placed in
//! it. Construction sets up colours, the camera with its entrance zoom and the
//! spotlight, then starts loading the model in the background. When the model
//! arrives as a [`SceneEvent::ModelLoaded`] it runs through the [`setup`]
//! stages. [`TvScene::run`] starts rendering.

use std::{f32::consts::PI, sync::Arc, time::Duration};

use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, MouseButton, WindowEvent},
    window::Window,
};

use crate::{
    animation::{Ease, Tween, TweenCompletion},
    camera::ArcRotateCamera,
    config::{SceneConfig, colour_from_hex},
    context::Context,
    data_structures::{
        material::{TextureId, TextureSource},
        scene_graph::SceneGraph,
    },
    inspector::{self, Inspector},
    loading::{LoadingScreen, LoadingUi},
    pipelines::light::{LightResources, SpotLight},
    render::{Renderer, missing_meshes},
    resources::{self, LoadedModel, video::BoxedVideoSource},
};

pub mod event;
pub mod setup;

pub use event::{SceneEvent, Spawner};
pub use setup::TvModel;

/// A value that only exists once its setup completed.
#[derive(Clone, Debug, PartialEq)]
pub enum Stage<T> {
    Uninitialized,
    Ready(T),
}

impl<T> Default for Stage<T> {
    fn default() -> Self {
        Stage::Uninitialized
    }
}

impl<T> Stage<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Stage::Ready(_))
    }

    pub fn as_ref(&self) -> Stage<&T> {
        match self {
            Stage::Uninitialized => Stage::Uninitialized,
            Stage::Ready(value) => Stage::Ready(value),
        }
    }

    pub fn as_mut(&mut self) -> Stage<&mut T> {
        match self {
            Stage::Uninitialized => Stage::Uninitialized,
            Stage::Ready(value) => Stage::Ready(value),
        }
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Stage::Uninitialized => None,
            Stage::Ready(value) => Some(value),
        }
    }
}

/// Radius tween of the camera's entrance. The camera takes user input once it completes.
#[derive(Debug)]
pub struct CameraIntro {
    tween: Tween,
    completion: TweenCompletion,
}

impl CameraIntro {
    pub fn new() -> Self {
        let (tween, completion) = Tween::to(
            2.3,
            Duration::from_secs(5),
            Duration::from_secs(1),
            Ease::PowerInOut(2),
        );
        Self { tween, completion }
    }

    /// Advance the zoom. Returns `true` once the camera has been attached to input.
    pub fn step(&mut self, dt: Duration, camera: &mut ArcRotateCamera) -> bool {
        self.tween.advance(dt, &mut camera.radius);
        if self.completion.is_complete() {
            if !camera.is_attached() {
                log::info!("camera intro finished, attaching controls");
                camera.attach_control();
            }
            return true;
        }
        false
    }
}

impl Default for CameraIntro {
    fn default() -> Self {
        Self::new()
    }
}

/// The orbit camera around the television, before its entrance zoom.
pub fn setup_camera() -> ArcRotateCamera {
    let mut camera = ArcRotateCamera::new(
        "camera1",
        PI / 2.0,
        PI * 45.0,
        5.0,
        cgmath::Point3::new(0.0, 0.0, 0.0),
    );
    camera.panning_sensibility = 0.0;
    camera.allow_upside_down = false;
    camera.wheel_precision = 50.0;
    camera.wheel_delta_percentage = 0.01;
    camera.upper_radius_limit = Some(5.0);
    camera.lower_radius_limit = Some(2.3);
    camera.upper_beta_limit = PI / 2.0 - 0.01;
    camera.lower_beta_limit = 0.01;
    camera.alpha = PI / 2.0;
    camera
}

pub fn setup_lights() -> anyhow::Result<SpotLight> {
    let mut light = SpotLight::new(
        "spotLight",
        cgmath::Point3::new(0.0, 2.5, 1.66),
        cgmath::Vector3::new(0.0, -1.0, 0.0),
        PI / 2.0,
        10.0,
    );
    light.intensity = 30.0;
    light.diffuse = colour_from_hex("#f0f0f0")?;
    light.specular = colour_from_hex("#f0f0f0")?;
    Ok(light)
}

pub struct TvScene {
    ctx: Context,
    config: SceneConfig,
    spawner: Spawner,
    graph: SceneGraph,
    renderer: Renderer,
    light: LightResources,
    camera: Stage<ArcRotateCamera>,
    intro: Option<CameraIntro>,
    model: Stage<TvModel>,
    loading: LoadingUi,
    inspector: Option<Inspector>,
    clear_colour: wgpu::Color,
    ambient_colour: [f32; 3],
    pointer: Option<PhysicalPosition<f64>>,
    running: bool,
}

impl std::fmt::Debug for TvScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TvScene")
            .field("config", &self.config)
            .field("nodes", &self.graph.len())
            .field("renderer", &self.renderer)
            .field("camera", &self.camera)
            .field("model", &self.model)
            .field("loading", &self.loading)
            .field("running", &self.running)
            .finish()
    }
}

impl TvScene {
    pub async fn new(
        window: Arc<Window>,
        config: SceneConfig,
        loading_screen: Box<dyn LoadingScreen>,
        spawner: Spawner,
    ) -> anyhow::Result<Self> {
        let ctx = Context::new(window).await?;
        let mut loading = LoadingUi::new(loading_screen);
        loading.display();

        let clear_colour = config.clear_colour;
        let ambient_colour = colour_from_hex(&config.ambient_colour)?;
        let light = LightResources::new(setup_lights()?, ambient_colour, &ctx.device);
        let renderer = Renderer::new(&ctx, &light);

        let mut scene = Self {
            ctx,
            config,
            spawner,
            graph: SceneGraph::new(),
            renderer,
            light,
            camera: Stage::Uninitialized,
            intro: None,
            model: Stage::Uninitialized,
            loading,
            inspector: None,
            clear_colour,
            ambient_colour,
            pointer: None,
            running: false,
        };
        scene.camera = Stage::Ready(setup_camera());
        scene.intro = Some(CameraIntro::new());
        scene.load_model();
        Ok(scene)
    }

    fn load_model(&self) {
        let path = self.config.model_path.clone();
        let device = self.ctx.device.clone();
        let queue = self.ctx.queue.clone();
        log::info!("loading {path}");
        self.spawner.spawn(async move {
            SceneEvent::ModelLoaded(resources::load_model_gltf(&path, &device, &queue).await)
        });
    }

    fn load_video(&self, texture: TextureId) {
        let Some(TextureSource::Video(desc)) = self.graph.texture(texture).map(|t| t.source.clone())
        else {
            log::warn!("texture {texture} is not a video");
            return;
        };
        self.spawner.spawn(async move {
            SceneEvent::VideoLoaded(texture, resources::video::load_video_source(&desc).await)
        });
    }

    pub fn handle_event(&mut self, event: SceneEvent) {
        match event {
            #[cfg(target_arch = "wasm32")]
            SceneEvent::Initialized(_) => log::warn!("scene is already initialized"),
            SceneEvent::ModelLoaded(model) => self.on_model_loaded(model),
            SceneEvent::VideoLoaded(texture, video) => self.on_video_loaded(texture, video),
        }
    }

    fn on_model_loaded(&mut self, model: anyhow::Result<LoadedModel>) {
        let renderer = &mut self.renderer;
        let wired = setup::accept_model(
            model,
            &mut self.model,
            &mut self.graph,
            &mut self.camera,
            &self.config.video_source,
            &mut self.loading,
            |model, graph| {
                renderer.append(model.meshes, model.images);
                let nodes = graph.append(model.graph);
                let missing = missing_meshes(graph, renderer.mesh_count());
                if !missing.is_empty() {
                    log::warn!("meshes {missing:?} have no GPU data and will not be drawn");
                }
                nodes
            },
        );
        if !wired {
            return;
        }
        if let Stage::Ready(TvModel {
            screen: Some(screen),
            ..
        }) = self.model.as_ref()
        {
            self.load_video(screen.texture);
        }
    }

    fn on_video_loaded(&mut self, texture: TextureId, video: anyhow::Result<BoxedVideoSource>) {
        let source = match video {
            Ok(source) => source,
            Err(e) => {
                log::error!("cannot load the video: {e:#}");
                return;
            }
        };
        let Some(TextureSource::Video(desc)) = self.graph.texture(texture).map(|t| t.source.clone())
        else {
            log::warn!("texture {texture} is not a video");
            return;
        };
        log::info!("video {} ready", desc.name);
        self.renderer.add_video(texture, desc, source, &self.ctx.device);
    }

    pub fn camera(&self) -> Stage<&ArcRotateCamera> {
        self.camera.as_ref()
    }

    pub fn model(&self) -> Stage<&TvModel> {
        self.model.as_ref()
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn clear_colour(&self) -> wgpu::Color {
        self.clear_colour
    }

    pub fn ambient_colour(&self) -> [f32; 3] {
        self.ambient_colour
    }

    pub fn window(&self) -> &Arc<Window> {
        self.ctx.window()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.ctx.resize(width, height);
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        if let Stage::Ready(camera) = &mut self.camera {
            camera.handle_window_event(event);
        }
        match event {
            WindowEvent::CursorMoved { position, .. } => self.pointer = Some(*position),
            WindowEvent::CursorLeft { .. } => self.pointer = None,
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.pick(),
            _ => {}
        }
    }

    fn pick(&self) {
        let (Stage::Ready(camera), Some(pointer)) = (&self.camera, self.pointer) else {
            return;
        };
        let [width, height] = self.ctx.size();
        let Some(ray) =
            camera.cast_ray_from_pointer(pointer, width as f32, height as f32, &self.ctx.projection)
        else {
            return;
        };
        match self.graph.pick(&ray).and_then(|id| self.graph.node(id)) {
            Some(node) => log::debug!("picked {}", node.name()),
            None => log::trace!("picked nothing"),
        }
    }

    /// Show the inspector if configured, then start rendering every frame.
    pub fn run(&mut self) {
        if self.config.debug_inspector {
            let mut inspector = Inspector::new();
            inspector.show(self.report());
            self.inspector = Some(inspector);
        }
        self.running = true;
        self.ctx.window().request_redraw();
    }

    fn report(&self) -> String {
        inspector::report(&self.graph, &self.camera, &self.light.light)
    }

    /// Advance animations by `dt` and draw one frame.
    pub fn frame(&mut self, dt: Duration) -> anyhow::Result<()> {
        if let Stage::Ready(camera) = &mut self.camera {
            if let Some(intro) = &mut self.intro {
                if intro.step(dt, camera) {
                    self.intro = None;
                }
            }
            camera.update();
            self.ctx.write_camera(camera);
        }

        let updated = self.graph.update_world_matrices();
        for (node, action) in self.renderer.prepare(&self.ctx, &mut self.graph, &updated, dt) {
            log::info!("node {node} ready, ran {action:?}");
        }

        if let Some(mut inspector) = self.inspector.take() {
            inspector.refresh(dt, || self.report());
            self.inspector = Some(inspector);
        }

        let eye = match &self.camera {
            Stage::Ready(camera) => camera.position(),
            Stage::Uninitialized => cgmath::Point3::new(0.0, 0.0, 0.0),
        };
        self.renderer
            .render(&self.ctx, &self.graph, &self.light, self.clear_colour, eye)
    }
}
