use std::sync::Arc;

use instant::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

use crate::{
    config::SceneConfig,
    loading::LoadingScreen,
    scene::{SceneEvent, Spawner, TvScene},
};

struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: winit::event_loop::EventLoopProxy<SceneEvent>,
    // Taken once the window exists.
    config: Option<SceneConfig>,
    scene: Option<TvScene>,
    error: Option<anyhow::Error>,
    last_time: Instant,
}

impl App {
    fn new(
        event_loop: &EventLoop<SceneEvent>,
        config: SceneConfig,
        #[cfg(not(target_arch = "wasm32"))] async_runtime: tokio::runtime::Runtime,
    ) -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy: event_loop.create_proxy(),
            config: Some(config),
            scene: None,
            error: None,
            last_time: Instant::now(),
        }
    }

    fn spawner(&self) -> Spawner {
        #[cfg(not(target_arch = "wasm32"))]
        return Spawner::new(self.async_runtime.handle().clone(), self.proxy.clone());
        #[cfg(target_arch = "wasm32")]
        return Spawner::new(self.proxy.clone());
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.error = Some(error);
        event_loop.exit();
    }

    fn start(&mut self, mut scene: TvScene) {
        let size = scene.window().inner_size();
        scene.resize(size.width, size.height);
        scene.run();
        self.last_time = Instant::now();
        self.scene = Some(scene);
    }
}

#[allow(unused_mut)]
fn window_attributes(config: &SceneConfig) -> anyhow::Result<winit::window::WindowAttributes> {
    let mut attributes = Window::default_attributes().with_title(config.title.clone());

    #[cfg(target_arch = "wasm32")]
    {
        use anyhow::Context as _;
        use wasm_bindgen::JsCast;
        use winit::platform::web::WindowAttributesExtWebSys;

        let canvas = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id(&config.canvas_id))
            .with_context(|| format!("no element with id {:?}", config.canvas_id))?;
        let canvas: web_sys::HtmlCanvasElement = canvas
            .dyn_into()
            .map_err(|_| anyhow::anyhow!("#{} is not a canvas", config.canvas_id))?;
        attributes = attributes.with_canvas(Some(canvas));
    }

    Ok(attributes)
}

#[allow(unused_variables)]
fn loading_screen(window: &Arc<Window>, config: &SceneConfig) -> Box<dyn LoadingScreen> {
    #[cfg(not(target_arch = "wasm32"))]
    return Box::new(crate::loading::WindowTitle::new(window.clone(), config.title.clone()));
    #[cfg(target_arch = "wasm32")]
    return Box::new(crate::loading::LoadingOverlay::new());
}

impl ApplicationHandler<SceneEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(config) = self.config.take() else {
            return;
        };

        let window = match window_attributes(&config)
            .and_then(|attributes| Ok(event_loop.create_window(attributes)?))
        {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, e.context("cannot create the window")),
        };

        let loading = loading_screen(&window, &config);
        let init_future = TvScene::new(window, config, loading, self.spawner());

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(init_future) {
                Ok(scene) => self.start(scene),
                Err(e) => self.fail(event_loop, e),
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let scene = init_future.await.map(Box::new);
                if proxy.send_event(SceneEvent::Initialized(scene)).is_err() {
                    log::error!("event loop closed during initialization");
                }
            });
        }
    }

    #[cfg_attr(not(target_arch = "wasm32"), allow(unused_variables))]
    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: SceneEvent) {
        match event {
            // This is the message from our wasm `spawn_local`
            #[cfg(target_arch = "wasm32")]
            SceneEvent::Initialized(scene) => match scene {
                Ok(scene) => self.start(*scene),
                Err(e) => self.fail(event_loop, e),
            },
            event => match &mut self.scene {
                Some(scene) => scene.handle_event(event),
                None => log::warn!("dropping {event:?}, the scene is not initialized"),
            },
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let scene = match &mut self.scene {
            Some(scene) => scene,
            None => return,
        };

        scene.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => scene.resize(size.width, size.height),
            WindowEvent::RedrawRequested if scene.is_running() => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();
                match scene.frame(dt) {
                    Ok(()) => scene.window().request_redraw(),
                    Err(e) => self.fail(event_loop, e),
                }
            }
            _ => {}
        }
    }
}

/// Open a window (or take over the configured canvas) and run the scene until it is closed.
pub fn run(config: SceneConfig) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info)?;
    }

    let event_loop: EventLoop<SceneEvent> = EventLoop::with_user_event().build()?;

    #[cfg(not(target_arch = "wasm32"))]
    let mut app = App::new(&event_loop, config, tokio::runtime::Runtime::new()?);
    #[cfg(target_arch = "wasm32")]
    let mut app = App::new(&event_loop, config);

    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
