//! Results of background work, delivered to the event loop.

use std::future::Future;

use winit::event_loop::EventLoopProxy;

use crate::{
    data_structures::material::TextureId,
    resources::{LoadedModel, video::BoxedVideoSource},
};

pub enum SceneEvent {
    /// The scene finished its asynchronous construction (web only).
    #[cfg(target_arch = "wasm32")]
    Initialized(anyhow::Result<Box<super::TvScene>>),
    ModelLoaded(anyhow::Result<LoadedModel>),
    VideoLoaded(TextureId, anyhow::Result<BoxedVideoSource>),
}

impl std::fmt::Debug for SceneEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let outcome = |ok: bool| if ok { "Ok(..)" } else { "Err(..)" };
        match self {
            #[cfg(target_arch = "wasm32")]
            Self::Initialized(scene) => f.debug_tuple("Initialized").field(&outcome(scene.is_ok())).finish(),
            Self::ModelLoaded(model) => f.debug_tuple("ModelLoaded").field(&outcome(model.is_ok())).finish(),
            Self::VideoLoaded(texture, video) => f
                .debug_tuple("VideoLoaded")
                .field(texture)
                .field(&outcome(video.is_ok()))
                .finish(),
        }
    }
}

/// `Send` natively. Browser futures stay on the main thread and need not be.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send> MaybeSend for T {}
#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T> MaybeSend for T {}

/// Runs futures off the event loop and posts their result back to it.
///
/// Natively the futures run on the tokio runtime, in the browser on the
/// page's microtask queue.
#[derive(Clone)]
pub struct Spawner {
    #[cfg(not(target_arch = "wasm32"))]
    handle: tokio::runtime::Handle,
    proxy: EventLoopProxy<SceneEvent>,
}

impl Spawner {
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(handle: tokio::runtime::Handle, proxy: EventLoopProxy<SceneEvent>) -> Self {
        Self { handle, proxy }
    }

    #[cfg(target_arch = "wasm32")]
    pub fn new(proxy: EventLoopProxy<SceneEvent>) -> Self {
        Self { proxy }
    }

    pub fn proxy(&self) -> &EventLoopProxy<SceneEvent> {
        &self.proxy
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = SceneEvent> + MaybeSend + 'static,
    {
        let proxy = self.proxy.clone();
        let task = async move {
            let event = future.await;
            if let Err(e) = proxy.send_event(event) {
                log::warn!("event loop closed before {:?} arrived", e.0);
            }
        };
        #[cfg(not(target_arch = "wasm32"))]
        self.handle.spawn(task);
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(task);
    }
}
