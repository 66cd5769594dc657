//! Loading indicator shown while the model is fetched.
//!
//! [`LoadingUi`] wraps a platform [`LoadingScreen`] and guarantees it is
//! displayed at most once and hidden at most once, after it was displayed.

use std::sync::Arc;

use winit::window::Window;

pub trait LoadingScreen {
    fn display(&mut self);
    fn hide(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadingState {
    Idle,
    Shown,
    Hidden,
}

pub struct LoadingUi {
    screen: Box<dyn LoadingScreen>,
    state: LoadingState,
}

impl std::fmt::Debug for LoadingUi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingUi").field("state", &self.state).finish()
    }
}

impl LoadingUi {
    pub fn new(screen: Box<dyn LoadingScreen>) -> Self {
        Self {
            screen,
            state: LoadingState::Idle,
        }
    }

    pub fn state(&self) -> LoadingState {
        self.state
    }

    /// Returns `false` if the indicator was already displayed before.
    pub fn display(&mut self) -> bool {
        if self.state != LoadingState::Idle {
            return false;
        }
        self.screen.display();
        self.state = LoadingState::Shown;
        true
    }

    /// Returns `false` unless the indicator is currently displayed.
    pub fn hide(&mut self) -> bool {
        if self.state != LoadingState::Shown {
            return false;
        }
        self.screen.hide();
        self.state = LoadingState::Hidden;
        log::info!("loading finished");
        true
    }
}

/// Shows progress in the window title.
pub struct WindowTitle {
    window: Arc<Window>,
    title: String,
}

impl WindowTitle {
    pub fn new(window: Arc<Window>, title: impl Into<String>) -> Self {
        Self {
            window,
            title: title.into(),
        }
    }
}

impl LoadingScreen for WindowTitle {
    fn display(&mut self) {
        self.window.set_title(&format!("{} (loading...)", self.title));
    }

    fn hide(&mut self) {
        self.window.set_title(&self.title);
    }
}

/// A full page overlay above the canvas.
#[cfg(target_arch = "wasm32")]
pub struct LoadingOverlay {
    element: Option<web_sys::HtmlElement>,
}

#[cfg(target_arch = "wasm32")]
impl LoadingOverlay {
    const ID: &'static str = "tvSceneLoadingOverlay";

    pub fn new() -> Self {
        Self { element: None }
    }

    fn create() -> Option<web_sys::HtmlElement> {
        use wasm_bindgen::JsCast;

        let document = web_sys::window()?.document()?;
        let element: web_sys::HtmlElement = document.create_element("div").ok()?.dyn_into().ok()?;
        element.set_id(Self::ID);
        element.set_text_content(Some("Loading..."));
        let style = element.style();
        for (property, value) in [
            ("position", "fixed"),
            ("inset", "0"),
            ("display", "flex"),
            ("align-items", "center"),
            ("justify-content", "center"),
            ("background", "#000000"),
            ("color", "#ffffff"),
            ("font-family", "sans-serif"),
            ("z-index", "10"),
        ] {
            let _ = style.set_property(property, value);
        }
        document.body()?.append_child(&element).ok()?;
        Some(element)
    }
}

#[cfg(target_arch = "wasm32")]
impl Default for LoadingOverlay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_arch = "wasm32")]
impl LoadingScreen for LoadingOverlay {
    fn display(&mut self) {
        self.element = Self::create();
        if self.element.is_none() {
            log::warn!("cannot create the loading overlay");
        }
    }

    fn hide(&mut self) {
        if let Some(element) = self.element.take() {
            element.remove();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    /// Records every call it receives.
    #[derive(Clone, Default)]
    pub(crate) struct Recorder(pub Rc<RefCell<Vec<&'static str>>>);

    impl LoadingScreen for Recorder {
        fn display(&mut self) {
            self.0.borrow_mut().push("display");
        }

        fn hide(&mut self) {
            self.0.borrow_mut().push("hide");
        }
    }

    #[test]
    fn displays_and_hides_exactly_once() {
        let recorder = Recorder::default();
        let mut ui = LoadingUi::new(Box::new(recorder.clone()));
        assert_eq!(ui.state(), LoadingState::Idle);
        assert!(ui.display());
        assert!(!ui.display());
        assert!(ui.hide());
        assert!(!ui.hide());
        assert!(!ui.display());
        assert_eq!(ui.state(), LoadingState::Hidden);
        assert_eq!(*recorder.0.borrow(), vec!["display", "hide"]);
    }

    #[test]
    fn cannot_hide_what_was_never_shown() {
        let recorder = Recorder::default();
        let mut ui = LoadingUi::new(Box::new(recorder.clone()));
        assert!(!ui.hide());
        assert_eq!(ui.state(), LoadingState::Idle);
        assert!(recorder.0.borrow().is_empty());
    }
}
