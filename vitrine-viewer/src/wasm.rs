//! WASM bindings for the viewers

use crate::assets::{AssetLoader, AssetSource};
use crate::config::{ShowcaseConfig, ViewerOptions};
use crate::error::{Result, ViewerError};
use crate::showcase::ShowcaseSession;
use crate::state::ViewerState;
use crate::viewer::Viewer;
use crate::webgl_backend::{js_error, WebGlBackend};
use async_trait::async_trait;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{HtmlCanvasElement, Response, WebGl2RenderingContext};
use web_time::Instant;

/// Fetches assets over HTTP relative to the page
#[derive(Debug, Clone, Default)]
pub struct HttpSource;

#[async_trait(?Send)]
impl AssetSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let window =
            web_sys::window().ok_or_else(|| ViewerError::Backend("No window".to_string()))?;
        let response: Response = JsFuture::from(window.fetch_with_str(url))
            .await
            .map_err(js_error)?
            .dyn_into()
            .map_err(js_error)?;
        if response.status() == 404 {
            return Err(ViewerError::AssetNotFound(url.to_string()));
        }
        if !response.ok() {
            return Err(ViewerError::Backend(format!("{}: HTTP {}", url, response.status())));
        }
        let buffer = JsFuture::from(response.array_buffer().map_err(js_error)?)
            .await
            .map_err(js_error)?;
        Ok(js_sys::Uint8Array::new(&buffer).to_vec())
    }
}

fn to_js(error: ViewerError) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn canvas_backend(
    canvas_id: &str,
) -> std::result::Result<(HtmlCanvasElement, WebGlBackend), JsValue> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("No document"))?;
    let canvas: HtmlCanvasElement = document
        .get_element_by_id(canvas_id)
        .ok_or_else(|| JsValue::from_str(&format!("Canvas '{}' not found", canvas_id)))?
        .dyn_into()?;
    let gl = canvas
        .get_context("webgl2")?
        .ok_or_else(|| JsValue::from_str("Failed to get WebGL2 context"))?
        .dyn_into::<WebGl2RenderingContext>()?;
    let backend = WebGlBackend::new(gl).map_err(to_js)?;
    Ok((canvas, backend))
}

fn sync_canvas_size(canvas: &HtmlCanvasElement) -> Option<(u32, u32)> {
    let width = canvas.client_width().max(1) as u32;
    let height = canvas.client_height().max(1) as u32;
    if canvas.width() == width && canvas.height() == height {
        return None;
    }
    canvas.set_width(width);
    canvas.set_height(height);
    Some((width, height))
}

/// Orbit-camera glTF viewer bound to a canvas
#[wasm_bindgen]
pub struct WasmViewer {
    canvas: HtmlCanvasElement,
    viewer: Rc<RefCell<Viewer<WebGlBackend>>>,
    loader: Rc<AssetLoader<HttpSource>>,
}

#[wasm_bindgen]
impl WasmViewer {
    /// Create a viewer on `canvas_id`; `options` is a JSON [`ViewerOptions`] object
    #[wasm_bindgen(constructor)]
    pub fn new(
        canvas_id: &str,
        options: Option<String>,
    ) -> std::result::Result<WasmViewer, JsValue> {
        crate::init_logging();
        let options = match options {
            Some(json) => ViewerOptions::from_json(&json).map_err(to_js)?,
            None => ViewerOptions::default(),
        };
        let (canvas, backend) = canvas_backend(canvas_id)?;
        let mut viewer = Viewer::new(backend, options);
        if let Some((width, height)) = sync_canvas_size(&canvas) {
            viewer.resize(width, height);
        }
        log::info!("Viewer initialized on #{}", canvas_id);
        Ok(WasmViewer {
            canvas,
            viewer: Rc::new(RefCell::new(viewer)),
            loader: Rc::new(AssetLoader::new(HttpSource)),
        })
    }

    /// Load a model; resolves once it is shown
    pub fn load(&self, url: String) -> js_sys::Promise {
        let viewer = Rc::clone(&self.viewer);
        let loader = Rc::clone(&self.loader);
        future_to_promise(async move {
            let content = loader.load(&url).await.map_err(to_js)?;
            let request = {
                let mut viewer = viewer.borrow_mut();
                viewer.set_content(content.scene, content.clips).map_err(to_js)?;
                viewer.play_all_clips();
                viewer.pending_environment()
            };
            if let Some(request) = request {
                let result = request.fetch(loader.source()).await;
                if let Err(e) = viewer.borrow_mut().apply_environment(request.generation, result) {
                    log::warn!("Environment {} not applied: {}", request.environment.name, e);
                }
            }
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Current state as JSON
    pub fn state(&self) -> String {
        serde_json::to_string(&self.viewer.borrow().state).unwrap_or_default()
    }

    /// Replace the state from JSON and apply everything except the environment
    pub fn set_state(&self, json: &str) -> std::result::Result<(), JsValue> {
        let state: ViewerState = serde_json::from_str(json).map_err(|e| to_js(e.into()))?;
        let mut viewer = self.viewer.borrow_mut();
        let camera = state.camera.clone();
        viewer.state = state;
        viewer.update_lights();
        viewer.update_texture_encoding();
        viewer.update_background();
        viewer.update_display().map_err(to_js)?;
        viewer.set_camera(&camera).map_err(to_js)
    }

    /// Fetch and apply the environment named in the state
    pub fn update_environment(&self) -> js_sys::Promise {
        let viewer = Rc::clone(&self.viewer);
        let loader = Rc::clone(&self.loader);
        future_to_promise(async move {
            let request = viewer.borrow_mut().update_environment().map_err(to_js)?;
            let result = request.fetch(loader.source()).await;
            let applied = viewer
                .borrow_mut()
                .apply_environment(request.generation, result)
                .map_err(to_js)?;
            Ok(JsValue::from_bool(applied))
        })
    }

    /// Switch to a named camera, or `[default]`
    pub fn set_camera(&self, name: &str) -> std::result::Result<(), JsValue> {
        self.viewer.borrow_mut().set_camera(name).map_err(to_js)
    }

    /// Names the camera selector offers
    pub fn camera_names(&self) -> js_sys::Array {
        self.viewer
            .borrow()
            .camera_names()
            .into_iter()
            .map(JsValue::from)
            .collect()
    }

    /// Play or stop one clip
    pub fn set_action_state(&self, name: &str, playing: bool) -> bool {
        self.viewer.borrow_mut().set_action_state(name, playing)
    }

    /// Log the scene graph
    pub fn print_graph(&self) {
        for line in self.viewer.borrow().print_graph() {
            log::info!("{}", line);
        }
    }

    /// Orbit the default camera by pointer deltas in pixels
    pub fn on_mouse_move(&self, delta_x: f32, delta_y: f32, is_dragging: bool) {
        if !is_dragging {
            return;
        }
        let mut viewer = self.viewer.borrow_mut();
        let (controls, camera) = viewer.controls_mut();
        controls.rotate(camera, delta_x * 0.01, delta_y * 0.01);
    }

    /// Zoom the default camera
    pub fn on_scroll(&self, delta: f32) {
        let mut viewer = self.viewer.borrow_mut();
        let (controls, camera) = viewer.controls_mut();
        controls.dolly(camera, delta * 0.001);
    }

    /// Advance animation and draw; `time_ms` is the animation frame timestamp
    pub fn animate(&self, time_ms: f64) -> std::result::Result<(), JsValue> {
        let mut viewer = self.viewer.borrow_mut();
        if let Some((width, height)) = sync_canvas_size(&self.canvas) {
            viewer.resize(width, height);
        }
        viewer.animate(time_ms).map_err(to_js)
    }
}

/// Multi-model showcase bound to a canvas
#[wasm_bindgen]
pub struct WasmShowcase {
    canvas: HtmlCanvasElement,
    session: Rc<RefCell<ShowcaseSession<WebGlBackend>>>,
    loader: Rc<AssetLoader<HttpSource>>,
    pointer_down: Option<(f32, f32)>,
    dragged: bool,
    last_frame: Instant,
}

#[wasm_bindgen]
impl WasmShowcase {
    /// Create a showcase on `canvas_id`; `config` is a JSON [`ShowcaseConfig`] object
    #[wasm_bindgen(constructor)]
    pub fn new(
        canvas_id: &str,
        config: Option<String>,
    ) -> std::result::Result<WasmShowcase, JsValue> {
        crate::init_logging();
        let config = match config {
            Some(json) => ShowcaseConfig::from_json(&json).map_err(to_js)?,
            None => ShowcaseConfig::default(),
        };
        let (canvas, backend) = canvas_backend(canvas_id)?;
        let mut session = ShowcaseSession::new(backend, config).map_err(to_js)?;
        if let Some((width, height)) = sync_canvas_size(&canvas) {
            session.resize(width, height);
        }
        Ok(WasmShowcase {
            canvas,
            session: Rc::new(RefCell::new(session)),
            loader: Rc::new(AssetLoader::new(HttpSource)),
            pointer_down: None,
            dragged: false,
            last_frame: Instant::now(),
        })
    }

    /// Load the environment and every model; resolves to the number of models loaded
    pub fn load(&self) -> js_sys::Promise {
        let session = Rc::clone(&self.session);
        let loader = Rc::clone(&self.loader);
        future_to_promise(async move {
            let request = session.borrow().environment_request().map_err(to_js)?;
            match request.fetch(loader.source()).await {
                Ok(map) => session.borrow_mut().set_environment(map).map_err(to_js)?,
                Err(e) => log::error!("Environment {} failed: {}", request.environment.name, e),
            }

            let visible = session.borrow_mut().begin_loading();
            let mut loaded = 0u32;
            for config in visible {
                let result = match loader.load(&config.url()).await {
                    Ok(content) => session.borrow_mut().add_model(&config, content),
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => loaded += 1,
                    Err(e) => log::error!("Failed to load {}: {}", config.title, e),
                }
            }
            Ok(JsValue::from(loaded))
        })
    }

    /// Radio button click
    pub fn select_camera(&self, title: &str) -> std::result::Result<(), JsValue> {
        self.session.borrow_mut().select_camera(title).map_err(to_js)
    }

    /// Titles of the selector buttons and the checked one, as JSON
    pub fn selector(&self) -> String {
        let session = self.session.borrow();
        let selector = &session.scene().selector;
        let buttons: Vec<_> = selector
            .buttons()
            .iter()
            .map(|b| serde_json::json!({ "title": b.title, "checked": b.checked }))
            .collect();
        serde_json::Value::from(buttons).to_string()
    }

    /// Text of the dose label
    pub fn label(&self) -> String {
        self.session.borrow().label()
    }

    /// Pointer pressed at normalized device coordinates
    pub fn pointer_down(&mut self, ndc_x: f32, ndc_y: f32) {
        self.pointer_down = Some((ndc_x, ndc_y));
        self.dragged = false;
    }

    /// Pointer moved by `dx`/`dy` pixels while pressed
    pub fn pointer_move(&mut self, dx: f32, dy: f32) -> std::result::Result<(), JsValue> {
        let Some((x, y)) = self.pointer_down else {
            return Ok(());
        };
        self.dragged = true;
        let mut session = self.session.borrow_mut();
        let outcome = session.drag_at(x, y, dx, Instant::now()).map_err(to_js)?;
        if outcome == crate::interaction::InteractionOutcome::Ignored {
            session.rotate_camera(-dx * 0.01, -dy * 0.01);
        }
        Ok(())
    }

    /// Pointer released; a release without movement is a click
    pub fn pointer_up(&mut self) -> std::result::Result<(), JsValue> {
        let down = self.pointer_down.take();
        if self.dragged {
            return Ok(());
        }
        if let Some((x, y)) = down {
            self.session
                .borrow_mut()
                .click_at(x, y, Instant::now())
                .map_err(to_js)?;
        }
        Ok(())
    }

    /// Zoom the camera
    pub fn on_scroll(&self, delta: f32) {
        self.session.borrow_mut().zoom_camera(delta * 0.1);
    }

    /// Poll timers, advance animation and draw
    pub fn frame(&mut self) -> std::result::Result<(), JsValue> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        let mut session = self.session.borrow_mut();
        if let Some((width, height)) = sync_canvas_size(&self.canvas) {
            session.resize(width, height);
        }
        session.frame(now, dt).map_err(to_js)
    }
}
