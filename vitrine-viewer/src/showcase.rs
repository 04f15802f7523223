//! Interactive multi-model showcase
//!
//! Several models stand side by side under an arc-rotate camera. A radio
//! button per model retargets the camera, clicks play animation groups and
//! the dose model's plunger drives a [`crate::dial::BoundedDial`].

use crate::animation::{AnimationClip, AnimationGroup};
use crate::assets::{AssetLoader, AssetSource};
use crate::backend::{Background, Frame, FrameLight, RenderBackend, SceneResources, TextureHandle};
use crate::config::ShowcaseConfig;
use crate::environment::{find_environment, EnvironmentMap, EnvironmentRequest};
use crate::error::{Result, ViewerError};
use crate::interaction::{InteractionCoordinator, InteractionOutcome, ModelBehavior, PointerEvent};
use crate::primitives::Color;
use crate::three_d::gltf_loader::LoadedContent;
use crate::three_d::lighting::default_hemisphere;
use crate::three_d::material::Refraction;
use crate::three_d::{ArcRotateCamera, Light, Ray, Scene3D};
use glam::{Mat4, Vec3};
use log::{debug, error, info};
use std::f32::consts::FRAC_PI_2;
use web_time::Instant;

/// Material that gets environment refraction on load
pub const REFRACTIVE_MATERIAL: &str = "08_-_Defaultffff";
/// Index of refraction given to [`REFRACTIVE_MATERIAL`]
pub const REFRACTION_INDEX: f32 = 1.8;

/// A model the showcase can load
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Title shown on the selector and used as the model id
    pub title: String,
    /// Directory of the model files, with trailing slash
    pub root: String,
    /// Document file name inside `root`
    pub name: String,
    /// World position of the model
    pub position: Vec3,
    /// Camera scale hint for the model
    pub camera_scale: f32,
    /// Click and drag behavior
    pub behavior: ModelBehavior,
    /// Select the model once loaded
    pub active: bool,
}

impl ModelConfig {
    fn new(title: &str, root: &str, position: Vec3, behavior: ModelBehavior) -> Self {
        Self {
            title: title.to_string(),
            root: root.to_string(),
            name: "scene.gltf".to_string(),
            position,
            camera_scale: 10.0,
            behavior,
            active: false,
        }
    }

    /// URL of the model document
    pub fn url(&self) -> String {
        format!("{}{}", self.root, self.name)
    }
}

/// The showcase's models
pub fn catalog() -> Vec<ModelConfig> {
    vec![
        ModelConfig::new("orgal", "model/orgal006/", Vec3::ZERO, ModelBehavior::PlayOnClick),
        ModelConfig::new(
            "puregon",
            "model/puregon_export-005/",
            Vec3::new(400.0, 0.0, 0.0),
            ModelBehavior::dose_dial(),
        ),
        ModelConfig::new(
            "elnova",
            "model/elnova_export05/",
            Vec3::new(-400.0, 0.0, 0.0),
            ModelBehavior::PlayOnClick,
        ),
    ]
}

/// Models to load: all of them, or only the listed titles with the last one active
pub fn select_visible(configs: Vec<ModelConfig>, titles: Option<&[String]>) -> Vec<ModelConfig> {
    let Some(titles) = titles else {
        return configs;
    };
    let mut visible: Vec<ModelConfig> = configs
        .into_iter()
        .filter(|config| titles.contains(&config.title))
        .collect();
    if let Some(last) = visible.last_mut() {
        last.active = true;
    }
    visible
}

/// One radio button of the camera selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioButton {
    /// Model title
    pub title: String,
    /// Whether this button is the checked one
    pub checked: bool,
}

/// Radio group listing the models
#[derive(Debug, Clone, Default)]
pub struct CameraSelector {
    buttons: Vec<RadioButton>,
}

impl CameraSelector {
    /// Append an unchecked button
    pub fn add(&mut self, title: &str) {
        self.buttons.push(RadioButton {
            title: title.to_string(),
            checked: false,
        });
    }

    /// Check `title` and uncheck the others; false when there is no such button
    pub fn check(&mut self, title: &str) -> bool {
        if !self.buttons.iter().any(|b| b.title == title) {
            return false;
        }
        for button in &mut self.buttons {
            button.checked = button.title == title;
        }
        true
    }

    /// Title of the checked button
    pub fn checked(&self) -> Option<&str> {
        self.buttons.iter().find(|b| b.checked).map(|b| b.title.as_str())
    }

    /// All buttons in insertion order
    pub fn buttons(&self) -> &[RadioButton] {
        &self.buttons
    }
}

/// A loaded model
#[derive(Debug)]
pub struct ModelEntry {
    /// Model title
    pub title: String,
    /// World position (the camera target when selected)
    pub position: Vec3,
    /// Camera scale hint
    pub camera_scale: f32,
    /// Scene graph, rooted at a node placed at `position`
    pub scene: Scene3D,
    /// Animation clips
    pub clips: Vec<AnimationClip>,
    /// One animation group per clip
    pub groups: Vec<AnimationGroup>,
    /// Click and drag behavior
    pub behavior: ModelBehavior,
    resources: SceneResources,
}

impl ModelEntry {
    /// Start every animation group over its full range
    pub fn start_all_groups(&mut self) {
        for group in &mut self.groups {
            group.start_full();
        }
    }

    /// Stop every animation group
    pub fn stop_all_groups(&mut self) {
        for group in &mut self.groups {
            group.stop();
        }
    }

    /// Advance the groups by `dt` seconds
    pub fn advance(&mut self, dt: f32) {
        for group in &mut self.groups {
            group.advance(dt, &self.clips, &mut self.scene);
        }
    }

    /// Nearest mesh node hit by `ray`, as `(node name, distance)`
    pub fn pick(&self, ray: &Ray) -> Option<(String, f32)> {
        let hit = self.scene.pick(ray, &Mat4::IDENTITY)?;
        Some((self.scene.nodes[hit.node].name.clone(), hit.distance))
    }
}

/// Camera, models and selector of a showcase
#[derive(Debug)]
pub struct ShowcaseScene {
    /// Arc-rotate camera
    pub camera: ArcRotateCamera,
    /// Loaded models
    pub models: Vec<ModelEntry>,
    /// Camera selector radio group
    pub selector: CameraSelector,
    /// Scene light
    pub light: Light,
    /// Clear color
    pub clear_color: Color,
}

impl Default for ShowcaseScene {
    fn default() -> Self {
        Self::new()
    }
}

impl ShowcaseScene {
    /// Empty scene with the showcase camera and light
    pub fn new() -> Self {
        let mut camera = ArcRotateCamera::new(FRAC_PI_2, FRAC_PI_2, 100.0, Vec3::ZERO);
        camera.lower_radius_limit = Some(100.0);
        camera.upper_radius_limit = Some(600.0);
        Self {
            camera,
            models: Vec::new(),
            selector: CameraSelector::default(),
            light: default_hemisphere(),
            clear_color: Color::white(),
        }
    }

    /// Model titled `title`
    pub fn model(&self, title: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.title == title)
    }

    /// Model titled `title`, mutably
    pub fn model_mut(&mut self, title: &str) -> Option<&mut ModelEntry> {
        self.models.iter_mut().find(|m| m.title == title)
    }

    /// Nearest `(model title, part name)` under normalized device coordinates
    pub fn pick_at(&self, ndc_x: f32, ndc_y: f32) -> Option<(String, String)> {
        let ray = self.camera.to_camera().screen_ray(ndc_x, ndc_y);
        self.models
            .iter()
            .filter_map(|model| {
                model
                    .pick(&ray)
                    .map(|(part, distance)| (model.title.clone(), part, distance))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(title, part, _)| (title, part))
    }
}

/// A running showcase
pub struct ShowcaseSession<B: RenderBackend> {
    backend: B,
    config: ShowcaseConfig,
    scene: ShowcaseScene,
    coordinator: InteractionCoordinator,
    environment: Option<TextureHandle>,
}

impl<B: RenderBackend> ShowcaseSession<B> {
    /// Session drawing through `backend`
    pub fn new(backend: B, config: ShowcaseConfig) -> Result<Self> {
        find_environment(&config.environment)?;
        Ok(Self {
            backend,
            config,
            scene: ShowcaseScene::new(),
            coordinator: InteractionCoordinator::new(),
            environment: None,
        })
    }

    /// Catalog models allowed by the config
    pub fn visible_models(&self) -> Vec<ModelConfig> {
        select_visible(catalog(), self.config.models.as_deref())
    }

    /// Add a selector button per visible model and return the models to load
    pub fn begin_loading(&mut self) -> Vec<ModelConfig> {
        let visible = self.visible_models();
        for config in &visible {
            self.scene.selector.add(&config.title);
        }
        visible
    }

    /// Load every visible model; failures are logged and skipped
    ///
    /// Returns the number of models loaded.
    pub async fn load_all<S: AssetSource>(&mut self, loader: &AssetLoader<S>) -> usize {
        let visible = self.begin_loading();
        let mut loaded = 0;
        for config in visible {
            let url = config.url();
            let result = match loader.load(&url).await {
                Ok(content) => self.add_model(&config, content),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => loaded += 1,
                Err(e) => error!("Failed to load {} ({}): {}", config.title, url, e),
            }
        }
        info!("Showcase ready: {} of {} models", loaded, self.scene.selector.buttons().len());
        loaded
    }

    /// Place loaded content into the showcase
    pub fn add_model(&mut self, config: &ModelConfig, content: LoadedContent) -> Result<()> {
        let LoadedContent { mut scene, clips } = content;

        for material in scene.materials.iter_mut().filter(|m| m.name == REFRACTIVE_MATERIAL) {
            material.refraction = Some(Refraction {
                intensity: 1.0,
                index_of_refraction: REFRACTION_INDEX,
                texture: self.environment,
            });
            material.needs_update = true;
        }
        let environment = self.environment;
        scene.traverse_materials(|material| {
            if material.is_pbr() {
                material.env_map = environment;
            }
        });

        let root = scene.wrap_roots(format!("{}_root", config.title));
        scene.nodes[root].set_position(config.position);

        let mut groups: Vec<AnimationGroup> = (0..clips.len())
            .filter_map(|clip| AnimationGroup::for_clip(&clips, clip))
            .collect();
        for group in &mut groups {
            group.stop();
        }

        let resources = SceneResources::upload(&scene, &mut self.backend)?;
        self.scene.models.push(ModelEntry {
            title: config.title.clone(),
            position: config.position,
            camera_scale: config.camera_scale,
            scene,
            clips,
            groups,
            behavior: config.behavior.clone(),
            resources,
        });
        debug!("Model {} placed at {}", config.title, config.position);

        if config.active {
            self.coordinator.set_active_item(&config.title, &mut self.scene)?;
        }
        Ok(())
    }

    /// Request for the configured environment
    pub fn environment_request(&self) -> Result<EnvironmentRequest> {
        Ok(EnvironmentRequest {
            generation: 0,
            environment: find_environment(&self.config.environment)?,
        })
    }

    /// Upload `map` as the scene environment and refraction source
    pub fn set_environment(&mut self, map: Option<EnvironmentMap>) -> Result<()> {
        if let Some(handle) = self.environment.take() {
            self.backend.release_texture(handle);
        }
        if let Some(map) = map {
            self.environment = Some(self.backend.upload_environment(&map)?);
        }
        let environment = self.environment;
        for model in &mut self.scene.models {
            model.scene.traverse_materials(|material| {
                if material.is_pbr() {
                    material.env_map = environment;
                }
                if let Some(refraction) = material.refraction.as_mut() {
                    refraction.texture = environment;
                    material.needs_update = true;
                }
            });
        }
        Ok(())
    }

    /// Fetch and apply the configured environment
    pub async fn load_environment<S: AssetSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        let request = self.environment_request()?;
        let map = request.fetch(source).await?;
        self.set_environment(map)
    }

    /// Radio button click on `title`
    pub fn select_camera(&mut self, title: &str) -> Result<()> {
        self.coordinator.set_active_item(title, &mut self.scene)
    }

    /// Route a pointer event
    pub fn handle_pointer(
        &mut self,
        event: PointerEvent,
        now: Instant,
    ) -> Result<InteractionOutcome> {
        self.coordinator.handle_pointer(event, &mut self.scene, now)
    }

    /// Click at normalized device coordinates
    pub fn click_at(&mut self, ndc_x: f32, ndc_y: f32, now: Instant) -> Result<InteractionOutcome> {
        match self.scene.pick_at(ndc_x, ndc_y) {
            Some((model, part)) => self.handle_pointer(PointerEvent::Pick { model, part }, now),
            None => Ok(InteractionOutcome::Ignored),
        }
    }

    /// Drag that started on the part under normalized device coordinates
    pub fn drag_at(
        &mut self,
        ndc_x: f32,
        ndc_y: f32,
        drag_distance: f32,
        now: Instant,
    ) -> Result<InteractionOutcome> {
        match self.scene.pick_at(ndc_x, ndc_y) {
            Some((model, part)) => self.handle_pointer(
                PointerEvent::Drag {
                    model,
                    part,
                    drag_distance,
                },
                now,
            ),
            None => Ok(InteractionOutcome::Ignored),
        }
    }

    /// Orbit the camera by pointer deltas
    pub fn rotate_camera(&mut self, d_alpha: f32, d_beta: f32) {
        self.scene.camera.rotate(d_alpha, d_beta);
    }

    /// Zoom the camera within its radius limits
    pub fn zoom_camera(&mut self, delta: f32) {
        self.scene.camera.zoom(delta);
    }

    /// Resize the drawing surface
    pub fn resize(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.scene.camera.aspect_ratio = width as f32 / height as f32;
        }
        self.backend.resize(width, height);
    }

    /// Poll the idle deadline, advance animation by `dt` seconds and draw
    pub fn frame(&mut self, now: Instant, dt: f32) -> Result<()> {
        if let Some(scrub) = self.coordinator.poll(&mut self.scene, now) {
            debug!("Spring-back {:?}", scrub);
        }
        for model in &mut self.scene.models {
            model.advance(dt);
        }
        let frame = self.build_frame();
        self.backend.render(&frame)
    }

    /// Describe what the camera sees
    pub fn build_frame(&self) -> Frame {
        let camera = self.scene.camera.to_camera();
        let mut frame = Frame::new(
            camera.view_matrix(),
            camera.projection_matrix(),
            camera.position,
        );
        frame.background = Background::Solid(self.scene.clear_color);
        frame.lights.push(FrameLight {
            light: self.scene.light.light_type.clone(),
            position: Vec3::ZERO,
            direction: Vec3::Y,
        });
        for model in &self.scene.models {
            model
                .resources
                .collect_draws(&model.scene, &Mat4::IDENTITY, &mut frame.draws);
        }
        frame
    }

    /// Text of the dose label
    pub fn label(&self) -> String {
        self.coordinator.label()
    }

    /// Camera, models and selector
    pub fn scene(&self) -> &ShowcaseScene {
        &self.scene
    }

    /// Selection and dial state
    pub fn coordinator(&self) -> &InteractionCoordinator {
        &self.coordinator
    }

    /// The render backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Model titled `title`, or an error
    pub fn model(&self, title: &str) -> Result<&ModelEntry> {
        self.scene
            .model(title)
            .ok_or_else(|| ViewerError::UnknownModel(title.to_string()))
    }
}

impl<B: RenderBackend> Drop for ShowcaseSession<B> {
    fn drop(&mut self) {
        for model in &mut self.scene.models {
            model.resources.release(&mut self.backend);
        }
        if let Some(handle) = self.environment.take() {
            self.backend.release_texture(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    #[test]
    fn test_catalog() {
        let models = catalog();
        assert_eq!(models.len(), 3);
        assert_eq!(models[1].url(), "model/puregon_export-005/scene.gltf");
        assert_eq!(models[1].position, Vec3::new(400.0, 0.0, 0.0));
        assert_eq!(models[2].position, Vec3::new(-400.0, 0.0, 0.0));
        assert!(models.iter().all(|m| m.camera_scale == 10.0 && !m.active));
    }

    #[test]
    fn test_select_visible_marks_last_active() {
        let titles = vec!["elnova".to_string(), "orgal".to_string()];
        let visible = select_visible(catalog(), Some(&titles));
        let names: Vec<_> = visible.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(names, vec!["orgal", "elnova"]);
        assert!(!visible[0].active);
        assert!(visible[1].active);

        assert!(select_visible(catalog(), None).iter().all(|m| !m.active));
    }

    #[test]
    fn test_selector_is_a_radio_group() {
        let mut selector = CameraSelector::default();
        selector.add("orgal");
        selector.add("puregon");
        assert!(selector.check("puregon"));
        assert!(selector.check("orgal"));
        assert_eq!(selector.checked(), Some("orgal"));
        assert_eq!(selector.buttons().iter().filter(|b| b.checked).count(), 1);
        assert!(!selector.check("ghost"));
        assert_eq!(selector.checked(), Some("orgal"));
    }

    #[test]
    fn test_camera_setup() {
        let scene = ShowcaseScene::new();
        assert_eq!(scene.camera.radius, 100.0);
        assert_eq!(scene.camera.lower_radius_limit, Some(100.0));
        assert_eq!(scene.camera.upper_radius_limit, Some(600.0));
        assert_eq!(scene.clear_color, Color::white());
    }

    #[test]
    fn test_add_model_places_and_overrides() {
        let mut content_scene = Scene3D::create_test_scene();
        content_scene.materials[0].name = REFRACTIVE_MATERIAL.to_string();
        let content = LoadedContent {
            scene: content_scene,
            clips: Vec::new(),
        };
        let mut session =
            ShowcaseSession::new(HeadlessBackend::new(), ShowcaseConfig::default()).unwrap();
        let mut config = catalog().remove(1);
        config.active = true;
        session.add_model(&config, content).unwrap();

        let entry = session.model("puregon").unwrap();
        let refraction = entry.scene.materials[0].refraction.unwrap();
        assert_eq!(refraction.index_of_refraction, REFRACTION_INDEX);
        let bounds = entry.scene.bounding_box(&Mat4::IDENTITY).unwrap();
        assert_eq!(bounds.center(), Vec3::new(398.0, 0.0, 0.0));

        assert_eq!(session.coordinator().active_item(), Some("puregon"));
        assert_eq!(session.scene().camera.target, Vec3::new(400.0, 0.0, 0.0));
        assert_eq!(session.backend().live_geometry_count(), 1);
    }

    #[test]
    fn test_unknown_environment_rejected() {
        let config = ShowcaseConfig {
            models: None,
            environment: "Moon".to_string(),
        };
        assert!(matches!(
            ShowcaseSession::new(HeadlessBackend::new(), config),
            Err(ViewerError::UnknownEnvironment(_))
        ));
    }
}
