//! Orbit-camera glTF viewer
//!
//! A [`Viewer`] owns one loaded scene at a time, the default camera and its
//! orbit controls, a light rig, the environment map and the clip mixer. The
//! host drives it: `load` on file selection, the `update_*` operations after
//! changing [`ViewerState`], and `animate` once per display frame.

use crate::animation::{AnimationClip, AnimationMixer};
use crate::assets::{AssetLoader, AssetSource};
use crate::backend::{
    scene_lights, Background, Frame, FrameLight, Helper, RenderBackend, SceneResources,
    TextureHandle,
};
use crate::config::{Preset, ViewerOptions};
use crate::environment::{find_environment, EnvironmentMap, EnvironmentRequest};
use crate::error::{Result, ViewerError};
use crate::primitives::Color;
use crate::state::{ViewerState, DEFAULT_CAMERA};
use crate::three_d::{Camera3D, CameraType, Light, NodeKind, OrbitControls, Scene3D};
use glam::{Mat4, Vec3};
use log::{debug, info, warn};

/// Offset of the rig's directional light from the camera (~60 degrees)
const MAIN_LIGHT_OFFSET: Vec3 = Vec3::new(0.5, 0.0, 0.866);

/// Viewer for a single glTF asset
pub struct Viewer<B: RenderBackend> {
    backend: B,
    options: ViewerOptions,
    /// Controls read by the `update_*` operations
    pub state: ViewerState,
    default_camera: Camera3D,
    active_camera: Option<usize>,
    controls: OrbitControls,
    content: Option<Scene3D>,
    resources: SceneResources,
    clips: Vec<AnimationClip>,
    mixer: Option<AnimationMixer>,
    lights: Vec<Light>,
    environment: Option<(String, TextureHandle)>,
    environment_generation: u64,
    pending_environment: Option<EnvironmentRequest>,
    skeleton_helpers: Vec<usize>,
    grid: bool,
    background: Background,
    prev_time: f64,
}

impl<B: RenderBackend> Viewer<B> {
    /// Create an empty viewer drawing through `backend`
    pub fn new(backend: B, options: ViewerOptions) -> Self {
        let fov = match options.preset() {
            Preset::AssetGenerator => 0.8,
            Preset::Default => 60f32.to_radians(),
        };
        let mut controls = OrbitControls::new();
        controls.auto_rotate = false;
        controls.auto_rotate_speed = -10.0;
        controls.screen_space_panning = true;

        let state = ViewerState::new(&options);
        let mut viewer = Self {
            backend,
            options,
            state,
            default_camera: Camera3D::new_perspective(
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::ZERO,
                fov,
                1.0,
            ),
            active_camera: None,
            controls,
            content: None,
            resources: SceneResources::default(),
            clips: Vec::new(),
            mixer: None,
            lights: Vec::new(),
            environment: None,
            environment_generation: 0,
            pending_environment: None,
            skeleton_helpers: Vec::new(),
            grid: false,
            background: Background::Solid(Color::from_rgb_u32(0xcccccc)),
            prev_time: 0.0,
        };
        viewer.update_background();
        viewer
    }

    /// Load `url` through `loader`, show it and play every clip
    pub async fn load<S: AssetSource>(&mut self, loader: &AssetLoader<S>, url: &str) -> Result<()> {
        let content = loader.load(url).await?;
        self.set_content(content.scene, content.clips)?;
        self.play_all_clips();
        self.load_pending_environment(loader.source()).await;
        Ok(())
    }

    /// Replace the displayed content
    pub fn set_content(&mut self, mut scene: Scene3D, clips: Vec<AnimationClip>) -> Result<()> {
        self.clear();

        let bounds = scene.bounding_box(&Mat4::IDENTITY);
        let size = bounds.map_or(0.0, |b| b.size().length());
        let center = bounds.map_or(Vec3::ZERO, |b| b.center());

        self.controls.reset(&mut self.default_camera);

        scene.translate_roots(-center);
        self.controls.max_distance = size * 10.0;
        self.default_camera.set_clip_planes(size / 100.0, size * 100.0);

        match self.options.camera_position {
            Some(position) => {
                self.default_camera.position = Vec3::from(position);
                self.default_camera.look_at(Vec3::ZERO);
            }
            None => {
                self.default_camera.position =
                    center + Vec3::new(size / 2.0, size / 5.0, size / 2.0);
                self.default_camera.look_at(center);
            }
        }

        self.set_camera(DEFAULT_CAMERA)?;
        self.controls.save_state(&self.default_camera);

        self.resources = SceneResources::upload(&scene, &mut self.backend)?;
        self.state.add_lights = !scene.has_lights();
        self.content = Some(scene);

        self.set_clips(clips);

        self.update_lights();
        if let Err(e) = self.update_environment() {
            warn!("Environment not updated: {}", e);
        }
        self.apply_environment_to_materials();
        self.update_texture_encoding();
        self.update_display()?;

        for line in self.print_graph() {
            debug!("{}", line);
        }
        Ok(())
    }

    /// Release the GPU resources of the current content and drop it
    pub fn clear(&mut self) {
        if self.content.is_none() {
            return;
        }
        self.resources.release(&mut self.backend);
        self.content = None;
        self.active_camera = None;
        self.skeleton_helpers.clear();
    }

    /// Node hierarchy of the content, one indented line per node
    pub fn print_graph(&self) -> Vec<String> {
        self.content.as_ref().map(Scene3D::graph_lines).unwrap_or_default()
    }

    /// Replace the clip list; a mixer exists only while there are clips
    pub fn set_clips(&mut self, clips: Vec<AnimationClip>) {
        if let Some(mut mixer) = self.mixer.take() {
            mixer.stop_all_action();
        }
        self.clips = clips;
        if self.clips.is_empty() {
            return;
        }
        self.mixer = Some(AnimationMixer::new());
    }

    /// Restart and play every clip
    pub fn play_all_clips(&mut self) {
        let Some(mixer) = self.mixer.as_mut() else {
            return;
        };
        for (index, clip) in self.clips.iter().enumerate() {
            mixer.clip_action(index).reset().play();
            self.state.action_states.insert(clip.name.clone(), true);
        }
    }

    /// Play or stop the clip called `name`; returns false when there is no such clip
    pub fn set_action_state(&mut self, name: &str, playing: bool) -> bool {
        let Some(index) = self.clips.iter().position(|c| c.name == name) else {
            return false;
        };
        let Some(mixer) = self.mixer.as_mut() else {
            return false;
        };
        let action = mixer.clip_action(index);
        if playing {
            action.reset().play();
        } else {
            action.stop();
        }
        self.state.action_states.insert(name.to_string(), playing);
        true
    }

    /// Switch to the default orbit camera or a camera node of the content
    pub fn set_camera(&mut self, name: &str) -> Result<()> {
        if name == DEFAULT_CAMERA {
            self.controls.enabled = true;
            self.active_camera = None;
        } else {
            let index = self
                .content
                .as_ref()
                .and_then(|scene| scene.find_camera(name))
                .ok_or_else(|| ViewerError::UnknownCamera(name.to_string()))?;
            self.controls.enabled = false;
            self.active_camera = Some(index);
        }
        self.state.camera = name.to_string();
        Ok(())
    }

    /// Camera choices: the default camera followed by the content's cameras
    pub fn camera_names(&self) -> Vec<String> {
        let mut names = vec![DEFAULT_CAMERA.to_string()];
        if let Some(scene) = &self.content {
            names.extend(scene.camera_names());
        }
        names
    }

    /// Apply the texture encoding from state to every color texture
    pub fn update_texture_encoding(&mut self) {
        let encoding = self.state.texture_encoding;
        if let Some(scene) = self.content.as_mut() {
            scene.traverse_materials(|material| {
                material.set_color_encoding(encoding);
            });
        }
    }

    /// Add or remove the light rig and apply intensities from state
    pub fn update_lights(&mut self) {
        if self.state.add_lights && self.lights.is_empty() {
            self.add_lights();
        } else if !self.state.add_lights && !self.lights.is_empty() {
            self.remove_lights();
        }

        if self.lights.len() == 2 {
            let state = &self.state;
            let ambient = Color::from_rgb_u32(state.ambient_color);
            self.lights[0].set_intensity_and_color(state.ambient_intensity, ambient);
            let direct = Color::from_rgb_u32(state.direct_color);
            self.lights[1].set_intensity_and_color(state.direct_intensity, direct);
        }
    }

    fn add_lights(&mut self) {
        if self.options.preset() == Preset::AssetGenerator {
            self.lights
                .push(Light::new_hemisphere("hemi_light", Color::white(), Color::white(), 1.0));
            return;
        }
        let state = &self.state;
        self.lights.push(Light::new_ambient(
            "ambient_light",
            Color::from_rgb_u32(state.ambient_color),
            state.ambient_intensity,
        ));
        self.lights.push(Light::new_directional(
            "main_light",
            MAIN_LIGHT_OFFSET,
            Color::from_rgb_u32(state.direct_color),
            state.direct_intensity,
        ));
    }

    fn remove_lights(&mut self) {
        self.lights.clear();
    }

    /// Rig lights currently attached to the default camera
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Start fetching the environment named in state
    ///
    /// The returned request is also kept as [`Viewer::pending_environment`];
    /// its result must be handed to [`Viewer::apply_environment`].
    pub fn update_environment(&mut self) -> Result<EnvironmentRequest> {
        let environment = find_environment(&self.state.environment)?;
        self.environment_generation += 1;
        let request = EnvironmentRequest {
            generation: self.environment_generation,
            environment,
        };
        self.pending_environment = Some(request);
        debug!("Environment request {} for {}", request.generation, environment.name);
        Ok(request)
    }

    /// The newest environment request not yet applied
    pub fn pending_environment(&self) -> Option<EnvironmentRequest> {
        self.pending_environment
    }

    /// Apply a fetched environment; returns false when the request is stale
    pub fn apply_environment(
        &mut self,
        generation: u64,
        result: Result<Option<EnvironmentMap>>,
    ) -> Result<bool> {
        if generation != self.environment_generation {
            debug!("Dropping stale environment result {}", generation);
            return Ok(false);
        }
        self.pending_environment = None;
        let map = result?;

        if let Some((_, handle)) = self.environment.take() {
            self.backend.release_texture(handle);
        }
        if let Some(map) = map {
            let handle = self.backend.upload_environment(&map)?;
            self.environment = Some((map.name.clone(), handle));
        }
        self.apply_environment_to_materials();
        self.update_background();
        Ok(true)
    }

    /// Fetch the environment named in state from `source` and apply it
    pub async fn refresh_environment<S: AssetSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<bool> {
        let request = self.update_environment()?;
        let result = request.fetch(source).await;
        self.apply_environment(request.generation, result)
    }

    /// Fetch and apply the pending environment request, if there is one
    ///
    /// Failures are logged; the content stays shown without environment.
    pub async fn load_pending_environment<S: AssetSource + ?Sized>(&mut self, source: &S) {
        let Some(request) = self.pending_environment else {
            return;
        };
        let result = request.fetch(source).await;
        if let Err(e) = self.apply_environment(request.generation, result) {
            warn!("Environment {} not applied: {}", request.environment.name, e);
        }
    }

    fn apply_environment_to_materials(&mut self) {
        let handle = self.environment.as_ref().map(|(_, handle)| *handle);
        if let Some(scene) = self.content.as_mut() {
            scene.traverse_materials(|material| {
                if material.is_pbr() {
                    material.env_map = handle;
                    material.needs_update = true;
                }
            });
        }
    }

    /// Name of the environment currently on the GPU
    pub fn environment_name(&self) -> Option<&str> {
        self.environment.as_ref().map(|(name, _)| name.as_str())
    }

    /// Apply wireframe, skeleton and grid settings from state
    pub fn update_display(&mut self) -> Result<()> {
        self.skeleton_helpers.clear();

        let wireframe = self.state.wireframe;
        let Some(scene) = self.content.as_mut() else {
            self.grid = self.state.grid;
            return Ok(());
        };
        scene.traverse_materials(|material| material.wireframe = wireframe);

        if self.state.skeleton {
            let mut skinned = Vec::new();
            scene.traverse(|index, node| {
                if let NodeKind::Mesh { skin: Some(skin), .. } = node.kind {
                    skinned.push((index, skin));
                }
            });
            for (index, skin) in skinned {
                let has_joints = scene.skins.get(skin).map_or(false, |s| !s.joints.is_empty());
                if !has_joints {
                    return Err(ViewerError::MissingSkeleton(scene.nodes[index].name.clone()));
                }
                self.skeleton_helpers.push(index);
            }
        }

        self.grid = self.state.grid;
        Ok(())
    }

    /// Recompute the background from state
    pub fn update_background(&mut self) {
        if self.state.background {
            if let Some((_, handle)) = &self.environment {
                self.background = Background::Environment(*handle);
                return;
            }
        }
        let parse = |hex: &str, fallback: Color| {
            Color::from_hex(hex).unwrap_or_else(|e| {
                warn!("Bad background color {}: {}", hex, e);
                fallback
            })
        };
        self.background = Background::Gradient(
            parse(&self.state.bg_color1, Color::white()),
            parse(&self.state.bg_color2, Color::from_rgb_u32(0x353535)),
        );
    }

    /// Resize the drawing surface
    pub fn resize(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.default_camera.set_aspect_ratio(width as f32 / height as f32);
        }
        self.backend.resize(width, height);
    }

    /// Advance controls and animation to `time_ms` and draw
    pub fn animate(&mut self, time_ms: f64) -> Result<()> {
        let dt = ((time_ms - self.prev_time) / 1000.0) as f32;

        self.controls.update(&mut self.default_camera, dt);
        if let (Some(mixer), Some(scene)) = (self.mixer.as_mut(), self.content.as_mut()) {
            mixer.time_scale = self.state.playback_speed;
            mixer.update(dt, &self.clips, scene);
        }
        self.render()?;

        self.prev_time = time_ms;
        Ok(())
    }

    /// Draw the current frame
    pub fn render(&mut self) -> Result<()> {
        let frame = self.build_frame();
        self.backend.render(&frame)
    }

    /// Describe what the active camera sees
    pub fn build_frame(&self) -> Frame {
        let camera_node = self.active_camera.zip(self.content.as_ref()).and_then(|(index, scene)| {
            match &scene.nodes.get(index)?.kind {
                NodeKind::Camera(projection) => Some((scene.world_transform(index), *projection)),
                _ => None,
            }
        });
        let mut frame = match camera_node {
            Some((world, projection)) => Frame::new(
                world.inverse(),
                projection.matrix(self.default_camera.aspect_ratio),
                world.transform_point3(Vec3::ZERO),
            ),
            None => Frame::new(
                self.default_camera.view_matrix(),
                self.default_camera.projection_matrix(),
                self.default_camera.position,
            ),
        };

        frame.background = self.background.clone();
        frame.exposure = self.state.exposure;

        let camera_world = self.default_camera.world_matrix();
        for light in &self.lights {
            let position = camera_world.transform_point3(light.offset);
            frame.lights.push(FrameLight {
                light: light.light_type.clone(),
                position,
                direction: (-position).normalize_or_zero(),
            });
        }

        if let Some(scene) = &self.content {
            frame.lights.extend(scene_lights(scene, &Mat4::IDENTITY));
            self.resources.collect_draws(scene, &Mat4::IDENTITY, &mut frame.draws);

            let world = scene.world_transforms();
            for &index in &self.skeleton_helpers {
                let NodeKind::Mesh { skin: Some(skin), .. } = scene.nodes[index].kind else {
                    continue;
                };
                let Some(skin) = scene.skins.get(skin) else {
                    continue;
                };
                let segments = skin
                    .joints
                    .iter()
                    .filter_map(|&joint| {
                        let parent = scene.nodes.get(joint)?.parent?;
                        skin.joints.contains(&parent).then(|| {
                            (
                                world[parent].transform_point3(Vec3::ZERO),
                                world[joint].transform_point3(Vec3::ZERO),
                            )
                        })
                    })
                    .collect();
                frame.helpers.push(Helper::Skeleton { node: index, segments });
            }
        }

        if self.grid {
            frame.helpers.push(Helper::Grid {
                size: 10.0,
                divisions: 10,
            });
            frame.helpers.push(Helper::Axes { size: 1.0 });
        }

        frame
    }

    /// The displayed scene
    pub fn content(&self) -> Option<&Scene3D> {
        self.content.as_ref()
    }

    /// Clips of the displayed content
    pub fn clips(&self) -> &[AnimationClip] {
        &self.clips
    }

    /// The clip mixer, present only when the content has clips
    pub fn mixer(&self) -> Option<&AnimationMixer> {
        self.mixer.as_ref()
    }

    /// The default camera
    pub fn camera(&self) -> &Camera3D {
        &self.default_camera
    }

    /// Orbit controls of the default camera
    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    /// Orbit controls together with the camera they drive
    pub fn controls_mut(&mut self) -> (&mut OrbitControls, &mut Camera3D) {
        (&mut self.controls, &mut self.default_camera)
    }

    /// Projection of the active camera
    pub fn active_projection(&self) -> CameraType {
        self.active_camera
            .zip(self.content.as_ref())
            .and_then(|(index, scene)| match scene.nodes.get(index)?.kind {
                NodeKind::Camera(projection) => Some(projection),
                _ => None,
            })
            .unwrap_or(self.default_camera.projection)
    }

    /// The render backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The render backend, mutably
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: RenderBackend> Drop for Viewer<B> {
    fn drop(&mut self) {
        self.resources.release(&mut self.backend);
        if let Some((_, handle)) = self.environment.take() {
            self.backend.release_texture(handle);
        }
        info!("Viewer released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::environment::ENVIRONMENTS;
    use crate::three_d::LightType;

    fn viewer() -> Viewer<HeadlessBackend> {
        Viewer::new(HeadlessBackend::new(), ViewerOptions::default())
    }

    #[test]
    fn test_set_content_frames_and_rigs() {
        let mut viewer = viewer();
        viewer.set_content(Scene3D::create_test_scene(), Vec::new()).unwrap();

        // Cube spans x in [-3, -1], recentred on the origin
        let scene = viewer.content().unwrap();
        let bounds = scene.bounding_box(&Mat4::IDENTITY).unwrap();
        assert!(bounds.center().length() < 1e-5);

        let size = Vec3::splat(2.0).length();
        assert!((viewer.controls().max_distance - size * 10.0).abs() < 1e-4);
        assert_eq!(viewer.lights().len(), 2);
        assert!(viewer.state.add_lights);
        assert!(viewer.mixer().is_none());
        assert_eq!(viewer.backend().live_geometry_count(), 1);
    }

    #[test]
    fn test_camera_position_option() {
        let options = ViewerOptions {
            camera_position: Some([0.0, 0.0, 5.0]),
            ..ViewerOptions::default()
        };
        let mut viewer = Viewer::new(HeadlessBackend::new(), options);
        viewer.set_content(Scene3D::create_test_scene(), Vec::new()).unwrap();
        assert_eq!(viewer.camera().position, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(viewer.camera().target, Vec3::ZERO);
    }

    #[test]
    fn test_set_camera() {
        let mut viewer = viewer();
        viewer.set_content(Scene3D::create_test_scene(), Vec::new()).unwrap();
        assert_eq!(viewer.camera_names(), vec![DEFAULT_CAMERA.to_string(), "Overview".to_string()]);

        viewer.set_camera("Overview").unwrap();
        assert!(!viewer.controls().enabled);
        let frame = viewer.build_frame();
        assert!((frame.camera_position - Vec3::new(0.0, 0.0, 10.0)).length() < 3.0);

        assert!(matches!(
            viewer.set_camera("Nope"),
            Err(ViewerError::UnknownCamera(_))
        ));
        assert_eq!(viewer.state.camera, "Overview");

        viewer.set_camera(DEFAULT_CAMERA).unwrap();
        assert!(viewer.controls().enabled);
    }

    #[test]
    fn test_update_lights_applies_state() {
        let mut viewer = viewer();
        viewer.update_lights();
        viewer.state.ambient_intensity = 0.5;
        viewer.state.direct_color = 0xFF0000;
        viewer.update_lights();
        assert_eq!(viewer.lights()[0].intensity(), 0.5);
        match viewer.lights()[1].light_type {
            LightType::Directional { color, .. } => {
                assert_eq!(color, Color::new(1.0, 0.0, 0.0, 1.0))
            }
            ref other => panic!("unexpected light {:?}", other),
        }

        viewer.state.add_lights = false;
        viewer.update_lights();
        assert!(viewer.lights().is_empty());
    }

    #[test]
    fn test_asset_generator_rig_is_one_hemisphere_light() {
        let options = ViewerOptions {
            preset: "assetgenerator".to_string(),
            ..ViewerOptions::default()
        };
        let mut viewer = Viewer::new(HeadlessBackend::new(), options);
        viewer.update_lights();
        assert_eq!(viewer.lights().len(), 1);
        assert!(matches!(viewer.lights()[0].light_type, LightType::Hemisphere { .. }));
        assert!(matches!(
            viewer.camera().projection,
            CameraType::Perspective { fov, .. } if (fov - 0.8).abs() < 1e-6
        ));
    }

    #[test]
    fn test_stale_environment_is_dropped() {
        let mut viewer = viewer();
        let first = viewer.update_environment().unwrap();
        viewer.state.environment = ENVIRONMENTS[0].name.to_string();
        let second = viewer.update_environment().unwrap();

        assert!(!viewer.apply_environment(first.generation, Ok(None)).unwrap());
        assert!(viewer.pending_environment().is_some());
        assert!(viewer.apply_environment(second.generation, Ok(None)).unwrap());
        assert!(viewer.pending_environment().is_none());
        assert!(viewer.environment_name().is_none());
    }

    #[test]
    fn test_update_display_toggles_grid_and_wireframe() {
        let mut viewer = viewer();
        viewer.set_content(Scene3D::create_test_scene(), Vec::new()).unwrap();
        viewer.state.grid = true;
        viewer.state.wireframe = true;
        viewer.update_display().unwrap();

        let frame = viewer.build_frame();
        assert!(frame.helpers.iter().any(|h| matches!(h, Helper::Grid { .. })));
        assert!(frame.helpers.iter().any(|h| matches!(h, Helper::Axes { .. })));
        assert!(frame.draws.iter().all(|d| d.material.wireframe));

        viewer.state.grid = false;
        viewer.update_display().unwrap();
        assert!(viewer.build_frame().helpers.is_empty());
    }

    #[test]
    fn test_skeleton_without_joints_is_an_error() {
        let mut scene = Scene3D::create_test_scene();
        scene.skins.push(crate::three_d::scene3d::Skin {
            name: "empty".to_string(),
            joints: Vec::new(),
        });
        if let NodeKind::Mesh { skin, .. } = &mut scene.nodes[0].kind {
            *skin = Some(0);
        }
        let mut viewer = viewer();
        viewer.set_content(scene, Vec::new()).unwrap();
        viewer.state.skeleton = true;
        assert!(matches!(
            viewer.update_display(),
            Err(ViewerError::MissingSkeleton(name)) if name == "Cube"
        ));
    }

    #[test]
    fn test_background_gradient_from_state() {
        let mut viewer = viewer();
        viewer.state.bg_color1 = "#000000".to_string();
        viewer.update_background();
        assert_eq!(
            viewer.build_frame().background,
            Background::Gradient(Color::black(), Color::from_rgb_u32(0x353535))
        );
    }
}
