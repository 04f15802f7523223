/// Tests for the orbit-camera viewer
use glam::{Mat4, Vec3};
use vitrine_viewer::assets::ResolvedUrl;
use vitrine_viewer::backend::Background;
use vitrine_viewer::state::DEFAULT_CAMERA;
use vitrine_viewer::three_d::LightType;
use vitrine_viewer::{
    AssetLoader, AssetMap, FileSource, HeadlessBackend, Scene3D, Viewer, ViewerError, ViewerOptions,
};

mod test_helpers;
use test_helpers::*;

fn viewer() -> Viewer<HeadlessBackend> {
    Viewer::new(HeadlessBackend::new(), ViewerOptions::default())
}

fn load(viewer: &mut Viewer<HeadlessBackend>, url: &str) {
    let loader = AssetLoader::new(model_assets("models/pen/"));
    pollster::block_on(viewer.load(&loader, url)).unwrap();
}

#[test]
fn test_load_centres_content_and_plays_clips() {
    let mut viewer = viewer();
    load(&mut viewer, "models/pen/scene.gltf");

    let scene = viewer.content().unwrap();
    assert_eq!(scene.name, "scene");
    let bounds = scene.bounding_box(&Mat4::IDENTITY).unwrap();
    assert!(bounds.center().length() < 1e-5);

    assert_eq!(viewer.clips().len(), 1);
    let mixer = viewer.mixer().unwrap();
    assert!(mixer.is_playing(0));
    assert_eq!(viewer.state.action_states.get("Press"), Some(&true));
    assert_eq!(viewer.backend().live_geometry_count(), 1);
}

#[test]
fn test_camera_framed_from_size() {
    let mut viewer = viewer();
    load(&mut viewer, "models/pen/scene.gltf");

    // Diagonal of the 2 x 7 x 2 bounds, before recentring
    let size = (4.0f32 + 49.0 + 4.0).sqrt();
    let center = Vec3::new(0.0, 2.5, 0.0);
    let expected = center + Vec3::new(size / 2.0, size / 5.0, size / 2.0);
    assert!((viewer.camera().position - expected).length() < 1e-4);
    assert!(approx_equal(viewer.controls().max_distance, size * 10.0, 1e-4));
}

#[test]
fn test_load_applies_the_environment() {
    let mut viewer = viewer();
    let mut assets = model_assets("models/pen/");
    add_environment(&mut assets, "Bridge");
    viewer.state.background = true;
    let loader = AssetLoader::new(assets);
    pollster::block_on(viewer.load(&loader, "models/pen/scene.gltf")).unwrap();

    assert_eq!(viewer.environment_name(), Some("Bridge"));
    assert!(viewer.pending_environment().is_none());
    assert_eq!(viewer.backend().live_texture_count(), 1);

    let scene = viewer.content().unwrap();
    let material = scene.materials.iter().find(|m| m.is_pbr()).unwrap();
    assert!(material.env_map.is_some());

    viewer.render().unwrap();
    let frame = viewer.backend().last_frame().unwrap();
    assert!(matches!(frame.background, Background::Environment(_)));
}

#[test]
fn test_load_without_environment_faces_still_shows_content() {
    let mut viewer = viewer();
    load(&mut viewer, "models/pen/scene.gltf");
    assert!(viewer.content().is_some());
    assert!(viewer.environment_name().is_none());
    assert!(viewer.pending_environment().is_none());
}

#[test]
fn test_reload_releases_previous_resources() {
    let mut viewer = viewer();
    load(&mut viewer, "models/pen/scene.gltf");
    load(&mut viewer, "models/pen/scene.gltf");
    assert_eq!(viewer.backend().live_geometry_count(), 1);

    viewer.clear();
    assert!(viewer.content().is_none());
    assert_eq!(viewer.backend().live_geometry_count(), 0);
}

#[test]
fn test_content_without_clips_has_no_mixer() {
    let mut viewer = viewer();
    viewer.set_content(Scene3D::create_test_scene(), Vec::new()).unwrap();
    assert!(viewer.mixer().is_none());
    viewer.play_all_clips();
    assert!(viewer.state.action_states.is_empty());
    assert!(viewer.animate(16.0).is_ok());
}

#[test]
fn test_set_camera() {
    let mut viewer = viewer();
    viewer.set_content(Scene3D::create_test_scene(), Vec::new()).unwrap();
    assert_eq!(viewer.camera_names(), vec![DEFAULT_CAMERA.to_string(), "Overview".to_string()]);

    viewer.set_camera("Overview").unwrap();
    assert_eq!(viewer.state.camera, "Overview");
    assert!(!viewer.controls().enabled);

    let err = viewer.set_camera("Nowhere").unwrap_err();
    assert!(matches!(err, ViewerError::UnknownCamera(name) if name == "Nowhere"));
    assert_eq!(viewer.state.camera, "Overview");

    viewer.set_camera(DEFAULT_CAMERA).unwrap();
    assert!(viewer.controls().enabled);
}

#[test]
fn test_light_rig_follows_state() {
    let mut viewer = viewer();
    viewer.set_content(Scene3D::create_test_scene(), Vec::new()).unwrap();
    assert!(viewer.state.add_lights);
    assert_eq!(viewer.lights().len(), 2);

    viewer.state.ambient_intensity = 0.5;
    viewer.update_lights();
    assert_eq!(viewer.lights()[0].intensity(), 0.5);

    viewer.state.add_lights = false;
    viewer.update_lights();
    assert!(viewer.lights().is_empty());
}

#[test]
fn test_asset_generator_preset_uses_hemisphere_light() {
    let options = ViewerOptions {
        preset: "assetgenerator".to_string(),
        ..ViewerOptions::default()
    };
    let mut viewer = Viewer::new(HeadlessBackend::new(), options);
    viewer.set_content(Scene3D::create_test_scene(), Vec::new()).unwrap();
    assert_eq!(viewer.lights().len(), 1);
    assert!(matches!(viewer.lights()[0].light_type, LightType::Hemisphere { .. }));
}

#[test]
fn test_asset_map_rewrites_urls() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("scene.gltf"), scene_gltf("scene.bin")).unwrap();

    let mut map = AssetMap::new();
    map.insert("dropped/scene.bin", scene_bin());
    let loader = AssetLoader::new(FileSource::new(dir.path())).with_asset_map("dropped/", map);
    assert_eq!(
        loader.resolve("./", "scene.bin"),
        ResolvedUrl::Mapped("dropped/scene.bin".to_string())
    );
    assert_eq!(
        loader.resolve("./", "other.bin"),
        ResolvedUrl::Source("other.bin".to_string())
    );

    let content = pollster::block_on(loader.load("scene.gltf")).unwrap();
    assert_eq!(content.scene.meshes.len(), 1);
}

#[test]
fn test_missing_buffer_is_reported() {
    let mut map = AssetMap::new();
    map.insert("scene.gltf", scene_gltf("missing.bin"));
    let loader = AssetLoader::new(map);
    let err = pollster::block_on(loader.load("scene.gltf")).unwrap_err();
    assert!(matches!(err, ViewerError::AssetNotFound(url) if url == "missing.bin"));
}

#[test]
fn test_stale_environment_is_dropped() {
    let mut viewer = viewer();
    let mut source = AssetMap::new();
    add_environment(&mut source, "Bridge");
    add_environment(&mut source, "Park");

    viewer.state.environment = "Bridge".to_string();
    let first = viewer.update_environment().unwrap();
    viewer.state.environment = "Park".to_string();
    let second = viewer.update_environment().unwrap();

    let second_result = pollster::block_on(second.fetch(&source));
    assert!(viewer.apply_environment(second.generation, second_result).unwrap());
    let first_result = pollster::block_on(first.fetch(&source));
    assert!(!viewer.apply_environment(first.generation, first_result).unwrap());

    assert_eq!(viewer.environment_name(), Some("Park"));
    assert_eq!(viewer.backend().live_texture_count(), 1);
}

#[test]
fn test_environment_background_and_none() {
    let mut viewer = viewer();
    let mut source = AssetMap::new();
    add_environment(&mut source, "Bridge");

    viewer.state.environment = "Bridge".to_string();
    viewer.state.background = true;
    assert!(pollster::block_on(viewer.refresh_environment(&source)).unwrap());
    viewer.render().unwrap();
    let frame = viewer.backend().last_frame().unwrap();
    assert!(matches!(frame.background, Background::Environment(_)));

    viewer.state.environment = "None".to_string();
    assert!(pollster::block_on(viewer.refresh_environment(&source)).unwrap());
    assert!(viewer.environment_name().is_none());
    assert_eq!(viewer.backend().live_texture_count(), 0);
    viewer.render().unwrap();
    let frame = viewer.backend().last_frame().unwrap();
    assert!(matches!(frame.background, Background::Gradient(_, _)));
}

#[test]
fn test_missing_environment_faces_fail_the_request() {
    let mut viewer = viewer();
    viewer.state.environment = "Park".to_string();
    let err = pollster::block_on(viewer.refresh_environment(&AssetMap::new())).unwrap_err();
    assert!(matches!(err, ViewerError::AssetNotFound(_)));
    assert!(viewer.pending_environment().is_none());
}

#[test]
fn test_playback_moves_the_plunger() {
    let mut viewer = viewer();
    load(&mut viewer, "models/pen/scene.gltf");
    let start = viewer.content().unwrap().get_node(PLUNGER).unwrap().translation;

    viewer.animate(0.0).unwrap();
    viewer.animate(500.0).unwrap();
    let moved = viewer.content().unwrap().get_node(PLUNGER).unwrap().translation;
    assert!(approx_equal(moved.z - start.z, 1.0, 1e-3));
    assert_eq!(viewer.backend().frame_count(), 2);
}

#[test]
fn test_grid_and_wireframe_reach_the_frame() {
    let mut viewer = viewer();
    viewer.set_content(Scene3D::create_test_scene(), Vec::new()).unwrap();
    viewer.state.grid = true;
    viewer.state.wireframe = true;
    viewer.update_display().unwrap();
    let frame = viewer.build_frame();
    assert_eq!(frame.helpers.len(), 2);
    assert!(frame.draws.iter().all(|d| d.material.wireframe));
}

#[test]
fn test_non_ascii_background_color_falls_back() {
    let mut viewer = viewer();
    viewer.state.bg_color1 = "#a\u{e9}123".to_string();
    viewer.update_background();
    viewer.render().unwrap();
    let frame = viewer.backend().last_frame().unwrap();
    let Background::Gradient(top, _) = frame.background else {
        panic!("expected a gradient background");
    };
    assert_eq!(top, vitrine_viewer::Color::white());
}
