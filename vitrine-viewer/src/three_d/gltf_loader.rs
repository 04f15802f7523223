//! glTF 2.0 scene import
//!
//! Converts a parsed glTF document plus its resolved buffers and decoded
//! images into a [`LoadedContent`]. Fetching the bytes is the asset loader's
//! job (see [`crate::assets`]).

use crate::animation::{AnimationClip, Channel, Interpolation, Keyframes};
use crate::error::{Result, ViewerError};
use crate::primitives::Color;
use crate::three_d::material::{TextureBinding, TextureEncoding, TextureSlot};
use crate::three_d::scene3d::{NodeKind, Skin, TextureImage};
use crate::three_d::{CameraType, Light, LightType, Material3D, Mesh3D, Node3D, Scene3D, Vertex3D};
use glam::{Quat, Vec2, Vec3};
use gltf::Gltf;

/// An externally loaded scene graph with its animation clips
#[derive(Debug, Clone)]
pub struct LoadedContent {
    /// The imported scene
    pub scene: Scene3D,
    /// Animation clips targeting `scene`'s nodes
    pub clips: Vec<AnimationClip>,
}

/// Build a [`LoadedContent`] from a parsed document
///
/// `buffers` holds the bytes of every buffer in document order, `images` the
/// decoded texels of every image (or `None` when the image could not be
/// resolved).
pub fn build_content(
    gltf: &Gltf,
    name: &str,
    buffers: &[Vec<u8>],
    images: Vec<Option<image::RgbaImage>>,
) -> Result<LoadedContent> {
    let mut scene = Scene3D::new(name.to_string());

    for (index, image) in images.into_iter().enumerate() {
        let image_name = gltf
            .images()
            .nth(index)
            .and_then(|i| i.name().map(str::to_string))
            .unwrap_or_else(|| format!("image_{}", index));
        scene.textures.push(TextureImage {
            name: image_name,
            image,
        });
    }

    for gltf_material in gltf.materials() {
        let material = convert_material(&gltf_material);
        scene.add_material(material);
    }

    // Primitives without a material use the glTF default material
    let default_material = scene.add_material(Material3D::default());

    // Mesh index -> primitive indices in scene.meshes
    let mut mesh_primitives = Vec::new();
    for gltf_mesh in gltf.meshes() {
        let mut primitives = Vec::new();
        for primitive in gltf_mesh.primitives() {
            let mesh = convert_primitive(&gltf_mesh, &primitive, buffers, default_material)?;
            primitives.push(scene.add_mesh(mesh));
        }
        mesh_primitives.push(primitives);
    }

    // glTF node index -> scene node index
    let mut node_map = vec![None; gltf.nodes().count()];
    if let Some(gltf_scene) = gltf.default_scene().or_else(|| gltf.scenes().next()) {
        for node in gltf_scene.nodes() {
            load_node(&node, &mut scene, None, &mesh_primitives, &mut node_map);
        }
    }

    for skin in gltf.skins() {
        scene.skins.push(Skin {
            name: skin.name().unwrap_or("Skin").to_string(),
            joints: skin
                .joints()
                .filter_map(|joint| node_map.get(joint.index()).copied().flatten())
                .collect(),
        });
    }

    let clips = gltf
        .animations()
        .map(|animation| convert_animation(&animation, buffers, &node_map))
        .collect();

    Ok(LoadedContent { scene, clips })
}

/// Convert a glTF material to our Material3D
fn convert_material(gltf_material: &gltf::Material) -> Material3D {
    let pbr = gltf_material.pbr_metallic_roughness();

    let base_color = pbr.base_color_factor();
    let base_color = Color::new(base_color[0], base_color[1], base_color[2], base_color[3]);

    let mut material = Material3D::new_pbr(
        gltf_material.name().unwrap_or("Material").to_string(),
        base_color,
        pbr.metallic_factor(),
        pbr.roughness_factor(),
    );

    if let crate::three_d::MaterialType::PBR { ref mut emissive, .. } = material.material_type {
        *emissive = Color::from_rgb(gltf_material.emissive_factor());
    }

    let mut bind = |slot: TextureSlot, texture: Option<usize>| {
        if let Some(texture) = texture {
            let encoding = if slot.is_color() {
                TextureEncoding::Srgb
            } else {
                TextureEncoding::Linear
            };
            material.textures.push(TextureBinding {
                slot,
                texture,
                encoding,
            });
        }
    };
    let image_of = |texture: gltf::Texture| texture.source().index();
    bind(TextureSlot::BaseColor, pbr.base_color_texture().map(|i| image_of(i.texture())));
    bind(
        TextureSlot::MetallicRoughness,
        pbr.metallic_roughness_texture().map(|i| image_of(i.texture())),
    );
    bind(TextureSlot::Normal, gltf_material.normal_texture().map(|i| image_of(i.texture())));
    bind(
        TextureSlot::Occlusion,
        gltf_material.occlusion_texture().map(|i| image_of(i.texture())),
    );
    bind(TextureSlot::Emissive, gltf_material.emissive_texture().map(|i| image_of(i.texture())));

    if let gltf::material::AlphaMode::Blend = gltf_material.alpha_mode() {
        material.opacity = base_color.a;
    }

    material.double_sided = gltf_material.double_sided();

    material
}

/// Convert a glTF primitive to our Mesh3D
fn convert_primitive(
    gltf_mesh: &gltf::Mesh,
    primitive: &gltf::Primitive,
    buffer_data: &[Vec<u8>],
    default_material: usize,
) -> Result<Mesh3D> {
    let reader = primitive.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));

    let name = gltf_mesh
        .name()
        .map(|n| format!("{}_primitive{}", n, primitive.index()))
        .unwrap_or_else(|| format!("mesh{}_primitive{}", gltf_mesh.index(), primitive.index()));
    let mut mesh = Mesh3D::new(name);

    let positions = reader
        .read_positions()
        .ok_or_else(|| ViewerError::MissingPositions(mesh.name.clone()))?
        .collect::<Vec<_>>();

    let normals: Vec<[f32; 3]> = match reader.read_normals() {
        Some(normals) => normals.collect(),
        None => vec![[0.0, 1.0, 0.0]; positions.len()],
    };

    let tex_coords: Vec<[f32; 2]> = match reader.read_tex_coords(0) {
        Some(coords) => coords.into_f32().collect(),
        None => vec![[0.0, 0.0]; positions.len()],
    };

    let colors: Option<Vec<[f32; 4]>> = reader
        .read_colors(0)
        .map(|colors| colors.into_rgba_f32().collect());

    for (i, position) in positions.iter().enumerate() {
        let position = Vec3::from(*position);
        let normal = normals.get(i).copied().map(Vec3::from).unwrap_or(Vec3::Y);
        let tex_coord = tex_coords.get(i).copied().map(Vec2::from).unwrap_or(Vec2::ZERO);

        let vertex = match colors.as_ref().and_then(|c| c.get(i)) {
            Some(color) => Vertex3D::with_color(position, normal, tex_coord, *color),
            None => Vertex3D::new(position, normal, tex_coord),
        };
        mesh.vertices.push(vertex);
    }

    mesh.indices = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..mesh.vertices.len() as u32).collect(),
    };

    mesh.material_index = Some(primitive.material().index().unwrap_or(default_material));

    Ok(mesh)
}

fn convert_camera(camera: &gltf::Camera) -> CameraType {
    match camera.projection() {
        gltf::camera::Projection::Perspective(p) => CameraType::Perspective {
            fov: p.yfov(),
            near: p.znear(),
            far: p.zfar().unwrap_or(1000.0),
        },
        gltf::camera::Projection::Orthographic(o) => CameraType::Orthographic {
            x_mag: o.xmag(),
            y_mag: o.ymag(),
            near: o.znear(),
            far: o.zfar(),
        },
    }
}

fn convert_light(light: &gltf::khr_lights_punctual::Light) -> Light {
    let color = Color::from_rgb(light.color());
    let intensity = light.intensity();
    let light_type = match light.kind() {
        gltf::khr_lights_punctual::Kind::Directional => LightType::Directional { color, intensity },
        gltf::khr_lights_punctual::Kind::Point => LightType::Point {
            color,
            intensity,
            range: light.range(),
        },
        gltf::khr_lights_punctual::Kind::Spot {
            inner_cone_angle,
            outer_cone_angle,
        } => LightType::Spot {
            color,
            intensity,
            range: light.range(),
            inner_angle: inner_cone_angle,
            outer_angle: outer_cone_angle,
        },
    };
    Light {
        name: light.name().unwrap_or("Light").to_string(),
        light_type,
        offset: Vec3::ZERO,
    }
}

/// Load a node and its children
fn load_node(
    gltf_node: &gltf::Node,
    scene: &mut Scene3D,
    parent_index: Option<usize>,
    mesh_primitives: &[Vec<usize>],
    node_map: &mut [Option<usize>],
) -> usize {
    let name = gltf_node
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("node{}", gltf_node.index()));

    let kind = if let Some(gltf_mesh) = gltf_node.mesh() {
        NodeKind::Mesh {
            primitives: mesh_primitives.get(gltf_mesh.index()).cloned().unwrap_or_default(),
            skin: gltf_node.skin().map(|skin| skin.index()),
        }
    } else if let Some(camera) = gltf_node.camera() {
        NodeKind::Camera(convert_camera(&camera))
    } else if let Some(light) = gltf_node.light() {
        NodeKind::Light(convert_light(&light))
    } else {
        NodeKind::Group
    };

    let mut node = Node3D::with_kind(name, kind);
    let (translation, rotation, scale) = gltf_node.transform().decomposed();
    node.translation = Vec3::from(translation);
    node.rotation = Quat::from_array(rotation);
    node.scale = Vec3::from(scale);
    if let Some(weights) = gltf_node.weights() {
        node.weights = weights.to_vec();
    }

    let node_index = scene.add_node(node);
    if let Some(parent) = parent_index {
        scene.attach(node_index, parent);
    }
    if let Some(slot) = node_map.get_mut(gltf_node.index()) {
        *slot = Some(node_index);
    }

    for child in gltf_node.children() {
        load_node(&child, scene, Some(node_index), mesh_primitives, node_map);
    }

    node_index
}

fn convert_animation(
    animation: &gltf::Animation,
    buffer_data: &[Vec<u8>],
    node_map: &[Option<usize>],
) -> AnimationClip {
    use gltf::animation::util::ReadOutputs;

    let mut channels = Vec::new();
    for channel in animation.channels() {
        let Some(node) = node_map.get(channel.target().node().index()).copied().flatten() else {
            continue;
        };
        let reader = channel.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));
        let Some(inputs) = reader.read_inputs() else {
            continue;
        };
        let times: Vec<f32> = inputs.collect();

        let keyframes = match reader.read_outputs() {
            Some(ReadOutputs::Translations(values)) => {
                Keyframes::Translation(values.map(Vec3::from).collect())
            }
            Some(ReadOutputs::Rotations(values)) => {
                Keyframes::Rotation(values.into_f32().map(Quat::from_array).collect())
            }
            Some(ReadOutputs::Scales(values)) => Keyframes::Scale(values.map(Vec3::from).collect()),
            Some(ReadOutputs::MorphTargetWeights(values)) => {
                Keyframes::Weights(values.into_f32().collect())
            }
            None => continue,
        };

        let interpolation = match channel.sampler().interpolation() {
            gltf::animation::Interpolation::Linear => Interpolation::Linear,
            gltf::animation::Interpolation::Step => Interpolation::Step,
            gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
        };

        channels.push(Channel {
            node,
            times,
            keyframes,
            interpolation,
        });
    }

    let name = animation
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("animation_{}", animation.index()));
    AnimationClip::new(name, channels)
}
