//! Test helpers: a tiny glTF model and environment faces held in memory
#![allow(dead_code)]

use image::{ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;
use vitrine_viewer::environment::find_environment;
use vitrine_viewer::AssetMap;

/// Name of the part driving the dose dial
pub const PLUNGER: &str = "Cylinder005";

/// Binary buffer: a slanted triangle, two key times and two translations
pub fn scene_bin() -> Vec<u8> {
    let floats: [f32; 17] = [
        // positions
        -1.0, -1.0, -1.0, 1.0, -1.0, 1.0, 0.0, 1.0, 0.0,
        // key times
        0.0, 1.0,
        // translations
        0.0, 0.0, 0.0, 0.0, 0.0, 2.0,
    ];
    floats.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Document with a plunger node, a body node above it and one clip moving the plunger
pub fn scene_gltf(buffer_uri: &str) -> Vec<u8> {
    let document = serde_json::json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0, 1] }],
        "nodes": [
            { "name": PLUNGER, "mesh": 0 },
            { "name": "Body", "mesh": 0, "translation": [0.0, 5.0, 0.0] }
        ],
        "meshes": [{
            "name": "Pen",
            "primitives": [{ "attributes": { "POSITION": 0 }, "material": 0 }]
        }],
        "materials": [{
            "name": "08_-_Defaultffff",
            "pbrMetallicRoughness": { "baseColorFactor": [1.0, 1.0, 1.0, 1.0] }
        }],
        "buffers": [{ "uri": buffer_uri, "byteLength": 68 }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 8 },
            { "buffer": 0, "byteOffset": 44, "byteLength": 24 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [-1.0, -1.0, -1.0], "max": [1.0, 1.0, 1.0]
            },
            {
                "bufferView": 1, "componentType": 5126, "count": 2, "type": "SCALAR",
                "min": [0.0], "max": [1.0]
            },
            { "bufferView": 2, "componentType": 5126, "count": 2, "type": "VEC3" }
        ],
        "animations": [{
            "name": "Press",
            "channels": [{ "sampler": 0, "target": { "node": 0, "path": "translation" } }],
            "samplers": [{ "input": 1, "output": 2, "interpolation": "LINEAR" }]
        }]
    });
    serde_json::to_vec(&document).unwrap()
}

/// Asset map holding the model under `root` (which ends with a slash)
pub fn model_assets(root: &str) -> AssetMap {
    let mut map = AssetMap::new();
    map.insert(format!("{}scene.gltf", root), scene_gltf("scene.bin"));
    map.insert(format!("{}scene.bin", root), scene_bin());
    map
}

/// Asset map holding all three showcase models
pub fn showcase_assets() -> AssetMap {
    let mut map = AssetMap::new();
    for root in ["model/orgal006/", "model/puregon_export-005/", "model/elnova_export05/"] {
        map.insert(format!("{}scene.gltf", root), scene_gltf("scene.bin"));
        map.insert(format!("{}scene.bin", root), scene_bin());
    }
    map
}

/// PNG-encoded square of one color
pub fn png_face(size: u32, color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(size, size, Rgba(color));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageOutputFormat::Png).unwrap();
    bytes.into_inner()
}

/// Add the six faces of the environment called `name` to `map`
pub fn add_environment(map: &mut AssetMap, name: &str) {
    let urls = find_environment(name).unwrap().face_urls().unwrap();
    for url in urls {
        map.insert(url, png_face(4, [200, 180, 160, 255]));
    }
}

/// Compare floats with tolerance
pub fn approx_equal(a: f32, b: f32, tolerance: f32) -> bool {
    (a - b).abs() < tolerance
}
