//! WebGL2 render backend for the browser

use crate::backend::{
    Background, DrawItem, Frame, FrameLight, GeometryHandle, Helper, RenderBackend, TextureHandle,
};
use crate::environment::EnvironmentMap;
use crate::error::{Result, ViewerError};
use crate::primitives::Color;
use crate::three_d::{LightType, Mesh3D};
use crate::three_d::scene3d::TextureImage;
use glam::Vec3;
use std::collections::HashMap;
use wasm_bindgen::JsValue;
use web_sys::{
    WebGl2RenderingContext as Gl, WebGlBuffer, WebGlProgram, WebGlShader, WebGlTexture,
    WebGlUniformLocation,
};

const MAX_LIGHTS: usize = 4;

const MESH_VERTEX_SHADER: &str = r#"#version 300 es
precision highp float;

in vec3 a_position;
in vec3 a_normal;
in vec2 a_texcoord;

uniform mat4 u_model;
uniform mat4 u_view;
uniform mat4 u_projection;
uniform mat4 u_normalMatrix;

out vec3 v_position;
out vec3 v_normal;
out vec2 v_texcoord;

void main() {
    vec4 worldPos = u_model * vec4(a_position, 1.0);
    v_position = worldPos.xyz;
    v_normal = normalize((u_normalMatrix * vec4(a_normal, 0.0)).xyz);
    v_texcoord = a_texcoord;
    gl_Position = u_projection * u_view * worldPos;
}
"#;

const MESH_FRAGMENT_SHADER: &str = r#"#version 300 es
precision highp float;

in vec3 v_position;
in vec3 v_normal;
in vec2 v_texcoord;

uniform vec3 u_cameraPosition;
uniform vec4 u_baseColor;
uniform vec3 u_emissive;
uniform float u_metallic;
uniform float u_roughness;
uniform float u_exposure;

uniform bool u_hasTexture;
uniform bool u_srgbTexture;
uniform sampler2D u_texture;
uniform bool u_hasEnv;
uniform samplerCube u_env;
uniform vec3 u_refraction;

uniform vec3 u_ambientLight;
uniform vec3 u_hemiSky;
uniform vec3 u_hemiGround;
uniform int u_lightCount;
uniform int u_lightKind[4];
uniform vec3 u_lightColor[4];
uniform vec3 u_lightPosition[4];
uniform vec3 u_lightDirection[4];

out vec4 fragColor;

void main() {
    vec3 normal = normalize(v_normal);
    if (!gl_FrontFacing) normal = -normal;
    vec3 viewDir = normalize(u_cameraPosition - v_position);

    vec4 base = u_baseColor;
    if (u_hasTexture) {
        vec4 texel = texture(u_texture, v_texcoord);
        if (u_srgbTexture) texel.rgb = pow(texel.rgb, vec3(2.2));
        base *= texel;
    }

    float hemi = normal.y * 0.5 + 0.5;
    vec3 color = base.rgb * (u_ambientLight + mix(u_hemiGround, u_hemiSky, hemi));

    for (int i = 0; i < 4; i++) {
        if (i >= u_lightCount) break;
        vec3 toLight = u_lightKind[i] == 0
            ? -u_lightDirection[i]
            : normalize(u_lightPosition[i] - v_position);
        float NdotL = max(dot(normal, toLight), 0.0);
        vec3 halfVector = normalize(toLight + viewDir);
        float specular = pow(max(dot(normal, halfVector), 0.0), 32.0) * (1.0 - u_roughness);
        color += (base.rgb * (1.0 - u_metallic) * NdotL + vec3(specular)) * u_lightColor[i];
    }

    if (u_hasEnv) {
        vec3 reflected = reflect(-viewDir, normal);
        vec3 env = texture(u_env, reflected).rgb;
        color = mix(color, env * base.rgb, u_metallic * (1.0 - u_roughness));
        if (u_refraction.x > 0.0) {
            vec3 refracted = refract(-viewDir, normal, 1.0 / u_refraction.y);
            color = mix(color, texture(u_env, refracted).rgb, u_refraction.x * (1.0 - base.a));
        }
    }

    color += u_emissive;
    color = vec3(1.0) - exp(-color * u_exposure);
    fragColor = vec4(pow(color, vec3(1.0 / 2.2)), base.a);
}
"#;

const BACKGROUND_VERTEX_SHADER: &str = r#"#version 300 es
precision highp float;

in vec2 a_position;
uniform mat4 u_inverseViewProjection;
out vec2 v_uv;
out vec3 v_direction;

void main() {
    v_uv = a_position * 0.5 + 0.5;
    vec4 far = u_inverseViewProjection * vec4(a_position, 1.0, 1.0);
    v_direction = far.xyz / far.w;
    gl_Position = vec4(a_position, 0.9999, 1.0);
}
"#;

const BACKGROUND_FRAGMENT_SHADER: &str = r#"#version 300 es
precision highp float;

in vec2 v_uv;
in vec3 v_direction;
uniform vec3 u_cameraPosition;
uniform vec3 u_top;
uniform vec3 u_bottom;
uniform bool u_useEnv;
uniform samplerCube u_env;
out vec4 fragColor;

void main() {
    if (u_useEnv) {
        fragColor = vec4(texture(u_env, normalize(v_direction - u_cameraPosition)).rgb, 1.0);
    } else {
        float d = distance(v_uv, vec2(0.5, 1.0));
        fragColor = vec4(mix(u_top, u_bottom, clamp(d, 0.0, 1.0)), 1.0);
    }
}
"#;

const LINE_VERTEX_SHADER: &str = r#"#version 300 es
precision highp float;

in vec3 a_position;
in vec3 a_color;
uniform mat4 u_viewProjection;
out vec3 v_color;

void main() {
    v_color = a_color;
    gl_Position = u_viewProjection * vec4(a_position, 1.0);
}
"#;

const LINE_FRAGMENT_SHADER: &str = r#"#version 300 es
precision highp float;

in vec3 v_color;
out vec4 fragColor;

void main() {
    fragColor = vec4(v_color, 1.0);
}
"#;

/// A linked program with its uniform locations
struct Program {
    program: WebGlProgram,
    uniforms: HashMap<&'static str, WebGlUniformLocation>,
}

impl Program {
    fn new(gl: &Gl, vertex: &str, fragment: &str, uniform_names: &[&'static str]) -> Result<Self> {
        let vertex_shader = compile_shader(gl, Gl::VERTEX_SHADER, vertex)?;
        let fragment_shader = compile_shader(gl, Gl::FRAGMENT_SHADER, fragment)?;
        let program = gl
            .create_program()
            .ok_or_else(|| backend_error("Failed to create program"))?;
        gl.attach_shader(&program, &vertex_shader);
        gl.attach_shader(&program, &fragment_shader);
        gl.link_program(&program);

        if !gl
            .get_program_parameter(&program, Gl::LINK_STATUS)
            .as_bool()
            .unwrap_or(false)
        {
            let error = gl
                .get_program_info_log(&program)
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(backend_error(&format!("Failed to link program: {}", error)));
        }

        let mut uniforms = HashMap::new();
        for &name in uniform_names {
            if let Some(location) = gl.get_uniform_location(&program, name) {
                uniforms.insert(name, location);
            }
        }
        Ok(Self { program, uniforms })
    }

    fn attrib(&self, gl: &Gl, name: &str) -> Option<u32> {
        u32::try_from(gl.get_attrib_location(&self.program, name)).ok()
    }

    fn uniform(&self, name: &str) -> Option<&WebGlUniformLocation> {
        self.uniforms.get(name)
    }
}

struct MeshBuffers {
    vertex_buffer: WebGlBuffer,
    index_buffer: WebGlBuffer,
    index_count: i32,
    edge_buffer: WebGlBuffer,
    edge_count: i32,
}

enum GpuTexture {
    Flat(WebGlTexture),
    Cube(WebGlTexture),
}

/// [`RenderBackend`] drawing into a WebGL2 context
pub struct WebGlBackend {
    gl: Gl,
    mesh_program: Program,
    background_program: Program,
    line_program: Program,
    quad_buffer: WebGlBuffer,
    line_buffer: WebGlBuffer,
    meshes: HashMap<GeometryHandle, MeshBuffers>,
    textures: HashMap<TextureHandle, GpuTexture>,
    next_id: u64,
    size: (u32, u32),
}

impl WebGlBackend {
    /// Compile the programs and set up GL state
    pub fn new(gl: Gl) -> Result<Self> {
        let mesh_program = Program::new(
            &gl,
            MESH_VERTEX_SHADER,
            MESH_FRAGMENT_SHADER,
            &[
                "u_model", "u_view", "u_projection", "u_normalMatrix", "u_cameraPosition",
                "u_baseColor", "u_emissive", "u_metallic", "u_roughness", "u_exposure",
                "u_hasTexture", "u_srgbTexture", "u_texture", "u_hasEnv", "u_env", "u_refraction",
                "u_ambientLight", "u_hemiSky", "u_hemiGround", "u_lightCount", "u_lightKind",
                "u_lightColor", "u_lightPosition", "u_lightDirection",
            ],
        )?;
        let background_program = Program::new(
            &gl,
            BACKGROUND_VERTEX_SHADER,
            BACKGROUND_FRAGMENT_SHADER,
            &[
                "u_inverseViewProjection",
                "u_cameraPosition",
                "u_top",
                "u_bottom",
                "u_useEnv",
                "u_env",
            ],
        )?;
        let line_program = Program::new(
            &gl,
            LINE_VERTEX_SHADER,
            LINE_FRAGMENT_SHADER,
            &["u_viewProjection"],
        )?;

        let quad_buffer = create_buffer(&gl)?;
        gl.bind_buffer(Gl::ARRAY_BUFFER, Some(&quad_buffer));
        let quad: [f32; 12] = [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, 1.0];
        // SAFETY: the view is consumed by buffer_data before any allocation.
        unsafe {
            let array = js_sys::Float32Array::view(&quad);
            gl.buffer_data_with_array_buffer_view(Gl::ARRAY_BUFFER, &array, Gl::STATIC_DRAW);
        }
        let line_buffer = create_buffer(&gl)?;

        gl.enable(Gl::DEPTH_TEST);
        gl.depth_func(Gl::LEQUAL);
        gl.enable(Gl::BLEND);
        gl.blend_func(Gl::SRC_ALPHA, Gl::ONE_MINUS_SRC_ALPHA);

        Ok(Self {
            gl,
            mesh_program,
            background_program,
            line_program,
            quad_buffer,
            line_buffer,
            meshes: HashMap::new(),
            textures: HashMap::new(),
            next_id: 0,
            size: (0, 0),
        })
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Viewport size set by the last resize
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    fn draw_background(&self, frame: &Frame) {
        let gl = &self.gl;
        let program = &self.background_program;
        gl.use_program(Some(&program.program));
        gl.depth_mask(false);

        let inverse = (frame.projection * frame.view).inverse();
        if let Some(location) = program.uniform("u_inverseViewProjection") {
            gl.uniform_matrix4fv_with_f32_array(Some(location), false, &inverse.to_cols_array());
        }
        set_vec3(gl, program.uniform("u_cameraPosition"), frame.camera_position);

        let env = match frame.background {
            Background::Environment(handle) => self.cube_texture(handle),
            _ => None,
        };
        let (top, bottom) = match frame.background {
            Background::Gradient(top, bottom) => (top, bottom),
            Background::Solid(color) => (color, color),
            Background::Environment(_) => (Color::black(), Color::black()),
        };
        set_color(gl, program.uniform("u_top"), top);
        set_color(gl, program.uniform("u_bottom"), bottom);
        gl.uniform1i(program.uniform("u_useEnv"), i32::from(env.is_some()));
        gl.active_texture(Gl::TEXTURE1);
        gl.bind_texture(Gl::TEXTURE_CUBE_MAP, env);
        gl.uniform1i(program.uniform("u_env"), 1);

        if let Some(position) = program.attrib(gl, "a_position") {
            gl.bind_buffer(Gl::ARRAY_BUFFER, Some(&self.quad_buffer));
            gl.vertex_attrib_pointer_with_i32(position, 2, Gl::FLOAT, false, 0, 0);
            gl.enable_vertex_attrib_array(position);
            gl.draw_arrays(Gl::TRIANGLES, 0, 6);
            gl.disable_vertex_attrib_array(position);
        }
        gl.depth_mask(true);
    }

    fn set_lights(&self, lights: &[FrameLight]) {
        let gl = &self.gl;
        let program = &self.mesh_program;
        let mut ambient = Vec3::ZERO;
        let mut sky = Vec3::ZERO;
        let mut ground = Vec3::ZERO;
        let mut kinds = Vec::new();
        let mut colors = Vec::new();
        let mut positions = Vec::new();
        let mut directions = Vec::new();

        for light in lights {
            let (kind, color, intensity) = match &light.light {
                LightType::Ambient { color, intensity } => {
                    ambient += rgb(*color) * *intensity;
                    continue;
                }
                LightType::Hemisphere {
                    sky_color,
                    ground_color,
                    intensity,
                } => {
                    sky += rgb(*sky_color) * *intensity;
                    ground += rgb(*ground_color) * *intensity;
                    continue;
                }
                LightType::Directional { color, intensity } => (0, *color, *intensity),
                LightType::Point { color, intensity, .. } => (1, *color, *intensity),
                LightType::Spot { color, intensity, .. } => (1, *color, *intensity),
            };
            if kinds.len() == MAX_LIGHTS {
                continue;
            }
            kinds.push(kind);
            colors.extend_from_slice(&(rgb(color) * intensity).to_array());
            positions.extend_from_slice(&light.position.to_array());
            directions.extend_from_slice(&light.direction.normalize_or_zero().to_array());
        }

        set_vec3(gl, program.uniform("u_ambientLight"), ambient);
        set_vec3(gl, program.uniform("u_hemiSky"), sky);
        set_vec3(gl, program.uniform("u_hemiGround"), ground);
        gl.uniform1i(program.uniform("u_lightCount"), kinds.len() as i32);
        if !kinds.is_empty() {
            gl.uniform1iv_with_i32_array(program.uniform("u_lightKind"), &kinds);
            gl.uniform3fv_with_f32_array(program.uniform("u_lightColor"), &colors);
            gl.uniform3fv_with_f32_array(program.uniform("u_lightPosition"), &positions);
            gl.uniform3fv_with_f32_array(program.uniform("u_lightDirection"), &directions);
        }
    }

    fn draw_item(&self, item: &DrawItem) {
        let Some(buffers) = self.meshes.get(&item.geometry) else {
            return;
        };
        let gl = &self.gl;
        let program = &self.mesh_program;
        let material = &item.material;

        if let Some(location) = program.uniform("u_model") {
            gl.uniform_matrix4fv_with_f32_array(Some(location), false, &item.world.to_cols_array());
        }
        if let Some(location) = program.uniform("u_normalMatrix") {
            let normal_matrix = item.world.inverse().transpose();
            let normal = normal_matrix.to_cols_array();
            gl.uniform_matrix4fv_with_f32_array(Some(location), false, &normal);
        }

        let base = material.base_color;
        gl.uniform4f(program.uniform("u_baseColor"), base.r, base.g, base.b, material.opacity);
        set_color(gl, program.uniform("u_emissive"), material.emissive);
        gl.uniform1f(program.uniform("u_metallic"), material.metallic);
        gl.uniform1f(program.uniform("u_roughness"), material.roughness);

        let texture = material.base_color_texture.and_then(|h| self.flat_texture(h));
        gl.uniform1i(program.uniform("u_hasTexture"), i32::from(texture.is_some()));
        gl.uniform1i(program.uniform("u_srgbTexture"), i32::from(material.srgb));
        gl.active_texture(Gl::TEXTURE0);
        gl.bind_texture(Gl::TEXTURE_2D, texture);
        gl.uniform1i(program.uniform("u_texture"), 0);

        let env = material.env_map.and_then(|h| self.cube_texture(h));
        gl.uniform1i(program.uniform("u_hasEnv"), i32::from(env.is_some()));
        gl.active_texture(Gl::TEXTURE1);
        gl.bind_texture(Gl::TEXTURE_CUBE_MAP, env);
        gl.uniform1i(program.uniform("u_env"), 1);
        let (intensity, ior) = material
            .refraction
            .map(|(intensity, ior, _)| (intensity, ior))
            .unwrap_or((0.0, 1.0));
        gl.uniform3f(program.uniform("u_refraction"), intensity, ior, 0.0);

        if material.double_sided {
            gl.disable(Gl::CULL_FACE);
        } else {
            gl.enable(Gl::CULL_FACE);
        }

        let stride = 8 * 4;
        gl.bind_buffer(Gl::ARRAY_BUFFER, Some(&buffers.vertex_buffer));
        let attribs = [("a_position", 3, 0), ("a_normal", 3, 3 * 4), ("a_texcoord", 2, 6 * 4)];
        let mut enabled = Vec::with_capacity(attribs.len());
        for (name, size, offset) in attribs {
            if let Some(location) = program.attrib(gl, name) {
                gl.vertex_attrib_pointer_with_i32(location, size, Gl::FLOAT, false, stride, offset);
                gl.enable_vertex_attrib_array(location);
                enabled.push(location);
            }
        }

        if material.wireframe {
            gl.bind_buffer(Gl::ELEMENT_ARRAY_BUFFER, Some(&buffers.edge_buffer));
            gl.draw_elements_with_i32(Gl::LINES, buffers.edge_count, Gl::UNSIGNED_INT, 0);
        } else {
            gl.bind_buffer(Gl::ELEMENT_ARRAY_BUFFER, Some(&buffers.index_buffer));
            gl.draw_elements_with_i32(Gl::TRIANGLES, buffers.index_count, Gl::UNSIGNED_INT, 0);
        }
        for location in enabled {
            gl.disable_vertex_attrib_array(location);
        }
    }

    fn draw_helpers(&self, frame: &Frame) {
        let mut lines: Vec<f32> = Vec::new();
        let mut push = |a: Vec3, b: Vec3, color: Vec3| {
            lines.extend_from_slice(&a.to_array());
            lines.extend_from_slice(&color.to_array());
            lines.extend_from_slice(&b.to_array());
            lines.extend_from_slice(&color.to_array());
        };
        for helper in &frame.helpers {
            match helper {
                Helper::Grid { size, divisions } => {
                    let half = size / 2.0;
                    let step = size / (*divisions).max(1) as f32;
                    for i in 0..=*divisions {
                        let k = -half + i as f32 * step;
                        let color = if i * 2 == *divisions {
                            Vec3::splat(0.27)
                        } else {
                            Vec3::splat(0.53)
                        };
                        push(Vec3::new(-half, 0.0, k), Vec3::new(half, 0.0, k), color);
                        push(Vec3::new(k, 0.0, -half), Vec3::new(k, 0.0, half), color);
                    }
                }
                Helper::Axes { size } => {
                    push(Vec3::ZERO, Vec3::X * *size, Vec3::X);
                    push(Vec3::ZERO, Vec3::Y * *size, Vec3::Y);
                    push(Vec3::ZERO, Vec3::Z * *size, Vec3::Z);
                }
                Helper::Skeleton { segments, .. } => {
                    for (a, b) in segments {
                        push(*a, *b, Vec3::new(0.0, 0.0, 1.0));
                    }
                }
            }
        }
        if lines.is_empty() {
            return;
        }

        let gl = &self.gl;
        let program = &self.line_program;
        gl.use_program(Some(&program.program));
        if let Some(location) = program.uniform("u_viewProjection") {
            let view_projection = frame.projection * frame.view;
            let view_projection = view_projection.to_cols_array();
            gl.uniform_matrix4fv_with_f32_array(Some(location), false, &view_projection);
        }
        gl.bind_buffer(Gl::ARRAY_BUFFER, Some(&self.line_buffer));
        // SAFETY: the view is consumed by buffer_data before any allocation.
        unsafe {
            let array = js_sys::Float32Array::view(&lines);
            gl.buffer_data_with_array_buffer_view(Gl::ARRAY_BUFFER, &array, Gl::STREAM_DRAW);
        }
        let stride = 6 * 4;
        let mut enabled = Vec::new();
        for (name, offset) in [("a_position", 0), ("a_color", 3 * 4)] {
            if let Some(location) = program.attrib(gl, name) {
                gl.vertex_attrib_pointer_with_i32(location, 3, Gl::FLOAT, false, stride, offset);
                gl.enable_vertex_attrib_array(location);
                enabled.push(location);
            }
        }
        gl.draw_arrays(Gl::LINES, 0, (lines.len() / 6) as i32);
        for location in enabled {
            gl.disable_vertex_attrib_array(location);
        }
    }

    fn flat_texture(&self, handle: TextureHandle) -> Option<&WebGlTexture> {
        match self.textures.get(&handle) {
            Some(GpuTexture::Flat(texture)) => Some(texture),
            _ => None,
        }
    }

    fn cube_texture(&self, handle: TextureHandle) -> Option<&WebGlTexture> {
        match self.textures.get(&handle) {
            Some(GpuTexture::Cube(texture)) => Some(texture),
            _ => None,
        }
    }
}

impl RenderBackend for WebGlBackend {
    fn upload_geometry(&mut self, mesh: &Mesh3D) -> Result<GeometryHandle> {
        let gl = &self.gl;

        let mut vertex_data = Vec::with_capacity(mesh.vertices.len() * 8);
        for vertex in &mesh.vertices {
            vertex_data.extend_from_slice(&vertex.position.to_array());
            vertex_data.extend_from_slice(&vertex.normal.to_array());
            vertex_data.extend_from_slice(&vertex.tex_coords.to_array());
        }
        let vertex_buffer = create_buffer(gl)?;
        gl.bind_buffer(Gl::ARRAY_BUFFER, Some(&vertex_buffer));
        // SAFETY: the view is consumed by buffer_data before any allocation.
        unsafe {
            let array = js_sys::Float32Array::view(&vertex_data);
            gl.buffer_data_with_array_buffer_view(Gl::ARRAY_BUFFER, &array, Gl::STATIC_DRAW);
        }

        let index_buffer = create_buffer(gl)?;
        gl.bind_buffer(Gl::ELEMENT_ARRAY_BUFFER, Some(&index_buffer));
        // SAFETY: as above.
        unsafe {
            let array = js_sys::Uint32Array::view(&mesh.indices);
            gl.buffer_data_with_array_buffer_view(
                Gl::ELEMENT_ARRAY_BUFFER,
                &array,
                Gl::STATIC_DRAW,
            );
        }

        let edges: Vec<u32> = mesh
            .indices
            .chunks_exact(3)
            .flat_map(|t| [t[0], t[1], t[1], t[2], t[2], t[0]])
            .collect();
        let edge_buffer = create_buffer(gl)?;
        gl.bind_buffer(Gl::ELEMENT_ARRAY_BUFFER, Some(&edge_buffer));
        // SAFETY: as above.
        unsafe {
            let array = js_sys::Uint32Array::view(&edges);
            gl.buffer_data_with_array_buffer_view(
                Gl::ELEMENT_ARRAY_BUFFER,
                &array,
                Gl::STATIC_DRAW,
            );
        }

        let handle = GeometryHandle(self.next_id());
        self.meshes.insert(
            handle,
            MeshBuffers {
                vertex_buffer,
                index_buffer,
                index_count: mesh.indices.len() as i32,
                edge_buffer,
                edge_count: edges.len() as i32,
            },
        );
        Ok(handle)
    }

    fn upload_texture(&mut self, texture: &TextureImage) -> Result<TextureHandle> {
        let image = texture
            .image
            .as_ref()
            .ok_or_else(|| backend_error(&format!("Texture {} has no pixels", texture.name)))?;
        let gl = &self.gl;
        let gl_texture = gl
            .create_texture()
            .ok_or_else(|| backend_error("Failed to create texture"))?;
        gl.bind_texture(Gl::TEXTURE_2D, Some(&gl_texture));
        gl.tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_u8_array(
            Gl::TEXTURE_2D,
            0,
            Gl::RGBA as i32,
            image.width() as i32,
            image.height() as i32,
            0,
            Gl::RGBA,
            Gl::UNSIGNED_BYTE,
            Some(image.as_raw()),
        )
        .map_err(js_error)?;
        gl.generate_mipmap(Gl::TEXTURE_2D);
        gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_MIN_FILTER, Gl::LINEAR_MIPMAP_LINEAR as i32);
        gl.tex_parameteri(Gl::TEXTURE_2D, Gl::TEXTURE_MAG_FILTER, Gl::LINEAR as i32);

        let handle = TextureHandle(self.next_id());
        self.textures.insert(handle, GpuTexture::Flat(gl_texture));
        Ok(handle)
    }

    fn upload_environment(&mut self, environment: &EnvironmentMap) -> Result<TextureHandle> {
        let gl = &self.gl;
        let gl_texture = gl
            .create_texture()
            .ok_or_else(|| backend_error("Failed to create cube map"))?;
        gl.bind_texture(Gl::TEXTURE_CUBE_MAP, Some(&gl_texture));

        for (level, faces) in environment.levels.iter().enumerate() {
            for (face, texels) in faces.iter().enumerate() {
                let bytes: Vec<u8> = texels
                    .as_raw()
                    .iter()
                    .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
                    .collect();
                gl.tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_u8_array(
                    Gl::TEXTURE_CUBE_MAP_POSITIVE_X + face as u32,
                    level as i32,
                    Gl::RGBA as i32,
                    texels.width() as i32,
                    texels.height() as i32,
                    0,
                    Gl::RGBA,
                    Gl::UNSIGNED_BYTE,
                    Some(&bytes),
                )
                .map_err(js_error)?;
            }
        }
        gl.tex_parameteri(
            Gl::TEXTURE_CUBE_MAP,
            Gl::TEXTURE_MIN_FILTER,
            Gl::LINEAR_MIPMAP_LINEAR as i32,
        );
        gl.tex_parameteri(Gl::TEXTURE_CUBE_MAP, Gl::TEXTURE_MAG_FILTER, Gl::LINEAR as i32);
        gl.tex_parameteri(Gl::TEXTURE_CUBE_MAP, Gl::TEXTURE_WRAP_S, Gl::CLAMP_TO_EDGE as i32);
        gl.tex_parameteri(Gl::TEXTURE_CUBE_MAP, Gl::TEXTURE_WRAP_T, Gl::CLAMP_TO_EDGE as i32);

        let handle = TextureHandle(self.next_id());
        self.textures.insert(handle, GpuTexture::Cube(gl_texture));
        log::debug!("Uploaded environment {} as {:?}", environment.name, handle);
        Ok(handle)
    }

    fn release_geometry(&mut self, handle: GeometryHandle) {
        if let Some(buffers) = self.meshes.remove(&handle) {
            self.gl.delete_buffer(Some(&buffers.vertex_buffer));
            self.gl.delete_buffer(Some(&buffers.index_buffer));
            self.gl.delete_buffer(Some(&buffers.edge_buffer));
        }
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        match self.textures.remove(&handle) {
            Some(GpuTexture::Flat(texture)) | Some(GpuTexture::Cube(texture)) => {
                self.gl.delete_texture(Some(&texture));
            }
            None => {}
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.gl.viewport(0, 0, width as i32, height as i32);
    }

    fn render(&mut self, frame: &Frame) -> Result<()> {
        let gl = &self.gl;
        gl.clear_color(0.0, 0.0, 0.0, 1.0);
        gl.clear(Gl::COLOR_BUFFER_BIT | Gl::DEPTH_BUFFER_BIT);

        self.draw_background(frame);

        let program = &self.mesh_program;
        gl.use_program(Some(&program.program));
        if let Some(location) = program.uniform("u_view") {
            gl.uniform_matrix4fv_with_f32_array(Some(location), false, &frame.view.to_cols_array());
        }
        if let Some(location) = program.uniform("u_projection") {
            let projection = frame.projection.to_cols_array();
            gl.uniform_matrix4fv_with_f32_array(Some(location), false, &projection);
        }
        set_vec3(gl, program.uniform("u_cameraPosition"), frame.camera_position);
        gl.uniform1f(program.uniform("u_exposure"), frame.exposure);
        self.set_lights(&frame.lights);

        for item in &frame.draws {
            self.draw_item(item);
        }
        self.draw_helpers(frame);
        Ok(())
    }
}

/// Compile a shader
fn compile_shader(gl: &Gl, shader_type: u32, source: &str) -> Result<WebGlShader> {
    let shader = gl
        .create_shader(shader_type)
        .ok_or_else(|| backend_error("Failed to create shader"))?;
    gl.shader_source(&shader, source);
    gl.compile_shader(&shader);

    if !gl
        .get_shader_parameter(&shader, Gl::COMPILE_STATUS)
        .as_bool()
        .unwrap_or(false)
    {
        let error = gl
            .get_shader_info_log(&shader)
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(backend_error(&format!("Failed to compile shader: {}", error)));
    }
    Ok(shader)
}

fn create_buffer(gl: &Gl) -> Result<WebGlBuffer> {
    gl.create_buffer()
        .ok_or_else(|| backend_error("Failed to create buffer"))
}

fn set_vec3(gl: &Gl, location: Option<&WebGlUniformLocation>, v: Vec3) {
    gl.uniform3f(location, v.x, v.y, v.z);
}

fn set_color(gl: &Gl, location: Option<&WebGlUniformLocation>, color: Color) {
    gl.uniform3f(location, color.r, color.g, color.b);
}

fn rgb(color: Color) -> Vec3 {
    Vec3::new(color.r, color.g, color.b)
}

fn backend_error(message: &str) -> ViewerError {
    ViewerError::Backend(message.to_string())
}

/// Convert a JS exception into a viewer error
pub(crate) fn js_error(value: JsValue) -> ViewerError {
    ViewerError::Backend(value.as_string().unwrap_or_else(|| format!("{:?}", value)))
}
