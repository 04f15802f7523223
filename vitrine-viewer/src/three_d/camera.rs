//! 3D camera system: projection cameras, orbit controls and arc-rotate cameras

use crate::three_d::bounds::Ray;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Type of camera projection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CameraType {
    /// Perspective projection (3D depth)
    Perspective {
        /// Vertical field of view in radians
        fov: f32,
        /// Near clipping plane
        near: f32,
        /// Far clipping plane
        far: f32,
    },
    /// Orthographic projection (no perspective)
    Orthographic {
        /// Half width of the view volume
        x_mag: f32,
        /// Half height of the view volume
        y_mag: f32,
        /// Near clipping plane
        near: f32,
        /// Far clipping plane
        far: f32,
    },
}

impl CameraType {
    /// Projection matrix for the given aspect ratio
    pub fn matrix(&self, aspect_ratio: f32) -> Mat4 {
        match *self {
            CameraType::Perspective { fov, near, far } => {
                Mat4::perspective_rh(fov, aspect_ratio, near, far)
            }
            CameraType::Orthographic { x_mag, y_mag, near, far } => {
                Mat4::orthographic_rh(-x_mag, x_mag, -y_mag, y_mag, near, far)
            }
        }
    }
}

/// 3D camera for viewing the scene
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera3D {
    /// Camera position in world space
    pub position: Vec3,
    /// Target position the camera is looking at
    pub target: Vec3,
    /// Up vector (usually Y-axis)
    pub up: Vec3,
    /// Type of projection
    pub projection: CameraType,
    /// Aspect ratio (width / height)
    pub aspect_ratio: f32,
}

impl Camera3D {
    /// Create a new perspective camera
    pub fn new_perspective(position: Vec3, target: Vec3, fov: f32, aspect_ratio: f32) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            projection: CameraType::Perspective {
                fov,
                near: 0.01,
                far: 1000.0,
            },
            aspect_ratio,
        }
    }

    /// Get the view matrix (world to camera space)
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix(self.aspect_ratio)
    }

    /// Get the combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Update aspect ratio (e.g., when window resizes)
    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
    }

    /// Update the clipping planes of the projection
    pub fn set_clip_planes(&mut self, new_near: f32, new_far: f32) {
        match &mut self.projection {
            CameraType::Perspective { near, far, .. }
            | CameraType::Orthographic { near, far, .. } => {
                *near = new_near;
                *far = new_far;
            }
        }
    }

    /// Point the camera at `target`
    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    /// Camera-to-world transform
    pub fn world_matrix(&self) -> Mat4 {
        self.view_matrix().inverse()
    }

    /// Ray through normalized device coordinates (`-1..1`, y up)
    pub fn screen_ray(&self, ndc_x: f32, ndc_y: f32) -> Ray {
        screen_ray(&self.view_projection_matrix(), ndc_x, ndc_y)
    }
}

/// Ray through normalized device coordinates of any view-projection matrix
pub fn screen_ray(view_projection: &Mat4, ndc_x: f32, ndc_y: f32) -> Ray {
    let inverse = view_projection.inverse();
    let near = inverse.project_point3(Vec3::new(ndc_x, ndc_y, -1.0));
    let far = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));
    Ray::new(near, far - near)
}

/// Orbit, dolly and pan a camera around a target point
#[derive(Debug, Clone)]
pub struct OrbitControls {
    /// Whether pointer input moves the camera
    pub enabled: bool,
    /// Point the camera orbits
    pub target: Vec3,
    /// Spin the camera around the target every update
    pub auto_rotate: bool,
    /// Auto-rotation speed (a full turn takes `60 / speed` seconds)
    pub auto_rotate_speed: f32,
    /// Pan in screen space instead of in the ground plane
    pub screen_space_panning: bool,
    /// Closest allowed distance to the target
    pub min_distance: f32,
    /// Farthest allowed distance to the target
    pub max_distance: f32,
    saved: Option<(Vec3, Vec3)>,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            enabled: true,
            target: Vec3::ZERO,
            auto_rotate: false,
            auto_rotate_speed: 2.0,
            screen_space_panning: true,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            saved: None,
        }
    }
}

impl OrbitControls {
    /// Create controls looking at the origin
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the camera's current placement for [`OrbitControls::reset`]
    pub fn save_state(&mut self, camera: &Camera3D) {
        self.saved = Some((camera.position, self.target));
    }

    /// Restore the placement recorded by [`OrbitControls::save_state`]
    pub fn reset(&mut self, camera: &mut Camera3D) {
        if let Some((position, target)) = self.saved {
            camera.position = position;
            self.target = target;
            camera.look_at(target);
        }
    }

    /// Rotate around the target by yaw/pitch radians
    pub fn rotate(&mut self, camera: &mut Camera3D, yaw: f32, pitch: f32) {
        if !self.enabled {
            return;
        }
        let offset = camera.position - self.target;
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return;
        }
        let mut theta = offset.x.atan2(offset.z) - yaw;
        let mut phi = (offset.y / radius).clamp(-1.0, 1.0).acos() - pitch;
        phi = phi.clamp(1.0e-4, std::f32::consts::PI - 1.0e-4);
        theta %= std::f32::consts::TAU;
        camera.position = self.target + spherical(radius, phi, theta);
        camera.look_at(self.target);
    }

    /// Move toward (positive) or away from the target, clamped to the distance limits
    pub fn dolly(&mut self, camera: &mut Camera3D, delta: f32) {
        if !self.enabled {
            return;
        }
        let offset = camera.position - self.target;
        let distance = (offset.length() - delta).clamp(self.min_distance, self.max_distance);
        camera.position = self.target + offset.normalize_or_zero() * distance;
        camera.look_at(self.target);
    }

    /// Translate camera and target together
    pub fn pan(&mut self, camera: &mut Camera3D, dx: f32, dy: f32) {
        if !self.enabled {
            return;
        }
        let forward = (self.target - camera.position).normalize_or_zero();
        let right = forward.cross(camera.up).normalize_or_zero();
        let up = if self.screen_space_panning {
            right.cross(forward).normalize_or_zero()
        } else {
            camera.up.cross(right).normalize_or_zero()
        };
        let shift = right * dx + up * dy;
        camera.position += shift;
        self.target += shift;
        camera.look_at(self.target);
    }

    /// Apply auto-rotation and keep the camera aimed at the target
    pub fn update(&mut self, camera: &mut Camera3D, dt: f32) {
        if self.enabled && self.auto_rotate {
            let angle = std::f32::consts::TAU / 60.0 * self.auto_rotate_speed * dt;
            self.rotate(camera, angle, 0.0);
        }
        let distance = (camera.position - self.target).length();
        if distance > self.max_distance {
            let direction = (camera.position - self.target).normalize_or_zero();
            camera.position = self.target + direction * self.max_distance;
        }
        camera.look_at(self.target);
    }
}

fn spherical(radius: f32, phi: f32, theta: f32) -> Vec3 {
    Vec3::new(
        radius * phi.sin() * theta.sin(),
        radius * phi.cos(),
        radius * phi.sin() * theta.cos(),
    )
}

/// Camera orbiting a target at `radius`, placed by longitude `alpha` and latitude `beta`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcRotateCamera {
    /// Longitudinal rotation in radians
    pub alpha: f32,
    /// Latitudinal rotation in radians
    pub beta: f32,
    /// Distance from the target
    pub radius: f32,
    /// Point the camera looks at
    pub target: Vec3,
    /// Smallest allowed radius
    pub lower_radius_limit: Option<f32>,
    /// Largest allowed radius
    pub upper_radius_limit: Option<f32>,
    /// Vertical field of view in radians
    pub fov: f32,
    /// Aspect ratio (width / height)
    pub aspect_ratio: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
}

impl ArcRotateCamera {
    /// Create a camera at the given spherical placement around `target`
    pub fn new(alpha: f32, beta: f32, radius: f32, target: Vec3) -> Self {
        Self {
            alpha,
            beta,
            radius,
            target,
            lower_radius_limit: None,
            upper_radius_limit: None,
            fov: 0.8,
            aspect_ratio: 1.0,
            near: 1.0,
            far: 10000.0,
        }
    }

    /// World-space camera position
    pub fn position(&self) -> Vec3 {
        let (sin_b, cos_b) = self.beta.sin_cos();
        let (sin_a, cos_a) = self.alpha.sin_cos();
        self.target + Vec3::new(cos_a * sin_b, cos_b, sin_a * sin_b) * self.radius
    }

    /// Rotate by pointer deltas (radians)
    pub fn rotate(&mut self, d_alpha: f32, d_beta: f32) {
        self.alpha += d_alpha;
        self.beta = (self.beta + d_beta).clamp(1.0e-3, std::f32::consts::PI - 1.0e-3);
    }

    /// Change the radius, clamped to the configured limits
    pub fn zoom(&mut self, delta: f32) {
        self.radius = self.clamp_radius(self.radius - delta);
    }

    fn clamp_radius(&self, radius: f32) -> f32 {
        let mut radius = radius.max(f32::EPSILON);
        if let Some(lower) = self.lower_radius_limit {
            radius = radius.max(lower);
        }
        if let Some(upper) = self.upper_radius_limit {
            radius = radius.min(upper);
        }
        radius
    }

    /// Re-apply the radius limits after they change
    pub fn apply_limits(&mut self) {
        self.radius = self.clamp_radius(self.radius);
    }

    /// Equivalent look-at camera for rendering and picking
    pub fn to_camera(&self) -> Camera3D {
        let mut camera =
            Camera3D::new_perspective(self.position(), self.target, self.fov, self.aspect_ratio);
        camera.set_clip_planes(self.near, self.far);
        camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orbit_keeps_distance() {
        let mut camera = Camera3D::new_perspective(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 1.0, 1.0);
        let mut controls = OrbitControls::new();
        controls.rotate(&mut camera, 0.7, 0.3);
        assert!(((camera.position - controls.target).length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_disabled_controls_do_not_move() {
        let mut camera = Camera3D::new_perspective(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 1.0, 1.0);
        let mut controls = OrbitControls::new();
        controls.enabled = false;
        controls.dolly(&mut camera, 5.0);
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 10.0));
    }

    #[test]
    fn test_reset_restores_saved_state() {
        let mut camera = Camera3D::new_perspective(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 1.0, 1.0);
        let mut controls = OrbitControls::new();
        controls.save_state(&camera);
        controls.pan(&mut camera, 3.0, 1.0);
        controls.reset(&mut camera);
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 10.0));
        assert_eq!(controls.target, Vec3::ZERO);
    }

    #[test]
    fn test_arc_rotate_radius_limits() {
        let mut camera = ArcRotateCamera::new(0.0, 1.0, 100.0, Vec3::ZERO);
        camera.lower_radius_limit = Some(100.0);
        camera.upper_radius_limit = Some(600.0);
        camera.zoom(50.0);
        assert_eq!(camera.radius, 100.0);
        camera.zoom(-1000.0);
        assert_eq!(camera.radius, 600.0);
    }

    #[test]
    fn test_screen_ray_points_at_target() {
        let camera = Camera3D::new_perspective(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 1.0, 1.0);
        let ray = camera.screen_ray(0.0, 0.0);
        assert!(ray.direction.dot(-Vec3::Z) > 0.999);
    }
}
