//! Orbit camera, projection, and the camera uniform.
//!
//! [`ArcRotateCamera`] orbits a target point on a sphere described by
//! `alpha` (azimuth), `beta` (polar angle from +y) and `radius`. It ignores
//! user input until [`ArcRotateCamera::attach_control`] is called; input only
//! accumulates inertial offsets which are applied and decayed in
//! [`ArcRotateCamera::update`], after which all limits are enforced.

use std::f32::consts::PI;

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, SquareMatrix, Vector3, Vector4};
use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
};

use crate::data_structures::scene_graph::Ray;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Pixels scrolled per wheel "line" when the platform reports lines.
const WHEEL_LINE_HEIGHT: f32 = 40.0;

#[derive(Clone, Debug, PartialEq)]
pub struct ArcRotateCamera {
    pub name: String,
    pub alpha: f32,
    pub beta: f32,
    pub radius: f32,
    target: Point3<f32>,

    pub lower_radius_limit: Option<f32>,
    pub upper_radius_limit: Option<f32>,
    pub lower_beta_limit: f32,
    pub upper_beta_limit: f32,
    pub allow_upside_down: bool,

    /// Zero disables panning.
    pub panning_sensibility: f32,
    /// Pixels of drag per radian of rotation.
    pub angular_sensibility: f32,
    /// Higher is slower. Only used when `wheel_delta_percentage` is zero.
    pub wheel_precision: f32,
    /// Fraction of the current radius zoomed per wheel line.
    pub wheel_delta_percentage: f32,
    /// Fraction of the inertial offsets kept each update.
    pub inertia: f32,

    inertial_alpha_offset: f32,
    inertial_beta_offset: f32,
    inertial_radius_offset: f32,

    attached: bool,
    pointer: PointerState,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct PointerState {
    dragging: bool,
    last: Option<PhysicalPosition<f64>>,
}

impl ArcRotateCamera {
    /// Offsets smaller than this are snapped to zero.
    const EPSILON: f32 = 0.001;

    pub fn new(
        name: impl Into<String>,
        alpha: f32,
        beta: f32,
        radius: f32,
        target: Point3<f32>,
    ) -> Self {
        Self {
            name: name.into(),
            alpha,
            beta,
            radius,
            target,
            lower_radius_limit: None,
            upper_radius_limit: None,
            lower_beta_limit: 0.01,
            upper_beta_limit: PI - 0.01,
            allow_upside_down: true,
            panning_sensibility: 1000.0,
            angular_sensibility: 1000.0,
            wheel_precision: 3.0,
            wheel_delta_percentage: 0.0,
            inertia: 0.9,
            inertial_alpha_offset: 0.0,
            inertial_beta_offset: 0.0,
            inertial_radius_offset: 0.0,
            attached: false,
            pointer: PointerState::default(),
        }
    }

    pub fn target(&self) -> Point3<f32> {
        self.target
    }

    /// Look at `target` without moving the camera.
    ///
    /// Angles and radius are rebuilt from the current position relative to
    /// the new target, then clamped to the limits.
    pub fn set_target(&mut self, target: Point3<f32>) {
        let position = self.position();
        self.target = target;
        let offset = position - target;
        let radius = offset.magnitude();
        if radius <= f32::EPSILON {
            return;
        }
        self.radius = radius;
        self.alpha = offset.z.atan2(offset.x);
        self.beta = (offset.y / radius).clamp(-1.0, 1.0).acos();
        self.check_limits();
    }

    pub fn position(&self) -> Point3<f32> {
        let sin_beta = if self.beta.sin() == 0.0 {
            0.0001
        } else {
            self.beta.sin()
        };
        self.target
            + Vector3::new(
                self.radius * self.alpha.cos() * sin_beta,
                self.radius * self.beta.cos(),
                self.radius * self.alpha.sin() * sin_beta,
            )
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Start reacting to pointer and wheel input.
    pub fn attach_control(&mut self) {
        self.attached = true;
        self.pointer = PointerState::default();
    }

    /// Feed a window event. Returns `true` if it moved the camera.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        if !self.attached {
            return false;
        }
        match event {
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.pointer.dragging = *state == ElementState::Pressed;
                false
            }
            WindowEvent::CursorMoved { position, .. } => {
                let last = self.pointer.last.replace(*position);
                match last {
                    Some(last) if self.pointer.dragging => {
                        let dx = (position.x - last.x) as f32;
                        let dy = (position.y - last.y) as f32;
                        self.rotate(dx, dy)
                    }
                    _ => false,
                }
            }
            WindowEvent::CursorLeft { .. } => {
                self.pointer = PointerState::default();
                false
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let pixels = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y * WHEEL_LINE_HEIGHT,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32,
                };
                self.zoom(pixels)
            }
            _ => false,
        }
    }

    /// Rotate by a pointer drag of `dx`/`dy` pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) -> bool {
        if !self.attached || self.angular_sensibility == 0.0 {
            return false;
        }
        self.inertial_alpha_offset -= dx / self.angular_sensibility;
        self.inertial_beta_offset -= dy / self.angular_sensibility;
        dx != 0.0 || dy != 0.0
    }

    /// Zoom by a wheel movement of `pixels`; positive zooms in.
    pub fn zoom(&mut self, pixels: f32) -> bool {
        if !self.attached {
            return false;
        }
        let delta = if self.wheel_delta_percentage > 0.0 {
            pixels / WHEEL_LINE_HEIGHT * self.wheel_delta_percentage * self.radius
        } else {
            pixels / (WHEEL_LINE_HEIGHT * self.wheel_precision)
        };
        self.inertial_radius_offset += delta;
        delta != 0.0
    }

    /// Apply and decay inertial offsets, then enforce limits.
    ///
    /// Inertia is applied per call (per frame), not per second.
    pub fn update(&mut self) {
        if self.inertial_alpha_offset != 0.0
            || self.inertial_beta_offset != 0.0
            || self.inertial_radius_offset != 0.0
        {
            self.alpha += self.inertial_alpha_offset;
            self.beta += self.inertial_beta_offset;
            self.radius -= self.inertial_radius_offset;

            self.inertial_alpha_offset *= self.inertia;
            self.inertial_beta_offset *= self.inertia;
            self.inertial_radius_offset *= self.inertia;
            for offset in [
                &mut self.inertial_alpha_offset,
                &mut self.inertial_beta_offset,
                &mut self.inertial_radius_offset,
            ] {
                if offset.abs() < Self::EPSILON {
                    *offset = 0.0;
                }
            }
        }
        self.check_limits();
    }

    /// Clamp beta and radius into their limits.
    pub fn check_limits(&mut self) {
        if self.beta > self.upper_beta_limit {
            self.beta = self.upper_beta_limit;
        }
        if self.beta < self.lower_beta_limit {
            self.beta = self.lower_beta_limit;
        }
        if !self.allow_upside_down && self.beta > PI {
            self.beta = PI;
        }
        if let Some(lower) = self.lower_radius_limit {
            self.radius = self.radius.max(lower);
        }
        if let Some(upper) = self.upper_radius_limit {
            self.radius = self.radius.min(upper);
        }
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position(), self.target, Vector3::unit_y())
    }

    /// Ray from the eye through a pixel of a `width` x `height` surface.
    pub fn cast_ray_from_pointer(
        &self,
        pointer: PhysicalPosition<f64>,
        width: f32,
        height: f32,
        projection: &Projection,
    ) -> Option<Ray> {
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        let ndc_x = 2.0 * pointer.x as f32 / width - 1.0;
        let ndc_y = 1.0 - 2.0 * pointer.y as f32 / height;
        let inverse = (projection.calc_matrix() * self.view_matrix()).invert()?;
        let unproject = |z: f32| {
            let p = inverse * Vector4::new(ndc_x, ndc_y, z, 1.0);
            Point3::from_vec(p.truncate() / p.w)
        };
        let near = unproject(0.0);
        let far = unproject(1.0);
        Some(Ray::new(near, far - near))
    }
}

/// Perspective projection sized to the surface.
#[derive(Clone, Debug)]
pub struct Projection {
    aspect: f32,
    fovy: cgmath::Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<cgmath::Rad<f32>>>(
        width: u32,
        height: u32,
        fovy: F,
        znear: f32,
        zfar: f32,
    ) -> Self {
        Self {
            aspect: width.max(1) as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &ArcRotateCamera, projection: &Projection) {
        self.view_position = camera.position().to_homogeneous().into();
        self.view_proj = (projection.calc_matrix() * camera.view_matrix()).into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// GPU side of the camera: uniform buffer and its bind group.
#[derive(Debug)]
pub struct CameraResources {
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    fn tv_camera() -> ArcRotateCamera {
        let mut camera = ArcRotateCamera::new("camera1", FRAC_PI_2, PI * 45.0, 5.0, Point3::origin());
        camera.lower_radius_limit = Some(2.3);
        camera.upper_radius_limit = Some(5.0);
        camera.lower_beta_limit = 0.01;
        camera.upper_beta_limit = FRAC_PI_2 - 0.01;
        camera.allow_upside_down = false;
        camera.panning_sensibility = 0.0;
        camera.wheel_precision = 50.0;
        camera.wheel_delta_percentage = 0.01;
        camera
    }

    fn settle(camera: &mut ArcRotateCamera) {
        for _ in 0..500 {
            camera.update();
        }
    }

    #[test]
    fn out_of_range_start_angle_is_clamped_on_first_update() {
        let mut camera = tv_camera();
        camera.update();
        assert_eq!(camera.beta, FRAC_PI_2 - 0.01);
        assert_eq!(camera.radius, 5.0);
    }

    #[test]
    fn input_is_ignored_until_attached() {
        let mut camera = tv_camera();
        camera.update();
        let before = camera.clone();
        assert!(!camera.rotate(200.0, 50.0));
        assert!(!camera.zoom(400.0));
        settle(&mut camera);
        assert_eq!(camera.alpha, before.alpha);
        assert_eq!(camera.beta, before.beta);
        assert_eq!(camera.radius, before.radius);

        camera.attach_control();
        assert!(camera.rotate(200.0, 0.0));
        settle(&mut camera);
        assert!(camera.alpha < before.alpha);
    }

    #[test]
    fn zoom_and_polar_angle_stay_within_limits() {
        let mut camera = tv_camera();
        camera.attach_control();
        for _ in 0..50 {
            camera.zoom(4000.0);
            camera.rotate(0.0, 5000.0);
            camera.update();
            assert!(camera.radius >= 2.3 && camera.radius <= 5.0);
            assert!(camera.beta >= 0.01 && camera.beta <= FRAC_PI_2 - 0.01);
        }
        for _ in 0..50 {
            camera.zoom(-4000.0);
            camera.rotate(0.0, -5000.0);
            camera.update();
            assert!(camera.radius >= 2.3 && camera.radius <= 5.0);
            assert!(camera.beta >= 0.01 && camera.beta <= FRAC_PI_2 - 0.01);
        }
    }

    #[test]
    fn wheel_events_only_count_when_attached() {
        let mut camera = tv_camera();
        let wheel = WindowEvent::MouseWheel {
            device_id: unsafe { winit::event::DeviceId::dummy() },
            delta: MouseScrollDelta::LineDelta(0.0, 3.0),
            phase: winit::event::TouchPhase::Moved,
        };
        assert!(!camera.handle_window_event(&wheel));
        camera.attach_control();
        assert!(camera.handle_window_event(&wheel));
        settle(&mut camera);
        assert!(camera.radius < 5.0);
    }

    #[test]
    fn retargeting_keeps_the_eye_in_place() {
        let mut camera = tv_camera();
        camera.radius = 4.0;
        camera.check_limits();
        let eye = camera.position();
        camera.set_target(Point3::new(0.0, -0.5, 0.0));
        let moved = camera.position();
        assert!((eye - moved).magnitude() < 1e-4);
        assert_eq!(camera.target(), Point3::new(0.0, -0.5, 0.0));
    }

    #[test]
    fn pointer_ray_through_centre_hits_target() {
        let mut camera = tv_camera();
        camera.update();
        let projection = Projection::new(800, 600, cgmath::Deg(45.0), 0.1, 100.0);
        let ray = camera
            .cast_ray_from_pointer(PhysicalPosition::new(400.0, 300.0), 800.0, 600.0, &projection)
            .unwrap();
        let to_target = (camera.target() - ray.origin).normalize();
        assert!(ray.direction.dot(to_target) > 0.999);
    }
}
