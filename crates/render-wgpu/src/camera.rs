use glam::{Mat4, Vec3};
use snowscape_render::RenderView;
use std::f32::consts::{FRAC_PI_2, PI};

/// Mouse-look camera: horizontal and vertical angles plus a position.
///
/// Camera motion is frame-time scaled; it is independent of the scene's
/// fixed update step.
pub struct FlyCamera {
    pub position: Vec3,
    /// Radians around Y; `PI` looks toward -Z.
    pub horizontal_angle: f32,
    /// Radians above the horizon.
    pub vertical_angle: f32,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Units per second.
    pub speed: f32,
    /// Radians per pixel of mouse motion.
    pub mouse_speed: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            horizontal_angle: PI,
            vertical_angle: 0.0,
            fov_degrees: 45.0,
            aspect: 4.0 / 3.0,
            near: 0.1,
            far: 100.0,
            speed: 3.0,
            mouse_speed: 0.005,
        }
    }
}

impl FlyCamera {
    pub fn direction(&self) -> Vec3 {
        let (v, h) = (self.vertical_angle, self.horizontal_angle);
        Vec3::new(v.cos() * h.sin(), v.sin(), v.cos() * h.cos())
    }

    pub fn right(&self) -> Vec3 {
        let h = self.horizontal_angle - FRAC_PI_2;
        Vec3::new(h.sin(), 0.0, h.cos())
    }

    pub fn up(&self) -> Vec3 {
        self.right().cross(self.direction())
    }

    /// Move along the view direction (`forward` > 0) and sideways
    /// (`strafe` > 0 is right), scaled by `dt` seconds.
    pub fn translate(&mut self, forward: f32, strafe: f32, dt: f32) {
        self.position += (self.direction() * forward + self.right() * strafe) * self.speed * dt;
    }

    /// Apply mouse motion in pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.horizontal_angle -= dx * self.mouse_speed;
        self.vertical_angle = (self.vertical_angle - dy * self.mouse_speed)
            .clamp(-89.0_f32.to_radians(), 89.0_f32.to_radians());
    }

    /// Scroll to zoom, keeping the field of view in a usable range.
    pub fn zoom(&mut self, delta: f32) {
        self.fov_degrees = (self.fov_degrees - delta * 5.0).clamp(10.0, 90.0);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction(), self.up())
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn render_view(&self, light_position: Vec3) -> RenderView {
        RenderView {
            eye: self.position,
            target: self.position + self.direction(),
            fov_degrees: self.fov_degrees,
            light_position,
        }
    }
}
