//! Interactive fly camera. Movement and mouse look mutate the pose; the
//! frame loop asks `on_before_render` whether the pose changed so it can
//! invalidate the progressive accumulation.

use nalgebra::{Matrix4, Point3, Vector3};

use crate::input::InputState;

pub struct Camera {
    eye: Point3<f32>,
    yaw: f32,
    pitch: f32,
    fov_y: f32,
    z_near: f32,
    z_far: f32,
    speed: f32,
    sensitivity: f32,
    moved: bool,
}

impl Camera {
    pub fn new(eye: Point3<f32>, look_at: Point3<f32>, fov_y_deg: f32) -> Self {
        let front = (look_at - eye).normalize();
        Camera {
            eye,
            yaw: front.z.atan2(front.x),
            pitch: front.y.asin(),
            fov_y: fov_y_deg.to_radians(),
            z_near: 0.1,
            z_far: 1000.0,
            speed: 3.0,
            sensitivity: 0.0025,
            moved: false,
        }
    }

    pub fn position(&self) -> Point3<f32> {
        self.eye
    }

    pub fn front(&self) -> Vector3<f32> {
        Vector3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    pub fn integrate_input(&mut self, input: &mut InputState, dt: f32) {
        if input.mouse_look {
            let (dx, dy) = input.take_mouse_delta();
            if dx != 0.0 || dy != 0.0 {
                self.yaw += dx * self.sensitivity;
                self.pitch = (self.pitch - dy * self.sensitivity).clamp(-1.55, 1.55);
                self.moved = true;
            }
        } else {
            let _ = input.take_mouse_delta();
        }

        let front = self.front();
        let right = front.cross(&Vector3::y()).normalize();
        let up = right.cross(&front);

        let keys = input.keys;
        let mut velocity = Vector3::zeros();
        if keys.w {
            velocity += front;
        }
        if keys.s {
            velocity -= front;
        }
        if keys.d {
            velocity += right;
        }
        if keys.a {
            velocity -= right;
        }
        if keys.e {
            velocity += up;
        }
        if keys.q {
            velocity -= up;
        }

        if velocity.norm_squared() > 0.0 {
            self.eye += velocity.normalize() * self.speed * dt;
            self.moved = true;
        }
    }

    /// True when the pose changed since the previous call; the caller resets
    /// accumulation in response. The flag is consumed.
    pub fn on_before_render(&mut self) -> bool {
        std::mem::take(&mut self.moved)
    }

    pub fn view(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.eye, &(self.eye + self.front()), &Vector3::y())
    }

    pub fn projection(&self, aspect: f32) -> Matrix4<f32> {
        let mut proj = Matrix4::new_perspective(aspect, self.fov_y, self.z_near, self.z_far);
        // Vulkan clip space has an inverted y axis relative to GL conventions.
        proj[(1, 1)] *= -1.0;
        proj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_flag_is_consumed_by_on_before_render() {
        let mut camera = Camera::new(
            Point3::new(0.0, 0.0, 5.0),
            Point3::new(0.0, 0.0, 0.0),
            45.0,
        );
        assert!(!camera.on_before_render());

        let mut input = InputState::default();
        input.keys.w = true;
        camera.integrate_input(&mut input, 0.016);
        assert!(camera.on_before_render());
        assert!(!camera.on_before_render());
    }

    #[test]
    fn initial_front_points_at_target() {
        let camera = Camera::new(
            Point3::new(0.0, 1.0, 5.0),
            Point3::new(0.0, 1.0, 0.0),
            45.0,
        );
        let front = camera.front();
        assert!((front - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-5);
    }
}
