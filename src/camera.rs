//! Cameras.
//!
//! One trait so the engine never cares which camera it is driving, and one
//! concrete first-person implementation. All matrices are left-handed, matching
//! the clip-space conventions the vertex shaders expect.

use glam::{Mat3, Mat4, Vec3};

/// Anything that can supply view and projection matrices to the renderer.
pub trait Camera {
    /// World-space position.
    fn position(&self) -> Vec3;
    /// Move to `position` without changing orientation.
    fn set_position(&mut self, position: Vec3);

    /// The camera's right basis vector.
    fn right(&self) -> Vec3;
    /// The camera's up basis vector.
    fn up(&self) -> Vec3;
    /// The camera's forward basis vector.
    fn look(&self) -> Vec3;

    /// Set a left-handed perspective projection.
    fn set_frustum(&mut self, fov_y: f32, aspect: f32, z_near: f32, z_far: f32);
    /// Place the camera at `position`, looking at `target`, with `world_up`
    /// steadying the roll.
    fn look_at(&mut self, position: Vec3, target: Vec3, world_up: Vec3);

    /// Move `distance` along the look vector.
    fn walk(&mut self, distance: f32);
    /// Move `distance` along the right vector.
    fn strafe(&mut self, distance: f32);
    /// Rotate the look and up vectors `angle` radians around the right vector.
    fn pitch(&mut self, angle: f32);
    /// Rotate the whole basis `angle` radians around the world's y axis.
    fn rotate_world_y(&mut self, angle: f32);

    /// The view matrix as of the last [`Camera::update_view`].
    fn view(&self) -> Mat4;
    /// The projection matrix.
    fn projection(&self) -> Mat4;

    /// Rebuild the view matrix from position and basis. Call once per frame,
    /// after all movement and rotation for the frame has been applied.
    fn update_view(&mut self);
}

/// A free-flying first-person camera.
///
/// Movement and rotation mutate the basis vectors directly; drift from repeated
/// incremental rotations is corrected by re-orthonormalizing the basis in
/// [`Camera::update_view`].
#[derive(Clone, Debug)]
pub struct FirstPersonCamera {
    position: Vec3,
    right: Vec3,
    up: Vec3,
    look: Vec3,
    view: Mat4,
    proj: Mat4,
}

impl Default for FirstPersonCamera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            right: Vec3::X,
            up: Vec3::Y,
            look: Vec3::Z,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        }
    }
}

impl FirstPersonCamera {
    /// A camera at the origin looking down +z with an identity projection.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Camera for FirstPersonCamera {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    fn right(&self) -> Vec3 {
        self.right
    }

    fn up(&self) -> Vec3 {
        self.up
    }

    fn look(&self) -> Vec3 {
        self.look
    }

    fn set_frustum(&mut self, fov_y: f32, aspect: f32, z_near: f32, z_far: f32) {
        self.proj = Mat4::perspective_lh(fov_y, aspect, z_near, z_far);
    }

    fn look_at(&mut self, position: Vec3, target: Vec3, world_up: Vec3) {
        self.look = (target - position).normalize();
        self.right = world_up.cross(self.look).normalize();
        self.up = self.look.cross(self.right);
        self.position = position;
    }

    fn walk(&mut self, distance: f32) {
        self.position += self.look * distance;
    }

    fn strafe(&mut self, distance: f32) {
        self.position += self.right * distance;
    }

    fn pitch(&mut self, angle: f32) {
        let rotation = Mat3::from_axis_angle(self.right, angle);
        self.up = rotation * self.up;
        self.look = rotation * self.look;
    }

    fn rotate_world_y(&mut self, angle: f32) {
        let rotation = Mat3::from_rotation_y(angle);
        self.right = rotation * self.right;
        self.up = rotation * self.up;
        self.look = rotation * self.look;
    }

    fn view(&self) -> Mat4 {
        self.view
    }

    fn projection(&self) -> Mat4 {
        self.proj
    }

    fn update_view(&mut self) {
        // Re-orthonormalize the basis so incremental pitch/yaw can't skew it.
        self.look = self.look.normalize();
        self.up = self.look.cross(self.right).normalize();
        self.right = self.up.cross(self.look).normalize();
        self.view = Mat4::look_to_lh(self.position, self.look, self.up);
    }
}
