//! Cameras handed to the scene renderer

use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Projection::Orthographic {
            left: -half_w,
            right: half_w,
            bottom: -half_h,
            top: half_h,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(*fov_y, *aspect, *near, *far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(*left, *right, *bottom, *top, *near, *far),
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }
}

/// Look-at camera. Only its projection reaches the shaders directly.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Orthographic projections keep their extents.
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.projection.set_aspect(width / height);
    }
}

/// Camera as seen by the scene renderer: a projection plus an explicit view matrix.
#[derive(Debug, Clone)]
pub struct SceneCamera {
    pub camera: Camera,
    pub view: Mat4,
}

impl Default for SceneCamera {
    fn default() -> Self {
        Self::from_camera(Camera::default())
    }
}

impl SceneCamera {
    pub fn new(camera: Camera, view: Mat4) -> Self {
        Self { camera, view }
    }

    /// Use the camera's own look-at view matrix.
    pub fn from_camera(camera: Camera) -> Self {
        let view = camera.view_matrix();
        Self { camera, view }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.camera.projection_matrix() * self.view
    }

    /// World-space eye position, the translation of the inverse view.
    pub fn position(&self) -> Vec3 {
        self.view.inverse().w_axis.truncate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_camera_position_from_view() {
        let camera = Camera::new(Vec3::new(3.0, 4.0, 5.0), Vec3::ZERO);
        let scene_camera = SceneCamera::from_camera(camera);
        assert!(scene_camera.position().abs_diff_eq(Vec3::new(3.0, 4.0, 5.0), 1e-4));
    }

    #[test]
    fn test_view_projection_composes_projection_first() {
        let camera = Camera::default();
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0));
        let scene_camera = SceneCamera::new(camera.clone(), view);
        assert_eq!(scene_camera.view_projection(), camera.projection_matrix() * view);
    }

    #[test]
    fn test_set_aspect_only_affects_perspective() {
        let mut perspective = Projection::perspective(45.0, 1.0, 0.1, 100.0);
        perspective.set_aspect(2.0);
        assert!(matches!(perspective, Projection::Perspective { aspect, .. } if aspect == 2.0));

        let mut ortho = Projection::orthographic(10.0, 10.0, 0.1, 100.0);
        let before = ortho.matrix();
        ortho.set_aspect(2.0);
        assert_eq!(ortho.matrix(), before);
    }
}
