//! Entity components consumed by the scene renderer

use bevy_ecs::prelude::*;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use crate::resources::Mesh;

/// World placement of a mesh entity
#[derive(Component, Debug, Clone, Copy)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_scale(position: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            scale,
            ..Default::default()
        }
    }

    /// Model matrix: scale, then rotate, then translate.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Local -Z in world space
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Rotate around a world-space axis, on top of the current rotation.
    pub fn rotate_axis(&mut self, axis: Vec3, angle: f32) {
        let delta = Quat::from_axis_angle(axis, angle);
        self.rotation = delta * self.rotation;
    }
}

impl From<Mat4> for Transform {
    fn from(matrix: Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }
}

/// Mesh drawn for the entity
#[derive(Component, Debug, Clone)]
pub struct MeshComponent(pub Arc<Mesh>);

/// Debug name of the entity
#[derive(Component, Debug, Clone, PartialEq, Eq)]
pub struct Tag(pub String);

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Tag(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_round_trip() {
        let transform = Transform::from_position_scale(Vec3::new(1.0, 2.0, 3.0), Vec3::splat(2.0));
        let back = Transform::from(transform.matrix());
        assert!(back.position.abs_diff_eq(transform.position, 1e-5));
        assert!(back.scale.abs_diff_eq(transform.scale, 1e-5));
    }

    #[test]
    fn test_rotate_axis_turns_forward() {
        let mut transform = Transform::new();
        transform.rotate_axis(Vec3::Y, std::f32::consts::FRAC_PI_2);
        assert!(transform.forward().abs_diff_eq(-Vec3::X, 1e-5));
    }
}
