//! Scene light uploaded as the `u_Lights` struct uniform

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::shader::{ShaderStruct, UniformType};

/// Single scene light.
///
/// Laid out field by field as the shader's `Light` struct, without padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Light {
    pub position: Vec3,
    pub radiance: Vec3,
    pub multiplier: f32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<Light>(), 28);

crate::impl_uniform_data!(Light);

impl Default for Light {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            radiance: Vec3::ZERO,
            multiplier: 1.0,
        }
    }
}

impl Light {
    pub fn new(position: Vec3, radiance: Vec3, multiplier: f32) -> Self {
        Self {
            position,
            radiance,
            multiplier,
        }
    }

    /// Reflected layout matching [`Light`], for shaders that declare `u_Lights`.
    pub fn shader_struct() -> Arc<ShaderStruct> {
        Arc::new(
            ShaderStruct::new("Light")
                .with_field("Position", UniformType::Vec3)
                .with_field("Radiance", UniformType::Vec3)
                .with_field("Multiplier", UniformType::Float),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_layout_matches_pod() {
        let layout = Light::shader_struct();
        assert_eq!(layout.size() as usize, std::mem::size_of::<Light>());
        let offsets: Vec<u32> = layout.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
    }

    #[test]
    fn test_default_multiplier() {
        assert_eq!(Light::default().multiplier, 1.0);
    }
}
