//! Common types shared by the GPU context and the resource layer

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

/// Texture format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    // Color formats
    R8Unorm,
    Rg8Unorm,
    Rgb8Unorm,
    #[default]
    Rgba8Unorm,
    Rg16Float,
    Rg32Float,
    Rgba16Float,
    Rgba32Float,

    // Depth formats
    Depth32Float,
    Depth24PlusStencil8,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            TextureFormat::Rg16Float
                | TextureFormat::Rg32Float
                | TextureFormat::Rgba16Float
                | TextureFormat::Rgba32Float
                | TextureFormat::Depth32Float
        )
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rg8Unorm => 2,
            TextureFormat::Rgb8Unorm => 3,
            TextureFormat::Rgba8Unorm => 4,
            TextureFormat::Rg16Float => 4,
            TextureFormat::Rg32Float => 8,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
            TextureFormat::Depth32Float => 4,
            TextureFormat::Depth24PlusStencil8 => 4,
        }
    }
}

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    Cube,
}

/// Texture descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            kind: TextureKind::D2,
            width: 1,
            height: 1,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
        }
    }
}

/// How often a vertex buffer is expected to change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUsage {
    #[default]
    Static,
    Dynamic,
}

/// Access mode when a texture level is bound as a compute image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Primitive topology for indexed draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveType {
    /// Not a drawable topology; submitting it is a configuration error.
    None,
    #[default]
    Triangles,
    Lines,
}

/// Typed value uploaded to a resolved uniform location
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    Int(i32),
    Bool(bool),
    Mat4Array(Vec<Mat4>),
}

/// Description of a framebuffer handed to the context on (re)creation
#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
}

/// Native objects backing one framebuffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferTargets {
    pub framebuffer: super::FramebufferId,
    pub color_attachments: Vec<super::TextureId>,
    pub depth_attachment: Option<super::TextureId>,
}

/// Shader program sources, one entry per stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderStages {
    Graphics { vertex: String, fragment: String },
    Compute(String),
}

impl ShaderStages {
    pub fn is_compute(&self) -> bool {
        matches!(self, ShaderStages::Compute(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_formats() {
        assert!(TextureFormat::Depth24PlusStencil8.is_depth());
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(!TextureFormat::Rgba16Float.is_depth());
    }

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(TextureFormat::Rgb8Unorm.bytes_per_pixel(), 3);
        assert_eq!(TextureFormat::Rgba16Float.bytes_per_pixel(), 8);
        assert_eq!(TextureFormat::Rgba32Float.bytes_per_pixel(), 16);
    }
}
