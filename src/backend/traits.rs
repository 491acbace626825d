//! Core GPU context abstraction
//!
//! The renderer never talks to a graphics API directly. Every queued command
//! is replayed against a [`GraphicsContext`], an immediate-mode, stateful
//! interface in the spirit of classic bind-then-draw APIs.

use crate::backend::types::*;
use crate::resources::BufferLayout;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create vertex array: {0}")]
    VertexArrayCreationFailed(String),
    #[error("Framebuffer is incomplete: {0}")]
    FramebufferIncomplete(String),
    #[error("Failed to compile shader '{name}': {log}")]
    ShaderCompilationFailed { name: String, log: String },
    #[error("Failed to link shader '{name}': {log}")]
    ShaderLinkFailed { name: String, log: String },
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

macro_rules! native_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub const fn raw(&self) -> u32 {
                self.0
            }
        }
    };
}

native_id!(
    /// Native id of a GPU buffer
    BufferId
);
native_id!(
    /// Native id of a GPU texture (2D or cube)
    TextureId
);
native_id!(
    /// Native id of a framebuffer object
    FramebufferId
);
native_id!(
    /// Native id of a linked shader program
    ProgramId
);
native_id!(
    /// Native id of a vertex array (vertex layout binding)
    VertexArrayId
);

/// Location value meaning "this uniform does not exist in the linked program".
pub const INVALID_LOCATION: i32 = -1;

/// Immediate-mode GPU context that queued commands are replayed against.
///
/// Implementations are free to be stateful: binding a program affects the
/// following uniform uploads, binding a framebuffer affects the following
/// clears and draws. The render queue guarantees calls arrive in submission
/// order.
pub trait GraphicsContext {
    /// Human readable context name
    fn name(&self) -> &str;

    // Buffers

    fn create_vertex_buffer(&mut self, data: &[u8], usage: BufferUsage)
        -> BackendResult<BufferId>;

    fn create_index_buffer(&mut self, data: &[u8]) -> BackendResult<BufferId>;

    fn write_buffer(&mut self, buffer: BufferId, offset: u32, data: &[u8]);

    fn bind_vertex_buffer(&mut self, buffer: BufferId);

    fn bind_index_buffer(&mut self, buffer: BufferId);

    fn delete_buffer(&mut self, buffer: BufferId);

    // Vertex arrays

    fn create_vertex_array(&mut self, layout: &BufferLayout) -> BackendResult<VertexArrayId>;

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId);

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId);

    // Textures

    /// Create a texture, optionally uploading level 0 from `data`.
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureId>;

    fn bind_texture(&mut self, slot: u32, texture: TextureId);

    /// Bind one mip level of a texture as a compute image.
    fn bind_image_texture(
        &mut self,
        unit: u32,
        texture: TextureId,
        level: u32,
        access: ImageAccess,
        format: TextureFormat,
    );

    fn generate_mipmaps(&mut self, texture: TextureId);

    /// Copy level 0 of `src` into level 0 of `dst` (`layers` faces for cube maps).
    fn copy_texture(&mut self, src: TextureId, dst: TextureId, width: u32, height: u32, layers: u32);

    fn delete_texture(&mut self, texture: TextureId);

    // Framebuffers

    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor)
        -> BackendResult<FramebufferTargets>;

    /// Bind a framebuffer, `None` restores the default target.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    fn delete_framebuffer(&mut self, targets: &FramebufferTargets);

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32);

    /// Clear color, depth and stencil of the bound target.
    fn clear(&mut self, color: [f32; 4]);

    // Shader programs

    fn create_program(&mut self, name: &str, stages: &ShaderStages) -> BackendResult<ProgramId>;

    /// Make a program current, `None` unbinds.
    fn use_program(&mut self, program: Option<ProgramId>);

    /// Resolve a uniform location, returning [`INVALID_LOCATION`] when absent.
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> i32;

    /// Upload a value to a location of the current program.
    fn upload_uniform(&mut self, location: i32, value: &UniformValue);

    fn delete_program(&mut self, program: ProgramId);

    // Fixed-function state and draws

    fn set_depth_test(&mut self, enabled: bool);

    fn set_face_culling(&mut self, enabled: bool);

    fn draw_indexed(
        &mut self,
        primitive: PrimitiveType,
        index_count: u32,
        base_index: u32,
        base_vertex: i32,
    );

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32);
}
