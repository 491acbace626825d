//! Render command kinds and their replay against a GPU context.

use std::fmt;
use std::sync::Arc;

use crate::backend::{
    BackendResult, BufferId, FramebufferTargets, GraphicsContext, ImageAccess, PrimitiveType,
    ProgramId, TextureId, UniformValue, VertexArrayId,
};
use crate::materials::MaterialBinding;
use crate::resources::{Framebuffer, IndexBuffer, Pipeline, TextureRef, VertexBuffer};
use crate::shader::Shader;

/// Boxed closure submitted through [`RenderQueue::submit_fn`](super::RenderQueue::submit_fn).
pub type CustomCommand = Box<dyn FnOnce(&mut dyn GraphicsContext) + Send + 'static>;

/// Indexed draw with per-draw fixed-function state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub primitive: PrimitiveType,
    pub index_count: u32,
    pub base_index: u32,
    pub base_vertex: i32,
    pub depth_test: bool,
    pub face_culling: bool,
}

impl DrawCall {
    fn execute(&self, ctx: &mut dyn GraphicsContext) {
        ctx.set_face_culling(self.face_culling);
        if !self.depth_test {
            ctx.set_depth_test(false);
        }
        ctx.draw_indexed(
            self.primitive,
            self.index_count,
            self.base_index,
            self.base_vertex,
        );
        // restore so the disabled state never leaks into the next draw
        if !self.depth_test {
            ctx.set_depth_test(true);
        }
    }
}

/// A deferred unit of GPU work.
///
/// Resource variants capture the shared handle so it stays alive until the
/// command has run. Deletion variants capture only the native id.
pub enum RenderCommand {
    CreateVertexBuffer(Arc<VertexBuffer>),
    CreateIndexBuffer(Arc<IndexBuffer>),
    WriteVertexBuffer {
        buffer: Arc<VertexBuffer>,
        offset: u32,
        data: Vec<u8>,
    },
    BindVertexBuffer(Arc<VertexBuffer>),
    BindIndexBuffer(Arc<IndexBuffer>),
    DeleteBuffer(BufferId),

    CreateVertexArray(Arc<Pipeline>),
    BindVertexArray(Arc<Pipeline>),
    DeleteVertexArray(VertexArrayId),

    CreateTexture(TextureRef),
    BindTexture {
        slot: u32,
        texture: TextureRef,
    },
    BindImageTexture {
        unit: u32,
        texture: TextureRef,
        level: u32,
        access: ImageAccess,
    },
    GenerateMipmaps(TextureRef),
    CopyTexture {
        src: TextureRef,
        dst: TextureRef,
    },
    DeleteTexture(TextureId),

    /// (Re)create the native framebuffer at the handle's current size.
    CreateFramebuffer(Arc<Framebuffer>),
    BindFramebuffer(Arc<Framebuffer>),
    BindFramebufferTexture {
        framebuffer: Arc<Framebuffer>,
        attachment: usize,
        slot: u32,
    },
    UnbindFramebuffer,
    DeleteFramebuffer(FramebufferTargets),
    Clear([f32; 4]),

    CompileShader(Arc<Shader>),
    UseProgram(Arc<Shader>),
    SetUniform {
        shader: Arc<Shader>,
        name: String,
        value: UniformValue,
    },
    DeleteProgram(ProgramId),

    BindMaterial(MaterialBinding),
    DrawIndexed(DrawCall),
    DispatchCompute {
        x: u32,
        y: u32,
        z: u32,
    },

    Custom(CustomCommand),
}

impl RenderCommand {
    /// Short name used in logs and diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            RenderCommand::CreateVertexBuffer(_) => "create_vertex_buffer",
            RenderCommand::CreateIndexBuffer(_) => "create_index_buffer",
            RenderCommand::WriteVertexBuffer { .. } => "write_vertex_buffer",
            RenderCommand::BindVertexBuffer(_) => "bind_vertex_buffer",
            RenderCommand::BindIndexBuffer(_) => "bind_index_buffer",
            RenderCommand::DeleteBuffer(_) => "delete_buffer",
            RenderCommand::CreateVertexArray(_) => "create_vertex_array",
            RenderCommand::BindVertexArray(_) => "bind_vertex_array",
            RenderCommand::DeleteVertexArray(_) => "delete_vertex_array",
            RenderCommand::CreateTexture(_) => "create_texture",
            RenderCommand::BindTexture { .. } => "bind_texture",
            RenderCommand::BindImageTexture { .. } => "bind_image_texture",
            RenderCommand::GenerateMipmaps(_) => "generate_mipmaps",
            RenderCommand::CopyTexture { .. } => "copy_texture",
            RenderCommand::DeleteTexture(_) => "delete_texture",
            RenderCommand::CreateFramebuffer(_) => "create_framebuffer",
            RenderCommand::BindFramebuffer(_) => "bind_framebuffer",
            RenderCommand::BindFramebufferTexture { .. } => "bind_framebuffer_texture",
            RenderCommand::UnbindFramebuffer => "unbind_framebuffer",
            RenderCommand::DeleteFramebuffer(_) => "delete_framebuffer",
            RenderCommand::Clear(_) => "clear",
            RenderCommand::CompileShader(_) => "compile_shader",
            RenderCommand::UseProgram(_) => "use_program",
            RenderCommand::SetUniform { .. } => "set_uniform",
            RenderCommand::DeleteProgram(_) => "delete_program",
            RenderCommand::BindMaterial(_) => "bind_material",
            RenderCommand::DrawIndexed(_) => "draw_indexed",
            RenderCommand::DispatchCompute { .. } => "dispatch_compute",
            RenderCommand::Custom(_) => "custom",
        }
    }

    /// Creates or deletes a native object.
    ///
    /// These still run after an earlier command of the batch failed, so no
    /// handle is left without its id and no deleted id leaks.
    pub fn is_lifetime(&self) -> bool {
        matches!(
            self,
            RenderCommand::CreateVertexBuffer(_)
                | RenderCommand::CreateIndexBuffer(_)
                | RenderCommand::CreateVertexArray(_)
                | RenderCommand::CreateTexture(_)
                | RenderCommand::CreateFramebuffer(_)
                | RenderCommand::CompileShader(_)
                | RenderCommand::DeleteBuffer(_)
                | RenderCommand::DeleteVertexArray(_)
                | RenderCommand::DeleteTexture(_)
                | RenderCommand::DeleteFramebuffer(_)
                | RenderCommand::DeleteProgram(_)
        )
    }

    /// Bytes this record occupies in a [`CommandBuffer`](super::CommandBuffer).
    pub fn footprint(&self) -> usize {
        let payload = match self {
            RenderCommand::WriteVertexBuffer { data, .. } => data.len(),
            RenderCommand::SetUniform { name, value, .. } => {
                name.len()
                    + match value {
                        UniformValue::Mat4Array(values) => {
                            values.len() * std::mem::size_of::<glam::Mat4>()
                        }
                        _ => 0,
                    }
            }
            RenderCommand::DeleteFramebuffer(targets) => {
                targets.color_attachments.len() * std::mem::size_of::<TextureId>()
            }
            RenderCommand::BindMaterial(binding) => binding.payload_size(),
            RenderCommand::Custom(command) => std::mem::size_of_val(&**command),
            _ => 0,
        };
        std::mem::size_of::<Self>() + payload
    }

    /// Replay the command. Consumes it, so every record runs exactly once.
    pub fn execute(self, ctx: &mut dyn GraphicsContext) -> BackendResult<()> {
        match self {
            RenderCommand::CreateVertexBuffer(buffer) => buffer.realize(ctx)?,
            RenderCommand::CreateIndexBuffer(buffer) => buffer.realize(ctx)?,
            RenderCommand::WriteVertexBuffer {
                buffer,
                offset,
                data,
            } => ctx.write_buffer(buffer.native_id(), offset, &data),
            RenderCommand::BindVertexBuffer(buffer) => ctx.bind_vertex_buffer(buffer.native_id()),
            RenderCommand::BindIndexBuffer(buffer) => ctx.bind_index_buffer(buffer.native_id()),
            RenderCommand::DeleteBuffer(id) => ctx.delete_buffer(id),

            RenderCommand::CreateVertexArray(pipeline) => pipeline.realize(ctx)?,
            RenderCommand::BindVertexArray(pipeline) => ctx.bind_vertex_array(pipeline.native_id()),
            RenderCommand::DeleteVertexArray(id) => ctx.delete_vertex_array(id),

            RenderCommand::CreateTexture(texture) => texture.realize(ctx)?,
            RenderCommand::BindTexture { slot, texture } => {
                ctx.bind_texture(slot, texture.native_id())
            }
            RenderCommand::BindImageTexture {
                unit,
                texture,
                level,
                access,
            } => ctx.bind_image_texture(unit, texture.native_id(), level, access, texture.format()),
            RenderCommand::GenerateMipmaps(texture) => ctx.generate_mipmaps(texture.native_id()),
            RenderCommand::CopyTexture { src, dst } => {
                let (width, height) = dst.size();
                ctx.copy_texture(
                    src.native_id(),
                    dst.native_id(),
                    width,
                    height,
                    dst.layers(),
                )
            }
            RenderCommand::DeleteTexture(id) => ctx.delete_texture(id),

            RenderCommand::CreateFramebuffer(framebuffer) => framebuffer.invalidate(ctx)?,
            RenderCommand::BindFramebuffer(framebuffer) => framebuffer.bind_now(ctx),
            RenderCommand::BindFramebufferTexture {
                framebuffer,
                attachment,
                slot,
            } => ctx.bind_texture(slot, framebuffer.color_attachment_id(attachment)),
            RenderCommand::UnbindFramebuffer => ctx.bind_framebuffer(None),
            RenderCommand::DeleteFramebuffer(targets) => ctx.delete_framebuffer(&targets),
            RenderCommand::Clear(color) => ctx.clear(color),

            RenderCommand::CompileShader(shader) => shader.compile(ctx)?,
            RenderCommand::UseProgram(shader) => ctx.use_program(Some(shader.native_id())),
            RenderCommand::SetUniform {
                shader,
                name,
                value,
            } => shader.upload_named(ctx, &name, &value),
            RenderCommand::DeleteProgram(id) => ctx.delete_program(id),

            RenderCommand::BindMaterial(binding) => binding.apply(ctx),
            RenderCommand::DrawIndexed(draw) => draw.execute(ctx),
            RenderCommand::DispatchCompute { x, y, z } => ctx.dispatch_compute(x, y, z),

            RenderCommand::Custom(command) => command(ctx),
        }
        Ok(())
    }
}

impl fmt::Debug for RenderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderCommand::DeleteBuffer(id) => write!(f, "DeleteBuffer({:?})", id),
            RenderCommand::DeleteTexture(id) => write!(f, "DeleteTexture({:?})", id),
            RenderCommand::DeleteProgram(id) => write!(f, "DeleteProgram({:?})", id),
            RenderCommand::DeleteVertexArray(id) => write!(f, "DeleteVertexArray({:?})", id),
            RenderCommand::DrawIndexed(draw) => write!(f, "DrawIndexed({:?})", draw),
            RenderCommand::Clear(color) => write!(f, "Clear({:?})", color),
            other => f.write_str(other.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ContextCall, HeadlessContext};

    #[test]
    fn test_draw_restores_disabled_depth_test() {
        let mut ctx = HeadlessContext::new();
        let draw = DrawCall {
            primitive: PrimitiveType::Triangles,
            index_count: 6,
            base_index: 0,
            base_vertex: 0,
            depth_test: false,
            face_culling: false,
        };
        RenderCommand::DrawIndexed(draw).execute(&mut ctx).unwrap();

        assert_eq!(
            ctx.calls(),
            &[
                ContextCall::SetFaceCulling(false),
                ContextCall::SetDepthTest(false),
                ContextCall::DrawIndexed {
                    primitive: PrimitiveType::Triangles,
                    index_count: 6,
                    base_index: 0,
                    base_vertex: 0,
                },
                ContextCall::SetDepthTest(true),
            ]
        );
    }

    #[test]
    fn test_draw_with_depth_test_leaves_state_alone() {
        let mut ctx = HeadlessContext::new();
        let draw = DrawCall {
            primitive: PrimitiveType::Lines,
            index_count: 2,
            base_index: 4,
            base_vertex: 8,
            depth_test: true,
            face_culling: true,
        };
        RenderCommand::DrawIndexed(draw).execute(&mut ctx).unwrap();

        assert_eq!(ctx.count(|c| matches!(c, ContextCall::SetDepthTest(_))), 0);
        assert_eq!(ctx.calls()[0], ContextCall::SetFaceCulling(true));
    }

    #[test]
    fn test_lifetime_commands() {
        assert!(RenderCommand::DeleteBuffer(BufferId::new(3)).is_lifetime());
        assert!(RenderCommand::DeleteProgram(ProgramId::new(1)).is_lifetime());
        assert!(!RenderCommand::Clear([0.0; 4]).is_lifetime());
        assert!(!RenderCommand::UnbindFramebuffer.is_lifetime());
        assert!(!RenderCommand::Custom(Box::new(|_| {})).is_lifetime());
    }

    #[test]
    fn test_debug_uses_label() {
        let command = RenderCommand::Custom(Box::new(|_| {}));
        assert_eq!(format!("{:?}", command), "custom");
    }
}
