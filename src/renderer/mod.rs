//! Renderer facade
//!
//! The single place where submission meets execution. Everything before
//! [`Renderer::wait_and_render`] only records commands; that call replays
//! them against the GPU context in submission order.

mod pass;

pub use pass::*;

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use winit::event::WindowEvent;

use crate::backend::{BackendResult, GraphicsContext, PrimitiveType, TextureFormat, UniformValue};
use crate::command::{DrawCall, RenderCommand, RenderQueue};
use crate::materials::{MaterialFlags, MaterialRef};
use crate::resources::{
    BufferElement, BufferLayout, Framebuffer, FramebufferPool, FramebufferSpec, IndexBuffer, Mesh,
    Pipeline, PipelineSpec, ShaderDataType, TextureCube, VertexBuffer,
};
use crate::shader::ShaderLibrary;
use crate::RendererConfig;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct QuadVertex {
    position: Vec3,
    texcoord: Vec2,
}

/// Quad spanning -1..1 on X and Y.
struct QuadGeometry {
    vertex_buffer: Arc<VertexBuffer>,
    index_buffer: Arc<IndexBuffer>,
    pipeline: Arc<Pipeline>,
}

impl QuadGeometry {
    fn new(queue: &Arc<RenderQueue>) -> Self {
        let (x, y, width, height) = (-1.0, -1.0, 2.0, 2.0);
        let vertices = [
            QuadVertex {
                position: Vec3::new(x, y, 0.0),
                texcoord: Vec2::new(0.0, 0.0),
            },
            QuadVertex {
                position: Vec3::new(x + width, y, 0.0),
                texcoord: Vec2::new(1.0, 0.0),
            },
            QuadVertex {
                position: Vec3::new(x + width, y + height, 0.0),
                texcoord: Vec2::new(1.0, 1.0),
            },
            QuadVertex {
                position: Vec3::new(x, y + height, 0.0),
                texcoord: Vec2::new(0.0, 1.0),
            },
        ];
        let layout = BufferLayout::new(vec![
            BufferElement::new(ShaderDataType::Float3, "a_Position"),
            BufferElement::new(ShaderDataType::Float2, "a_TexCoord"),
        ]);

        Self {
            vertex_buffer: VertexBuffer::new(queue, bytemuck::cast_slice(&vertices), layout.clone()),
            pipeline: Pipeline::new(queue, PipelineSpec { shader: None, layout }),
            index_buffer: IndexBuffer::new(queue, &[0, 1, 2, 2, 3, 0]),
        }
    }

    fn bind(&self) {
        self.vertex_buffer.bind();
        self.pipeline.bind();
        self.index_buffer.bind();
    }
}

/// Render-pass state machine over one command queue.
pub struct Renderer {
    config: RendererConfig,
    queue: Arc<RenderQueue>,
    framebuffer_pool: FramebufferPool,
    shader_library: ShaderLibrary,
    active_pass: Option<Arc<RenderPass>>,
    quad: QuadGeometry,
    black_cube: Arc<TextureCube>,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        log::info!(
            "Creating renderer ({} byte command buffer, {}x{} viewport)",
            config.command_buffer_capacity,
            config.viewport_width,
            config.viewport_height
        );
        let queue = RenderQueue::new(config.command_buffer_capacity);
        let quad = QuadGeometry::new(&queue);
        let black_cube = TextureCube::with_data(
            &queue,
            "black-cube",
            TextureFormat::Rgba8Unorm,
            1,
            1,
            vec![0; 4 * 6],
        );

        Self {
            config,
            queue,
            framebuffer_pool: FramebufferPool::new(),
            shader_library: ShaderLibrary::new(),
            active_pass: None,
            quad,
            black_cube,
        }
    }

    /// Queue an arbitrary closure against the GPU context.
    pub fn submit<F>(&self, command: F)
    where
        F: FnOnce(&mut dyn GraphicsContext) + Send + 'static,
    {
        self.queue.submit_fn(command);
    }

    /// Start a pass: bind its framebuffer and optionally clear it.
    /// Nesting passes is fatal.
    pub fn begin_render_pass(&mut self, pass: &Arc<RenderPass>, clear: bool) {
        if let Some(active) = &self.active_pass {
            crate::fatal!(
                "Cannot begin render pass '{}' while '{}' is still active",
                pass.name(),
                active.name()
            );
        }
        self.active_pass = Some(Arc::clone(pass));

        let framebuffer = pass.target_framebuffer();
        framebuffer.bind();
        if clear {
            self.queue
                .submit(RenderCommand::Clear(framebuffer.clear_color()));
        }
    }

    /// End the active pass. Ending with no active pass is fatal.
    pub fn end_render_pass(&mut self) {
        if self.active_pass.take().is_none() {
            crate::fatal!("Cannot end render pass when no render pass is active");
        }
        self.queue.submit(RenderCommand::UnbindFramebuffer);
    }

    pub fn active_render_pass(&self) -> Option<&Arc<RenderPass>> {
        self.active_pass.as_ref()
    }

    /// Draw every submesh, each with the override material or its own.
    pub fn submit_mesh(&self, mesh: &Arc<Mesh>, transform: Mat4, override_material: Option<&MaterialRef>) {
        mesh.pipeline().bind();
        mesh.vertex_buffer().bind();
        mesh.index_buffer().bind();

        for submesh in mesh.submeshes() {
            let material = match override_material {
                Some(material) => material.clone(),
                None => MaterialRef::Instance(Arc::clone(
                    &mesh.materials()[submesh.material_index as usize],
                )),
            };
            material.bind();
            material.shader().set_uniform(
                "u_Transform",
                UniformValue::Mat4(transform * submesh.transform),
            );
            self.queue.submit(RenderCommand::DrawIndexed(DrawCall {
                primitive: PrimitiveType::Triangles,
                index_count: submesh.index_count,
                base_index: submesh.base_index,
                base_vertex: submesh.base_vertex as i32,
                depth_test: material.flag(MaterialFlags::DEPTH_TEST),
                face_culling: !material.flag(MaterialFlags::TWO_SIDED),
            }));
        }
    }

    /// Draw the unit quad with `material`, placed by `transform`.
    pub fn submit_quad(&self, material: &MaterialRef, transform: Mat4) {
        material.bind();
        material
            .shader()
            .set_uniform("u_Transform", UniformValue::Mat4(transform));
        self.quad.bind();
        self.draw_indexed(
            6,
            PrimitiveType::Triangles,
            material.flag(MaterialFlags::DEPTH_TEST),
            !material.flag(MaterialFlags::TWO_SIDED),
        );
    }

    /// Draw the quad in clip space, e.g. for compositing.
    pub fn submit_fullscreen_quad(&self, material: Option<&MaterialRef>) {
        let mut depth_test = true;
        if let Some(material) = material {
            material.bind();
            depth_test = material.flag(MaterialFlags::DEPTH_TEST);
        }
        self.quad.bind();
        self.draw_indexed(6, PrimitiveType::Triangles, depth_test, true);
    }

    /// Draw `count` indices of the bound buffers. [`PrimitiveType::None`] is fatal.
    pub fn draw_indexed(
        &self,
        count: u32,
        primitive: PrimitiveType,
        depth_test: bool,
        face_culling: bool,
    ) {
        if primitive == PrimitiveType::None {
            crate::fatal!("Unsupported primitive type {:?}", primitive);
        }
        self.queue.submit(RenderCommand::DrawIndexed(DrawCall {
            primitive,
            index_count: count,
            base_index: 0,
            base_vertex: 0,
            depth_test,
            face_culling,
        }));
    }

    /// Execute and clear everything queued so far.
    pub fn wait_and_render(&self, ctx: &mut dyn GraphicsContext) -> BackendResult<usize> {
        if let Some(active) = &self.active_pass {
            log::warn!("Rendering while render pass '{}' is still active", active.name());
        }
        let executed = self.queue.execute(ctx)?;
        log::trace!("Executed {} render commands on {}", executed, ctx.name());
        Ok(executed)
    }

    /// Create a framebuffer that follows window resizes.
    pub fn create_framebuffer(&self, spec: FramebufferSpec) -> Arc<Framebuffer> {
        let framebuffer = Framebuffer::new(&self.queue, spec);
        self.framebuffer_pool.add(&framebuffer);
        framebuffer
    }

    pub fn on_window_resize(&self, width: u32, height: u32) {
        self.framebuffer_pool.resize_all(width, height);
    }

    /// Forward window events. Returns true if the event was consumed.
    pub fn handle_window_event(&self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::Resized(size) => {
                self.on_window_resize(size.width, size.height);
                true
            }
            _ => false,
        }
    }

    pub fn black_cube_texture(&self) -> &Arc<TextureCube> {
        &self.black_cube
    }

    pub fn shader_library(&self) -> &ShaderLibrary {
        &self.shader_library
    }

    pub fn shader_library_mut(&mut self) -> &mut ShaderLibrary {
        &mut self.shader_library
    }

    pub fn framebuffer_pool(&self) -> &FramebufferPool {
        &self.framebuffer_pool
    }

    pub fn queue(&self) -> &Arc<RenderQueue> {
        &self.queue
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("pending", &self.queue.pending())
            .field("active_pass", &self.active_pass.as_ref().map(|p| p.name().to_string()))
            .field("framebuffers", &self.framebuffer_pool.live_count())
            .field("shaders", &self.shader_library.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ContextCall, HeadlessContext, ShaderStages};
    use crate::materials::{Material, MaterialInstance};
    use crate::resources::MeshData;
    use crate::shader::{Shader, ShaderReflection};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn create_test_renderer() -> Renderer {
        let mut renderer = Renderer::new(RendererConfig::default().with_viewport(320, 240));
        let shader = Shader::new(
            renderer.queue(),
            "flat",
            ShaderStages::Graphics {
                vertex: String::new(),
                fragment: String::new(),
            },
            ShaderReflection::default(),
        );
        renderer.shader_library_mut().add(shader);
        renderer
    }

    fn create_test_pass(renderer: &Renderer, name: &str) -> Arc<RenderPass> {
        RenderPass::new(RenderPassSpec {
            target_framebuffer: renderer.create_framebuffer(FramebufferSpec {
                width: 320,
                height: 240,
                clear_color: [0.1, 0.2, 0.3, 1.0],
                debug_name: name.to_string(),
                ..Default::default()
            }),
            debug_name: name.to_string(),
        })
    }

    #[test]
    fn test_submit_writes_value() {
        let renderer = create_test_renderer();
        let value = Arc::new(AtomicU32::new(0));
        let captured = Arc::clone(&value);
        renderer.submit(move |_| captured.store(42, Ordering::SeqCst));

        let mut ctx = HeadlessContext::new();
        renderer.wait_and_render(&mut ctx).unwrap();
        assert_eq!(value.load(Ordering::SeqCst), 42);
        assert_eq!(renderer.queue().pending(), 0);
    }

    #[test]
    fn test_render_pass_binds_and_clears() {
        let mut renderer = create_test_renderer();
        let pass = create_test_pass(&renderer, "geometry");
        let mut ctx = HeadlessContext::new();
        renderer.wait_and_render(&mut ctx).unwrap();
        ctx.take_calls();

        renderer.begin_render_pass(&pass, true);
        assert!(renderer.active_render_pass().is_some());
        renderer.end_render_pass();
        assert!(renderer.active_render_pass().is_none());
        renderer.wait_and_render(&mut ctx).unwrap();

        let framebuffer = pass.target_framebuffer().targets().unwrap().framebuffer;
        assert_eq!(
            ctx.calls(),
            &[
                ContextCall::BindFramebuffer(Some(framebuffer)),
                ContextCall::SetViewport { x: 0, y: 0, width: 320, height: 240 },
                ContextCall::Clear([0.1, 0.2, 0.3, 1.0]),
                ContextCall::BindFramebuffer(None),
            ]
        );
    }

    #[test]
    fn test_render_pass_without_clear() {
        let mut renderer = create_test_renderer();
        let pass = create_test_pass(&renderer, "composite");
        let before = renderer.queue().pending();
        renderer.begin_render_pass(&pass, false);
        renderer.end_render_pass();
        assert_eq!(renderer.queue().pending(), before + 2);
    }

    #[test]
    #[should_panic(expected = "still active")]
    fn test_nested_render_pass_is_fatal() {
        let mut renderer = create_test_renderer();
        let pass = create_test_pass(&renderer, "geometry");
        renderer.begin_render_pass(&pass, true);
        renderer.begin_render_pass(&pass, true);
    }

    #[test]
    #[should_panic(expected = "no render pass is active")]
    fn test_end_without_begin_is_fatal() {
        let mut renderer = create_test_renderer();
        renderer.end_render_pass();
    }

    #[test]
    #[should_panic(expected = "Unsupported primitive type")]
    fn test_unsupported_primitive_is_fatal() {
        let renderer = create_test_renderer();
        renderer.draw_indexed(3, PrimitiveType::None, true, true);
    }

    #[test]
    fn test_submit_mesh_draws_every_submesh() {
        let renderer = create_test_renderer();
        let shader = renderer.shader_library().get("flat").unwrap();
        let mut data = MeshData::cube();
        let mut second = data.submeshes[0].clone();
        data.submeshes[0].index_count = 18;
        second.base_index = 18;
        second.index_count = 18;
        data.submeshes.push(second);
        let mesh = Mesh::new(renderer.queue(), data, &shader);

        renderer.submit_mesh(&mesh, Mat4::IDENTITY, None);
        let mut ctx = HeadlessContext::new();
        renderer.wait_and_render(&mut ctx).unwrap();

        let draws: Vec<_> = ctx
            .calls()
            .iter()
            .filter_map(|c| match c {
                ContextCall::DrawIndexed { base_index, index_count, .. } => Some((*base_index, *index_count)),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![(0, 18), (18, 18)]);
        // default material flags: depth test on, culling on
        assert_eq!(ctx.count(|c| matches!(c, ContextCall::SetDepthTest(_))), 0);
        assert_eq!(ctx.count(|c| *c == ContextCall::SetFaceCulling(true)), 2);
    }

    #[test]
    fn test_submit_quad_with_two_sided_material() {
        let renderer = create_test_renderer();
        let shader = renderer.shader_library().get("flat").unwrap();
        let instance = MaterialInstance::new(&Material::new(&shader, "grid"), "grid");
        instance.set_flag(MaterialFlags::TWO_SIDED, true);
        instance.set_flag(MaterialFlags::DEPTH_TEST, false);

        renderer.submit_quad(&MaterialRef::from(instance), Mat4::IDENTITY);
        let mut ctx = HeadlessContext::new();
        renderer.wait_and_render(&mut ctx).unwrap();

        let tail = &ctx.calls()[ctx.calls().len() - 4..];
        assert_eq!(tail[0], ContextCall::SetFaceCulling(false));
        assert_eq!(tail[1], ContextCall::SetDepthTest(false));
        assert!(matches!(tail[2], ContextCall::DrawIndexed { index_count: 6, .. }));
        assert_eq!(tail[3], ContextCall::SetDepthTest(true));
    }

    #[test]
    fn test_window_resize_event_resizes_framebuffers() {
        let renderer = create_test_renderer();
        let pass = create_test_pass(&renderer, "geometry");
        let event = WindowEvent::Resized(winit::dpi::PhysicalSize::new(800, 600));

        assert!(renderer.handle_window_event(&event));
        assert_eq!(pass.target_framebuffer().size(), (800, 600));
        assert!(!renderer.handle_window_event(&WindowEvent::Focused(true)));
    }
}
