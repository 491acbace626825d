//! Draw-list scene renderer.
//!
//! Meshes submitted between [`SceneRenderer::begin_scene`] and
//! [`SceneRenderer::end_scene`] are only recorded. Ending the scene flushes
//! the draw list through the [`Renderer`]: a geometry pass into an HDR
//! framebuffer, the editor grid, then an optional composite pass.
//!
//! # Lifecycle
//!
//! ```ignore
//! let mut scene_renderer = SceneRenderer::new(&renderer)?;
//!
//! // Each frame:
//! scene_renderer.begin_scene(camera, light);
//! scene_renderer.submit_mesh(&mesh, transform, None);
//! scene_renderer.end_scene(&mut renderer);
//! renderer.wait_and_render(&mut ctx)?;
//! ```

use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::backend::{TextureFormat, UniformValue};
use crate::error::RenderResult;
use crate::materials::{Material, MaterialFlags, MaterialInstance, MaterialRef};
use crate::renderer::{RenderPass, RenderPassSpec, Renderer};
use crate::resources::{Framebuffer, FramebufferSpec, Mesh};
use crate::shader::Shader;
use crate::GridConfig;

use super::{Light, SceneCamera};

/// Shader drawn by the composite pass, when registered.
pub const COMPOSITE_SHADER: &str = "composite";
/// Shader of the editor grid.
pub const GRID_SHADER: &str = "grid";

/// Per-frame toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneRendererOptions {
    pub show_grid: bool,
}

impl Default for SceneRendererOptions {
    fn default() -> Self {
        Self { show_grid: true }
    }
}

struct DrawCommand {
    mesh: Arc<Mesh>,
    material: Option<MaterialRef>,
    transform: Mat4,
}

#[derive(Default)]
struct SceneData {
    camera: SceneCamera,
    light: Light,
}

/// Records a draw list per scene and flushes it through the renderer.
pub struct SceneRenderer {
    geometry_pass: Arc<RenderPass>,
    composite_pass: Arc<RenderPass>,
    composite_shader: Option<Arc<Shader>>,
    grid_material: Option<Arc<MaterialInstance>>,
    grid: GridConfig,
    options: SceneRendererOptions,
    active: bool,
    scene_data: SceneData,
    draw_list: Vec<DrawCommand>,
}

impl SceneRenderer {
    /// Create the geometry and composite passes and the grid material.
    ///
    /// Fails with [`RenderError::ShaderNotFound`](crate::RenderError::ShaderNotFound)
    /// when the grid is enabled and no `grid` shader is registered.
    pub fn new(renderer: &Renderer) -> RenderResult<Self> {
        let config = renderer.config().clone();
        let (width, height) = (config.viewport_width, config.viewport_height);

        let geometry_pass = RenderPass::new(RenderPassSpec {
            target_framebuffer: renderer.create_framebuffer(FramebufferSpec {
                width,
                height,
                attachments: vec![TextureFormat::Rgba16Float, TextureFormat::Depth24PlusStencil8],
                samples: 1,
                clear_color: [0.0, 0.0, 0.0, 1.0],
                debug_name: "geometry".to_string(),
                ..Default::default()
            }),
            debug_name: "geometry".to_string(),
        });
        let composite_pass = RenderPass::new(RenderPassSpec {
            target_framebuffer: renderer.create_framebuffer(FramebufferSpec {
                width,
                height,
                attachments: vec![TextureFormat::Rgba8Unorm],
                clear_color: [0.1, 0.1, 0.1, 1.0],
                debug_name: "composite".to_string(),
                ..Default::default()
            }),
            debug_name: "composite".to_string(),
        });

        let library = renderer.shader_library();
        let grid_material = if config.grid.enabled {
            let shader = library.get(GRID_SHADER)?;
            let material = MaterialInstance::new(&Material::new(&shader, "grid"), "grid");
            material.set_flag(MaterialFlags::TWO_SIDED, true);
            material.set("u_Scale", config.grid.scale);
            material.set("u_Res", config.grid.resolution);
            Some(material)
        } else {
            None
        };
        let composite_shader = library.get(COMPOSITE_SHADER).ok();
        if composite_shader.is_none() {
            log::debug!("No '{}' shader registered, composite pass disabled", COMPOSITE_SHADER);
        }

        Ok(Self {
            geometry_pass,
            composite_pass,
            composite_shader,
            grid_material,
            grid: config.grid,
            options: SceneRendererOptions {
                show_grid: config.grid.enabled,
            },
            active: false,
            scene_data: SceneData::default(),
            draw_list: Vec::new(),
        })
    }

    pub fn set_viewport_size(&self, width: u32, height: u32) {
        self.geometry_pass
            .target_framebuffer()
            .resize(width, height, false);
        self.composite_pass
            .target_framebuffer()
            .resize(width, height, false);
    }

    /// Start recording. Beginning a scene while one is active is fatal.
    pub fn begin_scene(&mut self, camera: SceneCamera, light: Light) {
        if self.active {
            crate::fatal!("Cannot begin a new scene while a scene is still active");
        }
        self.active = true;
        self.scene_data = SceneData { camera, light };
    }

    /// Record a mesh draw. Only valid between `begin_scene` and `end_scene`.
    pub fn submit_mesh(&mut self, mesh: &Arc<Mesh>, transform: Mat4, override_material: Option<MaterialRef>) {
        if !self.active {
            crate::fatal!("Cannot submit mesh '{}' outside of an active scene", mesh.name());
        }
        // TODO: frustum culling and material sorting before the flush
        self.draw_list.push(DrawCommand {
            mesh: Arc::clone(mesh),
            material: override_material,
            transform,
        });
    }

    /// Stop recording and queue the frame's passes.
    pub fn end_scene(&mut self, renderer: &mut Renderer) {
        if !self.active {
            crate::fatal!("Cannot end scene when there is no active scene");
        }
        self.active = false;
        self.flush_draw_list(renderer);
    }

    fn flush_draw_list(&mut self, renderer: &mut Renderer) {
        log::trace!("Flushing {} draw commands", self.draw_list.len());
        self.geometry_pass(renderer);
        self.composite_pass(renderer);
        self.draw_list.clear();
        self.scene_data = SceneData::default();
    }

    fn geometry_pass(&self, renderer: &mut Renderer) {
        renderer.begin_render_pass(&self.geometry_pass, true);

        let camera = &self.scene_data.camera;
        let view_projection = camera.view_projection();
        let camera_position = camera.position();

        for command in &self.draw_list {
            let material = command.mesh.base_material();
            material.set("u_ViewProjectionMatrix", view_projection);
            material.set("u_CameraPosition", camera_position);
            material.set("u_Lights", self.scene_data.light);
            renderer.submit_mesh(&command.mesh, command.transform, command.material.as_ref());
        }

        if self.options.show_grid {
            if let Some(grid) = &self.grid_material {
                grid.set("u_ViewProjection", view_projection);
                let transform = Mat4::from_rotation_x(90f32.to_radians())
                    * Mat4::from_scale(Vec3::splat(self.grid.extent));
                renderer.submit_quad(&MaterialRef::from(Arc::clone(grid)), transform);
            }
        }

        renderer.end_render_pass();
    }

    fn composite_pass(&self, renderer: &mut Renderer) {
        let Some(shader) = &self.composite_shader else {
            return;
        };
        renderer.begin_render_pass(&self.composite_pass, true);
        shader.bind();
        self.geometry_pass
            .target_framebuffer()
            .bind_color_texture(0, 0);
        shader.set_uniform("u_Texture", UniformValue::Int(0));
        renderer.submit_fullscreen_quad(None);
        renderer.end_render_pass();
    }

    /// Framebuffer holding the finished frame.
    pub fn final_color_buffer(&self) -> &Arc<Framebuffer> {
        if self.composite_shader.is_some() {
            self.composite_pass.target_framebuffer()
        } else {
            self.geometry_pass.target_framebuffer()
        }
    }

    pub fn geometry_pass_target(&self) -> &Arc<Framebuffer> {
        self.geometry_pass.target_framebuffer()
    }

    pub fn options(&self) -> &SceneRendererOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut SceneRendererOptions {
        &mut self.options
    }

    pub fn is_scene_active(&self) -> bool {
        self.active
    }

    /// Entries recorded since `begin_scene`.
    pub fn draw_list_len(&self) -> usize {
        self.draw_list.len()
    }
}
