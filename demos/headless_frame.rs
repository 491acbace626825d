//! Render a few frames of a small scene against the recording headless
//! context and print what reached the GPU.
//!
//! ```text
//! cargo run --example headless_frame -- --frames 3 --width 800 --height 600
//! cargo run --example headless_frame -- --environment assets/env/pink_sunrise.hdr
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use glam::Vec3;

use queued_renderer::backend::{ContextCall, HeadlessContext};
use queued_renderer::resources::{Mesh, MeshData};
use queued_renderer::scene::{
    Camera, Environment, Light, Scene, SceneCamera, SceneRenderer, Transform, COMPOSITE_SHADER,
    EQUIRECT_TO_CUBEMAP_SHADER, GRID_SHADER, IRRADIANCE_SHADER, MIP_FILTER_SHADER,
};
use queued_renderer::shader::{
    parse_stages, ResourceType, Shader, ShaderDomain, ShaderReflection, UniformType,
};
use queued_renderer::{GridConfig, RenderResult, Renderer, RendererConfig};

/// Headless queued-renderer demo.
#[derive(Parser, Debug)]
#[command(name = "headless_frame", about = "Render frames without a GPU", version)]
struct Args {
    /// Number of frames to render.
    #[arg(long, default_value = "1")]
    frames: u32,

    /// Viewport width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Viewport height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Hide the editor grid.
    #[arg(long)]
    no_grid: bool,

    /// Command buffer budget in MiB.
    #[arg(long, default_value = "10")]
    command_buffer_mib: usize,

    /// Equirectangular HDR image to bake into an environment.
    #[arg(long)]
    environment: Option<PathBuf>,
}

const FLAT_SOURCE: &str = "#type vertex\nvoid main() {}\n#type fragment\nvoid main() {}\n";
const COMPUTE_SOURCE: &str = "#type compute\nvoid main() {}\n";

fn register_shaders(renderer: &mut Renderer) -> RenderResult<Arc<Shader>> {
    let grid = ShaderReflection::new()
        .with_uniform(ShaderDomain::Vertex, "u_ViewProjection", UniformType::Mat4)
        .with_uniform(ShaderDomain::Pixel, "u_Scale", UniformType::Float)
        .with_uniform(ShaderDomain::Pixel, "u_Res", UniformType::Float);
    let composite = ShaderReflection::new()
        .with_uniform(ShaderDomain::Pixel, "u_Exposure", UniformType::Float)
        .with_resource("u_Texture", ResourceType::Texture2D);
    let pbr = ShaderReflection::new()
        .with_uniform(ShaderDomain::Vertex, "u_ViewProjectionMatrix", UniformType::Mat4)
        .with_uniform(ShaderDomain::Pixel, "u_CameraPosition", UniformType::Vec3)
        .with_struct(ShaderDomain::Pixel, "u_Lights", Light::shader_struct())
        .with_uniform(ShaderDomain::Pixel, "u_AlbedoColor", UniformType::Vec3)
        .with_uniform(ShaderDomain::Pixel, "u_Metalness", UniformType::Float)
        .with_uniform(ShaderDomain::Pixel, "u_Roughness", UniformType::Float)
        .with_uniform(ShaderDomain::Pixel, "u_AlbedoTexToggle", UniformType::Float)
        .with_resource("u_AlbedoTexture", ResourceType::Texture2D)
        .with_resource("u_EnvRadianceTex", ResourceType::TextureCube);

    let queue = Arc::clone(renderer.queue());
    let library = renderer.shader_library_mut();
    library.add(Shader::new(&queue, GRID_SHADER, parse_stages(GRID_SHADER, FLAT_SOURCE)?, grid));
    library.add(Shader::new(
        &queue,
        COMPOSITE_SHADER,
        parse_stages(COMPOSITE_SHADER, FLAT_SOURCE)?,
        composite,
    ));
    for name in [EQUIRECT_TO_CUBEMAP_SHADER, MIP_FILTER_SHADER, IRRADIANCE_SHADER] {
        library.add(Shader::new(
            &queue,
            name,
            parse_stages(name, COMPUTE_SOURCE)?,
            ShaderReflection::new(),
        ));
    }

    let pbr = Shader::new(&queue, "pbr", parse_stages("pbr", FLAT_SOURCE)?, pbr);
    library.add(Arc::clone(&pbr));
    Ok(pbr)
}

fn summarize(frame: u32, ctx: &HeadlessContext, executed: usize) {
    let draws = ctx.count(|c| matches!(c, ContextCall::DrawIndexed { .. }));
    let uploads = ctx.count(|c| matches!(c, ContextCall::UploadUniform { .. }));
    let dispatches = ctx.count(|c| matches!(c, ContextCall::DispatchCompute { .. }));
    let creates = ctx.count(|c| {
        matches!(
            c,
            ContextCall::CreateVertexBuffer { .. }
                | ContextCall::CreateIndexBuffer { .. }
                | ContextCall::CreateTexture { .. }
                | ContextCall::CreateFramebuffer { .. }
                | ContextCall::CreateProgram { .. }
        )
    });
    println!(
        "frame {:>3}: {:>4} commands -> {:>5} calls ({} creates, {} uploads, {} draws, {} dispatches)",
        frame,
        executed,
        ctx.calls().len(),
        creates,
        uploads,
        draws,
        dispatches
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    queued_renderer::init_logging();
    let args = Args::parse();

    let config = RendererConfig::default()
        .with_viewport(args.width, args.height)
        .with_command_buffer_capacity(args.command_buffer_mib * 1024 * 1024)
        .with_grid(GridConfig {
            enabled: !args.no_grid,
            ..Default::default()
        });
    let mut renderer = Renderer::new(config);
    let pbr = register_shaders(&mut renderer)?;
    let mut scene_renderer = SceneRenderer::new(&renderer)?;
    scene_renderer.set_viewport_size(args.width, args.height);

    let mut scene = Scene::new("demo");
    scene.set_light(Light::new(Vec3::new(-1.0, 3.0, 2.0), Vec3::ONE, 1.0));
    scene.spawn_mesh(
        "ground",
        Mesh::new(renderer.queue(), MeshData::plane(10.0, 10.0, 4), &pbr),
        Transform::default(),
    );
    let cube = Mesh::new(renderer.queue(), MeshData::cube(), &pbr);
    let cube_entity = scene.spawn_mesh("cube", cube, Transform::from_position(Vec3::new(0.0, 0.5, 0.0)));

    if let Some(path) = &args.environment {
        let environment = Environment::load(&renderer, path)?;
        println!(
            "queued environment bake: radiance {}x{} ({} mips), irradiance {}x{}",
            environment.radiance_map.width(),
            environment.radiance_map.height(),
            environment.radiance_map.mip_level_count(),
            environment.irradiance_map.width(),
            environment.irradiance_map.height()
        );
        scene.set_environment(environment);
    }

    let mut camera = Camera::new(Vec3::new(4.0, 3.0, 6.0), Vec3::ZERO);
    camera.set_aspect(args.width as f32, args.height as f32);

    let mut ctx = HeadlessContext::new();
    for frame in 0..args.frames {
        if let Some(mut transform) = scene.world_mut().get_mut::<Transform>(cube_entity) {
            transform.rotate_axis(Vec3::Y, 0.1);
        }
        scene.render(&mut scene_renderer, &mut renderer, SceneCamera::from_camera(camera.clone()));

        let executed = renderer.wait_and_render(&mut ctx)?;
        summarize(frame, &ctx, executed);
        ctx.take_calls();
    }

    let final_target = scene_renderer.final_color_buffer();
    println!(
        "final color buffer '{}' {:?}",
        final_target.spec().debug_name,
        final_target.size()
    );
    Ok(())
}
