//! Shared fixtures for the frame integration tests.
//!
//! Everything runs against the recording [`HeadlessContext`], so the tests
//! inspect the exact call stream a frame produces.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use queued_renderer::backend::{ContextCall, HeadlessContext, ShaderStages};
use queued_renderer::resources::{Mesh, MeshData};
use queued_renderer::scene::{
    Light, EQUIRECT_TO_CUBEMAP_SHADER, GRID_SHADER, IRRADIANCE_SHADER, MIP_FILTER_SHADER,
};
use queued_renderer::shader::{Shader, ShaderDomain, ShaderReflection, UniformType};
use queued_renderer::{GridConfig, Renderer, RendererConfig};

pub const VIEWPORT: (u32, u32) = (128, 96);

pub fn graphics_stages() -> ShaderStages {
    ShaderStages::Graphics {
        vertex: "void main() {}".to_string(),
        fragment: "void main() {}".to_string(),
    }
}

pub fn compute_stages() -> ShaderStages {
    ShaderStages::Compute("void main() {}".to_string())
}

/// Uniform layout of the lit mesh shader used across the tests.
pub fn pbr_reflection() -> ShaderReflection {
    ShaderReflection::new()
        .with_uniform(ShaderDomain::Vertex, "u_ViewProjectionMatrix", UniformType::Mat4)
        .with_uniform(ShaderDomain::Pixel, "u_CameraPosition", UniformType::Vec3)
        .with_struct(ShaderDomain::Pixel, "u_Lights", Light::shader_struct())
}

fn grid_reflection() -> ShaderReflection {
    ShaderReflection::new()
        .with_uniform(ShaderDomain::Vertex, "u_ViewProjection", UniformType::Mat4)
        .with_uniform(ShaderDomain::Pixel, "u_Scale", UniformType::Float)
        .with_uniform(ShaderDomain::Pixel, "u_Res", UniformType::Float)
}

/// Renderer with the grid and environment bake shaders registered.
pub fn create_renderer(grid: bool) -> Renderer {
    let config = RendererConfig::default()
        .with_viewport(VIEWPORT.0, VIEWPORT.1)
        .with_grid(GridConfig {
            enabled: grid,
            ..Default::default()
        });
    let mut renderer = Renderer::new(config);

    let grid_shader = Shader::new(renderer.queue(), GRID_SHADER, graphics_stages(), grid_reflection());
    renderer.shader_library_mut().add(grid_shader);
    for name in [EQUIRECT_TO_CUBEMAP_SHADER, MIP_FILTER_SHADER, IRRADIANCE_SHADER] {
        let shader = Shader::new(renderer.queue(), name, compute_stages(), ShaderReflection::new());
        renderer.shader_library_mut().add(shader);
    }
    renderer
}

pub fn create_pbr_shader(renderer: &Renderer) -> Arc<Shader> {
    Shader::new(renderer.queue(), "pbr", graphics_stages(), pbr_reflection())
}

pub fn create_cube(renderer: &Renderer, shader: &Arc<Shader>, name: &str) -> Arc<Mesh> {
    let mut data = MeshData::cube();
    data.name = name.to_string();
    Mesh::new(renderer.queue(), data, shader)
}

/// Execute everything queued so far against a fresh context.
pub fn render_frame(renderer: &Renderer) -> HeadlessContext {
    let mut ctx = HeadlessContext::new();
    renderer
        .wait_and_render(&mut ctx)
        .expect("headless frame should not fail");
    ctx
}

pub fn dispatches(ctx: &HeadlessContext) -> Vec<(u32, u32, u32)> {
    ctx.calls()
        .iter()
        .filter_map(|call| match call {
            ContextCall::DispatchCompute { x, y, z } => Some((*x, *y, *z)),
            _ => None,
        })
        .collect()
}

/// Unique path in the system temp directory.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("queued-renderer-{}-{}", std::process::id(), name))
}

/// Write a small equirectangular Radiance HDR image.
pub fn write_hdr_image(name: &str, width: u32, height: u32) -> PathBuf {
    let path = temp_path(name);
    let pixels = vec![image::Rgb([1.5f32, 0.5, 0.25]); (width * height) as usize];
    let file = std::fs::File::create(&path).expect("create hdr file");
    image::codecs::hdr::HdrEncoder::new(std::io::BufWriter::new(file))
        .encode(&pixels, width as usize, height as usize)
        .expect("encode hdr");
    path
}

pub fn write_png_image(name: &str) -> PathBuf {
    let path = temp_path(name);
    image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]))
        .save(&path)
        .expect("write png");
    path
}
