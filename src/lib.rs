//! Queued Renderer - deferred-submission rendering core
//!
//! Scene-side code never touches the GPU directly. Resource creation, binds,
//! uniform uploads and draws are recorded as typed commands in a
//! [`RenderQueue`](command::RenderQueue) and replayed, in submission order,
//! against an immediate-mode [`GraphicsContext`](backend::GraphicsContext)
//! when [`Renderer::wait_and_render`] is called.
//!
//! # Features
//! - Shared GPU resource handles with deferred creation and drop-enqueued deletion
//! - Materials and material instances over reflected uniform layouts
//! - Render-pass state machine with fullscreen and quad helpers
//! - Draw-list scene renderer with an editor grid and environment map baking
//! - A recording headless context for tests and tooling

pub mod backend;
pub mod command;
pub mod error;
pub mod materials;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shader;

// Re-export Bevy ECS prelude for scene users
pub use bevy_ecs::prelude::*;

pub use error::{RenderError, RenderResult};
pub use renderer::Renderer;

/// Default byte budget of one frame's command buffer.
pub const DEFAULT_COMMAND_BUFFER_CAPACITY: usize = command::DEFAULT_COMMAND_BUFFER_CAPACITY;

/// Environment map bake settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Face size of the radiance cube map
    pub cubemap_size: u32,
    /// Face size of the irradiance cube map
    pub irradiance_size: u32,
    /// Local size of the bake compute shaders
    pub workgroup_size: u32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            cubemap_size: 2048,
            irradiance_size: 32,
            workgroup_size: 32,
        }
    }
}

/// Editor grid settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    pub enabled: bool,
    pub scale: f32,
    pub resolution: f32,
    /// Half-size of the grid quad in world units
    pub extent: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scale: 16.025,
            resolution: 0.025,
            extent: 16.0,
        }
    }
}

/// Configuration for initializing the renderer
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Command buffer capacity in bytes. Overflowing it is fatal.
    pub command_buffer_capacity: usize,
    /// Initial viewport width
    pub viewport_width: u32,
    /// Initial viewport height
    pub viewport_height: u32,
    pub environment: EnvironmentConfig,
    pub grid: GridConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command_buffer_capacity: DEFAULT_COMMAND_BUFFER_CAPACITY,
            viewport_width: 1280,
            viewport_height: 720,
            environment: EnvironmentConfig::default(),
            grid: GridConfig::default(),
        }
    }
}

impl RendererConfig {
    pub fn with_command_buffer_capacity(mut self, bytes: usize) -> Self {
        self.command_buffer_capacity = bytes;
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentConfig) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_grid(mut self, grid: GridConfig) -> Self {
        self.grid = grid;
        self
    }
}

/// Install `env_logger` with an `info` default filter. `RUST_LOG` overrides it.
///
/// Calling it more than once is harmless.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RendererConfig::default();
        assert_eq!(config.command_buffer_capacity, 10 * 1024 * 1024);
        assert_eq!(config.environment.cubemap_size, 2048);
        assert_eq!(config.environment.irradiance_size, 32);
        assert_eq!(config.grid.scale, 16.025);
    }

    #[test]
    fn test_builder_setters() {
        let config = RendererConfig::default()
            .with_viewport(800, 600)
            .with_command_buffer_capacity(4096);
        assert_eq!((config.viewport_width, config.viewport_height), (800, 600));
        assert_eq!(config.command_buffer_capacity, 4096);
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
    }
}
