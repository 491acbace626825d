//! Image-based lighting environment bake.
//!
//! Everything here is submission only: the compute work runs when the
//! renderer next executes its queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{ImageAccess, TextureFormat, UniformValue};
use crate::command::RenderCommand;
use crate::error::{RenderError, RenderResult};
use crate::renderer::Renderer;
use crate::resources::{Texture2D, TextureCube, TextureData, TextureRef};

pub const EQUIRECT_TO_CUBEMAP_SHADER: &str = "equirect_to_cubemap";
pub const MIP_FILTER_SHADER: &str = "environment_mip_filter";
pub const IRRADIANCE_SHADER: &str = "environment_irradiance";

const CUBE_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Bake a radiance and an irradiance cube map from an equirectangular HDR image.
///
/// Returns `(radiance, irradiance)`. The radiance map stores one roughness
/// level per mip.
pub fn create_environment_map<P: AsRef<Path>>(
    renderer: &Renderer,
    path: P,
) -> RenderResult<(Arc<TextureCube>, Arc<TextureCube>)> {
    let path = path.as_ref();
    let config = renderer.config().environment;
    let queue = renderer.queue();
    let library = renderer.shader_library();

    let data = TextureData::from_file(path)?;
    if !data.is_hdr() {
        return Err(RenderError::EnvironmentNotHdr(path.to_path_buf()));
    }
    let conversion_shader = library.get(EQUIRECT_TO_CUBEMAP_SHADER)?;
    let filter_shader = library.get(MIP_FILTER_SHADER)?;
    let irradiance_shader = library.get(IRRADIANCE_SHADER)?;

    let size = config.cubemap_size;
    let workgroup = config.workgroup_size.max(1);
    let groups = |extent: u32| (extent / workgroup).max(1);
    log::info!(
        "Baking environment '{}' ({}x{} cube, {} irradiance)",
        path.display(),
        size,
        size,
        config.irradiance_size
    );

    let equirect = Texture2D::from_data(queue, data);
    let unfiltered = TextureCube::new(queue, "environment-unfiltered", CUBE_FORMAT, size, size);
    let filtered = TextureCube::new(queue, "environment-filtered", CUBE_FORMAT, size, size);

    conversion_shader.bind();
    equirect.bind(1);
    unfiltered.bind_image(0, 0, ImageAccess::WriteOnly);
    queue.submit(RenderCommand::DispatchCompute {
        x: groups(size),
        y: groups(size),
        z: 6,
    });
    unfiltered.generate_mipmaps();

    queue.submit(RenderCommand::CopyTexture {
        src: TextureRef::Cube(Arc::clone(&unfiltered)),
        dst: TextureRef::Cube(Arc::clone(&filtered)),
    });

    filter_shader.bind();
    unfiltered.bind(1);
    let mip_count = filtered.mip_level_count();
    let delta_roughness = 1.0 / (mip_count.saturating_sub(1).max(1)) as f32;
    for level in 1..mip_count {
        let mip_size = (size >> level).max(1);
        filtered.bind_image(0, level, ImageAccess::WriteOnly);
        filter_shader.set_uniform(
            "u_Roughness",
            UniformValue::Float(level as f32 * delta_roughness),
        );
        queue.submit(RenderCommand::DispatchCompute {
            x: groups(mip_size),
            y: groups(mip_size),
            z: 6,
        });
    }

    let irradiance_size = config.irradiance_size;
    let irradiance = TextureCube::new(
        queue,
        "environment-irradiance",
        CUBE_FORMAT,
        irradiance_size,
        irradiance_size,
    );
    irradiance_shader.bind();
    filtered.bind(1);
    irradiance.bind_image(0, 0, ImageAccess::WriteOnly);
    queue.submit(RenderCommand::DispatchCompute {
        x: groups(irradiance_size),
        y: groups(irradiance_size),
        z: 6,
    });
    irradiance.generate_mipmaps();

    Ok((filtered, irradiance))
}

/// Baked radiance and irradiance maps plus the file they came from.
#[derive(Debug, Clone)]
pub struct Environment {
    pub path: Option<PathBuf>,
    pub radiance_map: Arc<TextureCube>,
    pub irradiance_map: Arc<TextureCube>,
}

impl Environment {
    pub fn new(radiance_map: Arc<TextureCube>, irradiance_map: Arc<TextureCube>) -> Self {
        Self {
            path: None,
            radiance_map,
            irradiance_map,
        }
    }

    /// Queue the bake of `path` and wrap the resulting maps.
    pub fn load<P: AsRef<Path>>(renderer: &Renderer, path: P) -> RenderResult<Self> {
        let (radiance_map, irradiance_map) = create_environment_map(renderer, path.as_ref())?;
        Ok(Self {
            path: Some(path.as_ref().to_path_buf()),
            radiance_map,
            irradiance_map,
        })
    }
}
