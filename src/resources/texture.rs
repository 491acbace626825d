//! Texture loading and shared texture handles

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ColorType, DynamicImage, GenericImageView, ImageFormat};
use parking_lot::Mutex;

use crate::backend::{
    BackendResult, GraphicsContext, ImageAccess, TextureDescriptor, TextureFormat, TextureId,
    TextureKind,
};
use crate::command::{RenderCommand, RenderQueue};
use crate::error::{RenderError, RenderResult};

use super::NativeSlot;

/// Number of mip levels of a full chain for a `width` x `height` image.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    32 - largest.leading_zeros()
}

/// Decoded texture data
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Decode an image file. HDR sources decode to `Rgba32Float`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let format = ImageFormat::from_path(path).ok();
        let img = image::open(path).map_err(|source| RenderError::TextureDecode {
            path: path.to_path_buf(),
            source,
        })?;
        if matches!(format, Some(ImageFormat::Hdr | ImageFormat::OpenExr)) {
            return Ok(Self::from_float_image(img, &name));
        }
        Ok(Self::from_image(img, &name))
    }

    /// Decode an in-memory image.
    pub fn from_bytes(bytes: &[u8], name: &str) -> RenderResult<Self> {
        let img = image::load_from_memory(bytes).map_err(|source| RenderError::TextureDecode {
            path: PathBuf::from(name),
            source,
        })?;
        Ok(Self::from_image(img, name))
    }

    /// Keep full float precision whatever the decoder reports.
    fn from_float_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        let texels = img.to_rgba32f().into_raw();
        Self {
            width,
            height,
            format: TextureFormat::Rgba32Float,
            data: bytemuck::cast_slice(&texels).to_vec(),
            name: name.to_string(),
        }
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        let (format, data) = match img.color() {
            ColorType::L8 => (TextureFormat::R8Unorm, img.into_luma8().into_raw()),
            ColorType::La8 => (TextureFormat::Rg8Unorm, img.into_luma_alpha8().into_raw()),
            ColorType::Rgb8 => (TextureFormat::Rgb8Unorm, img.into_rgb8().into_raw()),
            ColorType::Rgb32F | ColorType::Rgba32F => return Self::from_float_image(img, name),
            _ => (TextureFormat::Rgba8Unorm, img.into_rgba8().into_raw()),
        };

        Self {
            width,
            height,
            format,
            data,
            name: name.to_string(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    pub fn is_hdr(&self) -> bool {
        self.format.is_float()
    }
}

/// Shared 2D texture handle
pub struct Texture2D {
    name: String,
    path: Option<PathBuf>,
    width: u32,
    height: u32,
    format: TextureFormat,
    loaded: bool,
    pixels: Mutex<Option<Vec<u8>>>,
    id: NativeSlot<TextureId>,
    queue: Arc<RenderQueue>,
}

impl Texture2D {
    /// Load a texture from disk.
    ///
    /// A file that cannot be read or decoded yields a handle whose
    /// [`loaded`](Self::loaded) flag is false. No GPU work is queued for it.
    pub fn load<P: AsRef<Path>>(queue: &Arc<RenderQueue>, path: P) -> Arc<Self> {
        let path = path.as_ref();
        match TextureData::from_file(path) {
            Ok(data) => Self::create(queue, data, Some(path.to_path_buf())),
            Err(err) => {
                log::warn!("Texture not loaded: {}", err);
                Arc::new(Self {
                    name: path.display().to_string(),
                    path: Some(path.to_path_buf()),
                    width: 0,
                    height: 0,
                    format: TextureFormat::Rgba8Unorm,
                    loaded: false,
                    pixels: Mutex::new(None),
                    id: NativeSlot::empty(),
                    queue: Arc::clone(queue),
                })
            }
        }
    }

    /// Upload already decoded data.
    pub fn from_data(queue: &Arc<RenderQueue>, data: TextureData) -> Arc<Self> {
        Self::create(queue, data, None)
    }

    fn create(queue: &Arc<RenderQueue>, data: TextureData, path: Option<PathBuf>) -> Arc<Self> {
        let texture = Arc::new(Self {
            name: data.name,
            path,
            width: data.width,
            height: data.height,
            format: data.format,
            loaded: true,
            pixels: Mutex::new(Some(data.data)),
            id: NativeSlot::empty(),
            queue: Arc::clone(queue),
        });
        log::trace!(
            "Queueing texture '{}' ({}x{}, {:?})",
            texture.name,
            texture.width,
            texture.height,
            texture.format
        );
        queue.submit(RenderCommand::CreateTexture(TextureRef::Texture2D(
            Arc::clone(&texture),
        )));
        texture
    }

    pub(crate) fn realize(&self, ctx: &mut dyn GraphicsContext) -> BackendResult<()> {
        // CPU pixels are released once uploaded
        let pixels = self.pixels.lock().take();
        let desc = TextureDescriptor {
            label: Some(self.name.clone()),
            kind: TextureKind::D2,
            width: self.width,
            height: self.height,
            mip_levels: self.mip_level_count(),
            format: self.format,
        };
        let id = ctx.create_texture(&desc, pixels.as_deref())?;
        ctx.generate_mipmaps(id);
        self.id.replace(id);
        Ok(())
    }

    pub fn bind(self: &Arc<Self>, slot: u32) {
        self.queue.submit(RenderCommand::BindTexture {
            slot,
            texture: TextureRef::Texture2D(Arc::clone(self)),
        });
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn mip_level_count(&self) -> u32 {
        mip_level_count(self.width, self.height)
    }

    pub fn id(&self) -> Option<TextureId> {
        self.id.get()
    }
}

impl Drop for Texture2D {
    fn drop(&mut self) {
        if let Some(id) = self.id.take_mut() {
            self.queue.submit(RenderCommand::DeleteTexture(id));
        }
    }
}

impl fmt::Debug for Texture2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture2D")
            .field("name", &self.name)
            .field("size", &(self.width, self.height))
            .field("format", &self.format)
            .field("loaded", &self.loaded)
            .field("id", &self.id)
            .finish()
    }
}

/// Shared cube map handle with a full mip chain
pub struct TextureCube {
    label: String,
    width: u32,
    height: u32,
    format: TextureFormat,
    pixels: Mutex<Option<Vec<u8>>>,
    id: NativeSlot<TextureId>,
    queue: Arc<RenderQueue>,
}

impl TextureCube {
    /// Allocate uninitialised storage.
    pub fn new(
        queue: &Arc<RenderQueue>,
        label: &str,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Arc<Self> {
        Self::create(queue, label, format, width, height, None)
    }

    /// Allocate and fill all six faces of level 0.
    pub fn with_data(
        queue: &Arc<RenderQueue>,
        label: &str,
        format: TextureFormat,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> Arc<Self> {
        let expected = (width * height * format.bytes_per_pixel() * 6) as usize;
        if data.len() != expected {
            crate::fatal!(
                "Cube map '{}' expects {} bytes of face data, got {}",
                label,
                expected,
                data.len()
            );
        }
        Self::create(queue, label, format, width, height, Some(data))
    }

    fn create(
        queue: &Arc<RenderQueue>,
        label: &str,
        format: TextureFormat,
        width: u32,
        height: u32,
        data: Option<Vec<u8>>,
    ) -> Arc<Self> {
        let texture = Arc::new(Self {
            label: label.to_string(),
            width,
            height,
            format,
            pixels: Mutex::new(data),
            id: NativeSlot::empty(),
            queue: Arc::clone(queue),
        });
        log::trace!(
            "Queueing cube map '{}' ({}x{}, {} mips)",
            label,
            width,
            height,
            texture.mip_level_count()
        );
        queue.submit(RenderCommand::CreateTexture(TextureRef::Cube(Arc::clone(
            &texture,
        ))));
        texture
    }

    pub(crate) fn realize(&self, ctx: &mut dyn GraphicsContext) -> BackendResult<()> {
        let pixels = self.pixels.lock().take();
        let desc = TextureDescriptor {
            label: Some(self.label.clone()),
            kind: TextureKind::Cube,
            width: self.width,
            height: self.height,
            mip_levels: self.mip_level_count(),
            format: self.format,
        };
        let id = ctx.create_texture(&desc, pixels.as_deref())?;
        self.id.replace(id);
        Ok(())
    }

    pub fn bind(self: &Arc<Self>, slot: u32) {
        self.queue.submit(RenderCommand::BindTexture {
            slot,
            texture: TextureRef::Cube(Arc::clone(self)),
        });
    }

    /// Bind one level as a compute image.
    pub fn bind_image(self: &Arc<Self>, unit: u32, level: u32, access: ImageAccess) {
        self.queue.submit(RenderCommand::BindImageTexture {
            unit,
            texture: TextureRef::Cube(Arc::clone(self)),
            level,
            access,
        });
    }

    pub fn generate_mipmaps(self: &Arc<Self>) {
        self.queue
            .submit(RenderCommand::GenerateMipmaps(TextureRef::Cube(Arc::clone(
                self,
            ))));
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Expected mip count for the face size, not the number of levels with data.
    pub fn mip_level_count(&self) -> u32 {
        mip_level_count(self.width, self.height)
    }

    pub fn id(&self) -> Option<TextureId> {
        self.id.get()
    }
}

impl Drop for TextureCube {
    fn drop(&mut self) {
        if let Some(id) = self.id.take_mut() {
            self.queue.submit(RenderCommand::DeleteTexture(id));
        }
    }
}

impl fmt::Debug for TextureCube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureCube")
            .field("label", &self.label)
            .field("size", &(self.width, self.height))
            .field("format", &self.format)
            .field("id", &self.id)
            .finish()
    }
}

/// Either kind of texture handle, as stored in material slots and commands.
#[derive(Debug, Clone)]
pub enum TextureRef {
    Texture2D(Arc<Texture2D>),
    Cube(Arc<TextureCube>),
}

impl TextureRef {
    pub fn id(&self) -> Option<TextureId> {
        match self {
            TextureRef::Texture2D(texture) => texture.id(),
            TextureRef::Cube(texture) => texture.id(),
        }
    }

    pub fn format(&self) -> TextureFormat {
        match self {
            TextureRef::Texture2D(texture) => texture.format(),
            TextureRef::Cube(texture) => texture.format(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        match self {
            TextureRef::Texture2D(texture) => (texture.width(), texture.height()),
            TextureRef::Cube(texture) => (texture.width(), texture.height()),
        }
    }

    /// Array layers: 1 for 2D textures, 6 faces for cube maps.
    pub fn layers(&self) -> u32 {
        match self {
            TextureRef::Texture2D(_) => 1,
            TextureRef::Cube(_) => 6,
        }
    }

    /// Queue a bind of this texture to `slot`.
    pub fn bind(&self, slot: u32) {
        match self {
            TextureRef::Texture2D(texture) => texture.bind(slot),
            TextureRef::Cube(texture) => texture.bind(slot),
        }
    }

    pub(crate) fn realize(&self, ctx: &mut dyn GraphicsContext) -> BackendResult<()> {
        match self {
            TextureRef::Texture2D(texture) => texture.realize(ctx),
            TextureRef::Cube(texture) => texture.realize(ctx),
        }
    }

    pub(crate) fn native_id(&self) -> TextureId {
        match self {
            TextureRef::Texture2D(texture) => texture.id.expect("texture"),
            TextureRef::Cube(texture) => texture.id.expect("cube map"),
        }
    }
}

impl From<Arc<Texture2D>> for TextureRef {
    fn from(texture: Arc<Texture2D>) -> Self {
        TextureRef::Texture2D(texture)
    }
}

impl From<Arc<TextureCube>> for TextureRef {
    fn from(texture: Arc<TextureCube>) -> Self {
        TextureRef::Cube(texture)
    }
}

static_assertions::assert_impl_all!(Texture2D: Send, Sync);
static_assertions::assert_impl_all!(TextureCube: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ContextCall, HeadlessContext};
    use crate::command::DEFAULT_COMMAND_BUFFER_CAPACITY;

    fn create_test_queue() -> Arc<RenderQueue> {
        RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY)
    }

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(32, 32), 6);
        assert_eq!(mip_level_count(2048, 2048), 12);
        assert_eq!(mip_level_count(640, 480), 10);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_missing_file_is_not_loaded() {
        let queue = create_test_queue();
        let texture = Texture2D::load(&queue, "does/not/exist.png");

        assert!(!texture.loaded());
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_load_from_disk() {
        let path = std::env::temp_dir().join("queued_renderer_texture_load.png");
        image::RgbaImage::from_pixel(4, 2, image::Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let queue = create_test_queue();
        let texture = Texture2D::load(&queue, &path);
        assert!(texture.loaded());
        assert_eq!((texture.width(), texture.height()), (4, 2));
        assert_eq!(texture.format(), TextureFormat::Rgba8Unorm);
        assert_eq!(queue.pending(), 1);

        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        let id = texture.id().unwrap();
        assert!(matches!(
            &ctx.calls()[0],
            ContextCall::CreateTexture { has_data: true, desc, .. } if desc.mip_levels == 3
        ));
        assert_eq!(ctx.calls()[1], ContextCall::GenerateMipmaps(id));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_radiance_file_decodes_to_float() {
        let path = std::env::temp_dir().join("queued_renderer_texture_load.hdr");
        let pixels = vec![image::Rgb([2.5f32, 0.5, 0.125]); 8];
        let file = std::fs::File::create(&path).unwrap();
        image::codecs::hdr::HdrEncoder::new(std::io::BufWriter::new(file))
            .encode(&pixels, 4, 2)
            .unwrap();

        let data = TextureData::from_file(&path).unwrap();
        assert!(data.is_hdr());
        assert_eq!(data.format, TextureFormat::Rgba32Float);
        assert_eq!((data.width, data.height), (4, 2));
        let texels: &[f32] = bytemuck::cast_slice(&data.data);
        assert_eq!(texels.len(), 4 * 8);
        assert!(texels[0] > 1.0);
        assert_eq!(texels[3], 1.0);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_cube_drop_enqueues_delete() {
        let queue = create_test_queue();
        let cube = TextureCube::new(&queue, "env", TextureFormat::Rgba16Float, 64, 64);
        assert_eq!(cube.mip_level_count(), 7);

        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        let id = cube.id().unwrap();

        drop(cube);
        queue.execute(&mut ctx).unwrap();
        assert_eq!(ctx.calls().last(), Some(&ContextCall::DeleteTexture(id)));
    }

    #[test]
    #[should_panic(expected = "expects 24 bytes")]
    fn test_cube_face_data_size_checked() {
        let queue = create_test_queue();
        TextureCube::with_data(&queue, "black", TextureFormat::Rgba8Unorm, 1, 1, vec![0; 4]);
    }
}
