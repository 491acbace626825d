//! Packed CPU-side uniform storage shared by materials and their instances

use std::mem::size_of;
use std::sync::Arc;

use bytemuck::Pod;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::backend::GraphicsContext;
use crate::resources::TextureRef;
use crate::shader::{ShaderDomain, ShaderReflection, Shader, UniformDeclaration};

/// A value that can be written into uniform storage.
///
/// `Raw` is the exact byte representation the shader reads.
pub trait UniformData: Copy + Send + Sync + 'static {
    type Raw: Pod;

    fn to_raw(self) -> Self::Raw;

    fn from_raw(raw: Self::Raw) -> Self;

    fn size() -> usize {
        size_of::<Self::Raw>()
    }
}

/// Implement [`UniformData`] for `Pod` types stored as-is.
#[macro_export]
macro_rules! impl_uniform_data {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::materials::UniformData for $ty {
                type Raw = $ty;

                fn to_raw(self) -> Self::Raw {
                    self
                }

                fn from_raw(raw: Self::Raw) -> Self {
                    raw
                }
            }
        )+
    };
}

impl_uniform_data!(f32, i32, Vec2, Vec3, Vec4, Mat3, Mat4);

impl UniformData for bool {
    type Raw = u32;

    fn to_raw(self) -> u32 {
        self as u32
    }

    fn from_raw(raw: u32) -> Self {
        raw != 0
    }
}

/// Look up `name` and check that `element_size` matches its declared element size.
pub(crate) fn resolve_uniform<'a>(
    reflection: &'a ShaderReflection,
    owner: &str,
    name: &str,
    element_size: usize,
) -> &'a UniformDeclaration {
    let Some(decl) = reflection.find_uniform(name) else {
        crate::fatal!("Could not find uniform '{}' in material '{}'", name, owner);
    };
    if decl.element_size() as usize != element_size {
        crate::fatal!(
            "Mismatch uniform datatype for '{}' in material '{}': declared {} bytes, got {}",
            name,
            owner,
            decl.element_size(),
            element_size
        );
    }
    decl
}

/// Per-domain uniform bytes plus texture slots indexed by register.
#[derive(Debug, Clone)]
pub(crate) struct UniformStorage {
    vertex: Vec<u8>,
    pixel: Vec<u8>,
    textures: Vec<Option<TextureRef>>,
}

impl UniformStorage {
    pub(crate) fn new(reflection: &ShaderReflection) -> Self {
        Self {
            vertex: vec![0; reflection.buffer(ShaderDomain::Vertex).size() as usize],
            pixel: vec![0; reflection.buffer(ShaderDomain::Pixel).size() as usize],
            textures: vec![None; reflection.resource_slot_count()],
        }
    }

    fn domain_mut(&mut self, domain: ShaderDomain) -> &mut Vec<u8> {
        match domain {
            ShaderDomain::Vertex => &mut self.vertex,
            ShaderDomain::Pixel => &mut self.pixel,
        }
    }

    fn domain(&self, domain: ShaderDomain) -> &[u8] {
        match domain {
            ShaderDomain::Vertex => &self.vertex,
            ShaderDomain::Pixel => &self.pixel,
        }
    }

    /// Write `bytes` at the declaration's offset. `bytes` may cover only a prefix of an array.
    pub(crate) fn write(&mut self, decl: &UniformDeclaration, bytes: &[u8]) {
        let offset = decl.offset as usize;
        self.domain_mut(decl.domain)[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Bytes of the whole declaration.
    pub(crate) fn read(&self, decl: &UniformDeclaration) -> &[u8] {
        let offset = decl.offset as usize;
        &self.domain(decl.domain)[offset..offset + decl.size() as usize]
    }

    pub(crate) fn set_texture(&mut self, register: u32, texture: TextureRef) {
        let slot = register as usize;
        if self.textures.len() <= slot {
            self.textures.resize(slot + 1, None);
        }
        self.textures[slot] = Some(texture);
    }

    pub(crate) fn texture(&self, register: u32) -> Option<&TextureRef> {
        self.textures.get(register as usize).and_then(Option::as_ref)
    }

    /// Snapshot for one queued bind.
    pub(crate) fn binding(&self, shader: &Arc<Shader>) -> MaterialBinding {
        MaterialBinding {
            shader: Arc::clone(shader),
            vertex: self.vertex.clone(),
            pixel: self.pixel.clone(),
            textures: self.textures.clone(),
        }
    }
}

pub(crate) fn write_value<T: UniformData>(
    storage: &mut UniformStorage,
    decl: &UniformDeclaration,
    value: T,
) {
    storage.write(decl, bytemuck::bytes_of(&value.to_raw()));
}

pub(crate) fn read_value<T: UniformData>(storage: &UniformStorage, decl: &UniformDeclaration) -> T {
    T::from_raw(bytemuck::pod_read_unaligned(&storage.read(decl)[..T::size()]))
}

pub(crate) fn array_bytes<T: UniformData>(values: &[T]) -> Vec<u8> {
    let raw: Vec<T::Raw> = values.iter().map(|v| v.to_raw()).collect();
    bytemuck::cast_slice(&raw).to_vec()
}

/// Uniform values and textures captured by a material bind.
///
/// Applying it binds the program, uploads every reflected uniform from the
/// captured bytes and binds every occupied texture slot in register order.
#[derive(Debug)]
pub struct MaterialBinding {
    shader: Arc<Shader>,
    vertex: Vec<u8>,
    pixel: Vec<u8>,
    textures: Vec<Option<TextureRef>>,
}

impl MaterialBinding {
    pub(crate) fn apply(&self, ctx: &mut dyn GraphicsContext) {
        let reflection = self.shader.reflection();
        ctx.use_program(Some(self.shader.native_id()));
        self.shader
            .upload_buffer(ctx, reflection.buffer(ShaderDomain::Vertex), &self.vertex);
        self.shader
            .upload_buffer(ctx, reflection.buffer(ShaderDomain::Pixel), &self.pixel);
        for (slot, texture) in self.textures.iter().enumerate() {
            if let Some(texture) = texture {
                ctx.bind_texture(slot as u32, texture.native_id());
            }
        }
    }

    pub(crate) fn payload_size(&self) -> usize {
        self.vertex.len()
            + self.pixel.len()
            + self.textures.len() * size_of::<Option<TextureRef>>()
    }

    pub fn shader(&self) -> &Arc<Shader> {
        &self.shader
    }
}
