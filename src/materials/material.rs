//! Base material: uniform values and textures for one shader

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::command::RenderCommand;
use crate::resources::TextureRef;
use crate::shader::{ResourceDeclaration, Shader, UniformDeclaration};

use super::instance::MaterialInstance;
use super::uniform::{
    array_bytes, read_value, resolve_uniform, write_value, UniformData, UniformStorage,
};

bitflags::bitflags! {
    /// Fixed-function state applied around every draw with a material.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MaterialFlags: u32 {
        const DEPTH_TEST = 1 << 1;
        const BLEND = 1 << 2;
        const TWO_SIDED = 1 << 3;
    }
}

impl Default for MaterialFlags {
    fn default() -> Self {
        MaterialFlags::DEPTH_TEST | MaterialFlags::BLEND
    }
}

pub(crate) fn find_resource<'a>(
    shader: &'a Shader,
    name: &str,
) -> Option<&'a ResourceDeclaration> {
    shader.reflection().find_resource(name)
}

/// Shared base material.
///
/// Values written here are mirrored into every live [`MaterialInstance`]
/// that has not overridden them.
pub struct Material {
    name: String,
    shader: Arc<Shader>,
    storage: RwLock<UniformStorage>,
    flags: RwLock<MaterialFlags>,
    instances: RwLock<Vec<Weak<MaterialInstance>>>,
}

impl Material {
    pub fn new(shader: &Arc<Shader>, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            shader: Arc::clone(shader),
            storage: RwLock::new(UniformStorage::new(shader.reflection())),
            flags: RwLock::new(MaterialFlags::default()),
            instances: RwLock::new(Vec::new()),
        })
    }

    /// Write a value uniform. Unknown names and size mismatches are fatal.
    pub fn set<T: UniformData>(&self, name: &str, value: T) {
        let decl = resolve_uniform(self.shader.reflection(), &self.name, name, T::size());
        if decl.is_array() {
            crate::fatal!(
                "Uniform '{}' in material '{}' is an array, use set_array",
                name,
                self.name
            );
        }
        write_value(&mut self.storage.write(), decl, value);
        self.notify_instances(decl);
    }

    /// Write the leading elements of an array uniform. An empty slice is a no-op.
    pub fn set_array<T: UniformData>(&self, name: &str, values: &[T]) {
        if values.is_empty() {
            return;
        }
        let decl = resolve_uniform(self.shader.reflection(), &self.name, name, T::size());
        if values.len() > decl.count as usize {
            crate::fatal!(
                "Uniform '{}' in material '{}' holds {} elements, got {}",
                name,
                self.name,
                decl.count,
                values.len()
            );
        }
        self.storage.write().write(decl, &array_bytes(values));
        self.notify_instances(decl);
    }

    /// Store a texture in the slot of the named resource. Unknown names are fatal.
    pub fn set_texture(&self, name: &str, texture: impl Into<TextureRef>) {
        let Some(decl) = find_resource(&self.shader, name) else {
            crate::fatal!(
                "Could not find resource '{}' in material '{}'",
                name,
                self.name
            );
        };
        self.storage.write().set_texture(decl.register, texture.into());
    }

    pub fn get<T: UniformData>(&self, name: &str) -> T {
        let decl = resolve_uniform(self.shader.reflection(), &self.name, name, T::size());
        read_value(&self.storage.read(), decl)
    }

    /// Texture in the slot of `name`. A missing resource or empty slot is fatal.
    pub fn get_resource(&self, name: &str) -> TextureRef {
        match self.try_get_resource(name) {
            Some(texture) => texture,
            None => crate::fatal!(
                "Texture slot for '{}' in material '{}' is invalid",
                name,
                self.name
            ),
        }
    }

    pub fn try_get_resource(&self, name: &str) -> Option<TextureRef> {
        let decl = find_resource(&self.shader, name)?;
        self.storage.read().texture(decl.register).cloned()
    }

    /// Queue one command that binds the program, uploads every uniform and binds the textures.
    pub fn bind(&self) {
        let binding = self.storage.read().binding(&self.shader);
        self.shader
            .queue()
            .submit(RenderCommand::BindMaterial(binding));
    }

    pub fn flags(&self) -> MaterialFlags {
        *self.flags.read()
    }

    pub fn flag(&self, flag: MaterialFlags) -> bool {
        self.flags.read().contains(flag)
    }

    pub fn set_flag(&self, flag: MaterialFlags, value: bool) {
        self.flags.write().set(flag, value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shader(&self) -> &Arc<Shader> {
        &self.shader
    }

    pub(crate) fn storage_snapshot(&self) -> UniformStorage {
        self.storage.read().clone()
    }

    pub(crate) fn register_instance(&self, instance: &Arc<MaterialInstance>) {
        let mut instances = self.instances.write();
        instances.retain(|w| w.strong_count() > 0);
        instances.push(Arc::downgrade(instance));
    }

    /// Number of instances still alive.
    pub fn instance_count(&self) -> usize {
        self.instances
            .read()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    fn notify_instances(&self, decl: &UniformDeclaration) {
        let instances: Vec<Arc<MaterialInstance>> = self
            .instances
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        if instances.is_empty() {
            return;
        }
        let bytes = self.storage.read().read(decl).to_vec();
        for instance in instances {
            instance.on_material_value_updated(decl, &bytes);
        }
    }
}

impl fmt::Debug for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Material")
            .field("name", &self.name)
            .field("shader", &self.shader.name())
            .field("flags", &self.flags())
            .field("instances", &self.instance_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(Material: Send, Sync);
