//! Per-use overlay over a base material

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::command::RenderCommand;
use crate::resources::TextureRef;
use crate::shader::{Shader, UniformDeclaration};

use super::material::{find_resource, Material, MaterialFlags};
use super::uniform::{read_value, resolve_uniform, write_value, UniformData, UniformStorage};

struct InstanceState {
    storage: UniformStorage,
    flags: MaterialFlags,
    overridden: HashSet<String>,
}

/// Material instance with its own copy of the base storage.
///
/// Values the instance sets are overrides. Everything else keeps following
/// the base material.
pub struct MaterialInstance {
    name: String,
    material: Arc<Material>,
    state: RwLock<InstanceState>,
}

impl MaterialInstance {
    pub fn new(material: &Arc<Material>, name: impl Into<String>) -> Arc<Self> {
        let instance = Arc::new(Self {
            name: name.into(),
            material: Arc::clone(material),
            state: RwLock::new(InstanceState {
                storage: material.storage_snapshot(),
                flags: material.flags(),
                overridden: HashSet::new(),
            }),
        });
        material.register_instance(&instance);
        instance
    }

    /// Override a value uniform. Unknown names and size mismatches are fatal.
    pub fn set<T: UniformData>(&self, name: &str, value: T) {
        let decl = resolve_uniform(self.shader().reflection(), &self.name, name, T::size());
        if decl.is_array() {
            crate::fatal!(
                "Uniform '{}' in material instance '{}' is an array",
                name,
                self.name
            );
        }
        let mut state = self.state.write();
        write_value(&mut state.storage, decl, value);
        state.overridden.insert(name.to_string());
    }

    /// Store a texture for the named resource. Unknown names are logged and ignored.
    pub fn set_texture(&self, name: &str, texture: impl Into<TextureRef>) {
        let Some(decl) = find_resource(self.shader(), name) else {
            log::warn!(
                "Cannot find material property '{}' on instance '{}'",
                name,
                self.name
            );
            return;
        };
        self.state
            .write()
            .storage
            .set_texture(decl.register, texture.into());
    }

    pub fn get<T: UniformData>(&self, name: &str) -> T {
        let decl = resolve_uniform(self.shader().reflection(), &self.name, name, T::size());
        read_value(&self.state.read().storage, decl)
    }

    /// Texture in the slot of `name`. A missing resource or empty slot is fatal.
    pub fn get_resource(&self, name: &str) -> TextureRef {
        match self.try_get_resource(name) {
            Some(texture) => texture,
            None => crate::fatal!(
                "Texture slot for '{}' in material instance '{}' is invalid",
                name,
                self.name
            ),
        }
    }

    pub fn try_get_resource(&self, name: &str) -> Option<TextureRef> {
        let decl = find_resource(self.shader(), name)?;
        self.state.read().storage.texture(decl.register).cloned()
    }

    pub fn is_overridden(&self, name: &str) -> bool {
        self.state.read().overridden.contains(name)
    }

    /// Queue one bind of the instance's current values.
    pub fn bind(&self) {
        let binding = self.state.read().storage.binding(self.shader());
        self.shader()
            .queue()
            .submit(RenderCommand::BindMaterial(binding));
    }

    pub fn flags(&self) -> MaterialFlags {
        self.state.read().flags
    }

    pub fn flag(&self, flag: MaterialFlags) -> bool {
        self.state.read().flags.contains(flag)
    }

    pub fn set_flag(&self, flag: MaterialFlags, value: bool) {
        self.state.write().flags.set(flag, value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn material(&self) -> &Arc<Material> {
        &self.material
    }

    pub fn shader(&self) -> &Arc<Shader> {
        self.material.shader()
    }

    pub(crate) fn on_material_value_updated(&self, decl: &UniformDeclaration, bytes: &[u8]) {
        let mut state = self.state.write();
        if state.overridden.contains(&decl.name) {
            return;
        }
        state.storage.write(decl, bytes);
    }
}

impl fmt::Debug for MaterialInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("MaterialInstance")
            .field("name", &self.name)
            .field("material", &self.material.name())
            .field("flags", &state.flags)
            .field("overridden", &state.overridden.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(MaterialInstance: Send, Sync);
