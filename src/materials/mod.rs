//! Material system
//!
//! A [`Material`] holds packed uniform bytes laid out by its shader's
//! reflected declarations plus textures indexed by register. A
//! [`MaterialInstance`] overlays a base material and tracks which values it
//! overrides. Binding either one captures its current values into a single
//! queued [`MaterialBinding`].

mod instance;
mod material;
mod uniform;

pub use instance::MaterialInstance;
pub use material::{Material, MaterialFlags};
pub use uniform::{MaterialBinding, UniformData};

use std::sync::Arc;

/// Either a base material or an instance, as accepted by the submission API.
#[derive(Debug, Clone)]
pub enum MaterialRef {
    Material(Arc<Material>),
    Instance(Arc<MaterialInstance>),
}

impl MaterialRef {
    pub fn bind(&self) {
        match self {
            MaterialRef::Material(material) => material.bind(),
            MaterialRef::Instance(instance) => instance.bind(),
        }
    }

    pub fn flags(&self) -> MaterialFlags {
        match self {
            MaterialRef::Material(material) => material.flags(),
            MaterialRef::Instance(instance) => instance.flags(),
        }
    }

    pub fn flag(&self, flag: MaterialFlags) -> bool {
        self.flags().contains(flag)
    }

    pub fn shader(&self) -> &Arc<crate::shader::Shader> {
        match self {
            MaterialRef::Material(material) => material.shader(),
            MaterialRef::Instance(instance) => instance.shader(),
        }
    }
}

impl From<Arc<Material>> for MaterialRef {
    fn from(material: Arc<Material>) -> Self {
        MaterialRef::Material(material)
    }
}

impl From<Arc<MaterialInstance>> for MaterialRef {
    fn from(instance: Arc<MaterialInstance>) -> Self {
        MaterialRef::Instance(instance)
    }
}
