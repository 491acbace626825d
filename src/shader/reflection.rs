//! Uniform and resource layout of a shader program.
//!
//! The layout is produced by an external reflection step and handed to
//! [`Shader::new`](super::Shader::new). Offsets are assigned sequentially per
//! domain in declaration order, so the byte layout of a material's uniform
//! storage follows directly from the order the uniforms were declared in.

use std::sync::Arc;

/// Shader stage a uniform belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderDomain {
    Vertex,
    Pixel,
}

/// Declared type of a value uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Int,
    /// Stored as a 4-byte word
    Bool,
    Struct,
}

impl UniformType {
    /// Byte size of one element. Structs take their size from the struct declaration.
    pub fn size(&self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::Bool => 4,
            UniformType::Vec2 => 4 * 2,
            UniformType::Vec3 => 4 * 3,
            UniformType::Vec4 => 4 * 4,
            UniformType::Mat3 => 4 * 3 * 3,
            UniformType::Mat4 => 4 * 4 * 4,
            UniformType::Struct => 0,
        }
    }
}

/// One value uniform
#[derive(Debug, Clone, PartialEq)]
pub struct UniformDeclaration {
    pub name: String,
    pub ty: UniformType,
    /// Array length, 1 for plain uniforms
    pub count: u32,
    /// Byte offset inside the domain's storage (or inside the parent struct)
    pub offset: u32,
    pub domain: ShaderDomain,
    pub structure: Option<Arc<ShaderStruct>>,
}

impl UniformDeclaration {
    pub fn element_size(&self) -> u32 {
        match &self.structure {
            Some(structure) => structure.size(),
            None => self.ty.size(),
        }
    }

    pub fn size(&self) -> u32 {
        self.element_size() * self.count
    }

    pub fn is_array(&self) -> bool {
        self.count > 1
    }
}

/// Struct uniform layout, fields packed sequentially
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderStruct {
    name: String,
    fields: Vec<UniformDeclaration>,
    size: u32,
}

impl ShaderStruct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            size: 0,
        }
    }

    /// Append a field at the next free offset.
    pub fn with_field(mut self, name: impl Into<String>, ty: UniformType) -> Self {
        if ty == UniformType::Struct {
            crate::fatal!("Nested struct field in '{}' is not supported", self.name);
        }
        let field = UniformDeclaration {
            name: name.into(),
            ty,
            count: 1,
            offset: self.size,
            domain: ShaderDomain::Pixel,
            structure: None,
        };
        self.size += field.size();
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[UniformDeclaration] {
        &self.fields
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

/// Uniforms of one domain with their packed layout
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBufferDeclaration {
    domain: ShaderDomain,
    uniforms: Vec<UniformDeclaration>,
    size: u32,
}

impl UniformBufferDeclaration {
    pub fn new(domain: ShaderDomain) -> Self {
        Self {
            domain,
            uniforms: Vec::new(),
            size: 0,
        }
    }

    fn push(
        &mut self,
        name: String,
        ty: UniformType,
        count: u32,
        structure: Option<Arc<ShaderStruct>>,
    ) {
        let uniform = UniformDeclaration {
            name,
            ty,
            count: count.max(1),
            offset: self.size,
            domain: self.domain,
            structure,
        };
        self.size += uniform.size();
        self.uniforms.push(uniform);
    }

    pub fn domain(&self) -> ShaderDomain {
        self.domain
    }

    pub fn uniforms(&self) -> &[UniformDeclaration] {
        &self.uniforms
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn find(&self, name: &str) -> Option<&UniformDeclaration> {
        self.uniforms.iter().find(|u| u.name == name)
    }
}

/// Kind of texture a resource slot expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Texture2D,
    TextureCube,
}

/// Texture sampler declaration bound to a register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDeclaration {
    pub name: String,
    pub register: u32,
    pub count: u32,
    pub ty: ResourceType,
}

/// Reflected layout of one shader program
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderReflection {
    vertex: UniformBufferDeclaration,
    pixel: UniformBufferDeclaration,
    resources: Vec<ResourceDeclaration>,
}

impl Default for ShaderReflection {
    fn default() -> Self {
        Self {
            vertex: UniformBufferDeclaration::new(ShaderDomain::Vertex),
            pixel: UniformBufferDeclaration::new(ShaderDomain::Pixel),
            resources: Vec::new(),
        }
    }
}

impl ShaderReflection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a plain value uniform.
    pub fn with_uniform(self, domain: ShaderDomain, name: &str, ty: UniformType) -> Self {
        self.with_uniform_array(domain, name, ty, 1)
    }

    /// Declare an array uniform of `count` elements.
    pub fn with_uniform_array(
        mut self,
        domain: ShaderDomain,
        name: &str,
        ty: UniformType,
        count: u32,
    ) -> Self {
        if ty == UniformType::Struct {
            crate::fatal!("Struct uniform '{}' needs a struct declaration", name);
        }
        self.buffer_mut(domain)
            .push(name.to_string(), ty, count, None);
        self
    }

    /// Declare a struct uniform.
    pub fn with_struct(
        mut self,
        domain: ShaderDomain,
        name: &str,
        structure: Arc<ShaderStruct>,
    ) -> Self {
        self.buffer_mut(domain)
            .push(name.to_string(), UniformType::Struct, 1, Some(structure));
        self
    }

    /// Declare a texture resource on the next free register.
    pub fn with_resource(mut self, name: &str, ty: ResourceType) -> Self {
        let register = self.resources.iter().map(|r| r.register + r.count).max().unwrap_or(0);
        self.resources.push(ResourceDeclaration {
            name: name.to_string(),
            register,
            count: 1,
            ty,
        });
        self
    }

    fn buffer_mut(&mut self, domain: ShaderDomain) -> &mut UniformBufferDeclaration {
        match domain {
            ShaderDomain::Vertex => &mut self.vertex,
            ShaderDomain::Pixel => &mut self.pixel,
        }
    }

    pub fn buffer(&self, domain: ShaderDomain) -> &UniformBufferDeclaration {
        match domain {
            ShaderDomain::Vertex => &self.vertex,
            ShaderDomain::Pixel => &self.pixel,
        }
    }

    /// Both domain buffers, vertex first.
    pub fn buffers(&self) -> [&UniformBufferDeclaration; 2] {
        [&self.vertex, &self.pixel]
    }

    pub fn uniforms(&self) -> impl Iterator<Item = &UniformDeclaration> {
        self.vertex.uniforms.iter().chain(self.pixel.uniforms.iter())
    }

    /// Look a uniform up by name, vertex domain first.
    pub fn find_uniform(&self, name: &str) -> Option<&UniformDeclaration> {
        self.vertex.find(name).or_else(|| self.pixel.find(name))
    }

    pub fn resources(&self) -> &[ResourceDeclaration] {
        &self.resources
    }

    pub fn find_resource(&self, name: &str) -> Option<&ResourceDeclaration> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Slots needed to hold every declared resource.
    pub fn resource_slot_count(&self) -> usize {
        self.resources
            .iter()
            .map(|r| (r.register + r.count) as usize)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_sequential_per_domain() {
        let reflection = ShaderReflection::new()
            .with_uniform(ShaderDomain::Vertex, "u_ViewProjection", UniformType::Mat4)
            .with_uniform(ShaderDomain::Pixel, "u_Albedo", UniformType::Vec3)
            .with_uniform(ShaderDomain::Pixel, "u_Metalness", UniformType::Float)
            .with_uniform(ShaderDomain::Vertex, "u_Transform", UniformType::Mat4);

        assert_eq!(reflection.buffer(ShaderDomain::Vertex).size(), 128);
        assert_eq!(reflection.find_uniform("u_Transform").unwrap().offset, 64);
        assert_eq!(reflection.find_uniform("u_Metalness").unwrap().offset, 12);
        assert_eq!(reflection.buffer(ShaderDomain::Pixel).size(), 16);
    }

    #[test]
    fn test_struct_layout() {
        let light = Arc::new(
            ShaderStruct::new("Light")
                .with_field("Position", UniformType::Vec3)
                .with_field("Radiance", UniformType::Vec3)
                .with_field("Multiplier", UniformType::Float),
        );
        assert_eq!(light.size(), 28);
        assert_eq!(light.fields()[2].offset, 24);

        let reflection =
            ShaderReflection::new().with_struct(ShaderDomain::Pixel, "u_Lights", light);
        assert_eq!(reflection.find_uniform("u_Lights").unwrap().size(), 28);
    }

    #[test]
    fn test_resource_registers() {
        let reflection = ShaderReflection::new()
            .with_resource("u_AlbedoTexture", ResourceType::Texture2D)
            .with_resource("u_EnvRadianceTex", ResourceType::TextureCube);

        assert_eq!(reflection.find_resource("u_AlbedoTexture").unwrap().register, 0);
        assert_eq!(reflection.find_resource("u_EnvRadianceTex").unwrap().register, 1);
        assert_eq!(reflection.resource_slot_count(), 2);
    }
}
