//! Mesh data handed over by asset import, and the GPU mesh built from it

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use crate::command::RenderQueue;
use crate::materials::{Material, MaterialFlags, MaterialInstance, UniformData};
use crate::shader::Shader;

use super::{
    BufferElement, BufferLayout, IndexBuffer, Pipeline, PipelineSpec, ShaderDataType, Texture2D,
    VertexBuffer,
};

/// Static mesh vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub binormal: Vec3,
    pub texcoord: Vec2,
}

impl Vertex {
    pub fn layout() -> BufferLayout {
        BufferLayout::new(vec![
            BufferElement::new(ShaderDataType::Float3, "a_Position"),
            BufferElement::new(ShaderDataType::Float3, "a_Normal"),
            BufferElement::new(ShaderDataType::Float3, "a_Tangent"),
            BufferElement::new(ShaderDataType::Float3, "a_Binormal"),
            BufferElement::new(ShaderDataType::Float2, "a_TexCoord"),
        ])
    }
}

static_assertions::const_assert_eq!(std::mem::size_of::<Vertex>(), 56);

/// Contiguous vertex/index range drawn with one material
#[derive(Debug, Clone, PartialEq)]
pub struct Submesh {
    pub base_vertex: u32,
    pub base_index: u32,
    pub index_count: u32,
    pub vertex_count: u32,
    pub material_index: u32,
    /// Transform relative to the mesh root
    pub transform: Mat4,
    pub name: String,
}

/// Material properties as read by asset import
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedMaterial {
    pub name: String,
    pub albedo_color: Vec3,
    pub metalness: f32,
    pub roughness: f32,
    pub albedo_map: Option<PathBuf>,
    pub normal_map: Option<PathBuf>,
    pub roughness_map: Option<PathBuf>,
    pub metalness_map: Option<PathBuf>,
}

impl Default for ImportedMaterial {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            albedo_color: Vec3::ONE,
            metalness: 0.0,
            // shininess 80
            roughness: 1.0 - (0.8f32).sqrt(),
            albedo_map: None,
            normal_map: None,
            roughness_map: None,
            metalness_map: None,
        }
    }
}

/// Fully imported mesh: geometry, submeshes and materials
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub name: String,
    /// File the mesh came from; relative texture maps resolve against its directory.
    pub source_path: Option<PathBuf>,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<Submesh>,
    pub materials: Vec<ImportedMaterial>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Wrap the whole geometry in one submesh using material 0.
    fn single_submesh(name: &str, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let submesh = Submesh {
            base_vertex: 0,
            base_index: 0,
            index_count: indices.len() as u32,
            vertex_count: vertices.len() as u32,
            material_index: 0,
            transform: Mat4::IDENTITY,
            name: name.to_string(),
        };
        Self {
            name: name.to_string(),
            source_path: None,
            vertices,
            indices,
            submeshes: vec![submesh],
            materials: vec![ImportedMaterial::default()],
        }
    }

    /// Unit cube centered at origin
    pub fn cube() -> Self {
        let faces = [
            (Vec3::Z, Vec3::X),
            (-Vec3::Z, -Vec3::X),
            (Vec3::X, -Vec3::Z),
            (-Vec3::X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (-Vec3::Y, Vec3::X),
        ];
        let corners = [
            (Vec2::new(-0.5, -0.5), Vec2::new(0.0, 1.0)),
            (Vec2::new(0.5, -0.5), Vec2::new(1.0, 1.0)),
            (Vec2::new(0.5, 0.5), Vec2::new(1.0, 0.0)),
            (Vec2::new(-0.5, 0.5), Vec2::new(0.0, 0.0)),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (face, (normal, tangent)) in faces.into_iter().enumerate() {
            let binormal = normal.cross(tangent);
            for (corner, texcoord) in corners {
                vertices.push(Vertex {
                    position: normal * 0.5 + tangent * corner.x + binormal * corner.y,
                    normal,
                    tangent,
                    binormal,
                    texcoord,
                });
            }
            let base = face as u32 * 4;
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::single_submesh("cube", vertices, indices)
    }

    /// Plane on the XZ axis
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let subdivisions = subdivisions.max(1);
        let half_width = width / 2.0;
        let half_depth = depth / 2.0;
        let step_x = width / subdivisions as f32;
        let step_z = depth / subdivisions as f32;

        let mut vertices = Vec::new();
        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                vertices.push(Vertex {
                    position: Vec3::new(
                        -half_width + x as f32 * step_x,
                        0.0,
                        -half_depth + z as f32 * step_z,
                    ),
                    normal: Vec3::Y,
                    tangent: Vec3::X,
                    binormal: Vec3::Z,
                    texcoord: Vec2::new(
                        x as f32 / subdivisions as f32,
                        z as f32 / subdivisions as f32,
                    ),
                });
            }
        }

        let mut indices = Vec::new();
        for z in 0..subdivisions {
            for x in 0..subdivisions {
                let current = z * (subdivisions + 1) + x;
                let next = current + subdivisions + 1;
                indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }

        Self::single_submesh("plane", vertices, indices)
    }

    fn validate(&self) {
        let material_count = self.materials.len().max(1);
        for submesh in &self.submeshes {
            if submesh.material_index as usize >= material_count {
                crate::fatal!(
                    "Submesh '{}' of mesh '{}' uses material {} but only {} exist",
                    submesh.name,
                    self.name,
                    submesh.material_index,
                    material_count
                );
            }
            let vertex_end = u64::from(submesh.base_vertex) + u64::from(submesh.vertex_count);
            if vertex_end > self.vertices.len() as u64 {
                crate::fatal!(
                    "Submesh '{}' of mesh '{}' reads past the {} vertices",
                    submesh.name,
                    self.name,
                    self.vertices.len()
                );
            }
            let index_end = u64::from(submesh.base_index) + u64::from(submesh.index_count);
            if index_end > self.indices.len() as u64 {
                crate::fatal!(
                    "Submesh '{}' of mesh '{}' reads past the {} indices",
                    submesh.name,
                    self.name,
                    self.indices.len()
                );
            }
        }
    }

    fn resolve_map(&self, map: &Path) -> PathBuf {
        match self.source_path.as_deref().and_then(Path::parent) {
            Some(dir) if map.is_relative() => dir.join(map),
            _ => map.to_path_buf(),
        }
    }
}

/// GPU mesh: buffers, vertex layout, submeshes and materials
pub struct Mesh {
    name: String,
    source_path: Option<PathBuf>,
    vertex_buffer: Arc<VertexBuffer>,
    index_buffer: Arc<IndexBuffer>,
    pipeline: Arc<Pipeline>,
    submeshes: Vec<Submesh>,
    base_material: Arc<Material>,
    materials: Vec<Arc<MaterialInstance>>,
}

impl Mesh {
    /// Upload imported data and build one material instance per imported material.
    pub fn new(queue: &Arc<RenderQueue>, data: MeshData, shader: &Arc<Shader>) -> Arc<Self> {
        data.validate();

        let base_material = Material::new(shader, format!("{}-base", data.name));
        let mut materials: Vec<_> = data
            .materials
            .iter()
            .map(|imported| create_material_instance(queue, &data, &base_material, imported))
            .collect();
        if materials.is_empty() {
            materials.push(MaterialInstance::new(&base_material, "default"));
        }

        let layout = Vertex::layout();
        let vertex_buffer = VertexBuffer::new(queue, bytemuck::cast_slice(&data.vertices), layout.clone());
        let pipeline = Pipeline::new(
            queue,
            PipelineSpec {
                shader: Some(Arc::clone(shader)),
                layout,
            },
        );
        let index_buffer = IndexBuffer::new(queue, &data.indices);

        log::debug!(
            "Created mesh '{}' ({} vertices, {} submeshes, {} materials)",
            data.name,
            data.vertices.len(),
            data.submeshes.len(),
            materials.len()
        );

        Arc::new(Self {
            name: data.name,
            source_path: data.source_path,
            vertex_buffer,
            index_buffer,
            pipeline,
            submeshes: data.submeshes,
            base_material,
            materials,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn vertex_buffer(&self) -> &Arc<VertexBuffer> {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &Arc<IndexBuffer> {
        &self.index_buffer
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn submeshes(&self) -> &[Submesh] {
        &self.submeshes
    }

    pub fn base_material(&self) -> &Arc<Material> {
        &self.base_material
    }

    pub fn materials(&self) -> &[Arc<MaterialInstance>] {
        &self.materials
    }

    pub fn shader(&self) -> &Arc<Shader> {
        self.base_material.shader()
    }
}

impl fmt::Debug for Mesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mesh")
            .field("name", &self.name)
            .field("submeshes", &self.submeshes.len())
            .field("materials", &self.materials.len())
            .finish()
    }
}

/// Set `name` only when the mesh shader declares it.
fn set_if_declared<T: UniformData>(instance: &MaterialInstance, name: &str, value: T) {
    if instance.shader().reflection().find_uniform(name).is_some() {
        instance.set(name, value);
    }
}

/// Load an optional map. A map that loads is bound with its toggle at 1.0;
/// otherwise the toggle is 0.0 and the caller writes the scalar fallback.
fn apply_map(
    queue: &Arc<RenderQueue>,
    data: &MeshData,
    instance: &MaterialInstance,
    map: Option<&PathBuf>,
    texture_name: &str,
    toggle_name: &str,
) -> bool {
    let texture = map.map(|path| Texture2D::load(queue, data.resolve_map(path)));
    match texture {
        Some(texture) if texture.loaded() => {
            instance.set_texture(texture_name, texture);
            set_if_declared(instance, toggle_name, 1.0f32);
            true
        }
        _ => {
            if let Some(path) = map {
                log::warn!("Could not load texture map {}", path.display());
            }
            set_if_declared(instance, toggle_name, 0.0f32);
            false
        }
    }
}

fn create_material_instance(
    queue: &Arc<RenderQueue>,
    data: &MeshData,
    base: &Arc<Material>,
    imported: &ImportedMaterial,
) -> Arc<MaterialInstance> {
    let instance = MaterialInstance::new(base, imported.name.clone());
    instance.set_flag(MaterialFlags::TWO_SIDED, false);

    let maps = [
        (&imported.albedo_map, "u_AlbedoTexture", "u_AlbedoTexToggle"),
        (&imported.normal_map, "u_NormalTexture", "u_NormalTexToggle"),
        (&imported.roughness_map, "u_RoughnessTexture", "u_RoughnessTexToggle"),
        (&imported.metalness_map, "u_MetalnessTexture", "u_MetalnessTexToggle"),
    ];
    let [albedo, _, roughness, metalness] =
        maps.map(|(map, texture, toggle)| apply_map(queue, data, &instance, map.as_ref(), texture, toggle));

    if !albedo {
        set_if_declared(&instance, "u_AlbedoColor", imported.albedo_color);
    }
    if !roughness {
        set_if_declared(&instance, "u_Roughness", imported.roughness);
    }
    if !metalness {
        set_if_declared(&instance, "u_Metalness", imported.metalness);
    }
    instance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ContextCall, HeadlessContext, ShaderStages};
    use crate::command::DEFAULT_COMMAND_BUFFER_CAPACITY;
    use crate::shader::{ResourceType, ShaderDomain, ShaderReflection, UniformType};

    fn pbr_shader(queue: &Arc<RenderQueue>) -> Arc<Shader> {
        let reflection = ShaderReflection::new()
            .with_uniform(ShaderDomain::Vertex, "u_Transform", UniformType::Mat4)
            .with_uniform(ShaderDomain::Pixel, "u_AlbedoColor", UniformType::Vec3)
            .with_uniform(ShaderDomain::Pixel, "u_AlbedoTexToggle", UniformType::Float)
            .with_uniform(ShaderDomain::Pixel, "u_Metalness", UniformType::Float)
            .with_resource("u_AlbedoTexture", ResourceType::Texture2D);
        Shader::new(
            queue,
            "pbr",
            ShaderStages::Graphics {
                vertex: String::new(),
                fragment: String::new(),
            },
            reflection,
        )
    }

    #[test]
    fn test_cube_geometry() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cube.submeshes[0].index_count, 36);
        assert!(cube.vertices.iter().all(|v| v.position.abs().max_element() == 0.5));
    }

    #[test]
    fn test_plane_geometry() {
        let plane = MeshData::plane(2.0, 2.0, 2);
        assert_eq!(plane.vertex_count(), 9);
        assert_eq!(plane.index_count(), 24);
    }

    #[test]
    fn test_missing_albedo_map_falls_back_to_color() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let shader = pbr_shader(&queue);
        let mut data = MeshData::cube();
        data.source_path = Some(PathBuf::from("assets/meshes/cube.fbx"));
        data.materials[0].albedo_color = Vec3::new(0.2, 0.4, 0.6);
        data.materials[0].albedo_map = Some(PathBuf::from("missing_albedo.png"));

        let mesh = Mesh::new(&queue, data, &shader);
        let instance = &mesh.materials()[0];
        assert_eq!(instance.get::<f32>("u_AlbedoTexToggle"), 0.0);
        assert_eq!(instance.get::<Vec3>("u_AlbedoColor"), Vec3::new(0.2, 0.4, 0.6));
        assert!(instance.try_get_resource("u_AlbedoTexture").is_none());
        assert!(!instance.flag(MaterialFlags::TWO_SIDED));
    }

    #[test]
    fn test_loaded_albedo_map_sets_toggle() {
        let dir = std::env::temp_dir().join("queued_renderer_mesh_maps");
        std::fs::create_dir_all(&dir).unwrap();
        image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]))
            .save(dir.join("albedo.png"))
            .unwrap();

        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let shader = pbr_shader(&queue);
        let mut data = MeshData::cube();
        data.source_path = Some(dir.join("cube.obj"));
        data.materials[0].albedo_map = Some(PathBuf::from("albedo.png"));

        let mesh = Mesh::new(&queue, data, &shader);
        let instance = &mesh.materials()[0];
        assert_eq!(instance.get::<f32>("u_AlbedoTexToggle"), 1.0);
        assert!(instance.try_get_resource("u_AlbedoTexture").is_some());
    }

    #[test]
    fn test_mesh_creation_is_deferred() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let shader = pbr_shader(&queue);
        let mesh = Mesh::new(&queue, MeshData::plane(1.0, 1.0, 1), &shader);
        assert!(mesh.vertex_buffer().id().is_none());

        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        assert!(mesh.index_buffer().id().is_some());
        assert!(ctx.calls().contains(&ContextCall::CreateVertexArray {
            id: mesh.pipeline().id().unwrap(),
            stride: 56,
        }));
    }

    #[test]
    #[should_panic(expected = "uses material 3")]
    fn test_invalid_material_index_is_fatal() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let shader = pbr_shader(&queue);
        let mut data = MeshData::cube();
        data.submeshes[0].material_index = 3;
        Mesh::new(&queue, data, &shader);
    }

    #[test]
    #[should_panic(expected = "reads past the 24 vertices")]
    fn test_vertex_range_past_end_is_fatal() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let shader = pbr_shader(&queue);
        let mut data = MeshData::cube();
        data.submeshes[0].base_vertex = 4;
        Mesh::new(&queue, data, &shader);
    }

    #[test]
    #[should_panic(expected = "reads past the 24 vertices")]
    fn test_vertex_range_wrapping_u32_is_fatal() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let shader = pbr_shader(&queue);
        let mut data = MeshData::cube();
        data.submeshes[0].base_vertex = u32::MAX;
        data.submeshes[0].vertex_count = 2;
        Mesh::new(&queue, data, &shader);
    }

    #[test]
    #[should_panic(expected = "reads past the 36 indices")]
    fn test_index_range_wrapping_u32_is_fatal() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let shader = pbr_shader(&queue);
        let mut data = MeshData::cube();
        data.submeshes[0].base_index = u32::MAX - 10;
        Mesh::new(&queue, data, &shader);
    }
}
