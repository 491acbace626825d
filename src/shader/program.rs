//! Shader program handle

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use parking_lot::RwLock;

use crate::backend::{
    BackendError, BackendResult, GraphicsContext, ProgramId, ShaderStages, UniformValue,
    INVALID_LOCATION,
};
use crate::command::{RenderCommand, RenderQueue};
use crate::error::{RenderError, RenderResult};
use crate::resources::NativeSlot;

use super::{ShaderReflection, UniformBufferDeclaration, UniformDeclaration, UniformType};

/// Shared shader program handle.
///
/// Compilation is deferred to the queue. The compile command also resolves
/// the location of every reflected uniform and resource, so later binds only
/// upload values.
pub struct Shader {
    name: String,
    stages: ShaderStages,
    reflection: ShaderReflection,
    locations: RwLock<HashMap<String, i32>>,
    id: NativeSlot<ProgramId>,
    queue: Arc<RenderQueue>,
}

impl Shader {
    pub fn new(
        queue: &Arc<RenderQueue>,
        name: impl Into<String>,
        stages: ShaderStages,
        reflection: ShaderReflection,
    ) -> Arc<Self> {
        let shader = Arc::new(Self {
            name: name.into(),
            stages,
            reflection,
            locations: RwLock::new(HashMap::new()),
            id: NativeSlot::empty(),
            queue: Arc::clone(queue),
        });
        log::debug!("Queueing compilation of shader '{}'", shader.name);
        queue.submit(RenderCommand::CompileShader(Arc::clone(&shader)));
        shader
    }

    /// Load a single-file shader whose stages are separated by `#type` markers.
    /// The shader is named after the file stem.
    pub fn from_file<P: AsRef<Path>>(
        queue: &Arc<RenderQueue>,
        path: P,
        reflection: ShaderReflection,
    ) -> RenderResult<Arc<Self>> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| RenderError::ShaderSource {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unnamed")
            .to_string();
        let stages = parse_stages(&name, &source)?;
        Ok(Self::new(queue, name, stages, reflection))
    }

    /// Queue a recompile, e.g. after the source file changed on disk.
    pub fn reload(self: &Arc<Self>) {
        self.queue
            .submit(RenderCommand::CompileShader(Arc::clone(self)));
    }

    /// A compile or link failure is fatal: the reflected contract no longer
    /// matches any program on the GPU.
    pub(crate) fn compile(&self, ctx: &mut dyn GraphicsContext) -> BackendResult<()> {
        let id = match ctx.create_program(&self.name, &self.stages) {
            Ok(id) => id,
            Err(
                err @ (BackendError::ShaderCompilationFailed { .. }
                | BackendError::ShaderLinkFailed { .. }),
            ) => crate::fatal!("Shader '{}' failed to build: {}", self.name, err),
            Err(err) => return Err(err),
        };
        if let Some(old) = self.id.replace(id) {
            ctx.delete_program(old);
        }

        let mut locations = HashMap::new();
        for uniform in self.reflection.uniforms() {
            for name in uniform_location_names(uniform) {
                let location = ctx.uniform_location(id, &name);
                locations.insert(name, location);
            }
        }

        let resources = self.reflection.resources();
        if !resources.is_empty() {
            // samplers read from the texture unit matching their register
            ctx.use_program(Some(id));
            for resource in resources {
                let location = ctx.uniform_location(id, &resource.name);
                if location != INVALID_LOCATION {
                    ctx.upload_uniform(location, &UniformValue::Int(resource.register as i32));
                }
                locations.insert(resource.name.clone(), location);
            }
        }

        log::trace!(
            "Compiled shader '{}' ({} locations)",
            self.name,
            locations.len()
        );
        *self.locations.write() = locations;
        Ok(())
    }

    /// Queue a program bind.
    pub fn bind(self: &Arc<Self>) {
        self.queue.submit(RenderCommand::UseProgram(Arc::clone(self)));
    }

    /// Queue a single uniform upload. The program must be bound by then.
    pub fn set_uniform(self: &Arc<Self>, name: &str, value: UniformValue) {
        self.queue.submit(RenderCommand::SetUniform {
            shader: Arc::clone(self),
            name: name.to_string(),
            value,
        });
    }

    /// Resolved location of `name`. Names outside the reflected layout are
    /// resolved on first use and cached.
    pub(crate) fn location(&self, ctx: &mut dyn GraphicsContext, name: &str) -> i32 {
        if let Some(location) = self.locations.read().get(name) {
            return *location;
        }
        let location = ctx.uniform_location(self.native_id(), name);
        self.locations.write().insert(name.to_string(), location);
        location
    }

    pub(crate) fn upload_named(
        &self,
        ctx: &mut dyn GraphicsContext,
        name: &str,
        value: &UniformValue,
    ) {
        let location = self.location(ctx, name);
        if location == INVALID_LOCATION {
            log::trace!("Shader '{}' has no active uniform '{}'", self.name, name);
            return;
        }
        ctx.upload_uniform(location, value);
    }

    /// Upload every uniform of a domain buffer from its packed bytes.
    pub(crate) fn upload_buffer(
        &self,
        ctx: &mut dyn GraphicsContext,
        buffer: &UniformBufferDeclaration,
        bytes: &[u8],
    ) {
        for uniform in buffer.uniforms() {
            let offset = uniform.offset as usize;
            let data = &bytes[offset..offset + uniform.size() as usize];
            self.upload_declared(ctx, uniform, data);
        }
    }

    fn upload_declared(
        &self,
        ctx: &mut dyn GraphicsContext,
        uniform: &UniformDeclaration,
        data: &[u8],
    ) {
        if let Some(structure) = &uniform.structure {
            for field in structure.fields() {
                let start = field.offset as usize;
                let value = read_uniform(field.ty, &data[start..start + field.size() as usize]);
                self.upload_named(ctx, &format!("{}.{}", uniform.name, field.name), &value);
            }
            return;
        }

        if !uniform.is_array() {
            self.upload_named(ctx, &uniform.name, &read_uniform(uniform.ty, data));
            return;
        }

        let element_size = uniform.element_size() as usize;
        if uniform.ty == UniformType::Mat4 {
            let matrices = data
                .chunks_exact(element_size)
                .map(|chunk| Mat4::from_cols_array(&bytemuck::pod_read_unaligned(chunk)))
                .collect();
            self.upload_named(ctx, &uniform.name, &UniformValue::Mat4Array(matrices));
        } else {
            for (index, chunk) in data.chunks_exact(element_size).enumerate() {
                let value = read_uniform(uniform.ty, chunk);
                self.upload_named(ctx, &format!("{}[{}]", uniform.name, index), &value);
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &ShaderStages {
        &self.stages
    }

    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    pub fn id(&self) -> Option<ProgramId> {
        self.id.get()
    }

    pub(crate) fn queue(&self) -> &Arc<RenderQueue> {
        &self.queue
    }

    pub(crate) fn native_id(&self) -> ProgramId {
        self.id.expect("shader")
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        if let Some(id) = self.id.take_mut() {
            self.queue.submit(RenderCommand::DeleteProgram(id));
        }
    }
}

impl fmt::Debug for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("name", &self.name)
            .field("compute", &self.stages.is_compute())
            .field("id", &self.id)
            .finish()
    }
}

static_assertions::assert_impl_all!(Shader: Send, Sync);

/// Every location name a declaration resolves to.
fn uniform_location_names(uniform: &UniformDeclaration) -> Vec<String> {
    match &uniform.structure {
        Some(structure) => structure
            .fields()
            .iter()
            .map(|field| format!("{}.{}", uniform.name, field.name))
            .collect(),
        None if uniform.is_array() && uniform.ty != UniformType::Mat4 => (0..uniform.count)
            .map(|index| format!("{}[{}]", uniform.name, index))
            .collect(),
        None => vec![uniform.name.clone()],
    }
}

/// Decode one element of `ty` from packed uniform bytes.
pub(crate) fn read_uniform(ty: UniformType, data: &[u8]) -> UniformValue {
    let size = ty.size() as usize;
    let data = &data[..size];
    match ty {
        UniformType::Float => UniformValue::Float(bytemuck::pod_read_unaligned(data)),
        UniformType::Vec2 => {
            UniformValue::Vec2(Vec2::from_array(bytemuck::pod_read_unaligned::<[f32; 2]>(data)))
        }
        UniformType::Vec3 => {
            UniformValue::Vec3(Vec3::from_array(bytemuck::pod_read_unaligned::<[f32; 3]>(data)))
        }
        UniformType::Vec4 => {
            UniformValue::Vec4(Vec4::from_array(bytemuck::pod_read_unaligned::<[f32; 4]>(data)))
        }
        UniformType::Mat3 => UniformValue::Mat3(Mat3::from_cols_array(
            &bytemuck::pod_read_unaligned::<[f32; 9]>(data),
        )),
        UniformType::Mat4 => UniformValue::Mat4(Mat4::from_cols_array(
            &bytemuck::pod_read_unaligned::<[f32; 16]>(data),
        )),
        UniformType::Int => UniformValue::Int(bytemuck::pod_read_unaligned(data)),
        UniformType::Bool => UniformValue::Bool(bytemuck::pod_read_unaligned::<u32>(data) != 0),
        UniformType::Struct => crate::fatal!("Struct uniforms are uploaded per field"),
    }
}

/// Split a single-file source on `#type <stage>` lines.
pub fn parse_stages(name: &str, source: &str) -> RenderResult<ShaderStages> {
    const MARKER: &str = "#type";

    let mut sections: Vec<(String, String)> = Vec::new();
    for line in source.lines() {
        if let Some(stage) = line.trim_start().strip_prefix(MARKER) {
            sections.push((stage.trim().to_lowercase(), String::new()));
        } else if let Some((_, body)) = sections.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }

    let mut vertex = None;
    let mut fragment = None;
    let mut compute = None;
    for (stage, body) in sections {
        match stage.as_str() {
            "vertex" => vertex = Some(body),
            "fragment" | "pixel" => fragment = Some(body),
            "compute" => compute = Some(body),
            _ => {
                return Err(RenderError::UnknownShaderStage {
                    name: name.to_string(),
                    stage,
                })
            }
        }
    }

    match (compute, vertex, fragment) {
        (Some(compute), _, _) => Ok(ShaderStages::Compute(compute)),
        (None, Some(vertex), Some(fragment)) => Ok(ShaderStages::Graphics { vertex, fragment }),
        _ => Err(RenderError::ShaderStagesMissing(name.to_string())),
    }
}
