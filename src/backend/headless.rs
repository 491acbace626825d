//! Headless GPU context for testing and development.
//!
//! This context doesn't talk to any GPU. It hands out sequential native ids,
//! resolves uniform locations from a lookup table and records every call so
//! the command stream produced by the renderer can be inspected.

use std::collections::{HashMap, HashSet};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::BufferLayout;

/// One recorded call against the headless context.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextCall {
    CreateVertexBuffer { id: BufferId, size: usize, usage: BufferUsage },
    CreateIndexBuffer { id: BufferId, size: usize },
    WriteBuffer { id: BufferId, offset: u32, size: usize },
    BindVertexBuffer(BufferId),
    BindIndexBuffer(BufferId),
    DeleteBuffer(BufferId),
    CreateVertexArray { id: VertexArrayId, stride: u32 },
    BindVertexArray(VertexArrayId),
    DeleteVertexArray(VertexArrayId),
    CreateTexture { id: TextureId, desc: TextureDescriptor, has_data: bool },
    BindTexture { slot: u32, texture: TextureId },
    BindImageTexture { unit: u32, texture: TextureId, level: u32, access: ImageAccess },
    GenerateMipmaps(TextureId),
    CopyTexture { src: TextureId, dst: TextureId, width: u32, height: u32, layers: u32 },
    DeleteTexture(TextureId),
    CreateFramebuffer { targets: FramebufferTargets, width: u32, height: u32 },
    BindFramebuffer(Option<FramebufferId>),
    DeleteFramebuffer(FramebufferId),
    SetViewport { x: u32, y: u32, width: u32, height: u32 },
    Clear([f32; 4]),
    CreateProgram { id: ProgramId, name: String },
    UseProgram(Option<ProgramId>),
    UploadUniform { location: i32, value: UniformValue },
    DeleteProgram(ProgramId),
    SetDepthTest(bool),
    SetFaceCulling(bool),
    DrawIndexed { primitive: PrimitiveType, index_count: u32, base_index: u32, base_vertex: i32 },
    DispatchCompute { x: u32, y: u32, z: u32 },
}

/// Recording GPU context.
#[derive(Debug, Default)]
pub struct HeadlessContext {
    next_id: u32,
    next_location: i32,
    calls: Vec<ContextCall>,
    locations: HashMap<(ProgramId, String), i32>,
    location_names: HashMap<i32, String>,
    inactive_uniforms: HashSet<String>,
    failing_programs: HashSet<String>,
    failing_textures: HashSet<String>,
    failing_framebuffers: HashSet<String>,
}

impl HeadlessContext {
    /// Create a new headless context.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    /// Pretend the linker optimised `name` away: its location resolves to -1.
    pub fn with_inactive_uniform(mut self, name: impl Into<String>) -> Self {
        self.inactive_uniforms.insert(name.into());
        self
    }

    /// Make linking the program called `name` fail.
    pub fn with_failing_program(mut self, name: impl Into<String>) -> Self {
        self.failing_programs.insert(name.into());
        self
    }

    /// Make creating the texture labelled `label` fail, as an allocation
    /// failure would.
    pub fn with_failing_texture(mut self, label: impl Into<String>) -> Self {
        self.failing_textures.insert(label.into());
        self
    }

    /// Make creating the framebuffer labelled `label` run out of memory.
    pub fn with_failing_framebuffer(mut self, label: impl Into<String>) -> Self {
        self.failing_framebuffers.insert(label.into());
        self
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> &[ContextCall] {
        &self.calls
    }

    /// Drain the recorded calls.
    pub fn take_calls(&mut self) -> Vec<ContextCall> {
        std::mem::take(&mut self.calls)
    }

    /// Name a resolved location was handed out for.
    pub fn uniform_name(&self, location: i32) -> Option<&str> {
        self.location_names.get(&location).map(String::as_str)
    }

    /// Values uploaded to uniforms called `name`, in upload order.
    pub fn uploads_named(&self, name: &str) -> Vec<&UniformValue> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ContextCall::UploadUniform { location, value }
                    if self.uniform_name(*location) == Some(name) =>
                {
                    Some(value)
                }
                _ => None,
            })
            .collect()
    }

    /// Number of recorded calls matching a predicate.
    pub fn count(&self, predicate: impl Fn(&ContextCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    fn record(&mut self, call: ContextCall) {
        log::trace!("HeadlessContext: {:?}", call);
        self.calls.push(call);
    }
}

impl GraphicsContext for HeadlessContext {
    fn name(&self) -> &str {
        "Headless Context"
    }

    fn create_vertex_buffer(
        &mut self,
        data: &[u8],
        usage: BufferUsage,
    ) -> BackendResult<BufferId> {
        let id = BufferId::new(self.allocate());
        self.record(ContextCall::CreateVertexBuffer { id, size: data.len(), usage });
        Ok(id)
    }

    fn create_index_buffer(&mut self, data: &[u8]) -> BackendResult<BufferId> {
        let id = BufferId::new(self.allocate());
        self.record(ContextCall::CreateIndexBuffer { id, size: data.len() });
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u32, data: &[u8]) {
        self.record(ContextCall::WriteBuffer { id: buffer, offset, size: data.len() });
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferId) {
        self.record(ContextCall::BindVertexBuffer(buffer));
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) {
        self.record(ContextCall::BindIndexBuffer(buffer));
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.record(ContextCall::DeleteBuffer(buffer));
    }

    fn create_vertex_array(&mut self, layout: &BufferLayout) -> BackendResult<VertexArrayId> {
        let id = VertexArrayId::new(self.allocate());
        self.record(ContextCall::CreateVertexArray { id, stride: layout.stride() });
        Ok(id)
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.record(ContextCall::BindVertexArray(vertex_array));
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.record(ContextCall::DeleteVertexArray(vertex_array));
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has a zero extent",
                desc.label
            )));
        }
        if let Some(label) = desc.label.as_ref().filter(|l| self.failing_textures.contains(*l)) {
            return Err(BackendError::TextureCreationFailed(format!(
                "simulated allocation failure for '{}'",
                label
            )));
        }
        let id = TextureId::new(self.allocate());
        self.record(ContextCall::CreateTexture {
            id,
            desc: desc.clone(),
            has_data: data.is_some(),
        });
        Ok(id)
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        self.record(ContextCall::BindTexture { slot, texture });
    }

    fn bind_image_texture(
        &mut self,
        unit: u32,
        texture: TextureId,
        level: u32,
        access: ImageAccess,
        _format: TextureFormat,
    ) {
        self.record(ContextCall::BindImageTexture { unit, texture, level, access });
    }

    fn generate_mipmaps(&mut self, texture: TextureId) {
        self.record(ContextCall::GenerateMipmaps(texture));
    }

    fn copy_texture(&mut self, src: TextureId, dst: TextureId, width: u32, height: u32, layers: u32) {
        self.record(ContextCall::CopyTexture { src, dst, width, height, layers });
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.record(ContextCall::DeleteTexture(texture));
    }

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> BackendResult<FramebufferTargets> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::FramebufferIncomplete(format!(
                "{:?} has a zero extent",
                desc.label
            )));
        }
        if desc
            .label
            .as_ref()
            .is_some_and(|label| self.failing_framebuffers.contains(label))
        {
            return Err(BackendError::OutOfMemory);
        }
        let framebuffer = FramebufferId::new(self.allocate());
        let color_attachments = desc
            .color_formats
            .iter()
            .map(|_| TextureId::new(self.allocate()))
            .collect();
        let depth_attachment = desc
            .depth_format
            .map(|_| TextureId::new(self.allocate()));
        let targets = FramebufferTargets {
            framebuffer,
            color_attachments,
            depth_attachment,
        };
        self.record(ContextCall::CreateFramebuffer {
            targets: targets.clone(),
            width: desc.width,
            height: desc.height,
        });
        Ok(targets)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.record(ContextCall::BindFramebuffer(framebuffer));
    }

    fn delete_framebuffer(&mut self, targets: &FramebufferTargets) {
        self.record(ContextCall::DeleteFramebuffer(targets.framebuffer));
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.record(ContextCall::SetViewport { x, y, width, height });
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.record(ContextCall::Clear(color));
    }

    fn create_program(&mut self, name: &str, _stages: &ShaderStages) -> BackendResult<ProgramId> {
        if self.failing_programs.contains(name) {
            return Err(BackendError::ShaderLinkFailed {
                name: name.to_string(),
                log: "simulated link failure".to_string(),
            });
        }
        let id = ProgramId::new(self.allocate());
        self.record(ContextCall::CreateProgram { id, name: name.to_string() });
        Ok(id)
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.record(ContextCall::UseProgram(program));
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> i32 {
        if self.inactive_uniforms.contains(name) {
            return INVALID_LOCATION;
        }
        if let Some(location) = self.locations.get(&(program, name.to_string())) {
            return *location;
        }
        let location = self.next_location;
        self.next_location += 1;
        self.locations.insert((program, name.to_string()), location);
        self.location_names.insert(location, name.to_string());
        location
    }

    fn upload_uniform(&mut self, location: i32, value: &UniformValue) {
        self.record(ContextCall::UploadUniform {
            location,
            value: value.clone(),
        });
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.record(ContextCall::DeleteProgram(program));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.record(ContextCall::SetDepthTest(enabled));
    }

    fn set_face_culling(&mut self, enabled: bool) {
        self.record(ContextCall::SetFaceCulling(enabled));
    }

    fn draw_indexed(
        &mut self,
        primitive: PrimitiveType,
        index_count: u32,
        base_index: u32,
        base_vertex: i32,
    ) {
        self.record(ContextCall::DrawIndexed {
            primitive,
            index_count,
            base_index,
            base_vertex,
        });
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) {
        self.record(ContextCall::DispatchCompute { x, y, z });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let mut ctx = HeadlessContext::new();
        let a = ctx.create_index_buffer(&[0; 12]).unwrap();
        let b = ctx.create_index_buffer(&[0; 12]).unwrap();
        assert_ne!(a, b);
        assert_eq!(ctx.calls().len(), 2);
    }

    #[test]
    fn test_locations_are_stable_per_program() {
        let mut ctx = HeadlessContext::new().with_inactive_uniform("u_Unused");
        let stages = ShaderStages::Compute(String::new());
        let program = ctx.create_program("filter", &stages).unwrap();

        let first = ctx.uniform_location(program, "u_Roughness");
        let second = ctx.uniform_location(program, "u_Roughness");
        assert_eq!(first, second);
        assert_eq!(ctx.uniform_name(first), Some("u_Roughness"));
        assert_eq!(ctx.uniform_location(program, "u_Unused"), INVALID_LOCATION);
    }

    #[test]
    fn test_failing_program() {
        let mut ctx = HeadlessContext::new().with_failing_program("broken");
        let stages = ShaderStages::Compute(String::new());
        let result = ctx.create_program("broken", &stages);
        assert!(matches!(result, Err(BackendError::ShaderLinkFailed { .. })));
    }

    #[test]
    fn test_failing_texture_matches_label() {
        let mut ctx = HeadlessContext::new().with_failing_texture("env");
        let mut desc = TextureDescriptor {
            label: Some("env".to_string()),
            width: 4,
            height: 4,
            ..Default::default()
        };
        assert!(ctx.create_texture(&desc, None).is_err());

        desc.label = Some("albedo".to_string());
        assert!(ctx.create_texture(&desc, None).is_ok());
        assert_eq!(ctx.calls().len(), 1);
    }
}
