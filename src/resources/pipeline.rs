//! Vertex input pipeline (vertex array object)

use std::sync::Arc;

use crate::backend::{BackendResult, GraphicsContext, VertexArrayId};
use crate::command::{RenderCommand, RenderQueue};
use crate::shader::Shader;

use super::{BufferLayout, NativeSlot};

/// Pipeline description
#[derive(Clone, Default)]
pub struct PipelineSpec {
    pub shader: Option<Arc<Shader>>,
    pub layout: BufferLayout,
}

/// Shared pipeline handle binding a vertex layout
pub struct Pipeline {
    spec: PipelineSpec,
    id: NativeSlot<VertexArrayId>,
    queue: Arc<RenderQueue>,
}

impl Pipeline {
    pub fn new(queue: &Arc<RenderQueue>, spec: PipelineSpec) -> Arc<Self> {
        let pipeline = Arc::new(Self {
            spec,
            id: NativeSlot::empty(),
            queue: Arc::clone(queue),
        });
        queue.submit(RenderCommand::CreateVertexArray(Arc::clone(&pipeline)));
        pipeline
    }

    pub(crate) fn realize(&self, ctx: &mut dyn GraphicsContext) -> BackendResult<()> {
        let id = ctx.create_vertex_array(&self.spec.layout)?;
        if let Some(old) = self.id.replace(id) {
            ctx.delete_vertex_array(old);
        }
        Ok(())
    }

    /// Re-create the vertex array, e.g. after the layout's buffer changed.
    pub fn invalidate(self: &Arc<Self>) {
        self.queue
            .submit(RenderCommand::CreateVertexArray(Arc::clone(self)));
    }

    pub fn bind(self: &Arc<Self>) {
        self.queue
            .submit(RenderCommand::BindVertexArray(Arc::clone(self)));
    }

    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.spec.layout
    }

    pub fn id(&self) -> Option<VertexArrayId> {
        self.id.get()
    }

    pub(crate) fn native_id(&self) -> VertexArrayId {
        self.id.expect("pipeline")
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(id) = self.id.take_mut() {
            self.queue.submit(RenderCommand::DeleteVertexArray(id));
        }
    }
}
