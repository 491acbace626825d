//! Vertex/index buffers and vertex layouts

use std::sync::Arc;

use crate::backend::{BackendResult, BufferId, BufferUsage, GraphicsContext};
use crate::command::{RenderCommand, RenderQueue};

use super::NativeSlot;

/// Data types usable as vertex attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderDataType {
    Float,
    Float2,
    Float3,
    Float4,
    Mat3,
    Mat4,
    Int,
    Int2,
    Int3,
    Int4,
    Bool,
}

impl ShaderDataType {
    pub fn size(&self) -> u32 {
        match self {
            ShaderDataType::Float => 4,
            ShaderDataType::Float2 => 4 * 2,
            ShaderDataType::Float3 => 4 * 3,
            ShaderDataType::Float4 => 4 * 4,
            ShaderDataType::Mat3 => 4 * 3 * 3,
            ShaderDataType::Mat4 => 4 * 4 * 4,
            ShaderDataType::Int => 4,
            ShaderDataType::Int2 => 4 * 2,
            ShaderDataType::Int3 => 4 * 3,
            ShaderDataType::Int4 => 4 * 4,
            ShaderDataType::Bool => 1,
        }
    }

    pub fn component_count(&self) -> u32 {
        match self {
            ShaderDataType::Float | ShaderDataType::Int | ShaderDataType::Bool => 1,
            ShaderDataType::Float2 | ShaderDataType::Int2 => 2,
            ShaderDataType::Float3 | ShaderDataType::Int3 => 3,
            ShaderDataType::Float4 | ShaderDataType::Int4 => 4,
            ShaderDataType::Mat3 => 3 * 3,
            ShaderDataType::Mat4 => 4 * 4,
        }
    }
}

/// One attribute of a vertex layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferElement {
    pub name: String,
    pub data_type: ShaderDataType,
    pub size: u32,
    pub offset: u32,
    pub normalized: bool,
}

impl BufferElement {
    pub fn new(data_type: ShaderDataType, name: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            size: data_type.size(),
            offset: 0,
            normalized: false,
        }
    }

    pub fn normalized(mut self) -> Self {
        self.normalized = true;
        self
    }
}

/// Vertex layout with offsets and stride computed from the element order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferLayout {
    elements: Vec<BufferElement>,
    stride: u32,
}

impl BufferLayout {
    pub fn new(elements: Vec<BufferElement>) -> Self {
        let mut layout = Self {
            elements,
            stride: 0,
        };
        let mut offset = 0;
        for element in &mut layout.elements {
            element.offset = offset;
            offset += element.size;
        }
        layout.stride = offset;
        layout
    }

    pub fn elements(&self) -> &[BufferElement] {
        &self.elements
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }
}

/// Shared vertex buffer handle
pub struct VertexBuffer {
    data: Vec<u8>,
    usage: BufferUsage,
    layout: BufferLayout,
    id: NativeSlot<BufferId>,
    queue: Arc<RenderQueue>,
}

impl VertexBuffer {
    /// Static buffer initialised from `data`.
    pub fn new(queue: &Arc<RenderQueue>, data: &[u8], layout: BufferLayout) -> Arc<Self> {
        Self::create(queue, data.to_vec(), BufferUsage::Static, layout)
    }

    /// Zero-filled dynamic buffer of `size` bytes, filled later with [`set_data`](Self::set_data).
    pub fn dynamic(queue: &Arc<RenderQueue>, size: u32, layout: BufferLayout) -> Arc<Self> {
        Self::create(queue, vec![0; size as usize], BufferUsage::Dynamic, layout)
    }

    fn create(
        queue: &Arc<RenderQueue>,
        data: Vec<u8>,
        usage: BufferUsage,
        layout: BufferLayout,
    ) -> Arc<Self> {
        let buffer = Arc::new(Self {
            data,
            usage,
            layout,
            id: NativeSlot::empty(),
            queue: Arc::clone(queue),
        });
        log::trace!(
            "Queueing vertex buffer creation ({} bytes, {:?})",
            buffer.data.len(),
            usage
        );
        queue.submit(RenderCommand::CreateVertexBuffer(Arc::clone(&buffer)));
        buffer
    }

    pub(crate) fn realize(&self, ctx: &mut dyn GraphicsContext) -> BackendResult<()> {
        let id = ctx.create_vertex_buffer(&self.data, self.usage)?;
        self.id.replace(id);
        Ok(())
    }

    /// Upload new contents starting at `offset`.
    pub fn set_data(self: &Arc<Self>, data: &[u8], offset: u32) {
        if offset as usize + data.len() > self.data.len() {
            crate::fatal!(
                "Vertex buffer write of {} bytes at {} exceeds its {} bytes",
                data.len(),
                offset,
                self.data.len()
            );
        }
        self.queue.submit(RenderCommand::WriteVertexBuffer {
            buffer: Arc::clone(self),
            offset,
            data: data.to_vec(),
        });
    }

    pub fn bind(self: &Arc<Self>) {
        self.queue
            .submit(RenderCommand::BindVertexBuffer(Arc::clone(self)));
    }

    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    /// Native id, `None` until the creation command has executed.
    pub fn id(&self) -> Option<BufferId> {
        self.id.get()
    }

    pub(crate) fn native_id(&self) -> BufferId {
        self.id.expect("vertex buffer")
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        if let Some(id) = self.id.take_mut() {
            self.queue.submit(RenderCommand::DeleteBuffer(id));
        }
    }
}

/// Shared index buffer handle (32-bit indices)
pub struct IndexBuffer {
    data: Vec<u8>,
    count: u32,
    id: NativeSlot<BufferId>,
    queue: Arc<RenderQueue>,
}

impl IndexBuffer {
    pub fn new(queue: &Arc<RenderQueue>, indices: &[u32]) -> Arc<Self> {
        let buffer = Arc::new(Self {
            data: bytemuck::cast_slice(indices).to_vec(),
            count: indices.len() as u32,
            id: NativeSlot::empty(),
            queue: Arc::clone(queue),
        });
        log::trace!("Queueing index buffer creation ({} indices)", buffer.count);
        queue.submit(RenderCommand::CreateIndexBuffer(Arc::clone(&buffer)));
        buffer
    }

    pub(crate) fn realize(&self, ctx: &mut dyn GraphicsContext) -> BackendResult<()> {
        let id = ctx.create_index_buffer(&self.data)?;
        self.id.replace(id);
        Ok(())
    }

    pub fn bind(self: &Arc<Self>) {
        self.queue
            .submit(RenderCommand::BindIndexBuffer(Arc::clone(self)));
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn id(&self) -> Option<BufferId> {
        self.id.get()
    }

    pub(crate) fn native_id(&self) -> BufferId {
        self.id.expect("index buffer")
    }
}

impl Drop for IndexBuffer {
    fn drop(&mut self) {
        if let Some(id) = self.id.take_mut() {
            self.queue.submit(RenderCommand::DeleteBuffer(id));
        }
    }
}

static_assertions::assert_impl_all!(VertexBuffer: Send, Sync);
static_assertions::assert_impl_all!(IndexBuffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ContextCall, HeadlessContext};
    use crate::command::DEFAULT_COMMAND_BUFFER_CAPACITY;

    fn quad_layout() -> BufferLayout {
        BufferLayout::new(vec![
            BufferElement::new(ShaderDataType::Float3, "a_Position"),
            BufferElement::new(ShaderDataType::Float2, "a_TexCoord"),
        ])
    }

    #[test]
    fn test_layout_offsets_and_stride() {
        let layout = quad_layout();
        assert_eq!(layout.stride(), 20);
        assert_eq!(layout.elements()[0].offset, 0);
        assert_eq!(layout.elements()[1].offset, 12);
        assert_eq!(layout.elements()[1].data_type.component_count(), 2);
    }

    #[test]
    fn test_creation_is_deferred() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let buffer = VertexBuffer::new(&queue, &[0u8; 40], quad_layout());

        assert_eq!(buffer.id(), None);
        assert_eq!(queue.pending(), 1);

        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        assert!(buffer.id().is_some());
        assert!(matches!(
            ctx.calls()[0],
            ContextCall::CreateVertexBuffer { size: 40, usage: BufferUsage::Static, .. }
        ));
    }

    #[test]
    fn test_drop_enqueues_delete() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let buffer = IndexBuffer::new(&queue, &[0, 1, 2, 2, 3, 0]);
        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        let id = buffer.id().unwrap();

        drop(buffer);
        assert_eq!(queue.pending(), 1);
        queue.execute(&mut ctx).unwrap();
        assert_eq!(ctx.calls().last(), Some(&ContextCall::DeleteBuffer(id)));
    }

    #[test]
    fn test_drop_before_creation_deletes_in_next_batch() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let buffer = IndexBuffer::new(&queue, &[0, 1, 2]);
        drop(buffer);

        // the creation command still holds the handle
        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        assert_eq!(queue.pending(), 1);
        queue.execute(&mut ctx).unwrap();
        assert_eq!(ctx.count(|c| matches!(c, ContextCall::DeleteBuffer(_))), 1);
    }

    #[test]
    fn test_dynamic_set_data() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let buffer = VertexBuffer::dynamic(&queue, 64, quad_layout());
        buffer.set_data(&[1u8; 16], 8);

        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        let id = buffer.id().unwrap();
        assert_eq!(
            ctx.calls()[1],
            ContextCall::WriteBuffer { id, offset: 8, size: 16 }
        );
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn test_set_data_out_of_range_is_fatal() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let buffer = VertexBuffer::dynamic(&queue, 16, quad_layout());
        buffer.set_data(&[0u8; 32], 0);
    }
}
