//! Framebuffers and the pool used to resize them with the window

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::backend::{
    BackendError, BackendResult, FramebufferDescriptor, FramebufferTargets, GraphicsContext, TextureFormat,
    TextureId,
};
use crate::command::{RenderCommand, RenderQueue};

use super::NativeSlot;

/// Maximum number of color attachments per framebuffer.
pub const MAX_COLOR_ATTACHMENTS: usize = 4;

/// Framebuffer description
#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferSpec {
    pub width: u32,
    pub height: u32,
    /// Color and depth formats, in attachment order. At most one depth format.
    pub attachments: Vec<TextureFormat>,
    pub samples: u32,
    pub clear_color: [f32; 4],
    /// Keep the size fixed when the window resizes.
    pub no_resize: bool,
    pub debug_name: String,
}

impl Default for FramebufferSpec {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            attachments: vec![TextureFormat::Rgba8Unorm],
            samples: 1,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            no_resize: false,
            debug_name: String::new(),
        }
    }
}

impl FramebufferSpec {
    pub fn color_formats(&self) -> impl Iterator<Item = TextureFormat> + '_ {
        self.attachments.iter().copied().filter(|f| !f.is_depth())
    }

    pub fn depth_format(&self) -> Option<TextureFormat> {
        self.attachments.iter().copied().find(|f| f.is_depth())
    }
}

/// Shared framebuffer handle
pub struct Framebuffer {
    spec: FramebufferSpec,
    size: RwLock<(u32, u32)>,
    targets: NativeSlot<FramebufferTargets>,
    queue: Arc<RenderQueue>,
}

impl Framebuffer {
    /// Validate the attachments and queue the initial creation.
    pub fn new(queue: &Arc<RenderQueue>, spec: FramebufferSpec) -> Arc<Self> {
        let depth_count = spec.attachments.iter().filter(|f| f.is_depth()).count();
        let color_count = spec.attachments.len() - depth_count;
        if depth_count > 1 {
            crate::fatal!(
                "Framebuffer '{}' has {} depth attachments, at most one is supported",
                spec.debug_name,
                depth_count
            );
        }
        if color_count > MAX_COLOR_ATTACHMENTS {
            crate::fatal!(
                "Framebuffer '{}' has {} color attachments, at most {} are supported",
                spec.debug_name,
                color_count,
                MAX_COLOR_ATTACHMENTS
            );
        }

        let framebuffer = Arc::new(Self {
            size: RwLock::new((spec.width, spec.height)),
            spec,
            targets: NativeSlot::empty(),
            queue: Arc::clone(queue),
        });
        log::debug!(
            "Creating framebuffer '{}' ({}x{})",
            framebuffer.spec.debug_name,
            framebuffer.spec.width,
            framebuffer.spec.height
        );
        queue.submit(RenderCommand::CreateFramebuffer(Arc::clone(&framebuffer)));
        framebuffer
    }

    /// Resize the attachments. Same-size calls are a no-op unless `force_recreate`.
    pub fn resize(self: &Arc<Self>, width: u32, height: u32, force_recreate: bool) {
        {
            let mut size = self.size.write();
            if !force_recreate && *size == (width, height) {
                return;
            }
            if width == 0 || height == 0 {
                log::debug!(
                    "Ignoring zero-sized resize of framebuffer '{}'",
                    self.spec.debug_name
                );
                return;
            }
            *size = (width, height);
        }
        log::trace!(
            "Resizing framebuffer '{}' to {}x{}",
            self.spec.debug_name,
            width,
            height
        );
        self.queue
            .submit(RenderCommand::CreateFramebuffer(Arc::clone(self)));
    }

    /// Create native targets at the current size, then release the old ones.
    ///
    /// An incomplete framebuffer is fatal. Any other failure keeps the
    /// previous targets bound to the handle.
    pub(crate) fn invalidate(&self, ctx: &mut dyn GraphicsContext) -> BackendResult<()> {
        let (width, height) = *self.size.read();
        let desc = FramebufferDescriptor {
            label: Some(self.spec.debug_name.clone()).filter(|name| !name.is_empty()),
            width,
            height,
            samples: self.spec.samples,
            color_formats: self.spec.color_formats().collect(),
            depth_format: self.spec.depth_format(),
        };
        let targets = match ctx.create_framebuffer(&desc) {
            Ok(targets) => targets,
            Err(BackendError::FramebufferIncomplete(reason)) => crate::fatal!(
                "Framebuffer '{}' ({}x{}) is incomplete: {}",
                self.spec.debug_name,
                width,
                height,
                reason
            ),
            Err(err) => return Err(err),
        };
        if let Some(old) = self.targets.replace(targets) {
            ctx.delete_framebuffer(&old);
        }
        Ok(())
    }

    pub(crate) fn bind_now(&self, ctx: &mut dyn GraphicsContext) {
        let targets = self.targets.expect("framebuffer");
        let (width, height) = *self.size.read();
        ctx.bind_framebuffer(Some(targets.framebuffer));
        ctx.set_viewport(0, 0, width, height);
    }

    pub(crate) fn color_attachment_id(&self, attachment: usize) -> TextureId {
        let targets = self.targets.expect("framebuffer");
        match targets.color_attachments.get(attachment) {
            Some(id) => *id,
            None => crate::fatal!(
                "Framebuffer '{}' has no color attachment {}",
                self.spec.debug_name,
                attachment
            ),
        }
    }

    pub fn bind(self: &Arc<Self>) {
        self.queue
            .submit(RenderCommand::BindFramebuffer(Arc::clone(self)));
    }

    pub fn unbind(&self) {
        self.queue.submit(RenderCommand::UnbindFramebuffer);
    }

    /// Sample color attachment `attachment` through texture slot `slot`.
    pub fn bind_color_texture(self: &Arc<Self>, attachment: usize, slot: u32) {
        self.queue.submit(RenderCommand::BindFramebufferTexture {
            framebuffer: Arc::clone(self),
            attachment,
            slot,
        });
    }

    pub fn spec(&self) -> &FramebufferSpec {
        &self.spec
    }

    pub fn size(&self) -> (u32, u32) {
        *self.size.read()
    }

    pub fn width(&self) -> u32 {
        self.size().0
    }

    pub fn height(&self) -> u32 {
        self.size().1
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.spec.clear_color
    }

    /// Native objects, `None` until the creation command has executed.
    pub fn targets(&self) -> Option<FramebufferTargets> {
        self.targets.get()
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        if let Some(targets) = self.targets.take_mut() {
            self.queue.submit(RenderCommand::DeleteFramebuffer(targets));
        }
    }
}

impl fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framebuffer")
            .field("name", &self.spec.debug_name)
            .field("size", &self.size())
            .field("targets", &self.targets)
            .finish()
    }
}

/// Weak registry of live framebuffers, walked on window resize.
#[derive(Default)]
pub struct FramebufferPool {
    framebuffers: RwLock<Vec<Weak<Framebuffer>>>,
}

impl FramebufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, framebuffer: &Arc<Framebuffer>) {
        self.framebuffers.write().push(Arc::downgrade(framebuffer));
    }

    /// Resize every live, resizable framebuffer and prune dead entries.
    /// Returns how many framebuffers were visited.
    pub fn resize_all(&self, width: u32, height: u32) -> usize {
        let live: Vec<Arc<Framebuffer>> = {
            let mut framebuffers = self.framebuffers.write();
            framebuffers.retain(|w| w.strong_count() > 0);
            framebuffers.iter().filter_map(Weak::upgrade).collect()
        };
        let mut resized = 0;
        for framebuffer in live.iter().filter(|fb| !fb.spec().no_resize) {
            framebuffer.resize(width, height, false);
            resized += 1;
        }
        log::debug!(
            "Resized {} of {} framebuffers to {}x{}",
            resized,
            live.len(),
            width,
            height
        );
        resized
    }

    /// Number of framebuffers still alive.
    pub fn live_count(&self) -> usize {
        self.framebuffers
            .read()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Clean up dead weak references to dropped framebuffers.
    pub fn cleanup_dead(&self) {
        self.framebuffers.write().retain(|w| w.strong_count() > 0);
    }
}

impl fmt::Debug for FramebufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramebufferPool")
            .field("live", &self.live_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(Framebuffer: Send, Sync);
static_assertions::assert_impl_all!(FramebufferPool: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ContextCall, HeadlessContext};
    use crate::command::DEFAULT_COMMAND_BUFFER_CAPACITY;

    fn geometry_spec() -> FramebufferSpec {
        FramebufferSpec {
            width: 320,
            height: 240,
            attachments: vec![TextureFormat::Rgba16Float, TextureFormat::Depth24PlusStencil8],
            debug_name: "geometry".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_same_size_resize_is_noop() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let framebuffer = Framebuffer::new(&queue, geometry_spec());
        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();

        framebuffer.resize(320, 240, false);
        assert_eq!(queue.pending(), 0);

        framebuffer.resize(320, 240, true);
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn test_resize_recreates_targets() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let framebuffer = Framebuffer::new(&queue, geometry_spec());
        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        let first = framebuffer.targets().unwrap();
        assert_eq!(first.color_attachments.len(), 1);
        assert!(first.depth_attachment.is_some());

        framebuffer.resize(640, 480, false);
        queue.execute(&mut ctx).unwrap();
        let second = framebuffer.targets().unwrap();

        assert_ne!(first.framebuffer, second.framebuffer);
        let created = ctx
            .calls()
            .iter()
            .position(|c| {
                matches!(
                    c,
                    ContextCall::CreateFramebuffer { width: 640, height: 480, .. }
                )
            })
            .unwrap();
        let deleted = ctx
            .calls()
            .iter()
            .position(|c| *c == ContextCall::DeleteFramebuffer(first.framebuffer))
            .unwrap();
        assert!(created < deleted);
    }

    #[test]
    fn test_failed_recreate_keeps_previous_targets() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let framebuffer = Framebuffer::new(&queue, geometry_spec());
        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        let first = framebuffer.targets().unwrap();

        framebuffer.resize(640, 480, false);
        let mut failing = HeadlessContext::new().with_failing_framebuffer("geometry");
        assert!(matches!(queue.execute(&mut failing), Err(BackendError::OutOfMemory)));

        assert_eq!(framebuffer.targets(), Some(first));
        assert_eq!(failing.count(|c| matches!(c, ContextCall::DeleteFramebuffer(_))), 0);
    }

    #[test]
    #[should_panic(expected = "is incomplete")]
    fn test_incomplete_framebuffer_is_fatal() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let _framebuffer = Framebuffer::new(
            &queue,
            FramebufferSpec {
                width: 0,
                ..geometry_spec()
            },
        );
        let mut ctx = HeadlessContext::new();
        let _ = queue.execute(&mut ctx);
    }

    #[test]
    fn test_bind_sets_viewport() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let framebuffer = Framebuffer::new(&queue, geometry_spec());
        framebuffer.bind();
        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();

        let id = framebuffer.targets().unwrap().framebuffer;
        assert_eq!(
            &ctx.calls()[1..],
            &[
                ContextCall::BindFramebuffer(Some(id)),
                ContextCall::SetViewport { x: 0, y: 0, width: 320, height: 240 },
            ]
        );
    }

    #[test]
    fn test_drop_enqueues_delete() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let framebuffer = Framebuffer::new(&queue, geometry_spec());
        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        let id = framebuffer.targets().unwrap().framebuffer;

        drop(framebuffer);
        queue.execute(&mut ctx).unwrap();
        assert_eq!(ctx.calls().last(), Some(&ContextCall::DeleteFramebuffer(id)));
    }

    #[test]
    #[should_panic(expected = "at most one is supported")]
    fn test_two_depth_attachments_are_fatal() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        Framebuffer::new(
            &queue,
            FramebufferSpec {
                attachments: vec![TextureFormat::Depth32Float, TextureFormat::Depth24PlusStencil8],
                ..Default::default()
            },
        );
    }

    #[test]
    fn test_pool_resizes_live_framebuffers() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let pool = FramebufferPool::new();
        let resizable = Framebuffer::new(&queue, geometry_spec());
        let fixed = Framebuffer::new(
            &queue,
            FramebufferSpec {
                no_resize: true,
                ..geometry_spec()
            },
        );
        let dropped = Framebuffer::new(&queue, geometry_spec());
        pool.add(&resizable);
        pool.add(&fixed);
        pool.add(&dropped);
        // the queued creation holds a reference until it has run
        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        drop(dropped);

        assert_eq!(pool.resize_all(800, 600), 1);
        assert_eq!(pool.live_count(), 2);
        assert_eq!(resizable.size(), (800, 600));
        assert_eq!(fixed.size(), (320, 240));
    }
}
