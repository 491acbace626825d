//! Shared render command queue.

use std::sync::Arc;

use parking_lot::Mutex;

use super::buffer::CommandBuffer;
use super::record::RenderCommand;
use crate::backend::{BackendError, BackendResult, GraphicsContext};

/// FIFO queue of deferred GPU work.
///
/// One queue exists per renderer and every GPU resource handle keeps a
/// reference to it so creation, mutation and deletion can be enqueued from
/// anywhere on the submission side. [`RenderQueue::execute`] replays the
/// pending batch in exact submission order.
///
/// Commands submitted while a batch is executing (a handle dropped by the
/// command that held its last reference, for example) are appended to the
/// next batch.
pub struct RenderQueue {
    buffer: Mutex<CommandBuffer>,
}

impl RenderQueue {
    /// Create a queue with a fixed command budget in bytes.
    pub fn new(capacity: usize) -> Arc<Self> {
        log::debug!("Creating render queue with {} byte budget", capacity);
        Arc::new(Self {
            buffer: Mutex::new(CommandBuffer::new(capacity)),
        })
    }

    /// Enqueue a command. Overflowing the budget is fatal.
    ///
    /// Commands submitted while the thread unwinds are dropped: they come
    /// from handles released by a panic and the frame will never run.
    pub fn submit(&self, command: RenderCommand) {
        if std::thread::panicking() {
            log::debug!("Discarding '{}' submitted while unwinding", command.label());
            return;
        }
        log::trace!("Submitting {:?}", command);
        // the rejected command may own the last reference to a handle whose
        // drop submits again, so fail only after the lock is released
        let pushed = self.buffer.lock().try_push(command);
        if let Err(overflow) = pushed {
            overflow.fail();
        }
    }

    /// Enqueue an arbitrary closure to run against the GPU context.
    pub fn submit_fn<F>(&self, command: F)
    where
        F: FnOnce(&mut dyn GraphicsContext) + Send + 'static,
    {
        self.submit(RenderCommand::Custom(Box::new(command)));
    }

    /// Number of commands waiting for the next [`execute`](Self::execute).
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn used_bytes(&self) -> usize {
        self.buffer.lock().used_bytes()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.lock().capacity()
    }

    /// Run every pending command in submission order and reset the buffer.
    ///
    /// Returns the number of commands executed. After a command fails only
    /// resource creation and deletion keep running, so handles created or
    /// released later in the batch stay in step with the GPU. The first
    /// error is returned once the batch is drained.
    pub fn execute(&self, ctx: &mut dyn GraphicsContext) -> BackendResult<usize> {
        // The lock is released before replay: commands may drop handles whose
        // destructors submit deletions into this same queue.
        let commands = self.buffer.lock().take();
        let total = commands.len();
        log::trace!("Executing {} render commands on {}", total, ctx.name());

        let mut failure: Option<BackendError> = None;
        let mut skipped = 0;
        for (index, command) in commands.into_iter().enumerate() {
            if failure.is_some() && !command.is_lifetime() {
                skipped += 1;
                continue;
            }
            let label = command.label();
            if let Err(err) = command.execute(ctx) {
                log::error!("Render command '{}' (#{}) failed: {}", label, index, err);
                if failure.is_none() {
                    failure = Some(err);
                }
            }
        }

        match failure {
            Some(err) => {
                log::warn!(
                    "Skipped {} of {} render commands after a failure",
                    skipped,
                    total
                );
                Err(err)
            }
            None => Ok(total),
        }
    }
}

impl std::fmt::Debug for RenderQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderQueue")
            .field("buffer", &*self.buffer.lock())
            .finish()
    }
}

static_assertions::assert_impl_all!(RenderQueue: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ContextCall, HeadlessContext, TextureFormat};
    use crate::command::DEFAULT_COMMAND_BUFFER_CAPACITY;

    fn create_test_queue() -> Arc<RenderQueue> {
        RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY)
    }

    #[test]
    fn test_execute_runs_in_submission_order() {
        let queue = create_test_queue();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..32 {
            let log = Arc::clone(&log);
            queue.submit_fn(move |_| log.lock().push(i));
        }

        let mut ctx = HeadlessContext::new();
        assert_eq!(queue.execute(&mut ctx).unwrap(), 32);
        assert_eq!(*log.lock(), (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_captured_value_written() {
        let queue = create_test_queue();
        let value = Arc::new(Mutex::new(0));
        let target = Arc::clone(&value);
        queue.submit_fn(move |_| *target.lock() = 42);

        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();

        assert_eq!(*value.lock(), 42);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_second_execute_is_empty() {
        let queue = create_test_queue();
        let counter = Arc::new(Mutex::new(0));
        let c = Arc::clone(&counter);
        queue.submit_fn(move |_| *c.lock() += 1);

        let mut ctx = HeadlessContext::new();
        assert_eq!(queue.execute(&mut ctx).unwrap(), 1);
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.used_bytes(), 0);
        assert_eq!(queue.execute(&mut ctx).unwrap(), 0);
        assert_eq!(*counter.lock(), 1);
    }

    #[test]
    fn test_submission_during_execute_lands_in_next_batch() {
        let queue = create_test_queue();
        let inner = Arc::clone(&queue);
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        queue.submit_fn(move |_| {
            inner.submit_fn(move |_| *flag.lock() = true);
        });

        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        assert_eq!(queue.pending(), 1);
        assert!(!*ran.lock());

        queue.execute(&mut ctx).unwrap();
        assert!(*ran.lock());
    }

    #[test]
    #[should_panic(expected = "Command buffer overflow: 'generate_mipmaps'")]
    fn test_overflow_releases_lock_before_failing() {
        let queue = RenderQueue::new(std::mem::size_of::<RenderCommand>());
        let cube = crate::resources::TextureCube::new(
            &queue,
            "env",
            TextureFormat::Rgba16Float,
            4,
            4,
        );
        let mut ctx = HeadlessContext::new();
        queue.execute(&mut ctx).unwrap();
        queue.submit_fn(|_| {});

        // the rejected command holds the last reference to the cube
        queue.submit(RenderCommand::GenerateMipmaps(
            crate::resources::TextureRef::Cube(cube),
        ));
    }

    #[test]
    fn test_failure_keeps_resource_lifetimes() {
        let queue = create_test_queue();
        let ran = Arc::new(Mutex::new(false));

        let broken = crate::resources::TextureCube::new(
            &queue,
            "broken",
            TextureFormat::Rgba16Float,
            4,
            4,
        );
        let flag = Arc::clone(&ran);
        queue.submit_fn(move |_| *flag.lock() = true);
        let healthy = crate::resources::TextureCube::new(
            &queue,
            "healthy",
            TextureFormat::Rgba16Float,
            4,
            4,
        );

        let mut ctx = HeadlessContext::new().with_failing_texture("broken");
        let result = queue.execute(&mut ctx);

        assert!(matches!(result, Err(BackendError::TextureCreationFailed(_))));
        assert!(!*ran.lock());
        assert_eq!(queue.pending(), 0);
        assert!(broken.id().is_none());
        let id = healthy.id().unwrap();

        drop(healthy);
        queue.execute(&mut ctx).unwrap();
        assert_eq!(ctx.calls().last(), Some(&ContextCall::DeleteTexture(id)));
    }
}
