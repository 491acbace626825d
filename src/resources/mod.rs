//! GPU resource handles
//!
//! Every handle is shared through an `Arc`. Constructing one records its CPU
//! description immediately and enqueues the GPU-side creation; the native id
//! stays unset until that command has executed. Dropping the last reference
//! enqueues a deletion that captures only the native id.

mod buffer;
mod framebuffer;
mod mesh;
mod pipeline;
mod texture;

pub use buffer::*;
pub use framebuffer::*;
pub use mesh::*;
pub use pipeline::*;
pub use texture::*;

use parking_lot::RwLock;

/// Native id of a handle, unset until its creation command has run.
pub(crate) struct NativeSlot<T: Clone>(RwLock<Option<T>>);

impl<T: Clone> NativeSlot<T> {
    pub(crate) fn empty() -> Self {
        Self(RwLock::new(None))
    }

    pub(crate) fn get(&self) -> Option<T> {
        self.0.read().clone()
    }

    /// Store a fresh id, returning the one it replaces.
    pub(crate) fn replace(&self, id: T) -> Option<T> {
        self.0.write().replace(id)
    }

    /// Read the id from a command. Reading it before creation is a use-before-create bug.
    pub(crate) fn expect(&self, what: &str) -> T {
        match self.get() {
            Some(id) => id,
            None => crate::fatal!("{} used before its creation command executed", what),
        }
    }

    /// Take the id out during `Drop`.
    pub(crate) fn take_mut(&mut self) -> Option<T> {
        self.0.get_mut().take()
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for NativeSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.read().fmt(f)
    }
}
