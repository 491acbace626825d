//! Deferred command submission
//!
//! Scene-side code records typed [`RenderCommand`]s into a [`RenderQueue`];
//! the queue replays them against the GPU context once per frame.

mod buffer;
mod queue;
mod record;

pub use buffer::*;
pub use queue::*;
pub use record::*;
