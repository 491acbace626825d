//! GPU context abstraction layer
//!
//! Provides the immediate-mode context trait that queued commands execute
//! against, plus a headless recording implementation.

pub mod headless;
pub mod traits;
pub mod types;

pub use headless::*;
pub use traits::*;
pub use types::*;
