//! Shader programs, their reflected layout and the shader library

mod library;
mod program;
mod reflection;

pub use library::*;
pub use program::{parse_stages, Shader};
pub use reflection::*;
