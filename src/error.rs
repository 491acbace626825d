//! Crate-level error types and the fatal assertion macro.

use crate::backend::BackendError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the renderer to its callers.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Failed to decode texture '{path}': {source}")]
    TextureDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to read shader source '{path}': {source}")]
    ShaderSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Shader source '{0}' has no stage markers")]
    ShaderStagesMissing(String),
    #[error("Shader source '{name}' declares unknown stage '{stage}'")]
    UnknownShaderStage { name: String, stage: String },
    #[error("Shader '{0}' is not registered in the shader library")]
    ShaderNotFound(String),
    #[error("Environment source '{0}' is not an HDR image")]
    EnvironmentNotHdr(PathBuf),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Halt on a programmer or configuration error.
///
/// Logs the failed condition together with the source location, then panics.
/// Used for contract violations that must never be recovered from: unknown
/// uniform names, nested render passes, command buffer overflow and friends.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {{
        let message = format!($($arg)+);
        log::error!("{} ({}:{})", message, file!(), line!());
        panic!("{}", message)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RenderError::ShaderNotFound("grid".to_string());
        assert_eq!(
            err.to_string(),
            "Shader 'grid' is not registered in the shader library"
        );

        let err: RenderError = BackendError::OutOfMemory.into();
        assert_eq!(err.to_string(), "Out of memory");
    }

    #[test]
    #[should_panic(expected = "render pass already active")]
    fn test_fatal_panics_with_message() {
        fatal!("render pass already active: {}", "geometry");
    }
}
