//! Named registry of compiled shaders owned by the renderer

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::command::RenderQueue;
use crate::error::{RenderError, RenderResult};

use super::{Shader, ShaderReflection};

/// Shaders addressable by name.
#[derive(Debug, Default)]
pub struct ShaderLibrary {
    shaders: HashMap<String, Arc<Shader>>,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shader under its own name. Registering a name twice is fatal.
    pub fn add(&mut self, shader: Arc<Shader>) {
        let name = shader.name().to_string();
        if self.shaders.contains_key(&name) {
            crate::fatal!("Shader '{}' is already registered", name);
        }
        log::debug!("Registered shader '{}'", name);
        self.shaders.insert(name, shader);
    }

    /// Load a `#type`-separated source file and register it.
    pub fn load<P: AsRef<Path>>(
        &mut self,
        queue: &Arc<RenderQueue>,
        path: P,
        reflection: ShaderReflection,
    ) -> RenderResult<Arc<Shader>> {
        let shader = Shader::from_file(queue, path, reflection)?;
        self.add(Arc::clone(&shader));
        Ok(shader)
    }

    pub fn get(&self, name: &str) -> RenderResult<Arc<Shader>> {
        self.shaders
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::ShaderNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shaders.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.shaders.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ShaderStages;
    use crate::command::DEFAULT_COMMAND_BUFFER_CAPACITY;

    fn compute(queue: &Arc<RenderQueue>, name: &str) -> Arc<Shader> {
        Shader::new(
            queue,
            name,
            ShaderStages::Compute(String::new()),
            ShaderReflection::default(),
        )
    }

    #[test]
    fn test_add_and_get() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let mut library = ShaderLibrary::new();
        library.add(compute(&queue, "environment_irradiance"));

        assert!(library.contains("environment_irradiance"));
        assert_eq!(library.get("environment_irradiance").unwrap().name(), "environment_irradiance");
        assert!(matches!(
            library.get("missing"),
            Err(RenderError::ShaderNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("queued_renderer_grid.glsl");
        std::fs::write(&path, "#type vertex\nvoid main() {}\n#type fragment\nvoid main() {}\n")
            .unwrap();

        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let mut library = ShaderLibrary::new();
        let shader = library.load(&queue, &path, ShaderReflection::default()).unwrap();
        assert_eq!(shader.name(), "queued_renderer_grid");
        assert!(library.contains("queued_renderer_grid"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let mut library = ShaderLibrary::new();
        let result = library.load(&queue, "no/such/shader.glsl", ShaderReflection::default());
        assert!(matches!(result, Err(RenderError::ShaderSource { .. })));
        assert!(library.is_empty());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_name_is_fatal() {
        let queue = RenderQueue::new(DEFAULT_COMMAND_BUFFER_CAPACITY);
        let mut library = ShaderLibrary::new();
        library.add(compute(&queue, "grid"));
        library.add(compute(&queue, "grid"));
    }
}
