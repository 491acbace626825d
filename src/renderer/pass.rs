//! Render pass: a named target framebuffer

use std::sync::Arc;

use crate::resources::Framebuffer;

/// Render pass description
#[derive(Debug, Clone)]
pub struct RenderPassSpec {
    pub target_framebuffer: Arc<Framebuffer>,
    pub debug_name: String,
}

/// Logical group of draws into one framebuffer
#[derive(Debug)]
pub struct RenderPass {
    spec: RenderPassSpec,
}

impl RenderPass {
    pub fn new(spec: RenderPassSpec) -> Arc<Self> {
        Arc::new(Self { spec })
    }

    pub fn spec(&self) -> &RenderPassSpec {
        &self.spec
    }

    pub fn target_framebuffer(&self) -> &Arc<Framebuffer> {
        &self.spec.target_framebuffer
    }

    pub fn name(&self) -> &str {
        &self.spec.debug_name
    }
}
