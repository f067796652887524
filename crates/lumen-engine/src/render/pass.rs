use crate::backend::{Backend, ClearOptions};
use crate::scene::SceneRoot;

/// Where a pass renders to.
pub enum RenderTarget<B: Backend> {
    /// The context's default framebuffer.
    Default,
    /// An off-screen framebuffer. Not supported yet; rendering to it fails.
    Framebuffer(B::Framebuffer),
}

impl<B: Backend> core::fmt::Debug for RenderTarget<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RenderTarget::Default => f.write_str("Default"),
            RenderTarget::Framebuffer(fb) => f.debug_tuple("Framebuffer").field(fb).finish(),
        }
    }
}

/// One `render()` request: what to draw, where, and what to clear first.
pub struct RenderPass<'a, B: Backend> {
    pub target: RenderTarget<B>,
    pub root: &'a mut dyn SceneRoot<B>,
    pub clear: ClearOptions,
}

impl<'a, B: Backend> RenderPass<'a, B> {
    /// Default target, nothing cleared.
    pub fn new(root: &'a mut dyn SceneRoot<B>) -> Self {
        Self { target: RenderTarget::Default, root, clear: ClearOptions::default() }
    }

    pub fn clear(mut self, clear: ClearOptions) -> Self {
        self.clear = clear;
        self
    }

    pub fn target(mut self, target: RenderTarget<B>) -> Self {
        self.target = target;
        self
    }
}
