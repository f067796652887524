use super::SceneRoot;
use crate::backend::Backend;
use crate::render::RenderableRef;

/// Minimal retained tree: an optional renderable plus ordered children.
pub struct SceneNode<B: Backend> {
    renderable: Option<RenderableRef<B>>,
    children: Vec<SceneNode<B>>,
}

impl<B: Backend> Default for SceneNode<B> {
    fn default() -> Self {
        Self { renderable: None, children: Vec::new() }
    }
}

impl<B: Backend> SceneNode<B> {
    /// A node that only groups children.
    pub fn group() -> Self {
        Self::default()
    }

    pub fn leaf(renderable: RenderableRef<B>) -> Self {
        Self { renderable: Some(renderable), children: Vec::new() }
    }

    pub fn with_child(mut self, child: SceneNode<B>) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: SceneNode<B>) {
        self.children.push(child);
    }

    #[inline]
    pub fn renderable(&self) -> Option<&RenderableRef<B>> {
        self.renderable.as_ref()
    }

    #[inline]
    pub fn children(&self) -> &[SceneNode<B>] {
        &self.children
    }

    #[inline]
    pub fn children_mut(&mut self) -> &mut Vec<SceneNode<B>> {
        &mut self.children
    }
}

impl<B: Backend> SceneRoot<B> for SceneNode<B> {
    fn visit_renderables(&self, visit: &mut dyn FnMut(&RenderableRef<B>)) {
        if let Some(r) = &self.renderable {
            visit(r);
        }
        for child in &self.children {
            child.visit_renderables(visit);
        }
    }
}
