//! Scene boundary consumed by the renderer.
//!
//! Layout, transforms and animation live outside the engine core. The
//! renderer only needs two things from a scene: a chance to bring transforms
//! up to date, and a walk over its renderables in tree order.

mod node;

pub use node::SceneNode;

use crate::backend::Backend;
use crate::render::RenderableRef;

pub trait SceneRoot<B: Backend> {
    /// Recomputes world transforms. Called once at the start of every render.
    fn update_transforms(&mut self) {}

    /// Visits every renderable in tree order (parents before children,
    /// siblings in insertion order).
    fn visit_renderables(&self, visit: &mut dyn FnMut(&RenderableRef<B>));
}
