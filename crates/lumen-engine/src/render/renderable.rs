use std::cell::RefCell;
use std::rc::Rc;

use super::context::DrawContext;
use super::key::BlendMode;
use crate::backend::Backend;
use crate::device::{Device, Program, RenderError, Result, VertexLayout};
use crate::shared::SharedResources;

/// Shared, mutable handle to a drawable node.
///
/// Scene trees, mask references and the renderer's per-frame buckets all
/// hold clones of the same `Rc`. Identity (for mask deduplication) is
/// pointer identity.
pub type RenderableRef<B> = Rc<RefCell<dyn Renderable<B>>>;

/// Wraps a renderable into a [`RenderableRef`].
pub fn renderable<B: Backend, R: Renderable<B> + 'static>(node: R) -> RenderableRef<B> {
    Rc::new(RefCell::new(node))
}

/// `true` if both handles point at the same node.
#[inline]
pub fn same_node<B: Backend>(a: &RenderableRef<B>, b: &RenderableRef<B>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// Per-node render flags and GPU resources.
pub struct RenderableState<B: Backend> {
    /// Collected at all. `false` also skips allocation.
    pub render: bool,
    /// Drawn when collected.
    pub visible: bool,
    /// Nodes at or below 0 are collected but not drawn.
    pub opacity: f32,
    /// Forces the bucket; `None` means transparent iff `opacity < 1`.
    pub transparent: Option<bool>,
    /// `None` resolves to premultiplied alpha for transparent nodes, else
    /// no blending.
    pub blend_mode: Option<BlendMode>,
    /// Node whose stencil footprint clips this one.
    pub mask: Option<RenderableRef<B>>,
    /// Depth order; smaller is nearer. Opaque nodes draw front-to-back
    /// within equal render state, transparent nodes back-to-front.
    pub render_order_z: f32,

    program: Option<Program>,
    vertex_layout: Option<VertexLayout>,
    needs_allocate: bool,
}

impl<B: Backend> Default for RenderableState<B> {
    fn default() -> Self {
        Self {
            render: true,
            visible: true,
            opacity: 1.0,
            transparent: None,
            blend_mode: None,
            mask: None,
            render_order_z: 0.0,
            program: None,
            vertex_layout: None,
            needs_allocate: true,
        }
    }
}

impl<B: Backend> RenderableState<B> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn program(&self) -> Option<Program> {
        self.program
    }

    #[inline]
    pub fn vertex_layout(&self) -> Option<VertexLayout> {
        self.vertex_layout
    }

    pub fn set_program(&mut self, program: Program) {
        self.program = Some(program);
    }

    pub fn set_vertex_layout(&mut self, layout: VertexLayout) {
        self.vertex_layout = Some(layout);
    }

    pub fn set_gpu_resources(&mut self, program: Program, layout: VertexLayout) {
        self.program = Some(program);
        self.vertex_layout = Some(layout);
    }

    /// Runs `allocate_gpu_resources` again before the next draw.
    pub fn invalidate_gpu_resources(&mut self) {
        self.needs_allocate = true;
    }

    #[inline]
    pub fn needs_allocate(&self) -> bool {
        self.needs_allocate
    }

    /// Bucket this node sorts into.
    pub fn is_transparent(&self) -> bool {
        self.transparent.unwrap_or(self.opacity < 1.0)
    }

    pub fn resolved_blend_mode(&self) -> BlendMode {
        self.blend_mode.unwrap_or(if self.is_transparent() {
            BlendMode::PremultipliedAlpha
        } else {
            BlendMode::None
        })
    }

    /// Draws at all this frame.
    pub fn is_drawn(&self) -> bool {
        self.visible && self.opacity > 0.0
    }

    /// Program and layout, or the contract error for whichever is unset.
    pub(crate) fn gpu_resources(&self) -> Result<(Program, VertexLayout)> {
        let program = self.program.ok_or(RenderError::MissingGpuResource { field: "program" })?;
        let layout = self
            .vertex_layout
            .ok_or(RenderError::MissingGpuResource { field: "vertex_layout" })?;
        Ok((program, layout))
    }

    pub(crate) fn mark_allocated(&mut self) {
        self.needs_allocate = false;
    }
}

/// A node the renderer can draw.
///
/// The renderer calls `allocate_gpu_resources` lazily (first collection, or
/// after [`RenderableState::invalidate_gpu_resources`]); it must leave both a
/// program and a vertex layout set on the node's state. `draw` runs with
/// that program and layout already bound and should only write uniforms and
/// issue draws through the context.
pub trait Renderable<B: Backend> {
    fn state(&self) -> &RenderableState<B>;
    fn state_mut(&mut self) -> &mut RenderableState<B>;

    fn allocate_gpu_resources(&mut self, device: &mut Device<B>, shared: &mut SharedResources<B>) -> Result<()>;

    fn draw(&mut self, context: &mut DrawContext<'_, B>) -> Result<()>;
}

/// Allocates if the node asks for it, then checks the contract.
pub(crate) fn ensure_allocated<B: Backend>(
    node: &mut dyn Renderable<B>,
    device: &mut Device<B>,
    shared: &mut SharedResources<B>,
) -> Result<(Program, VertexLayout)> {
    if node.state().needs_allocate() {
        node.allocate_gpu_resources(device, shared)?;
        node.state_mut().mark_allocated();
    }
    node.state().gpu_resources()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    type State = RenderableState<HeadlessBackend>;

    #[test]
    fn transparency_follows_opacity_unless_forced() {
        let mut s = State::new();
        assert!(!s.is_transparent());
        assert_eq!(s.resolved_blend_mode(), BlendMode::None);

        s.opacity = 0.5;
        assert!(s.is_transparent());
        assert_eq!(s.resolved_blend_mode(), BlendMode::PremultipliedAlpha);

        s.transparent = Some(false);
        assert!(!s.is_transparent());
        s.blend_mode = Some(BlendMode::PremultipliedAlpha);
        assert_eq!(s.resolved_blend_mode(), BlendMode::PremultipliedAlpha);
    }

    #[test]
    fn missing_resources_name_the_field() {
        let mut s = State::new();
        assert_eq!(s.gpu_resources(), Err(RenderError::MissingGpuResource { field: "program" }));
        s.set_program(Program { id: 0 });
        assert_eq!(s.gpu_resources(), Err(RenderError::MissingGpuResource { field: "vertex_layout" }));
    }

    #[test]
    fn zero_opacity_or_hidden_is_not_drawn() {
        let mut s = State::new();
        assert!(s.is_drawn());
        s.opacity = 0.0;
        assert!(!s.is_drawn());
        s.opacity = 1.0;
        s.visible = false;
        assert!(!s.is_drawn());
    }
}
