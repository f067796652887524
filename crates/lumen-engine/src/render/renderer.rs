use super::context::DrawContext;
use super::key::{BlendMode, RenderStateKey};
use super::pass::{RenderPass, RenderTarget};
use super::renderable::{RenderableRef, ensure_allocated, same_node};
use super::sort::{DrawEntry, sort_opaque, sort_transparent};
use super::stats::FrameStats;
use super::viewport::Viewport;
use crate::backend::{
    Backend, BlendEquation, BlendFactor, Capability, ClearOptions, StencilFunc, StencilOp,
};
use crate::device::{Device, Program, RenderError, Result, VertexLayout};
use crate::shared::SharedResources;

/// Where the renderer is within `render()`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum RenderPhase {
    #[default]
    Idle,
    Collect,
    Sort,
    MaskPass,
    OpaquePass,
    TransparentPass,
}

#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Masks beyond this count alias in the 8-bit stencil buffer.
    pub max_safe_masks: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self { max_safe_masks: 254 }
    }
}

/// GPU state last set by this renderer. `None` is unknown.
///
/// Program and vertex layout are also compared against the device's own
/// record before being skipped.
#[derive(Debug, Default)]
struct GpuState {
    program: Option<Program>,
    vertex_layout: Option<VertexLayout>,
    blend: Option<BlendMode>,
    stencil_test: Option<bool>,
    mask_value: Option<u8>,
}

/// Batching renderer.
///
/// Each `render()` collects the scene's renderables into an opaque and a
/// transparent bucket, sorts them to group GPU state, draws masks into the
/// stencil buffer, then draws opaque nodes front-to-back by state and
/// transparent nodes back-to-front with depth writes off.
pub struct Renderer<B: Backend> {
    config: RendererConfig,
    phase: RenderPhase,
    visited: Vec<RenderableRef<B>>,
    masks: Vec<RenderableRef<B>>,
    opaque: Vec<DrawEntry<RenderableRef<B>>>,
    transparent: Vec<DrawEntry<RenderableRef<B>>>,
    state: GpuState,
    viewport: Viewport,
}

impl<B: Backend> Default for Renderer<B> {
    fn default() -> Self {
        Self::new(RendererConfig::default())
    }
}

impl<B: Backend> Renderer<B> {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            phase: RenderPhase::Idle,
            visited: Vec::new(),
            masks: Vec::new(),
            opaque: Vec::new(),
            transparent: Vec::new(),
            state: GpuState::default(),
            viewport: Viewport::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    #[inline]
    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    /// Renders one pass. Any error aborts the frame; the renderer is left
    /// idle and ready for the next call.
    pub fn render(
        &mut self,
        device: &mut Device<B>,
        shared: &mut SharedResources<B>,
        pass: &mut RenderPass<'_, B>,
    ) -> Result<FrameStats> {
        let result = self.render_inner(device, shared, pass);
        self.phase = RenderPhase::Idle;
        self.visited.clear();
        self.masks.clear();
        self.opaque.clear();
        self.transparent.clear();
        result
    }

    fn render_inner(
        &mut self,
        device: &mut Device<B>,
        shared: &mut SharedResources<B>,
        pass: &mut RenderPass<'_, B>,
    ) -> Result<FrameStats> {
        let mut stats = FrameStats::default();
        self.state = GpuState::default();

        pass.root.update_transforms();

        self.phase = RenderPhase::Collect;
        self.collect(device, shared, pass)?;
        for mask in &self.masks {
            ensure_allocated(&mut *mask.borrow_mut(), device, shared)?;
        }
        stats.opaque = self.opaque.len();
        stats.transparent = self.transparent.len();
        stats.masks = self.masks.len();

        self.phase = RenderPhase::Sort;
        sort_opaque(&mut self.opaque);
        sort_transparent(&mut self.transparent);

        if let RenderTarget::Framebuffer(_) = pass.target {
            return Err(RenderError::UnsupportedTarget(format!("{:?}", pass.target)));
        }
        self.viewport = Viewport::full(device.drawing_buffer_size());
        {
            let backend = device.backend_mut();
            backend.bind_framebuffer(None);
            let vp = self.viewport;
            backend.viewport(vp.x, vp.y, vp.width, vp.height);
        }

        if !pass.clear.is_empty() {
            // Write masks gate clears; the previous frame ends with depth writes off.
            let backend = device.backend_mut();
            backend.color_mask(true);
            backend.depth_mask(true);
            backend.stencil_mask(0xFF);
            backend.clear(&pass.clear);
            stats.clears += 1;
        }

        if !self.masks.is_empty() {
            self.phase = RenderPhase::MaskPass;
            self.mask_pass(device, pass.clear, &mut stats)?;
        }

        {
            let backend = device.backend_mut();
            backend.color_mask(true);
            backend.depth_mask(true);
            backend.stencil_mask(0x00);
            if self.masks.is_empty() {
                backend.set_enabled(Capability::StencilTest, false);
                self.state.stencil_test = Some(false);
            } else {
                backend.stencil_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Keep);
            }
        }

        self.phase = RenderPhase::OpaquePass;
        let opaque = std::mem::take(&mut self.opaque);
        let drawn = self.draw_entries(device, &opaque, &mut stats);
        self.opaque = opaque;
        drawn?;

        // Transparent nodes depth-test but do not write depth.
        device.backend_mut().depth_mask(false);
        self.phase = RenderPhase::TransparentPass;
        let transparent = std::mem::take(&mut self.transparent);
        let drawn = self.draw_entries(device, &transparent, &mut stats);
        self.transparent = transparent;
        drawn?;

        log::trace!("frame: {stats:?}");
        Ok(stats)
    }

    fn collect(
        &mut self,
        device: &mut Device<B>,
        shared: &mut SharedResources<B>,
        pass: &mut RenderPass<'_, B>,
    ) -> Result<()> {
        self.visited.clear();
        let visited = &mut self.visited;
        pass.root.visit_renderables(&mut |node| visited.push(node.clone()));

        for node in &self.visited {
            let mask = {
                let node = node.borrow();
                if !node.state().render {
                    continue;
                }
                node.state().mask.clone()
            };
            let mask = mask.map(|m| match self.masks.iter().position(|seen| same_node(seen, &m)) {
                Some(index) => index,
                None => {
                    self.masks.push(m);
                    self.masks.len() - 1
                }
            });

            let mut guard = node.borrow_mut();
            let (program, layout) = ensure_allocated(&mut *guard, device, shared)?;
            let state = guard.state();
            let key = RenderStateKey::try_encode(program.id(), layout.id(), state.resolved_blend_mode())?;
            let entry = DrawEntry { node: node.clone(), key, z: state.render_order_z, mask };
            if state.is_transparent() {
                self.transparent.push(entry);
            } else {
                self.opaque.push(entry);
            }
        }
        Ok(())
    }

    fn mask_pass(&mut self, device: &mut Device<B>, clear: ClearOptions, stats: &mut FrameStats) -> Result<()> {
        if self.masks.len() > self.config.max_safe_masks {
            log::warn!(
                "{} masks in one pass; masks beyond {} share stencil values",
                self.masks.len(),
                self.config.max_safe_masks
            );
        }

        {
            let backend = device.backend_mut();
            backend.set_enabled(Capability::StencilTest, true);
            backend.color_mask(false);
            backend.depth_mask(true);
            backend.set_enabled(Capability::Blend, false);
            backend.stencil_func(StencilFunc::Always, 0xFF, 0xFF);
            backend.stencil_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Replace);
        }
        self.state.stencil_test = Some(true);
        self.state.blend = Some(BlendMode::None);
        self.state.mask_value = None;

        for (index, mask) in self.masks.iter().enumerate() {
            let mut node = mask.borrow_mut();
            let (program, layout) = node.state().gpu_resources()?;
            Self::bind(&mut self.state, device, program, layout, stats)?;
            device.backend_mut().stencil_mask(stencil_value(index).into());
            let mut ctx = DrawContext::new(device, program, layout, self.viewport);
            node.draw(&mut ctx)?;
            stats.draws += 1;
        }

        // Mask geometry wrote depth; the main pass starts from a clean depth buffer.
        if let Some(depth) = clear.depth {
            device.backend_mut().clear(&ClearOptions::depth_only(depth));
            stats.clears += 1;
        }
        Ok(())
    }

    fn draw_entries(
        &mut self,
        device: &mut Device<B>,
        entries: &[DrawEntry<RenderableRef<B>>],
        stats: &mut FrameStats,
    ) -> Result<()> {
        for entry in entries {
            let mut node = entry.node.borrow_mut();
            if !node.state().is_drawn() {
                stats.skipped += 1;
                continue;
            }
            let blend = BlendMode::from_bits(entry.key.blend_bits())?;
            let (program, layout) = node.state().gpu_resources()?;

            Self::bind(&mut self.state, device, program, layout, stats)?;
            self.set_blend_mode(device, blend, stats);
            self.set_mask_test(device, entry.mask);

            let mut ctx = DrawContext::new(device, program, layout, self.viewport);
            node.draw(&mut ctx)?;
            stats.draws += 1;
        }
        Ok(())
    }

    fn bind(
        state: &mut GpuState,
        device: &mut Device<B>,
        program: Program,
        layout: VertexLayout,
        stats: &mut FrameStats,
    ) -> Result<()> {
        // The device is checked too: a node's `draw` may have changed its
        // bindings through `DrawContext::device_mut`.
        if state.program != Some(program) || device.active_program() != Some(program) {
            device.use_program(program)?;
            state.program = Some(program);
            stats.program_changes += 1;
            log::trace!("program -> {}", program.id());
        }
        if state.vertex_layout != Some(layout) || device.active_vertex_layout() != Some(layout) {
            device.bind_vertex_layout(layout)?;
            state.vertex_layout = Some(layout);
            stats.vertex_layout_changes += 1;
            log::trace!("vertex layout -> {}", layout.id());
        }
        Ok(())
    }

    fn set_blend_mode(&mut self, device: &mut Device<B>, blend: BlendMode, stats: &mut FrameStats) {
        if self.state.blend == Some(blend) {
            return;
        }
        let backend = device.backend_mut();
        match blend {
            BlendMode::None => backend.set_enabled(Capability::Blend, false),
            BlendMode::PremultipliedAlpha => {
                backend.set_enabled(Capability::Blend, true);
                backend.blend_func(BlendEquation::Add, BlendFactor::One, BlendFactor::OneMinusSrcAlpha);
            }
        }
        self.state.blend = Some(blend);
        stats.blend_changes += 1;
    }

    fn set_mask_test(&mut self, device: &mut Device<B>, mask: Option<usize>) {
        let backend = device.backend_mut();
        match mask {
            Some(index) => {
                if self.state.stencil_test != Some(true) {
                    backend.set_enabled(Capability::StencilTest, true);
                    self.state.stencil_test = Some(true);
                }
                let value = stencil_value(index);
                if self.state.mask_value != Some(value) {
                    backend.stencil_func(StencilFunc::Equal, i32::from(value), 0xFF);
                    self.state.mask_value = Some(value);
                }
            }
            None => {
                if self.state.stencil_test != Some(false) {
                    backend.set_enabled(Capability::StencilTest, false);
                    self.state.stencil_test = Some(false);
                }
            }
        }
    }
}

/// Stencil value for mask `index`. 0 is the cleared value; past 255 masks wrap.
#[inline]
fn stencil_value(index: usize) -> u8 {
    ((index + 1) % 256) as u8
}
