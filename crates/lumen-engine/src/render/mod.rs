//! Per-frame batching renderer.
//!
//! A [`Renderer`] walks a [`RenderPass`]'s scene once per frame:
//! - collects renderables, allocating GPU resources on first sight
//! - sorts them by packed [`RenderStateKey`] to minimize state changes
//! - draws masks into the stencil buffer, then opaque and transparent buckets
//!
//! Nodes draw through a [`DrawContext`], which caches scalar uniform writes.

mod context;
mod key;
mod pass;
mod renderable;
mod renderer;
mod sort;
mod stats;
mod viewport;

pub use context::DrawContext;
pub use key::{BlendMode, DecodedKey, MAX_BLEND_MODE, MAX_PROGRAM_ID, MAX_VERTEX_LAYOUT_ID, RenderStateKey};
pub use pass::{RenderPass, RenderTarget};
pub use renderable::{Renderable, RenderableRef, RenderableState, renderable, same_node};
pub use renderer::{RenderPhase, Renderer, RendererConfig};
pub use sort::{DrawEntry, opaque_order, sort_opaque, sort_transparent, transparent_order};
pub use stats::FrameStats;
pub use viewport::Viewport;

pub use crate::backend::ClearOptions;
