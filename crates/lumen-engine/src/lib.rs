//! lumen: GPU resource management and a batching 2D renderer.
//!
//! The crate is organized leaf-first:
//! - [`backend`]: the immediate-mode GPU command surface and its implementations
//! - [`device`]: object lifecycle, shader sharing, texture units
//! - [`shared`]: per-device dedup of programs, textures, buffers and quads
//! - [`render`]: frame collection, sorting, masking and the draw facade
//! - [`scene`]: the boundary the renderer consumes

pub mod backend;
pub mod device;
pub mod logging;
pub mod render;
pub mod scene;
pub mod shared;

#[cfg(test)]
mod test_support;
