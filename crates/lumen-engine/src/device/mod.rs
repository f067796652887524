//! GPU resource management.
//!
//! This module is responsible for:
//! - creating and destroying buffers, index buffers, textures, programs and
//!   vertex layouts on a [`Backend`](crate::backend::Backend)
//! - sharing compiled shader stages between programs by source text
//! - keeping textures resident on texture units
//! - keyed caches: by reference count or by per-frame use
//! - replaying vertex input when native vertex arrays are unavailable

mod descriptors;
mod error;
mod gpu;
mod handles;
mod ids;
mod init;
mod ref_count;
mod texture_units;
mod uniform;
mod usage_cache;
mod vertex;

pub use descriptors::{
    Attribute, AttributeLayout, AttributeType, BufferAttribute, BufferDescriptor, IndexBufferDescriptor,
    IndexData, PixelStorageOverrides, SamplingOverrides, TextureDescriptor, TextureSource, VertexAttribute,
    VertexLayoutDescriptor,
};
pub use error::{RenderError, Result};
pub use gpu::{Device, DeviceId, ObjectCounts, ProgramInfo, VertexLayoutInfo};
pub use handles::{Buffer, IndexBuffer, Program, Texture, VertexLayout};
pub use ids::IdAllocator;
pub use init::DeviceConfig;
pub use ref_count::{RefCountCache, Release};
pub use texture_units::{Assignment, TextureUnits};
pub use uniform::CachedUniform;
pub use usage_cache::UsageCache;
