//! Per-device dedup of GPU objects built from identical inputs.
//!
//! `SharedResources` sits beside the [`Device`]: renderables call into it from
//! `allocate_gpu_resources` so that a hundred rectangles share one program and
//! one quad. Entries are not reference counted; they live until deleted by key
//! or until [`SharedResources::release`] tears down a device's shard. Owners
//! that delete a shared entry must coordinate with every other user of it.

use std::collections::HashMap;

use crate::backend::Backend;
use crate::device::{
    Attribute, AttributeLayout, AttributeType, Buffer, BufferAttribute, BufferDescriptor, Device, DeviceId,
    IndexBuffer, IndexBufferDescriptor, IndexData, Program, Result, Texture, TextureDescriptor,
    VertexAttribute, VertexLayout, VertexLayoutDescriptor,
};

/// Two triangles over the four quad corners below.
const QUAD_INDICES: [u8; 6] = [0, 1, 2, 0, 3, 1];
/// Corners of `[-1, 1]²`.
const UNIT_QUAD_VERTICES: [f32; 8] = [-1.0, -1.0, 1.0, 1.0, -1.0, 1.0, 1.0, -1.0];
/// Corners of `[0, 1]²`.
const QUAD_1X1_VERTICES: [f32; 8] = [0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0];

/// Identity of a cached program: both sources plus the attribute layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProgramKey {
    vertex: String,
    fragment: String,
    layout: AttributeLayout,
}

struct Quad<B: Backend> {
    buffer: Buffer<B>,
    layout: VertexLayout,
}

struct Shard<B: Backend> {
    programs: HashMap<ProgramKey, Program>,
    textures: HashMap<String, Texture<B>>,
    buffers: HashMap<String, Buffer<B>>,
    quad_index_buffer: Option<IndexBuffer<B>>,
    unit_quad: Option<Quad<B>>,
    quad_1x1: Option<Quad<B>>,
}

impl<B: Backend> Default for Shard<B> {
    fn default() -> Self {
        Self {
            programs: HashMap::new(),
            textures: HashMap::new(),
            buffers: HashMap::new(),
            quad_index_buffer: None,
            unit_quad: None,
            quad_1x1: None,
        }
    }
}

#[derive(Copy, Clone)]
enum QuadKind {
    Unit,
    OneByOne,
}

/// Registry of shared GPU objects, sharded by device.
pub struct SharedResources<B: Backend> {
    shards: HashMap<DeviceId, Shard<B>>,
}

impl<B: Backend> Default for SharedResources<B> {
    fn default() -> Self {
        Self { shards: HashMap::new() }
    }
}

impl<B: Backend> SharedResources<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute layout of the shared quads: a single `vec2 position`.
    pub fn quad_attribute_layout() -> AttributeLayout {
        AttributeLayout::new([Attribute::new("position", AttributeType::Vec2)])
    }

    fn shard(&mut self, device: &Device<B>) -> &mut Shard<B> {
        self.shards.entry(device.id()).or_default()
    }

    // ── programs ──────────────────────────────────────────────────────────

    /// Returns the cached program for these inputs, creating it on first use.
    pub fn get_program(
        &mut self,
        device: &mut Device<B>,
        vertex_source: &str,
        fragment_source: &str,
        layout: &AttributeLayout,
    ) -> Result<Program> {
        let key = ProgramKey {
            vertex: vertex_source.to_owned(),
            fragment: fragment_source.to_owned(),
            layout: layout.clone(),
        };
        let shard = self.shard(device);
        if let Some(&program) = shard.programs.get(&key) {
            return Ok(program);
        }
        let program = device.create_program(vertex_source, fragment_source, layout)?;
        shard.programs.insert(key, program);
        Ok(program)
    }

    /// Removes and destroys a cached program. `false` if nothing was cached.
    pub fn delete_program(
        &mut self,
        device: &mut Device<B>,
        vertex_source: &str,
        fragment_source: &str,
        layout: &AttributeLayout,
    ) -> Result<bool> {
        let key = ProgramKey {
            vertex: vertex_source.to_owned(),
            fragment: fragment_source.to_owned(),
            layout: layout.clone(),
        };
        match self.shard(device).programs.remove(&key) {
            Some(program) => device.delete_program(program).map(|()| true),
            None => Ok(false),
        }
    }

    // ── textures / buffers ────────────────────────────────────────────────

    pub fn get_texture(
        &mut self,
        device: &mut Device<B>,
        key: &str,
        descriptor: &TextureDescriptor<'_>,
    ) -> Result<Texture<B>> {
        let shard = self.shard(device);
        if let Some(&texture) = shard.textures.get(key) {
            return Ok(texture);
        }
        let texture = device.create_texture(descriptor)?;
        shard.textures.insert(key.to_owned(), texture);
        Ok(texture)
    }

    pub fn delete_texture(&mut self, device: &mut Device<B>, key: &str) -> Result<bool> {
        match self.shard(device).textures.remove(key) {
            Some(texture) => device.delete_texture(texture).map(|()| true),
            None => Ok(false),
        }
    }

    pub fn get_buffer(
        &mut self,
        device: &mut Device<B>,
        key: &str,
        descriptor: &BufferDescriptor<'_>,
    ) -> Result<Buffer<B>> {
        let shard = self.shard(device);
        if let Some(&buffer) = shard.buffers.get(key) {
            return Ok(buffer);
        }
        let buffer = device.create_buffer(descriptor)?;
        shard.buffers.insert(key.to_owned(), buffer);
        Ok(buffer)
    }

    pub fn delete_buffer(&mut self, device: &mut Device<B>, key: &str) -> Result<bool> {
        match self.shard(device).buffers.remove(key) {
            Some(buffer) => device.delete_buffer(buffer).map(|()| true),
            None => Ok(false),
        }
    }

    /// Number of programs cached for `device`.
    pub fn program_count(&self, device: &Device<B>) -> usize {
        self.shards.get(&device.id()).map_or(0, |s| s.programs.len())
    }

    // ── shared geometry ───────────────────────────────────────────────────

    /// `u8` indices for two triangles covering either shared quad.
    pub fn quad_index_buffer(&mut self, device: &mut Device<B>) -> Result<IndexBuffer<B>> {
        let shard = self.shard(device);
        if let Some(ib) = shard.quad_index_buffer {
            return Ok(ib);
        }
        let ib = device.create_index_buffer(&IndexBufferDescriptor::from_data(IndexData::U8(&QUAD_INDICES)))?;
        shard.quad_index_buffer = Some(ib);
        Ok(ib)
    }

    /// Quad spanning `[-1, 1]²`, e.g. for full-screen passes.
    pub fn unit_quad_vertex_buffer(&mut self, device: &mut Device<B>) -> Result<Buffer<B>> {
        self.quad(device, QuadKind::Unit).map(|q| q.0)
    }

    pub fn unit_quad_vertex_layout(&mut self, device: &mut Device<B>) -> Result<VertexLayout> {
        self.quad(device, QuadKind::Unit).map(|q| q.1)
    }

    /// Quad spanning `[0, 1]²`, scaled and offset per draw.
    pub fn quad_1x1_vertex_buffer(&mut self, device: &mut Device<B>) -> Result<Buffer<B>> {
        self.quad(device, QuadKind::OneByOne).map(|q| q.0)
    }

    pub fn quad_1x1_vertex_layout(&mut self, device: &mut Device<B>) -> Result<VertexLayout> {
        self.quad(device, QuadKind::OneByOne).map(|q| q.1)
    }

    fn quad(&mut self, device: &mut Device<B>, kind: QuadKind) -> Result<(Buffer<B>, VertexLayout)> {
        let cached = {
            let shard = self.shard(device);
            match kind {
                QuadKind::Unit => shard.unit_quad.as_ref(),
                QuadKind::OneByOne => shard.quad_1x1.as_ref(),
            }
            .map(|q| (q.buffer, q.layout))
        };
        if let Some(quad) = cached {
            return Ok(quad);
        }

        let index_buffer = self.quad_index_buffer(device)?;
        let vertices: &[f32] = match kind {
            QuadKind::Unit => &UNIT_QUAD_VERTICES,
            QuadKind::OneByOne => &QUAD_1X1_VERTICES,
        };
        let buffer = device.create_buffer(&BufferDescriptor::from_slice(vertices))?;
        let layout = device.create_vertex_layout(
            VertexLayoutDescriptor::new(Self::quad_attribute_layout())
                .index_buffer(index_buffer)
                .attribute("position", VertexAttribute::Buffer(BufferAttribute::new(buffer))),
        )?;

        let quad = Quad { buffer, layout };
        let shard = self.shard(device);
        match kind {
            QuadKind::Unit => shard.unit_quad = Some(quad),
            QuadKind::OneByOne => shard.quad_1x1 = Some(quad),
        }
        Ok((buffer, layout))
    }

    // ── teardown ──────────────────────────────────────────────────────────

    /// Destroys every object cached for `device`, shared geometry included.
    ///
    /// Objects already deleted behind the cache's back are skipped with a
    /// warning.
    pub fn release(&mut self, device: &mut Device<B>) {
        let Some(shard) = self.shards.remove(&device.id()) else {
            return;
        };
        let warn = |what: &str, result: Result<()>| {
            if let Err(err) = result {
                log::warn!("shared {what} release: {err}");
            }
        };

        for (_, program) in shard.programs {
            warn("program", device.delete_program(program));
        }
        for (_, texture) in shard.textures {
            warn("texture", device.delete_texture(texture));
        }
        for (_, buffer) in shard.buffers {
            warn("buffer", device.delete_buffer(buffer));
        }
        for quad in [shard.unit_quad, shard.quad_1x1].into_iter().flatten() {
            warn("quad layout", device.delete_vertex_layout(quad.layout));
            warn("quad buffer", device.delete_buffer(quad.buffer));
        }
        if let Some(ib) = shard.quad_index_buffer {
            warn("quad index buffer", device.delete_index_buffer(ib));
        }
        log::debug!("shared resources released for device `{}`", device.label());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, HeadlessBackend};
    use crate::test_support::{FS, VS, position_layout};

    fn setup() -> (Device<HeadlessBackend>, SharedResources<HeadlessBackend>) {
        (Device::new(HeadlessBackend::default()), SharedResources::new())
    }

    #[test]
    fn identical_inputs_share_one_program() {
        let (mut d, mut shared) = setup();
        let layout = position_layout();
        let a = shared.get_program(&mut d, VS, FS, &layout).unwrap();
        let b = shared.get_program(&mut d, VS, FS, &layout).unwrap();
        assert_eq!(a, b);
        assert_eq!(d.counts().programs, 1);
        assert_eq!(d.backend().count(|c| matches!(c, Command::LinkProgram { .. })), 1);

        // A different layout is a different program.
        let other = AttributeLayout::new([Attribute::new("position", AttributeType::Vec3)]);
        let c = shared.get_program(&mut d, VS, FS, &other).unwrap();
        assert_ne!(a, c);
        assert_eq!(shared.program_count(&d), 2);
    }

    #[test]
    fn second_delete_is_a_noop() {
        let (mut d, mut shared) = setup();
        let layout = position_layout();
        shared.get_program(&mut d, VS, FS, &layout).unwrap();
        assert_eq!(shared.delete_program(&mut d, VS, FS, &layout), Ok(true));
        assert_eq!(shared.delete_program(&mut d, VS, FS, &layout), Ok(false));
        assert_eq!(d.counts().programs, 0);

        shared.get_buffer(&mut d, "k", &BufferDescriptor::with_size(16)).unwrap();
        assert_eq!(shared.delete_buffer(&mut d, "k"), Ok(true));
        assert_eq!(shared.delete_buffer(&mut d, "k"), Ok(false));
    }

    #[test]
    fn deleted_program_is_recreated_not_resurrected() {
        let (mut d, mut shared) = setup();
        let layout = position_layout();
        shared.get_program(&mut d, VS, FS, &layout).unwrap();
        shared.delete_program(&mut d, VS, FS, &layout).unwrap();
        shared.get_program(&mut d, VS, FS, &layout).unwrap();

        assert_eq!(d.backend().count(|c| matches!(c, Command::LinkProgram { .. })), 2);
        assert_eq!(d.backend().count(|c| matches!(c, Command::DeleteProgram(_))), 1);
        assert_eq!(d.counts().programs, 1);
    }

    #[test]
    fn shards_are_per_device() {
        let (mut d1, mut shared) = setup();
        let mut d2 = Device::new(HeadlessBackend::default());
        let layout = position_layout();
        shared.get_program(&mut d1, VS, FS, &layout).unwrap();
        shared.get_program(&mut d2, VS, FS, &layout).unwrap();
        assert_eq!(d1.counts().programs, 1);
        assert_eq!(d2.counts().programs, 1);
    }

    #[test]
    fn textures_are_cached_by_key() {
        let (mut d, mut shared) = setup();
        let a = shared.get_texture(&mut d, "white", &TextureDescriptor::rgba8(1, 1, &[255; 4])).unwrap();
        let b = shared.get_texture(&mut d, "white", &TextureDescriptor::empty(8, 8)).unwrap();
        assert_eq!(a, b);
        assert_eq!(d.counts().textures, 1);
        assert_eq!(shared.delete_texture(&mut d, "white"), Ok(true));
        assert_eq!(d.counts().textures, 0);
    }

    #[test]
    fn quads_share_one_index_buffer() {
        let (mut d, mut shared) = setup();
        let unit = shared.unit_quad_vertex_layout(&mut d).unwrap();
        let one = shared.quad_1x1_vertex_layout(&mut d).unwrap();
        assert_ne!(unit, one);
        assert_eq!(shared.unit_quad_vertex_layout(&mut d).unwrap(), unit);
        // One index buffer plus two vertex buffers.
        assert_eq!(d.counts().buffers, 3);
        assert_eq!(d.counts().vertex_layouts, 2);
        assert_eq!(
            d.vertex_layout_info(one).unwrap().index_type(),
            Some(crate::backend::IndexType::U8)
        );
    }

    #[test]
    fn release_destroys_everything() {
        let (mut d, mut shared) = setup();
        shared.get_program(&mut d, VS, FS, &position_layout()).unwrap();
        shared.get_texture(&mut d, "t", &TextureDescriptor::empty(2, 2)).unwrap();
        shared.get_buffer(&mut d, "b", &BufferDescriptor::with_size(4)).unwrap();
        shared.unit_quad_vertex_buffer(&mut d).unwrap();
        shared.quad_1x1_vertex_buffer(&mut d).unwrap();

        shared.release(&mut d);
        assert_eq!(d.counts(), crate::device::ObjectCounts::default());
        assert_eq!(d.backend().live_shaders(), 0);
        assert_eq!(d.backend().live_buffers(), 0);
        assert_eq!(d.backend().live_vertex_arrays(), 0);
        assert_eq!(shared.program_count(&d), 0);
    }
}
