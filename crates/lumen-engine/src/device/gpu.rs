use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use super::descriptors::{
    AttributeLayout, BufferDescriptor, IndexBufferDescriptor, IndexData, TextureDescriptor,
    TextureSource, VertexLayoutDescriptor,
};
use super::error::{RenderError, Result};
use super::handles::{Buffer, IndexBuffer, Program, Texture, VertexLayout};
use super::ids::IdAllocator;
use super::init::DeviceConfig;
use super::ref_count::{RefCountCache, Release};
use super::texture_units::{Assignment, TextureUnits};
use super::uniform::CachedUniform;
use super::vertex::{apply_vertex_layout, buffer_slots};
use crate::backend::{
    Backend, BufferTarget, Capabilities, DrawMode, IndexType, ShaderStage, TexImage,
    TextureDataType, TextureFormat, TextureRegion, UniformType, UniformValue,
};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Device`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u64);

/// Live GPU objects owned through a device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ObjectCounts {
    pub programs: usize,
    pub vertex_layouts: usize,
    pub buffers: usize,
    pub textures: usize,
}

#[derive(Debug)]
struct UniformSlot<L> {
    ty: UniformType,
    size: i32,
    location: L,
}

/// A linked program and what the device knows about it.
pub struct ProgramInfo<B: Backend> {
    native: B::Program,
    vertex_source: String,
    fragment_source: String,
    attribute_layout: AttributeLayout,
    uniforms: HashMap<String, UniformSlot<B::UniformLocation>>,
    /// Last value written per uniform name, shared by every draw using this
    /// program.
    uniform_cache: HashMap<String, CachedUniform>,
}

impl<B: Backend> ProgramInfo<B> {
    #[inline]
    pub fn native(&self) -> B::Program {
        self.native
    }

    #[inline]
    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    #[inline]
    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    #[inline]
    pub fn attribute_layout(&self) -> &AttributeLayout {
        &self.attribute_layout
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    /// Type and array length of an active uniform.
    pub fn uniform(&self, name: &str) -> Option<(UniformType, i32)> {
        self.uniforms.get(name).map(|u| (u.ty, u.size))
    }

    pub fn uniform_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.uniforms.keys().map(String::as_str)
    }

    pub fn cached_uniform(&self, name: &str) -> Option<CachedUniform> {
        self.uniform_cache.get(name).copied()
    }
}

/// A vertex layout: a native vertex-array object, or the descriptor to
/// replay when none is available.
pub struct VertexLayoutInfo<B: Backend> {
    native: Option<B::VertexArray>,
    descriptor: VertexLayoutDescriptor<B>,
}

impl<B: Backend> VertexLayoutInfo<B> {
    #[inline]
    pub fn is_native(&self) -> bool {
        self.native.is_some()
    }

    #[inline]
    pub fn attribute_layout(&self) -> &AttributeLayout {
        &self.descriptor.attribute_layout
    }

    /// `Some` for indexed layouts.
    #[inline]
    pub fn index_type(&self) -> Option<IndexType> {
        self.descriptor.index_buffer.map(|b| b.index_type)
    }
}

#[derive(Debug)]
struct TextureRecord {
    unit: Option<u32>,
    data_type: TextureDataType,
    width: u32,
    height: u32,
}

/// GPU object lifecycle for one backend context.
///
/// Owns the backend. Programs and vertex layouts get dense recyclable ids;
/// compiled shader stages are shared by source text and destroyed with
/// their last program; textures are kept resident on texture units with
/// least-used eviction.
///
/// One device per context. Not `Clone`, not shared across threads.
pub struct Device<B: Backend> {
    backend: B,
    id: DeviceId,
    label: String,
    capabilities: Capabilities,

    program_ids: IdAllocator,
    programs: Vec<Option<ProgramInfo<B>>>,
    vertex_shaders: RefCountCache<String, B::Shader>,
    fragment_shaders: RefCountCache<String, B::Shader>,

    vertex_layout_ids: IdAllocator,
    vertex_layouts: Vec<Option<VertexLayoutInfo<B>>>,

    buffers: HashSet<B::Buffer>,
    textures: HashMap<B::Texture, TextureRecord>,
    texture_units: TextureUnits<B::Texture>,

    active_program: Option<u32>,
    active_vertex_layout: Option<u32>,
    /// Slots enabled by the last replayed layout (fallback path only).
    /// Survives across frames along with the GL state it mirrors.
    enabled_attribs: Vec<u32>,
}

fn slot_insert<T>(slots: &mut Vec<Option<T>>, id: u32, value: T) {
    let i = id as usize;
    if slots.len() <= i {
        slots.resize_with(i + 1, || None);
    }
    slots[i] = Some(value);
}

impl<B: Backend> Device<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, DeviceConfig::default())
    }

    pub fn with_config(backend: B, config: DeviceConfig) -> Self {
        let capabilities = backend.capabilities();
        let units = config
            .max_texture_units
            .map_or(capabilities.texture_units, |max| max.min(capabilities.texture_units));
        let label = config.label.unwrap_or_else(|| backend.renderer_name());

        log::debug!(
            "device `{label}`: {units} texture units, vao={}, instancing={}, uint indices={}",
            capabilities.vertex_array_objects,
            capabilities.instancing,
            capabilities.uint_indices,
        );

        Self {
            backend,
            id: DeviceId(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed)),
            label,
            capabilities: Capabilities { texture_units: units, ..capabilities },
            program_ids: IdAllocator::new(),
            programs: Vec::new(),
            vertex_shaders: RefCountCache::new(),
            fragment_shaders: RefCountCache::new(),
            vertex_layout_ids: IdAllocator::new(),
            vertex_layouts: Vec::new(),
            buffers: HashSet::new(),
            textures: HashMap::new(),
            texture_units: TextureUnits::new(units),
            active_program: None,
            active_vertex_layout: None,
            enabled_attribs: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Renderer string reported by the backend.
    pub fn name(&self) -> String {
        self.backend.renderer_name()
    }

    /// Capabilities in effect. `texture_units` reflects any configured cap.
    #[inline]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn counts(&self) -> ObjectCounts {
        ObjectCounts {
            programs: self.program_ids.count(),
            vertex_layouts: self.vertex_layout_ids.count(),
            buffers: self.buffers.len(),
            textures: self.textures.len(),
        }
    }

    #[inline]
    pub fn drawing_buffer_size(&self) -> (u32, u32) {
        self.backend.drawing_buffer_size()
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Direct backend access. Calls made here bypass the device's tracking
    /// of the bound program, vertex layout and texture units.
    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    // ── buffers ───────────────────────────────────────────────────────────

    pub fn create_buffer(&mut self, descriptor: &BufferDescriptor<'_>) -> Result<Buffer<B>> {
        let native = self
            .backend
            .create_buffer(BufferTarget::Array, descriptor.data, descriptor.usage)
            .map_err(|reason| RenderError::Allocation { object: "buffer", reason })?;
        self.buffers.insert(native);
        log::debug!("buffer {native:?}: {} bytes, {:?}", descriptor.data.len(), descriptor.usage);
        Ok(Buffer { native })
    }

    pub fn create_index_buffer(&mut self, descriptor: &IndexBufferDescriptor<'_>) -> Result<IndexBuffer<B>> {
        let index_type = descriptor.resolve_index_type()?;
        if index_type == IndexType::U32 && !self.capabilities.uint_indices {
            return Err(RenderError::Unsupported("32-bit index buffers"));
        }

        // Element-array bindings are vertex-array state; keep them off
        // whichever layout happens to be bound.
        self.detach_vertex_layout();
        let data = descriptor.buffer_data();
        let native = self
            .backend
            .create_buffer(BufferTarget::ElementArray, data, descriptor.usage)
            .map_err(|reason| RenderError::Allocation { object: "index buffer", reason })?;
        self.buffers.insert(native);
        log::debug!("index buffer {native:?}: {} bytes, {index_type:?}", data.len());
        Ok(IndexBuffer { native, index_type })
    }

    pub fn update_buffer_data(&mut self, buffer: &Buffer<B>, data: &[u8], offset_bytes: usize) -> Result<()> {
        if !self.buffers.contains(&buffer.native) {
            return Err(RenderError::UnknownHandle("buffer"));
        }
        self.backend.update_buffer(BufferTarget::Array, buffer.native, offset_bytes, data);
        Ok(())
    }

    /// `offset` counts indices, not bytes.
    pub fn update_index_buffer_data(
        &mut self,
        buffer: &IndexBuffer<B>,
        data: IndexData<'_>,
        offset: usize,
    ) -> Result<()> {
        if !self.buffers.contains(&buffer.native) {
            return Err(RenderError::UnknownHandle("index buffer"));
        }
        self.detach_vertex_layout();
        let offset_bytes = offset * buffer.index_type.byte_size() as usize;
        self.backend.update_buffer(BufferTarget::ElementArray, buffer.native, offset_bytes, data.bytes());
        Ok(())
    }

    pub fn delete_buffer(&mut self, buffer: Buffer<B>) -> Result<()> {
        self.delete_native_buffer(buffer.native, "buffer")
    }

    pub fn delete_index_buffer(&mut self, buffer: IndexBuffer<B>) -> Result<()> {
        self.delete_native_buffer(buffer.native, "index buffer")
    }

    fn delete_native_buffer(&mut self, native: B::Buffer, kind: &'static str) -> Result<()> {
        if !self.buffers.remove(&native) {
            log::warn!("delete of unknown {kind} {native:?} ignored");
            return Err(RenderError::UnknownHandle(kind));
        }
        self.backend.delete_buffer(native);
        log::debug!("{kind} {native:?} deleted");
        Ok(())
    }

    // ── vertex layouts ────────────────────────────────────────────────────

    pub fn create_vertex_layout(&mut self, descriptor: VertexLayoutDescriptor<B>) -> Result<VertexLayout> {
        descriptor.validate()?;
        if descriptor.uses_divisors() && !self.capabilities.instancing {
            return Err(RenderError::Unsupported("instanced vertex attributes"));
        }

        let native = if self.capabilities.vertex_array_objects {
            let vao = self
                .backend
                .create_vertex_array()
                .map_err(|reason| RenderError::Allocation { object: "vertex array", reason })?;
            self.backend.bind_vertex_array(Some(vao));
            apply_vertex_layout(&mut self.backend, &descriptor, self.capabilities.instancing);
            self.backend.bind_vertex_array(None);
            self.active_vertex_layout = None;
            Some(vao)
        } else {
            None
        };

        let id = self.vertex_layout_ids.assign();
        log::debug!(
            "vertex layout {id}: {} attributes, native={}",
            descriptor.attribute_layout.attributes().len(),
            native.is_some()
        );
        slot_insert(&mut self.vertex_layouts, id, VertexLayoutInfo { native, descriptor });
        Ok(VertexLayout { id })
    }

    pub fn delete_vertex_layout(&mut self, layout: VertexLayout) -> Result<()> {
        let info = self
            .vertex_layouts
            .get_mut(layout.id as usize)
            .and_then(Option::take)
            .ok_or(RenderError::UnknownHandle("vertex layout"))?;
        if let Some(vao) = info.native {
            self.backend.delete_vertex_array(vao);
        }
        self.vertex_layout_ids.release(layout.id);
        if self.active_vertex_layout == Some(layout.id) {
            self.active_vertex_layout = None;
        }
        log::debug!("vertex layout {} deleted", layout.id);
        Ok(())
    }

    pub fn vertex_layout_info(&self, layout: VertexLayout) -> Option<&VertexLayoutInfo<B>> {
        self.vertex_layouts.get(layout.id as usize)?.as_ref()
    }

    /// Layout whose vertex input is currently live on the backend.
    #[inline]
    pub fn active_vertex_layout(&self) -> Option<VertexLayout> {
        self.active_vertex_layout.map(|id| VertexLayout { id })
    }

    /// Makes `layout` the current vertex input.
    ///
    /// Without native vertex arrays, slots the previous layout enabled and
    /// this one does not are disabled first, then the full descriptor is
    /// replayed.
    pub(crate) fn bind_vertex_layout(&mut self, layout: VertexLayout) -> Result<()> {
        let info = self
            .vertex_layouts
            .get(layout.id as usize)
            .and_then(Option::as_ref)
            .ok_or(RenderError::UnknownHandle("vertex layout"))?;

        match info.native {
            Some(vao) => self.backend.bind_vertex_array(Some(vao)),
            None => {
                let next = buffer_slots(&info.descriptor);
                for &slot in self.enabled_attribs.iter().filter(|s| !next.contains(s)) {
                    self.backend.set_vertex_attrib_array_enabled(slot, false);
                }
                apply_vertex_layout(&mut self.backend, &info.descriptor, self.capabilities.instancing);
                self.enabled_attribs = next;
            }
        }
        self.active_vertex_layout = Some(layout.id);
        Ok(())
    }

    fn detach_vertex_layout(&mut self) {
        if self.capabilities.vertex_array_objects && self.active_vertex_layout.is_some() {
            self.backend.bind_vertex_array(None);
        }
        self.active_vertex_layout = None;
    }

    // ── textures ──────────────────────────────────────────────────────────

    /// Creates a texture and keeps it resident on a texture unit.
    pub fn create_texture(&mut self, descriptor: &TextureDescriptor<'_>) -> Result<Texture<B>> {
        if self.texture_units.is_empty() {
            return Err(RenderError::NoTextureUnits);
        }

        let native = self
            .backend
            .create_texture()
            .map_err(|reason| RenderError::Allocation { object: "texture", reason })?;
        let (width, height) = descriptor.allocated_size();
        self.textures.insert(
            native,
            TextureRecord { unit: None, data_type: descriptor.data_type, width, height },
        );
        let texture = Texture { native, width, height };
        self.acquire_texture_unit(&texture)?;

        self.backend.set_sampling(&descriptor.sampling.resolve());
        self.backend.set_pixel_storage(&descriptor.pixel_storage.resolve());

        let base = TexImage {
            level: 0,
            format: descriptor.format,
            width,
            height,
            data_type: descriptor.data_type,
            pixels: None,
        };
        if descriptor.mipmaps.is_empty() {
            self.backend.tex_image_2d(base);
        }
        for (level, source) in descriptor.mipmaps.iter().enumerate() {
            let level = level as u32;
            let (width, height, pixels) = match *source {
                TextureSource::Pixels(pixels) => {
                    let (w, h) = descriptor.level_size(level);
                    (w, h, pixels)
                }
                TextureSource::Image { width, height, pixels } => (width, height, pixels),
            };
            self.backend
                .tex_image_2d(TexImage { level, width, height, pixels: Some(pixels), ..base });
        }
        if descriptor.generate_mipmaps {
            self.backend.generate_mipmap();
        }

        log::debug!("texture {native:?}: {width}x{height} {:?}", descriptor.format);
        Ok(texture)
    }

    /// Uploads a sub-image. `region` defaults to the whole level.
    pub fn update_texture_data(
        &mut self,
        texture: &Texture<B>,
        level: u32,
        format: TextureFormat,
        pixels: &[u8],
        region: Option<TextureRegion>,
    ) -> Result<()> {
        let (unit, bound) = self.acquire_texture_unit(texture)?;
        if !bound {
            self.backend.bind_texture(unit, Some(texture.native));
        }
        let record = self
            .textures
            .get(&texture.native)
            .ok_or(RenderError::UnknownHandle("texture"))?;
        let region = region.unwrap_or_else(|| {
            let shrink = |v: u32| v.checked_shr(level).unwrap_or(0).max(1);
            TextureRegion { x: 0, y: 0, width: shrink(record.width), height: shrink(record.height) }
        });
        self.backend.tex_sub_image_2d(level, region, format, record.data_type, pixels);
        Ok(())
    }

    pub fn delete_texture(&mut self, texture: Texture<B>) -> Result<()> {
        let Some(record) = self.textures.remove(&texture.native) else {
            log::warn!("delete of unknown texture {:?} ignored", texture.native);
            return Err(RenderError::UnknownHandle("texture"));
        };
        if let Some(unit) = record.unit {
            self.texture_units.clear(unit);
            self.backend.bind_texture(unit, None);
        }
        self.backend.delete_texture(texture.native);
        log::debug!("texture {:?} deleted", texture.native);
        Ok(())
    }

    /// Unit currently owned by `texture`, if any.
    pub fn texture_unit(&self, texture: &Texture<B>) -> Option<u32> {
        self.textures.get(&texture.native)?.unit
    }

    /// Refreshes the usage stamp of a resident texture. `false` if it holds
    /// no unit.
    pub fn mark_texture_usage(&mut self, texture: &Texture<B>) -> bool {
        match self.texture_unit(texture) {
            Some(unit) => self.texture_units.touch(unit),
            None => false,
        }
    }

    /// Ensures `texture` owns a unit and returns it.
    ///
    /// A resident texture only has its usage refreshed; otherwise a unit is
    /// claimed (evicting the least-used binding when full) and bound.
    pub(crate) fn bind_texture(&mut self, texture: &Texture<B>) -> Result<u32> {
        self.acquire_texture_unit(texture).map(|(unit, _)| unit)
    }

    /// `(unit, freshly bound)`.
    fn acquire_texture_unit(&mut self, texture: &Texture<B>) -> Result<(u32, bool)> {
        let record = self
            .textures
            .get(&texture.native)
            .ok_or(RenderError::UnknownHandle("texture"))?;
        if let Some(unit) = record.unit {
            self.texture_units.touch(unit);
            return Ok((unit, false));
        }

        let Assignment { unit, evicted } = self.texture_units.assign().ok_or(RenderError::NoTextureUnits)?;
        if let Some(evicted) = evicted {
            if let Some(r) = self.textures.get_mut(&evicted) {
                r.unit = None;
            }
            log::trace!("texture unit {unit}: evicted {evicted:?}");
        }
        self.texture_units.occupy(unit, texture.native);
        if let Some(r) = self.textures.get_mut(&texture.native) {
            r.unit = Some(unit);
        }
        self.backend.bind_texture(unit, Some(texture.native));
        Ok((unit, true))
    }

    // ── programs ──────────────────────────────────────────────────────────

    /// Compiles (or reuses) both stages, binds attribute slots in layout
    /// order and links.
    pub fn create_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
        attribute_layout: &AttributeLayout,
    ) -> Result<Program> {
        let vertex = self.acquire_shader(ShaderStage::Vertex, vertex_source)?;
        let fragment = match self.acquire_shader(ShaderStage::Fragment, fragment_source) {
            Ok(shader) => shader,
            Err(err) => {
                self.release_shader(ShaderStage::Vertex, vertex_source);
                return Err(err);
            }
        };

        let native = match self.backend.link_program(vertex, fragment, &attribute_layout.bindings()) {
            Ok(native) => native,
            Err(log) => {
                self.release_shader(ShaderStage::Vertex, vertex_source);
                self.release_shader(ShaderStage::Fragment, fragment_source);
                return Err(RenderError::ProgramLink(log));
            }
        };

        let uniforms: HashMap<_, _> = self
            .backend
            .active_uniforms(native)
            .into_iter()
            .map(|u| (u.name, UniformSlot { ty: u.ty, size: u.size, location: u.location }))
            .collect();

        let id = self.program_ids.assign();
        log::debug!("program {id}: linked, {} active uniforms", uniforms.len());
        slot_insert(
            &mut self.programs,
            id,
            ProgramInfo {
                native,
                vertex_source: vertex_source.to_owned(),
                fragment_source: fragment_source.to_owned(),
                attribute_layout: attribute_layout.clone(),
                uniforms,
                uniform_cache: HashMap::new(),
            },
        );
        Ok(Program { id })
    }

    /// Deletes the program and drops its references on both stages.
    pub fn delete_program(&mut self, program: Program) -> Result<()> {
        let info = self
            .programs
            .get_mut(program.id as usize)
            .and_then(Option::take)
            .ok_or(RenderError::UnknownHandle("program"))?;
        self.backend.delete_program(info.native);
        self.program_ids.release(program.id);
        self.release_shader(ShaderStage::Vertex, &info.vertex_source);
        self.release_shader(ShaderStage::Fragment, &info.fragment_source);
        if self.active_program == Some(program.id) {
            self.active_program = None;
        }
        log::debug!("program {} deleted", program.id);
        Ok(())
    }

    pub fn program_info(&self, program: Program) -> Option<&ProgramInfo<B>> {
        self.programs.get(program.id as usize)?.as_ref()
    }

    #[inline]
    pub fn active_program(&self) -> Option<Program> {
        self.active_program.map(|id| Program { id })
    }

    pub(crate) fn use_program(&mut self, program: Program) -> Result<()> {
        let native = self
            .program_info(program)
            .ok_or(RenderError::UnknownHandle("program"))?
            .native;
        self.backend.use_program(Some(native));
        self.active_program = Some(program.id);
        Ok(())
    }

    fn shaders_mut(&mut self, stage: ShaderStage) -> &mut RefCountCache<String, B::Shader> {
        match stage {
            ShaderStage::Vertex => &mut self.vertex_shaders,
            ShaderStage::Fragment => &mut self.fragment_shaders,
        }
    }

    fn acquire_shader(&mut self, stage: ShaderStage, source: &str) -> Result<B::Shader> {
        if let Some(&shader) = self.shaders_mut(stage).acquire(source) {
            return Ok(shader);
        }
        let shader = self
            .backend
            .compile_shader(stage, source)
            .map_err(|log| RenderError::ShaderCompile { stage, log })?;
        self.shaders_mut(stage).insert(source.to_owned(), shader);
        log::debug!("{stage} shader {shader:?} compiled");
        Ok(shader)
    }

    fn release_shader(&mut self, stage: ShaderStage, source: &str) {
        match self.shaders_mut(stage).release(source) {
            Release::Last(shader) => {
                self.backend.delete_shader(shader);
                log::debug!("{stage} shader {shader:?} deleted");
            }
            Release::Retained(_) => {}
            Release::Missing => log::warn!("release of uncached {stage} shader ignored"),
        }
    }

    // ── uniforms / draws ──────────────────────────────────────────────────

    /// Writes `value` unless it equals the last value cached for `name`.
    /// Returns whether a backend write happened.
    pub(crate) fn write_cached_uniform(&mut self, program: Program, name: &str, value: CachedUniform) -> bool {
        let Some(info) = self.programs.get_mut(program.id as usize).and_then(Option::as_mut) else {
            return false;
        };
        if info.uniform_cache.get(name) == Some(&value) {
            return false;
        }
        let Some(slot) = info.uniforms.get(name) else {
            log::trace!("program {}: no active uniform `{name}`", program.id);
            return false;
        };
        self.backend.set_uniform(&slot.location, value.as_value());
        info.uniform_cache.insert(name.to_owned(), value);
        true
    }

    /// Always writes. Drops any cached value for `name`.
    pub(crate) fn write_uniform(&mut self, program: Program, name: &str, value: UniformValue<'_>) -> bool {
        let Some(info) = self.programs.get_mut(program.id as usize).and_then(Option::as_mut) else {
            return false;
        };
        info.uniform_cache.remove(name);
        let Some(slot) = info.uniforms.get(name) else {
            log::trace!("program {}: no active uniform `{name}`", program.id);
            return false;
        };
        self.backend.set_uniform(&slot.location, value);
        true
    }

    /// Indexed draw when `layout` has an index buffer, else non-indexed.
    /// `offset` is the first index (or vertex), not a byte offset.
    pub(crate) fn draw(
        &mut self,
        layout: VertexLayout,
        mode: DrawMode,
        count: u32,
        offset: u32,
        instances: Option<u32>,
    ) -> Result<()> {
        if instances.is_some() && !self.capabilities.instancing {
            return Err(RenderError::Unsupported("instanced drawing"));
        }
        let info = self
            .vertex_layout_info(layout)
            .ok_or(RenderError::UnknownHandle("vertex layout"))?;
        match info.index_type() {
            Some(ty) => self.backend.draw_elements(mode, count, ty, offset * ty.byte_size(), instances),
            None => self.backend.draw_arrays(mode, offset, count, instances),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, HeadlessBackend, HeadlessConfig};
    use crate::device::{Attribute, AttributeType, BufferAttribute, VertexAttribute};
    use crate::test_support::{FS, VS, position_layout};

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::default())
    }

    fn device_with(config: HeadlessConfig) -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(config))
    }

    fn shader_deletes(d: &Device<HeadlessBackend>) -> usize {
        d.backend().count(|c| matches!(c, Command::DeleteShader(_)))
    }

    // ── programs ──────────────────────────────────────────────────────────

    #[test]
    fn program_ids_are_dense_and_recycled() {
        let mut d = device();
        let layout = position_layout();
        let fs_b = FS.replace("color", "tint");

        let a = d.create_program(VS, FS, &layout).unwrap();
        let b = d.create_program(VS, &fs_b, &layout).unwrap();
        assert_eq!((a.id(), b.id()), (0, 1));
        assert_eq!(d.counts().programs, 2);

        d.delete_program(a).unwrap();
        assert_eq!(d.counts().programs, 1);
        let c = d.create_program(VS, FS, &layout).unwrap();
        assert_eq!(c.id(), 0);
        assert_eq!(d.counts().programs, 2);
    }

    #[test]
    fn shared_stage_outlives_first_program() {
        let mut d = device();
        let layout = position_layout();
        let fs_b = FS.replace("color", "tint");

        let a = d.create_program(VS, FS, &layout).unwrap();
        let b = d.create_program(VS, &fs_b, &layout).unwrap();
        // One vertex stage, two fragment stages.
        assert_eq!(d.backend().count(|c| matches!(c, Command::CompileShader { .. })), 3);

        d.delete_program(a).unwrap();
        // Only the first fragment stage goes away.
        assert_eq!(shader_deletes(&d), 1);
        assert_eq!(d.backend().live_shaders(), 2);

        d.delete_program(b).unwrap();
        assert_eq!(shader_deletes(&d), 3);
        assert_eq!(d.backend().live_shaders(), 0);
    }

    #[test]
    fn delete_unknown_program_is_an_error() {
        let mut d = device();
        let p = d.create_program(VS, FS, &position_layout()).unwrap();
        d.delete_program(p).unwrap();
        assert_eq!(d.delete_program(p), Err(RenderError::UnknownHandle("program")));
        assert_eq!(d.counts().programs, 0);
        assert_eq!(shader_deletes(&d), 2);
    }

    #[test]
    fn compile_error_carries_backend_log() {
        let mut d = device();
        let bad = format!("{FS}\n#error broken");
        let err = d.create_program(VS, &bad, &position_layout()).unwrap_err();
        match err {
            RenderError::ShaderCompile { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(log.contains("broken"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The vertex stage reference taken before the failure is dropped.
        assert_eq!(d.backend().live_shaders(), 0);
        assert_eq!(d.counts().programs, 0);
    }

    #[test]
    fn link_error_releases_both_stages() {
        let mut d = device();
        let err = d
            .create_program(VS, "uniform vec4 color;", &position_layout())
            .unwrap_err();
        assert!(matches!(err, RenderError::ProgramLink(ref log) if log.contains("main")));
        assert_eq!(d.backend().live_shaders(), 0);
    }

    #[test]
    fn harvests_active_uniforms() {
        let mut d = device();
        let p = d.create_program(VS, FS, &position_layout()).unwrap();
        let info = d.program_info(p).unwrap();
        assert!(info.has_uniform("offset"));
        assert_eq!(info.uniform("color"), Some((UniformType::Vec4, 1)));
        assert!(!info.has_uniform("missing"));
        assert_eq!(info.vertex_source(), VS);
    }

    #[test]
    fn matrix_attributes_bind_consecutive_slots() {
        let mut d = device();
        let layout = AttributeLayout::new([
            Attribute::new("position", AttributeType::Vec2),
            Attribute::new("model", AttributeType::Mat4),
            Attribute::new("uv", AttributeType::Vec2),
        ]);
        d.create_program(VS, FS, &layout).unwrap();
        let attributes = d
            .backend()
            .commands()
            .iter()
            .find_map(|c| match c {
                Command::LinkProgram { attributes, .. } => Some(attributes.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            attributes,
            [(0, "position".to_owned()), (1, "model".to_owned()), (5, "uv".to_owned())]
        );
    }

    // ── buffers ───────────────────────────────────────────────────────────

    #[test]
    fn index_type_is_inferred_from_data() {
        let mut d = device();
        let ib = d
            .create_index_buffer(&IndexBufferDescriptor::from_data(IndexData::U16(&[0, 1, 2])))
            .unwrap();
        assert_eq!(ib.index_type(), IndexType::U16);

        let err = d
            .create_index_buffer(&IndexBufferDescriptor { size: 12, ..Default::default() })
            .unwrap_err();
        assert_eq!(err, RenderError::MissingIndexType);
    }

    #[test]
    fn uint_indices_require_capability() {
        let mut d = device_with(HeadlessConfig { uint_indices: false, ..Default::default() });
        let err = d
            .create_index_buffer(&IndexBufferDescriptor::from_data(IndexData::U32(&[0, 1, 2])))
            .unwrap_err();
        assert_eq!(err, RenderError::Unsupported("32-bit index buffers"));
        assert_eq!(d.counts().buffers, 0);

        let mut d = device();
        assert!(d
            .create_index_buffer(&IndexBufferDescriptor::from_data(IndexData::U32(&[0, 1, 2])))
            .is_ok());
    }

    #[test]
    fn buffer_counts_track_create_and_delete() {
        let mut d = device();
        let vb = d.create_buffer(&BufferDescriptor::from_slice(&[0.0f32; 8])).unwrap();
        let ib = d
            .create_index_buffer(&IndexBufferDescriptor::from_data(IndexData::U8(&[0, 1, 2])))
            .unwrap();
        assert_eq!(d.counts().buffers, 2);

        d.update_buffer_data(&vb, bytemuck::cast_slice(&[1.0f32, 2.0]), 8).unwrap();
        assert!(d.backend().commands().contains(&Command::UpdateBuffer {
            buffer: vb.native(),
            target: BufferTarget::Array,
            offset_bytes: 8,
            len: 8,
        }));

        d.delete_buffer(vb).unwrap();
        d.delete_index_buffer(ib).unwrap();
        assert_eq!(d.counts().buffers, 0);
        assert_eq!(d.delete_buffer(vb), Err(RenderError::UnknownHandle("buffer")));
        assert_eq!(d.backend().live_buffers(), 0);
    }

    // ── vertex layouts ────────────────────────────────────────────────────

    fn two_attribute_layout() -> AttributeLayout {
        AttributeLayout::new([
            Attribute::new("position", AttributeType::Vec2),
            Attribute::new("uv", AttributeType::Vec2),
        ])
    }

    #[test]
    fn native_layouts_record_state_once() {
        let mut d = device();
        let vb = d.create_buffer(&BufferDescriptor::from_slice(&[0.0f32; 8])).unwrap();
        let layout = d
            .create_vertex_layout(
                VertexLayoutDescriptor::new(position_layout())
                    .attribute("position", VertexAttribute::Buffer(BufferAttribute::new(vb))),
            )
            .unwrap();
        assert!(d.vertex_layout_info(layout).unwrap().is_native());
        assert_eq!(d.backend().live_vertex_arrays(), 1);

        d.backend_mut().clear_commands();
        d.bind_vertex_layout(layout).unwrap();
        assert_eq!(d.backend().commands(), [Command::BindVertexArray(Some(2))]);
        assert_eq!(d.active_vertex_layout(), Some(layout));

        d.delete_vertex_layout(layout).unwrap();
        assert_eq!(d.backend().live_vertex_arrays(), 0);
        assert_eq!(d.counts().vertex_layouts, 0);
        assert_eq!(d.active_vertex_layout(), None);
    }

    #[test]
    fn fallback_disables_only_stale_slots() {
        let mut d = device_with(HeadlessConfig { vertex_array_objects: false, ..Default::default() });
        let vb = d.create_buffer(&BufferDescriptor::from_slice(&[0.0f32; 16])).unwrap();

        let both = d
            .create_vertex_layout(
                VertexLayoutDescriptor::new(two_attribute_layout())
                    .attribute("position", VertexAttribute::Buffer(BufferAttribute::new(vb).stride(16)))
                    .attribute("uv", VertexAttribute::Buffer(BufferAttribute::new(vb).stride(16).offset(8))),
            )
            .unwrap();
        let position_only = d
            .create_vertex_layout(
                VertexLayoutDescriptor::new(two_attribute_layout())
                    .attribute("position", VertexAttribute::Buffer(BufferAttribute::new(vb)))
                    .attribute("uv", VertexAttribute::Constant(vec![0.5, 0.5])),
            )
            .unwrap();
        assert!(!d.vertex_layout_info(both).unwrap().is_native());
        assert_eq!(d.backend().live_vertex_arrays(), 0);

        d.bind_vertex_layout(both).unwrap();
        d.backend_mut().clear_commands();
        d.bind_vertex_layout(position_only).unwrap();

        let cmds = d.backend().commands();
        let disable = |slot| Command::SetVertexAttribArrayEnabled { slot, enabled: false };
        // Slot 1 is disabled before the replay; slot 0 stays enabled.
        assert_eq!(cmds[0], disable(1));
        assert!(!cmds.contains(&disable(0)));
        assert!(cmds.contains(&Command::VertexAttribConstant { slot: 1, value: [0.5, 0.5, 0.0, 1.0] }));

        // Switching back enables slot 1 again and disables nothing.
        d.backend_mut().clear_commands();
        d.bind_vertex_layout(both).unwrap();
        let cmds = d.backend().commands();
        assert!(!cmds.iter().any(|c| matches!(c, Command::SetVertexAttribArrayEnabled { enabled: false, .. })));
        assert!(cmds.contains(&Command::SetVertexAttribArrayEnabled { slot: 1, enabled: true }));
    }

    #[test]
    fn matrix_buffer_attribute_spans_rows() {
        let mut d = device();
        let vb = d.create_buffer(&BufferDescriptor::with_size(64)).unwrap();
        let layout = AttributeLayout::new([Attribute::new("model", AttributeType::Mat3)]);
        d.backend_mut().clear_commands();
        d.create_vertex_layout(
            VertexLayoutDescriptor::new(layout)
                .attribute("model", VertexAttribute::Buffer(BufferAttribute::new(vb).stride(36).divisor(1))),
        )
        .unwrap();

        let pointers: Vec<_> = d
            .backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::VertexAttribPointer { slot, pointer } => Some((*slot, pointer.offset_bytes)),
                _ => None,
            })
            .collect();
        assert_eq!(pointers, [(0, 0), (1, 12), (2, 24)]);
        assert_eq!(d.backend().count(|c| matches!(c, Command::VertexAttribDivisor { divisor: 1, .. })), 3);
    }

    #[test]
    fn constant_attribute_size_is_validated() {
        let mut d = device();
        let err = d
            .create_vertex_layout(
                VertexLayoutDescriptor::new(position_layout())
                    .attribute("position", VertexAttribute::Constant(vec![1.0, 2.0, 3.0])),
            )
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::ConstantAttributeSize { name: "position".to_owned(), expected: 2, actual: 3 }
        );
        assert_eq!(d.counts().vertex_layouts, 0);
    }

    #[test]
    fn divisors_require_instancing() {
        let mut d = device_with(HeadlessConfig { instancing: false, ..Default::default() });
        let vb = d.create_buffer(&BufferDescriptor::with_size(64)).unwrap();
        let err = d
            .create_vertex_layout(
                VertexLayoutDescriptor::new(position_layout())
                    .attribute("position", VertexAttribute::Buffer(BufferAttribute::new(vb).divisor(1))),
            )
            .unwrap_err();
        assert_eq!(err, RenderError::Unsupported("instanced vertex attributes"));
    }

    // ── textures ──────────────────────────────────────────────────────────

    fn texture_device(units: u32) -> Device<HeadlessBackend> {
        Device::with_config(
            HeadlessBackend::default(),
            DeviceConfig { max_texture_units: Some(units), ..Default::default() },
        )
    }

    #[test]
    fn textures_take_units_until_full_then_evict_least_used() {
        let mut d = texture_device(2);
        let a = d.create_texture(&TextureDescriptor::empty(4, 4)).unwrap();
        let b = d.create_texture(&TextureDescriptor::empty(4, 4)).unwrap();
        assert_eq!((d.texture_unit(&a), d.texture_unit(&b)), (Some(0), Some(1)));

        // `a` was used more recently than `b`.
        assert!(d.mark_texture_usage(&a));
        let c = d.create_texture(&TextureDescriptor::empty(4, 4)).unwrap();
        assert_eq!(d.texture_unit(&c), Some(1));
        assert_eq!(d.texture_unit(&b), None);
        assert_eq!(d.texture_unit(&a), Some(0));

        // Rebinding the evicted texture pushes out the least used again.
        assert_eq!(d.bind_texture(&b).unwrap(), 0);
        assert_eq!(d.texture_unit(&a), None);
    }

    #[test]
    fn resident_texture_bind_only_refreshes_usage() {
        let mut d = texture_device(4);
        let t = d.create_texture(&TextureDescriptor::empty(1, 1)).unwrap();
        d.backend_mut().clear_commands();
        assert_eq!(d.bind_texture(&t).unwrap(), 0);
        assert!(d.backend().commands().is_empty());
    }

    #[test]
    fn zero_texture_units_is_an_error() {
        let mut d = device_with(HeadlessConfig { texture_units: 0, ..Default::default() });
        let err = d.create_texture(&TextureDescriptor::empty(1, 1)).unwrap_err();
        assert_eq!(err, RenderError::NoTextureUnits);
        assert_eq!(d.backend().live_textures(), 0);
    }

    #[test]
    fn texture_upload_uses_merged_parameters_and_mip_sizes() {
        let mut d = device();
        let level0 = [0u8; 8 * 4 * 4];
        let level1 = [0u8; 4 * 2 * 4];
        let mut desc = TextureDescriptor::empty(8, 4);
        desc.mipmaps = vec![TextureSource::Pixels(&level0), TextureSource::Pixels(&level1)];
        desc.pixel_storage.flip_y = Some(true);
        let t = d.create_texture(&desc).unwrap();
        assert_eq!((t.width(), t.height()), (8, 4));

        let sizes: Vec<_> = d
            .backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::TexImage2d { level, width, height, .. } => Some((*level, *width, *height)),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, [(0, 8, 4), (1, 4, 2)]);

        let storage = d.backend().commands().iter().find_map(|c| match c {
            Command::SetPixelStorage(s) => Some(*s),
            _ => None,
        });
        let storage = storage.unwrap();
        assert!(storage.flip_y);
        assert_eq!(storage.unpack_alignment, 4);
    }

    #[test]
    fn update_texture_rebinds_and_defaults_region() {
        let mut d = texture_device(1);
        let a = d.create_texture(&TextureDescriptor::empty(4, 4)).unwrap();
        let b = d.create_texture(&TextureDescriptor::empty(2, 2)).unwrap();
        assert_eq!(d.texture_unit(&a), None);

        d.backend_mut().clear_commands();
        d.update_texture_data(&a, 1, TextureFormat::Rgba, &[0; 16], None).unwrap();
        let cmds = d.backend().commands();
        assert_eq!(cmds[0], Command::BindTexture { unit: 0, texture: Some(a.native()) });
        assert_eq!(
            cmds[1],
            Command::TexSubImage2d { level: 1, region: TextureRegion { x: 0, y: 0, width: 2, height: 2 }, len: 16 }
        );
        assert_eq!(d.texture_unit(&b), None);
    }

    #[test]
    fn delete_texture_frees_its_unit() {
        let mut d = texture_device(1);
        let a = d.create_texture(&TextureDescriptor::empty(1, 1)).unwrap();
        d.delete_texture(a).unwrap();
        assert_eq!(d.counts().textures, 0);
        assert_eq!(d.delete_texture(a), Err(RenderError::UnknownHandle("texture")));

        let b = d.create_texture(&TextureDescriptor::empty(1, 1)).unwrap();
        assert_eq!(d.texture_unit(&b), Some(0));
    }

    // ── uniforms / draws ──────────────────────────────────────────────────

    #[test]
    fn cached_uniform_skips_identical_writes() {
        let mut d = device();
        let p = d.create_program(VS, FS, &position_layout()).unwrap();
        d.use_program(p).unwrap();

        let red = CachedUniform::Float4([1.0, 0.0, 0.0, 1.0]);
        assert!(d.write_cached_uniform(p, "color", red));
        assert!(!d.write_cached_uniform(p, "color", red));
        assert!(d.write_cached_uniform(p, "color", CachedUniform::Float4([0.0, 1.0, 0.0, 1.0])));
        assert!(!d.write_cached_uniform(p, "missing", red));
        assert_eq!(d.backend().count(|c| matches!(c, Command::SetUniform { .. })), 2);

        // An uncached write invalidates the cached value.
        assert!(d.write_uniform(p, "color", UniformValue::Float4v(&[0.0, 1.0, 0.0, 1.0])));
        assert!(d.write_cached_uniform(p, "color", CachedUniform::Float4([0.0, 1.0, 0.0, 1.0])));
    }

    #[test]
    fn draw_picks_indexed_or_plain() {
        let mut d = device();
        let vb = d.create_buffer(&BufferDescriptor::with_size(64)).unwrap();
        let ib = d
            .create_index_buffer(&IndexBufferDescriptor::from_data(IndexData::U16(&[0, 1, 2, 2, 1, 3])))
            .unwrap();
        let attr = || VertexAttribute::Buffer(BufferAttribute::new(vb));
        let indexed = d
            .create_vertex_layout(
                VertexLayoutDescriptor::new(position_layout()).index_buffer(ib).attribute("position", attr()),
            )
            .unwrap();
        let plain = d
            .create_vertex_layout(VertexLayoutDescriptor::new(position_layout()).attribute("position", attr()))
            .unwrap();

        d.backend_mut().clear_commands();
        d.draw(indexed, DrawMode::Triangles, 3, 3, None).unwrap();
        d.draw(plain, DrawMode::TriangleStrip, 4, 0, Some(2)).unwrap();
        assert_eq!(
            d.backend().commands(),
            [
                Command::DrawElements {
                    mode: DrawMode::Triangles,
                    count: 3,
                    index_type: IndexType::U16,
                    offset_bytes: 6,
                    instances: None,
                },
                Command::DrawArrays { mode: DrawMode::TriangleStrip, first: 0, count: 4, instances: Some(2) },
            ]
        );
    }

    #[test]
    fn instanced_draw_requires_capability() {
        let mut d = device_with(HeadlessConfig { instancing: false, ..Default::default() });
        let vb = d.create_buffer(&BufferDescriptor::with_size(64)).unwrap();
        let layout = d
            .create_vertex_layout(
                VertexLayoutDescriptor::new(position_layout())
                    .attribute("position", VertexAttribute::Buffer(BufferAttribute::new(vb))),
            )
            .unwrap();
        assert_eq!(
            d.draw(layout, DrawMode::Triangles, 6, 0, Some(4)),
            Err(RenderError::Unsupported("instanced drawing"))
        );
        assert_eq!(d.backend().draw_count(), 0);
    }

    #[test]
    fn device_ids_are_unique() {
        assert_ne!(device().id(), device().id());
        let d = Device::with_config(
            HeadlessBackend::default(),
            DeviceConfig { label: Some("main".to_owned()), ..Default::default() },
        );
        assert_eq!(d.label(), "main");
        assert_eq!(d.name(), "headless");
    }
}
