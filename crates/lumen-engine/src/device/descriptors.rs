use std::collections::HashMap;

use bytemuck::Pod;

use super::error::{RenderError, Result};
use super::handles::{Buffer, IndexBuffer};
use crate::backend::{
    Backend, BufferData, BufferUsage, ColorSpaceConversion, IndexType, MagFilter, MinFilter,
    PixelStorage, SamplingParameters, TextureDataType, TextureFormat, VertexSourceType, WrapMode,
};

// ── buffers ───────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BufferDescriptor<'a> {
    pub data: BufferData<'a>,
    pub usage: BufferUsage,
}

impl<'a> BufferDescriptor<'a> {
    /// Uploads `data` reinterpreted as bytes.
    pub fn from_slice<T: Pod>(data: &'a [T]) -> Self {
        Self { data: BufferData::Bytes(bytemuck::cast_slice(data)), usage: BufferUsage::Static }
    }

    /// Reserves `size` bytes of uninitialized storage.
    pub fn with_size(size: usize) -> Self {
        Self { data: BufferData::Size(size), usage: BufferUsage::Static }
    }

    pub fn usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Typed index data. The element type decides the buffer's [`IndexType`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IndexData<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexData<'_> {
    pub fn index_type(&self) -> IndexType {
        match self {
            IndexData::U8(_) => IndexType::U8,
            IndexData::U16(_) => IndexType::U16,
            IndexData::U32(_) => IndexType::U32,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            IndexData::U8(d) => d,
            IndexData::U16(d) => bytemuck::cast_slice(*d),
            IndexData::U32(d) => bytemuck::cast_slice(*d),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct IndexBufferDescriptor<'a> {
    pub data: Option<IndexData<'a>>,
    /// Byte size to reserve when `data` is `None`.
    pub size: usize,
    /// Overrides the type inferred from `data`; required without `data`.
    pub index_type: Option<IndexType>,
    pub usage: BufferUsage,
}

impl<'a> IndexBufferDescriptor<'a> {
    pub fn from_data(data: IndexData<'a>) -> Self {
        Self { data: Some(data), ..Self::default() }
    }

    pub fn with_size(size: usize, index_type: IndexType) -> Self {
        Self { size, index_type: Some(index_type), ..Self::default() }
    }

    pub(crate) fn resolve_index_type(&self) -> Result<IndexType> {
        self.index_type
            .or_else(|| self.data.map(|d| d.index_type()))
            .ok_or(RenderError::MissingIndexType)
    }

    pub(crate) fn buffer_data(&self) -> BufferData<'a> {
        match self.data {
            Some(IndexData::U8(d)) => BufferData::Bytes(d),
            Some(IndexData::U16(d)) => BufferData::Bytes(bytemuck::cast_slice(d)),
            Some(IndexData::U32(d)) => BufferData::Bytes(bytemuck::cast_slice(d)),
            None => BufferData::Size(self.size),
        }
    }
}

// ── vertex layouts ────────────────────────────────────────────────────────

/// Shader-side type of a vertex attribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl AttributeType {
    /// Generic attribute slots consumed (one per matrix column).
    #[inline]
    pub const fn rows(self) -> u32 {
        match self {
            AttributeType::Float | AttributeType::Vec2 | AttributeType::Vec3 | AttributeType::Vec4 => 1,
            AttributeType::Mat2 => 2,
            AttributeType::Mat3 => 3,
            AttributeType::Mat4 => 4,
        }
    }

    /// Components per slot.
    #[inline]
    pub const fn columns(self) -> u32 {
        match self {
            AttributeType::Float => 1,
            AttributeType::Vec2 | AttributeType::Mat2 => 2,
            AttributeType::Vec3 | AttributeType::Mat3 => 3,
            AttributeType::Vec4 | AttributeType::Mat4 => 4,
        }
    }

    /// Total float count.
    #[inline]
    pub const fn len(self) -> u32 {
        self.rows() * self.columns()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub name: String,
    pub ty: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Ordered attribute declarations. Order decides generic slot numbering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AttributeLayout(Vec<Attribute>);

impl AttributeLayout {
    pub fn new(attributes: impl IntoIterator<Item = Attribute>) -> Self {
        Self(attributes.into_iter().collect())
    }

    #[inline]
    pub fn attributes(&self) -> &[Attribute] {
        &self.0
    }

    /// `(first slot, attribute)` pairs. Each attribute occupies
    /// `ty.rows()` consecutive slots starting at its first slot.
    pub fn slots(&self) -> impl Iterator<Item = (u32, &Attribute)> + '_ {
        self.0.iter().scan(0u32, |next, attr| {
            let first = *next;
            *next += attr.ty.rows();
            Some((first, attr))
        })
    }

    /// Total generic slots consumed.
    pub fn slot_count(&self) -> u32 {
        self.0.iter().map(|a| a.ty.rows()).sum()
    }

    /// Slot bindings for linking. Matrix attributes bind their first column.
    pub(crate) fn bindings(&self) -> Vec<(u32, &str)> {
        self.slots().map(|(slot, a)| (slot, a.name.as_str())).collect()
    }
}

/// Per-vertex data read from a buffer.
pub struct BufferAttribute<B: Backend> {
    pub buffer: Buffer<B>,
    pub offset_bytes: u32,
    pub stride_bytes: u32,
    /// Components per slot in the buffer; defaults to the shader type's.
    pub source_columns: Option<u32>,
    pub source_type: VertexSourceType,
    pub normalize: bool,
    /// Instances per advance; requires instancing support when set.
    pub instance_divisor: Option<u32>,
}

impl<B: Backend> BufferAttribute<B> {
    pub fn new(buffer: Buffer<B>) -> Self {
        Self {
            buffer,
            offset_bytes: 0,
            stride_bytes: 0,
            source_columns: None,
            source_type: VertexSourceType::Float,
            normalize: false,
            instance_divisor: None,
        }
    }

    pub fn offset(mut self, offset_bytes: u32) -> Self {
        self.offset_bytes = offset_bytes;
        self
    }

    pub fn stride(mut self, stride_bytes: u32) -> Self {
        self.stride_bytes = stride_bytes;
        self
    }

    pub fn source(mut self, columns: u32, ty: VertexSourceType, normalize: bool) -> Self {
        self.source_columns = Some(columns);
        self.source_type = ty;
        self.normalize = normalize;
        self
    }

    pub fn divisor(mut self, divisor: u32) -> Self {
        self.instance_divisor = Some(divisor);
        self
    }
}

impl<B: Backend> Clone for BufferAttribute<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for BufferAttribute<B> {}

impl<B: Backend> core::fmt::Debug for BufferAttribute<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferAttribute")
            .field("buffer", &self.buffer)
            .field("offset_bytes", &self.offset_bytes)
            .field("stride_bytes", &self.stride_bytes)
            .field("source_columns", &self.source_columns)
            .field("source_type", &self.source_type)
            .field("normalize", &self.normalize)
            .field("instance_divisor", &self.instance_divisor)
            .finish()
    }
}

/// Where an attribute's data comes from.
pub enum VertexAttribute<B: Backend> {
    Buffer(BufferAttribute<B>),
    /// One value for every vertex. Holds exactly `ty.len()` floats,
    /// column-major for matrices.
    Constant(Vec<f32>),
}

impl<B: Backend> Clone for VertexAttribute<B> {
    fn clone(&self) -> Self {
        match self {
            VertexAttribute::Buffer(b) => VertexAttribute::Buffer(*b),
            VertexAttribute::Constant(c) => VertexAttribute::Constant(c.clone()),
        }
    }
}

impl<B: Backend> core::fmt::Debug for VertexAttribute<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            VertexAttribute::Buffer(b) => f.debug_tuple("Buffer").field(b).finish(),
            VertexAttribute::Constant(c) => f.debug_tuple("Constant").field(c).finish(),
        }
    }
}

/// Everything needed to configure vertex input for one draw setup.
///
/// Attributes declared in the layout but missing from `attributes` read a
/// zero constant.
pub struct VertexLayoutDescriptor<B: Backend> {
    pub index_buffer: Option<IndexBuffer<B>>,
    pub attribute_layout: AttributeLayout,
    pub attributes: HashMap<String, VertexAttribute<B>>,
}

impl<B: Backend> VertexLayoutDescriptor<B> {
    pub fn new(attribute_layout: AttributeLayout) -> Self {
        Self { index_buffer: None, attribute_layout, attributes: HashMap::new() }
    }

    pub fn index_buffer(mut self, index_buffer: IndexBuffer<B>) -> Self {
        self.index_buffer = Some(index_buffer);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, attribute: VertexAttribute<B>) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for attr in self.attribute_layout.attributes() {
            if let Some(VertexAttribute::Constant(data)) = self.attributes.get(&attr.name) {
                let expected = attr.ty.len() as usize;
                if data.len() != expected {
                    return Err(RenderError::ConstantAttributeSize {
                        name: attr.name.clone(),
                        expected,
                        actual: data.len(),
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn uses_divisors(&self) -> bool {
        self.attributes
            .values()
            .any(|a| matches!(a, VertexAttribute::Buffer(b) if b.instance_divisor.is_some()))
    }
}

impl<B: Backend> Clone for VertexLayoutDescriptor<B> {
    fn clone(&self) -> Self {
        Self {
            index_buffer: self.index_buffer,
            attribute_layout: self.attribute_layout.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

impl<B: Backend> core::fmt::Debug for VertexLayoutDescriptor<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VertexLayoutDescriptor")
            .field("index_buffer", &self.index_buffer)
            .field("attribute_layout", &self.attribute_layout)
            .field("attributes", &self.attributes)
            .finish()
    }
}

// ── textures ──────────────────────────────────────────────────────────────

/// Sampler settings; `None` keeps the default.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct SamplingOverrides {
    pub mag_filter: Option<MagFilter>,
    pub min_filter: Option<MinFilter>,
    pub wrap_s: Option<WrapMode>,
    pub wrap_t: Option<WrapMode>,
}

impl SamplingOverrides {
    pub fn resolve(&self) -> SamplingParameters {
        let d = SamplingParameters::default();
        SamplingParameters {
            mag_filter: self.mag_filter.unwrap_or(d.mag_filter),
            min_filter: self.min_filter.unwrap_or(d.min_filter),
            wrap_s: self.wrap_s.unwrap_or(d.wrap_s),
            wrap_t: self.wrap_t.unwrap_or(d.wrap_t),
        }
    }
}

/// Pixel pack/unpack settings; `None` keeps the default.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct PixelStorageOverrides {
    pub pack_alignment: Option<i32>,
    pub unpack_alignment: Option<i32>,
    pub flip_y: Option<bool>,
    pub premultiply_alpha: Option<bool>,
    pub color_space_conversion: Option<ColorSpaceConversion>,
}

impl PixelStorageOverrides {
    pub fn resolve(&self) -> PixelStorage {
        let d = PixelStorage::default();
        PixelStorage {
            pack_alignment: self.pack_alignment.unwrap_or(d.pack_alignment),
            unpack_alignment: self.unpack_alignment.unwrap_or(d.unpack_alignment),
            flip_y: self.flip_y.unwrap_or(d.flip_y),
            premultiply_alpha: self.premultiply_alpha.unwrap_or(d.premultiply_alpha),
            color_space_conversion: self.color_space_conversion.unwrap_or(d.color_space_conversion),
        }
    }
}

/// Pixel data for one mip level.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TextureSource<'a> {
    /// Raw texels at the descriptor's size for this level.
    Pixels(&'a [u8]),
    /// Decoded image carrying its own dimensions.
    Image { width: u32, height: u32, pixels: &'a [u8] },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor<'a> {
    pub format: TextureFormat,
    pub data_type: TextureDataType,
    /// Size of level 0 for `Pixels` sources and for empty storage.
    pub width: u32,
    pub height: u32,
    /// One entry per mip level, level 0 first. Empty allocates storage only.
    pub mipmaps: Vec<TextureSource<'a>>,
    pub generate_mipmaps: bool,
    pub sampling: SamplingOverrides,
    pub pixel_storage: PixelStorageOverrides,
}

impl<'a> TextureDescriptor<'a> {
    /// RGBA8 texture of the given size with no initial data.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            format: TextureFormat::Rgba,
            data_type: TextureDataType::UnsignedByte,
            width,
            height,
            mipmaps: Vec::new(),
            generate_mipmaps: false,
            sampling: SamplingOverrides::default(),
            pixel_storage: PixelStorageOverrides::default(),
        }
    }

    /// RGBA8 texture from one level of raw texels.
    pub fn rgba8(width: u32, height: u32, pixels: &'a [u8]) -> Self {
        Self { mipmaps: vec![TextureSource::Pixels(pixels)], ..Self::empty(width, height) }
    }

    /// Size of `level` for a `Pixels` source: the descriptor size halved per
    /// level, clamped to one texel.
    #[inline]
    pub fn level_size(&self, level: u32) -> (u32, u32) {
        let shrink = |v: u32| v.checked_shr(level).unwrap_or(0).max(1);
        (shrink(self.width), shrink(self.height))
    }

    /// Allocated size: taken from the first mip level supplied.
    pub fn allocated_size(&self) -> (u32, u32) {
        match self.mipmaps.first() {
            Some(TextureSource::Image { width, height, .. }) => (*width, *height),
            _ => (self.width, self.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_attributes_span_consecutive_slots() {
        let layout = AttributeLayout::new([
            Attribute::new("position", AttributeType::Vec2),
            Attribute::new("model", AttributeType::Mat4),
            Attribute::new("tint", AttributeType::Vec4),
        ]);
        let slots: Vec<_> = layout.slots().map(|(s, a)| (s, a.name.as_str())).collect();
        assert_eq!(slots, [(0, "position"), (1, "model"), (5, "tint")]);
        assert_eq!(layout.slot_count(), 6);
    }

    #[test]
    fn index_type_inferred_or_required() {
        let idx = [0u16, 1, 2];
        let d = IndexBufferDescriptor::from_data(IndexData::U16(&idx));
        assert_eq!(d.resolve_index_type(), Ok(IndexType::U16));
        assert_eq!(d.buffer_data().len(), 6);

        let explicit = IndexBufferDescriptor { index_type: Some(IndexType::U32), ..d };
        assert_eq!(explicit.resolve_index_type(), Ok(IndexType::U32));

        let none = IndexBufferDescriptor { size: 64, ..Default::default() };
        assert_eq!(none.resolve_index_type(), Err(RenderError::MissingIndexType));
    }

    #[test]
    fn overrides_merge_over_defaults() {
        let s = SamplingOverrides { min_filter: Some(MinFilter::Nearest), ..Default::default() }.resolve();
        assert_eq!(s.min_filter, MinFilter::Nearest);
        assert_eq!(s.mag_filter, MagFilter::Linear);
        assert_eq!(s.wrap_s, WrapMode::ClampToEdge);

        let p = PixelStorageOverrides { flip_y: Some(true), ..Default::default() }.resolve();
        assert!(p.flip_y);
        assert_eq!(p.unpack_alignment, 4);
        assert_eq!(p.color_space_conversion, ColorSpaceConversion::Default);
    }

    #[test]
    fn mip_levels_shrink_and_clamp() {
        let d = TextureDescriptor::empty(8, 2);
        assert_eq!(d.level_size(0), (8, 2));
        assert_eq!(d.level_size(1), (4, 1));
        assert_eq!(d.level_size(3), (1, 1));
        assert_eq!(d.level_size(40), (1, 1));
    }

    #[test]
    fn allocated_size_follows_first_image() {
        let px = [0u8; 16];
        let mut d = TextureDescriptor::empty(64, 64);
        d.mipmaps.push(TextureSource::Image { width: 2, height: 2, pixels: &px });
        assert_eq!(d.allocated_size(), (2, 2));
        assert_eq!(TextureDescriptor::rgba8(2, 2, &px).allocated_size(), (2, 2));
    }
}
