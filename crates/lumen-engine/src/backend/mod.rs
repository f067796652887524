//! Immediate-mode GPU command surface.
//!
//! `Backend` is the narrow, GL-shaped API the device and renderer drive. It is
//! deliberately dumb: no caching, no validation, no state tracking. Those live
//! one layer up in [`crate::device`] and [`crate::render`].
//!
//! Implementations:
//! - [`GlowBackend`] (feature `glow`): OpenGL / GLES / WebGL through `glow`
//! - [`HeadlessBackend`]: records commands; used by tests and tooling

#[cfg(feature = "glow")]
mod gl;
mod headless;

use core::fmt;
use core::fmt::Debug;
use core::hash::Hash;

#[cfg(feature = "glow")]
pub use gl::GlowBackend;
pub use headless::{Command, HeadlessBackend, HeadlessConfig, HeadlessUniformLocation, RecordedUniform};

/// Capability flags reported by a backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct Capabilities {
    /// Native vertex-array objects are available.
    pub vertex_array_objects: bool,
    /// Instanced draws and attribute divisors are available.
    pub instancing: bool,
    /// 32-bit index buffers are available.
    pub uint_indices: bool,
    /// Number of combined texture image units.
    pub texture_units: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum BufferUsage {
    Stream,
    #[default]
    Static,
    Dynamic,
}

/// Initial contents of a buffer: either bytes to upload or a size to reserve.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BufferData<'a> {
    Bytes(&'a [u8]),
    Size(usize),
}

impl BufferData<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            BufferData::Bytes(b) => b.len(),
            BufferData::Size(n) => *n,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Element type of an index buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum IndexType {
    U8,
    U16,
    /// Requires [`Capabilities::uint_indices`].
    U32,
}

impl IndexType {
    #[inline]
    pub const fn byte_size(self) -> u32 {
        match self {
            IndexType::U8 => 1,
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// Component type of vertex data as stored in a buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum VertexSourceType {
    Byte,
    Short,
    UnsignedByte,
    UnsignedShort,
    #[default]
    Float,
}

impl VertexSourceType {
    #[inline]
    pub const fn byte_size(self) -> u32 {
        match self {
            VertexSourceType::Byte | VertexSourceType::UnsignedByte => 1,
            VertexSourceType::Short | VertexSourceType::UnsignedShort => 2,
            VertexSourceType::Float => 4,
        }
    }
}

/// One `vertexAttribPointer` call.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AttribPointer {
    pub components: u32,
    pub source_type: VertexSourceType,
    pub normalize: bool,
    pub stride_bytes: u32,
    pub offset_bytes: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFormat {
    Alpha,
    Rgb,
    Rgba,
    Luminance,
    LuminanceAlpha,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum TextureDataType {
    #[default]
    UnsignedByte,
    UnsignedShort565,
    UnsignedShort4444,
    UnsignedShort5551,
    Float,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MagFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MinFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

/// Fully resolved sampler state for a 2D texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SamplingParameters {
    pub mag_filter: MagFilter,
    pub min_filter: MinFilter,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl Default for SamplingParameters {
    fn default() -> Self {
        Self {
            mag_filter: MagFilter::Linear,
            min_filter: MinFilter::Linear,
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum ColorSpaceConversion {
    None,
    #[default]
    Default,
}

/// Fully resolved pixel pack/unpack state.
///
/// These are global context parameters, not texture state; they are applied
/// before every upload.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PixelStorage {
    pub pack_alignment: i32,
    pub unpack_alignment: i32,
    pub flip_y: bool,
    pub premultiply_alpha: bool,
    pub color_space_conversion: ColorSpaceConversion,
}

impl Default for PixelStorage {
    fn default() -> Self {
        Self {
            pack_alignment: 4,
            unpack_alignment: 4,
            flip_y: false,
            premultiply_alpha: false,
            color_space_conversion: ColorSpaceConversion::Default,
        }
    }
}

/// A full-level texture upload (`texImage2D`).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TexImage<'a> {
    pub level: u32,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub data_type: TextureDataType,
    /// `None` allocates uninitialized storage.
    pub pixels: Option<&'a [u8]>,
}

/// Sub-rectangle of a texture level, in texels.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// GLSL uniform type as reported by program introspection.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    Bool,
    BVec2,
    BVec3,
    BVec4,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
    SamplerCube,
    Other(u32),
}

/// One active uniform harvested after linking.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveUniform<L> {
    /// Base name; array uniforms drop the `[0]` suffix.
    pub name: String,
    pub ty: UniformType,
    /// Array length, 1 for non-arrays.
    pub size: i32,
    pub location: L,
}

/// A value written to a uniform location.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue<'a> {
    Float1(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    Int1(i32),
    Int2([i32; 2]),
    Int3([i32; 3]),
    Int4([i32; 4]),
    Float1v(&'a [f32]),
    Float2v(&'a [f32]),
    Float3v(&'a [f32]),
    Float4v(&'a [f32]),
    Int1v(&'a [i32]),
    Int2v(&'a [i32]),
    Int3v(&'a [i32]),
    Int4v(&'a [i32]),
    Matrix2 { transpose: bool, values: &'a [f32] },
    Matrix3 { transpose: bool, values: &'a [f32] },
    Matrix4 { transpose: bool, values: &'a [f32] },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DrawMode {
    Points,
    LineStrip,
    LineLoop,
    Lines,
    TriangleStrip,
    TriangleFan,
    Triangles,
}

/// Toggleable fixed-function state.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Capability {
    Blend,
    DepthTest,
    StencilTest,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StencilFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
    Invert,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Buffers to clear at the start of a pass and the values to clear them to.
///
/// Each field is independent; `None` leaves that buffer untouched.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ClearOptions {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<i32>,
}

impl ClearOptions {
    #[inline]
    pub const fn color(rgba: [f32; 4]) -> Self {
        Self { color: Some(rgba), depth: None, stencil: None }
    }

    #[inline]
    pub const fn depth_only(depth: f32) -> Self {
        Self { color: None, depth: Some(depth), stencil: None }
    }

    #[inline]
    pub const fn with_depth(mut self, depth: f32) -> Self {
        self.depth = Some(depth);
        self
    }

    #[inline]
    pub const fn with_stencil(mut self, stencil: i32) -> Self {
        self.stencil = Some(stencil);
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.depth.is_none() && self.stencil.is_none()
    }
}

/// GL-shaped immediate-mode command surface.
///
/// Every call takes effect in call order. Failures of object creation are
/// reported as backend diagnostic strings; every other call is assumed to
/// succeed (misuse is a caller bug, not a recoverable condition).
pub trait Backend: 'static {
    type Buffer: Copy + Eq + Hash + Debug;
    type Texture: Copy + Eq + Hash + Debug;
    type Shader: Copy + Eq + Debug;
    type Program: Copy + Eq + Debug;
    type VertexArray: Copy + Eq + Debug;
    type UniformLocation: Clone + Debug;
    type Framebuffer: Copy + Eq + Debug;

    fn capabilities(&self) -> Capabilities;

    /// Human-readable renderer string (GPU / driver name).
    fn renderer_name(&self) -> String;

    /// Size of the default framebuffer in physical pixels.
    fn drawing_buffer_size(&self) -> (u32, u32);

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(
        &mut self,
        target: BufferTarget,
        data: BufferData<'_>,
        usage: BufferUsage,
    ) -> Result<Self::Buffer, String>;
    fn update_buffer(&mut self, target: BufferTarget, buffer: Self::Buffer, offset_bytes: usize, data: &[u8]);
    fn delete_buffer(&mut self, buffer: Self::Buffer);
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<Self::Buffer>);

    // ── shaders / programs ────────────────────────────────────────────────

    /// Compiles one stage. `Err` carries the compiler info log.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String>;
    fn delete_shader(&mut self, shader: Self::Shader);

    /// Attaches both stages, binds the given attribute locations and links.
    /// `Err` carries the linker info log.
    fn link_program(
        &mut self,
        vertex: Self::Shader,
        fragment: Self::Shader,
        attribute_locations: &[(u32, &str)],
    ) -> Result<Self::Program, String>;
    fn active_uniforms(&mut self, program: Self::Program) -> Vec<ActiveUniform<Self::UniformLocation>>;
    fn use_program(&mut self, program: Option<Self::Program>);
    fn delete_program(&mut self, program: Self::Program);
    /// Writes to the currently used program.
    fn set_uniform(&mut self, location: &Self::UniformLocation, value: UniformValue<'_>);

    // ── vertex state ──────────────────────────────────────────────────────

    fn create_vertex_array(&mut self) -> Result<Self::VertexArray, String>;
    fn bind_vertex_array(&mut self, vertex_array: Option<Self::VertexArray>);
    fn delete_vertex_array(&mut self, vertex_array: Self::VertexArray);
    fn set_vertex_attrib_array_enabled(&mut self, slot: u32, enabled: bool);
    fn vertex_attrib_pointer(&mut self, slot: u32, pointer: AttribPointer);
    fn vertex_attrib_divisor(&mut self, slot: u32, divisor: u32);
    fn vertex_attrib_constant(&mut self, slot: u32, value: [f32; 4]);

    // ── textures ──────────────────────────────────────────────────────────

    fn create_texture(&mut self) -> Result<Self::Texture, String>;
    /// Selects `unit` as the active texture unit and binds `texture` to it.
    fn bind_texture(&mut self, unit: u32, texture: Option<Self::Texture>);
    /// Applies sampler state to the texture bound on the active unit.
    fn set_sampling(&mut self, sampling: &SamplingParameters);
    fn set_pixel_storage(&mut self, storage: &PixelStorage);
    fn tex_image_2d(&mut self, image: TexImage<'_>);
    fn tex_sub_image_2d(
        &mut self,
        level: u32,
        region: TextureRegion,
        format: TextureFormat,
        data_type: TextureDataType,
        pixels: &[u8],
    );
    fn generate_mipmap(&mut self);
    fn delete_texture(&mut self, texture: Self::Texture);

    // ── pipeline state ────────────────────────────────────────────────────

    fn bind_framebuffer(&mut self, framebuffer: Option<Self::Framebuffer>);
    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);
    fn clear(&mut self, options: &ClearOptions);
    fn set_enabled(&mut self, capability: Capability, enabled: bool);
    fn color_mask(&mut self, enabled: bool);
    fn depth_mask(&mut self, enabled: bool);
    fn stencil_mask(&mut self, mask: u32);
    fn stencil_func(&mut self, func: StencilFunc, reference: i32, mask: u32);
    fn stencil_op(&mut self, stencil_fail: StencilOp, depth_fail: StencilOp, pass: StencilOp);
    fn blend_func(&mut self, equation: BlendEquation, src: BlendFactor, dst: BlendFactor);

    // ── draws ─────────────────────────────────────────────────────────────

    /// Non-indexed draw. `instances` requires [`Capabilities::instancing`].
    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32, instances: Option<u32>);
    /// Indexed draw from the bound index buffer; `offset_bytes` into it.
    fn draw_elements(
        &mut self,
        mode: DrawMode,
        count: u32,
        index_type: IndexType,
        offset_bytes: u32,
        instances: Option<u32>,
    );
}
