//! OpenGL / GLES / WebGL backend on top of `glow`.
//!
//! All `unsafe` in this file is the raw GL FFI. The invariant that makes it
//! sound is established once by [`GlowBackend::new`]: the wrapped context is
//! current on the calling thread for as long as the backend lives.

use glow::HasContext;

use super::{
    ActiveUniform, AttribPointer, Backend, BlendEquation, BlendFactor, BufferData, BufferTarget,
    BufferUsage, Capabilities, Capability, ClearOptions, DrawMode,
    IndexType, MagFilter, MinFilter, PixelStorage, SamplingParameters, ShaderStage, StencilFunc,
    StencilOp, TexImage, TextureDataType, TextureFormat, TextureRegion, UniformType, UniformValue,
    VertexSourceType, WrapMode,
};

// WebGL-only pixel storage parameters; glow does not name them.
#[cfg(target_arch = "wasm32")]
const UNPACK_FLIP_Y_WEBGL: u32 = 0x9240;
#[cfg(target_arch = "wasm32")]
const UNPACK_PREMULTIPLY_ALPHA_WEBGL: u32 = 0x9241;
#[cfg(target_arch = "wasm32")]
const UNPACK_COLORSPACE_CONVERSION_WEBGL: u32 = 0x9243;
#[cfg(target_arch = "wasm32")]
const BROWSER_DEFAULT_WEBGL: i32 = 0x9244;

const VAO_EXTENSIONS: [&str; 4] = [
    "OES_vertex_array_object",
    "GL_OES_vertex_array_object",
    "GL_ARB_vertex_array_object",
    "GL_APPLE_vertex_array_object",
];
const INSTANCING_EXTENSIONS: [&str; 4] = [
    "ANGLE_instanced_arrays",
    "GL_ANGLE_instanced_arrays",
    "GL_ARB_instanced_arrays",
    "GL_EXT_instanced_arrays",
];
const UINT_INDEX_EXTENSIONS: [&str; 2] = ["OES_element_index_uint", "GL_OES_element_index_uint"];

pub struct GlowBackend {
    gl: glow::Context,
    capabilities: Capabilities,
    renderer_name: String,
    drawing_buffer_size: (u32, u32),
}

impl GlowBackend {
    /// Wraps a GL context and probes its capabilities.
    ///
    /// # Safety
    /// `gl` must be current on the calling thread, and stay current for every
    /// subsequent call on the returned backend.
    pub unsafe fn new(gl: glow::Context, drawing_buffer_size: (u32, u32)) -> Self {
        let (capabilities, renderer_name) = {
            let version = gl.version();
            let extensions = gl.supported_extensions();
            let has = |names: &[&str]| names.iter().any(|n| extensions.contains(*n));
            let modern = version.major >= 3;

            let units = unsafe { gl.get_parameter_i32(glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS) };
            let caps = Capabilities {
                vertex_array_objects: modern || has(&VAO_EXTENSIONS),
                instancing: modern || has(&INSTANCING_EXTENSIONS),
                uint_indices: modern || !version.is_embedded || has(&UINT_INDEX_EXTENSIONS),
                texture_units: units.max(0) as u32,
            };
            let name = unsafe { gl.get_parameter_string(glow::RENDERER) };
            (caps, name)
        };

        log::debug!("gl backend: {renderer_name} {capabilities:?}");

        Self { gl, capabilities, renderer_name, drawing_buffer_size }
    }

    /// Records a new default-framebuffer size (physical pixels).
    pub fn resize(&mut self, width: u32, height: u32) {
        self.drawing_buffer_size = (width, height);
    }

    #[inline]
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }
}

fn buffer_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
    }
}

fn buffer_usage(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Stream => glow::STREAM_DRAW,
        BufferUsage::Static => glow::STATIC_DRAW,
        BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
    }
}

fn shader_stage(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    }
}

fn index_type(ty: IndexType) -> u32 {
    match ty {
        IndexType::U8 => glow::UNSIGNED_BYTE,
        IndexType::U16 => glow::UNSIGNED_SHORT,
        IndexType::U32 => glow::UNSIGNED_INT,
    }
}

fn vertex_source_type(ty: VertexSourceType) -> u32 {
    match ty {
        VertexSourceType::Byte => glow::BYTE,
        VertexSourceType::Short => glow::SHORT,
        VertexSourceType::UnsignedByte => glow::UNSIGNED_BYTE,
        VertexSourceType::UnsignedShort => glow::UNSIGNED_SHORT,
        VertexSourceType::Float => glow::FLOAT,
    }
}

fn texture_format(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::Alpha => glow::ALPHA,
        TextureFormat::Rgb => glow::RGB,
        TextureFormat::Rgba => glow::RGBA,
        TextureFormat::Luminance => glow::LUMINANCE,
        TextureFormat::LuminanceAlpha => glow::LUMINANCE_ALPHA,
    }
}

fn texture_data_type(ty: TextureDataType) -> u32 {
    match ty {
        TextureDataType::UnsignedByte => glow::UNSIGNED_BYTE,
        TextureDataType::UnsignedShort565 => glow::UNSIGNED_SHORT_5_6_5,
        TextureDataType::UnsignedShort4444 => glow::UNSIGNED_SHORT_4_4_4_4,
        TextureDataType::UnsignedShort5551 => glow::UNSIGNED_SHORT_5_5_5_1,
        TextureDataType::Float => glow::FLOAT,
    }
}

fn mag_filter(f: MagFilter) -> i32 {
    (match f {
        MagFilter::Nearest => glow::NEAREST,
        MagFilter::Linear => glow::LINEAR,
    }) as i32
}

fn min_filter(f: MinFilter) -> i32 {
    (match f {
        MinFilter::Nearest => glow::NEAREST,
        MinFilter::Linear => glow::LINEAR,
        MinFilter::NearestMipmapNearest => glow::NEAREST_MIPMAP_NEAREST,
        MinFilter::LinearMipmapNearest => glow::LINEAR_MIPMAP_NEAREST,
        MinFilter::NearestMipmapLinear => glow::NEAREST_MIPMAP_LINEAR,
        MinFilter::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
    }) as i32
}

fn wrap_mode(w: WrapMode) -> i32 {
    (match w {
        WrapMode::Repeat => glow::REPEAT,
        WrapMode::ClampToEdge => glow::CLAMP_TO_EDGE,
        WrapMode::MirroredRepeat => glow::MIRRORED_REPEAT,
    }) as i32
}

fn uniform_type(utype: u32) -> UniformType {
    match utype {
        glow::FLOAT => UniformType::Float,
        glow::FLOAT_VEC2 => UniformType::Vec2,
        glow::FLOAT_VEC3 => UniformType::Vec3,
        glow::FLOAT_VEC4 => UniformType::Vec4,
        glow::INT => UniformType::Int,
        glow::INT_VEC2 => UniformType::IVec2,
        glow::INT_VEC3 => UniformType::IVec3,
        glow::INT_VEC4 => UniformType::IVec4,
        glow::BOOL => UniformType::Bool,
        glow::BOOL_VEC2 => UniformType::BVec2,
        glow::BOOL_VEC3 => UniformType::BVec3,
        glow::BOOL_VEC4 => UniformType::BVec4,
        glow::FLOAT_MAT2 => UniformType::Mat2,
        glow::FLOAT_MAT3 => UniformType::Mat3,
        glow::FLOAT_MAT4 => UniformType::Mat4,
        glow::SAMPLER_2D => UniformType::Sampler2D,
        glow::SAMPLER_CUBE => UniformType::SamplerCube,
        other => UniformType::Other(other),
    }
}

fn draw_mode(mode: DrawMode) -> u32 {
    match mode {
        DrawMode::Points => glow::POINTS,
        DrawMode::LineStrip => glow::LINE_STRIP,
        DrawMode::LineLoop => glow::LINE_LOOP,
        DrawMode::Lines => glow::LINES,
        DrawMode::TriangleStrip => glow::TRIANGLE_STRIP,
        DrawMode::TriangleFan => glow::TRIANGLE_FAN,
        DrawMode::Triangles => glow::TRIANGLES,
    }
}

fn capability(cap: Capability) -> u32 {
    match cap {
        Capability::Blend => glow::BLEND,
        Capability::DepthTest => glow::DEPTH_TEST,
        Capability::StencilTest => glow::STENCIL_TEST,
    }
}

fn stencil_func(func: StencilFunc) -> u32 {
    match func {
        StencilFunc::Never => glow::NEVER,
        StencilFunc::Less => glow::LESS,
        StencilFunc::Equal => glow::EQUAL,
        StencilFunc::LessEqual => glow::LEQUAL,
        StencilFunc::Greater => glow::GREATER,
        StencilFunc::NotEqual => glow::NOTEQUAL,
        StencilFunc::GreaterEqual => glow::GEQUAL,
        StencilFunc::Always => glow::ALWAYS,
    }
}

fn stencil_op(op: StencilOp) -> u32 {
    match op {
        StencilOp::Keep => glow::KEEP,
        StencilOp::Zero => glow::ZERO,
        StencilOp::Replace => glow::REPLACE,
        StencilOp::Increment => glow::INCR,
        StencilOp::Decrement => glow::DECR,
        StencilOp::Invert => glow::INVERT,
    }
}

fn blend_equation(eq: BlendEquation) -> u32 {
    match eq {
        BlendEquation::Add => glow::FUNC_ADD,
        BlendEquation::Subtract => glow::FUNC_SUBTRACT,
        BlendEquation::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
    }
}

fn blend_factor(f: BlendFactor) -> u32 {
    match f {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
    }
}

impl Backend for GlowBackend {
    type Buffer = glow::Buffer;
    type Texture = glow::Texture;
    type Shader = glow::Shader;
    type Program = glow::Program;
    type VertexArray = glow::VertexArray;
    type UniformLocation = glow::UniformLocation;
    type Framebuffer = glow::Framebuffer;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn renderer_name(&self) -> String {
        self.renderer_name.clone()
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.drawing_buffer_size
    }

    fn create_buffer(
        &mut self,
        target: BufferTarget,
        data: BufferData<'_>,
        usage: BufferUsage,
    ) -> Result<glow::Buffer, String> {
        let target = buffer_target(target);
        unsafe {
            let buffer = self.gl.create_buffer()?;
            self.gl.bind_buffer(target, Some(buffer));
            match data {
                BufferData::Bytes(bytes) => self.gl.buffer_data_u8_slice(target, bytes, buffer_usage(usage)),
                BufferData::Size(size) => self.gl.buffer_data_size(target, size as i32, buffer_usage(usage)),
            }
            Ok(buffer)
        }
    }

    fn update_buffer(&mut self, target: BufferTarget, buffer: glow::Buffer, offset_bytes: usize, data: &[u8]) {
        let target = buffer_target(target);
        unsafe {
            self.gl.bind_buffer(target, Some(buffer));
            self.gl.buffer_sub_data_u8_slice(target, offset_bytes as i32, data);
        }
    }

    fn delete_buffer(&mut self, buffer: glow::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) }
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<glow::Buffer>) {
        unsafe { self.gl.bind_buffer(buffer_target(target), buffer) }
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<glow::Shader, String> {
        unsafe {
            let shader = self.gl.create_shader(shader_stage(stage))?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if self.gl.get_shader_compile_status(shader) {
                Ok(shader)
            } else {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                Err(log)
            }
        }
    }

    fn delete_shader(&mut self, shader: glow::Shader) {
        unsafe { self.gl.delete_shader(shader) }
    }

    fn link_program(
        &mut self,
        vertex: glow::Shader,
        fragment: glow::Shader,
        attribute_locations: &[(u32, &str)],
    ) -> Result<glow::Program, String> {
        unsafe {
            let program = self.gl.create_program()?;
            self.gl.attach_shader(program, vertex);
            self.gl.attach_shader(program, fragment);
            for (index, name) in attribute_locations {
                self.gl.bind_attrib_location(program, *index, name);
            }
            self.gl.link_program(program);
            if self.gl.get_program_link_status(program) {
                Ok(program)
            } else {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                Err(log)
            }
        }
    }

    fn active_uniforms(&mut self, program: glow::Program) -> Vec<ActiveUniform<glow::UniformLocation>> {
        unsafe {
            let count = self.gl.get_active_uniforms(program);
            let mut out = Vec::with_capacity(count as usize);
            for index in 0..count {
                let Some(info) = self.gl.get_active_uniform(program, index) else {
                    continue;
                };
                let Some(location) = self.gl.get_uniform_location(program, &info.name) else {
                    continue;
                };
                let name = info.name.strip_suffix("[0]").unwrap_or(&info.name).to_owned();
                out.push(ActiveUniform { name, ty: uniform_type(info.utype), size: info.size, location });
            }
            out
        }
    }

    fn use_program(&mut self, program: Option<glow::Program>) {
        unsafe { self.gl.use_program(program) }
    }

    fn delete_program(&mut self, program: glow::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn set_uniform(&mut self, location: &glow::UniformLocation, value: UniformValue<'_>) {
        let l = Some(location);
        unsafe {
            match value {
                UniformValue::Float1(x) => self.gl.uniform_1_f32(l, x),
                UniformValue::Float2([x, y]) => self.gl.uniform_2_f32(l, x, y),
                UniformValue::Float3([x, y, z]) => self.gl.uniform_3_f32(l, x, y, z),
                UniformValue::Float4([x, y, z, w]) => self.gl.uniform_4_f32(l, x, y, z, w),
                UniformValue::Int1(x) => self.gl.uniform_1_i32(l, x),
                UniformValue::Int2([x, y]) => self.gl.uniform_2_i32(l, x, y),
                UniformValue::Int3([x, y, z]) => self.gl.uniform_3_i32(l, x, y, z),
                UniformValue::Int4([x, y, z, w]) => self.gl.uniform_4_i32(l, x, y, z, w),
                UniformValue::Float1v(v) => self.gl.uniform_1_f32_slice(l, v),
                UniformValue::Float2v(v) => self.gl.uniform_2_f32_slice(l, v),
                UniformValue::Float3v(v) => self.gl.uniform_3_f32_slice(l, v),
                UniformValue::Float4v(v) => self.gl.uniform_4_f32_slice(l, v),
                UniformValue::Int1v(v) => self.gl.uniform_1_i32_slice(l, v),
                UniformValue::Int2v(v) => self.gl.uniform_2_i32_slice(l, v),
                UniformValue::Int3v(v) => self.gl.uniform_3_i32_slice(l, v),
                UniformValue::Int4v(v) => self.gl.uniform_4_i32_slice(l, v),
                UniformValue::Matrix2 { transpose, values } => {
                    self.gl.uniform_matrix_2_f32_slice(l, transpose, values)
                }
                UniformValue::Matrix3 { transpose, values } => {
                    self.gl.uniform_matrix_3_f32_slice(l, transpose, values)
                }
                UniformValue::Matrix4 { transpose, values } => {
                    self.gl.uniform_matrix_4_f32_slice(l, transpose, values)
                }
            }
        }
    }

    fn create_vertex_array(&mut self) -> Result<glow::VertexArray, String> {
        unsafe { self.gl.create_vertex_array() }
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<glow::VertexArray>) {
        unsafe { self.gl.bind_vertex_array(vertex_array) }
    }

    fn delete_vertex_array(&mut self, vertex_array: glow::VertexArray) {
        unsafe { self.gl.delete_vertex_array(vertex_array) }
    }

    fn set_vertex_attrib_array_enabled(&mut self, slot: u32, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable_vertex_attrib_array(slot);
            } else {
                self.gl.disable_vertex_attrib_array(slot);
            }
        }
    }

    fn vertex_attrib_pointer(&mut self, slot: u32, p: AttribPointer) {
        unsafe {
            self.gl.vertex_attrib_pointer_f32(
                slot,
                p.components as i32,
                vertex_source_type(p.source_type),
                p.normalize,
                p.stride_bytes as i32,
                p.offset_bytes as i32,
            );
        }
    }

    fn vertex_attrib_divisor(&mut self, slot: u32, divisor: u32) {
        unsafe { self.gl.vertex_attrib_divisor(slot, divisor) }
    }

    fn vertex_attrib_constant(&mut self, slot: u32, [x, y, z, w]: [f32; 4]) {
        unsafe { self.gl.vertex_attrib_4_f32(slot, x, y, z, w) }
    }

    fn create_texture(&mut self) -> Result<glow::Texture, String> {
        unsafe { self.gl.create_texture() }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<glow::Texture>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, texture);
        }
    }

    fn set_sampling(&mut self, s: &SamplingParameters) {
        unsafe {
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, mag_filter(s.mag_filter));
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, min_filter(s.min_filter));
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, wrap_mode(s.wrap_s));
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, wrap_mode(s.wrap_t));
        }
    }

    fn set_pixel_storage(&mut self, storage: &PixelStorage) {
        unsafe {
            self.gl.pixel_store_i32(glow::PACK_ALIGNMENT, storage.pack_alignment);
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, storage.unpack_alignment);
            #[cfg(target_arch = "wasm32")]
            {
                self.gl.pixel_store_bool(UNPACK_FLIP_Y_WEBGL, storage.flip_y);
                self.gl.pixel_store_bool(UNPACK_PREMULTIPLY_ALPHA_WEBGL, storage.premultiply_alpha);
                let conversion = match storage.color_space_conversion {
                    super::ColorSpaceConversion::None => glow::NONE as i32,
                    super::ColorSpaceConversion::Default => BROWSER_DEFAULT_WEBGL,
                };
                self.gl.pixel_store_i32(UNPACK_COLORSPACE_CONVERSION_WEBGL, conversion);
            }
        }
    }

    fn tex_image_2d(&mut self, image: TexImage<'_>) {
        let format = texture_format(image.format);
        unsafe {
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                image.level as i32,
                format as i32,
                image.width as i32,
                image.height as i32,
                0,
                format,
                texture_data_type(image.data_type),
                image.pixels,
            );
        }
    }

    fn tex_sub_image_2d(
        &mut self,
        level: u32,
        region: TextureRegion,
        format: TextureFormat,
        data_type: TextureDataType,
        pixels: &[u8],
    ) {
        unsafe {
            self.gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                level as i32,
                region.x as i32,
                region.y as i32,
                region.width as i32,
                region.height as i32,
                texture_format(format),
                texture_data_type(data_type),
                glow::PixelUnpackData::Slice(pixels),
            );
        }
    }

    fn generate_mipmap(&mut self) {
        unsafe { self.gl.generate_mipmap(glow::TEXTURE_2D) }
    }

    fn delete_texture(&mut self, texture: glow::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<glow::Framebuffer>) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer) }
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        unsafe { self.gl.viewport(x, y, width as i32, height as i32) }
    }

    fn clear(&mut self, options: &ClearOptions) {
        let mut mask = 0;
        unsafe {
            if let Some([r, g, b, a]) = options.color {
                self.gl.clear_color(r, g, b, a);
                mask |= glow::COLOR_BUFFER_BIT;
            }
            if let Some(depth) = options.depth {
                self.gl.clear_depth_f32(depth);
                mask |= glow::DEPTH_BUFFER_BIT;
            }
            if let Some(stencil) = options.stencil {
                self.gl.clear_stencil(stencil);
                mask |= glow::STENCIL_BUFFER_BIT;
            }
            self.gl.clear(mask);
        }
    }

    fn set_enabled(&mut self, cap: Capability, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(capability(cap));
            } else {
                self.gl.disable(capability(cap));
            }
        }
    }

    fn color_mask(&mut self, enabled: bool) {
        unsafe { self.gl.color_mask(enabled, enabled, enabled, enabled) }
    }

    fn depth_mask(&mut self, enabled: bool) {
        unsafe { self.gl.depth_mask(enabled) }
    }

    fn stencil_mask(&mut self, mask: u32) {
        unsafe { self.gl.stencil_mask(mask) }
    }

    fn stencil_func(&mut self, func: StencilFunc, reference: i32, mask: u32) {
        unsafe { self.gl.stencil_func(stencil_func(func), reference, mask) }
    }

    fn stencil_op(&mut self, stencil_fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        unsafe { self.gl.stencil_op(stencil_op(stencil_fail), stencil_op(depth_fail), stencil_op(pass)) }
    }

    fn blend_func(&mut self, equation: BlendEquation, src: BlendFactor, dst: BlendFactor) {
        unsafe {
            self.gl.blend_equation(blend_equation(equation));
            self.gl.blend_func(blend_factor(src), blend_factor(dst));
        }
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32, instances: Option<u32>) {
        unsafe {
            match instances {
                Some(n) => self.gl.draw_arrays_instanced(draw_mode(mode), first as i32, count as i32, n as i32),
                None => self.gl.draw_arrays(draw_mode(mode), first as i32, count as i32),
            }
        }
    }

    fn draw_elements(
        &mut self,
        mode: DrawMode,
        count: u32,
        ty: IndexType,
        offset_bytes: u32,
        instances: Option<u32>,
    ) {
        unsafe {
            match instances {
                Some(n) => self.gl.draw_elements_instanced(
                    draw_mode(mode),
                    count as i32,
                    index_type(ty),
                    offset_bytes as i32,
                    n as i32,
                ),
                None => self.gl.draw_elements(draw_mode(mode), count as i32, index_type(ty), offset_bytes as i32),
            }
        }
    }
}
