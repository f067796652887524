use std::collections::{HashMap, HashSet};

use super::{
    ActiveUniform, AttribPointer, Backend, BlendEquation, BlendFactor, BufferData, BufferTarget,
    BufferUsage, Capabilities, Capability, ClearOptions, DrawMode, IndexType, PixelStorage,
    SamplingParameters, ShaderStage, StencilFunc, StencilOp, TexImage, TextureDataType,
    TextureFormat, TextureRegion, UniformType, UniformValue,
};

/// Capabilities and surface size reported by a [`HeadlessBackend`].
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub vertex_array_objects: bool,
    pub instancing: bool,
    pub uint_indices: bool,
    pub texture_units: u32,
    pub drawing_buffer_size: (u32, u32),
    pub renderer_name: String,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            vertex_array_objects: true,
            instancing: true,
            uint_indices: true,
            texture_units: 16,
            drawing_buffer_size: (800, 600),
            renderer_name: "headless".to_owned(),
        }
    }
}

/// Uniform location handed out by the headless backend.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct HeadlessUniformLocation {
    pub program: u32,
    pub name: String,
}

/// Owned copy of a [`UniformValue`] as it was written.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedUniform {
    Floats(Vec<f32>),
    Ints(Vec<i32>),
    Matrix { transpose: bool, values: Vec<f32> },
}

impl From<UniformValue<'_>> for RecordedUniform {
    fn from(value: UniformValue<'_>) -> Self {
        use UniformValue as U;
        match value {
            U::Float1(x) => RecordedUniform::Floats(vec![x]),
            U::Float2(v) => RecordedUniform::Floats(v.to_vec()),
            U::Float3(v) => RecordedUniform::Floats(v.to_vec()),
            U::Float4(v) => RecordedUniform::Floats(v.to_vec()),
            U::Int1(x) => RecordedUniform::Ints(vec![x]),
            U::Int2(v) => RecordedUniform::Ints(v.to_vec()),
            U::Int3(v) => RecordedUniform::Ints(v.to_vec()),
            U::Int4(v) => RecordedUniform::Ints(v.to_vec()),
            U::Float1v(v) | U::Float2v(v) | U::Float3v(v) | U::Float4v(v) => {
                RecordedUniform::Floats(v.to_vec())
            }
            U::Int1v(v) | U::Int2v(v) | U::Int3v(v) | U::Int4v(v) => RecordedUniform::Ints(v.to_vec()),
            U::Matrix2 { transpose, values }
            | U::Matrix3 { transpose, values }
            | U::Matrix4 { transpose, values } => RecordedUniform::Matrix {
                transpose,
                values: values.to_vec(),
            },
        }
    }
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateBuffer { buffer: u32, target: BufferTarget, len: usize, usage: BufferUsage },
    UpdateBuffer { buffer: u32, target: BufferTarget, offset_bytes: usize, len: usize },
    DeleteBuffer(u32),
    BindBuffer { target: BufferTarget, buffer: Option<u32> },
    CompileShader { shader: u32, stage: ShaderStage },
    DeleteShader(u32),
    LinkProgram { program: u32, vertex: u32, fragment: u32, attributes: Vec<(u32, String)> },
    UseProgram(Option<u32>),
    DeleteProgram(u32),
    SetUniform { name: String, value: RecordedUniform },
    CreateVertexArray(u32),
    BindVertexArray(Option<u32>),
    DeleteVertexArray(u32),
    SetVertexAttribArrayEnabled { slot: u32, enabled: bool },
    VertexAttribPointer { slot: u32, pointer: AttribPointer },
    VertexAttribDivisor { slot: u32, divisor: u32 },
    VertexAttribConstant { slot: u32, value: [f32; 4] },
    CreateTexture(u32),
    BindTexture { unit: u32, texture: Option<u32> },
    SetSampling(SamplingParameters),
    SetPixelStorage(PixelStorage),
    TexImage2d {
        level: u32,
        format: TextureFormat,
        width: u32,
        height: u32,
        data_type: TextureDataType,
        len: Option<usize>,
    },
    TexSubImage2d { level: u32, region: TextureRegion, len: usize },
    GenerateMipmap,
    DeleteTexture(u32),
    BindFramebuffer(Option<u32>),
    Viewport { x: i32, y: i32, width: u32, height: u32 },
    Clear(ClearOptions),
    SetEnabled { capability: Capability, enabled: bool },
    ColorMask(bool),
    DepthMask(bool),
    StencilMask(u32),
    StencilFunc { func: StencilFunc, reference: i32, mask: u32 },
    StencilOp { stencil_fail: StencilOp, depth_fail: StencilOp, pass: StencilOp },
    BlendFunc { equation: BlendEquation, src: BlendFactor, dst: BlendFactor },
    DrawArrays { mode: DrawMode, first: u32, count: u32, instances: Option<u32> },
    DrawElements {
        mode: DrawMode,
        count: u32,
        index_type: IndexType,
        offset_bytes: u32,
        instances: Option<u32>,
    },
}

impl Command {
    #[inline]
    pub fn is_draw(&self) -> bool {
        matches!(self, Command::DrawArrays { .. } | Command::DrawElements { .. })
    }
}

/// A backend that executes nothing and records everything.
///
/// Shader handling is just smart enough to exercise the device: a `#error`
/// directive fails compilation, a stage without `main` fails linking, and
/// active uniforms are read off `uniform <type> <name>;` declarations.
#[derive(Debug)]
pub struct HeadlessBackend {
    config: HeadlessConfig,
    next_handle: u32,
    buffers: HashSet<u32>,
    textures: HashSet<u32>,
    vertex_arrays: HashSet<u32>,
    shaders: HashMap<u32, (ShaderStage, String)>,
    programs: HashMap<u32, Vec<ActiveUniform<HeadlessUniformLocation>>>,
    commands: Vec<Command>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(HeadlessConfig::default())
    }
}

impl HeadlessBackend {
    pub fn new(config: HeadlessConfig) -> Self {
        Self {
            config,
            next_handle: 1,
            buffers: HashSet::new(),
            textures: HashSet::new(),
            vertex_arrays: HashSet::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            commands: Vec::new(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.drawing_buffer_size = (width, height);
    }

    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }

    pub fn draw_count(&self) -> usize {
        self.count(Command::is_draw)
    }

    #[inline]
    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    #[inline]
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    #[inline]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    #[inline]
    pub fn live_vertex_arrays(&self) -> usize {
        self.vertex_arrays.len()
    }

    fn handle(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    fn record(&mut self, command: Command) {
        self.commands.push(command);
    }
}

const PRECISION_QUALIFIERS: [&str; 3] = ["lowp", "mediump", "highp"];

/// Strips comments and preprocessor lines.
fn statements(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        let line = match line.find("//") {
            Some(i) => &line[..i],
            None => line,
        };
        if line.trim_start().starts_with('#') {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn uniform_type(name: &str) -> UniformType {
    match name {
        "float" => UniformType::Float,
        "vec2" => UniformType::Vec2,
        "vec3" => UniformType::Vec3,
        "vec4" => UniformType::Vec4,
        "int" => UniformType::Int,
        "ivec2" => UniformType::IVec2,
        "ivec3" => UniformType::IVec3,
        "ivec4" => UniformType::IVec4,
        "bool" => UniformType::Bool,
        "bvec2" => UniformType::BVec2,
        "bvec3" => UniformType::BVec3,
        "bvec4" => UniformType::BVec4,
        "mat2" => UniformType::Mat2,
        "mat3" => UniformType::Mat3,
        "mat4" => UniformType::Mat4,
        "sampler2D" => UniformType::Sampler2D,
        "samplerCube" => UniformType::SamplerCube,
        _ => UniformType::Other(0),
    }
}

/// `(name, type, array size)` for every `uniform` declaration in `source`.
fn declared_uniforms(source: &str) -> Vec<(String, UniformType, i32)> {
    let mut out = Vec::new();
    for statement in statements(source).split(';') {
        let mut tokens = statement.split_whitespace();
        if tokens.next() != Some("uniform") {
            continue;
        }
        let mut ty = None;
        let mut declarators = String::new();
        for token in tokens {
            if ty.is_none() {
                if !PRECISION_QUALIFIERS.contains(&token) {
                    ty = Some(uniform_type(token));
                }
            } else {
                declarators.push_str(token);
            }
        }
        let Some(ty) = ty else { continue };

        for decl in declarators.split(',').filter(|d| !d.is_empty()) {
            let (name, size) = match decl.split_once('[') {
                Some((name, rest)) => {
                    let size = rest.trim_end_matches(']').parse().unwrap_or(1);
                    (name, size)
                }
                None => (decl, 1),
            };
            out.push((name.to_owned(), ty, size));
        }
    }
    out
}

fn compile_error(source: &str) -> Option<String> {
    source.lines().enumerate().find_map(|(i, line)| {
        let line = line.trim_start();
        line.strip_prefix("#error")
            .map(|msg| format!("ERROR: 0:{}: '#error' : {}", i + 1, msg.trim()))
    })
}

impl Backend for HeadlessBackend {
    type Buffer = u32;
    type Texture = u32;
    type Shader = u32;
    type Program = u32;
    type VertexArray = u32;
    type UniformLocation = HeadlessUniformLocation;
    type Framebuffer = u32;

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            vertex_array_objects: self.config.vertex_array_objects,
            instancing: self.config.instancing,
            uint_indices: self.config.uint_indices,
            texture_units: self.config.texture_units,
        }
    }

    fn renderer_name(&self) -> String {
        self.config.renderer_name.clone()
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.config.drawing_buffer_size
    }

    fn create_buffer(
        &mut self,
        target: BufferTarget,
        data: BufferData<'_>,
        usage: BufferUsage,
    ) -> Result<u32, String> {
        let buffer = self.handle();
        self.buffers.insert(buffer);
        self.record(Command::CreateBuffer { buffer, target, len: data.len(), usage });
        Ok(buffer)
    }

    fn update_buffer(&mut self, target: BufferTarget, buffer: u32, offset_bytes: usize, data: &[u8]) {
        self.record(Command::UpdateBuffer { buffer, target, offset_bytes, len: data.len() });
    }

    fn delete_buffer(&mut self, buffer: u32) {
        self.buffers.remove(&buffer);
        self.record(Command::DeleteBuffer(buffer));
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<u32>) {
        self.record(Command::BindBuffer { target, buffer });
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<u32, String> {
        if let Some(log) = compile_error(source) {
            return Err(log);
        }
        let shader = self.handle();
        self.shaders.insert(shader, (stage, source.to_owned()));
        self.record(Command::CompileShader { shader, stage });
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: u32) {
        self.shaders.remove(&shader);
        self.record(Command::DeleteShader(shader));
    }

    fn link_program(
        &mut self,
        vertex: u32,
        fragment: u32,
        attribute_locations: &[(u32, &str)],
    ) -> Result<u32, String> {
        let mut uniforms: Vec<(String, UniformType, i32)> = Vec::new();
        for shader in [vertex, fragment] {
            let Some((stage, source)) = self.shaders.get(&shader) else {
                return Err(format!("shader {shader} does not exist"));
            };
            if !source.contains("main") {
                return Err(format!("ERROR: missing main() in {stage} shader"));
            }
            for u in declared_uniforms(source) {
                if !uniforms.iter().any(|(name, ..)| *name == u.0) {
                    uniforms.push(u);
                }
            }
        }

        let program = self.handle();
        let active = uniforms
            .into_iter()
            .map(|(name, ty, size)| ActiveUniform {
                location: HeadlessUniformLocation { program, name: name.clone() },
                name,
                ty,
                size,
            })
            .collect();
        self.programs.insert(program, active);
        self.record(Command::LinkProgram {
            program,
            vertex,
            fragment,
            attributes: attribute_locations.iter().map(|(i, n)| (*i, (*n).to_owned())).collect(),
        });
        Ok(program)
    }

    fn active_uniforms(&mut self, program: u32) -> Vec<ActiveUniform<HeadlessUniformLocation>> {
        self.programs.get(&program).cloned().unwrap_or_default()
    }

    fn use_program(&mut self, program: Option<u32>) {
        self.record(Command::UseProgram(program));
    }

    fn delete_program(&mut self, program: u32) {
        self.programs.remove(&program);
        self.record(Command::DeleteProgram(program));
    }

    fn set_uniform(&mut self, location: &HeadlessUniformLocation, value: UniformValue<'_>) {
        self.record(Command::SetUniform { name: location.name.clone(), value: value.into() });
    }

    fn create_vertex_array(&mut self) -> Result<u32, String> {
        if !self.config.vertex_array_objects {
            return Err("vertex array objects are not supported".to_owned());
        }
        let vao = self.handle();
        self.vertex_arrays.insert(vao);
        self.record(Command::CreateVertexArray(vao));
        Ok(vao)
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<u32>) {
        self.record(Command::BindVertexArray(vertex_array));
    }

    fn delete_vertex_array(&mut self, vertex_array: u32) {
        self.vertex_arrays.remove(&vertex_array);
        self.record(Command::DeleteVertexArray(vertex_array));
    }

    fn set_vertex_attrib_array_enabled(&mut self, slot: u32, enabled: bool) {
        self.record(Command::SetVertexAttribArrayEnabled { slot, enabled });
    }

    fn vertex_attrib_pointer(&mut self, slot: u32, pointer: AttribPointer) {
        self.record(Command::VertexAttribPointer { slot, pointer });
    }

    fn vertex_attrib_divisor(&mut self, slot: u32, divisor: u32) {
        self.record(Command::VertexAttribDivisor { slot, divisor });
    }

    fn vertex_attrib_constant(&mut self, slot: u32, value: [f32; 4]) {
        self.record(Command::VertexAttribConstant { slot, value });
    }

    fn create_texture(&mut self) -> Result<u32, String> {
        let texture = self.handle();
        self.textures.insert(texture);
        self.record(Command::CreateTexture(texture));
        Ok(texture)
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<u32>) {
        self.record(Command::BindTexture { unit, texture });
    }

    fn set_sampling(&mut self, sampling: &SamplingParameters) {
        self.record(Command::SetSampling(*sampling));
    }

    fn set_pixel_storage(&mut self, storage: &PixelStorage) {
        self.record(Command::SetPixelStorage(*storage));
    }

    fn tex_image_2d(&mut self, image: TexImage<'_>) {
        self.record(Command::TexImage2d {
            level: image.level,
            format: image.format,
            width: image.width,
            height: image.height,
            data_type: image.data_type,
            len: image.pixels.map(<[u8]>::len),
        });
    }

    fn tex_sub_image_2d(
        &mut self,
        level: u32,
        region: TextureRegion,
        _format: TextureFormat,
        _data_type: TextureDataType,
        pixels: &[u8],
    ) {
        self.record(Command::TexSubImage2d { level, region, len: pixels.len() });
    }

    fn generate_mipmap(&mut self) {
        self.record(Command::GenerateMipmap);
    }

    fn delete_texture(&mut self, texture: u32) {
        self.textures.remove(&texture);
        self.record(Command::DeleteTexture(texture));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<u32>) {
        self.record(Command::BindFramebuffer(framebuffer));
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.record(Command::Viewport { x, y, width, height });
    }

    fn clear(&mut self, options: &ClearOptions) {
        self.record(Command::Clear(*options));
    }

    fn set_enabled(&mut self, capability: Capability, enabled: bool) {
        self.record(Command::SetEnabled { capability, enabled });
    }

    fn color_mask(&mut self, enabled: bool) {
        self.record(Command::ColorMask(enabled));
    }

    fn depth_mask(&mut self, enabled: bool) {
        self.record(Command::DepthMask(enabled));
    }

    fn stencil_mask(&mut self, mask: u32) {
        self.record(Command::StencilMask(mask));
    }

    fn stencil_func(&mut self, func: StencilFunc, reference: i32, mask: u32) {
        self.record(Command::StencilFunc { func, reference, mask });
    }

    fn stencil_op(&mut self, stencil_fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        self.record(Command::StencilOp { stencil_fail, depth_fail, pass });
    }

    fn blend_func(&mut self, equation: BlendEquation, src: BlendFactor, dst: BlendFactor) {
        self.record(Command::BlendFunc { equation, src, dst });
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32, instances: Option<u32>) {
        self.record(Command::DrawArrays { mode, first, count, instances });
    }

    fn draw_elements(
        &mut self,
        mode: DrawMode,
        count: u32,
        index_type: IndexType,
        offset_bytes: u32,
        instances: Option<u32>,
    ) {
        self.record(Command::DrawElements { mode, count, index_type, offset_bytes, instances });
    }
}
