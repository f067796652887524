use super::viewport::Viewport;
use crate::backend::{Backend, DrawMode, UniformValue};
use crate::device::{CachedUniform, Device, Program, Result, Texture, VertexLayout};

/// What a node's `draw` sees: the bound program and vertex layout plus
/// uniform setters and draw calls.
///
/// Scalar and small-vector setters skip the backend write when the value
/// equals the last one written for that uniform on this program. Array and
/// matrix setters always write. Uniforms the program does not use are
/// silently skipped.
pub struct DrawContext<'a, B: Backend> {
    device: &'a mut Device<B>,
    program: Program,
    vertex_layout: VertexLayout,
    viewport: Viewport,
}

impl<'a, B: Backend> DrawContext<'a, B> {
    pub(crate) fn new(
        device: &'a mut Device<B>,
        program: Program,
        vertex_layout: VertexLayout,
        viewport: Viewport,
    ) -> Self {
        Self { device, program, vertex_layout, viewport }
    }

    #[inline]
    pub fn program(&self) -> Program {
        self.program
    }

    #[inline]
    pub fn vertex_layout(&self) -> VertexLayout {
        self.vertex_layout
    }

    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    pub fn device(&self) -> &Device<B> {
        &*self.device
    }

    /// Escape hatch for uploads during draw (e.g. streaming vertex data).
    ///
    /// Index-buffer and vertex-layout creation detach the bound layout; the
    /// renderer rebinds it before the next node draws.
    #[inline]
    pub fn device_mut(&mut self) -> &mut Device<B> {
        &mut *self.device
    }

    fn cached(&mut self, name: &str, value: CachedUniform) {
        self.device.write_cached_uniform(self.program, name, value);
    }

    fn uncached(&mut self, name: &str, value: UniformValue<'_>) {
        self.device.write_uniform(self.program, name, value);
    }

    // ── cached ────────────────────────────────────────────────────────────

    pub fn uniform_1f(&mut self, name: &str, x: f32) {
        self.cached(name, CachedUniform::Float1(x));
    }

    pub fn uniform_2f(&mut self, name: &str, x: f32, y: f32) {
        self.cached(name, CachedUniform::Float2([x, y]));
    }

    pub fn uniform_3f(&mut self, name: &str, x: f32, y: f32, z: f32) {
        self.cached(name, CachedUniform::Float3([x, y, z]));
    }

    pub fn uniform_4f(&mut self, name: &str, x: f32, y: f32, z: f32, w: f32) {
        self.cached(name, CachedUniform::Float4([x, y, z, w]));
    }

    pub fn uniform_1i(&mut self, name: &str, x: i32) {
        self.cached(name, CachedUniform::Int1(x));
    }

    pub fn uniform_2i(&mut self, name: &str, x: i32, y: i32) {
        self.cached(name, CachedUniform::Int2([x, y]));
    }

    pub fn uniform_3i(&mut self, name: &str, x: i32, y: i32, z: i32) {
        self.cached(name, CachedUniform::Int3([x, y, z]));
    }

    pub fn uniform_4i(&mut self, name: &str, x: i32, y: i32, z: i32, w: i32) {
        self.cached(name, CachedUniform::Int4([x, y, z, w]));
    }

    // ── uncached ──────────────────────────────────────────────────────────

    pub fn uniform_1fv(&mut self, name: &str, values: &[f32]) {
        self.uncached(name, UniformValue::Float1v(values));
    }

    pub fn uniform_2fv(&mut self, name: &str, values: &[f32]) {
        self.uncached(name, UniformValue::Float2v(values));
    }

    pub fn uniform_3fv(&mut self, name: &str, values: &[f32]) {
        self.uncached(name, UniformValue::Float3v(values));
    }

    pub fn uniform_4fv(&mut self, name: &str, values: &[f32]) {
        self.uncached(name, UniformValue::Float4v(values));
    }

    pub fn uniform_1iv(&mut self, name: &str, values: &[i32]) {
        self.uncached(name, UniformValue::Int1v(values));
    }

    pub fn uniform_2iv(&mut self, name: &str, values: &[i32]) {
        self.uncached(name, UniformValue::Int2v(values));
    }

    pub fn uniform_3iv(&mut self, name: &str, values: &[i32]) {
        self.uncached(name, UniformValue::Int3v(values));
    }

    pub fn uniform_4iv(&mut self, name: &str, values: &[i32]) {
        self.uncached(name, UniformValue::Int4v(values));
    }

    pub fn uniform_matrix_2fv(&mut self, name: &str, transpose: bool, values: &[f32]) {
        self.uncached(name, UniformValue::Matrix2 { transpose, values });
    }

    pub fn uniform_matrix_3fv(&mut self, name: &str, transpose: bool, values: &[f32]) {
        self.uncached(name, UniformValue::Matrix3 { transpose, values });
    }

    pub fn uniform_matrix_4fv(&mut self, name: &str, transpose: bool, values: &[f32]) {
        self.uncached(name, UniformValue::Matrix4 { transpose, values });
    }

    // ── textures / draws ──────────────────────────────────────────────────

    /// Points sampler `name` at `texture`'s unit, making it resident first
    /// if it lost (or never had) a unit.
    pub fn uniform_texture_2d(&mut self, name: &str, texture: &Texture<B>) -> Result<()> {
        let unit = self.device.bind_texture(texture)?;
        self.uniform_1i(name, unit as i32);
        Ok(())
    }

    /// Draws `count` indices (or vertices) starting at `offset`.
    pub fn draw(&mut self, mode: DrawMode, count: u32, offset: u32) -> Result<()> {
        self.device.draw(self.vertex_layout, mode, count, offset, None)
    }

    pub fn draw_instanced(&mut self, mode: DrawMode, count: u32, offset: u32, instances: u32) -> Result<()> {
        self.device.draw(self.vertex_layout, mode, count, offset, Some(instances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, HeadlessBackend, HeadlessConfig, RecordedUniform};
    use crate::device::{DeviceConfig, TextureDescriptor};
    use crate::shared::SharedResources;
    use crate::test_support::VS;

    const TEXTURED_FS: &str = "\
precision mediump float;
uniform sampler2D image;
uniform vec4 color;
uniform mat3 transform;
uniform float weights[3];
void main() { gl_FragColor = color; }
";

    struct Fixture {
        device: Device<HeadlessBackend>,
        program: Program,
        layout: VertexLayout,
    }

    fn fixture(config: DeviceConfig) -> Fixture {
        let mut device = Device::with_config(HeadlessBackend::new(HeadlessConfig::default()), config);
        let mut shared = SharedResources::new();
        let layout = shared.quad_1x1_vertex_layout(&mut device).unwrap();
        let program = device
            .create_program(VS, TEXTURED_FS, &SharedResources::<HeadlessBackend>::quad_attribute_layout())
            .unwrap();
        device.use_program(program).unwrap();
        device.backend_mut().clear_commands();
        Fixture { device, program, layout }
    }

    fn uniform_writes(d: &Device<HeadlessBackend>, name: &str) -> Vec<RecordedUniform> {
        d.backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetUniform { name: n, value } if n == name => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn scalar_setters_skip_identical_values() {
        let mut f = fixture(DeviceConfig::default());
        let mut ctx = DrawContext::new(&mut f.device, f.program, f.layout, Viewport::default());
        ctx.uniform_4f("color", 1.0, 0.0, 0.0, 1.0);
        ctx.uniform_4f("color", 1.0, 0.0, 0.0, 1.0);
        ctx.uniform_4f("color", 0.0, 0.0, 1.0, 1.0);
        ctx.uniform_2f("offset", 0.0, 0.0);
        ctx.uniform_1f("not_declared", 1.0);
        assert_eq!(
            uniform_writes(&f.device, "color"),
            [RecordedUniform::Floats(vec![1.0, 0.0, 0.0, 1.0]), RecordedUniform::Floats(vec![0.0, 0.0, 1.0, 1.0])]
        );
        assert_eq!(uniform_writes(&f.device, "offset").len(), 1);
    }

    #[test]
    fn cache_is_shared_across_contexts() {
        let mut f = fixture(DeviceConfig::default());
        DrawContext::new(&mut f.device, f.program, f.layout, Viewport::default()).uniform_1i("image", 0);
        DrawContext::new(&mut f.device, f.program, f.layout, Viewport::default()).uniform_1i("image", 0);
        assert_eq!(uniform_writes(&f.device, "image").len(), 1);
    }

    #[test]
    fn array_and_matrix_setters_always_write() {
        let mut f = fixture(DeviceConfig::default());
        let mut ctx = DrawContext::new(&mut f.device, f.program, f.layout, Viewport::default());
        let identity = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        ctx.uniform_matrix_3fv("transform", false, &identity);
        ctx.uniform_matrix_3fv("transform", false, &identity);
        ctx.uniform_1fv("weights", &[0.25, 0.5, 0.25]);
        ctx.uniform_1fv("weights", &[0.25, 0.5, 0.25]);
        assert_eq!(uniform_writes(&f.device, "transform").len(), 2);
        assert_eq!(uniform_writes(&f.device, "weights").len(), 2);
    }

    #[test]
    fn texture_uniform_rebinds_only_evicted_textures() {
        let mut f = fixture(DeviceConfig { max_texture_units: Some(1), ..Default::default() });
        let a = f.device.create_texture(&TextureDescriptor::empty(2, 2)).unwrap();
        let b = f.device.create_texture(&TextureDescriptor::empty(2, 2)).unwrap();
        f.device.backend_mut().clear_commands();

        let mut ctx = DrawContext::new(&mut f.device, f.program, f.layout, Viewport::default());
        // `b` is resident: only the sampler uniform is written.
        ctx.uniform_texture_2d("image", &b).unwrap();
        // `a` was evicted by `b`: it is bound again, the sampler value is unchanged.
        ctx.uniform_texture_2d("image", &a).unwrap();

        let binds = f.device.backend().count(|c| matches!(c, Command::BindTexture { .. }));
        assert_eq!(binds, 1);
        assert_eq!(uniform_writes(&f.device, "image"), [RecordedUniform::Ints(vec![0])]);
        assert_eq!(f.device.texture_unit(&a), Some(0));
        assert_eq!(f.device.texture_unit(&b), None);
    }

    #[test]
    fn draw_uses_layout_index_buffer() {
        let mut f = fixture(DeviceConfig::default());
        let mut ctx = DrawContext::new(&mut f.device, f.program, f.layout, Viewport::new(0, 0, 10, 10));
        assert_eq!(ctx.viewport().aspect(), 1.0);
        ctx.draw(DrawMode::Triangles, 6, 0).unwrap();
        ctx.draw_instanced(DrawMode::Triangles, 6, 0, 3).unwrap();
        let draws: Vec<_> = f.device.backend().commands().iter().filter(|c| c.is_draw()).cloned().collect();
        assert_eq!(
            draws,
            [
                Command::DrawElements {
                    mode: DrawMode::Triangles,
                    count: 6,
                    index_type: crate::backend::IndexType::U8,
                    offset_bytes: 0,
                    instances: None,
                },
                Command::DrawElements {
                    mode: DrawMode::Triangles,
                    count: 6,
                    index_type: crate::backend::IndexType::U8,
                    offset_bytes: 0,
                    instances: Some(3),
                },
            ]
        );
    }
}
