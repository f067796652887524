//! Renders a small masked scene on the headless backend and prints what the
//! GPU would have been asked to do.

use anyhow::Context;
use bytemuck::{Pod, Zeroable};

use lumen_engine::backend::{DrawMode, HeadlessBackend, HeadlessConfig};
use lumen_engine::device::{
    Attribute, AttributeLayout, AttributeType, BufferAttribute, BufferDescriptor, Device, DeviceConfig,
    Result as RenderResult, VertexAttribute, VertexLayoutDescriptor,
};
use lumen_engine::logging::{LoggingConfig, init_logging};
use lumen_engine::render::{
    ClearOptions, DrawContext, RenderPass, Renderable, RenderableRef, RenderableState, Renderer, renderable,
};
use lumen_engine::scene::SceneNode;
use lumen_engine::shared::SharedResources;

const RECT_VS: &str = "\
attribute vec2 position;
uniform vec4 rect;
void main() { gl_Position = vec4(rect.xy + position * rect.zw, 0.0, 1.0); }
";

const RECT_FS: &str = "\
precision mediump float;
uniform vec4 color;
void main() { gl_FragColor = color; }
";

const TRIANGLE_VS: &str = "\
attribute vec2 position;
attribute vec4 color;
varying vec4 v_color;
void main() { v_color = color; gl_Position = vec4(position, 0.0, 1.0); }
";

const TRIANGLE_FS: &str = "\
precision mediump float;
uniform float opacity;
varying vec4 v_color;
void main() { gl_FragColor = v_color * opacity; }
";

/// Axis-aligned rectangle on the shared `[0, 1]²` quad.
struct Rect {
    state: RenderableState<HeadlessBackend>,
    rect: [f32; 4],
    color: [f32; 4],
}

impl Rect {
    fn new(rect: [f32; 4], color: [f32; 4]) -> Self {
        Self { state: RenderableState::new(), rect, color }
    }
}

impl Renderable<HeadlessBackend> for Rect {
    fn state(&self) -> &RenderableState<HeadlessBackend> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RenderableState<HeadlessBackend> {
        &mut self.state
    }

    fn allocate_gpu_resources(
        &mut self,
        device: &mut Device<HeadlessBackend>,
        shared: &mut SharedResources<HeadlessBackend>,
    ) -> RenderResult<()> {
        let attributes = SharedResources::<HeadlessBackend>::quad_attribute_layout();
        let program = shared.get_program(device, RECT_VS, RECT_FS, &attributes)?;
        let layout = shared.quad_1x1_vertex_layout(device)?;
        self.state.set_gpu_resources(program, layout);
        Ok(())
    }

    fn draw(&mut self, context: &mut DrawContext<'_, HeadlessBackend>) -> RenderResult<()> {
        let [x, y, w, h] = self.rect;
        // Premultiplied output.
        let [r, g, b, a] = self.color.map(|c| c * self.state.opacity);
        context.uniform_4f("rect", x, y, w, h);
        context.uniform_4f("color", r, g, b, a);
        context.draw(DrawMode::Triangles, 6, 0)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct ColorVertex {
    position: [f32; 2],
    color: [f32; 4],
}

/// Vertex-coloured triangle with its own interleaved buffer.
struct Triangle {
    state: RenderableState<HeadlessBackend>,
    vertices: [ColorVertex; 3],
}

impl Renderable<HeadlessBackend> for Triangle {
    fn state(&self) -> &RenderableState<HeadlessBackend> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RenderableState<HeadlessBackend> {
        &mut self.state
    }

    fn allocate_gpu_resources(
        &mut self,
        device: &mut Device<HeadlessBackend>,
        shared: &mut SharedResources<HeadlessBackend>,
    ) -> RenderResult<()> {
        let attributes = AttributeLayout::new([
            Attribute::new("position", AttributeType::Vec2),
            Attribute::new("color", AttributeType::Vec4),
        ]);
        let program = shared.get_program(device, TRIANGLE_VS, TRIANGLE_FS, &attributes)?;

        let buffer = device.create_buffer(&BufferDescriptor::from_slice(&self.vertices))?;
        let stride = size_of::<ColorVertex>() as u32;
        let layout = device.create_vertex_layout(
            VertexLayoutDescriptor::new(attributes)
                .attribute("position", VertexAttribute::Buffer(BufferAttribute::new(buffer).stride(stride)))
                .attribute(
                    "color",
                    VertexAttribute::Buffer(BufferAttribute::new(buffer).stride(stride).offset(8)),
                ),
        )?;
        self.state.set_gpu_resources(program, layout);
        Ok(())
    }

    fn draw(&mut self, context: &mut DrawContext<'_, HeadlessBackend>) -> RenderResult<()> {
        context.uniform_1f("opacity", self.state.opacity);
        context.draw(DrawMode::Triangles, 3, 0)
    }
}

fn build_scene() -> (SceneNode<HeadlessBackend>, RenderableRef<HeadlessBackend>) {
    let background = renderable(Rect::new([-1.0, -1.0, 2.0, 2.0], [0.1, 0.1, 0.12, 1.0]));
    let clip = renderable(Rect::new([-0.5, -0.5, 1.0, 1.0], [1.0; 4]));

    let mut panel = Rect::new([-0.8, -0.2, 1.6, 0.4], [0.9, 0.4, 0.1, 1.0]);
    panel.state.opacity = 0.75;
    panel.state.render_order_z = 1.0;
    panel.state.mask = Some(clip.clone());

    let mut triangle = Triangle {
        state: RenderableState::new(),
        vertices: [
            ColorVertex { position: [0.0, 0.6], color: [1.0, 0.0, 0.0, 1.0] },
            ColorVertex { position: [-0.6, -0.6], color: [0.0, 1.0, 0.0, 1.0] },
            ColorVertex { position: [0.6, -0.6], color: [0.0, 0.0, 1.0, 1.0] },
        ],
    };
    triangle.state.render_order_z = 0.5;

    let root = SceneNode::leaf(background)
        .with_child(SceneNode::leaf(renderable(triangle)))
        .with_child(SceneNode::leaf(renderable(panel)));
    (root, clip)
}

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    // No native vertex arrays, so layout switches replay attribute state.
    let backend = HeadlessBackend::new(HeadlessConfig {
        vertex_array_objects: false,
        renderer_name: "lumen headless demo".into(),
        ..Default::default()
    });
    let mut device = Device::with_config(backend, DeviceConfig { label: Some("demo".into()), ..Default::default() });
    log::info!("device `{}` on {} ({:?})", device.label(), device.name(), device.capabilities());

    let mut shared = SharedResources::new();
    let mut renderer = Renderer::default();
    let (mut root, _clip) = build_scene();

    for frame in 0..2 {
        device.backend_mut().clear_commands();
        let mut pass =
            RenderPass::new(&mut root).clear(ClearOptions::color([0.0, 0.0, 0.0, 1.0]).with_depth(1.0).with_stencil(0));
        let stats = renderer
            .render(&mut device, &mut shared, &mut pass)
            .with_context(|| format!("rendering frame {frame}"))?;

        println!("frame {frame}: {stats:?} ({} state changes)", stats.state_changes());
        for command in device.backend().commands() {
            println!("  {command:?}");
        }
    }

    println!("live objects: {:?}", device.counts());
    shared.release(&mut device);
    println!("after release: {:?}", device.counts());
    Ok(())
}
