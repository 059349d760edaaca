use crate::gpu::{
    AttributeLayout, BufferId, BufferKind, FramebufferId, GpuDevice, GpuError, ProgramId,
    TextureId, VertexArrayId,
};

/// Last value written through each binding call of a [`RenderContext`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindState {
    pub program: Option<ProgramId>,
    pub vertex_array: Option<VertexArrayId>,
    pub vertex_buffer: Option<BufferId>,
    pub active_texture_unit: u32,
    pub framebuffer: Option<FramebufferId>,
    pub depth_test: bool,
    pub blend: bool,
}

/// Explicit graphics context threaded through every rendering call.
///
/// Wraps the device and mirrors the binding state it has been told about.
/// Calls are always forwarded, even when they repeat the current state, so
/// the device never depends on what the mirror believes.
pub struct RenderContext<'g, G: GpuDevice + ?Sized> {
    gpu: &'g mut G,
    state: BindState,
    draw_calls: u32,
}

impl<'g, G: GpuDevice + ?Sized> RenderContext<'g, G> {
    pub fn new(gpu: &'g mut G) -> Self {
        Self {
            gpu,
            state: BindState::default(),
            draw_calls: 0,
        }
    }

    /// Direct access for resource creation and lookups.
    pub fn gpu(&mut self) -> &mut G {
        self.gpu
    }

    pub fn state(&self) -> &BindState {
        &self.state
    }

    /// Draw calls issued through this context.
    pub fn draw_calls(&self) -> u32 {
        self.draw_calls
    }

    pub fn use_program(&mut self, program: Option<ProgramId>) {
        self.state.program = program;
        self.gpu.use_program(program);
    }

    pub fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.state.vertex_array = vertex_array;
        self.gpu.bind_vertex_array(vertex_array);
    }

    pub fn bind_buffer(&mut self, kind: BufferKind, buffer: Option<BufferId>) {
        if kind == BufferKind::Vertex {
            self.state.vertex_buffer = buffer;
        }
        self.gpu.bind_buffer(kind, buffer);
    }

    pub fn vertex_attrib_pointer(&mut self, location: u32, layout: AttributeLayout) {
        self.gpu.vertex_attrib_pointer(location, layout);
    }

    pub fn enable_vertex_attrib(&mut self, location: u32) {
        self.gpu.enable_vertex_attrib(location);
    }

    pub fn active_texture(&mut self, unit: u32) {
        self.state.active_texture_unit = unit;
        self.gpu.active_texture(unit);
    }

    /// Binds to the active texture unit.
    pub fn bind_texture(&mut self, texture: Option<TextureId>) {
        self.gpu.bind_texture(texture);
    }

    pub fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.state.framebuffer = framebuffer;
        self.gpu.bind_framebuffer(framebuffer);
    }

    pub fn set_depth_test(&mut self, enabled: bool) {
        self.state.depth_test = enabled;
        self.gpu.set_depth_test(enabled);
    }

    pub fn set_blend(&mut self, enabled: bool) {
        self.state.blend = enabled;
        self.gpu.set_blend(enabled);
    }

    pub fn clear(&mut self, color: [f32; 4]) {
        self.gpu.clear(color);
    }

    pub fn draw_arrays(&mut self, first: u32, count: u32) {
        self.draw_calls += 1;
        self.gpu.draw_arrays(first, count);
    }

    pub fn draw_elements(&mut self, count: u32) {
        self.draw_calls += 1;
        self.gpu.draw_elements(count);
    }

    pub fn present(&mut self) -> Result<(), GpuError> {
        self.gpu.present()
    }
}
