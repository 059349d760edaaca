use glam::{Mat4, Vec3, Vec4};
use std::fmt;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

gpu_handle!(
    /// A compiled shader stage.
    ShaderId
);
gpu_handle!(
    /// A linked vertex + fragment program.
    ProgramId
);
gpu_handle!(BufferId);
gpu_handle!(
    /// Records attribute layouts and the element buffer for a mesh.
    VertexArrayId
);
gpu_handle!(TextureId);
gpu_handle!(
    /// Combined depth + stencil attachment.
    RenderbufferId
);
gpu_handle!(FramebufferId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    /// `u32` triangle-list indices.
    Index,
}

/// Component type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Float,
    Int,
    UnsignedInt,
}

impl ScalarType {
    pub fn size_bytes(self) -> u32 {
        4
    }
}

/// How one attribute is laid out inside the bound vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeLayout {
    pub components: u8,
    pub scalar: ScalarType,
    pub normalized: bool,
    /// Bytes between consecutive vertices.
    pub stride: u32,
    /// Byte offset of the first component.
    pub offset: u32,
}

impl AttributeLayout {
    pub fn floats(components: u8, stride: u32, offset: u32) -> Self {
        Self {
            components,
            scalar: ScalarType::Float,
            normalized: false,
            stride,
            offset,
        }
    }

    /// Bytes occupied by one attribute value.
    pub fn size_bytes(&self) -> u32 {
        self.components as u32 * self.scalar.size_bytes()
    }
}

/// Fragment output slot a program writes its color to.
///
/// Passed to [`GpuDevice::link_program`] so the binding is fixed before the
/// program is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentOutput<'a> {
    pub name: &'a str,
    pub location: u32,
}

impl FragmentOutput<'static> {
    pub const COLOR: FragmentOutput<'static> = FragmentOutput {
        name: "outColor",
        location: 0,
    };
}

/// Resolved uniform slot inside a specific program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub program: ProgramId,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Int(v as i32)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GpuError {
    #[error("{stage} shader compilation failed: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("program link failed: {0}")]
    Link(String),
    #[error("framebuffer incomplete: {0}")]
    IncompleteFramebuffer(String),
    #[error("surface error: {0}")]
    Surface(String),
}

/// Immediate-mode graphics device with explicit bind state.
///
/// Handles are plain integers owned by whoever created them; every handle
/// must be deleted exactly once. Binding calls change device state that
/// later calls (attribute setup, draws) read. All binding goes through
/// [`crate::RenderContext`], which mirrors the state for callers.
pub trait GpuDevice {
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, GpuError>;
    fn delete_shader(&mut self, shader: ShaderId);

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        output: FragmentOutput<'_>,
    ) -> Result<ProgramId, GpuError>;
    fn delete_program(&mut self, program: ProgramId);
    fn use_program(&mut self, program: Option<ProgramId>);

    /// Vertex input location of `name`, if the program consumes it.
    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32>;
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    /// Values persist with their program until overwritten.
    fn set_uniform(&mut self, location: &UniformLocation, value: UniformValue);

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> BufferId;
    fn delete_buffer(&mut self, buffer: BufferId);
    /// Binding an index buffer records it in the bound vertex array.
    fn bind_buffer(&mut self, kind: BufferKind, buffer: Option<BufferId>);

    fn create_vertex_array(&mut self) -> VertexArrayId;
    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId);
    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>);
    /// Records `layout` for `location` in the bound vertex array, sourced
    /// from the bound vertex buffer.
    fn vertex_attrib_pointer(&mut self, location: u32, layout: AttributeLayout);
    fn enable_vertex_attrib(&mut self, location: u32);

    /// RGBA8 texture. `None` leaves the contents zeroed.
    fn create_texture(&mut self, width: u32, height: u32, rgba: Option<&[u8]>) -> TextureId;
    fn delete_texture(&mut self, texture: TextureId);
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, texture: Option<TextureId>);

    fn create_renderbuffer(&mut self, width: u32, height: u32) -> RenderbufferId;
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId);

    fn create_framebuffer(
        &mut self,
        color: TextureId,
        depth_stencil: RenderbufferId,
    ) -> Result<FramebufferId, GpuError>;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    /// `None` selects the window's default framebuffer.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);

    fn set_depth_test(&mut self, enabled: bool);
    fn set_blend(&mut self, enabled: bool);
    /// Clears color, depth and stencil of the bound framebuffer.
    fn clear(&mut self, color: [f32; 4]);

    fn draw_arrays(&mut self, first: u32, count: u32);
    /// Draws `count` indices from the bound vertex array's element buffer.
    fn draw_elements(&mut self, count: u32);

    /// Finishes the frame and shows the default framebuffer.
    fn present(&mut self) -> Result<(), GpuError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_display_with_kind() {
        assert_eq!(TextureId(7).to_string(), "TextureId#7");
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }

    #[test]
    fn uniform_values_convert() {
        assert_eq!(UniformValue::from(true), UniformValue::Int(1));
        assert_eq!(UniformValue::from(3), UniformValue::Int(3));
        assert_eq!(UniformValue::from(Vec3::X), UniformValue::Vec3(Vec3::X));
    }

    #[test]
    fn attribute_layout_size() {
        assert_eq!(AttributeLayout::floats(3, 32, 12).size_bytes(), 12);
    }
}
