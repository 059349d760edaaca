use crate::context::RenderContext;
use crate::gpu::{AttributeLayout, GpuDevice, ScalarType};
use crate::program::ShaderProgram;
use modelview_common::Vertex;
use tracing::warn;

/// A named vertex attribute and where it sits in the vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeBinding {
    pub name: String,
    pub layout: AttributeLayout,
}

/// Ordered list of attribute bindings for one program.
///
/// Names are resolved against the program when the table is applied, not
/// when entries are added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeTable {
    bindings: Vec<AttributeBinding>,
}

impl AttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position, normal and texcoord laid out as [`Vertex`].
    pub fn interleaved_vertex() -> Self {
        let stride = Vertex::STRIDE as u32;
        let mut table = Self::new();
        table
            .add(3, ScalarType::Float, false, stride, "position", Vertex::POSITION_OFFSET as u32)
            .add(3, ScalarType::Float, false, stride, "normal", Vertex::NORMAL_OFFSET as u32)
            .add(2, ScalarType::Float, false, stride, "texcoord", Vertex::TEX_COORDS_OFFSET as u32);
        table
    }

    pub fn add(
        &mut self,
        components: u8,
        scalar: ScalarType,
        normalized: bool,
        stride: u32,
        name: impl Into<String>,
        offset: u32,
    ) -> &mut Self {
        self.bindings.push(AttributeBinding {
            name: name.into(),
            layout: AttributeLayout {
                components,
                scalar,
                normalized,
                stride,
                offset,
            },
        });
        self
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeBinding> {
        self.bindings.iter()
    }

    /// Configures and enables every binding the program actually consumes,
    /// against the currently bound vertex array and vertex buffer.
    ///
    /// Names the program does not expose are logged and skipped. Returns how
    /// many bindings were applied.
    pub fn apply<G: GpuDevice + ?Sized>(
        &self,
        ctx: &mut RenderContext<'_, G>,
        program: &ShaderProgram,
    ) -> usize {
        let Some(handle) = program.handle() else {
            warn!(program = program.label(), "attributes not applied: program is not linked");
            return 0;
        };

        let mut applied = 0;
        for binding in &self.bindings {
            match ctx.gpu().attribute_location(handle, &binding.name) {
                Some(location) => {
                    ctx.vertex_attrib_pointer(location, binding.layout);
                    ctx.enable_vertex_attrib(location);
                    applied += 1;
                }
                None => warn!(
                    program = program.label(),
                    attribute = %binding.name,
                    "attribute not found in program, skipping"
                ),
            }
        }
        applied
    }
}
