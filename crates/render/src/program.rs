use crate::attributes::AttributeTable;
use crate::context::RenderContext;
use crate::gpu::{FragmentOutput, GpuDevice, ProgramId, UniformValue};
use crate::shader::ShaderUnit;
use tracing::{error, info, trace};

/// A linked vertex + fragment program together with the attribute table
/// describing how vertex data feeds it.
///
/// Linking never aborts: a program whose stages fail to compile or link is
/// kept as an invalid program that ignores every call. Errors are logged.
#[derive(Debug)]
pub struct ShaderProgram {
    label: String,
    handle: Option<ProgramId>,
    attributes: AttributeTable,
}

impl ShaderProgram {
    /// Compiles both units if needed, links them with the color output bound
    /// to location 0, then releases the stage handles.
    pub fn link<G: GpuDevice + ?Sized>(
        ctx: &mut RenderContext<'_, G>,
        label: impl Into<String>,
        mut vertex: ShaderUnit,
        mut fragment: ShaderUnit,
    ) -> Self {
        let label = label.into();
        vertex.compile(ctx);
        fragment.compile(ctx);

        let handle = match (vertex.handle(), fragment.handle()) {
            (Some(vs), Some(fs)) => match ctx.gpu().link_program(vs, fs, FragmentOutput::COLOR) {
                Ok(id) => {
                    info!(program = %label, "linked {id}");
                    Some(id)
                }
                Err(e) => {
                    error!(program = %label, "{e}");
                    None
                }
            },
            _ => {
                error!(program = %label, "not linked: a shader stage failed to compile");
                None
            }
        };

        vertex.release(ctx);
        fragment.release(ctx);

        Self {
            label,
            handle,
            attributes: AttributeTable::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> Option<ProgramId> {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    pub fn attributes(&self) -> &AttributeTable {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeTable {
        &mut self.attributes
    }

    /// Makes this the active program. No-op for an invalid program.
    pub fn activate<G: GpuDevice + ?Sized>(&self, ctx: &mut RenderContext<'_, G>) {
        if let Some(handle) = self.handle {
            ctx.use_program(Some(handle));
        }
    }

    /// Looks `name` up and writes `value`. Unknown names are skipped; a
    /// shader compiler is free to strip uniforms it never reads.
    pub fn set_uniform<G: GpuDevice + ?Sized>(
        &self,
        ctx: &mut RenderContext<'_, G>,
        name: &str,
        value: impl Into<UniformValue>,
    ) {
        let Some(handle) = self.handle else {
            return;
        };
        match ctx.gpu().uniform_location(handle, name) {
            Some(location) => ctx.gpu().set_uniform(&location, value.into()),
            None => trace!(program = %self.label, uniform = name, "uniform not found"),
        }
    }

    pub fn attribute_location<G: GpuDevice + ?Sized>(
        &self,
        ctx: &mut RenderContext<'_, G>,
        name: &str,
    ) -> Option<u32> {
        self.handle
            .and_then(|handle| ctx.gpu().attribute_location(handle, name))
    }

    pub fn delete<G: GpuDevice + ?Sized>(self, ctx: &mut RenderContext<'_, G>) {
        if let Some(handle) = self.handle {
            ctx.gpu().delete_program(handle);
        }
    }
}
