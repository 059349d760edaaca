use crate::context::RenderContext;
use crate::gpu::{GpuDevice, ShaderId, ShaderStage};
use std::borrow::Cow;
use std::fmt;
use std::io;
use std::path::PathBuf;
use tracing::{debug, error, warn};

/// Where a shader's text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    /// Read from disk when the unit is compiled.
    File(PathBuf),
    Inline(String),
}

impl ShaderSource {
    pub fn read(&self) -> io::Result<Cow<'_, str>> {
        match self {
            ShaderSource::File(path) => std::fs::read_to_string(path).map(Cow::Owned),
            ShaderSource::Inline(text) => Ok(Cow::Borrowed(text)),
        }
    }
}

impl fmt::Display for ShaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderSource::File(path) => write!(f, "{}", path.display()),
            ShaderSource::Inline(_) => f.write_str("<inline>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompileState {
    Pending,
    Compiled(ShaderId),
    Failed,
    Released,
}

/// One shader stage: source text plus the compiled handle, once there is one.
///
/// Compilation is lazy and happens at most once. A failed compile is
/// remembered and reported as failure on every later attempt.
#[derive(Debug)]
pub struct ShaderUnit {
    source: ShaderSource,
    stage: ShaderStage,
    state: CompileState,
}

impl ShaderUnit {
    pub fn new(source: ShaderSource, stage: ShaderStage) -> Self {
        Self {
            source,
            stage,
            state: CompileState::Pending,
        }
    }

    pub fn from_file(path: impl Into<PathBuf>, stage: ShaderStage) -> Self {
        Self::new(ShaderSource::File(path.into()), stage)
    }

    pub fn inline(text: impl Into<String>, stage: ShaderStage) -> Self {
        Self::new(ShaderSource::Inline(text.into()), stage)
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn source(&self) -> &ShaderSource {
        &self.source
    }

    pub fn handle(&self) -> Option<ShaderId> {
        match self.state {
            CompileState::Compiled(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.handle().is_some()
    }

    /// Compiles on first call. Returns whether a compiled handle exists.
    pub fn compile<G: GpuDevice + ?Sized>(&mut self, ctx: &mut RenderContext<'_, G>) -> bool {
        match self.state {
            CompileState::Compiled(_) => return true,
            CompileState::Failed => return false,
            CompileState::Released => {
                warn!(shader = %self.source, stage = %self.stage, "shader already released");
                return false;
            }
            CompileState::Pending => {}
        }

        let text = match self.source.read() {
            Ok(text) => text,
            Err(e) => {
                error!(shader = %self.source, stage = %self.stage, "cannot read shader source: {e}");
                self.state = CompileState::Failed;
                return false;
            }
        };

        match ctx.gpu().compile_shader(self.stage, &text) {
            Ok(id) => {
                debug!(shader = %self.source, stage = %self.stage, "compiled {id}");
                self.state = CompileState::Compiled(id);
                true
            }
            Err(e) => {
                error!(shader = %self.source, "{e}");
                self.state = CompileState::Failed;
                false
            }
        }
    }

    /// Frees the compiled handle. The unit cannot be compiled again.
    pub fn release<G: GpuDevice + ?Sized>(&mut self, ctx: &mut RenderContext<'_, G>) {
        if let CompileState::Compiled(id) = self.state {
            ctx.gpu().delete_shader(id);
        }
        self.state = CompileState::Released;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGpu;
    use std::io::Write;

    #[test]
    fn compiles_once() {
        let mut gpu = MockGpu::new(1, 1);
        let mut ctx = RenderContext::new(&mut gpu);
        let mut unit = ShaderUnit::inline("attribute position", ShaderStage::Vertex);

        assert!(unit.compile(&mut ctx));
        let first = unit.handle();
        assert!(unit.compile(&mut ctx));
        assert_eq!(unit.handle(), first);
        assert_eq!(gpu.counts("shader").created, 1);
    }

    #[test]
    fn failure_is_sticky() {
        let mut gpu = MockGpu::new(1, 1);
        let mut ctx = RenderContext::new(&mut gpu);
        let mut unit = ShaderUnit::inline("fail missing semicolon", ShaderStage::Fragment);

        assert!(!unit.compile(&mut ctx));
        assert!(!unit.compile(&mut ctx));
        assert!(unit.handle().is_none());
        assert_eq!(gpu.compile_attempts(), 1);
    }

    #[test]
    fn missing_file_is_a_failed_compile() {
        let mut gpu = MockGpu::new(1, 1);
        let mut ctx = RenderContext::new(&mut gpu);
        let mut unit = ShaderUnit::from_file("/nonexistent/shader.wgsl", ShaderStage::Vertex);
        assert!(!unit.compile(&mut ctx));
        assert_eq!(gpu.compile_attempts(), 0);
    }

    #[test]
    fn reads_source_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "uniform model").unwrap();

        let mut gpu = MockGpu::new(1, 1);
        let mut ctx = RenderContext::new(&mut gpu);
        let mut unit = ShaderUnit::from_file(file.path(), ShaderStage::Vertex);
        assert!(unit.compile(&mut ctx));
        unit.release(&mut ctx);
        assert!(!unit.compile(&mut ctx));
        assert_eq!(gpu.counts("shader").deleted, 1);
    }
}
