//! Render core: shader programs, attribute tables, meshes, the orientation
//! camera and the two-pass pipeline, all written against [`GpuDevice`].
//!
//! # Invariants
//! - Every GPU handle is released exactly once, by its owner.
//! - Within a frame, offscreen drawing precedes the post-process pass, which
//!   precedes presentation.
//! - Bind state is threaded explicitly through [`RenderContext`].

mod attributes;
mod camera;
mod config;
mod context;
pub mod effects;
mod gpu;
mod mesh;
mod model;
mod pipeline;
pub mod primitives;
mod program;
mod shader;
mod target;
mod texture;
mod viewer;

#[cfg(test)]
mod mock;

pub use attributes::{AttributeBinding, AttributeTable};
pub use camera::{
    LOOK_SENSITIVITY, LookState, MOVE_SPEED, OrientationCamera, PITCH_LIMIT, Projection,
};
pub use config::{CameraConfig, ConfigError, GridSettings, LightMarkerSettings, RenderConfig, ViewerConfig};
pub use context::{BindState, RenderContext};
pub use effects::ColorBuffer;
pub use gpu::{
    AttributeLayout, BufferId, BufferKind, FragmentOutput, FramebufferId, GpuDevice, GpuError,
    ProgramId, RenderbufferId, ScalarType, ShaderId, ShaderStage, TextureId, UniformLocation,
    UniformValue, VertexArrayId,
};
pub use mesh::{Mesh, MeshData};
pub use model::{Model, texture_file_name};
pub use pipeline::{FrameStats, ProgramSources, RenderPipeline, ShaderSet};
pub use program::ShaderProgram;
pub use shader::{ShaderSource, ShaderUnit};
pub use target::OffscreenTarget;
pub use texture::{TextureRef, blank_texture, sampler_uniform_names, upload_image};
pub use viewer::{FrameClock, MAX_FRAME_STEP, Viewer};

pub fn crate_info() -> &'static str {
    "modelview-render v0.1.0"
}
