//! wgpu backend for the model viewer.
//!
//! [`WgpuDevice`] implements the render core's [`modelview_render::GpuDevice`]
//! on top of wgpu. Shader stages are WGSL; names of attributes, uniforms and
//! textures are resolved through naga reflection, so the render core can
//! keep addressing everything by name.
//!
//! # Invariants
//! - A draw captures the state it reads when it is issued, not at present.
//! - Passes execute in the order their targets were bound.
//! - Only bind group 0 is used; a binding number belongs to one stage.

mod device;
mod layout;
pub mod reflect;
mod shaders;

pub use device::{COLOR_FORMAT, DEPTH_FORMAT, DeviceError, WgpuDevice};
pub use reflect::{ReflectError, StageReflection, reflect_wgsl};
pub use shaders::{
    GRID_FRAGMENT, LIGHT_FRAGMENT, MODEL_FRAGMENT, SCENE_VERTEX, SCREEN_FRAGMENT, SCREEN_VERTEX,
    builtin_shader_set, builtin_stages,
};
