//! Shared value types for the model viewer.
//!
//! Everything here is plain data: vertices, per-frame scene parameters,
//! camera actions, and the normalized output of the asset importer. The
//! render core, the input layer, and the importer all agree on these types
//! without depending on each other.

mod action;
mod image;
mod scene;
mod types;

pub use action::{Action, Movement};
pub use image::{ImageData, ImageError, ImageLoader};
pub use scene::{ImportedMesh, ImportedScene, SceneParams, TextureSource};
pub use types::{PostEffect, TextureRole, Vertex};

pub fn crate_info() -> &'static str {
    "modelview-common v0.1.0"
}
