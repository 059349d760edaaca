use crate::types::{PostEffect, TextureRole, Vertex};
use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-frame parameters consumed by the render pipeline.
///
/// Input handling produces a new value every frame; the pipeline only reads
/// it. Nothing in the render core keeps its own copy between frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneParams {
    pub effect: PostEffect,
    /// Uniform scale applied to the loaded model.
    pub model_scale: f32,
    pub rotation_axis: Vec3,
    pub rotation_degrees: f32,
    /// Ambient light intensity in `[0, 1]`.
    pub ambient_intensity: f32,
    pub light_position: Vec3,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            effect: PostEffect::Passthrough,
            model_scale: 1.0,
            rotation_axis: Vec3::Y,
            rotation_degrees: 0.0,
            ambient_intensity: 1.0,
            light_position: Vec3::new(0.0, 1.0, 0.0),
        }
    }
}

impl SceneParams {
    /// Model matrix for the loaded model: scale, then rotate about the axis.
    pub fn model_matrix(&self) -> Mat4 {
        let axis = self.rotation_axis.try_normalize().unwrap_or(Vec3::Y);
        Mat4::from_scale(Vec3::splat(self.model_scale))
            * Mat4::from_axis_angle(axis, self.rotation_degrees.to_radians())
    }

    /// Model matrix for the light marker.
    pub fn light_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.light_position)
    }

    /// Value of the `ambientLight` uniform.
    pub fn ambient_light(&self) -> Vec4 {
        let a = self.ambient_intensity;
        Vec4::new(a, a, a, 1.0)
    }

    pub fn with_effect(self, effect: PostEffect) -> Self {
        Self { effect, ..self }
    }
}

/// A texture reference as the importer reports it, before any GPU upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSource {
    /// Path exactly as stored in the source asset. May be absolute, use
    /// backslashes, or point somewhere that no longer exists.
    pub path: String,
    pub role: TextureRole,
}

/// One mesh of an imported model, normalized to the vertex/index/texture triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportedMesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    /// Triangle list.
    pub indices: Vec<u32>,
    pub textures: Vec<TextureSource>,
}

/// Output of the asset importer: every mesh of the node tree, flattened in
/// traversal order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportedScene {
    pub source: PathBuf,
    /// Directory texture paths are resolved against.
    pub directory: PathBuf,
    pub meshes: Vec<ImportedMesh>,
}

impl ImportedScene {
    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|m| m.vertices.len()).sum()
    }

    pub fn index_count(&self) -> usize {
        self.meshes.iter().map(|m| m.indices.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_match_startup_state() {
        let p = SceneParams::default();
        assert_eq!(p.effect, PostEffect::Passthrough);
        assert_eq!(p.model_scale, 1.0);
        assert_eq!(p.light_position, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(p.model_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn model_matrix_scales_then_rotates() {
        let p = SceneParams {
            model_scale: 2.0,
            rotation_axis: Vec3::X,
            rotation_degrees: -90.0,
            ..SceneParams::default()
        };
        let m = p.model_matrix();
        // +Y rotated -90° about X lands on -Z, then doubled.
        let v = m.transform_point3(Vec3::Y);
        assert!((v - Vec3::new(0.0, 0.0, -2.0)).length() < 1e-5);
    }

    #[test]
    fn zero_axis_falls_back_to_y() {
        let p = SceneParams {
            rotation_axis: Vec3::ZERO,
            rotation_degrees: 90.0,
            ..SceneParams::default()
        };
        let v = p.model_matrix().transform_point3(Vec3::X);
        assert!((v - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn ambient_light_is_grey_opaque() {
        let p = SceneParams {
            ambient_intensity: 0.25,
            ..SceneParams::default()
        };
        assert_eq!(p.ambient_light(), Vec4::new(0.25, 0.25, 0.25, 1.0));
    }

    #[test]
    fn scene_counts_sum_meshes() {
        let scene = ImportedScene {
            meshes: vec![
                ImportedMesh {
                    vertices: vec![Vertex::default(); 3],
                    indices: vec![0, 1, 2],
                    ..ImportedMesh::default()
                },
                ImportedMesh {
                    vertices: vec![Vertex::default(); 4],
                    indices: vec![0, 1, 2, 0, 2, 3],
                    ..ImportedMesh::default()
                },
            ],
            ..ImportedScene::default()
        };
        assert_eq!(scene.vertex_count(), 7);
        assert_eq!(scene.index_count(), 9);
    }
}
