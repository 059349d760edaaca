use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interleaved vertex used by every mesh built from an imported model.
///
/// The layout is fixed: position at byte 0, normal at byte 12, texture
/// coordinate at byte 24, 32 bytes per vertex. Imported meshes bind these to
/// attribute slots 0, 1 and 2.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl Vertex {
    /// Number of floats per vertex.
    pub const FLOATS: usize = 8;
    /// Byte stride between consecutive vertices.
    pub const STRIDE: usize = Self::FLOATS * std::mem::size_of::<f32>();
    pub const POSITION_OFFSET: usize = 0;
    pub const NORMAL_OFFSET: usize = 3 * std::mem::size_of::<f32>();
    pub const TEX_COORDS_OFFSET: usize = 6 * std::mem::size_of::<f32>();

    pub fn new(position: Vec3, normal: Vec3, tex_coords: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            tex_coords: tex_coords.to_array(),
        }
    }
}

/// What a texture is used for on a material.
///
/// The role decides the sampler uniform a texture is bound to: the n-th
/// texture of a role goes to `texture_<role><n>`, counting from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TextureRole {
    Diffuse,
    Specular,
}

impl TextureRole {
    pub const ALL: [TextureRole; 2] = [TextureRole::Diffuse, TextureRole::Specular];

    pub fn uniform_prefix(self) -> &'static str {
        match self {
            TextureRole::Diffuse => "texture_diffuse",
            TextureRole::Specular => "texture_specular",
        }
    }
}

impl fmt::Display for TextureRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uniform_prefix())
    }
}

/// Full-screen effect applied by the post-process pass.
///
/// The discriminant is the integer written to the `selector` uniform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostEffect {
    #[default]
    Passthrough = 0,
    Invert = 1,
    Greyscale = 2,
    /// 9×9 box blur.
    Blur = 3,
    /// Sobel edge detection on luminance.
    EdgeDetect = 4,
}

impl PostEffect {
    pub const ALL: [PostEffect; 5] = [
        PostEffect::Passthrough,
        PostEffect::Invert,
        PostEffect::Greyscale,
        PostEffect::Blur,
        PostEffect::EdgeDetect,
    ];

    pub fn selector(self) -> i32 {
        self as i32
    }

    pub fn from_selector(selector: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.selector() == selector)
    }

    pub fn name(self) -> &'static str {
        match self {
            PostEffect::Passthrough => "passthrough",
            PostEffect::Invert => "invert",
            PostEffect::Greyscale => "greyscale",
            PostEffect::Blur => "blur",
            PostEffect::EdgeDetect => "edge-detect",
        }
    }
}

impl fmt::Display for PostEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.selector())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_eight_packed_floats() {
        assert_eq!(std::mem::size_of::<Vertex>(), Vertex::STRIDE);
        assert_eq!(Vertex::STRIDE, 32);
        assert_eq!(Vertex::TEX_COORDS_OFFSET, 24);

        let v = Vertex::new(Vec3::new(1.0, 2.0, 3.0), Vec3::Y, Vec2::new(0.5, 0.25));
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&v));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 0.0, 1.0, 0.0, 0.5, 0.25]);
    }

    #[test]
    fn effect_selectors_round_trip() {
        for effect in PostEffect::ALL {
            assert_eq!(PostEffect::from_selector(effect.selector()), Some(effect));
        }
        assert_eq!(PostEffect::from_selector(5), None);
        assert_eq!(PostEffect::from_selector(-1), None);
    }

    #[test]
    fn texture_role_prefixes() {
        assert_eq!(TextureRole::Diffuse.uniform_prefix(), "texture_diffuse");
        assert_eq!(TextureRole::Specular.to_string(), "texture_specular");
    }
}
