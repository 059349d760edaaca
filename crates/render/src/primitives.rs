//! Built-in geometry: the post-process quad, the ground plane and the light
//! marker sphere.

use crate::mesh::MeshData;
use glam::{Vec2, Vec3};
use modelview_common::Vertex;
use std::f32::consts::{FRAC_PI_2, PI, TAU};

/// Clip-space quad, `[x, y, u, v]` per vertex: top-left, top-right,
/// bottom-right, bottom-left.
pub const SCREEN_QUAD_VERTICES: [f32; 16] = [
    -1.0, 1.0, 0.0, 1.0, //
    1.0, 1.0, 1.0, 1.0, //
    1.0, -1.0, 1.0, 0.0, //
    -1.0, -1.0, 0.0, 0.0,
];
pub const SCREEN_QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];
pub const SCREEN_QUAD_FLOATS_PER_VERTEX: usize = 4;

pub fn screen_quad() -> MeshData {
    MeshData::raw(SCREEN_QUAD_VERTICES.to_vec(), SCREEN_QUAD_FLOATS_PER_VERTEX)
        .with_indices(SCREEN_QUAD_INDICES.to_vec())
}

/// Two triangles spanning `±half_extent` on the XZ plane, normals up,
/// texture coordinates running from 0 to `uv_repeat`. Eight floats per
/// vertex in [`Vertex`] order, no indices.
pub fn ground_plane(half_extent: f32, uv_repeat: f32) -> MeshData {
    let e = half_extent;
    let r = uv_repeat;
    let corner = |x: f32, z: f32, u: f32, v: f32| [x, 0.0, z, 0.0, 1.0, 0.0, u, v];
    let floats: Vec<f32> = [
        corner(-e, -e, 0.0, 0.0),
        corner(e, -e, r, 0.0),
        corner(e, e, r, r),
        corner(-e, -e, 0.0, 0.0),
        corner(e, e, r, r),
        corner(-e, e, 0.0, r),
    ]
    .concat();
    MeshData::raw(floats, Vertex::FLOATS)
}

/// Latitude/longitude sphere centered on the origin with +Z as the pole.
///
/// Produces `(stacks + 1) * (sectors + 1)` vertices; the seam column is
/// duplicated so texture coordinates wrap cleanly. The pole stacks emit one
/// triangle per sector, every other stack two.
pub fn uv_sphere(radius: f32, stacks: u32, sectors: u32) -> (Vec<Vertex>, Vec<u32>) {
    let stacks = stacks.max(2);
    let sectors = sectors.max(3);
    let stack_step = PI / stacks as f32;
    let sector_step = TAU / sectors as f32;

    let mut vertices = Vec::with_capacity(((stacks + 1) * (sectors + 1)) as usize);
    for i in 0..=stacks {
        let stack_angle = FRAC_PI_2 - i as f32 * stack_step;
        let xy = radius * stack_angle.cos();
        let z = radius * stack_angle.sin();
        for j in 0..=sectors {
            let sector_angle = j as f32 * sector_step;
            let position = Vec3::new(xy * sector_angle.cos(), xy * sector_angle.sin(), z);
            let normal = position.try_normalize().unwrap_or(Vec3::Z);
            let uv = Vec2::new(j as f32 / sectors as f32, i as f32 / stacks as f32);
            vertices.push(Vertex::new(position, normal, uv));
        }
    }

    let mut indices = Vec::with_capacity((sectors * (stacks - 1) * 6) as usize);
    for i in 0..stacks {
        let mut k1 = i * (sectors + 1);
        let mut k2 = k1 + sectors + 1;
        for _ in 0..sectors {
            if i != 0 {
                indices.extend_from_slice(&[k1, k2, k1 + 1]);
            }
            if i != stacks - 1 {
                indices.extend_from_slice(&[k1 + 1, k2, k2 + 1]);
            }
            k1 += 1;
            k2 += 1;
        }
    }

    (vertices, indices)
}
