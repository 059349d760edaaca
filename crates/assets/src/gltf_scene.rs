use crate::AssetError;
use glam::{Vec2, Vec3};
use modelview_common::{ImportedMesh, TextureRole, TextureSource, Vertex};
use std::path::Path;
use tracing::{debug, warn};

pub(crate) fn load(path: &Path) -> Result<Vec<ImportedMesh>, AssetError> {
    let gltf_error = |source| AssetError::Gltf {
        path: path.to_path_buf(),
        source,
    };
    let gltf::Gltf { document, blob } = gltf::Gltf::open(path).map_err(gltf_error)?;
    let buffers = gltf::import_buffers(&document, path.parent(), blob).map_err(gltf_error)?;

    let mut meshes = Vec::new();
    let roots: Vec<gltf::Node> = match document.default_scene().or_else(|| document.scenes().next())
    {
        Some(scene) => scene.nodes().collect(),
        None => document.nodes().collect(),
    };
    for node in roots {
        visit(&node, &buffers, &mut meshes);
    }
    Ok(meshes)
}

fn visit(node: &gltf::Node, buffers: &[gltf::buffer::Data], out: &mut Vec<ImportedMesh>) {
    if let Some(mesh) = node.mesh() {
        let base = mesh
            .name()
            .or(node.name())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("mesh{}", mesh.index()));
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                warn!(mesh = %base, mode = ?primitive.mode(), "skipping non-triangle primitive");
                continue;
            }
            let name = match primitive.index() {
                0 => base.clone(),
                i => format!("{base}.{i}"),
            };
            match convert_primitive(name, &primitive, buffers) {
                Some(imported) => {
                    debug!(
                        mesh = %imported.name,
                        vertices = imported.vertices.len(),
                        "gltf primitive converted"
                    );
                    out.push(imported);
                }
                None => warn!(mesh = %base, "primitive has no positions"),
            }
        }
    }
    for child in node.children() {
        visit(&child, buffers, out);
    }
}

fn convert_primitive(
    name: String,
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
) -> Option<ImportedMesh> {
    let reader =
        primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
    let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
    let mut normals = reader.read_normals().into_iter().flatten();
    let mut uvs = reader
        .read_tex_coords(0)
        .map(|coords| coords.into_f32())
        .into_iter()
        .flatten();
    let vertices = positions
        .iter()
        .map(|&p| {
            let normal = normals.next().map(Vec3::from).unwrap_or(Vec3::ZERO);
            let uv = uvs.next().map(Vec2::from).unwrap_or(Vec2::ZERO);
            Vertex::new(Vec3::from(p), normal, uv)
        })
        .collect::<Vec<_>>();
    let indices = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..vertices.len() as u32).collect(),
    };
    Some(ImportedMesh {
        name,
        vertices,
        indices,
        textures: material_textures(&primitive.material()),
    })
}

/// Only the base color map has a counterpart in the viewer's material model.
fn material_textures(material: &gltf::Material) -> Vec<TextureSource> {
    let Some(info) = material.pbr_metallic_roughness().base_color_texture() else {
        return Vec::new();
    };
    match info.texture().source().source() {
        gltf::image::Source::Uri { uri, .. } if !uri.starts_with("data:") => vec![TextureSource {
            path: uri.to_owned(),
            role: TextureRole::Diffuse,
        }],
        _ => {
            warn!("embedded base color texture ignored");
            Vec::new()
        }
    }
}
