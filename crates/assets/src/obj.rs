use crate::AssetError;
use glam::{Vec2, Vec3};
use modelview_common::{ImportedMesh, TextureRole, TextureSource, Vertex};
use std::path::Path;
use tracing::{debug, warn};

pub(crate) fn load(path: &Path) -> Result<Vec<ImportedMesh>, AssetError> {
    let options = tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ..Default::default()
    };
    let (models, materials) = tobj::load_obj(path, &options).map_err(|source| match source {
        tobj::LoadError::OpenFileFailed => AssetError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "cannot open file"),
        },
        source => AssetError::Obj {
            path: path.to_path_buf(),
            source,
        },
    })?;
    // A broken or missing MTL only costs the textures.
    let materials = materials.unwrap_or_else(|err| {
        warn!(path = %path.display(), error = %err, "material library not loaded");
        Vec::new()
    });

    Ok(models
        .into_iter()
        .map(|model| {
            let textures = model
                .mesh
                .material_id
                .and_then(|id| materials.get(id))
                .map(material_textures)
                .unwrap_or_default();
            let mesh = convert_mesh(model.name, &model.mesh, textures);
            debug!(
                mesh = %mesh.name,
                vertices = mesh.vertices.len(),
                textures = mesh.textures.len(),
                "obj mesh converted"
            );
            mesh
        })
        .collect())
}

fn material_textures(material: &tobj::Material) -> Vec<TextureSource> {
    [
        (&material.diffuse_texture, TextureRole::Diffuse),
        (&material.specular_texture, TextureRole::Specular),
    ]
    .into_iter()
    .filter_map(|(path, role)| {
        path.as_ref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| TextureSource {
                path: p.clone(),
                role,
            })
    })
    .collect()
}

fn convert_mesh(name: String, mesh: &tobj::Mesh, textures: Vec<TextureSource>) -> ImportedMesh {
    let count = mesh.positions.len() / 3;
    let vertices = (0..count)
        .map(|i| {
            let position = Vec3::from_slice(&mesh.positions[i * 3..i * 3 + 3]);
            let normal = mesh
                .normals
                .get(i * 3..i * 3 + 3)
                .map(Vec3::from_slice)
                .unwrap_or(Vec3::ZERO);
            let uv = mesh
                .texcoords
                .get(i * 2..i * 2 + 2)
                .map(|t| Vec2::new(t[0], 1.0 - t[1]))
                .unwrap_or(Vec2::ZERO);
            Vertex::new(position, normal, uv)
        })
        .collect();
    ImportedMesh {
        name,
        vertices,
        indices: mesh.indices.clone(),
        textures,
    }
}
