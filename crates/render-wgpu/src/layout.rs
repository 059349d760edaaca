//! Translation of recorded attribute state and uniform values into what a
//! wgpu pipeline and uniform buffer expect.

use crate::reflect::{UniformKind, VertexInput};
use modelview_render::{AttributeLayout, BufferId, ScalarType, UniformValue};
use std::collections::{BTreeMap, BTreeSet};

/// One vertex buffer slot of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct VertexLayout {
    pub stride: u64,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum LayoutError {
    #[error("shader input `{name}` at location {location} has no enabled attribute")]
    Missing { name: String, location: u32 },
    #[error("attribute at location {location} does not match shader input `{name}`")]
    Mismatch { name: String, location: u32 },
    #[error("attribute at location {0} has no vertex format")]
    Unsupported(u32),
}

pub(crate) fn vertex_format(layout: &AttributeLayout) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat::*;
    let format = match (layout.scalar, layout.normalized, layout.components) {
        (ScalarType::Float, _, 1) => Float32,
        (ScalarType::Float, _, 2) => Float32x2,
        (ScalarType::Float, _, 3) => Float32x3,
        (ScalarType::Float, _, 4) => Float32x4,
        (ScalarType::Int, false, 1) => Sint32,
        (ScalarType::Int, false, 2) => Sint32x2,
        (ScalarType::Int, false, 3) => Sint32x3,
        (ScalarType::Int, false, 4) => Sint32x4,
        (ScalarType::UnsignedInt, false, 1) => Uint32,
        (ScalarType::UnsignedInt, false, 2) => Uint32x2,
        (ScalarType::UnsignedInt, false, 3) => Uint32x3,
        (ScalarType::UnsignedInt, false, 4) => Uint32x4,
        _ => return None,
    };
    Some(format)
}

/// Builds the vertex buffer layouts a draw needs: one slot per distinct
/// (buffer, stride) pair, holding only the attributes the shader consumes.
///
/// Every shader input must be backed by an enabled attribute of the same
/// component type and count.
pub(crate) fn resolve_vertex_layouts(
    inputs: &[VertexInput],
    attributes: &BTreeMap<u32, (BufferId, AttributeLayout)>,
    enabled: &BTreeSet<u32>,
) -> Result<Vec<(BufferId, VertexLayout)>, LayoutError> {
    let mut slots: Vec<(BufferId, VertexLayout)> = Vec::new();
    let mut inputs: Vec<&VertexInput> = inputs.iter().collect();
    inputs.sort_by_key(|i| i.location);

    for input in inputs {
        let (buffer, layout) = attributes
            .get(&input.location)
            .filter(|_| enabled.contains(&input.location))
            .ok_or_else(|| LayoutError::Missing {
                name: input.name.clone(),
                location: input.location,
            })?;
        if layout.scalar != input.scalar || layout.components != input.components {
            return Err(LayoutError::Mismatch {
                name: input.name.clone(),
                location: input.location,
            });
        }
        let format = vertex_format(layout).ok_or(LayoutError::Unsupported(input.location))?;
        // A zero stride means tightly packed.
        let stride = match layout.stride {
            0 => layout.size_bytes() as u64,
            s => s as u64,
        };
        let attribute = wgpu::VertexAttribute {
            format,
            offset: layout.offset as u64,
            shader_location: input.location,
        };
        match slots
            .iter_mut()
            .find(|(b, l)| *b == *buffer && l.stride == stride)
        {
            Some((_, slot)) => slot.attributes.push(attribute),
            None => slots.push((
                *buffer,
                VertexLayout {
                    stride,
                    attributes: vec![attribute],
                },
            )),
        }
    }
    Ok(slots)
}

/// Writes `value` into a uniform block at `offset`. Returns false when the
/// value's type does not match the field or the field lies outside the block.
pub(crate) fn write_uniform(
    block: &mut [u8],
    offset: u32,
    kind: UniformKind,
    value: UniformValue,
) -> bool {
    let mut words = [0u32; 16];
    let len = match (kind, value) {
        (UniformKind::Int, UniformValue::Int(v)) => {
            words[0] = v as u32;
            1
        }
        (UniformKind::Float, UniformValue::Float(v)) => put_floats(&mut words, &[v]),
        (UniformKind::Vec3, UniformValue::Vec3(v)) => put_floats(&mut words, &v.to_array()),
        (UniformKind::Vec4, UniformValue::Vec4(v)) => put_floats(&mut words, &v.to_array()),
        (UniformKind::Mat4, UniformValue::Mat4(m)) => put_floats(&mut words, &m.to_cols_array()),
        _ => return false,
    };
    let bytes: &[u8] = bytemuck::cast_slice(&words[..len]);
    let start = offset as usize;
    match block.get_mut(start..start + bytes.len()) {
        Some(dst) => {
            dst.copy_from_slice(bytes);
            true
        }
        None => false,
    }
}

fn put_floats(words: &mut [u32; 16], values: &[f32]) -> usize {
    for (word, value) in words.iter_mut().zip(values) {
        *word = value.to_bits();
    }
    values.len()
}
