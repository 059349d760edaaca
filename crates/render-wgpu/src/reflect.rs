//! Interface reflection for single-stage WGSL modules.
//!
//! Each shader stage is its own WGSL module with exactly one entry point for
//! that stage. Reflection pulls out what the device needs to emulate named
//! attributes and uniforms: vertex inputs by name, fragment outputs by name,
//! the fields of the stage's uniform block, and its texture and sampler
//! bindings. Only bind group 0 is supported.

use modelview_render::{ScalarType, ShaderStage};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Module, ScalarKind, TypeInner, VectorSize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReflectError {
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Validation(String),
    #[error("no @{0} entry point")]
    MissingEntryPoint(ShaderStage),
    #[error("`{name}` uses bind group {group}; only group 0 is supported")]
    BindGroup { name: String, group: u32 },
    #[error("uniform `{0}` must be a struct")]
    UniformNotStruct(String),
    #[error("more than one uniform block in the {0} stage")]
    MultipleUniformBlocks(ShaderStage),
}

/// Value type of a uniform block field that can be written by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Int,
    Float,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformKind {
    pub fn size_bytes(self) -> u32 {
        match self {
            UniformKind::Int | UniformKind::Float => 4,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat4 => 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformField {
    pub name: String,
    pub offset: u32,
    pub kind: UniformKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock {
    pub binding: u32,
    /// Size of the whole struct, padding included.
    pub size: u32,
    pub fields: Vec<UniformField>,
}

impl UniformBlock {
    pub fn field(&self, name: &str) -> Option<&UniformField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInput {
    pub name: String,
    pub location: u32,
    pub scalar: ScalarType,
    pub components: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentTarget {
    /// `None` when the entry point returns a bare `@location` value.
    pub name: Option<String>,
    pub location: u32,
}

/// A `texture_2d<f32>` global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub name: String,
    pub binding: u32,
}

/// Everything the device reads from one compiled stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReflection {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub inputs: Vec<VertexInput>,
    pub outputs: Vec<FragmentTarget>,
    pub uniforms: Option<UniformBlock>,
    pub textures: Vec<TextureBinding>,
    pub samplers: Vec<u32>,
}

impl StageReflection {
    pub fn input(&self, name: &str) -> Option<&VertexInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Every binding number this stage occupies in group 0.
    pub fn bindings(&self) -> impl Iterator<Item = u32> + '_ {
        self.uniforms
            .iter()
            .map(|u| u.binding)
            .chain(self.textures.iter().map(|t| t.binding))
            .chain(self.samplers.iter().copied())
    }
}

/// Parses, validates and reflects one stage of WGSL.
///
/// Error messages are rendered against `source`, so they carry line numbers
/// and can be shown as the stage's compile log.
pub fn reflect_wgsl(stage: ShaderStage, source: &str) -> Result<StageReflection, ReflectError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| ReflectError::Parse(e.emit_to_string(source)))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| ReflectError::Validation(e.emit_to_string(source)))?;
    reflect_module(stage, &module)
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

fn reflect_module(stage: ShaderStage, module: &Module) -> Result<StageReflection, ReflectError> {
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == naga_stage(stage))
        .ok_or(ReflectError::MissingEntryPoint(stage))?;

    let mut reflection = StageReflection {
        stage,
        entry_point: entry.name.clone(),
        inputs: Vec::new(),
        outputs: Vec::new(),
        uniforms: None,
        textures: Vec::new(),
        samplers: Vec::new(),
    };

    if stage == ShaderStage::Vertex {
        for arg in &entry.function.arguments {
            match (&arg.binding, &module.types[arg.ty].inner) {
                (Some(Binding::Location { location, .. }), inner) => {
                    if let (Some(name), Some((scalar, components))) =
                        (&arg.name, numeric_shape(inner))
                    {
                        reflection.inputs.push(VertexInput {
                            name: name.clone(),
                            location: *location,
                            scalar,
                            components,
                        });
                    }
                }
                (None, TypeInner::Struct { members, .. }) => {
                    for member in members {
                        let Some(Binding::Location { location, .. }) = member.binding else {
                            continue;
                        };
                        let shape = numeric_shape(&module.types[member.ty].inner);
                        if let (Some(name), Some((scalar, components))) = (&member.name, shape) {
                            reflection.inputs.push(VertexInput {
                                name: name.clone(),
                                location,
                                scalar,
                                components,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
    }

    if stage == ShaderStage::Fragment {
        if let Some(result) = &entry.function.result {
            match (&result.binding, &module.types[result.ty].inner) {
                (Some(Binding::Location { location, .. }), _) => {
                    reflection.outputs.push(FragmentTarget {
                        name: None,
                        location: *location,
                    });
                }
                (None, TypeInner::Struct { members, .. }) => {
                    for member in members {
                        if let Some(Binding::Location { location, .. }) = member.binding {
                            reflection.outputs.push(FragmentTarget {
                                name: member.name.clone(),
                                location,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
    }

    for (_, global) in module.global_variables.iter() {
        let Some(binding) = &global.binding else {
            continue;
        };
        let name = global.name.clone().unwrap_or_default();
        if binding.group != 0 {
            return Err(ReflectError::BindGroup {
                name,
                group: binding.group,
            });
        }
        let inner = &module.types[global.ty].inner;
        match (global.space, inner) {
            (AddressSpace::Uniform, TypeInner::Struct { members, .. }) => {
                if reflection.uniforms.is_some() {
                    return Err(ReflectError::MultipleUniformBlocks(stage));
                }
                let fields = members
                    .iter()
                    .filter_map(|m| {
                        let kind = uniform_kind(&module.types[m.ty].inner)?;
                        Some(UniformField {
                            name: m.name.clone()?,
                            offset: m.offset,
                            kind,
                        })
                    })
                    .collect();
                reflection.uniforms = Some(UniformBlock {
                    binding: binding.binding,
                    size: inner.size(module.to_ctx()),
                    fields,
                });
            }
            (AddressSpace::Uniform, _) => return Err(ReflectError::UniformNotStruct(name)),
            (AddressSpace::Handle, TypeInner::Image { .. }) => {
                reflection.textures.push(TextureBinding {
                    name,
                    binding: binding.binding,
                });
            }
            (AddressSpace::Handle, TypeInner::Sampler { .. }) => {
                reflection.samplers.push(binding.binding);
            }
            _ => {}
        }
    }

    Ok(reflection)
}

fn numeric_shape(inner: &TypeInner) -> Option<(ScalarType, u8)> {
    let (scalar, components) = match inner {
        TypeInner::Scalar(scalar) => (scalar, 1),
        TypeInner::Vector { size, scalar } => (scalar, vector_len(*size)),
        _ => return None,
    };
    let scalar = match scalar.kind {
        ScalarKind::Float => ScalarType::Float,
        ScalarKind::Sint => ScalarType::Int,
        ScalarKind::Uint => ScalarType::UnsignedInt,
        _ => return None,
    };
    Some((scalar, components))
}

fn uniform_kind(inner: &TypeInner) -> Option<UniformKind> {
    match inner {
        TypeInner::Scalar(s) if s.kind == ScalarKind::Float => Some(UniformKind::Float),
        TypeInner::Scalar(s) if matches!(s.kind, ScalarKind::Sint | ScalarKind::Uint) => {
            Some(UniformKind::Int)
        }
        TypeInner::Vector {
            size: VectorSize::Tri,
            scalar,
        } if scalar.kind == ScalarKind::Float => Some(UniformKind::Vec3),
        TypeInner::Vector {
            size: VectorSize::Quad,
            scalar,
        } if scalar.kind == ScalarKind::Float => Some(UniformKind::Vec4),
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            ..
        } => Some(UniformKind::Mat4),
        _ => None,
    }
}

fn vector_len(size: VectorSize) -> u8 {
    match size {
        VectorSize::Bi => 2,
        VectorSize::Tri => 3,
        VectorSize::Quad => 4,
    }
}
