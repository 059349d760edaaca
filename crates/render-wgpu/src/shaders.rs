//! Built-in WGSL programs.
//!
//! Every stage is a standalone module. Group 0 is laid out the same way in
//! all of them: the vertex stage's uniform struct at binding 0, the fragment
//! stage's at binding 1, then each texture at an even binding from 2 with
//! its sampler right after. Fragment stages write `outColor` at location 0.

use modelview_render::{ProgramSources, ShaderSet, ShaderStage};

/// Shared by the grid, model and light programs.
pub const SCENE_VERTEX: &str = r#"
struct Transforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> transforms: Transforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) texcoord: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) texcoord: vec2<f32>,
    @location(3) view_distance: f32,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    let world = transforms.model * vec4<f32>(vertex.position, 1.0);
    let eye = transforms.view * world;

    var out: VertexOutput;
    out.clip_position = transforms.projection * eye;
    out.world_position = world.xyz;
    out.normal = (transforms.model * vec4<f32>(vertex.normal, 0.0)).xyz;
    out.texcoord = vertex.texcoord;
    out.view_distance = length(eye.xyz);
    return out;
}
"#;

/// Anti-aliased grid lines that fade out with distance from the eye.
pub const GRID_FRAGMENT: &str = r#"
struct GridParams {
    gridColor: vec3<f32>,
    cellSize: f32,
    bgColor: vec3<f32>,
    lineWidth: f32,
    fadeDistance: f32,
};

@group(0) @binding(1)
var<uniform> grid: GridParams;

struct FragmentInput {
    @location(0) world_position: vec3<f32>,
    @location(3) view_distance: f32,
};

struct FragmentOutput {
    @location(0) outColor: vec4<f32>,
};

@fragment
fn fs_main(in: FragmentInput) -> FragmentOutput {
    let coord = in.world_position.xz / max(grid.cellSize, 1e-4);
    let width = fwidth(coord) + vec2<f32>(grid.lineWidth);
    let dist = abs(fract(coord - 0.5) - 0.5) / width;
    let line = 1.0 - min(min(dist.x, dist.y), 1.0);
    let fade = 1.0 - clamp(in.view_distance / max(grid.fadeDistance, 1e-4), 0.0, 1.0);

    var out: FragmentOutput;
    out.outColor = vec4<f32>(mix(grid.bgColor, grid.gridColor, vec3<f32>(line)), fade);
    return out;
}
"#;

/// Diffuse-textured Lambert shading with an ambient term.
pub const MODEL_FRAGMENT: &str = r#"
struct Lighting {
    lightPos: vec3<f32>,
    ambientLight: vec4<f32>,
};

@group(0) @binding(1)
var<uniform> lighting: Lighting;
@group(0) @binding(2)
var texture_diffuse1: texture_2d<f32>;
@group(0) @binding(3)
var texture_diffuse1_sampler: sampler;
@group(0) @binding(4)
var texture_specular1: texture_2d<f32>;
@group(0) @binding(5)
var texture_specular1_sampler: sampler;

struct FragmentInput {
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) texcoord: vec2<f32>,
};

struct FragmentOutput {
    @location(0) outColor: vec4<f32>,
};

@fragment
fn fs_main(in: FragmentInput) -> FragmentOutput {
    let albedo = textureSample(texture_diffuse1, texture_diffuse1_sampler, in.texcoord);
    let specular = textureSample(texture_specular1, texture_specular1_sampler, in.texcoord).rgb;

    let n = normalize(in.normal);
    let l = normalize(lighting.lightPos - in.world_position);
    let diffuse = max(dot(n, l), 0.0);
    let highlight = specular * pow(diffuse, 32.0);

    var out: FragmentOutput;
    out.outColor = vec4<f32>(
        albedo.rgb * (lighting.ambientLight.rgb + vec3<f32>(diffuse)) + highlight,
        albedo.a,
    );
    return out;
}
"#;

/// Flat color for the light marker.
pub const LIGHT_FRAGMENT: &str = r#"
struct Marker {
    color: vec3<f32>,
};

@group(0) @binding(1)
var<uniform> marker: Marker;

struct FragmentOutput {
    @location(0) outColor: vec4<f32>,
};

@fragment
fn fs_main() -> FragmentOutput {
    var out: FragmentOutput;
    out.outColor = vec4<f32>(marker.color, 1.0);
    return out;
}
"#;

/// Full-screen quad. Flips v so the top of the offscreen image lands at
/// the top of the window.
pub const SCREEN_VERTEX: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) texcoord: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) texcoord: vec2<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(vertex.position, 0.0, 1.0);
    out.texcoord = vec2<f32>(vertex.texcoord.x, 1.0 - vertex.texcoord.y);
    return out;
}
"#;

/// Post-process effects selected by `selector`: 0 passthrough, 1 invert,
/// 2 greyscale, 3 9×9 box blur, 4 Sobel edges. Texels are fetched with
/// coordinates clamped to the image.
pub const SCREEN_FRAGMENT: &str = r#"
struct ScreenParams {
    selector: i32,
};

@group(0) @binding(1)
var<uniform> params: ScreenParams;
@group(0) @binding(2)
var screenTexture: texture_2d<f32>;

struct FragmentInput {
    @location(0) texcoord: vec2<f32>,
};

struct FragmentOutput {
    @location(0) outColor: vec4<f32>,
};

const LUMA = vec3<f32>(0.2126, 0.7152, 0.0722);
const BLUR_RADIUS: i32 = 4;

fn texel(base: vec2<i32>, offset: vec2<i32>) -> vec4<f32> {
    let size = vec2<i32>(textureDimensions(screenTexture));
    let p = clamp(base + offset, vec2<i32>(0), size - vec2<i32>(1));
    return textureLoad(screenTexture, p, 0);
}

fn luma(c: vec4<f32>) -> f32 {
    return dot(c.rgb, LUMA);
}

@fragment
fn fs_main(in: FragmentInput) -> FragmentOutput {
    let size = vec2<f32>(textureDimensions(screenTexture));
    let uv = clamp(in.texcoord, vec2<f32>(0.0), vec2<f32>(1.0));
    let base = vec2<i32>(min(uv * size, size - vec2<f32>(1.0)));
    let center = texel(base, vec2<i32>(0));

    var out: FragmentOutput;
    switch params.selector {
        case 1: {
            out.outColor = vec4<f32>(vec3<f32>(1.0) - center.rgb, 1.0);
        }
        case 2: {
            out.outColor = vec4<f32>(vec3<f32>(luma(center)), 1.0);
        }
        case 3: {
            var sum = vec3<f32>(0.0);
            for (var dy = -BLUR_RADIUS; dy <= BLUR_RADIUS; dy++) {
                for (var dx = -BLUR_RADIUS; dx <= BLUR_RADIUS; dx++) {
                    sum += texel(base, vec2<i32>(dx, dy)).rgb;
                }
            }
            let taps = f32((2 * BLUR_RADIUS + 1) * (2 * BLUR_RADIUS + 1));
            out.outColor = vec4<f32>(sum / taps, 1.0);
        }
        case 4: {
            var gx: f32 = 0.0;
            var gy: f32 = 0.0;
            for (var dy: i32 = -1; dy <= 1; dy++) {
                for (var dx: i32 = -1; dx <= 1; dx++) {
                    let l = luma(texel(base, vec2<i32>(dx, dy)));
                    gx += f32(dx) * select(1.0, 2.0, dy == 0) * l;
                    gy += f32(dy) * select(1.0, 2.0, dx == 0) * l;
                }
            }
            out.outColor = vec4<f32>(vec3<f32>(min(sqrt(gx * gx + gy * gy), 1.0)), 1.0);
        }
        default: {
            out.outColor = center;
        }
    }
    return out;
}
"#;

/// The four programs the viewer runs, compiled from the sources above.
pub fn builtin_shader_set() -> ShaderSet {
    ShaderSet {
        grid: ProgramSources::inline(SCENE_VERTEX, GRID_FRAGMENT),
        model: ProgramSources::inline(SCENE_VERTEX, MODEL_FRAGMENT),
        light: ProgramSources::inline(SCENE_VERTEX, LIGHT_FRAGMENT),
        screen: ProgramSources::inline(SCREEN_VERTEX, SCREEN_FRAGMENT),
    }
}

/// Every built-in stage with a display name, for validation tooling.
pub fn builtin_stages() -> [(&'static str, ShaderStage, &'static str); 8] {
    use ShaderStage::{Fragment, Vertex};
    [
        ("grid.vert", Vertex, SCENE_VERTEX),
        ("grid.frag", Fragment, GRID_FRAGMENT),
        ("model.vert", Vertex, SCENE_VERTEX),
        ("model.frag", Fragment, MODEL_FRAGMENT),
        ("light.vert", Vertex, SCENE_VERTEX),
        ("light.frag", Fragment, LIGHT_FRAGMENT),
        ("screen.vert", Vertex, SCREEN_VERTEX),
        ("screen.frag", Fragment, SCREEN_FRAGMENT),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{UniformKind, reflect_wgsl};

    #[test]
    fn every_builtin_stage_validates() {
        for (name, stage, source) in builtin_stages() {
            if let Err(e) = reflect_wgsl(stage, source) {
                panic!("{name}: {e}");
            }
        }
    }

    #[test]
    fn fragment_stages_write_out_color() {
        for (name, stage, source) in builtin_stages() {
            if stage != ShaderStage::Fragment {
                continue;
            }
            let r = reflect_wgsl(stage, source).unwrap();
            assert!(
                r.outputs
                    .iter()
                    .any(|o| o.name.as_deref() == Some("outColor") && o.location == 0),
                "{name} has no outColor"
            );
        }
    }

    #[test]
    fn uniform_names_match_what_the_pipeline_sets() {
        let vs = reflect_wgsl(ShaderStage::Vertex, SCENE_VERTEX).unwrap();
        let block = vs.uniforms.as_ref().unwrap();
        for name in ["model", "view", "projection"] {
            assert_eq!(block.field(name).unwrap().kind, UniformKind::Mat4);
        }
        for name in ["position", "normal", "texcoord"] {
            assert!(vs.input(name).is_some(), "missing input {name}");
        }

        let grid = reflect_wgsl(ShaderStage::Fragment, GRID_FRAGMENT).unwrap();
        let block = grid.uniforms.unwrap();
        for name in ["cellSize", "lineWidth", "fadeDistance"] {
            assert_eq!(block.field(name).unwrap().kind, UniformKind::Float);
        }
        assert_eq!(block.field("bgColor").unwrap().kind, UniformKind::Vec3);

        let model = reflect_wgsl(ShaderStage::Fragment, MODEL_FRAGMENT).unwrap();
        let names: Vec<_> = model.textures.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["texture_diffuse1", "texture_specular1"]);
        assert_eq!(
            model.uniforms.unwrap().field("ambientLight").unwrap().kind,
            UniformKind::Vec4
        );

        let screen = reflect_wgsl(ShaderStage::Fragment, SCREEN_FRAGMENT).unwrap();
        assert_eq!(
            screen.uniforms.unwrap().field("selector").unwrap().kind,
            UniformKind::Int
        );
        assert_eq!(screen.textures[0].name, "screenTexture");
    }

    #[test]
    fn stage_bindings_do_not_collide() {
        for (vs, fs) in [
            (SCENE_VERTEX, GRID_FRAGMENT),
            (SCENE_VERTEX, MODEL_FRAGMENT),
            (SCREEN_VERTEX, SCREEN_FRAGMENT),
        ] {
            let v = reflect_wgsl(ShaderStage::Vertex, vs).unwrap();
            let f = reflect_wgsl(ShaderStage::Fragment, fs).unwrap();
            assert!(v.bindings().all(|b| f.bindings().all(|c| c != b)));
        }
    }
}
