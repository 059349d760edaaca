use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use modelview_assets::{DiskImageLoader, import_model, save_image};
use modelview_common::{ImageLoader, PostEffect};
use modelview_render::{ColorBuffer, ShaderSet, ShaderStage, effects, texture_file_name};
use modelview_render_wgpu::{StageReflection, builtin_stages, reflect_wgsl};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "modelview-cli", about = "CLI tool for model viewer assets and shaders")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions and the post-process effects
    Info,
    /// Import a model and print per-mesh statistics
    Inspect {
        /// Model file (.obj, .gltf, .glb)
        model: PathBuf,
    },
    /// Parse, validate and reflect the WGSL shaders
    CheckShaders {
        /// Directory with <name>.vert.wgsl / <name>.frag.wgsl; built-ins when omitted
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Apply a post-process effect to an image file
    Effect {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// 0 passthrough, 1 invert, 2 greyscale, 3 blur, 4 edge detect
        #[arg(short, long, value_parser = clap::value_parser!(i32).range(0..=4))]
        effect: i32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("modelview-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", modelview_common::crate_info());
            println!("render: {}", modelview_render::crate_info());
            println!("assets: {}", modelview_assets::crate_info());
            println!("effects:");
            for effect in PostEffect::ALL {
                println!("  {} {}", effect.selector(), effect.name());
            }
        }
        Commands::Inspect { model } => inspect(&model)?,
        Commands::CheckShaders { dir } => check_shaders(dir.as_deref())?,
        Commands::Effect {
            input,
            output,
            effect,
        } => {
            let effect = PostEffect::from_selector(effect).context("unknown effect")?;
            let image = DiskImageLoader.load(&input)?;
            let result = effects::apply(effect, &ColorBuffer::from_image(&image));
            save_image(&output, &result.to_image())?;
            println!(
                "{} -> {} ({}, {}x{})",
                input.display(),
                output.display(),
                effect.name(),
                image.width,
                image.height
            );
        }
    }

    Ok(())
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let scene = import_model(path)?;
    println!("{}", scene.source.display());
    println!(
        "  meshes={} vertices={} indices={}",
        scene.meshes.len(),
        scene.vertex_count(),
        scene.index_count()
    );
    for mesh in &scene.meshes {
        println!(
            "  - {}: vertices={} triangles={}",
            mesh.name,
            mesh.vertices.len(),
            mesh.indices.len() / 3
        );
        for texture in &mesh.textures {
            let file = texture_file_name(&texture.path);
            let status = if scene.directory.join(&file).is_file() {
                "found"
            } else {
                "missing"
            };
            println!("      {} {} ({status})", texture.role, file);
        }
    }
    Ok(())
}

fn check_shaders(dir: Option<&Path>) -> anyhow::Result<()> {
    let stages: Vec<(String, ShaderStage, String)> = match dir {
        Some(dir) => {
            let mut stages = Vec::new();
            for name in ShaderSet::NAMES {
                for (suffix, stage) in [("vert", ShaderStage::Vertex), ("frag", ShaderStage::Fragment)] {
                    let path = dir.join(format!("{name}.{suffix}.wgsl"));
                    let source = std::fs::read_to_string(&path)
                        .with_context(|| format!("read {}", path.display()))?;
                    stages.push((format!("{name}.{suffix}"), stage, source));
                }
            }
            stages
        }
        None => builtin_stages()
            .into_iter()
            .map(|(name, stage, source)| (name.to_owned(), stage, source.to_owned()))
            .collect(),
    };

    let mut failed = 0;
    for (name, stage, source) in &stages {
        match reflect_wgsl(*stage, source) {
            Ok(reflection) => {
                println!("{name}: ok");
                print_reflection(&reflection);
                if *stage == ShaderStage::Fragment
                    && !reflection
                        .outputs
                        .iter()
                        .any(|o| o.location == 0 && o.name.as_deref() == Some("outColor"))
                {
                    println!("  error: no `outColor` output at location 0");
                    failed += 1;
                }
            }
            Err(err) => {
                println!("{name}: FAILED\n{err}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} shader stages failed", stages.len());
    }
    Ok(())
}

fn print_reflection(reflection: &StageReflection) {
    for input in &reflection.inputs {
        println!(
            "  in  @location({}) {}: {:?}x{}",
            input.location, input.name, input.scalar, input.components
        );
    }
    if let Some(block) = &reflection.uniforms {
        println!("  uniforms @binding({}) size={}", block.binding, block.size);
        for field in &block.fields {
            println!("    +{:<3} {} {:?}", field.offset, field.name, field.kind);
        }
    }
    for texture in &reflection.textures {
        println!("  texture @binding({}) {}", texture.binding, texture.name);
    }
    for output in &reflection.outputs {
        println!(
            "  out @location({}) {}",
            output.location,
            output.name.as_deref().unwrap_or("<unnamed>")
        );
    }
}
