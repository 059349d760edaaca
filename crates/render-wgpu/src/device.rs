use crate::layout::{self, VertexLayout};
use crate::reflect::{self, StageReflection, TextureBinding, UniformKind};
use modelview_render::{
    AttributeLayout, BufferId, BufferKind, FragmentOutput, FramebufferId, GpuDevice, GpuError,
    ProgramId, RenderbufferId, ShaderId, ShaderStage, TextureId, UniformLocation, UniformValue,
    VertexArrayId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::num::NonZeroU64;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};
use wgpu::util::DeviceExt;

/// Format of every texture the device creates, render targets included.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Format of renderbuffers and the window's depth attachment.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("cannot create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter")]
    NoAdapter,
    #[error("cannot open GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    UnsupportedSurface,
}

struct CompiledStage {
    reflection: StageReflection,
    module: wgpu::ShaderModule,
}

#[derive(Debug, Clone, Copy)]
enum UniformSlot {
    Field {
        stage: ShaderStage,
        offset: u32,
        kind: UniformKind,
    },
    /// Index into the program's texture list; the value is a texture unit.
    Texture(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    color_format: wgpu::TextureFormat,
    depth_test: bool,
    blend: bool,
    vertex_layouts: Vec<VertexLayout>,
}

struct Program {
    vertex: Arc<CompiledStage>,
    fragment: Arc<CompiledStage>,
    uniforms: Vec<(String, UniformSlot)>,
    vertex_block: Vec<u8>,
    fragment_block: Vec<u8>,
    textures: Vec<TextureBinding>,
    texture_units: Vec<u32>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, Arc<wgpu::RenderPipeline>>,
}

impl Program {
    fn new(device: &wgpu::Device, vertex: Arc<CompiledStage>, fragment: Arc<CompiledStage>) -> Self {
        let mut uniforms = Vec::new();
        let mut textures = Vec::new();
        let mut entries = Vec::new();
        for stage in [&vertex.reflection, &fragment.reflection] {
            let visibility = match stage.stage {
                ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
                ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
            };
            if let Some(block) = &stage.uniforms {
                uniforms.extend(block.fields.iter().map(|f| {
                    let slot = UniformSlot::Field {
                        stage: stage.stage,
                        offset: f.offset,
                        kind: f.kind,
                    };
                    (f.name.clone(), slot)
                }));
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: block.binding,
                    visibility,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(block.size as u64),
                    },
                    count: None,
                });
            }
            for texture in &stage.textures {
                uniforms.push((texture.name.clone(), UniformSlot::Texture(textures.len())));
                textures.push(texture.clone());
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: texture.binding,
                    visibility,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                });
            }
            for &binding in &stage.samplers {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                });
            }
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("program_bind_group_layout"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let block = |stage: &StageReflection| {
            vec![0u8; stage.uniforms.as_ref().map_or(0, |b| b.size as usize)]
        };
        Self {
            vertex_block: block(&vertex.reflection),
            fragment_block: block(&fragment.reflection),
            texture_units: vec![0; textures.len()],
            vertex,
            fragment,
            uniforms,
            textures,
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
        }
    }

    fn pipeline(&mut self, device: &wgpu::Device, key: PipelineKey) -> Arc<wgpu::RenderPipeline> {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return pipeline.clone();
        }
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
            .vertex_layouts
            .iter()
            .map(|l| wgpu::VertexBufferLayout {
                array_stride: l.stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &l.attributes,
            })
            .collect();
        let blend = if key.blend {
            wgpu::BlendState::ALPHA_BLENDING
        } else {
            wgpu::BlendState::REPLACE
        };
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("program_pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.vertex.module,
                entry_point: Some(&self.vertex.reflection.entry_point),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.fragment.module,
                entry_point: Some(&self.fragment.reflection.entry_point),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.color_format,
                    blend: Some(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: key.depth_test,
                depth_compare: if key.depth_test {
                    wgpu::CompareFunction::Less
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });
        debug!(layouts = key.vertex_layouts.len(), blend = key.blend, "pipeline created");
        let pipeline = Arc::new(pipeline);
        self.pipelines.insert(key, pipeline.clone());
        pipeline
    }
}

struct GpuBuffer {
    buffer: Arc<wgpu::Buffer>,
}

#[derive(Default)]
struct VertexArray {
    attributes: BTreeMap<u32, (BufferId, AttributeLayout)>,
    enabled: BTreeSet<u32>,
    element_buffer: Option<BufferId>,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    view: Arc<wgpu::TextureView>,
    /// Requested size; a zero-sized texture is backed by a 1×1 allocation.
    width: u32,
    height: u32,
}

struct Framebuffer {
    color: Arc<wgpu::TextureView>,
    depth: Arc<wgpu::TextureView>,
}

#[derive(Debug, Clone, Copy)]
enum DrawRange {
    Arrays { first: u32, count: u32 },
    Elements { count: u32 },
}

/// A draw with everything it read from device state copied out, so later
/// state changes in the same frame do not affect it.
struct RecordedDraw {
    program: u32,
    vertex_layouts: Vec<VertexLayout>,
    vertex_buffers: Vec<Arc<wgpu::Buffer>>,
    index_buffer: Option<Arc<wgpu::Buffer>>,
    range: DrawRange,
    depth_test: bool,
    blend: bool,
    vertex_block: Vec<u8>,
    fragment_block: Vec<u8>,
    textures: Vec<Arc<wgpu::TextureView>>,
}

struct PreparedDraw {
    pipeline: Arc<wgpu::RenderPipeline>,
    bind_group: wgpu::BindGroup,
    vertex_buffers: Vec<Arc<wgpu::Buffer>>,
    index_buffer: Option<Arc<wgpu::Buffer>>,
    range: DrawRange,
}

enum PassTarget {
    Surface,
    Offscreen {
        color: Arc<wgpu::TextureView>,
        depth: Arc<wgpu::TextureView>,
    },
}

struct Pass {
    framebuffer: Option<FramebufferId>,
    target: PassTarget,
    clear: Option<[f32; 4]>,
    draws: Vec<RecordedDraw>,
}

#[derive(Debug, Default)]
struct Bindings {
    program: Option<ProgramId>,
    vertex_array: Option<VertexArrayId>,
    vertex_buffer: Option<BufferId>,
    active_unit: u32,
    units: BTreeMap<u32, TextureId>,
    framebuffer: Option<FramebufferId>,
    depth_test: bool,
    blend: bool,
}

/// [`GpuDevice`] on wgpu, presenting to a window surface.
///
/// Binding calls only update recorded state. Each draw snapshots the state
/// it depends on; [`GpuDevice::present`] turns the recorded passes into
/// render passes, submits them and presents the surface.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    surface_depth: Arc<wgpu::TextureView>,
    sampler: wgpu::Sampler,
    /// Sampled by texture slots whose unit has nothing bound.
    white: GpuTexture,

    next_id: u32,
    shaders: HashMap<u32, Arc<CompiledStage>>,
    programs: HashMap<u32, Program>,
    buffers: HashMap<u32, GpuBuffer>,
    vertex_arrays: HashMap<u32, VertexArray>,
    textures: HashMap<u32, GpuTexture>,
    renderbuffers: HashMap<u32, GpuTexture>,
    framebuffers: HashMap<u32, Framebuffer>,

    bound: Bindings,
    passes: Vec<Pass>,
}

impl WgpuDevice {
    /// Opens a device that can present to `target`.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(target)?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(DeviceError::NoAdapter)?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("modelview_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;
        device.on_uncaptured_error(Box::new(|err: wgpu::Error| error!("wgpu: {err}")));

        // Colors are written as computed, so prefer a linear surface.
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or(caps.formats.first())
            .copied()
            .ok_or(DeviceError::UnsupportedSurface)?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let surface_depth = Arc::new(depth_view(&device, config.width, config.height));
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("texture_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let (texture, view) = color_texture(&device, &queue, 1, 1, Some(&[255; 4]));
        let white = GpuTexture {
            _texture: texture,
            view: Arc::new(view),
            width: 1,
            height: 1,
        };

        info!(
            backend = adapter.get_info().backend.to_str(),
            format = ?format,
            "GPU initialized"
        );

        Ok(Self {
            device,
            queue,
            surface,
            config,
            surface_depth,
            sampler,
            white,
            next_id: 1,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            renderbuffers: HashMap::new(),
            framebuffers: HashMap::new(),
            bound: Bindings::default(),
            passes: Vec::new(),
        })
    }

    /// Reconfigures the surface and its depth attachment. Offscreen targets
    /// keep their size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.surface_depth = Arc::new(depth_view(&self.device, self.config.width, self.config.height));
        debug!(width = self.config.width, height = self.config.height, "surface resized");
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn pass_target(&self, framebuffer: Option<FramebufferId>) -> PassTarget {
        match framebuffer.and_then(|f| self.framebuffers.get(&f.0)) {
            Some(fb) => PassTarget::Offscreen {
                color: fb.color.clone(),
                depth: fb.depth.clone(),
            },
            None => PassTarget::Surface,
        }
    }

    fn current_pass(&mut self) -> &mut Pass {
        let framebuffer = self.bound.framebuffer;
        let reuse = matches!(self.passes.last(), Some(p) if p.framebuffer == framebuffer);
        if !reuse {
            let target = self.pass_target(framebuffer);
            self.passes.push(Pass {
                framebuffer,
                target,
                clear: None,
                draws: Vec::new(),
            });
        }
        let last = self.passes.len() - 1;
        &mut self.passes[last]
    }

    fn record_draw(&mut self, range: DrawRange) {
        let count = match range {
            DrawRange::Arrays { count, .. } | DrawRange::Elements { count } => count,
        };
        if count == 0 {
            return;
        }
        let Some(program_id) = self.bound.program else {
            warn!("draw with no program bound, skipped");
            return;
        };
        let Some(program) = self.programs.get(&program_id.0) else {
            warn!(program = %program_id, "draw with a deleted program, skipped");
            return;
        };
        let Some(vao) = self
            .bound
            .vertex_array
            .and_then(|v| self.vertex_arrays.get(&v.0))
        else {
            warn!("draw with no vertex array bound, skipped");
            return;
        };

        let slots = match layout::resolve_vertex_layouts(
            &program.vertex.reflection.inputs,
            &vao.attributes,
            &vao.enabled,
        ) {
            Ok(slots) => slots,
            Err(e) => {
                warn!(program = %program_id, "draw skipped: {e}");
                return;
            }
        };
        let mut vertex_buffers = Vec::with_capacity(slots.len());
        let mut vertex_layouts = Vec::with_capacity(slots.len());
        for (buffer, layout) in slots {
            let Some(b) = self.buffers.get(&buffer.0) else {
                warn!(buffer = %buffer, "draw reads a deleted buffer, skipped");
                return;
            };
            vertex_buffers.push(b.buffer.clone());
            vertex_layouts.push(layout);
        }

        let index_buffer = match range {
            DrawRange::Elements { .. } => {
                match vao.element_buffer.and_then(|b| self.buffers.get(&b.0)) {
                    Some(b) => Some(b.buffer.clone()),
                    None => {
                        warn!("indexed draw with no element buffer, skipped");
                        return;
                    }
                }
            }
            DrawRange::Arrays { .. } => None,
        };

        let textures = program
            .texture_units
            .iter()
            .map(|unit| {
                self.bound
                    .units
                    .get(unit)
                    .and_then(|t| self.textures.get(&t.0))
                    .map_or_else(|| self.white.view.clone(), |t| t.view.clone())
            })
            .collect();

        let draw = RecordedDraw {
            program: program_id.0,
            vertex_layouts,
            vertex_buffers,
            index_buffer,
            range,
            depth_test: self.bound.depth_test,
            blend: self.bound.blend,
            vertex_block: program.vertex_block.clone(),
            fragment_block: program.fragment_block.clone(),
            textures,
        };
        self.current_pass().draws.push(draw);
    }
}

fn depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_stencil"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}

fn color_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    width: u32,
    height: u32,
    rgba: Option<&[u8]>,
) -> (wgpu::Texture, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("color_texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let expected = (width as usize) * (height as usize) * 4;
    match rgba {
        Some(data) if expected > 0 && data.len() == expected => queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        ),
        Some(data) => warn!(
            len = data.len(),
            width, height, "texture data does not match its size, left zeroed"
        ),
        None => {}
    }
    let view = texture.create_view(&Default::default());
    (texture, view)
}

fn prepare_draw(
    device: &wgpu::Device,
    sampler: &wgpu::Sampler,
    program: &mut Program,
    draw: RecordedDraw,
    color_format: wgpu::TextureFormat,
) -> PreparedDraw {
    let pipeline = program.pipeline(
        device,
        PipelineKey {
            color_format,
            depth_test: draw.depth_test,
            blend: draw.blend,
            vertex_layouts: draw.vertex_layouts,
        },
    );

    let uniform_buffer = |stage: &StageReflection, contents: &[u8]| {
        stage.uniforms.as_ref().map(|block| {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("uniform_buffer"),
                contents,
                usage: wgpu::BufferUsages::UNIFORM,
            });
            (block.binding, buffer)
        })
    };
    let uniforms: Vec<(u32, wgpu::Buffer)> = [
        uniform_buffer(&program.vertex.reflection, &draw.vertex_block),
        uniform_buffer(&program.fragment.reflection, &draw.fragment_block),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut entries: Vec<wgpu::BindGroupEntry<'_>> = uniforms
        .iter()
        .map(|(binding, buffer)| wgpu::BindGroupEntry {
            binding: *binding,
            resource: buffer.as_entire_binding(),
        })
        .collect();
    entries.extend(
        program
            .textures
            .iter()
            .zip(&draw.textures)
            .map(|(texture, view)| wgpu::BindGroupEntry {
                binding: texture.binding,
                resource: wgpu::BindingResource::TextureView(view),
            }),
    );
    entries.extend(
        program
            .vertex
            .reflection
            .samplers
            .iter()
            .chain(&program.fragment.reflection.samplers)
            .map(|&binding| wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::Sampler(sampler),
            }),
    );
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("draw_bind_group"),
        layout: &program.bind_group_layout,
        entries: &entries,
    });

    PreparedDraw {
        pipeline,
        bind_group,
        vertex_buffers: draw.vertex_buffers,
        index_buffer: draw.index_buffer,
        range: draw.range,
    }
}

fn to_color(c: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: c[0] as f64,
        g: c[1] as f64,
        b: c[2] as f64,
        a: c[3] as f64,
    }
}

impl GpuDevice for WgpuDevice {
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, GpuError> {
        let reflection = reflect::reflect_wgsl(stage, source).map_err(|e| GpuError::Compile {
            stage,
            log: e.to_string(),
        })?;
        let label = format!("{stage}_shader");
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let id = self.next();
        debug!(id, %stage, entry = %reflection.entry_point, "shader compiled");
        self.shaders
            .insert(id, Arc::new(CompiledStage { reflection, module }));
        Ok(ShaderId(id))
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        if self.shaders.remove(&shader.0).is_none() {
            warn!(%shader, "deleting unknown shader");
        }
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        output: FragmentOutput<'_>,
    ) -> Result<ProgramId, GpuError> {
        let stage = |id: ShaderId, expected: ShaderStage| -> Result<Arc<CompiledStage>, GpuError> {
            let compiled = self
                .shaders
                .get(&id.0)
                .cloned()
                .ok_or_else(|| GpuError::Link(format!("{id} is not a compiled shader")))?;
            if compiled.reflection.stage != expected {
                return Err(GpuError::Link(format!("{id} is not a {expected} shader")));
            }
            Ok(compiled)
        };
        let vs = stage(vertex, ShaderStage::Vertex)?;
        let fs = stage(fragment, ShaderStage::Fragment)?;

        let writes_output = fs
            .reflection
            .outputs
            .iter()
            .any(|o| o.name.as_deref() == Some(output.name) && o.location == output.location);
        if !writes_output {
            return Err(GpuError::Link(format!(
                "fragment stage does not write `{}` at location {}",
                output.name, output.location
            )));
        }
        let vertex_bindings: BTreeSet<u32> = vs.reflection.bindings().collect();
        if let Some(binding) = fs.reflection.bindings().find(|b| vertex_bindings.contains(b)) {
            return Err(GpuError::Link(format!(
                "binding {binding} is declared by both stages"
            )));
        }

        let program = Program::new(&self.device, vs, fs);
        let id = self.next();
        debug!(
            id,
            uniforms = program.uniforms.len(),
            textures = program.textures.len(),
            "program linked"
        );
        self.programs.insert(id, program);
        Ok(ProgramId(id))
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program.0).is_none() {
            warn!(%program, "deleting unknown program");
        }
        if self.bound.program == Some(program) {
            self.bound.program = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        if let Some(p) = program.filter(|p| !self.programs.contains_key(&p.0)) {
            warn!(program = %p, "binding unknown program");
        }
        self.bound.program = program;
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs
            .get(&program.0)?
            .vertex
            .reflection
            .input(name)
            .map(|i| i.location)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let index = self
            .programs
            .get(&program.0)?
            .uniforms
            .iter()
            .position(|(n, _)| n == name)?;
        Some(UniformLocation {
            program,
            index: index as u32,
        })
    }

    fn set_uniform(&mut self, location: &UniformLocation, value: UniformValue) {
        let Some(program) = self.programs.get_mut(&location.program.0) else {
            warn!(program = %location.program, "uniform set on unknown program");
            return;
        };
        let Some((name, slot)) = program.uniforms.get(location.index as usize) else {
            return;
        };
        match *slot {
            UniformSlot::Field {
                stage,
                offset,
                kind,
            } => {
                let block = match stage {
                    ShaderStage::Vertex => &mut program.vertex_block,
                    ShaderStage::Fragment => &mut program.fragment_block,
                };
                if !layout::write_uniform(block, offset, kind, value) {
                    warn!(uniform = %name, ?kind, ?value, "uniform type mismatch, ignored");
                }
            }
            UniformSlot::Texture(index) => match value {
                UniformValue::Int(unit) if unit >= 0 => program.texture_units[index] = unit as u32,
                other => warn!(uniform = %name, value = ?other, "texture uniform needs a unit"),
            },
        }
    }

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> BufferId {
        let usage = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        };
        // Empty slices cannot be bound.
        let contents = if contents.is_empty() { &[0u8; 4][..] } else { contents };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(match kind {
                    BufferKind::Vertex => "vertex_buffer",
                    BufferKind::Index => "index_buffer",
                }),
                contents,
                usage,
            });
        let id = self.next();
        self.buffers.insert(
            id,
            GpuBuffer {
                buffer: Arc::new(buffer),
            },
        );
        BufferId(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer.0).is_none() {
            warn!(%buffer, "deleting unknown buffer");
        }
        if self.bound.vertex_buffer == Some(buffer) {
            self.bound.vertex_buffer = None;
        }
    }

    fn bind_buffer(&mut self, kind: BufferKind, buffer: Option<BufferId>) {
        match kind {
            BufferKind::Vertex => self.bound.vertex_buffer = buffer,
            BufferKind::Index => {
                match self
                    .bound
                    .vertex_array
                    .and_then(|v| self.vertex_arrays.get_mut(&v.0))
                {
                    Some(vao) => vao.element_buffer = buffer,
                    None => trace!("index buffer bound with no vertex array, ignored"),
                }
            }
        }
    }

    fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = self.next();
        self.vertex_arrays.insert(id, VertexArray::default());
        VertexArrayId(id)
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        if self.vertex_arrays.remove(&vertex_array.0).is_none() {
            warn!(%vertex_array, "deleting unknown vertex array");
        }
        if self.bound.vertex_array == Some(vertex_array) {
            self.bound.vertex_array = None;
        }
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.bound.vertex_array = vertex_array;
    }

    fn vertex_attrib_pointer(&mut self, location: u32, layout: AttributeLayout) {
        let Some(buffer) = self.bound.vertex_buffer else {
            warn!(location, "attribute pointer with no vertex buffer bound, ignored");
            return;
        };
        match self
            .bound
            .vertex_array
            .and_then(|v| self.vertex_arrays.get_mut(&v.0))
        {
            Some(vao) => {
                vao.attributes.insert(location, (buffer, layout));
            }
            None => warn!(location, "attribute pointer with no vertex array bound, ignored"),
        }
    }

    fn enable_vertex_attrib(&mut self, location: u32) {
        if let Some(vao) = self
            .bound
            .vertex_array
            .and_then(|v| self.vertex_arrays.get_mut(&v.0))
        {
            vao.enabled.insert(location);
        }
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: Option<&[u8]>) -> TextureId {
        if width == 0 || height == 0 {
            warn!(width, height, "zero-sized texture");
        }
        let (texture, view) = color_texture(&self.device, &self.queue, width, height, rgba);
        let id = self.next();
        self.textures.insert(
            id,
            GpuTexture {
                _texture: texture,
                view: Arc::new(view),
                width,
                height,
            },
        );
        TextureId(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture.0).is_none() {
            warn!(%texture, "deleting unknown texture");
        }
        self.bound.units.retain(|_, t| *t != texture);
    }

    fn active_texture(&mut self, unit: u32) {
        self.bound.active_unit = unit;
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        let unit = self.bound.active_unit;
        match texture {
            Some(t) => {
                self.bound.units.insert(unit, t);
            }
            None => {
                self.bound.units.remove(&unit);
            }
        }
    }

    fn create_renderbuffer(&mut self, width: u32, height: u32) -> RenderbufferId {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("renderbuffer"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = Arc::new(texture.create_view(&Default::default()));
        let id = self.next();
        self.renderbuffers.insert(
            id,
            GpuTexture {
                _texture: texture,
                view,
                width,
                height,
            },
        );
        RenderbufferId(id)
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId) {
        if self.renderbuffers.remove(&renderbuffer.0).is_none() {
            warn!(%renderbuffer, "deleting unknown renderbuffer");
        }
    }

    fn create_framebuffer(
        &mut self,
        color: TextureId,
        depth_stencil: RenderbufferId,
    ) -> Result<FramebufferId, GpuError> {
        let c = self
            .textures
            .get(&color.0)
            .ok_or_else(|| GpuError::IncompleteFramebuffer(format!("{color} does not exist")))?;
        let d = self.renderbuffers.get(&depth_stencil.0).ok_or_else(|| {
            GpuError::IncompleteFramebuffer(format!("{depth_stencil} does not exist"))
        })?;
        if c.width == 0 || c.height == 0 {
            return Err(GpuError::IncompleteFramebuffer(format!(
                "color attachment is {}x{}",
                c.width, c.height
            )));
        }
        if (c.width, c.height) != (d.width, d.height) {
            return Err(GpuError::IncompleteFramebuffer(format!(
                "color is {}x{} but depth-stencil is {}x{}",
                c.width, c.height, d.width, d.height
            )));
        }
        let framebuffer = Framebuffer {
            color: c.view.clone(),
            depth: d.view.clone(),
        };
        let id = self.next();
        self.framebuffers.insert(id, framebuffer);
        Ok(FramebufferId(id))
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(&framebuffer.0).is_none() {
            warn!(%framebuffer, "deleting unknown framebuffer");
        }
        if self.bound.framebuffer == Some(framebuffer) {
            self.bound.framebuffer = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        if let Some(f) = framebuffer.filter(|f| !self.framebuffers.contains_key(&f.0)) {
            warn!(framebuffer = %f, "binding unknown framebuffer, ignored");
            return;
        }
        self.bound.framebuffer = framebuffer;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.bound.depth_test = enabled;
    }

    fn set_blend(&mut self, enabled: bool) {
        self.bound.blend = enabled;
    }

    fn clear(&mut self, color: [f32; 4]) {
        let framebuffer = self.bound.framebuffer;
        let fresh = matches!(
            self.passes.last(),
            Some(p) if p.framebuffer == framebuffer && p.draws.is_empty()
        );
        if fresh {
            if let Some(pass) = self.passes.last_mut() {
                pass.clear = Some(color);
            }
        } else {
            let target = self.pass_target(framebuffer);
            self.passes.push(Pass {
                framebuffer,
                target,
                clear: Some(color),
                draws: Vec::new(),
            });
        }
    }

    fn draw_arrays(&mut self, first: u32, count: u32) {
        self.record_draw(DrawRange::Arrays { first, count });
    }

    fn draw_elements(&mut self, count: u32) {
        self.record_draw(DrawRange::Elements { count });
    }

    fn present(&mut self) -> Result<(), GpuError> {
        let passes = std::mem::take(&mut self.passes);
        let needs_surface = passes
            .iter()
            .any(|p| matches!(p.target, PassTarget::Surface));

        let frame = if needs_surface {
            match self.surface.get_current_texture() {
                Ok(frame) => Some(frame),
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    self.surface.configure(&self.device, &self.config);
                    debug!("surface reconfigured, frame dropped");
                    return Ok(());
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    warn!("surface timed out, frame dropped");
                    return Ok(());
                }
                Err(e) => return Err(GpuError::Surface(e.to_string())),
            }
        } else {
            None
        };

        let mut prepared = Vec::with_capacity(passes.len());
        for pass in passes {
            let color_format = match pass.target {
                PassTarget::Surface => self.config.format,
                PassTarget::Offscreen { .. } => COLOR_FORMAT,
            };
            let mut draws = Vec::with_capacity(pass.draws.len());
            for draw in pass.draws {
                match self.programs.get_mut(&draw.program) {
                    Some(program) => draws.push(prepare_draw(
                        &self.device,
                        &self.sampler,
                        program,
                        draw,
                        color_format,
                    )),
                    None => warn!(program = draw.program, "program deleted before present"),
                }
            }
            prepared.push((pass.target, pass.clear, draws));
        }

        let surface_view = frame
            .as_ref()
            .map(|f| f.texture.create_view(&Default::default()));
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        let mut surface_touched = false;
        let mut draw_count = 0;
        for (target, clear, draws) in &prepared {
            let (color_view, depth_view, first_use) = match target {
                PassTarget::Surface => {
                    let Some(view) = surface_view.as_ref() else {
                        continue;
                    };
                    let first = !surface_touched;
                    surface_touched = true;
                    (view, &*self.surface_depth, first)
                }
                PassTarget::Offscreen { color, depth } => (&**color, &**depth, false),
            };
            // The window starts every frame undefined; clear it if nothing else does.
            let color_load = match clear {
                Some(c) => wgpu::LoadOp::Clear(to_color(*c)),
                None if first_use => wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                None => wgpu::LoadOp::Load,
            };
            let clears = clear.is_some() || first_use;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: if clears {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: if clears {
                            wgpu::LoadOp::Clear(0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                ..Default::default()
            });
            for draw in draws {
                pass.set_pipeline(&draw.pipeline);
                pass.set_bind_group(0, &draw.bind_group, &[]);
                for (slot, buffer) in draw.vertex_buffers.iter().enumerate() {
                    pass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
                match (draw.range, &draw.index_buffer) {
                    (DrawRange::Arrays { first, count }, _) => pass.draw(first..first + count, 0..1),
                    (DrawRange::Elements { count }, Some(indices)) => {
                        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..count, 0, 0..1);
                    }
                    (DrawRange::Elements { .. }, None) => continue,
                }
                draw_count += 1;
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        trace!(passes = prepared.len(), draws = draw_count, "frame submitted");

        drop(surface_view);
        if let Some(frame) = frame {
            frame.present();
        }
        Ok(())
    }
}
