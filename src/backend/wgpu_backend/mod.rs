//! wgpu backend implementation
//!
//! Runs the WGSL programs on a headless device. Every clear and draw is
//! recorded into its own render pass and submitted right away, so the
//! immediate-mode contract of [`GraphicsBackend`] holds without batching.
//!
//! The default surface is an offscreen `Rgba8Unorm` texture; read it back
//! with [`GraphicsBackend::read_surface`].

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::shader::{validate_wgsl, FRAGMENT_ENTRY, VERTEX_ENTRY};
use glam::Vec4;
use std::borrow::Cow;
use std::collections::HashMap;
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const MIPMAP_SHADER: &str = include_str!("../../shaders/mipmap.wgsl");

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

const TEXTURE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::RENDER_ATTACHMENT)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

struct WgpuTexture {
    texture: wgpu::Texture,
    desc: TextureDescriptor,
    /// Format the texels are actually stored in
    format: wgpu::TextureFormat,
    /// View over every level and layer, used for sampling
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

#[derive(Clone, Copy)]
struct ColorAttachment {
    texture: TextureHandle,
    layer: u32,
    mip: u32,
}

#[derive(Default)]
struct Framebuffer {
    color: Option<ColorAttachment>,
    depth: Option<RenderbufferHandle>,
}

#[derive(Default)]
struct Renderbuffer {
    storage: Option<(wgpu::Texture, u32, u32)>,
}

struct UniformField {
    name: &'static str,
    offset: usize,
}

struct Program {
    kind: ProgramKind,
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    fields: Vec<UniformField>,
    uniform_data: Vec<u8>,
    uniform_buffer: wgpu::Buffer,
    sampler_units: HashMap<&'static str, u32>,
}

struct Mesh {
    vertices: wgpu::Buffer,
    indices: Option<wgpu::Buffer>,
    count: u32,
    topology: PrimitiveTopology,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u64,
    format: wgpu::TextureFormat,
    /// Depth compare when the target has a depth attachment
    depth: Option<CompareFunction>,
    topology: PrimitiveTopology,
    indexed: bool,
}

/// Views of the currently bound framebuffer
struct Target {
    color: wgpu::TextureView,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    depth: Option<wgpu::TextureView>,
}

/// Black textures sampled through units with nothing (or the wrong kind) bound
struct Fallback {
    _texture_2d: wgpu::Texture,
    view_2d: wgpu::TextureView,
    _texture_cube: wgpu::Texture,
    view_cube: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

impl Fallback {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let make = |label: &str, layers: u32| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: layers,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            for layer in 0..layers {
                queue.write_texture(
                    wgpu::ImageCopyTexture {
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                        aspect: wgpu::TextureAspect::All,
                    },
                    &[0, 0, 0, 255],
                    wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(4),
                        rows_per_image: Some(1),
                    },
                    wgpu::Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: 1,
                    },
                );
            }
            texture
        };

        let texture_2d = make("fallback 2d", 1);
        let texture_cube = make("fallback cube", 6);
        let view_2d = texture_2d.create_view(&wgpu::TextureViewDescriptor::default());
        let view_cube = texture_cube.create_view(&wgpu::TextureViewDescriptor {
            label: Some("fallback cube"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("fallback"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            _texture_2d: texture_2d,
            view_2d,
            _texture_cube: texture_cube,
            view_cube,
            sampler,
        }
    }

    fn binding(&self, dimension: TextureDimension) -> (&wgpu::TextureView, &wgpu::Sampler) {
        match dimension {
            TextureDimension::D2 => (&self.view_2d, &self.sampler),
            TextureDimension::Cube => (&self.view_cube, &self.sampler),
        }
    }
}

/// Downsampling blit used by `generate_mipmaps`, one pipeline per format
struct MipmapBlit {
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl MipmapBlit {
    fn new(device: &wgpu::Device) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mipmap"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(MIPMAP_SHADER)),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mipmap"),
            entries: &[
                texture_layout_entry(0, wgpu::TextureViewDimension::D2),
                sampler_layout_entry(1),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mipmap"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        Self {
            module,
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
        }
    }

    fn pipeline(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) -> &wgpu::RenderPipeline {
        let Self {
            module,
            pipeline_layout,
            pipelines,
            ..
        } = self;
        let module = &*module;
        let pipeline_layout = &*pipeline_layout;
        pipelines.entry(format).or_insert_with(|| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("mipmap"),
                layout: Some(pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: VERTEX_ENTRY,
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: FRAGMENT_ENTRY,
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        })
    }
}

/// wgpu backend implementation
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    /// Whether `Rgba32Float` can be sampled with filtering; otherwise it is
    /// stored as `Rgba16Float`
    float32_filterable: bool,

    textures: HashMap<u64, WgpuTexture>,
    framebuffers: HashMap<u64, Framebuffer>,
    renderbuffers: HashMap<u64, Renderbuffer>,
    programs: HashMap<u64, Program>,
    meshes: HashMap<u64, Mesh>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    mipmaps: MipmapBlit,
    fallback: Fallback,

    surface_color: wgpu::Texture,
    surface_depth: wgpu::Texture,
    surface_size: (u32, u32),

    bound_framebuffer: Option<FramebufferHandle>,
    current_program: Option<ProgramHandle>,
    units: HashMap<u32, TextureHandle>,
    viewport: (u32, u32, u32, u32),
    depth_compare: CompareFunction,

    next_id: u64,
}

impl WgpuBackend {
    /// Create a headless backend with a `width` x `height` default surface
    pub fn new(width: u32, height: u32) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(width, height))
    }

    pub async fn new_async(width: u32, height: u32) -> BackendResult<Self> {
        if width == 0 || height == 0 {
            return Err(BackendError::InitializationFailed(format!(
                "surface size {}x{}",
                width, height
            )));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let float32_filterable = adapter
            .features()
            .contains(wgpu::Features::FLOAT32_FILTERABLE);
        if !float32_filterable {
            log::debug!("WgpuBackend: Rgba32Float is not filterable, storing it as Rgba16Float");
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("pbr-ibl device"),
                    required_features: if float32_filterable {
                        wgpu::Features::FLOAT32_FILTERABLE
                    } else {
                        wgpu::Features::empty()
                    },
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|error: wgpu::Error| {
            log::error!("wgpu: {}", error);
        }));

        let fallback = Fallback::new(&device, &queue);
        let mipmaps = MipmapBlit::new(&device);
        let (surface_color, surface_depth) = create_surface_targets(&device, width, height);

        Ok(Self {
            device,
            queue,
            adapter_info,
            float32_filterable,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            renderbuffers: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
            pipelines: HashMap::new(),
            mipmaps,
            fallback,
            surface_color,
            surface_depth,
            surface_size: (width, height),
            bound_framebuffer: None,
            current_program: None,
            units: HashMap::new(),
            viewport: (0, 0, width, height),
            depth_compare: CompareFunction::Less,
            next_id: 1,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn storage_format(&self, format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float if self.float32_filterable => {
                wgpu::TextureFormat::Rgba32Float
            }
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba16Float,
        }
    }

    fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
        match func {
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
        }
    }

    fn convert_topology(topology: PrimitiveTopology) -> wgpu::PrimitiveTopology {
        match topology {
            PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }

    fn texture(&self, texture: TextureHandle) -> BackendResult<&WgpuTexture> {
        self.textures
            .get(&texture.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            })
    }

    fn layer_for(texture: &WgpuTexture, face: Option<CubeFace>) -> BackendResult<u32> {
        match (texture.desc.dimension, face) {
            (TextureDimension::D2, None) => Ok(0),
            (TextureDimension::Cube, Some(face)) => Ok(face.index() as u32),
            (TextureDimension::D2, Some(face)) => Err(BackendError::InvalidAttachment(format!(
                "face {} requested on 2D texture '{}'",
                face.label(),
                texture.desc.label_or_default()
            ))),
            (TextureDimension::Cube, None) => Err(BackendError::InvalidAttachment(format!(
                "cube texture '{}' needs a face",
                texture.desc.label_or_default()
            ))),
        }
    }

    /// Resolve the color and depth views draws and clears render into
    fn target(&self) -> BackendResult<Target> {
        let Some(fb) = self.bound_framebuffer else {
            return Ok(Target {
                color: self
                    .surface_color
                    .create_view(&wgpu::TextureViewDescriptor::default()),
                format: SURFACE_FORMAT,
                width: self.surface_size.0,
                height: self.surface_size.1,
                depth: Some(
                    self.surface_depth
                        .create_view(&wgpu::TextureViewDescriptor::default()),
                ),
            });
        };
        let framebuffer = self
            .framebuffers
            .get(&fb.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "framebuffer",
                id: fb.0,
            })?;
        let attachment = framebuffer.color.ok_or_else(|| {
            BackendError::InvalidAttachment(format!("framebuffer {} has no color attachment", fb.0))
        })?;
        let texture = self.texture(attachment.texture)?;
        let (width, height) = texture.desc.mip_size(attachment.mip);

        let depth = framebuffer
            .depth
            .and_then(|rb| self.renderbuffers.get(&rb.0))
            .and_then(|rb| rb.storage.as_ref())
            .and_then(|(depth, w, h)| {
                if (*w, *h) == (width, height) {
                    Some(depth.create_view(&wgpu::TextureViewDescriptor::default()))
                } else {
                    log::trace!(
                        "WgpuBackend: depth {}x{} does not match target {}x{}, drawing without depth",
                        w,
                        h,
                        width,
                        height
                    );
                    None
                }
            });

        Ok(Target {
            color: level_view(&texture.texture, attachment.layer, attachment.mip),
            format: texture.format,
            width,
            height,
            depth,
        })
    }

    fn create_pipeline(&self, program: &Program, key: &PipelineKey) -> BackendResult<wgpu::RenderPipeline> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(program.kind.name()),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: VERTEX_ENTRY,
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: Vertex::STRIDE,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &VERTEX_ATTRIBUTES,
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: FRAGMENT_ENTRY,
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: Self::convert_topology(key.topology),
                    strip_index_format: (key.indexed
                        && key.topology == PrimitiveTopology::TriangleStrip)
                        .then_some(wgpu::IndexFormat::Uint32),
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: key.depth.map(|compare| wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: Self::convert_compare_function(compare),
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(BackendError::ShaderCreationFailed(format!(
                "{}: {}",
                program.kind.name(),
                error
            ))),
            None => Ok(pipeline),
        }
    }

    /// Texture and sampler for every sampler uniform, in binding order
    fn sampler_bindings<'a>(&'a self, program: &Program) -> Vec<(&'a wgpu::TextureView, &'a wgpu::Sampler)> {
        program
            .kind
            .samplers()
            .map(|decl| {
                let unit = program.sampler_units.get(decl.name).copied().unwrap_or(0);
                let wanted = match decl.ty {
                    UniformType::SamplerCube => TextureDimension::Cube,
                    _ => TextureDimension::D2,
                };
                self.units
                    .get(&unit)
                    .and_then(|handle| self.textures.get(&handle.0))
                    .filter(|texture| texture.desc.dimension == wanted)
                    .map(|texture| (&texture.view, &texture.sampler))
                    .unwrap_or_else(|| self.fallback.binding(wanted))
            })
            .collect()
    }

    /// Copy one level into a mappable buffer and return its tightly packed bytes
    fn read_level(
        &self,
        texture: &wgpu::Texture,
        format: wgpu::TextureFormat,
        layer: u32,
        mip: u32,
        width: u32,
        height: u32,
    ) -> BackendResult<Vec<u8>> {
        let unpadded = width * texel_size(format);
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: mip,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let mut bytes = Vec::with_capacity((unpadded * height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded as usize) {
                bytes.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();
        Ok(bytes)
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "'{}' is {}x{} with {} levels",
                desc.label_or_default(),
                desc.width,
                desc.height,
                desc.mip_levels
            )));
        }
        if desc.dimension == TextureDimension::Cube && desc.width != desc.height {
            return Err(BackendError::TextureCreationFailed(format!(
                "cube '{}' faces must be square",
                desc.label_or_default()
            )));
        }
        let max_levels = TextureDescriptor::full_mip_count(desc.width, desc.height);
        if desc.mip_levels > max_levels {
            return Err(BackendError::TextureCreationFailed(format!(
                "'{}' asks for {} levels, at most {} fit",
                desc.label_or_default(),
                desc.mip_levels,
                max_levels
            )));
        }

        let format = self.storage_format(desc.format);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.dimension.layers(),
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: TEXTURE_USAGE,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: desc.label.as_deref(),
            dimension: Some(match desc.dimension {
                TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
            }),
            ..Default::default()
        });
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: Self::convert_address_mode(desc.sampler.address_mode),
            address_mode_v: Self::convert_address_mode(desc.sampler.address_mode),
            address_mode_w: Self::convert_address_mode(desc.sampler.address_mode),
            mag_filter: Self::convert_filter_mode(desc.sampler.mag_filter),
            min_filter: Self::convert_filter_mode(desc.sampler.min_filter),
            mipmap_filter: desc
                .sampler
                .mipmap_filter
                .map(Self::convert_filter_mode)
                .unwrap_or(wgpu::FilterMode::Nearest),
            lod_min_clamp: 0.0,
            lod_max_clamp: if desc.sampler.mipmap_filter.is_some() {
                32.0
            } else {
                0.0
            },
            ..Default::default()
        });

        let id = self.alloc_id();
        log::trace!(
            "WgpuBackend: creating texture {} '{}' ({}x{}, {:?})",
            id,
            desc.label_or_default(),
            desc.width,
            desc.height,
            format
        );
        self.textures.insert(
            id,
            WgpuTexture {
                texture,
                desc: desc.clone(),
                format,
                view,
                sampler,
            },
        );
        Ok(TextureHandle(id))
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        face: Option<CubeFace>,
        data: &[Vec4],
    ) -> BackendResult<()> {
        let tex = self.texture(texture)?;
        let layer = Self::layer_for(tex, face)?;
        let (width, height) = (tex.desc.width, tex.desc.height);
        let expected = (width * height) as usize;
        if data.len() != expected {
            return Err(BackendError::InvalidData(format!(
                "expected {} texels, got {}",
                expected,
                data.len()
            )));
        }
        let bytes = encode_texels(tex.format, data);
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * texel_size(tex.format)),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) -> BackendResult<()> {
        let (format, levels, layers) = {
            let tex = self.texture(texture)?;
            (tex.format, tex.desc.mip_levels, tex.desc.dimension.layers())
        };
        if levels <= 1 {
            return Ok(());
        }

        self.mipmaps.pipeline(&self.device, format);
        let tex = self.texture(texture)?;
        let pipeline = self.mipmaps.pipelines.get(&format).ok_or_else(|| {
            BackendError::TextureCreationFailed(format!("no mipmap pipeline for {:?}", format))
        })?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mipmaps"),
            });
        for layer in 0..layers {
            for mip in 1..levels {
                let source = level_view(&tex.texture, layer, mip - 1);
                let destination = level_view(&tex.texture, layer, mip);
                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("mipmap"),
                    layout: &self.mipmaps.bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&source),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.fallback.sampler),
                        },
                    ],
                });
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("mipmap"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &destination,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn read_texture(
        &mut self,
        texture: TextureHandle,
        face: Option<CubeFace>,
        mip: u32,
    ) -> BackendResult<Vec<Vec4>> {
        let tex = self.texture(texture)?;
        let layer = Self::layer_for(tex, face)?;
        if mip >= tex.desc.mip_levels {
            return Err(BackendError::InvalidData(format!(
                "mip {} requested on '{}' with {} levels",
                mip,
                tex.desc.label_or_default(),
                tex.desc.mip_levels
            )));
        }
        let (width, height) = tex.desc.mip_size(mip);
        let bytes = self.read_level(&tex.texture, tex.format, layer, mip, width, height)?;
        Ok(decode_texels(tex.format, &bytes))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        log::trace!("WgpuBackend: destroying texture {}", texture.0);
        if let Some(tex) = self.textures.remove(&texture.0) {
            tex.texture.destroy();
        }
        self.units.retain(|_, bound| *bound != texture);
        for framebuffer in self.framebuffers.values_mut() {
            if framebuffer.color.is_some_and(|c| c.texture == texture) {
                framebuffer.color = None;
            }
        }
    }

    fn create_framebuffer(&mut self) -> BackendResult<FramebufferHandle> {
        let id = self.alloc_id();
        self.framebuffers.insert(id, Framebuffer::default());
        Ok(FramebufferHandle(id))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn create_renderbuffer(&mut self) -> BackendResult<RenderbufferHandle> {
        let id = self.alloc_id();
        self.renderbuffers.insert(id, Renderbuffer::default());
        Ok(RenderbufferHandle(id))
    }

    fn renderbuffer_storage(
        &mut self,
        renderbuffer: RenderbufferHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidData(format!(
                "renderbuffer storage {}x{}",
                width, height
            )));
        }
        let entry = self
            .renderbuffers
            .get_mut(&renderbuffer.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "renderbuffer",
                id: renderbuffer.0,
            })?;
        if let Some((old, w, h)) = entry.storage.take() {
            if (w, h) == (width, height) {
                entry.storage = Some((old, w, h));
                return Ok(());
            }
            old.destroy();
        }
        let depth = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth renderbuffer"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        entry.storage = Some((depth, width, height));
        Ok(())
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        if let Some(entry) = self.renderbuffers.remove(&renderbuffer.0) {
            if let Some((depth, _, _)) = entry.storage {
                depth.destroy();
            }
        }
    }

    fn attach_depth(
        &mut self,
        framebuffer: FramebufferHandle,
        renderbuffer: RenderbufferHandle,
    ) -> BackendResult<()> {
        if !self.renderbuffers.contains_key(&renderbuffer.0) {
            return Err(BackendError::InvalidHandle {
                kind: "renderbuffer",
                id: renderbuffer.0,
            });
        }
        let fb = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "framebuffer",
                id: framebuffer.0,
            })?;
        fb.depth = Some(renderbuffer);
        Ok(())
    }

    fn attach_color(
        &mut self,
        framebuffer: FramebufferHandle,
        texture: TextureHandle,
        face: Option<CubeFace>,
        mip: u32,
    ) -> BackendResult<()> {
        let tex = self.texture(texture)?;
        if mip >= tex.desc.mip_levels {
            return Err(BackendError::InvalidAttachment(format!(
                "mip {} requested on '{}' with {} levels",
                mip,
                tex.desc.label_or_default(),
                tex.desc.mip_levels
            )));
        }
        let layer = Self::layer_for(tex, face)?;
        let fb = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "framebuffer",
                id: framebuffer.0,
            })?;
        fb.color = Some(ColorAttachment {
            texture,
            layer,
            mip,
        });
        Ok(())
    }

    fn detach_color(&mut self, framebuffer: FramebufferHandle) -> BackendResult<()> {
        let fb = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "framebuffer",
                id: framebuffer.0,
            })?;
        fb.color = None;
        Ok(())
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.bound_framebuffer = framebuffer;
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.viewport = (x, y, width, height);
    }

    fn set_depth_compare(&mut self, compare: CompareFunction) {
        self.depth_compare = compare;
    }

    fn clear(&mut self, color: Vec4, flags: ClearFlags) -> BackendResult<()> {
        let target = self.target()?;
        let color_load = if flags.contains(ClearFlags::COLOR) {
            wgpu::LoadOp::Clear(wgpu::Color {
                r: color.x as f64,
                g: color.y as f64,
                b: color.z as f64,
                a: color.w as f64,
            })
        } else {
            wgpu::LoadOp::Load
        };
        let depth_load = if flags.contains(ClearFlags::DEPTH) {
            wgpu::LoadOp::Clear(1.0)
        } else {
            wgpu::LoadOp::Load
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clear"),
            });
        drop(begin_pass(&mut encoder, "clear", &target, color_load, depth_load));
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn create_program(&mut self, desc: &ShaderDescriptor) -> BackendResult<ProgramHandle> {
        let label = desc.label.as_deref().unwrap_or(desc.kind.name());
        validate_wgsl(&desc.source)
            .map_err(|e| BackendError::ShaderCreationFailed(format!("{}: {}", label, e)))?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&desc.source)),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ShaderCreationFailed(format!(
                "{}: {}",
                label, error
            )));
        }

        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &program_layout_entries(desc.kind),
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
        let (fields, size) = uniform_layout(desc.kind);
        let uniform_data = vec![0u8; size];
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: &uniform_data,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let program = Program {
            kind: desc.kind,
            module,
            bind_group_layout,
            pipeline_layout,
            fields,
            uniform_data,
            uniform_buffer,
            sampler_units: HashMap::new(),
        };

        // Link once up front so bindings that disagree with the layout fail here
        let id = self.alloc_id();
        let probe = PipelineKey {
            program: id,
            format: wgpu::TextureFormat::Rgba16Float,
            depth: Some(CompareFunction::Less),
            topology: PrimitiveTopology::TriangleList,
            indexed: false,
        };
        let pipeline = self.create_pipeline(&program, &probe)?;
        self.pipelines.insert(probe, pipeline);

        log::trace!("WgpuBackend: creating program {} '{}'", id, label);
        self.programs.insert(id, program);
        Ok(ProgramHandle(id))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        log::trace!("WgpuBackend: destroying program {}", program.0);
        if let Some(entry) = self.programs.remove(&program.0) {
            entry.uniform_buffer.destroy();
        }
        self.pipelines.retain(|key, _| key.program != program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.current_program = program;
    }

    fn set_uniform(
        &mut self,
        program: ProgramHandle,
        name: &str,
        value: UniformValue,
    ) -> BackendResult<()> {
        let entry = self
            .programs
            .get_mut(&program.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "program",
                id: program.0,
            })?;
        let decl = entry
            .kind
            .uniform(name)
            .ok_or_else(|| BackendError::UnknownUniform {
                program: entry.kind.name(),
                name: name.to_string(),
            })?;
        if !value.matches(decl.ty) {
            return Err(BackendError::UniformTypeMismatch(name.to_string()));
        }

        let bytes: Vec<u8> = match value {
            UniformValue::Int(unit) => {
                entry.sampler_units.insert(decl.name, unit.max(0) as u32);
                return Ok(());
            }
            UniformValue::Float(v) => bytemuck::bytes_of(&v).to_vec(),
            UniformValue::Vec3(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            UniformValue::Mat4(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
        };
        let offset = entry
            .fields
            .iter()
            .find(|f| f.name == decl.name)
            .map(|f| f.offset)
            .ok_or_else(|| BackendError::UnknownUniform {
                program: entry.kind.name(),
                name: name.to_string(),
            })?;
        entry.uniform_data[offset..offset + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        match texture {
            Some(texture) => {
                self.units.insert(unit, texture);
            }
            None => {
                self.units.remove(&unit);
            }
        }
    }

    fn create_mesh(&mut self, desc: &MeshDescriptor) -> BackendResult<MeshHandle> {
        if desc.vertices.is_empty() {
            return Err(BackendError::MeshCreationFailed(format!(
                "'{}' has no vertices",
                desc.label.unwrap_or("unnamed")
            )));
        }
        let vertices = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: desc.label,
                contents: bytemuck::cast_slice(desc.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let indices = desc.indices.map(|indices| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: desc.label,
                    contents: bytemuck::cast_slice(indices),
                    usage: wgpu::BufferUsages::INDEX,
                })
        });
        let count = desc
            .indices
            .map(|i| i.len())
            .unwrap_or(desc.vertices.len()) as u32;

        let id = self.alloc_id();
        log::trace!(
            "WgpuBackend: creating mesh {} ({:?}, {} vertices)",
            id,
            desc.primitive,
            desc.vertices.len()
        );
        self.meshes.insert(
            id,
            Mesh {
                vertices,
                indices,
                count,
                topology: desc.topology,
            },
        );
        Ok(MeshHandle(id))
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        log::trace!("WgpuBackend: destroying mesh {}", mesh.0);
        if let Some(entry) = self.meshes.remove(&mesh.0) {
            entry.vertices.destroy();
            if let Some(indices) = entry.indices {
                indices.destroy();
            }
        }
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) -> BackendResult<()> {
        let handle = self.current_program.ok_or(BackendError::NoProgramBound)?;
        let target = self.target()?;
        let program = self
            .programs
            .get(&handle.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "program",
                id: handle.0,
            })?;
        let mesh_entry = self.meshes.get(&mesh.0).ok_or(BackendError::InvalidHandle {
            kind: "mesh",
            id: mesh.0,
        })?;

        let Some((vx, vy, vw, vh)) = clip_viewport(self.viewport, target.width, target.height)
        else {
            return Ok(());
        };

        let key = PipelineKey {
            program: handle.0,
            format: target.format,
            depth: target.depth.as_ref().map(|_| self.depth_compare),
            topology: mesh_entry.topology,
            indexed: mesh_entry.indices.is_some(),
        };
        if !self.pipelines.contains_key(&key) {
            let pipeline = self.create_pipeline(program, &key)?;
            self.pipelines.insert(key, pipeline);
        }
        let pipeline = self.pipelines.get(&key).ok_or(BackendError::InvalidHandle {
            kind: "pipeline",
            id: handle.0,
        })?;

        self.queue
            .write_buffer(&program.uniform_buffer, 0, &program.uniform_data);

        let bindings = self.sampler_bindings(program);
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: program.uniform_buffer.as_entire_binding(),
        }];
        for (k, (view, sampler)) in bindings.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + 2 * k as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + 2 * k as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.kind.name()),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let label = program.kind.name();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = begin_pass(
                &mut encoder,
                label,
                &target,
                wgpu::LoadOp::Load,
                wgpu::LoadOp::Load,
            );
            pass.set_viewport(vx as f32, vy as f32, vw as f32, vh as f32, 0.0, 1.0);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, mesh_entry.vertices.slice(..));
            match &mesh_entry.indices {
                Some(indices) => {
                    pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..mesh_entry.count, 0, 0..1);
                }
                None => pass.draw(0..mesh_entry.count, 0..1),
            }
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> BackendResult<()> {
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidData(format!(
                "surface size {}x{}",
                width, height
            )));
        }
        if self.surface_size == (width, height) {
            return Ok(());
        }
        log::debug!("WgpuBackend: resizing surface to {}x{}", width, height);
        let (color, depth) = create_surface_targets(&self.device, width, height);
        self.surface_color.destroy();
        self.surface_depth.destroy();
        self.surface_color = color;
        self.surface_depth = depth;
        self.surface_size = (width, height);
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn read_surface(&mut self) -> BackendResult<Vec<Vec4>> {
        let (width, height) = self.surface_size;
        let bytes = self.read_level(&self.surface_color, SURFACE_FORMAT, 0, 0, width, height)?;
        Ok(decode_texels(SURFACE_FORMAT, &bytes))
    }

    fn live_resources(&self) -> LiveResources {
        LiveResources {
            textures: self.textures.len(),
            framebuffers: self.framebuffers.len(),
            renderbuffers: self.renderbuffers.len(),
            programs: self.programs.len(),
            meshes: self.meshes.len(),
        }
    }
}

fn create_surface_targets(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::Texture) {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let color = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("surface"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: SURFACE_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("surface depth"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    (color, depth)
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &'e str,
    target: &'e Target,
    color: wgpu::LoadOp<wgpu::Color>,
    depth: wgpu::LoadOp<f32>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &target.color,
            resolve_target: None,
            ops: wgpu::Operations {
                load: color,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: target.depth.as_ref().map(|view| {
            wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: depth,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

/// Single-level, single-layer 2D view for rendering into or reading from
fn level_view(texture: &wgpu::Texture, layer: u32, mip: u32) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: None,
        format: None,
        dimension: Some(wgpu::TextureViewDimension::D2),
        aspect: wgpu::TextureAspect::All,
        base_mip_level: mip,
        mip_level_count: Some(1),
        base_array_layer: layer,
        array_layer_count: Some(1),
    })
}

fn texture_layout_entry(binding: u32, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_layout_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Uniform buffer at binding 0, then texture `k` at `1 + 2k` and its sampler at `2 + 2k`
fn program_layout_entries(kind: ProgramKind) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }];
    for (k, decl) in kind.samplers().enumerate() {
        let dimension = match decl.ty {
            UniformType::SamplerCube => wgpu::TextureViewDimension::Cube,
            _ => wgpu::TextureViewDimension::D2,
        };
        entries.push(texture_layout_entry(1 + 2 * k as u32, dimension));
        entries.push(sampler_layout_entry(2 + 2 * k as u32));
    }
    entries
}

/// Byte offsets of the non-sampler uniforms under WGSL uniform layout rules,
/// plus the buffer size
fn uniform_layout(kind: ProgramKind) -> (Vec<UniformField>, usize) {
    let mut fields = Vec::new();
    let mut offset = 0usize;
    for decl in kind.uniforms() {
        let (align, size) = match decl.ty {
            UniformType::Float => (4, 4),
            UniformType::Vec3 => (16, 12),
            UniformType::Mat4 => (16, 64),
            UniformType::Sampler2d | UniformType::SamplerCube => continue,
        };
        offset = offset.next_multiple_of(align);
        fields.push(UniformField {
            name: decl.name,
            offset,
        });
        offset += size;
    }
    (fields, offset.next_multiple_of(16).max(16))
}

/// Clip a viewport to the target; `None` when nothing is left
fn clip_viewport(viewport: (u32, u32, u32, u32), width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let (x, y, w, h) = viewport;
    let x_end = x.saturating_add(w).min(width);
    let y_end = y.saturating_add(h).min(height);
    (x < x_end && y < y_end).then(|| (x, y, x_end - x, y_end - y))
}

fn texel_size(format: wgpu::TextureFormat) -> u32 {
    match format {
        wgpu::TextureFormat::Rgba16Float => 8,
        wgpu::TextureFormat::Rgba32Float => 16,
        _ => 4,
    }
}

fn encode_texels(format: wgpu::TextureFormat, data: &[Vec4]) -> Vec<u8> {
    match format {
        wgpu::TextureFormat::Rgba32Float => bytemuck::cast_slice(data).to_vec(),
        wgpu::TextureFormat::Rgba16Float => {
            let halves: Vec<half::f16> = data
                .iter()
                .flat_map(|v| v.to_array())
                .map(half::f16::from_f32)
                .collect();
            bytemuck::cast_slice(&halves).to_vec()
        }
        wgpu::TextureFormat::Rg16Float => {
            let halves: Vec<half::f16> = data
                .iter()
                .flat_map(|v| [v.x, v.y])
                .map(half::f16::from_f32)
                .collect();
            bytemuck::cast_slice(&halves).to_vec()
        }
        _ => data
            .iter()
            .flat_map(|v| v.to_array())
            .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect(),
    }
}

fn decode_texels(format: wgpu::TextureFormat, bytes: &[u8]) -> Vec<Vec4> {
    let half = |b: &[u8]| half::f16::from_bits(u16::from_le_bytes([b[0], b[1]])).to_f32();
    match format {
        wgpu::TextureFormat::Rgba32Float => bytes
            .chunks_exact(16)
            .map(|t| {
                let c: [f32; 4] = std::array::from_fn(|i| {
                    f32::from_le_bytes([t[4 * i], t[4 * i + 1], t[4 * i + 2], t[4 * i + 3]])
                });
                Vec4::from_array(c)
            })
            .collect(),
        wgpu::TextureFormat::Rgba16Float => bytes
            .chunks_exact(8)
            .map(|t| Vec4::new(half(&t[0..2]), half(&t[2..4]), half(&t[4..6]), half(&t[6..8])))
            .collect(),
        wgpu::TextureFormat::Rg16Float => bytes
            .chunks_exact(4)
            .map(|t| Vec4::new(half(&t[0..2]), half(&t[2..4]), 0.0, 1.0))
            .collect(),
        _ => bytes
            .chunks_exact(4)
            .map(|t| Vec4::new(t[0] as f32, t[1] as f32, t[2] as f32, t[3] as f32) / 255.0)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_offsets() {
        let (fields, size) = uniform_layout(ProgramKind::Pbr);
        let offset = |name: &str| fields.iter().find(|f| f.name == name).map(|f| f.offset);
        assert_eq!(offset("model"), Some(0));
        assert_eq!(offset("camera"), Some(192));
        assert_eq!(offset("lights[0].position"), Some(208));
        assert_eq!(offset("lights[0].color"), Some(224));
        assert_eq!(offset("lights[3].color"), Some(320));
        assert_eq!(size, 336);

        let (_, size) = uniform_layout(ProgramKind::SpecularPrefilter);
        assert_eq!(size, 144);
        let (fields, size) = uniform_layout(ProgramKind::BrdfIntegration);
        assert!(fields.is_empty());
        assert_eq!(size, 16);
    }

    #[test]
    fn test_layout_bindings() {
        let entries = program_layout_entries(ProgramKind::Pbr);
        assert_eq!(entries.len(), 17);
        assert!(matches!(
            entries[1].ty,
            wgpu::BindingType::Texture {
                view_dimension: wgpu::TextureViewDimension::Cube,
                ..
            }
        ));
        assert!(matches!(
            entries[5].ty,
            wgpu::BindingType::Texture {
                view_dimension: wgpu::TextureViewDimension::D2,
                ..
            }
        ));
        assert_eq!(program_layout_entries(ProgramKind::BrdfIntegration).len(), 1);
    }

    #[test]
    fn test_clip_viewport() {
        assert_eq!(clip_viewport((0, 0, 64, 64), 32, 32), Some((0, 0, 32, 32)));
        assert_eq!(clip_viewport((40, 0, 8, 8), 32, 32), None);
        assert_eq!(clip_viewport((4, 4, 8, 8), 32, 32), Some((4, 4, 8, 8)));
    }

    #[test]
    fn test_texel_codecs() {
        let texels = vec![Vec4::new(0.5, 2.0, -1.0, 1.0)];
        let rg = decode_texels(
            wgpu::TextureFormat::Rg16Float,
            &encode_texels(wgpu::TextureFormat::Rg16Float, &texels),
        );
        assert_eq!(rg, vec![Vec4::new(0.5, 2.0, 0.0, 1.0)]);

        let unorm = decode_texels(
            wgpu::TextureFormat::Rgba8Unorm,
            &encode_texels(wgpu::TextureFormat::Rgba8Unorm, &texels),
        );
        assert_eq!(unorm, vec![Vec4::new(128.0 / 255.0, 1.0, 0.0, 1.0)]);
    }
}
