//! Shader program compilation and engine construction on a wgpu device.

use std::sync::Arc;

use anyhow::Context;
use log::info;
use winit::window::Window;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::render::native::{uniform_size, DepthBuffer, ShaderProgram, SHADER, VERTEX_STRIDE};
use crate::render::{GlobalUniform, MaterialUniform, Renderer, WgpuBackend};

/// Compiles the WGSL shaders and links them into a render pipeline.
///
/// Validation errors raised while creating the shader module are reported as
/// [`EngineError::ShaderCompile`], errors raised while building the layouts
/// and pipeline as [`EngineError::ShaderLink`].
pub async fn compile_program(
    device: &wgpu::Device,
    surface_format: wgpu::TextureFormat,
) -> Result<ShaderProgram> {
    compile_program_from_source(device, surface_format, SHADER).await
}

async fn compile_program_from_source(
    device: &wgpu::Device,
    surface_format: wgpu::TextureFormat,
    source: &str,
) -> Result<ShaderProgram> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("phong-shader"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    if let Some(err) = device.pop_error_scope().await {
        return Err(EngineError::ShaderCompile(err.to_string()));
    }

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("global-bind-layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: uniform_size::<GlobalUniform>(),
            },
            count: None,
        }],
    });

    let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };
    // Per-object material uniform, diffuse/specular/normal maps and sampler.
    let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("object-bind-layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: uniform_size::<MaterialUniform>(),
                },
                count: None,
            },
            texture_entry(1),
            texture_entry(2),
            texture_entry(3),
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("renderer-pipeline-layout"),
        bind_group_layouts: &[&global_layout, &object_layout],
        push_constant_ranges: &[],
    });

    let float = std::mem::size_of::<f32>() as u64;
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("renderer-pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: VERTEX_STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    },
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 3 * float,
                        shader_location: 1,
                    },
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x2,
                        offset: 6 * float,
                        shader_location: 2,
                    },
                ],
            }],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            polygon_mode: wgpu::PolygonMode::Fill,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DepthBuffer::FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    });
    if let Some(err) = device.pop_error_scope().await {
        return Err(EngineError::ShaderLink(err.to_string()));
    }

    Ok(ShaderProgram {
        pipeline,
        global_layout,
        object_layout,
    })
}

/// Acquires a GPU device for `window`, compiles the shader program and builds
/// the engine. Every failure is reported as
/// [`EngineError::InitializationFailure`].
pub async fn init_engine(window: Arc<Window>, config: &EngineConfig) -> Result<Engine<WgpuBackend>> {
    init_engine_inner(window, config)
        .await
        .map_err(|err| EngineError::InitializationFailure(format!("{err:#}")))
}

async fn init_engine_inner(
    window: Arc<Window>,
    config: &EngineConfig,
) -> Result<Engine<WgpuBackend>> {
    let size = window.inner_size();
    if size.width == 0 || size.height == 0 {
        return Err(anyhow::anyhow!("window has zero area").into());
    }

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });
    let surface = instance
        .create_surface(Arc::clone(&window))
        .context("failed to create surface")?;

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        })
        .await
        .context("failed to acquire GPU adapter")?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("renderer-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::Off,
        })
        .await
        .context("failed to create GPU device")?;

    let surface_caps = surface.get_capabilities(&adapter);
    let surface_format = surface_caps
        .formats
        .iter()
        .find(|format| format.is_srgb())
        .copied()
        .or_else(|| surface_caps.formats.first().copied())
        .context("surface reports no supported formats")?;
    let alpha_mode = surface_caps
        .alpha_modes
        .first()
        .copied()
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

    let surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width: size.width,
        height: size.height,
        present_mode: wgpu::PresentMode::AutoVsync,
        desired_maximum_frame_latency: 2,
        alpha_mode,
        view_formats: vec![],
    };
    surface.configure(&device, &surface_config);

    let program = compile_program(&device, surface_format).await?;
    info!("shader program compiled for {surface_format:?}");

    let backend = WgpuBackend::new(surface, device, queue, surface_config, program);
    let aspect = size.width as f32 / size.height as f32;
    Engine::new(Renderer::new(backend), aspect, config)
}
