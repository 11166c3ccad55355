use std::num::NonZeroU64;

use anyhow::{anyhow, Result};
use bytemuck::bytes_of;
use log::{debug, info, warn};
use wgpu::util::DeviceExt;

use super::{
    interleave_vertices, DrawCall, GlobalUniform, MaterialUniform, RenderBackend, RenderParams,
    FLOATS_PER_VERTEX,
};
use crate::object::{ObjectHandle, RenderObject, TextureImage, TextureSlot};

/// Compiled pipeline plus the bind group layouts it was linked against.
pub struct ShaderProgram {
    pub pipeline: wgpu::RenderPipeline,
    pub global_layout: wgpu::BindGroupLayout,
    pub object_layout: wgpu::BindGroupLayout,
}

/// GPU backend drawing into a window surface with wgpu.
pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: DepthBuffer,
    program: ShaderProgram,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    fallback: FallbackTextures,
}

impl WgpuBackend {
    pub fn new(
        surface: wgpu::Surface<'static>,
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: wgpu::SurfaceConfiguration,
        program: ShaderProgram,
    ) -> Self {
        let depth = DepthBuffer::create(&device, config.width, config.height);

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global-bind-group"),
            layout: &program.global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let fallback = FallbackTextures::create(&device, &queue);
        info!(
            "wgpu backend ready ({}x{}, {:?})",
            config.width, config.height, config.format
        );

        Self {
            surface,
            device,
            queue,
            config,
            depth,
            program,
            global_buffer,
            global_bind_group,
            sampler,
            fallback,
        }
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, width, height);
    }

    fn create_mesh(&self, handle: ObjectHandle, object: &RenderObject) -> GpuMesh {
        let label = format!("object-{}", handle.id());
        let vertices = interleave_vertices(object);
        let vertex = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-vertices")),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-indices")),
                contents: bytemuck::cast_slice(&object.geometry.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let material = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-material")),
                contents: bytes_of(&MaterialUniform::from_object(object)),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let textures: Vec<Option<GpuTexture>> = TextureSlot::ALL
            .iter()
            .map(|slot| {
                object
                    .textures
                    .get(*slot)
                    .map(|image| GpuTexture::upload(&self.device, &self.queue, image, *slot))
            })
            .collect();
        let view_for = |index: usize, slot: TextureSlot| {
            textures[index]
                .as_ref()
                .map(|texture| &texture.view)
                .unwrap_or_else(|| self.fallback.view(slot))
        };

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-bind-group")),
            layout: &self.program.object_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: material.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view_for(
                        0,
                        TextureSlot::Diffuse,
                    )),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(view_for(
                        1,
                        TextureSlot::Specular,
                    )),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(view_for(
                        2,
                        TextureSlot::Normal,
                    )),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        GpuMesh {
            vertex,
            index,
            index_count: object.geometry.indices.len() as u32,
            material,
            textures: textures.into_iter().flatten().collect(),
            bind_group,
        }
    }
}

impl RenderBackend for WgpuBackend {
    type Buffers = GpuMesh;

    fn upload(&mut self, handle: ObjectHandle, object: &RenderObject) -> Result<GpuMesh> {
        Ok(self.create_mesh(handle, object))
    }

    fn update(
        &mut self,
        handle: ObjectHandle,
        buffers: &mut GpuMesh,
        object: &RenderObject,
    ) -> Result<()> {
        // Vertex counts and textures may change, so rebuild everything.
        let fresh = self.create_mesh(handle, object);
        std::mem::replace(buffers, fresh).destroy();
        Ok(())
    }

    fn release(&mut self, handle: ObjectHandle, buffers: GpuMesh) {
        debug!("destroying GPU buffers of {handle}");
        buffers.destroy();
    }

    fn draw(&mut self, params: &RenderParams, draws: &[DrawCall<'_, GpuMesh>]) -> Result<()> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("surface lost; reconfiguring and skipping frame");
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timeout; skipping frame");
                return Ok(());
            }
            Err(err) => return Err(anyhow!("failed to acquire surface texture: {err}")),
        };

        self.queue.write_buffer(
            &self.global_buffer,
            0,
            bytes_of(&GlobalUniform::from_params(params)),
        );

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer-encoder"),
            });

        let [r, g, b, a] = params.background_color;
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.program.pipeline);
            pass.set_bind_group(0, &self.global_bind_group, &[]);

            for draw in draws {
                let mesh = draw.buffers;
                pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                pass.set_bind_group(1, &mesh.bind_group, &[]);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

/// Buffers, textures and bind group owned by one render object.
pub struct GpuMesh {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
    material: wgpu::Buffer,
    textures: Vec<GpuTexture>,
    bind_group: wgpu::BindGroup,
}

impl GpuMesh {
    fn destroy(self) {
        self.vertex.destroy();
        self.index.destroy();
        self.material.destroy();
        for texture in self.textures {
            texture.texture.destroy();
        }
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuTexture {
    fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &TextureImage,
        slot: TextureSlot,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: image.width(),
            height: image.height(),
            depth_or_array_layers: 1,
        };
        // Only the diffuse map holds colour; the others are raw data.
        let format = match slot {
            TextureSlot::Diffuse => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureSlot::Specular | TextureSlot::Normal => wgpu::TextureFormat::Rgba8Unorm,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{}-texture", slot.label())),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.pixels(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width()),
                rows_per_image: Some(image.height()),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// 1x1 textures bound when an object has no map for a slot.
struct FallbackTextures {
    diffuse: GpuTexture,
    specular: GpuTexture,
    normal: GpuTexture,
}

impl FallbackTextures {
    fn create(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            diffuse: GpuTexture::upload(
                device,
                queue,
                &TextureImage::solid([255, 255, 255, 255]),
                TextureSlot::Diffuse,
            ),
            specular: GpuTexture::upload(
                device,
                queue,
                &TextureImage::solid([255, 255, 255, 255]),
                TextureSlot::Specular,
            ),
            normal: GpuTexture::upload(
                device,
                queue,
                &TextureImage::solid([128, 128, 255, 255]),
                TextureSlot::Normal,
            ),
        }
    }

    fn view(&self, slot: TextureSlot) -> &wgpu::TextureView {
        match slot {
            TextureSlot::Diffuse => &self.diffuse.view,
            TextureSlot::Specular => &self.specular.view,
            TextureSlot::Normal => &self.normal.view,
        }
    }
}

pub(crate) struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    pub(crate) const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

/// Byte stride of one interleaved vertex.
pub(crate) const VERTEX_STRIDE: u64 = (FLOATS_PER_VERTEX * std::mem::size_of::<f32>()) as u64;

pub(crate) fn uniform_size<T>() -> Option<NonZeroU64> {
    NonZeroU64::new(std::mem::size_of::<T>() as u64)
}

pub(crate) const SHADER: &str = r#"
struct Globals {
    projection: mat4x4<f32>,
    model_view: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_position: vec4<f32>,
    light_color: vec4<f32>,
    ambient: vec4<f32>,
    ambient_reflectivity: vec4<f32>,
    objects_color: vec4<f32>,
}

struct Material {
    diffuse: vec4<f32>,
    specular: vec4<f32>,
    flags: vec4<u32>,
}

@group(0) @binding(0)
var<uniform> globals: Globals;

@group(1) @binding(0)
var<uniform> material: Material;
@group(1) @binding(1)
var diffuse_map: texture_2d<f32>;
@group(1) @binding(2)
var specular_map: texture_2d<f32>;
@group(1) @binding(3)
var normal_map: texture_2d<f32>;
@group(1) @binding(4)
var map_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) view_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let view_position = globals.model_view * vec4<f32>(input.position, 1.0);
    out.clip_position = globals.projection * view_position;
    out.view_position = view_position.xyz;
    out.normal = (globals.normal_matrix * vec4<f32>(input.normal, 0.0)).xyz;
    out.uv = input.uv;
    return out;
}

// Tangent frame from screen-space derivatives, no per-vertex tangents needed.
fn perturb_normal(n: vec3<f32>, position: vec3<f32>, uv: vec2<f32>, sampled: vec3<f32>) -> vec3<f32> {
    let dp1 = dpdx(position);
    let dp2 = dpdy(position);
    let duv1 = dpdx(uv);
    let duv2 = dpdy(uv);
    let dp2perp = cross(dp2, n);
    let dp1perp = cross(n, dp1);
    let t = dp2perp * duv1.x + dp1perp * duv2.x;
    let b = dp2perp * duv1.y + dp1perp * duv2.y;
    let scale = inverseSqrt(max(max(dot(t, t), dot(b, b)), 1e-12));
    let tbn = mat3x3<f32>(t * scale, b * scale, n);
    return normalize(tbn * (sampled * 2.0 - 1.0));
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let diffuse_sample = textureSample(diffuse_map, map_sampler, input.uv);
    let specular_sample = textureSample(specular_map, map_sampler, input.uv);
    let normal_sample = textureSample(normal_map, map_sampler, input.uv);

    let geometric = normalize(input.normal);
    let mapped = perturb_normal(geometric, input.view_position, input.uv, normal_sample.xyz);
    let n = select(geometric, mapped, material.flags.z != 0u);

    var base = material.diffuse.rgb;
    base = select(base, base * diffuse_sample.rgb, material.flags.x != 0u);
    base = select(base, globals.objects_color.rgb, material.flags.w != 0u);

    let light_dir = normalize(globals.light_position.xyz - input.view_position);
    let view_dir = normalize(-input.view_position);
    let reflect_dir = reflect(-light_dir, n);

    let ambient = globals.ambient.rgb * globals.ambient.w * globals.ambient_reflectivity.rgb;
    let diffuse = max(dot(n, light_dir), 0.0) * globals.light_color.rgb;

    var specular_color = material.specular.rgb;
    specular_color = select(specular_color, specular_color * specular_sample.rgb, material.flags.y != 0u);
    let shine = pow(max(dot(view_dir, reflect_dir), 0.0), max(material.specular.w, 1.0));
    let specular = shine * specular_color * globals.light_color.rgb;

    return vec4<f32>((ambient + diffuse) * base + specular, material.diffuse.a);
}
"#;
