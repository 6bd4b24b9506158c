use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::assets::lut::Lut3d;
use crate::foundation::core::Extent;
use crate::foundation::error::{CamflowError, CamflowResult};
use crate::render::{
    BackendKind, DrawPass, FrameRGBA, RenderBackend, ResourceLedger, TrackedResource,
};
use crate::stage::transform::DisplayTransform;

const PARAMS_SIZE: u64 = 64;

const SHADER: &str = r#"
struct Params {
  inv_abcd: vec4<f32>,
  // e, f, mode, lut size
  inv_ef_mode_lut: vec4<f32>,
  clear: vec4<f32>,
  // target w, h, source w, h
  sizes: vec4<f32>,
};

@group(0) @binding(0) var t_src: texture_2d<f32>;
@group(0) @binding(1) var t_lut: texture_3d<f32>;
@group(0) @binding(2) var s_lut: sampler;
@group(0) @binding(3) var<uniform> params: Params;

@vertex
fn vs(@builtin(vertex_index) vi: u32) -> @builtin(position) vec4<f32> {
  var p = array<vec2<f32>, 3>(
    vec2<f32>(-1.0, -1.0),
    vec2<f32>( 3.0, -1.0),
    vec2<f32>(-1.0,  3.0),
  );
  return vec4<f32>(p[vi], 0.0, 1.0);
}

@fragment
fn fs(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
  let target_size = params.sizes.xy;
  let src_size = params.sizes.zw;
  let ndc = frag.xy / target_size * 2.0 - vec2<f32>(1.0, 1.0);
  let m = params.inv_abcd;
  let q = vec2<f32>(
    m.x * ndc.x + m.z * ndc.y + params.inv_ef_mode_lut.x,
    m.y * ndc.x + m.w * ndc.y + params.inv_ef_mode_lut.y,
  );
  if (abs(q.x) > 1.0 || abs(q.y) > 1.0) {
    return params.clear;
  }
  let uv = (q + vec2<f32>(1.0, 1.0)) * 0.5;
  let max_texel = vec2<i32>(src_size) - vec2<i32>(1, 1);
  let texel = min(vec2<i32>(uv * src_size), max_texel);
  var c = textureLoad(t_src, texel, 0);

  if (params.inv_ef_mode_lut.z > 1.5) {
    let n = params.inv_ef_mode_lut.w;
    let coord = (c.rgb * (n - 1.0) + vec3<f32>(0.5, 0.5, 0.5)) / n;
    c = vec4<f32>(textureSampleLevel(t_lut, s_lut, coord, 0.0).rgb, c.a);
  }
  return c;
}
"#;

struct Pipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    params: wgpu::Buffer,
}

struct Texture {
    extent: Extent,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    _tracked: TrackedResource,
}

struct Target {
    texture: Texture,
    readback: wgpu::Buffer,
    readback_bytes_per_row: u32,
    _tracked: TrackedResource,
}

/// `wgpu` backend: draws a full-screen triangle offscreen and reads the result back.
pub struct GpuBackend {
    ledger: ResourceLedger,
    lost: Arc<AtomicBool>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    pipeline: Option<Pipeline>,
    lut: Option<Texture>,
    lut_size: u32,
    source: Option<Texture>,
    source_seq: Option<u64>,
    target: Option<Target>,
    _device_slot: Option<TrackedResource>,
}

impl GpuBackend {
    pub fn new(ledger: ResourceLedger) -> CamflowResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                CamflowError::initialization("no gpu adapter available")
            }
            other => {
                CamflowError::initialization(format!("wgpu request_adapter failed: {other:?}"))
            }
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("camflow_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| CamflowError::initialization(format!("wgpu request_device failed: {e:?}")))?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            if !matches!(reason, wgpu::DeviceLostReason::Destroyed) {
                tracing::error!(?reason, %message, "gpu device lost");
                flag.store(true, Ordering::Release);
            }
        });

        let pipeline = create_pipeline(&device);
        tracing::debug!(adapter = ?adapter.get_info().name, "gpu backend ready");

        Ok(Self {
            _device_slot: Some(ledger.track("gpu_device")),
            ledger,
            lost,
            device: Some(device),
            queue: Some(queue),
            pipeline: Some(pipeline),
            lut: None,
            lut_size: 0,
            source: None,
            source_seq: None,
            target: None,
        })
    }

    fn check_device(&self) -> CamflowResult<(&wgpu::Device, &wgpu::Queue)> {
        if self.lost.load(Ordering::Acquire) {
            return Err(CamflowError::device_lost("gpu device reported loss"));
        }
        match (self.device.as_ref(), self.queue.as_ref()) {
            (Some(d), Some(q)) => Ok((d, q)),
            _ => Err(released()),
        }
    }

    fn upload_source(&mut self, extent: Extent, rgba: &[u8], seq: u64) -> CamflowResult<()> {
        self.check_device()?;
        let (Some(device), Some(queue)) = (&self.device, &self.queue) else {
            return Err(released());
        };
        let stale = self
            .source
            .as_ref()
            .map(|t| t.extent != extent)
            .unwrap_or(true);
        if stale {
            self.source = None;
            let tex = create_texture_2d(
                device,
                &self.ledger,
                "camflow_source",
                extent,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            );
            self.source = Some(tex);
            self.source_seq = None;
        }
        if self.source_seq == Some(seq) {
            return Ok(());
        }
        let tex = self
            .source
            .as_ref()
            .ok_or_else(|| CamflowError::render("source texture missing"))?;
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(extent.width * 4),
                rows_per_image: Some(extent.height),
            },
            wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
        );
        self.source_seq = Some(seq);
        Ok(())
    }

    fn ensure_target(&mut self, extent: Extent) -> CamflowResult<()> {
        if self.target.as_ref().map(|t| t.texture.extent) == Some(extent) {
            return Ok(());
        }
        self.target = None;
        self.check_device()?;
        let Some(device) = &self.device else {
            return Err(released());
        };

        let bytes_per_row_unpadded = extent
            .width
            .checked_mul(4)
            .ok_or_else(|| CamflowError::render("render target width overflow"))?;
        let bytes_per_row = align_to(bytes_per_row_unpadded, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let buffer_size = (bytes_per_row as u64)
            .checked_mul(extent.height as u64)
            .ok_or_else(|| CamflowError::render("readback buffer size overflow"))?;

        let texture = create_texture_2d(
            device,
            &self.ledger,
            "camflow_target",
            extent,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("camflow_readback"),
            size: buffer_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.target = Some(Target {
            texture,
            readback,
            readback_bytes_per_row: bytes_per_row,
            _tracked: self.ledger.track("readback_buffer"),
        });
        Ok(())
    }

    fn map_failure(&self, what: &str, detail: impl std::fmt::Debug) -> CamflowError {
        if self.lost.load(Ordering::Acquire) {
            CamflowError::device_lost(format!("{what}: {detail:?}"))
        } else {
            CamflowError::render(format!("{what}: {detail:?}"))
        }
    }
}

impl RenderBackend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn set_lut(&mut self, lut: Arc<Lut3d>) -> CamflowResult<()> {
        self.check_device()?;
        let (Some(device), Some(queue)) = (&self.device, &self.queue) else {
            return Err(released());
        };
        let n = lut.size();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("camflow_lut"),
            size: wgpu::Extent3d {
                width: n,
                height: n,
                depth_or_array_layers: n,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::Rgba8Unorm,
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
            &lut.to_rgba8_volume(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(n * 4),
                rows_per_image: Some(n),
            },
            wgpu::Extent3d {
                width: n,
                height: n,
                depth_or_array_layers: n,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.lut = None;
        self.lut = Some(Texture {
            extent: Extent::new(n, n),
            texture,
            view,
            _tracked: self.ledger.track("lut_texture"),
        });
        self.lut_size = n;
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all, fields(mode = %pass.mode))]
    fn draw(&mut self, pass: &DrawPass<'_>, target: &mut FrameRGBA) -> CamflowResult<()> {
        let extent = target.extent();
        if extent.is_empty() {
            return Ok(());
        }
        self.check_device()?;

        let Some(src) = pass.source else {
            target.fill(pass.clear_rgba);
            return Ok(());
        };
        if pass.mode.uses_lut() && self.lut.is_none() {
            return Err(CamflowError::render("no lookup table uploaded"));
        }
        self.upload_source(src.extent, &src.rgba, src.seq)?;
        self.ensure_target(extent)?;

        let (device, queue) = self.check_device()?;
        let (Some(pipeline), Some(source), Some(lut), Some(out)) = (
            self.pipeline.as_ref(),
            self.source.as_ref(),
            self.lut.as_ref(),
            self.target.as_ref(),
        ) else {
            return Err(CamflowError::render("gpu backend not initialized"));
        };

        let xf = DisplayTransform::fit(src.extent, src.orientation, extent);
        let [a, b, c, d, e, f] = xf.inverse_coeffs();
        let clear = pass.clear_rgba.map(|v| v as f32 / 255.0);
        let params: [f32; 16] = [
            a as f32,
            b as f32,
            c as f32,
            d as f32,
            e as f32,
            f as f32,
            pass.mode.ordinal() as f32,
            self.lut_size as f32,
            clear[0],
            clear[1],
            clear[2],
            clear[3],
            extent.width as f32,
            extent.height as f32,
            src.extent.width as f32,
            src.extent.height as f32,
        ];
        let mut bytes = [0u8; PARAMS_SIZE as usize];
        for (chunk, v) in bytes.chunks_exact_mut(4).zip(params) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        queue.write_buffer(&pipeline.params, 0, &bytes);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camflow_bg"),
            layout: &pipeline.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&lut.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&pipeline.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: pipeline.params.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("camflow_frame_encoder"),
        });
        {
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("camflow_frame_rp"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &out.texture.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear[0] as f64,
                            g: clear[1] as f64,
                            b: clear[2] as f64,
                            a: clear[3] as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rp.set_pipeline(&pipeline.pipeline);
            rp.set_bind_group(0, &bind_group, &[]);
            rp.draw(0..3, 0..1);
        }
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &out.texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &out.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(out.readback_bytes_per_row),
                    rows_per_image: Some(extent.height),
                },
            },
            wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let buffer_slice = out.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| self.map_failure("wgpu poll failed", e))?;
        rx.recv()
            .map_err(|_| self.map_failure("readback channel closed", ()))?
            .map_err(|e| self.map_failure("readback map failed", e))?;

        let mapped = buffer_slice.get_mapped_range();
        let row_bytes = extent.width as usize * 4;
        let padded_row_bytes = out.readback_bytes_per_row as usize;
        for (row, dst) in target.data.chunks_exact_mut(row_bytes).enumerate() {
            let start = row * padded_row_bytes;
            dst.copy_from_slice(&mapped[start..start + row_bytes]);
        }
        drop(mapped);
        out.readback.unmap();

        self.check_device()?;
        Ok(())
    }

    fn release(&mut self) {
        self.target = None;
        self.source = None;
        self.source_seq = None;
        self.lut = None;
        self.pipeline = None;
        self.queue = None;
        self.device = None;
        self._device_slot = None;
    }
}

fn released() -> CamflowError {
    CamflowError::render("gpu backend already released")
}

fn create_texture_2d(
    device: &wgpu::Device,
    ledger: &ResourceLedger,
    label: &'static str,
    extent: Extent,
    usage: wgpu::TextureUsages,
) -> Texture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: extent.width,
            height: extent.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Texture {
        extent,
        texture,
        view,
        _tracked: ledger.track(label),
    }
}

fn create_pipeline(device: &wgpu::Device) -> Pipeline {
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("camflow_lut_sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    let params = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("camflow_params"),
        size: PARAMS_SIZE,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("camflow_bgl"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D3,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZeroU64::new(PARAMS_SIZE),
                },
                count: None,
            },
        ],
    });

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("camflow_shader"),
        source: wgpu::ShaderSource::Wgsl(SHADER.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("camflow_pl"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("camflow_pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    Pipeline {
        pipeline,
        bind_group_layout,
        sampler,
        params,
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Orientation;
    use crate::frame::import::SourceFrame;
    use crate::stage::EngineMode;

    #[test]
    fn align_to_rounds_up_to_copy_alignment() {
        assert_eq!(align_to(4, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
    }

    #[test]
    fn passthrough_matches_source_when_adapter_present() {
        let ledger = ResourceLedger::new();
        let Ok(mut backend) = GpuBackend::new(ledger.clone()) else {
            return;
        };
        backend.set_lut(Arc::new(Lut3d::identity(4).unwrap())).unwrap();
        let src = SourceFrame {
            extent: Extent::new(8, 8),
            rgba: [200u8, 100, 50, 255].repeat(64),
            orientation: Orientation::IDENTITY,
            seq: 1,
        };
        let mut target = FrameRGBA::new(Extent::new(8, 8));
        let pass = DrawPass {
            mode: EngineMode::CameraBufferPassthrough,
            source: Some(&src),
            clear_rgba: [0, 0, 51, 255],
        };
        backend.draw(&pass, &mut target).unwrap();
        assert_eq!(target.pixel(4, 4), [200, 100, 50, 255]);
        backend.release();
        assert_eq!(ledger.live(), 0);
    }
}
