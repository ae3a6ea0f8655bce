use std::sync::Arc;

use winit::window::Window;

use crate::error::{RenderError, RenderResult};
use crate::renderer::device::Extent;

/// Where the presented output goes.
pub(crate) enum OutputSurface {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    /// Surface-less device; the output is an ordinary texture.
    Offscreen { texture: wgpu::Texture },
}

pub(crate) struct GpuContext {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) output: OutputSurface,
    pub(crate) output_format: wgpu::TextureFormat,
    pub(crate) size: Extent,
    pub(crate) float32_filterable: bool,
}

pub(crate) const OFFSCREEN_OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

impl GpuContext {
    pub(crate) async fn for_window(window: Arc<Window>) -> RenderResult<Self> {
        let size = window.inner_size();
        let size = Extent::new(size.width.max(1), size.height.max(1));
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|err| RenderError::Surface(err.to_string()))?;
        log::info!("Surface created successfully!");

        let adapter = request_adapter(&instance, Some(&surface)).await?;
        let (device, queue, float32_filterable) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| RenderError::Surface("surface reports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            device,
            queue,
            output: OutputSurface::Window { surface, config },
            output_format: format,
            size,
            float32_filterable,
        })
    }

    pub(crate) async fn offscreen(size: Extent) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = request_adapter(&instance, None).await?;
        let (device, queue, float32_filterable) = request_device(&adapter).await?;
        let texture = offscreen_output(&device, size);
        Ok(Self {
            device,
            queue,
            output: OutputSurface::Offscreen { texture },
            output_format: OFFSCREEN_OUTPUT_FORMAT,
            size,
            float32_filterable,
        })
    }

    pub(crate) fn resize(&mut self, size: Extent) {
        if size.is_empty() {
            return;
        }
        self.size = size;
        match &mut self.output {
            OutputSurface::Window { surface, config } => {
                config.width = size.width;
                config.height = size.height;
                surface.configure(&self.device, config);
            }
            OutputSurface::Offscreen { texture } => {
                *texture = offscreen_output(&self.device, size);
            }
        }
    }
}

fn offscreen_output(device: &wgpu::Device, size: Extent) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("OffscreenOutput"),
        size: wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_OUTPUT_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

async fn request_adapter(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'static>>,
) -> RenderResult<wgpu::Adapter> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|err| RenderError::Device(format!("no suitable adapter: {err}")))?;
    log::info!("Using adapter: {:?}", adapter.get_info());
    log::info!("Using backend: {:?}", adapter.get_info().backend);
    Ok(adapter)
}

async fn request_device(adapter: &wgpu::Adapter) -> RenderResult<(wgpu::Device, wgpu::Queue, bool)> {
    let adapter_features = adapter.features();
    let mut required_features = wgpu::Features::empty();

    let float32_filterable = adapter_features.contains(wgpu::Features::FLOAT32_FILTERABLE);
    if float32_filterable {
        required_features |= wgpu::Features::FLOAT32_FILTERABLE;
    }
    if adapter_features.contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES) {
        required_features |= wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
    }

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("Device"),
            required_features,
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
        .map_err(|err| RenderError::Device(format!("device request failed: {err}")))?;
    Ok((device, queue, float32_filterable))
}
