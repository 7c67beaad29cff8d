// This file is part of HeroineGraph.
//
// HeroineGraph is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// HeroineGraph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with HeroineGraph.  If not, see <http://www.gnu.org/licenses/>.
use futures::executor::block_on;
use log::{debug, info, warn};
use parking_lot::Mutex;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::{borrow::Cow, sync::Arc};
use thiserror::Error;
use wgpu::util::DeviceExt;
use zerocopy::AsBytes;

#[derive(Debug, Error)]
pub enum GpuError {
    /// No modern GPU API is reachable on this host.
    #[error("no compatible gpu adapter is available")]
    Unsupported,
    #[error("the gpu adapter denied the device request: {0}")]
    AdapterDenied(String),
    #[error("the gpu device was lost")]
    DeviceLost,
}

/// Adapter limits the engine cares about, probed once at startup.
#[derive(Clone, Debug)]
pub struct GpuCapabilities {
    pub max_storage_buffer_binding_size: u32,
    pub max_buffer_size: u64,
    pub max_compute_workgroup_size: [u32; 3],
    pub max_compute_invocations_per_workgroup: u32,
    pub max_compute_workgroups_per_dimension: u32,
    pub timestamp_queries: bool,
}

impl GpuCapabilities {
    fn probe(adapter: &wgpu::Adapter) -> Self {
        let limits = adapter.limits();
        Self {
            max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size,
            max_buffer_size: limits.max_buffer_size,
            max_compute_workgroup_size: [
                limits.max_compute_workgroup_size_x,
                limits.max_compute_workgroup_size_y,
                limits.max_compute_workgroup_size_z,
            ],
            max_compute_invocations_per_workgroup: limits.max_compute_invocations_per_workgroup,
            max_compute_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
            timestamp_queries: adapter
                .features()
                .contains(wgpu::Features::TIMESTAMP_QUERY),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GpuConfig {
    pub power_preference: wgpu::PowerPreference,
    pub present_mode: wgpu::PresentMode,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            present_mode: wgpu::PresentMode::Fifo,
        }
    }
}

/// Most recent uncaptured device error, drained by the frame loop so it can
/// be logged against a frame number instead of aborting mid-encode.
#[derive(Default)]
struct ErrorSink {
    message: Mutex<Option<String>>,
}

/// Owns the logical device, queue and (when windowed) the surface
/// configuration agreement with the canvas.
pub struct Gpu {
    _instance: wgpu::Instance,
    surface: Option<wgpu::Surface>,
    _adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    scale_factor: f64,
    caps: GpuCapabilities,
    error_sink: Arc<ErrorSink>,
}

impl Gpu {
    const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    /// Acquire a device against a live window surface. The physical surface
    /// resolution is `logical × scale_factor`.
    pub fn new<W>(
        window: &W,
        logical_size: (u32, u32),
        scale_factor: f64,
        config: GpuConfig,
    ) -> Result<Self, GpuError>
    where
        W: HasRawWindowHandle + HasRawDisplayHandle,
    {
        let instance = wgpu::Instance::new(wgpu::Backends::PRIMARY);
        let surface = unsafe { instance.create_surface(window) };
        let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: config.power_preference,
            force_fallback_adapter: false,
            compatible_surface: Some(&surface),
        }))
        .ok_or(GpuError::Unsupported)?;
        info!("adapter: {:?}", adapter.get_info());

        let (device, queue) = Self::request_device(&adapter)?;
        let caps = GpuCapabilities::probe(&adapter);
        debug!("gpu capabilities: {:?}", caps);

        let format = *surface
            .get_supported_formats(&adapter)
            .first()
            .ok_or(GpuError::Unsupported)?;
        let (width, height) = physical_extent(logical_size, scale_factor);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: config.present_mode,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
        };
        surface.configure(&device, &surface_config);

        let error_sink = Arc::new(ErrorSink::default());
        Self::install_error_hook(&device, &error_sink);

        Ok(Self {
            _instance: instance,
            surface: Some(surface),
            _adapter: adapter,
            device,
            queue,
            surface_config,
            scale_factor,
            caps,
            error_sink,
        })
    }

    /// Acquire a device with no surface at all; rendering goes to offscreen
    /// textures. Used by tests and by embedders that only want readbacks.
    pub fn headless(extent: (u32, u32), config: GpuConfig) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::Backends::PRIMARY);
        let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: config.power_preference,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or(GpuError::Unsupported)?;
        info!("headless adapter: {:?}", adapter.get_info());

        let (device, queue) = Self::request_device(&adapter)?;
        let caps = GpuCapabilities::probe(&adapter);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: Self::OFFSCREEN_FORMAT,
            width: extent.0.max(1),
            height: extent.1.max(1),
            present_mode: config.present_mode,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
        };

        let error_sink = Arc::new(ErrorSink::default());
        Self::install_error_hook(&device, &error_sink);

        Ok(Self {
            _instance: instance,
            surface: None,
            _adapter: adapter,
            device,
            queue,
            surface_config,
            scale_factor: 1.0,
            caps,
            error_sink,
        })
    }

    fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue), GpuError> {
        // Ask for the adapter's own limits so big graphs get the large
        // storage bindings the hardware actually supports.
        block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("hg-device"),
                features: wgpu::Features::empty(),
                limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|e| GpuError::AdapterDenied(e.to_string()))
    }

    fn install_error_hook(device: &wgpu::Device, sink: &Arc<ErrorSink>) {
        let sink = sink.clone();
        device.on_uncaptured_error(move |e| {
            let message = e.to_string();
            warn!("uncaptured gpu error: {}", message);
            *sink.message.lock() = Some(message);
        });
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.caps
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    pub fn is_headless(&self) -> bool {
        self.surface.is_none()
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn physical_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    pub fn logical_size(&self) -> (f32, f32) {
        (
            (self.surface_config.width as f64 / self.scale_factor) as f32,
            (self.surface_config.height as f64 / self.scale_factor) as f32,
        )
    }

    /// Reconfigure the surface at `logical × scale_factor` pixels.
    pub fn resize(&mut self, logical_width: u32, logical_height: u32) {
        let (width, height) = physical_extent((logical_width, logical_height), self.scale_factor);
        self.surface_config.width = width;
        self.surface_config.height = height;
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.surface_config);
        }
    }

    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        let logical = self.logical_size();
        self.scale_factor = scale_factor;
        self.resize(logical.0.round() as u32, logical.1.round() as u32);
    }

    /// Grab the next swapchain image. `Ok(None)` means "skip this frame"
    /// (timeout or headless); lost surfaces are reconfigured and retried
    /// once before reporting device loss.
    pub fn acquire_surface_texture(&mut self) -> Result<Option<wgpu::SurfaceTexture>, GpuError> {
        let surface = match &self.surface {
            Some(surface) => surface,
            None => return Ok(None),
        };
        match surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Timeout) => Ok(None),
            Err(wgpu::SurfaceError::Outdated) | Err(wgpu::SurfaceError::Lost) => {
                surface.configure(&self.device, &self.surface_config);
                match surface.get_current_texture() {
                    Ok(frame) => Ok(Some(frame)),
                    Err(e) => {
                        warn!("surface did not recover after reconfigure: {}", e);
                        Err(GpuError::DeviceLost)
                    }
                }
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(GpuError::DeviceLost),
        }
    }

    /// Create a buffer pre-filled with one record.
    pub fn push_data<T: AsBytes>(
        &self,
        label: &str,
        data: &T,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data.as_bytes(),
                usage,
            })
    }

    /// Create a buffer pre-filled with a slice of records.
    pub fn push_slice<T: AsBytes>(
        &self,
        label: &str,
        data: &[T],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data.as_bytes(),
                usage,
            })
    }

    pub fn create_shader_module(&self, label: &str, source: &str) -> wgpu::ShaderModule {
        self.device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            })
    }

    /// Drain the most recent uncaptured device error, if any fired since the
    /// last call.
    pub fn take_error(&self) -> Option<String> {
        self.error_sink.message.lock().take()
    }

    /// Synchronous readback: copy `size` bytes out of `buffer` through a
    /// staging buffer and block until the map completes. This is the only
    /// place the engine waits on the GPU.
    pub fn read_buffer(
        &self,
        buffer: &wgpu::Buffer,
        offset: wgpu::BufferAddress,
        size: wgpu::BufferAddress,
    ) -> Result<Vec<u8>, GpuError> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("hg-readback-staging"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("hg-readback-encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, offset, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let (tx, rx) = std::sync::mpsc::channel();
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        self.device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {
                let bytes = staging.slice(..).get_mapped_range().to_vec();
                staging.unmap();
                Ok(bytes)
            }
            _ => Err(GpuError::DeviceLost),
        }
    }
}

fn physical_extent(logical: (u32, u32), scale_factor: f64) -> (u32, u32) {
    (
        ((logical.0 as f64 * scale_factor).round() as u32).max(1),
        ((logical.1 as f64 * scale_factor).round() as u32).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_extent_applies_dpr() {
        assert_eq!(physical_extent((800, 600), 2.0), (1600, 1200));
        assert_eq!(physical_extent((801, 601), 1.5), (1202, 902));
        assert_eq!(physical_extent((0, 0), 1.0), (1, 1));
    }

    #[test]
    fn headless_device_is_optional_in_ci() -> Result<(), GpuError> {
        let gpu = match Gpu::headless((64, 64), GpuConfig::default()) {
            Ok(gpu) => gpu,
            // Machines without any adapter skip the rest.
            Err(GpuError::Unsupported) => return Ok(()),
            Err(e) => return Err(e),
        };
        assert!(gpu.is_headless());
        assert!(gpu.capabilities().max_storage_buffer_binding_size > 0);
        Ok(())
    }
}
