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
use gpu::Gpu;
use graph_buffers::{AttributeBuffer, PositionBuffer, UniformBuffer};
use log::trace;
use static_assertions::const_assert_eq;
use std::{mem, num::NonZeroU64};
use zerocopy::{AsBytes, FromBytes};

pub const DEFAULT_GRID_DIM: u32 = 256;
const SPLAT_WORKGROUP: u32 = 256;
const RESOLVE_WORKGROUP: u32 = 16;

fn workgroups(count: u32, size: u32) -> u32 {
    ((count + size - 1) / size).max(1)
}

/// World-to-grid mapping for the density field.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes)]
pub struct DensityParams {
    pub min_x: f32,
    pub min_y: f32,
    pub inv_cell_w: f32,
    pub inv_cell_h: f32,
    pub grid_w: f32,
    pub grid_h: f32,
    pub fixed_scale: f32,
    pub node_count: f32,
}
const_assert_eq!(mem::size_of::<DensityParams>(), 32);

impl Default for DensityParams {
    fn default() -> Self {
        Self {
            min_x: -512.0,
            min_y: -512.0,
            inv_cell_w: DEFAULT_GRID_DIM as f32 / 1024.0,
            inv_cell_h: DEFAULT_GRID_DIM as f32 / 1024.0,
            grid_w: DEFAULT_GRID_DIM as f32,
            grid_h: DEFAULT_GRID_DIM as f32,
            fixed_scale: 256.0,
            node_count: 0.0,
        }
    }
}

/// Uniform-grid node density, rebuilt every simulation tick.
///
/// The fixed-point cell buffer feeds the repulsion kernel directly; the
/// resolved r32float texture is handed to overlay layers just-in-time.
#[derive(Debug)]
pub struct DensityBuffer {
    grid_dim: (u32, u32),
    params: UniformBuffer<DensityParams>,
    cells: wgpu::Buffer,
    texture: wgpu::Texture,
    texture_view: wgpu::TextureView,
    common_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    splat_pipeline: wgpu::ComputePipeline,
    resolve_pipeline: wgpu::ComputePipeline,
    common_bind_groups: Option<[wgpu::BindGroup; 2]>,
    texture_bind_group: wgpu::BindGroup,
}

impl DensityBuffer {
    pub fn new(gpu: &Gpu, grid_dim: (u32, u32)) -> Self {
        let cell_count = (grid_dim.0 * grid_dim.1) as wgpu::BufferAddress;
        let cells = gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("hg-density-cells"),
            size: cell_count * mem::size_of::<u32>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("hg-density-texture"),
            size: wgpu::Extent3d {
                width: grid_dim.0,
                height: grid_dim.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        });
        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut params_data = DensityParams::default();
        params_data.grid_w = grid_dim.0 as f32;
        params_data.grid_h = grid_dim.1 as f32;
        let params = UniformBuffer::new(gpu, "hg-density-params", params_data);

        let common_layout =
            gpu.device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("hg-density-bind-group-layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: NonZeroU64::new(
                                    mem::size_of::<DensityParams>() as u64
                                ),
                            },
                            count: None,
                        },
                        Self::storage_entry(1, true),
                        Self::storage_entry(2, true),
                        Self::storage_entry(3, true),
                        Self::storage_entry(4, false),
                    ],
                });
        let texture_layout =
            gpu.device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("hg-density-texture-layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: wgpu::TextureFormat::R32Float,
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: None,
                    }],
                });

        let module = gpu.create_shader_module("density.wgsl", include_str!("density.wgsl"));
        let splat_pipeline =
            gpu.device()
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("hg-density-splat-pipeline"),
                    layout: Some(&gpu.device().create_pipeline_layout(
                        &wgpu::PipelineLayoutDescriptor {
                            label: Some("hg-density-splat-pipeline-layout"),
                            bind_group_layouts: &[&common_layout],
                            push_constant_ranges: &[],
                        },
                    )),
                    module: &module,
                    entry_point: "splat",
                });
        let resolve_pipeline =
            gpu.device()
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("hg-density-resolve-pipeline"),
                    layout: Some(&gpu.device().create_pipeline_layout(
                        &wgpu::PipelineLayoutDescriptor {
                            label: Some("hg-density-resolve-pipeline-layout"),
                            bind_group_layouts: &[&common_layout, &texture_layout],
                            push_constant_ranges: &[],
                        },
                    )),
                    module: &module,
                    entry_point: "resolve",
                });

        let texture_bind_group = gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("hg-density-texture-bind-group"),
            layout: &texture_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&texture_view),
            }],
        });

        Self {
            grid_dim,
            params,
            cells,
            texture,
            texture_view,
            common_layout,
            texture_layout,
            splat_pipeline,
            resolve_pipeline,
            common_bind_groups: None,
            texture_bind_group,
        }
    }

    fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }

    pub fn grid_dim(&self) -> (u32, u32) {
        self.grid_dim
    }

    pub fn cells_buffer(&self) -> &wgpu::Buffer {
        &self.cells
    }

    pub fn params_buffer(&self) -> &wgpu::Buffer {
        self.params.buffer()
    }

    pub fn params(&self) -> &DensityParams {
        self.params.value()
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn texture_view(&self) -> &wgpu::TextureView {
        &self.texture_view
    }

    /// Point the world window at `center ± half_extent` and record the live
    /// node count for the splat dispatch.
    pub fn set_world_window(&mut self, center: (f32, f32), half_extent: f32, node_count: u32) {
        let half_extent = half_extent.max(1.0);
        let (grid_w, grid_h) = (self.grid_dim.0 as f32, self.grid_dim.1 as f32);
        self.params.modify(|p| {
            p.min_x = center.0 - half_extent;
            p.min_y = center.1 - half_extent;
            p.inv_cell_w = grid_w / (half_extent * 2.0);
            p.inv_cell_h = grid_h / (half_extent * 2.0);
            p.node_count = node_count as f32;
        });
    }

    /// Rebuild the parity bind groups after any referenced buffer was
    /// re-created.
    pub fn rebuild_bind_groups(
        &mut self,
        gpu: &Gpu,
        positions: &PositionBuffer,
        node_attrs: &AttributeBuffer,
    ) {
        let make = |parity: usize| {
            gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("hg-density-bind-group"),
                layout: &self.common_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.params.buffer().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: positions.x().side(parity).as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: positions.y().side(parity).as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: node_attrs.buffer().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: self.cells.as_entire_binding(),
                    },
                ],
            })
        };
        self.common_bind_groups = Some([make(0), make(1)]);
        trace!("density bind groups rebuilt");
    }

    pub fn upload_if_dirty(&mut self, gpu: &Gpu) {
        self.params.upload_if_dirty(gpu);
    }

    /// Clear, splat and resolve for this tick. `parity` selects the
    /// position read side.
    pub fn encode_update(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        parity: usize,
        node_high_water: u32,
    ) {
        let bind_groups = match &self.common_bind_groups {
            Some(groups) => groups,
            None => return,
        };
        encoder.clear_buffer(&self.cells, 0, None);
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("hg-density-splat-pass"),
            });
            cpass.set_pipeline(&self.splat_pipeline);
            cpass.set_bind_group(0, &bind_groups[parity], &[]);
            cpass.dispatch_workgroups(workgroups(node_high_water, SPLAT_WORKGROUP), 1, 1);
        }
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("hg-density-resolve-pass"),
            });
            cpass.set_pipeline(&self.resolve_pipeline);
            cpass.set_bind_group(0, &bind_groups[parity], &[]);
            cpass.set_bind_group(1, &self.texture_bind_group, &[]);
            cpass.dispatch_workgroups(
                workgroups(self.grid_dim.0, RESOLVE_WORKGROUP),
                workgroups(self.grid_dim.1, RESOLVE_WORKGROUP),
                1,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_record_is_eight_floats() {
        assert_eq!(mem::size_of::<DensityParams>(), 8 * 4);
    }

    #[test]
    fn world_window_math_is_invertible() {
        let p = DensityParams::default();
        // Cell of the window minimum is (0, 0); the far corner lands on the
        // last cell.
        let cx = (p.min_x + 1023.9 - p.min_x) * p.inv_cell_w;
        assert!(cx < p.grid_w && cx >= p.grid_w - 1.0);
    }
}
