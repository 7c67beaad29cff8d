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
use density::{DensityBuffer, DensityParams};
use gpu::{Gpu, GpuError};
use graph_buffers::{
    AttributeBuffer, EdgeBuffer, PinMaskBuffer, PositionBuffer, SimUniformData, UniformBuffer,
};
use log::trace;
use std::{mem, num::NonZeroU64};

pub const WORKGROUP_SIZE: u32 = 256;

fn workgroups(count: u32) -> u32 {
    ((count + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE).max(1)
}

const VEC2_SIZE: wgpu::BufferAddress = (2 * mem::size_of::<f32>()) as wgpu::BufferAddress;

// Binding indices shared with forces.wgsl.
const B_SIM: u32 = 0;
const B_POS_X: u32 = 1;
const B_POS_Y: u32 = 2;
const B_ATTRS: u32 = 3;
const B_FORCE: u32 = 4;
const B_VELOCITY: u32 = 5;
const B_OUT_X: u32 = 6;
const B_OUT_Y: u32 = 7;
const B_PIN: u32 = 8;
const B_FWD_OFFSETS: u32 = 9;
const B_FWD_TARGETS: u32 = 10;
const B_INV_OFFSETS: u32 = 11;
const B_INV_SOURCES: u32 = 12;
const B_GRID: u32 = 13;
const B_CELLS: u32 = 14;

fn uniform_entry(binding: u32, size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(size as u64),
        },
        count: None,
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

struct PassSet {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    groups: Option<[wgpu::BindGroup; 2]>,
}

impl PassSet {
    fn new(
        gpu: &Gpu,
        module: &wgpu::ShaderModule,
        entry_point: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> Self {
        let layout = gpu
            .device()
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("hg-{}-bind-group-layout", entry_point)),
                entries,
            });
        let pipeline = gpu
            .device()
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&format!("hg-{}-pipeline", entry_point)),
                layout: Some(&gpu.device().create_pipeline_layout(
                    &wgpu::PipelineLayoutDescriptor {
                        label: Some(&format!("hg-{}-pipeline-layout", entry_point)),
                        bind_group_layouts: &[&layout],
                        push_constant_ranges: &[],
                    },
                )),
                module,
                entry_point,
            });
        Self {
            layout,
            pipeline,
            groups: None,
        }
    }
}

/// The per-tick compute pass set: repulsion, both spring halves, gravity,
/// integration. Owns the simulation uniform block plus the velocity and
/// force accumulators.
#[derive(Debug)]
pub struct LayoutBuffer {
    sim_uniform: UniformBuffer<SimUniformData>,
    velocities: wgpu::Buffer,
    forces: wgpu::Buffer,
    capacity: usize,
    repulsion: PassSet,
    spring_forward: PassSet,
    spring_reverse: PassSet,
    gravity: PassSet,
    integrate: PassSet,
}

impl std::fmt::Debug for PassSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PassSet").finish_non_exhaustive()
    }
}

impl LayoutBuffer {
    pub fn new(gpu: &Gpu, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let module = gpu.create_shader_module("forces.wgsl", include_str!("forces.wgsl"));

        let sim_size = mem::size_of::<SimUniformData>();
        let grid_size = mem::size_of::<DensityParams>();
        let repulsion = PassSet::new(
            gpu,
            &module,
            "repulsion",
            &[
                uniform_entry(B_SIM, sim_size),
                storage_entry(B_POS_X, true),
                storage_entry(B_POS_Y, true),
                storage_entry(B_ATTRS, true),
                storage_entry(B_FORCE, false),
                uniform_entry(B_GRID, grid_size),
                storage_entry(B_CELLS, true),
            ],
        );
        let spring_forward = PassSet::new(
            gpu,
            &module,
            "spring_forward",
            &[
                uniform_entry(B_SIM, sim_size),
                storage_entry(B_POS_X, true),
                storage_entry(B_POS_Y, true),
                storage_entry(B_ATTRS, true),
                storage_entry(B_FORCE, false),
                storage_entry(B_FWD_OFFSETS, true),
                storage_entry(B_FWD_TARGETS, true),
            ],
        );
        let spring_reverse = PassSet::new(
            gpu,
            &module,
            "spring_reverse",
            &[
                uniform_entry(B_SIM, sim_size),
                storage_entry(B_POS_X, true),
                storage_entry(B_POS_Y, true),
                storage_entry(B_ATTRS, true),
                storage_entry(B_FORCE, false),
                storage_entry(B_INV_OFFSETS, true),
                storage_entry(B_INV_SOURCES, true),
            ],
        );
        let gravity = PassSet::new(
            gpu,
            &module,
            "center_gravity",
            &[
                uniform_entry(B_SIM, sim_size),
                storage_entry(B_POS_X, true),
                storage_entry(B_POS_Y, true),
                storage_entry(B_ATTRS, true),
                storage_entry(B_FORCE, false),
            ],
        );
        let integrate = PassSet::new(
            gpu,
            &module,
            "integrate",
            &[
                uniform_entry(B_SIM, sim_size),
                storage_entry(B_POS_X, true),
                storage_entry(B_POS_Y, true),
                storage_entry(B_FORCE, false),
                storage_entry(B_VELOCITY, false),
                storage_entry(B_OUT_X, false),
                storage_entry(B_OUT_Y, false),
                storage_entry(B_PIN, true),
            ],
        );

        Self {
            sim_uniform: UniformBuffer::new(gpu, "hg-sim-uniforms", SimUniformData::default()),
            velocities: Self::create_accumulator(gpu, "hg-velocity", capacity),
            forces: Self::create_accumulator(gpu, "hg-force", capacity),
            capacity,
            repulsion,
            spring_forward,
            spring_reverse,
            gravity,
            integrate,
        }
    }

    fn create_accumulator(gpu: &Gpu, label: &str, capacity: usize) -> wgpu::Buffer {
        // wgpu zero-initializes; a fresh accumulator starts at rest.
        gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity as wgpu::BufferAddress * VEC2_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    pub fn sim_uniform(&self) -> &UniformBuffer<SimUniformData> {
        &self.sim_uniform
    }

    pub fn sim_uniform_mut(&mut self) -> &mut UniformBuffer<SimUniformData> {
        &mut self.sim_uniform
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grow the velocity/force accumulators. Contents restart from rest,
    /// which matches a topology change perturbing the layout anyway.
    /// Returns true when bind groups must be rebuilt.
    pub fn ensure_capacity(&mut self, gpu: &Gpu, required: usize) -> bool {
        if required <= self.capacity {
            return false;
        }
        self.capacity = graph_buffers::grown_capacity(self.capacity, required);
        trace!("layout accumulators -> {} slots", self.capacity);
        self.velocities = Self::create_accumulator(gpu, "hg-velocity", self.capacity);
        self.forces = Self::create_accumulator(gpu, "hg-force", self.capacity);
        true
    }

    /// Rebuild every parity bind group against the current buffer set.
    #[allow(clippy::too_many_arguments)]
    pub fn rebuild_bind_groups(
        &mut self,
        gpu: &Gpu,
        positions: &PositionBuffer,
        node_attrs: &AttributeBuffer,
        edges: &EdgeBuffer,
        pin_mask: &PinMaskBuffer,
        density: &DensityBuffer,
    ) {
        fn entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry {
            wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            }
        }
        let make = |pass: &PassSet, label: &str, parity: usize| {
            let read_x = positions.x().side(parity);
            let read_y = positions.y().side(parity);
            let write_x = positions.x().side(1 - parity);
            let write_y = positions.y().side(1 - parity);
            let mut entries: Vec<wgpu::BindGroupEntry> =
                vec![entry(B_SIM, self.sim_uniform.buffer())];
            match label {
                "repulsion" => {
                    entries.push(entry(B_POS_X, read_x));
                    entries.push(entry(B_POS_Y, read_y));
                    entries.push(entry(B_ATTRS, node_attrs.buffer()));
                    entries.push(entry(B_FORCE, &self.forces));
                    entries.push(entry(B_GRID, density.params_buffer()));
                    entries.push(entry(B_CELLS, density.cells_buffer()));
                }
                "spring_forward" => {
                    entries.push(entry(B_POS_X, read_x));
                    entries.push(entry(B_POS_Y, read_y));
                    entries.push(entry(B_ATTRS, node_attrs.buffer()));
                    entries.push(entry(B_FORCE, &self.forces));
                    entries.push(entry(B_FWD_OFFSETS, edges.forward_offsets()));
                    entries.push(entry(B_FWD_TARGETS, edges.forward_targets()));
                }
                "spring_reverse" => {
                    entries.push(entry(B_POS_X, read_x));
                    entries.push(entry(B_POS_Y, read_y));
                    entries.push(entry(B_ATTRS, node_attrs.buffer()));
                    entries.push(entry(B_FORCE, &self.forces));
                    entries.push(entry(B_INV_OFFSETS, edges.inverse_offsets()));
                    entries.push(entry(B_INV_SOURCES, edges.inverse_sources()));
                }
                "center_gravity" => {
                    entries.push(entry(B_POS_X, read_x));
                    entries.push(entry(B_POS_Y, read_y));
                    entries.push(entry(B_ATTRS, node_attrs.buffer()));
                    entries.push(entry(B_FORCE, &self.forces));
                }
                "integrate" => {
                    entries.push(entry(B_POS_X, read_x));
                    entries.push(entry(B_POS_Y, read_y));
                    entries.push(entry(B_FORCE, &self.forces));
                    entries.push(entry(B_VELOCITY, &self.velocities));
                    entries.push(entry(B_OUT_X, write_x));
                    entries.push(entry(B_OUT_Y, write_y));
                    entries.push(entry(B_PIN, pin_mask.buffer()));
                }
                _ => unreachable!("unknown pass {}", label),
            }
            gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("hg-{}-bind-group-{}", label, parity)),
                layout: &pass.layout,
                entries: &entries,
            })
        };
        for (pass_name, index) in [
            ("repulsion", 0usize),
            ("spring_forward", 1),
            ("spring_reverse", 2),
            ("center_gravity", 3),
            ("integrate", 4),
        ] {
            let groups = {
                let pass = match index {
                    0 => &self.repulsion,
                    1 => &self.spring_forward,
                    2 => &self.spring_reverse,
                    3 => &self.gravity,
                    _ => &self.integrate,
                };
                [make(pass, pass_name, 0), make(pass, pass_name, 1)]
            };
            match index {
                0 => self.repulsion.groups = Some(groups),
                1 => self.spring_forward.groups = Some(groups),
                2 => self.spring_reverse.groups = Some(groups),
                3 => self.gravity.groups = Some(groups),
                _ => self.integrate.groups = Some(groups),
            }
        }
        trace!("layout bind groups rebuilt");
    }

    pub fn upload_if_dirty(&mut self, gpu: &Gpu) {
        self.sim_uniform.upload_if_dirty(gpu);
    }

    /// Encode one simulation tick. `parity` names the position read side;
    /// spring passes are skipped for edgeless graphs.
    pub fn encode_tick(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        parity: usize,
        node_high_water: u32,
        edge_count: u32,
    ) {
        let passes: [(&PassSet, bool); 5] = [
            (&self.repulsion, true),
            (&self.spring_forward, edge_count > 0),
            (&self.spring_reverse, edge_count > 0),
            (&self.gravity, true),
            (&self.integrate, true),
        ];
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("hg-simulation-tick"),
        });
        for (pass, enabled) in passes {
            if !enabled {
                continue;
            }
            let groups = match &pass.groups {
                Some(groups) => groups,
                None => return,
            };
            cpass.set_pipeline(&pass.pipeline);
            cpass.set_bind_group(0, &groups[parity], &[]);
            cpass.dispatch_workgroups(workgroups(node_high_water), 1, 1);
        }
    }

    /// Read the velocity accumulator back and reduce to the mean-squared
    /// velocity over `live_count` nodes. A suspension point; callers sample
    /// sparsely.
    pub fn read_mean_squared_velocity(
        &self,
        gpu: &Gpu,
        node_high_water: u32,
        live_count: u32,
    ) -> Result<f32, GpuError> {
        if live_count == 0 || node_high_water == 0 {
            return Ok(0.0);
        }
        let bytes = gpu.read_buffer(
            &self.velocities,
            0,
            node_high_water as wgpu::BufferAddress * VEC2_SIZE,
        )?;
        let mut sum = 0.0f64;
        for pair in bytes.chunks_exact(8) {
            let vx = f32::from_le_bytes(pair[0..4].try_into().expect("chunked"));
            let vy = f32::from_le_bytes(pair[4..8].try_into().expect("chunked"));
            sum += (vx * vx + vy * vy) as f64;
        }
        Ok((sum / live_count as f64) as f32)
    }
}
