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
use crate::{storage_entry, uniform_entry};
use gpu::Gpu;
use graph_buffers::{
    AttributeBuffer, EdgeBuffer, EdgeFlowData, PositionBuffer, RenderConfigData,
    ViewportUniformData,
};
use std::mem;

/// Instanced thick-line edges with the PWM flow treatment. Endpoint
/// positions are pulled from the read-side position buffers in the vertex
/// stage.
#[derive(Debug)]
pub struct EdgeDrawPass {
    globals_layout: wgpu::BindGroupLayout,
    data_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    globals_bind_group: Option<wgpu::BindGroup>,
    data_bind_groups: Option<[wgpu::BindGroup; 2]>,
}

impl EdgeDrawPass {
    pub fn new(gpu: &Gpu) -> Self {
        let globals_layout =
            gpu.device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("hg-edge-globals-layout"),
                    entries: &[
                        uniform_entry(
                            0,
                            mem::size_of::<ViewportUniformData>(),
                            wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ),
                        uniform_entry(
                            1,
                            mem::size_of::<RenderConfigData>(),
                            wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ),
                        uniform_entry(
                            2,
                            mem::size_of::<EdgeFlowData>(),
                            wgpu::ShaderStages::FRAGMENT,
                        ),
                    ],
                });
        let data_layout =
            gpu.device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("hg-edge-data-layout"),
                    entries: &[
                        storage_entry(0, wgpu::ShaderStages::VERTEX),
                        storage_entry(1, wgpu::ShaderStages::VERTEX),
                        storage_entry(2, wgpu::ShaderStages::VERTEX),
                        storage_entry(3, wgpu::ShaderStages::VERTEX),
                    ],
                });
        let module = gpu.create_shader_module("edge.wgsl", include_str!("edge.wgsl"));
        let pipeline = gpu
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("hg-edge-pipeline"),
                layout: Some(&gpu.device().create_pipeline_layout(
                    &wgpu::PipelineLayoutDescriptor {
                        label: Some("hg-edge-pipeline-layout"),
                        bind_group_layouts: &[&globals_layout, &data_layout],
                        push_constant_ranges: &[],
                    },
                )),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: "vs_main",
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: gpu.surface_format(),
                        blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });
        Self {
            globals_layout,
            data_layout,
            pipeline,
            globals_bind_group: None,
            data_bind_groups: None,
        }
    }

    pub fn rebuild_globals(
        &mut self,
        gpu: &Gpu,
        viewport_uniform: &wgpu::Buffer,
        config_uniform: &wgpu::Buffer,
        flow_uniform: &wgpu::Buffer,
    ) {
        self.globals_bind_group = Some(gpu.device().create_bind_group(
            &wgpu::BindGroupDescriptor {
                label: Some("hg-edge-globals-bind-group"),
                layout: &self.globals_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: viewport_uniform.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: config_uniform.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: flow_uniform.as_entire_binding(),
                    },
                ],
            },
        ));
    }

    pub fn rebuild_data(
        &mut self,
        gpu: &Gpu,
        positions: &PositionBuffer,
        edges: &EdgeBuffer,
        edge_attrs: &AttributeBuffer,
    ) {
        let make = |parity: usize| {
            gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("hg-edge-data-bind-group"),
                layout: &self.data_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: positions.x().side(parity).as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: positions.y().side(parity).as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: edges.endpoints().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: edge_attrs.buffer().as_entire_binding(),
                    },
                ],
            })
        };
        self.data_bind_groups = Some([make(0), make(1)]);
    }

    pub fn draw<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>, parity: usize, instances: u32) {
        let (globals, data) = match (&self.globals_bind_group, &self.data_bind_groups) {
            (Some(globals), Some(data)) => (globals, data),
            _ => return,
        };
        if instances == 0 {
            return;
        }
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, globals, &[]);
        rpass.set_bind_group(1, &data[parity], &[]);
        rpass.draw(0..6, 0..instances);
    }
}
