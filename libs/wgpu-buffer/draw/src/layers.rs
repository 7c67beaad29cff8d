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
use anyhow::{bail, Result};
use density::{DensityBuffer, DensityParams};
use gpu::Gpu;
use graph_buffers::{PositionBuffer, ViewportUniformData};
use log::debug;
use static_assertions::const_assert_eq;
use std::mem;
use zerocopy::{AsBytes, FromBytes};

/// Labels always render above everything; other overlays slot in between
/// the edge and node passes by order.
pub const LABEL_ORDER: i32 = 100;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LayerKind {
    Heatmap,
    Contour,
    Metaball,
    Labels,
    Custom,
}

#[derive(Copy, Clone, Debug)]
pub struct HeatmapConfig {
    pub intensity: f32,
    pub opacity: f32,
    pub cold_color: [f32; 4],
    pub hot_color: [f32; 4],
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            intensity: 0.08,
            opacity: 0.85,
            cold_color: [0.05, 0.12, 0.45, 0.0],
            hot_color: [1.0, 0.35, 0.1, 1.0],
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct MetaballConfig {
    pub threshold: f32,
    pub smoothness: f32,
    pub opacity: f32,
    pub color: [f32; 4],
}

impl Default for MetaballConfig {
    fn default() -> Self {
        Self {
            threshold: 8.0,
            smoothness: 3.0,
            opacity: 0.75,
            color: [0.25, 0.65, 0.9, 1.0],
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct ContourConfig {
    pub interval: f32,
    pub thickness: f32,
    pub brightness: f32,
    pub color: [f32; 4],
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            interval: 5.0,
            thickness: 1.5,
            brightness: 0.9,
            color: [0.85, 0.85, 0.95, 1.0],
        }
    }
}

/// Shared uniform record for the three density-field overlays; the
/// fragment entry point decides how to read it.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes)]
pub struct FieldConfigData {
    pub params0: [f32; 4],
    pub color_a: [f32; 4],
    pub color_b: [f32; 4],
}
const_assert_eq!(mem::size_of::<FieldConfigData>(), 48);

impl From<HeatmapConfig> for FieldConfigData {
    fn from(c: HeatmapConfig) -> Self {
        Self {
            params0: [c.intensity, c.opacity, 0.0, 0.0],
            color_a: c.cold_color,
            color_b: c.hot_color,
        }
    }
}

impl From<MetaballConfig> for FieldConfigData {
    fn from(c: MetaballConfig) -> Self {
        Self {
            params0: [c.threshold, c.smoothness, c.opacity, 0.0],
            color_a: c.color,
            color_b: [0.0; 4],
        }
    }
}

impl From<ContourConfig> for FieldConfigData {
    fn from(c: ContourConfig) -> Self {
        Self {
            params0: [c.interval, c.thickness, c.brightness, 0.0],
            color_a: c.color,
            color_b: [0.0; 4],
        }
    }
}

/// One prepared label quad. Glyph shaping and atlas packing are the
/// embedder's problem; the engine just places instances at node anchors.
#[repr(C)]
#[derive(Copy, Clone, Debug, AsBytes, FromBytes)]
pub struct GlyphInstance {
    /// offset_x, offset_y, width, height (logical px relative to the node)
    pub placement: [f32; 4],
    /// uv_min.xy, uv_max.xy
    pub uv_rect: [f32; 4],
    pub color: [f32; 4],
    /// node_slot (as float), reserved ×3
    pub anchor: [f32; 4],
}
const_assert_eq!(mem::size_of::<GlyphInstance>(), 64);

impl GlyphInstance {
    pub fn new(node_slot: u32, placement: [f32; 4], uv_rect: [f32; 4], color: [f32; 4]) -> Self {
        Self {
            placement,
            uv_rect,
            color,
            anchor: [node_slot as f32, 0.0, 0.0, 0.0],
        }
    }
}

/// Configuration payload accepted by [LayerManager::enable] and
/// [LayerManager::set_config].
pub enum LayerConfig {
    Heatmap(HeatmapConfig),
    Contour(ContourConfig),
    Metaball(MetaballConfig),
    Labels,
    Custom(CustomLayerCallback),
}

impl LayerConfig {
    fn kind(&self) -> LayerKind {
        match self {
            Self::Heatmap(_) => LayerKind::Heatmap,
            Self::Contour(_) => LayerKind::Contour,
            Self::Metaball(_) => LayerKind::Metaball,
            Self::Labels => LayerKind::Labels,
            Self::Custom(_) => LayerKind::Custom,
        }
    }
}

pub type CustomLayerCallback = Box<dyn FnMut(&mut wgpu::CommandEncoder, &wgpu::TextureView)>;

/// Resources an overlay needs when it is (re)wired to the GPU state.
pub struct LayerResources<'a> {
    pub viewport_uniform: &'a wgpu::Buffer,
    pub density: &'a DensityBuffer,
    pub positions: &'a PositionBuffer,
}

fn default_order(kind: LayerKind) -> i32 {
    match kind {
        LayerKind::Heatmap => 10,
        LayerKind::Metaball => 20,
        LayerKind::Contour => 30,
        LayerKind::Custom => 50,
        LayerKind::Labels => LABEL_ORDER,
    }
}

// ----------------------------------------------------------------------
// Density-field overlays (heatmap / metaball / contour)
// ----------------------------------------------------------------------

struct FieldLayer {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    config: wgpu::Buffer,
    bind_group: Option<wgpu::BindGroup>,
}

impl FieldLayer {
    fn new(gpu: &Gpu, kind: LayerKind, data: FieldConfigData) -> Self {
        let entry_point = match kind {
            LayerKind::Heatmap => "fs_heatmap",
            LayerKind::Metaball => "fs_metaball",
            LayerKind::Contour => "fs_contour",
            _ => unreachable!("not a field layer: {:?}", kind),
        };
        let layout = gpu
            .device()
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("hg-field-layer-layout"),
                entries: &[
                    uniform_entry(
                        0,
                        mem::size_of::<ViewportUniformData>(),
                        wgpu::ShaderStages::FRAGMENT,
                    ),
                    uniform_entry(1, mem::size_of::<FieldConfigData>(), wgpu::ShaderStages::FRAGMENT),
                    uniform_entry(2, mem::size_of::<DensityParams>(), wgpu::ShaderStages::FRAGMENT),
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: None,
                    },
                ],
            });
        let module = gpu.create_shader_module("overlays.wgsl", include_str!("overlays.wgsl"));
        let pipeline = gpu
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("hg-{}-pipeline", entry_point)),
                layout: Some(&gpu.device().create_pipeline_layout(
                    &wgpu::PipelineLayoutDescriptor {
                        label: Some("hg-field-layer-pipeline-layout"),
                        bind_group_layouts: &[&layout],
                        push_constant_ranges: &[],
                    },
                )),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: "vs_fullscreen",
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point,
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
        let config = gpu.push_data(
            "hg-field-layer-config",
            &data,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        Self {
            pipeline,
            layout,
            config,
            bind_group: None,
        }
    }

    fn set_config(&self, gpu: &Gpu, data: FieldConfigData) {
        gpu.queue().write_buffer(&self.config, 0, data.as_bytes());
    }

    fn rewire(&mut self, gpu: &Gpu, resources: &LayerResources) {
        self.bind_group = Some(gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("hg-field-layer-bind-group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: resources.viewport_uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.config.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resources.density.params_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(resources.density.texture_view()),
                },
            ],
        }));
    }

    fn encode(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        let bind_group = match &self.bind_group {
            Some(bind_group) => bind_group,
            None => return,
        };
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("hg-field-layer-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: true,
                },
            })],
            depth_stencil_attachment: None,
        });
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
}

// ----------------------------------------------------------------------
// Labels
// ----------------------------------------------------------------------

struct LabelLayer {
    pipeline: wgpu::RenderPipeline,
    globals_layout: wgpu::BindGroupLayout,
    data_layout: wgpu::BindGroupLayout,
    atlas_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    globals_bind_group: Option<wgpu::BindGroup>,
    data_bind_groups: Option<[wgpu::BindGroup; 2]>,
    atlas_bind_group: Option<wgpu::BindGroup>,
    glyphs: Option<wgpu::Buffer>,
    glyph_count: u32,
}

impl LabelLayer {
    fn new(gpu: &Gpu) -> Self {
        let globals_layout =
            gpu.device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("hg-label-globals-layout"),
                    entries: &[uniform_entry(
                        0,
                        mem::size_of::<ViewportUniformData>(),
                        wgpu::ShaderStages::VERTEX,
                    )],
                });
        let data_layout =
            gpu.device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("hg-label-data-layout"),
                    entries: &[
                        storage_entry(0, wgpu::ShaderStages::VERTEX),
                        storage_entry(1, wgpu::ShaderStages::VERTEX),
                        storage_entry(2, wgpu::ShaderStages::VERTEX),
                    ],
                });
        let atlas_layout =
            gpu.device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("hg-label-atlas-layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                multisampled: false,
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ],
                });
        let module = gpu.create_shader_module("labels.wgsl", include_str!("labels.wgsl"));
        let pipeline = gpu
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("hg-label-pipeline"),
                layout: Some(&gpu.device().create_pipeline_layout(
                    &wgpu::PipelineLayoutDescriptor {
                        label: Some("hg-label-pipeline-layout"),
                        bind_group_layouts: &[&globals_layout, &data_layout, &atlas_layout],
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
        let sampler = gpu.device().create_sampler(&wgpu::SamplerDescriptor {
            label: Some("hg-label-atlas-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            pipeline,
            globals_layout,
            data_layout,
            atlas_layout,
            sampler,
            globals_bind_group: None,
            data_bind_groups: None,
            atlas_bind_group: None,
            glyphs: None,
            glyph_count: 0,
        }
    }

    fn set_atlas(&mut self, gpu: &Gpu, atlas: &wgpu::TextureView) {
        self.atlas_bind_group = Some(gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("hg-label-atlas-bind-group"),
            layout: &self.atlas_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(atlas),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        }));
    }

    fn set_glyphs(&mut self, gpu: &Gpu, instances: &[GlyphInstance]) {
        self.glyph_count = instances.len() as u32;
        if instances.is_empty() {
            self.glyphs = None;
            self.data_bind_groups = None;
            return;
        }
        self.glyphs = Some(gpu.push_slice(
            "hg-label-glyphs",
            instances,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        ));
        // Data bind groups reference the glyph buffer; force a rewire.
        self.data_bind_groups = None;
    }

    fn rewire(&mut self, gpu: &Gpu, resources: &LayerResources) {
        self.globals_bind_group = Some(gpu.device().create_bind_group(
            &wgpu::BindGroupDescriptor {
                label: Some("hg-label-globals-bind-group"),
                layout: &self.globals_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: resources.viewport_uniform.as_entire_binding(),
                }],
            },
        ));
        let glyphs = match &self.glyphs {
            Some(glyphs) => glyphs,
            None => return,
        };
        let make = |parity: usize| {
            gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("hg-label-data-bind-group"),
                layout: &self.data_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: resources.positions.x().side(parity).as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: resources.positions.y().side(parity).as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: glyphs.as_entire_binding(),
                    },
                ],
            })
        };
        self.data_bind_groups = Some([make(0), make(1)]);
    }

    fn encode(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView, parity: usize) {
        let (globals, data, atlas) = match (
            &self.globals_bind_group,
            &self.data_bind_groups,
            &self.atlas_bind_group,
        ) {
            (Some(globals), Some(data), Some(atlas)) => (globals, data, atlas),
            _ => return,
        };
        if self.glyph_count == 0 {
            return;
        }
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("hg-label-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: true,
                },
            })],
            depth_stencil_attachment: None,
        });
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, globals, &[]);
        rpass.set_bind_group(1, &data[parity], &[]);
        rpass.set_bind_group(2, atlas, &[]);
        rpass.draw(0..6, 0..self.glyph_count);
    }
}

// ----------------------------------------------------------------------
// Layer manager
// ----------------------------------------------------------------------

enum LayerBody {
    Field(FieldLayer),
    Labels(LabelLayer),
    Custom(CustomLayerCallback),
}

struct Layer {
    kind: LayerKind,
    order: i32,
    enabled: bool,
    body: LayerBody,
}

/// Ordered registry of auxiliary passes. Layers below [LABEL_ORDER] render
/// between the edge and node passes; labels and anything at or above it
/// render on top of nodes.
#[derive(Default)]
pub struct LayerManager {
    layers: Vec<Layer>,
}

impl LayerManager {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    fn position_of(&self, kind: LayerKind) -> Option<usize> {
        self.layers.iter().position(|layer| layer.kind == kind)
    }

    pub fn is_enabled(&self, kind: LayerKind) -> bool {
        self.position_of(kind)
            .map_or(false, |at| self.layers[at].enabled)
    }

    pub fn order_of(&self, kind: LayerKind) -> Option<i32> {
        self.position_of(kind).map(|at| self.layers[at].order)
    }

    /// Create the layer (or re-enable and reconfigure an existing one).
    pub fn enable(
        &mut self,
        gpu: &Gpu,
        config: LayerConfig,
        resources: &LayerResources,
    ) -> Result<()> {
        let kind = config.kind();
        if let Some(at) = self.position_of(kind) {
            self.layers[at].enabled = true;
            return self.apply_config(gpu, config, resources);
        }
        debug!("enabling layer {:?}", kind);
        let body = match config {
            LayerConfig::Heatmap(c) => {
                let mut layer = FieldLayer::new(gpu, kind, c.into());
                layer.rewire(gpu, resources);
                LayerBody::Field(layer)
            }
            LayerConfig::Metaball(c) => {
                let mut layer = FieldLayer::new(gpu, kind, c.into());
                layer.rewire(gpu, resources);
                LayerBody::Field(layer)
            }
            LayerConfig::Contour(c) => {
                let mut layer = FieldLayer::new(gpu, kind, c.into());
                layer.rewire(gpu, resources);
                LayerBody::Field(layer)
            }
            LayerConfig::Labels => {
                let mut layer = LabelLayer::new(gpu);
                layer.rewire(gpu, resources);
                LayerBody::Labels(layer)
            }
            LayerConfig::Custom(callback) => LayerBody::Custom(callback),
        };
        self.layers.push(Layer {
            kind,
            order: default_order(kind),
            enabled: true,
            body,
        });
        Ok(())
    }

    pub fn disable(&mut self, kind: LayerKind) -> bool {
        match self.position_of(kind) {
            Some(at) => {
                self.layers[at].enabled = false;
                true
            }
            None => false,
        }
    }

    /// Flip the enabled bit; returns the new state, or None for a layer
    /// that was never enabled.
    pub fn toggle(&mut self, kind: LayerKind) -> Option<bool> {
        let at = self.position_of(kind)?;
        self.layers[at].enabled = !self.layers[at].enabled;
        Some(self.layers[at].enabled)
    }

    pub fn set_order(&mut self, kind: LayerKind, order: i32) -> bool {
        match self.position_of(kind) {
            Some(at) => {
                self.layers[at].order = order;
                true
            }
            None => false,
        }
    }

    pub fn apply_config(
        &mut self,
        gpu: &Gpu,
        config: LayerConfig,
        resources: &LayerResources,
    ) -> Result<()> {
        let kind = config.kind();
        let at = match self.position_of(kind) {
            Some(at) => at,
            None => bail!("layer {:?} is not enabled", kind),
        };
        match (&mut self.layers[at].body, config) {
            (LayerBody::Field(layer), LayerConfig::Heatmap(c)) => layer.set_config(gpu, c.into()),
            (LayerBody::Field(layer), LayerConfig::Metaball(c)) => layer.set_config(gpu, c.into()),
            (LayerBody::Field(layer), LayerConfig::Contour(c)) => layer.set_config(gpu, c.into()),
            (LayerBody::Labels(layer), LayerConfig::Labels) => layer.rewire(gpu, resources),
            (LayerBody::Custom(slot), LayerConfig::Custom(callback)) => *slot = callback,
            _ => bail!("config does not match layer {:?}", kind),
        }
        Ok(())
    }

    /// Provide the glyph atlas for the labels layer.
    pub fn set_label_atlas(&mut self, gpu: &Gpu, atlas: &wgpu::TextureView) -> Result<()> {
        match self.labels_mut() {
            Some(layer) => {
                layer.set_atlas(gpu, atlas);
                Ok(())
            }
            None => bail!("labels layer is not enabled"),
        }
    }

    /// Replace the prepared glyph instances for the labels layer.
    pub fn set_label_glyphs(
        &mut self,
        gpu: &Gpu,
        instances: &[GlyphInstance],
        resources: &LayerResources,
    ) -> Result<()> {
        match self.labels_mut() {
            Some(layer) => {
                layer.set_glyphs(gpu, instances);
                layer.rewire(gpu, resources);
                Ok(())
            }
            None => bail!("labels layer is not enabled"),
        }
    }

    fn labels_mut(&mut self) -> Option<&mut LabelLayer> {
        self.layers.iter_mut().find_map(|layer| match &mut layer.body {
            LayerBody::Labels(labels) => Some(labels),
            _ => None,
        })
    }

    /// Re-wire every layer after position buffers or the density texture
    /// were re-created.
    pub fn rewire(&mut self, gpu: &Gpu, resources: &LayerResources) {
        for layer in &mut self.layers {
            match &mut layer.body {
                LayerBody::Field(field) => field.rewire(gpu, resources),
                LayerBody::Labels(labels) => labels.rewire(gpu, resources),
                LayerBody::Custom(_) => {}
            }
        }
    }

    fn encode_band(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        parity: usize,
        below_labels: bool,
    ) {
        let mut order: Vec<usize> = (0..self.layers.len())
            .filter(|&i| {
                let layer = &self.layers[i];
                layer.enabled
                    && if below_labels {
                        layer.order < LABEL_ORDER
                    } else {
                        layer.order >= LABEL_ORDER
                    }
            })
            .collect();
        order.sort_by_key(|&i| self.layers[i].order);
        for at in order {
            match &mut self.layers[at].body {
                LayerBody::Field(field) => field.encode(encoder, target),
                LayerBody::Labels(labels) => labels.encode(encoder, target, parity),
                LayerBody::Custom(callback) => callback(encoder, target),
            }
        }
    }

    /// Overlays that sit between the edge and node passes.
    pub fn encode_underlays(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        parity: usize,
    ) {
        self.encode_band(encoder, target, parity, true);
    }

    /// Labels and anything else at or above [LABEL_ORDER].
    pub fn encode_overlays(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        parity: usize,
    ) {
        self.encode_band(encoder, target, parity, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_config_packs_to_three_vec4s() {
        assert_eq!(mem::size_of::<FieldConfigData>(), 48);
        let data: FieldConfigData = HeatmapConfig::default().into();
        assert_eq!(data.params0[0], HeatmapConfig::default().intensity);
    }

    #[test]
    fn glyph_instances_are_four_vec4s() {
        assert_eq!(mem::size_of::<GlyphInstance>(), 64);
        let glyph = GlyphInstance::new(7, [0.0; 4], [0.0; 4], [1.0; 4]);
        assert_eq!(glyph.anchor[0], 7.0);
    }

    #[test]
    fn default_orders_put_labels_on_top() {
        for kind in [LayerKind::Heatmap, LayerKind::Metaball, LayerKind::Contour, LayerKind::Custom]
        {
            assert!(default_order(kind) < LABEL_ORDER);
        }
        assert_eq!(default_order(LayerKind::Labels), LABEL_ORDER);
    }
}
