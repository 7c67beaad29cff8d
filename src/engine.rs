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
use crate::{
    events::GraphEvent,
    interaction::{InteractionState, PressTarget},
    spatial::{self, SpatialIndex},
    stats::{FrameStats, FrameStatsSnapshot},
};
use density::DensityBuffer;
use draw::{EdgeDrawPass, GlyphInstance, LayerConfig, LayerKind, LayerManager, LayerResources, NodeDrawPass};
use event_bus::{EventBus, Subscription};
use fxhash::FxHashSet;
use gpu::{Gpu, GpuConfig, GpuError};
use graph_buffers::{
    AttributeBuffer, EdgeBuffer, EdgeFlowData, EdgeFlowLayer, PinMaskBuffer, PositionBuffer,
    RenderConfigData, UniformBuffer, ViewportUniformData,
};
use graph_state::{
    parse_color, parse_graph, EdgeSpec, GraphError, GraphId, GraphInput, IngestOptions,
    MetadataToken, MutableGraphState, NodePatch, NodeSpec, EDGE_ATTR_FLOATS, NODE_ATTR_FLOATS,
};
use input::{PointerButton, PointerEvent, PointerManager, PointerPhase};
use layout::{ConvergenceDetector, ForceConfig, LayoutBuffer, SimStatus, SimulationController};
use log::{debug, error, info, warn};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::time::Instant;
use viewport::{Viewport, ViewportConfig};
use winit::event::WindowEvent;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.016,
    g: 0.020,
    b: 0.033,
    a: 1.0,
};

/// Partial node restyle accepted by [HeroineGraph::update_node]. Colors are
/// css strings like everywhere else on the public surface.
#[derive(Clone, Debug, Default)]
pub struct NodeUpdate {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub radius: Option<f32>,
    pub color: Option<String>,
    pub type_tag: Option<String>,
    pub metadata: Option<MetadataToken>,
}

#[derive(Clone, Debug, Default)]
pub struct EdgeUpdate {
    pub width: Option<f32>,
    pub color: Option<String>,
    pub curvature: Option<f32>,
    pub opacity: Option<f32>,
    pub type_tag: Option<String>,
    pub metadata: Option<MetadataToken>,
}

#[derive(Debug)]
pub struct GraphConfig {
    pub force: ForceConfig,
    pub viewport: ViewportConfig,
    pub gpu: GpuConfig,
    pub initial_node_capacity: usize,
    pub initial_edge_capacity: usize,
    pub density_grid_dim: u32,
    pub simulation_steps_per_frame: u32,
    pub pin_on_drag: bool,
    pub validate_references: bool,
    pub drag_alpha_target: f32,
    pub convergence_threshold: f32,
    pub convergence_ticks: u32,
    /// Velocity sampling / position sync cadence, in frames.
    pub readback_interval_frames: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            force: ForceConfig::default(),
            viewport: ViewportConfig::default(),
            gpu: GpuConfig::default(),
            initial_node_capacity: 1024,
            initial_edge_capacity: 2048,
            density_grid_dim: density::DEFAULT_GRID_DIM,
            simulation_steps_per_frame: 1,
            pin_on_drag: false,
            validate_references: true,
            drag_alpha_target: 0.3,
            convergence_threshold: 1e-3,
            convergence_ticks: 10,
            readback_interval_frames: 30,
        }
    }
}

/// The embedder-facing engine handle: data API, simulation control,
/// viewport, selection, hit testing, layers, events, and the per-frame
/// command orchestration.
pub struct HeroineGraph {
    gpu: Gpu,
    config: GraphConfig,
    force_config: ForceConfig,

    state: MutableGraphState,
    positions: PositionBuffer,
    node_attrs: AttributeBuffer,
    edge_attrs: AttributeBuffer,
    edges_gpu: EdgeBuffer,
    pin_mask: PinMaskBuffer,
    density: DensityBuffer,
    layout: LayoutBuffer,

    controller: SimulationController,
    convergence: ConvergenceDetector,

    node_pass: NodeDrawPass,
    edge_pass: EdgeDrawPass,
    layer_manager: LayerManager,

    viewport: Viewport,
    viewport_uniform: UniformBuffer<ViewportUniformData>,
    render_config: UniformBuffer<RenderConfigData>,
    edge_flow: UniformBuffer<EdgeFlowData>,

    bus: EventBus<GraphEvent>,
    pointer: PointerManager,
    interaction: InteractionState,
    spatial_index: Option<Box<dyn SpatialIndex>>,

    selected_nodes: FxHashSet<GraphId>,
    selected_edges: FxHashSet<GraphId>,

    stats: FrameStats,
    frame_number: u64,
    started_at: Instant,
    last_viewport_generation: u64,
    bind_groups_stale: bool,
    pin_mask_dirty: bool,
    positions_stale: bool,
    offscreen: Option<wgpu::TextureView>,
}

impl HeroineGraph {
    /// Bring the engine up against a live window surface.
    pub fn new<W>(
        window: &W,
        logical_size: (u32, u32),
        scale_factor: f64,
        config: GraphConfig,
    ) -> Result<Self, GraphError>
    where
        W: HasRawWindowHandle + HasRawDisplayHandle,
    {
        let gpu = Gpu::new(window, logical_size, scale_factor, config.gpu.clone())
            .map_err(gpu_error)?;
        Self::from_gpu(gpu, logical_size, scale_factor, config)
    }

    /// Headless engine rendering to an offscreen target; used by tests and
    /// readback-only embedders.
    pub fn headless(extent: (u32, u32), config: GraphConfig) -> Result<Self, GraphError> {
        let gpu = Gpu::headless(extent, config.gpu.clone()).map_err(gpu_error)?;
        Self::from_gpu(gpu, extent, 1.0, config)
    }

    fn from_gpu(
        gpu: Gpu,
        logical_size: (u32, u32),
        scale_factor: f64,
        config: GraphConfig,
    ) -> Result<Self, GraphError> {
        config
            .force
            .validate()
            .map_err(GraphError::InvalidConfig)?;
        let state = MutableGraphState::with_capacity(
            config.initial_node_capacity,
            config.initial_edge_capacity,
        );
        let positions = PositionBuffer::new(&gpu, state.node_capacity());
        let node_attrs = AttributeBuffer::new(
            &gpu,
            "hg-node-attributes",
            state.node_capacity(),
            NODE_ATTR_FLOATS,
        );
        let edge_attrs = AttributeBuffer::new(
            &gpu,
            "hg-edge-attributes",
            state.edge_capacity(),
            EDGE_ATTR_FLOATS,
        );
        let edges_gpu = EdgeBuffer::new(&gpu, state.node_capacity(), state.edge_capacity());
        let pin_mask = PinMaskBuffer::new(&gpu, state.node_capacity());
        let density = DensityBuffer::new(&gpu, (config.density_grid_dim, config.density_grid_dim));
        let layout = LayoutBuffer::new(&gpu, state.node_capacity());
        let controller = SimulationController::new(
            config.force.alpha_min,
            config.force.alpha_decay_iterations,
        );
        let convergence =
            ConvergenceDetector::new(config.convergence_threshold, config.convergence_ticks);

        let node_pass = NodeDrawPass::new(&gpu);
        let edge_pass = EdgeDrawPass::new(&gpu);

        let viewport = Viewport::new(
            logical_size.0 as f32,
            logical_size.1 as f32,
            scale_factor as f32,
            config.viewport.clone(),
        );
        let viewport_uniform =
            UniformBuffer::new(&gpu, "hg-viewport-uniforms", ViewportUniformData::default());
        let render_config =
            UniformBuffer::new(&gpu, "hg-render-config", RenderConfigData::default());
        let edge_flow = UniformBuffer::new(&gpu, "hg-edge-flow", EdgeFlowData::default());

        let pointer = PointerManager::new(scale_factor);
        let force_config = config.force.clone();
        let mut engine = Self {
            gpu,
            config,
            force_config,
            state,
            positions,
            node_attrs,
            edge_attrs,
            edges_gpu,
            pin_mask,
            density,
            layout,
            controller,
            convergence,
            node_pass,
            edge_pass,
            layer_manager: LayerManager::new(),
            viewport,
            viewport_uniform,
            render_config,
            edge_flow,
            bus: EventBus::new(),
            pointer,
            interaction: InteractionState::default(),
            spatial_index: None,
            selected_nodes: FxHashSet::default(),
            selected_edges: FxHashSet::default(),
            stats: FrameStats::new(),
            frame_number: 0,
            started_at: Instant::now(),
            last_viewport_generation: u64::MAX,
            bind_groups_stale: true,
            pin_mask_dirty: true,
            positions_stale: false,
            offscreen: None,
        };
        engine.apply_force_config_to_uniform();
        engine.refresh_offscreen_target();
        info!(
            "engine up: {:?} surface, {}x{} @ {}",
            engine.gpu.surface_format(),
            logical_size.0,
            logical_size.1,
            scale_factor
        );
        Ok(engine)
    }

    /// Release all device-owned resources. Dropping the handle does the
    /// same; this exists for embedders that want an explicit teardown.
    pub fn destroy(self) {
        drop(self);
    }

    // ------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------

    /// Replace-all ingestion.
    pub fn load(&mut self, input: GraphInput) -> Result<(), GraphError> {
        let options = IngestOptions {
            validate_references: self.config.validate_references,
        };
        let parsed = parse_graph(input, &options)?;
        self.check_node_budget(parsed.node_ids.len())?;
        self.check_edge_budget(parsed.edge_ids.len())?;
        self.state = MutableGraphState::from_parsed(parsed);
        self.selected_nodes.clear();
        self.selected_edges.clear();
        self.interaction = InteractionState::default();
        self.pin_mask_dirty = true;
        self.positions_stale = false;
        self.convergence.reset();
        self.controller.restart(1.0);
        debug!(
            "loaded {} nodes / {} edges",
            self.state.node_count(),
            self.state.edge_count()
        );
        Ok(())
    }

    pub fn add_node(&mut self, spec: NodeSpec) -> Result<(), GraphError> {
        self.check_node_budget(self.state.node_count() + 1)?;
        let clock = self.clock();
        self.state.add_node(spec, clock)?;
        Ok(())
    }

    pub fn add_nodes(&mut self, specs: Vec<NodeSpec>) -> Result<(), GraphError> {
        self.check_node_budget(self.state.node_count() + specs.len())?;
        // Validate the whole batch before touching anything.
        let mut incoming = FxHashSet::default();
        for spec in &specs {
            if self.state.node_slot(&spec.id).is_some() || !incoming.insert(spec.id.clone()) {
                return Err(GraphError::DuplicateId(spec.id.clone()));
            }
        }
        let clock = self.clock();
        for spec in specs {
            self.state.add_node(spec, clock).expect("batch was validated");
        }
        Ok(())
    }

    pub fn remove_node(&mut self, id: &GraphId) -> Result<(), GraphError> {
        let slot = self.state.remove_node(id)?;
        self.selected_nodes.remove(id);
        self.selected_edges
            .retain(|edge_id| self.state.edge_slot(edge_id).is_some());
        if self.interaction.hovered_node == Some(slot) {
            self.interaction.hovered_node = None;
        }
        if self.interaction.dragging_node == Some(slot) {
            self.interaction.cancel();
        }
        self.interaction.hovered_edge = None;
        self.pin_mask_dirty = true;
        Ok(())
    }

    pub fn update_node(&mut self, id: &GraphId, update: &NodeUpdate) -> Result<(), GraphError> {
        let patch = NodePatch {
            x: update.x,
            y: update.y,
            radius: update.radius,
            color: update.color.as_deref().and_then(parse_color),
            type_tag: update.type_tag.clone(),
            metadata: update.metadata,
            tex_index: None,
        };
        self.state.update_node(id, &patch)?;
        Ok(())
    }

    pub fn add_edge(&mut self, spec: EdgeSpec) -> Result<(), GraphError> {
        self.check_edge_budget(self.state.edge_count() + 1)?;
        self.state.add_edge(spec)?;
        Ok(())
    }

    pub fn add_edges(&mut self, specs: Vec<EdgeSpec>) -> Result<(), GraphError> {
        self.check_edge_budget(self.state.edge_count() + specs.len())?;
        for spec in &specs {
            if self.state.node_slot(&spec.source).is_none() {
                return Err(GraphError::NotFound(spec.source.clone()));
            }
            if self.state.node_slot(&spec.target).is_none() {
                return Err(GraphError::NotFound(spec.target.clone()));
            }
            if let Some(id) = &spec.id {
                if self.state.edge_slot(id).is_some() {
                    return Err(GraphError::DuplicateId(id.clone()));
                }
            }
        }
        for spec in specs {
            self.state.add_edge(spec).expect("batch was validated");
        }
        Ok(())
    }

    pub fn remove_edge(&mut self, id: &GraphId) -> Result<(), GraphError> {
        self.state.remove_edge(id)?;
        self.selected_edges.remove(id);
        self.interaction.hovered_edge = None;
        Ok(())
    }

    pub fn update_edge(&mut self, id: &GraphId, update: &EdgeUpdate) -> Result<(), GraphError> {
        let patch = graph_state::EdgePatch {
            width: update.width,
            color: update.color.as_deref().and_then(parse_color),
            curvature: update.curvature,
            opacity: update.opacity,
            type_tag: update.type_tag.clone(),
            metadata: update.metadata,
        };
        self.state.update_edge(id, &patch)?;
        Ok(())
    }

    pub fn pin_node(&mut self, id: &GraphId) -> Result<(), GraphError> {
        let slot = self.require_node(id)?;
        self.state.pin_slot(slot);
        self.pin_mask_dirty = true;
        Ok(())
    }

    pub fn unpin_node(&mut self, id: &GraphId) -> Result<(), GraphError> {
        let slot = self.require_node(id)?;
        self.state.unpin_slot(slot);
        self.pin_mask_dirty = true;
        Ok(())
    }

    pub fn set_node_position(&mut self, id: &GraphId, x: f32, y: f32) -> Result<(), GraphError> {
        let slot = self.require_node(id)?;
        self.state.set_node_position(slot, x, y);
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.state.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.state.edge_count()
    }

    pub fn state(&self) -> &MutableGraphState {
        &self.state
    }

    fn require_node(&self, id: &GraphId) -> Result<u32, GraphError> {
        self.state
            .node_slot(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))
    }

    fn check_node_budget(&self, prospective: usize) -> Result<(), GraphError> {
        let bytes = prospective as u64 * (NODE_ATTR_FLOATS * 4) as u64;
        let limit = self.gpu.capabilities().max_storage_buffer_binding_size as u64;
        if bytes > limit {
            return Err(GraphError::CapacityExceeded(format!(
                "{} nodes need {} attribute bytes; adapter caps storage bindings at {}",
                prospective, bytes, limit
            )));
        }
        Ok(())
    }

    fn check_edge_budget(&self, prospective: usize) -> Result<(), GraphError> {
        let bytes = prospective as u64 * (EDGE_ATTR_FLOATS * 4) as u64;
        let limit = self.gpu.capabilities().max_storage_buffer_binding_size as u64;
        if bytes > limit {
            return Err(GraphError::CapacityExceeded(format!(
                "{} edges need {} attribute bytes; adapter caps storage bindings at {}",
                prospective, bytes, limit
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Viewport
    // ------------------------------------------------------------------

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.viewport.pan(dx, dy);
    }

    pub fn zoom(&mut self, factor: f32, anchor: Option<(f32, f32)>) {
        self.viewport.zoom(factor, anchor);
    }

    pub fn center_on(&mut self, x: f32, y: f32) {
        self.viewport.center_on(x, y);
    }

    /// Frame the whole graph. Syncs positions from the GPU first so the
    /// framing reflects the simulated layout.
    pub fn fit_to_view(&mut self, padding: Option<f32>) {
        self.sync_positions_if_stale();
        if let Some((min_x, min_y, max_x, max_y)) = self.state.bounds() {
            self.viewport
                .fit_to_bounds(min_x, min_y, max_x, max_y, padding.unwrap_or(40.0));
        }
    }

    pub fn screen_to_graph(&self, x: f32, y: f32) -> (f32, f32) {
        self.viewport.screen_to_graph(x, y)
    }

    pub fn graph_to_screen(&self, x: f32, y: f32) -> (f32, f32) {
        self.viewport.graph_to_screen(x, y)
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn resize(&mut self, logical_width: u32, logical_height: u32) {
        self.gpu.resize(logical_width, logical_height);
        self.viewport
            .set_size(logical_width as f32, logical_height as f32);
        self.refresh_offscreen_target();
    }

    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        self.gpu.set_scale_factor(scale_factor);
        self.viewport.set_dpr(scale_factor as f32);
        self.pointer.set_scale_factor(scale_factor);
        self.refresh_offscreen_target();
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub fn select_nodes(&mut self, ids: &[GraphId], additive: bool) -> Result<(), GraphError> {
        for id in ids {
            self.require_node(id)?;
        }
        if !additive {
            self.clear_selection_silently();
        }
        for id in ids {
            let slot = self.state.node_slot(id).expect("validated above");
            self.state.set_node_selected(slot, true);
            self.selected_nodes.insert(id.clone());
        }
        self.fire_selection_change();
        Ok(())
    }

    pub fn select_edges(&mut self, ids: &[GraphId], additive: bool) -> Result<(), GraphError> {
        for id in ids {
            if self.state.edge_slot(id).is_none() {
                return Err(GraphError::NotFound(id.clone()));
            }
        }
        if !additive {
            self.clear_selection_silently();
        }
        for id in ids {
            let slot = self.state.edge_slot(id).expect("validated above");
            self.state.set_edge_selected(slot, true);
            self.selected_edges.insert(id.clone());
        }
        self.fire_selection_change();
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.clear_selection_silently();
        self.fire_selection_change();
    }

    fn clear_selection_silently(&mut self) {
        let nodes: Vec<GraphId> = self.selected_nodes.drain().collect();
        for id in nodes {
            if let Some(slot) = self.state.node_slot(&id) {
                self.state.set_node_selected(slot, false);
            }
        }
        let edges: Vec<GraphId> = self.selected_edges.drain().collect();
        for id in edges {
            if let Some(slot) = self.state.edge_slot(&id) {
                self.state.set_edge_selected(slot, false);
            }
        }
    }

    pub fn selected_nodes(&self) -> Vec<GraphId> {
        self.selected_nodes.iter().cloned().collect()
    }

    pub fn selected_edges(&self) -> Vec<GraphId> {
        self.selected_edges.iter().cloned().collect()
    }

    fn fire_selection_change(&self) {
        self.bus.publish(&GraphEvent::SelectionChange {
            nodes: self.selected_nodes(),
            edges: self.selected_edges(),
        });
    }

    // ------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------

    pub fn start_simulation(&mut self) {
        self.controller.start();
        self.convergence.reset();
    }

    pub fn stop_simulation(&mut self) {
        self.controller.stop();
    }

    pub fn pause_simulation(&mut self) {
        self.controller.pause();
    }

    pub fn resume_simulation(&mut self) {
        self.controller.resume();
    }

    pub fn restart_simulation(&mut self, alpha: Option<f32>) {
        self.controller.restart(alpha.unwrap_or(1.0));
        self.convergence.reset();
    }

    pub fn simulation_status(&self) -> SimStatus {
        self.controller.status()
    }

    pub fn alpha(&self) -> f32 {
        self.controller.alpha()
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.controller.set_alpha(alpha);
    }

    pub fn force_config(&self) -> &ForceConfig {
        &self.force_config
    }

    pub fn set_force_config(&mut self, config: ForceConfig) -> Result<(), GraphError> {
        config.validate().map_err(GraphError::InvalidConfig)?;
        self.controller
            .reconfigure(config.alpha_min, config.alpha_decay_iterations);
        self.force_config = config;
        self.apply_force_config_to_uniform();
        Ok(())
    }

    fn apply_force_config_to_uniform(&mut self) {
        let force = &self.force_config;
        let (cx, cy) = force.center;
        let (repulsion, attraction, gravity) = (force.repulsion, force.attraction, force.gravity);
        let (link, theta, decay, dt) =
            (force.link_distance, force.theta, force.velocity_decay, force.dt);
        self.layout.sim_uniform_mut().modify(|u| {
            u.repulsion = repulsion;
            u.attraction = attraction;
            u.gravity = gravity;
            u.center_x = cx;
            u.center_y = cy;
            u.link_distance = link;
            u.theta = theta;
            u.velocity_decay = decay;
            u.dt = dt;
        });
    }

    /// Run exactly one simulation step outside the frame loop.
    pub fn tick_simulation(&mut self) -> Result<(), GraphError> {
        self.upload_dirty();
        let alpha = self.controller.alpha();
        self.layout.sim_uniform_mut().modify(|u| u.alpha = alpha);
        self.flush_uniforms();
        let mut encoder =
            self.gpu
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("hg-manual-tick"),
                });
        self.encode_simulation_step(&mut encoder);
        self.gpu.queue().submit(Some(encoder.finish()));
        self.positions.swap();
        self.positions_stale = true;
        self.bus.publish(&GraphEvent::SimulationTick {
            alpha: self.controller.alpha(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Hit testing (graph coordinates)
    // ------------------------------------------------------------------

    /// Install an embedder-provided spatial index; hit tests fall back to
    /// brute force without one.
    pub fn set_spatial_index(&mut self, index: Option<Box<dyn SpatialIndex>>) {
        self.spatial_index = index;
        self.refresh_spatial_index();
    }

    fn refresh_spatial_index(&mut self) {
        if let Some(index) = &mut self.spatial_index {
            let nodes: Vec<(u32, f32, f32, f32)> = self
                .state
                .live_node_slots()
                .map(|slot| {
                    let (x, y) = self.state.node_position(slot);
                    (slot, x, y, self.state.node_radius(slot))
                })
                .collect();
            index.rebuild(&nodes);
        }
    }

    fn hit_node(&self, x: f32, y: f32, tolerance: f32) -> Option<u32> {
        match &self.spatial_index {
            Some(index) => index.query_point(x, y, tolerance),
            None => spatial::hit_test_node(&self.state, x, y, tolerance),
        }
    }

    pub fn node_at_position(&mut self, x: f32, y: f32) -> Option<GraphId> {
        self.sync_positions_if_stale();
        let slot = self.hit_node(x, y, 0.0)?;
        self.state.node_id(slot).cloned()
    }

    pub fn edge_at_position(&mut self, x: f32, y: f32) -> Option<GraphId> {
        self.sync_positions_if_stale();
        let slot = spatial::hit_test_edge(&self.state, x, y, 1.0)?;
        self.state.edge_id(slot).cloned()
    }

    pub fn nodes_in_rect(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<GraphId> {
        self.sync_positions_if_stale();
        let (min_x, max_x) = (x1.min(x2), x1.max(x2));
        let (min_y, max_y) = (y1.min(y2), y1.max(y2));
        let slots = match &self.spatial_index {
            Some(index) => index.query_rect(min_x, min_y, max_x, max_y),
            None => spatial::nodes_in_rect(&self.state, min_x, min_y, max_x, max_y),
        };
        slots
            .into_iter()
            .filter_map(|slot| self.state.node_id(slot).cloned())
            .collect()
    }

    pub fn nearest_node(&mut self, x: f32, y: f32, max_distance: Option<f32>) -> Option<GraphId> {
        self.sync_positions_if_stale();
        let max_distance = max_distance.unwrap_or(f32::INFINITY);
        let slot = match &self.spatial_index {
            Some(index) => index.nearest(x, y, max_distance),
            None => spatial::nearest_node(&self.state, x, y, max_distance),
        }?;
        self.state.node_id(slot).cloned()
    }

    // ------------------------------------------------------------------
    // Layers
    // ------------------------------------------------------------------

    pub fn enable_layer(&mut self, config: LayerConfig) -> Result<(), GraphError> {
        let resources = LayerResources {
            viewport_uniform: self.viewport_uniform.buffer(),
            density: &self.density,
            positions: &self.positions,
        };
        self.layer_manager
            .enable(&self.gpu, config, &resources)
            .map_err(|e| GraphError::InvalidConfig(e.to_string()))
    }

    pub fn disable_layer(&mut self, kind: LayerKind) -> bool {
        self.layer_manager.disable(kind)
    }

    pub fn toggle_layer(&mut self, kind: LayerKind) -> Option<bool> {
        self.layer_manager.toggle(kind)
    }

    pub fn set_layer_config(&mut self, config: LayerConfig) -> Result<(), GraphError> {
        let resources = LayerResources {
            viewport_uniform: self.viewport_uniform.buffer(),
            density: &self.density,
            positions: &self.positions,
        };
        self.layer_manager
            .apply_config(&self.gpu, config, &resources)
            .map_err(|e| GraphError::InvalidConfig(e.to_string()))
    }

    pub fn set_layer_order(&mut self, kind: LayerKind, order: i32) -> bool {
        self.layer_manager.set_order(kind, order)
    }

    pub fn set_label_atlas(&mut self, atlas: &wgpu::TextureView) -> Result<(), GraphError> {
        self.layer_manager
            .set_label_atlas(&self.gpu, atlas)
            .map_err(|e| GraphError::InvalidConfig(e.to_string()))
    }

    pub fn set_label_glyphs(&mut self, glyphs: &[GlyphInstance]) -> Result<(), GraphError> {
        let resources = LayerResources {
            viewport_uniform: self.viewport_uniform.buffer(),
            density: &self.density,
            positions: &self.positions,
        };
        self.layer_manager
            .set_label_glyphs(&self.gpu, glyphs, &resources)
            .map_err(|e| GraphError::InvalidConfig(e.to_string()))
    }

    /// Configure one of the two edge-flow layers.
    pub fn set_edge_flow(&mut self, index: usize, layer: EdgeFlowLayer) -> Result<(), GraphError> {
        if index >= 2 {
            return Err(GraphError::InvalidConfig(format!(
                "edge flow layer index {} out of range",
                index
            )));
        }
        self.edge_flow.modify(|data| data.layers[index] = layer);
        Ok(())
    }

    /// Tweak selection/hover/border/pulse styling.
    pub fn modify_render_config(&mut self, apply: impl FnOnce(&mut RenderConfigData)) {
        self.render_config.modify(apply);
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn on<F>(&self, kind: &'static str, handler: F) -> Subscription
    where
        F: Fn(&GraphEvent) + 'static,
    {
        self.bus.on(kind, handler)
    }

    pub fn off(&self, subscription: Subscription) -> bool {
        self.bus.off(subscription)
    }

    // ------------------------------------------------------------------
    // Input plumbing
    // ------------------------------------------------------------------

    /// Feed a winit window event through pointer normalization and the
    /// interaction state machine.
    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                let dpr = self.gpu.scale_factor();
                self.resize(
                    (size.width as f64 / dpr).round() as u32,
                    (size.height as f64 / dpr).round() as u32,
                );
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.set_scale_factor(*scale_factor);
            }
            other => {
                let pointer_events = self.pointer.handle_window_event(other);
                for pointer_event in pointer_events {
                    self.process_pointer(pointer_event);
                }
            }
        }
    }

    fn hover_tolerance(&self) -> f32 {
        4.0 / self.viewport.scale().max(1e-3)
    }

    fn process_pointer(&mut self, event: PointerEvent) {
        let (sx, sy) = (event.screen_x, event.screen_y);
        let (gx, gy) = self.viewport.screen_to_graph(sx, sy);
        match event.phase {
            PointerPhase::Down => {
                if event.button != Some(PointerButton::Primary) {
                    return;
                }
                self.sync_positions_if_stale();
                let tolerance = self.hover_tolerance();
                let target = if let Some(slot) = self.hit_node(gx, gy, tolerance) {
                    PressTarget::Node(slot)
                } else if let Some(slot) = spatial::hit_test_edge(&self.state, gx, gy, tolerance) {
                    PressTarget::Edge(slot)
                } else {
                    PressTarget::Background
                };
                self.interaction.begin_press(target, (sx, sy));
                if let PressTarget::Node(slot) = target {
                    self.begin_drag(slot);
                }
            }
            PointerPhase::Move => {
                if let Some(slot) = self.interaction.dragging_node {
                    self.interaction.note_move((sx, sy));
                    self.state.set_node_position(slot, gx, gy);
                    if let Some(id) = self.state.node_id(slot).cloned() {
                        self.bus
                            .publish(&GraphEvent::NodeDragMove { id, x: gx, y: gy });
                    }
                } else if self.interaction.press.is_some() {
                    // Background (or edge) press: pan with the pointer.
                    let (dx, dy) = self.interaction.note_move((sx, sy));
                    self.viewport.pan(dx, dy);
                } else {
                    self.update_hover(gx, gy);
                }
            }
            PointerPhase::Up => {
                if event.button != Some(PointerButton::Primary) {
                    return;
                }
                let was_dragging = self.interaction.dragging_node;
                if let Some(slot) = was_dragging {
                    self.end_drag(slot);
                }
                match self.interaction.end_press() {
                    Some(PressTarget::Node(slot)) => self.click_node(slot, gx, gy),
                    Some(PressTarget::Edge(slot)) => {
                        if let Some(id) = self.state.edge_id(slot).cloned() {
                            self.bus.publish(&GraphEvent::EdgeClick { id, x: gx, y: gy });
                        }
                    }
                    Some(PressTarget::Background) => {
                        self.bus
                            .publish(&GraphEvent::BackgroundClick { x: gx, y: gy });
                    }
                    None => {}
                }
            }
            PointerPhase::Cancel => {
                self.clear_hover();
                self.interaction.cancel();
            }
            PointerPhase::Wheel => {
                let factor = self
                    .viewport
                    .config()
                    .zoom_speed
                    .powf(event.wheel_dy / 40.0);
                self.viewport.zoom(factor, Some((sx, sy)));
            }
        }
    }

    fn begin_drag(&mut self, slot: u32) {
        self.state.pin_slot(slot);
        self.pin_mask_dirty = true;
        let target = self.config.drag_alpha_target;
        self.controller.set_alpha_target(target);
        self.controller
            .restart(self.controller.alpha().max(target));
        self.convergence.reset();
        if let Some(id) = self.state.node_id(slot).cloned() {
            self.bus.publish(&GraphEvent::NodeDragStart { id });
        }
    }

    fn end_drag(&mut self, slot: u32) {
        if !self.config.pin_on_drag {
            self.state.unpin_slot(slot);
            self.pin_mask_dirty = true;
        }
        self.controller.set_alpha_target(0.0);
        if let Some(id) = self.state.node_id(slot).cloned() {
            self.bus.publish(&GraphEvent::NodeDragEnd { id });
        }
    }

    fn click_node(&mut self, slot: u32, x: f32, y: f32) {
        let id = match self.state.node_id(slot).cloned() {
            Some(id) => id,
            None => return,
        };
        if self.interaction.note_click(slot) {
            self.bus
                .publish(&GraphEvent::NodeDoubleClick { id, x, y });
        } else {
            self.bus.publish(&GraphEvent::NodeClick { id, x, y });
        }
    }

    fn update_hover(&mut self, gx: f32, gy: f32) {
        let tolerance = self.hover_tolerance();
        let node = self.hit_node(gx, gy, tolerance);
        if node != self.interaction.hovered_node {
            if let Some(old) = self.interaction.hovered_node {
                self.state.set_node_hovered(old, false);
                if let Some(id) = self.state.node_id(old).cloned() {
                    self.bus.publish(&GraphEvent::NodeHoverLeave { id });
                }
            }
            if let Some(new) = node {
                self.state.set_node_hovered(new, true);
                if let Some(id) = self.state.node_id(new).cloned() {
                    self.bus.publish(&GraphEvent::NodeHoverEnter { id });
                }
            }
            self.interaction.hovered_node = node;
        }
        // Nodes shadow edges; only look for an edge when no node is hit.
        let edge = if node.is_none() {
            spatial::hit_test_edge(&self.state, gx, gy, tolerance)
        } else {
            None
        };
        if edge != self.interaction.hovered_edge {
            if let Some(old) = self.interaction.hovered_edge {
                self.state.set_edge_hovered(old, false);
                if let Some(id) = self.state.edge_id(old).cloned() {
                    self.bus.publish(&GraphEvent::EdgeHoverLeave { id });
                }
            }
            if let Some(new) = edge {
                self.state.set_edge_hovered(new, true);
                if let Some(id) = self.state.edge_id(new).cloned() {
                    self.bus.publish(&GraphEvent::EdgeHoverEnter { id });
                }
            }
            self.interaction.hovered_edge = edge;
        }
    }

    fn clear_hover(&mut self) {
        let (gx, gy) = (f32::MIN, f32::MIN);
        self.update_hover(gx, gy);
    }

    // ------------------------------------------------------------------
    // Frame loop
    // ------------------------------------------------------------------

    fn clock(&self) -> f32 {
        self.started_at.elapsed().as_secs_f32()
    }

    /// Encode and submit one frame: dirty uploads, simulation tick(s),
    /// overlay passes and the main render pass, in that order.
    pub fn render_frame(&mut self) -> Result<(), GraphError> {
        self.frame_number += 1;
        self.upload_dirty();

        // Animation clocks tick every frame.
        let clock = self.clock();
        self.render_config.modify(|c| c.clock = clock);
        self.edge_flow.modify(|f| f.time = clock);
        if self.viewport.generation() != self.last_viewport_generation {
            self.refresh_viewport_uniform();
            self.last_viewport_generation = self.viewport.generation();
            self.bus.publish(&GraphEvent::ViewportChange {
                x: self.viewport.x(),
                y: self.viewport.y(),
                scale: self.viewport.scale(),
            });
        }
        self.flush_uniforms();

        let mut encoder =
            self.gpu
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("hg-frame-encoder"),
                });

        let mut ticked = false;
        for _ in 0..self.config.simulation_steps_per_frame.max(1) {
            if !self.controller.begin_tick() {
                break;
            }
            ticked = true;
            let alpha = self.controller.alpha();
            self.layout.sim_uniform_mut().modify(|u| u.alpha = alpha);
            self.layout.upload_if_dirty(&self.gpu);
            self.encode_simulation_step(&mut encoder);
            // Host-side swap between steps; the GPU sees sequential passes.
            self.positions.swap();
            self.positions_stale = true;
        }

        let parity = self.positions.parity();
        let high_water = self.state.node_high_water() as u32;

        let frame = self.gpu.acquire_surface_texture().map_err(|e| {
            self.bus.publish(&GraphEvent::Error {
                message: e.to_string(),
            });
            gpu_error(e)
        })?;
        let owned_view = frame
            .as_ref()
            .map(|f| f.texture.create_view(&wgpu::TextureViewDescriptor::default()));
        // Simulation work is already recorded; a skipped frame (no surface
        // image, no offscreen target) still submits it below.
        if let Some(target) = owned_view.as_ref().or(self.offscreen.as_ref()) {
            // Main pass: clear, then edges.
            {
                let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("hg-edge-pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                            store: true,
                        },
                    })],
                    depth_stencil_attachment: None,
                });
                self.edge_pass
                    .draw(&mut rpass, parity, self.state.edge_count() as u32);
            }
            // Overlays below labels, nodes, then labels and above.
            self.layer_manager.encode_underlays(&mut encoder, target, parity);
            {
                let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("hg-node-pass"),
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
                self.node_pass.draw(&mut rpass, parity, high_water);
            }
            self.layer_manager.encode_overlays(&mut encoder, target, parity);
        }

        self.gpu.queue().submit(Some(encoder.finish()));
        if let Some(frame) = frame {
            frame.present();
        }

        if let Some(message) = self.gpu.take_error() {
            error!("frame {}: gpu error: {}", self.frame_number, message);
            self.bus.publish(&GraphEvent::Error { message });
        }

        self.stats.record_frame();
        if ticked {
            self.bus.publish(&GraphEvent::SimulationTick {
                alpha: self.controller.alpha(),
            });
            self.maybe_sample_convergence();
        }
        Ok(())
    }

    fn encode_simulation_step(&mut self, encoder: &mut wgpu::CommandEncoder) {
        let high_water = self.state.node_high_water() as u32;
        let node_count = self.state.node_count() as u32;
        let edge_count = self.state.edge_count() as u32;
        let parity = self.positions.parity();
        let half_extent = (self.force_config.link_distance
            * (node_count.max(1) as f32).sqrt()
            * 0.75)
            .max(512.0);
        self.density
            .set_world_window(self.force_config.center, half_extent, high_water);
        self.density.upload_if_dirty(&self.gpu);
        self.density.encode_update(encoder, parity, high_water);
        self.layout
            .encode_tick(encoder, parity, high_water, edge_count);
    }

    fn maybe_sample_convergence(&mut self) {
        let interval = self.config.readback_interval_frames.max(1);
        if self.frame_number % interval != 0 {
            return;
        }
        let high_water = self.state.node_high_water() as u32;
        let live = self.state.node_count() as u32;
        match self
            .layout
            .read_mean_squared_velocity(&self.gpu, high_water, live)
        {
            Ok(msv) => {
                if self.convergence.observe(msv) {
                    info!("simulation settled (msv {})", msv);
                    self.bus.publish(&GraphEvent::SimulationEnd);
                }
            }
            Err(e) => warn!("velocity readback failed: {}", e),
        }
        // Ride the same cadence to keep hit testing fresh.
        self.sync_positions_if_stale();
    }

    fn flush_uniforms(&mut self) {
        self.viewport_uniform.upload_if_dirty(&self.gpu);
        self.render_config.upload_if_dirty(&self.gpu);
        self.edge_flow.upload_if_dirty(&self.gpu);
        self.layout.upload_if_dirty(&self.gpu);
        self.density.upload_if_dirty(&self.gpu);
    }

    fn refresh_viewport_uniform(&mut self) {
        let (pw, ph) = self.gpu.physical_size();
        let scale = self.viewport.scale();
        let data = ViewportUniformData {
            columns: self.viewport.clip_columns(),
            screen_width: pw as f32,
            screen_height: ph as f32,
            scale,
            inv_scale: 1.0 / scale.max(1e-9),
            dpr: self.viewport.dpr(),
            pad: [0.0; 3],
        };
        self.viewport_uniform.set(data);
    }

    fn refresh_offscreen_target(&mut self) {
        if !self.gpu.is_headless() {
            self.offscreen = None;
            return;
        }
        let (width, height) = self.gpu.physical_size();
        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("hg-offscreen-target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.gpu.surface_format(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        });
        self.offscreen = Some(texture.create_view(&wgpu::TextureViewDescriptor::default()));
    }

    /// Push CPU mutations into GPU buffers: capacity growth first (its
    /// buffer-to-buffer copies must land before this frame's patches), then
    /// range patches, CSR, and the pin mask.
    fn upload_dirty(&mut self) {
        let snapshot = self.state.snapshot_for_upload();
        if snapshot.node_capacity_changed || snapshot.edge_capacity_changed {
            let mut encoder =
                self.gpu
                    .device()
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("hg-resize-encoder"),
                    });
            let node_capacity = self.state.node_capacity();
            let edge_capacity = self.state.edge_capacity();
            self.positions
                .ensure_capacity(&self.gpu, &mut encoder, node_capacity);
            self.gpu.queue().submit(Some(encoder.finish()));
            self.node_attrs.ensure_capacity(&self.gpu, node_capacity);
            self.edge_attrs.ensure_capacity(&self.gpu, edge_capacity);
            self.edges_gpu
                .ensure_capacity(&self.gpu, node_capacity, edge_capacity);
            self.pin_mask.ensure_capacity(&self.gpu, node_capacity);
            self.layout.ensure_capacity(&self.gpu, node_capacity);
            self.bind_groups_stale = true;
            self.pin_mask_dirty = true;
            // Attribute buffers were re-created empty; re-shadow them all.
            self.state.mark_all_dirty();
            let refreshed = self.state.snapshot_for_upload();
            self.apply_upload_snapshot(&refreshed);
        } else {
            self.apply_upload_snapshot(&snapshot);
        }

        if self.pin_mask_dirty {
            self.pin_mask.upload(&self.gpu, self.state.pin_words());
            self.pin_mask_dirty = false;
        }
        if self.bind_groups_stale {
            self.rebuild_bind_groups();
            self.bind_groups_stale = false;
        }
    }

    fn apply_upload_snapshot(&mut self, snapshot: &graph_state::UploadSnapshot) {
        if let Some(range) = &snapshot.positions {
            let xs = &self.state.positions_x()[range.clone()];
            let ys = &self.state.positions_y()[range.clone()];
            if let Err(e) = self.positions.patch_range(&self.gpu, range.start, xs, ys) {
                warn!("position patch failed: {}", e);
            }
        }
        if let Some(range) = &snapshot.node_attrs {
            if let Err(e) =
                self.node_attrs
                    .patch(&self.gpu, self.state.node_attributes(), range.clone())
            {
                warn!("node attr patch failed: {}", e);
            }
        }
        if let Some(range) = &snapshot.edge_attrs {
            if let Err(e) =
                self.edge_attrs
                    .patch(&self.gpu, self.state.edge_attributes(), range.clone())
            {
                warn!("edge attr patch failed: {}", e);
            }
        }
        if let Some(range) = &snapshot.edge_endpoints {
            let mut interleaved = Vec::with_capacity(range.len() * 2);
            for e in range.clone() {
                interleaved.push(self.state.edge_sources()[e]);
                interleaved.push(self.state.edge_targets()[e]);
            }
            self.edges_gpu
                .upload_endpoints(&self.gpu, range.start, &interleaved);
        }
        if snapshot.csr {
            let csr = self.state.build_csr();
            self.edges_gpu.upload_csr(
                &self.gpu,
                &csr.offsets,
                &csr.targets,
                &csr.inverse_offsets,
                &csr.inverse_sources,
            );
            let high_water = self.state.node_high_water() as f32;
            let edge_count = self.state.edge_count() as f32;
            self.layout.sim_uniform_mut().modify(|u| {
                u.node_count = high_water;
                u.edge_count = edge_count;
            });
            self.refresh_spatial_index();
        }
    }

    fn rebuild_bind_groups(&mut self) {
        self.layout.rebuild_bind_groups(
            &self.gpu,
            &self.positions,
            &self.node_attrs,
            &self.edges_gpu,
            &self.pin_mask,
            &self.density,
        );
        self.density
            .rebuild_bind_groups(&self.gpu, &self.positions, &self.node_attrs);
        self.node_pass
            .rebuild_data(&self.gpu, &self.positions, &self.node_attrs);
        self.edge_pass
            .rebuild_data(&self.gpu, &self.positions, &self.edges_gpu, &self.edge_attrs);
        self.node_pass.rebuild_globals(
            &self.gpu,
            self.viewport_uniform.buffer(),
            self.render_config.buffer(),
        );
        self.edge_pass.rebuild_globals(
            &self.gpu,
            self.viewport_uniform.buffer(),
            self.render_config.buffer(),
            self.edge_flow.buffer(),
        );
        let resources = LayerResources {
            viewport_uniform: self.viewport_uniform.buffer(),
            density: &self.density,
            positions: &self.positions,
        };
        self.layer_manager.rewire(&self.gpu, &resources);
        debug!("bind groups rebuilt at frame {}", self.frame_number);
    }

    // ------------------------------------------------------------------
    // Readback
    // ------------------------------------------------------------------

    /// Parallel `(xs, ys)` position arrays keyed by slot order, fresh from
    /// the GPU. A suspension point.
    pub fn readback_positions(&mut self) -> Result<(Vec<f32>, Vec<f32>), GraphError> {
        self.sync_positions()?;
        let high_water = self.state.node_high_water();
        Ok((
            self.state.positions_x()[..high_water].to_vec(),
            self.state.positions_y()[..high_water].to_vec(),
        ))
    }

    fn sync_positions(&mut self) -> Result<(), GraphError> {
        // Flush pending CPU patches first; adopting stale GPU values over
        // an un-uploaded position edit would lose the edit.
        self.upload_dirty();
        let high_water = self.state.node_high_water();
        if high_water == 0 {
            self.positions_stale = false;
            return Ok(());
        }
        let size = (high_water * 4) as wgpu::BufferAddress;
        let xs_bytes = self
            .gpu
            .read_buffer(self.positions.x().read(), 0, size)
            .map_err(gpu_error)?;
        let ys_bytes = self
            .gpu
            .read_buffer(self.positions.y().read(), 0, size)
            .map_err(gpu_error)?;
        let decode = |bytes: &[u8]| -> Vec<f32> {
            bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes(b.try_into().expect("chunked")))
                .collect()
        };
        let xs = decode(&xs_bytes);
        let ys = decode(&ys_bytes);
        self.state.adopt_positions(&xs, &ys);
        self.refresh_spatial_index();
        self.positions_stale = false;
        Ok(())
    }

    fn sync_positions_if_stale(&mut self) {
        if self.positions_stale {
            if let Err(e) = self.sync_positions() {
                warn!("position sync failed: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------

    pub fn frame_stats(&self) -> FrameStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }
}

fn gpu_error(e: GpuError) -> GraphError {
    match e {
        GpuError::Unsupported => GraphError::Unsupported("no compatible adapter".to_owned()),
        GpuError::AdapterDenied(message) => GraphError::AdapterDenied(message),
        GpuError::DeviceLost => GraphError::DeviceLost,
    }
}
