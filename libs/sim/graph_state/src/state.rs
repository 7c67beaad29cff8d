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
    csr::{build_csr, CsrTopology},
    error::GraphError,
    id_map::IdMap,
    ids::{EdgeSlot, GraphId, MetadataToken, NodeSlot},
    ingest::{phyllotaxis, ParsedGraph},
};
use fxhash::FxHashMap;
use log::trace;
use smallvec::SmallVec;
use std::ops::Range;

/// Node attribute record: `radius, r, g, b, selected, hovered, birth_time,
/// tex_index`. Radius ≤ 0 marks the slot dead.
pub const NODE_ATTR_FLOATS: usize = 8;

/// Edge attribute record: `width, r, g, b, selected, hovered, curvature,
/// opacity`.
pub const EDGE_ATTR_FLOATS: usize = 8;

pub const DEFAULT_NODE_RADIUS: f32 = 5.0;
pub const DEFAULT_NODE_COLOR: [f32; 4] = [0.42, 0.56, 0.92, 1.0];
pub const DEFAULT_EDGE_WIDTH: f32 = 1.0;
pub const DEFAULT_EDGE_COLOR: [f32; 4] = [0.55, 0.58, 0.64, 0.9];

const A_RADIUS: usize = 0;
const A_COLOR: usize = 1; // r, g, b
const A_SELECTED: usize = 4;
const A_HOVERED: usize = 5;
const A_BIRTH: usize = 6;
const A_TEX: usize = 7;

const E_WIDTH: usize = 0;
const E_COLOR: usize = 1; // r, g, b
const E_SELECTED: usize = 4;
const E_HOVERED: usize = 5;
const E_CURVATURE: usize = 6;
const E_OPACITY: usize = 7;

const INITIAL_NODE_CAPACITY: usize = 64;
const INITIAL_EDGE_CAPACITY: usize = 64;

#[derive(Clone, Debug, Default)]
pub struct NodePatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub radius: Option<f32>,
    pub color: Option<[f32; 4]>,
    pub type_tag: Option<String>,
    pub metadata: Option<MetadataToken>,
    pub tex_index: Option<f32>,
}

#[derive(Clone, Debug, Default)]
pub struct EdgePatch {
    pub width: Option<f32>,
    pub color: Option<[f32; 4]>,
    pub curvature: Option<f32>,
    pub opacity: Option<f32>,
    pub type_tag: Option<String>,
    pub metadata: Option<MetadataToken>,
}

/// The minimal set of GPU uploads a frame must perform to catch up with
/// CPU-side mutations. Ranges are in slots, half-open.
#[derive(Clone, Debug, Default)]
pub struct UploadSnapshot {
    pub positions: Option<Range<usize>>,
    pub node_attrs: Option<Range<usize>>,
    pub edge_attrs: Option<Range<usize>>,
    pub edge_endpoints: Option<Range<usize>>,
    pub csr: bool,
    pub node_capacity_changed: bool,
    pub edge_capacity_changed: bool,
}

impl UploadSnapshot {
    pub fn is_empty(&self) -> bool {
        self.positions.is_none()
            && self.node_attrs.is_none()
            && self.edge_attrs.is_none()
            && self.edge_endpoints.is_none()
            && !self.csr
            && !self.node_capacity_changed
            && !self.edge_capacity_changed
    }
}

#[derive(Clone, Debug, Default)]
struct DirtyState {
    positions: Option<(usize, usize)>,
    node_attrs: Option<(usize, usize)>,
    edge_attrs: Option<(usize, usize)>,
    edge_endpoints: Option<(usize, usize)>,
    csr: bool,
    node_capacity_changed: bool,
    edge_capacity_changed: bool,
}

fn widen(range: &mut Option<(usize, usize)>, lo: usize, hi: usize) {
    *range = match *range {
        None => Some((lo, hi)),
        Some((a, b)) => Some((a.min(lo), b.max(hi))),
    };
}

fn take(range: &mut Option<(usize, usize)>) -> Option<Range<usize>> {
    range.take().map(|(lo, hi)| lo..hi)
}

/// The single CPU-side source of truth for graph topology and styling.
///
/// Node slots live in an arena with a free list; edges are a densely packed
/// array with swap-remove deletion. Every mutation leaves the adjacency
/// index consistent and records the GPU ranges it touched.
#[derive(Clone, Debug)]
pub struct MutableGraphState {
    positions_x: Vec<f32>,
    positions_y: Vec<f32>,
    node_attributes: Vec<f32>,
    node_high_water: usize,
    node_free_list: Vec<u32>,
    node_count: usize,
    node_ids: IdMap,
    node_types: FxHashMap<u32, String>,
    node_metadata: FxHashMap<u32, MetadataToken>,
    node_edges: Vec<SmallVec<[u32; 4]>>,
    pinned: Vec<u32>,

    edge_sources: Vec<u32>,
    edge_targets: Vec<u32>,
    edge_attributes: Vec<f32>,
    edge_count: usize,
    edge_ids: IdMap,
    edge_types: FxHashMap<u32, String>,
    edge_metadata: FxHashMap<u32, MetadataToken>,
    next_auto_edge_id: u64,

    dirty: DirtyState,
}

impl Default for MutableGraphState {
    fn default() -> Self {
        Self::with_capacity(INITIAL_NODE_CAPACITY, INITIAL_EDGE_CAPACITY)
    }
}

impl MutableGraphState {
    pub fn with_capacity(node_capacity: usize, edge_capacity: usize) -> Self {
        let node_capacity = node_capacity.max(1);
        let edge_capacity = edge_capacity.max(1);
        Self {
            positions_x: vec![0.0; node_capacity],
            positions_y: vec![0.0; node_capacity],
            node_attributes: vec![0.0; node_capacity * NODE_ATTR_FLOATS],
            node_high_water: 0,
            node_free_list: Vec::new(),
            node_count: 0,
            node_ids: IdMap::default(),
            node_types: FxHashMap::default(),
            node_metadata: FxHashMap::default(),
            node_edges: vec![SmallVec::new(); node_capacity],
            pinned: vec![0; (node_capacity + 31) / 32],
            edge_sources: vec![0; edge_capacity],
            edge_targets: vec![0; edge_capacity],
            edge_attributes: vec![0.0; edge_capacity * EDGE_ATTR_FLOATS],
            edge_count: 0,
            edge_ids: IdMap::default(),
            edge_types: FxHashMap::default(),
            edge_metadata: FxHashMap::default(),
            next_auto_edge_id: 0,
            dirty: DirtyState::default(),
        }
    }

    /// Seed a fresh state from an ingestion snapshot. Everything is marked
    /// dirty so the first frame uploads the lot.
    pub fn from_parsed(parsed: ParsedGraph) -> Self {
        let node_count = parsed.node_ids.len();
        let edge_count = parsed.edge_ids.len();
        let mut state = Self::with_capacity(
            node_count.max(INITIAL_NODE_CAPACITY),
            edge_count.max(INITIAL_EDGE_CAPACITY),
        );
        state.positions_x[..node_count].copy_from_slice(&parsed.positions_x);
        state.positions_y[..node_count].copy_from_slice(&parsed.positions_y);
        state.node_attributes[..node_count * NODE_ATTR_FLOATS]
            .copy_from_slice(&parsed.node_attributes);
        for (slot, id) in parsed.node_ids.into_iter().enumerate() {
            state.node_ids.bind(id, slot as u32);
        }
        state.node_high_water = node_count;
        state.node_count = node_count;
        state.node_types = parsed.node_types;
        state.node_metadata = parsed.node_metadata;

        state.edge_sources[..edge_count].copy_from_slice(&parsed.edge_sources);
        state.edge_targets[..edge_count].copy_from_slice(&parsed.edge_targets);
        state.edge_attributes[..edge_count * EDGE_ATTR_FLOATS]
            .copy_from_slice(&parsed.edge_attributes);
        for (slot, id) in parsed.edge_ids.into_iter().enumerate() {
            state.edge_ids.bind(id, slot as u32);
        }
        state.edge_count = edge_count;
        state.edge_types = parsed.edge_types;
        state.edge_metadata = parsed.edge_metadata;

        for e in 0..edge_count {
            let (s, t) = (state.edge_sources[e], state.edge_targets[e]);
            state.attach_edge(s, t, e as u32);
        }
        state.mark_all_dirty();
        state
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn node_high_water(&self) -> usize {
        self.node_high_water
    }

    pub fn free_list_len(&self) -> usize {
        self.node_free_list.len()
    }

    pub fn node_capacity(&self) -> usize {
        self.positions_x.len()
    }

    pub fn edge_capacity(&self) -> usize {
        self.edge_sources.len()
    }

    pub fn positions_x(&self) -> &[f32] {
        &self.positions_x
    }

    pub fn positions_y(&self) -> &[f32] {
        &self.positions_y
    }

    pub fn node_attributes(&self) -> &[f32] {
        &self.node_attributes
    }

    pub fn edge_attributes(&self) -> &[f32] {
        &self.edge_attributes
    }

    pub fn edge_sources(&self) -> &[u32] {
        &self.edge_sources
    }

    pub fn edge_targets(&self) -> &[u32] {
        &self.edge_targets
    }

    pub fn pin_words(&self) -> &[u32] {
        &self.pinned
    }

    pub fn node_slot(&self, id: &GraphId) -> Option<NodeSlot> {
        self.node_ids.get(id)
    }

    pub fn edge_slot(&self, id: &GraphId) -> Option<EdgeSlot> {
        self.edge_ids.get(id)
    }

    pub fn node_id(&self, slot: NodeSlot) -> Option<&GraphId> {
        self.node_ids.id_of(slot)
    }

    pub fn edge_id(&self, slot: EdgeSlot) -> Option<&GraphId> {
        self.edge_ids.id_of(slot)
    }

    pub fn is_live_node(&self, slot: NodeSlot) -> bool {
        self.node_ids.id_of(slot).is_some()
    }

    pub fn node_position(&self, slot: NodeSlot) -> (f32, f32) {
        (
            self.positions_x[slot as usize],
            self.positions_y[slot as usize],
        )
    }

    pub fn node_radius(&self, slot: NodeSlot) -> f32 {
        self.node_attributes[slot as usize * NODE_ATTR_FLOATS + A_RADIUS]
    }

    pub fn edge_endpoints(&self, slot: EdgeSlot) -> (NodeSlot, NodeSlot) {
        (
            self.edge_sources[slot as usize],
            self.edge_targets[slot as usize],
        )
    }

    pub fn edge_width(&self, slot: EdgeSlot) -> f32 {
        self.edge_attributes[slot as usize * EDGE_ATTR_FLOATS + E_WIDTH]
    }

    pub fn edges_of(&self, slot: NodeSlot) -> &[u32] {
        &self.node_edges[slot as usize]
    }

    pub fn node_type(&self, slot: NodeSlot) -> Option<&str> {
        self.node_types.get(&slot).map(String::as_str)
    }

    pub fn node_metadata(&self, slot: NodeSlot) -> Option<MetadataToken> {
        self.node_metadata.get(&slot).copied()
    }

    pub fn live_node_slots(&self) -> impl Iterator<Item = NodeSlot> + '_ {
        (0..self.node_high_water as u32).filter(|&slot| self.is_live_node(slot))
    }

    /// Axis-aligned bounds over live node positions, grown by each node's
    /// radius. None when the graph is empty.
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let mut bounds: Option<(f32, f32, f32, f32)> = None;
        for slot in self.live_node_slots() {
            let (x, y) = self.node_position(slot);
            let r = self.node_radius(slot).max(0.0);
            bounds = Some(match bounds {
                None => (x - r, y - r, x + r, y + r),
                Some((min_x, min_y, max_x, max_y)) => (
                    min_x.min(x - r),
                    min_y.min(y - r),
                    max_x.max(x + r),
                    max_y.max(y + r),
                ),
            });
        }
        bounds
    }

    // ------------------------------------------------------------------
    // Node mutations
    // ------------------------------------------------------------------

    pub fn add_node(&mut self, spec: crate::NodeSpec, birth_time: f32) -> Result<NodeSlot, GraphError> {
        if self.node_ids.contains(&spec.id) {
            return Err(GraphError::DuplicateId(spec.id));
        }
        let slot = self.allocate_node_slot();
        let index = slot as usize;
        let (seed_x, seed_y) = phyllotaxis(index);
        self.positions_x[index] = spec.x.unwrap_or(seed_x);
        self.positions_y[index] = spec.y.unwrap_or(seed_y);
        let color = spec
            .color
            .as_deref()
            .and_then(crate::parse_color)
            .unwrap_or(DEFAULT_NODE_COLOR);
        let base = index * NODE_ATTR_FLOATS;
        self.node_attributes[base + A_RADIUS] = spec.radius.unwrap_or(DEFAULT_NODE_RADIUS);
        self.node_attributes[base + A_COLOR..base + A_COLOR + 3].copy_from_slice(&color[..3]);
        self.node_attributes[base + A_SELECTED] = 0.0;
        self.node_attributes[base + A_HOVERED] = 0.0;
        self.node_attributes[base + A_BIRTH] = birth_time;
        self.node_attributes[base + A_TEX] = 0.0;
        if let Some(tag) = spec.type_tag {
            self.node_types.insert(slot, tag);
        }
        if let Some(token) = spec.metadata {
            self.node_metadata.insert(slot, token);
        }
        self.node_ids.bind(spec.id, slot);
        self.node_count += 1;
        widen(&mut self.dirty.positions, index, index + 1);
        widen(&mut self.dirty.node_attrs, index, index + 1);
        self.dirty.csr = true;
        Ok(slot)
    }

    /// Removes a node and every edge incident to it.
    pub fn remove_node(&mut self, id: &GraphId) -> Result<NodeSlot, GraphError> {
        let slot = self
            .node_ids
            .get(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;
        // Swap-remove renumbers edges as we go, so always re-read the head.
        while let Some(&edge) = self.node_edges[slot as usize].first() {
            self.remove_edge_at(edge);
        }
        self.node_ids.unbind(id);
        self.node_types.remove(&slot);
        self.node_metadata.remove(&slot);
        self.free_node_slot(slot);
        self.node_count -= 1;
        self.dirty.csr = true;
        trace!("remove_node {} -> slot {}", id, slot);
        Ok(slot)
    }

    pub fn update_node(&mut self, id: &GraphId, patch: &NodePatch) -> Result<NodeSlot, GraphError> {
        let slot = self
            .node_ids
            .get(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;
        let index = slot as usize;
        let base = index * NODE_ATTR_FLOATS;
        if patch.x.is_some() || patch.y.is_some() {
            if let Some(x) = patch.x {
                self.positions_x[index] = x;
            }
            if let Some(y) = patch.y {
                self.positions_y[index] = y;
            }
            widen(&mut self.dirty.positions, index, index + 1);
        }
        if let Some(radius) = patch.radius {
            self.node_attributes[base + A_RADIUS] = radius;
        }
        if let Some(color) = patch.color {
            self.node_attributes[base + A_COLOR..base + A_COLOR + 3]
                .copy_from_slice(&color[..3]);
        }
        if let Some(tex) = patch.tex_index {
            self.node_attributes[base + A_TEX] = tex;
        }
        if patch.radius.is_some() || patch.color.is_some() || patch.tex_index.is_some() {
            widen(&mut self.dirty.node_attrs, index, index + 1);
        }
        if let Some(tag) = &patch.type_tag {
            self.node_types.insert(slot, tag.clone());
        }
        if let Some(token) = patch.metadata {
            self.node_metadata.insert(slot, token);
        }
        Ok(slot)
    }

    /// Refresh the CPU shadow from a simulation readback. Unlike
    /// [MutableGraphState::set_node_position] this marks nothing dirty: the
    /// values came from the GPU and do not need a round trip back.
    pub fn adopt_positions(&mut self, xs: &[f32], ys: &[f32]) {
        let n = xs.len().min(ys.len()).min(self.node_capacity());
        self.positions_x[..n].copy_from_slice(&xs[..n]);
        self.positions_y[..n].copy_from_slice(&ys[..n]);
    }

    pub fn set_node_position(&mut self, slot: NodeSlot, x: f32, y: f32) {
        let index = slot as usize;
        self.positions_x[index] = x;
        self.positions_y[index] = y;
        widen(&mut self.dirty.positions, index, index + 1);
    }

    pub fn set_node_selected(&mut self, slot: NodeSlot, selected: bool) {
        self.write_node_flag(slot, A_SELECTED, selected);
    }

    pub fn set_node_hovered(&mut self, slot: NodeSlot, hovered: bool) {
        self.write_node_flag(slot, A_HOVERED, hovered);
    }

    fn write_node_flag(&mut self, slot: NodeSlot, offset: usize, value: bool) {
        let index = slot as usize;
        self.node_attributes[index * NODE_ATTR_FLOATS + offset] = if value { 1.0 } else { 0.0 };
        widen(&mut self.dirty.node_attrs, index, index + 1);
    }

    pub fn pin_slot(&mut self, slot: NodeSlot) {
        self.pinned[slot as usize / 32] |= 1 << (slot % 32);
    }

    pub fn unpin_slot(&mut self, slot: NodeSlot) {
        self.pinned[slot as usize / 32] &= !(1 << (slot % 32));
    }

    pub fn is_pinned(&self, slot: NodeSlot) -> bool {
        self.pinned[slot as usize / 32] & (1 << (slot % 32)) != 0
    }

    // ------------------------------------------------------------------
    // Edge mutations
    // ------------------------------------------------------------------

    pub fn add_edge(&mut self, spec: crate::EdgeSpec) -> Result<EdgeSlot, GraphError> {
        let source = self
            .node_ids
            .get(&spec.source)
            .ok_or_else(|| GraphError::NotFound(spec.source.clone()))?;
        let target = self
            .node_ids
            .get(&spec.target)
            .ok_or_else(|| GraphError::NotFound(spec.target.clone()))?;
        let id = match spec.id {
            Some(id) => {
                if self.edge_ids.contains(&id) {
                    return Err(GraphError::DuplicateId(id));
                }
                id
            }
            None => self.next_auto_edge_id(),
        };
        self.ensure_edge_capacity(self.edge_count + 1);
        let slot = self.edge_count as u32;
        let index = slot as usize;
        self.edge_sources[index] = source;
        self.edge_targets[index] = target;
        let color = spec
            .color
            .as_deref()
            .and_then(crate::parse_color)
            .unwrap_or(DEFAULT_EDGE_COLOR);
        let base = index * EDGE_ATTR_FLOATS;
        self.edge_attributes[base + E_WIDTH] = spec.width.unwrap_or(DEFAULT_EDGE_WIDTH);
        self.edge_attributes[base + E_COLOR..base + E_COLOR + 3].copy_from_slice(&color[..3]);
        self.edge_attributes[base + E_SELECTED] = 0.0;
        self.edge_attributes[base + E_HOVERED] = 0.0;
        self.edge_attributes[base + E_CURVATURE] = spec.curvature.unwrap_or(0.0);
        self.edge_attributes[base + E_OPACITY] = spec.opacity.unwrap_or(color[3]);
        if let Some(tag) = spec.type_tag {
            self.edge_types.insert(slot, tag);
        }
        if let Some(token) = spec.metadata {
            self.edge_metadata.insert(slot, token);
        }
        self.edge_ids.bind(id, slot);
        self.attach_edge(source, target, slot);
        self.edge_count += 1;
        widen(&mut self.dirty.edge_attrs, index, index + 1);
        widen(&mut self.dirty.edge_endpoints, index, index + 1);
        self.dirty.csr = true;
        Ok(slot)
    }

    pub fn remove_edge(&mut self, id: &GraphId) -> Result<(), GraphError> {
        let slot = self
            .edge_ids
            .get(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;
        self.remove_edge_at(slot);
        Ok(())
    }

    pub fn update_edge(&mut self, id: &GraphId, patch: &EdgePatch) -> Result<EdgeSlot, GraphError> {
        let slot = self
            .edge_ids
            .get(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;
        let index = slot as usize;
        let base = index * EDGE_ATTR_FLOATS;
        if let Some(width) = patch.width {
            self.edge_attributes[base + E_WIDTH] = width;
        }
        if let Some(color) = patch.color {
            self.edge_attributes[base + E_COLOR..base + E_COLOR + 3]
                .copy_from_slice(&color[..3]);
        }
        if let Some(curvature) = patch.curvature {
            self.edge_attributes[base + E_CURVATURE] = curvature;
        }
        if let Some(opacity) = patch.opacity {
            self.edge_attributes[base + E_OPACITY] = opacity;
        }
        widen(&mut self.dirty.edge_attrs, index, index + 1);
        if let Some(tag) = &patch.type_tag {
            self.edge_types.insert(slot, tag.clone());
        }
        if let Some(token) = patch.metadata {
            self.edge_metadata.insert(slot, token);
        }
        Ok(slot)
    }

    pub fn set_edge_selected(&mut self, slot: EdgeSlot, selected: bool) {
        self.write_edge_flag(slot, E_SELECTED, selected);
    }

    pub fn set_edge_hovered(&mut self, slot: EdgeSlot, hovered: bool) {
        self.write_edge_flag(slot, E_HOVERED, hovered);
    }

    fn write_edge_flag(&mut self, slot: EdgeSlot, offset: usize, value: bool) {
        let index = slot as usize;
        self.edge_attributes[index * EDGE_ATTR_FLOATS + offset] = if value { 1.0 } else { 0.0 };
        widen(&mut self.dirty.edge_attrs, index, index + 1);
    }

    // ------------------------------------------------------------------
    // Upload coordination
    // ------------------------------------------------------------------

    /// Drain the dirty set. The caller uploads the returned ranges before
    /// the next simulation dispatch or draw.
    pub fn snapshot_for_upload(&mut self) -> UploadSnapshot {
        let snapshot = UploadSnapshot {
            positions: take(&mut self.dirty.positions),
            node_attrs: take(&mut self.dirty.node_attrs),
            edge_attrs: take(&mut self.dirty.edge_attrs),
            edge_endpoints: take(&mut self.dirty.edge_endpoints),
            csr: self.dirty.csr,
            node_capacity_changed: self.dirty.node_capacity_changed,
            edge_capacity_changed: self.dirty.edge_capacity_changed,
        };
        self.dirty.csr = false;
        self.dirty.node_capacity_changed = false;
        self.dirty.edge_capacity_changed = false;
        snapshot
    }

    /// Flag every array for re-upload; used after initial load and after
    /// device-lost recovery.
    pub fn mark_all_dirty(&mut self) {
        widen(&mut self.dirty.positions, 0, self.node_high_water.max(1));
        widen(&mut self.dirty.node_attrs, 0, self.node_high_water.max(1));
        widen(&mut self.dirty.edge_attrs, 0, self.edge_count.max(1));
        widen(&mut self.dirty.edge_endpoints, 0, self.edge_count.max(1));
        self.dirty.csr = true;
        self.dirty.node_capacity_changed = true;
        self.dirty.edge_capacity_changed = true;
    }

    pub fn build_csr(&self) -> CsrTopology {
        build_csr(
            &self.edge_sources,
            &self.edge_targets,
            self.edge_count,
            self.node_high_water,
        )
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn allocate_node_slot(&mut self) -> u32 {
        if let Some(slot) = self.node_free_list.pop() {
            return slot;
        }
        let slot = self.node_high_water;
        self.ensure_node_capacity(slot + 1);
        self.node_high_water += 1;
        slot as u32
    }

    fn free_node_slot(&mut self, slot: u32) {
        let index = slot as usize;
        self.positions_x[index] = 0.0;
        self.positions_y[index] = 0.0;
        let base = index * NODE_ATTR_FLOATS;
        self.node_attributes[base..base + NODE_ATTR_FLOATS].fill(0.0);
        self.node_edges[index].clear();
        self.unpin_slot(slot);
        widen(&mut self.dirty.positions, index, index + 1);
        widen(&mut self.dirty.node_attrs, index, index + 1);
        self.node_free_list.push(slot);
        // Shrink the high-water mark while the tail is entirely dead.
        while self.node_high_water > 0 {
            let top = (self.node_high_water - 1) as u32;
            match self.node_free_list.iter().position(|&s| s == top) {
                Some(at) => {
                    self.node_free_list.swap_remove(at);
                    self.node_high_water -= 1;
                }
                None => break,
            }
        }
    }

    fn attach_edge(&mut self, source: u32, target: u32, edge: u32) {
        self.node_edges[source as usize].push(edge);
        if source != target {
            self.node_edges[target as usize].push(edge);
        }
    }

    fn detach_edge(&mut self, node: u32, edge: u32) {
        let edges = &mut self.node_edges[node as usize];
        if let Some(at) = edges.iter().position(|&e| e == edge) {
            edges.swap_remove(at);
        }
    }

    fn remove_edge_at(&mut self, slot: EdgeSlot) {
        let index = slot as usize;
        let last = self.edge_count - 1;
        let (source, target) = (self.edge_sources[index], self.edge_targets[index]);
        self.detach_edge(source, slot);
        if source != target {
            self.detach_edge(target, slot);
        }
        if let Some(id) = self.edge_ids.id_of(slot).cloned() {
            self.edge_ids.unbind(&id);
        }
        self.edge_types.remove(&slot);
        self.edge_metadata.remove(&slot);

        if index != last {
            self.edge_sources[index] = self.edge_sources[last];
            self.edge_targets[index] = self.edge_targets[last];
            let (head, tail) = self.edge_attributes.split_at_mut(last * EDGE_ATTR_FLOATS);
            head[index * EDGE_ATTR_FLOATS..(index + 1) * EDGE_ATTR_FLOATS]
                .copy_from_slice(&tail[..EDGE_ATTR_FLOATS]);
            // The moved edge changed slots; patch adjacency and id binding.
            let (ms, mt) = (self.edge_sources[index], self.edge_targets[index]);
            self.replace_edge_ref(ms, last as u32, slot);
            if ms != mt {
                self.replace_edge_ref(mt, last as u32, slot);
            }
            self.edge_ids.move_slot(last as u32, slot);
            if let Some(tag) = self.edge_types.remove(&(last as u32)) {
                self.edge_types.insert(slot, tag);
            }
            if let Some(token) = self.edge_metadata.remove(&(last as u32)) {
                self.edge_metadata.insert(slot, token);
            }
            widen(&mut self.dirty.edge_attrs, index, index + 1);
            widen(&mut self.dirty.edge_endpoints, index, index + 1);
        }
        self.edge_sources[last] = 0;
        self.edge_targets[last] = 0;
        self.edge_attributes[last * EDGE_ATTR_FLOATS..(last + 1) * EDGE_ATTR_FLOATS].fill(0.0);
        self.edge_count -= 1;
        self.dirty.csr = true;
    }

    fn replace_edge_ref(&mut self, node: u32, from: u32, to: u32) {
        for edge in self.node_edges[node as usize].iter_mut() {
            if *edge == from {
                *edge = to;
            }
        }
    }

    fn next_auto_edge_id(&mut self) -> GraphId {
        loop {
            let id = GraphId::Text(format!("__edge_{}", self.next_auto_edge_id));
            self.next_auto_edge_id += 1;
            if !self.edge_ids.contains(&id) {
                return id;
            }
        }
    }

    fn ensure_node_capacity(&mut self, required: usize) {
        let capacity = self.node_capacity();
        if required <= capacity {
            return;
        }
        let new_capacity = required.max(capacity + capacity / 2).max(INITIAL_NODE_CAPACITY);
        trace!("growing node capacity {} -> {}", capacity, new_capacity);
        self.positions_x.resize(new_capacity, 0.0);
        self.positions_y.resize(new_capacity, 0.0);
        self.node_attributes.resize(new_capacity * NODE_ATTR_FLOATS, 0.0);
        self.node_edges.resize(new_capacity, SmallVec::new());
        self.pinned.resize((new_capacity + 31) / 32, 0);
        self.dirty.node_capacity_changed = true;
    }

    fn ensure_edge_capacity(&mut self, required: usize) {
        let capacity = self.edge_capacity();
        if required <= capacity {
            return;
        }
        let new_capacity = required.max(capacity + capacity / 2).max(INITIAL_EDGE_CAPACITY);
        trace!("growing edge capacity {} -> {}", capacity, new_capacity);
        self.edge_sources.resize(new_capacity, 0);
        self.edge_targets.resize(new_capacity, 0);
        self.edge_attributes.resize(new_capacity * EDGE_ATTR_FLOATS, 0.0);
        self.dirty.edge_capacity_changed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EdgeSpec, NodeSpec};

    fn node(id: u64) -> NodeSpec {
        NodeSpec::new(id)
    }

    fn edge(source: u64, target: u64) -> EdgeSpec {
        EdgeSpec::new(source, target)
    }

    fn check_invariants(state: &MutableGraphState) {
        assert_eq!(
            state.node_count() + state.free_list_len(),
            state.node_high_water(),
            "arena accounting broke"
        );
        for e in 0..state.edge_count() {
            let (s, t) = state.edge_endpoints(e as u32);
            assert!(state.is_live_node(s), "edge {} has dead source {}", e, s);
            assert!(state.is_live_node(t), "edge {} has dead target {}", e, t);
            assert!(state.edges_of(s).contains(&(e as u32)));
            assert!(state.edges_of(t).contains(&(e as u32)));
        }
        for slot in 0..state.node_high_water() as u32 {
            if !state.is_live_node(slot) {
                let (x, y) = state.node_position(slot);
                assert_eq!((x, y), (0.0, 0.0), "freed slot {} keeps a position", slot);
                assert_eq!(state.node_radius(slot), 0.0, "freed slot {} keeps a radius", slot);
            }
        }
        let csr = state.build_csr();
        assert_eq!(csr.offsets.len(), state.node_high_water() + 1);
        assert!(csr.offsets.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*csr.offsets.last().unwrap() as usize, state.edge_count());
        assert_eq!(csr.targets.len(), state.edge_count());
    }

    #[test]
    fn round_trip_with_cascading_removal() {
        fastrand::seed(0xC0FFEE);
        let mut state = MutableGraphState::default();
        for i in 0..500u64 {
            state.add_node(node(i), 0.0).unwrap();
        }
        for _ in 0..1000 {
            let spec = edge(fastrand::u64(..500), fastrand::u64(..500));
            state.add_edge(spec).unwrap();
        }
        assert_eq!(state.node_count(), 500);
        assert_eq!(state.edge_count(), 1000);
        check_invariants(&state);

        let mut removed = Vec::new();
        while removed.len() < 100 {
            let candidate = fastrand::u64(..500);
            if !removed.contains(&candidate) {
                state.remove_node(&GraphId::from(candidate)).unwrap();
                removed.push(candidate);
            }
        }
        assert_eq!(state.node_count(), 400);
        check_invariants(&state);
        for e in 0..state.edge_count() {
            let (s, t) = state.edge_endpoints(e as u32);
            for id in [state.node_id(s).unwrap(), state.node_id(t).unwrap()] {
                if let GraphId::Int(n) = id {
                    assert!(!removed.contains(n), "edge still references removed {}", n);
                }
            }
        }
    }

    #[test]
    fn capacity_growth_keeps_slots_unique() {
        let mut state = MutableGraphState::with_capacity(16, 16);
        let initial_capacity = state.node_capacity();
        let mut seen = std::collections::HashSet::new();
        let mut next = 0u64;
        while state.node_high_water() <= initial_capacity * 2 {
            for _ in 0..10 {
                let slot = state.add_node(node(next), 0.0).unwrap();
                assert!(seen.insert(slot), "slot {} was handed out twice", slot);
                next += 1;
            }
            if next >= 2 {
                state.add_edge(edge(next - 2, next - 1)).unwrap();
            }
            let csr = state.build_csr();
            assert_eq!(csr.offsets.len(), state.node_high_water() + 1);
            assert_eq!(csr.targets.len(), state.edge_count());
        }
        assert!(state.node_capacity() > initial_capacity);
        check_invariants(&state);
    }

    #[test]
    fn swap_remove_patches_adjacency_for_the_moved_edge() {
        let mut state = MutableGraphState::default();
        for i in 0..4u64 {
            state.add_node(node(i), 0.0).unwrap();
        }
        let mut e0 = edge(0, 1);
        e0.id = Some(GraphId::from("e0"));
        let mut e1 = edge(1, 2);
        e1.id = Some(GraphId::from("e1"));
        let mut e2 = edge(2, 3);
        e2.id = Some(GraphId::from("e2"));
        state.add_edge(e0).unwrap();
        state.add_edge(e1).unwrap();
        state.add_edge(e2).unwrap();

        state.remove_edge(&GraphId::from("e0")).unwrap();
        assert_eq!(state.edge_count(), 2);
        let mut remaining: Vec<(u32, u32)> = (0..2).map(|e| state.edge_endpoints(e)).collect();
        remaining.sort_unstable();
        assert_eq!(remaining, vec![(1, 2), (2, 3)]);

        // (2,3) moved into slot 0; node 3's adjacency must point there.
        let node3_edges = state.edges_of(3);
        assert_eq!(node3_edges.len(), 1);
        let moved = node3_edges[0];
        assert_eq!(state.edge_endpoints(moved), (2, 3));
        assert_eq!(state.edge_slot(&GraphId::from("e2")), Some(moved));
        check_invariants(&state);
    }

    #[test]
    fn swap_remove_is_a_permutation_minus_the_victim() {
        fastrand::seed(0xBEEF);
        let mut state = MutableGraphState::default();
        for i in 0..20u64 {
            state.add_node(node(i), 0.0).unwrap();
        }
        let mut expected = Vec::new();
        for n in 0..50u64 {
            let (s, t) = (fastrand::u64(..20), fastrand::u64(..20));
            let mut spec = edge(s, t);
            spec.id = Some(GraphId::Text(format!("e{}", n)));
            state.add_edge(spec).unwrap();
            expected.push((n, (s as u32, t as u32)));
        }
        for _ in 0..30 {
            let victim = fastrand::usize(..expected.len());
            let (n, pair) = expected.swap_remove(victim);
            state.remove_edge(&GraphId::Text(format!("e{}", n))).unwrap();
            let mut live: Vec<(u32, u32)> =
                (0..state.edge_count()).map(|e| state.edge_endpoints(e as u32)).collect();
            let mut want: Vec<(u32, u32)> = expected.iter().map(|(_, p)| *p).collect();
            live.sort_unstable();
            want.sort_unstable();
            assert_eq!(live, want, "after removing {:?}", pair);
            check_invariants(&state);
        }
    }

    #[test]
    fn free_slots_are_reused_and_high_water_shrinks() {
        let mut state = MutableGraphState::default();
        for i in 0..5u64 {
            state.add_node(node(i), 0.0).unwrap();
        }
        assert_eq!(state.node_high_water(), 5);
        // Free an interior slot: high water holds, free list grows.
        state.remove_node(&GraphId::from(2u64)).unwrap();
        assert_eq!(state.node_high_water(), 5);
        assert_eq!(state.free_list_len(), 1);
        // The freed slot is reused for the next insert.
        let slot = state.add_node(node(100), 0.0).unwrap();
        assert_eq!(slot, 2);
        assert_eq!(state.free_list_len(), 0);
        // Freeing the tail shrinks the mark past interior dead slots too.
        state.remove_node(&GraphId::from(3u64)).unwrap();
        assert_eq!(state.node_high_water(), 5);
        state.remove_node(&GraphId::from(4u64)).unwrap();
        assert_eq!(state.node_high_water(), 3);
        assert_eq!(state.free_list_len(), 0);
        check_invariants(&state);
    }

    #[test]
    fn snapshot_drains_dirty_ranges() {
        let mut state = MutableGraphState::default();
        state.add_node(node(1), 0.0).unwrap();
        state.add_node(node(2), 0.0).unwrap();
        state.add_edge(edge(1, 2)).unwrap();
        let snapshot = state.snapshot_for_upload();
        assert_eq!(snapshot.positions, Some(0..2));
        assert_eq!(snapshot.node_attrs, Some(0..2));
        assert_eq!(snapshot.edge_endpoints, Some(0..1));
        assert!(snapshot.csr);
        assert!(state.snapshot_for_upload().is_empty());

        state.set_node_position(1, 10.0, 20.0);
        let snapshot = state.snapshot_for_upload();
        assert_eq!(snapshot.positions, Some(1..2));
        assert!(snapshot.node_attrs.is_none());
    }

    #[test]
    fn duplicate_and_missing_ids_fail_without_mutating() {
        let mut state = MutableGraphState::default();
        state.add_node(node(1), 0.0).unwrap();
        assert!(matches!(
            state.add_node(node(1), 0.0),
            Err(GraphError::DuplicateId(_))
        ));
        assert_eq!(state.node_count(), 1);
        assert!(matches!(
            state.add_edge(edge(1, 99)),
            Err(GraphError::NotFound(_))
        ));
        assert_eq!(state.edge_count(), 0);
        assert!(matches!(
            state.remove_node(&GraphId::from(99u64)),
            Err(GraphError::NotFound(_))
        ));
        check_invariants(&state);
    }

    #[test]
    fn randomized_mutation_stream_maintains_invariants() {
        fastrand::seed(0x5EED);
        let mut state = MutableGraphState::with_capacity(8, 8);
        let mut next_node = 0u64;
        let mut live_nodes: Vec<u64> = Vec::new();
        for _ in 0..600 {
            match fastrand::u32(..10) {
                0..=3 => {
                    state.add_node(node(next_node), 0.0).unwrap();
                    live_nodes.push(next_node);
                    next_node += 1;
                }
                4..=6 if live_nodes.len() >= 2 => {
                    let s = live_nodes[fastrand::usize(..live_nodes.len())];
                    let t = live_nodes[fastrand::usize(..live_nodes.len())];
                    state.add_edge(edge(s, t)).unwrap();
                }
                7..=8 if !live_nodes.is_empty() => {
                    let victim = live_nodes.swap_remove(fastrand::usize(..live_nodes.len()));
                    state.remove_node(&GraphId::from(victim)).unwrap();
                }
                _ if state.edge_count() > 0 => {
                    let slot = fastrand::u32(..state.edge_count() as u32);
                    let id = state.edge_id(slot).unwrap().clone();
                    state.remove_edge(&id).unwrap();
                }
                _ => {}
            }
            check_invariants(&state);
        }
    }

    #[test]
    fn pinning_is_a_per_slot_bitset() {
        let mut state = MutableGraphState::default();
        for i in 0..40u64 {
            state.add_node(node(i), 0.0).unwrap();
        }
        state.pin_slot(0);
        state.pin_slot(33);
        assert!(state.is_pinned(0));
        assert!(state.is_pinned(33));
        assert!(!state.is_pinned(1));
        state.unpin_slot(33);
        assert!(!state.is_pinned(33));
        assert_eq!(state.pin_words()[0], 1);
    }
}
