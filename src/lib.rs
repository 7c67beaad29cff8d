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

//! HeroineGraph: GPU-accelerated force-directed layout and rendering for
//! large graphs. The force simulation, density field, node/edge
//! rasterization and overlay layers all run on the GPU via wgpu; the host
//! keeps a mutable CPU mirror for ids, topology and hit testing, and
//! streams incremental patches instead of reloading.

mod engine;
mod events;
mod interaction;
mod spatial;
mod stats;

pub use crate::{
    engine::{EdgeUpdate, GraphConfig, HeroineGraph, NodeUpdate},
    events::GraphEvent,
    spatial::SpatialIndex,
    stats::FrameStatsSnapshot,
};

// The vocabulary types embedders interact with, re-exported from the
// member crates so a single `use heroine_graph::*` is enough.
pub use draw::{
    ContourConfig, GlyphInstance, HeatmapConfig, LayerConfig, LayerKind, MetaballConfig,
};
pub use event_bus::Subscription;
pub use gpu::{GpuCapabilities, GpuConfig};
pub use graph_buffers::{EdgeFlowLayer, RenderConfigData};
pub use graph_state::{
    EdgeSpec, GraphError, GraphId, GraphInput, MetadataToken, NodeSpec, TypedGraphData,
};
pub use layout::{ForceConfig, SimStatus};
pub use viewport::ViewportConfig;
