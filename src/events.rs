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
use event_bus::BusEvent;
use graph_state::GraphId;

/// Everything the engine publishes. Subscribers key on the kind string and
/// receive the matching payload variant, so handlers know statically what
/// they get.
#[derive(Clone, Debug)]
pub enum GraphEvent {
    NodeClick { id: GraphId, x: f32, y: f32 },
    NodeDoubleClick { id: GraphId, x: f32, y: f32 },
    NodeHoverEnter { id: GraphId },
    NodeHoverLeave { id: GraphId },
    NodeDragStart { id: GraphId },
    NodeDragMove { id: GraphId, x: f32, y: f32 },
    NodeDragEnd { id: GraphId },
    EdgeClick { id: GraphId, x: f32, y: f32 },
    EdgeHoverEnter { id: GraphId },
    EdgeHoverLeave { id: GraphId },
    SelectionChange { nodes: Vec<GraphId>, edges: Vec<GraphId> },
    ViewportChange { x: f32, y: f32, scale: f32 },
    SimulationTick { alpha: f32 },
    SimulationEnd,
    BackgroundClick { x: f32, y: f32 },
    Error { message: String },
}

impl BusEvent for GraphEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::NodeClick { .. } => "node:click",
            Self::NodeDoubleClick { .. } => "node:doubleclick",
            Self::NodeHoverEnter { .. } => "node:hoverenter",
            Self::NodeHoverLeave { .. } => "node:hoverleave",
            Self::NodeDragStart { .. } => "node:dragstart",
            Self::NodeDragMove { .. } => "node:dragmove",
            Self::NodeDragEnd { .. } => "node:dragend",
            Self::EdgeClick { .. } => "edge:click",
            Self::EdgeHoverEnter { .. } => "edge:hoverenter",
            Self::EdgeHoverLeave { .. } => "edge:hoverleave",
            Self::SelectionChange { .. } => "selection:change",
            Self::ViewportChange { .. } => "viewport:change",
            Self::SimulationTick { .. } => "simulation:tick",
            Self::SimulationEnd => "simulation:end",
            Self::BackgroundClick { .. } => "background:click",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::EventBus;
    use std::{cell::Cell, rc::Rc};

    #[test]
    fn kind_strings_route_subscriptions() {
        let bus = EventBus::new();
        let ticks = Rc::new(Cell::new(0u32));
        let seen = ticks.clone();
        bus.on("simulation:tick", move |event| {
            if let GraphEvent::SimulationTick { alpha } = event {
                assert!(*alpha >= 0.0);
                seen.set(seen.get() + 1);
            }
        });
        bus.publish(&GraphEvent::SimulationTick { alpha: 0.5 });
        bus.publish(&GraphEvent::SimulationEnd);
        assert_eq!(ticks.get(), 1);
    }
}
