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
mod csr;
mod error;
mod id_map;
mod ids;
mod ingest;
mod state;

pub use crate::{
    csr::{build_csr, CsrTopology},
    error::GraphError,
    id_map::IdMap,
    ids::{EdgeSlot, GraphId, MetadataToken, NodeSlot},
    ingest::{
        parse_color, parse_graph, phyllotaxis, EdgeSpec, GraphInput, IngestOptions, NodeSpec,
        ParsedGraph, TypedGraphData,
    },
    state::{
        EdgePatch, MutableGraphState, NodePatch, UploadSnapshot, DEFAULT_EDGE_COLOR,
        DEFAULT_EDGE_WIDTH, DEFAULT_NODE_COLOR, DEFAULT_NODE_RADIUS, EDGE_ATTR_FLOATS,
        NODE_ATTR_FLOATS,
    },
};
