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
use crate::ids::GraphId;
use thiserror::Error;

/// The public failure taxonomy. Every precondition is checked before any
/// state is touched, so a returned error always leaves the engine unchanged.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("gpu api unavailable: {0}")]
    Unsupported(String),
    #[error("gpu adapter denied the device request: {0}")]
    AdapterDenied(String),
    #[error("gpu device lost")]
    DeviceLost,
    #[error("invalid graph data: {0}")]
    InvalidGraphData(String),
    #[error("duplicate id: {0}")]
    DuplicateId(GraphId),
    #[error("id not found: {0}")]
    NotFound(GraphId),
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    #[error("position arrays disagree on length: x has {0}, y has {1}")]
    InvalidPositions(usize, usize),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
