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
mod attrs;
mod edges;
mod ping_pong;
mod position;
mod uniforms;

pub use crate::{
    attrs::{AttributeBuffer, PinMaskBuffer},
    edges::EdgeBuffer,
    ping_pong::PingPongBuffer,
    position::PositionBuffer,
    uniforms::{
        EdgeFlowData, EdgeFlowLayer, RenderConfigData, SimUniformData, UniformBuffer,
        ViewportUniformData,
    },
};

/// Geometric growth used by every resizable GPU array.
pub fn grown_capacity(current: usize, required: usize) -> usize {
    required.max(current + current / 2).max(16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_is_geometric_and_sufficient() {
        assert_eq!(grown_capacity(64, 65), 96);
        assert_eq!(grown_capacity(64, 1000), 1000);
        assert_eq!(grown_capacity(0, 1), 16);
        assert!(grown_capacity(100, 101) >= 150);
    }
}
