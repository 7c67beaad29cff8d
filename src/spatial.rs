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
use graph_state::MutableGraphState;

/// Pluggable spatial query engine (an R-tree equivalent supplied by the
/// embedder). All queries are in graph coordinates; when no index is
/// installed the engine falls back to the brute-force paths below.
pub trait SpatialIndex {
    /// Full rebuild from `(slot, x, y, radius)` tuples of live nodes.
    fn rebuild(&mut self, nodes: &[(u32, f32, f32, f32)]);
    fn query_point(&self, x: f32, y: f32, tolerance: f32) -> Option<u32>;
    fn query_rect(&self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Vec<u32>;
    fn nearest(&self, x: f32, y: f32, max_distance: f32) -> Option<u32>;
}

/// Closest live node whose disc (plus `tolerance`) covers the point.
pub fn hit_test_node(
    state: &MutableGraphState,
    x: f32,
    y: f32,
    tolerance: f32,
) -> Option<u32> {
    let mut best: Option<(u32, f32)> = None;
    for slot in state.live_node_slots() {
        let (nx, ny) = state.node_position(slot);
        let radius = state.node_radius(slot);
        if radius <= 0.0 {
            continue;
        }
        let distance = (x - nx).hypot(y - ny);
        if distance <= radius + tolerance && best.map_or(true, |(_, d)| distance < d) {
            best = Some((slot, distance));
        }
    }
    best.map(|(slot, _)| slot)
}

/// Closest edge whose segment passes within `tolerance + half width` of
/// the point. Always brute force; edge count per pixel is small.
pub fn hit_test_edge(
    state: &MutableGraphState,
    x: f32,
    y: f32,
    tolerance: f32,
) -> Option<u32> {
    let mut best: Option<(u32, f32)> = None;
    for slot in 0..state.edge_count() as u32 {
        let (s, t) = state.edge_endpoints(slot);
        let (ax, ay) = state.node_position(s);
        let (bx, by) = state.node_position(t);
        let distance = point_segment_distance(x, y, ax, ay, bx, by);
        let reach = tolerance + state.edge_width(slot) * 0.5;
        if distance <= reach && best.map_or(true, |(_, d)| distance < d) {
            best = Some((slot, distance));
        }
    }
    best.map(|(slot, _)| slot)
}

pub fn nodes_in_rect(
    state: &MutableGraphState,
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
) -> Vec<u32> {
    state
        .live_node_slots()
        .filter(|&slot| {
            let (x, y) = state.node_position(slot);
            (min_x..=max_x).contains(&x) && (min_y..=max_y).contains(&y)
        })
        .collect()
}

pub fn nearest_node(
    state: &MutableGraphState,
    x: f32,
    y: f32,
    max_distance: f32,
) -> Option<u32> {
    let mut best: Option<(u32, f32)> = None;
    for slot in state.live_node_slots() {
        let (nx, ny) = state.node_position(slot);
        let distance = (x - nx).hypot(y - ny);
        if distance <= max_distance && best.map_or(true, |(_, d)| distance < d) {
            best = Some((slot, distance));
        }
    }
    best.map(|(slot, _)| slot)
}

pub fn point_segment_distance(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f32::EPSILON {
        return (px - ax).hypot(py - ay);
    }
    let t = (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0);
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (px - cx).hypot(py - cy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use graph_state::{EdgeSpec, NodeSpec};

    fn tri_state() -> MutableGraphState {
        let mut state = MutableGraphState::default();
        for (i, (x, y)) in [(0.0, 0.0), (50.0, 0.0), (0.0, 50.0)].iter().enumerate() {
            let mut spec = NodeSpec::new(i as u64);
            spec.x = Some(*x);
            spec.y = Some(*y);
            spec.radius = Some(10.0);
            state.add_node(spec, 0.0).unwrap();
        }
        state
    }

    #[test]
    fn brute_force_fallback_matches_the_contract() {
        let state = tri_state();
        // (48, 0) is inside the disc of the node at (50, 0).
        let hit = hit_test_node(&state, 48.0, 0.0, 0.0).unwrap();
        assert_eq!(state.node_position(hit), (50.0, 0.0));
        // (25, 25) is outside every radius-10 disc.
        assert_eq!(hit_test_node(&state, 25.0, 25.0, 0.0), None);
    }

    #[test]
    fn node_hits_prefer_the_closest_candidate() {
        let mut state = tri_state();
        let mut spec = NodeSpec::new(99u64);
        spec.x = Some(46.0);
        spec.y = Some(0.0);
        spec.radius = Some(10.0);
        state.add_node(spec, 0.0).unwrap();
        let hit = hit_test_node(&state, 47.0, 0.0, 0.0).unwrap();
        assert_eq!(state.node_position(hit), (46.0, 0.0));
    }

    #[test]
    fn point_segment_distance_is_exact() {
        assert_abs_diff_eq!(point_segment_distance(0.0, 5.0, -10.0, 0.0, 10.0, 0.0), 5.0);
        // Beyond the endpoint the distance goes to the endpoint itself.
        assert_abs_diff_eq!(
            point_segment_distance(13.0, 4.0, -10.0, 0.0, 10.0, 0.0),
            5.0
        );
        // Degenerate segment collapses to point distance.
        assert_abs_diff_eq!(point_segment_distance(3.0, 4.0, 0.0, 0.0, 0.0, 0.0), 5.0);
    }

    #[test]
    fn edge_hits_respect_width_and_tolerance() {
        let mut state = tri_state();
        let mut spec = EdgeSpec::new(0u64, 1u64);
        spec.width = Some(4.0);
        state.add_edge(spec).unwrap();
        // 2 units off the center line is within the 2px half width.
        assert_eq!(hit_test_edge(&state, 25.0, 2.0, 0.0), Some(0));
        assert_eq!(hit_test_edge(&state, 25.0, 9.0, 0.0), None);
        assert_eq!(hit_test_edge(&state, 25.0, 9.0, 8.0), Some(0));
    }

    #[test]
    fn rect_and_nearest_queries() {
        let state = tri_state();
        let mut hits = nodes_in_rect(&state, -1.0, -1.0, 60.0, 1.0);
        hits.sort_unstable();
        assert_eq!(hits.len(), 2);
        assert_eq!(nearest_node(&state, 40.0, 0.0, 100.0), Some(1));
        assert_eq!(nearest_node(&state, 40.0, 0.0, 5.0), None);
    }
}
