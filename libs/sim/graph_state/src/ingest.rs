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
    error::GraphError,
    ids::{GraphId, MetadataToken},
    state::{DEFAULT_EDGE_COLOR, DEFAULT_EDGE_WIDTH, DEFAULT_NODE_COLOR, DEFAULT_NODE_RADIUS},
};
use fxhash::{FxHashMap, FxHashSet};
use log::warn;

#[derive(Clone, Debug)]
pub struct NodeSpec {
    pub id: GraphId,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub radius: Option<f32>,
    pub color: Option<String>,
    pub type_tag: Option<String>,
    pub metadata: Option<MetadataToken>,
}

impl NodeSpec {
    pub fn new(id: impl Into<GraphId>) -> Self {
        Self {
            id: id.into(),
            x: None,
            y: None,
            radius: None,
            color: None,
            type_tag: None,
            metadata: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EdgeSpec {
    pub id: Option<GraphId>,
    pub source: GraphId,
    pub target: GraphId,
    pub width: Option<f32>,
    pub color: Option<String>,
    pub curvature: Option<f32>,
    pub opacity: Option<f32>,
    pub type_tag: Option<String>,
    pub metadata: Option<MetadataToken>,
}

impl EdgeSpec {
    pub fn new(source: impl Into<GraphId>, target: impl Into<GraphId>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
            width: None,
            color: None,
            curvature: None,
            opacity: None,
            type_tag: None,
            metadata: None,
        }
    }
}

/// Parallel-typed-array input shape. Missing arrays are filled with
/// defaults; present arrays must agree with the declared counts.
#[derive(Clone, Debug, Default)]
pub struct TypedGraphData {
    pub node_count: usize,
    pub edge_count: usize,
    /// Interleaved `x, y` pairs, length `node_count * 2`.
    pub positions: Option<Vec<f32>>,
    pub node_radii: Option<Vec<f32>>,
    /// Interleaved rgba, length `node_count * 4`.
    pub node_colors: Option<Vec<f32>>,
    /// Interleaved `source, target` pairs, length `edge_count * 2`.
    pub edge_pairs: Option<Vec<u32>>,
    pub edge_widths: Option<Vec<f32>>,
    /// Interleaved rgba, length `edge_count * 4`.
    pub edge_colors: Option<Vec<f32>>,
    pub node_ids: Option<Vec<GraphId>>,
    pub edge_ids: Option<Vec<GraphId>>,
}

#[derive(Clone, Debug)]
pub enum GraphInput {
    Objects {
        nodes: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
    },
    Typed(TypedGraphData),
}

#[derive(Clone, Debug)]
pub struct IngestOptions {
    /// When false, edges naming unknown endpoints are dropped with a
    /// warning instead of failing validation.
    pub validate_references: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            validate_references: true,
        }
    }
}

/// Frozen, validated snapshot ready to seed the mutable state. Node slots
/// are the vector indices; edge endpoints are already resolved to slots.
#[derive(Clone, Debug, Default)]
pub struct ParsedGraph {
    pub node_ids: Vec<GraphId>,
    pub positions_x: Vec<f32>,
    pub positions_y: Vec<f32>,
    pub node_attributes: Vec<f32>,
    pub node_types: FxHashMap<u32, String>,
    pub node_metadata: FxHashMap<u32, MetadataToken>,
    pub edge_ids: Vec<GraphId>,
    pub edge_sources: Vec<u32>,
    pub edge_targets: Vec<u32>,
    pub edge_attributes: Vec<f32>,
    pub edge_types: FxHashMap<u32, String>,
    pub edge_metadata: FxHashMap<u32, MetadataToken>,
}

/// Parse a color string: `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb()`/`rgba()`
/// and the css named-color table. None on failure; callers fall back to a
/// default rather than raising.
pub fn parse_color(text: &str) -> Option<[f32; 4]> {
    csscolorparser::parse(text)
        .ok()
        .map(|c| [c.r as f32, c.g as f32, c.b as f32, c.a as f32])
}

const GOLDEN_ANGLE: f32 = 2.399_963_2;
const PHYLLOTAXIS_SPACING: f32 = 12.0;

/// Deterministic spiral seed position for a node with no explicit
/// coordinates.
pub fn phyllotaxis(index: usize) -> (f32, f32) {
    let i = index as f32;
    let radius = PHYLLOTAXIS_SPACING * i.sqrt();
    let theta = i * GOLDEN_ANGLE;
    (radius * theta.cos(), radius * theta.sin())
}

pub fn parse_graph(input: GraphInput, options: &IngestOptions) -> Result<ParsedGraph, GraphError> {
    match input {
        GraphInput::Objects { nodes, edges } => parse_objects(nodes, edges, options),
        GraphInput::Typed(data) => parse_typed(data),
    }
}

fn parse_objects(
    nodes: Vec<NodeSpec>,
    edges: Vec<EdgeSpec>,
    options: &IngestOptions,
) -> Result<ParsedGraph, GraphError> {
    let mut parsed = ParsedGraph::default();
    let mut slots: FxHashMap<GraphId, u32> = FxHashMap::default();

    for (index, spec) in nodes.into_iter().enumerate() {
        if slots.contains_key(&spec.id) {
            return Err(GraphError::InvalidGraphData(format!(
                "duplicate node id '{}'",
                spec.id
            )));
        }
        let slot = index as u32;
        let (seed_x, seed_y) = phyllotaxis(index);
        parsed.positions_x.push(spec.x.unwrap_or(seed_x));
        parsed.positions_y.push(spec.y.unwrap_or(seed_y));
        let color = spec
            .color
            .as_deref()
            .and_then(parse_color)
            .unwrap_or(DEFAULT_NODE_COLOR);
        parsed.node_attributes.extend_from_slice(&[
            spec.radius.unwrap_or(DEFAULT_NODE_RADIUS),
            color[0],
            color[1],
            color[2],
            0.0,
            0.0,
            0.0,
            0.0,
        ]);
        if let Some(tag) = spec.type_tag {
            parsed.node_types.insert(slot, tag);
        }
        if let Some(token) = spec.metadata {
            parsed.node_metadata.insert(slot, token);
        }
        slots.insert(spec.id.clone(), slot);
        parsed.node_ids.push(spec.id);
    }

    let mut edge_id_set: FxHashSet<GraphId> = FxHashSet::default();
    let mut next_auto = 0u64;
    for spec in edges {
        let (source, target) = match (slots.get(&spec.source), slots.get(&spec.target)) {
            (Some(&s), Some(&t)) => (s, t),
            _ => {
                if options.validate_references {
                    return Err(GraphError::InvalidGraphData(format!(
                        "edge references unknown endpoint '{}' -> '{}'",
                        spec.source, spec.target
                    )));
                }
                warn!(
                    "dropping edge with unknown endpoint '{}' -> '{}'",
                    spec.source, spec.target
                );
                continue;
            }
        };
        let id = match spec.id {
            Some(id) => id,
            None => loop {
                let id = GraphId::Text(format!("__edge_{}", next_auto));
                next_auto += 1;
                if !edge_id_set.contains(&id) {
                    break id;
                }
            },
        };
        if !edge_id_set.insert(id.clone()) {
            return Err(GraphError::InvalidGraphData(format!(
                "duplicate edge id '{}'",
                id
            )));
        }
        let color = spec
            .color
            .as_deref()
            .and_then(parse_color)
            .unwrap_or(DEFAULT_EDGE_COLOR);
        parsed.edge_sources.push(source);
        parsed.edge_targets.push(target);
        parsed.edge_attributes.extend_from_slice(&[
            spec.width.unwrap_or(DEFAULT_EDGE_WIDTH),
            color[0],
            color[1],
            color[2],
            0.0,
            0.0,
            spec.curvature.unwrap_or(0.0),
            spec.opacity.unwrap_or(color[3]),
        ]);
        let slot = (parsed.edge_ids.len()) as u32;
        if let Some(tag) = spec.type_tag {
            parsed.edge_types.insert(slot, tag);
        }
        if let Some(token) = spec.metadata {
            parsed.edge_metadata.insert(slot, token);
        }
        parsed.edge_ids.push(id);
    }
    Ok(parsed)
}

fn expect_len<T>(name: &str, array: &[T], expected: usize) -> Result<(), GraphError> {
    if array.len() != expected {
        return Err(GraphError::InvalidGraphData(format!(
            "{} has length {}, expected {}",
            name,
            array.len(),
            expected
        )));
    }
    Ok(())
}

fn parse_typed(data: TypedGraphData) -> Result<ParsedGraph, GraphError> {
    let n = data.node_count;
    let m = data.edge_count;
    if let Some(positions) = &data.positions {
        expect_len("positions", positions, n * 2)?;
    }
    if let Some(radii) = &data.node_radii {
        expect_len("node_radii", radii, n)?;
    }
    if let Some(colors) = &data.node_colors {
        expect_len("node_colors", colors, n * 4)?;
    }
    if let Some(pairs) = &data.edge_pairs {
        expect_len("edge_pairs", pairs, m * 2)?;
    } else if m > 0 {
        return Err(GraphError::InvalidGraphData(
            "edge_count > 0 requires edge_pairs".to_owned(),
        ));
    }
    if let Some(widths) = &data.edge_widths {
        expect_len("edge_widths", widths, m)?;
    }
    if let Some(colors) = &data.edge_colors {
        expect_len("edge_colors", colors, m * 4)?;
    }
    if let Some(ids) = &data.node_ids {
        expect_len("node_ids", ids, n)?;
    }
    if let Some(ids) = &data.edge_ids {
        expect_len("edge_ids", ids, m)?;
    }

    let mut parsed = ParsedGraph::default();
    for i in 0..n {
        let (seed_x, seed_y) = phyllotaxis(i);
        let (x, y) = match &data.positions {
            Some(p) => (p[i * 2], p[i * 2 + 1]),
            None => (seed_x, seed_y),
        };
        parsed.positions_x.push(x);
        parsed.positions_y.push(y);
        let radius = data
            .node_radii
            .as_ref()
            .map_or(DEFAULT_NODE_RADIUS, |r| r[i]);
        let color = match &data.node_colors {
            Some(c) => [c[i * 4], c[i * 4 + 1], c[i * 4 + 2], c[i * 4 + 3]],
            None => DEFAULT_NODE_COLOR,
        };
        parsed.node_attributes.extend_from_slice(&[
            radius, color[0], color[1], color[2], 0.0, 0.0, 0.0, 0.0,
        ]);
    }
    parsed.node_ids = match data.node_ids {
        Some(ids) => {
            let mut seen = FxHashSet::default();
            for id in &ids {
                if !seen.insert(id.clone()) {
                    return Err(GraphError::InvalidGraphData(format!(
                        "duplicate node id '{}'",
                        id
                    )));
                }
            }
            ids
        }
        None => (0..n).map(GraphId::from).collect(),
    };

    for e in 0..m {
        let pairs = data.edge_pairs.as_ref().expect("validated above");
        let (source, target) = (pairs[e * 2], pairs[e * 2 + 1]);
        if source as usize >= n || target as usize >= n {
            return Err(GraphError::InvalidGraphData(format!(
                "edge {} references node slot out of range ({}, {})",
                e, source, target
            )));
        }
        parsed.edge_sources.push(source);
        parsed.edge_targets.push(target);
        let width = data
            .edge_widths
            .as_ref()
            .map_or(DEFAULT_EDGE_WIDTH, |w| w[e]);
        let color = match &data.edge_colors {
            Some(c) => [c[e * 4], c[e * 4 + 1], c[e * 4 + 2], c[e * 4 + 3]],
            None => DEFAULT_EDGE_COLOR,
        };
        parsed.edge_attributes.extend_from_slice(&[
            width, color[0], color[1], color[2], 0.0, 0.0, 0.0, color[3],
        ]);
    }
    parsed.edge_ids = match data.edge_ids {
        Some(ids) => ids,
        None => (0..m).map(|e| GraphId::Text(format!("__edge_{}", e))).collect(),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MutableGraphState, EDGE_ATTR_FLOATS, NODE_ATTR_FLOATS};
    use approx::assert_abs_diff_eq;

    #[test]
    fn colors_parse_with_silent_fallback() {
        assert_abs_diff_eq!(parse_color("#ff0000").unwrap()[0], 1.0);
        assert_abs_diff_eq!(parse_color("#f00").unwrap()[0], 1.0);
        assert_abs_diff_eq!(parse_color("#ff000080").unwrap()[3], 0.50196, epsilon = 1e-4);
        assert_abs_diff_eq!(parse_color("rgb(0, 255, 0)").unwrap()[1], 1.0);
        assert_abs_diff_eq!(parse_color("rgba(0, 0, 255, 0.5)").unwrap()[3], 0.5);
        assert!(parse_color("tomato").is_some());
        assert!(parse_color("not-a-color").is_none());

        let nodes = vec![NodeSpec {
            color: Some("not-a-color".to_owned()),
            ..NodeSpec::new("a")
        }];
        let parsed =
            parse_graph(GraphInput::Objects { nodes, edges: vec![] }, &IngestOptions::default())
                .unwrap();
        assert_abs_diff_eq!(parsed.node_attributes[1], DEFAULT_NODE_COLOR[0]);
    }

    #[test]
    fn duplicate_node_ids_fail_validation() {
        let nodes = vec![NodeSpec::new("a"), NodeSpec::new("a")];
        let result =
            parse_graph(GraphInput::Objects { nodes, edges: vec![] }, &IngestOptions::default());
        assert!(matches!(result, Err(GraphError::InvalidGraphData(_))));
    }

    #[test]
    fn unknown_endpoints_fail_or_drop_by_option() {
        let nodes = vec![NodeSpec::new("a"), NodeSpec::new("b")];
        let edges = vec![EdgeSpec::new("a", "ghost")];
        let strict = parse_graph(
            GraphInput::Objects {
                nodes: nodes.clone(),
                edges: edges.clone(),
            },
            &IngestOptions::default(),
        );
        assert!(matches!(strict, Err(GraphError::InvalidGraphData(_))));

        let lenient = parse_graph(
            GraphInput::Objects { nodes, edges },
            &IngestOptions {
                validate_references: false,
            },
        )
        .unwrap();
        assert_eq!(lenient.edge_ids.len(), 0);
        assert_eq!(lenient.node_ids.len(), 2);
    }

    #[test]
    fn typed_arrays_must_agree_with_counts() {
        let data = TypedGraphData {
            node_count: 3,
            positions: Some(vec![0.0; 4]),
            ..Default::default()
        };
        assert!(matches!(
            parse_graph(GraphInput::Typed(data), &IngestOptions::default()),
            Err(GraphError::InvalidGraphData(_))
        ));
    }

    #[test]
    fn typed_arrays_fill_defaults() {
        let data = TypedGraphData {
            node_count: 3,
            edge_count: 2,
            edge_pairs: Some(vec![0, 1, 1, 2]),
            ..Default::default()
        };
        let parsed = parse_graph(GraphInput::Typed(data), &IngestOptions::default()).unwrap();
        assert_eq!(parsed.node_ids.len(), 3);
        assert_eq!(parsed.edge_sources, vec![0, 1]);
        assert_eq!(parsed.edge_targets, vec![1, 2]);
        assert_abs_diff_eq!(parsed.node_attributes[0], DEFAULT_NODE_RADIUS);
        assert_abs_diff_eq!(
            parsed.edge_attributes[EDGE_ATTR_FLOATS], // second record's width
            DEFAULT_EDGE_WIDTH
        );
        // Phyllotaxis spreads the seeds out.
        let (x1, y1) = (parsed.positions_x[1], parsed.positions_y[1]);
        let (x2, y2) = (parsed.positions_x[2], parsed.positions_y[2]);
        assert!((x1 - x2).abs() + (y1 - y2).abs() > 1.0);
    }

    #[test]
    fn typed_edge_pairs_out_of_range_fail() {
        let data = TypedGraphData {
            node_count: 2,
            edge_count: 1,
            edge_pairs: Some(vec![0, 5]),
            ..Default::default()
        };
        assert!(matches!(
            parse_graph(GraphInput::Typed(data), &IngestOptions::default()),
            Err(GraphError::InvalidGraphData(_))
        ));
    }

    #[test]
    fn parsed_graph_seeds_the_mutable_state() {
        let nodes = vec![
            NodeSpec {
                x: Some(1.0),
                y: Some(2.0),
                ..NodeSpec::new("a")
            },
            NodeSpec::new("b"),
        ];
        let edges = vec![EdgeSpec::new("a", "b")];
        let parsed =
            parse_graph(GraphInput::Objects { nodes, edges }, &IngestOptions::default()).unwrap();
        let state = MutableGraphState::from_parsed(parsed);
        assert_eq!(state.node_count(), 2);
        assert_eq!(state.edge_count(), 1);
        let a = state.node_slot(&GraphId::from("a")).unwrap();
        assert_eq!(state.node_position(a), (1.0, 2.0));
        assert_eq!(state.edge_endpoints(0), (0, 1));
        assert_eq!(state.edges_of(0), &[0]);
        assert_eq!(state.edges_of(1), &[0]);
    }

    #[test]
    fn phyllotaxis_is_deterministic_and_spreads() {
        assert_eq!(phyllotaxis(5), phyllotaxis(5));
        let (x0, y0) = phyllotaxis(0);
        assert_abs_diff_eq!(x0, 0.0);
        assert_abs_diff_eq!(y0, 0.0);
        let mut seen = Vec::new();
        for i in 0..100 {
            let p = phyllotaxis(i);
            for q in &seen {
                let (dx, dy): (f32, f32) = (p.0 - q.0, p.1 - q.1);
                assert!(dx.hypot(dy) > 1.0, "seeds {} too close", i);
            }
            seen.push(p);
        }
    }

    #[test]
    fn unused_attr_count_is_stable() {
        assert_eq!(NODE_ATTR_FLOATS, 8);
        assert_eq!(EDGE_ATTR_FLOATS, 8);
    }
}
