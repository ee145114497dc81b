//! Road classification, the streamline node arena types, and the
//! petgraph export consumed by downstream systems.

use bevy::math::DVec2;
use bevy::prelude::Resource;
use petgraph::graph::{NodeIndex, UnGraph};
use smallvec::SmallVec;

use crate::generator::RoadGenerator;
use crate::streamline::FieldIntegrator;
use crate::tensor::Direction;

/// Road classes, ordered so that wider roads sort (and generate) first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoadType {
    Main,
    HighStreet,
    SideStreet,
}

/// Index into the append-only node arena. Nodes are never deleted or
/// moved, so ids stay valid for the lifetime of a generation pass.
pub type NodeId = u32;

/// A point with metadata in the node arena.
#[derive(Clone, Copy, Debug)]
pub struct StreamlineNode {
    pub pos: DVec2,
    pub streamline_id: u32,
    pub dir: Direction,
}

/// An ordered run of node ids. Cyclic when the first and last id match.
pub type Streamline = Vec<NodeId>;

/// Per-direction streamline lists for one road class, insertion-ordered.
#[derive(Clone, Debug, Default)]
pub struct Streamlines {
    major: Vec<Streamline>,
    minor: Vec<Streamline>,
}

impl Streamlines {
    pub fn get(&self, dir: Direction) -> &[Streamline] {
        match dir {
            Direction::Major => &self.major,
            Direction::Minor => &self.minor,
        }
    }

    pub fn get_mut(&mut self, dir: Direction) -> &mut Vec<Streamline> {
        match dir {
            Direction::Major => &mut self.major,
            Direction::Minor => &mut self.minor,
        }
    }

    pub fn add(&mut self, streamline: Streamline, dir: Direction) {
        self.get_mut(dir).push(streamline);
    }

    pub fn len(&self, dir: Direction) -> usize {
        self.get(dir).len()
    }

    pub fn is_empty(&self) -> bool {
        self.major.is_empty() && self.minor.is_empty()
    }

    pub fn clear(&mut self) {
        self.major.clear();
        self.minor.clear();
    }
}

/// A junction or loose end in the exported road graph.
#[derive(Clone, Debug)]
pub struct RoadJunction {
    pub position: DVec2,
    pub kind: JunctionKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JunctionKind {
    Intersection,
    Endpoint,
}

/// One traced street between two junctions.
#[derive(Clone, Debug)]
pub struct RoadSegment {
    /// Intermediate points along the street, for curved rendering.
    pub points: SmallVec<[DVec2; 8]>,
    pub road_type: RoadType,
    pub direction: Direction,
    /// Length in world units.
    pub length: f64,
}

impl RoadSegment {
    pub fn new(points: SmallVec<[DVec2; 8]>, road_type: RoadType, direction: Direction) -> Self {
        let length = points.windows(2).map(|w| w[0].distance(w[1])).sum();
        Self {
            points,
            road_type,
            direction,
            length,
        }
    }
}

/// Undirected graph view of the generated network. The generator keeps
/// streamlines topologically disconnected at junctions; this export
/// snaps nearby endpoints together for consumers that want a graph.
#[derive(Resource, Default)]
pub struct RoadGraph {
    pub graph: UnGraph<RoadJunction, RoadSegment>,
    positions: Vec<(NodeIndex, DVec2)>,
}

impl RoadGraph {
    /// Build the graph from every streamline committed to `generator`.
    pub fn from_network<I: FieldIntegrator>(
        generator: &RoadGenerator<I>,
        snap_distance: f64,
    ) -> Self {
        let mut out = RoadGraph::default();

        for &road in generator.road_types() {
            for dir in [Direction::Major, Direction::Minor] {
                for streamline in generator.get_streamlines(road, dir) {
                    out.add_streamline(generator, streamline, road, dir, snap_distance);
                }
            }
        }

        out
    }

    fn add_streamline<I: FieldIntegrator>(
        &mut self,
        generator: &RoadGenerator<I>,
        streamline: &[NodeId],
        road: RoadType,
        dir: Direction,
        snap_distance: f64,
    ) {
        if streamline.len() < 2 {
            return;
        }

        let mut points: SmallVec<[DVec2; 8]> = SmallVec::new();
        for &id in streamline {
            let Some(node) = generator.get_node(id) else {
                continue;
            };
            points.push(node.pos);
        }
        if points.len() < 2 {
            return;
        }

        let start = self.snap_or_create(points[0], snap_distance);
        let end = self.snap_or_create(*points.last().unwrap(), snap_distance);
        self.graph
            .add_edge(start, end, RoadSegment::new(points, road, dir));
    }

    pub fn add_junction(&mut self, position: DVec2, kind: JunctionKind) -> NodeIndex {
        let idx = self.graph.add_node(RoadJunction { position, kind });
        self.positions.push((idx, position));
        idx
    }

    /// Nearest junction within `max_distance`, if any.
    pub fn find_nearest(&self, position: DVec2, max_distance: f64) -> Option<NodeIndex> {
        let mut best: Option<(NodeIndex, f64)> = None;
        for &(idx, pos) in &self.positions {
            let dist = position.distance(pos);
            if dist <= max_distance && best.map_or(true, |(_, d)| dist < d) {
                best = Some((idx, dist));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Snap to an existing junction or create a fresh endpoint. Snapping
    /// onto a loose end upgrades it to an intersection.
    pub fn snap_or_create(&mut self, position: DVec2, snap_distance: f64) -> NodeIndex {
        if let Some(existing) = self.find_nearest(position, snap_distance) {
            if let Some(junction) = self.graph.node_weight_mut(existing) {
                if junction.kind == JunctionKind::Endpoint {
                    junction.kind = JunctionKind::Intersection;
                }
            }
            existing
        } else {
            self.add_junction(position, JunctionKind::Endpoint)
        }
    }

    pub fn junctions(&self) -> impl Iterator<Item = (NodeIndex, &RoadJunction)> {
        self.graph.node_indices().map(|i| (i, &self.graph[i]))
    }

    pub fn segments(&self) -> impl Iterator<Item = &RoadSegment> {
        self.graph.edge_weights()
    }

    pub fn junction_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn segment_count(&self) -> usize {
        self.graph.edge_count()
    }
}
