//! Direction-tagged quadtree over streamline nodes.
//!
//! The tree stores node ids only; positions and directions are resolved
//! through a borrowed view of the node arena, so the generator keeps
//! sole ownership of the nodes and the index can never dangle.

use bevy::math::DVec2;

use crate::geometry::{Bounds, QUADRANTS};
use crate::roads::{NodeId, StreamlineNode};
use crate::tensor::DirectionMask;

type QNodeId = u32;
const QNULL: QNodeId = QNodeId::MAX;
const ROOT: QNodeId = 0;

/// One cell of the quadtree. `data` is only non-empty in leaves (or at
/// the depth cap); `dirs` is the union of directions of every id
/// reachable through this subtree.
#[derive(Clone, Debug)]
pub struct QuadNode {
    bbox: Bounds,
    data: Vec<NodeId>,
    children: [QNodeId; QUADRANTS],
    dirs: DirectionMask,
}

impl QuadNode {
    fn new(bbox: Bounds, dirs: DirectionMask) -> Self {
        Self {
            bbox,
            data: Vec::new(),
            children: [QNULL; QUADRANTS],
            dirs,
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.iter().all(|&c| c == QNULL)
    }
}

/// Spatial index answering "is there a streamline node of direction D
/// within radius r of this point" in sub-linear time.
pub struct Spatial {
    dimensions: Bounds,
    qnodes: Vec<QuadNode>,
    max_depth: usize,
    leaf_capacity: usize,
}

impl Spatial {
    /// The root mask starts with every direction set so queries do not
    /// short-circuit on an empty tree.
    pub fn new(dimensions: Bounds, max_depth: usize, leaf_capacity: usize) -> Self {
        Self {
            dimensions,
            qnodes: vec![QuadNode::new(dimensions, DirectionMask::ALL)],
            max_depth,
            leaf_capacity,
        }
    }

    pub fn clear(&mut self) {
        self.qnodes.clear();
        self.qnodes
            .push(QuadNode::new(self.dimensions, DirectionMask::ALL));
    }

    pub fn reset(&mut self, dimensions: Bounds) {
        self.dimensions = dimensions;
        self.clear();
    }

    /// Index a streamline's nodes under `dirs`. A cyclic streamline
    /// (first id == last id) is stored without its trailing duplicate.
    pub fn insert_streamline(
        &mut self,
        streamline: &[NodeId],
        dirs: DirectionMask,
        nodes: &[StreamlineNode],
    ) {
        if streamline.is_empty() {
            return;
        }

        let cyclic = streamline.len() > 2 && streamline.first() == streamline.last();
        let list: Vec<NodeId> = if cyclic {
            streamline[..streamline.len() - 1].to_vec()
        } else {
            streamline.to_vec()
        };

        self.insert_rec(0, ROOT, dirs, list, nodes);
    }

    /// True when a node whose direction is in `dirs` lies within
    /// `radius` of `centre`.
    pub fn has_nearby_point(
        &self,
        centre: DVec2,
        radius: f64,
        dirs: DirectionMask,
        nodes: &[StreamlineNode],
    ) -> bool {
        let Some((outer, inner)) = self.circle_boxes(centre, radius, dirs) else {
            return false;
        };
        self.in_circle_rec(
            ROOT,
            &outer,
            &inner,
            dirs,
            centre,
            radius * radius,
            nodes,
            &mut None,
        )
    }

    /// Every matching node id within `radius` of `centre`. Result order
    /// follows the tree traversal and is not significant.
    pub fn nearby_points(
        &self,
        centre: DVec2,
        radius: f64,
        dirs: DirectionMask,
        nodes: &[StreamlineNode],
    ) -> Vec<NodeId> {
        let mut harvest = Vec::new();
        if let Some((outer, inner)) = self.circle_boxes(centre, radius, dirs) {
            self.in_circle_rec(
                ROOT,
                &outer,
                &inner,
                dirs,
                centre,
                radius * radius,
                nodes,
                &mut Some(&mut harvest),
            );
        }
        harvest
    }

    /// Outer bounding square and inscribed square of the query circle.
    /// Returns `None` when the query cannot possibly match.
    fn circle_boxes(
        &self,
        centre: DVec2,
        radius: f64,
        dirs: DirectionMask,
    ) -> Option<(Bounds, Bounds)> {
        let outer = Bounds::new(centre - DVec2::splat(radius), centre + DVec2::splat(radius));
        let half = radius / std::f64::consts::SQRT_2;
        let inner = Bounds::new(centre - DVec2::splat(half), centre + DVec2::splat(half));

        if self.dimensions.intersect(&inner).is_empty()
            || !self.qnodes[ROOT as usize].dirs.intersects(dirs)
        {
            return None;
        }
        Some((outer, inner))
    }

    fn insert_rec(
        &mut self,
        depth: usize,
        qid: QNodeId,
        dirs: DirectionMask,
        list: Vec<NodeId>,
        nodes: &[StreamlineNode],
    ) {
        if depth >= self.max_depth {
            self.append_leaf_data(qid, dirs, list);
            return;
        }
        if self.qnodes[qid as usize].is_leaf() {
            if self.qnodes[qid as usize].data.len() + list.len() <= self.leaf_capacity {
                self.append_leaf_data(qid, dirs, list);
                return;
            }
            self.subdivide(qid, nodes);
        }

        self.qnodes[qid as usize].dirs |= dirs;

        let bbox = self.qnodes[qid as usize].bbox;
        let parts = partition(&bbox, list, nodes);

        for (q, (sub_dirs, sublist)) in parts.into_iter().enumerate() {
            if sublist.is_empty() {
                continue;
            }
            let mut child = self.qnodes[qid as usize].children[q];
            if child == QNULL {
                child = self.qnodes.len() as QNodeId;
                self.qnodes
                    .push(QuadNode::new(bbox.quadrant(q), DirectionMask::NONE));
                self.qnodes[qid as usize].children[q] = child;
            }
            self.insert_rec(depth + 1, child, sub_dirs, sublist, nodes);
        }
    }

    fn append_leaf_data(&mut self, qid: QNodeId, dirs: DirectionMask, mut list: Vec<NodeId>) {
        let qnode = &mut self.qnodes[qid as usize];
        qnode.dirs |= dirs;
        qnode.data.append(&mut list);
    }

    /// Push an over-full leaf's data down into fresh child cells.
    fn subdivide(&mut self, qid: QNodeId, nodes: &[StreamlineNode]) {
        let bbox = self.qnodes[qid as usize].bbox;
        let data = std::mem::take(&mut self.qnodes[qid as usize].data);
        let parts = partition(&bbox, data, nodes);

        for (q, (sub_dirs, sublist)) in parts.into_iter().enumerate() {
            if sublist.is_empty() {
                continue;
            }
            let child = self.qnodes.len() as QNodeId;
            let mut child_node = QuadNode::new(bbox.quadrant(q), sub_dirs);
            child_node.data = sublist;
            self.qnodes.push(child_node);
            self.qnodes[qid as usize].children[q] = child;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn in_circle_rec(
        &self,
        qid: QNodeId,
        outer: &Bounds,
        inner: &Bounds,
        dirs: DirectionMask,
        centre: DVec2,
        radius2: f64,
        nodes: &[StreamlineNode],
        out: &mut Option<&mut Vec<NodeId>>,
    ) -> bool {
        let qnode = &self.qnodes[qid as usize];

        if !qnode.dirs.intersects(dirs) || outer.intersect(&qnode.bbox).is_empty() {
            return false;
        }

        // a cell fully inside the inscribed square needs no distance tests
        if inner.contains_box(&qnode.bbox) {
            return self.in_box_rec(qid, inner, dirs, nodes, out);
        }

        let mut found = false;

        if qnode.is_leaf() {
            for &id in &qnode.data {
                let node = &nodes[id as usize];
                if !dirs.contains(node.dir) {
                    continue;
                }
                if centre.distance_squared(node.pos) > radius2 {
                    continue;
                }
                match out {
                    Some(harvest) => {
                        harvest.push(id);
                        found = true;
                    }
                    None => return true,
                }
            }
            return found;
        }

        for &child in &qnode.children {
            if child == QNULL {
                continue;
            }
            if self.in_circle_rec(child, outer, inner, dirs, centre, radius2, nodes, out) {
                if out.is_none() {
                    return true;
                }
                found = true;
            }
        }
        found
    }

    /// Box-contained query: cells inside `bbox` report their whole
    /// subtree, disjoint cells are skipped, straddling leaves fall back
    /// to per-point containment.
    fn in_box_rec(
        &self,
        qid: QNodeId,
        bbox: &Bounds,
        dirs: DirectionMask,
        nodes: &[StreamlineNode],
        out: &mut Option<&mut Vec<NodeId>>,
    ) -> bool {
        let qnode = &self.qnodes[qid as usize];

        if !qnode.dirs.intersects(dirs) || bbox.intersect(&qnode.bbox).is_empty() {
            return false;
        }

        if bbox.contains_box(&qnode.bbox) {
            return self.report_subtree(qid, dirs, nodes, out);
        }

        let mut found = false;

        if qnode.is_leaf() {
            for &id in &qnode.data {
                let node = &nodes[id as usize];
                if !dirs.contains(node.dir) || !bbox.contains(node.pos) {
                    continue;
                }
                match out {
                    Some(harvest) => {
                        harvest.push(id);
                        found = true;
                    }
                    None => return true,
                }
            }
            return found;
        }

        for &child in &qnode.children {
            if child == QNULL {
                continue;
            }
            if self.in_box_rec(child, bbox, dirs, nodes, out) {
                if out.is_none() {
                    return true;
                }
                found = true;
            }
        }
        found
    }

    fn report_subtree(
        &self,
        qid: QNodeId,
        dirs: DirectionMask,
        nodes: &[StreamlineNode],
        out: &mut Option<&mut Vec<NodeId>>,
    ) -> bool {
        let qnode = &self.qnodes[qid as usize];
        if !qnode.dirs.intersects(dirs) {
            return false;
        }

        let mut found = false;

        if qnode.is_leaf() {
            for &id in &qnode.data {
                if !dirs.contains(nodes[id as usize].dir) {
                    continue;
                }
                match out {
                    Some(harvest) => {
                        harvest.push(id);
                        found = true;
                    }
                    None => return true,
                }
            }
            return found;
        }

        for &child in &qnode.children {
            if child == QNULL {
                continue;
            }
            if self.report_subtree(child, dirs, nodes, out) {
                if out.is_none() {
                    return true;
                }
                found = true;
            }
        }
        found
    }
}

/// Four-way midpoint partition of `list`. A point belongs to the right
/// half iff `x > mid.x` and to the bottom half iff `y > mid.y`, so ties
/// land in the left/top quadrant.
fn partition(
    bbox: &Bounds,
    list: Vec<NodeId>,
    nodes: &[StreamlineNode],
) -> [(DirectionMask, Vec<NodeId>); QUADRANTS] {
    let mid = bbox.centre();
    let mut out: [(DirectionMask, Vec<NodeId>); QUADRANTS] =
        std::array::from_fn(|_| (DirectionMask::NONE, Vec::new()));

    for id in list {
        let node = &nodes[id as usize];
        let q = usize::from(node.pos.x > mid.x) + (usize::from(node.pos.y > mid.y) << 1);
        out[q].0 |= node.dir.into();
        out[q].1.push(id);
    }

    out
}
