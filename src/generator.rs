//! Road network generator: seed selection, streamline tracing,
//! simplification and endpoint joining over a tensor field.

use std::collections::{HashMap, VecDeque};

use bevy::log::info;
use bevy::math::DVec2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use smallvec::SmallVec;

use crate::geometry::{perpendicular_distance, vector_angle, Bounds};
use crate::roads::{NodeId, RoadType, Streamline, StreamlineNode, Streamlines};
use crate::spatial::Spatial;
use crate::streamline::FieldIntegrator;
use crate::tensor::{Direction, DirectionMask};

const QUAD_TREE_DEPTH: usize = 10;
const QUAD_TREE_LEAF_CAPACITY: usize = 10;
const DEFAULT_SEED: u64 = 0;

/// Streamlines shorter than this are rejected, and the connector will
/// not join an endpoint back onto this many of its own leading nodes.
const MIN_STREAMLINE_SIZE: usize = 5;

/// Tuning knobs for one road class.
#[derive(Clone, Copy, Debug)]
pub struct GeneratorParameters {
    /// Random-seed retries before giving up on a direction.
    pub max_seed_retries: u32,
    /// Cap on integration steps per streamline.
    pub max_integration_iterations: u32,
    /// Minimum separation between same-direction streamlines at seed time.
    pub d_sep: f64,
    /// Minimum separation before a growing tip terminates. Clamped to
    /// `d_sep` at generator construction.
    pub d_test: f64,
    /// Tip separation marking that a streamline has left its starting
    /// neighbourhood; re-approaching within it closes a cycle.
    pub d_circle: f64,
    /// Integration step length.
    pub dl: f64,
    /// Radius of the endpoint-joining candidate search.
    pub d_lookahead: f64,
    /// Maximum angular deviation allowed when joining endpoints.
    pub theta_max: f64,
    /// Douglas-Peucker tolerance.
    pub epsilon: f64,
    /// Minimum node-to-node spacing retained after simplification.
    pub node_sep: f64,
    /// Noise sampling scale for integrators that wobble. The default
    /// integrator ignores it.
    pub noise_size: f64,
    /// Noise rotation strength, likewise ignored by the default integrator.
    pub noise_angle: f64,
}

impl GeneratorParameters {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        max_seed_retries: u32,
        max_integration_iterations: u32,
        d_sep: f64,
        d_test: f64,
        d_circle: f64,
        dl: f64,
        d_lookahead: f64,
        theta_max: f64,
        epsilon: f64,
        node_sep: f64,
    ) -> Self {
        Self {
            max_seed_retries,
            max_integration_iterations,
            d_sep,
            d_test: d_test.min(d_sep),
            d_circle,
            dl,
            d_lookahead,
            theta_max,
            epsilon,
            node_sep,
            noise_size: 0.0,
            noise_angle: 0.0,
        }
    }

    pub fn main_road() -> Self {
        Self::new(300, 1900, 400.0, 200.0, 5.0, 1.0, 500.0, 0.1, 0.5, 0.0)
    }

    pub fn high_street() -> Self {
        Self::new(300, 3020, 100.0, 30.0, 5.0, 1.0, 200.0, 0.1, 0.5, 0.0)
    }

    pub fn side_street() -> Self {
        Self::new(300, 1970, 20.0, 15.0, 5.0, 1.0, 40.0, 0.1, 0.5, 0.0)
    }
}

/// Default tuning for the three stock road classes.
pub fn default_parameters() -> HashMap<RoadType, GeneratorParameters> {
    HashMap::from([
        (RoadType::Main, GeneratorParameters::main_road()),
        (RoadType::HighStreet, GeneratorParameters::high_street()),
        (RoadType::SideStreet, GeneratorParameters::side_street()),
    ])
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IntegrationStatus {
    Continue,
    Terminate,
    Abort,
}

/// One half of a two-sided trace. The backward half integrates the same
/// field with every delta negated.
struct Integration {
    status: IntegrationStatus,
    last_delta: Option<DVec2>,
    front: DVec2,
    negate: bool,
    points: Vec<DVec2>,
}

impl Integration {
    fn new(seed: DVec2, negate: bool) -> Self {
        Self {
            status: IntegrationStatus::Continue,
            last_delta: None,
            front: seed,
            negate,
            points: vec![seed],
        }
    }
}

/// Endpoint data the connector needs from one streamline, copied out so
/// the candidate search can borrow the rest of the generator freely.
struct StreamlineEnds {
    front_pos: DVec2,
    front_heading: DVec2,
    tail_pos: DVec2,
    tail_heading: DVec2,
    forbidden_front: SmallVec<[NodeId; MIN_STREAMLINE_SIZE]>,
    forbidden_tail: SmallVec<[NodeId; MIN_STREAMLINE_SIZE]>,
}

/// Traces streamlines over a tensor field and accumulates them into a
/// street layout, one road class at a time.
pub struct RoadGenerator<I: FieldIntegrator> {
    integrator: I,
    road_types: Vec<RoadType>,
    params: HashMap<RoadType, GeneratorParameters>,
    major_seeds: VecDeque<DVec2>,
    minor_seeds: VecDeque<DVec2>,
    rng: StdRng,
    seed: u64,
    nodes: Vec<StreamlineNode>,
    spatial: Spatial,
    streamlines: HashMap<RoadType, Streamlines>,
    viewport: Bounds,
}

impl<I: FieldIntegrator> RoadGenerator<I> {
    pub fn new(
        integrator: I,
        mut params: HashMap<RoadType, GeneratorParameters>,
        viewport: Bounds,
    ) -> Self {
        debug_assert!(!params.is_empty(), "at least one road class is required");

        for p in params.values_mut() {
            p.d_test = p.d_test.min(p.d_sep);
        }

        let mut road_types: Vec<RoadType> = params.keys().copied().collect();
        road_types.sort();

        let streamlines = road_types
            .iter()
            .map(|&road| (road, Streamlines::default()))
            .collect();

        Self {
            integrator,
            road_types,
            params,
            major_seeds: VecDeque::new(),
            minor_seeds: VecDeque::new(),
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
            seed: DEFAULT_SEED,
            nodes: Vec::new(),
            spatial: Spatial::new(viewport, QUAD_TREE_DEPTH, QUAD_TREE_LEAF_CAPACITY),
            streamlines,
            viewport,
        }
    }

    /// Reseed the random engine; `generate` restarts from this seed so
    /// repeated passes over the same field are identical.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn road_types(&self) -> &[RoadType] {
        &self.road_types
    }

    pub fn parameters(&self) -> &HashMap<RoadType, GeneratorParameters> {
        &self.params
    }

    pub fn get_node(&self, id: NodeId) -> Option<&StreamlineNode> {
        self.nodes.get(id as usize)
    }

    pub fn get_streamlines(&self, road: RoadType, dir: Direction) -> &[Streamline] {
        self.streamlines
            .get(&road)
            .map_or(&[][..], |s| s.get(dir))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn streamline_count(&self) -> usize {
        self.streamlines
            .values()
            .map(|s| s.len(Direction::Major) + s.len(Direction::Minor))
            .sum()
    }

    pub fn viewport(&self) -> Bounds {
        self.viewport
    }

    /// Takes effect on the next `generate` pass.
    pub fn set_viewport(&mut self, viewport: Bounds) {
        self.viewport = viewport;
    }

    pub fn integrator(&self) -> &I {
        &self.integrator
    }

    pub fn integrator_mut(&mut self) -> &mut I {
        &mut self.integrator
    }

    /// Generate the full network: wipe previous state, then lay down
    /// every road class in ascending (widest first) order.
    pub fn generate(&mut self) {
        self.clear();
        self.rng = StdRng::seed_from_u64(self.seed);
        self.spatial.reset(self.viewport);
        self.road_types.sort();

        let road_types = self.road_types.clone();
        let mut accepted = 0;
        for road in road_types {
            accepted += self.generate_streamlines(road);
        }

        info!(
            "traced {} streamlines ({} nodes)",
            accepted,
            self.node_count()
        );
    }

    /// One tracer attempt for interactive stepping. Does not simplify,
    /// connect, or flip direction; returns whether a streamline landed.
    pub fn generation_step(&mut self, road: RoadType, dir: Direction) -> bool {
        let Some(seed) = self.get_seed(road, dir) else {
            return false;
        };
        let Some(points) = self.generate_streamline(road, seed, dir) else {
            return false;
        };
        self.push_streamline(road, points, dir);
        true
    }

    pub fn clear(&mut self) {
        self.major_seeds.clear();
        self.minor_seeds.clear();
        self.nodes.clear();
        for store in self.streamlines.values_mut() {
            store.clear();
        }
        self.spatial.clear();
    }

    fn in_bounds(&self, p: DVec2) -> bool {
        self.viewport.contains(p)
    }

    fn add_candidate_seed(&mut self, id: NodeId, dir: Direction) {
        let seed = self.nodes[id as usize].pos;
        match dir {
            Direction::Major => self.major_seeds.push_back(seed),
            Direction::Minor => self.minor_seeds.push_back(seed),
        }
    }

    /// Next viable seed for `dir`: drain the candidate queue first, then
    /// fall back to uniform random sampling over the viewport.
    fn get_seed(&mut self, road: RoadType, dir: Direction) -> Option<DVec2> {
        let d_sep = self.params[&road].d_sep;

        loop {
            let candidate = match dir {
                Direction::Major => self.major_seeds.pop_front(),
                Direction::Minor => self.minor_seeds.pop_front(),
            };
            let Some(seed) = candidate else { break };
            if !self
                .spatial
                .has_nearby_point(seed, d_sep, dir.into(), &self.nodes)
            {
                return Some(seed);
            }
        }

        for _ in 0..self.params[&road].max_seed_retries {
            let seed = DVec2::new(
                self.rng.gen_range(0.0..1.0) * self.viewport.width() + self.viewport.min.x,
                self.rng.gen_range(0.0..1.0) * self.viewport.height() + self.viewport.min.y,
            );
            if !self
                .spatial
                .has_nearby_point(seed, d_sep, dir.into(), &self.nodes)
            {
                return Some(seed);
            }
        }

        None
    }

    /// Advance one tip by a single integration step.
    fn extend_streamline(&self, res: &mut Integration, road: RoadType, dir: Direction) {
        if res.status != IntegrationStatus::Continue {
            res.status = IntegrationStatus::Abort;
            return;
        }

        let params = &self.params[&road];
        let mut delta = self.integrator.integrate(res.front, dir, params.dl);

        if res.negate {
            delta = -delta;
        }
        // principal vectors have no inherent sign; keep successive steps
        // from reversing the direction of travel
        if let Some(last) = res.last_delta {
            if last.dot(delta) < 0.0 {
                delta = -delta;
            }
        }

        if delta.length_squared() < 0.01 {
            res.status = IntegrationStatus::Abort; // degenerate or stalled
            return;
        }

        res.front += delta;
        res.last_delta = Some(delta);
        if !self.in_bounds(res.front) {
            res.status = IntegrationStatus::Abort;
            return;
        }

        res.status = if self
            .spatial
            .has_nearby_point(res.front, params.d_test, dir.into(), &self.nodes)
        {
            IntegrationStatus::Terminate
        } else {
            IntegrationStatus::Continue
        };
    }

    /// Trace forward and backward from `seed` until both halves die, the
    /// iteration budget runs out, or the tips close a cycle. Returns the
    /// polyline, or `None` when it came out too short.
    fn generate_streamline(
        &self,
        road: RoadType,
        seed: DVec2,
        dir: Direction,
    ) -> Option<Vec<DVec2>> {
        let params = &self.params[&road];
        let d_circle2 = params.d_circle * params.d_circle;

        let mut forward = Integration::new(seed, false);
        let mut backward = Integration::new(seed, true);

        let mut diverged = false;
        let mut join = false;
        let mut count = 0;

        while count < params.max_integration_iterations {
            self.extend_streamline(&mut forward, road, dir);
            self.extend_streamline(&mut backward, road, dir);

            if forward.status == IntegrationStatus::Abort
                && backward.status == IntegrationStatus::Abort
            {
                break;
            }

            if forward.status != IntegrationStatus::Abort {
                forward.points.push(forward.front);
                count += 1;
            }
            if backward.status != IntegrationStatus::Abort {
                backward.points.push(backward.front);
                count += 1;
            }

            let ends_diff = *forward.points.last().unwrap() - *backward.points.last().unwrap();
            let sep2 = ends_diff.length_squared();

            // once the tips have left the seed's neighbourhood, the first
            // re-approach means the streamline closed on itself
            if diverged && sep2 < d_circle2 {
                join = true;
                break;
            }
            if !diverged && sep2 > d_circle2 {
                diverged = true;
            }
        }

        // backward half carries the shared seed at index 0; drop it and
        // reverse so the polyline runs backward tip -> seed -> forward tip
        let mut result: Vec<DVec2> = backward.points[1..].iter().rev().copied().collect();
        result.extend(forward.points.iter().copied());

        if join {
            result.push(result[0]); // close the loop at the backward tip
        }

        if result.len() < MIN_STREAMLINE_SIZE {
            return None;
        }
        Some(result)
    }

    /// Lay all streamlines for one road class, alternating direction
    /// after each accepted trace, then join loose ends.
    fn generate_streamlines(&mut self, road: RoadType) -> usize {
        let mut dir = Direction::Major;
        let mut accepted = 0;

        let mut seed = self.get_seed(road, dir);
        while let Some(seed_point) = seed {
            if let Some(mut points) = self.generate_streamline(road, seed_point, dir) {
                self.simplify_streamline(road, &mut points);
                if points.len() >= MIN_STREAMLINE_SIZE {
                    self.push_streamline(road, points, dir);
                }
                accepted += 1;
                dir = dir.flip();
            }
            seed = self.get_seed(road, dir);
        }

        self.connect_roads(road, Direction::Major);
        self.connect_roads(road, Direction::Minor);

        accepted
    }

    fn simplify_streamline(&self, road: RoadType, points: &mut Vec<DVec2>) {
        let params = &self.params[&road];
        debug_assert!(params.epsilon > 0.0, "simplification needs a tolerance");
        if points.len() < 3 {
            return;
        }

        let node_sep2 = params.node_sep * params.node_sep;
        let mut keep = vec![true; points.len()];
        douglas_peucker(params.epsilon, node_sep2, points, 0, points.len() - 1, &mut keep);

        let mut index = 0;
        points.retain(|_| {
            let kept = keep[index];
            index += 1;
            kept
        });
    }

    /// Commit a polyline: allocate arena nodes, index them, and feed the
    /// endpoints back as candidate seeds for the opposite direction.
    pub fn push_streamline(&mut self, road: RoadType, points: Vec<DVec2>, dir: Direction) {
        if points.is_empty() {
            return;
        }

        let streamline_id = self.streamlines.get(&road).map_or(0, |s| s.len(dir)) as u32;
        let closed = points.len() > 2 && points.first() == points.last();
        let first_id = self.nodes.len() as NodeId;
        let last_index = points.len() - 1;

        let mut ids: Streamline = Vec::with_capacity(points.len());
        for (i, pos) in points.into_iter().enumerate() {
            if closed && i == last_index {
                ids.push(first_id); // a cycle reuses its first node
                break;
            }
            ids.push(self.nodes.len() as NodeId);
            self.nodes.push(StreamlineNode {
                pos,
                streamline_id,
                dir,
            });
        }

        self.spatial.insert_streamline(&ids, dir.into(), &self.nodes);

        if ids.first() != ids.last() {
            self.add_candidate_seed(*ids.first().unwrap(), dir.flip());
            self.add_candidate_seed(*ids.last().unwrap(), dir.flip());
        }

        self.streamlines.entry(road).or_default().add(ids, dir);
    }

    /// Close dangling endpoints onto nearby roads of either direction.
    fn connect_roads(&mut self, road: RoadType, dir: Direction) {
        let params = self.params[&road];
        let snap2 = params.node_sep * params.node_sep;

        let count = self.streamlines.get(&road).map_or(0, |s| s.len(dir));
        for i in 0..count {
            let Some(ends) = self.streamline_ends(road, dir, i) else {
                continue;
            };

            let front = self.joining_candidate(
                params.d_lookahead,
                snap2,
                params.theta_max,
                ends.front_pos,
                ends.front_heading,
                &ends.forbidden_front,
            );
            let tail = self.joining_candidate(
                params.d_lookahead,
                snap2,
                params.theta_max,
                ends.tail_pos,
                ends.tail_heading,
                &ends.forbidden_tail,
            );

            let streamline = &mut self.streamlines.get_mut(&road).unwrap().get_mut(dir)[i];
            if let Some(id) = front {
                streamline.insert(0, id);
            }
            if let Some(id) = tail {
                streamline.push(id);
            }
        }
    }

    /// Endpoint data for the connector; `None` for cyclic or too-short
    /// streamlines, which are never joined.
    fn streamline_ends(&self, road: RoadType, dir: Direction, index: usize) -> Option<StreamlineEnds> {
        let streamline = &self.streamlines.get(&road)?.get(dir)[index];
        let n = streamline.len();
        if n < MIN_STREAMLINE_SIZE || streamline.first() == streamline.last() {
            return None;
        }

        let pos = |id: NodeId| self.nodes[id as usize].pos;
        let forbidden_front: SmallVec<[NodeId; MIN_STREAMLINE_SIZE]> =
            streamline[..MIN_STREAMLINE_SIZE].into();
        let forbidden_tail: SmallVec<[NodeId; MIN_STREAMLINE_SIZE]> =
            streamline[n - MIN_STREAMLINE_SIZE..].into();

        Some(StreamlineEnds {
            front_pos: pos(streamline[0]),
            front_heading: pos(streamline[0]) - pos(streamline[MIN_STREAMLINE_SIZE - 1]),
            tail_pos: pos(streamline[n - 1]),
            tail_heading: pos(streamline[n - 1]) - pos(streamline[n - MIN_STREAMLINE_SIZE]),
            forbidden_front,
            forbidden_tail,
        })
    }

    /// Best node to extend an endpoint onto: anything within snapping
    /// range wins outright; otherwise the closest candidate ahead of the
    /// road direction whose deviation stays under `theta_max`.
    fn joining_candidate(
        &self,
        radius: f64,
        snap_dist2: f64,
        theta_max: f64,
        pos: DVec2,
        road_direction: DVec2,
        forbidden: &[NodeId],
    ) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;

        for id in self
            .spatial
            .nearby_points(pos, radius, DirectionMask::ALL, &self.nodes)
        {
            if forbidden.contains(&id) {
                continue;
            }
            let join_vector = self.nodes[id as usize].pos - pos;
            if join_vector.dot(road_direction) < 0.0 {
                continue; // behind the endpoint
            }

            let dist2 = join_vector.length_squared();
            if dist2 < snap_dist2 {
                return Some(id);
            }
            if vector_angle(road_direction, join_vector).abs() >= theta_max {
                continue;
            }
            if best.map_or(true, |(_, d)| dist2 < d) {
                best = Some((id, dist2));
            }
        }

        best.map(|(id, _)| id)
    }
}

/// Douglas-Peucker over `points[lo..=hi]`, flagging dropped points in
/// `keep`. Below-tolerance segments keep points spaced at least
/// `sqrt(min_sep2)` from their surviving predecessor.
fn douglas_peucker(
    epsilon: f64,
    min_sep2: f64,
    points: &[DVec2],
    lo: usize,
    hi: usize,
    keep: &mut [bool],
) {
    if hi < lo + 2 {
        return;
    }

    let mut d_max = 0.0;
    let mut index = lo;
    for i in lo + 1..hi {
        let d = perpendicular_distance(points[i], points[lo], points[hi]);
        if d > d_max {
            d_max = d;
            index = i;
        }
    }

    if d_max > epsilon {
        douglas_peucker(epsilon, min_sep2, points, lo, index, keep);
        douglas_peucker(epsilon, min_sep2, points, index, hi, keep);
    } else {
        let mut prev = lo;
        for i in lo + 1..hi {
            if points[i].distance_squared(points[prev]) < min_sep2 {
                keep[i] = false;
            } else {
                prev = i;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamline::Rk4Integrator;
    use crate::tensor::{BasisField, TensorField};

    fn test_viewport() -> Bounds {
        Bounds::new(DVec2::ZERO, DVec2::new(200.0, 200.0))
    }

    fn test_params() -> GeneratorParameters {
        GeneratorParameters::new(50, 1000, 20.0, 15.0, 5.0, 1.0, 40.0, 0.1, 0.5, 10.0)
    }

    fn single_class(params: GeneratorParameters) -> HashMap<RoadType, GeneratorParameters> {
        HashMap::from([(RoadType::SideStreet, params)])
    }

    fn grid_generator(theta: f64) -> RoadGenerator<Rk4Integrator> {
        let mut field = TensorField::default();
        field.add_basis_field(BasisField::grid(theta, DVec2::ZERO, 0.0, 0.0));
        RoadGenerator::new(
            Rk4Integrator::new(field),
            single_class(test_params()),
            test_viewport(),
        )
    }

    fn radial_generator() -> RoadGenerator<Rk4Integrator> {
        let mut field = TensorField::default();
        field.add_basis_field(BasisField::radial(DVec2::new(100.0, 100.0), 0.0, 0.0));
        // sparser rings than the grid setup so orbits never terminate
        // against a neighbour before closing
        let params = GeneratorParameters::new(200, 1000, 30.0, 15.0, 5.0, 1.0, 40.0, 0.1, 0.5, 10.0);
        RoadGenerator::new(
            Rk4Integrator::new(field),
            single_class(params),
            test_viewport(),
        )
    }

    #[test]
    fn douglas_peucker_keeps_the_corner_and_prunes_dense_runs() {
        let points = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(1.0, 0.1),
            DVec2::new(2.0, -0.1),
            DVec2::new(3.0, 0.0),
            DVec2::new(4.0, 10.0),
        ];

        let mut keep = vec![true; points.len()];
        douglas_peucker(0.5, 4.0, &points, 0, points.len() - 1, &mut keep);
        let kept: Vec<DVec2> = points
            .iter()
            .zip(&keep)
            .filter(|(_, &k)| k)
            .map(|(p, _)| *p)
            .collect();
        assert_eq!(
            kept,
            vec![
                DVec2::new(0.0, 0.0),
                DVec2::new(2.0, -0.1),
                DVec2::new(3.0, 0.0),
                DVec2::new(4.0, 10.0),
            ]
        );

        // without a spacing floor nothing in a flat run is deleted
        let mut keep = vec![true; points.len()];
        douglas_peucker(0.5, 0.0, &points, 0, points.len() - 1, &mut keep);
        assert!(keep.iter().all(|&k| k));
    }

    #[test]
    fn simplify_leaves_short_polylines_untouched() {
        let generator = grid_generator(0.0);
        let mut points = vec![DVec2::ZERO, DVec2::new(1.0, 1.0)];
        generator.simplify_streamline(RoadType::SideStreet, &mut points);
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn grid_field_produces_axis_aligned_streets() {
        let mut generator = grid_generator(0.0);
        generator.generate();

        let majors = generator.get_streamlines(RoadType::SideStreet, Direction::Major);
        let minors = generator.get_streamlines(RoadType::SideStreet, Direction::Minor);

        // roughly viewport_extent / d_sep lines per direction
        assert!(
            (4..=11).contains(&majors.len()),
            "unexpected major count {}",
            majors.len()
        );
        assert!(
            (4..=11).contains(&minors.len()),
            "unexpected minor count {}",
            minors.len()
        );

        // majors follow the major eigenvector (horizontal at theta = 0);
        // connector-joined ends may step off the line, interiors may not
        for streamline in majors {
            let interior = &streamline[1..streamline.len() - 1];
            let ys: Vec<f64> = interior
                .iter()
                .map(|&id| generator.get_node(id).unwrap().pos.y)
                .collect();
            let spread = ys.iter().cloned().fold(f64::MIN, f64::max)
                - ys.iter().cloned().fold(f64::MAX, f64::min);
            assert!(spread.abs() < 1e-6, "major streamline is not horizontal");
        }

        // every committed node lies inside the viewport
        for id in 0..generator.node_count() {
            let node = generator.get_node(id as NodeId).unwrap();
            assert!(generator.viewport().contains(node.pos));
        }

        // same-direction interiors respect the test separation
        for (i, a) in majors.iter().enumerate() {
            for b in majors.iter().skip(i + 1) {
                for &m in &a[2..a.len() - 2] {
                    for &n in &b[2..b.len() - 2] {
                        let dist = generator
                            .get_node(m)
                            .unwrap()
                            .pos
                            .distance(generator.get_node(n).unwrap().pos);
                        assert!(dist >= 7.5, "streamlines run too close: {dist}");
                    }
                }
            }
        }
    }

    #[test]
    fn superposed_grids_stay_inside_the_viewport() {
        let mut field = TensorField::default();
        field.add_basis_field(BasisField::grid(0.0, DVec2::ZERO, 0.0, 0.0));
        field.add_basis_field(BasisField::grid(std::f64::consts::FRAC_PI_4, DVec2::ZERO, 0.0, 0.0));
        let mut generator = RoadGenerator::new(
            Rk4Integrator::new(field),
            single_class(test_params()),
            test_viewport(),
        );
        generator.generate();

        assert!(generator.streamline_count() > 0);
        for id in 0..generator.node_count() {
            let node = generator.get_node(id as NodeId).unwrap();
            assert!(generator.viewport().contains(node.pos));
        }
    }

    #[test]
    fn radial_field_closes_at_least_one_cycle() {
        let mut generator = radial_generator();
        generator.generate();

        let majors = generator.get_streamlines(RoadType::SideStreet, Direction::Major);
        assert!(!majors.is_empty());
        let cycles = majors
            .iter()
            .filter(|s| s.first() == s.last() && s.len() > 2)
            .count();
        assert!(cycles >= 1, "no orbit closed around the radial centre");

        // cycles are never joined, so their nodes all share the direction
        for streamline in majors.iter().filter(|s| s.first() == s.last()) {
            for &id in streamline.iter() {
                assert_eq!(generator.get_node(id).unwrap().dir, Direction::Major);
            }
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let mut first = grid_generator(0.3);
        first.set_seed(99);
        first.generate();
        let first_nodes: Vec<DVec2> = (0..first.node_count())
            .map(|i| first.get_node(i as NodeId).unwrap().pos)
            .collect();

        // a second full pass over the same generator restarts the engine
        first.generate();
        let repeat_nodes: Vec<DVec2> = (0..first.node_count())
            .map(|i| first.get_node(i as NodeId).unwrap().pos)
            .collect();
        assert_eq!(first_nodes, repeat_nodes);

        // and a fresh generator with the same seed agrees byte for byte
        let mut second = grid_generator(0.3);
        second.set_seed(99);
        second.generate();
        assert_eq!(first.node_count(), second.node_count());
        assert_eq!(first.streamline_count(), second.streamline_count());
        let second_nodes: Vec<DVec2> = (0..second.node_count())
            .map(|i| second.get_node(i as NodeId).unwrap().pos)
            .collect();
        assert_eq!(first_nodes, second_nodes);
    }

    #[test]
    fn generation_step_commits_without_simplifying() {
        let mut generator = grid_generator(0.0);
        assert!(generator.generation_step(RoadType::SideStreet, Direction::Major));
        assert_eq!(generator.streamline_count(), 1);
        assert_eq!(
            generator
                .get_streamlines(RoadType::SideStreet, Direction::Minor)
                .len(),
            0
        );

        // unsimplified: one node per integration step across the viewport
        let streamline = &generator.get_streamlines(RoadType::SideStreet, Direction::Major)[0];
        assert!(streamline.len() > 30);
    }

    #[test]
    fn clear_empties_all_state() {
        let mut generator = grid_generator(0.0);
        generator.generate();
        assert!(generator.node_count() > 0);

        generator.clear();
        assert_eq!(generator.node_count(), 0);
        assert_eq!(generator.streamline_count(), 0);
        assert!(generator.get_node(0).is_none());
    }

    #[test]
    fn connector_joins_an_endpoint_onto_a_crossing_road() {
        let mut generator = grid_generator(0.0);

        // horizontal major road along y = 0
        let road: Vec<DVec2> = (0..11).map(|i| DVec2::new(10.0 * i as f64, 0.0)).collect();
        generator.push_streamline(RoadType::SideStreet, road, Direction::Major);

        // vertical minor road whose head points down at the major road
        let spur: Vec<DVec2> = (1..7).map(|i| DVec2::new(50.0, 10.0 * i as f64)).collect();
        generator.push_streamline(RoadType::SideStreet, spur, Direction::Minor);

        generator.connect_roads(RoadType::SideStreet, Direction::Minor);

        let minors = generator.get_streamlines(RoadType::SideStreet, Direction::Minor);
        let joined = &minors[0];
        // the prepended node is the major road's node at (50, 0)
        let head = generator.get_node(joined[0]).unwrap();
        assert_eq!(head.pos, DVec2::new(50.0, 0.0));
        assert_eq!(head.dir, Direction::Major);
        assert_eq!(joined.len(), 7);
    }

    #[test]
    fn push_streamline_enqueues_opposite_direction_seeds() {
        let mut generator = grid_generator(0.0);
        let line: Vec<DVec2> = (0..6).map(|i| DVec2::new(10.0 * i as f64, 100.0)).collect();
        generator.push_streamline(RoadType::SideStreet, line, Direction::Major);

        assert_eq!(generator.minor_seeds.len(), 2);
        assert_eq!(generator.major_seeds.len(), 0);
        assert_eq!(generator.minor_seeds[0], DVec2::new(0.0, 100.0));
        assert_eq!(generator.minor_seeds[1], DVec2::new(50.0, 100.0));
    }

    #[test]
    fn cyclic_push_reuses_the_first_node_id() {
        let mut generator = grid_generator(0.0);
        let mut loop_points: Vec<DVec2> = (0..12)
            .map(|i| {
                let angle = std::f64::consts::TAU * i as f64 / 12.0;
                DVec2::new(100.0 + 30.0 * angle.cos(), 100.0 + 30.0 * angle.sin())
            })
            .collect();
        loop_points.push(loop_points[0]);

        generator.push_streamline(RoadType::SideStreet, loop_points, Direction::Major);

        let streamline = &generator.get_streamlines(RoadType::SideStreet, Direction::Major)[0];
        assert_eq!(streamline.first(), streamline.last());
        assert_eq!(streamline.len(), 13);
        // only twelve arena nodes exist; no seeds were enqueued
        assert_eq!(generator.node_count(), 12);
        assert!(generator.minor_seeds.is_empty());
    }
}
