//! Procedural street networks traced over an editable tensor field.
//!
//! A composite tensor field (grid and radial basis fields) is sampled
//! for its principal directions; streamlines integrated through it
//! become main roads, high streets and side streets. The pipeline is
//! deterministic for a fixed field, seed and parameter set.
//!
//! Rendering, brush editing and camera control live in the consuming
//! app; this crate only exposes the field, the generator and read-only
//! views of the result.

use bevy::prelude::*;

pub mod generator;
pub mod geometry;
pub mod roads;
pub mod spatial;
pub mod streamline;
pub mod tensor;

pub use generator::{default_parameters, GeneratorParameters, RoadGenerator};
pub use geometry::Bounds;
pub use roads::{
    JunctionKind, NodeId, RoadGraph, RoadJunction, RoadSegment, RoadType, Streamline,
    StreamlineNode, Streamlines,
};
pub use spatial::Spatial;
pub use streamline::{FieldIntegrator, NoisyRk4Integrator, Rk4Integrator};
pub use tensor::{BasisField, BasisKind, Direction, DirectionMask, Tensor, TensorField};

use bevy::math::DVec2;
use std::collections::HashMap;

/// Event to trigger a full generation pass.
#[derive(Event)]
pub struct GenerateRoadsEvent;

/// Settings consumed when a [`GenerateRoadsEvent`] fires.
#[derive(Resource, Clone)]
pub struct RoadGenSettings {
    /// World-space region streets are generated in.
    pub viewport: Bounds,
    /// Seed for the generator's random engine.
    pub seed: u64,
    /// Endpoint snapping radius used by the [`RoadGraph`] export.
    pub graph_snap_distance: f64,
    /// Per road class tuning.
    pub parameters: HashMap<RoadType, GeneratorParameters>,
}

impl Default for RoadGenSettings {
    fn default() -> Self {
        Self {
            viewport: Bounds::new(DVec2::ZERO, DVec2::new(1700.0, 1000.0)),
            seed: 0,
            graph_snap_distance: 8.0,
            parameters: default_parameters(),
        }
    }
}

/// The generator and its committed streamlines, kept as a resource so
/// interactive stepping and HUD queries survive across frames.
#[derive(Resource)]
pub struct RoadNetwork(pub RoadGenerator<Rk4Integrator>);

impl Default for RoadNetwork {
    fn default() -> Self {
        let settings = RoadGenSettings::default();
        Self(RoadGenerator::new(
            Rk4Integrator::new(TensorField::default()),
            settings.parameters,
            settings.viewport,
        ))
    }
}

/// Registers the tensor field, generator state and the event-driven
/// generation system.
pub struct RoadNetworkPlugin;

impl Plugin for RoadNetworkPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TensorField>()
            .init_resource::<RoadGenSettings>()
            .init_resource::<RoadNetwork>()
            .init_resource::<RoadGraph>()
            .add_event::<GenerateRoadsEvent>()
            .add_systems(Update, generate_roads_on_event);
    }
}

/// Rebuild the network from the current field and settings, then
/// refresh the exported graph.
fn generate_roads_on_event(
    mut events: EventReader<GenerateRoadsEvent>,
    field: Res<TensorField>,
    settings: Res<RoadGenSettings>,
    mut network: ResMut<RoadNetwork>,
    mut graph: ResMut<RoadGraph>,
) {
    for _ in events.read() {
        info!("Generating road network...");

        let mut generator = RoadGenerator::new(
            Rk4Integrator::new(field.clone()),
            settings.parameters.clone(),
            settings.viewport,
        );
        generator.set_seed(settings.seed);
        generator.generate();

        *graph = RoadGraph::from_network(&generator, settings.graph_snap_distance);
        info!(
            "Road generation complete: {} streamlines, {} nodes, {} junctions",
            generator.streamline_count(),
            generator.node_count(),
            graph.junction_count()
        );

        network.0 = generator;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_cover_all_road_classes() {
        let settings = RoadGenSettings::default();
        assert_eq!(settings.parameters.len(), 3);
        assert!(settings.parameters.contains_key(&RoadType::Main));
        assert!(settings.parameters.contains_key(&RoadType::HighStreet));
        assert!(settings.parameters.contains_key(&RoadType::SideStreet));
        assert!(!settings.viewport.is_empty());
    }

    #[test]
    fn graph_export_follows_a_generated_network() {
        let mut field = TensorField::default();
        field.add_basis_field(BasisField::grid(0.0, DVec2::ZERO, 0.0, 0.0));

        let params = HashMap::from([(
            RoadType::SideStreet,
            GeneratorParameters::new(50, 1000, 20.0, 15.0, 5.0, 1.0, 40.0, 0.1, 0.5, 10.0),
        )]);
        let mut generator = RoadGenerator::new(
            Rk4Integrator::new(field),
            params,
            Bounds::new(DVec2::ZERO, DVec2::new(200.0, 200.0)),
        );
        generator.generate();
        assert!(generator.streamline_count() > 0);

        let graph = RoadGraph::from_network(&generator, 8.0);
        assert_eq!(graph.segment_count(), generator.streamline_count());
        assert!(graph.junction_count() > 0);
        // snapping can only merge endpoints, never invent them
        assert!(graph.junction_count() <= 2 * generator.streamline_count());
    }
}
