use cgmath::InnerSpace;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use std::time::Instant;
use traffic_localization::math::{Point3d, Vector3d};
use traffic_localization::{
    ActorId, Behavior, LaneId, LocalizationStage, MotionState, Parameters, RoadGraph, RoadId,
    TrackTraffic, WaypointAttributes, WorldState,
};

/// The simulation time step, in s.
const TIME_STEP: f64 = 0.05; // s

/// The inner and outer lane radii of the demo ring, in m.
const INNER_RADIUS: f64 = 120.0; // m
const OUTER_RADIUS: f64 = 123.5; // m

/// Waypoints per lane around the ring.
const RING_STEPS: usize = 360;

/// The stretch of the ring marked as a junction.
const JUNCTION_ARC: std::ops::Range<usize> = 100..118;

fn main() {
    let graph = build_ring_road();
    let traffic = TrackTraffic::new();
    let mut world = WorldState::new();

    let mut parameters = Parameters::new();
    parameters.set_default_behavior(Behavior {
        auto_lane_change: true,
        keep_right_percent: Some(2.0),
    });

    let mut stage = LocalizationStage::new(StdRng::seed_from_u64(4257));

    // Spawn actors around the inner lane with normally distributed speeds.
    let mut rng = StdRng::seed_from_u64(99);
    let speeds = rand_distr::Normal::new(8.0_f64, 2.0).expect("Invalid standard deviation");
    let actors = (0..400)
        .map(|i| {
            let angle = i as f64 * std::f64::consts::TAU / 400.0;
            world.add_actor(MotionState {
                location: ring_point(angle, INNER_RADIUS),
                heading: ring_heading(angle),
                velocity: speeds.sample(&mut rng).clamp(2.0, 15.0),
            })
        })
        .collect::<Vec<_>>();

    println!("Localizing...");
    let num_ticks = 1000;
    loop {
        let start = Instant::now();
        for _ in 0..num_ticks {
            stage.update_all(&world, &graph, &mut parameters, &traffic);
            advance_actors(&mut world, &actors, &stage, &graph);
        }
        let tick = start.elapsed() / num_ticks;
        println!(
            "Avg. tick: {:?} ({} actors, {} at a junction entrance)",
            tick,
            actors.len(),
            stage
                .frame()
                .iter()
                .filter(|(_, output)| output.at_junction_entrance)
                .count(),
        )
    }
}

/// Builds a two lane ring road with one junction arc.
fn build_ring_road() -> RoadGraph {
    let mut graph = RoadGraph::new();

    let lane = |graph: &mut RoadGraph, radius: f64, lane: LaneId| {
        (0..RING_STEPS)
            .map(|i| {
                let angle = i as f64 * std::f64::consts::TAU / RING_STEPS as f64;
                graph.add_waypoint(&WaypointAttributes {
                    position: ring_point(angle, radius),
                    direction: ring_heading(angle),
                    road: RoadId(1),
                    lane,
                    junction: JUNCTION_ARC.contains(&i),
                })
            })
            .collect::<Vec<_>>()
    };
    let inner = lane(&mut graph, INNER_RADIUS, LaneId(1));
    let outer = lane(&mut graph, OUTER_RADIUS, LaneId(2));

    for i in 0..RING_STEPS {
        let next = (i + 1) % RING_STEPS;
        graph.add_connection(inner[i], inner[next]);
        graph.add_connection(outer[i], outer[next]);
        if !JUNCTION_ARC.contains(&i) {
            graph.set_neighbors(inner[i], None, Some(outer[i]));
            graph.set_neighbors(outer[i], Some(inner[i]), None);
        }
    }
    graph
}

/// Moves each actor towards its buffer front at its assigned speed.
fn advance_actors(
    world: &mut WorldState,
    actors: &[ActorId],
    stage: &LocalizationStage,
    graph: &RoadGraph,
) {
    for actor in actors {
        let target = match stage.buffer(*actor).and_then(|buffer| buffer.front()) {
            Some(target) => target,
            None => continue,
        };
        let location = world.location(*actor);
        let speed = world.velocity(*actor);

        let to_target = graph.get_waypoint(target).position() - location;
        let heading = if to_target.magnitude2() > 1e-6 {
            to_target.normalize()
        } else {
            graph.get_waypoint(target).direction()
        };
        world.set_motion(
            *actor,
            MotionState {
                location: location + heading * speed * TIME_STEP,
                heading,
                velocity: speed,
            },
        );
    }
}

/// A point on a ring of the given radius, at height zero.
fn ring_point(angle: f64, radius: f64) -> Point3d {
    Point3d::new(radius * angle.cos(), radius * angle.sin(), 0.0)
}

/// The unit travel direction at the given ring angle, anticlockwise.
fn ring_heading(angle: f64) -> Vector3d {
    Vector3d::new(-angle.sin(), angle.cos(), 0.0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ring_road_wraps_around() {
        let graph = build_ring_road();
        let start = graph
            .nearest_waypoint(ring_point(0.0, INNER_RADIUS))
            .unwrap();

        // Following successors all the way around returns to the start and
        // passes through the junction arc exactly once.
        let mut point = start;
        let mut junctions = 0;
        for _ in 0..RING_STEPS {
            point = graph.get_waypoint(point).successors()[0];
            if graph.get_waypoint(point).is_junction() {
                junctions += 1;
            }
        }
        assert_eq!(point, start);
        assert_eq!(junctions, JUNCTION_ARC.len());
    }
}
