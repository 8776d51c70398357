use super::LocalizationStage;
use crate::buffer::Buffer;
use crate::graph::RoadGraph;
use crate::math::Point3d;
use crate::params::LaneSide;
use crate::traffic::TrackTraffic;
use crate::{ActorId, WaypointId};
use cgmath::{InnerSpace, MetricSpace};

/// Obstacles closer than this rule out a lane change, in m.
const MINIMUM_LANE_CHANGE_DISTANCE: f64 = 3.0; // m

/// Obstacles farther than this are not worth a lane change, in m.
const MAXIMUM_LANE_OBSTACLE_DISTANCE: f64 = 50.0; // m

/// Minimum heading alignment with a waypoint ahead to call it a same-lane obstacle.
const MAXIMUM_LANE_OBSTACLE_CURVATURE: f64 = 0.6;

/// Gain in change-over distance per unit of speed, in s.
const CHANGE_OVER_RATE: f64 = 1.5; // s

/// The shortest distance to a change-over point, in m.
const MINIMUM_CHANGE_OVER_DISTANCE: f64 = 3.0; // m

/// The longest distance to a change-over point, in m.
const MAXIMUM_CHANGE_OVER_DISTANCE: f64 = 20.0; // m

impl LocalizationStage {
    /// Decides whether the actor can change lanes, and where to.
    ///
    /// Without a forced side the change is obstacle driven: the nearest
    /// same-lane obstacle ahead is found through the registry overlap sets,
    /// and the change targets whichever of its neighbour lanes is free,
    /// preferring the right. A forced request takes the actor's neighbour
    /// waypoint on the requested side regardless of occupancy. The returned
    /// waypoint becomes the actor's new buffer front.
    pub(super) fn assign_lane_change(
        &self,
        actor: ActorId,
        buffer: &Buffer,
        location: Point3d,
        speed: f64,
        forced: Option<LaneSide>,
        graph: &RoadGraph,
        traffic: &TrackTraffic,
    ) -> Option<WaypointId> {
        let front = buffer.front()?;
        let current = graph.get_waypoint(front);
        let left = current.left_neighbor();
        let right = current.right_neighbor();

        let change_over = if let Some(side) = forced {
            match side {
                LaneSide::Right => right,
                LaneSide::Left => left,
            }
        } else {
            // Find the nearest same-lane obstacle ahead of the actor.
            let mut obstacle = None;
            let mut obstacle_distance2 = f64::INFINITY;
            let mut too_close = false;

            for other in traffic.overlapping_actors(actor) {
                let other_front = match self.buffers.get(other).and_then(|buffer| buffer.front()) {
                    Some(front) => front,
                    None => continue,
                };
                let other_waypoint = graph.get_waypoint(other_front);

                // Same lane of the same road, ahead of the actor, outside any
                // junction, and heading the same way.
                let qualifies = !current.is_junction()
                    && !other_waypoint.is_junction()
                    && other_waypoint.road() == current.road()
                    && other_waypoint.lane() == current.lane()
                    && current
                        .direction()
                        .dot(other_waypoint.position() - current.position())
                        > 0.0
                    && current.direction().dot(other_waypoint.direction())
                        > MAXIMUM_LANE_OBSTACLE_CURVATURE;
                if !qualifies {
                    continue;
                }

                let distance2 = location.distance2(other_waypoint.position());
                if distance2 <= MINIMUM_LANE_CHANGE_DISTANCE.powi(2) {
                    too_close = true;
                    break;
                }
                if distance2 < obstacle_distance2
                    && distance2 < MAXIMUM_LANE_OBSTACLE_DISTANCE.powi(2)
                {
                    obstacle_distance2 = distance2;
                    obstacle = Some(other_front);
                }
            }

            match obstacle.filter(|_| !too_close) {
                Some(obstacle_front) => {
                    let obstacle_waypoint = graph.get_waypoint(obstacle_front);
                    let free =
                        |id: Option<WaypointId>| id.filter(|id| traffic.passing_count(*id) == 0);

                    // The lane beside the obstacle must be clear, and so must
                    // the actor's own waypoint on that side.
                    let mut target = None;
                    if free(obstacle_waypoint.right_neighbor()).is_some() {
                        target = free(right);
                    }
                    if target.is_none() && free(obstacle_waypoint.left_neighbor()).is_some() {
                        target = free(left);
                    }
                    target
                }
                None => None,
            }
        };

        // Project the change-over point forward so the hand-off does not sit
        // beside the actor, stopping short of any junction or dead end.
        change_over.map(|start| {
            let distance = f64::clamp(
                CHANGE_OVER_RATE * speed,
                MINIMUM_CHANGE_OVER_DISTANCE,
                MAXIMUM_CHANGE_OVER_DISTANCE,
            );
            let mut point = start;
            while graph.distance2(point, start) < distance.powi(2)
                && !graph.get_waypoint(point).is_junction()
            {
                match graph.get_waypoint(point).successors().first() {
                    Some(next) if graph.contains(*next) => point = *next,
                    _ => break,
                }
            }
            point
        })
    }
}
