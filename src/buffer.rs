use crate::traffic::TrackTraffic;
use crate::{ActorId, WaypointId};
use std::collections::VecDeque;

/// An actor's planned near-future path: a sliding window over the road network.
///
/// The front is the nearest upcoming waypoint and the back the farthest
/// planned one. Every mutation goes through the shared [TrackTraffic]
/// registry, so occupancy data can never go stale relative to the buffer.
#[derive(Clone, Default)]
pub struct Buffer {
    waypoints: VecDeque<WaypointId>,
}

impl Buffer {
    /// Appends a waypoint to the back of the buffer and registers its occupancy.
    pub(crate) fn push_back(
        &mut self,
        actor: ActorId,
        waypoint: WaypointId,
        traffic: &TrackTraffic,
    ) {
        traffic.update_passing_vehicle(waypoint, actor);
        self.waypoints.push_back(waypoint);
    }

    /// Removes the front waypoint and unregisters its occupancy.
    pub(crate) fn pop_front(&mut self, actor: ActorId, traffic: &TrackTraffic) -> Option<WaypointId> {
        let waypoint = self.waypoints.pop_front()?;
        traffic.remove_passing_vehicle(waypoint, actor);
        Some(waypoint)
    }

    /// Removes the back waypoint and unregisters its occupancy.
    pub(crate) fn pop_back(&mut self, actor: ActorId, traffic: &TrackTraffic) -> Option<WaypointId> {
        let waypoint = self.waypoints.pop_back()?;
        traffic.remove_passing_vehicle(waypoint, actor);
        Some(waypoint)
    }

    /// Removes every waypoint, unregistering each one.
    pub(crate) fn clear(&mut self, actor: ActorId, traffic: &TrackTraffic) {
        while self.pop_front(actor, traffic).is_some() {}
    }

    /// Gets the nearest upcoming waypoint.
    pub fn front(&self) -> Option<WaypointId> {
        self.waypoints.front().copied()
    }

    /// Gets the farthest planned waypoint.
    pub fn back(&self) -> Option<WaypointId> {
        self.waypoints.back().copied()
    }

    /// Gets the waypoint at `index` from the front.
    pub fn get(&self, index: usize) -> Option<WaypointId> {
        self.waypoints.get(index).copied()
    }

    /// Gets the waypoint at `index` from the front, clamped to the back.
    ///
    /// Buffers shorter than the index answer with their farthest element,
    /// which is the target-waypoint lookup used by the junction entrance test.
    pub fn look_ahead(&self, index: usize) -> Option<WaypointId> {
        self.waypoints
            .get(index)
            .or_else(|| self.waypoints.back())
            .copied()
    }

    /// The number of waypoints in the buffer.
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Returns `true` if the buffer holds no waypoints.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Iterates over the waypoints from front to back.
    pub fn iter(&self) -> impl Iterator<Item = WaypointId> + '_ {
        self.waypoints.iter().copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::{LaneId, RoadGraph, RoadId, WaypointAttributes};
    use crate::math::{Point3d, Vector3d};
    use crate::WorldState;

    fn graph_line(count: usize) -> (RoadGraph, Vec<WaypointId>) {
        let mut graph = RoadGraph::new();
        let ids = (0..count)
            .map(|i| {
                graph.add_waypoint(&WaypointAttributes {
                    position: Point3d::new(2.0 * i as f64, 0.0, 0.0),
                    direction: Vector3d::new(1.0, 0.0, 0.0),
                    road: RoadId(0),
                    lane: LaneId(1),
                    junction: false,
                })
            })
            .collect::<Vec<_>>();
        (graph, ids)
    }

    #[test]
    fn push_pop_round_trip() {
        let (_, ids) = graph_line(4);
        let traffic = TrackTraffic::new();
        let mut world = WorldState::new();
        let actor = world.add_actor(Default::default());

        let mut buffer = Buffer::default();
        for id in &ids {
            buffer.push_back(actor, *id, &traffic);
        }
        for id in &ids {
            assert_eq!(traffic.passing_count(*id), 1);
        }

        for id in &ids {
            assert_eq!(buffer.pop_front(actor, &traffic), Some(*id));
        }
        assert!(buffer.is_empty());
        for id in &ids {
            assert_eq!(traffic.passing_count(*id), 0);
        }
    }

    #[test]
    fn clear_unregisters_everything() {
        let (_, ids) = graph_line(3);
        let traffic = TrackTraffic::new();
        let mut world = WorldState::new();
        let actor = world.add_actor(Default::default());

        let mut buffer = Buffer::default();
        for id in &ids {
            buffer.push_back(actor, *id, &traffic);
        }
        buffer.clear(actor, &traffic);

        assert!(buffer.is_empty());
        for id in &ids {
            assert_eq!(traffic.passing_count(*id), 0);
        }
    }

    #[test]
    fn look_ahead_clamps_to_back() {
        let (_, ids) = graph_line(3);
        let traffic = TrackTraffic::new();
        let mut world = WorldState::new();
        let actor = world.add_actor(Default::default());

        let mut buffer = Buffer::default();
        assert_eq!(buffer.look_ahead(5), None);
        for id in &ids {
            buffer.push_back(actor, *id, &traffic);
        }
        assert_eq!(buffer.look_ahead(1), Some(ids[1]));
        assert_eq!(buffer.look_ahead(5), Some(ids[2]));
    }
}
