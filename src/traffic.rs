use crate::graph::CellId;
use crate::{ActorId, WaypointId};
use itertools::Itertools;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

/// The number of independently locked shards.
const SHARD_COUNT: usize = 16;

/// Shared registry of which actors' buffers pass through which waypoints and
/// coarse occupancy cells.
///
/// State is sharded by key hash so per-actor updates running on different
/// workers rarely contend on the same lock. Methods take at most one shard
/// lock at a time, so any combination of concurrent calls is deadlock free.
pub struct TrackTraffic {
    shards: Box<[Mutex<Shard>]>,
}

#[derive(Default)]
struct Shard {
    /// Actors whose buffer passes through each waypoint.
    passing: HashMap<WaypointId, HashSet<ActorId>>,
    /// Waypoints in each actor's buffer.
    actor_waypoints: HashMap<ActorId, HashSet<WaypointId>>,
    /// Actors occupying each coarse cell.
    cell_actors: HashMap<CellId, HashSet<ActorId>>,
    /// Cells occupied by each actor's buffer.
    actor_cells: HashMap<ActorId, HashSet<CellId>>,
}

impl Default for TrackTraffic {
    fn default() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(Shard::default()))
            .collect();
        Self { shards }
    }
}

impl TrackTraffic {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Default::default()
    }

    /// Records that the actor's buffer passes through the waypoint.
    pub(crate) fn update_passing_vehicle(&self, waypoint: WaypointId, actor: ActorId) {
        self.shard(&waypoint)
            .passing
            .entry(waypoint)
            .or_default()
            .insert(actor);
        self.shard(&actor)
            .actor_waypoints
            .entry(actor)
            .or_default()
            .insert(waypoint);
    }

    /// Records that the actor's buffer no longer passes through the waypoint.
    pub(crate) fn remove_passing_vehicle(&self, waypoint: WaypointId, actor: ActorId) {
        let mut shard = self.shard(&waypoint);
        if let Some(actors) = shard.passing.get_mut(&waypoint) {
            actors.remove(&actor);
            if actors.is_empty() {
                shard.passing.remove(&waypoint);
            }
        }
        drop(shard);

        let mut shard = self.shard(&actor);
        if let Some(waypoints) = shard.actor_waypoints.get_mut(&actor) {
            waypoints.remove(&waypoint);
            if waypoints.is_empty() {
                shard.actor_waypoints.remove(&actor);
            }
        }
    }

    /// The number of actors whose buffer passes through the waypoint.
    pub fn passing_count(&self, waypoint: WaypointId) -> usize {
        self.shard(&waypoint)
            .passing
            .get(&waypoint)
            .map(|actors| actors.len())
            .unwrap_or(0)
    }

    /// Replaces the set of coarse cells occupied by the actor's buffer,
    /// removing stale memberships and adding new ones.
    pub(crate) fn update_cell_occupancy(
        &self,
        actor: ActorId,
        cells: impl IntoIterator<Item = CellId>,
    ) {
        let new: HashSet<CellId> = cells.into_iter().collect();
        let old = self
            .shard(&actor)
            .actor_cells
            .insert(actor, new.clone())
            .unwrap_or_default();

        for cell in old.difference(&new) {
            let mut shard = self.shard(cell);
            if let Some(actors) = shard.cell_actors.get_mut(cell) {
                actors.remove(&actor);
                if actors.is_empty() {
                    shard.cell_actors.remove(cell);
                }
            }
        }
        for cell in new.difference(&old) {
            self.shard(cell)
                .cell_actors
                .entry(*cell)
                .or_default()
                .insert(actor);
        }
    }

    /// Gets the actors whose buffers share an occupancy cell with this actor.
    ///
    /// The queried actor itself is never part of the answer.
    pub fn overlapping_actors(&self, actor: ActorId) -> Vec<ActorId> {
        let cells = self
            .shard(&actor)
            .actor_cells
            .get(&actor)
            .cloned()
            .unwrap_or_default();

        cells
            .iter()
            .flat_map(|cell| {
                self.shard(cell)
                    .cell_actors
                    .get(cell)
                    .map(|actors| actors.iter().copied().collect::<Vec<_>>())
                    .unwrap_or_default()
            })
            .unique()
            .filter(|other| *other != actor)
            .collect()
    }

    /// Scrubs every trace of the actor from the registry. Idempotent.
    pub(crate) fn remove_actor(&self, actor: ActorId) {
        let waypoints = self
            .shard(&actor)
            .actor_waypoints
            .remove(&actor)
            .unwrap_or_default();
        for waypoint in waypoints {
            let mut shard = self.shard(&waypoint);
            if let Some(actors) = shard.passing.get_mut(&waypoint) {
                actors.remove(&actor);
                if actors.is_empty() {
                    shard.passing.remove(&waypoint);
                }
            }
        }

        let cells = self
            .shard(&actor)
            .actor_cells
            .remove(&actor)
            .unwrap_or_default();
        for cell in cells {
            let mut shard = self.shard(&cell);
            if let Some(actors) = shard.cell_actors.get_mut(&cell) {
                actors.remove(&actor);
                if actors.is_empty() {
                    shard.cell_actors.remove(&cell);
                }
            }
        }
    }

    /// Locks and returns the shard responsible for the given key.
    fn shard<K: Hash>(&self, key: &K) -> MutexGuard<Shard> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % SHARD_COUNT as u64) as usize;
        self.shards[index].lock().unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::{LaneId, RoadGraph, RoadId, WaypointAttributes};
    use crate::math::{Point3d, Vector3d};
    use crate::WorldState;

    fn graph_line(count: usize, spacing: f64) -> (RoadGraph, Vec<WaypointId>) {
        let mut graph = RoadGraph::new();
        let ids = (0..count)
            .map(|i| {
                graph.add_waypoint(&WaypointAttributes {
                    position: Point3d::new(spacing * i as f64, 0.0, 0.0),
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
    fn overlap_follows_cell_occupancy() {
        let (graph, ids) = graph_line(6, 20.0);
        let traffic = TrackTraffic::new();
        let mut world = WorldState::new();
        let a = world.add_actor(Default::default());
        let b = world.add_actor(Default::default());

        let cells = |range: std::ops::Range<usize>| {
            range
                .map(|i| graph.get_waypoint(ids[i]).cell())
                .collect::<Vec<_>>()
        };

        traffic.update_cell_occupancy(a, cells(0..3));
        traffic.update_cell_occupancy(b, cells(2..6));
        assert_eq!(traffic.overlapping_actors(a), vec![b]);
        assert_eq!(traffic.overlapping_actors(b), vec![a]);

        // Move actor B far away and the overlap disappears.
        traffic.update_cell_occupancy(b, [CellId::containing(Point3d::new(900.0, 900.0, 0.0))]);
        assert!(traffic.overlapping_actors(a).is_empty());
        assert!(traffic.overlapping_actors(b).is_empty());
    }

    #[test]
    fn remove_actor_is_idempotent() {
        let (graph, ids) = graph_line(3, 2.0);
        let traffic = TrackTraffic::new();
        let mut world = WorldState::new();
        let actor = world.add_actor(Default::default());

        for id in &ids {
            traffic.update_passing_vehicle(*id, actor);
        }
        traffic.update_cell_occupancy(actor, ids.iter().map(|id| graph.get_waypoint(*id).cell()));

        traffic.remove_actor(actor);
        traffic.remove_actor(actor);

        for id in &ids {
            assert_eq!(traffic.passing_count(*id), 0);
        }
        assert!(traffic.overlapping_actors(actor).is_empty());
    }

    #[test]
    fn concurrent_updates_from_scoped_threads() {
        let (graph, ids) = graph_line(64, 2.0);
        let traffic = TrackTraffic::new();
        let mut world = WorldState::new();
        let actors = (0..4)
            .map(|_| world.add_actor(Default::default()))
            .collect::<Vec<_>>();

        std::thread::scope(|scope| {
            for actor in &actors {
                let traffic = &traffic;
                let graph = &graph;
                let ids = &ids;
                scope.spawn(move || {
                    for id in ids {
                        traffic.update_passing_vehicle(*id, *actor);
                    }
                    traffic.update_cell_occupancy(
                        *actor,
                        ids.iter().map(|id| graph.get_waypoint(*id).cell()),
                    );
                });
            }
        });

        for id in &ids {
            assert_eq!(traffic.passing_count(*id), actors.len());
        }
        for actor in &actors {
            assert_eq!(traffic.overlapping_actors(*actor).len(), actors.len() - 1);
        }
    }
}
