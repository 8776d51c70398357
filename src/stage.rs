use crate::buffer::Buffer;
use crate::debug::debug_buffer;
use crate::graph::RoadGraph;
use crate::math::{forward_projection, Point3d};
use crate::params::{LaneSide, Parameters};
use crate::state::WorldState;
use crate::traffic::TrackTraffic;
use crate::{ActorId, WaypointId};
use cgmath::MetricSpace;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::Rng;
use slotmap::SparseSecondaryMap;

mod lane_change;

/// Gain in buffer horizon per unit of speed, in s.
const HORIZON_RATE: f64 = 2.0; // s

/// The shortest buffer horizon, in m.
const MINIMUM_HORIZON_LENGTH: f64 = 30.0; // m

/// The longest buffer horizon, in m.
const MAXIMUM_HORIZON_LENGTH: f64 = 60.0; // m

/// Distance from the front waypoint at which the whole path is stale, in m.
const MAX_START_DISTANCE: f64 = 30.0; // m

/// Buffer index probed by the junction entrance test.
const JUNCTION_LOOK_AHEAD: usize = 5;

/// Clearance past the junction end that makes a waypoint safe, in m.
const SAFE_DISTANCE_AFTER_JUNCTION: f64 = 4.0; // m

/// The floor on the distance between successive lane changes, in m.
const INTER_LANE_CHANGE_DISTANCE: f64 = 10.0; // m

/// Bound on buffer extension while searching for a post-junction safe point.
const SAFE_POINT_EXTENSION_LIMIT: usize = 256;

/// The localization result for one actor on one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Localization {
    /// Whether the actor approaches a junction it has not yet entered.
    pub at_junction_entrance: bool,
    /// The first waypoint past the junction, when one is being approached.
    pub junction_end: Option<WaypointId>,
    /// A waypoint safely clear of the junction, when one is being approached.
    pub safe_point: Option<WaypointId>,
}

/// The localization results of every actor updated this tick.
pub type LocalizationFrame = Vec<(ActorId, Localization)>;

/// The points remembered while an actor holds at a junction entrance.
#[derive(Clone, Copy)]
struct JunctionPassage {
    /// The first waypoint past the junction.
    end: Option<WaypointId>,
    /// The first waypoint safely clear of the junction.
    safe: Option<WaypointId>,
}

/// Maintains every actor's forward waypoint buffer and publishes per-tick
/// localization results to the downstream motion stages.
pub struct LocalizationStage {
    /// The planned path of each actor.
    buffers: SparseSecondaryMap<ActorId, Buffer>,
    /// Where each actor last changed lanes.
    last_lane_change: SparseSecondaryMap<ActorId, Point3d>,
    /// Passages remembered for actors holding at a junction entrance.
    at_junction: SparseSecondaryMap<ActorId, JunctionPassage>,
    /// Source for branch selection and the keep-right draw.
    rng: StdRng,
    /// The localization results of the last full update.
    frame: LocalizationFrame,
    /// Debugging information from the previous update pass.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl LocalizationStage {
    /// Creates a stage with no tracked actors.
    ///
    /// The pseudo-random source drives branch selection and the keep-right
    /// draw; seed it per worker to make runs reproducible.
    pub fn new(rng: StdRng) -> Self {
        Self {
            buffers: SparseSecondaryMap::new(),
            last_lane_change: SparseSecondaryMap::new(),
            at_junction: SparseSecondaryMap::new(),
            rng,
            frame: Vec::new(),
            #[cfg(feature = "debug")]
            debug: serde_json::Value::Null,
        }
    }

    /// Gets an actor's current waypoint buffer, if it has one.
    pub fn buffer(&self, actor: ActorId) -> Option<&Buffer> {
        self.buffers.get(actor)
    }

    /// Gets the localization results of the last [Self::update_all].
    pub fn frame(&self) -> &LocalizationFrame {
        &self.frame
    }

    /// Updates every actor in the world and rebuilds the output frame.
    pub fn update_all(
        &mut self,
        world: &WorldState,
        graph: &RoadGraph,
        parameters: &mut Parameters,
        traffic: &TrackTraffic,
    ) {
        self.frame.clear();
        for actor in world.actors() {
            let output = self.update(actor, world, graph, parameters, traffic);
            self.frame.push((actor, output));
        }

        #[cfg(feature = "debug")]
        {
            self.debug = crate::debug::take_debug_frame();
        }
    }

    /// Runs the localization update for a single actor.
    ///
    /// Maintains the actor's waypoint buffer for the current tick, evaluates
    /// lane changes, and reports junction approach. The actor must be present
    /// in `world`; see [WorldState].
    pub fn update(
        &mut self,
        actor: ActorId,
        world: &WorldState,
        graph: &RoadGraph,
        parameters: &mut Parameters,
        traffic: &TrackTraffic,
    ) -> Localization {
        let location = world.location(actor);
        let heading = world.heading(actor);
        let speed = world.velocity(actor);

        // Speed dependent waypoint horizon length.
        let horizon = f64::min(
            speed * HORIZON_RATE + MINIMUM_HORIZON_LENGTH,
            MAXIMUM_HORIZON_LENGTH,
        );
        let horizon2 = horizon * horizon;

        let mut buffer = self.buffers.remove(actor).unwrap_or_default();

        // Discard the path if the actor is too far from its front waypoint.
        if let Some(front) = buffer.front() {
            let deviation2 = graph.get_waypoint(front).position().distance2(location);
            if deviation2 > MAX_START_DISTANCE.powi(2) {
                debug!("rebuilding stale buffer for actor {:?}", actor);
                buffer.clear(actor, traffic);
            }
        }

        // Purge waypoints the actor has already passed.
        while buffer.front().map_or(false, |front| {
            forward_projection(location, heading, graph.get_waypoint(front).position()) <= 0.0
        }) {
            buffer.pop_front(actor, traffic);
        }

        // Detect a junction entrance: the front waypoint is outside a junction
        // while the look-ahead waypoint is inside one.
        let mut at_entrance = false;
        if let Some(front) = buffer.front() {
            let ahead_in_junction = buffer
                .look_ahead(JUNCTION_LOOK_AHEAD)
                .map_or(false, |id| graph.get_waypoint(id).is_junction());
            at_entrance = !graph.get_waypoint(front).is_junction() && ahead_in_junction;

            // Keep the buffer within the horizon, except into a junction.
            while !at_entrance
                && buffer
                    .back()
                    .zip(buffer.front())
                    .map_or(false, |(back, front)| graph.distance2(back, front) > horizon2)
            {
                buffer.pop_back(actor, traffic);
            }
        }

        // Seed an empty buffer from the nearest reachable waypoint.
        if buffer.is_empty() {
            let seed = graph
                .waypoint_in_vicinity(location)
                .or_else(|| graph.nearest_waypoint(location));
            match seed {
                Some(seed) => buffer.push_back(actor, seed, traffic),
                None => {
                    debug!("no waypoint anywhere near actor {:?}", actor);
                    return self.finish(actor, buffer, false, graph, traffic);
                }
            }
        }

        // Work out whether a lane change is wanted this tick.
        let behavior = parameters.behavior(actor);
        let mut forced = parameters.take_forced(actor);
        if forced.is_none() {
            if let Some(percent) = behavior.keep_right_percent {
                if percent >= self.rng.gen_range(0..=100) as f64 {
                    forced = Some(LaneSide::Right);
                }
            }
        }

        let lane_change_distance2 = f64::max(10.0 * speed, INTER_LANE_CHANGE_DISTANCE).powi(2);
        let eligible = (behavior.auto_lane_change || forced.is_some())
            && buffer
                .front()
                .map_or(false, |front| !graph.get_waypoint(front).is_junction())
            && self
                .last_lane_change
                .get(actor)
                .map_or(true, |prev| prev.distance2(location) > lane_change_distance2);

        if eligible {
            let change_over =
                self.assign_lane_change(actor, &buffer, location, speed, forced, graph, traffic);
            if let Some(point) = change_over {
                debug!("actor {:?} changing lanes", actor);
                self.last_lane_change.insert(actor, location);
                buffer.clear(actor, traffic);
                buffer.push_back(actor, point, traffic);
            }
        }

        // Extend the buffer out to the horizon.
        loop {
            let next = match buffer.back().zip(buffer.front()) {
                Some((back, front)) if graph.distance2(back, front) <= horizon2 => {
                    self.next_waypoint(graph, back)
                }
                _ => break,
            };
            match next {
                Some(next) => buffer.push_back(actor, next, traffic),
                None => break,
            }
        }

        // On a fresh junction entrance, work out the junction end and a safe
        // point beyond it, remembered while the actor holds at the entrance.
        if at_entrance && !self.at_junction.contains_key(actor) {
            let passage = find_junction_passage(actor, &mut buffer, graph, traffic);
            if passage.safe.is_none() {
                warn!("no safe point past junction for actor {:?}", actor);
            }
            self.at_junction.insert(actor, passage);
        }

        self.finish(actor, buffer, at_entrance, graph, traffic)
    }

    /// Removes every trace of an actor from the stage and the registry.
    ///
    /// Idempotent; removing an unknown actor is a no-op.
    pub fn remove_actor(&mut self, actor: ActorId, traffic: &TrackTraffic) {
        if let Some(mut buffer) = self.buffers.remove(actor) {
            buffer.clear(actor, traffic);
        }
        traffic.remove_actor(actor);
        self.last_lane_change.remove(actor);
        self.at_junction.remove(actor);
        debug!("removed actor {:?} from localization", actor);
    }

    /// Forgets all lane change and junction tracking history, for a
    /// simulation restart. Buffers and registry occupancy are left in place.
    pub fn reset(&mut self) {
        self.last_lane_change.clear();
        self.at_junction.clear();
    }

    /// Gets the debugging information recorded by the previous update pass
    /// as a JSON array.
    #[cfg(feature = "debug")]
    pub fn debug(&mut self) -> serde_json::Value {
        self.debug.clone()
    }

    /// Picks the waypoint to extend a buffer with, choosing uniformly at
    /// random at a branch and skipping missing waypoints.
    fn next_waypoint(&mut self, graph: &RoadGraph, from: WaypointId) -> Option<WaypointId> {
        let successors = graph.get_waypoint(from).successors();
        let chosen = match successors.len() {
            0 => return None,
            1 => successors[0],
            count => successors[self.rng.gen_range(0..count)],
        };
        if graph.contains(chosen) {
            Some(chosen)
        } else {
            successors.iter().copied().find(|id| graph.contains(*id))
        }
    }

    /// Completes an update: resolves the junction output, refreshes cell
    /// occupancy and stores the buffer back.
    fn finish(
        &mut self,
        actor: ActorId,
        buffer: Buffer,
        at_entrance: bool,
        graph: &RoadGraph,
        traffic: &TrackTraffic,
    ) -> Localization {
        if !at_entrance {
            self.at_junction.remove(actor);
        }
        let passage = self.at_junction.get(actor).copied();

        traffic.update_cell_occupancy(actor, buffer.iter().map(|id| graph.get_waypoint(id).cell()));
        debug_buffer(actor, &buffer, graph);
        self.buffers.insert(actor, buffer);

        Localization {
            at_junction_entrance: at_entrance,
            junction_end: passage.and_then(|passage| passage.end),
            safe_point: passage.and_then(|passage| passage.safe),
        }
    }
}

/// Scans and, where needed, extends a buffer to find the first waypoint past
/// the approaching junction and a safe point beyond it.
///
/// Extension walks first successors, bypassing the horizon cap; it gives up
/// at a dead end or after [SAFE_POINT_EXTENSION_LIMIT] pushes, leaving the
/// points it could not reach unset.
fn find_junction_passage(
    actor: ActorId,
    buffer: &mut Buffer,
    graph: &RoadGraph,
    traffic: &TrackTraffic,
) -> JunctionPassage {
    let safe_distance2 = SAFE_DISTANCE_AFTER_JUNCTION.powi(2);
    let mut entered = false;
    let mut end = None;
    let mut safe = None;

    // Scan the waypoints already in the buffer.
    for current in buffer.iter() {
        let in_junction = graph.get_waypoint(current).is_junction();
        if !entered && in_junction {
            entered = true;
        }
        if entered && end.is_none() && !in_junction {
            end = Some(current);
        }
        if let Some(end) = end {
            if graph.distance2(end, current) > safe_distance2 {
                safe = Some(current);
                break;
            }
        }
    }

    if safe.is_some() {
        return JunctionPassage { end, safe };
    }

    // Extend to the first waypoint past the junction.
    let mut steps = 0;
    while end.is_none() && steps < SAFE_POINT_EXTENSION_LIMIT {
        let next = buffer
            .back()
            .and_then(|back| graph.get_waypoint(back).successors().first().copied())
            .filter(|id| graph.contains(*id));
        match next {
            Some(next) => {
                buffer.push_back(actor, next, traffic);
                steps += 1;
                if !graph.get_waypoint(next).is_junction() {
                    end = Some(next);
                }
            }
            None => break,
        }
    }

    // Extend further until safely clear of it: far enough past the end, at a
    // branch, or inside another junction.
    if let Some(end_point) = end {
        while safe.is_none() && steps < SAFE_POINT_EXTENSION_LIMIT {
            let current = match buffer.back() {
                Some(current) => current,
                None => break,
            };
            let waypoint = graph.get_waypoint(current);
            if graph.distance2(end_point, current) > safe_distance2
                || waypoint.successors().len() > 1
                || waypoint.is_junction()
            {
                safe = Some(current);
            } else {
                let next = waypoint
                    .successors()
                    .first()
                    .copied()
                    .filter(|id| graph.contains(*id));
                match next {
                    Some(next) => {
                        buffer.push_back(actor, next, traffic);
                        steps += 1;
                    }
                    None => break,
                }
            }
        }
    }

    JunctionPassage { end, safe }
}
