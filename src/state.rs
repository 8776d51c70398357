use crate::math::{Point3d, Vector3d};
use crate::{ActorId, ActorSet};

/// The kinematic state of an actor for the current tick.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionState {
    /// The position of the actor.
    pub location: Point3d,
    /// Unit vector in the direction the actor is facing.
    pub heading: Vector3d,
    /// The forward speed of the actor in m/s.
    pub velocity: f64,
}

impl Default for MotionState {
    fn default() -> Self {
        Self {
            location: Point3d::new(0.0, 0.0, 0.0),
            heading: Vector3d::new(1.0, 0.0, 0.0),
            velocity: 0.0,
        }
    }
}

/// Per-tick kinematic state for every simulated actor.
///
/// Owns the actor handles used throughout the crate and answers the narrow
/// set of queries localization needs. Querying an actor that was never added,
/// or was already removed, is a caller error and panics; remove an actor from
/// the localization stage before removing it here.
#[derive(Default)]
pub struct WorldState {
    /// The actors being simulated.
    actors: ActorSet,
}

impl WorldState {
    /// Creates an empty world state.
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers an actor, returning the handle that identifies it everywhere.
    pub fn add_actor(&mut self, state: MotionState) -> ActorId {
        self.actors.insert(state)
    }

    /// Replaces an actor's kinematic state for the current tick.
    pub fn set_motion(&mut self, actor: ActorId, state: MotionState) {
        self.actors[actor] = state;
    }

    /// Removes an actor from the world.
    pub fn remove_actor(&mut self, actor: ActorId) {
        self.actors.remove(actor);
    }

    /// Gets the position of the actor.
    pub fn location(&self, actor: ActorId) -> Point3d {
        self.actors[actor].location
    }

    /// Gets the unit heading of the actor.
    pub fn heading(&self, actor: ActorId) -> Vector3d {
        self.actors[actor].heading
    }

    /// Gets the forward speed of the actor in m/s.
    pub fn velocity(&self, actor: ActorId) -> f64 {
        self.actors[actor].velocity
    }

    /// Iterates over the handles of all actors in the world.
    pub fn actors(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.actors.keys()
    }
}
