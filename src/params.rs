use crate::ActorId;
use slotmap::SparseSecondaryMap;

/// The side a lane change moves towards.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LaneSide {
    Left,
    Right,
}

/// Lane change behaviour of an actor.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Behavior {
    /// Whether the actor may change lanes on its own to get around slow traffic.
    pub auto_lane_change: bool,
    /// Chance in percent of requesting a move to the right on each update,
    /// or `None` to disable the bias.
    pub keep_right_percent: Option<f64>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            auto_lane_change: true,
            keep_right_percent: None,
        }
    }
}

/// Behaviour configuration: global defaults, per-actor overrides, and
/// one-shot forced lane change requests.
#[derive(Default)]
pub struct Parameters {
    /// The behaviour applied to actors without an override.
    default: Behavior,
    /// Per-actor behaviour overrides.
    overrides: SparseSecondaryMap<ActorId, Behavior>,
    /// Pending forced lane change requests.
    forced: SparseSecondaryMap<ActorId, LaneSide>,
}

impl Parameters {
    /// Creates a parameter store with default behaviour for every actor.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the behaviour applied to actors without an override.
    pub fn set_default_behavior(&mut self, behavior: Behavior) {
        self.default = behavior;
    }

    /// Overrides the behaviour of a single actor.
    pub fn set_behavior(&mut self, actor: ActorId, behavior: Behavior) {
        self.overrides.insert(actor, behavior);
    }

    /// Gets the behaviour of the actor.
    pub fn behavior(&self, actor: ActorId) -> Behavior {
        self.overrides.get(actor).copied().unwrap_or(self.default)
    }

    /// Requests a lane change to the given side.
    ///
    /// The request is evaluated on the actor's next update and consumed
    /// whether or not a change-over point is found; re-issue it to retry.
    pub fn force_lane_change(&mut self, actor: ActorId, side: LaneSide) {
        self.forced.insert(actor, side);
    }

    /// Takes the pending forced request for the actor, if any.
    pub(crate) fn take_forced(&mut self, actor: ActorId) -> Option<LaneSide> {
        self.forced.remove(actor)
    }

    /// Drops all state held for the actor.
    pub fn remove_actor(&mut self, actor: ActorId) {
        self.overrides.remove(actor);
        self.forced.remove(actor);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::WorldState;

    #[test]
    fn overrides_and_defaults() {
        let mut world = WorldState::new();
        let a = world.add_actor(Default::default());
        let b = world.add_actor(Default::default());

        let mut params = Parameters::new();
        params.set_behavior(
            a,
            Behavior {
                auto_lane_change: false,
                keep_right_percent: Some(50.0),
            },
        );

        assert!(!params.behavior(a).auto_lane_change);
        assert!(params.behavior(b).auto_lane_change);
        assert_eq!(params.behavior(b).keep_right_percent, None);
    }

    #[test]
    fn forced_requests_are_one_shot() {
        let mut world = WorldState::new();
        let actor = world.add_actor(Default::default());

        let mut params = Parameters::new();
        assert_eq!(params.take_forced(actor), None);

        params.force_lane_change(actor, LaneSide::Right);
        assert_eq!(params.take_forced(actor), Some(LaneSide::Right));
        assert_eq!(params.take_forced(actor), None);
    }
}
