pub use buffer::Buffer;
pub use cgmath;
pub use graph::{CellId, LaneId, RoadGraph, RoadId, Waypoint, WaypointAttributes};
pub use params::{Behavior, LaneSide, Parameters};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use stage::{Localization, LocalizationFrame, LocalizationStage};
pub use state::{MotionState, WorldState};
pub use traffic::TrackTraffic;

mod buffer;
mod debug;
mod graph;
pub mod math;
mod params;
mod stage;
mod state;
mod traffic;

new_key_type! {
    /// Unique ID of a [Waypoint].
    pub struct WaypointId;
    /// Unique ID of a simulated actor.
    pub struct ActorId;
}

type WaypointSet = SlotMap<WaypointId, Waypoint>;
type ActorSet = SlotMap<ActorId, MotionState>;
