use crate::buffer::Buffer;
use crate::graph::RoadGraph;
use crate::ActorId;
#[cfg(feature = "debug")]
use serde_json::json;
#[cfg(feature = "debug")]
use slotmap::Key;

#[cfg(feature = "debug")]
thread_local!(
    static DEBUG_FRAME: std::cell::RefCell<Vec<serde_json::Value>> = Default::default();
);

/// Records an actor's buffer as a sampled polyline, at most ten points long.
#[allow(unused)]
pub fn debug_buffer(actor: ActorId, buffer: &Buffer, graph: &RoadGraph) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        let step = usize::max(buffer.len() / 10, 1);
        let points = buffer
            .iter()
            .step_by(step)
            .map(|id| {
                let position = graph.get_waypoint(id).position();
                [position.x, position.y, position.z]
            })
            .collect::<Vec<_>>();
        frame.borrow_mut().push(json!({
            "type": "buffer",
            "actor": actor.data().as_ffi(),
            "points": points,
        }))
    })
}

#[cfg(feature = "debug")]
pub fn take_debug_frame() -> serde_json::Value {
    json!(DEBUG_FRAME.with(|frame| frame.take()))
}
