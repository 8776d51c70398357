use crate::math::Point3d;
use crate::{WaypointId, WaypointSet};
use arrayvec::ArrayVec;
use cgmath::MetricSpace;
use std::collections::HashMap;

/// The quantization of the vicinity search grid, in m.
const GRID_SPACING: f64 = 16.0; // m

/// A uniform grid over the plan-view plane for bounded nearest-waypoint lookups.
#[derive(Default)]
pub struct VicinityGrid {
    cells: HashMap<(i32, i32), Vec<WaypointId>>,
}

impl VicinityGrid {
    /// Indexes a waypoint at the given position.
    pub fn insert(&mut self, position: Point3d, id: WaypointId) {
        self.cells.entry(Self::cell(position)).or_default().push(id);
    }

    /// Finds the waypoint nearest to `location` within the cell containing it
    /// and the eight surrounding cells.
    pub fn nearest_in_vicinity(
        &self,
        location: Point3d,
        waypoints: &WaypointSet,
    ) -> Option<WaypointId> {
        let (cx, cy) = Self::cell(location);
        let mut probes = ArrayVec::<(i32, i32), 9>::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                probes.push((cx + dx, cy + dy));
            }
        }

        probes
            .iter()
            .filter_map(|cell| self.cells.get(cell))
            .flatten()
            .map(|id| (*id, waypoints[*id].position().distance2(location)))
            .min_by(|a, b| f64::total_cmp(&a.1, &b.1))
            .map(|(id, _)| id)
    }

    /// Gets the grid cell containing the given position.
    fn cell(position: Point3d) -> (i32, i32) {
        (
            (position.x / GRID_SPACING).floor() as i32,
            (position.y / GRID_SPACING).floor() as i32,
        )
    }
}
