use crate::math::{Point3d, Vector3d};
use crate::{WaypointId, WaypointSet};
use cgmath::MetricSpace;
use grid::VicinityGrid;
use smallvec::SmallVec;

mod grid;

/// The edge length of a coarse occupancy cell, in m.
const CELL_SIZE: f64 = 32.0; // m

/// Identifies a road in the source map.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoadId(pub u32);

/// Identifies a lane within a road. The sign encodes the travel direction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LaneId(pub i32);

/// Identifies a coarse occupancy cell of the road network.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CellId(i32, i32);

impl CellId {
    /// Gets the cell containing the given position.
    pub(crate) fn containing(position: Point3d) -> Self {
        Self(
            (position.x / CELL_SIZE).floor() as i32,
            (position.y / CELL_SIZE).floor() as i32,
        )
    }
}

/// A discrete point on the road network.
#[derive(Clone)]
pub struct Waypoint {
    /// The position of the waypoint.
    position: Point3d,
    /// Unit vector in the direction of travel.
    direction: Vector3d,
    /// The road the waypoint lies on.
    road: RoadId,
    /// The lane the waypoint lies on.
    lane: LaneId,
    /// Whether the waypoint is inside a junction.
    junction: bool,
    /// The occupancy cell containing the waypoint.
    cell: CellId,
    /// The waypoints that succeed this one; more than one at a branch.
    next: SmallVec<[WaypointId; 2]>,
    /// The neighbouring waypoint in the lane to the left.
    left: Option<WaypointId>,
    /// The neighbouring waypoint in the lane to the right.
    right: Option<WaypointId>,
}

/// The attributes of a waypoint.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WaypointAttributes {
    /// The position of the waypoint.
    pub position: Point3d,
    /// Unit vector in the direction of travel.
    pub direction: Vector3d,
    /// The road the waypoint lies on.
    pub road: RoadId,
    /// The lane the waypoint lies on.
    pub lane: LaneId,
    /// Whether the waypoint is inside a junction.
    pub junction: bool,
}

impl Waypoint {
    /// Creates a new waypoint.
    fn new(attribs: &WaypointAttributes) -> Self {
        Self {
            position: attribs.position,
            direction: attribs.direction,
            road: attribs.road,
            lane: attribs.lane,
            junction: attribs.junction,
            cell: CellId::containing(attribs.position),
            next: SmallVec::new(),
            left: None,
            right: None,
        }
    }

    /// Gets the position of the waypoint.
    pub fn position(&self) -> Point3d {
        self.position
    }

    /// Gets the unit direction of travel at the waypoint.
    pub fn direction(&self) -> Vector3d {
        self.direction
    }

    /// Gets the ID of the road the waypoint lies on.
    pub fn road(&self) -> RoadId {
        self.road
    }

    /// Gets the ID of the lane the waypoint lies on.
    pub fn lane(&self) -> LaneId {
        self.lane
    }

    /// Returns `true` if the waypoint is inside a junction.
    pub fn is_junction(&self) -> bool {
        self.junction
    }

    /// Gets the occupancy cell containing the waypoint.
    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// Gets the waypoints that succeed this one in the direction of travel.
    pub fn successors(&self) -> &[WaypointId] {
        &self.next
    }

    /// Gets the neighbouring waypoint in the lane to the left, if one exists.
    pub fn left_neighbor(&self) -> Option<WaypointId> {
        self.left
    }

    /// Gets the neighbouring waypoint in the lane to the right, if one exists.
    pub fn right_neighbor(&self) -> Option<WaypointId> {
        self.right
    }
}

/// The road network as an arena of interlinked waypoints.
///
/// The graph is built once and treated as read-only during simulation,
/// so it can be shared freely between workers.
#[derive(Default)]
pub struct RoadGraph {
    /// The waypoints in the network.
    waypoints: WaypointSet,
    /// Spatial index for vicinity lookups.
    grid: VicinityGrid,
}

impl RoadGraph {
    /// Creates an empty road graph.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a waypoint to the network.
    pub fn add_waypoint(&mut self, attributes: &WaypointAttributes) -> WaypointId {
        let id = self.waypoints.insert(Waypoint::new(attributes));
        self.grid.insert(attributes.position, id);
        id
    }

    /// Specifies that `to` follows `from` in the direction of travel.
    pub fn add_connection(&mut self, from: WaypointId, to: WaypointId) {
        self.waypoints[from].next.push(to);
    }

    /// Specifies the left and right lane neighbours of a waypoint.
    pub fn set_neighbors(
        &mut self,
        waypoint: WaypointId,
        left: Option<WaypointId>,
        right: Option<WaypointId>,
    ) {
        let waypoint = &mut self.waypoints[waypoint];
        waypoint.left = left;
        waypoint.right = right;
    }

    /// Gets a reference to the waypoint with the given ID.
    pub fn get_waypoint(&self, id: WaypointId) -> &Waypoint {
        &self.waypoints[id]
    }

    /// Returns `true` if the waypoint exists in the graph.
    pub fn contains(&self, id: WaypointId) -> bool {
        self.waypoints.contains_key(id)
    }

    /// Finds the waypoint nearest to `location` among the grid cells around it.
    ///
    /// Returns `None` when no waypoint lies in the searched cells; use
    /// [Self::nearest_waypoint] as the fallback.
    pub fn waypoint_in_vicinity(&self, location: Point3d) -> Option<WaypointId> {
        self.grid.nearest_in_vicinity(location, &self.waypoints)
    }

    /// Finds the waypoint nearest to `location`, however far away.
    ///
    /// This scans the whole arena and is only intended for seeding a path;
    /// returns `None` only when the graph is empty.
    pub fn nearest_waypoint(&self, location: Point3d) -> Option<WaypointId> {
        self.waypoints
            .iter()
            .map(|(id, waypoint)| (id, waypoint.position.distance2(location)))
            .min_by(|a, b| f64::total_cmp(&a.1, &b.1))
            .map(|(id, _)| id)
    }

    /// Gets the squared distance between two waypoints in m².
    pub fn distance2(&self, a: WaypointId, b: WaypointId) -> f64 {
        self.waypoints[a].position.distance2(self.waypoints[b].position)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn attribs(x: f64, y: f64) -> WaypointAttributes {
        WaypointAttributes {
            position: Point3d::new(x, y, 0.0),
            direction: Vector3d::new(1.0, 0.0, 0.0),
            road: RoadId(0),
            lane: LaneId(1),
            junction: false,
        }
    }

    #[test]
    fn vicinity_lookup_is_bounded() {
        let mut graph = RoadGraph::new();
        let near = graph.add_waypoint(&attribs(2.0, 0.0));
        let far = graph.add_waypoint(&attribs(500.0, 500.0));

        let location = Point3d::new(0.0, 0.0, 0.0);
        assert_eq!(graph.waypoint_in_vicinity(location), Some(near));
        assert_eq!(graph.nearest_waypoint(location), Some(near));

        let remote = Point3d::new(400.0, 400.0, 0.0);
        assert_eq!(graph.waypoint_in_vicinity(remote), None);
        assert_eq!(graph.nearest_waypoint(remote), Some(far));
    }

    #[test]
    fn nearest_on_empty_graph() {
        let graph = RoadGraph::new();
        assert_eq!(graph.nearest_waypoint(Point3d::new(0.0, 0.0, 0.0)), None);
    }

    #[test]
    fn connections_and_neighbors() {
        let mut graph = RoadGraph::new();
        let a = graph.add_waypoint(&attribs(0.0, 0.0));
        let b = graph.add_waypoint(&attribs(2.0, 0.0));
        let c = graph.add_waypoint(&attribs(2.0, 4.0));
        graph.add_connection(a, b);
        graph.add_connection(a, c);
        graph.set_neighbors(a, Some(c), None);

        assert_eq!(graph.get_waypoint(a).successors(), &[b, c]);
        assert_eq!(graph.get_waypoint(a).left_neighbor(), Some(c));
        assert_eq!(graph.get_waypoint(a).right_neighbor(), None);
        assert!(graph.get_waypoint(b).successors().is_empty());
    }

    #[test]
    fn occupancy_cells_follow_position() {
        let mut graph = RoadGraph::new();
        let a = graph.add_waypoint(&attribs(1.0, 1.0));
        let b = graph.add_waypoint(&attribs(2.0, 1.0));
        let c = graph.add_waypoint(&attribs(100.0, 1.0));

        assert_eq!(graph.get_waypoint(a).cell(), graph.get_waypoint(b).cell());
        assert_ne!(graph.get_waypoint(a).cell(), graph.get_waypoint(c).cell());
    }
}
