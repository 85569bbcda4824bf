//! Static map geometry: roads, buildings, offices, and the loot table.
//!
//! Roads are axis-aligned segments with a fixed half-width; a coordinate
//! counts as on-road when it falls inside the road's bounding rectangle
//! within a small tolerance. All movement in the game happens inside these
//! rectangles.

use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Half of a road's width, in world units.
pub const ROAD_HALF_WIDTH: f64 = 0.4;

/// Tolerance for deciding whether a coordinate lies on a road.
const COORD_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("duplicate office id '{0}'")]
    DuplicateOffice(String),
    #[error("office '{0}' does not lie on any road")]
    OfficeOffRoad(String),
    #[error("map '{0}' has no roads")]
    NoRoads(String),
    #[error("map with id '{0}' already exists")]
    DuplicateMap(String),
    #[error("the game has no maps")]
    NoMaps,
}

/// Integer grid point used by the static map geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub position: Point,
    pub size: Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

/// Real-valued world position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub x: f64,
    pub y: f64,
}

impl Coords {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_same(&self, other: &Coords) -> bool {
        (self.x - other.x).hypot(self.y - other.y) < 1e-18
    }
}

impl From<Point> for Coords {
    fn from(point: Point) -> Self {
        Self { x: point.x as f64, y: point.y as f64 }
    }
}

/// Dog velocity in world units per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
}

impl Velocity {
    pub fn new(vx: f64, vy: f64) -> Self {
        Self { vx, vy }
    }

    pub fn is_zero(&self) -> bool {
        self.vx.hypot(self.vy) < 1e-10
    }
}

/// An axis-aligned road segment with the implicit half-width applied on all
/// four sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Road {
    start: Point,
    end: Point,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Road {
    fn new(start: Point, end: Point) -> Self {
        Self {
            start,
            end,
            x_min: start.x.min(end.x) as f64 - ROAD_HALF_WIDTH,
            x_max: start.x.max(end.x) as f64 + ROAD_HALF_WIDTH,
            y_min: start.y.min(end.y) as f64 - ROAD_HALF_WIDTH,
            y_max: start.y.max(end.y) as f64 + ROAD_HALF_WIDTH,
        }
    }

    pub fn horizontal(start: Point, end_x: i32) -> Self {
        Self::new(start, Point { x: end_x, y: start.y })
    }

    pub fn vertical(start: Point, end_y: i32) -> Self {
        Self::new(start, Point { x: start.x, y: end_y })
    }

    pub fn is_horizontal(&self) -> bool {
        self.start.y == self.end.y
    }

    pub fn is_vertical(&self) -> bool {
        self.start.x == self.end.x
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn end(&self) -> Point {
        self.end
    }

    pub fn length(&self) -> i32 {
        if self.is_horizontal() {
            (self.end.x - self.start.x).abs()
        } else {
            (self.end.y - self.start.y).abs()
        }
    }

    /// Whether `coords` lies inside the road rectangle, within tolerance.
    pub fn contains(&self, coords: Coords) -> bool {
        coords.x >= self.x_min - COORD_TOLERANCE
            && coords.x <= self.x_max + COORD_TOLERANCE
            && coords.y >= self.y_min - COORD_TOLERANCE
            && coords.y <= self.y_max + COORD_TOLERANCE
    }

    /// The point where the straight trajectory `from -> to` first leaves
    /// this road's rectangle.
    ///
    /// `from` is assumed to be inside the rectangle. The first boundary
    /// crossed by the parametric segment decides the exit; when the
    /// trajectory never leaves the rectangle the target itself is returned.
    pub fn exit_point(&self, from: Coords, to: Coords) -> Coords {
        let dx = to.x - from.x;
        let dy = to.y - from.y;

        let mut t_exit = f64::INFINITY;
        if dx > 0.0 {
            t_exit = t_exit.min((self.x_max - from.x) / dx);
        } else if dx < 0.0 {
            t_exit = t_exit.min((self.x_min - from.x) / dx);
        }
        if dy > 0.0 {
            t_exit = t_exit.min((self.y_max - from.y) / dy);
        } else if dy < 0.0 {
            t_exit = t_exit.min((self.y_min - from.y) / dy);
        }

        if !t_exit.is_finite() {
            return from;
        }
        let t = t_exit.clamp(0.0, 1.0);
        Coords::new(from.x + t * dx, from.y + t * dy)
    }

    /// Uniformly random coordinate inside the road rectangle.
    pub fn random_coords<R: Rng>(&self, rng: &mut R) -> Coords {
        let length_ratio: f64 = rng.gen();
        let width_ratio: f64 = rng.gen();
        let length = self.length() as f64;

        if self.is_horizontal() {
            Coords::new(
                self.start.x.min(self.end.x) as f64 + length_ratio * length,
                self.y_min + width_ratio * ROAD_HALF_WIDTH * 2.0,
            )
        } else {
            Coords::new(
                self.x_min + width_ratio * ROAD_HALF_WIDTH * 2.0,
                self.start.y.min(self.end.y) as f64 + length_ratio * length,
            )
        }
    }
}

/// Decorative building; only echoed back to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Building {
    pub bounds: Rectangle,
}

/// A deposit base where dogs hand their loot over for score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Office {
    pub id: String,
    pub position: Point,
    pub offset: Offset,
}

/// Immutable description of one map: geometry plus per-map game settings.
#[derive(Debug, Clone)]
pub struct Map {
    id: String,
    name: String,
    dog_speed: f64,
    bag_capacity: usize,
    loot_period: f64,
    loot_probability: f64,
    loot_values: Vec<i32>,
    loot_types: Vec<serde_json::Value>,
    dog_retirement_time_ms: u64,
    roads: Vec<Road>,
    buildings: Vec<Building>,
    offices: Vec<Office>,
    office_ids: HashSet<String>,
}

impl Map {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        name: String,
        dog_speed: f64,
        bag_capacity: usize,
        loot_period: f64,
        loot_probability: f64,
        loot_values: Vec<i32>,
        loot_types: Vec<serde_json::Value>,
        dog_retirement_time_ms: u64,
    ) -> Self {
        Self {
            id,
            name,
            dog_speed,
            bag_capacity,
            loot_period,
            loot_probability,
            loot_values,
            loot_types,
            dog_retirement_time_ms,
            roads: Vec::new(),
            buildings: Vec::new(),
            offices: Vec::new(),
            office_ids: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dog_speed(&self) -> f64 {
        self.dog_speed
    }

    pub fn bag_capacity(&self) -> usize {
        self.bag_capacity
    }

    pub fn loot_period(&self) -> f64 {
        self.loot_period
    }

    pub fn loot_probability(&self) -> f64 {
        self.loot_probability
    }

    pub fn loot_type_count(&self) -> usize {
        self.loot_values.len()
    }

    pub fn loot_value(&self, type_index: usize) -> i32 {
        self.loot_values.get(type_index).copied().unwrap_or(0)
    }

    /// Raw `lootTypes` array from the config, echoed by the map endpoint.
    pub fn loot_types(&self) -> &[serde_json::Value] {
        &self.loot_types
    }

    pub fn dog_retirement_time_ms(&self) -> u64 {
        self.dog_retirement_time_ms
    }

    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn offices(&self) -> &[Office] {
        &self.offices
    }

    pub fn add_road(&mut self, road: Road) {
        self.roads.push(road);
    }

    pub fn add_building(&mut self, building: Building) {
        self.buildings.push(building);
    }

    /// Adds a deposit base. The id must be unique and the base must stand
    /// on a road, otherwise dogs could never reach it.
    pub fn add_office(&mut self, office: Office) -> Result<(), ModelError> {
        if self.office_ids.contains(&office.id) {
            return Err(ModelError::DuplicateOffice(office.id));
        }
        if self.road_index_by_coords(office.position.into()).is_none() {
            return Err(ModelError::OfficeOffRoad(office.id));
        }
        self.office_ids.insert(office.id.clone());
        self.offices.push(office);
        Ok(())
    }

    /// Uniformly random on-road coordinate: pick a road, then a point in it.
    pub fn random_coord_in_roads<R: Rng>(&self, rng: &mut R) -> Coords {
        let ratio: f64 = rng.gen();
        let road_index = (ratio * (self.roads.len() - 1) as f64).round() as usize;
        self.roads[road_index].random_coords(rng)
    }

    /// The integer start point of the first road; the deterministic spawn.
    pub fn first_road_start(&self) -> Point {
        self.roads[0].start()
    }

    /// Index of the first road containing `coords`, in list order.
    pub fn road_index_by_coords(&self, coords: Coords) -> Option<usize> {
        self.roads.iter().position(|road| road.contains(coords))
    }

    /// Index of the first road containing `coords` that is not in
    /// `exclude`. Used during handover to avoid bouncing back onto roads
    /// already visited within the step.
    pub fn another_road_index_at(&self, coords: Coords, exclude: &[usize]) -> Option<usize> {
        self.roads
            .iter()
            .enumerate()
            .find(|(index, road)| road.contains(coords) && !exclude.contains(index))
            .map(|(index, _)| index)
    }
}

/// The full set of maps known to the application.
#[derive(Debug, Clone, Default)]
pub struct Game {
    maps: Vec<Map>,
    map_id_to_index: HashMap<String, usize>,
}

impl Game {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_map(&mut self, map: Map) -> Result<(), ModelError> {
        if map.roads().is_empty() {
            return Err(ModelError::NoRoads(map.id().to_string()));
        }
        if self.map_id_to_index.contains_key(map.id()) {
            return Err(ModelError::DuplicateMap(map.id().to_string()));
        }
        self.map_id_to_index.insert(map.id().to_string(), self.maps.len());
        self.maps.push(map);
        Ok(())
    }

    pub fn maps(&self) -> &[Map] {
        &self.maps
    }

    pub fn map_index(&self, id: &str) -> Option<usize> {
        self.map_id_to_index.get(id).copied()
    }

    pub fn find_map(&self, id: &str) -> Option<&Map> {
        self.map_index(id).map(|index| &self.maps[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_map() -> Map {
        Map::new(
            "town".to_string(),
            "Town".to_string(),
            4.0,
            3,
            5.0,
            0.5,
            vec![10, 30],
            Vec::new(),
            60_000,
        )
    }

    #[test]
    fn test_road_contains_with_width() {
        let road = Road::horizontal(Point { x: 0, y: 0 }, 10);
        assert!(road.contains(Coords::new(5.0, 0.0)));
        assert!(road.contains(Coords::new(5.0, 0.4)));
        assert!(road.contains(Coords::new(-0.4, -0.4)));
        assert!(!road.contains(Coords::new(5.0, 0.5)));
        assert!(!road.contains(Coords::new(10.5, 0.0)));
    }

    #[test]
    fn test_road_contains_tolerance() {
        let road = Road::horizontal(Point { x: 0, y: 0 }, 10);
        assert!(road.contains(Coords::new(10.4009, 0.0)));
        assert!(!road.contains(Coords::new(10.402, 0.0)));
    }

    #[test]
    fn test_exit_point_right_edge() {
        let road = Road::horizontal(Point { x: 0, y: 0 }, 10);
        let exit = road.exit_point(Coords::new(9.0, 0.0), Coords::new(12.0, 0.0));
        assert_approx_eq!(exit.x, 10.4);
        assert_approx_eq!(exit.y, 0.0);
    }

    #[test]
    fn test_exit_point_top_edge() {
        let road = Road::horizontal(Point { x: 0, y: 0 }, 10);
        let exit = road.exit_point(Coords::new(5.0, 0.0), Coords::new(5.0, -3.0));
        assert_approx_eq!(exit.x, 5.0);
        assert_approx_eq!(exit.y, -0.4);
    }

    #[test]
    fn test_exit_point_stationary_target_inside() {
        let road = Road::vertical(Point { x: 2, y: 0 }, 8);
        let from = Coords::new(2.0, 3.0);
        let exit = road.exit_point(from, from);
        assert!(exit.is_same(&from));
    }

    #[test]
    fn test_random_coords_stay_on_road() {
        let road = Road::vertical(Point { x: 3, y: -5 }, 5);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let coords = road.random_coords(&mut rng);
            assert!(road.contains(coords));
        }
    }

    #[test]
    fn test_map_random_coord_on_some_road() {
        let mut map = test_map();
        map.add_road(Road::horizontal(Point { x: 0, y: 0 }, 10));
        map.add_road(Road::vertical(Point { x: 0, y: 0 }, 5));
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let coords = map.random_coord_in_roads(&mut rng);
            assert!(map.road_index_by_coords(coords).is_some());
        }
    }

    #[test]
    fn test_duplicate_office_rejected() {
        let mut map = test_map();
        map.add_road(Road::horizontal(Point { x: 0, y: 0 }, 10));
        let office = Office {
            id: "o1".to_string(),
            position: Point { x: 5, y: 0 },
            offset: Offset { dx: 1, dy: 1 },
        };
        assert!(map.add_office(office.clone()).is_ok());
        assert_eq!(
            map.add_office(office),
            Err(ModelError::DuplicateOffice("o1".to_string()))
        );
    }

    #[test]
    fn test_office_off_road_rejected() {
        let mut map = test_map();
        map.add_road(Road::horizontal(Point { x: 0, y: 0 }, 10));
        let office = Office {
            id: "o1".to_string(),
            position: Point { x: 5, y: 7 },
            offset: Offset { dx: 1, dy: 1 },
        };
        assert_eq!(
            map.add_office(office),
            Err(ModelError::OfficeOffRoad("o1".to_string()))
        );
    }

    #[test]
    fn test_game_rejects_map_without_roads() {
        let mut game = Game::new();
        assert_eq!(
            game.add_map(test_map()),
            Err(ModelError::NoRoads("town".to_string()))
        );
    }

    #[test]
    fn test_another_road_excludes_visited() {
        let mut map = test_map();
        map.add_road(Road::horizontal(Point { x: 0, y: 0 }, 10));
        map.add_road(Road::vertical(Point { x: 0, y: 0 }, 5));
        let corner = Coords::new(0.0, 0.0);
        assert_eq!(map.road_index_by_coords(corner), Some(0));
        assert_eq!(map.another_road_index_at(corner, &[0]), Some(1));
        assert_eq!(map.another_road_index_at(corner, &[0, 1]), None);
    }
}
