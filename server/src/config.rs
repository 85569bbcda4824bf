//! Game config loading: the JSON file that describes maps, roads, offices,
//! loot tables, and the world defaults.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::model::{Building, Game, Map, ModelError, Office, Offset, Point, Rectangle, Road, Size};

const DEFAULT_DOG_SPEED: f64 = 1.0;
const DEFAULT_BAG_CAPACITY: usize = 3;
const DEFAULT_DOG_RETIREMENT_SECONDS: f64 = 60.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("loot type without an integer 'value' in map '{0}'")]
    MissingLootValue(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    default_dog_speed: Option<f64>,
    default_bag_capacity: Option<usize>,
    /// Seconds in the file, converted to milliseconds for the model.
    dog_retirement_time: Option<f64>,
    loot_generator_config: LootGeneratorConfig,
    maps: Vec<MapConfig>,
}

#[derive(Debug, Deserialize)]
struct LootGeneratorConfig {
    period: f64,
    probability: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapConfig {
    id: String,
    name: String,
    dog_speed: Option<f64>,
    bag_capacity: Option<usize>,
    roads: Vec<RoadConfig>,
    #[serde(default)]
    buildings: Vec<BuildingConfig>,
    #[serde(default)]
    offices: Vec<OfficeConfig>,
    #[serde(default)]
    loot_types: Vec<serde_json::Value>,
}

/// A road is horizontal when `x1` is present, vertical when `y1` is;
/// neither makes it a zero-length stub.
#[derive(Debug, Deserialize)]
struct RoadConfig {
    x0: i32,
    y0: i32,
    x1: Option<i32>,
    y1: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct BuildingConfig {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfficeConfig {
    id: String,
    x: i32,
    y: i32,
    offset_x: i32,
    offset_y: i32,
}

impl RoadConfig {
    fn to_road(&self) -> Road {
        let start = Point { x: self.x0, y: self.y0 };
        if let Some(x1) = self.x1 {
            Road::horizontal(start, x1)
        } else if let Some(y1) = self.y1 {
            Road::vertical(start, y1)
        } else {
            Road::horizontal(start, self.x0)
        }
    }
}

/// Loads the game config from `path` and builds the map registry.
pub fn load_game(path: &Path) -> Result<Game, ConfigError> {
    let raw = fs::read_to_string(path)?;
    parse_game(&raw)
}

/// Parses the config from a JSON string; split out for tests.
pub fn parse_game(raw: &str) -> Result<Game, ConfigError> {
    let config: ConfigFile = serde_json::from_str(raw)?;

    let default_dog_speed = config.default_dog_speed.unwrap_or(DEFAULT_DOG_SPEED);
    let default_bag_capacity = config.default_bag_capacity.unwrap_or(DEFAULT_BAG_CAPACITY);
    let retirement_seconds = config
        .dog_retirement_time
        .unwrap_or(DEFAULT_DOG_RETIREMENT_SECONDS);
    let retirement_ms = (retirement_seconds * 1000.0) as u64;

    let mut game = Game::new();
    for map_config in &config.maps {
        let loot_values = loot_values(map_config)?;

        let mut map = Map::new(
            map_config.id.clone(),
            map_config.name.clone(),
            map_config.dog_speed.unwrap_or(default_dog_speed),
            map_config.bag_capacity.unwrap_or(default_bag_capacity),
            config.loot_generator_config.period,
            config.loot_generator_config.probability,
            loot_values,
            map_config.loot_types.clone(),
            retirement_ms,
        );

        for road in &map_config.roads {
            map.add_road(road.to_road());
        }
        for building in &map_config.buildings {
            map.add_building(Building {
                bounds: Rectangle {
                    position: Point { x: building.x, y: building.y },
                    size: Size { width: building.w, height: building.h },
                },
            });
        }
        for office in &map_config.offices {
            map.add_office(Office {
                id: office.id.clone(),
                position: Point { x: office.x, y: office.y },
                offset: Offset { dx: office.offset_x, dy: office.offset_y },
            })?;
        }

        game.add_map(map)?;
    }

    Ok(game)
}

fn loot_values(map_config: &MapConfig) -> Result<Vec<i32>, ConfigError> {
    map_config
        .loot_types
        .iter()
        .map(|loot_type| {
            loot_type
                .get("value")
                .and_then(serde_json::Value::as_i64)
                .map(|value| value as i32)
                .ok_or_else(|| ConfigError::MissingLootValue(map_config.id.clone()))
        })
        .collect()
}
