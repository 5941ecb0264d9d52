// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed payloads for the request/response channels.
//!
//! These are validated by deserialization when a response arrives; a payload
//! that does not match its schema is treated as a failed fetch.

use serde::{Deserialize, Serialize};

use super::{EntityId, Position};

/// Airport code (e.g. "KLAX").
pub type AirportCode = String;

/// Extended per-aircraft metadata returned on the `plane` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneDetail {
    pub id: EntityId,
    pub flight: Flight,
    #[serde(default)]
    pub model: Option<PlaneModel>,
    #[serde(default)]
    pub pos: PlaneTrack,
    /// Unix seconds when the flight started.
    #[serde(default)]
    pub start_time: u64,
}

impl PlaneDetail {
    /// Route flown so far, oldest first.
    #[must_use]
    pub fn past_pos(&self) -> &[Position] {
        &self.pos.planner.past_pos
    }
}

/// Position block of a `plane` reply. Only the flight planner is read; the
/// live pose arrives through snapshots instead.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaneTrack {
    #[serde(default)]
    pub planner: FlightPlanner,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlightPlanner {
    #[serde(default)]
    pub past_pos: Vec<Position>,
    #[serde(default)]
    pub past_route: Vec<Waypoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    #[serde(default)]
    pub airline: String,
    pub code: String,
    pub from: AirportCode,
    pub to: AirportCode,
    #[serde(default)]
    pub plane: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaneModel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub class: String,
}

/// Airport metadata returned on the `airport` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportDetail {
    pub id: AirportCode,
    pub airport: AirportData,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AirportData {
    pub name: String,
    pub code: AirportCode,
    #[serde(default)]
    pub runways: Vec<Runway>,
}

impl AirportData {
    /// Mean of all runway endpoints, at ground level.
    #[must_use]
    pub fn centre(&self) -> Position {
        if self.runways.is_empty() {
            return Position::ORIGIN;
        }
        let n = (2 * self.runways.len()) as f32;
        let (x, y) = self
            .runways
            .iter()
            .flat_map(|r| [r.start, r.end])
            .fold((0.0, 0.0), |(px, py), [x, y]| (px + x / n, py + y / n));
        Position::new(x, y, 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runway {
    #[serde(default)]
    pub name: String,
    pub start: [f32; 2],
    pub end: [f32; 2],
    #[serde(default)]
    pub altitude: f32,
    #[serde(default)]
    pub class: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub pos: [f32; 2],
}

/// Static reference data returned on the `world_data` channel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldData {
    #[serde(default)]
    pub classes: Vec<Vec<String>>,
    #[serde(default)]
    pub airports: Vec<AirportData>,
    #[serde(default)]
    pub flights: Option<Vec<Flight>>,
    #[serde(default)]
    pub planes: Vec<PlaneModel>,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
}

impl WorldData {
    #[must_use]
    pub fn airport(&self, code: &str) -> Option<&AirportData> {
        self.airports.iter().find(|a| a.code == code)
    }

    #[must_use]
    pub fn waypoint(&self, name: &str) -> Option<&Waypoint> {
        self.waypoints.iter().find(|w| w.name == name)
    }
}

/// Simulation parameters returned on the `config` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seconds between server ticks.
    #[serde(default = "default_tick_duration")]
    pub tick_duration: f32,
    #[serde(default)]
    pub plane_spawn_chance: f32,
    #[serde(default)]
    pub max_planes: Option<usize>,
}

fn default_tick_duration() -> f32 {
    1.0
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_duration: default_tick_duration(),
            plane_spawn_chance: 0.05,
            max_planes: Some(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_airport_centre() {
        let airport = AirportData {
            name: "Test Field".to_string(),
            code: "TST".to_string(),
            runways: vec![
                Runway {
                    name: "09/27".to_string(),
                    start: [0.0, 0.0],
                    end: [10.0, 0.0],
                    altitude: 0.0,
                    class: String::new(),
                },
                Runway {
                    name: "18/36".to_string(),
                    start: [5.0, 5.0],
                    end: [5.0, -5.0],
                    altitude: 0.0,
                    class: String::new(),
                },
            ],
        };

        let c = airport.centre();
        assert!((c.x - 5.0).abs() < 1e-6);
        assert!(c.y.abs() < 1e-6);
        assert_eq!(AirportData::default().centre(), Position::ORIGIN);
    }

    #[test]
    fn test_plane_detail_from_json() {
        let id = EntityId::new_v4();
        let detail: PlaneDetail = serde_json::from_value(json!({
            "id": id,
            "flight": { "code": "UA1", "from": "AAA", "to": "BBB" },
        }))
        .unwrap();

        assert_eq!(detail.id, id);
        assert_eq!(detail.flight.to, "BBB");
        assert!(detail.past_pos().is_empty());
        assert!(detail.model.is_none());
    }

    #[test]
    fn test_plane_detail_reads_nested_route_history() {
        let detail: PlaneDetail = serde_json::from_value(json!({
            "id": EntityId::new_v4(),
            "pos": {
                "pos_ang": [[3.0, 0.0, 30.0], 0.0],
                "kinematics": { "speed": 120.0 },
                "planner": {
                    "instructions": [],
                    "route": [],
                    "instruction_s": 0.0,
                    "past_route": [{ "name": "WP1", "pos": [1.0, 0.0] }],
                    "past_pos": [[1.0, 0.0, 10.0], [2.0, 0.0, 20.0]],
                },
            },
            "model": { "id": "A320", "name": "Airbus A320" },
            "flight": { "airline": "UAL", "code": "UA1", "from": "AAA", "to": "BBB" },
            "phase": "Cruise",
            "events": [],
            "start_time": 1_700_000_000u64,
        }))
        .unwrap();

        assert_eq!(
            detail.past_pos(),
            [Position::new(1.0, 0.0, 10.0), Position::new(2.0, 0.0, 20.0)]
        );
        assert_eq!(detail.pos.planner.past_route[0].name, "WP1");
        assert_eq!(detail.start_time, 1_700_000_000);
    }

    #[test]
    fn test_plane_detail_rejects_missing_flight() {
        let result = serde_json::from_value::<PlaneDetail>(json!({ "id": EntityId::nil() }));
        assert!(result.is_err());
    }

    #[test]
    fn test_world_data_lookup() {
        let wd: WorldData = serde_json::from_value(json!({
            "airports": [{ "name": "Alpha", "code": "AAA" }],
            "waypoints": [{ "name": "WP1", "pos": [1.0, 2.0] }],
        }))
        .unwrap();

        assert_eq!(wd.airport("AAA").map(|a| a.name.as_str()), Some("Alpha"));
        assert!(wd.airport("ZZZ").is_none());
        assert_eq!(wd.waypoint("WP1").map(|w| w.pos), Some([1.0, 2.0]));
    }
}
