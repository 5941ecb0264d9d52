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

//! Protocol layer: wire types shared by the snapshot stream and the
//! request/response channels.
//!
//! The high-frequency `state` push carries fixed-width binary records (see
//! [`snapshot`]); everything else travels as JSON payloads on named channels
//! (see [`detail`]).

pub mod detail;
pub mod snapshot;

pub use detail::{
    AirportCode, AirportData, AirportDetail, Flight, PlaneDetail, PlaneModel, Runway,
    SimulationConfig, Waypoint, WorldData,
};
pub use snapshot::{decode_snapshot, encode_snapshot, SnapshotIter, RECORD_SIZE};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity identifier. Sent as 16 raw bytes, displayed hyphenated.
pub type EntityId = Uuid;

/// A point in world units.
///
/// Serialized as a `[x, y, z]` array to match the remote payloads.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Planar distance to another point, ignoring altitude.
    #[must_use]
    pub fn distance_2d(&self, other: &Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<[f32; 3]> for Position {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Position> for [f32; 3] {
    fn from(p: Position) -> Self {
        [p.x, p.y, p.z]
    }
}

/// Velocity pair as received on the wire.
///
/// Only `x` participates in dead reckoning, as forward speed along the heading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

/// Last-known motion state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KinematicState {
    pub position: Position,
    /// Heading in radians, counter-clockwise from the +x axis.
    pub heading: f32,
    pub velocity: Velocity,
}

impl KinematicState {
    /// Forward speed in world units per second.
    #[must_use]
    pub fn speed(&self) -> f32 {
        self.velocity.x
    }

    /// Position after `dt_secs` of constant-speed, constant-heading motion.
    ///
    /// Altitude is held.
    #[must_use]
    pub fn extrapolate(&self, dt_secs: f32) -> Position {
        let v = self.speed();
        Position {
            x: self.position.x + v * self.heading.cos() * dt_secs,
            y: self.position.y + v * self.heading.sin() * dt_secs,
            z: self.position.z,
        }
    }
}

/// One `state` push: removals plus the binary snapshot, applied together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePush {
    pub removed: Vec<EntityId>,
    pub snapshot: Vec<u8>,
}

/// Named request/response channels exposed by the remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Plane,
    Airport,
    AirportDepartures,
    AirportArrivals,
    WorldData,
    Config,
}

impl Channel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plane => "plane",
            Self::Airport => "airport",
            Self::AirportDepartures => "airport_departures",
            Self::AirportArrivals => "airport_arrivals",
            Self::WorldData => "world_data",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
