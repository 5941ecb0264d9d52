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

//! Client configuration.
//!
//! Stored in TOML format through `confy`. Every field has a serde default so
//! older or partial files still load.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const APP_NAME: &str = "flightsync";
const CONFIG_NAME: &str = "config";

/// Client-side engine configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Configuration schema version
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Timeout for every request/response call, in milliseconds
    #[serde(default = "default_detail_timeout_ms")]
    pub detail_timeout_ms: u64,

    /// Delay between extrapolation ticks; 0 yields to the scheduler only
    #[serde(default)]
    pub tick_interval_ms: u64,

    /// Capacity of the store event broadcast channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Capacity of the inbound state push queue
    #[serde(default = "default_push_channel_capacity")]
    pub push_channel_capacity: usize,

    /// Start a selection trail from the fetched route history
    #[serde(default = "default_true")]
    pub trail_seed_from_history: bool,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_detail_timeout_ms() -> u64 {
    5000
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_push_channel_capacity() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            detail_timeout_ms: default_detail_timeout_ms(),
            tick_interval_ms: 0,
            event_channel_capacity: default_event_channel_capacity(),
            push_channel_capacity: default_push_channel_capacity(),
            trail_seed_from_history: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from disk, creating it with defaults if missing
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    #[must_use]
    pub fn detail_timeout(&self) -> Duration {
        Duration::from_millis(self.detail_timeout_ms)
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
