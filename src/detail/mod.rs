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

//! On-demand fetching of data that is not part of the snapshot stream.
//!
//! [`DetailCache`] serves per-aircraft detail, cached on the entity record.
//! [`ReferenceCache`] serves airport detail and the session-wide reference
//! data. All calls go through a [`RemoteSource`] and are bounded by a timeout;
//! a response arriving after the timeout is dropped with its future.
//!
//! Overlapping fetches for the same id are not deduplicated. Whichever
//! response resolves last is the one left in the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::{EngineError, FetchError, TransportError};
use crate::protocol::{AirportDetail, Channel, EntityId, PlaneDetail, SimulationConfig, WorldData};
use crate::store::{EntityStore, Renderer};

/// Request/response side of the transport.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Send `payload` on `channel` and wait for the acknowledgement.
    async fn request(&self, channel: Channel, payload: Value) -> Result<Value, TransportError>;
}

/// Issue one timeout-bounded call and decode the response.
pub async fn call<T: DeserializeOwned>(
    remote: &dyn RemoteSource,
    channel: Channel,
    payload: Value,
    timeout: Duration,
) -> Result<T, FetchError> {
    let response = match tokio::time::timeout(timeout, remote.request(channel, payload)).await {
        Ok(response) => response?,
        Err(_elapsed) => return Err(FetchError::Timeout(timeout)),
    };
    Ok(serde_json::from_value(response)?)
}

/// Cache-or-fetch access to per-aircraft detail.
#[derive(Clone)]
pub struct DetailCache {
    remote: Arc<dyn RemoteSource>,
    timeout: Duration,
}

impl std::fmt::Debug for DetailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetailCache")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DetailCache {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteSource>, timeout: Duration) -> Self {
        Self { remote, timeout }
    }

    /// Return cached detail for `id`, or fetch it when absent or `force` is set.
    ///
    /// A successful fetch overwrites the record's detail. If the record was
    /// removed while the call was in flight the result is still returned but
    /// not written back. On failure any cached value is left untouched.
    pub async fn get_detail<R: Renderer>(
        &self,
        store: &RwLock<EntityStore<R>>,
        id: EntityId,
        force: bool,
    ) -> Result<Arc<PlaneDetail>, EngineError> {
        if !force {
            let cached = store
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&id)
                .and_then(|r| r.detail.clone());
            if let Some(detail) = cached {
                return Ok(detail);
            }
        }

        let detail: PlaneDetail = call(
            self.remote.as_ref(),
            Channel::Plane,
            Value::String(id.to_string()),
            self.timeout,
        )
        .await
        .map_err(|e| {
            warn!("Detail fetch for {id} failed: {e}");
            EngineError::fetch_failed(format!("plane {id}"), e)
        })?;
        let detail = Arc::new(detail);

        let write_back = store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_detail(&id, Arc::clone(&detail));
        if let Err(e) = write_back {
            debug!("Not caching detail: {e}");
        }

        Ok(detail)
    }
}

/// Airport detail plus reference data fetched once per session.
pub struct ReferenceCache {
    remote: Arc<dyn RemoteSource>,
    timeout: Duration,
    airports: Mutex<HashMap<String, Arc<AirportDetail>>>,
    world_data: OnceCell<Arc<WorldData>>,
    simulation: OnceCell<Arc<SimulationConfig>>,
}

impl std::fmt::Debug for ReferenceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceCache")
            .field("timeout", &self.timeout)
            .field("world_data_loaded", &self.world_data.initialized())
            .finish_non_exhaustive()
    }
}

impl ReferenceCache {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteSource>, timeout: Duration) -> Self {
        Self {
            remote,
            timeout,
            airports: Mutex::new(HashMap::new()),
            world_data: OnceCell::new(),
            simulation: OnceCell::new(),
        }
    }

    /// Cache-or-fetch airport detail by code.
    pub async fn get_airport(&self, code: &str, force: bool) -> Result<Arc<AirportDetail>, EngineError> {
        if !force {
            let cached = self
                .airports
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(code)
                .cloned();
            if let Some(airport) = cached {
                return Ok(airport);
            }
        }

        let airport: AirportDetail = self
            .fetch(Channel::Airport, Value::String(code.to_string()), format!("airport {code}"))
            .await?;
        let airport = Arc::new(airport);
        self.airports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code.to_string(), Arc::clone(&airport));
        Ok(airport)
    }

    /// Static world data. Fetched on first use; failures are not cached.
    pub async fn world_data(&self) -> Result<Arc<WorldData>, EngineError> {
        self.world_data
            .get_or_try_init(|| async {
                self.fetch(Channel::WorldData, Value::Null, "world data")
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }

    /// Server simulation parameters. Fetched on first use; failures are not cached.
    pub async fn simulation_config(&self) -> Result<Arc<SimulationConfig>, EngineError> {
        self.simulation
            .get_or_try_init(|| async {
                self.fetch(Channel::Config, Value::Null, "simulation config")
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }

    /// Ids of aircraft departing from `code`.
    pub async fn airport_departures(&self, code: &str) -> Result<Vec<EntityId>, EngineError> {
        self.fetch(
            Channel::AirportDepartures,
            Value::String(code.to_string()),
            format!("departures of {code}"),
        )
        .await
    }

    /// Ids of aircraft bound for `code`.
    pub async fn airport_arrivals(&self, code: &str) -> Result<Vec<EntityId>, EngineError> {
        self.fetch(
            Channel::AirportArrivals,
            Value::String(code.to_string()),
            format!("arrivals of {code}"),
        )
        .await
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        channel: Channel,
        payload: Value,
        what: impl Into<String>,
    ) -> Result<T, EngineError> {
        call(self.remote.as_ref(), channel, payload, self.timeout)
            .await
            .map_err(|e| {
                let what = what.into();
                warn!("Fetch of {what} failed: {e}");
                EngineError::fetch_failed(what, e)
            })
    }
}
