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

//! Client-side aircraft state synchronization.
//!
//! A remote server owns the authoritative aircraft positions and pushes them
//! as compact binary snapshots. This library keeps a local copy in step with
//! those pushes and fills the gaps between them:
//!
//! - **Protocol layer**: snapshot codec and typed request/response payloads
//! - **Store layer**: per-entity state with create/update/remove semantics
//! - **Extrapolation layer**: dead reckoning between snapshots
//! - **Detail layer**: cached, timeout-bounded fetches of flight and airport data
//! - **Selection layer**: one focused entity with an accumulated trail
//!
//! # Quick Start
//!
//! [`Session`] wires the layers together around a renderer and a remote
//! source supplied by the caller:
//!
//! ```no_run
//! use std::sync::Arc;
//! use flightsync::{ClientConfig, Session, StatePush};
//! # use flightsync::{Renderer, RemoteSource};
//! # async fn example<R: Renderer + 'static>(renderer: Arc<R>, remote: Arc<dyn RemoteSource>) {
//! let session = Session::new(ClientConfig::default(), renderer, remote);
//! let _extrapolator = session.spawn_extrapolator();
//!
//! let (push_tx, push_rx) = session.push_channel();
//! // Hand `push_tx` to the transport's `state` subscription, then:
//! session.run_pushes(push_rx).await;
//! # }
//! ```

pub mod config;
pub mod detail;
pub mod error;
pub mod extrapolate;
pub mod protocol;
pub mod selection;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, warn};
use tokio::sync::{broadcast, mpsc};

pub use config::ClientConfig;
pub use detail::{DetailCache, ReferenceCache, RemoteSource};
pub use error::{EngineError, FetchError, TransportError};
pub use extrapolate::{Extrapolator, ExtrapolatorHandle};
pub use protocol::{
    decode_snapshot, encode_snapshot, AirportDetail, Channel, EntityId, KinematicState,
    PlaneDetail, Position, SimulationConfig, StatePush, Velocity, WorldData,
};
pub use selection::{FocusState, SelectionTracker};
pub use store::{EntityStore, EntityView, Renderer, StoreEvent};

/// Result of [`Session::select`].
#[derive(Debug, Clone, PartialEq)]
pub enum SelectOutcome {
    /// The entity is now focused.
    Focused(Arc<PlaneDetail>),
    /// A later select or deselect won; nothing changed.
    Superseded,
}

/// Top-level session context owning the store, selection and caches.
///
/// All store mutation (snapshot application, extrapolation ticks, detail
/// write-back) is serialized through one lock, always taken before the
/// selection lock.
pub struct Session<R: Renderer> {
    config: ClientConfig,
    store: Arc<RwLock<EntityStore<R>>>,
    selection: Arc<Mutex<SelectionTracker<R>>>,
    details: DetailCache,
    reference: ReferenceCache,
}

impl<R: Renderer> std::fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("entity_count", &self.read_store().len())
            .field("focus", &self.lock_selection().state())
            .finish_non_exhaustive()
    }
}

impl<R: Renderer + 'static> Session<R> {
    #[must_use]
    pub fn new(config: ClientConfig, renderer: Arc<R>, remote: Arc<dyn RemoteSource>) -> Self {
        let store = EntityStore::new(Arc::clone(&renderer), config.event_channel_capacity);
        let timeout = config.detail_timeout();

        Self {
            store: Arc::new(RwLock::new(store)),
            selection: Arc::new(Mutex::new(SelectionTracker::new(renderer))),
            details: DetailCache::new(Arc::clone(&remote), timeout),
            reference: ReferenceCache::new(remote, timeout),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Apply one `state` push: removals first, then every snapshot record.
    ///
    /// A malformed snapshot rejects the whole push before anything is applied.
    /// Returns the number of records applied.
    pub fn apply_push(&self, push: &StatePush) -> Result<usize, EngineError> {
        let records = decode_snapshot(&push.snapshot)?;
        let count = records.len();

        let mut store = self.write_store();
        let mut selection = self.lock_selection();

        for id in store.apply_removals(&push.removed) {
            selection.on_removed(id);
        }
        for (id, kinematics) in records {
            store.apply_update(id, kinematics);
            selection.observe(id, kinematics.position);
        }
        Ok(count)
    }

    /// Bounded queue for feeding pushes to [`Session::run_pushes`].
    #[must_use]
    pub fn push_channel(&self) -> (mpsc::Sender<StatePush>, mpsc::Receiver<StatePush>) {
        mpsc::channel(self.config.push_channel_capacity.max(1))
    }

    /// Apply pushes in arrival order until the sender side closes.
    ///
    /// Malformed pushes are logged and dropped.
    pub async fn run_pushes(&self, mut rx: mpsc::Receiver<StatePush>) {
        while let Some(push) = rx.recv().await {
            if let Err(e) = self.apply_push(&push) {
                warn!("Dropping state push: {e}");
            }
        }
        debug!("State push channel closed");
    }

    /// Start dead reckoning on the current runtime.
    #[must_use]
    pub fn spawn_extrapolator(&self) -> ExtrapolatorHandle {
        self.extrapolator().spawn()
    }

    /// Extrapolator bound to this session's state, for manual ticking.
    #[must_use]
    pub fn extrapolator(&self) -> Extrapolator<R> {
        Extrapolator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.selection),
            self.config.tick_interval(),
        )
    }

    /// Cache-or-fetch detail for `id`; see [`DetailCache::get_detail`].
    pub async fn get_detail(&self, id: EntityId, force: bool) -> Result<Arc<PlaneDetail>, EngineError> {
        self.details.get_detail(&self.store, id, force).await
    }

    /// Focus `id`: deselect, force-fetch its detail, then install the trail.
    ///
    /// Fails with [`EngineError::UnknownEntity`] if `id` is not in the store,
    /// either up front or once the fetch returns.
    ///
    /// If another select or a deselect happens while the fetch is in flight,
    /// this call returns [`SelectOutcome::Superseded`] and leaves the newer
    /// state alone.
    pub async fn select(&self, id: EntityId) -> Result<SelectOutcome, EngineError> {
        if !self.read_store().contains(&id) {
            return Err(EngineError::UnknownEntity(id));
        }
        let ticket = self.lock_selection().begin(id);

        let detail = match self.get_detail(id, true).await {
            Ok(detail) => detail,
            Err(e) => {
                self.lock_selection().abandon(&ticket);
                return Err(e);
            }
        };
        if !self.lock_selection().is_current(&ticket) {
            return Ok(SelectOutcome::Superseded);
        }

        let destination = match self.reference.get_airport(&detail.flight.to, false).await {
            Ok(airport) => Some(airport.airport.centre()),
            Err(e) => {
                debug!("No destination guide for {id}: {e}");
                None
            }
        };

        let store = self.read_store();
        let mut selection = self.lock_selection();
        if !selection.is_current(&ticket) {
            return Ok(SelectOutcome::Superseded);
        }
        let Some(record) = store.get(&id) else {
            selection.abandon(&ticket);
            return Err(EngineError::UnknownEntity(id));
        };

        let mut trail = if self.config.trail_seed_from_history {
            detail.past_pos().to_vec()
        } else {
            Vec::new()
        };
        trail.push(record.kinematics.position);
        selection.complete(ticket, trail, destination);
        Ok(SelectOutcome::Focused(detail))
    }

    /// Drop the current focus. Returns `false` if there was nothing to drop.
    pub fn deselect(&self) -> bool {
        self.lock_selection().deselect()
    }

    #[must_use]
    pub fn focus(&self) -> FocusState {
        self.lock_selection().state()
    }

    /// Trail of the focused entity, empty when idle.
    #[must_use]
    pub fn trail(&self) -> Vec<Position> {
        self.lock_selection()
            .current()
            .map(|s| s.trail.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<EntityView> {
        self.read_store().get(id).map(store::EntityRecord::view)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_store().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_store().is_empty()
    }

    /// Subscribe to store events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.read_store().subscribe()
    }

    pub async fn get_airport(&self, code: &str, force: bool) -> Result<Arc<AirportDetail>, EngineError> {
        self.reference.get_airport(code, force).await
    }

    pub async fn world_data(&self) -> Result<Arc<WorldData>, EngineError> {
        self.reference.world_data().await
    }

    pub async fn simulation_config(&self) -> Result<Arc<SimulationConfig>, EngineError> {
        self.reference.simulation_config().await
    }

    pub async fn airport_departures(&self, code: &str) -> Result<Vec<EntityId>, EngineError> {
        self.reference.airport_departures(code).await
    }

    pub async fn airport_arrivals(&self, code: &str) -> Result<Vec<EntityId>, EngineError> {
        self.reference.airport_arrivals(code).await
    }
}

impl<R: Renderer> Session<R> {
    fn read_store(&self) -> RwLockReadGuard<'_, EntityStore<R>> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, EntityStore<R>> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_selection(&self) -> MutexGuard<'_, SelectionTracker<R>> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
