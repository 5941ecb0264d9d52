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

//! Entity state storage.
//!
//! The store maps entity ids to their last-known kinematic state, the render
//! handle created for them, and any fetched detail. Snapshot application is
//! the only path that creates or destroys records. Every state change is
//! mirrored to the external [`Renderer`] and published as a [`StoreEvent`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use log::debug;
use tokio::sync::broadcast;

use crate::error::EngineError;
use crate::protocol::{EntityId, KinematicState, PlaneDetail, Position};

/// Drawing collaborator. The engine never draws directly; it only calls these.
pub trait Renderer: Send + Sync {
    /// Marker for one entity.
    type Handle: Debug + Send + Sync;
    /// Polyline for a trail or guide line.
    type TrailHandle: Debug + Send + Sync;

    fn create_handle(&self, position: Position) -> Self::Handle;
    fn reposition(&self, handle: &Self::Handle, position: Position);
    fn remove(&self, handle: Self::Handle);
    fn draw_trail(&self, points: &[Position]) -> Self::TrailHandle;
    fn update_trail(&self, trail: &Self::TrailHandle, points: &[Position]);
    fn remove_trail(&self, trail: Self::TrailHandle);
}

/// A tracked entity.
#[derive(Debug)]
pub struct EntityRecord<H> {
    pub id: EntityId,
    pub kinematics: KinematicState,
    /// Absent until the first detail fetch completes.
    pub detail: Option<Arc<PlaneDetail>>,
    render_handle: H,
}

impl<H> EntityRecord<H> {
    #[must_use]
    pub fn render_handle(&self) -> &H {
        &self.render_handle
    }

    /// Copy of the record without the render handle.
    #[must_use]
    pub fn view(&self) -> EntityView {
        EntityView {
            id: self.id,
            kinematics: self.kinematics,
            detail: self.detail.clone(),
        }
    }
}

/// Owned, handle-free copy of an [`EntityRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntityView {
    pub id: EntityId,
    pub kinematics: KinematicState,
    pub detail: Option<Arc<PlaneDetail>>,
}

/// Events emitted by the store when entity state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// First snapshot for this id.
    EntityAdded(EntityId),
    /// State overwritten by a later snapshot.
    EntityUpdated(EntityId),
    /// Listed in a snapshot's removal list.
    EntityRemoved(EntityId),
}

/// Map from entity id to its current record.
pub struct EntityStore<R: Renderer> {
    records: HashMap<EntityId, EntityRecord<R::Handle>>,
    renderer: Arc<R>,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl<R: Renderer> std::fmt::Debug for EntityStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("entity_count", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl<R: Renderer> EntityStore<R> {
    #[must_use]
    pub fn new(renderer: Arc<R>, event_channel_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_channel_capacity.max(1));
        Self {
            records: HashMap::new(),
            renderer,
            event_tx,
        }
    }

    #[must_use]
    pub fn renderer(&self) -> &Arc<R> {
        &self.renderer
    }

    /// Remove every listed id that is present and release its render handle.
    ///
    /// Unknown ids are ignored. Returns the ids actually removed.
    pub fn apply_removals<'a, I>(&mut self, ids: I) -> Vec<EntityId>
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        let mut removed = Vec::new();
        for id in ids {
            if let Some(record) = self.records.remove(id) {
                debug!("Removing entity {id}");
                self.renderer.remove(record.render_handle);
                let _ = self.event_tx.send(StoreEvent::EntityRemoved(*id));
                removed.push(*id);
            }
        }
        removed
    }

    /// Create or overwrite the record for `id`.
    ///
    /// Returns `true` if a new record was created.
    pub fn apply_update(&mut self, id: EntityId, kinematics: KinematicState) -> bool {
        if let Some(record) = self.records.get_mut(&id) {
            record.kinematics = kinematics;
            self.renderer
                .reposition(&record.render_handle, kinematics.position);
            let _ = self.event_tx.send(StoreEvent::EntityUpdated(id));
            return false;
        }

        debug!("Creating entity {id}");
        let render_handle = self.renderer.create_handle(kinematics.position);
        self.records.insert(
            id,
            EntityRecord {
                id,
                kinematics,
                detail: None,
                render_handle,
            },
        );
        let _ = self.event_tx.send(StoreEvent::EntityAdded(id));
        true
    }

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&EntityRecord<R::Handle>> {
        self.records.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.records.contains_key(id)
    }

    /// Store fetched detail on an existing record. Never creates a record.
    pub fn set_detail(&mut self, id: &EntityId, detail: Arc<PlaneDetail>) -> Result<(), EngineError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or(EngineError::UnknownEntity(*id))?;
        record.detail = Some(detail);
        Ok(())
    }

    /// Replace every record's position with `next(&kinematics)` and move its
    /// render handle. Heading, velocity and detail are untouched.
    pub fn update_positions<F>(&mut self, mut next: F)
    where
        F: FnMut(&KinematicState) -> Position,
    {
        for record in self.records.values_mut() {
            record.kinematics.position = next(&record.kinematics);
            self.renderer
                .reposition(&record.render_handle, record.kinematics.position);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord<R::Handle>> {
        self.records.values()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.records.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Subscribe to store events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }
}
