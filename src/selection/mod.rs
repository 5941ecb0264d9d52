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

//! Single-entity selection with trail accumulation.
//!
//! Selecting is a two-step affair because the detail fetch happens in
//! between: [`SelectionTracker::begin`] tears down any current focus and hands
//! out a [`SelectTicket`], and [`SelectionTracker::complete`] installs the new
//! focus only if no later `begin` or `deselect` has happened since. Each of
//! those bumps a generation counter, so a late completion for a superseded
//! request is discarded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;

use crate::protocol::{EntityId, Position};
use crate::store::Renderer;

/// Public view of the tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    Idle,
    Focused(EntityId),
}

/// Proof of a selection request, checked again on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct SelectTicket {
    id: EntityId,
    generation: u64,
}

impl SelectTicket {
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }
}

/// Line from the focused entity's destination to its current position.
#[derive(Debug)]
struct DestinationGuide<T> {
    destination: Position,
    handle: T,
}

/// State of the focused entity.
#[derive(Debug)]
pub struct SelectionState<T> {
    pub id: EntityId,
    pub trail: Vec<Position>,
    pub focused_at: DateTime<Utc>,
    trail_handle: T,
    guide: Option<DestinationGuide<T>>,
}

pub struct SelectionTracker<R: Renderer> {
    renderer: Arc<R>,
    generation: u64,
    pending: Option<EntityId>,
    current: Option<SelectionState<R::TrailHandle>>,
}

impl<R: Renderer> std::fmt::Debug for SelectionTracker<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionTracker")
            .field("generation", &self.generation)
            .field("pending", &self.pending)
            .field("focused", &self.focused())
            .finish_non_exhaustive()
    }
}

impl<R: Renderer> SelectionTracker<R> {
    #[must_use]
    pub fn new(renderer: Arc<R>) -> Self {
        Self {
            renderer,
            generation: 0,
            pending: None,
            current: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> FocusState {
        match &self.current {
            Some(s) => FocusState::Focused(s.id),
            None => FocusState::Idle,
        }
    }

    #[must_use]
    pub fn focused(&self) -> Option<EntityId> {
        self.current.as_ref().map(|s| s.id)
    }

    #[must_use]
    pub fn current(&self) -> Option<&SelectionState<R::TrailHandle>> {
        self.current.as_ref()
    }

    /// Entity whose selection is waiting on its detail fetch.
    #[must_use]
    pub fn pending(&self) -> Option<EntityId> {
        self.pending
    }

    /// Start selecting `id`: drop any focus and invalidate older tickets.
    pub fn begin(&mut self, id: EntityId) -> SelectTicket {
        self.teardown();
        self.generation += 1;
        self.pending = Some(id);
        SelectTicket {
            id,
            generation: self.generation,
        }
    }

    /// Whether no later `begin`/`deselect` has superseded this ticket.
    #[must_use]
    pub fn is_current(&self, ticket: &SelectTicket) -> bool {
        ticket.generation == self.generation && self.pending == Some(ticket.id)
    }

    /// Give up on a request (e.g. its fetch failed). Stale tickets are ignored.
    pub fn abandon(&mut self, ticket: &SelectTicket) {
        if self.is_current(ticket) {
            self.pending = None;
        }
    }

    /// Install the focus for `ticket`, drawing `trail` and the optional guide
    /// to `destination`. Returns `false` and does nothing for a stale ticket.
    pub fn complete(
        &mut self,
        ticket: SelectTicket,
        trail: Vec<Position>,
        destination: Option<Position>,
    ) -> bool {
        if !self.is_current(&ticket) {
            debug!("Discarding superseded selection of {}", ticket.id);
            return false;
        }

        let trail_handle = self.renderer.draw_trail(&trail);
        let guide = match (destination, trail.last()) {
            (Some(destination), Some(&here)) => Some(DestinationGuide {
                destination,
                handle: self.renderer.draw_trail(&[destination, here]),
            }),
            _ => None,
        };

        debug!("Focused {}", ticket.id);
        self.pending = None;
        self.current = Some(SelectionState {
            id: ticket.id,
            trail,
            focused_at: Utc::now(),
            trail_handle,
            guide,
        });
        true
    }

    /// Return to idle, removing the rendered trail. No-op when already idle.
    ///
    /// Returns `true` if there was a focus or pending request to drop.
    pub fn deselect(&mut self) -> bool {
        if self.current.is_none() && self.pending.is_none() {
            return false;
        }
        self.teardown();
        self.pending = None;
        self.generation += 1;
        true
    }

    /// Extend the trail if `id` is focused.
    pub fn observe(&mut self, id: EntityId, position: Position) {
        let Some(state) = self.current.as_mut().filter(|s| s.id == id) else {
            return;
        };
        state.trail.push(position);
        self.renderer.update_trail(&state.trail_handle, &state.trail);
        if let Some(guide) = &state.guide {
            self.renderer
                .update_trail(&guide.handle, &[guide.destination, position]);
        }
    }

    /// Drop the focus if its entity left the store.
    pub fn on_removed(&mut self, id: EntityId) {
        if self.focused() == Some(id) {
            debug!("Focused entity {id} removed");
            self.deselect();
        }
    }

    fn teardown(&mut self) {
        if let Some(state) = self.current.take() {
            self.renderer.remove_trail(state.trail_handle);
            if let Some(guide) = state.guide {
                self.renderer.remove_trail(guide.handle);
            }
        }
    }
}
