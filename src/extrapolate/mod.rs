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

//! Dead reckoning between snapshots.
//!
//! Every tick moves each entity along its heading at its last-known forward
//! speed, for the wall-clock time measured since the previous tick. Ticks never
//! create or remove entities and never touch fetched detail.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use log::info;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::selection::SelectionTracker;
use crate::store::{EntityStore, Renderer};

/// Advance every entity by `dt` and extend the focused entity's trail.
pub fn advance<R: Renderer>(
    store: &mut EntityStore<R>,
    selection: &mut SelectionTracker<R>,
    dt: Duration,
) {
    let dt_secs = dt.as_secs_f32();
    store.update_positions(|k| k.extrapolate(dt_secs));

    if let Some(record) = selection.focused().and_then(|id| store.get(&id)) {
        selection.observe(record.id, record.kinematics.position);
    }
}

/// Recurring extrapolation over shared store and selection state.
pub struct Extrapolator<R: Renderer> {
    store: Arc<RwLock<EntityStore<R>>>,
    selection: Arc<Mutex<SelectionTracker<R>>>,
    tick_interval: Duration,
}

impl<R: Renderer> std::fmt::Debug for Extrapolator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extrapolator")
            .field("tick_interval", &self.tick_interval)
            .finish_non_exhaustive()
    }
}

impl<R: Renderer + 'static> Extrapolator<R> {
    /// A zero `tick_interval` reschedules as soon as the runtime allows,
    /// yielding to other pending work between ticks.
    #[must_use]
    pub fn new(
        store: Arc<RwLock<EntityStore<R>>>,
        selection: Arc<Mutex<SelectionTracker<R>>>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            selection,
            tick_interval,
        }
    }

    /// Run one tick for the given elapsed time.
    pub fn tick(&self, dt: Duration) {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let mut selection = self
            .selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        advance(&mut store, &mut selection, dt);
    }

    /// Spawn the tick loop on the current runtime.
    #[must_use]
    pub fn spawn(self) -> ExtrapolatorHandle {
        let cancel_token = CancellationToken::new();
        let task_cancel = cancel_token.clone();
        let task = tokio::spawn(async move { self.run(task_cancel).await });

        ExtrapolatorHandle {
            cancel_token,
            task: Some(task),
        }
    }

    async fn run(self, cancel_token: CancellationToken) {
        info!("Extrapolator started (interval {:?})", self.tick_interval);
        let mut last = Instant::now();

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("Extrapolator stopped");
                    return;
                }
                () = pause(self.tick_interval) => {}
            }

            let now = Instant::now();
            self.tick(now - last);
            last = now;
        }
    }
}

async fn pause(interval: Duration) {
    if interval.is_zero() {
        tokio::task::yield_now().await;
    } else {
        sleep(interval).await;
    }
}

/// Handle to a running extrapolation loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct ExtrapolatorHandle {
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ExtrapolatorHandle {
    /// Signal the loop to stop after its current tick.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ExtrapolatorHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EntityId, KinematicState, Position, Velocity};
    use crate::test_support::RecordingRenderer;

    fn setup() -> (
        Arc<RwLock<EntityStore<RecordingRenderer>>>,
        Arc<Mutex<SelectionTracker<RecordingRenderer>>>,
    ) {
        let renderer = Arc::new(RecordingRenderer::default());
        (
            Arc::new(RwLock::new(EntityStore::new(Arc::clone(&renderer), 16))),
            Arc::new(Mutex::new(SelectionTracker::new(renderer))),
        )
    }

    fn moving(heading: f32, speed: f32) -> KinematicState {
        KinematicState {
            position: Position::new(3.0, -4.0, 250.0),
            heading,
            velocity: Velocity { x: speed, y: 7.0 },
        }
    }

    #[test]
    fn test_ticks_match_closed_form() {
        let (store, selection) = setup();
        let id = EntityId::new_v4();
        let heading = 0.7_f32;
        store.write().unwrap().apply_update(id, moving(heading, 12.0));

        let extrapolator = Extrapolator::new(Arc::clone(&store), selection, Duration::ZERO);
        let dt = Duration::from_millis(50);
        for _ in 0..40 {
            extrapolator.tick(dt);
        }

        let k = store.read().unwrap().get(&id).unwrap().kinematics;
        let total = 40.0 * 0.05;
        assert!((k.position.x - (3.0 + 12.0 * heading.cos() * total)).abs() < 1e-3);
        assert!((k.position.y - (-4.0 + 12.0 * heading.sin() * total)).abs() < 1e-3);
        assert!((k.position.z - 250.0).abs() < f32::EPSILON);
        assert_eq!(k.heading, heading);
        assert_eq!(k.velocity, Velocity { x: 12.0, y: 7.0 });
    }

    #[test]
    fn test_two_seconds_from_origin() {
        let (store, selection) = setup();
        let id = EntityId::new_v4();
        store.write().unwrap().apply_update(
            id,
            KinematicState {
                position: Position::ORIGIN,
                heading: 0.0,
                velocity: Velocity { x: 10.0, y: 0.0 },
            },
        );

        let extrapolator = Extrapolator::new(Arc::clone(&store), selection, Duration::ZERO);
        extrapolator.tick(Duration::from_secs(1));
        extrapolator.tick(Duration::from_secs(1));

        let p = store.read().unwrap().get(&id).unwrap().kinematics.position;
        assert!((p.x - 20.0).abs() < 1e-4);
        assert!(p.y.abs() < 1e-4);
        assert!(p.z.abs() < f32::EPSILON);
    }

    #[test]
    fn test_tick_extends_focused_trail_only() {
        let (store, selection) = setup();
        let focused = EntityId::new_v4();
        let other = EntityId::new_v4();
        {
            let mut s = store.write().unwrap();
            s.apply_update(focused, moving(0.0, 1.0));
            s.apply_update(other, moving(0.0, 1.0));
        }
        {
            let mut sel = selection.lock().unwrap();
            let ticket = sel.begin(focused);
            sel.complete(ticket, vec![Position::new(3.0, -4.0, 250.0)], None);
        }

        let extrapolator = Extrapolator::new(Arc::clone(&store), Arc::clone(&selection), Duration::ZERO);
        extrapolator.tick(Duration::from_secs(1));
        extrapolator.tick(Duration::from_secs(1));

        let sel = selection.lock().unwrap();
        let trail = &sel.current().unwrap().trail;
        assert_eq!(trail.len(), 3);
        assert!((trail[2].x - 5.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_spawned_loop_advances_and_stops() {
        let (store, selection) = setup();
        let id = EntityId::new_v4();
        store.write().unwrap().apply_update(id, moving(0.0, 100.0));

        let handle = Extrapolator::new(Arc::clone(&store), selection, Duration::from_millis(1)).spawn();
        assert!(handle.is_running());
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        let x = store.read().unwrap().get(&id).unwrap().kinematics.position.x;
        assert!(x > 3.0);

        // No further movement once stopped
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after = store.read().unwrap().get(&id).unwrap().kinematics.position.x;
        assert!((after - x).abs() < f32::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_feeds_measured_elapsed_time() {
        let (store, selection) = setup();
        let id = EntityId::new_v4();
        store.write().unwrap().apply_update(id, moving(0.0, 10.0));

        let handle =
            Extrapolator::new(Arc::clone(&store), selection, Duration::from_millis(100)).spawn();
        tokio::time::sleep(Duration::from_millis(2050)).await;
        handle.stop().await;

        // 20 ticks of 100ms at 10 units/s
        let p = store.read().unwrap().get(&id).unwrap().kinematics.position;
        assert!((p.x - 23.0).abs() < 1e-3, "x = {}", p.x);
        assert!((p.y + 4.0).abs() < 1e-3);
        assert!((p.z - 250.0).abs() < f32::EPSILON);
    }
}
