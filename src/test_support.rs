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

//! Test doubles: a renderer that records every call and a remote source
//! that answers from scripted replies.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::detail::RemoteSource;
use crate::error::TransportError;
use crate::protocol::{Channel, Position};
use crate::store::Renderer;

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Create(u64, Position),
    Reposition(u64, Position),
    Remove(u64),
    DrawTrail(u64, Vec<Position>),
    UpdateTrail(u64, Vec<Position>),
    RemoveTrail(u64),
}

/// Renderer that hands out numbered handles and records every call.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    next: AtomicU64,
    calls: Mutex<Vec<RenderCall>>,
}

impl RecordingRenderer {
    #[must_use]
    pub fn calls(&self) -> Vec<RenderCall> {
        self.log().clone()
    }

    pub fn count(&self, pred: impl Fn(&RenderCall) -> bool) -> usize {
        self.log().iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&self) {
        self.log().clear();
    }

    fn record(&self, call: RenderCall) {
        self.log().push(call);
    }

    fn log(&self) -> MutexGuard<'_, Vec<RenderCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_handle(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Renderer for RecordingRenderer {
    type Handle = u64;
    type TrailHandle = u64;

    fn create_handle(&self, position: Position) -> u64 {
        let h = self.next_handle();
        self.record(RenderCall::Create(h, position));
        h
    }

    fn reposition(&self, handle: &u64, position: Position) {
        self.record(RenderCall::Reposition(*handle, position));
    }

    fn remove(&self, handle: u64) {
        self.record(RenderCall::Remove(handle));
    }

    fn draw_trail(&self, points: &[Position]) -> u64 {
        let h = self.next_handle();
        self.record(RenderCall::DrawTrail(h, points.to_vec()));
        h
    }

    fn update_trail(&self, trail: &u64, points: &[Position]) {
        self.record(RenderCall::UpdateTrail(*trail, points.to_vec()));
    }

    fn remove_trail(&self, trail: u64) {
        self.record(RenderCall::RemoveTrail(trail));
    }
}

/// One scripted reply: optional delay, then the result.
#[derive(Debug, Clone)]
pub struct Reply {
    pub delay: Duration,
    pub result: Result<Value, TransportError>,
}

impl Reply {
    #[must_use]
    pub fn ok(value: Value) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(value),
        }
    }

    #[must_use]
    pub fn err(msg: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(TransportError::new(msg)),
        }
    }

    #[must_use]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Remote source answering from per-channel reply queues.
///
/// A channel with an empty queue answers with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    replies: Mutex<HashMap<Channel, VecDeque<Reply>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(Channel, Value)>>,
}

impl ScriptedRemote {
    pub fn push(&self, channel: Channel, reply: Reply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel)
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(Channel, Value)> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl RemoteSource for ScriptedRemote {
    async fn request(&self, channel: Channel, payload: Value) -> Result<Value, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push((channel, payload));
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&channel)
            .and_then(VecDeque::pop_front);
        let Some(reply) = reply else {
            return Err(TransportError::new(format!("no reply scripted for {channel}")));
        };
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}
