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

//! Error types for the synchronization engine.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::EntityId;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Snapshot buffer length violates the fixed record size. The whole push
    /// is rejected.
    #[error("malformed snapshot: {len} bytes is not a multiple of {}", crate::protocol::RECORD_SIZE)]
    MalformedSnapshot { len: usize },

    /// An on-demand fetch timed out or failed in transport.
    #[error("fetch of {what} failed: {source}")]
    DetailFetchFailed {
        what: String,
        #[source]
        source: FetchError,
    },

    /// The referenced entity is not in the store.
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
}

impl EngineError {
    pub(crate) fn fetch_failed(what: impl Into<String>, source: FetchError) -> Self {
        Self::DetailFetchFailed {
            what: what.into(),
            source,
        }
    }
}

/// Reasons a request/response call produced no usable result.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure reported by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    #[must_use]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
