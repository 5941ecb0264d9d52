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

//! Binary snapshot codec.
//!
//! A snapshot is a flat sequence of 40-byte records, all little-endian:
//! ```text
//! [0,16)  entity id (raw UUID bytes)
//! [16,20) x      f32
//! [20,24) y      f32
//! [24,28) z      f32
//! [28,32) heading f32 (radians)
//! [32,36) vx     f32
//! [36,40) vy     f32
//! ```

use std::iter::FusedIterator;
use std::slice::ChunksExact;

use super::{EntityId, KinematicState, Position, Velocity};
use crate::error::EngineError;

/// Size of one encoded entity record in bytes.
pub const RECORD_SIZE: usize = 40;

const ID_LEN: usize = 16;

/// Validate a snapshot buffer and return a lazy iterator over its records.
///
/// Fails with [`EngineError::MalformedSnapshot`] if the length is not a
/// multiple of [`RECORD_SIZE`]; in that case nothing is decoded.
pub fn decode_snapshot(buf: &[u8]) -> Result<SnapshotIter<'_>, EngineError> {
    if buf.len() % RECORD_SIZE != 0 {
        return Err(EngineError::MalformedSnapshot { len: buf.len() });
    }
    Ok(SnapshotIter {
        chunks: buf.chunks_exact(RECORD_SIZE),
    })
}

/// Encode entity states into the snapshot wire format.
#[must_use]
pub fn encode_snapshot<I>(entities: I) -> Vec<u8>
where
    I: IntoIterator<Item = (EntityId, KinematicState)>,
{
    let entities = entities.into_iter();
    let mut out = Vec::with_capacity(entities.size_hint().0 * RECORD_SIZE);
    for (id, k) in entities {
        out.extend_from_slice(id.as_bytes());
        for value in [
            k.position.x,
            k.position.y,
            k.position.z,
            k.heading,
            k.velocity.x,
            k.velocity.y,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out
}

/// Lazy decoder over a validated snapshot buffer.
///
/// Holds only a borrow of the buffer. Decoding the same buffer again always
/// yields the same sequence.
#[derive(Debug, Clone)]
pub struct SnapshotIter<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl Iterator for SnapshotIter<'_> {
    type Item = (EntityId, KinematicState);

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().map(decode_record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for SnapshotIter<'_> {}

impl FusedIterator for SnapshotIter<'_> {}

fn read_f32(record: &[u8], offset: usize) -> f32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&record[offset..offset + 4]);
    f32::from_le_bytes(bytes)
}

fn decode_record(record: &[u8]) -> (EntityId, KinematicState) {
    let mut id = [0u8; ID_LEN];
    id.copy_from_slice(&record[..ID_LEN]);

    let state = KinematicState {
        position: Position {
            x: read_f32(record, 16),
            y: read_f32(record, 20),
            z: read_f32(record, 24),
        },
        heading: read_f32(record, 28),
        velocity: Velocity {
            x: read_f32(record, 32),
            y: read_f32(record, 36),
        },
    };

    (EntityId::from_bytes(id), state)
}
