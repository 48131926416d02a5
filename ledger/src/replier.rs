//! Retry buffer for vertices that arrived before their parents.
//!
//! Gossip gives no ordering guarantee, so a vertex may reference parents this
//! node has not seen yet. Such a vertex is parked here and re-offered for
//! admission on every tick, oldest first, until it is admitted or has been
//! parked too many times.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;

use tangle_types::{Timestamp, VertexHash};

use crate::vertex::Vertex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReplierError {
    #[error("not enough space in the retry buffer")]
    NotEnoughSpace,

    #[error("vertex repetition exceeded")]
    RepetitionExceeded,
}

/// How often a vertex has been parked, and since when.
#[derive(Debug, Clone, Copy)]
struct Memory {
    repeated: u32,
    first_seen: Timestamp,
}

#[derive(Default)]
struct State {
    members: Vec<Vertex>,
    memories: HashMap<VertexHash, Memory>,
}

pub struct Replier {
    state: Mutex<State>,
    capacity: usize,
    max_repeats: u32,
    longevity: Duration,
}

impl Replier {
    pub fn new(capacity: usize, max_repeats: u32, longevity: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                members: Vec::with_capacity(capacity),
                memories: HashMap::new(),
            }),
            capacity,
            max_repeats,
            longevity,
        }
    }

    // A panic while holding this lock leaves only bookkeeping behind, so the
    // state is still usable.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Park `vertex` for a later retry.
    pub fn insert(&self, vertex: Vertex) -> Result<(), ReplierError> {
        self.insert_at(vertex, Timestamp::now())
    }

    pub fn insert_at(&self, vertex: Vertex, now: Timestamp) -> Result<(), ReplierError> {
        let mut state = self.lock();
        if state.members.len() >= self.capacity {
            return Err(ReplierError::NotEnoughSpace);
        }
        let memory = state.memories.entry(vertex.hash).or_insert(Memory {
            repeated: 0,
            first_seen: now,
        });
        if memory.repeated > self.max_repeats {
            return Err(ReplierError::RepetitionExceeded);
        }
        memory.repeated += 1;
        state.members.push(vertex);
        Ok(())
    }

    /// Take the parked vertex with the earliest creation time. Among equal
    /// creation times the one parked first wins.
    pub fn pop_next(&self) -> Option<Vertex> {
        let mut state = self.lock();
        let (idx, _) = state
            .members
            .iter()
            .enumerate()
            .min_by_key(|(idx, v)| (v.created_at, *idx))?;
        Some(state.members.remove(idx))
    }

    /// Forget repeat counts older than the configured longevity.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let mut state = self.lock();
        let before = state.memories.len();
        let longevity = self.longevity;
        state
            .memories
            .retain(|_, m| !m.first_seen.has_expired(longevity, now));
        before - state.memories.len()
    }

    pub fn len(&self) -> usize {
        self.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
