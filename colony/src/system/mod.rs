// Copyright 2025 John Brosnihan
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
//! Chunked iteration over the entity population
//!
//! This module provides the scheduler that drives visit callbacks over a
//! selector's chunks, sequentially or in parallel using Rayon. Each chunk is
//! processed by exactly one session on one worker; row disjointness between
//! chunks is what makes parallel writes into the store race-free.
//!
//! Within a chunk rows run in ascending order and visits in registration
//! order. Across chunks no order is guaranteed in parallel mode.

pub mod iterating;
pub mod query;

pub use iterating::{IteratingSystem, IteratingSystemBuilder, RunSummary};
pub use query::QueryService;

use crate::mapper::LifecycleEvent;
use crate::session::{Session, SessionMode};

#[cfg(feature = "parallel")]
use rayon::ThreadPool;

/// What happens to a chunk's session once its visits are done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Persist without clearing the cache
    Shared,
    /// Discard every mutation
    ReadOnly,
    /// Persist then clear, or only clear when the factory prefers clearing
    Default,
}

impl PersistenceMode {
    /// Alias of [`PersistenceMode::ReadOnly`]
    pub const NO_PERSIST: PersistenceMode = PersistenceMode::ReadOnly;
}

impl Default for PersistenceMode {
    fn default() -> Self {
        PersistenceMode::Default
    }
}

/// How a system walks its chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    /// One chunk after another on the calling thread
    Sequential,
    /// Chunks spread over the worker pool
    #[default]
    Parallel,
}

/// Source of sessions for the scheduler
///
/// Implemented by [`Engine`](crate::Engine).
pub trait SessionFactory: Sync {
    /// Open a fresh session
    fn open_session(&self, mode: SessionMode) -> Session<'_>;

    /// Whether [`PersistenceMode::Default`] should clear without persisting
    fn clears_by_default(&self) -> bool;

    /// Notify every mapper of a lifecycle event
    fn broadcast(&self, event: LifecycleEvent);

    /// Dedicated worker pool, if any
    #[cfg(feature = "parallel")]
    fn thread_pool(&self) -> Option<&ThreadPool> {
        None
    }
}
