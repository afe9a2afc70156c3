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
//! The iterating system and its builder

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, info_span};

use crate::error::{ColonyError, Result};
use crate::mapper::{ComponentType, LifecycleEvent};
use crate::select::{Chunk, ChunkInfo, Selector};
use crate::session::{Entity, Session, SessionMode};
use crate::system::{Execution, PersistenceMode, SessionFactory};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

type Visit<'a, C> = Box<dyn Fn(Entity<'_, '_>, &mut C) + Send + Sync + 'a>;
type ContextFactory<'a, C> = Box<dyn Fn(&ChunkInfo) -> C + Send + Sync + 'a>;
type ChunkDone<'a, C> = Box<dyn Fn(&ChunkInfo, &C) + Send + Sync + 'a>;

/// Outcome of one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Chunks processed
    pub chunks: usize,
    /// Rows visited over all chunks
    pub rows: usize,
}

/// Builder for an [`IteratingSystem`]
///
/// # Examples
///
/// ```rust,ignore
/// let system = IteratingSystemBuilder::new(&engine)
///     .selector(engine.all_entities())
///     .seeded_context(42)
///     .visit(|entity, rng| {
///         if let Some(agent) = entity.get::<Agent>() {
///             agent.borrow_mut().mood = rng.gen();
///         }
///     })
///     .build()?;
/// system.run(Execution::Parallel)?;
/// ```
pub struct IteratingSystemBuilder<'a, C = ()> {
    factory: &'a dyn SessionFactory,
    selector: Option<Box<dyn Selector<'a> + 'a>>,
    persistence: PersistenceMode,
    session_mode: SessionMode,
    persisting: Option<Vec<ComponentType>>,
    context: ContextFactory<'a, C>,
    visits: Vec<Visit<'a, C>>,
    on_chunk_done: Option<ChunkDone<'a, C>>,
}

impl<'a> IteratingSystemBuilder<'a, ()> {
    /// Start a system drawing sessions from `factory`
    pub fn new(factory: &'a dyn SessionFactory) -> Self {
        IteratingSystemBuilder {
            factory,
            selector: None,
            persistence: PersistenceMode::default(),
            session_mode: SessionMode::default(),
            persisting: None,
            context: Box::new(|_| ()),
            visits: Vec::new(),
            on_chunk_done: None,
        }
    }
}

impl<'a, C: 'a> IteratingSystemBuilder<'a, C> {
    /// Rows to visit
    pub fn selector(mut self, selector: impl Selector<'a> + 'a) -> Self {
        self.selector = Some(Box::new(selector));
        self
    }

    /// What to do with each chunk's session afterwards
    pub fn persistence(mut self, persistence: PersistenceMode) -> Self {
        self.persistence = persistence;
        self
    }

    /// Entity mapping mode of the per-chunk sessions
    pub fn session_mode(mut self, mode: SessionMode) -> Self {
        self.session_mode = mode;
        self
    }

    /// Persist only the given component types
    pub fn persisting_exactly(mut self, types: &[ComponentType]) -> Self {
        self.persisting = Some(types.to_vec());
        self
    }

    /// Persist only `T`
    pub fn persisting_only<T: 'static>(self) -> Self {
        self.persisting_exactly(&[ComponentType::of::<T>()])
    }

    /// Build a per-chunk context with `factory`
    ///
    /// # Panics
    ///
    /// Panics when visits were registered before the context.
    pub fn context<D>(
        self,
        factory: impl Fn(&ChunkInfo) -> D + Send + Sync + 'a,
    ) -> IteratingSystemBuilder<'a, D> {
        assert!(
            self.visits.is_empty() && self.on_chunk_done.is_none(),
            "Context must be set before registering visits"
        );
        IteratingSystemBuilder {
            factory: self.factory,
            selector: self.selector,
            persistence: self.persistence,
            session_mode: self.session_mode,
            persisting: self.persisting,
            context: Box::new(factory),
            visits: Vec::new(),
            on_chunk_done: None,
        }
    }

    /// Give every chunk a ChaCha generator seeded from `seed` and its chunk id
    ///
    /// Chunk `n` always sees the same stream, whatever thread runs it.
    pub fn seeded_context(self, seed: u64) -> IteratingSystemBuilder<'a, ChaCha8Rng> {
        self.context(move |info| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(info.chunk_id as u64);
            rng
        })
    }

    /// Add a visit, run for every row after the visits added before it
    pub fn visit(mut self, visit: impl Fn(Entity<'_, '_>, &mut C) + Send + Sync + 'a) -> Self {
        self.visits.push(Box::new(visit));
        self
    }

    /// Run `callback` once per chunk after its last row
    pub fn on_chunk_done(mut self, callback: impl Fn(&ChunkInfo, &C) + Send + Sync + 'a) -> Self {
        self.on_chunk_done = Some(Box::new(callback));
        self
    }

    /// Finish the system
    ///
    /// # Errors
    ///
    /// Fails when no selector was given.
    pub fn build(self) -> Result<IteratingSystem<'a, C>> {
        let selector = self
            .selector
            .ok_or_else(|| ColonyError::InvalidConfig("iterating system has no selector".into()))?;
        Ok(IteratingSystem {
            factory: self.factory,
            selector,
            persistence: self.persistence,
            session_mode: self.session_mode,
            persisting: self.persisting,
            context: self.context,
            visits: self.visits,
            on_chunk_done: self.on_chunk_done,
        })
    }
}

/// Visits over the chunks of a selector
///
/// Every run recomputes the chunks, so a system can be run once per tick.
pub struct IteratingSystem<'a, C = ()> {
    factory: &'a dyn SessionFactory,
    selector: Box<dyn Selector<'a> + 'a>,
    persistence: PersistenceMode,
    session_mode: SessionMode,
    persisting: Option<Vec<ComponentType>>,
    context: ContextFactory<'a, C>,
    visits: Vec<Visit<'a, C>>,
    on_chunk_done: Option<ChunkDone<'a, C>>,
}

/// Broadcasts the end of a parallel pass, even while unwinding
#[cfg(feature = "parallel")]
struct ParallelPass<'f> {
    factory: &'f dyn SessionFactory,
}

#[cfg(feature = "parallel")]
impl Drop for ParallelPass<'_> {
    fn drop(&mut self) {
        self.factory.broadcast(LifecycleEvent::PostParallelIteration);
    }
}

impl<'a, C> IteratingSystem<'a, C> {
    /// Run with the given execution strategy
    pub fn run(&self, execution: Execution) -> Result<RunSummary> {
        match execution {
            Execution::Sequential => self.run_sequential(),
            Execution::Parallel => self.run_parallel(),
        }
    }

    /// Process chunks one after another on the calling thread
    pub fn run_sequential(&self) -> Result<RunSummary> {
        let chunks = self.selector.chunks();
        let span = info_span!("iterating_system", chunks = chunks.len(), parallel = false);
        let _enter = span.enter();

        let mut summary = RunSummary::default();
        for chunk in &chunks {
            summary.rows += self.run_chunk(chunk)?;
            summary.chunks += 1;
        }
        info!(chunks = summary.chunks, rows = summary.rows, "pass finished");
        Ok(summary)
    }

    /// Process chunks on the worker pool
    ///
    /// Mappers receive [`LifecycleEvent::PreParallelIteration`] before the
    /// first chunk and [`LifecycleEvent::PostParallelIteration`] after the
    /// last, including when a visit panics.
    #[cfg(feature = "parallel")]
    pub fn run_parallel(&self) -> Result<RunSummary> {
        let chunks = self.selector.chunks();
        let span = info_span!("iterating_system", chunks = chunks.len(), parallel = true);
        let _enter = span.enter();

        self.factory.broadcast(LifecycleEvent::PreParallelIteration);
        let _pass = ParallelPass {
            factory: self.factory,
        };

        let work = || {
            chunks
                .par_iter()
                .map(|chunk| self.run_chunk(chunk))
                .try_reduce(|| 0, |a, b| Ok(a + b))
        };
        let rows = match self.factory.thread_pool() {
            Some(pool) => pool.install(work),
            None => work(),
        }?;

        let summary = RunSummary {
            chunks: chunks.len(),
            rows,
        };
        info!(chunks = summary.chunks, rows = summary.rows, "parallel pass finished");
        Ok(summary)
    }

    /// Process chunks (sequential fallback when the parallel feature is disabled)
    #[cfg(not(feature = "parallel"))]
    pub fn run_parallel(&self) -> Result<RunSummary> {
        self.run_sequential()
    }

    fn run_chunk(&self, chunk: &Chunk<'a>) -> Result<usize> {
        let info = chunk.info();
        let session = self.factory.open_session(self.session_mode);
        session.set_owner_id(info.chunk_id as u64 + 1);
        if let Some(types) = &self.persisting {
            session.persisting_exactly(types)?;
        }

        let mut context = (self.context)(info);
        let mut rows = 0;
        for row in chunk.ids() {
            let entity = session.entity(row);
            for visit in &self.visits {
                visit(entity, &mut context);
            }
            rows += 1;
        }
        if let Some(done) = &self.on_chunk_done {
            done(info, &context);
        }

        self.finish(session);
        debug!(chunk = info.chunk_id, label = ?info.label, rows, "chunk finished");
        Ok(rows)
    }

    fn finish(&self, mut session: Session<'_>) {
        match self.persistence {
            PersistenceMode::Shared => session.persist(),
            PersistenceMode::ReadOnly => session.clear(),
            PersistenceMode::Default if self.factory.clears_by_default() => session.clear(),
            PersistenceMode::Default => session.close(),
        }
    }
}
