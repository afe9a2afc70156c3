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
//! Population-wide queries built on the scheduler
//!
//! Every query runs read-only: sessions opened for a query are cleared, never
//! persisted. Results are deterministic whatever the execution strategy.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::{ColonyError, Result};
use crate::select::{Index, ManualChunkBuilder, Selector};
use crate::session::Entity;
use crate::store::{AtomicAppendArray, Row, Store, SynchronizedIntArray};
use crate::system::{Execution, IteratingSystemBuilder, PersistenceMode};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Read-only queries over an engine's entities
#[derive(Clone, Copy)]
pub struct QueryService<'a> {
    engine: &'a Engine,
    execution: Execution,
}

impl<'a> QueryService<'a> {
    /// Queries over `engine`, run in parallel
    pub fn new(engine: &'a Engine) -> Self {
        QueryService {
            engine,
            execution: Execution::Parallel,
        }
    }

    /// Use `execution` for every scheduler pass
    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    /// Assign each selected entity to zero or more labels
    ///
    /// `labeller` runs once per entity; an entity under several labels
    /// appears in each of their groups.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let by_colour = QueryService::new(&engine).classify(engine.all_entities(), |entity| {
    ///     entity.get::<Agent>().map(|a| a.borrow().colour.to_string())
    /// })?;
    /// ```
    pub fn classify<S, F, I>(&self, selector: S, labeller: F) -> Result<Index>
    where
        S: Selector<'a> + 'a,
        F: Fn(Entity<'_, '_>) -> I + Send + Sync + 'a,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let builder = Arc::new(ManualChunkBuilder::new());
        let sink = Arc::clone(&builder);
        IteratingSystemBuilder::new(self.engine)
            .selector(selector)
            .persistence(PersistenceMode::ReadOnly)
            .visit(move |entity, _| {
                for label in labeller(entity) {
                    sink.add(label.as_ref(), entity.id());
                }
            })
            .build()?
            .run(self.execution)?;
        Ok(builder.build())
    }

    /// Classify raw row ids in `[0, count)` without opening sessions
    ///
    /// Rows for which `tag` returns `None` are left out. Ids under each key
    /// are ascending.
    pub fn classify_ids<K, F>(&self, tag: F) -> BTreeMap<K, Vec<Row>>
    where
        K: Ord + Send,
        F: Fn(&Store, Row) -> Option<K> + Sync,
    {
        let store = self.engine.store();
        let count = store.count();
        let mut groups = match self.execution {
            Execution::Sequential => {
                (0..count).fold(BTreeMap::new(), |acc, row| tag_row(acc, &tag, store, row))
            }
            Execution::Parallel => classify_parallel(self.engine, &tag, count),
        };
        for ids in groups.values_mut() {
            ids.sort_unstable();
        }
        groups
    }

    /// Ids of the selected entities passing `predicate`, ascending
    ///
    /// # Errors
    ///
    /// Fails with [`ColonyError::CapacityExhausted`] when a matching id does
    /// not fit in an `i32`.
    pub fn matching_ids<S, P>(&self, selector: S, predicate: P) -> Result<Vec<Row>>
    where
        S: Selector<'a> + 'a,
        P: Fn(Entity<'_, '_>) -> bool + Send + Sync + 'a,
    {
        let matches = Arc::new(SynchronizedIntArray::new());
        let too_large = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&matches);
        let overflow = Arc::clone(&too_large);
        IteratingSystemBuilder::new(self.engine)
            .selector(selector)
            .persistence(PersistenceMode::ReadOnly)
            .visit(move |entity, _| {
                if predicate(entity) {
                    match i32::try_from(entity.id()) {
                        Ok(id) => sink.push(id),
                        Err(_) => {
                            overflow.fetch_max(entity.id(), Ordering::Relaxed);
                        }
                    }
                }
            })
            .build()?
            .run(self.execution)?;

        match too_large.load(Ordering::Relaxed) {
            0 => Ok(matches.to_sorted_vec().into_iter().map(|id| id as Row).collect()),
            row => Err(ColonyError::CapacityExhausted {
                requested: row + 1,
                capacity: i32::MAX as usize + 1,
            }),
        }
    }

    /// Like [`matching_ids`](Self::matching_ids), collecting into a fixed
    /// array of `max` slots
    ///
    /// # Errors
    ///
    /// Fails with [`ColonyError::CapacityExhausted`] when more than `max`
    /// entities match.
    pub fn matching_ids_bounded<S, P>(&self, selector: S, predicate: P, max: usize) -> Result<Vec<Row>>
    where
        S: Selector<'a> + 'a,
        P: Fn(Entity<'_, '_>) -> bool + Send + Sync + 'a,
    {
        let matches = Arc::new(AtomicAppendArray::new(max));
        let sink = Arc::clone(&matches);
        IteratingSystemBuilder::new(self.engine)
            .selector(selector)
            .persistence(PersistenceMode::ReadOnly)
            .visit(move |entity, _| {
                if predicate(entity) {
                    // overflow is reported once the pass is over
                    let _ = sink.push(entity.id());
                }
            })
            .build()?
            .run(self.execution)?;

        if matches.attempts() > matches.capacity() {
            return Err(ColonyError::CapacityExhausted {
                requested: matches.attempts(),
                capacity: matches.capacity(),
            });
        }
        let mut ids = matches.to_vec();
        ids.sort_unstable();
        Ok(ids)
    }
}

fn tag_row<K: Ord, F: Fn(&Store, Row) -> Option<K>>(
    mut groups: BTreeMap<K, Vec<Row>>,
    tag: &F,
    store: &Store,
    row: Row,
) -> BTreeMap<K, Vec<Row>> {
    if let Some(key) = tag(store, row) {
        groups.entry(key).or_default().push(row);
    }
    groups
}

#[cfg(feature = "parallel")]
fn classify_parallel<K, F>(engine: &Engine, tag: &F, count: usize) -> BTreeMap<K, Vec<Row>>
where
    K: Ord + Send,
    F: Fn(&Store, Row) -> Option<K> + Sync,
{
    let store = engine.store();
    engine.install(|| {
        (0..count)
            .into_par_iter()
            .fold(BTreeMap::new, |acc, row| tag_row(acc, tag, store, row))
            .reduce(BTreeMap::new, |mut left, right| {
                for (key, mut ids) in right {
                    left.entry(key).or_default().append(&mut ids);
                }
                left
            })
    })
}

#[cfg(not(feature = "parallel"))]
fn classify_parallel<K, F>(engine: &Engine, tag: &F, count: usize) -> BTreeMap<K, Vec<Row>>
where
    K: Ord + Send,
    F: Fn(&Store, Row) -> Option<K> + Sync,
{
    let store = engine.store();
    (0..count).fold(BTreeMap::new(), |acc, row| tag_row(acc, tag, store, row))
}
