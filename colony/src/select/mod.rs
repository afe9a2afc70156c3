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
//! Partitions of the row space
//!
//! A [`Selector`] yields [`Chunk`]s: ordered, non-overlapping runs of row ids
//! that the scheduler hands to one session each. Selectors are lazy and
//! restartable; every call to [`Selector::chunks`] recomputes the partition
//! from the current store state.
//!
//! Filters compose lazily: a filtered chunk keeps its candidate ids and
//! tests each predicate once per candidate while it is iterated.

mod index;

pub use index::{Index, ManualChunkBuilder};

use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

use crate::engine::Engine;
use crate::store::{Row, Store};

/// Predicate over row ids, shareable across workers
pub type RowFilter<'a> = Arc<dyn Fn(Row) -> bool + Send + Sync + 'a>;

/// Identification of one chunk within one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Position of the chunk in its selector's output
    pub chunk_id: usize,
    /// Number of candidate ids before filtering
    pub approximate_size: usize,
    /// Label of the group, for chunks built from an index
    pub label: Option<String>,
}

#[derive(Clone)]
enum ChunkIds {
    Range(Range<Row>),
    List(Arc<[Row]>),
}

/// An ordered run of row ids plus lazily evaluated filters
#[derive(Clone)]
pub struct Chunk<'a> {
    info: ChunkInfo,
    ids: ChunkIds,
    filters: Vec<RowFilter<'a>>,
}

impl<'a> Chunk<'a> {
    /// Chunk over a contiguous range of rows
    pub fn range(chunk_id: usize, rows: Range<Row>) -> Self {
        Chunk {
            info: ChunkInfo {
                chunk_id,
                approximate_size: rows.len(),
                label: None,
            },
            ids: ChunkIds::Range(rows),
            filters: Vec::new(),
        }
    }

    /// Chunk over an explicit, ascending list of rows
    pub fn list(chunk_id: usize, rows: Arc<[Row]>, label: Option<String>) -> Self {
        Chunk {
            info: ChunkInfo {
                chunk_id,
                approximate_size: rows.len(),
                label,
            },
            ids: ChunkIds::List(rows),
            filters: Vec::new(),
        }
    }

    /// Identification of this chunk
    pub fn info(&self) -> &ChunkInfo {
        &self.info
    }

    /// Add a predicate every yielded id must pass
    pub fn with_filter(mut self, filter: RowFilter<'a>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Row ids passing every filter, in ascending order
    pub fn ids(&self) -> impl Iterator<Item = Row> + '_ {
        let candidates: Box<dyn Iterator<Item = Row> + '_> = match &self.ids {
            ChunkIds::Range(rows) => Box::new(rows.clone()),
            ChunkIds::List(rows) => Box::new(rows.iter().copied()),
        };
        candidates.filter(move |&row| self.filters.iter().all(|f| f(row)))
    }
}

impl fmt::Debug for Chunk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("info", &self.info)
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// A restartable source of chunks
pub trait Selector<'a>: Send + Sync {
    /// Partition the current row space
    fn chunks(&self) -> Vec<Chunk<'a>>;
}

impl<'a, S: Selector<'a> + ?Sized> Selector<'a> for Box<S> {
    fn chunks(&self) -> Vec<Chunk<'a>> {
        (**self).chunks()
    }
}

impl<'a, S: Selector<'a> + ?Sized> Selector<'a> for &S {
    fn chunks(&self) -> Vec<Chunk<'a>> {
        (**self).chunks()
    }
}

#[derive(Debug, Clone, Copy)]
enum CountSource<'a> {
    Store(&'a Store),
    Fixed(usize),
}

/// Every row in `[0, count)`, split into fixed-size ranges
#[derive(Debug, Clone, Copy)]
pub struct AllEntities<'a> {
    source: CountSource<'a>,
    chunk_size: usize,
}

impl<'a> AllEntities<'a> {
    /// Chunk the rows of `store`, reading its count on every call
    ///
    /// # Panics
    ///
    /// Panics when `chunk_size` is zero.
    pub fn new(store: &'a Store, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "Chunk size must be positive");
        AllEntities {
            source: CountSource::Store(store),
            chunk_size,
        }
    }

    /// Chunk a fixed number of rows
    pub fn fixed(count: usize, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "Chunk size must be positive");
        AllEntities {
            source: CountSource::Fixed(count),
            chunk_size,
        }
    }

    fn count(&self) -> usize {
        match self.source {
            CountSource::Store(store) => store.count(),
            CountSource::Fixed(count) => count,
        }
    }
}

impl<'a> Selector<'a> for AllEntities<'a> {
    fn chunks(&self) -> Vec<Chunk<'a>> {
        let count = self.count();
        (0..count)
            .step_by(self.chunk_size)
            .enumerate()
            .map(|(chunk_id, start)| Chunk::range(chunk_id, start..(start + self.chunk_size).min(count)))
            .collect()
    }
}

/// Chunks of an inner selector, narrowed by a predicate
pub struct Filtered<'a, S> {
    inner: S,
    predicate: RowFilter<'a>,
}

impl<'a, S: Selector<'a>> Selector<'a> for Filtered<'a, S> {
    fn chunks(&self) -> Vec<Chunk<'a>> {
        self.inner
            .chunks()
            .into_iter()
            .map(|chunk| chunk.with_filter(Arc::clone(&self.predicate)))
            .collect()
    }
}

/// Narrow `selector` to the rows passing `predicate`
pub fn filtered<'a, S: Selector<'a>>(
    selector: S,
    predicate: impl Fn(Row) -> bool + Send + Sync + 'a,
) -> Filtered<'a, S> {
    Filtered {
        inner: selector,
        predicate: Arc::new(predicate),
    }
}

/// Narrow `selector` to the rows passing every component filter
pub fn filtered_by_components<'a, S: Selector<'a>>(
    selector: S,
    filters: Vec<RowFilter<'a>>,
) -> Filtered<'a, S> {
    filtered(selector, move |row| filters.iter().all(|f| f(row)))
}

/// Row filter over one component type
///
/// A row carrying the component passes when the predicate accepts it. A row
/// without it passes only when the filter was built with
/// [`accept_if_absent`](ComponentFilter::accept_if_absent).
pub struct ComponentFilter<'a, T> {
    engine: &'a Engine,
    predicate: Option<Arc<dyn Fn(&T) -> bool + Send + Sync + 'a>>,
    accept_if_absent: bool,
    _marker: PhantomData<fn(&T)>,
}

impl<'a, T: 'static> ComponentFilter<'a, T> {
    /// Rows carrying a `T`
    pub fn present(engine: &'a Engine) -> Self {
        ComponentFilter {
            engine,
            predicate: None,
            accept_if_absent: false,
            _marker: PhantomData,
        }
    }

    /// Rows whose `T` satisfies `predicate`
    pub fn matching(engine: &'a Engine, predicate: impl Fn(&T) -> bool + Send + Sync + 'a) -> Self {
        ComponentFilter {
            predicate: Some(Arc::new(predicate)),
            ..Self::present(engine)
        }
    }

    /// Also accept rows that lack a `T`
    pub fn accept_if_absent(mut self) -> Self {
        self.accept_if_absent = true;
        self
    }

    /// Turn this filter into a row predicate
    ///
    /// # Panics
    ///
    /// The predicate panics when `T` has no registered mapper.
    pub fn into_filter(self) -> RowFilter<'a> {
        let ComponentFilter {
            engine,
            predicate,
            accept_if_absent,
            ..
        } = self;
        Arc::new(move |row| {
            let index = match engine.mappers().index_of::<T>() {
                Ok(index) => index,
                Err(err) => panic!("{}", err),
            };
            if !engine.mappers().dao(index).is_present(engine.store(), row) {
                return accept_if_absent;
            }
            match &predicate {
                None => true,
                Some(predicate) => engine.peek::<T>(row).map_or(accept_if_absent, |c| predicate(&c)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Attribute, IntAttribute};
    use crate::testing::{people_engine, Person};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn collect<'a>(selector: &impl Selector<'a>) -> Vec<Vec<Row>> {
        selector.chunks().iter().map(|c| c.ids().collect()).collect()
    }

    #[test]
    fn test_all_entities_chunks() {
        let chunks = AllEntities::fixed(10, 4).chunks();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].info().chunk_id, 2);
        assert_eq!(chunks[2].info().approximate_size, 2);
        assert_eq!(collect(&AllEntities::fixed(10, 4))[2], vec![8, 9]);
        assert!(AllEntities::fixed(0, 4).chunks().is_empty());
    }

    #[test]
    fn test_all_entities_tracks_store_count() {
        let mut engine = people_engine(3);
        let selector_chunks = |engine: &Engine| engine.all_entities().chunks().len();
        assert_eq!(selector_chunks(&engine), 1);
        for _ in 0..3 {
            engine.create_entity();
        }
        assert_eq!(selector_chunks(&engine), 2);
    }

    #[test]
    fn test_filtered_is_lazy_and_composable() {
        let even = filtered(AllEntities::fixed(10, 5), |row| row % 2 == 0);
        let thirds = filtered(even, |row| row % 3 == 0);
        assert_eq!(collect(&thirds), vec![vec![0], vec![6]]);
        assert_eq!(thirds.chunks()[1].info().approximate_size, 5);
    }

    #[test]
    fn test_component_filters() {
        let engine = people_engine(6);
        let store = engine.store();
        store.require::<IntAttribute>("age").unwrap().set_empty(5);

        let adults = ComponentFilter::<Person>::matching(&engine, |p| p.age >= 3).into_filter();
        let selector = filtered_by_components(engine.all_entities(), vec![adults.clone()]);
        assert_eq!(collect(&selector).concat(), vec![3, 4]);

        let lenient = ComponentFilter::<Person>::matching(&engine, |p| p.age >= 3)
            .accept_if_absent()
            .into_filter();
        let selector = filtered_by_components(engine.all_entities(), vec![lenient]);
        assert_eq!(collect(&selector).concat(), vec![3, 4, 5]);

        let present = ComponentFilter::<Person>::present(&engine).into_filter();
        let selector = filtered_by_components(engine.all_entities(), vec![present, adults]);
        assert_eq!(collect(&selector).concat(), vec![3, 4]);
    }

    proptest! {
        #[test]
        fn prop_all_entities_is_disjoint_cover(count in 0usize..2000, chunk_size in 1usize..300) {
            let selector = AllEntities::fixed(count, chunk_size);
            let mut seen = BTreeSet::new();
            let mut total = 0;
            for (position, chunk) in selector.chunks().iter().enumerate() {
                prop_assert_eq!(chunk.info().chunk_id, position);
                prop_assert!(chunk.info().approximate_size <= chunk_size);
                for row in chunk.ids() {
                    prop_assert!(seen.insert(row));
                    total += 1;
                }
            }
            prop_assert_eq!(total, count);
            prop_assert_eq!(seen.into_iter().collect::<Vec<_>>(), (0..count).collect::<Vec<_>>());
        }
    }
}
