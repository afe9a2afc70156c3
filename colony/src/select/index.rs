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
//! Materialized, deterministic partitions
//!
//! An [`Index`] maps labels to ascending row ids and replays as one chunk per
//! label, labels in lexicographic order. A [`ManualChunkBuilder`] collects
//! `(label, id)` pairs from any number of threads; because [`build`] sorts
//! both levels, the resulting index is identical for every interleaving of
//! the calls that filled it.
//!
//! [`build`]: ManualChunkBuilder::build

use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use crate::select::{Chunk, Selector};
use crate::store::Row;

/// Labelled groups of ascending row ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    groups: Vec<(String, Arc<[Row]>)>,
}

impl Index {
    /// Build from groups in any order; ids are sorted and deduplicated
    pub fn from_groups(groups: impl IntoIterator<Item = (String, Vec<Row>)>) -> Self {
        let mut groups: Vec<(String, Arc<[Row]>)> = groups
            .into_iter()
            .map(|(label, mut ids)| {
                ids.sort_unstable();
                ids.dedup();
                (label, ids.into())
            })
            .collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));
        Index { groups }
    }

    /// Ids under `label`
    pub fn get(&self, label: &str) -> Option<&[Row]> {
        self.groups
            .binary_search_by(|(l, _)| l.as_str().cmp(label))
            .ok()
            .map(|i| &*self.groups[i].1)
    }

    /// Labels in lexicographic order
    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.groups.iter().map(|(l, _)| l.as_str())
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether the index has no labels
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total ids over all labels, counting fan-out
    pub fn total_ids(&self) -> usize {
        self.groups.iter().map(|(_, ids)| ids.len()).sum()
    }
}

impl<'a> Selector<'a> for Index {
    fn chunks(&self) -> Vec<Chunk<'a>> {
        self.groups
            .iter()
            .enumerate()
            .map(|(chunk_id, (label, ids))| Chunk::list(chunk_id, Arc::clone(ids), Some(label.clone())))
            .collect()
    }
}

/// Concurrent `(label, id)` multimap that builds an [`Index`]
///
/// Duplicate pairs collapse; one id under two labels fans out into both.
#[derive(Debug, Default)]
pub struct ManualChunkBuilder {
    groups: DashMap<String, DashSet<Row>>,
}

impl ManualChunkBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` under `label`; callable from any thread
    pub fn add(&self, label: &str, id: Row) {
        if let Some(ids) = self.groups.get(label) {
            ids.insert(id);
            return;
        }
        self.groups.entry(label.to_string()).or_default().insert(id);
    }

    /// Number of distinct labels so far
    pub fn label_count(&self) -> usize {
        self.groups.len()
    }

    /// Sort labels and ids into an index
    pub fn build(&self) -> Index {
        Index::from_groups(
            self.groups
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().iter().map(|id| *id).collect())),
        )
    }
}
