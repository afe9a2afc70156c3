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
//! Shared-state primitives for cross-chunk accumulation
//!
//! Row-disjoint chunks never need locks to write their own cells. State that
//! spans chunks, such as a global result list, goes through one of the two
//! structures here:
//! - [`AtomicAppendArray`]: fixed size, lock-free slot claims, hard failure on
//!   overflow
//! - [`SynchronizedIntArray`]: growable, appends under a lock

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use tracing::debug;

use crate::error::{ColonyError, Result};

/// Append-only array with a fixed maximum size
///
/// Each push claims the next slot with one atomic increment. The array never
/// resizes: pushing past the end fails and the value is dropped.
pub struct AtomicAppendArray<T> {
    slots: Box<[OnceLock<T>]>,
    next: AtomicUsize,
}

impl<T> AtomicAppendArray<T> {
    /// Create an array with room for `capacity` values
    pub fn new(capacity: usize) -> Self {
        AtomicAppendArray {
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Maximum number of values
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of claimed slots
    pub fn len(&self) -> usize {
        self.next.load(Ordering::Acquire).min(self.slots.len())
    }

    /// Whether no slot has been claimed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pushes attempted, including those that overflowed
    pub fn attempts(&self) -> usize {
        self.next.load(Ordering::Acquire)
    }

    /// Append `value`, returning its slot
    pub fn push(&self, value: T) -> Result<usize> {
        let index = self.next.fetch_add(1, Ordering::AcqRel);
        match self.slots.get(index) {
            Some(slot) => {
                // the slot index is unique to this call, so the cell is unset
                let _ = slot.set(value);
                Ok(index)
            }
            None => Err(ColonyError::CapacityExhausted {
                requested: index + 1,
                capacity: self.slots.len(),
            }),
        }
    }

    /// Value in slot `index`, `None` while the slot is unclaimed or unwritten
    ///
    /// # Panics
    ///
    /// Panics when `index` is not below the capacity.
    pub fn get(&self, index: usize) -> Option<&T> {
        assert!(
            index < self.slots.len(),
            "index {} out of range for append array of capacity {}",
            index,
            self.slots.len()
        );
        self.slots[index].get()
    }

    /// Iterate over written values in slot order
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots[..self.len()].iter().filter_map(OnceLock::get)
    }

    /// Consume the array, keeping written values in slot order
    pub fn into_vec(self) -> Vec<T> {
        let len = self.len();
        self.slots
            .into_vec()
            .into_iter()
            .take(len)
            .filter_map(|mut slot| slot.take())
            .collect()
    }
}

impl<T: Clone> AtomicAppendArray<T> {
    /// Copy of the written values in slot order
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

/// Counters for a [`SynchronizedIntArray`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrayStats {
    /// Values appended
    pub pushes: usize,
    /// Appends that reallocated the backing vector
    pub growth_events: usize,
    /// Largest length observed
    pub peak_len: usize,
}

/// Growable `i32` array appended to under a lock
pub struct SynchronizedIntArray {
    values: Mutex<Vec<i32>>,
    stats: Mutex<ArrayStats>,
}

impl SynchronizedIntArray {
    /// Create an empty array
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty array with room for `capacity` values
    pub fn with_capacity(capacity: usize) -> Self {
        SynchronizedIntArray {
            values: Mutex::new(Vec::with_capacity(capacity)),
            stats: Mutex::new(ArrayStats::default()),
        }
    }

    /// Append one value
    pub fn push(&self, value: i32) {
        self.extend_from_slice(&[value]);
    }

    /// Append several values in one critical section
    pub fn extend_from_slice(&self, values: &[i32]) {
        // LOCK ORDERING: values first, released before stats
        let (grew, len, capacity) = {
            let mut guard = self.values.lock().unwrap_or_else(PoisonError::into_inner);
            let before = guard.capacity();
            guard.extend_from_slice(values);
            (guard.capacity() != before, guard.len(), guard.capacity())
        };

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.pushes += values.len();
        stats.peak_len = stats.peak_len.max(len);
        if grew {
            stats.growth_events += 1;
            debug!(len, capacity, "synchronized int array grew");
        }
    }

    /// Value at `index`
    pub fn get(&self, index: usize) -> Option<i32> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .copied()
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the array holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the values in append order
    pub fn to_vec(&self) -> Vec<i32> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Copy of the values in ascending order
    pub fn to_sorted_vec(&self) -> Vec<i32> {
        let mut values = self.to_vec();
        values.sort_unstable();
        values
    }

    /// Remove every value; statistics are kept
    pub fn clear(&self) {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> ArrayStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Default for SynchronizedIntArray {
    fn default() -> Self {
        Self::new()
    }
}
