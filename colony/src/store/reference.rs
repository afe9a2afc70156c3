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
//! Row-to-row relations over plain int columns
//!
//! A reference stores target row ids in an ordinary column. Unused slots hold
//! [`EMPTY_ID`], which also ends an array reference: for every row,
//! `get_id(row, exact_size(row))` is the sentinel and no slot below
//! `exact_size(row)` is.

use crate::store::attribute::{Attribute, IntAttribute, IntListAttribute, Row, EMPTY_ID};

/// Common surface of single and array references
pub trait Reference {
    /// Id in slot `index` of `row`, [`EMPTY_ID`] past the end
    fn get_id(&self, row: Row, index: usize) -> i32;

    /// Number of leading non-empty slots; scans the row
    fn exact_size(&self, row: Row) -> usize;

    /// Write slot `index` of `row`
    fn set_id(&self, row: Row, index: usize, id: i32);

    /// Resize `row` to hold `size` references
    fn set_size(&self, row: Row, size: usize);
}

/// At most one referenced row per row
#[derive(Debug, Clone, Copy)]
pub struct SingleReference<'s> {
    ids: &'s IntAttribute,
}

impl<'s> SingleReference<'s> {
    /// Wrap an int column
    pub fn new(ids: &'s IntAttribute) -> Self {
        SingleReference { ids }
    }

    /// Referenced row, if any
    pub fn get(&self, row: Row) -> Option<Row> {
        match self.ids.get(row) {
            id if id < 0 => None,
            id => Some(id as Row),
        }
    }

    /// Point `row` at `target`, or clear it
    pub fn set(&self, row: Row, target: Option<Row>) {
        self.ids.set(row, target.map_or(EMPTY_ID, |t| t as i32));
    }
}

impl Reference for SingleReference<'_> {
    fn get_id(&self, row: Row, index: usize) -> i32 {
        if index == 0 {
            self.ids.get(row)
        } else {
            EMPTY_ID
        }
    }

    fn exact_size(&self, row: Row) -> usize {
        usize::from(!self.ids.is_empty(row))
    }

    /// # Panics
    ///
    /// Panics for any index other than 0.
    fn set_id(&self, row: Row, index: usize, id: i32) {
        assert_eq!(index, 0, "single reference has only slot 0");
        self.ids.set(row, id);
    }

    /// # Panics
    ///
    /// Panics unless `size` is 0 or 1.
    fn set_size(&self, row: Row, size: usize) {
        match size {
            0 => self.ids.set_empty(row),
            1 => {}
            _ => panic!("single reference size must be 0 or 1, got {}", size),
        }
    }
}

/// A bounded list of referenced rows per row
#[derive(Debug, Clone, Copy)]
pub struct ArrayReference<'s> {
    lists: &'s IntListAttribute,
    minimum: usize,
    margin: usize,
}

impl<'s> ArrayReference<'s> {
    /// Wrap an int-list column
    pub fn new(lists: &'s IntListAttribute, minimum: usize, margin: usize) -> Self {
        ArrayReference {
            lists,
            minimum,
            margin,
        }
    }

    /// Slots allocated for a row asked to hold `size` references
    pub fn allocation(&self, size: usize) -> usize {
        (size + self.margin).max(self.minimum)
    }

    /// Slots currently allocated for `row`
    pub fn allocated(&self, row: Row) -> usize {
        self.lists.read(row, <[i32]>::len).unwrap_or(0)
    }

    /// Referenced rows of `row` in slot order
    pub fn ids(&self, row: Row) -> Vec<Row> {
        self.lists
            .read(row, |slots| {
                slots
                    .iter()
                    .take_while(|&&id| id != EMPTY_ID)
                    .map(|&id| id as Row)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Append a reference, allocating more slots when full
    pub fn push(&self, row: Row, target: Row) {
        let allocation = self.allocation(self.exact_size(row) + 1);
        self.lists.update(row, |cell| {
            let slots = cell.get_or_insert_with(Vec::new);
            let end = end_of(slots);
            if end == slots.len() {
                slots.resize(allocation.max(end + 1), EMPTY_ID);
            }
            slots[end] = target as i32;
        });
    }

    /// Remove the first reference to `target`, keeping the rest in order
    pub fn remove(&self, row: Row, target: Row) -> bool {
        self.lists.update(row, |cell| {
            let Some(slots) = cell.as_mut() else {
                return false;
            };
            let end = end_of(slots);
            match slots[..end].iter().position(|&id| id == target as i32) {
                Some(position) => {
                    slots.copy_within(position + 1..end, position);
                    slots[end - 1] = EMPTY_ID;
                    true
                }
                None => false,
            }
        })
    }
}

fn end_of(slots: &[i32]) -> usize {
    slots.iter().position(|&id| id == EMPTY_ID).unwrap_or(slots.len())
}

impl Reference for ArrayReference<'_> {
    fn get_id(&self, row: Row, index: usize) -> i32 {
        self.lists
            .read(row, |slots| slots.get(index).copied().unwrap_or(EMPTY_ID))
            .unwrap_or(EMPTY_ID)
    }

    fn exact_size(&self, row: Row) -> usize {
        self.lists.read(row, end_of).unwrap_or(0)
    }

    /// Writing the sentinel truncates the list at `index`.
    ///
    /// # Panics
    ///
    /// Panics when `index` is past the current end of the list.
    fn set_id(&self, row: Row, index: usize, id: i32) {
        let allocation = self.allocation(index + 1);
        self.lists.update(row, |cell| {
            let slots = cell.get_or_insert_with(Vec::new);
            let end = end_of(slots);
            if id == EMPTY_ID {
                slots[index.min(end)..end].fill(EMPTY_ID);
                return;
            }
            assert!(
                index <= end,
                "index {} is past the end {} of the reference list",
                index,
                end
            );
            if index == slots.len() {
                slots.resize(allocation.max(index + 1), EMPTY_ID);
            }
            slots[index] = id;
        });
    }

    fn set_size(&self, row: Row, size: usize) {
        let allocation = self.allocation(size);
        self.lists.update(row, |cell| {
            let slots = cell.get_or_insert_with(Vec::new);
            slots.resize(allocation, EMPTY_ID);
            let keep = size.min(allocation);
            slots[keep..].fill(EMPTY_ID);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_reference() {
        let ids = IntAttribute::new("partner", 4);
        let partner = SingleReference::new(&ids);
        assert_eq!(partner.exact_size(0), 0);
        partner.set(0, Some(3));
        assert_eq!(partner.get(0), Some(3));
        assert_eq!(partner.exact_size(0), 1);
        assert_eq!(partner.get_id(0, 1), EMPTY_ID);
        partner.set_size(0, 0);
        assert_eq!(partner.get(0), None);
    }

    #[test]
    #[should_panic(expected = "must be 0 or 1")]
    fn test_single_reference_rejects_size_two() {
        let ids = IntAttribute::new("partner", 1);
        SingleReference::new(&ids).set_size(0, 2);
    }

    #[test]
    fn test_set_size_allocates_with_margin() {
        let lists = IntListAttribute::new("friends", 2);
        let friends = ArrayReference::new(&lists, 4, 2);
        friends.set_size(0, 1);
        assert_eq!(friends.allocated(0), 4);
        friends.set_size(0, 5);
        assert_eq!(friends.allocated(0), 7);
        assert_eq!(friends.exact_size(0), 0);
    }

    #[test]
    fn test_set_size_preserves_and_truncates() {
        let lists = IntListAttribute::new("friends", 1);
        let friends = ArrayReference::new(&lists, 0, 0);
        for target in [5, 6, 7] {
            friends.push(0, target);
        }
        friends.set_size(0, 5);
        assert_eq!(friends.ids(0), vec![5, 6, 7]);
        friends.set_size(0, 2);
        assert_eq!(friends.ids(0), vec![5, 6]);
        assert_eq!(friends.allocated(0), 2);
    }

    #[test]
    fn test_push_and_remove() {
        let lists = IntListAttribute::new("friends", 1);
        let friends = ArrayReference::new(&lists, 2, 1);
        friends.push(0, 1);
        friends.push(0, 2);
        friends.push(0, 3);
        assert_eq!(friends.ids(0), vec![1, 2, 3]);
        assert!(friends.remove(0, 2));
        assert!(!friends.remove(0, 9));
        assert_eq!(friends.ids(0), vec![1, 3]);
        assert_eq!(friends.get_id(0, 2), EMPTY_ID);
    }

    #[test]
    fn test_set_id_sentinel_truncates() {
        let lists = IntListAttribute::new("friends", 1);
        let friends = ArrayReference::new(&lists, 0, 0);
        friends.set_id(0, 0, 10);
        friends.set_id(0, 1, 11);
        friends.set_id(0, 2, 12);
        friends.set_id(0, 1, EMPTY_ID);
        assert_eq!(friends.ids(0), vec![10]);
    }

    #[test]
    #[should_panic(expected = "past the end")]
    fn test_set_id_past_end_panics() {
        let lists = IntListAttribute::new("friends", 1);
        ArrayReference::new(&lists, 4, 0).set_id(0, 2, 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(u16),
        Remove(u16),
        SetSize(usize),
        SetId(usize, u16),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u16..50).prop_map(Op::Push),
            (0u16..50).prop_map(Op::Remove),
            (0usize..12).prop_map(Op::SetSize),
            (0usize..12, 0u16..50).prop_map(|(i, id)| Op::SetId(i, id)),
        ]
    }

    proptest! {
        #[test]
        fn prop_end_marker_invariant(
            minimum in 0usize..6,
            margin in 0usize..4,
            ops in proptest::collection::vec(op(), 0..40),
        ) {
            let lists = IntListAttribute::new("refs", 1);
            let refs = ArrayReference::new(&lists, minimum, margin);
            for op in ops {
                match op {
                    Op::Push(id) => refs.push(0, id as Row),
                    Op::Remove(id) => { refs.remove(0, id as Row); }
                    Op::SetSize(size) => refs.set_size(0, size),
                    Op::SetId(index, id) => {
                        if index <= refs.exact_size(0) {
                            refs.set_id(0, index, id as i32);
                        }
                    }
                }
                let size = refs.exact_size(0);
                prop_assert_eq!(refs.get_id(0, size), EMPTY_ID);
                for i in 0..size {
                    prop_assert_ne!(refs.get_id(0, i), EMPTY_ID);
                }
                prop_assert_eq!(refs.ids(0).len(), size);
            }
        }
    }
}
