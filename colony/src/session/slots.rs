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
//! Per-type component caches addressed by session-local index

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::mapper::Dao;
use crate::session::Session;
use crate::store::Row;

/// Cache state of one component of one entity
pub(crate) enum Slot<T> {
    /// Not looked at yet
    Unloaded,
    /// Looked at; the row does not carry the component
    Absent,
    /// Materialized instance shared by every lookup in the session
    Loaded(Rc<RefCell<T>>),
    /// Removed during the session
    Removed,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        match self {
            Slot::Unloaded => Slot::Unloaded,
            Slot::Absent => Slot::Absent,
            Slot::Loaded(component) => Slot::Loaded(Rc::clone(component)),
            Slot::Removed => Slot::Removed,
        }
    }
}

/// Type-erased slot table, one per mapper
pub(crate) trait SlotTable {
    /// Write the cached state of every touched entity back to the store
    fn persist(&self, dao: &dyn Dao, session: &Session<'_>, ids: &[Row], created: &[bool]);

    /// Allow downcasting to the typed table
    fn as_any(&self) -> &dyn Any;
}

/// Slots of one component type, indexed by session-local entity index
pub(crate) struct Slots<T> {
    slots: RefCell<Vec<Slot<T>>>,
}

impl<T: 'static> Slots<T> {
    const INITIAL: usize = 16;

    pub(crate) fn new() -> Self {
        Slots {
            slots: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn get(&self, eix: usize) -> Slot<T> {
        self.slots.borrow().get(eix).cloned().unwrap_or(Slot::Unloaded)
    }

    /// Store a slot, doubling the table when `eix` is past its end
    pub(crate) fn set(&self, eix: usize, slot: Slot<T>) {
        let mut slots = self.slots.borrow_mut();
        if eix >= slots.len() {
            let target = (slots.len() * 2).max(Self::INITIAL).max(eix + 1);
            slots.resize_with(target, || Slot::Unloaded);
        }
        slots[eix] = slot;
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.borrow().len()
    }
}

impl<T: 'static> SlotTable for Slots<T> {
    fn persist(&self, dao: &dyn Dao, session: &Session<'_>, ids: &[Row], created: &[bool]) {
        // saving may re-enter the session, so work from a snapshot
        let snapshot: Vec<Slot<T>> = self.slots.borrow().clone();
        let store = session.store();
        for (eix, &row) in ids.iter().enumerate() {
            match snapshot.get(eix).unwrap_or(&Slot::Unloaded) {
                Slot::Unloaded | Slot::Absent => {
                    if created[eix] {
                        dao.erase(store, row);
                    }
                }
                Slot::Removed => dao.erase(store, row),
                Slot::Loaded(component) => {
                    let component = component.borrow();
                    dao.save_erased(session, &*component, row);
                }
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
