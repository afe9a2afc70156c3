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
//! Entity handles
//!
//! An entity is a row id seen through one session. It stores no component
//! data itself; every access goes through the session's cache.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::session::Session;
use crate::store::Row;

/// A `Copy` handle to one row within one session
///
/// Component lookups are idempotent within a session: two `get::<T>()`
/// calls on the same entity return the same instance.
///
/// # Panics
///
/// Component methods panic when the entity is a stub or when the component
/// type has no registered mapper.
#[derive(Clone, Copy)]
pub struct Entity<'s, 'e> {
    session: &'s Session<'e>,
    eix: Option<usize>,
    id: Row,
}

impl<'s, 'e> Entity<'s, 'e> {
    pub(crate) fn new(session: &'s Session<'e>, eix: usize, id: Row) -> Self {
        Entity {
            session,
            eix: Some(eix),
            id,
        }
    }

    pub(crate) fn stub(session: &'s Session<'e>, id: Row) -> Self {
        Entity {
            session,
            eix: None,
            id,
        }
    }

    /// Row id of this entity
    pub fn id(&self) -> Row {
        self.id
    }

    /// Whether this handle carries only an id
    pub fn is_stub(&self) -> bool {
        self.eix.is_none()
    }

    /// The session this handle belongs to
    pub fn session(&self) -> &'s Session<'e> {
        self.session
    }

    fn eix(&self) -> usize {
        match self.eix {
            Some(eix) => eix,
            None => panic!("component access on stub entity {}", self.id),
        }
    }

    /// The `T` component, loading it on first access
    pub fn get<T: 'static>(&self) -> Option<Rc<RefCell<T>>> {
        self.session.component::<T>(self.eix())
    }

    /// Whether the entity carries a `T`, without loading it
    pub fn has<T: 'static>(&self) -> bool {
        self.session.has_component::<T>(self.eix())
    }

    /// Attach `value`, replacing any existing `T`
    pub fn add<T: 'static>(&self, value: T) -> Rc<RefCell<T>> {
        self.session.add_component(self.eix(), value)
    }

    /// Attach a mapper-created default `T`
    pub fn create<T: 'static>(&self) -> Rc<RefCell<T>> {
        self.session.create_component::<T>(self.eix())
    }

    /// Detach the `T` component; returns whether one was present
    pub fn remove<T: 'static>(&self) -> bool {
        self.session.remove_component::<T>(self.eix())
    }
}

impl fmt::Debug for Entity<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("stub", &self.is_stub())
            .finish()
    }
}

impl PartialEq for Entity<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.session, other.session) && self.eix == other.eix && self.id == other.id
    }
}
