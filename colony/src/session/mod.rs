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
//! Sessions: per-pass component caches
//!
//! A [`Session`] is one unit of work over the store. It hands out
//! [`Entity`] handles, materializes components lazily on first access and
//! writes them back on [`persist`](Session::persist).
//!
//! Each entity touched in a session gets a dense session-local index (its
//! `eix`), distinct from its row id. Per-type slot tables are indexed by
//! `eix`, so a session only allocates for the entities it actually visits.
//!
//! Sessions are neither `Send` nor `Sync`: a session belongs to exactly one
//! chunk or one ad hoc operation on one thread.

mod entity;
mod slots;

pub use entity::Entity;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::engine::Engine;
use crate::error::Result;
use crate::mapper::{ComponentType, Dao};
use crate::store::{Row, Store};
use slots::{Slot, SlotTable, Slots};

/// How a session maps row ids to entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// One entity and one cache slot per row id
    #[default]
    Normal,
    /// Every lookup yields a fresh entity with its own cache slot
    DetachedEntities,
    /// Entities carry only their id; component access panics
    StubEntities,
}

/// Which mappers [`Session::persist`] writes back
#[derive(Debug, Clone, PartialEq, Eq)]
enum Persisting {
    All,
    Exactly(Vec<usize>),
}

/// A bounded-lifetime cache translating row ids to live components
pub struct Session<'e> {
    engine: &'e Engine,
    mode: SessionMode,
    owner_id: Cell<u64>,
    ids: RefCell<Vec<Row>>,
    created: RefCell<Vec<bool>>,
    identity: RefCell<HashMap<Row, usize>>,
    tables: RefCell<Vec<Option<Rc<dyn SlotTable>>>>,
    persisting: RefCell<Persisting>,
}

impl<'e> Session<'e> {
    pub(crate) fn new(engine: &'e Engine, mode: SessionMode) -> Self {
        Session {
            engine,
            mode,
            owner_id: Cell::new(0),
            ids: RefCell::new(Vec::new()),
            created: RefCell::new(Vec::new()),
            identity: RefCell::new(HashMap::new()),
            tables: RefCell::new(Vec::new()),
            persisting: RefCell::new(Persisting::All),
        }
    }

    /// The engine this session reads from
    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// The root store
    pub fn store(&self) -> &'e Store {
        self.engine.store()
    }

    /// Entity mapping mode
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Namespace seed for ids minted during this session
    pub fn owner_id(&self) -> u64 {
        self.owner_id.get()
    }

    /// Set the namespace seed; schedulers use `chunk_id + 1`
    pub fn set_owner_id(&self, owner_id: u64) {
        self.owner_id.set(owner_id);
    }

    /// Number of entities touched so far
    pub fn len(&self) -> usize {
        self.ids.borrow().len()
    }

    /// Whether no entity has been touched
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle for row `id`
    ///
    /// In [`SessionMode::Normal`] repeated calls return handles sharing one
    /// cache; in [`SessionMode::DetachedEntities`] every call gets its own.
    pub fn entity(&self, id: Row) -> Entity<'_, 'e> {
        match self.mode {
            SessionMode::StubEntities => Entity::stub(self, id),
            SessionMode::DetachedEntities => Entity::new(self, self.track(id, false), id),
            SessionMode::Normal => {
                let known = self.identity.borrow().get(&id).copied();
                let eix = known.unwrap_or_else(|| self.track(id, false));
                Entity::new(self, eix, id)
            }
        }
    }

    /// Create an entity on a freshly acquired row
    ///
    /// The row comes from the store's atomic counter and must already be
    /// reserved; see [`Engine::reserve`].
    pub fn create_entity(&self) -> Result<Entity<'_, 'e>> {
        let id = self.store().acquire_row()?;
        trace!(row = id, owner = self.owner_id(), "created entity");
        Ok(Entity::new(self, self.track(id, true), id))
    }

    fn track(&self, id: Row, created: bool) -> usize {
        let mut ids = self.ids.borrow_mut();
        let eix = ids.len();
        ids.push(id);
        self.created.borrow_mut().push(created);
        if self.mode == SessionMode::Normal {
            self.identity.borrow_mut().insert(id, eix);
        }
        eix
    }

    /// Write back every mapper on the next [`persist`](Session::persist)
    pub fn persisting_all(&self) {
        *self.persisting.borrow_mut() = Persisting::All;
    }

    /// Write back only the given component types
    ///
    /// # Errors
    ///
    /// Fails when a type has no registered mapper.
    pub fn persisting_exactly(&self, types: &[ComponentType]) -> Result<()> {
        let mappers = self.engine.mappers();
        let indices = types
            .iter()
            .map(|&t| mappers.index_of_type(t))
            .collect::<Result<Vec<_>>>()?;
        *self.persisting.borrow_mut() = Persisting::Exactly(indices);
        Ok(())
    }

    /// Write back only `T`
    pub fn persisting_only<T: 'static>(&self) -> Result<()> {
        self.persisting_exactly(&[ComponentType::of::<T>()])
    }

    fn persists(&self, index: usize) -> bool {
        match &*self.persisting.borrow() {
            Persisting::All => true,
            Persisting::Exactly(indices) => indices.contains(&index),
        }
    }

    /// Write cached state back to the store
    ///
    /// For each persisted mapper and touched entity:
    /// - a loaded component is saved
    /// - a removed component is erased
    /// - an untouched or absent component is erased on rows created in
    ///   this session and left alone otherwise
    pub fn persist(&self) {
        let ids = self.ids.borrow().clone();
        let created = self.created.borrow().clone();
        let tables = self.tables.borrow().clone();
        let mappers = self.engine.mappers();
        let store = self.store();

        for index in (0..mappers.len()).filter(|&i| self.persists(i)) {
            let dao = mappers.dao(index);
            match tables.get(index).and_then(Option::as_ref) {
                Some(table) => table.persist(dao, self, &ids, &created),
                None => {
                    for (eix, &row) in ids.iter().enumerate() {
                        if created[eix] {
                            dao.erase(store, row);
                        }
                    }
                }
            }
        }
        trace!(entities = ids.len(), owner = self.owner_id(), "session persisted");
    }

    /// Drop every cached entity and component
    ///
    /// Session-local indices restart from zero, so clearing needs exclusive
    /// access and every [`Entity`] handed out earlier must be gone:
    ///
    /// ```compile_fail
    /// # use colony::{Engine, EngineConfig};
    /// let engine = Engine::new(EngineConfig::default()).unwrap();
    /// let mut session = engine.session();
    /// let stale = session.entity(0);
    /// session.clear();
    /// stale.id();
    /// ```
    ///
    /// Component handles obtained earlier stay valid but are no longer
    /// written back.
    pub fn clear(&mut self) {
        self.ids.borrow_mut().clear();
        self.created.borrow_mut().clear();
        self.identity.borrow_mut().clear();
        self.tables.borrow_mut().clear();
    }

    /// Persist, then clear
    pub fn close(mut self) {
        self.persist();
        self.clear();
    }

    /// Load a component of `row` without caching it
    ///
    /// Nested data is stubbed through [`Mapper::stub_entities`](crate::mapper::Mapper::stub_entities).
    /// Works in every mode.
    ///
    /// # Panics
    ///
    /// Panics when `T` has no registered mapper.
    pub fn peek<T: 'static>(&self, row: Row) -> Option<T> {
        let index = self.index_of::<T>();
        let dao = self.engine.mappers().dao(index);
        if !dao.is_present(self.store(), row) {
            return None;
        }
        let mut component = self.load_boxed::<T>(dao, row);
        dao.stub_erased(&mut component as &mut dyn Any);
        Some(component)
    }

    fn index_of<T: 'static>(&self) -> usize {
        match self.engine.mappers().index_of::<T>() {
            Ok(index) => index,
            Err(err) => panic!("{}", err),
        }
    }

    fn load_boxed<T: 'static>(&self, dao: &dyn Dao, row: Row) -> T {
        match dao.load_erased(self, row).downcast::<T>() {
            Ok(component) => *component,
            Err(_) => panic!("mapper '{}' loaded a component of another type", dao.name()),
        }
    }

    fn table(&self, index: usize, make: impl FnOnce() -> Rc<dyn SlotTable>) -> Rc<dyn SlotTable> {
        let mut tables = self.tables.borrow_mut();
        if tables.len() <= index {
            tables.resize_with(index + 1, || None);
        }
        Rc::clone(tables[index].get_or_insert_with(make))
    }

    fn with_slots<T: 'static, R>(&self, index: usize, f: impl FnOnce(&Slots<T>) -> R) -> R {
        let table = self.table(index, || Rc::new(Slots::<T>::new()));
        match table.as_any().downcast_ref::<Slots<T>>() {
            Some(slots) => f(slots),
            None => panic!("slot table {} holds another component type", index),
        }
    }

    fn row(&self, eix: usize) -> Row {
        self.ids.borrow()[eix]
    }

    fn is_created(&self, eix: usize) -> bool {
        self.created.borrow()[eix]
    }

    pub(crate) fn component<T: 'static>(&self, eix: usize) -> Option<Rc<RefCell<T>>> {
        let index = self.index_of::<T>();
        match self.with_slots::<T, _>(index, |s| s.get(eix)) {
            Slot::Loaded(component) => Some(component),
            Slot::Absent | Slot::Removed => None,
            Slot::Unloaded => {
                let row = self.row(eix);
                let dao = self.engine.mappers().dao(index);
                let loaded = if self.is_created(eix) || !dao.is_present(self.store(), row) {
                    None
                } else {
                    Some(Rc::new(RefCell::new(self.load_boxed::<T>(dao, row))))
                };
                let slot = loaded.clone().map_or(Slot::Absent, Slot::Loaded);
                self.with_slots::<T, _>(index, |s| s.set(eix, slot));
                loaded
            }
        }
    }

    pub(crate) fn has_component<T: 'static>(&self, eix: usize) -> bool {
        let index = self.index_of::<T>();
        match self.with_slots::<T, _>(index, |s| s.get(eix)) {
            Slot::Loaded(_) => true,
            Slot::Absent | Slot::Removed => false,
            Slot::Unloaded => {
                !self.is_created(eix)
                    && self.engine.mappers().dao(index).is_present(self.store(), self.row(eix))
            }
        }
    }

    pub(crate) fn add_component<T: 'static>(&self, eix: usize, value: T) -> Rc<RefCell<T>> {
        let index = self.index_of::<T>();
        let component = Rc::new(RefCell::new(value));
        let slot = Slot::Loaded(Rc::clone(&component));
        self.with_slots::<T, _>(index, |s| s.set(eix, slot));
        component
    }

    pub(crate) fn create_component<T: 'static>(&self, eix: usize) -> Rc<RefCell<T>> {
        let index = self.index_of::<T>();
        let dao = self.engine.mappers().dao(index);
        match dao.create_erased().downcast::<T>() {
            Ok(value) => self.add_component(eix, *value),
            Err(_) => panic!("mapper '{}' created a component of another type", dao.name()),
        }
    }

    pub(crate) fn remove_component<T: 'static>(&self, eix: usize) -> bool {
        let had = self.has_component::<T>(eix);
        let index = self.index_of::<T>();
        self.with_slots::<T, _>(index, |s| s.set(eix, Slot::Removed));
        had
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("owner_id", &self.owner_id.get())
            .field("entities", &self.len())
            .finish()
    }
}
