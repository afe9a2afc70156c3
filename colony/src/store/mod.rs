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
//! Columnar entity storage
//!
//! A [`Store`] is a named set of [`Attribute`] columns sharing one row space.
//! The logical row count changes only through
//! [`fire_underlying_data_changed`](Store::fire_underlying_data_changed) (bulk
//! loads) or through row acquisition ([`acquire_row`](Store::acquire_row),
//! [`append_row`](Store::append_row)); writing a cell never changes it.
//!
//! Stores nest: a sub-store has its own row space but shares the name
//! registry of its root, so every attribute, sub-store and join name is
//! unique across the whole tree.

pub mod attribute;
pub mod concurrent;
pub mod reference;
pub mod schema;

pub use attribute::{
    decode_base36, encode_base36, Attribute, AttributeKind, BoolAttribute, ByteAttribute,
    DoubleAttribute, EntityAttribute, EntityListAttribute, EnumAttribute, EnumValue,
    FloatAttribute, IntAttribute, IntListAttribute, Row, ShortAttribute, StringAttribute,
    TypedAttribute, EMPTY_ID,
};
pub use concurrent::{ArrayStats, AtomicAppendArray, SynchronizedIntArray};
pub use reference::{ArrayReference, Reference, SingleReference};
pub use schema::{Declaration, JoinKind, StoreSchema};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::{ColonyError, Result};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Observer of bulk row-count changes
pub trait StoreListener: Send + Sync {
    /// Rows `[from, to)` of `store` were written externally
    fn data_changed(&self, store: &str, from: Row, to: Row);
}

/// A recorded join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    /// Join name, also the name of its hidden column
    pub name: String,
    /// Sub-store whose rows are referenced, `None` for the root
    pub target: Option<String>,
    /// Single or array join
    pub kind: JoinKind,
}

/// Typed, kind-checked pointer to one column of a store tree
///
/// Handles are resolved with [`Store::column`] on the store they came from
/// or on any ancestor of it.
pub struct AttributeHandle<A> {
    store: u64,
    index: usize,
    _marker: PhantomData<fn() -> A>,
}

impl<A> Clone for AttributeHandle<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for AttributeHandle<A> {}

impl<A> fmt::Debug for AttributeHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeHandle")
            .field("store", &self.store)
            .field("index", &self.index)
            .finish()
    }
}

/// A named collection of columns sharing one row counter
pub struct Store {
    id: u64,
    name: String,
    attributes: Vec<Box<dyn Attribute>>,
    hidden: Vec<bool>,
    by_name: HashMap<String, usize>,
    substores: Vec<Store>,
    joins: Vec<JoinSpec>,
    names: Arc<Mutex<HashSet<String>>>,
    listeners: Vec<Arc<dyn StoreListener>>,
    count: AtomicUsize,
    capacity: usize,
}

impl Store {
    /// Create an empty root store with room for `capacity` rows
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self::with_names(name.into(), capacity, Arc::new(Mutex::new(HashSet::new())))
    }

    fn with_names(name: String, capacity: usize, names: Arc<Mutex<HashSet<String>>>) -> Self {
        Store {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            name,
            attributes: Vec::new(),
            hidden: Vec::new(),
            by_name: HashMap::new(),
            substores: Vec::new(),
            joins: Vec::new(),
            names,
            listeners: Vec::new(),
            count: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Store name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical number of rows
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Number of rows every column can hold without growing
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn reserve_name(&self, name: &str) -> Result<()> {
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        if !names.insert(name.to_string()) {
            return Err(ColonyError::DuplicateAttribute(name.to_string()));
        }
        Ok(())
    }

    fn insert<A: TypedAttribute>(&mut self, attribute: A, hidden: bool) -> Result<AttributeHandle<A>> {
        let name = attribute.name().to_string();
        self.reserve_name(&name)?;
        let index = self.attributes.len();
        debug!(store = %self.name, attribute = %name, kind = ?A::KIND, hidden, "adding attribute");
        self.attributes.push(Box::new(attribute));
        self.hidden.push(hidden);
        self.by_name.insert(name, index);
        Ok(AttributeHandle {
            store: self.id,
            index,
            _marker: PhantomData,
        })
    }

    /// Add an `i32` column
    pub fn add_int(&mut self, name: &str) -> Result<AttributeHandle<IntAttribute>> {
        self.insert(IntAttribute::new(name, self.capacity), false)
    }

    /// Add an `i16` column
    pub fn add_short(&mut self, name: &str) -> Result<AttributeHandle<ShortAttribute>> {
        self.insert(ShortAttribute::new(name, self.capacity), false)
    }

    /// Add an `i8` column
    pub fn add_byte(&mut self, name: &str) -> Result<AttributeHandle<ByteAttribute>> {
        self.insert(ByteAttribute::new(name, self.capacity), false)
    }

    /// Add a boolean column
    pub fn add_bool(&mut self, name: &str) -> Result<AttributeHandle<BoolAttribute>> {
        self.insert(BoolAttribute::new(name, self.capacity), false)
    }

    /// Add an `f32` column
    pub fn add_float(&mut self, name: &str) -> Result<AttributeHandle<FloatAttribute>> {
        self.insert(FloatAttribute::new(name, self.capacity), false)
    }

    /// Add an `f64` column
    pub fn add_double(&mut self, name: &str) -> Result<AttributeHandle<DoubleAttribute>> {
        self.insert(DoubleAttribute::new(name, self.capacity), false)
    }

    /// Add a string column
    pub fn add_string(&mut self, name: &str) -> Result<AttributeHandle<StringAttribute>> {
        self.insert(StringAttribute::new(name, self.capacity), false)
    }

    /// Add an enum column with the given variant names
    pub fn add_enum(
        &mut self,
        name: &str,
        variants: &[impl AsRef<str>],
    ) -> Result<AttributeHandle<EnumAttribute>> {
        self.insert(EnumAttribute::new(name, variants, self.capacity), false)
    }

    /// Add an entity-reference column
    pub fn add_entity(&mut self, name: &str) -> Result<AttributeHandle<EntityAttribute>> {
        self.insert(EntityAttribute::new(name, self.capacity), false)
    }

    /// Add an int-list column
    pub fn add_int_list(&mut self, name: &str) -> Result<AttributeHandle<IntListAttribute>> {
        self.insert(IntListAttribute::new(name, self.capacity), false)
    }

    /// Add an entity-list column
    pub fn add_entity_list(&mut self, name: &str) -> Result<AttributeHandle<EntityListAttribute>> {
        self.insert(EntityListAttribute::new(name, self.capacity), false)
    }

    /// Add an internal column, excluded from [`visible_attributes`](Store::visible_attributes)
    ///
    /// The attribute is resized to the store's capacity.
    pub fn add_hidden<A: TypedAttribute>(&mut self, mut attribute: A) -> Result<AttributeHandle<A>> {
        attribute.ensure_capacity(self.capacity);
        self.insert(attribute, true)
    }

    fn add_kind(&mut self, name: &str, kind: AttributeKind, variants: &[String]) -> Result<()> {
        match kind {
            AttributeKind::Int => self.add_int(name).map(drop),
            AttributeKind::Short => self.add_short(name).map(drop),
            AttributeKind::Byte => self.add_byte(name).map(drop),
            AttributeKind::Bool => self.add_bool(name).map(drop),
            AttributeKind::Float => self.add_float(name).map(drop),
            AttributeKind::Double => self.add_double(name).map(drop),
            AttributeKind::String => self.add_string(name).map(drop),
            AttributeKind::Enum => self.add_enum(name, variants).map(drop),
            AttributeKind::Entity => self.add_entity(name).map(drop),
            AttributeKind::IntList => self.add_int_list(name).map(drop),
            AttributeKind::EntityList => self.add_entity_list(name).map(drop),
        }
    }

    /// Column by name, searching this store only
    pub fn get(&self, name: &str) -> Option<&dyn Attribute> {
        self.by_name.get(name).map(|&i| self.attributes[i].as_ref())
    }

    /// Typed column by name; `None` when absent or of another type
    pub fn get_as<A: TypedAttribute>(&self, name: &str) -> Option<&A> {
        self.get(name)?.as_any().downcast_ref::<A>()
    }

    /// Typed column by name, with a schema error when absent or mismatched
    pub fn require<A: TypedAttribute>(&self, name: &str) -> Result<&A> {
        let handle = self.handle::<A>(name)?;
        Ok(self.column(&handle))
    }

    /// Kind-checked handle to a column of this store
    pub fn handle<A: TypedAttribute>(&self, name: &str) -> Result<AttributeHandle<A>> {
        let index = *self.by_name.get(name).ok_or_else(|| ColonyError::MissingAttribute {
            store: self.name.clone(),
            name: name.to_string(),
        })?;
        let actual = self.attributes[index].kind();
        if actual != A::KIND || self.attributes[index].as_any().downcast_ref::<A>().is_none() {
            return Err(ColonyError::AttributeKindMismatch {
                name: name.to_string(),
                expected: A::KIND,
                actual,
            });
        }
        Ok(AttributeHandle {
            store: self.id,
            index,
            _marker: PhantomData,
        })
    }

    /// Resolve a handle obtained from this store or one of its sub-stores
    ///
    /// # Panics
    ///
    /// Panics when the handle belongs to an unrelated store.
    pub fn column<A: TypedAttribute>(&self, handle: &AttributeHandle<A>) -> &A {
        let owner = self.owner_of(handle.store).unwrap_or_else(|| {
            panic!("attribute handle does not belong to store '{}'", self.name)
        });
        match owner.attributes[handle.index].as_any().downcast_ref::<A>() {
            Some(column) => column,
            None => panic!("attribute handle does not match the column type in store '{}'", owner.name),
        }
    }

    fn owner_of(&self, id: u64) -> Option<&Store> {
        if self.id == id {
            return Some(self);
        }
        self.substores.iter().find_map(|s| s.owner_of(id))
    }

    /// Every column, hidden ones included, in insertion order
    pub fn attributes(&self) -> impl Iterator<Item = &dyn Attribute> + '_ {
        self.attributes.iter().map(|a| a.as_ref())
    }

    /// Non-hidden columns in insertion order
    pub fn visible_attributes(&self) -> impl Iterator<Item = &dyn Attribute> + '_ {
        self.attributes
            .iter()
            .zip(&self.hidden)
            .filter(|(_, &hidden)| !hidden)
            .map(|(a, _)| a.as_ref())
    }

    /// Whether the named column is internal
    pub fn is_hidden(&self, name: &str) -> bool {
        self.by_name.get(name).is_some_and(|&i| self.hidden[i])
    }

    /// Grow every column to hold at least `capacity` rows
    ///
    /// Idempotent and monotonic; capacity never shrinks.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }
        let target = attribute::grown_capacity(self.capacity, capacity);
        debug!(store = %self.name, from = self.capacity, to = target, "growing store");
        for attribute in &mut self.attributes {
            attribute.ensure_capacity(target);
        }
        self.capacity = target;
    }

    /// Make room for `additional` rows beyond the current count
    pub fn reserve(&mut self, additional: usize) {
        let needed = self.count() + additional;
        self.ensure_capacity(needed);
    }

    /// Register an observer of bulk data changes
    pub fn add_listener(&mut self, listener: Arc<dyn StoreListener>) {
        self.listeners.push(listener);
    }

    /// Announce that rows `[from, to)` were written externally
    ///
    /// Raises the count to `to` when it is lower, then notifies listeners.
    ///
    /// # Panics
    ///
    /// Panics when `to` exceeds the capacity of the store.
    pub fn fire_underlying_data_changed(&self, from: Row, to: Row) {
        assert!(
            to <= self.capacity,
            "rows up to {} were written but store '{}' holds only {}",
            to,
            self.name,
            self.capacity
        );
        self.count.fetch_max(to, Ordering::AcqRel);
        debug!(store = %self.name, from, to, "underlying data changed");
        for listener in &self.listeners {
            listener.data_changed(&self.name, from, to);
        }
    }

    /// Claim the next row within the reserved capacity
    ///
    /// Safe to call from many threads. Never grows the store: running out of
    /// capacity is an error.
    pub fn acquire_row(&self) -> Result<Row> {
        let capacity = self.capacity;
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < capacity).then_some(count + 1)
            })
            .map_err(|count| ColonyError::CapacityExhausted {
                requested: count + 1,
                capacity,
            })
    }

    /// Append one row, growing the store when full
    pub fn append_row(&mut self) -> Row {
        let row = self.count();
        self.ensure_capacity(row + 1);
        *self.count.get_mut() = row + 1;
        row
    }

    /// Add a sub-store with its own row space
    pub fn add_substore(&mut self, name: &str) -> Result<&mut Store> {
        self.reserve_name(name)?;
        debug!(store = %self.name, substore = %name, "adding sub-store");
        let store = Store::with_names(name.to_string(), self.capacity, Arc::clone(&self.names));
        self.substores.push(store);
        let last = self.substores.len() - 1;
        Ok(&mut self.substores[last])
    }

    /// Sub-store by name
    pub fn substore(&self, name: &str) -> Result<&Store> {
        self.substores
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ColonyError::UnknownSubstore(name.to_string()))
    }

    /// Mutable sub-store by name
    pub fn substore_mut(&mut self, name: &str) -> Result<&mut Store> {
        self.substores
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| ColonyError::UnknownSubstore(name.to_string()))
    }

    /// All sub-stores in insertion order
    pub fn substores(&self) -> impl Iterator<Item = &Store> + '_ {
        self.substores.iter()
    }

    fn check_join_target(&self, name: &str, target: Option<&str>) -> Result<()> {
        match target {
            Some(t) if self.substore(t).is_err() => Err(ColonyError::InvalidJoin {
                name: name.to_string(),
                reason: format!("target sub-store '{}' does not exist", t),
            }),
            _ => Ok(()),
        }
    }

    /// Relate each row to at most one row of `target`
    pub fn add_single_join(&mut self, name: &str, target: Option<&str>) -> Result<()> {
        self.check_join_target(name, target)?;
        self.add_hidden(IntAttribute::new(name, self.capacity))?;
        self.joins.push(JoinSpec {
            name: name.to_string(),
            target: target.map(str::to_string),
            kind: JoinKind::Single,
        });
        Ok(())
    }

    /// Relate each row to a bounded list of rows of `target`
    pub fn add_array_join(
        &mut self,
        name: &str,
        target: Option<&str>,
        minimum: usize,
        margin: usize,
    ) -> Result<()> {
        self.check_join_target(name, target)?;
        self.add_hidden(IntListAttribute::new(name, self.capacity))?;
        self.joins.push(JoinSpec {
            name: name.to_string(),
            target: target.map(str::to_string),
            kind: JoinKind::Array { minimum, margin },
        });
        Ok(())
    }

    /// Recorded joins
    pub fn joins(&self) -> &[JoinSpec] {
        &self.joins
    }

    fn join(&self, name: &str) -> Result<&JoinSpec> {
        self.joins.iter().find(|j| j.name == name).ok_or_else(|| ColonyError::InvalidJoin {
            name: name.to_string(),
            reason: format!("no such join in store '{}'", self.name),
        })
    }

    /// View of a single join
    pub fn single_reference(&self, name: &str) -> Result<SingleReference<'_>> {
        match self.join(name)?.kind {
            JoinKind::Single => Ok(SingleReference::new(self.require::<IntAttribute>(name)?)),
            JoinKind::Array { .. } => Err(ColonyError::InvalidJoin {
                name: name.to_string(),
                reason: "join is an array join".to_string(),
            }),
        }
    }

    /// View of an array join
    pub fn array_reference(&self, name: &str) -> Result<ArrayReference<'_>> {
        match self.join(name)?.kind {
            JoinKind::Array { minimum, margin } => Ok(ArrayReference::new(
                self.require::<IntListAttribute>(name)?,
                minimum,
                margin,
            )),
            JoinKind::Single => Err(ColonyError::InvalidJoin {
                name: name.to_string(),
                reason: "join is a single join".to_string(),
            }),
        }
    }

    /// Materialize a schema, skipping declarations that already exist
    ///
    /// Fails when an existing column or join has a conflicting kind.
    pub fn apply_schema(&mut self, schema: &StoreSchema) -> Result<()> {
        for declaration in schema.declarations() {
            match declaration {
                Declaration::Attribute {
                    substore,
                    name,
                    kind,
                    variants,
                } => {
                    let store = match substore {
                        Some(s) => self.substore_or_create(s)?,
                        None => &mut *self,
                    };
                    store.apply_attribute(name, *kind, variants)?;
                }
                Declaration::Substore(name) => {
                    self.substore_or_create(name)?;
                }
                Declaration::Join { name, target, kind } => {
                    self.apply_join(name, target.as_deref(), *kind)?;
                }
            }
        }
        Ok(())
    }

    fn substore_or_create(&mut self, name: &str) -> Result<&mut Store> {
        if self.substore(name).is_ok() {
            self.substore_mut(name)
        } else {
            self.add_substore(name)
        }
    }

    fn apply_attribute(&mut self, name: &str, kind: AttributeKind, variants: &[String]) -> Result<()> {
        match self.get(name) {
            Some(existing) if existing.kind() == kind => {
                match existing.as_any().downcast_ref::<EnumAttribute>() {
                    Some(column) if column.names() != variants => Err(ColonyError::EnumVariantMismatch {
                        name: name.to_string(),
                        expected: variants.to_vec(),
                        actual: column.names().to_vec(),
                    }),
                    _ => Ok(()),
                }
            }
            Some(existing) => Err(ColonyError::AttributeKindMismatch {
                name: name.to_string(),
                expected: kind,
                actual: existing.kind(),
            }),
            None => self.add_kind(name, kind, variants),
        }
    }

    fn apply_join(&mut self, name: &str, target: Option<&str>, kind: JoinKind) -> Result<()> {
        if let Some(existing) = self.joins.iter().find(|j| j.name == name) {
            if existing.kind == kind && existing.target.as_deref() == target {
                return Ok(());
            }
            return Err(ColonyError::InvalidJoin {
                name: name.to_string(),
                reason: "declared twice with different shapes".to_string(),
            });
        }
        match kind {
            JoinKind::Single => self.add_single_join(name, target),
            JoinKind::Array { minimum, margin } => self.add_array_join(name, target, minimum, margin),
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("count", &self.count())
            .field("capacity", &self.capacity)
            .field("attributes", &self.attributes)
            .field("substores", &self.substores)
            .field("joins", &self.joins)
            .finish()
    }
}
