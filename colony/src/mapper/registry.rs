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
//! Static dispatch table from component types to mappers
//!
//! Mappers are registered once during engine setup. Each gets a dense index
//! that sessions use to address their per-type slot tables, so lookups on
//! the hot path are a `TypeId` hash followed by a vector index.

use std::any::TypeId;
use std::collections::HashMap;

use semver::Version;
use tracing::{debug, info};

use crate::error::{ColonyError, Result};
use crate::mapper::api::{ComponentType, Dao, LifecycleEvent, MAPPER_API_VERSION};
use crate::store::{Store, StoreSchema};

/// Registered mappers indexed by component type
///
/// # Thread Safety
///
/// The set is Send + Sync and is shared by every worker during a parallel
/// pass. Registration needs `&mut self` and therefore happens during setup.
#[derive(Default)]
pub struct MapperSet {
    daos: Vec<Box<dyn Dao>>,
    by_type: HashMap<TypeId, usize>,
    by_name: HashMap<String, usize>,
}

impl MapperSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapper and, after it, its child mappers
    ///
    /// # Returns
    ///
    /// The index of `dao`, or an error if:
    /// - A mapper with the same name or component type is already registered
    /// - The mapper API version is incompatible
    pub fn register(&mut self, dao: Box<dyn Dao>) -> Result<usize> {
        let name = dao.name().to_string();
        let component = dao.component_type();

        if self.by_name.contains_key(&name) || self.by_type.contains_key(&component.id()) {
            return Err(ColonyError::DuplicateMapper(name));
        }

        if !is_version_compatible(dao.api_version(), MAPPER_API_VERSION) {
            return Err(ColonyError::IncompatibleMapper {
                name,
                version: dao.api_version().to_string(),
                engine: MAPPER_API_VERSION.to_string(),
            });
        }

        let children = dao.child_daos();
        let index = self.daos.len();
        debug!(mapper = %name, component = component.name(), index, "registering mapper");
        self.by_type.insert(component.id(), index);
        self.by_name.insert(name, index);
        self.daos.push(dao);

        for child in children {
            if let Err(err) = self.register(child) {
                self.truncate(index);
                return Err(err);
            }
        }
        Ok(index)
    }

    /// Apply the schema of mappers `start..` to `store`, then attach them
    pub fn configure(&mut self, store: &mut Store, start: usize) -> Result<()> {
        let mut schema = StoreSchema::new();
        for dao in &self.daos[start..] {
            dao.configure_store(&mut schema);
        }
        store.apply_schema(&schema)?;

        for dao in &mut self.daos[start..] {
            dao.attach_store(store)?;
        }
        info!(
            store = store.name(),
            mappers = self.daos.len() - start,
            "mappers attached"
        );
        Ok(())
    }

    /// Drop every mapper from `len` onwards
    pub(crate) fn truncate(&mut self, len: usize) {
        for dao in self.daos.drain(len..) {
            self.by_type.remove(&dao.component_type().id());
            self.by_name.remove(dao.name());
        }
    }

    /// Index of the mapper for `T`
    pub fn index_of<T: 'static>(&self) -> Result<usize> {
        self.index_of_type(ComponentType::of::<T>())
    }

    /// Index of the mapper for a component type token
    pub fn index_of_type(&self, component: ComponentType) -> Result<usize> {
        self.by_type
            .get(&component.id())
            .copied()
            .ok_or(ColonyError::NoMapper(component.name()))
    }

    /// Index of the mapper with the given name
    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Mapper at `index`
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range.
    pub fn dao(&self, index: usize) -> &dyn Dao {
        self.daos[index].as_ref()
    }

    /// Every mapper in registration order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Dao> + '_ {
        self.daos.iter().map(|d| d.as_ref())
    }

    /// Send `event` to every mapper in registration order
    pub fn broadcast(&self, event: LifecycleEvent) {
        debug!(?event, mappers = self.daos.len(), "broadcasting lifecycle event");
        for dao in &self.daos {
            dao.on_lifecycle(event);
        }
    }

    /// Number of registered mappers
    pub fn len(&self) -> usize {
        self.daos.len()
    }

    /// Whether no mapper is registered
    pub fn is_empty(&self) -> bool {
        self.daos.is_empty()
    }

    /// Mapper names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.daos.iter().map(|d| d.name()).collect()
    }
}

/// Check if a mapper API version is compatible with the engine API version
///
/// Majors must match. Past 1.0 the mapper's minor must not exceed the
/// engine's; before 1.0 minors must match exactly.
fn is_version_compatible(mapper_version: &str, engine_version: &str) -> bool {
    let (Ok(mapper), Ok(engine)) = (Version::parse(mapper_version), Version::parse(engine_version))
    else {
        return false;
    };

    if mapper.major != engine.major {
        return false;
    }
    if mapper.major != 0 {
        mapper.minor <= engine.minor
    } else {
        mapper.minor == engine.minor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::Mapper;
    use crate::session::Session;
    use crate::store::{AttributeKind, IntAttribute, Row};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Count(i32);
    struct Child;

    #[derive(Default)]
    struct CountMapper {
        version: Option<&'static str>,
        with_child: bool,
        events: Arc<AtomicUsize>,
        attached: bool,
    }

    impl Mapper for CountMapper {
        type Component = Count;

        fn name(&self) -> &str {
            "count"
        }

        fn api_version(&self) -> &str {
            self.version.unwrap_or(MAPPER_API_VERSION)
        }

        fn configure_store(&self, schema: &mut StoreSchema) {
            schema.attribute("count", AttributeKind::Int);
        }

        fn attach_store(&mut self, store: &Store) -> Result<()> {
            store.require::<IntAttribute>("count")?;
            self.attached = true;
            Ok(())
        }

        fn is_present(&self, _store: &Store, _row: Row) -> bool {
            true
        }

        fn create(&self) -> Count {
            Count(0)
        }

        fn load(&self, _session: &Session<'_>, _component: &mut Count, _row: Row) {}

        fn save(&self, _session: &Session<'_>, _component: &Count, _row: Row) {}

        fn erase(&self, _store: &Store, _row: Row) {}

        fn child_daos(&self) -> Vec<Box<dyn Dao>> {
            if self.with_child {
                vec![Box::new(ChildMapper)]
            } else {
                Vec::new()
            }
        }

        fn on_lifecycle(&self, _event: LifecycleEvent) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ChildMapper;

    impl Mapper for ChildMapper {
        type Component = Child;

        fn name(&self) -> &str {
            "child"
        }

        fn configure_store(&self, schema: &mut StoreSchema) {
            schema.substore_attribute("children", "weight", AttributeKind::Double);
        }

        fn attach_store(&mut self, store: &Store) -> Result<()> {
            store.substore("children")?;
            Ok(())
        }

        fn is_present(&self, _store: &Store, _row: Row) -> bool {
            false
        }

        fn create(&self) -> Child {
            Child
        }

        fn load(&self, _session: &Session<'_>, _component: &mut Child, _row: Row) {}

        fn save(&self, _session: &Session<'_>, _component: &Child, _row: Row) {}

        fn erase(&self, _store: &Store, _row: Row) {}
    }

    #[test]
    fn test_version_compatibility() {
        assert!(is_version_compatible("0.1.0", "0.1.0"));
        assert!(is_version_compatible("0.1.3", "0.1.0"));
        assert!(!is_version_compatible("0.2.0", "0.1.0"));
        assert!(is_version_compatible("1.1.0", "1.2.0"));
        assert!(!is_version_compatible("1.3.0", "1.2.0"));
        assert!(!is_version_compatible("2.0.0", "1.0.0"));
        assert!(!is_version_compatible("not-a-version", "0.1.0"));
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_versions() {
        let mut set = MapperSet::new();
        assert_eq!(set.register(Box::new(CountMapper::default())).unwrap(), 0);
        assert!(matches!(
            set.register(Box::new(CountMapper::default())),
            Err(ColonyError::DuplicateMapper(_))
        ));

        let mut other = MapperSet::new();
        let incompatible = CountMapper {
            version: Some("0.9.0"),
            ..Default::default()
        };
        assert!(matches!(
            other.register(Box::new(incompatible)),
            Err(ColonyError::IncompatibleMapper { .. })
        ));
        assert!(other.is_empty());
    }

    #[test]
    fn test_children_are_registered_and_configured() {
        let mut set = MapperSet::new();
        let mapper = CountMapper {
            with_child: true,
            ..Default::default()
        };
        set.register(Box::new(mapper)).unwrap();
        assert_eq!(set.names(), vec!["count", "child"]);
        assert_eq!(set.index_of::<Child>().unwrap(), 1);

        let mut store = Store::new("root", 4);
        set.configure(&mut store, 0).unwrap();
        assert!(store.get("count").is_some());
        assert!(store.substore("children").unwrap().get("weight").is_some());
        let count = set.dao(0).as_any().downcast_ref::<CountMapper>().unwrap();
        assert!(count.attached);
    }

    #[test]
    fn test_unknown_component_is_schema_error() {
        let set = MapperSet::new();
        let err = set.index_of::<Count>().unwrap_err();
        assert!(err.is_schema_error());
        assert!(err.to_string().contains("Count"));
    }

    #[test]
    fn test_broadcast_reaches_every_mapper() {
        let events = Arc::new(AtomicUsize::new(0));
        let mut set = MapperSet::new();
        set.register(Box::new(CountMapper {
            events: Arc::clone(&events),
            ..Default::default()
        }))
        .unwrap();
        set.broadcast(LifecycleEvent::PreParallelIteration);
        set.broadcast(LifecycleEvent::PostParallelIteration);
        assert_eq!(events.load(Ordering::SeqCst), 2);
    }
}
