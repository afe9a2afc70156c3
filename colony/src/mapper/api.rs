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
//! The contract between component types and store columns
//!
//! A [`Mapper`] adapts one component type to a store: it declares the
//! columns it needs, binds to them, and copies values between a component
//! instance and one row. Mappers are usually generated or derived; the
//! engine only sees them through the object-safe [`Dao`] form.
//!
//! # Contracts
//!
//! Mappers must:
//! - Keep `configure_store` declarative and idempotent
//! - Touch only the row they are handed in `load`, `save` and `erase`
//! - Switch to shared-safe accumulation for the duration of a parallel pass
//!   when they keep state outside the row being processed

use std::any::{type_name, Any, TypeId};
use std::fmt;

use crate::error::Result;
use crate::session::Session;
use crate::store::{Row, Store, StoreSchema};

/// Version of the mapper API
///
/// Checked at registration. Format: MAJOR.MINOR.PATCH following semantic
/// versioning.
pub const MAPPER_API_VERSION: &str = "0.1.0";

/// Notifications broadcast to every registered mapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// A parallel pass is about to start
    PreParallelIteration,
    /// A parallel pass has finished, successfully or not
    PostParallelIteration,
}

/// Runtime token for a component type
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentType {
    id: TypeId,
    name: &'static str,
}

impl ComponentType {
    /// Token for `T`
    pub fn of<T: 'static>() -> Self {
        ComponentType {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Underlying type id
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Type name, for diagnostics
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Adapter between one component type and store columns
///
/// # Example
///
/// ```rust,ignore
/// struct AgeMapper {
///     age: Option<AttributeHandle<IntAttribute>>,
/// }
///
/// impl Mapper for AgeMapper {
///     type Component = Age;
///
///     fn name(&self) -> &str {
///         "age"
///     }
///
///     fn configure_store(&self, schema: &mut StoreSchema) {
///         schema.attribute("age", AttributeKind::Int);
///     }
///
///     fn attach_store(&mut self, store: &Store) -> Result<()> {
///         self.age = Some(store.handle("age")?);
///         Ok(())
///     }
///     // ...
/// }
/// ```
pub trait Mapper: Send + Sync + 'static {
    /// The component type this mapper persists
    type Component: 'static;

    /// Unique mapper name
    fn name(&self) -> &str;

    /// Mapper API version this mapper was built against
    fn api_version(&self) -> &str {
        MAPPER_API_VERSION
    }

    /// Declare the columns, sub-stores and joins this mapper needs
    fn configure_store(&self, schema: &mut StoreSchema);

    /// Bind to the columns of a configured store
    ///
    /// # Errors
    ///
    /// Fails when a required column is missing or has the wrong kind.
    fn attach_store(&mut self, store: &Store) -> Result<()>;

    /// Whether `row` carries this component
    fn is_present(&self, store: &Store, row: Row) -> bool;

    /// A fresh component with default values
    fn create(&self) -> Self::Component;

    /// Copy row `row` into `component`
    fn load(&self, session: &Session<'_>, component: &mut Self::Component, row: Row);

    /// Copy `component` into row `row`
    fn save(&self, session: &Session<'_>, component: &Self::Component, row: Row);

    /// Empty every column of this component in row `row`
    fn erase(&self, store: &Store, row: Row);

    /// Names of the columns this mapper reads and writes
    fn attributes(&self) -> Vec<String> {
        Vec::new()
    }

    /// Mappers for nested components, registered alongside this one
    fn child_daos(&self) -> Vec<Box<dyn Dao>> {
        Vec::new()
    }

    /// Drop eagerly loaded data reachable from `component`, keeping row ids
    fn stub_entities(&self, _component: &mut Self::Component) {}

    /// React to an engine-wide notification
    fn on_lifecycle(&self, _event: LifecycleEvent) {}
}

/// Object-safe form of a [`Mapper`]
///
/// Implemented for every mapper; component values cross this boundary as
/// `dyn Any` and are downcast back by the session.
pub trait Dao: Send + Sync {
    /// Unique mapper name
    fn name(&self) -> &str;

    /// Mapper API version
    fn api_version(&self) -> &str;

    /// The persisted component type
    fn component_type(&self) -> ComponentType;

    /// See [`Mapper::configure_store`]
    fn configure_store(&self, schema: &mut StoreSchema);

    /// See [`Mapper::attach_store`]
    fn attach_store(&mut self, store: &Store) -> Result<()>;

    /// See [`Mapper::is_present`]
    fn is_present(&self, store: &Store, row: Row) -> bool;

    /// A fresh boxed component
    fn create_erased(&self) -> Box<dyn Any>;

    /// Load row `row` into a fresh boxed component
    fn load_erased(&self, session: &Session<'_>, row: Row) -> Box<dyn Any>;

    /// Save a component; values of another type are ignored
    fn save_erased(&self, session: &Session<'_>, component: &dyn Any, row: Row);

    /// Stub a component; values of another type are ignored
    fn stub_erased(&self, component: &mut dyn Any);

    /// See [`Mapper::erase`]
    fn erase(&self, store: &Store, row: Row);

    /// See [`Mapper::attributes`]
    fn attributes(&self) -> Vec<String>;

    /// See [`Mapper::child_daos`]
    fn child_daos(&self) -> Vec<Box<dyn Dao>>;

    /// See [`Mapper::on_lifecycle`]
    fn on_lifecycle(&self, event: LifecycleEvent);

    /// Allow downcasting to the concrete mapper
    fn as_any(&self) -> &dyn Any;
}

impl<M: Mapper> Dao for M {
    fn name(&self) -> &str {
        Mapper::name(self)
    }

    fn api_version(&self) -> &str {
        Mapper::api_version(self)
    }

    fn component_type(&self) -> ComponentType {
        ComponentType::of::<M::Component>()
    }

    fn configure_store(&self, schema: &mut StoreSchema) {
        Mapper::configure_store(self, schema);
    }

    fn attach_store(&mut self, store: &Store) -> Result<()> {
        Mapper::attach_store(self, store)
    }

    fn is_present(&self, store: &Store, row: Row) -> bool {
        Mapper::is_present(self, store, row)
    }

    fn create_erased(&self) -> Box<dyn Any> {
        Box::new(self.create())
    }

    fn load_erased(&self, session: &Session<'_>, row: Row) -> Box<dyn Any> {
        let mut component = self.create();
        self.load(session, &mut component, row);
        Box::new(component)
    }

    fn save_erased(&self, session: &Session<'_>, component: &dyn Any, row: Row) {
        if let Some(component) = component.downcast_ref::<M::Component>() {
            self.save(session, component, row);
        }
    }

    fn stub_erased(&self, component: &mut dyn Any) {
        if let Some(component) = component.downcast_mut::<M::Component>() {
            self.stub_entities(component);
        }
    }

    fn erase(&self, store: &Store, row: Row) {
        Mapper::erase(self, store, row);
    }

    fn attributes(&self) -> Vec<String> {
        Mapper::attributes(self)
    }

    fn child_daos(&self) -> Vec<Box<dyn Dao>> {
        Mapper::child_daos(self)
    }

    fn on_lifecycle(&self, event: LifecycleEvent) {
        Mapper::on_lifecycle(self, event);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
