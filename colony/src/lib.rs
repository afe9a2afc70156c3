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
//! # Colony
//!
//! A columnar entity-component store with chunked parallel iteration, built
//! for agent-based simulations with millions of entities.
//!
//! ## Features
//!
//! - **Columnar storage**: one growable typed column per attribute, with an
//!   in-band sentinel for empty cells
//! - **Mappers**: user components are assembled from and written back to
//!   columns by registered mappers
//! - **Sessions**: per-chunk identity maps with write-back or discard
//! - **Parallelization**: optional Rayon scheduler over row-disjoint chunks
//! - **Queries and CSV**: classification into deterministic indexes and bulk
//!   row import and export
//!
//! ## Example
//!
//! ```rust
//! use colony::{Engine, EngineConfig, Execution, IteratingSystemBuilder};
//! use colony::store::IntAttribute;
//!
//! let mut engine = Engine::new(EngineConfig::new(64, 16)).unwrap();
//! engine.store_mut().add_int("wealth").unwrap();
//! for _ in 0..100 {
//!     engine.create_entity();
//! }
//!
//! let wealth = engine.store().handle::<IntAttribute>("wealth").unwrap();
//! let system = IteratingSystemBuilder::new(&engine)
//!     .selector(engine.all_entities())
//!     .visit(move |entity, _| {
//!         let column = entity.session().store().column(&wealth);
//!         column.set(entity.id(), entity.id() as i32);
//!     })
//!     .build()
//!     .unwrap();
//! let summary = system.run(Execution::Parallel).unwrap();
//! assert_eq!(summary.rows, 100);
//! ```

#![warn(missing_docs)]

/// Engine configuration
pub mod config;

/// The root container
pub mod engine;

/// Error types
pub mod error;

/// CSV import and export
pub mod io;

/// Component mappers and their registry
pub mod mapper;

/// Selectors, chunks and indexes
pub mod select;

/// Sessions and entities
pub mod session;

/// Columnar storage
pub mod store;

/// Scheduler and queries
pub mod system;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ColonyError, Result};
pub use mapper::{ComponentType, Dao, LifecycleEvent, Mapper, MapperSet};
pub use select::{filtered, AllEntities, Chunk, ChunkInfo, ComponentFilter, Index, ManualChunkBuilder, Selector};
pub use session::{Entity, Session, SessionMode};
pub use store::{Row, Store, StoreSchema};
pub use system::{
    Execution, IteratingSystem, IteratingSystemBuilder, PersistenceMode, QueryService, RunSummary,
    SessionFactory,
};
