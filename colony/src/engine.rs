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
//! The engine: root store, mapper table and worker pool
//!
//! [`Engine`] is the central container. Setup (registering mappers,
//! reserving rows, bulk loads) needs `&mut Engine`; passes only borrow it,
//! so the type system keeps schema changes and column growth out of
//! parallel runs.

use tracing::info;

use crate::config::EngineConfig;
use crate::error::Result;
#[cfg(feature = "parallel")]
use crate::error::ColonyError;
use crate::mapper::{Dao, LifecycleEvent, Mapper, MapperSet};
use crate::select::AllEntities;
use crate::session::{Session, SessionMode};
use crate::store::{Row, Store};
use crate::system::SessionFactory;

#[cfg(feature = "parallel")]
use rayon::{ThreadPool, ThreadPoolBuilder};

/// The main container for entity data and mappers
pub struct Engine {
    config: EngineConfig,
    store: Store,
    mappers: MapperSet,
    #[cfg(feature = "parallel")]
    pool: Option<ThreadPool>,
}

impl Engine {
    /// Create an engine from a configuration
    ///
    /// Builds a dedicated worker pool when `config.threads` is set.
    pub fn new(config: EngineConfig) -> Result<Self> {
        #[cfg(feature = "parallel")]
        let pool = match config.threads {
            Some(threads) => Some(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("colony-worker-{}", i))
                    .build()
                    .map_err(|e| ColonyError::InvalidConfig(e.to_string()))?,
            ),
            None => None,
        };

        info!(
            capacity = config.default_capacity,
            chunk_size = config.chunk_size,
            threads = ?config.threads,
            "engine created"
        );
        Ok(Engine {
            store: Store::new("root", config.default_capacity),
            mappers: MapperSet::new(),
            config,
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    /// Register a mapper, declare its columns and attach it
    ///
    /// Returns the mapper's index. On failure nothing stays registered,
    /// though columns already added to the store remain.
    pub fn register<M: Mapper>(&mut self, mapper: M) -> Result<usize> {
        self.register_dao(Box::new(mapper))
    }

    /// Register an already boxed mapper
    pub fn register_dao(&mut self, dao: Box<dyn Dao>) -> Result<usize> {
        let start = self.mappers.len();
        let index = self.mappers.register(dao)?;
        if let Err(err) = self.mappers.configure(&mut self.store, start) {
            self.mappers.truncate(start);
            return Err(err);
        }
        info!(mappers = ?&self.mappers.names()[start..], "registered");
        Ok(index)
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The root store
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Mutable access to the root store, for setup and bulk loads
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// Registered mappers
    pub fn mappers(&self) -> &MapperSet {
        &self.mappers
    }

    /// Open an identity-mapped session
    pub fn session(&self) -> Session<'_> {
        Session::new(self, SessionMode::Normal)
    }

    /// Open a session in the given mode
    pub fn open_session(&self, mode: SessionMode) -> Session<'_> {
        Session::new(self, mode)
    }

    /// Append a row outside any session
    ///
    /// Needs `&mut self`, so it can only happen between passes.
    pub fn create_entity(&mut self) -> Row {
        self.store.append_row()
    }

    /// Make room for `additional` rows to be acquired during a pass
    pub fn reserve(&mut self, additional: usize) {
        self.store.reserve(additional);
    }

    /// Logical number of rows in the root store
    pub fn count(&self) -> usize {
        self.store.count()
    }

    /// Load a component without caching it
    ///
    /// # Panics
    ///
    /// Panics when `T` has no registered mapper.
    pub fn peek<T: 'static>(&self, row: Row) -> Option<T> {
        self.open_session(SessionMode::StubEntities).peek::<T>(row)
    }

    /// Send a lifecycle event to every mapper
    pub fn broadcast(&self, event: LifecycleEvent) {
        self.mappers.broadcast(event);
    }

    /// Selector over every row, chunked by the configured chunk size
    pub fn all_entities(&self) -> AllEntities<'_> {
        AllEntities::new(&self.store, self.config.chunk_size)
    }

    /// Run `op` inside the engine's worker pool, if it has one
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        #[cfg(feature = "parallel")]
        {
            match &self.pool {
                Some(pool) => pool.install(op),
                None => op(),
            }
        }
        #[cfg(not(feature = "parallel"))]
        {
            op()
        }
    }

    /// Number of threads a parallel pass can use
    ///
    /// Returns 1 if the parallel feature is disabled.
    pub fn thread_count(&self) -> usize {
        #[cfg(feature = "parallel")]
        {
            self.pool
                .as_ref()
                .map_or_else(rayon::current_num_threads, ThreadPool::current_num_threads)
        }
        #[cfg(not(feature = "parallel"))]
        {
            1
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine {
            config: EngineConfig::default(),
            store: Store::new("root", EngineConfig::default().default_capacity),
            mappers: MapperSet::new(),
            #[cfg(feature = "parallel")]
            pool: None,
        }
    }
}

impl SessionFactory for Engine {
    fn open_session(&self, mode: SessionMode) -> Session<'_> {
        Engine::open_session(self, mode)
    }

    fn clears_by_default(&self) -> bool {
        self.config.clears_by_default
    }

    fn broadcast(&self, event: LifecycleEvent) {
        Engine::broadcast(self, event);
    }

    #[cfg(feature = "parallel")]
    fn thread_pool(&self) -> Option<&ThreadPool> {
        self.pool.as_ref()
    }
}
