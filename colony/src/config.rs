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
//! Engine configuration
//!
//! # Environment Configuration
//!
//! [`EngineConfig::from_env`] starts from the defaults and applies:
//! ```bash
//! export COLONY_THREADS=8         # size of the dedicated worker pool
//! export COLONY_CHUNK_SIZE=50000  # rows per chunk for whole-population passes
//! ```

use crate::error::{ColonyError, Result};

/// Environment variable naming the worker pool size
pub const THREADS_ENV: &str = "COLONY_THREADS";

/// Environment variable naming the default chunk size
pub const CHUNK_SIZE_ENV: &str = "COLONY_CHUNK_SIZE";

/// Configuration for an [`Engine`](crate::Engine)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Initial row capacity of every newly registered attribute
    pub default_capacity: usize,
    /// Rows per chunk used by whole-population selectors
    pub chunk_size: usize,
    /// Size of a dedicated worker pool; `None` uses the global rayon pool
    pub threads: Option<usize>,
    /// Whether `PersistenceMode::Default` clears without persisting
    pub clears_by_default: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_capacity: 1024,
            chunk_size: 10_000,
            threads: None,
            clears_by_default: false,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with custom capacity and chunk size
    pub fn new(default_capacity: usize, chunk_size: usize) -> Self {
        EngineConfig {
            default_capacity,
            chunk_size,
            ..EngineConfig::default()
        }
        .with_chunk_size(chunk_size)
    }

    /// Set the number of rows per chunk
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "Chunk size must be positive");
        self.chunk_size = chunk_size;
        self
    }

    /// Run parallel passes on a dedicated pool of `threads` workers
    pub fn with_threads(mut self, threads: usize) -> Self {
        assert!(threads > 0, "Thread count must be positive");
        self.threads = Some(threads);
        self
    }

    /// Make `PersistenceMode::Default` discard instead of persist
    pub fn clearing_by_default(mut self) -> Self {
        self.clears_by_default = true;
        self
    }

    /// Build a configuration from the defaults and the process environment
    ///
    /// Unset variables keep their defaults; malformed values are rejected.
    pub fn from_env() -> Result<Self> {
        let mut config = EngineConfig::default();
        if let Some(threads) = read_positive(THREADS_ENV)? {
            config.threads = Some(threads);
        }
        if let Some(chunk_size) = read_positive(CHUNK_SIZE_ENV)? {
            config.chunk_size = chunk_size;
        }
        Ok(config)
    }
}

fn read_positive(var: &str) -> Result<Option<usize>> {
    match std::env::var(var) {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(0) | Err(_) => Err(ColonyError::InvalidConfig(format!(
                "{} must be a positive integer, got '{}'",
                var, raw
            ))),
            Ok(value) => Ok(Some(value)),
        },
        Err(_) => Ok(None),
    }
}
