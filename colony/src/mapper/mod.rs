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
//! Mapper contract and registry
//!
//! Component types plug into a store through mappers. This module provides:
//! - The typed [`Mapper`] trait and its object-safe [`Dao`] form
//! - Lifecycle notifications for parallel passes
//! - The [`MapperSet`] dispatch table with API version checks

pub mod api;
pub mod registry;

pub use api::{ComponentType, Dao, LifecycleEvent, Mapper, MAPPER_API_VERSION};
pub use registry::MapperSet;
