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
//! Error types for the store, mapper registry and bulk loaders
//!
//! Errors fall into the categories the engine distinguishes at runtime:
//! - schema and configuration errors, raised while stores and mappers are set up
//! - capacity exhaustion in bounded concurrent structures
//! - data-quality errors raised while parsing cell values
//!
//! Usage-contract violations (component access on a stub entity, an invalid
//! single-reference size, out-of-range reads of fixed arrays) are not errors:
//! they panic, because they signal a programming mistake.

use thiserror::Error;

use crate::store::AttributeKind;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, ColonyError>;

/// The error type for colony operations
#[derive(Debug, Error)]
pub enum ColonyError {
    /// An attribute with this name already exists in the store tree
    #[error("attribute '{0}' is already defined in this store")]
    DuplicateAttribute(String),

    /// A required attribute is missing
    #[error("attribute '{name}' is missing from store '{store}'")]
    MissingAttribute {
        /// Name of the store that was searched
        store: String,
        /// Name of the missing attribute
        name: String,
    },

    /// An attribute exists but has a different type than requested
    #[error("attribute '{name}' is {actual:?}, expected {expected:?}")]
    AttributeKindMismatch {
        /// Name of the attribute
        name: String,
        /// The kind that was requested
        expected: AttributeKind,
        /// The kind actually stored
        actual: AttributeKind,
    },

    /// An enum attribute exists with other variant names than declared
    #[error("enum attribute '{name}' has variants {actual:?}, expected {expected:?}")]
    EnumVariantMismatch {
        /// Name of the attribute
        name: String,
        /// The variants that were declared
        expected: Vec<String>,
        /// The variants actually stored
        actual: Vec<String>,
    },

    /// A sub-store name could not be resolved
    #[error("unknown sub-store '{0}'")]
    UnknownSubstore(String),

    /// A join name could not be resolved, or resolved to the wrong kind
    #[error("invalid join '{name}': {reason}")]
    InvalidJoin {
        /// Name of the join
        name: String,
        /// Why the join was rejected
        reason: String,
    },

    /// No mapper is registered for a component type
    #[error("no mapper registered for component {0}")]
    NoMapper(&'static str),

    /// A mapper with the same name or component type is already registered
    #[error("mapper '{0}' is already registered")]
    DuplicateMapper(String),

    /// A mapper was built against an incompatible API version
    #[error("mapper '{name}' API version {version} is incompatible with engine API version {engine}")]
    IncompatibleMapper {
        /// Name of the mapper
        name: String,
        /// Version the mapper reported
        version: String,
        /// Version the engine implements
        engine: String,
    },

    /// A configuration value was rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bounded structure ran out of room
    #[error("capacity exhausted ({requested} requested; capacity {capacity})")]
    CapacityExhausted {
        /// The slot or row count that was requested
        requested: usize,
        /// The fixed capacity that prevented the operation
        capacity: usize,
    },

    /// A cell value could not be parsed
    #[error("cannot parse '{value}' for attribute '{attribute}': {reason}")]
    Parse {
        /// Name of the attribute being written
        attribute: String,
        /// The offending input
        value: String,
        /// Parser message
        reason: String,
    },

    /// Underlying I/O failure while reading or writing rows
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ColonyError {
    /// Creates a parse error for the given attribute and input
    pub fn parse(attribute: &str, value: &str, reason: impl ToString) -> Self {
        ColonyError::Parse {
            attribute: attribute.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for schema and configuration errors
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            ColonyError::DuplicateAttribute(_)
                | ColonyError::MissingAttribute { .. }
                | ColonyError::AttributeKindMismatch { .. }
                | ColonyError::EnumVariantMismatch { .. }
                | ColonyError::UnknownSubstore(_)
                | ColonyError::InvalidJoin { .. }
                | ColonyError::NoMapper(_)
                | ColonyError::DuplicateMapper(_)
                | ColonyError::IncompatibleMapper { .. }
                | ColonyError::InvalidConfig(_)
        )
    }
}
