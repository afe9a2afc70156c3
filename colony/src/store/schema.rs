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
//! Schema declarations
//!
//! Mappers describe the columns, sub-stores and joins they need by filling a
//! [`StoreSchema`]. Declaring never touches a store; [`Store::apply_schema`]
//! materializes the declarations, skipping anything that already exists.
//!
//! [`Store::apply_schema`]: crate::store::Store::apply_schema

use crate::store::AttributeKind;

/// How a join relates a row to rows of its target store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// At most one target row, backed by an int column
    Single,
    /// A bounded list of target rows, backed by an int-list column
    Array {
        /// Smallest number of slots ever allocated for a row
        minimum: usize,
        /// Extra slots allocated beyond the requested size
        margin: usize,
    },
}

/// One schema item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    /// A column, optionally inside a sub-store
    Attribute {
        /// Owning sub-store, `None` for the root
        substore: Option<String>,
        /// Column name
        name: String,
        /// Column kind
        kind: AttributeKind,
        /// Variant names, for enum columns
        variants: Vec<String>,
    },
    /// A sub-store with its own row space
    Substore(String),
    /// A hidden column relating rows to rows of `target`
    Join {
        /// Join name, also the name of its hidden column
        name: String,
        /// Sub-store whose rows are referenced, `None` for the root
        target: Option<String>,
        /// Single or array join
        kind: JoinKind,
    },
}

/// Ordered list of schema declarations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSchema {
    declarations: Vec<Declaration>,
}

impl StoreSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a root column
    pub fn attribute(&mut self, name: &str, kind: AttributeKind) -> &mut Self {
        self.push_attribute(None, name, kind, Vec::new())
    }

    /// Declare a root enum column with its variant names
    pub fn enumeration(&mut self, name: &str, variants: &[&str]) -> &mut Self {
        let variants = variants.iter().map(|v| v.to_string()).collect();
        self.push_attribute(None, name, AttributeKind::Enum, variants)
    }

    /// Declare a sub-store
    pub fn substore(&mut self, name: &str) -> &mut Self {
        self.declarations.push(Declaration::Substore(name.to_string()));
        self
    }

    /// Declare a column inside a sub-store; the sub-store is created if needed
    pub fn substore_attribute(&mut self, substore: &str, name: &str, kind: AttributeKind) -> &mut Self {
        self.push_attribute(Some(substore.to_string()), name, kind, Vec::new())
    }

    /// Declare a single join into `target`
    pub fn single_join(&mut self, name: &str, target: Option<&str>) -> &mut Self {
        self.push_join(name, target, JoinKind::Single)
    }

    /// Declare an array join into `target`
    pub fn array_join(
        &mut self,
        name: &str,
        target: Option<&str>,
        minimum: usize,
        margin: usize,
    ) -> &mut Self {
        self.push_join(name, target, JoinKind::Array { minimum, margin })
    }

    /// Declarations in the order they were made
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Whether nothing has been declared
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    fn push_attribute(
        &mut self,
        substore: Option<String>,
        name: &str,
        kind: AttributeKind,
        variants: Vec<String>,
    ) -> &mut Self {
        self.declarations.push(Declaration::Attribute {
            substore,
            name: name.to_string(),
            kind,
            variants,
        });
        self
    }

    fn push_join(&mut self, name: &str, target: Option<&str>, kind: JoinKind) -> &mut Self {
        self.declarations.push(Declaration::Join {
            name: name.to_string(),
            target: target.map(str::to_string),
            kind,
        });
        self
    }
}
