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
//! Typed, growable columns
//!
//! Every attribute owns one backing array indexed by row id. Numeric cells
//! are atomics accessed with relaxed ordering, and string and list cells sit
//! behind a per-cell lock, so writers holding only `&Attribute` can update
//! disjoint rows from many threads without coordination. Growing the backing
//! array needs `&mut self` and therefore never overlaps a parallel pass.
//!
//! Each kind reserves one sentinel value meaning "empty":
//!
//! | kind                  | storage      | empty            |
//! |-----------------------|--------------|------------------|
//! | int, entity           | `i32`        | `i32::MIN`       |
//! | short                 | `i16`        | `i16::MIN`       |
//! | byte, bool, enum      | `i8`         | `i8::MIN`        |
//! | float, double         | `f32`, `f64` | NaN              |
//! | string, int/entity list | owned cell | `None`           |
//!
//! A real value equal to the sentinel cannot be told apart from an empty
//! cell. Ordinals and row ids never reach the sentinels in practice.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicI16, AtomicI32, AtomicI8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{ColonyError, Result};

/// Dense row index shared by every attribute of a store
pub type Row = usize;

/// Sentinel for an absent entity reference; never a valid row id
pub const EMPTY_ID: i32 = i32::MIN;

/// The value type stored by an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeKind {
    /// 32-bit signed integers
    Int,
    /// 16-bit signed integers
    Short,
    /// 8-bit signed integers
    Byte,
    /// Booleans
    Bool,
    /// 32-bit floats
    Float,
    /// 64-bit floats
    Double,
    /// Strings
    String,
    /// Enum ordinals with named variants
    Enum,
    /// Row ids of other entities
    Entity,
    /// Variable-length lists of integers
    IntList,
    /// Variable-length lists of entity row ids
    EntityList,
}

/// Type-erased view of a column
///
/// This is the surface row-oriented readers and writers work against: a
/// writer walks `[0, count)` calling [`get_string`](Attribute::get_string),
/// a reader maps external column names to attributes and calls
/// [`set_string`](Attribute::set_string).
pub trait Attribute: Send + Sync + fmt::Debug {
    /// Column name, unique within its store tree
    fn name(&self) -> &str;

    /// The value type stored in this column
    fn kind(&self) -> AttributeKind;

    /// Number of rows the backing array currently holds
    fn capacity(&self) -> usize;

    /// Grow the backing array to at least `capacity` rows
    ///
    /// Growth is to `max(capacity, old * 1.5)`. Never shrinks; new rows are
    /// empty.
    fn ensure_capacity(&mut self, capacity: usize);

    /// Whether `row` is beyond the backing array or holds the sentinel
    fn is_empty(&self, row: Row) -> bool;

    /// Write the sentinel into `row`
    fn set_empty(&self, row: Row);

    /// String form of the cell, `None` when empty
    fn get_string(&self, row: Row) -> Option<String>;

    /// Parse `value` into the cell; the empty string empties it
    fn set_string(&self, row: Row, value: &str) -> Result<()>;

    /// Upcast for typed downcasting
    fn as_any(&self) -> &dyn Any;
}

/// An attribute type with a statically known kind
pub trait TypedAttribute: Attribute + Sized + 'static {
    /// Kind reported by every instance of this type
    const KIND: AttributeKind;
}

/// Target capacity for a growth request
pub(crate) fn grown_capacity(old: usize, requested: usize) -> usize {
    requested.max(old + old / 2)
}

#[inline]
fn cell<'a, C>(cells: &'a [C], row: Row, name: &str) -> &'a C {
    match cells.get(row) {
        Some(cell) => cell,
        None => panic!(
            "row {} is beyond the capacity {} of attribute '{}'",
            row,
            cells.len(),
            name
        ),
    }
}

macro_rules! integer_attribute {
    ($(#[$meta:meta])* $name:ident, $value:ty, $atomic:ty, $kind:expr) => {
        $(#[$meta])*
        pub struct $name {
            name: String,
            cells: Vec<$atomic>,
        }

        impl $name {
            /// Sentinel stored in empty cells
            pub const EMPTY: $value = <$value>::MIN;

            /// Create a column with `capacity` empty rows
            pub fn new(name: impl Into<String>, capacity: usize) -> Self {
                let mut cells = Vec::with_capacity(capacity);
                cells.resize_with(capacity, || <$atomic>::new(Self::EMPTY));
                $name { name: name.into(), cells }
            }

            /// Raw cell value; the sentinel when empty or out of range
            #[inline]
            pub fn get(&self, row: Row) -> $value {
                self.cells
                    .get(row)
                    .map_or(Self::EMPTY, |c| c.load(Ordering::Relaxed))
            }

            /// Cell value, or `default` when empty
            #[inline]
            pub fn get_or(&self, row: Row, default: $value) -> $value {
                match self.get(row) {
                    Self::EMPTY => default,
                    value => value,
                }
            }

            /// Store `value` in `row`
            ///
            /// # Panics
            ///
            /// Panics when `row` is beyond the capacity of the column.
            #[inline]
            pub fn set(&self, row: Row, value: $value) {
                cell(&self.cells, row, &self.name).store(value, Ordering::Relaxed);
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("name", &self.name)
                    .field("capacity", &self.cells.len())
                    .finish()
            }
        }

        impl TypedAttribute for $name {
            const KIND: AttributeKind = $kind;
        }

        impl Attribute for $name {
            fn name(&self) -> &str {
                &self.name
            }

            fn kind(&self) -> AttributeKind {
                $kind
            }

            fn capacity(&self) -> usize {
                self.cells.len()
            }

            fn ensure_capacity(&mut self, capacity: usize) {
                if capacity > self.cells.len() {
                    let target = grown_capacity(self.cells.len(), capacity);
                    self.cells.resize_with(target, || <$atomic>::new(Self::EMPTY));
                }
            }

            fn is_empty(&self, row: Row) -> bool {
                self.get(row) == Self::EMPTY
            }

            fn set_empty(&self, row: Row) {
                self.set(row, Self::EMPTY);
            }

            fn get_string(&self, row: Row) -> Option<String> {
                match self.get(row) {
                    Self::EMPTY => None,
                    value => Some(value.to_string()),
                }
            }

            fn set_string(&self, row: Row, value: &str) -> Result<()> {
                if value.is_empty() {
                    self.set_empty(row);
                    return Ok(());
                }
                let parsed = value
                    .parse::<$value>()
                    .map_err(|e| ColonyError::parse(&self.name, value, e))?;
                self.set(row, parsed);
                Ok(())
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

macro_rules! float_attribute {
    ($(#[$meta:meta])* $name:ident, $value:ty, $atomic:ty, $kind:expr) => {
        $(#[$meta])*
        pub struct $name {
            name: String,
            cells: Vec<$atomic>,
        }

        impl $name {
            /// Create a column with `capacity` empty rows
            pub fn new(name: impl Into<String>, capacity: usize) -> Self {
                let mut cells = Vec::with_capacity(capacity);
                cells.resize_with(capacity, || <$atomic>::new(<$value>::NAN.to_bits()));
                $name { name: name.into(), cells }
            }

            /// Raw cell value; NaN when empty or out of range
            #[inline]
            pub fn get(&self, row: Row) -> $value {
                self.cells
                    .get(row)
                    .map_or(<$value>::NAN, |c| <$value>::from_bits(c.load(Ordering::Relaxed)))
            }

            /// Cell value, or `default` when empty
            #[inline]
            pub fn get_or(&self, row: Row, default: $value) -> $value {
                let value = self.get(row);
                if value.is_nan() { default } else { value }
            }

            /// Store `value` in `row`
            ///
            /// # Panics
            ///
            /// Panics when `row` is beyond the capacity of the column.
            #[inline]
            pub fn set(&self, row: Row, value: $value) {
                cell(&self.cells, row, &self.name).store(value.to_bits(), Ordering::Relaxed);
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("name", &self.name)
                    .field("capacity", &self.cells.len())
                    .finish()
            }
        }

        impl TypedAttribute for $name {
            const KIND: AttributeKind = $kind;
        }

        impl Attribute for $name {
            fn name(&self) -> &str {
                &self.name
            }

            fn kind(&self) -> AttributeKind {
                $kind
            }

            fn capacity(&self) -> usize {
                self.cells.len()
            }

            fn ensure_capacity(&mut self, capacity: usize) {
                if capacity > self.cells.len() {
                    let target = grown_capacity(self.cells.len(), capacity);
                    self.cells
                        .resize_with(target, || <$atomic>::new(<$value>::NAN.to_bits()));
                }
            }

            fn is_empty(&self, row: Row) -> bool {
                self.get(row).is_nan()
            }

            fn set_empty(&self, row: Row) {
                self.set(row, <$value>::NAN);
            }

            fn get_string(&self, row: Row) -> Option<String> {
                let value = self.get(row);
                if value.is_nan() {
                    None
                } else {
                    Some(value.to_string())
                }
            }

            fn set_string(&self, row: Row, value: &str) -> Result<()> {
                if value.is_empty() {
                    self.set_empty(row);
                    return Ok(());
                }
                let parsed = value
                    .parse::<$value>()
                    .map_err(|e| ColonyError::parse(&self.name, value, e))?;
                self.set(row, parsed);
                Ok(())
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

integer_attribute!(
    /// Column of `i32` values, empty as `i32::MIN`
    IntAttribute, i32, AtomicI32, AttributeKind::Int
);

integer_attribute!(
    /// Column of `i16` values, empty as `i16::MIN`
    ShortAttribute, i16, AtomicI16, AttributeKind::Short
);

integer_attribute!(
    /// Column of `i8` values, empty as `i8::MIN`
    ByteAttribute, i8, AtomicI8, AttributeKind::Byte
);

float_attribute!(
    /// Column of `f32` values, empty as NaN
    FloatAttribute, f32, AtomicU32, AttributeKind::Float
);

float_attribute!(
    /// Column of `f64` values, empty as NaN
    DoubleAttribute, f64, AtomicU64, AttributeKind::Double
);

/// Column of booleans stored as bytes
#[derive(Debug)]
pub struct BoolAttribute {
    bytes: ByteAttribute,
}

impl BoolAttribute {
    /// Create a column with `capacity` empty rows
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        BoolAttribute {
            bytes: ByteAttribute::new(name, capacity),
        }
    }

    /// Cell value, `None` when empty
    #[inline]
    pub fn get(&self, row: Row) -> Option<bool> {
        match self.bytes.get(row) {
            ByteAttribute::EMPTY => None,
            byte => Some(byte != 0),
        }
    }

    /// Store `value` in `row`
    #[inline]
    pub fn set(&self, row: Row, value: bool) {
        self.bytes.set(row, value as i8);
    }
}

impl TypedAttribute for BoolAttribute {
    const KIND: AttributeKind = AttributeKind::Bool;
}

impl Attribute for BoolAttribute {
    fn name(&self) -> &str {
        self.bytes.name()
    }

    fn kind(&self) -> AttributeKind {
        AttributeKind::Bool
    }

    fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    fn ensure_capacity(&mut self, capacity: usize) {
        self.bytes.ensure_capacity(capacity);
    }

    fn is_empty(&self, row: Row) -> bool {
        self.bytes.is_empty(row)
    }

    fn set_empty(&self, row: Row) {
        self.bytes.set_empty(row);
    }

    fn get_string(&self, row: Row) -> Option<String> {
        self.get(row).map(|b| b.to_string())
    }

    fn set_string(&self, row: Row, value: &str) -> Result<()> {
        match value {
            "" => self.set_empty(row),
            "true" => self.set(row, true),
            "false" => self.set(row, false),
            other => return Err(ColonyError::parse(self.name(), other, "expected true or false")),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Column of shared strings
pub struct StringAttribute {
    name: String,
    cells: Vec<RwLock<Option<Arc<str>>>>,
}

impl StringAttribute {
    /// Create a column with `capacity` empty rows
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let mut cells = Vec::with_capacity(capacity);
        cells.resize_with(capacity, || RwLock::new(None));
        StringAttribute {
            name: name.into(),
            cells,
        }
    }

    /// Cell value, `None` when empty
    pub fn get(&self, row: Row) -> Option<Arc<str>> {
        let cell = self.cells.get(row)?;
        cell.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Store `value` in `row`
    ///
    /// # Panics
    ///
    /// Panics when `row` is beyond the capacity of the column.
    pub fn set(&self, row: Row, value: impl Into<Arc<str>>) {
        self.replace(row, Some(value.into()));
    }

    fn replace(&self, row: Row, value: Option<Arc<str>>) {
        let cell = cell(&self.cells, row, &self.name);
        *cell.write().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

impl fmt::Debug for StringAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringAttribute")
            .field("name", &self.name)
            .field("capacity", &self.cells.len())
            .finish()
    }
}

impl TypedAttribute for StringAttribute {
    const KIND: AttributeKind = AttributeKind::String;
}

impl Attribute for StringAttribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AttributeKind {
        AttributeKind::String
    }

    fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn ensure_capacity(&mut self, capacity: usize) {
        if capacity > self.cells.len() {
            let target = grown_capacity(self.cells.len(), capacity);
            self.cells.resize_with(target, || RwLock::new(None));
        }
    }

    fn is_empty(&self, row: Row) -> bool {
        self.get(row).is_none()
    }

    fn set_empty(&self, row: Row) {
        self.replace(row, None);
    }

    fn get_string(&self, row: Row) -> Option<String> {
        self.get(row).map(|s| s.to_string())
    }

    fn set_string(&self, row: Row, value: &str) -> Result<()> {
        if value.is_empty() {
            self.set_empty(row);
        } else {
            self.set(row, value);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A Rust enum that can live in an [`EnumAttribute`]
///
/// Ordinals index into `NAMES` and must stay below 127.
pub trait EnumValue: Sized + Copy {
    /// Variant names in ordinal order
    const NAMES: &'static [&'static str];

    /// Ordinal of this variant
    fn ordinal(self) -> u8;

    /// Variant for an ordinal, if any
    fn from_ordinal(ordinal: u8) -> Option<Self>;
}

/// Column of enum ordinals, encoded to strings by variant name
pub struct EnumAttribute {
    ordinals: ByteAttribute,
    names: Arc<[String]>,
}

impl EnumAttribute {
    /// Create a column for the given variant names
    ///
    /// # Panics
    ///
    /// Panics when more than 127 variants are given.
    pub fn new(name: impl Into<String>, names: &[impl AsRef<str>], capacity: usize) -> Self {
        assert!(names.len() <= i8::MAX as usize, "Enum attributes hold at most 127 variants");
        EnumAttribute {
            ordinals: ByteAttribute::new(name, capacity),
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
        }
    }

    /// Variant names in ordinal order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Ordinal stored in `row`, `None` when empty
    pub fn get_ordinal(&self, row: Row) -> Option<u8> {
        match self.ordinals.get(row) {
            ByteAttribute::EMPTY => None,
            ordinal => Some(ordinal as u8),
        }
    }

    /// Store an ordinal in `row`
    ///
    /// # Panics
    ///
    /// Panics when `ordinal` does not name a variant.
    pub fn set_ordinal(&self, row: Row, ordinal: u8) {
        assert!(
            (ordinal as usize) < self.names.len(),
            "ordinal {} out of range for enum attribute '{}'",
            ordinal,
            self.name()
        );
        self.ordinals.set(row, ordinal as i8);
    }

    /// Typed read
    pub fn get<E: EnumValue>(&self, row: Row) -> Option<E> {
        self.get_ordinal(row).and_then(E::from_ordinal)
    }

    /// Typed write
    pub fn set<E: EnumValue>(&self, row: Row, value: E) {
        self.set_ordinal(row, value.ordinal());
    }
}

impl fmt::Debug for EnumAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumAttribute")
            .field("name", &self.name())
            .field("variants", &self.names)
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl TypedAttribute for EnumAttribute {
    const KIND: AttributeKind = AttributeKind::Enum;
}

impl Attribute for EnumAttribute {
    fn name(&self) -> &str {
        self.ordinals.name()
    }

    fn kind(&self) -> AttributeKind {
        AttributeKind::Enum
    }

    fn capacity(&self) -> usize {
        self.ordinals.capacity()
    }

    fn ensure_capacity(&mut self, capacity: usize) {
        self.ordinals.ensure_capacity(capacity);
    }

    fn is_empty(&self, row: Row) -> bool {
        self.ordinals.is_empty(row)
    }

    fn set_empty(&self, row: Row) {
        self.ordinals.set_empty(row);
    }

    fn get_string(&self, row: Row) -> Option<String> {
        self.get_ordinal(row)
            .and_then(|o| self.names.get(o as usize))
            .cloned()
    }

    fn set_string(&self, row: Row, value: &str) -> Result<()> {
        if value.is_empty() {
            self.set_empty(row);
            return Ok(());
        }
        match self.names.iter().position(|n| n == value) {
            Some(ordinal) => {
                self.set_ordinal(row, ordinal as u8);
                Ok(())
            }
            None => Err(ColonyError::parse(self.name(), value, "unknown variant")),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Encode an id in lower-case base 36
pub fn encode_base36(value: i32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut n = (value as i64).unsigned_abs();
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::with_capacity(7);
    while n > 0 {
        digits.push(DIGITS[(n % 36) as usize] as char);
        n /= 36;
    }
    if value < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

/// Decode a base-36 id
pub fn decode_base36(value: &str) -> std::result::Result<i32, std::num::ParseIntError> {
    i32::from_str_radix(value, 36)
}

/// Column of entity references, encoded to strings in base 36
#[derive(Debug)]
pub struct EntityAttribute {
    ids: IntAttribute,
}

impl EntityAttribute {
    /// Create a column with `capacity` empty rows
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        EntityAttribute {
            ids: IntAttribute::new(name, capacity),
        }
    }

    /// Referenced row, `None` when empty
    #[inline]
    pub fn get(&self, row: Row) -> Option<Row> {
        match self.ids.get(row) {
            id if id < 0 => None,
            id => Some(id as Row),
        }
    }

    /// Raw id, [`EMPTY_ID`] when empty
    #[inline]
    pub fn get_id(&self, row: Row) -> i32 {
        self.ids.get(row)
    }

    /// Point `row` at `target`, or clear it with `None`
    #[inline]
    pub fn set(&self, row: Row, target: Option<Row>) {
        self.ids.set(row, target.map_or(EMPTY_ID, |t| t as i32));
    }

    /// Store a raw id
    #[inline]
    pub fn set_id(&self, row: Row, id: i32) {
        self.ids.set(row, id);
    }
}

impl TypedAttribute for EntityAttribute {
    const KIND: AttributeKind = AttributeKind::Entity;
}

impl Attribute for EntityAttribute {
    fn name(&self) -> &str {
        self.ids.name()
    }

    fn kind(&self) -> AttributeKind {
        AttributeKind::Entity
    }

    fn capacity(&self) -> usize {
        self.ids.capacity()
    }

    fn ensure_capacity(&mut self, capacity: usize) {
        self.ids.ensure_capacity(capacity);
    }

    fn is_empty(&self, row: Row) -> bool {
        self.ids.is_empty(row)
    }

    fn set_empty(&self, row: Row) {
        self.ids.set_empty(row);
    }

    fn get_string(&self, row: Row) -> Option<String> {
        match self.ids.get(row) {
            EMPTY_ID => None,
            id => Some(encode_base36(id)),
        }
    }

    fn set_string(&self, row: Row, value: &str) -> Result<()> {
        if value.is_empty() {
            self.set_empty(row);
            return Ok(());
        }
        let id = decode_base36(value).map_err(|e| ColonyError::parse(self.name(), value, e))?;
        self.ids.set(row, id);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Column of integer lists, one list per row
///
/// The backing storage of [`ArrayReference`](crate::store::ArrayReference).
/// The string codec joins values with spaces, so an empty list encodes to
/// the empty string and reads back as an empty cell.
pub struct IntListAttribute {
    name: String,
    cells: Vec<RwLock<Option<Vec<i32>>>>,
}

impl IntListAttribute {
    /// Create a column with `capacity` empty rows
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let mut cells = Vec::with_capacity(capacity);
        cells.resize_with(capacity, || RwLock::new(None));
        IntListAttribute {
            name: name.into(),
            cells,
        }
    }

    /// Copy of the list in `row`
    pub fn get(&self, row: Row) -> Option<Vec<i32>> {
        self.read(row, |list| list.to_vec())
    }

    /// Run `f` against the list in `row` without copying it
    pub fn read<R>(&self, row: Row, f: impl FnOnce(&[i32]) -> R) -> Option<R> {
        let cell = self.cells.get(row)?;
        let guard = cell.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_deref().map(f)
    }

    /// Replace the list in `row`
    pub fn set(&self, row: Row, list: Vec<i32>) {
        self.update(row, |cell| *cell = Some(list));
    }

    /// Mutate the cell of `row` in place
    ///
    /// # Panics
    ///
    /// Panics when `row` is beyond the capacity of the column.
    pub fn update<R>(&self, row: Row, f: impl FnOnce(&mut Option<Vec<i32>>) -> R) -> R {
        let cell = cell(&self.cells, row, &self.name);
        let mut guard = cell.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn encode(&self, row: Row, radix36: bool) -> Option<String> {
        self.read(row, |list| {
            list.iter()
                .map(|&v| if radix36 { encode_base36(v) } else { v.to_string() })
                .collect::<Vec<_>>()
                .join(" ")
        })
    }

    fn decode(&self, row: Row, value: &str, radix36: bool) -> Result<()> {
        if value.is_empty() {
            self.set_empty(row);
            return Ok(());
        }
        let list = value
            .split(' ')
            .map(|part| {
                if radix36 {
                    decode_base36(part)
                } else {
                    part.parse::<i32>()
                }
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ColonyError::parse(&self.name, value, e))?;
        self.set(row, list);
        Ok(())
    }
}

impl fmt::Debug for IntListAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntListAttribute")
            .field("name", &self.name)
            .field("capacity", &self.cells.len())
            .finish()
    }
}

impl TypedAttribute for IntListAttribute {
    const KIND: AttributeKind = AttributeKind::IntList;
}

impl Attribute for IntListAttribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AttributeKind {
        AttributeKind::IntList
    }

    fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn ensure_capacity(&mut self, capacity: usize) {
        if capacity > self.cells.len() {
            let target = grown_capacity(self.cells.len(), capacity);
            self.cells.resize_with(target, || RwLock::new(None));
        }
    }

    fn is_empty(&self, row: Row) -> bool {
        self.read(row, |_| ()).is_none()
    }

    fn set_empty(&self, row: Row) {
        self.update(row, |cell| *cell = None);
    }

    fn get_string(&self, row: Row) -> Option<String> {
        self.encode(row, false)
    }

    fn set_string(&self, row: Row, value: &str) -> Result<()> {
        self.decode(row, value, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Column of entity-id lists, encoded to strings in base 36
#[derive(Debug)]
pub struct EntityListAttribute {
    lists: IntListAttribute,
}

impl EntityListAttribute {
    /// Create a column with `capacity` empty rows
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        EntityListAttribute {
            lists: IntListAttribute::new(name, capacity),
        }
    }

    /// Referenced rows of `row`; empty ids are skipped
    pub fn get(&self, row: Row) -> Option<Vec<Row>> {
        self.lists.read(row, |ids| {
            ids.iter().filter(|&&id| id >= 0).map(|&id| id as Row).collect()
        })
    }

    /// Replace the referenced rows of `row`
    pub fn set(&self, row: Row, targets: &[Row]) {
        self.lists.set(row, targets.iter().map(|&t| t as i32).collect());
    }
}

impl TypedAttribute for EntityListAttribute {
    const KIND: AttributeKind = AttributeKind::EntityList;
}

impl Attribute for EntityListAttribute {
    fn name(&self) -> &str {
        self.lists.name()
    }

    fn kind(&self) -> AttributeKind {
        AttributeKind::EntityList
    }

    fn capacity(&self) -> usize {
        self.lists.capacity()
    }

    fn ensure_capacity(&mut self, capacity: usize) {
        self.lists.ensure_capacity(capacity);
    }

    fn is_empty(&self, row: Row) -> bool {
        self.lists.is_empty(row)
    }

    fn set_empty(&self, row: Row) {
        self.lists.set_empty(row);
    }

    fn get_string(&self, row: Row) -> Option<String> {
        self.lists.encode(row, true)
    }

    fn set_string(&self, row: Row, value: &str) -> Result<()> {
        self.lists.decode(row, value, true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
