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
//! Bulk import and export of store contents

pub mod csv;

pub use csv::{read_into, write_store, LoadProblem, LoadSummary};

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::Result;
use crate::store::Store;

/// Write `store` as CSV to the file at `path`, replacing it
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn save_csv<P: AsRef<Path>>(store: &Store, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_store(store, BufWriter::new(file))
}

/// Append the rows of the CSV file at `path` to `store`
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn load_csv<P: AsRef<Path>>(store: &mut Store, path: P) -> Result<LoadSummary> {
    let file = File::open(path.as_ref())?;
    read_into(store, BufReader::new(file))
}
