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
//! Row-oriented CSV for a store's visible attributes
//!
//! Each line is one row and each column one attribute, cells in the
//! attributes' string codecs. An empty cell is an empty value. Fields holding
//! a comma, a quote or a line break are quoted. Inside quotes a quote is
//! doubled and a line break is written as the two characters `\n`, so every
//! record stays on one physical line. Any other backslash is literal.
//!
//! A value that itself contains the two characters `\n` reads back as a line
//! break; existing dumps share that ambiguity.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, Write};

use tracing::{info, warn};

use crate::error::Result;
use crate::store::{Attribute, Row, Store};

/// Reason a line was skipped while loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadProblem {
    /// The line has more or fewer fields than the header
    FieldCount,
    /// A quoted field runs to the end of the line
    UnterminatedQuote,
    /// A cell did not parse for its attribute
    InvalidValue,
}

impl fmt::Display for LoadProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LoadProblem::FieldCount => "wrong number of fields",
            LoadProblem::UnterminatedQuote => "unterminated quote",
            LoadProblem::InvalidValue => "invalid value",
        };
        f.write_str(text)
    }
}

/// Outcome of [`read_into`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Lines stored as rows
    pub rows_loaded: usize,
    /// Skipped lines per problem
    pub problems: BTreeMap<LoadProblem, usize>,
}

impl LoadSummary {
    /// Total skipped lines
    pub fn rows_skipped(&self) -> usize {
        self.problems.values().sum()
    }
}

/// Write the visible attributes of rows `[0, count)`
pub fn write_store(store: &Store, mut out: impl Write) -> Result<()> {
    let columns: Vec<&dyn Attribute> = store.visible_attributes().collect();

    let header: Vec<String> = columns.iter().map(|a| encode_field(a.name())).collect();
    writeln!(out, "{}", header.join(","))?;

    for row in 0..store.count() {
        let cells: Vec<String> = columns
            .iter()
            .map(|a| a.get_string(row).map(|v| encode_field(&v)).unwrap_or_default())
            .collect();
        writeln!(out, "{}", cells.join(","))?;
    }
    out.flush()?;
    Ok(())
}

/// Append the rows of a CSV stream after the current rows of `store`
///
/// Header names select attributes with [`Store::get`]; columns naming no
/// attribute are ignored and attributes missing from the header stay empty.
/// Lines that fail to split or parse are logged and skipped. Listeners hear
/// about the new rows once, after the last line.
///
/// # Errors
///
/// Fails only on I/O errors; a stream without a header loads nothing.
pub fn read_into(store: &mut Store, input: impl BufRead) -> Result<LoadSummary> {
    let mut lines = input.lines();
    let mut summary = LoadSummary::default();

    let header = loop {
        match lines.next() {
            None => return Ok(summary),
            Some(line) => {
                let line = line?;
                if !line.trim().is_empty() {
                    break line;
                }
            }
        }
    };
    let columns: Vec<Option<String>> = match split_fields(trim_line(&header)) {
        Ok(names) => names
            .into_iter()
            .map(|name| store.get(&name).map(|_| name))
            .collect(),
        Err(problem) => {
            warn!(%problem, "unreadable CSV header");
            *summary.problems.entry(problem).or_default() += 1;
            return Ok(summary);
        }
    };

    let from = store.count();
    let mut row = from;
    for (number, line) in lines.enumerate() {
        let line = line?;
        let line = trim_line(&line);
        if line.trim().is_empty() {
            continue;
        }
        // header is line 1
        let line_number = number + 2;

        let fields = match split_fields(line) {
            Ok(fields) if fields.len() == columns.len() => fields,
            Ok(fields) => {
                warn!(line = line_number, expected = columns.len(), found = fields.len(), "skipping CSV row");
                *summary.problems.entry(LoadProblem::FieldCount).or_default() += 1;
                continue;
            }
            Err(problem) => {
                warn!(line = line_number, %problem, "skipping CSV row");
                *summary.problems.entry(problem).or_default() += 1;
                continue;
            }
        };

        store.ensure_capacity(row + 1);
        if let Err(err) = write_row(store, &columns, &fields, row) {
            warn!(line = line_number, error = %err, "skipping CSV row");
            *summary.problems.entry(LoadProblem::InvalidValue).or_default() += 1;
            clear_row(store, &columns, row);
            continue;
        }
        row += 1;
        summary.rows_loaded += 1;
    }

    store.fire_underlying_data_changed(from, row);
    info!(
        store = %store.name(),
        rows = summary.rows_loaded,
        skipped = summary.rows_skipped(),
        "CSV load finished"
    );
    Ok(summary)
}

fn write_row(store: &Store, columns: &[Option<String>], fields: &[String], row: Row) -> Result<()> {
    for (name, value) in columns.iter().zip(fields) {
        if let Some(attribute) = name.as_deref().and_then(|n| store.get(n)) {
            attribute.set_string(row, value)?;
        }
    }
    Ok(())
}

fn clear_row(store: &Store, columns: &[Option<String>], row: Row) {
    for attribute in columns.iter().flatten().filter_map(|n| store.get(n)) {
        attribute.set_empty(row);
    }
}

fn trim_line(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn encode_field(value: &str) -> String {
    if !value.contains([',', '"', '\n']) {
        return value.to_string();
    }
    let mut encoded = String::with_capacity(value.len() + 2);
    encoded.push('"');
    for c in value.chars() {
        match c {
            '"' => encoded.push_str("\"\""),
            '\n' => encoded.push_str("\\n"),
            c => encoded.push(c),
        }
    }
    encoded.push('"');
    encoded
}

fn split_fields(line: &str) -> std::result::Result<Vec<String>, LoadProblem> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        let mut field = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    None => return Err(LoadProblem::UnterminatedQuote),
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    Some('"') => break,
                    Some('\\') if chars.peek() == Some(&'n') => {
                        chars.next();
                        field.push('\n');
                    }
                    Some(c) => field.push(c),
                }
            }
            // text between a closing quote and the next comma is kept verbatim
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                field.push(c);
                chars.next();
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                field.push(c);
                chars.next();
            }
        }
        fields.push(field);
        match chars.next() {
            Some(_) => continue,
            None => return Ok(fields),
        }
    }
}
