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
//! Basic example: columns, a mapper, a CSV load and one pass
//!
//! This example shows how to register a mapper, bulk load rows, run a
//! parallel pass that writes back through sessions and dump the result.

use std::io;

use colony::error::Result;
use colony::io::{read_into, write_store};
use colony::mapper::Mapper;
use colony::session::Session;
use colony::store::{
    Attribute, AttributeHandle, AttributeKind, IntAttribute, Row, Store, StoreSchema, StringAttribute,
};
use colony::{Engine, EngineConfig, Execution, IteratingSystemBuilder, QueryService};

#[derive(Debug)]
struct Person {
    name: String,
    age: i32,
}

#[derive(Default)]
struct PersonMapper {
    name: Option<AttributeHandle<StringAttribute>>,
    age: Option<AttributeHandle<IntAttribute>>,
}

impl Mapper for PersonMapper {
    type Component = Person;

    fn name(&self) -> &str {
        "person"
    }

    fn configure_store(&self, schema: &mut StoreSchema) {
        schema
            .attribute("name", AttributeKind::String)
            .attribute("age", AttributeKind::Int);
    }

    fn attach_store(&mut self, store: &Store) -> Result<()> {
        self.name = Some(store.handle("name")?);
        self.age = Some(store.handle("age")?);
        Ok(())
    }

    fn is_present(&self, store: &Store, row: Row) -> bool {
        self.age.as_ref().is_some_and(|age| !store.column(age).is_empty(row))
    }

    fn create(&self) -> Person {
        Person {
            name: String::new(),
            age: 0,
        }
    }

    fn load(&self, session: &Session<'_>, person: &mut Person, row: Row) {
        let store = session.store();
        if let (Some(name), Some(age)) = (&self.name, &self.age) {
            person.name = store.column(name).get(row).map(|n| n.to_string()).unwrap_or_default();
            person.age = store.column(age).get(row);
        }
    }

    fn save(&self, session: &Session<'_>, person: &Person, row: Row) {
        let store = session.store();
        if let (Some(name), Some(age)) = (&self.name, &self.age) {
            store.column(name).set(row, person.name.as_str());
            store.column(age).set(row, person.age);
        }
    }

    fn erase(&self, store: &Store, row: Row) {
        if let (Some(name), Some(age)) = (&self.name, &self.age) {
            store.column(name).set_empty(row);
            store.column(age).set_empty(row);
        }
    }
}

const PEOPLE: &str = "name,age
Jan,30
Filip,25
\"Nowak, Ewa\",61
Lena,not-a-number
Ola,17
";

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("Colony - Basic Example");
    println!("======================\n");

    let mut engine = Engine::new(EngineConfig::new(4, 2))?;
    engine.register(PersonMapper::default())?;

    let summary = read_into(engine.store_mut(), PEOPLE.as_bytes())?;
    println!(
        "Loaded {} people, skipped {} malformed line(s)",
        summary.rows_loaded,
        summary.rows_skipped()
    );
    for (problem, count) in &summary.problems {
        println!("  - {}: {}", problem, count);
    }

    let system = IteratingSystemBuilder::new(&engine)
        .selector(engine.all_entities())
        .visit(|entity, _| {
            if let Some(person) = entity.get::<Person>() {
                person.borrow_mut().age += 1;
            }
        })
        .build()?;
    let run = system.run(Execution::Parallel)?;
    println!("\nBirthday pass visited {} rows in {} chunks", run.rows, run.chunks);

    let adults = QueryService::new(&engine).matching_ids(engine.all_entities(), |entity| {
        entity.get::<Person>().is_some_and(|p| p.borrow().age >= 18)
    })?;
    println!("Adults:");
    for row in adults {
        if let Some(person) = engine.peek::<Person>(row) {
            println!("  {} -> {:?}", row, person);
        }
    }

    println!("\nStore as CSV:");
    write_store(engine.store(), io::stdout().lock())?;

    #[cfg(feature = "parallel")]
    println!("\n[Parallel execution support enabled via Rayon, {} threads]", engine.thread_count());

    #[cfg(not(feature = "parallel"))]
    println!("\n[Running in sequential mode]");

    Ok(())
}
