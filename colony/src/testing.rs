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
//! Shared fixtures for unit tests

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::mapper::Mapper;
use crate::session::Session;
use crate::store::{
    Attribute, AttributeHandle, AttributeKind, IntAttribute, Row, Store, StoreSchema, StringAttribute,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Person {
    pub name: String,
    pub age: i32,
}

#[derive(Default)]
pub(crate) struct PersonMapper {
    name: Option<AttributeHandle<StringAttribute>>,
    age: Option<AttributeHandle<IntAttribute>>,
}

impl PersonMapper {
    fn age_column<'s>(&self, store: &'s Store) -> &'s IntAttribute {
        store.column(self.age.as_ref().expect("mapper is attached"))
    }

    fn name_column<'s>(&self, store: &'s Store) -> &'s StringAttribute {
        store.column(self.name.as_ref().expect("mapper is attached"))
    }
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
        !self.age_column(store).is_empty(row)
    }

    fn create(&self) -> Person {
        Person {
            name: String::new(),
            age: 0,
        }
    }

    fn load(&self, session: &Session<'_>, person: &mut Person, row: Row) {
        let store = session.store();
        person.name = self.name_column(store).get(row).map(|s| s.to_string()).unwrap_or_default();
        person.age = self.age_column(store).get(row);
    }

    fn save(&self, session: &Session<'_>, person: &Person, row: Row) {
        let store = session.store();
        self.name_column(store).set(row, person.name.as_str());
        self.age_column(store).set(row, person.age);
    }

    fn erase(&self, store: &Store, row: Row) {
        self.name_column(store).set_empty(row);
        self.age_column(store).set_empty(row);
    }

    fn attributes(&self) -> Vec<String> {
        vec!["name".to_string(), "age".to_string()]
    }
}

/// An engine with a registered [`PersonMapper`] and `rows` people aged by row
pub(crate) fn people_engine(rows: usize) -> Engine {
    let mut engine = Engine::new(EngineConfig::new(8, 4)).expect("default config is valid");
    engine.register(PersonMapper::default()).expect("fresh engine");
    for i in 0..rows {
        let row = engine.create_entity();
        let store = engine.store();
        store.require::<StringAttribute>("name").unwrap().set(row, format!("person-{}", i));
        store.require::<IntAttribute>("age").unwrap().set(row, i as i32);
    }
    engine
}
