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
//! Shared agent mapper for integration tests

#![allow(dead_code)]

use colony::error::Result;
use colony::mapper::Mapper;
use colony::session::Session;
use colony::store::{
    Attribute, AttributeHandle, AttributeKind, EntityListAttribute, EnumAttribute, EnumValue,
    IntAttribute, Row, Store, StoreSchema,
};
use colony::{Engine, EngineConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    Red,
    Blue,
}

impl EnumValue for Colour {
    const NAMES: &'static [&'static str] = &["Red", "Blue"];

    fn ordinal(self) -> u8 {
        self as u8
    }

    fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Colour::Red),
            1 => Some(Colour::Blue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub colour: Colour,
    pub wealth: i32,
    pub friends: Vec<Row>,
    /// Wealth of each friend, read eagerly on load
    pub friend_wealth: Vec<i32>,
}

#[derive(Default)]
pub struct AgentMapper {
    colour: Option<AttributeHandle<EnumAttribute>>,
    wealth: Option<AttributeHandle<IntAttribute>>,
    friends: Option<AttributeHandle<EntityListAttribute>>,
}

impl AgentMapper {
    fn colour<'s>(&self, store: &'s Store) -> &'s EnumAttribute {
        store.column(self.colour.as_ref().expect("attached"))
    }

    fn wealth<'s>(&self, store: &'s Store) -> &'s IntAttribute {
        store.column(self.wealth.as_ref().expect("attached"))
    }

    fn friends<'s>(&self, store: &'s Store) -> &'s EntityListAttribute {
        store.column(self.friends.as_ref().expect("attached"))
    }
}

impl Mapper for AgentMapper {
    type Component = Agent;

    fn name(&self) -> &str {
        "agent"
    }

    fn configure_store(&self, schema: &mut StoreSchema) {
        schema
            .enumeration("colour", Colour::NAMES)
            .attribute("wealth", AttributeKind::Int)
            .attribute("friends", AttributeKind::EntityList);
    }

    fn attach_store(&mut self, store: &Store) -> Result<()> {
        self.colour = Some(store.handle("colour")?);
        self.wealth = Some(store.handle("wealth")?);
        self.friends = Some(store.handle("friends")?);
        Ok(())
    }

    fn is_present(&self, store: &Store, row: Row) -> bool {
        !self.colour(store).is_empty(row)
    }

    fn create(&self) -> Agent {
        Agent {
            colour: Colour::Red,
            wealth: 0,
            friends: Vec::new(),
            friend_wealth: Vec::new(),
        }
    }

    fn load(&self, session: &Session<'_>, agent: &mut Agent, row: Row) {
        let store = session.store();
        agent.colour = self.colour(store).get(row).unwrap_or(Colour::Red);
        agent.wealth = self.wealth(store).get_or(row, 0);
        agent.friends = self.friends(store).get(row).unwrap_or_default();
        agent.friend_wealth = agent
            .friends
            .iter()
            .map(|&friend| self.wealth(store).get_or(friend, 0))
            .collect();
    }

    fn save(&self, session: &Session<'_>, agent: &Agent, row: Row) {
        let store = session.store();
        self.colour(store).set(row, agent.colour);
        self.wealth(store).set(row, agent.wealth);
        self.friends(store).set(row, &agent.friends);
    }

    fn erase(&self, store: &Store, row: Row) {
        self.colour(store).set_empty(row);
        self.wealth(store).set_empty(row);
        self.friends(store).set_empty(row);
    }

    fn stub_entities(&self, agent: &mut Agent) {
        agent.friend_wealth.clear();
    }

    fn attributes(&self) -> Vec<String> {
        vec!["colour".into(), "wealth".into(), "friends".into()]
    }
}

/// Engine with `rows` agents, alternating colours, wealth equal to the row
pub fn agent_engine(rows: usize, chunk_size: usize) -> Engine {
    let mut engine = Engine::new(EngineConfig::new(rows.max(1), chunk_size)).expect("valid config");
    engine.register(AgentMapper::default()).expect("fresh engine");
    for _ in 0..rows {
        engine.create_entity();
    }
    let session = engine.session();
    for row in 0..rows {
        let agent = session.entity(row).create::<Agent>();
        let mut agent = agent.borrow_mut();
        agent.colour = if row % 2 == 0 { Colour::Red } else { Colour::Blue };
        agent.wealth = row as i32;
    }
    session.close();
    engine
}
