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
//! Schelling segregation on a torus
//!
//! Residents of two colours live on a grid. Each tick a parallel query finds
//! the residents with too few like-coloured neighbours, then those residents
//! move to random free cells. Moves run sequentially because two residents
//! may pick the same cell; everything else runs chunk-parallel.
//!
//! Usage: `cargo run --example segregation -- [ticks] [seed]`

use std::collections::HashMap;

use colony::error::Result;
use colony::mapper::Mapper;
use colony::session::Session;
use colony::store::{
    Attribute, AttributeHandle, AttributeKind, EnumAttribute, EnumValue, IntAttribute, Row, Store,
    StoreSchema,
};
use colony::{Engine, EngineConfig, QueryService};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const SIDE: i32 = 60;
const RESIDENTS: usize = 3_000;
const LIKE_NEEDED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Colour {
    Orange,
    Teal,
}

impl EnumValue for Colour {
    const NAMES: &'static [&'static str] = &["Orange", "Teal"];

    fn ordinal(self) -> u8 {
        self as u8
    }

    fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Colour::Orange),
            1 => Some(Colour::Teal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Resident {
    colour: Colour,
    cell: i32,
}

#[derive(Default)]
struct ResidentMapper {
    colour: Option<AttributeHandle<EnumAttribute>>,
    cell: Option<AttributeHandle<IntAttribute>>,
}

impl ResidentMapper {
    fn columns<'s>(&self, store: &'s Store) -> Option<(&'s EnumAttribute, &'s IntAttribute)> {
        Some((store.column(self.colour.as_ref()?), store.column(self.cell.as_ref()?)))
    }
}

impl Mapper for ResidentMapper {
    type Component = Resident;

    fn name(&self) -> &str {
        "resident"
    }

    fn configure_store(&self, schema: &mut StoreSchema) {
        schema
            .enumeration("colour", Colour::NAMES)
            .attribute("cell", AttributeKind::Int);
    }

    fn attach_store(&mut self, store: &Store) -> Result<()> {
        self.colour = Some(store.handle("colour")?);
        self.cell = Some(store.handle("cell")?);
        Ok(())
    }

    fn is_present(&self, store: &Store, row: Row) -> bool {
        self.columns(store).is_some_and(|(colour, _)| !colour.is_empty(row))
    }

    fn create(&self) -> Resident {
        Resident {
            colour: Colour::Orange,
            cell: 0,
        }
    }

    fn load(&self, session: &Session<'_>, resident: &mut Resident, row: Row) {
        if let Some((colour, cell)) = self.columns(session.store()) {
            resident.colour = colour.get(row).unwrap_or(Colour::Orange);
            resident.cell = cell.get(row);
        }
    }

    fn save(&self, session: &Session<'_>, resident: &Resident, row: Row) {
        if let Some((colour, cell)) = self.columns(session.store()) {
            colour.set(row, resident.colour);
            cell.set(row, resident.cell);
        }
    }

    fn erase(&self, store: &Store, row: Row) {
        if let Some((colour, cell)) = self.columns(store) {
            colour.set_empty(row);
            cell.set_empty(row);
        }
    }
}

fn neighbours(cell: i32) -> impl Iterator<Item = i32> {
    let (x, y) = (cell % SIDE, cell / SIDE);
    (-1..=1)
        .flat_map(move |dy| (-1..=1).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| dx != 0 || dy != 0)
        .map(move |(dx, dy)| (x + dx).rem_euclid(SIDE) + (y + dy).rem_euclid(SIDE) * SIDE)
}

fn populate(engine: &mut Engine, rng: &mut ChaCha8Rng) {
    let mut cells: Vec<i32> = (0..SIDE * SIDE).collect();
    cells.shuffle(rng);

    let session = engine.session();
    for &cell in cells.iter().take(RESIDENTS) {
        let entity = match session.create_entity() {
            Ok(entity) => entity,
            Err(err) => {
                eprintln!("population stopped early: {}", err);
                break;
            }
        };
        let colour = if rng.gen_bool(0.5) { Colour::Orange } else { Colour::Teal };
        entity.add(Resident { colour, cell });
    }
    session.close();
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::WARN).init();

    let mut args = std::env::args().skip(1);
    let ticks: usize = args.next().and_then(|a| a.parse().ok()).unwrap_or(30);
    let seed: u64 = args.next().and_then(|a| a.parse().ok()).unwrap_or(7);

    println!("Colony - Segregation Example");
    println!("============================\n");
    println!("Grid: {0}x{0}, residents: {1}, like neighbours needed: {2}", SIDE, RESIDENTS, LIKE_NEEDED);

    let mut engine = Engine::new(EngineConfig::new(RESIDENTS, 250))?;
    engine.register(ResidentMapper::default())?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    populate(&mut engine, &mut rng);

    let colour = engine.store().handle::<EnumAttribute>("colour")?;
    let cell = engine.store().handle::<IntAttribute>("cell")?;

    for tick in 0..ticks {
        let query = QueryService::new(&engine);

        // who lives where, keyed by cell
        let occupants: HashMap<i32, Colour> = query
            .classify_ids(|store, row| {
                let resident_colour = store.column(&colour).get::<Colour>(row)?;
                Some((store.column(&cell).get(row), resident_colour))
            })
            .into_keys()
            .collect();

        let unhappy = query.matching_ids(engine.all_entities(), |entity| {
            let Some(resident) = entity.get::<Resident>() else {
                return false;
            };
            let resident = *resident.borrow();
            let like = neighbours(resident.cell)
                .filter(|n| occupants.get(n) == Some(&resident.colour))
                .count();
            like < LIKE_NEEDED
        })?;

        let share = 1.0 - unhappy.len() as f64 / RESIDENTS as f64;
        println!("tick {:>3}: {:>5} unhappy, {:5.1}% content", tick, unhappy.len(), share * 100.0);
        if unhappy.is_empty() {
            break;
        }

        let mut free: Vec<i32> = (0..SIDE * SIDE).filter(|c| !occupants.contains_key(c)).collect();
        let session = engine.session();
        for row in unhappy {
            let Some(resident) = session.entity(row).get::<Resident>() else {
                continue;
            };
            let slot = rng.gen_range(0..free.len());
            let old = std::mem::replace(&mut resident.borrow_mut().cell, free[slot]);
            free[slot] = old;
        }
        session.close();
    }

    Ok(())
}
