//! Shared fixtures for the crate's own tests and downstream integration
//! tests.

use crate::data;
use crate::dex::{CreatureSpec, DexRef, Gender};

/// The built-in dataset; tests share it so species and move names line up
/// everywhere.
pub fn dex() -> DexRef {
    data::builtin()
}

/// A one-creature team around the given species and moves.
pub fn team(species: &str, moves: &[&str], ability: &str, item: Option<&str>) -> Vec<CreatureSpec> {
    vec![creature(species, moves, ability, item)]
}

pub fn creature(species: &str, moves: &[&str], ability: &str, item: Option<&str>) -> CreatureSpec {
    CreatureSpec {
        species: species.into(),
        nickname: String::new(),
        level: 50,
        gender: Gender::Female,
        nature: 0,
        ivs: [31; 6],
        evs: [0; 6],
        moves: moves.iter().map(|m| m.to_string()).collect(),
        pp_ups: vec![],
        ability: ability.into(),
        item: item.map(String::from),
        shiny: false,
    }
}
