//! Species, move, type-chart and text lookups.
//!
//! The engine never reads game data from disk; an external collaborator
//! builds a [`Dex`] at boot and hands the engine an immutable snapshot
//! behind an `Arc`. Names are folded with [`normalize_id`] so lookups are
//! case- and punctuation-insensitive.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub type SpeciesId = u16;
pub type MoveId = u16;
pub type TypeId = u8;

/// Sentinel for moves with no meaningful type (Struggle).
pub const TYPELESS: TypeId = u8::MAX;

/// Conventional type numbering the effect library is written against; a
/// data ingest that feeds the [`Dex`] keeps the same ordering.
pub mod types {
    use super::TypeId;

    pub const NORMAL: TypeId = 0;
    pub const FIRE: TypeId = 1;
    pub const WATER: TypeId = 2;
    pub const GRASS: TypeId = 3;
    pub const ELECTRIC: TypeId = 4;
    pub const FLYING: TypeId = 5;
    pub const GROUND: TypeId = 6;

    pub const COUNT: usize = 7;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    None,
    Male,
    Female,
}

impl Gender {
    pub fn to_wire(self) -> u8 {
        match self {
            Gender::None => 0,
            Gender::Male => 1,
            Gender::Female => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MoveCategory {
    Physical,
    Special,
    Status,
}

/// How a move picks its targets, resolved against the active slots with
/// party-size-specific adjacency.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TargetClass {
    /// A single chosen adjacent enemy.
    EnemyAdjacent,
    /// Every enemy on the field.
    AllEnemies,
    /// A single ally slot.
    Ally,
    /// The user itself.
    User,
    /// One enemy chosen by the battle RNG.
    RandomEnemy,
    /// The field as a whole; no creature target.
    Field,
    /// Every active creature except the user.
    AllOthers,
}

pub const FLAG_CONTACT: u32 = 1 << 0;
/// Targets remember the user and this move (mirror-style effects).
pub const FLAG_MEMORABLE: u32 = 1 << 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum StatName {
    Hp,
    Atk,
    Def,
    Spa,
    Spd,
    Spe,
    Accuracy,
    Evasion,
}

impl StatName {
    /// Index into the computed six-stat array; `None` for accuracy/evasion.
    pub fn base_index(self) -> Option<usize> {
        match self {
            StatName::Hp => Some(0),
            StatName::Atk => Some(1),
            StatName::Def => Some(2),
            StatName::Spa => Some(3),
            StatName::Spd => Some(4),
            StatName::Spe => Some(5),
            StatName::Accuracy | StatName::Evasion => None,
        }
    }

    /// Index into the seven-slot stage array; `None` for HP.
    pub fn stage_index(self) -> Option<usize> {
        match self {
            StatName::Hp => None,
            StatName::Atk => Some(0),
            StatName::Def => Some(1),
            StatName::Spa => Some(2),
            StatName::Spd => Some(3),
            StatName::Spe => Some(4),
            StatName::Accuracy => Some(5),
            StatName::Evasion => Some(6),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatName::Hp => "HP",
            StatName::Atk => "Attack",
            StatName::Def => "Defense",
            StatName::Spa => "Special Attack",
            StatName::Spd => "Special Defense",
            StatName::Spe => "Speed",
            StatName::Accuracy => "accuracy",
            StatName::Evasion => "evasiveness",
        }
    }
}

/// A stat-stage change a move applies, with an activation chance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatChange {
    pub stat: StatName,
    pub delta: i8,
    pub on_self: bool,
    /// Percent chance; 100 for guaranteed.
    pub chance: u8,
}

/// A status condition a move inflicts, with an activation chance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusInflict {
    /// Effect template id, e.g. `"burn"`.
    pub effect: String,
    pub chance: u8,
}

#[derive(Clone, Debug)]
pub struct MoveTemplate {
    pub id: MoveId,
    pub name: String,
    pub move_type: TypeId,
    pub category: MoveCategory,
    pub power: u16,
    /// `None` never misses.
    pub accuracy: Option<u8>,
    pub pp: u8,
    pub priority: i8,
    pub target: TargetClass,
    pub flags: u32,
    pub crit_stage: u8,
    /// Fraction of damage dealt taken as recoil.
    pub recoil: Option<(u8, u8)>,
    /// Fraction of the user's max HP taken as recoil (Struggle).
    pub recoil_max_hp: Option<(u8, u8)>,
    /// Fraction of damage dealt restored to the user.
    pub drain: Option<(u8, u8)>,
    pub inflicts: Option<StatusInflict>,
    pub stat_changes: Vec<StatChange>,
}

impl MoveTemplate {
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

#[derive(Clone, Debug)]
pub struct SpeciesData {
    pub id: SpeciesId,
    pub name: String,
    pub base_stats: [u16; 6],
    pub types: Vec<TypeId>,
}

/// Identifier normalization shared by every name lookup.
pub fn normalize_id(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Text-table categories for `BATTLE_PRINT`.
pub mod text {
    pub const BATTLE: u8 = 4;

    pub const MSG_MISSED: u16 = 2;
    pub const MSG_NO_TARGET: u16 = 3;
    pub const MSG_STAT_ROSE: u16 = 10;
    pub const MSG_STAT_FELL: u16 = 11;
    pub const MSG_STAT_CAPPED: u16 = 12;
    pub const MSG_STATUS_APPLIED: u16 = 20;
    pub const MSG_STATUS_ENDED: u16 = 21;
    pub const MSG_FULLY_PARALYZED: u16 = 22;
    pub const MSG_FAST_ASLEEP: u16 = 23;
    pub const MSG_WOKE_UP: u16 = 24;
    pub const MSG_FROZEN_SOLID: u16 = 25;
    pub const MSG_THAWED: u16 = 26;
    pub const MSG_FLINCHED: u16 = 27;
    pub const MSG_HURT_BY: u16 = 28;
    pub const MSG_RESTORED_BY: u16 = 29;
    pub const MSG_NO_EFFECT: u16 = 30;
    pub const MSG_RECOIL: u16 = 31;
    pub const MSG_FAILED: u16 = 32;
}

static DEFAULT_TEXT: Lazy<HashMap<(u8, u16), &'static str>> = Lazy::new(|| {
    use text::*;
    HashMap::from([
        ((BATTLE, MSG_MISSED), "{0}'s attack missed {1}!"),
        ((BATTLE, MSG_NO_TARGET), "But there was no target..."),
        ((BATTLE, MSG_STAT_ROSE), "{0}'s {1} rose!"),
        ((BATTLE, MSG_STAT_FELL), "{0}'s {1} fell!"),
        ((BATTLE, MSG_STAT_CAPPED), "{0}'s {1} won't go any further!"),
        ((BATTLE, MSG_STATUS_APPLIED), "{0} was afflicted by {1}!"),
        ((BATTLE, MSG_STATUS_ENDED), "{0}'s {1} wore off!"),
        ((BATTLE, MSG_FULLY_PARALYZED), "{0} is paralyzed! It can't move!"),
        ((BATTLE, MSG_FAST_ASLEEP), "{0} is fast asleep."),
        ((BATTLE, MSG_WOKE_UP), "{0} woke up!"),
        ((BATTLE, MSG_FROZEN_SOLID), "{0} is frozen solid!"),
        ((BATTLE, MSG_THAWED), "{0} thawed out!"),
        ((BATTLE, MSG_FLINCHED), "{0} flinched!"),
        ((BATTLE, MSG_HURT_BY), "{0} is hurt by {1}!"),
        ((BATTLE, MSG_RESTORED_BY), "{0} restored HP with {1}."),
        ((BATTLE, MSG_NO_EFFECT), "It doesn't affect {0}..."),
        ((BATTLE, MSG_RECOIL), "{0} is damaged by recoil!"),
        ((BATTLE, MSG_FAILED), "But it failed!"),
    ])
});

/// Immutable game-data snapshot: species, moves, the type chart and the
/// client text table.
#[derive(Clone, Debug, Default)]
pub struct Dex {
    species: Vec<SpeciesData>,
    species_by_name: HashMap<String, SpeciesId>,
    moves: Vec<MoveTemplate>,
    moves_by_name: HashMap<String, MoveId>,
    type_count: usize,
    type_chart: Vec<f32>,
}

impl Dex {
    pub fn new(type_count: usize) -> Self {
        Self {
            type_count,
            type_chart: vec![1.0; type_count * type_count],
            ..Self::default()
        }
    }

    pub fn add_species(
        &mut self,
        name: &str,
        base_stats: [u16; 6],
        types: &[TypeId],
    ) -> SpeciesId {
        let id = self.species.len() as SpeciesId;
        self.species.push(SpeciesData {
            id,
            name: name.to_string(),
            base_stats,
            types: types.to_vec(),
        });
        self.species_by_name.insert(normalize_id(name), id);
        id
    }

    pub fn add_move(&mut self, mut template: MoveTemplate) -> MoveId {
        let id = self.moves.len() as MoveId;
        template.id = id;
        self.moves_by_name
            .insert(normalize_id(&template.name), id);
        self.moves.push(template);
        id
    }

    pub fn set_type_multiplier(&mut self, attack: TypeId, defend: TypeId, multiplier: f32) {
        let idx = attack as usize * self.type_count + defend as usize;
        self.type_chart[idx] = multiplier;
    }

    pub fn species(&self, id: SpeciesId) -> Option<&SpeciesData> {
        self.species.get(id as usize)
    }

    pub fn species_named(&self, name: &str) -> Option<&SpeciesData> {
        let id = *self.species_by_name.get(&normalize_id(name))?;
        self.species(id)
    }

    pub fn get_move(&self, id: MoveId) -> Option<&MoveTemplate> {
        self.moves.get(id as usize)
    }

    pub fn move_named(&self, name: &str) -> Option<&MoveTemplate> {
        let id = *self.moves_by_name.get(&normalize_id(name))?;
        self.get_move(id)
    }

    /// Effectiveness of an attacking type against one defending type.
    /// Unknown types (including [`TYPELESS`]) are neutral.
    pub fn type_multiplier(&self, attack: TypeId, defend: TypeId) -> f32 {
        if attack as usize >= self.type_count || defend as usize >= self.type_count {
            return 1.0;
        }
        self.type_chart[attack as usize * self.type_count + defend as usize]
    }

    /// Render a client text-table entry with `{n}` argument substitution.
    pub fn get_text(&self, category: u8, message: u16, args: &[String]) -> String {
        let Some(template) = DEFAULT_TEXT.get(&(category, message)) else {
            return format!("[{category}:{message}]");
        };
        let mut out = template.to_string();
        for (i, arg) in args.iter().enumerate() {
            out = out.replace(&format!("{{{i}}}"), arg);
        }
        out
    }
}

/// The Struggle fallback every dex must know; registered by [`install_struggle`].
pub const STRUGGLE: &str = "Struggle";

/// Register the forced-fallback move. Called once while building a dex.
pub fn install_struggle(dex: &mut Dex) -> MoveId {
    dex.add_move(MoveTemplate {
        id: 0,
        name: STRUGGLE.to_string(),
        move_type: TYPELESS,
        category: MoveCategory::Physical,
        power: 50,
        accuracy: None,
        pp: 1,
        priority: 0,
        target: TargetClass::RandomEnemy,
        flags: FLAG_CONTACT,
        crit_stage: 0,
        recoil: None,
        recoil_max_hp: Some((1, 4)),
        drain: None,
        inflicts: None,
        stat_changes: Vec::new(),
    })
}

/// Build input for one creature; validated by `Creature::build`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreatureSpec {
    pub species: String,
    #[serde(default)]
    pub nickname: String,
    pub level: u8,
    #[serde(default)]
    pub gender: Gender,
    /// Nature index 0..=24.
    pub nature: u8,
    pub ivs: [u8; 6],
    pub evs: [u8; 6],
    pub moves: Vec<String>,
    #[serde(default)]
    pub pp_ups: Vec<u8>,
    pub ability: String,
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub shiny: bool,
}

impl CreatureSpec {
    pub fn validate(&self) -> Result<()> {
        if self.level == 0 || self.level > 100 {
            return Err(anyhow!("level {} out of range", self.level));
        }
        if self.nature > 24 {
            return Err(anyhow!("nature index {} out of range", self.nature));
        }
        if self.ivs.iter().any(|&iv| iv > 31) {
            return Err(anyhow!("IVs must be in 0..=31"));
        }
        if self.evs.iter().any(|&ev| ev > 252) {
            return Err(anyhow!("EVs must be in 0..=252"));
        }
        let ev_total: u32 = self.evs.iter().map(|&ev| ev as u32).sum();
        if ev_total > 510 {
            return Err(anyhow!("EV total {ev_total} exceeds 510"));
        }
        if self.moves.is_empty() || self.moves.len() > 4 {
            return Err(anyhow!("a creature carries 1 to 4 moves"));
        }
        Ok(())
    }
}

/// Parse a JSON team, the import format the boot path feeds the engine.
pub fn parse_team(json: &str) -> Result<Vec<CreatureSpec>> {
    let team: Vec<CreatureSpec> = serde_json::from_str(json)?;
    for spec in &team {
        spec.validate()?;
    }
    Ok(team)
}

pub type DexRef = Arc<Dex>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn species_lookup_is_case_insensitive() {
        let mut dex = Dex::new(4);
        dex.add_species("Emberwing", [78, 84, 78, 109, 85, 100], &[0]);
        for name in ["Emberwing", "emberwing", "EMBER WING"] {
            assert!(dex.species_named(name).is_some(), "lookup failed for {name}");
        }
    }

    #[test]
    fn type_chart_defaults_to_neutral() {
        let mut dex = Dex::new(3);
        dex.set_type_multiplier(0, 1, 2.0);
        assert_eq!(dex.type_multiplier(0, 1), 2.0);
        assert_eq!(dex.type_multiplier(1, 0), 1.0);
        assert_eq!(dex.type_multiplier(TYPELESS, 0), 1.0);
    }

    #[test]
    fn spec_validation_rejects_ev_overflow() {
        let spec = CreatureSpec {
            species: "Emberwing".into(),
            nickname: String::new(),
            level: 50,
            gender: Gender::None,
            nature: 0,
            ivs: [31; 6],
            evs: [252, 252, 252, 0, 0, 0],
            moves: vec!["Tackle".into()],
            pp_ups: vec![],
            ability: "Blaze".into(),
            item: None,
            shiny: false,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn text_table_substitutes_arguments() {
        let dex = Dex::new(1);
        let line = dex.get_text(
            text::BATTLE,
            text::MSG_MISSED,
            &["$p{0,0}".to_string(), "$p{1,0}".to_string()],
        );
        assert_eq!(line, "$p{0,0}'s attack missed $p{1,0}!");
    }
}
