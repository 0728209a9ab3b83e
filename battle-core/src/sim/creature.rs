//! Per-creature mutable battle state.
//!
//! A [`Creature`] owns its effect list and its round-local bookkeeping.
//! Operations that need to see the rest of the field (move execution, the
//! health pipeline, switching) live on [`crate::sim::field::Field`] and
//! address creatures by [`CreatureId`].

use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::dex::{CreatureSpec, Dex, MoveId, SpeciesId, StatName, TypeId};
use crate::mechanics::{Mechanics, Nature};
use crate::sim::effect::{Effect, EffectHandle};
use crate::sim::CreatureId;

/// Most recent damage entries remembered per creature.
const RECENT_DAMAGE_CAP: usize = 8;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MoveSlot {
    pub move_id: MoveId,
    pub pp: u8,
    pub used: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DamageRecord {
    pub attacker: CreatureId,
    pub move_id: MoveId,
    pub amount: i32,
}

/// attacker → last memorable move that targeted this creature, kept in
/// insertion order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemoryEntry {
    pub attacker: CreatureId,
    pub move_id: MoveId,
}

pub struct Creature {
    pub id: CreatureId,
    pub species_id: SpeciesId,
    pub nickname: String,
    pub types: Vec<TypeId>,
    pub spec: CreatureSpec,
    pub nature: Nature,
    /// Computed Hp/Atk/Def/Spa/Spd/Spe.
    pub stats: [u16; 6],
    pub hp: u16,
    /// Atk/Def/Spa/Spd/Spe/Accuracy/Evasion, each clamped to ±6.
    pub stages: [i8; 7],
    pub moves: Vec<MoveSlot>,
    pub effects: Vec<Effect>,
    pub recent_damage: VecDeque<DamageRecord>,
    pub memory: Vec<MemoryEntry>,
    pub acted: bool,
    pub fainted: bool,
    /// Active slot index, -1 while benched.
    pub slot: i8,
    pub legal_switch: bool,
    pub legal_moves: Vec<bool>,
    pub forced_move: Option<MoveId>,
    pub last_move: Option<MoveId>,
    pub(crate) next_handle: u32,
}

impl Creature {
    /// Validate a spec and materialize the parts that do not need the
    /// field: stats, typed moves with PP, nickname. Ability and item are
    /// installed as effects by `Field` initialization.
    pub fn build(dex: &Dex, mech: &dyn Mechanics, spec: CreatureSpec) -> Result<Creature> {
        spec.validate()?;
        let species = dex
            .species_named(&spec.species)
            .ok_or_else(|| anyhow!("unknown species '{}'", spec.species))?;
        let nature = Nature::from_index(spec.nature)
            .ok_or_else(|| anyhow!("bad nature index {}", spec.nature))?;

        let mut nickname = if spec.nickname.is_empty() {
            species.name.clone()
        } else {
            spec.nickname.clone()
        };
        if nickname.len() > 19 {
            nickname.truncate(19);
        }

        let mut stats = [0u16; 6];
        for (i, stat) in [
            StatName::Hp,
            StatName::Atk,
            StatName::Def,
            StatName::Spa,
            StatName::Spd,
            StatName::Spe,
        ]
        .into_iter()
        .enumerate()
        {
            stats[i] = mech.calculate_stat(
                species.base_stats[i],
                spec.ivs[i],
                spec.evs[i],
                spec.level,
                nature.multiplier(stat),
                stat == StatName::Hp,
            );
        }

        let mut moves = Vec::with_capacity(spec.moves.len());
        for (i, name) in spec.moves.iter().enumerate() {
            let template = dex
                .move_named(name)
                .ok_or_else(|| anyhow!("unknown move '{name}'"))?;
            let pp_up = spec.pp_ups.get(i).copied().unwrap_or(0).min(3);
            moves.push(MoveSlot {
                move_id: template.id,
                pp: template.pp * (5 + pp_up) / 5,
                used: false,
            });
        }

        Ok(Creature {
            id: CreatureId::new(0, 0),
            species_id: species.id,
            nickname,
            types: species.types.clone(),
            nature,
            hp: stats[0],
            stats,
            stages: [0; 7],
            moves,
            effects: Vec::new(),
            recent_damage: VecDeque::new(),
            memory: Vec::new(),
            acted: false,
            fainted: false,
            slot: -1,
            legal_switch: true,
            legal_moves: Vec::new(),
            forced_move: None,
            last_move: None,
            next_handle: 0,
            spec,
        })
    }

    pub fn max_hp(&self) -> u16 {
        self.stats[0]
    }

    pub fn is_fainted(&self) -> bool {
        self.fainted
    }

    pub fn is_active(&self) -> bool {
        self.slot >= 0
    }

    pub fn is_type(&self, type_id: TypeId) -> bool {
        self.types.contains(&type_id)
    }

    pub fn stage(&self, stat: StatName) -> i8 {
        stat.stage_index().map_or(0, |i| self.stages[i])
    }

    /// Clamping write; returns the stored value.
    pub fn set_stage(&mut self, stat: StatName, level: i8) -> i8 {
        let Some(i) = stat.stage_index() else {
            return 0;
        };
        self.stages[i] = level.clamp(-6, 6);
        self.stages[i]
    }

    /// The `$p{party,index}` token client text substitutes for a name.
    pub fn token(&self) -> String {
        format!("$p{{{},{}}}", self.id.party, self.id.index)
    }

    pub fn find_move(&self, move_id: MoveId) -> Option<usize> {
        self.moves.iter().position(|slot| slot.move_id == move_id)
    }

    pub(crate) fn allocate_handle(&mut self) -> EffectHandle {
        self.next_handle += 1;
        EffectHandle(self.next_handle)
    }

    pub fn effect_by_handle(&self, handle: EffectHandle) -> Option<&Effect> {
        self.effects.iter().find(|e| e.handle == handle)
    }

    pub fn effect_by_handle_mut(&mut self, handle: EffectHandle) -> Option<&mut Effect> {
        self.effects.iter_mut().find(|e| e.handle == handle)
    }

    /// Live (non-removable) effect with the given template id.
    pub fn status_by_id(&self, id: &str) -> Option<&Effect> {
        self.effects
            .iter()
            .find(|e| !e.is_removable() && e.id() == id)
    }

    /// Live effect holding the given nonzero lock.
    pub fn status_by_lock(&self, lock: i32) -> Option<&Effect> {
        self.effects
            .iter()
            .find(|e| !e.is_removable() && e.lock() == lock)
    }

    pub fn record_damage(&mut self, record: DamageRecord) {
        if self.recent_damage.len() == RECENT_DAMAGE_CAP {
            self.recent_damage.pop_front();
        }
        self.recent_damage.push_back(record);
    }

    /// Remember the last memorable move an attacker aimed at this
    /// creature; one entry per attacker, reinserted at the back.
    pub fn remember_targeting(&mut self, attacker: CreatureId, move_id: MoveId) {
        self.memory.retain(|entry| entry.attacker != attacker);
        self.memory.push(MemoryEntry { attacker, move_id });
    }

    /// Drop all records of a creature that left the field.
    pub fn forget(&mut self, other: CreatureId) {
        self.memory.retain(|entry| entry.attacker != other);
        self.recent_damage.retain(|rec| rec.attacker != other);
    }

    pub fn last_attacker(&self) -> Option<CreatureId> {
        self.memory.last().map(|entry| entry.attacker)
    }

    pub fn last_memory_move(&self) -> Option<MoveId> {
        self.memory.last().map(|entry| entry.move_id)
    }

    /// Round-local cleanup when the creature leaves its slot. Effect
    /// sweeping and ability restoration are the field's job.
    pub(crate) fn clear_on_switch_out(&mut self) {
        self.slot = -1;
        self.memory.clear();
        self.recent_damage.clear();
        self.last_move = None;
        self.forced_move = None;
        self.acted = false;
        for slot in &mut self.moves {
            slot.used = false;
        }
    }
}

impl std::fmt::Debug for Creature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Creature")
            .field("nickname", &self.nickname)
            .field("hp", &self.hp)
            .field("slot", &self.slot)
            .field("fainted", &self.fainted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::Gender;
    use crate::mechanics::ModernMechanics;
    use crate::testkit;

    fn spec(species: &str) -> CreatureSpec {
        CreatureSpec {
            species: species.into(),
            nickname: String::new(),
            level: 50,
            gender: Gender::Female,
            nature: 0,
            ivs: [31; 6],
            evs: [0; 6],
            moves: vec!["Gust".into()],
            pp_ups: vec![2],
            ability: "Inner Focus".into(),
            item: None,
            shiny: false,
        }
    }

    #[test]
    fn build_computes_stats_and_pp() {
        let dex = testkit::dex();
        let creature = Creature::build(&dex, &ModernMechanics, spec("Galewing")).unwrap();
        assert_eq!(creature.hp, creature.max_hp());
        // 35 base PP with two PP-ups: 35 * 7 / 5 = 49.
        assert_eq!(creature.moves[0].pp, 49);
        assert!(!creature.is_active());
    }

    #[test]
    fn build_rejects_unknown_species() {
        let dex = testkit::dex();
        assert!(Creature::build(&dex, &ModernMechanics, spec("Gravelhound")).is_err());
    }

    #[test]
    fn nickname_is_truncated() {
        let dex = testkit::dex();
        let mut s = spec("Galewing");
        s.nickname = "an unreasonably long nickname".into();
        let creature = Creature::build(&dex, &ModernMechanics, s).unwrap();
        assert_eq!(creature.nickname.len(), 19);
    }

    #[test]
    fn stages_clamp_at_six() {
        let dex = testkit::dex();
        let mut creature = Creature::build(&dex, &ModernMechanics, spec("Galewing")).unwrap();
        assert_eq!(creature.set_stage(StatName::Atk, 9), 6);
        assert_eq!(creature.set_stage(StatName::Spe, -8), -6);
        assert_eq!(creature.stage(StatName::Hp), 0);
    }

    #[test]
    fn targeting_memory_keeps_one_entry_per_attacker() {
        let dex = testkit::dex();
        let mut creature = Creature::build(&dex, &ModernMechanics, spec("Galewing")).unwrap();
        let rival = CreatureId::new(1, 0);
        creature.remember_targeting(rival, 3);
        creature.remember_targeting(CreatureId::new(1, 1), 4);
        creature.remember_targeting(rival, 5);
        assert_eq!(creature.memory.len(), 2);
        assert_eq!(creature.last_memory_move(), Some(5));
        creature.forget(rival);
        assert_eq!(creature.memory.len(), 1);
    }
}
