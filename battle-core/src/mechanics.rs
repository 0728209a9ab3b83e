//! Generation-dependent battle mathematics.
//!
//! The field owns one [`Mechanics`] strategy for the whole battle. All
//! randomness is drawn from the battle's own RNG so a seeded battle replays
//! byte-identically.

use rand::rngs::SmallRng;
use rand::Rng;

use crate::dex::StatName;

/// Generation index carried by the battle; selects a mechanics strategy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Generation(pub u8);

impl Generation {
    pub const MODERN: Generation = Generation(4);
}

pub fn mechanics_for(generation: Generation) -> Box<dyn Mechanics + Send> {
    // One ruleset today; the seam is where older generations would slot in.
    let _ = generation;
    Box::new(ModernMechanics)
}

/// A nature index 0..=24, laid out as a 5×5 grid over
/// Atk/Def/Spa/Spd/Spe: the row (`index / 5`) is the stat raised ×1.1,
/// the column (`index % 5`) the stat lowered ×0.9. Diagonal entries are
/// neutral.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Nature(u8);

impl Nature {
    pub const NEUTRAL: Nature = Nature(0);

    pub fn from_index(index: u8) -> Option<Nature> {
        (index <= 24).then_some(Nature(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    fn pair(self) -> (StatName, StatName) {
        const ORDER: [StatName; 5] = [
            StatName::Atk,
            StatName::Def,
            StatName::Spa,
            StatName::Spd,
            StatName::Spe,
        ];
        (ORDER[(self.0 / 5) as usize], ORDER[(self.0 % 5) as usize])
    }

    /// The ×1.1/×0.9 pair applied to two stats; neutral natures touch none.
    pub fn multiplier(self, stat: StatName) -> f32 {
        let (raised, lowered) = self.pair();
        if raised == lowered {
            1.0
        } else if stat == raised {
            1.1
        } else if stat == lowered {
            0.9
        } else {
            1.0
        }
    }
}

/// Inputs to one damage roll. The crit is rolled beforehand (see
/// [`Mechanics::roll_critical`]) so effect modifiers can key on it.
pub struct DamageContext {
    pub level: u8,
    pub power: u16,
    pub attack: u16,
    pub defense: u16,
    pub stab: bool,
    pub type_multiplier: f32,
    pub critical: bool,
    pub target_count: usize,
    /// Damage-formula multipliers already ordered by (position, priority).
    pub modifiers: Vec<f32>,
}

pub struct HitContext {
    /// `None` never misses.
    pub accuracy: Option<u8>,
    /// Attacker accuracy stage after stat-level transforms.
    pub accuracy_stage: i8,
    /// Defender evasion stage after stat-level transforms.
    pub evasion_stage: i8,
}

pub trait Mechanics: Send {
    fn calculate_stat(&self, base: u16, iv: u8, ev: u8, level: u8, nature: f32, is_hp: bool)
        -> u16;

    /// The ±6 multiplier for ordinary stats (2-based curve).
    fn stage_multiplier(&self, stage: i8) -> f32;

    /// The ±6 multiplier for accuracy and evasion (3-based curve).
    fn accuracy_multiplier(&self, stage: i8) -> f32;

    fn attempt_hit(&self, ctx: &HitContext, rng: &mut SmallRng) -> bool;

    /// Roll the critical check for an additive crit stage. Runs before
    /// damage modifiers are gathered so they can see the outcome.
    fn roll_critical(&self, crit_stage: i32, rng: &mut SmallRng) -> bool;

    /// Roll damage for a hit whose crit outcome is already known.
    fn calculate_damage(&self, ctx: &DamageContext, rng: &mut SmallRng) -> u16;
}

pub struct ModernMechanics;

impl Mechanics for ModernMechanics {
    fn calculate_stat(
        &self,
        base: u16,
        iv: u8,
        ev: u8,
        level: u8,
        nature: f32,
        is_hp: bool,
    ) -> u16 {
        let core = (base * 2 + iv as u16 + (ev / 4) as u16) * level as u16 / 100;
        if is_hp {
            core + level as u16 + 10
        } else {
            ((core + 5) as f32 * nature).floor() as u16
        }
    }

    fn stage_multiplier(&self, stage: i8) -> f32 {
        let stage = stage.clamp(-6, 6) as f32;
        if stage >= 0.0 {
            (2.0 + stage) / 2.0
        } else {
            2.0 / (2.0 - stage)
        }
    }

    fn accuracy_multiplier(&self, stage: i8) -> f32 {
        let stage = stage.clamp(-6, 6) as f32;
        if stage >= 0.0 {
            (3.0 + stage) / 3.0
        } else {
            3.0 / (3.0 - stage)
        }
    }

    fn attempt_hit(&self, ctx: &HitContext, rng: &mut SmallRng) -> bool {
        let Some(accuracy) = ctx.accuracy else {
            return true;
        };
        let stage = (ctx.accuracy_stage - ctx.evasion_stage).clamp(-6, 6);
        let chance = accuracy as f32 * self.accuracy_multiplier(stage);
        rng.gen_range(0..100u32) < chance as u32
    }

    fn roll_critical(&self, crit_stage: i32, rng: &mut SmallRng) -> bool {
        rng.gen_range(0..16u32) < crit_numerator(crit_stage)
    }

    fn calculate_damage(&self, ctx: &DamageContext, rng: &mut SmallRng) -> u16 {
        if ctx.type_multiplier == 0.0 || ctx.power == 0 {
            return 0;
        }
        let level_factor = 2 * ctx.level as u32 / 5 + 2;
        let mut base = level_factor * ctx.power as u32 * ctx.attack.max(1) as u32
            / ctx.defense.max(1) as u32
            / 50
            + 2;
        if ctx.target_count > 1 {
            base = base * 3 / 4;
        }
        let mut damage = base as f32;
        if ctx.critical {
            damage *= 2.0;
        }
        if ctx.stab {
            damage *= 1.5;
        }
        damage *= ctx.type_multiplier;
        for modifier in &ctx.modifiers {
            damage *= modifier;
        }
        damage *= rng.gen_range(85..=100) as f32 / 100.0;
        (damage as u16).max(1)
    }
}

/// Crit chance out of 16 for an additive crit stage.
fn crit_numerator(stage: i32) -> u32 {
    match stage.max(0) {
        0 => 1,
        1 => 2,
        2 => 4,
        3 => 5,
        _ => 8,
    }
}
