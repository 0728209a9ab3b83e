//! Representative abilities.

use crate::dex::{types, StatName, TypeId};
use crate::sim::effect::{
    Effect, EffectCx, EffectHooks, EffectKind, EffectTemplate, StatModifier, LOCK_MAJOR_STATUS,
};
use crate::sim::effects::TICK_STATUS;
use crate::sim::field::Field;
use crate::sim::CreatureId;

/// Placeholder installed when a spec names no known ability, keeping the
/// exactly-one-ability invariant.
pub static NO_ABILITY: EffectTemplate = EffectTemplate {
    id: "No Ability",
    kind: EffectKind::Ability,
    singleton: true,
    lock: 0,
    veto_tier: 0,
    tick_tier: 0,
    hooks: EffectHooks::NONE,
};

fn inner_focus_transform(
    _effect: &Effect,
    _field: &Field,
    _subject: CreatureId,
    pending: &mut Option<&'static EffectTemplate>,
) -> bool {
    if pending.map_or(false, |t| t.id == "flinch") {
        *pending = None;
        return true;
    }
    false
}

pub static INNER_FOCUS: EffectTemplate = EffectTemplate {
    id: "Inner Focus",
    kind: EffectKind::Ability,
    singleton: true,
    lock: 0,
    veto_tier: 0,
    tick_tier: 0,
    hooks: EffectHooks { transform_status: Some(inner_focus_transform), ..EffectHooks::NONE },
};

fn levitate_immunity(
    _effect: &Effect,
    _field: &Field,
    _user: CreatureId,
    _target: CreatureId,
) -> Option<TypeId> {
    Some(types::GROUND)
}

pub static LEVITATE: EffectTemplate = EffectTemplate {
    id: "Levitate",
    kind: EffectKind::Ability,
    singleton: true,
    lock: 0,
    veto_tier: 0,
    tick_tier: 0,
    hooks: EffectHooks { immunity: Some(levitate_immunity), ..EffectHooks::NONE },
};

fn swift_swim_stat(
    effect: &Effect,
    field: &Field,
    stat: StatName,
    subject: CreatureId,
    _target: Option<CreatureId>,
) -> Option<StatModifier> {
    if stat == StatName::Spe && Some(subject) == effect.subject && field.has_field_effect("rain") {
        Some(StatModifier { priority: 3, value: 2.0 })
    } else {
        None
    }
}

pub static SWIFT_SWIM: EffectTemplate = EffectTemplate {
    id: "Swift Swim",
    kind: EffectKind::Ability,
    singleton: true,
    lock: 0,
    veto_tier: 0,
    tick_tier: 0,
    hooks: EffectHooks { stat_modifier: Some(swift_swim_stat), ..EffectHooks::NONE },
};

fn guts_stat(
    effect: &Effect,
    field: &Field,
    stat: StatName,
    subject: CreatureId,
    _target: Option<CreatureId>,
) -> Option<StatModifier> {
    if stat != StatName::Atk || Some(subject) != effect.subject {
        return None;
    }
    let statused = field
        .creature(subject)
        .status_by_lock(LOCK_MAJOR_STATUS)
        .is_some();
    statused.then_some(StatModifier { priority: 3, value: 1.5 })
}

pub static GUTS: EffectTemplate = EffectTemplate {
    id: "Guts",
    kind: EffectKind::Ability,
    singleton: true,
    lock: 0,
    veto_tier: 0,
    tick_tier: 0,
    hooks: EffectHooks { stat_modifier: Some(guts_stat), ..EffectHooks::NONE },
};

fn speed_boost_tick(cx: &mut EffectCx<'_>, _effect: &mut Effect) {
    let Some(id) = cx.subject else {
        return;
    };
    cx.field.change_stat_stage(None, id, StatName::Spe, 1);
}

pub static SPEED_BOOST: EffectTemplate = EffectTemplate {
    id: "Speed Boost",
    kind: EffectKind::Ability,
    singleton: true,
    lock: 0,
    veto_tier: 0,
    tick_tier: TICK_STATUS,
    hooks: EffectHooks { tick: Some(speed_boost_tick), ..EffectHooks::NONE },
};

fn stall_priority(_effect: &Effect) -> i32 {
    -1
}

pub static STALL: EffectTemplate = EffectTemplate {
    id: "Stall",
    kind: EffectKind::Ability,
    singleton: true,
    lock: 0,
    veto_tier: 0,
    tick_tier: 0,
    hooks: EffectHooks { inherent_priority: Some(stall_priority), ..EffectHooks::NONE },
};

fn blaze_modifier(
    effect: &Effect,
    field: &Field,
    user: CreatureId,
    _target: CreatureId,
    template: &crate::dex::MoveTemplate,
    _critical: bool,
    _targets: usize,
) -> Option<crate::sim::effect::DamageModifier> {
    if Some(user) != effect.subject || template.move_type != types::FIRE {
        return None;
    }
    let c = field.creature(user);
    let low = c.hp as u32 * 3 <= c.max_hp() as u32;
    low.then_some(crate::sim::effect::DamageModifier { position: 1, priority: 0, value: 1.5 })
}

/// Fire-move boost below a third of max HP.
pub static BLAZE: EffectTemplate = EffectTemplate {
    id: "Blaze",
    kind: EffectKind::Ability,
    singleton: true,
    lock: 0,
    veto_tier: 0,
    tick_tier: 0,
    hooks: EffectHooks { modifier: Some(blaze_modifier), ..EffectHooks::NONE },
};
