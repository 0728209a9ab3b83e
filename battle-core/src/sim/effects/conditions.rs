//! Status conditions and weather.

use rand::Rng;

use crate::dex::{text, StatName};
use crate::sim::effect::{
    Effect, EffectCx, EffectHooks, EffectKind, EffectTemplate, StatModifier, LOCK_MAJOR_STATUS,
};
use crate::sim::effects::{TICK_STATUS, TICK_WEATHER};

// Execution vetoes run in ascending tier order: sleep and freeze swallow
// the turn before flinch, flinch before paralysis.
const TIER_SLEEP: i32 = 1;
const TIER_FREEZE: i32 = 2;
const TIER_FLINCH: i32 = 3;
const TIER_PARALYSIS: i32 = 4;

fn residual_damage(cx: &mut EffectCx<'_>, fraction: u32, label: &str) {
    let Some(id) = cx.subject else {
        return;
    };
    let (hp, max, token) = {
        let c = cx.field.creature(id);
        (c.hp as i32, c.max_hp() as i32, c.token())
    };
    let amount = (max / fraction as i32).max(1);
    cx.field
        .print(text::BATTLE, text::MSG_HURT_BY, vec![token, label.to_string()]);
    cx.field.set_hp(id, hp - amount);
}

fn burn_tick(cx: &mut EffectCx<'_>, _effect: &mut Effect) {
    residual_damage(cx, 16, "burn");
}

fn burn_stat(
    effect: &Effect,
    _field: &crate::sim::field::Field,
    stat: StatName,
    subject: crate::sim::CreatureId,
    _target: Option<crate::sim::CreatureId>,
) -> Option<StatModifier> {
    if stat == StatName::Atk && Some(subject) == effect.subject {
        Some(StatModifier { priority: 1, value: 0.5 })
    } else {
        None
    }
}

pub static BURN: EffectTemplate = EffectTemplate {
    id: "burn",
    kind: EffectKind::Condition,
    singleton: true,
    lock: LOCK_MAJOR_STATUS,
    veto_tier: 0,
    tick_tier: TICK_STATUS,
    hooks: EffectHooks {
        tick: Some(burn_tick),
        stat_modifier: Some(burn_stat),
        ..EffectHooks::NONE
    },
};

fn poison_tick(cx: &mut EffectCx<'_>, _effect: &mut Effect) {
    residual_damage(cx, 8, "poison");
}

pub static POISON: EffectTemplate = EffectTemplate {
    id: "poison",
    kind: EffectKind::Condition,
    singleton: true,
    lock: LOCK_MAJOR_STATUS,
    veto_tier: 0,
    tick_tier: TICK_STATUS,
    hooks: EffectHooks { tick: Some(poison_tick), ..EffectHooks::NONE },
};

fn toxic_tick(cx: &mut EffectCx<'_>, effect: &mut Effect) {
    let Some(id) = cx.subject else {
        return;
    };
    effect.state.counter = (effect.state.counter + 1).min(15);
    let (hp, max, token) = {
        let c = cx.field.creature(id);
        (c.hp as i32, c.max_hp() as i32, c.token())
    };
    let amount = (max * effect.state.counter / 16).max(1);
    cx.field
        .print(text::BATTLE, text::MSG_HURT_BY, vec![token, "poison".to_string()]);
    cx.field.set_hp(id, hp - amount);
}

pub static TOXIC: EffectTemplate = EffectTemplate {
    id: "toxic",
    kind: EffectKind::Condition,
    singleton: true,
    lock: LOCK_MAJOR_STATUS,
    veto_tier: 0,
    tick_tier: TICK_STATUS,
    hooks: EffectHooks { tick: Some(toxic_tick), ..EffectHooks::NONE },
};

fn paralysis_veto(
    cx: &mut EffectCx<'_>,
    _effect: &mut Effect,
    user: crate::sim::CreatureId,
    _target: Option<crate::sim::CreatureId>,
    _template: &crate::dex::MoveTemplate,
) -> bool {
    if cx.field.rng.gen_range(0..100u32) < 25 {
        let token = cx.field.creature(user).token();
        cx.field
            .print(text::BATTLE, text::MSG_FULLY_PARALYZED, vec![token]);
        return true;
    }
    false
}

fn paralysis_stat(
    effect: &Effect,
    _field: &crate::sim::field::Field,
    stat: StatName,
    subject: crate::sim::CreatureId,
    _target: Option<crate::sim::CreatureId>,
) -> Option<StatModifier> {
    if stat == StatName::Spe && Some(subject) == effect.subject {
        Some(StatModifier { priority: 2, value: 0.25 })
    } else {
        None
    }
}

pub static PARALYSIS: EffectTemplate = EffectTemplate {
    id: "paralysis",
    kind: EffectKind::Condition,
    singleton: true,
    lock: LOCK_MAJOR_STATUS,
    veto_tier: TIER_PARALYSIS,
    tick_tier: TICK_STATUS,
    hooks: EffectHooks {
        veto_execution: Some(paralysis_veto),
        stat_modifier: Some(paralysis_stat),
        ..EffectHooks::NONE
    },
};

fn sleep_apply(cx: &mut EffectCx<'_>, effect: &mut Effect) -> bool {
    effect.state.turns = cx.field.rng.gen_range(1..=3);
    true
}

fn sleep_veto(
    cx: &mut EffectCx<'_>,
    effect: &mut Effect,
    user: crate::sim::CreatureId,
    _target: Option<crate::sim::CreatureId>,
    _template: &crate::dex::MoveTemplate,
) -> bool {
    let token = cx.field.creature(user).token();
    if effect.state.turns == 0 {
        effect.mark_removable();
        cx.field.print(text::BATTLE, text::MSG_WOKE_UP, vec![token]);
        return false;
    }
    effect.state.turns -= 1;
    cx.field.print(text::BATTLE, text::MSG_FAST_ASLEEP, vec![token]);
    true
}

pub static SLEEP: EffectTemplate = EffectTemplate {
    id: "sleep",
    kind: EffectKind::Condition,
    singleton: true,
    lock: LOCK_MAJOR_STATUS,
    veto_tier: TIER_SLEEP,
    tick_tier: TICK_STATUS,
    hooks: EffectHooks {
        apply: Some(sleep_apply),
        veto_execution: Some(sleep_veto),
        ..EffectHooks::NONE
    },
};

fn freeze_veto(
    cx: &mut EffectCx<'_>,
    effect: &mut Effect,
    user: crate::sim::CreatureId,
    _target: Option<crate::sim::CreatureId>,
    _template: &crate::dex::MoveTemplate,
) -> bool {
    let token = cx.field.creature(user).token();
    if cx.field.rng.gen_range(0..100u32) < 20 {
        effect.mark_removable();
        cx.field.print(text::BATTLE, text::MSG_THAWED, vec![token]);
        return false;
    }
    cx.field.print(text::BATTLE, text::MSG_FROZEN_SOLID, vec![token]);
    true
}

pub static FREEZE: EffectTemplate = EffectTemplate {
    id: "freeze",
    kind: EffectKind::Condition,
    singleton: true,
    lock: LOCK_MAJOR_STATUS,
    veto_tier: TIER_FREEZE,
    tick_tier: TICK_STATUS,
    hooks: EffectHooks { veto_execution: Some(freeze_veto), ..EffectHooks::NONE },
};

fn flinch_veto(
    cx: &mut EffectCx<'_>,
    effect: &mut Effect,
    user: crate::sim::CreatureId,
    _target: Option<crate::sim::CreatureId>,
    _template: &crate::dex::MoveTemplate,
) -> bool {
    let token = cx.field.creature(user).token();
    cx.field.print(text::BATTLE, text::MSG_FLINCHED, vec![token]);
    effect.mark_removable();
    true
}

fn always_removable(_effect: &Effect) -> bool {
    true
}

/// One-round flinch; swept between turns regardless.
pub static FLINCH: EffectTemplate = EffectTemplate {
    id: "flinch",
    kind: EffectKind::Condition,
    singleton: true,
    lock: 0,
    veto_tier: TIER_FLINCH,
    tick_tier: TICK_STATUS,
    hooks: EffectHooks {
        veto_execution: Some(flinch_veto),
        is_removable: Some(always_removable),
        ..EffectHooks::NONE
    },
};

fn rain_apply(_cx: &mut EffectCx<'_>, effect: &mut Effect) -> bool {
    effect.state.turns = 5;
    true
}

fn rain_tick(cx: &mut EffectCx<'_>, effect: &mut Effect) {
    if effect.state.turns == 0 {
        effect.mark_removable();
        cx.field.print(
            text::BATTLE,
            text::MSG_STATUS_ENDED,
            vec!["the field".to_string(), "rain".to_string()],
        );
        return;
    }
    effect.state.turns -= 1;
}

/// Five turns of rain; consumed by weather-keyed abilities.
pub static RAIN: EffectTemplate = EffectTemplate {
    id: "rain",
    kind: EffectKind::Field,
    singleton: true,
    lock: 0,
    veto_tier: 0,
    tick_tier: TICK_WEATHER,
    hooks: EffectHooks {
        apply: Some(rain_apply),
        tick: Some(rain_tick),
        ..EffectHooks::NONE
    },
};
