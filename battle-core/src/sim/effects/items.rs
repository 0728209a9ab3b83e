//! Held items.

use rand::Rng;

use crate::dex::{text, MoveTemplate, StatName};
use crate::sim::creature::Creature;
use crate::sim::effect::{
    Effect, EffectArg, EffectCx, EffectHooks, EffectKind, EffectTemplate, StatModifier,
};
use crate::sim::effects::TICK_ITEM;
use crate::sim::field::Field;
use crate::sim::CreatureId;

fn leftovers_tick(cx: &mut EffectCx<'_>, _effect: &mut Effect) {
    let Some(id) = cx.subject else {
        return;
    };
    let (hp, max, token) = {
        let c = cx.field.creature(id);
        (c.hp, c.max_hp(), c.token())
    };
    if hp == max {
        return;
    }
    cx.field.print(
        text::BATTLE,
        text::MSG_RESTORED_BY,
        vec![token, "Leftovers".to_string()],
    );
    let heal = (max as i32 / 16).max(1);
    cx.field.set_hp(id, hp as i32 + heal);
}

pub static LEFTOVERS: EffectTemplate = EffectTemplate {
    id: "Leftovers",
    kind: EffectKind::Item,
    singleton: true,
    lock: 0,
    veto_tier: 0,
    tick_tier: TICK_ITEM,
    hooks: EffectHooks { tick: Some(leftovers_tick), ..EffectHooks::NONE },
};

fn lock_veto_selection(effect: &Effect, _user: &Creature, template: &MoveTemplate) -> bool {
    match effect.state.locked_move {
        Some(locked) => template.id != locked,
        None => false,
    }
}

fn lock_switch_out(_effect: &Effect) -> bool {
    true
}

/// The commitment itself: installed by a choice item on the first move
/// used, dropped when the holder leaves the field.
pub static CHOICE_LOCK: EffectTemplate = EffectTemplate {
    id: "choice-lock",
    kind: EffectKind::MoveLock,
    singleton: true,
    lock: 0,
    veto_tier: 10,
    tick_tier: 0,
    hooks: EffectHooks {
        veto_selection: Some(lock_veto_selection),
        switch_out: Some(lock_switch_out),
        ..EffectHooks::NONE
    },
};

/// Record the move the holder commits to.
fn choice_message(
    cx: &mut EffectCx<'_>,
    _effect: &mut Effect,
    name: &str,
    args: &[EffectArg],
) -> Option<EffectArg> {
    if name != "informMoveUsed" {
        return None;
    }
    let Some(id) = cx.subject else {
        return None;
    };
    if cx.field.creature(id).status_by_id("choice-lock").is_some() {
        return None;
    }
    if let Some(EffectArg::Int(move_id)) = args.first() {
        if let Some(handle) = cx.field.apply_status(id, None, &CHOICE_LOCK) {
            if let Some(lock) = cx.field.creature_mut(id).effect_by_handle_mut(handle) {
                lock.state.locked_move = Some(*move_id as u16);
            }
        }
    }
    None
}

fn choice_band_stat(
    effect: &Effect,
    _field: &Field,
    stat: StatName,
    subject: CreatureId,
    _target: Option<CreatureId>,
) -> Option<StatModifier> {
    if stat == StatName::Atk && Some(subject) == effect.subject {
        Some(StatModifier { priority: 3, value: 1.5 })
    } else {
        None
    }
}

pub static CHOICE_BAND: EffectTemplate = EffectTemplate {
    id: "Choice Band",
    kind: EffectKind::Item,
    singleton: true,
    lock: 0,
    veto_tier: 10,
    tick_tier: 0,
    hooks: EffectHooks {
        stat_modifier: Some(choice_band_stat),
        message: Some(choice_message),
        ..EffectHooks::NONE
    },
};

const QUICK_CLAW_CHANCE: u32 = 20;

/// The proc is rolled once per round: at install for the opening round,
/// then at each tick for the next one. The scheduler reads it through
/// `inherent_priority`.
fn quick_claw_roll(cx: &mut EffectCx<'_>, effect: &mut Effect) {
    effect.state.counter =
        i32::from(cx.field.rng.gen_range(0..100u32) < QUICK_CLAW_CHANCE);
}

fn quick_claw_apply(cx: &mut EffectCx<'_>, effect: &mut Effect) -> bool {
    quick_claw_roll(cx, effect);
    true
}

fn quick_claw_priority(effect: &Effect) -> i32 {
    effect.state.counter
}

pub static QUICK_CLAW: EffectTemplate = EffectTemplate {
    id: "Quick Claw",
    kind: EffectKind::Item,
    singleton: true,
    lock: 0,
    veto_tier: 0,
    tick_tier: TICK_ITEM,
    hooks: EffectHooks {
        apply: Some(quick_claw_apply),
        inherent_priority: Some(quick_claw_priority),
        tick: Some(quick_claw_roll),
        ..EffectHooks::NONE
    },
};

fn choice_scarf_stat(
    effect: &Effect,
    _field: &Field,
    stat: StatName,
    subject: CreatureId,
    _target: Option<CreatureId>,
) -> Option<StatModifier> {
    if stat == StatName::Spe && Some(subject) == effect.subject {
        Some(StatModifier { priority: 3, value: 1.5 })
    } else {
        None
    }
}

pub static CHOICE_SCARF: EffectTemplate = EffectTemplate {
    id: "Choice Scarf",
    kind: EffectKind::Item,
    singleton: true,
    lock: 0,
    veto_tier: 10,
    tick_tier: 0,
    hooks: EffectHooks {
        stat_modifier: Some(choice_scarf_stat),
        message: Some(choice_message),
        ..EffectHooks::NONE
    },
};
