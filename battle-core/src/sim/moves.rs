//! Move resolution: execution vetoes, accuracy, damage through the health
//! pipeline, secondary effects, recoil and drain.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::warn;

use crate::dex::{text, MoveCategory, MoveId, MoveTemplate, StatName, TargetClass};
use crate::events::BattleEvent;
use crate::mechanics::{DamageContext, HitContext};
use crate::sim::effect::{DamageModifier, EffectArg};
use crate::sim::effects;
use crate::sim::field::{ExecutionFrame, Field};
use crate::sim::CreatureId;

/// Resolve one move for `user`. Returns false when the move was vetoed
/// before announcement. `inform` is false for scripted re-entry (a move
/// invoking another move), which skips vetoes and targeting notifications.
pub(crate) fn execute_move(
    field: &mut Field,
    user: CreatureId,
    move_id: MoveId,
    target_code: i8,
    inform: bool,
) -> bool {
    let Some(template) = field.dex().get_move(move_id).cloned() else {
        warn!(move_id, "move id missing from dex");
        field.creature_mut(user).acted = true;
        return false;
    };

    if inform {
        field.creature_mut(user).last_move = None;
        if field.veto_execution(user, None, &template) {
            field.creature_mut(user).acted = true;
            return false;
        }
    }

    let (party, slot, name) = {
        let c = field.creature(user);
        (c.id.party as u8, c.slot.max(0) as u8, c.nickname.clone())
    };
    field.broadcast(BattleEvent::UseMove { party, slot, name, move_id });
    field.creature_mut(user).last_move = Some(move_id);
    field.last_move = Some(move_id);

    if template.target == TargetClass::User {
        field.push_execution(ExecutionFrame { user, move_id });
        apply_to_target(field, user, user, &template, 1);
        field.pop_execution();
        field.send_effect_message(user, "informMoveUsed", &[EffectArg::Int(move_id as i32)]);
        field.creature_mut(user).acted = true;
        return true;
    }

    let targets = field.target_list(user, template.target, target_code);
    if targets.is_empty() && template.target != TargetClass::Field {
        field.print(text::BATTLE, text::MSG_NO_TARGET, vec![]);
        field.creature_mut(user).acted = true;
        return true;
    }

    if inform {
        for &target in &targets {
            field.inform_targeted(target, user, move_id);
        }
    }

    field.push_execution(ExecutionFrame { user, move_id });
    let enemy_targeting = matches!(
        template.target,
        TargetClass::EnemyAdjacent
            | TargetClass::AllEnemies
            | TargetClass::RandomEnemy
            | TargetClass::AllOthers
    );
    let mut remaining = targets.len();
    for &target in &targets {
        if field.creature(target).is_fainted() {
            continue;
        }
        if enemy_targeting {
            if field.veto_execution(user, Some(target), &template) {
                continue;
            }
            if attempt_hit(field, user, target, &template) {
                apply_to_target(field, user, target, &template, remaining);
            } else {
                let args = vec![
                    field.creature(user).token(),
                    field.creature(target).token(),
                ];
                field.print(text::BATTLE, text::MSG_MISSED, args);
            }
            if field.creature(target).is_fainted() {
                remaining = remaining.saturating_sub(1);
            }
        } else {
            apply_to_target(field, user, target, &template, remaining);
        }
    }
    field.pop_execution();
    field.send_effect_message(user, "informMoveUsed", &[EffectArg::Int(move_id as i32)]);
    field.creature_mut(user).acted = true;
    true
}

fn attempt_hit(
    field: &mut Field,
    user: CreatureId,
    target: CreatureId,
    template: &MoveTemplate,
) -> bool {
    let mut accuracy_stage = field.creature(user).stage(StatName::Accuracy);
    field.transform_stat_level(user, Some(target), StatName::Accuracy, &mut accuracy_stage);
    let mut evasion_stage = field.creature(target).stage(StatName::Evasion);
    field.transform_stat_level(target, Some(user), StatName::Evasion, &mut evasion_stage);
    let ctx = HitContext {
        accuracy: template.accuracy,
        accuracy_stage,
        evasion_stage,
    };
    let Field { mech, rng, .. } = &mut *field;
    mech.attempt_hit(&ctx, rng)
}

fn apply_to_target(
    field: &mut Field,
    user: CreatureId,
    target: CreatureId,
    template: &MoveTemplate,
    target_count: usize,
) {
    match template.category {
        MoveCategory::Physical | MoveCategory::Special => {
            apply_damage(field, user, target, template, target_count);
        }
        MoveCategory::Status => {
            apply_payload(field, user, target, template, true);
        }
    }
}

fn apply_damage(
    field: &mut Field,
    user: CreatureId,
    target: CreatureId,
    template: &MoveTemplate,
    target_count: usize,
) {
    let type_multiplier = field.type_effectiveness(template.move_type, user, target);
    if type_multiplier == 0.0 {
        let token = field.creature(target).token();
        field.print(text::BATTLE, text::MSG_NO_EFFECT, vec![token]);
        return;
    }

    let (attack_stat, defense_stat) = match template.category {
        MoveCategory::Physical => (StatName::Atk, StatName::Def),
        _ => (StatName::Spa, StatName::Spd),
    };
    let attack = field.stat(user, attack_stat);
    let defense = field.stat(target, defense_stat);
    let stab = field.creature(user).is_type(template.move_type);
    let crit_stage = template.crit_stage as i32 + field.critical_modifier(user);
    // The crit is decided before modifiers are gathered so crit-keyed
    // modifier hooks see the real outcome.
    let critical = {
        let Field { mech, rng, .. } = &mut *field;
        mech.roll_critical(crit_stage, rng)
    };
    let modifiers = collect_damage_modifiers(field, user, target, template, critical, target_count);

    let ctx = DamageContext {
        level: field.creature(user).spec.level,
        power: template.power,
        attack,
        defense,
        stab,
        type_multiplier,
        critical,
        target_count,
        modifiers,
    };
    let damage = {
        let Field { mech, rng, .. } = &mut *field;
        mech.calculate_damage(&ctx, rng)
    };
    if damage == 0 {
        return;
    }
    let hp = field.creature(target).hp as i32;
    field.set_hp(target, hp - damage as i32);

    if let Some((num, den)) = template.drain {
        let heal = (damage as i32 * num as i32 / den as i32).max(1);
        let hp = field.creature(user).hp as i32;
        field.set_hp(user, hp + heal);
    }
    if let Some((num, den)) = template.recoil {
        let recoil = (damage as i32 * num as i32 / den as i32).max(1);
        let token = field.creature(user).token();
        field.print(text::BATTLE, text::MSG_RECOIL, vec![token]);
        let hp = field.creature(user).hp as i32;
        field.set_hp(user, hp - recoil);
    }
    if let Some((num, den)) = template.recoil_max_hp {
        let recoil = (field.creature(user).max_hp() as i32 * num as i32 / den as i32).max(1);
        let token = field.creature(user).token();
        field.print(text::BATTLE, text::MSG_RECOIL, vec![token]);
        let hp = field.creature(user).hp as i32;
        field.set_hp(user, hp - recoil);
    }

    if !field.creature(target).is_fainted() {
        apply_payload(field, user, target, template, false);
    } else {
        // Self-directed riders still land after a KO.
        apply_self_payload(field, user, template);
    }
}

/// Secondary statuses and stat changes. For a pure status move a missed
/// payload prints the failure line.
fn apply_payload(
    field: &mut Field,
    user: CreatureId,
    target: CreatureId,
    template: &MoveTemplate,
    narrate_failure: bool,
) {
    if let Some(inflict) = &template.inflicts {
        let roll = field.rng.gen_range(0..100u32);
        if roll < inflict.chance as u32 {
            match effects::by_id(&inflict.effect) {
                Some(status) => {
                    let applied = field.apply_status(target, Some(user), status);
                    match applied {
                        Some(_) => {
                            let args = vec![
                                field.creature(target).token(),
                                status.id.to_string(),
                            ];
                            field.print(text::BATTLE, text::MSG_STATUS_APPLIED, args);
                        }
                        None if narrate_failure => {
                            field.print(text::BATTLE, text::MSG_FAILED, vec![]);
                        }
                        None => {}
                    }
                }
                None => warn!(effect = %inflict.effect, "move inflicts unknown effect"),
            }
        } else if narrate_failure && template.stat_changes.is_empty() {
            field.print(text::BATTLE, text::MSG_FAILED, vec![]);
        }
    }
    for change in &template.stat_changes {
        let roll = field.rng.gen_range(0..100u32);
        if roll >= change.chance as u32 {
            continue;
        }
        let who = if change.on_self { user } else { target };
        if field.creature(who).is_fainted() {
            continue;
        }
        field.change_stat_stage(Some(user), who, change.stat, change.delta);
    }
}

fn apply_self_payload(field: &mut Field, user: CreatureId, template: &MoveTemplate) {
    for change in &template.stat_changes {
        if !change.on_self {
            continue;
        }
        let roll = field.rng.gen_range(0..100u32);
        if roll >= change.chance as u32 {
            continue;
        }
        if field.creature(user).is_fainted() {
            continue;
        }
        field.change_stat_stage(Some(user), user, change.stat, change.delta);
    }
}

/// Gather damage-formula multipliers from the user, the target and the
/// field, ordered by (position, priority).
fn collect_damage_modifiers(
    field: &Field,
    user: CreatureId,
    target: CreatureId,
    template: &MoveTemplate,
    critical: bool,
    target_count: usize,
) -> Vec<f32> {
    let mut mods: BTreeMap<(u8, i32), f32> = BTreeMap::new();
    let mut gather = |effects: &[crate::sim::effect::Effect]| {
        for e in effects {
            if !e.is_active(field) {
                continue;
            }
            if let Some(hook) = e.template.hooks.modifier {
                if let Some(DamageModifier { position, priority, value }) =
                    hook(e, field, user, target, template, critical, target_count)
                {
                    mods.insert((position, priority), value);
                }
            }
        }
    };
    gather(&field.creature(user).effects);
    gather(&field.creature(target).effects);
    gather(&field.effects);
    mods.into_values().collect()
}
