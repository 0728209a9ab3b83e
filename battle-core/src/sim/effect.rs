//! The effect capability protocol.
//!
//! Every installed status — ability, held item, status condition, field
//! effect or move lock — is an [`Effect`]: a small tagged record plus a
//! static table of optional capability hooks. A concrete effect registers
//! only the hooks it participates in; an absent slot means "does not
//! participate". Hook ordering rules live with the dispatch loops in
//! [`crate::sim::field`].

use crate::dex::{MoveId, MoveTemplate, StatName, TypeId};
use crate::sim::creature::Creature;
use crate::sim::field::Field;
use crate::sim::CreatureId;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EffectKind {
    Ability,
    Item,
    Condition,
    Field,
    MoveLock,
}

/// Nonzero lock numbers forbid co-installation of same-locked effects on
/// one subject. Major status conditions (burn, sleep, ...) share a lock.
pub const LOCK_MAJOR_STATUS: i32 = 1;

/// Identifies one applied effect instance on its subject.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EffectHandle(pub u32);

/// Small per-instance scratch state concrete hooks may use.
#[derive(Clone, Debug, Default)]
pub struct EffectState {
    pub turns: u8,
    pub counter: i32,
    pub locked_move: Option<MoveId>,
}

/// A multiplicative stat modifier keyed by priority; the stage multiplier
/// always sits at priority 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatModifier {
    pub priority: i32,
    pub value: f32,
}

/// A damage-formula multiplier keyed by (position, priority).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DamageModifier {
    pub position: u8,
    pub priority: i32,
    pub value: f32,
}

/// Argument values for the free-form `message` capability.
#[derive(Clone, Debug, PartialEq)]
pub enum EffectArg {
    Int(i32),
    Bool(bool),
    Creature(CreatureId),
}

/// Mutation context handed to hooks that change battle state. While a hook
/// runs, the effect it belongs to is detached from its subject's list; the
/// rest of the field, including the subject's other effects, stays in
/// place. `subject` is `None` for field-level effects.
pub struct EffectCx<'a> {
    pub field: &'a mut Field,
    pub subject: Option<CreatureId>,
}

impl EffectCx<'_> {
    pub fn subject(&self) -> Option<&Creature> {
        self.subject.map(|id| self.field.creature(id))
    }
}

pub type ApplyHook = fn(&mut EffectCx<'_>, &mut Effect) -> bool;
pub type UnapplyHook = fn(&mut EffectCx<'_>, &mut Effect);
pub type ActiveHook = fn(&Effect, &Field) -> bool;
pub type RemovableHook = fn(&Effect) -> bool;
pub type VetoSelectionHook = fn(&Effect, &Creature, &MoveTemplate) -> bool;
pub type VetoExecutionHook =
    fn(&mut EffectCx<'_>, &mut Effect, CreatureId, Option<CreatureId>, &MoveTemplate) -> bool;
pub type TransformStatLevelHook =
    fn(&Effect, &Field, CreatureId, Option<CreatureId>, StatName, &mut i8) -> bool;
pub type TransformStatusHook =
    fn(&Effect, &Field, CreatureId, &mut Option<&'static EffectTemplate>) -> bool;
pub type TransformHealthHook = fn(&Effect, i32, bool) -> i32;
pub type ImmunityHook = fn(&Effect, &Field, CreatureId, CreatureId) -> Option<TypeId>;
pub type CritModifierHook = fn(&Effect) -> i32;
pub type InherentPriorityHook = fn(&Effect) -> i32;
pub type StatModifierHook =
    fn(&Effect, &Field, StatName, CreatureId, Option<CreatureId>) -> Option<StatModifier>;
pub type ModifierHook =
    fn(&Effect, &Field, CreatureId, CreatureId, &MoveTemplate, bool, usize) -> Option<DamageModifier>;
pub type SwitchInHook = fn(&mut EffectCx<'_>, &mut Effect);
pub type SwitchOutHook = fn(&Effect) -> bool;
pub type InformTargetedHook = fn(&mut Effect, CreatureId, &MoveTemplate);
pub type InformDamagedHook = fn(&mut EffectCx<'_>, &mut Effect, CreatureId, MoveId, i32);
pub type MessageHook = fn(&mut EffectCx<'_>, &mut Effect, &str, &[EffectArg]) -> Option<EffectArg>;
pub type TickHook = fn(&mut EffectCx<'_>, &mut Effect);

/// The capability table. Every slot is optional; `EffectHooks::NONE`
/// participates in nothing.
#[derive(Clone, Copy)]
pub struct EffectHooks {
    /// Install; returning false cancels installation.
    pub apply: Option<ApplyHook>,
    /// Uninstall side effects.
    pub unapply: Option<UnapplyHook>,
    /// Gates every other hook; absent means always active.
    pub is_active: Option<ActiveHook>,
    /// Eligible for the between-turns sweep.
    pub is_removable: Option<RemovableHook>,
    /// Veto a move at order-submission time.
    pub veto_selection: Option<VetoSelectionHook>,
    /// Veto a move at resolution time; dispatched in veto-tier order.
    pub veto_execution: Option<VetoExecutionHook>,
    /// Rewrite a stat stage; first hook returning true wins.
    pub transform_stat_level: Option<TransformStatLevelHook>,
    /// Rewrite, replace or cancel an incoming status.
    pub transform_status: Option<TransformStatusHook>,
    /// Modify a damage/heal delta; applied cumulatively.
    pub transform_health_change: Option<TransformHealthHook>,
    /// Contribute a type immunity.
    pub immunity: Option<ImmunityHook>,
    /// Cancel a pending immunity of the same type, or add a weakness.
    pub vulnerability: Option<ImmunityHook>,
    /// Additive critical-hit stage; summed.
    pub critical_modifier: Option<CritModifierHook>,
    /// Speed-bracket bias; the value of greatest magnitude wins.
    pub inherent_priority: Option<InherentPriorityHook>,
    pub stat_modifier: Option<StatModifierHook>,
    pub modifier: Option<ModifierHook>,
    pub switch_in: Option<SwitchInHook>,
    /// Returning true drops the effect on switch-out.
    pub switch_out: Option<SwitchOutHook>,
    pub inform_targeted: Option<InformTargetedHook>,
    pub inform_damaged: Option<InformDamagedHook>,
    /// Free-form named notification.
    pub message: Option<MessageHook>,
    /// End-of-turn residual behavior; dispatched in tick-tier order.
    pub tick: Option<TickHook>,
}

impl EffectHooks {
    pub const NONE: EffectHooks = EffectHooks {
        apply: None,
        unapply: None,
        is_active: None,
        is_removable: None,
        veto_selection: None,
        veto_execution: None,
        transform_stat_level: None,
        transform_status: None,
        transform_health_change: None,
        immunity: None,
        vulnerability: None,
        critical_modifier: None,
        inherent_priority: None,
        stat_modifier: None,
        modifier: None,
        switch_in: None,
        switch_out: None,
        inform_targeted: None,
        inform_damaged: None,
        message: None,
        tick: None,
    };
}

/// The static description an effect instance is stamped from.
pub struct EffectTemplate {
    pub id: &'static str,
    pub kind: EffectKind,
    pub singleton: bool,
    /// 0 = no lock.
    pub lock: i32,
    pub veto_tier: i32,
    pub tick_tier: i32,
    pub hooks: EffectHooks,
}

impl std::fmt::Debug for EffectTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectTemplate")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// One installed effect instance. `subject` is `None` for field-level
/// effects.
pub struct Effect {
    pub template: &'static EffectTemplate,
    pub handle: EffectHandle,
    pub subject: Option<CreatureId>,
    pub inducer: Option<CreatureId>,
    pub state: EffectState,
    removable: bool,
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.template.id)
            .field("handle", &self.handle)
            .field("removable", &self.removable)
            .finish()
    }
}

impl Effect {
    pub fn new(
        template: &'static EffectTemplate,
        handle: EffectHandle,
        subject: Option<CreatureId>,
        inducer: Option<CreatureId>,
    ) -> Self {
        Self {
            template,
            handle,
            subject,
            inducer,
            state: EffectState::default(),
            removable: false,
        }
    }

    pub fn id(&self) -> &'static str {
        self.template.id
    }

    pub fn kind(&self) -> EffectKind {
        self.template.kind
    }

    pub fn lock(&self) -> i32 {
        self.template.lock
    }

    pub fn veto_tier(&self) -> i32 {
        self.template.veto_tier
    }

    /// Whether the effect currently participates in hooks.
    pub fn is_active(&self, field: &Field) -> bool {
        if self.removable {
            return false;
        }
        match self.template.hooks.is_active {
            Some(hook) => hook(self, field),
            None => true,
        }
    }

    /// Whether the between-turns sweep should drop this effect.
    pub fn is_removable(&self) -> bool {
        if self.removable {
            return true;
        }
        match self.template.hooks.is_removable {
            Some(hook) => hook(self),
            None => false,
        }
    }

    /// Flag for the sweep; the effect stops participating immediately.
    pub fn mark_removable(&mut self) {
        self.removable = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static INERT: EffectTemplate = EffectTemplate {
        id: "inert",
        kind: EffectKind::Condition,
        singleton: true,
        lock: 0,
        veto_tier: 0,
        tick_tier: 0,
        hooks: EffectHooks::NONE,
    };

    #[test]
    fn marked_effects_report_removable() {
        let mut effect = Effect::new(&INERT, EffectHandle(1), Some(CreatureId::new(0, 0)), None);
        assert!(!effect.is_removable());
        effect.mark_removable();
        assert!(effect.is_removable());
    }
}
