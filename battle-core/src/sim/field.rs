//! The battle field: arena-owned teams, active slots, round execution.
//!
//! All cross-creature operations live here and address creatures through
//! [`CreatureId`]. Effects never hold references; the field detaches one
//! effect at a time while running its mutating hooks.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{error, warn};

use crate::dex::{text, CreatureSpec, Dex, MoveId, MoveTemplate, StatName, TargetClass, TypeId};
use crate::events::{BattleEvent, EventSink, SlotReveal};
use crate::mechanics::{mechanics_for, Generation, Mechanics};
use crate::sim::creature::Creature;
use crate::sim::effect::{
    Effect, EffectArg, EffectCx, EffectHandle, EffectKind, EffectTemplate, StatModifier,
};
use crate::sim::effects;
use crate::sim::moves;
use crate::sim::CreatureId;

pub const TEAM_COUNT: usize = 2;

/// One order submitted for one active slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TurnOrder {
    /// Move index into the creature's move list (-1 = forced move) and the
    /// encoded target slot (enemy slots follow own slots; -1 = none).
    Move { slot: i8, target: i8 },
    /// Roster position to switch to.
    Switch { index: usize },
}

/// Entry on the execution stack while a move resolves.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExecutionFrame {
    pub user: CreatureId,
    pub move_id: MoveId,
}

struct Scheduled {
    id: CreatureId,
    party: usize,
    slot: usize,
    order: TurnOrder,
    priority: i8,
    inherent: i32,
    speed: u16,
    coin: u32,
}

pub struct Field {
    pub(crate) dex: Arc<Dex>,
    pub(crate) generation: Generation,
    pub(crate) mech: Box<dyn Mechanics + Send>,
    pub(crate) party_size: usize,
    pub(crate) teams: [Vec<Creature>; 2],
    /// slot -> roster index; a fainted occupant keeps its slot until
    /// replaced.
    pub(crate) active: [Vec<Option<usize>>; 2],
    pub(crate) effects: Vec<Effect>,
    pub(crate) execution: Vec<ExecutionFrame>,
    pub(crate) last_move: Option<MoveId>,
    pub(crate) narration: bool,
    pub(crate) host: usize,
    pub(crate) trainers: [String; 2],
    pub(crate) rng: SmallRng,
    pub(crate) sink: Box<dyn EventSink>,
    pub(crate) struggle_id: MoveId,
    next_field_handle: u32,
    /// `Some(party)` once decided; -1 encodes a draw.
    outcome: Option<i16>,
}

impl Field {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dex: Arc<Dex>,
        generation: Generation,
        teams: [Vec<CreatureSpec>; 2],
        trainers: [String; 2],
        party_size: usize,
        host: usize,
        seed: u64,
        sink: Box<dyn EventSink>,
    ) -> Result<Field> {
        if !(1..=2).contains(&party_size) {
            return Err(anyhow!("party size must be 1 or 2"));
        }
        let mech = mechanics_for(generation);
        let struggle_id = dex
            .move_named(crate::dex::STRUGGLE)
            .ok_or_else(|| anyhow!("dex has no Struggle entry"))?
            .id;

        let mut built: [Vec<Creature>; 2] = [Vec::new(), Vec::new()];
        for (party, specs) in teams.into_iter().enumerate() {
            if specs.is_empty() {
                return Err(anyhow!("party {party} has no creatures"));
            }
            for (index, spec) in specs.into_iter().enumerate() {
                let mut creature = Creature::build(&dex, &*mech, spec)?;
                creature.id = CreatureId::new(party, index);
                built[party].push(creature);
            }
        }

        let mut field = Field {
            dex,
            generation,
            mech,
            party_size,
            teams: built,
            active: [vec![None; party_size], vec![None; party_size]],
            effects: Vec::new(),
            execution: Vec::new(),
            last_move: None,
            narration: true,
            host,
            trainers,
            rng: SmallRng::seed_from_u64(seed),
            sink,
            struggle_id,
            next_field_handle: 0,
            outcome: None,
        };

        // Install abilities and items as effects on every creature.
        for id in field.all_ids() {
            let ability = effects::ability(&field.creature(id).spec.ability);
            field.apply_status(id, None, ability);
            if let Some(item_name) = field.creature(id).spec.item.clone() {
                match effects::item(&item_name) {
                    Some(item) => {
                        field.apply_status(id, None, item);
                    }
                    None => warn!(item = %item_name, "unknown item, not installed"),
                }
            }
        }
        Ok(field)
    }

    // ---- lookups ---------------------------------------------------------

    pub fn dex(&self) -> &Dex {
        &self.dex
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn party_size(&self) -> usize {
        self.party_size
    }

    pub fn host(&self) -> usize {
        self.host
    }

    pub fn trainer(&self, party: usize) -> &str {
        &self.trainers[party]
    }

    pub fn creature(&self, id: CreatureId) -> &Creature {
        &self.teams[id.party][id.index]
    }

    pub fn creature_mut(&mut self, id: CreatureId) -> &mut Creature {
        &mut self.teams[id.party][id.index]
    }

    pub fn team(&self, party: usize) -> &[Creature] {
        &self.teams[party]
    }

    pub fn active_id(&self, party: usize, slot: usize) -> Option<CreatureId> {
        let index = (*self.active[party].get(slot)?)?;
        Some(CreatureId::new(party, index))
    }

    /// Occupied active slots in (party, slot) lexicographic order,
    /// including fainted occupants awaiting replacement.
    pub fn active_ids(&self) -> Vec<CreatureId> {
        let mut out = Vec::new();
        for party in 0..TEAM_COUNT {
            for slot in 0..self.party_size {
                if let Some(id) = self.active_id(party, slot) {
                    out.push(id);
                }
            }
        }
        out
    }

    fn all_ids(&self) -> Vec<CreatureId> {
        let mut out = Vec::new();
        for (party, team) in self.teams.iter().enumerate() {
            for index in 0..team.len() {
                out.push(CreatureId::new(party, index));
            }
        }
        out
    }

    pub fn alive_count(&self, party: usize) -> usize {
        self.teams[party].iter().filter(|c| !c.is_fainted()).count()
    }

    /// Last move resolved anywhere on the field.
    pub fn last_move(&self) -> Option<MoveId> {
        self.last_move
    }

    /// Toggle descriptive text events; state-bearing events always flow.
    pub fn set_narration(&mut self, enabled: bool) {
        self.narration = enabled;
    }

    pub fn outcome(&self) -> Option<i16> {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    // ---- events ----------------------------------------------------------

    pub(crate) fn broadcast(&mut self, event: BattleEvent) {
        self.sink.broadcast(event);
    }

    pub(crate) fn send_to(&mut self, party: usize, event: BattleEvent) {
        self.sink.send_to(party, event);
    }

    /// Emit a text-table reference; suppressed when narration is off.
    pub(crate) fn print(&mut self, category: u8, message: u16, args: Vec<String>) {
        if self.narration {
            self.broadcast(BattleEvent::Print { category, message, args });
        }
    }

    fn snapshot(&self) -> BattleEvent {
        let mut slots: [Vec<Option<SlotReveal>>; 2] = [Vec::new(), Vec::new()];
        for party in 0..TEAM_COUNT {
            for slot in 0..self.party_size {
                let reveal = self.active_id(party, slot).and_then(|id| {
                    let c = self.creature(id);
                    if c.is_fainted() {
                        return None;
                    }
                    Some(SlotReveal {
                        species: c.species_id,
                        gender: c.spec.gender.to_wire(),
                        shiny: c.spec.shiny,
                    })
                });
                slots[party].push(reveal);
            }
        }
        BattleEvent::PokemonSnapshot { slots }
    }

    pub fn emit_snapshot(&mut self) {
        let event = self.snapshot();
        self.broadcast(event);
    }

    /// The current reveal grid, for late joiners.
    pub fn snapshot_event(&self) -> BattleEvent {
        self.snapshot()
    }

    /// Turn-counter announcement, driven by the turn controller.
    pub fn announce_turn(&mut self, turn: u16) {
        self.broadcast(BattleEvent::BeginTurn { turn });
    }

    /// Initial reveal: private `Begin` to each participant, then the
    /// species grid to every observer. The turn counter is the turn
    /// controller's job.
    pub fn begin_battle(&mut self) {
        for party in 0..TEAM_COUNT {
            let event = BattleEvent::Begin {
                opponent: self.trainers[1 - party].clone(),
                party: party as u8,
            };
            self.send_to(party, event);
        }
        for party in 0..TEAM_COUNT {
            for slot in 0..self.party_size.min(self.teams[party].len()) {
                self.active[party][slot] = Some(slot);
                self.teams[party][slot].slot = slot as i8;
            }
        }
        self.emit_snapshot();
        for id in self.active_ids() {
            self.run_switch_in(id);
        }
    }

    // ---- effect dispatch -------------------------------------------------

    /// Detach the addressed effect, run `f` with full field access, then
    /// reattach it at its old position. Appends made during `f` stay after
    /// the existing entries.
    pub(crate) fn run_mutating_hook<R>(
        &mut self,
        id: CreatureId,
        handle: EffectHandle,
        f: impl FnOnce(&mut EffectCx<'_>, &mut Effect) -> R,
    ) -> Option<R> {
        let idx = self
            .creature(id)
            .effects
            .iter()
            .position(|e| e.handle == handle)?;
        let mut effect = self.creature_mut(id).effects.remove(idx);
        let mut cx = EffectCx { field: self, subject: Some(id) };
        let out = f(&mut cx, &mut effect);
        let len = self.creature(id).effects.len();
        self.creature_mut(id).effects.insert(idx.min(len), effect);
        Some(out)
    }

    pub(crate) fn run_field_hook<R>(
        &mut self,
        handle: EffectHandle,
        f: impl FnOnce(&mut EffectCx<'_>, &mut Effect) -> R,
    ) -> Option<R> {
        let idx = self.effects.iter().position(|e| e.handle == handle)?;
        let mut effect = self.effects.remove(idx);
        let mut cx = EffectCx { field: self, subject: None };
        let out = f(&mut cx, &mut effect);
        let len = self.effects.len();
        self.effects.insert(idx.min(len), effect);
        Some(out)
    }

    fn active_creature_handles(
        &self,
        id: CreatureId,
        has_hook: impl Fn(&Effect) -> bool,
    ) -> Vec<EffectHandle> {
        self.creature(id)
            .effects
            .iter()
            .filter(|e| e.is_active(self) && has_hook(e))
            .map(|e| e.handle)
            .collect()
    }

    fn active_field_handles(&self, has_hook: impl Fn(&Effect) -> bool) -> Vec<EffectHandle> {
        self.effects
            .iter()
            .filter(|e| e.is_active(self) && has_hook(e))
            .map(|e| e.handle)
            .collect()
    }

    // ---- status application ----------------------------------------------

    /// Install an effect on a creature, honoring lock and singleton rules
    /// and the `transform_status` chains. Returns the installed handle.
    pub fn apply_status(
        &mut self,
        target: CreatureId,
        inducer: Option<CreatureId>,
        template: &'static EffectTemplate,
    ) -> Option<EffectHandle> {
        if template.lock != 0 && self.creature(target).status_by_lock(template.lock).is_some() {
            return None;
        }
        if template.singleton && self.creature(target).status_by_id(template.id).is_some() {
            return None;
        }

        let mut pending = Some(template);
        for e in &self.creature(target).effects {
            if !e.is_active(self) {
                continue;
            }
            if let Some(hook) = e.template.hooks.transform_status {
                hook(e, self, target, &mut pending);
                if pending.is_none() {
                    return None;
                }
            }
        }
        for e in &self.effects {
            if !e.is_active(self) {
                continue;
            }
            if let Some(hook) = e.template.hooks.transform_status {
                hook(e, self, target, &mut pending);
                if pending.is_none() {
                    return None;
                }
            }
        }
        let template = pending?;

        let handle = self.creature_mut(target).allocate_handle();
        let mut effect = Effect::new(template, handle, Some(target), inducer);
        if let Some(apply) = template.hooks.apply {
            let mut cx = EffectCx { field: self, subject: Some(target) };
            if !apply(&mut cx, &mut effect) {
                return None;
            }
        }
        self.creature_mut(target).effects.push(effect);
        Some(handle)
    }

    /// Whether a live field-level effect with the given id is installed.
    pub fn has_field_effect(&self, id: &str) -> bool {
        self.effects.iter().any(|e| !e.is_removable() && e.id() == id)
    }

    /// Install a field-level effect.
    pub fn apply_field_effect(&mut self, template: &'static EffectTemplate) -> Option<EffectHandle> {
        if template.singleton && self.effects.iter().any(|e| !e.is_removable() && e.id() == template.id) {
            return None;
        }
        self.next_field_handle += 1;
        let handle = EffectHandle(self.next_field_handle);
        let mut effect = Effect::new(template, handle, None, None);
        if let Some(apply) = template.hooks.apply {
            let mut cx = EffectCx { field: self, subject: None };
            if !apply(&mut cx, &mut effect) {
                return None;
            }
        }
        self.effects.push(effect);
        Some(handle)
    }

    /// Uninstall: run `unapply`, then flag for the sweep.
    pub fn remove_status(&mut self, target: CreatureId, handle: EffectHandle) {
        let unapply = self
            .creature(target)
            .effect_by_handle(handle)
            .and_then(|e| e.template.hooks.unapply);
        if let Some(hook) = unapply {
            self.run_mutating_hook(target, handle, |cx, e| hook(cx, e));
        }
        if let Some(effect) = self.creature_mut(target).effect_by_handle_mut(handle) {
            effect.mark_removable();
        }
    }

    /// Replace the creature's ability effect, e.g. on switch-out restore.
    pub fn set_ability(&mut self, id: CreatureId, template: &'static EffectTemplate) {
        let old = self
            .creature(id)
            .effects
            .iter()
            .find(|e| !e.is_removable() && e.kind() == EffectKind::Ability)
            .map(|e| e.handle);
        if let Some(handle) = old {
            self.remove_status(id, handle);
        }
        self.apply_status(id, None, template);
    }

    // ---- hook surfaces ---------------------------------------------------

    /// Move selection veto at order-submission time: subject's effects in
    /// list order, then field effects.
    pub fn veto_selection(&self, user: CreatureId, template: &MoveTemplate) -> bool {
        let creature = self.creature(user);
        for e in &creature.effects {
            if !e.is_active(self) {
                continue;
            }
            if let Some(hook) = e.template.hooks.veto_selection {
                if hook(e, creature, template) {
                    return true;
                }
            }
        }
        for e in &self.effects {
            if !e.is_active(self) {
                continue;
            }
            if let Some(hook) = e.template.hooks.veto_selection {
                if hook(e, creature, template) {
                    return true;
                }
            }
        }
        false
    }

    /// Execution-time veto: the user's effects in ascending veto-tier
    /// order, then field effects. Hooks may mutate (paralysis rolls, sleep
    /// counters) and print.
    pub fn veto_execution(
        &mut self,
        user: CreatureId,
        target: Option<CreatureId>,
        template: &MoveTemplate,
    ) -> bool {
        let mut tiers: Vec<(i32, EffectHandle)> = self
            .creature(user)
            .effects
            .iter()
            .filter(|e| e.is_active(self) && e.template.hooks.veto_execution.is_some())
            .map(|e| (e.veto_tier(), e.handle))
            .collect();
        tiers.sort_by_key(|&(tier, _)| tier);
        for (_, handle) in tiers {
            let hook = match self.creature(user).effect_by_handle(handle) {
                Some(e) if e.is_active(self) => e.template.hooks.veto_execution,
                _ => None,
            };
            if let Some(hook) = hook {
                let vetoed = self
                    .run_mutating_hook(user, handle, |cx, e| hook(cx, e, user, target, template))
                    .unwrap_or(false);
                if vetoed {
                    return true;
                }
            }
        }
        for handle in self.active_field_handles(|e| e.template.hooks.veto_execution.is_some()) {
            let hook = self
                .effects
                .iter()
                .find(|e| e.handle == handle)
                .and_then(|e| e.template.hooks.veto_execution);
            if let Some(hook) = hook {
                let vetoed = self
                    .run_field_hook(handle, |cx, e| hook(cx, e, user, target, template))
                    .unwrap_or(false);
                if vetoed {
                    return true;
                }
            }
        }
        false
    }

    /// Switch veto through the free-form message capability.
    pub fn veto_switch(&mut self, id: CreatureId) -> bool {
        matches!(
            self.send_effect_message(id, "vetoSwitch", &[]),
            Some(EffectArg::Bool(true))
        )
    }

    /// First-true-wins stat-stage rewrite: subject's effects, then field.
    pub fn transform_stat_level(
        &self,
        user: CreatureId,
        target: Option<CreatureId>,
        stat: StatName,
        level: &mut i8,
    ) -> bool {
        for e in &self.creature(user).effects {
            if e.is_removable() || !e.is_active(self) {
                continue;
            }
            if let Some(hook) = e.template.hooks.transform_stat_level {
                if hook(e, self, user, target, stat, level) {
                    return true;
                }
            }
        }
        for e in &self.effects {
            if !e.is_active(self) {
                continue;
            }
            if let Some(hook) = e.template.hooks.transform_stat_level {
                if hook(e, self, user, target, stat, level) {
                    return true;
                }
            }
        }
        false
    }

    /// Cumulative health-delta rewrite over the subject's effects.
    fn transform_health_change(&self, id: CreatureId, mut delta: i32, indirect: bool) -> i32 {
        for e in &self.creature(id).effects {
            if !e.is_active(self) {
                continue;
            }
            if let Some(hook) = e.template.hooks.transform_health_change {
                delta = hook(e, delta, indirect);
            }
        }
        delta
    }

    /// Summed additive crit stages on the user.
    pub fn critical_modifier(&self, id: CreatureId) -> i32 {
        let mut total = 0;
        for e in &self.creature(id).effects {
            if !e.is_active(self) {
                continue;
            }
            if let Some(hook) = e.template.hooks.critical_modifier {
                total += hook(e);
            }
        }
        total
    }

    /// Speed-bracket bias; the contribution of greatest magnitude wins.
    pub fn inherent_priority(&self, id: CreatureId) -> i32 {
        let mut best: i32 = 0;
        for e in &self.creature(id).effects {
            if !e.is_active(self) {
                continue;
            }
            if let Some(hook) = e.template.hooks.inherent_priority {
                let v = hook(e);
                if v.abs() > best.abs() {
                    best = v;
                }
            }
        }
        best
    }

    /// Effective stat: base × stage curve (priority 0) × effect modifiers
    /// in ascending priority order.
    pub fn stat(&self, id: CreatureId, stat: StatName) -> u16 {
        let creature = self.creature(id);
        let Some(base_index) = stat.base_index() else {
            return 0;
        };
        if stat == StatName::Hp {
            return creature.stats[0];
        }
        let mut mods: BTreeMap<i32, f32> = BTreeMap::new();
        for other in self.active_ids() {
            for e in &self.creature(other).effects {
                if !e.is_active(self) {
                    continue;
                }
                if let Some(hook) = e.template.hooks.stat_modifier {
                    if let Some(StatModifier { priority, value }) = hook(e, self, stat, id, None) {
                        mods.insert(priority, value);
                    }
                }
            }
        }
        for e in &self.effects {
            if !e.is_active(self) {
                continue;
            }
            if let Some(hook) = e.template.hooks.stat_modifier {
                if let Some(StatModifier { priority, value }) = hook(e, self, stat, id, None) {
                    mods.insert(priority, value);
                }
            }
        }
        mods.insert(0, self.mech.stage_multiplier(creature.stage(stat)));

        let mut value = creature.stats[base_index] as f32;
        for multiplier in mods.values() {
            value *= multiplier;
        }
        value as u16
    }

    pub fn effective_speed(&self, id: CreatureId) -> u16 {
        self.stat(id, StatName::Spe)
    }

    /// Type effectiveness with effect-granted immunities and
    /// vulnerabilities accumulated from the target's effects and the
    /// field. A vulnerability cancels a pending immunity of the same type;
    /// against a chart immunity it re-enables the pairing at ×1.
    pub fn type_effectiveness(
        &self,
        move_type: TypeId,
        user: CreatureId,
        target: CreatureId,
    ) -> f32 {
        let mut multiplier = 1.0;
        let mut chart_immune = false;
        for &defending in &self.creature(target).types {
            let m = self.dex.type_multiplier(move_type, defending);
            if m == 0.0 {
                chart_immune = true;
            }
            multiplier *= m;
        }

        let mut immunities: Vec<TypeId> = Vec::new();
        let mut vulnerabilities: Vec<TypeId> = Vec::new();
        let mut accumulate = |e: &Effect, field: &Field| {
            if let Some(hook) = e.template.hooks.immunity {
                if let Some(t) = hook(e, field, user, target) {
                    immunities.push(t);
                }
            }
            if let Some(hook) = e.template.hooks.vulnerability {
                if let Some(t) = hook(e, field, user, target) {
                    if let Some(pos) = immunities.iter().position(|&i| i == t) {
                        immunities.remove(pos);
                    } else {
                        vulnerabilities.push(t);
                    }
                }
            }
        };
        for e in &self.creature(target).effects {
            if e.is_active(self) {
                accumulate(e, self);
            }
        }
        for e in &self.effects {
            if e.is_active(self) {
                accumulate(e, self);
            }
        }

        if immunities.contains(&move_type) {
            return 0.0;
        }
        if vulnerabilities.contains(&move_type) {
            if chart_immune {
                // Re-enable the zeroed pairing at neutral.
                multiplier = 1.0;
                for &defending in &self.creature(target).types {
                    let m = self.dex.type_multiplier(move_type, defending);
                    if m != 0.0 {
                        multiplier *= m;
                    }
                }
            } else {
                multiplier *= 2.0;
            }
        }
        multiplier
    }

    /// Free-form named notification to a creature's effects; the last
    /// responding hook's value is returned.
    pub fn send_effect_message(
        &mut self,
        id: CreatureId,
        name: &str,
        args: &[EffectArg],
    ) -> Option<EffectArg> {
        let mut result = None;
        for handle in self.active_creature_handles(id, |e| e.template.hooks.message.is_some()) {
            let hook = match self.creature(id).effect_by_handle(handle) {
                Some(e) => e.template.hooks.message,
                None => None,
            };
            if let Some(hook) = hook {
                if let Some(Some(value)) =
                    self.run_mutating_hook(id, handle, |cx, e| hook(cx, e, name, args))
                {
                    result = Some(value);
                }
            }
        }
        result
    }

    pub(crate) fn inform_targeted(&mut self, target: CreatureId, user: CreatureId, move_id: MoveId) {
        let dex = self.dex.clone();
        let Some(template) = dex.get_move(move_id) else {
            return;
        };
        let handles =
            self.active_creature_handles(target, |e| e.template.hooks.inform_targeted.is_some());
        for handle in handles {
            let hook = self
                .creature(target)
                .effect_by_handle(handle)
                .and_then(|e| e.template.hooks.inform_targeted);
            if let Some(hook) = hook {
                if let Some(e) = self.creature_mut(target).effect_by_handle_mut(handle) {
                    hook(e, user, template);
                }
            }
        }
        if template.has_flag(crate::dex::FLAG_MEMORABLE) {
            self.creature_mut(target).remember_targeting(user, move_id);
        }
    }

    // ---- health ----------------------------------------------------------

    /// Clamp, run the health-change pipeline, apply, notify. The attacker
    /// is informed and the target's damage memory updated only when the
    /// delta is damage dealt inside a move resolution.
    pub fn set_hp(&mut self, id: CreatureId, new_hp: i32) {
        if self.creature(id).is_fainted() {
            return;
        }
        let max = self.creature(id).max_hp() as i32;
        let new_hp = new_hp.clamp(0, max);
        let frame = self.execution.last().copied();
        let indirect = frame.map_or(true, |f| f.user == id);
        let raw = self.creature(id).hp as i32 - new_hp;
        let delta = self.transform_health_change(id, raw, indirect);
        if delta == 0 {
            return;
        }
        let after = (self.creature(id).hp as i32 - delta).clamp(0, max);
        self.creature_mut(id).hp = after as u16;

        let (party, slot, name) = {
            let c = self.creature(id);
            (c.id.party as u8, c.slot.max(0) as u8, c.nickname.clone())
        };
        let max_hp = self.creature(id).max_hp();
        self.broadcast(BattleEvent::HealthChange {
            party,
            slot,
            name,
            delta: crate::events::scale_hp(delta, max_hp),
            total: crate::events::scale_hp(after, max_hp),
        });

        if let Some(frame) = frame {
            if delta > 0 && frame.user != id {
                self.send_effect_message(
                    frame.user,
                    "informDamaging",
                    &[EffectArg::Creature(id), EffectArg::Int(delta)],
                );
                self.creature_mut(id).record_damage(crate::sim::creature::DamageRecord {
                    attacker: frame.user,
                    move_id: frame.move_id,
                    amount: delta,
                });
                let handles =
                    self.active_creature_handles(id, |e| e.template.hooks.inform_damaged.is_some());
                for handle in handles {
                    let hook = self
                        .creature(id)
                        .effect_by_handle(handle)
                        .and_then(|e| e.template.hooks.inform_damaged);
                    if let Some(hook) = hook {
                        self.run_mutating_hook(id, handle, |cx, e| {
                            hook(cx, e, frame.user, frame.move_id, delta)
                        });
                    }
                }
            }
        }

        if after == 0 {
            self.faint(id);
        }
    }

    pub fn faint(&mut self, id: CreatureId) {
        self.creature_mut(id).fainted = true;
        let (party, slot, name) = {
            let c = self.creature(id);
            (c.id.party as u8, c.slot.max(0) as u8, c.nickname.clone())
        };
        self.broadcast(BattleEvent::Fainted { party, slot, name });
        self.emit_snapshot();
        for other in self.all_ids() {
            if other != id {
                self.creature_mut(other).forget(id);
            }
        }
    }

    // ---- stat stages -----------------------------------------------------

    /// Apply a stage delta through the rewrite chain, clamp, and narrate.
    pub fn change_stat_stage(
        &mut self,
        cause: Option<CreatureId>,
        target: CreatureId,
        stat: StatName,
        delta: i8,
    ) {
        let current = self.creature(target).stage(stat);
        let mut level = current.saturating_add(delta);
        self.transform_stat_level(cause.unwrap_or(target), Some(target), stat, &mut level);
        let stored = self.creature_mut(target).set_stage(stat, level);
        let token = self.creature(target).token();
        let label = stat.label().to_string();
        if stored == current {
            self.print(text::BATTLE, text::MSG_STAT_CAPPED, vec![token, label]);
        } else if stored > current {
            self.print(text::BATTLE, text::MSG_STAT_ROSE, vec![token, label]);
        } else {
            self.print(text::BATTLE, text::MSG_STAT_FELL, vec![token, label]);
        }
    }

    // ---- execution stack -------------------------------------------------

    pub(crate) fn push_execution(&mut self, frame: ExecutionFrame) {
        self.execution.push(frame);
    }

    pub(crate) fn pop_execution(&mut self) {
        self.execution.pop();
    }

    pub fn top_execution(&self) -> Option<ExecutionFrame> {
        self.execution.last().copied()
    }

    // ---- legality --------------------------------------------------------

    /// Refresh the legal-switch flag, per-move legality bits and the
    /// forced-move fallback for one active creature.
    pub fn determine_legal_actions(&mut self, id: CreatureId) {
        let vetoed_switch = self.veto_switch(id);
        let move_ids: Vec<(MoveId, u8)> = self
            .creature(id)
            .moves
            .iter()
            .map(|m| (m.move_id, m.pp))
            .collect();
        let mut bits = vec![false; move_ids.len()];
        let mut any_legal = false;
        for (i, (move_id, pp)) in move_ids.iter().enumerate() {
            if *pp == 0 {
                continue;
            }
            let Some(template) = self.dex.get_move(*move_id) else {
                continue;
            };
            let template = template.clone();
            if !self.veto_selection(id, &template) {
                bits[i] = true;
                any_legal = true;
            }
        }
        let struggle_id = self.struggle_id;
        let creature = self.creature_mut(id);
        creature.legal_switch = !vetoed_switch;
        creature.legal_moves = bits;
        creature.forced_move = if any_legal { None } else { Some(struggle_id) };
    }

    /// Per-roster switch legality for one party: alive and benched.
    pub fn legal_switches(&self, party: usize) -> Vec<bool> {
        self.teams[party]
            .iter()
            .map(|c| !c.is_fainted() && !c.is_active())
            .collect()
    }

    /// Submission-time order legality for one active creature. Anything
    /// rejected here never reaches `process_turn`.
    pub fn is_turn_legal(&self, id: CreatureId, order: &TurnOrder, replacement: bool) -> bool {
        let creature = self.creature(id);
        match *order {
            TurnOrder::Switch { index } => {
                let Some(candidate) = self.teams[id.party].get(index) else {
                    return false;
                };
                if candidate.is_fainted() || candidate.is_active() || index == id.index {
                    return false;
                }
                replacement || creature.legal_switch
            }
            TurnOrder::Move { slot, target } => {
                if replacement {
                    return false;
                }
                if target >= (self.party_size * TEAM_COUNT) as i8 {
                    return false;
                }
                if creature.forced_move.is_some() {
                    return slot == -1;
                }
                if slot < 0 {
                    return false;
                }
                let slot = slot as usize;
                slot < creature.moves.len() && creature.legal_moves.get(slot).copied().unwrap_or(false)
            }
        }
    }

    // ---- switching -------------------------------------------------------

    fn run_switch_in(&mut self, id: CreatureId) {
        let handles = self.active_creature_handles(id, |e| e.template.hooks.switch_in.is_some());
        for handle in handles {
            let hook = self
                .creature(id)
                .effect_by_handle(handle)
                .and_then(|e| e.template.hooks.switch_in);
            if let Some(hook) = hook {
                self.run_mutating_hook(id, handle, |cx, e| hook(cx, e));
            }
        }
    }

    /// Withdraw the slot occupant: drop effects that do not survive the
    /// switch, restore the original ability, clear round-local state.
    fn switch_out(&mut self, id: CreatureId) {
        let dropped: Vec<EffectHandle> = self
            .creature(id)
            .effects
            .iter()
            .filter(|e| {
                e.is_active(self)
                    && e.template.hooks.switch_out.map_or(false, |hook| hook(e))
            })
            .map(|e| e.handle)
            .collect();
        for handle in dropped {
            self.remove_status(id, handle);
        }
        let ability = effects::ability(&self.creature(id).spec.ability);
        self.set_ability(id, ability);
        self.sweep_creature(id);
        self.creature_mut(id).clear_on_switch_out();
        for other in self.all_ids() {
            if other != id {
                self.creature_mut(other).forget(id);
            }
        }
    }

    /// Voluntary or forced switch during a round: withdraw then send out.
    pub fn perform_switch(&mut self, party: usize, slot: usize, incoming: usize) {
        if let Some(old) = self.active_id(party, slot) {
            if !self.creature(old).is_fainted() {
                let (p, s, name) = {
                    let c = self.creature(old);
                    (party as u8, slot as u8, c.nickname.clone())
                };
                self.broadcast(BattleEvent::Withdraw { party: p, slot: s, name });
            }
            self.switch_out(old);
        }
        self.send_out(party, slot, incoming);
    }

    /// Fill a slot without a withdraw notification (replacements, entry).
    pub fn send_out(&mut self, party: usize, slot: usize, incoming: usize) {
        self.active[party][slot] = Some(incoming);
        self.teams[party][incoming].slot = slot as i8;
        let name = self.teams[party][incoming].nickname.clone();
        self.broadcast(BattleEvent::SendOut {
            party: party as u8,
            slot: slot as u8,
            index: incoming as u8,
            name,
        });
        self.emit_snapshot();
        self.run_switch_in(CreatureId::new(party, incoming));
    }

    // ---- round execution -------------------------------------------------

    /// Resolve one full round. Orders arrive in (party, slot) order, one
    /// per occupied active slot, already validated at submission; an
    /// illegal order here is an internal fault and ends the battle as a
    /// draw.
    pub fn process_turn(&mut self, orders: &[TurnOrder]) {
        let ids = self.active_ids();
        if orders.len() != ids.len() {
            error!(expected = ids.len(), got = orders.len(), "order count mismatch");
            self.inform_victory(-1);
            return;
        }
        for id in &ids {
            self.creature_mut(*id).acted = false;
        }

        let mut schedule = Vec::with_capacity(orders.len());
        for (id, order) in ids.iter().zip(orders.iter()) {
            let priority = match order {
                TurnOrder::Switch { .. } => 0,
                TurnOrder::Move { slot, .. } => {
                    let move_id = self.resolve_move_id(*id, *slot);
                    move_id
                        .and_then(|m| self.dex.get_move(m))
                        .map_or(0, |t| t.priority)
                }
            };
            schedule.push(Scheduled {
                id: *id,
                party: id.party,
                slot: self.creature(*id).slot.max(0) as usize,
                order: *order,
                priority,
                inherent: self.inherent_priority(*id),
                speed: self.effective_speed(*id),
                coin: self.rng.gen(),
            });
        }
        schedule.sort_by(|a, b| {
            let a_switch = matches!(a.order, TurnOrder::Switch { .. });
            let b_switch = matches!(b.order, TurnOrder::Switch { .. });
            b_switch
                .cmp(&a_switch)
                .then(b.priority.cmp(&a.priority))
                // Bracket bias orders by magnitude; the positive bias wins
                // a magnitude tie.
                .then(b.inherent.unsigned_abs().cmp(&a.inherent.unsigned_abs()))
                .then(b.inherent.cmp(&a.inherent))
                .then(b.speed.cmp(&a.speed))
                .then(a.coin.cmp(&b.coin))
        });

        for action in &schedule {
            if self.is_over() {
                return;
            }
            if self.creature(action.id).is_fainted() {
                continue;
            }
            match action.order {
                TurnOrder::Switch { index } => {
                    if !self.is_turn_legal(action.id, &action.order, false) {
                        error!(id = ?action.id, index, "illegal switch reached execution");
                        self.inform_victory(-1);
                        return;
                    }
                    self.perform_switch(action.party, action.slot, index);
                }
                TurnOrder::Move { slot, target } => {
                    let Some(move_id) = self.resolve_move_id(action.id, slot) else {
                        error!(id = ?action.id, slot, "unknown move index reached execution");
                        self.inform_victory(-1);
                        return;
                    };
                    let executed = moves::execute_move(self, action.id, move_id, target, true);
                    if executed && slot >= 0 {
                        self.deduct_pp(action.id, slot as usize);
                    }
                }
            }
        }

        if self.check_victory() {
            return;
        }
        self.end_of_turn();
        self.check_victory();
    }

    /// Resolve a replacement sub-round: switch orders only, matched
    /// against the fainted slots in request order.
    pub fn process_replacements(&mut self, orders: &[TurnOrder]) {
        let requests = self.replacement_requests();
        let mut orders = orders.iter();
        for party in 0..TEAM_COUNT {
            for &slot in &requests[party] {
                let Some(order) = orders.next() else {
                    error!(party, slot, "missing replacement order");
                    self.inform_victory(-1);
                    return;
                };
                let TurnOrder::Switch { index } = *order else {
                    error!(party, slot, "non-switch replacement order");
                    self.inform_victory(-1);
                    return;
                };
                if let Some(old) = self.active_id(party, slot) {
                    self.switch_out(old);
                }
                self.send_out(party, slot, index);
            }
        }
        self.check_victory();
    }

    /// Fainted active slots each party can still fill, in slot order.
    pub fn replacement_requests(&self) -> [Vec<usize>; 2] {
        let mut out: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
        for party in 0..TEAM_COUNT {
            let mut available = self.legal_switches(party).iter().filter(|&&b| b).count();
            for slot in 0..self.party_size {
                let Some(id) = self.active_id(party, slot) else {
                    continue;
                };
                if self.creature(id).is_fainted() && available > 0 {
                    out[party].push(slot);
                    available -= 1;
                }
            }
        }
        out
    }

    fn resolve_move_id(&self, id: CreatureId, slot: i8) -> Option<MoveId> {
        if slot < 0 {
            return self.creature(id).forced_move.or(Some(self.struggle_id));
        }
        self.creature(id).moves.get(slot as usize).map(|m| m.move_id)
    }

    pub fn deduct_pp(&mut self, id: CreatureId, slot: usize) {
        let creature = self.creature_mut(id);
        let Some(entry) = creature.moves.get_mut(slot) else {
            return;
        };
        entry.pp = entry.pp.saturating_sub(1);
        entry.used = true;
        let (index, pp, party) = (id.index as u8, entry.pp, id.party);
        self.send_to(
            party,
            BattleEvent::SetPp { index, move_slot: slot as u8, pp },
        );
    }

    // ---- end of turn, sweep, victory -------------------------------------

    /// Run residual effects in tick-tier order, then sweep removables.
    pub fn end_of_turn(&mut self) {
        struct TickEntry {
            tier: i32,
            order: usize,
            subject: Option<CreatureId>,
            handle: EffectHandle,
        }
        let mut entries: Vec<TickEntry> = Vec::new();
        for (order, id) in self.active_ids().into_iter().enumerate() {
            for e in &self.creature(id).effects {
                if e.is_active(self) && e.template.hooks.tick.is_some() {
                    entries.push(TickEntry {
                        tier: e.template.tick_tier,
                        order,
                        subject: Some(id),
                        handle: e.handle,
                    });
                }
            }
        }
        for e in &self.effects {
            if e.is_active(self) && e.template.hooks.tick.is_some() {
                entries.push(TickEntry {
                    tier: e.template.tick_tier,
                    order: usize::MAX,
                    subject: None,
                    handle: e.handle,
                });
            }
        }
        entries.sort_by_key(|e| (e.tier, e.order));
        for entry in entries {
            if self.is_over() {
                return;
            }
            match entry.subject {
                Some(id) => {
                    if self.creature(id).is_fainted() {
                        continue;
                    }
                    let hook = self
                        .creature(id)
                        .effect_by_handle(entry.handle)
                        .filter(|e| e.is_active(self))
                        .and_then(|e| e.template.hooks.tick);
                    if let Some(hook) = hook {
                        self.run_mutating_hook(id, entry.handle, |cx, e| hook(cx, e));
                    }
                }
                None => {
                    let hook = self
                        .effects
                        .iter()
                        .find(|e| e.handle == entry.handle)
                        .filter(|e| e.is_active(self))
                        .and_then(|e| e.template.hooks.tick);
                    if let Some(hook) = hook {
                        self.run_field_hook(entry.handle, |cx, e| hook(cx, e));
                    }
                }
            }
        }
        self.sweep();
    }

    fn sweep_creature(&mut self, id: CreatureId) {
        self.creature_mut(id).effects.retain(|e| !e.is_removable());
    }

    /// Drop every effect flagged removable, between turns.
    pub fn sweep(&mut self) {
        for id in self.all_ids() {
            self.sweep_creature(id);
        }
        self.effects.retain(|e| !e.is_removable());
    }

    /// Emit the victory event once; -1 encodes a draw.
    pub fn inform_victory(&mut self, party: i16) {
        if self.outcome.is_some() {
            return;
        }
        self.outcome = Some(party);
        self.broadcast(BattleEvent::Victory { party });
    }

    /// Decide the battle when a side is out of creatures.
    pub fn check_victory(&mut self) -> bool {
        if self.is_over() {
            return true;
        }
        let alive = [self.alive_count(0), self.alive_count(1)];
        match alive {
            [0, 0] => self.inform_victory(-1),
            [0, _] => self.inform_victory(1),
            [_, 0] => self.inform_victory(0),
            _ => return false,
        }
        true
    }

    // ---- targeting -------------------------------------------------------

    /// Materialize a target list for a move, honoring party-size
    /// adjacency. The encoded target indexes own slots first, then enemy
    /// slots.
    pub fn target_list(
        &mut self,
        user: CreatureId,
        class: TargetClass,
        encoded: i8,
    ) -> Vec<CreatureId> {
        let user_party = user.party;
        let enemy_party = 1 - user_party;
        let party_size = self.party_size;
        let decode = move |code: i8| -> Option<(usize, usize)> {
            if code < 0 {
                return None;
            }
            let code = code as usize;
            if code < party_size {
                Some((user_party, code))
            } else if code < party_size * 2 {
                Some((enemy_party, code - party_size))
            } else {
                None
            }
        };
        let alive = |field: &Field, id: CreatureId| !field.creature(id).is_fainted();
        match class {
            TargetClass::User => vec![user],
            TargetClass::Field => Vec::new(),
            TargetClass::Ally => decode(encoded)
                .filter(|&(party, _)| party == user_party)
                .and_then(|(party, slot)| self.active_id(party, slot))
                .filter(|&id| id != user && alive(self, id))
                .into_iter()
                .collect(),
            TargetClass::EnemyAdjacent => {
                let chosen = decode(encoded)
                    .filter(|&(party, _)| party == enemy_party)
                    .and_then(|(party, slot)| self.active_id(party, slot))
                    .filter(|&id| alive(self, id));
                match chosen {
                    Some(id) => vec![id],
                    // The picked target is gone; fall back to any enemy.
                    None => self.first_live_enemy(user_party).into_iter().collect(),
                }
            }
            TargetClass::RandomEnemy => {
                let pool: Vec<CreatureId> = self.live_enemies(user_party);
                if pool.is_empty() {
                    Vec::new()
                } else {
                    let pick = self.rng.gen_range(0..pool.len());
                    vec![pool[pick]]
                }
            }
            TargetClass::AllEnemies => self.live_enemies(user_party),
            TargetClass::AllOthers => self
                .active_ids()
                .into_iter()
                .filter(|&id| id != user && alive(self, id))
                .collect(),
        }
    }

    fn live_enemies(&self, user_party: usize) -> Vec<CreatureId> {
        let enemy = 1 - user_party;
        (0..self.party_size)
            .filter_map(|slot| self.active_id(enemy, slot))
            .filter(|&id| !self.creature(id).is_fainted())
            .collect()
    }

    fn first_live_enemy(&self, user_party: usize) -> Option<CreatureId> {
        self.live_enemies(user_party).into_iter().next()
    }
}
