//! The concrete effect library.
//!
//! Every entry is a static [`EffectTemplate`] whose hooks implement the
//! capability protocol natively. The registry maps normalized ids and
//! display names to templates for move payloads, team import and tests.

pub mod abilities;
pub mod conditions;
pub mod items;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::warn;

use crate::dex::normalize_id;
use crate::sim::effect::EffectTemplate;

/// End-of-turn dispatch tiers, lowest first.
pub const TICK_WEATHER: i32 = 1;
pub const TICK_ITEM: i32 = 2;
pub const TICK_STATUS: i32 = 3;

static REGISTRY: Lazy<HashMap<String, &'static EffectTemplate>> = Lazy::new(|| {
    let templates: &[&'static EffectTemplate] = &[
        &conditions::BURN,
        &conditions::POISON,
        &conditions::TOXIC,
        &conditions::PARALYSIS,
        &conditions::SLEEP,
        &conditions::FREEZE,
        &conditions::FLINCH,
        &conditions::RAIN,
        &abilities::NO_ABILITY,
        &abilities::INNER_FOCUS,
        &abilities::LEVITATE,
        &abilities::SWIFT_SWIM,
        &abilities::GUTS,
        &abilities::SPEED_BOOST,
        &abilities::STALL,
        &abilities::BLAZE,
        &items::LEFTOVERS,
        &items::CHOICE_BAND,
        &items::CHOICE_SCARF,
        &items::CHOICE_LOCK,
        &items::QUICK_CLAW,
    ];
    templates
        .iter()
        .map(|t| (normalize_id(t.id), *t))
        .collect()
});

pub fn by_id(name: &str) -> Option<&'static EffectTemplate> {
    REGISTRY.get(&normalize_id(name)).copied()
}

/// Ability lookup; an unknown name installs the inert placeholder so the
/// one-ability invariant holds.
pub fn ability(name: &str) -> &'static EffectTemplate {
    match by_id(name) {
        Some(template) => template,
        None => {
            warn!(ability = %name, "unknown ability, using placeholder");
            &abilities::NO_ABILITY
        }
    }
}

pub fn item(name: &str) -> Option<&'static EffectTemplate> {
    by_id(name)
}
