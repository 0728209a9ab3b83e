//! Built-in game data.
//!
//! A compact roster used by the stock server binary and the test suite.
//! A deployment with a full external dataset builds its own [`Dex`] and
//! hands it to the engine the same way.

use std::sync::Arc;

use crate::dex::{
    install_struggle, types, Dex, DexRef, MoveCategory, MoveTemplate, StatChange, StatName,
    StatusInflict, TargetClass, FLAG_CONTACT, FLAG_MEMORABLE,
};

fn plain_move(
    name: &str,
    move_type: u8,
    category: MoveCategory,
    power: u16,
    accuracy: Option<u8>,
    pp: u8,
    priority: i8,
) -> MoveTemplate {
    MoveTemplate {
        id: 0,
        name: name.to_string(),
        move_type,
        category,
        power,
        accuracy,
        pp,
        priority,
        target: TargetClass::EnemyAdjacent,
        flags: FLAG_CONTACT | FLAG_MEMORABLE,
        crit_stage: 0,
        recoil: None,
        recoil_max_hp: None,
        drain: None,
        inflicts: None,
        stat_changes: Vec::new(),
    }
}

/// Seven types, six species, a move pool covering damage, status,
/// priority and secondary payloads.
pub fn builtin() -> DexRef {
    let mut dex = Dex::new(types::COUNT);
    install_struggle(&mut dex);

    dex.set_type_multiplier(types::FIRE, types::GRASS, 2.0);
    dex.set_type_multiplier(types::FIRE, types::WATER, 0.5);
    dex.set_type_multiplier(types::WATER, types::FIRE, 2.0);
    dex.set_type_multiplier(types::WATER, types::GRASS, 0.5);
    dex.set_type_multiplier(types::GRASS, types::WATER, 2.0);
    dex.set_type_multiplier(types::GRASS, types::FIRE, 0.5);
    dex.set_type_multiplier(types::ELECTRIC, types::WATER, 2.0);
    dex.set_type_multiplier(types::ELECTRIC, types::FLYING, 2.0);
    dex.set_type_multiplier(types::ELECTRIC, types::GROUND, 0.0);
    dex.set_type_multiplier(types::GROUND, types::FIRE, 2.0);
    dex.set_type_multiplier(types::GROUND, types::ELECTRIC, 2.0);
    dex.set_type_multiplier(types::GROUND, types::FLYING, 0.0);

    // HP / Atk / Def / SpA / SpD / Spe.
    dex.add_species("Galewing", [78, 81, 71, 74, 69, 126], &[types::FLYING]);
    dex.add_species("Emberwing", [78, 84, 78, 109, 85, 100], &[types::FIRE, types::FLYING]);
    dex.add_species("Tidefin", [79, 83, 100, 85, 105, 58], &[types::WATER]);
    dex.add_species("Thornpaw", [75, 98, 63, 87, 73, 101], &[types::GRASS]);
    dex.add_species("Voltmouse", [35, 55, 40, 50, 50, 90], &[types::ELECTRIC]);
    dex.add_species("Terrapod", [95, 109, 105, 55, 65, 35], &[types::GROUND]);

    dex.add_move(plain_move("Tackle", types::NORMAL, MoveCategory::Physical, 40, Some(100), 35, 0));
    dex.add_move(plain_move("Gust", types::FLYING, MoveCategory::Special, 40, Some(100), 35, 0));
    dex.add_move(plain_move(
        "Mega Blast",
        types::NORMAL,
        MoveCategory::Special,
        250,
        Some(100),
        5,
        0,
    ));
    dex.add_move(plain_move("Aqua Jet", types::WATER, MoveCategory::Physical, 40, Some(100), 20, 1));
    dex.add_move(plain_move(
        "Earth Slam",
        types::GROUND,
        MoveCategory::Physical,
        80,
        Some(100),
        10,
        0,
    ));

    let mut ember = plain_move("Ember", types::FIRE, MoveCategory::Special, 40, Some(100), 25, 0);
    ember.inflicts = Some(StatusInflict { effect: "burn".into(), chance: 10 });
    dex.add_move(ember);

    let mut shock =
        plain_move("Thunder Shock", types::ELECTRIC, MoveCategory::Special, 40, Some(100), 30, 0);
    shock.inflicts = Some(StatusInflict { effect: "paralysis".into(), chance: 10 });
    dex.add_move(shock);

    let mut spore = plain_move("Stun Spore", types::GRASS, MoveCategory::Status, 0, Some(75), 30, 0);
    spore.inflicts = Some(StatusInflict { effect: "paralysis".into(), chance: 100 });
    dex.add_move(spore);

    let mut mist = plain_move("Sleep Mist", types::NORMAL, MoveCategory::Status, 0, None, 15, 0);
    mist.inflicts = Some(StatusInflict { effect: "sleep".into(), chance: 100 });
    dex.add_move(mist);

    let mut growl = plain_move("Growl", types::NORMAL, MoveCategory::Status, 0, Some(100), 40, 0);
    growl.stat_changes =
        vec![StatChange { stat: StatName::Atk, delta: -1, on_self: false, chance: 100 }];
    dex.add_move(growl);

    let mut agility = plain_move("Agility", types::NORMAL, MoveCategory::Status, 0, None, 30, 0);
    agility.target = TargetClass::User;
    agility.stat_changes =
        vec![StatChange { stat: StatName::Spe, delta: 2, on_self: true, chance: 100 }];
    dex.add_move(agility);

    let mut takedown =
        plain_move("Take Down", types::NORMAL, MoveCategory::Physical, 90, Some(85), 20, 0);
    takedown.recoil = Some((1, 4));
    dex.add_move(takedown);

    Arc::new(dex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_dex_resolves_struggle_and_species() {
        let dex = builtin();
        assert!(dex.move_named("Struggle").is_some());
        assert!(dex.species_named("Galewing").is_some());
        assert_eq!(dex.type_multiplier(types::ELECTRIC, types::GROUND), 0.0);
    }
}
