//! Round-execution scenarios driven straight against the field, with a
//! recording sink standing in for the network layer.

use battle_core::dex::{CreatureSpec, StatName};
use battle_core::events::{BattleEvent, RecordingSink};
use battle_core::mechanics::Generation;
use battle_core::sim::effects::conditions;
use battle_core::sim::field::{Field, TurnOrder};
use battle_core::sim::CreatureId;
use battle_core::testkit;

fn new_field(teams: [Vec<CreatureSpec>; 2], seed: u64) -> (Field, RecordingSink) {
    let sink = RecordingSink::new();
    let field = Field::new(
        testkit::dex(),
        Generation::MODERN,
        teams,
        ["Red".to_string(), "Blue".to_string()],
        1,
        0,
        seed,
        Box::new(sink.clone()),
    )
    .expect("field builds");
    (field, sink)
}

fn started(teams: [Vec<CreatureSpec>; 2], seed: u64) -> (Field, RecordingSink) {
    let (mut field, sink) = new_field(teams, seed);
    field.begin_battle();
    sink.clear();
    (field, sink)
}

const A0: CreatureId = CreatureId { party: 0, index: 0 };
const B0: CreatureId = CreatureId { party: 1, index: 0 };

/// Both sides aim at the opposing slot; own slots come first in the
/// target encoding, so slot 0 of the enemy is code 1 in singles.
const ENEMY: i8 = 1;

#[test]
fn begin_battle_reveals_both_sides_privately_and_publicly() {
    let (mut field, sink) = new_field(
        [
            testkit::team("Emberwing", &["Ember"], "Blaze", None),
            testkit::team("Tidefin", &["Tackle"], "No Ability", None),
        ],
        3,
    );
    field.begin_battle();
    assert_eq!(
        sink.privates(0),
        vec![BattleEvent::Begin { opponent: "Blue".into(), party: 0 }]
    );
    assert_eq!(
        sink.privates(1),
        vec![BattleEvent::Begin { opponent: "Red".into(), party: 1 }]
    );
    let broadcasts = sink.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    let BattleEvent::PokemonSnapshot { slots } = &broadcasts[0] else {
        panic!("expected a snapshot, got {broadcasts:?}");
    };
    assert!(slots[0][0].is_some() && slots[1][0].is_some());
}

#[test]
fn simple_ko_produces_the_canonical_event_sequence() {
    let (mut field, sink) = started(
        [
            testkit::team("Emberwing", &["Mega Blast"], "No Ability", None),
            testkit::team("Voltmouse", &["Tackle"], "No Ability", None),
        ],
        11,
    );
    field.process_turn(&[
        TurnOrder::Move { slot: 0, target: ENEMY },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);

    let broadcasts = sink.broadcasts();
    assert!(matches!(
        broadcasts[0],
        BattleEvent::UseMove { party: 0, slot: 0, .. }
    ));
    assert_eq!(
        broadcasts[1],
        BattleEvent::HealthChange {
            party: 1,
            slot: 0,
            name: "Voltmouse".into(),
            delta: 48,
            total: 0,
        }
    );
    assert!(matches!(
        broadcasts[2],
        BattleEvent::Fainted { party: 1, slot: 0, .. }
    ));
    assert!(matches!(broadcasts[3], BattleEvent::PokemonSnapshot { .. }));
    assert_eq!(broadcasts[4], BattleEvent::Victory { party: 0 });
    assert_eq!(field.outcome(), Some(0));
    // The loser never got to act.
    assert!(!broadcasts.iter().any(|e| matches!(e, BattleEvent::UseMove { party: 1, .. })));
}

#[test]
fn pp_deduction_goes_to_the_owner_only() {
    let (mut field, sink) = started(
        [
            testkit::team("Galewing", &["Tackle"], "No Ability", None),
            testkit::team("Terrapod", &["Tackle"], "No Ability", None),
        ],
        5,
    );
    field.process_turn(&[
        TurnOrder::Move { slot: 0, target: ENEMY },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);
    assert!(sink
        .privates(0)
        .iter()
        .any(|e| matches!(e, BattleEvent::SetPp { index: 0, move_slot: 0, pp: 34 })));
    assert!(!sink
        .broadcasts()
        .iter()
        .any(|e| matches!(e, BattleEvent::SetPp { .. })));
    assert_eq!(field.creature(A0).moves[0].pp, 34);
}

#[test]
fn declared_priority_beats_raw_speed() {
    let (mut field, sink) = started(
        [
            testkit::team("Tidefin", &["Aqua Jet"], "No Ability", None),
            testkit::team("Galewing", &["Tackle"], "No Ability", None),
        ],
        9,
    );
    assert!(field.effective_speed(B0) > field.effective_speed(A0));
    field.process_turn(&[
        TurnOrder::Move { slot: 0, target: ENEMY },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);
    let first_move = sink
        .broadcasts()
        .into_iter()
        .find_map(|e| match e {
            BattleEvent::UseMove { party, .. } => Some(party),
            _ => None,
        })
        .expect("someone moved");
    assert_eq!(first_move, 0, "the priority move acts first");
}

#[test]
fn exhausted_moves_force_struggle_with_recoil() {
    let (mut field, sink) = started(
        [
            testkit::team("Galewing", &["Tackle"], "No Ability", None),
            testkit::team("Tidefin", &["Tackle"], "No Ability", None),
        ],
        21,
    );
    field.creature_mut(A0).moves[0].pp = 0;
    field.determine_legal_actions(A0);
    let a = field.creature(A0);
    assert_eq!(a.legal_moves, vec![false]);
    let struggle = field.dex().move_named("Struggle").unwrap().id;
    assert_eq!(field.creature(A0).forced_move, Some(struggle));
    assert!(field.is_turn_legal(A0, &TurnOrder::Move { slot: -1, target: ENEMY }, false));
    assert!(!field.is_turn_legal(A0, &TurnOrder::Move { slot: 0, target: ENEMY }, false));

    let max = field.creature(A0).max_hp();
    field.process_turn(&[
        TurnOrder::Move { slot: -1, target: ENEMY },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);
    assert!(sink.broadcasts().iter().any(
        |e| matches!(e, BattleEvent::UseMove { party: 0, move_id, .. } if *move_id == struggle)
    ));
    // Quarter-max recoil through the health pipeline.
    assert!(field.creature(A0).hp <= max - max / 4);
}

#[test]
fn replacement_round_sends_out_the_bench() {
    let (mut field, sink) = started(
        [
            vec![
                testkit::creature("Emberwing", &["Mega Blast"], "No Ability", None),
                testkit::creature("Galewing", &["Tackle"], "No Ability", None),
            ],
            vec![
                testkit::creature("Voltmouse", &["Tackle"], "No Ability", None),
                testkit::creature("Tidefin", &["Tackle"], "No Ability", None),
            ],
        ],
        11,
    );
    field.process_turn(&[
        TurnOrder::Move { slot: 0, target: ENEMY },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);
    assert!(field.outcome().is_none());
    assert_eq!(field.replacement_requests(), [vec![], vec![0]]);

    sink.clear();
    field.process_replacements(&[TurnOrder::Switch { index: 1 }]);
    let broadcasts = sink.broadcasts();
    assert!(matches!(
        broadcasts[0],
        BattleEvent::SendOut { party: 1, slot: 0, index: 1, .. }
    ));
    assert!(matches!(broadcasts[1], BattleEvent::PokemonSnapshot { .. }));
    assert_eq!(field.active_id(1, 0), Some(CreatureId::new(1, 1)));
    assert_eq!(field.replacement_requests(), [vec![], vec![]]);
}

#[test]
fn voluntary_switch_withdraws_then_sends_out() {
    let (mut field, sink) = started(
        [
            vec![
                testkit::creature("Galewing", &["Tackle"], "No Ability", None),
                testkit::creature("Terrapod", &["Earth Slam"], "No Ability", None),
            ],
            testkit::team("Tidefin", &["Tackle"], "No Ability", None),
        ],
        2,
    );
    field.process_turn(&[
        TurnOrder::Switch { index: 1 },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);
    let broadcasts = sink.broadcasts();
    assert!(matches!(
        broadcasts[0],
        BattleEvent::Withdraw { party: 0, slot: 0, .. }
    ));
    assert!(matches!(
        broadcasts[1],
        BattleEvent::SendOut { party: 0, slot: 0, index: 1, .. }
    ));
    // The incoming creature eats the hit.
    assert!(field.creature(CreatureId::new(0, 1)).hp < field.creature(CreatureId::new(0, 1)).max_hp());
    assert_eq!(field.creature(A0).slot, -1);
}

#[test]
fn sleeping_creatures_lose_their_turn() {
    let (mut field, sink) = started(
        [
            testkit::team("Galewing", &["Tackle"], "No Ability", None),
            testkit::team("Tidefin", &["Tackle"], "No Ability", None),
        ],
        13,
    );
    field
        .apply_status(B0, Some(A0), &conditions::SLEEP)
        .expect("sleep applies");
    field.process_turn(&[
        TurnOrder::Move { slot: 0, target: ENEMY },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);
    let broadcasts = sink.broadcasts();
    assert!(!broadcasts.iter().any(|e| matches!(e, BattleEvent::UseMove { party: 1, .. })));
    assert!(broadcasts.iter().any(|e| matches!(
        e,
        BattleEvent::Print { message, .. } if *message == battle_core::dex::text::MSG_FAST_ASLEEP
    )));
}

#[test]
fn burn_halves_attack_and_ticks_after_the_round() {
    let (mut field, sink) = started(
        [
            testkit::team("Galewing", &["Growl"], "No Ability", None),
            testkit::team("Tidefin", &["Growl"], "No Ability", None),
        ],
        17,
    );
    let clean_attack = field.stat(B0, StatName::Atk);
    field
        .apply_status(B0, Some(A0), &conditions::BURN)
        .expect("burn applies");
    assert_eq!(field.stat(B0, StatName::Atk), clean_attack / 2);

    field.process_turn(&[
        TurnOrder::Move { slot: 0, target: ENEMY },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);
    let max = field.creature(B0).max_hp();
    assert_eq!(field.creature(B0).hp, max - max / 16);
    assert!(sink.broadcasts().iter().any(|e| matches!(
        e,
        BattleEvent::HealthChange { party: 1, .. }
    )));
}

#[test]
fn effect_immunity_blanks_the_move() {
    let (mut field, sink) = started(
        [
            testkit::team("Voltmouse", &["Tackle"], "Levitate", None),
            testkit::team("Terrapod", &["Earth Slam"], "No Ability", None),
        ],
        19,
    );
    field.process_turn(&[
        TurnOrder::Move { slot: 0, target: ENEMY },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);
    assert_eq!(field.creature(A0).hp, field.creature(A0).max_hp());
    assert!(sink.broadcasts().iter().any(|e| matches!(
        e,
        BattleEvent::Print { message, .. } if *message == battle_core::dex::text::MSG_NO_EFFECT
    )));
}

#[test]
fn choice_items_lock_the_first_move() {
    let (mut field, _sink) = started(
        [
            testkit::team("Galewing", &["Tackle", "Gust"], "No Ability", Some("Choice Band")),
            testkit::team("Terrapod", &["Earth Slam"], "No Ability", None),
        ],
        23,
    );
    field.determine_legal_actions(A0);
    assert_eq!(field.creature(A0).legal_moves, vec![true, true]);
    field.process_turn(&[
        TurnOrder::Move { slot: 0, target: ENEMY },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);
    field.determine_legal_actions(A0);
    assert_eq!(field.creature(A0).legal_moves, vec![true, false]);
}

#[test]
fn stat_stages_clamp_and_narrate_the_cap() {
    let (mut field, sink) = started(
        [
            testkit::team("Galewing", &["Agility"], "No Ability", None),
            testkit::team("Terrapod", &["Earth Slam"], "No Ability", None),
        ],
        29,
    );
    for _ in 0..4 {
        field.change_stat_stage(None, A0, StatName::Spe, 2);
    }
    assert_eq!(field.creature(A0).stage(StatName::Spe), 6);
    assert!(sink.broadcasts().iter().any(|e| matches!(
        e,
        BattleEvent::Print { message, .. } if *message == battle_core::dex::text::MSG_STAT_CAPPED
    )));
}

#[test]
fn health_broadcasts_stay_inside_the_48_scale() {
    let (mut field, sink) = started(
        [
            testkit::team("Emberwing", &["Mega Blast"], "No Ability", None),
            testkit::team("Voltmouse", &["Thunder Shock"], "No Ability", None),
        ],
        31,
    );
    field.process_turn(&[
        TurnOrder::Move { slot: 0, target: ENEMY },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);
    for event in sink.broadcasts() {
        if let BattleEvent::HealthChange { delta, total, .. } = event {
            assert!((0..=48).contains(&total));
            assert!(delta.abs() <= 48);
        }
    }
}

#[test]
fn quick_claw_proc_outranks_raw_speed() {
    let (mut field, sink) = started(
        [
            testkit::team("Terrapod", &["Tackle"], "No Ability", Some("Quick Claw")),
            testkit::team("Galewing", &["Tackle"], "No Ability", None),
        ],
        37,
    );
    assert!(field.effective_speed(B0) > field.effective_speed(A0));
    // Pin the per-round roll so the ordering assertion is deterministic.
    field
        .creature_mut(A0)
        .effects
        .iter_mut()
        .find(|e| e.id() == "Quick Claw")
        .expect("claw installed")
        .state
        .counter = 1;
    assert_eq!(field.inherent_priority(A0), 1);

    field.process_turn(&[
        TurnOrder::Move { slot: 0, target: ENEMY },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);
    let first_move = sink
        .broadcasts()
        .into_iter()
        .find_map(|e| match e {
            BattleEvent::UseMove { party, .. } => Some(party),
            _ => None,
        })
        .expect("someone moved");
    assert_eq!(first_move, 0, "the claw proc acts first despite lower speed");
    // The end-of-turn tick re-rolls the proc for the next round.
    let claw = field
        .creature(A0)
        .status_by_id("Quick Claw")
        .expect("claw persists");
    assert!((0..=1).contains(&claw.state.counter));
}

#[test]
fn inherent_priority_orders_by_magnitude() {
    // A negative bracket bias still out-orders a neutral one: the tiers
    // compare by magnitude, not signed value.
    let (mut field, sink) = started(
        [
            testkit::team("Terrapod", &["Tackle"], "Stall", None),
            testkit::team("Galewing", &["Tackle"], "No Ability", None),
        ],
        41,
    );
    assert_eq!(field.inherent_priority(A0), -1);
    assert!(field.effective_speed(B0) > field.effective_speed(A0));
    field.process_turn(&[
        TurnOrder::Move { slot: 0, target: ENEMY },
        TurnOrder::Move { slot: 0, target: ENEMY },
    ]);
    let first_move = sink
        .broadcasts()
        .into_iter()
        .find_map(|e| match e {
            BattleEvent::UseMove { party, .. } => Some(party),
            _ => None,
        })
        .expect("someone moved");
    assert_eq!(first_move, 0);
}

#[test]
fn seeded_battles_replay_byte_identically() {
    let teams = || {
        [
            testkit::team("Galewing", &["Tackle"], "No Ability", None),
            testkit::team("Tidefin", &["Thunder Shock"], "No Ability", None),
        ]
    };
    let (mut field_a, sink_a) = started(teams(), 99);
    let (mut field_b, sink_b) = started(teams(), 99);
    for _ in 0..4 {
        let orders = [
            TurnOrder::Move { slot: 0, target: ENEMY },
            TurnOrder::Move { slot: 0, target: ENEMY },
        ];
        field_a.process_turn(&orders);
        field_b.process_turn(&orders);
    }
    assert_eq!(sink_a.deliveries(), sink_b.deliveries());
}
