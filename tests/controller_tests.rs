//! Turn-controller scenarios: order collection, cancel, forfeit,
//! replacements, spectators. Clients are in-process queue pairs; the
//! dedicated worker resolves rounds asynchronously.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;

use battle_core::dex::CreatureSpec;
use battle_core::mechanics::Generation;
use battle_core::sim::field::TurnOrder;
use battle_core::testkit;

use battle_server::battle::NetworkBattle;
use battle_server::client::ClientRef;
use battle_server::codec::split_frame;
use battle_server::error::ProtocolError;
use battle_server::server::Server;
use battle_server::wire::{decode_request_action, Opcode};

const ENEMY: i8 = 1;

struct Rig {
    server: Arc<Server>,
    battle: Arc<NetworkBattle>,
    red: ClientRef,
    blue: ClientRef,
    red_rx: Receiver<Vec<u8>>,
    blue_rx: Receiver<Vec<u8>>,
}

fn rig(teams: [Vec<CreatureSpec>; 2], seed: u64) -> Rig {
    let server = Server::new(testkit::dex());
    let (red, red_rx) = server.register_client("Red");
    let (blue, blue_rx) = server.register_client("Blue");
    let battle = server
        .start_battle([red.clone(), blue.clone()], teams, Generation::MODERN, 1, seed)
        .expect("battle starts");
    Rig { server, battle, red, blue, red_rx, blue_rx }
}

fn frames(rx: &Receiver<Vec<u8>>) -> Vec<(u8, Vec<u8>)> {
    rx.try_iter()
        .map(|frame| {
            let (opcode, payload, consumed) = split_frame(&frame).expect("whole frame");
            assert_eq!(consumed, frame.len());
            (opcode, payload.to_vec())
        })
        .collect()
}

fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("condition never became true");
}

fn mono(species: &str, moves: &[&str]) -> Vec<CreatureSpec> {
    testkit::team(species, moves, "No Ability", None)
}

#[test]
fn simple_ko_reaches_victory_and_stops_requesting() {
    let rig = rig(
        [mono("Emberwing", &["Mega Blast"]), mono("Voltmouse", &["Tackle"])],
        11,
    );
    rig.battle
        .handle_turn(&rig.red, TurnOrder::Move { slot: 0, target: ENEMY })
        .unwrap();
    rig.battle
        .handle_turn(&rig.blue, TurnOrder::Move { slot: 0, target: ENEMY })
        .unwrap();
    wait_for(|| rig.battle.is_over());

    let blue_frames = frames(&rig.blue_rx);
    let victory_at = blue_frames
        .iter()
        .position(|(op, _)| *op == Opcode::BattleVictory as u8)
        .expect("victory broadcast");
    assert!(blue_frames[victory_at..]
        .iter()
        .all(|(op, _)| *op != Opcode::RequestAction as u8));
    // The battle unregisters itself on termination.
    wait_for(|| rig.server.battle(rig.battle.id()).is_none());
}

#[test]
fn begin_turn_and_request_action_open_the_round() {
    let rig = rig([mono("Galewing", &["Tackle"]), mono("Tidefin", &["Tackle"])], 3);
    let red_frames = frames(&rig.red_rx);
    let opcodes: Vec<u8> = red_frames.iter().map(|(op, _)| *op).collect();
    assert!(opcodes.contains(&(Opcode::BattleBegin as u8)));
    assert!(opcodes.contains(&(Opcode::BattlePokemon as u8)));
    assert!(opcodes.contains(&(Opcode::BattleBeginTurn as u8)));
    let request = red_frames
        .iter()
        .find(|(op, _)| *op == Opcode::RequestAction as u8)
        .expect("red is asked to act");
    let (_, request) = decode_request_action(&request.1).unwrap();
    assert!(!request.replacement);
    assert!(!request.forced);
    assert_eq!(request.moves, vec![true]);
}

#[test]
fn cancel_reissues_the_request_and_the_new_order_wins() {
    let rig = rig(
        [
            vec![
                testkit::creature("Galewing", &["Tackle"], "No Ability", None),
                testkit::creature("Terrapod", &["Earth Slam"], "No Ability", None),
            ],
            mono("Tidefin", &["Tackle"]),
        ],
        7,
    );
    rig.battle
        .handle_turn(&rig.red, TurnOrder::Move { slot: 0, target: ENEMY })
        .unwrap();
    while rig.red_rx.try_recv().is_ok() {}
    rig.battle.cancel_action(&rig.red);
    let red_frames = frames(&rig.red_rx);
    assert!(
        red_frames.iter().any(|(op, _)| *op == Opcode::RequestAction as u8),
        "cancel must re-issue REQUEST_ACTION"
    );

    rig.battle
        .handle_turn(&rig.red, TurnOrder::Switch { index: 1 })
        .unwrap();
    rig.battle
        .handle_turn(&rig.blue, TurnOrder::Move { slot: 0, target: ENEMY })
        .unwrap();
    wait_for(|| {
        frames(&rig.red_rx)
            .iter()
            .any(|(op, _)| *op == Opcode::BattleBeginTurn as u8)
    });
    // The switch, not the cancelled move, was executed.
    assert!(!rig.battle.is_over());
}

#[test]
fn cancel_after_dispatch_is_too_late() {
    let rig = rig([mono("Galewing", &["Tackle"]), mono("Tidefin", &["Tackle"])], 5);
    rig.battle
        .handle_turn(&rig.red, TurnOrder::Move { slot: 0, target: ENEMY })
        .unwrap();
    rig.battle
        .handle_turn(&rig.blue, TurnOrder::Move { slot: 0, target: ENEMY })
        .unwrap();
    wait_for(|| {
        frames(&rig.red_rx)
            .iter()
            .any(|(op, _)| *op == Opcode::BattleBeginTurn as u8)
    });
    while rig.red_rx.try_recv().is_ok() {}
    // Turn 2's request is out; a cancel now pops nothing from the past.
    rig.battle.cancel_action(&rig.red);
    assert!(!rig.battle.is_over());
}

#[test]
fn out_of_order_submissions_are_ignored() {
    let rig = rig([mono("Galewing", &["Tackle"]), mono("Tidefin", &["Tackle"])], 9);
    rig.battle
        .handle_turn(&rig.red, TurnOrder::Move { slot: 0, target: ENEMY })
        .unwrap();
    let second = rig
        .battle
        .handle_turn(&rig.red, TurnOrder::Move { slot: 0, target: ENEMY });
    assert_eq!(second, Err(ProtocolError::OutOfOrderOrder));
}

#[test]
fn illegal_orders_get_a_fresh_request() {
    let rig = rig([mono("Galewing", &["Tackle"]), mono("Tidefin", &["Tackle"])], 13);
    while rig.red_rx.try_recv().is_ok() {}
    let result = rig
        .battle
        .handle_turn(&rig.red, TurnOrder::Move { slot: 3, target: ENEMY });
    assert_eq!(result, Err(ProtocolError::IllegalOrder));
    assert!(frames(&rig.red_rx)
        .iter()
        .any(|(op, _)| *op == Opcode::RequestAction as u8));
}

#[test]
fn participant_leaving_forfeits_immediately() {
    let rig = rig([mono("Galewing", &["Tackle"]), mono("Tidefin", &["Tackle"])], 17);
    rig.battle
        .handle_turn(&rig.red, TurnOrder::Move { slot: 0, target: ENEMY })
        .unwrap();
    while rig.red_rx.try_recv().is_ok() {}

    rig.server.part_channel(&rig.red, rig.battle.id());
    wait_for(|| rig.battle.is_over());
    let blue_frames = frames(&rig.blue_rx);
    let victory = blue_frames
        .iter()
        .find(|(op, _)| *op == Opcode::BattleVictory as u8)
        .expect("victory broadcast");
    // Party 1 wins by forfeit.
    assert_eq!(victory.1[4..6], [0, 1]);
    assert!(frames(&rig.red_rx)
        .iter()
        .all(|(op, _)| *op != Opcode::RequestAction as u8));
}

#[test]
fn replacement_sub_round_collects_only_switches() {
    let rig = rig(
        [
            mono("Emberwing", &["Mega Blast"]),
            vec![
                testkit::creature("Voltmouse", &["Tackle"], "No Ability", None),
                testkit::creature("Tidefin", &["Tackle"], "No Ability", None),
            ],
        ],
        11,
    );
    rig.battle
        .handle_turn(&rig.red, TurnOrder::Move { slot: 0, target: ENEMY })
        .unwrap();
    rig.battle
        .handle_turn(&rig.blue, TurnOrder::Move { slot: 0, target: ENEMY })
        .unwrap();

    // The KO produces a replacement request for blue only.
    let mut replacement = None;
    wait_for(|| {
        for (op, payload) in frames(&rig.blue_rx) {
            if op == Opcode::RequestAction as u8 {
                let (_, request) = decode_request_action(&payload).unwrap();
                if request.replacement {
                    replacement = Some(request);
                    return true;
                }
            }
        }
        false
    });
    let replacement = replacement.unwrap();
    assert_eq!(replacement.switches, vec![false, true]);

    rig.battle
        .handle_turn(&rig.blue, TurnOrder::Switch { index: 1 })
        .unwrap();
    wait_for(|| {
        frames(&rig.blue_rx).iter().any(|(op, payload)| {
            *op == Opcode::BattleBeginTurn as u8 && payload[4..6] == [0, 2]
        })
    });
    assert!(!rig.battle.is_over());
}

#[test]
fn spectators_get_room_state_and_a_fresh_snapshot() {
    let rig = rig([mono("Galewing", &["Tackle"]), mono("Tidefin", &["Tackle"])], 19);
    let (spectator, spec_rx) = rig.server.register_client("Gray");
    rig.server.join_channel(&spectator, rig.battle.id()).unwrap();

    let opcodes: Vec<u8> = frames(&spec_rx).iter().map(|(op, _)| *op).collect();
    assert!(opcodes.contains(&(Opcode::ChannelInfo as u8)));
    assert!(opcodes.contains(&(Opcode::BattlePokemon as u8)));
    // No historical per-turn events are replayed.
    assert!(!opcodes.contains(&(Opcode::BattleBeginTurn as u8)));
}

#[test]
fn all_observers_see_the_same_battle_byte_stream() {
    let rig = rig([mono("Galewing", &["Tackle"]), mono("Tidefin", &["Tackle"])], 23);
    let (watcher_a, rx_a) = rig.server.register_client("WatcherA");
    let (watcher_b, rx_b) = rig.server.register_client("WatcherB");
    rig.server.join_channel(&watcher_a, rig.battle.id()).unwrap();
    rig.server.join_channel(&watcher_b, rig.battle.id()).unwrap();
    while rx_a.try_recv().is_ok() {}
    while rx_b.try_recv().is_ok() {}

    rig.battle
        .handle_turn(&rig.red, TurnOrder::Move { slot: 0, target: ENEMY })
        .unwrap();
    rig.battle
        .handle_turn(&rig.blue, TurnOrder::Move { slot: 0, target: ENEMY })
        .unwrap();
    wait_for(|| {
        frames(&rig.red_rx)
            .iter()
            .any(|(op, _)| *op == Opcode::BattleBeginTurn as u8)
    });

    let battle_only = |framelist: Vec<(u8, Vec<u8>)>| -> Vec<(u8, Vec<u8>)> {
        framelist
            .into_iter()
            .filter(|(op, _)| (10..=21).contains(op))
            .collect()
    };
    let seen_a = battle_only(frames(&rx_a));
    let seen_b = battle_only(frames(&rx_b));
    assert!(!seen_a.is_empty());
    assert_eq!(seen_a, seen_b);
}
