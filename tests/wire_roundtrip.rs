//! Codec law: decode(encode(m)) = m for every battle event.

use battle_core::events::{BattleEvent, SlotReveal};
use battle_server::codec::split_frame;
use battle_server::wire::{decode_event, encode_event};

fn roundtrip(event: BattleEvent, party_size: usize) {
    let frame = encode_event(42, &event);
    let (opcode, payload, consumed) = split_frame(&frame).expect("complete frame");
    assert_eq!(consumed, frame.len());
    let (field_id, decoded) = decode_event(opcode, payload, party_size).expect("decodes");
    assert_eq!(field_id, 42);
    assert_eq!(decoded, event);
}

#[test]
fn every_battle_event_round_trips() {
    let events = vec![
        BattleEvent::Begin { opponent: "Blue".into(), party: 0 },
        BattleEvent::PokemonSnapshot {
            slots: [
                vec![Some(SlotReveal { species: 3, gender: 2, shiny: true })],
                vec![None],
            ],
        },
        BattleEvent::Print {
            category: 4,
            message: 2,
            args: vec!["$p{0,0}".into(), "$p{1,0}".into()],
        },
        BattleEvent::Victory { party: -1 },
        BattleEvent::Victory { party: 1 },
        BattleEvent::UseMove { party: 0, slot: 0, name: "Emberwing".into(), move_id: 5 },
        BattleEvent::Withdraw { party: 1, slot: 0, name: "Tidefin".into() },
        BattleEvent::SendOut { party: 1, slot: 0, index: 2, name: "Tidefin".into() },
        BattleEvent::HealthChange {
            party: 1,
            slot: 0,
            name: "Voltmouse".into(),
            delta: 48,
            total: 0,
        },
        BattleEvent::SetPp { index: 0, move_slot: 2, pp: 7 },
        BattleEvent::Fainted { party: 0, slot: 0, name: "Galewing".into() },
        BattleEvent::BeginTurn { turn: 12 },
    ];
    for event in events {
        roundtrip(event, 1);
    }
}

#[test]
fn doubles_snapshots_round_trip() {
    roundtrip(
        BattleEvent::PokemonSnapshot {
            slots: [
                vec![
                    Some(SlotReveal { species: 1, gender: 0, shiny: false }),
                    None,
                ],
                vec![
                    None,
                    Some(SlotReveal { species: 4, gender: 1, shiny: false }),
                ],
            ],
        },
        2,
    );
}

#[test]
fn truncated_event_payloads_are_malformed() {
    let frame = encode_event(
        7,
        &BattleEvent::UseMove { party: 0, slot: 0, name: "Emberwing".into(), move_id: 5 },
    );
    let (opcode, payload, _) = split_frame(&frame).expect("complete frame");
    assert!(decode_event(opcode, &payload[..payload.len() - 1], 1).is_err());
}
