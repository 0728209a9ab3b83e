//! The domain messages a battle emits.
//!
//! The engine produces typed [`BattleEvent`] values and pushes them through
//! an [`EventSink`]; the network layer encodes them onto the wire. Tests use
//! [`RecordingSink`] to assert on the exact sequence a battle generates.

use crate::dex::MoveId;

/// One revealed active slot in a `BATTLE_POKEMON` snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SlotReveal {
    pub species: u16,
    pub gender: u8,
    pub shiny: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BattleEvent {
    /// Private to each participant: who they are fighting and which side
    /// they are.
    Begin { opponent: String, party: u8 },
    /// Species/gender/shiny grid for revealed actives; `None` for a benched
    /// or fainted slot.
    PokemonSnapshot { slots: [Vec<Option<SlotReveal>>; 2] },
    /// A client text-table reference with arguments.
    Print { category: u8, message: u16, args: Vec<String> },
    /// Winning party, or -1 for a draw.
    Victory { party: i16 },
    UseMove { party: u8, slot: u8, name: String, move_id: MoveId },
    Withdraw { party: u8, slot: u8, name: String },
    SendOut { party: u8, slot: u8, index: u8, name: String },
    /// Delta and total are scaled to the 0..=48 fraction before emission.
    HealthChange { party: u8, slot: u8, name: String, delta: i16, total: i16 },
    /// Private to the owning client.
    SetPp { index: u8, move_slot: u8, pp: u8 },
    Fainted { party: u8, slot: u8, name: String },
    BeginTurn { turn: u16 },
}

pub trait EventSink: Send {
    fn broadcast(&mut self, event: BattleEvent);
    fn send_to(&mut self, party: usize, event: BattleEvent);
}

/// Discards everything; placeholder for fields that are driven headless.
pub struct NullSink;

impl EventSink for NullSink {
    fn broadcast(&mut self, _event: BattleEvent) {}
    fn send_to(&mut self, _party: usize, _event: BattleEvent) {}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    Broadcast(BattleEvent),
    Private(usize, BattleEvent),
}

/// Captures the full delivery order for assertions. Clones share one log,
/// so a test can hand a clone to the field and keep the other to inspect.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: std::sync::Arc<std::sync::Mutex<Vec<Delivery>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, delivery: Delivery) {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(delivery);
    }

    /// Everything delivered so far, in emission order.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Broadcast events only, in emission order.
    pub fn broadcasts(&self) -> Vec<BattleEvent> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Broadcast(e) => Some(e),
                Delivery::Private(..) => None,
            })
            .collect()
    }

    /// Events sent privately to one party, in emission order.
    pub fn privates(&self, party: usize) -> Vec<BattleEvent> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Private(p, e) if p == party => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl EventSink for RecordingSink {
    fn broadcast(&mut self, event: BattleEvent) {
        self.push(Delivery::Broadcast(event));
    }

    fn send_to(&mut self, party: usize, event: BattleEvent) {
        self.push(Delivery::Private(party, event));
    }
}

/// Scale a raw HP quantity to the coarse 0..=48 fraction the protocol
/// leaks, with round-half-up.
pub fn scale_hp(raw: i32, max_hp: u16) -> i16 {
    if max_hp == 0 {
        return 0;
    }
    (48.0 * raw as f64 / max_hp as f64 + 0.5).floor() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hp_scaling_rounds_half_up_and_caps_at_48() {
        assert_eq!(scale_hp(153, 153), 48);
        assert_eq!(scale_hp(0, 153), 0);
        assert_eq!(scale_hp(76, 153), 24);
        assert_eq!(scale_hp(1, 153), 0);
        assert_eq!(scale_hp(2, 153), 1);
    }

    #[test]
    fn recording_sink_separates_private_and_broadcast() {
        let mut sink = RecordingSink::new();
        sink.broadcast(BattleEvent::BeginTurn { turn: 1 });
        sink.send_to(0, BattleEvent::SetPp { index: 0, move_slot: 1, pp: 9 });
        assert_eq!(sink.broadcasts().len(), 1);
        assert_eq!(sink.privates(0).len(), 1);
        assert!(sink.privates(1).is_empty());
    }

    #[test]
    fn recording_sink_clones_share_the_log() {
        let mut sink = RecordingSink::new();
        let observer = sink.clone();
        sink.broadcast(BattleEvent::BeginTurn { turn: 3 });
        assert_eq!(observer.broadcasts(), vec![BattleEvent::BeginTurn { turn: 3 }]);
    }
}
