//! The networked battle: turn controller, room binding, termination.
//!
//! One mutex guards the controller (request/turn lists, mode and the
//! field); a capacity-1 hand-off feeds a dedicated worker that resolves
//! rounds. Clients interact through `handle_turn`/`cancel_action`; the
//! engine talks back through the battle's channel.

use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, warn};

use battle_core::dex::CreatureSpec;
use battle_core::events::{BattleEvent, EventSink};
use battle_core::mechanics::Generation;
use battle_core::sim::field::{Field, TurnOrder};

use crate::channel::{Channel, ChannelBehavior, ChannelFlags, ChannelType};
use crate::client::ClientRef;
use crate::error::ProtocolError;
use crate::handoff::Handoff;
use crate::server::Server;
use crate::wire::{self, ActionRequest};

/// A party that sits on its orders this long forfeits.
pub const ROUND_TIMEOUT: Duration = Duration::from_secs(150);

/// A quiet battle room is destroyed after this long.
pub const ROOM_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Shared with the channel behavior; the battle pointer is cleared on
/// termination so a dead room stops forfeiting people.
pub struct BattleChannelState {
    pub(crate) server: Weak<Server>,
    pub(crate) battle: Mutex<Option<Weak<NetworkBattle>>>,
}

pub struct BattleChannelBehavior {
    pub(crate) state: Arc<BattleChannelState>,
}

impl ChannelBehavior for BattleChannelBehavior {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Battle
    }

    /// Main-chat ops arrive as owners; battle participants as protected
    /// ops; everyone else as a plain spectator.
    fn join_flags(&self, client: &ClientRef) -> ChannelFlags {
        let mut flags = ChannelFlags::NONE;
        if let Some(server) = self.state.server.upgrade() {
            if let Some(main) = server.main_channel().member_flags(client.id()) {
                if main.contains(ChannelFlags::OP) || main.contains(ChannelFlags::OWNER) {
                    flags.insert(ChannelFlags::OWNER);
                }
            }
        }
        let battle = self.state.battle.lock().clone();
        if let Some(battle) = battle.and_then(|weak| weak.upgrade()) {
            if battle.party_of(client).is_some() {
                flags.insert(ChannelFlags::OP | ChannelFlags::PROTECTED);
            }
        }
        flags
    }

    /// A participant leaving the room loses on the spot.
    fn handle_part(&self, client: &ClientRef) {
        let battle = self.state.battle.lock().clone();
        if let Some(battle) = battle.and_then(|weak| weak.upgrade()) {
            if let Some(party) = battle.party_of(client) {
                battle.forfeit(party);
            }
        }
    }
}

/// Event sink over the battle channel: broadcasts fan out to the room,
/// private events go straight to the owning participant.
struct ChannelSink {
    field_id: i32,
    channel: Arc<Channel>,
    clients: [ClientRef; 2],
}

impl EventSink for ChannelSink {
    fn broadcast(&mut self, event: BattleEvent) {
        self.channel.broadcast_bytes(wire::encode_event(self.field_id, &event));
    }

    fn send_to(&mut self, party: usize, event: BattleEvent) {
        self.clients[party].send(wire::encode_event(self.field_id, &event));
    }
}

struct Controller {
    field: Field,
    /// Slots that still owe an order this sub-round, per party.
    requests: [Vec<usize>; 2],
    /// Orders received so far, per party.
    turns: [Vec<TurnOrder>; 2],
    replacement: bool,
    turn_count: u16,
    round_deadline: Option<Instant>,
    terminated: bool,
}

pub struct NetworkBattle {
    id: u32,
    channel: Arc<Channel>,
    channel_state: Arc<BattleChannelState>,
    clients: [ClientRef; 2],
    ctl: Mutex<Controller>,
    queue: Handoff<Vec<TurnOrder>>,
}

impl NetworkBattle {
    /// Build the battle and its room, and force-join both participants.
    /// `begin` starts turn 1.
    pub fn create(
        server: &Arc<Server>,
        clients: [ClientRef; 2],
        teams: [Vec<CreatureSpec>; 2],
        generation: Generation,
        party_size: usize,
        seed: u64,
    ) -> Result<Arc<NetworkBattle>> {
        let channel_state = Arc::new(BattleChannelState {
            server: Arc::downgrade(server),
            battle: Mutex::new(None),
        });
        let name = format!("{} vs. {}", clients[0].name(), clients[1].name());
        let channel = server.create_channel(
            name,
            String::new(),
            Box::new(BattleChannelBehavior { state: channel_state.clone() }),
        );
        let id = channel.id();

        let sink = ChannelSink {
            field_id: id as i32,
            channel: channel.clone(),
            clients: clients.clone(),
        };
        let field = Field::new(
            server.dex(),
            generation,
            teams,
            [clients[0].name().to_string(), clients[1].name().to_string()],
            party_size,
            0,
            seed,
            Box::new(sink),
        )?;

        let battle = Arc::new_cyclic(|weak: &Weak<NetworkBattle>| {
            let weak = weak.clone();
            let queue = Handoff::new("battle-turn-worker", move |orders: Vec<TurnOrder>| {
                if let Some(battle) = weak.upgrade() {
                    battle.execute_round(orders);
                }
            });
            NetworkBattle {
                id,
                channel,
                channel_state,
                clients,
                ctl: Mutex::new(Controller {
                    field,
                    requests: [Vec::new(), Vec::new()],
                    turns: [Vec::new(), Vec::new()],
                    replacement: false,
                    turn_count: 0,
                    round_deadline: None,
                    terminated: false,
                }),
                queue,
            }
        });
        *battle.channel_state.battle.lock() = Some(Arc::downgrade(&battle));

        for client in &battle.clients {
            battle.channel.join(client)?;
        }
        spawn_round_timer(&battle);
        Ok(battle)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Party index of a participant, `None` for spectators.
    pub fn party_of(&self, client: &ClientRef) -> Option<usize> {
        self.clients.iter().position(|c| c.id() == client.id())
    }

    pub fn is_over(&self) -> bool {
        let ctl = self.ctl.lock();
        ctl.terminated || ctl.field.is_over()
    }

    /// Initial reveal plus the first turn's action requests.
    pub fn begin(&self) {
        let mut ctl = self.ctl.lock();
        ctl.field.begin_battle();
        self.begin_turn(&mut ctl);
    }

    fn begin_turn(&self, ctl: &mut Controller) {
        ctl.turn_count += 1;
        let turn = ctl.turn_count;
        ctl.field.announce_turn(turn);
        self.request_moves(ctl);
    }

    fn request_moves(&self, ctl: &mut Controller) {
        ctl.replacement = false;
        ctl.requests = [Vec::new(), Vec::new()];
        ctl.turns = [Vec::new(), Vec::new()];
        for id in ctl.field.active_ids() {
            ctl.field.determine_legal_actions(id);
            let slot = ctl.field.creature(id).slot.max(0) as usize;
            ctl.requests[id.party].push(slot);
        }
        for party in 0..2 {
            self.request_action(ctl, party);
        }
        ctl.round_deadline = Some(Instant::now() + ROUND_TIMEOUT);
    }

    /// Ask the owning client for the next outstanding order. Bench slots
    /// already claimed by an earlier switch this sub-round are masked out.
    fn request_action(&self, ctl: &mut Controller, party: usize) {
        let submitted = ctl.turns[party].len();
        let Some(&slot) = ctl.requests[party].get(submitted) else {
            return;
        };
        let Some(id) = ctl.field.active_id(party, slot) else {
            return;
        };
        let mut switches = ctl.field.legal_switches(party);
        for order in &ctl.turns[party] {
            if let TurnOrder::Switch { index } = order {
                if let Some(flag) = switches.get_mut(*index) {
                    *flag = false;
                }
            }
        }
        let creature = ctl.field.creature(id);
        let forced = creature.forced_move.is_some();
        let request = ActionRequest {
            slot: slot as u8,
            position: id.index as u8,
            replacement: ctl.replacement,
            switches,
            switch_legal: creature.legal_switch,
            forced,
            moves: if forced || ctl.replacement {
                Vec::new()
            } else {
                creature.legal_moves.clone()
            },
        };
        self.clients[party].send(wire::encode_request_action(self.id as i32, &request));
    }

    /// Accept one order from a participant. Illegal orders are answered
    /// with a fresh `REQUEST_ACTION`; unexpected ones are ignored.
    pub fn handle_turn(&self, client: &ClientRef, order: TurnOrder) -> Result<(), ProtocolError> {
        let Some(party) = self.party_of(client) else {
            return Err(ProtocolError::OutOfOrderOrder);
        };
        let mut ctl = self.ctl.lock();
        if ctl.terminated || ctl.field.is_over() {
            return Err(ProtocolError::OutOfOrderOrder);
        }
        let expected = ctl.requests[party].len();
        let submitted = ctl.turns[party].len();
        if submitted == expected {
            return Err(ProtocolError::OutOfOrderOrder);
        }
        let slot = ctl.requests[party][submitted];
        let Some(id) = ctl.field.active_id(party, slot) else {
            return Err(ProtocolError::OutOfOrderOrder);
        };

        let mut legal = ctl.field.is_turn_legal(id, &order, ctl.replacement);
        if let TurnOrder::Switch { index } = order {
            // No two switches to the same target in one sub-round.
            if ctl.turns[party]
                .iter()
                .any(|t| matches!(t, TurnOrder::Switch { index: other } if *other == index))
            {
                legal = false;
            }
        }
        if !legal {
            self.request_action(&mut ctl, party);
            return Err(ProtocolError::IllegalOrder);
        }

        ctl.turns[party].push(order);
        if ctl.turns[party].len() < expected {
            self.request_action(&mut ctl, party);
            return Ok(());
        }
        let round = self.maybe_take_round(&mut ctl);
        drop(ctl);
        if let Some(orders) = round {
            self.queue.post(orders);
        }
        Ok(())
    }

    /// Pop the party's last submitted order and re-issue its request.
    /// Once both sides have committed, the working lists are already
    /// cleared for dispatch and the cancel arrives too late.
    pub fn cancel_action(&self, client: &ClientRef) {
        let Some(party) = self.party_of(client) else {
            return;
        };
        let mut ctl = self.ctl.lock();
        if ctl.terminated {
            return;
        }
        if ctl.turns[party].pop().is_some() {
            self.request_action(&mut ctl, party);
        }
    }

    /// Once both parties are complete, concatenate party 0's orders then
    /// party 1's and clear the working lists.
    fn maybe_take_round(&self, ctl: &mut Controller) -> Option<Vec<TurnOrder>> {
        for party in 0..2 {
            if ctl.turns[party].len() != ctl.requests[party].len() {
                return None;
            }
        }
        let mut combined = Vec::new();
        for party in 0..2 {
            combined.append(&mut ctl.turns[party]);
            ctl.requests[party].clear();
        }
        Some(combined)
    }

    /// Worker-side: resolve the round, then either collect replacements
    /// or open the next turn.
    fn execute_round(&self, orders: Vec<TurnOrder>) {
        let mut ctl = self.ctl.lock();
        if ctl.terminated {
            return;
        }
        if ctl.replacement {
            ctl.field.process_replacements(&orders);
        } else {
            ctl.field.process_turn(&orders);
        }
        ctl.round_deadline = None;
        if ctl.field.is_over() {
            drop(ctl);
            self.terminate();
            return;
        }
        let requests = ctl.field.replacement_requests();
        if requests.iter().any(|r| !r.is_empty()) {
            ctl.replacement = true;
            ctl.requests = requests;
            ctl.turns = [Vec::new(), Vec::new()];
            for party in 0..2 {
                if !ctl.requests[party].is_empty() {
                    self.request_action(&mut ctl, party);
                }
            }
            ctl.round_deadline = Some(Instant::now() + ROUND_TIMEOUT);
        } else {
            self.begin_turn(&mut ctl);
        }
    }

    /// Participant departure or timeout: the opponent wins immediately.
    pub fn forfeit(&self, party: usize) {
        let mut ctl = self.ctl.lock();
        if ctl.terminated || ctl.field.is_over() {
            return;
        }
        debug!(battle = self.id, party, "forfeit");
        ctl.field.inform_victory(1 - party as i16);
        drop(ctl);
        self.terminate();
    }

    /// Room went idle with no outcome: draw, then tear down.
    pub fn abandon(&self) {
        let mut ctl = self.ctl.lock();
        if !ctl.terminated && !ctl.field.is_over() {
            ctl.field.inform_victory(-1);
        }
        drop(ctl);
        self.terminate();
    }

    /// Tear down: flag the controller, clear the room's back-pointer,
    /// unregister, and stop the worker. The clients were already told the
    /// outcome while the battle handle was live.
    pub fn terminate(&self) {
        {
            let mut ctl = self.ctl.lock();
            if ctl.terminated {
                return;
            }
            ctl.terminated = true;
        }
        *self.channel_state.battle.lock() = None;
        if let Some(server) = self.channel_state.server.upgrade() {
            server.remove_battle(self.id);
        }
        self.queue.terminate();
    }

    /// Fresh reveal grid for a spectator who joined mid-battle.
    pub fn send_snapshot_to(&self, client: &ClientRef) {
        let event = {
            let ctl = self.ctl.lock();
            ctl.field.snapshot_event()
        };
        client.send(wire::encode_event(self.id as i32, &event));
    }
}

/// Watch the per-round clock; a party that never answers its
/// `REQUEST_ACTION` forfeits to the opponent.
fn spawn_round_timer(battle: &Arc<NetworkBattle>) {
    let weak = Arc::downgrade(battle);
    let _ = thread::Builder::new()
        .name("battle-round-timer".to_string())
        .spawn(move || loop {
            thread::sleep(Duration::from_secs(1));
            let Some(battle) = weak.upgrade() else {
                break;
            };
            let late_party = {
                let ctl = battle.ctl.lock();
                if ctl.terminated || ctl.field.is_over() {
                    break;
                }
                match ctl.round_deadline {
                    Some(deadline) if Instant::now() >= deadline => {
                        (0..2).find(|&p| ctl.turns[p].len() < ctl.requests[p].len())
                    }
                    _ => None,
                }
            };
            if let Some(party) = late_party {
                warn!(battle = battle.id, party, "round timeout, forfeiting");
                battle.forfeit(party);
                break;
            }
        });
}
