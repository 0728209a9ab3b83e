//! Process-wide state: clients, channels, battles, the main chat room,
//! and the janitor that destroys idle battle rooms.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::info;

use battle_core::dex::{CreatureSpec, DexRef};
use battle_core::mechanics::Generation;

use crate::battle::{NetworkBattle, ROOM_IDLE_TIMEOUT};
use crate::channel::{Channel, ChannelBehavior, ChannelType, OrdinaryChannel};
use crate::client::{Client, ClientRef};
use crate::error::ProtocolError;

const MAIN_CHANNEL_ID: u32 = 1;
const JANITOR_INTERVAL: Duration = Duration::from_secs(30);

pub struct Server {
    dex: DexRef,
    main_channel: Arc<Channel>,
    channels: Mutex<HashMap<u32, Arc<Channel>>>,
    battles: Mutex<HashMap<u32, Arc<NetworkBattle>>>,
    next_channel_id: AtomicU32,
    next_client_id: AtomicU32,
}

impl Server {
    pub fn new(dex: DexRef) -> Arc<Server> {
        let main_channel = Arc::new(Channel::new(
            MAIN_CHANNEL_ID,
            "main",
            "",
            Box::new(OrdinaryChannel),
        ));
        let server = Arc::new(Server {
            dex,
            channels: Mutex::new(HashMap::from([(MAIN_CHANNEL_ID, main_channel.clone())])),
            main_channel,
            battles: Mutex::new(HashMap::new()),
            next_channel_id: AtomicU32::new(MAIN_CHANNEL_ID + 1),
            next_client_id: AtomicU32::new(1),
        });
        spawn_janitor(&server);
        server
    }

    pub fn dex(&self) -> DexRef {
        self.dex.clone()
    }

    pub fn main_channel(&self) -> &Arc<Channel> {
        &self.main_channel
    }

    /// Allocate a client handle and the receiving end of its send queue.
    pub fn register_client(&self, name: impl Into<String>) -> (ClientRef, Receiver<Vec<u8>>) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        Client::pair(id, name)
    }

    pub fn create_channel(
        &self,
        name: String,
        topic: String,
        behavior: Box<dyn ChannelBehavior>,
    ) -> Arc<Channel> {
        let id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let channel = Arc::new(Channel::new(id, name, topic, behavior));
        self.channels.lock().insert(id, channel.clone());
        channel
    }

    pub fn channel(&self, id: u32) -> Option<Arc<Channel>> {
        self.channels.lock().get(&id).cloned()
    }

    pub fn battle(&self, id: u32) -> Option<Arc<NetworkBattle>> {
        self.battles.lock().get(&id).cloned()
    }

    pub(crate) fn remove_battle(&self, id: u32) {
        self.battles.lock().remove(&id);
    }

    /// Create a battle between two connected clients and start turn 1.
    pub fn start_battle(
        self: &Arc<Server>,
        clients: [ClientRef; 2],
        teams: [Vec<CreatureSpec>; 2],
        generation: Generation,
        party_size: usize,
        seed: u64,
    ) -> Result<Arc<NetworkBattle>> {
        let battle = NetworkBattle::create(self, clients, teams, generation, party_size, seed)?;
        self.battles.lock().insert(battle.id(), battle.clone());
        info!(battle = battle.id(), "battle started");
        battle.begin();
        Ok(battle)
    }

    /// Normal room-join path; spectators of a battle room also receive a
    /// fresh reveal snapshot.
    pub fn join_channel(&self, client: &ClientRef, channel_id: u32) -> Result<(), ProtocolError> {
        let channel = self
            .channel(channel_id)
            .ok_or(ProtocolError::MalformedFrame("no such channel"))?;
        channel.join(client)?;
        if channel.channel_type() == ChannelType::Battle {
            if let Some(battle) = self.battle(channel_id) {
                battle.send_snapshot_to(client);
            }
        }
        Ok(())
    }

    pub fn part_channel(&self, client: &ClientRef, channel_id: u32) {
        if let Some(channel) = self.channel(channel_id) {
            channel.part(client);
        }
    }

    /// A connection died: leave every room (forfeiting any battle the
    /// client was fighting in).
    pub fn drop_client(&self, client: &ClientRef) {
        let channels: Vec<Arc<Channel>> = self.channels.lock().values().cloned().collect();
        for channel in channels {
            channel.part(client);
        }
    }

    /// Destroy battle rooms that emptied out or idled past the limit.
    fn sweep_idle_rooms(&self) {
        let stale: Vec<Arc<Channel>> = self
            .channels
            .lock()
            .values()
            .filter(|c| c.channel_type() == ChannelType::Battle)
            .filter(|c| c.is_empty() || c.last_activity().elapsed() > ROOM_IDLE_TIMEOUT)
            .cloned()
            .collect();
        for channel in stale {
            info!(channel = channel.id(), "destroying idle battle room");
            if let Some(battle) = self.battle(channel.id()) {
                battle.abandon();
            }
            self.channels.lock().remove(&channel.id());
        }
    }
}

fn spawn_janitor(server: &Arc<Server>) {
    let weak: Weak<Server> = Arc::downgrade(server);
    let _ = thread::Builder::new().name("room-janitor".to_string()).spawn(move || loop {
        thread::sleep(JANITOR_INTERVAL);
        let Some(server) = weak.upgrade() else {
            break;
        };
        server.sweep_idle_rooms();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use battle_core::testkit;

    #[test]
    fn clients_get_distinct_ids() {
        let server = Server::new(testkit::dex());
        let (a, _rx_a) = server.register_client("alice");
        let (b, _rx_b) = server.register_client("bob");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn battle_channels_are_registered_and_looked_up() {
        let server = Server::new(testkit::dex());
        let (a, _rx_a) = server.register_client("alice");
        let (b, _rx_b) = server.register_client("bob");
        let battle = server
            .start_battle(
                [a, b],
                [
                    testkit::team("Galewing", &["Tackle"], "No Ability", None),
                    testkit::team("Tidefin", &["Tackle"], "No Ability", None),
                ],
                Generation::MODERN,
                1,
                7,
            )
            .expect("battle starts");
        assert!(server.battle(battle.id()).is_some());
        assert!(server.channel(battle.id()).is_some());
        assert_eq!(battle.channel().member_count(), 2);
    }
}
