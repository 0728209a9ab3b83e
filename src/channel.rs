//! Broadcast channels: membership, status flags, fan-out.
//!
//! Every battle is also a channel; spectators join the channel rather
//! than the battle. A [`ChannelBehavior`] computes join flags and reacts
//! to departures, which is where the battle specialization lives.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::warn;

use crate::client::ClientRef;
use crate::error::ProtocolError;
use crate::wire;

/// Per-member status bits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChannelFlags(u32);

impl ChannelFlags {
    pub const NONE: ChannelFlags = ChannelFlags(0);
    pub const OP: ChannelFlags = ChannelFlags(1 << 0);
    pub const OWNER: ChannelFlags = ChannelFlags(1 << 1);
    pub const PROTECTED: ChannelFlags = ChannelFlags(1 << 2);
    pub const MUTED: ChannelFlags = ChannelFlags(1 << 3);
    pub const BANNED: ChannelFlags = ChannelFlags(1 << 4);

    pub fn contains(self, other: ChannelFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ChannelFlags) {
        self.0 |= other.0;
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for ChannelFlags {
    type Output = ChannelFlags;

    fn bitor(self, rhs: ChannelFlags) -> ChannelFlags {
        ChannelFlags(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelType {
    Ordinary = 0,
    Battle = 1,
}

/// Channel-kind specialization points. `handle_part` runs before the
/// member is removed so it can observe who is leaving.
pub trait ChannelBehavior: Send + Sync {
    fn channel_type(&self) -> ChannelType;
    fn join_flags(&self, client: &ClientRef) -> ChannelFlags;
    fn handle_part(&self, client: &ClientRef) {
        let _ = client;
    }
}

/// Plain chat room.
pub struct OrdinaryChannel;

impl ChannelBehavior for OrdinaryChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Ordinary
    }

    fn join_flags(&self, _client: &ClientRef) -> ChannelFlags {
        ChannelFlags::NONE
    }
}

struct Membership {
    members: HashMap<u32, (ClientRef, ChannelFlags)>,
    last_activity: Instant,
}

pub struct Channel {
    id: u32,
    name: String,
    topic: String,
    behavior: Box<dyn ChannelBehavior>,
    state: Mutex<Membership>,
}

impl Channel {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        topic: impl Into<String>,
        behavior: Box<dyn ChannelBehavior>,
    ) -> Channel {
        Channel {
            id,
            name: name.into(),
            topic: topic.into(),
            behavior,
            state: Mutex::new(Membership {
                members: HashMap::new(),
                last_activity: Instant::now(),
            }),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn channel_type(&self) -> ChannelType {
        self.behavior.channel_type()
    }

    pub fn member_count(&self) -> usize {
        self.state.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_count() == 0
    }

    pub fn member_flags(&self, client_id: u32) -> Option<ChannelFlags> {
        self.state.lock().members.get(&client_id).map(|(_, flags)| *flags)
    }

    /// Instant of the last broadcast, for idle-destruction sweeps.
    pub fn last_activity(&self) -> Instant {
        self.state.lock().last_activity
    }

    /// Add a member: compute flags, announce the join to the existing
    /// membership, deliver the room snapshot to the joiner.
    pub fn join(&self, client: &ClientRef) -> Result<ChannelFlags, ProtocolError> {
        let flags = self.behavior.join_flags(client);
        let mut state = self.state.lock();
        if state.members.contains_key(&client.id()) {
            return Err(ProtocolError::AlreadyJoined);
        }
        let join_frame = wire::encode_channel_join(self.id as i32, client.name(), flags.bits());
        let mut dead = Vec::new();
        for (id, (member, _)) in &state.members {
            if !member.send(join_frame.clone()) {
                dead.push(*id);
            }
        }
        for id in dead {
            state.members.remove(&id);
        }
        state.members.insert(client.id(), (client.clone(), flags));

        let members: Vec<(String, u32)> = state
            .members
            .values()
            .map(|(member, flags)| (member.name().to_string(), flags.bits()))
            .collect();
        let info = wire::encode_channel_info(
            self.id as i32,
            self.behavior.channel_type() as u8,
            &self.name,
            &self.topic,
            &members,
        );
        client.send(info);
        Ok(flags)
    }

    /// Remove a member. The behavior hook runs first, while the leaver is
    /// still a member.
    pub fn part(&self, client: &ClientRef) {
        if self.member_flags(client.id()).is_none() {
            return;
        }
        self.behavior.handle_part(client);
        let mut state = self.state.lock();
        if state.members.remove(&client.id()).is_none() {
            return;
        }
        let part_frame = wire::encode_channel_part(self.id as i32, client.name());
        let mut dead = Vec::new();
        for (id, (member, _)) in &state.members {
            if !member.send(part_frame.clone()) {
                dead.push(*id);
            }
        }
        for id in dead {
            state.members.remove(&id);
        }
    }

    /// Fan an encoded frame out to every member. Members whose queues
    /// overflow are dropped; the engine never blocks on a slow client.
    pub fn broadcast_bytes(&self, frame: Vec<u8>) {
        let mut state = self.state.lock();
        state.last_activity = Instant::now();
        let mut dead = Vec::new();
        for (id, (member, _)) in &state.members {
            if !member.send(frame.clone()) {
                dead.push(*id);
            }
        }
        for id in dead {
            if let Some((member, _)) = state.members.remove(&id) {
                warn!(client = %member.name(), channel = self.id, "dropping slow member");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::codec::split_frame;
    use crate::wire::Opcode;

    fn ordinary() -> Channel {
        Channel::new(7, "main", "the lobby", Box::new(OrdinaryChannel))
    }

    #[test]
    fn join_delivers_snapshot_and_announces() {
        let channel = ordinary();
        let (alice, alice_rx) = Client::pair(1, "alice");
        let (bob, bob_rx) = Client::pair(2, "bob");
        channel.join(&alice).unwrap();
        let frame = alice_rx.try_recv().expect("joiner gets room info");
        assert_eq!(split_frame(&frame).unwrap().0, Opcode::ChannelInfo as u8);

        channel.join(&bob).unwrap();
        let frame = alice_rx.try_recv().expect("existing member sees join");
        assert_eq!(split_frame(&frame).unwrap().0, Opcode::ChannelJoin as u8);
        assert!(bob_rx.try_recv().is_ok());
    }

    #[test]
    fn double_join_is_rejected() {
        let channel = ordinary();
        let (alice, _rx) = Client::pair(1, "alice");
        channel.join(&alice).unwrap();
        assert_eq!(channel.join(&alice), Err(ProtocolError::AlreadyJoined));
    }

    #[test]
    fn overflowing_member_is_dropped_from_broadcast() {
        let channel = ordinary();
        let (alice, _alice_rx) = Client::pair(1, "alice");
        let (bob, bob_rx) = Client::pair(2, "bob");
        channel.join(&alice).unwrap();
        channel.join(&bob).unwrap();
        drop(bob_rx);
        channel.broadcast_bytes(vec![1, 2, 3]);
        assert_eq!(channel.member_count(), 1);
        assert!(channel.member_flags(1).is_some());
    }

    #[test]
    fn part_announces_to_remaining_members() {
        let channel = ordinary();
        let (alice, alice_rx) = Client::pair(1, "alice");
        let (bob, _bob_rx) = Client::pair(2, "bob");
        channel.join(&alice).unwrap();
        channel.join(&bob).unwrap();
        while alice_rx.try_recv().is_ok() {}
        channel.part(&bob);
        let frame = alice_rx.try_recv().expect("part is announced");
        assert_eq!(split_frame(&frame).unwrap().0, Opcode::ChannelPart as u8);
        assert_eq!(channel.member_count(), 1);
    }
}
