//! Opcodes and the wire form of every domain message.
//!
//! Every battle message leads with the i32 field id (= room id). Encoders
//! build [`OutMessage`] frames; decoders are exact inverses and feed the
//! reference client and the codec round-trip tests.

use battle_core::events::{BattleEvent, SlotReveal};
use battle_core::sim::field::TurnOrder;

use crate::codec::{FrameReader, OutMessage};
use crate::error::ProtocolError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Opcode {
    ChannelInfo = 4,
    ChannelJoin = 5,
    ChannelPart = 6,

    BattleBegin = 10,
    BattlePokemon = 11,
    BattlePrint = 12,
    BattleVictory = 13,
    BattleUseMove = 14,
    BattleWithdraw = 15,
    BattleSendOut = 16,
    BattleHealthChange = 17,
    BattleSetPp = 18,
    BattleFainted = 19,
    BattleBeginTurn = 20,
    RequestAction = 21,

    Hello = 30,
    SubmitTurn = 31,
    CancelTurn = 32,
    JoinChannel = 33,
    PartChannel = 34,
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        use Opcode::*;
        Ok(match value {
            4 => ChannelInfo,
            5 => ChannelJoin,
            6 => ChannelPart,
            10 => BattleBegin,
            11 => BattlePokemon,
            12 => BattlePrint,
            13 => BattleVictory,
            14 => BattleUseMove,
            15 => BattleWithdraw,
            16 => BattleSendOut,
            17 => BattleHealthChange,
            18 => BattleSetPp,
            19 => BattleFainted,
            20 => BattleBeginTurn,
            21 => RequestAction,
            30 => Hello,
            31 => SubmitTurn,
            32 => CancelTurn,
            33 => JoinChannel,
            34 => PartChannel,
            _ => return Err(ProtocolError::MalformedFrame("unknown opcode")),
        })
    }
}

// ---- server → client ------------------------------------------------------

pub fn encode_event(field_id: i32, event: &BattleEvent) -> Vec<u8> {
    match event {
        BattleEvent::Begin { opponent, party } => {
            let mut msg = OutMessage::new(Opcode::BattleBegin as u8);
            msg.write_i32(field_id).write_string(opponent).write_u8(*party);
            msg.finish()
        }
        BattleEvent::PokemonSnapshot { slots } => {
            let mut msg = OutMessage::new(Opcode::BattlePokemon as u8);
            msg.write_i32(field_id);
            for party in slots {
                for slot in party {
                    match slot {
                        Some(SlotReveal { species, gender, shiny }) => {
                            msg.write_i16(*species as i16)
                                .write_u8(*gender)
                                .write_bool(*shiny);
                        }
                        None => {
                            msg.write_i16(-1);
                        }
                    }
                }
            }
            msg.finish()
        }
        BattleEvent::Print { category, message, args } => {
            let mut msg = OutMessage::new(Opcode::BattlePrint as u8);
            msg.write_i32(field_id)
                .write_u8(*category)
                .write_i16(*message as i16)
                .write_u8(args.len() as u8);
            for arg in args {
                msg.write_string(arg);
            }
            msg.finish()
        }
        BattleEvent::Victory { party } => {
            let mut msg = OutMessage::new(Opcode::BattleVictory as u8);
            msg.write_i32(field_id).write_i16(*party);
            msg.finish()
        }
        BattleEvent::UseMove { party, slot, name, move_id } => {
            let mut msg = OutMessage::new(Opcode::BattleUseMove as u8);
            msg.write_i32(field_id)
                .write_u8(*party)
                .write_u8(*slot)
                .write_string(name)
                .write_i16(*move_id as i16);
            msg.finish()
        }
        BattleEvent::Withdraw { party, slot, name } => {
            let mut msg = OutMessage::new(Opcode::BattleWithdraw as u8);
            msg.write_i32(field_id).write_u8(*party).write_u8(*slot).write_string(name);
            msg.finish()
        }
        BattleEvent::SendOut { party, slot, index, name } => {
            let mut msg = OutMessage::new(Opcode::BattleSendOut as u8);
            msg.write_i32(field_id)
                .write_u8(*party)
                .write_u8(*slot)
                .write_u8(*index)
                .write_string(name);
            msg.finish()
        }
        BattleEvent::HealthChange { party, slot, name, delta, total } => {
            let mut msg = OutMessage::new(Opcode::BattleHealthChange as u8);
            msg.write_i32(field_id)
                .write_u8(*party)
                .write_u8(*slot)
                .write_string(name)
                .write_i16(*delta)
                .write_i16(*total);
            msg.finish()
        }
        BattleEvent::SetPp { index, move_slot, pp } => {
            let mut msg = OutMessage::new(Opcode::BattleSetPp as u8);
            msg.write_i32(field_id).write_u8(*index).write_u8(*move_slot).write_u8(*pp);
            msg.finish()
        }
        BattleEvent::Fainted { party, slot, name } => {
            let mut msg = OutMessage::new(Opcode::BattleFainted as u8);
            msg.write_i32(field_id).write_u8(*party).write_u8(*slot).write_string(name);
            msg.finish()
        }
        BattleEvent::BeginTurn { turn } => {
            let mut msg = OutMessage::new(Opcode::BattleBeginTurn as u8);
            msg.write_i32(field_id).write_i16(*turn as i16);
            msg.finish()
        }
    }
}

/// Decode a battle event frame. `party_size` is known to the client from
/// battle setup and sizes the snapshot grid.
pub fn decode_event(
    opcode: u8,
    payload: &[u8],
    party_size: usize,
) -> Result<(i32, BattleEvent), ProtocolError> {
    let mut r = FrameReader::new(payload);
    let field_id = r.read_i32()?;
    let event = match Opcode::try_from(opcode)? {
        Opcode::BattleBegin => BattleEvent::Begin {
            opponent: r.read_string()?,
            party: r.read_u8()?,
        },
        Opcode::BattlePokemon => {
            let mut slots: [Vec<Option<SlotReveal>>; 2] = [Vec::new(), Vec::new()];
            for party in &mut slots {
                for _ in 0..party_size {
                    let species = r.read_i16()?;
                    if species < 0 {
                        party.push(None);
                    } else {
                        party.push(Some(SlotReveal {
                            species: species as u16,
                            gender: r.read_u8()?,
                            shiny: r.read_bool()?,
                        }));
                    }
                }
            }
            BattleEvent::PokemonSnapshot { slots }
        }
        Opcode::BattlePrint => {
            let category = r.read_u8()?;
            let message = r.read_i16()? as u16;
            let argc = r.read_u8()?;
            let mut args = Vec::with_capacity(argc as usize);
            for _ in 0..argc {
                args.push(r.read_string()?);
            }
            BattleEvent::Print { category, message, args }
        }
        Opcode::BattleVictory => BattleEvent::Victory { party: r.read_i16()? },
        Opcode::BattleUseMove => BattleEvent::UseMove {
            party: r.read_u8()?,
            slot: r.read_u8()?,
            name: r.read_string()?,
            move_id: r.read_i16()? as u16,
        },
        Opcode::BattleWithdraw => BattleEvent::Withdraw {
            party: r.read_u8()?,
            slot: r.read_u8()?,
            name: r.read_string()?,
        },
        Opcode::BattleSendOut => BattleEvent::SendOut {
            party: r.read_u8()?,
            slot: r.read_u8()?,
            index: r.read_u8()?,
            name: r.read_string()?,
        },
        Opcode::BattleHealthChange => BattleEvent::HealthChange {
            party: r.read_u8()?,
            slot: r.read_u8()?,
            name: r.read_string()?,
            delta: r.read_i16()?,
            total: r.read_i16()?,
        },
        Opcode::BattleSetPp => BattleEvent::SetPp {
            index: r.read_u8()?,
            move_slot: r.read_u8()?,
            pp: r.read_u8()?,
        },
        Opcode::BattleFainted => BattleEvent::Fainted {
            party: r.read_u8()?,
            slot: r.read_u8()?,
            name: r.read_string()?,
        },
        Opcode::BattleBeginTurn => BattleEvent::BeginTurn { turn: r.read_i16()? as u16 },
        _ => return Err(ProtocolError::MalformedFrame("not a battle event")),
    };
    r.expect_end()?;
    Ok((field_id, event))
}

/// The `REQUEST_ACTION` payload for one pending slot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ActionRequest {
    pub slot: u8,
    pub position: u8,
    pub replacement: bool,
    /// One bit per roster position.
    pub switches: Vec<bool>,
    pub switch_legal: bool,
    pub forced: bool,
    /// One bit per move; empty when forced or replacement.
    pub moves: Vec<bool>,
}

pub fn encode_request_action(field_id: i32, req: &ActionRequest) -> Vec<u8> {
    let mut msg = OutMessage::new(Opcode::RequestAction as u8);
    msg.write_i32(field_id)
        .write_u8(req.slot)
        .write_u8(req.position)
        .write_bool(req.replacement)
        .write_i32(req.switches.len() as i32);
    for &legal in &req.switches {
        msg.write_bool(legal);
    }
    if !req.replacement {
        msg.write_bool(req.switch_legal).write_bool(req.forced);
        if !req.forced {
            msg.write_i32(req.moves.len() as i32);
            for &legal in &req.moves {
                msg.write_bool(legal);
            }
        }
    }
    msg.finish()
}

pub fn decode_request_action(payload: &[u8]) -> Result<(i32, ActionRequest), ProtocolError> {
    let mut r = FrameReader::new(payload);
    let field_id = r.read_i32()?;
    let mut req = ActionRequest {
        slot: r.read_u8()?,
        position: r.read_u8()?,
        replacement: r.read_bool()?,
        ..ActionRequest::default()
    };
    let count = r.read_i32()?;
    if count < 0 {
        return Err(ProtocolError::MalformedFrame("negative count"));
    }
    for _ in 0..count {
        req.switches.push(r.read_bool()?);
    }
    if !req.replacement {
        req.switch_legal = r.read_bool()?;
        req.forced = r.read_bool()?;
        if !req.forced {
            let count = r.read_i32()?;
            if count < 0 {
                return Err(ProtocolError::MalformedFrame("negative count"));
            }
            for _ in 0..count {
                req.moves.push(r.read_bool()?);
            }
        }
    }
    r.expect_end()?;
    Ok((field_id, req))
}

// ---- client → server ------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientCommand {
    Hello { name: String },
    SubmitTurn { field_id: i32, order: TurnOrder },
    CancelTurn { field_id: i32 },
    JoinChannel { channel_id: i32 },
    PartChannel { channel_id: i32 },
}

const ORDER_MOVE: u8 = 0;
const ORDER_SWITCH: u8 = 1;

pub fn encode_command(command: &ClientCommand) -> Vec<u8> {
    match command {
        ClientCommand::Hello { name } => {
            let mut msg = OutMessage::new(Opcode::Hello as u8);
            msg.write_string(name);
            msg.finish()
        }
        ClientCommand::SubmitTurn { field_id, order } => {
            let mut msg = OutMessage::new(Opcode::SubmitTurn as u8);
            msg.write_i32(*field_id);
            match order {
                TurnOrder::Move { slot, target } => {
                    msg.write_u8(ORDER_MOVE).write_u8(*slot as u8).write_u8(*target as u8);
                }
                TurnOrder::Switch { index } => {
                    msg.write_u8(ORDER_SWITCH).write_u8(*index as u8).write_u8(0);
                }
            }
            msg.finish()
        }
        ClientCommand::CancelTurn { field_id } => {
            let mut msg = OutMessage::new(Opcode::CancelTurn as u8);
            msg.write_i32(*field_id);
            msg.finish()
        }
        ClientCommand::JoinChannel { channel_id } => {
            let mut msg = OutMessage::new(Opcode::JoinChannel as u8);
            msg.write_i32(*channel_id);
            msg.finish()
        }
        ClientCommand::PartChannel { channel_id } => {
            let mut msg = OutMessage::new(Opcode::PartChannel as u8);
            msg.write_i32(*channel_id);
            msg.finish()
        }
    }
}

pub fn decode_command(opcode: u8, payload: &[u8]) -> Result<ClientCommand, ProtocolError> {
    let mut r = FrameReader::new(payload);
    let command = match Opcode::try_from(opcode)? {
        Opcode::Hello => ClientCommand::Hello { name: r.read_string()? },
        Opcode::SubmitTurn => {
            let field_id = r.read_i32()?;
            let kind = r.read_u8()?;
            let a = r.read_u8()?;
            let b = r.read_u8()?;
            let order = match kind {
                ORDER_MOVE => TurnOrder::Move { slot: a as i8, target: b as i8 },
                ORDER_SWITCH => TurnOrder::Switch { index: a as usize },
                _ => return Err(ProtocolError::MalformedFrame("unknown order kind")),
            };
            ClientCommand::SubmitTurn { field_id, order }
        }
        Opcode::CancelTurn => ClientCommand::CancelTurn { field_id: r.read_i32()? },
        Opcode::JoinChannel => ClientCommand::JoinChannel { channel_id: r.read_i32()? },
        Opcode::PartChannel => ClientCommand::PartChannel { channel_id: r.read_i32()? },
        _ => return Err(ProtocolError::MalformedFrame("not a client command")),
    };
    r.expect_end()?;
    Ok(command)
}

// ---- channel events -------------------------------------------------------

pub fn encode_channel_join(channel_id: i32, user: &str, flags: u32) -> Vec<u8> {
    let mut msg = OutMessage::new(Opcode::ChannelJoin as u8);
    msg.write_i32(channel_id).write_string(user).write_i32(flags as i32);
    msg.finish()
}

pub fn encode_channel_part(channel_id: i32, user: &str) -> Vec<u8> {
    let mut msg = OutMessage::new(Opcode::ChannelPart as u8);
    msg.write_i32(channel_id).write_string(user);
    msg.finish()
}

/// Room-state snapshot delivered to a joiner.
pub fn encode_channel_info(
    channel_id: i32,
    channel_type: u8,
    name: &str,
    topic: &str,
    members: &[(String, u32)],
) -> Vec<u8> {
    let mut msg = OutMessage::new(Opcode::ChannelInfo as u8);
    msg.write_i32(channel_id)
        .write_u8(channel_type)
        .write_string(name)
        .write_string(topic)
        .write_i32(members.len() as i32);
    for (member, flags) in members {
        msg.write_string(member).write_i32(*flags as i32);
    }
    msg.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::split_frame;

    #[test]
    fn submit_turn_round_trips() {
        for order in [
            TurnOrder::Move { slot: 2, target: 1 },
            TurnOrder::Move { slot: -1, target: -1 },
            TurnOrder::Switch { index: 3 },
        ] {
            let cmd = ClientCommand::SubmitTurn { field_id: 9, order };
            let frame = encode_command(&cmd);
            let (opcode, payload, _) = split_frame(&frame).expect("complete frame");
            assert_eq!(decode_command(opcode, payload).unwrap(), cmd);
        }
    }

    #[test]
    fn request_action_round_trips() {
        let req = ActionRequest {
            slot: 0,
            position: 2,
            replacement: false,
            switches: vec![false, true, true],
            switch_legal: true,
            forced: false,
            moves: vec![true, false, true, true],
        };
        let frame = encode_request_action(77, &req);
        let (_, payload, _) = split_frame(&frame).expect("complete frame");
        assert_eq!(decode_request_action(payload).unwrap(), (77, req));
    }

    #[test]
    fn forced_request_omits_move_bits() {
        let req = ActionRequest {
            slot: 1,
            position: 0,
            replacement: false,
            switches: vec![true],
            switch_legal: false,
            forced: true,
            moves: Vec::new(),
        };
        let frame = encode_request_action(5, &req);
        let (_, payload, _) = split_frame(&frame).expect("complete frame");
        let (_, decoded) = decode_request_action(payload).unwrap();
        assert!(decoded.forced);
        assert!(decoded.moves.is_empty());
    }
}
