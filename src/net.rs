//! Thin TCP frontend: thread-per-connection frame pump.
//!
//! The transport is deliberately plain — any reliable ordered byte stream
//! carries the protocol. A connection introduces itself with `HELLO`,
//! after which frames are decoded and dispatched to the server. A writer
//! thread drains the client's send queue onto the socket.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::client::ClientRef;
use crate::codec::split_frame;
use crate::error::ProtocolError;
use crate::server::Server;
use crate::wire::{decode_command, ClientCommand};

pub fn run(server: Arc<Server>, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr).with_context(|| format!("bind {addr}"))?;
    info!(%addr, "listening");
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let server = server.clone();
                let _ = thread::Builder::new()
                    .name("client-session".to_string())
                    .spawn(move || {
                        if let Err(err) = session(server, stream) {
                            debug!(%err, "session ended");
                        }
                    });
            }
            Err(err) => warn!(%err, "accept failed"),
        }
    }
    Ok(())
}

fn session(server: Arc<Server>, mut stream: TcpStream) -> Result<()> {
    let peer = stream.peer_addr()?;
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let mut client: Option<ClientRef> = None;

    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        while let Some((opcode, payload, consumed)) = split_frame(&buf) {
            let command = match decode_command(opcode, payload) {
                Ok(command) => command,
                Err(err) => {
                    // Malformed traffic closes the connection.
                    warn!(%peer, %err, "closing connection");
                    if let Some(client) = &client {
                        server.drop_client(client);
                    }
                    return Ok(());
                }
            };
            buf.drain(..consumed);
            match command {
                ClientCommand::Hello { name } => {
                    if client.is_none() {
                        let (handle, rx) = server.register_client(name);
                        spawn_writer(stream.try_clone()?, rx);
                        info!(%peer, client = handle.id(), "client registered");
                        client = Some(handle);
                    }
                }
                command => {
                    let Some(client) = &client else {
                        warn!(%peer, "command before hello");
                        return Ok(());
                    };
                    dispatch(&server, client, command);
                }
            }
        }
    }

    if let Some(client) = &client {
        server.drop_client(client);
    }
    Ok(())
}

fn dispatch(server: &Arc<Server>, client: &ClientRef, command: ClientCommand) {
    match command {
        ClientCommand::Hello { .. } => {}
        ClientCommand::SubmitTurn { field_id, order } => {
            if let Some(battle) = server.battle(field_id as u32) {
                match battle.handle_turn(client, order) {
                    // Already answered with a fresh REQUEST_ACTION.
                    Ok(()) | Err(ProtocolError::IllegalOrder) => {}
                    Err(err) => debug!(client = client.id(), %err, "order dropped"),
                }
            }
        }
        ClientCommand::CancelTurn { field_id } => {
            if let Some(battle) = server.battle(field_id as u32) {
                battle.cancel_action(client);
            }
        }
        ClientCommand::JoinChannel { channel_id } => {
            if let Err(err) = server.join_channel(client, channel_id as u32) {
                debug!(client = client.id(), %err, "join refused");
            }
        }
        ClientCommand::PartChannel { channel_id } => {
            server.part_channel(client, channel_id as u32);
        }
    }
}

fn spawn_writer(mut stream: TcpStream, rx: crossbeam_channel::Receiver<Vec<u8>>) {
    let _ = thread::Builder::new().name("client-writer".to_string()).spawn(move || {
        for frame in rx {
            if stream.write_all(&frame).is_err() {
                break;
            }
        }
    });
}
