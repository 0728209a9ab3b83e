//! Networked turn-based creature battle server.
//!
//! [`battle_core`] arbitrates the fights; this crate frames the protocol,
//! fans events out to rooms, and synchronizes the two sides' orders.

pub mod battle;
pub mod channel;
pub mod client;
pub mod codec;
pub mod error;
pub mod handoff;
pub mod net;
pub mod server;
pub mod wire;

pub use battle_core::prelude::*;
