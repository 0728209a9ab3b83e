//! Protocol and ordering error kinds.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Short read, length mismatch, bad UTF-8 or an unknown required
    /// opcode. Closes the offending connection.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// An order that fails legality checks; answered by a fresh
    /// `REQUEST_ACTION`.
    #[error("illegal order")]
    IllegalOrder,

    /// An order arriving when none is expected; ignored.
    #[error("order arrived out of turn")]
    OutOfOrderOrder,

    /// An effect's install hook refused the installation.
    #[error("effect installation failed: {0}")]
    EffectInstallFailed(String),

    /// A party let the per-round clock run out.
    #[error("client timed out")]
    TimeoutForfeit,

    #[error("client disconnected")]
    Disconnected,

    #[error("already joined")]
    AlreadyJoined,
}
