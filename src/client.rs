//! Client handles with bounded, never-blocking send queues.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Frames a slow client may fall behind by before it is dropped.
pub const SEND_QUEUE_CAPACITY: usize = 256;

pub type ClientRef = Arc<Client>;

/// One connected client. The engine only ever enqueues encoded frames;
/// a writer loop (or a test) drains the receiving end.
pub struct Client {
    id: u32,
    name: String,
    tx: Sender<Vec<u8>>,
}

impl Client {
    /// Build a client plus the receiving end of its send queue.
    pub fn pair(id: u32, name: impl Into<String>) -> (ClientRef, Receiver<Vec<u8>>) {
        let (tx, rx) = bounded(SEND_QUEUE_CAPACITY);
        (Arc::new(Client { id, name: name.into(), tx }), rx)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a frame. Returns false when the queue is full or the
    /// reader is gone; the caller drops the member, never blocks.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("id", &self.id).field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_reports_failure_instead_of_blocking() {
        let (client, _rx) = Client::pair(1, "slowpoke");
        for _ in 0..SEND_QUEUE_CAPACITY {
            assert!(client.send(vec![0]));
        }
        assert!(!client.send(vec![0]));
    }

    #[test]
    fn dropped_reader_reports_failure() {
        let (client, rx) = Client::pair(2, "gone");
        drop(rx);
        assert!(!client.send(vec![0]));
    }
}
