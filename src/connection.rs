use parking_lot::Mutex;
use std::fmt;
use tokio::sync::mpsc;

/// What the broker requires of a connection, per spec.md §4.6: a
/// buffered best-effort write path, a way to terminate the peer, and a
/// stable identity usable as a map key. The broker never reads from a
/// socket directly — bytes arrive through a connection's own read loop
/// and are pushed into that connection's `Stream`.
pub trait Connection: fmt::Debug {
    fn id(&self) -> u64;
    fn write(&self, bytes: Vec<u8>);
    fn disconnect(&self);
}

/// A connection backed by a bounded mpsc channel to its write-side
/// task. A full channel drops the current delivery rather than
/// blocking the broker's single lock-holding call (spec.md §5
/// "Backpressure"). `disconnect` drops the sender so the write task's
/// `recv` loop observes channel closure and tears down the socket.
#[derive(Debug)]
pub struct TcpConnection {
    id: u64,
    outbound: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl TcpConnection {
    pub fn new(id: u64, outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            id,
            outbound: Mutex::new(Some(outbound)),
        }
    }
}

impl Connection for TcpConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn write(&self, bytes: Vec<u8>) {
        let sent = self
            .outbound
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.try_send(bytes).is_ok());
        if !sent {
            tracing::warn!(connection_id = self.id, "dropping write, outbound full or closed");
        }
    }

    fn disconnect(&self) {
        self.outbound.lock().take();
    }
}
