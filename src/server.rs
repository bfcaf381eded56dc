use crate::broker::Broker;
use crate::config::BrokerConfig;
use crate::connection::{Connection, TcpConnection};
use crate::error::Result;
use crate::mqtt::Message;
use crate::stream::Stream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Tracks open connection handles so shutdown can close them all, per
/// spec.md §1's external-collaborator `ConnectionManager`.
#[derive(Default)]
struct ConnectionManager {
    connections: Mutex<HashMap<u64, Arc<TcpConnection>>>,
}

impl ConnectionManager {
    fn insert(&self, conn: Arc<TcpConnection>) {
        self.connections.lock().insert(conn.id(), conn);
    }

    fn remove(&self, id: u64) {
        self.connections.lock().remove(&id);
    }

    fn close_all(&self) {
        for conn in self.connections.lock().values() {
            conn.disconnect();
        }
    }
}

/// Runs the accept loop until SIGINT, then closes every open
/// connection and returns. One `tokio::spawn`ed task per connection
/// owns that socket's read half and feeds bytes into its `Stream`;
/// all broker state mutation happens behind `broker`'s lock.
pub async fn run(config: BrokerConfig) -> Result<()> {
    let listener = TcpListener::bind(config.addr()).await?;
    tracing::info!(addr = %config.addr(), "broker listening");

    let broker = Arc::new(Mutex::new(Broker::new(config.enable_cache)));
    let manager = Arc::new(ConnectionManager::default());
    let next_id = Arc::new(AtomicU64::new(1));
    let buffer_capacity = config.stream_buffer_capacity;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(connection_id = id, %peer, "accepted connection");

                let (outbound_tx, outbound_rx) = mpsc::channel::<Vec<u8>>(64);
                let connection = Arc::new(TcpConnection::new(id, outbound_tx));
                manager.insert(connection.clone());
                broker.lock().register_connection(connection.clone());

                let broker = broker.clone();
                let manager = manager.clone();
                tokio::spawn(async move {
                    run_connection(socket, connection, outbound_rx, broker.clone(), buffer_capacity).await;
                    broker.lock().on_connection_closed(id);
                    manager.remove(id);
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                manager.close_all();
                return Ok(());
            }
        }
    }
}

async fn run_connection(
    socket: TcpStream,
    connection: Arc<TcpConnection>,
    mut outbound_rx: mpsc::Receiver<Vec<u8>>,
    broker: Arc<Mutex<Broker>>,
    buffer_capacity: usize,
) {
    let (mut read_half, mut write_half) = socket.into_split();

    let writer = tokio::spawn(async move {
        while let Some(bytes) = outbound_rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut stream = Stream::new(buffer_capacity);
    let mut read_buf = [0u8; 4096];
    loop {
        let n = match read_half.read(&mut read_buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if stream.push(&read_buf[..n]).is_err() {
            tracing::warn!(connection_id = connection.id(), "stream overflow, dropping connection");
            break;
        }
        loop {
            match stream.next_message() {
                Ok(Some(message)) => {
                    if let Err(e) = dispatch(&broker, &message, connection.as_ref()) {
                        tracing::warn!(connection_id = connection.id(), error = %e, "dropping connection after error");
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(connection_id = connection.id(), error = %e, "malformed packet, dropping connection");
                    return;
                }
            }
        }
    }

    writer.abort();
}

fn dispatch(broker: &Mutex<Broker>, message: &Message, connection: &dyn Connection) -> Result<()> {
    message.handle(&mut broker.lock(), connection)
}
