use crate::cache::PayloadCache;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::mqtt::{
    ConnackPacket, ConnectPacket, ConnectReturnCode, PingRespPacket, PublishPacket, SubackPacket,
    SubscribePacket, UnsubackPacket, UnsubscribePacket, SUBACK_FAILURE,
};
use crate::session::Session;
use crate::subscription::SubscriptionTrie;
use std::collections::HashMap;
use std::sync::Arc;

/// Central broker state: per-connection sessions plus the global
/// subscription trie, per spec.md §4.5. One instance is shared behind
/// a lock across every connection task (§5).
pub struct Broker {
    sessions: HashMap<u64, Session>,
    /// Live peer handles, keyed by the same connection id as `sessions`,
    /// used to fan PUBLISH out to subscribers other than the publisher.
    connections: HashMap<u64, Arc<dyn Connection>>,
    subscriptions: SubscriptionTrie,
    cache: Option<PayloadCache>,
}

impl Broker {
    pub fn new(enable_cache: bool) -> Self {
        Self {
            sessions: HashMap::new(),
            connections: HashMap::new(),
            subscriptions: SubscriptionTrie::new(),
            cache: enable_cache.then(PayloadCache::new),
        }
    }

    /// Registers a newly accepted connection so other sessions'
    /// PUBLISH fanout can reach it. Called by the external acceptor
    /// before any bytes from that connection are fed to the broker.
    pub fn register_connection(&mut self, connection: Arc<dyn Connection>) {
        self.connections.insert(connection.id(), connection);
    }

    /// True iff CONNECT has already been processed for this
    /// connection, per spec.md §3 `Session.connected`.
    fn is_connected(&self, connection_id: u64) -> bool {
        self.sessions
            .get(&connection_id)
            .is_some_and(|session| session.connected)
    }

    /// spec.md §4.5: "If the fixed header's `type` nibble is not
    /// CONNECT as the first message on a connection, reply
    /// CONNACK(BAD_VERSION) and close." Every handler but `on_connect`
    /// calls this first.
    fn reject_not_connected(&self, connection: &dyn Connection) -> Result<()> {
        tracing::warn!(connection_id = connection.id(), "message received before CONNECT");
        let reply = ConnackPacket::new(ConnectReturnCode::BadVersion);
        connection.write(reply.encode()?);
        connection.disconnect();
        Err(Error::ProtocolViolation(
            "message received before CONNECT".into(),
        ))
    }

    pub fn on_connect(&mut self, connection: &dyn Connection, packet: &ConnectPacket) -> Result<()> {
        let session = Session::new(packet.client_id().to_string(), packet.keep_alive());
        self.sessions.insert(connection.id(), session);
        tracing::info!(client_id = packet.client_id(), "client connected");
        let reply = ConnackPacket::new(ConnectReturnCode::Accepted);
        connection.write(reply.encode()?);
        Ok(())
    }

    pub fn on_publish(&mut self, connection: &dyn Connection, packet: &PublishPacket) -> Result<()> {
        if !self.is_connected(connection.id()) {
            return self.reject_not_connected(connection);
        }

        for subscriber in self.subscriptions.publish(&packet.topic) {
            let effective_qos = packet.qos.min(subscriber.qos);
            let Some(target) = self.connections.get(&subscriber.session) else {
                continue;
            };

            let cached = self
                .cache
                .as_ref()
                .and_then(|cache| cache.lookup(&packet.topic, effective_qos, &packet.payload))
                .map(<[u8]>::to_vec);

            let bytes = match cached {
                Some(bytes) => bytes,
                None => {
                    let outbound = PublishPacket {
                        packet_id: packet.packet_id,
                        qos: effective_qos,
                        dup: false,
                        retain: false,
                        topic: packet.topic.clone(),
                        payload: packet.payload.clone(),
                    };
                    let encoded = outbound.write_to_vec()?;
                    if let Some(cache) = self.cache.as_mut() {
                        cache.put(
                            &packet.topic,
                            effective_qos,
                            packet.payload.clone(),
                            encoded.clone(),
                        );
                    }
                    encoded
                }
            };
            target.write(bytes);
        }
        Ok(())
    }

    pub fn on_subscribe(&mut self, connection: &dyn Connection, packet: &SubscribePacket) -> Result<()> {
        if !self.is_connected(connection.id()) {
            return self.reject_not_connected(connection);
        }
        let session = self
            .sessions
            .get_mut(&connection.id())
            .expect("is_connected just confirmed a session exists");

        let mut return_codes = Vec::with_capacity(packet.subscription_topics.len());
        for entry in &packet.subscription_topics {
            let granted = entry.qos.min(2);
            match self.subscriptions.subscribe(&entry.topic, granted, connection.id()) {
                Ok(()) => {
                    session.add_subscription(&entry.topic);
                    return_codes.push(granted);
                }
                Err(_) => return_codes.push(SUBACK_FAILURE),
            }
        }

        let reply = SubackPacket::new(packet.packet_id, return_codes);
        connection.write(reply.encode()?);
        Ok(())
    }

    pub fn on_unsubscribe(
        &mut self,
        connection: &dyn Connection,
        packet: &UnsubscribePacket,
    ) -> Result<()> {
        if !self.is_connected(connection.id()) {
            return self.reject_not_connected(connection);
        }
        let session = self
            .sessions
            .get_mut(&connection.id())
            .expect("is_connected just confirmed a session exists");
        for topic in &packet.topics {
            self.subscriptions.unsubscribe(topic, connection.id());
            session.remove_subscription(topic);
        }
        let reply = UnsubackPacket::new(packet.packet_id);
        connection.write(reply.encode()?);
        Ok(())
    }

    pub fn on_pingreq(&mut self, connection: &dyn Connection) -> Result<()> {
        if !self.is_connected(connection.id()) {
            return self.reject_not_connected(connection);
        }
        connection.write(PingRespPacket.encode()?);
        Ok(())
    }

    pub fn on_disconnect(&mut self, connection: &dyn Connection) -> Result<()> {
        if !self.is_connected(connection.id()) {
            return self.reject_not_connected(connection);
        }
        self.teardown(connection.id());
        connection.disconnect();
        Ok(())
    }

    /// Called by the connection's owning task when its socket closes
    /// without a prior DISCONNECT (spec.md §4.5 "Unexpected close").
    pub fn on_connection_closed(&mut self, connection_id: u64) {
        self.teardown(connection_id);
    }

    fn teardown(&mut self, connection_id: u64) {
        self.connections.remove(&connection_id);
        if let Some(session) = self.sessions.remove(&connection_id) {
            for pattern in &session.subscriptions {
                self.subscriptions.unsubscribe(pattern, connection_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::{ConnectPacket, SubscriptionTopic};
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct RecordingConnection {
        id: u64,
        writes: Mutex<Vec<Vec<u8>>>,
        disconnected: Mutex<bool>,
    }

    impl RecordingConnection {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id,
                writes: Mutex::new(Vec::new()),
                disconnected: Mutex::new(false),
            })
        }
    }

    impl Connection for RecordingConnection {
        fn id(&self) -> u64 {
            self.id
        }

        fn write(&self, bytes: Vec<u8>) {
            self.writes.lock().push(bytes);
        }

        fn disconnect(&self) {
            *self.disconnected.lock() = true;
        }
    }

    fn connect(broker: &mut Broker, conn: &Arc<RecordingConnection>, client_id: &str) {
        broker.register_connection(conn.clone());
        broker
            .on_connect(conn.as_ref(), &ConnectPacket::new(client_id.into(), true))
            .unwrap();
    }

    #[test]
    fn connect_replies_connack_accepted() {
        let mut broker = Broker::new(false);
        let conn = RecordingConnection::new(1);
        connect(&mut broker, &conn, "c1");
        assert_eq!(conn.writes.lock().last().unwrap()[0] & 0xF0, 0x20);
    }

    #[test]
    fn publish_fans_out_to_matching_subscriber_at_min_qos() {
        let mut broker = Broker::new(false);
        let publisher = RecordingConnection::new(1);
        let subscriber = RecordingConnection::new(2);
        connect(&mut broker, &publisher, "pub");
        connect(&mut broker, &subscriber, "sub");

        broker
            .on_subscribe(
                subscriber.as_ref(),
                &SubscribePacket::new(
                    1,
                    vec![SubscriptionTopic {
                        topic: "a/b".into(),
                        qos: 2,
                    }],
                ),
            )
            .unwrap();

        broker
            .on_publish(
                publisher.as_ref(),
                &PublishPacket::new(0, "a/b".into(), b"hi".to_vec(), 1),
            )
            .unwrap();

        let delivered = subscriber.writes.lock();
        let fanned_out = delivered.last().unwrap();
        assert_eq!(fanned_out[0] & 0xF0, 0x30);
        assert!(publisher.writes.lock().len() == 1); // only its own CONNACK
    }

    #[test]
    fn subscribe_to_bad_filter_grants_failure_code() {
        let mut broker = Broker::new(false);
        let conn = RecordingConnection::new(1);
        connect(&mut broker, &conn, "c1");

        broker
            .on_subscribe(
                conn.as_ref(),
                &SubscribePacket::new(
                    5,
                    vec![SubscriptionTopic {
                        topic: "a/#/b".into(),
                        qos: 0,
                    }],
                ),
            )
            .unwrap();

        let suback = conn.writes.lock();
        let body = suback.last().unwrap();
        assert_eq!(*body.last().unwrap(), SUBACK_FAILURE);
    }

    #[test]
    fn unexpected_close_removes_session_and_subscriptions() {
        let mut broker = Broker::new(false);
        let conn = RecordingConnection::new(1);
        connect(&mut broker, &conn, "c1");
        broker
            .on_subscribe(
                conn.as_ref(),
                &SubscribePacket::new(1, vec![SubscriptionTopic { topic: "a/b".into(), qos: 0 }]),
            )
            .unwrap();

        broker.on_connection_closed(1);
        assert!(broker.subscriptions.publish("a/b").is_empty());
        assert!(!broker.sessions.contains_key(&1));
    }

    #[test]
    fn publish_before_connect_is_rejected_with_bad_version() {
        let mut broker = Broker::new(false);
        let conn = RecordingConnection::new(1);
        broker.register_connection(conn.clone());

        let err = broker
            .on_publish(
                conn.as_ref(),
                &PublishPacket::new(0, "a/b".into(), b"hi".to_vec(), 1),
            )
            .unwrap_err();

        assert!(matches!(err, Error::ProtocolViolation(_)));
        let reply = conn.writes.lock();
        let body = reply.last().unwrap();
        assert_eq!(body[0] & 0xF0, 0x20);
        assert_eq!(body[body.len() - 1], ConnectReturnCode::BadVersion as u8);
        assert!(*conn.disconnected.lock());
    }

    #[test]
    fn pingreq_before_connect_is_rejected_with_bad_version() {
        let mut broker = Broker::new(false);
        let conn = RecordingConnection::new(1);
        broker.register_connection(conn.clone());

        let err = broker.on_pingreq(conn.as_ref()).unwrap_err();

        assert!(matches!(err, Error::ProtocolViolation(_)));
        assert!(*conn.disconnected.lock());
    }

    #[test]
    fn disconnect_before_connect_is_rejected_with_bad_version() {
        let mut broker = Broker::new(false);
        let conn = RecordingConnection::new(1);
        broker.register_connection(conn.clone());

        let err = broker.on_disconnect(conn.as_ref()).unwrap_err();

        assert!(matches!(err, Error::ProtocolViolation(_)));
        assert!(*conn.disconnected.lock());
    }

    #[test]
    fn subscribe_before_connect_is_rejected_with_bad_version() {
        let mut broker = Broker::new(false);
        let conn = RecordingConnection::new(1);
        broker.register_connection(conn.clone());

        let err = broker
            .on_subscribe(
                conn.as_ref(),
                &SubscribePacket::new(
                    1,
                    vec![SubscriptionTopic { topic: "a/b".into(), qos: 0 }],
                ),
            )
            .unwrap_err();

        assert!(matches!(err, Error::ProtocolViolation(_)));
        let reply = conn.writes.lock();
        let body = reply.last().unwrap();
        assert_eq!(body[0] & 0xF0, 0x20);
        assert_eq!(body[body.len() - 1], ConnectReturnCode::BadVersion as u8);
    }

    #[test]
    fn cache_enabled_publish_reflects_changed_payload_instead_of_stale_bytes() {
        let mut broker = Broker::new(true);
        let publisher = RecordingConnection::new(1);
        let subscriber = RecordingConnection::new(2);
        connect(&mut broker, &publisher, "pub");
        connect(&mut broker, &subscriber, "sub");

        broker
            .on_subscribe(
                subscriber.as_ref(),
                &SubscribePacket::new(
                    1,
                    vec![SubscriptionTopic { topic: "a/b".into(), qos: 0 }],
                ),
            )
            .unwrap();

        broker
            .on_publish(
                publisher.as_ref(),
                &PublishPacket::new(0, "a/b".into(), b"first".to_vec(), 0),
            )
            .unwrap();
        broker
            .on_publish(
                publisher.as_ref(),
                &PublishPacket::new(0, "a/b".into(), b"second".to_vec(), 0),
            )
            .unwrap();

        let delivered = subscriber.writes.lock();
        assert_eq!(delivered.len(), 2);
        assert_ne!(delivered[0], delivered[1]);
        assert!(delivered[1]
            .windows(b"second".len())
            .any(|w| w == b"second"));
        assert!(!delivered[1]
            .windows(b"first".len())
            .any(|w| w == b"first"));
    }
}
