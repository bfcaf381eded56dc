/// Per-connection broker-side record, per spec.md §3.
#[derive(Debug, Clone)]
pub struct Session {
    pub client_id: String,
    pub keep_alive: u16,
    /// Topic patterns this session currently owns, mirrored into the
    /// subscription trie (Invariants §3: both sides updated together).
    pub subscriptions: Vec<String>,
    /// Set once CONNECT has been processed for this connection.
    pub connected: bool,
}

impl Session {
    pub fn new(client_id: String, keep_alive: u16) -> Self {
        Self {
            client_id,
            keep_alive,
            subscriptions: Vec::new(),
            connected: true,
        }
    }

    pub fn add_subscription(&mut self, pattern: &str) {
        if !self.subscriptions.iter().any(|p| p == pattern) {
            self.subscriptions.push(pattern.to_string());
        }
    }

    pub fn remove_subscription(&mut self, pattern: &str) {
        self.subscriptions.retain(|p| p != pattern);
    }
}
