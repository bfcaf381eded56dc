use std::collections::HashMap;

struct Entry {
    payload: Vec<u8>,
    encoded: Vec<u8>,
}

/// Short-circuits re-encoding a PUBLISH when the same topic is
/// republished with the same payload at the same effective qos.
/// Eviction policy is overwrite on publish — a single-slot cache per
/// key, unbounded in key count, per spec.md §3. Every publish to a
/// given `(topic, qos)` overwrites the entry; a cache hit additionally
/// requires the payload being published now to match what was cached,
/// so a changed payload is always re-encoded rather than silently
/// replaced by stale bytes.
#[derive(Debug, Default)]
pub struct PayloadCache {
    entries: HashMap<(String, u8), Entry>,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("payload_len", &self.payload.len())
            .field("encoded_len", &self.encoded.len())
            .finish()
    }
}

impl PayloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached encoded bytes iff the entry for
    /// `(topic, effective_qos)` exists and its cached payload equals
    /// `payload` — i.e. this is a true republish, not just a reuse of
    /// a stale entry left by an earlier, different payload.
    pub fn lookup(&self, topic: &str, effective_qos: u8, payload: &[u8]) -> Option<&[u8]> {
        self.entries
            .get(&(topic.to_string(), effective_qos))
            .filter(|entry| entry.payload == payload)
            .map(|entry| entry.encoded.as_slice())
    }

    /// Always overwrites the entry for `(topic, effective_qos)` with
    /// the payload and its freshly encoded bytes.
    pub fn put(&mut self, topic: &str, effective_qos: u8, payload: Vec<u8>, encoded: Vec<u8>) {
        self.entries
            .insert((topic.to_string(), effective_qos), Entry { payload, encoded });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_on_same_payload_same_key() {
        let mut cache = PayloadCache::new();
        cache.put("a/b", 0, vec![1, 2], vec![0xAA]);
        assert_eq!(cache.lookup("a/b", 0, &[1, 2]), Some(&[0xAA][..]));
    }

    #[test]
    fn misses_when_payload_changed_even_though_key_matches() {
        let mut cache = PayloadCache::new();
        cache.put("a/b", 0, vec![1], vec![0xAA]);
        assert_eq!(cache.lookup("a/b", 0, &[2]), None);
    }

    #[test]
    fn overwrites_prior_entry_for_same_key() {
        let mut cache = PayloadCache::new();
        cache.put("a/b", 0, vec![1], vec![0xAA]);
        cache.put("a/b", 0, vec![2], vec![0xBB]);
        assert_eq!(cache.lookup("a/b", 0, &[1]), None);
        assert_eq!(cache.lookup("a/b", 0, &[2]), Some(&[0xBB][..]));
    }

    #[test]
    fn distinct_effective_qos_are_distinct_keys() {
        let mut cache = PayloadCache::new();
        cache.put("a/b", 0, vec![1], vec![0xAA]);
        cache.put("a/b", 1, vec![1], vec![0xBB]);
        assert_eq!(cache.lookup("a/b", 0, &[1]), Some(&[0xAA][..]));
        assert_eq!(cache.lookup("a/b", 1, &[1]), Some(&[0xBB][..]));
    }

    #[test]
    fn miss_for_unknown_key() {
        let cache = PayloadCache::new();
        assert_eq!(cache.lookup("a/b", 0, &[1]), None);
    }
}
