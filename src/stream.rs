use crate::error::{Error, Result};
use crate::mqtt::{FixedHeader, Message, FIXED_HEADER_MIN_SIZE};

/// Incremental per-connection message extractor. Turns an unbounded
/// byte stream into a sequence of whole MQTT messages, tolerating
/// partial reads and multi-message buffers.
///
/// Backed by a fixed-capacity `Vec<u8>` that is compacted in place on
/// overflow rather than reallocated on every `push` (Design Notes §9).
pub struct Stream {
    buffer: Vec<u8>,
    capacity: usize,
    start: usize,
    end: usize,
    /// Cached `(header_size, body_len)` of the message at the head of
    /// the current window, once its fixed header is decodable.
    remaining: Option<(usize, u32)>,
}

impl Stream {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity],
            capacity,
            start: 0,
            end: 0,
            remaining: None,
        }
    }

    fn view(&self) -> &[u8] {
        &self.buffer[self.start..self.end]
    }

    /// Appends `bytes`, compacting the unread prefix to the front of
    /// the backing buffer first if needed. Fails with `Error::Overflow`
    /// if the data still would not fit after compaction.
    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        if self.end + bytes.len() > self.capacity {
            let unread = self.end - self.start;
            self.buffer.copy_within(self.start..self.end, 0);
            self.start = 0;
            self.end = unread;
        }
        if self.end + bytes.len() > self.capacity {
            return Err(Error::Overflow);
        }
        self.buffer[self.end..self.end + bytes.len()].copy_from_slice(bytes);
        self.end += bytes.len();
        self.update_remaining();
        Ok(())
    }

    /// True iff the current window holds a whole message: the fixed
    /// header is decodable and `remaining` bytes of body follow it.
    pub fn has_message(&self) -> bool {
        match self.remaining {
            Some((header_size, body_len)) => {
                self.view().len() >= header_size + body_len as usize
            }
            None => false,
        }
    }

    fn update_remaining(&mut self) {
        if self.remaining.is_some() {
            return;
        }
        let view = self.view();
        if view.len() < FIXED_HEADER_MIN_SIZE {
            return;
        }
        let mut cursor = view;
        let before = cursor.len();
        if let Ok(header) = FixedHeader::from_bytes(&mut cursor) {
            let header_size = before - cursor.len();
            self.remaining = Some((header_size, header.remaining_length));
        }
    }

    /// Returns the next whole message, advancing past it, or `Ok(None)`
    /// if the current window is not a whole message yet.
    pub fn next_message(&mut self) -> Result<Option<Message>> {
        if !self.has_message() {
            return Ok(None);
        }
        let (header_size, body_len) = self.remaining.expect("has_message just confirmed this");
        let total = header_size + body_len as usize;

        let packet_bytes = self.view()[..total].to_vec();
        self.start += total;
        self.remaining = None;
        self.update_remaining();

        Message::decode(&packet_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::{FixedHeaderFlags, PacketType, PingReqPacket};

    fn pingreq_bytes() -> Vec<u8> {
        let header = FixedHeader::new(PacketType::Pingreq, FixedHeaderFlags::default(), 0);
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        buf
    }

    #[test]
    fn yields_one_message_per_push() {
        let mut stream = Stream::new(64);
        stream.push(&pingreq_bytes()).unwrap();
        assert!(stream.has_message());
        let msg = stream.next_message().unwrap().unwrap();
        assert!(matches!(msg, Message::PingReq(PingReqPacket)));
        assert!(!stream.has_message());
        assert!(stream.next_message().unwrap().is_none());
    }

    #[test]
    fn handles_multi_message_batch_in_one_push() {
        let mut bytes = pingreq_bytes();
        bytes.extend(pingreq_bytes());
        let mut stream = Stream::new(64);
        stream.push(&bytes).unwrap();

        let first = stream.next_message().unwrap().unwrap();
        let second = stream.next_message().unwrap().unwrap();
        assert!(matches!(first, Message::PingReq(_)));
        assert!(matches!(second, Message::PingReq(_)));
        assert!(stream.next_message().unwrap().is_none());
    }

    #[test]
    fn framing_is_split_invariant() {
        let whole = {
            let mut bytes = pingreq_bytes();
            bytes.extend(pingreq_bytes());
            bytes
        };

        // Feed the whole stream at once.
        let mut one_shot = Stream::new(64);
        one_shot.push(&whole).unwrap();
        let mut one_shot_msgs = Vec::new();
        while let Some(msg) = one_shot.next_message().unwrap() {
            one_shot_msgs.push(format!("{msg:?}"));
        }

        // Feed it one byte at a time.
        let mut trickle = Stream::new(64);
        let mut trickle_msgs = Vec::new();
        for byte in &whole {
            trickle.push(std::slice::from_ref(byte)).unwrap();
            while let Some(msg) = trickle.next_message().unwrap() {
                trickle_msgs.push(format!("{msg:?}"));
            }
        }

        assert_eq!(one_shot_msgs, trickle_msgs);
    }

    #[test]
    fn compacts_instead_of_overflowing_when_space_frees_up() {
        let mut stream = Stream::new(3);
        stream.push(&pingreq_bytes()).unwrap();
        stream.next_message().unwrap();
        // start==2, end==2 now with only 1 byte of headroom left before
        // capacity; pushing another 2-byte message must compact back to
        // offset 0 rather than failing.
        stream.push(&pingreq_bytes()).unwrap();
        assert!(stream.next_message().unwrap().is_some());
    }

    #[test]
    fn overflow_when_message_cannot_fit_even_after_compaction() {
        let mut stream = Stream::new(1);
        assert!(matches!(
            stream.push(&pingreq_bytes()),
            Err(Error::Overflow)
        ));
    }
}
