// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collaborator seams: wire output and sample keying.
//!
//! The runtime never inspects payload bytes. Serialization and transport
//! live behind these traits so a binding can plug in its own codec and
//! network stack; the runtime only needs a 16-byte key hash per payload to
//! group samples into instances.

use crate::core::cache::InstanceHandle;
use crate::core::entity::EntityHandle;

/// Outbound wire hook. Every accepted `write` is offered to the sink after
/// local delivery; a transport binding forwards it, the default sink drops
/// it.
pub trait WireSink: Send + Sync {
    /// Ship one sample. `timestamp` is the source timestamp in nanoseconds.
    fn send(&self, topic: &str, writer: EntityHandle, payload: &[u8], timestamp: u64);
}

/// Sink that discards everything (intra-process only operation).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWireSink;

impl WireSink for NullWireSink {
    fn send(&self, _topic: &str, _writer: EntityHandle, _payload: &[u8], _timestamp: u64) {}
}

/// Instance keying for one topic type. Implemented by the binding; the
/// runtime treats payloads as opaque and only uses the key hash.
pub trait SampleCodec: Send + Sync {
    /// 16-byte key hash of the payload. All-zero means keyless.
    fn key_hash(&self, payload: &[u8]) -> [u8; 16];
}

/// Codec for keyless topics: every sample lands in the nil instance.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeylessCodec;

impl SampleCodec for KeylessCodec {
    fn key_hash(&self, _payload: &[u8]) -> [u8; 16] {
        InstanceHandle::nil().0
    }
}

/// Test codec: the key is the first `prefix_len` payload bytes, zero-padded.
///
/// Lets tests address instances by payload prefix without a real type
/// support layer.
#[derive(Debug, Clone, Copy)]
pub struct PrefixKeyCodec {
    prefix_len: usize,
}

impl PrefixKeyCodec {
    /// Codec keyed on the first `prefix_len` bytes (capped at 16).
    #[must_use]
    pub fn new(prefix_len: usize) -> Self {
        Self {
            prefix_len: prefix_len.min(16),
        }
    }
}

impl SampleCodec for PrefixKeyCodec {
    fn key_hash(&self, payload: &[u8]) -> [u8; 16] {
        let mut hash = [0u8; 16];
        let take = self.prefix_len.min(payload.len());
        hash[..take].copy_from_slice(&payload[..take]);
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyless_codec_is_nil() {
        let codec = KeylessCodec;
        assert_eq!(codec.key_hash(b"anything"), InstanceHandle::nil().0);
    }

    #[test]
    fn test_prefix_codec_groups_by_prefix() {
        let codec = PrefixKeyCodec::new(4);
        assert_eq!(codec.key_hash(b"key1:a"), codec.key_hash(b"key1:b"));
        assert_ne!(codec.key_hash(b"key1:a"), codec.key_hash(b"key2:a"));
    }

    #[test]
    fn test_prefix_codec_short_payload_padded() {
        let codec = PrefixKeyCodec::new(8);
        let hash = codec.key_hash(b"ab");
        assert_eq!(&hash[..2], b"ab");
        assert!(hash[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_prefix_len_capped() {
        let codec = PrefixKeyCodec::new(64);
        let payload = [7u8; 32];
        assert_eq!(codec.key_hash(&payload), [7u8; 16]);
    }
}
