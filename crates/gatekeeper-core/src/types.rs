//! Fundamental identifier and value types shared across every gatekeeper crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp, seconds, UTC. Always passed explicitly — never read from
/// `SystemTime::now()` deep inside business logic, so that boundary behavior
/// (dwell floors, TTL expiry) stays deterministic and testable.
pub type Timestamp = i64;

/// A Telegram user id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

/// A file's post number — monotonic-unique across successful uploads.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostNo(pub u64);

impl fmt::Display for PostNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PostNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PostNo({})", self.0)
    }
}

/// Opaque 16-byte (128-bit) verification token identifier.
///
/// Generated by `gatekeeper-crypto`; the type lives here so every crate that
/// needs to *reference* a token (store, engine, web) doesn't have to depend
/// on the crypto crate's CSPRNG machinery.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(pub [u8; 16]);

impl TokenId {
    pub fn from_bytes(b: [u8; 16]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({}…)", &hex::encode(self.0)[..8])
    }
}

/// A coordinate into an external chat/channel: (chat id, message id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCoordinate {
    pub chat_id: i64,
    pub message_id: i32,
}

/// A channel's stable handle (e.g. `@mychannel` or a numeric chat id rendered
/// as a string) — the primary key of a Channel Entry.
pub type ChannelHandle = String;
