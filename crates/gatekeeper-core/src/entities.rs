//! Entity types for the six logical collections (spec.md §3, §6).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{ChannelHandle, MessageCoordinate, PostNo, TokenId, Timestamp, UserId};

// ── User Entitlement ──────────────────────────────────────────────────────────

/// Key: `user_id`, unique. Invariant: `verified ⇒ verified_at ≤ expires_at`.
/// Created on first contact; retained indefinitely — `expires_at` drives
/// semantic expiry, never deletion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserEntitlement {
    pub user_id: UserId,
    pub verified: bool,
    pub verified_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
    pub files_consumed: u32,
    /// Idempotent tracking set — re-adding an existing post number is a no-op.
    pub files_seen: BTreeSet<PostNo>,
    pub last_seen: Timestamp,
}

impl UserEntitlement {
    /// A freshly seeded record for a user's first contact.
    pub fn new(user_id: UserId, now: Timestamp) -> Self {
        Self {
            user_id,
            verified: false,
            verified_at: None,
            expires_at: None,
            files_consumed: 0,
            files_seen: BTreeSet::new(),
            last_seen: now,
        }
    }

    /// A verified entitlement whose `expires_at < now` is semantically
    /// expired but the record itself survives (spec.md §3).
    pub fn is_verification_current(&self, now: Timestamp) -> bool {
        self.verified && self.expires_at.map(|e| now <= e).unwrap_or(false)
    }
}

// ── File Record ───────────────────────────────────────────────────────────────

/// Key: `post_no`, unique and monotonic across successful uploads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileRecord {
    pub post_no: PostNo,
    pub title: String,
    pub extra: Option<String>,
    /// Opaque `(channel, message)` coordinate addressing the blob in the
    /// Archive Store (X3).
    pub archive_coordinate: MessageCoordinate,
    /// Coordinate of the public announcement post the deep link is attached to.
    pub public_post_coordinate: Option<MessageCoordinate>,
    /// Password snapshot taken at upload time — an opaque convention, not
    /// cryptographic protection (spec.md §1 Non-goals).
    pub password: String,
    pub downloads: u64,
    pub created_at: Timestamp,
}

// ── Verification Token ───────────────────────────────────────────────────────

/// `C3`'s state machine states (spec.md §4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
    Minted,
    InFlight,
    Completed,
    Expired,
}

impl TokenStatus {
    /// `status ∈ {COMPLETED, EXPIRED}` is terminal — exactly one terminal
    /// transition is ever fired per token (spec.md §8 quantified invariant).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenStatus::Completed | TokenStatus::Expired)
    }
}

/// Key: `token_id`, unique, ≥128-bit entropy, opaque.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationToken {
    pub token_id: TokenId,
    pub user_id: UserId,
    pub status: TokenStatus,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    /// Set when entering `IN_FLIGHT`.
    pub advanced_at: Option<Timestamp>,
}

impl VerificationToken {
    /// Any read after `expires_at` is treated as EXPIRED regardless of the
    /// stored status (spec.md §4.3 invariant).
    pub fn effective_status(&self, now: Timestamp) -> TokenStatus {
        if !self.status.is_terminal() && now > self.expires_at {
            TokenStatus::Expired
        } else {
            self.status
        }
    }
}

// ── Channel Entry ─────────────────────────────────────────────────────────────

/// Key: `handle`, unique. CRUD by operator; the entitlement engine reads
/// only `active = true` entries ordered by `(order, insertion-time)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub handle: ChannelHandle,
    pub public_link: String,
    pub cta_label: String,
    pub display_order: i32,
    pub active: bool,
    pub inserted_at: Timestamp,
}

// ── Setting ───────────────────────────────────────────────────────────────────

/// Free-form key/value configuration row. Numerical values are stored as
/// their string representation and parsed at the read site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

// ── Operator Action Log ───────────────────────────────────────────────────────

/// Append-only audit trail (SPEC_FULL.md §3 supplemental entity). Never
/// mutated or deleted by the core; written by the engine (`BYPASS_SUSPECTED`,
/// `DELIVERY_INCONSISTENT`) and by the out-of-scope operator surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperatorLogEntry {
    pub log_id: u64,
    pub actor_user_id: Option<UserId>,
    pub action: String,
    pub target: Option<String>,
    pub detail: String,
    pub at: Timestamp,
}
