//! Trait boundaries for the three external collaborators (spec.md §6, X1–X3).
//!
//! Defined here rather than in `gatekeeper-gateway` so that every crate that
//! needs to *call* a collaborator (membership, engine, web) depends only on
//! `gatekeeper-core` for the interface; `gatekeeper-gateway` supplies the
//! concrete `teloxide`/`reqwest` implementations and is the only crate that
//! needs to link those libraries. Mirrors the teacher's pattern of keeping
//! shared contracts in the `*-core` crate (`chronx-core::error::ChronxError`
//! used everywhere, defined once).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MessageCoordinate, UserId};

/// Raw membership status as returned by the chat gateway's membership query
/// (spec.md §6). `creator`/`administrator`/`member`/`restricted` map to
/// `MEMBER`; `left`/`kicked` map to `NOT_MEMBER`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawMemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl RawMemberStatus {
    pub fn is_member(&self) -> bool {
        matches!(
            self,
            RawMemberStatus::Creator
                | RawMemberStatus::Administrator
                | RawMemberStatus::Member
                | RawMemberStatus::Restricted
        )
    }
}

/// An inline keyboard button: visible label + destination URL (CTA buttons
/// are always URL buttons in this system — subscribe links, verify links,
/// re-access links — never `callback_data`, except the bot's own "close").
#[derive(Clone, Debug)]
pub enum Button {
    Url { label: String, url: String },
    Callback { label: String, data: String },
}

/// A keyboard is rows of buttons, rendered top-to-bottom in the given order.
pub type Keyboard = Vec<Vec<Button>>;

/// The chat gateway (X1): send/edit/delete messages, query membership.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Send a text message with an optional inline keyboard. Returns the
    /// coordinate of the sent message (needed so it can later be deleted).
    async fn send_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageCoordinate>;

    /// Delete a previously sent message. Failures are logged, not surfaced
    /// as fatal — a deletion failure never affects entitlement state
    /// (spec.md §4.5.3).
    async fn delete_message(&self, coordinate: MessageCoordinate) -> Result<()>;

    /// Query a user's membership status in a channel. `Ok(None)` signals the
    /// gateway-level `UNKNOWN` outcome (spec.md §4.2) — treated as
    /// `NOT_MEMBER` by the caller, but distinguished here so it can be logged.
    async fn get_chat_member(
        &self,
        channel_handle: &str,
        user_id: UserId,
    ) -> Result<Option<RawMemberStatus>>;
}

/// The Archive Store (X3): copy a stored archive item into a user's chat.
///
/// Kept as a distinct trait from `ChatGateway` even though the Telegram
/// implementation happens to share a client, because spec.md §6 describes it
/// as an independent collaborator with a single narrow operation — keeping
/// it separate lets the engine depend on exactly that one operation and lets
/// tests mock archive delivery without mocking the whole chat gateway.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Copy the archive at `source` into `dest_chat_id`, with `caption`.
    /// Returns the coordinate of the newly delivered message.
    async fn copy_to_chat(
        &self,
        source: MessageCoordinate,
        dest_chat_id: i64,
        caption: &str,
    ) -> Result<MessageCoordinate>;
}

/// The Shortlink Minter (X2): wrap a destination URL in a third-party
/// interstitial. A black box whose only security contribution is forcing a
/// browser traversal the server-side dwell floor can verify happened.
#[async_trait]
pub trait ShortlinkMinter: Send + Sync {
    async fn mint(&self, destination_url: &str) -> Result<String>;
}
