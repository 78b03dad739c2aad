use gatekeeper_core::{ChannelEntry, MessageCoordinate, Timestamp};

/// Result of running the full access pipeline for a single `(user, file)`
/// request (spec.md §4.5). The caller (a bot handler) renders each variant
/// as its own message — this type carries no text, only the facts.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    /// Delivered (first access or re-access). `auto_delete_at` is `None`
    /// when `auto_delete_seconds` is configured as 0 (disabled).
    Delivered {
        coordinate: MessageCoordinate,
        auto_delete_at: Option<Timestamp>,
        re_access: bool,
    },
    /// The must-join gate failed; these are the channels still unsubscribed.
    NeedsSubscription(Vec<ChannelEntry>),
    /// The user has no current verification.
    NeedsVerification,
    /// `files_consumed >= file_access_limit` and this is not a re-access.
    QuotaExceeded,
}
