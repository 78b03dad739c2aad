use thiserror::Error;

/// The canonical error taxonomy for the entitlement pipeline.
///
/// Every call site either handles a specific variant or propagates the
/// whole enum — there is no bare `Result<T, String>` or ad-hoc panic inside
/// a library crate. Binaries (user-bot, verify-web, admin-bot) are the only
/// places that convert this into `anyhow::Error` at the top level.
#[derive(Debug, Error)]
pub enum GatekeeperError {
    // ── Lookup ────────────────────────────────────────────────────────────────
    #[error("not found: {0}")]
    NotFound(String),

    // ── Store uniqueness ─────────────────────────────────────────────────────
    #[error("conflict: duplicate key {0}")]
    Conflict(String),

    // ── Collaborator I/O (X1/X2/X3) ──────────────────────────────────────────
    #[error("transient error calling {collaborator}: {detail}")]
    Transient { collaborator: String, detail: String },

    // ── Token validation (C3) ────────────────────────────────────────────────
    #[error("token invalid: {0}")]
    TokenInvalid(#[from] TokenInvalidReason),

    // ── Operator-only surfaces ───────────────────────────────────────────────
    #[error("forbidden: {0}")]
    Forbidden(String),

    // ── Chat gateway per-recipient failure ───────────────────────────────────
    #[error("gateway blocked: user {user_id} has blocked the bot")]
    GatewayBlocked { user_id: i64 },

    // ── Storage / serialization ───────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // ── Unrecoverable ─────────────────────────────────────────────────────────
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Classification of why a `validate(token_id, user_id)` call was rejected.
///
/// Mirrors spec.md §7's `TokenInvalid` row: every rejection reason the
/// Token Manager can produce is named here so the web flow and the bot can
/// render the exact right screen instead of a generic failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenInvalidReason {
    #[error("token not found")]
    NotFound,
    #[error("token belongs to a different user")]
    UserMismatch,
    #[error("token has expired")]
    Expired,
    #[error("token has already been used")]
    Reused,
    #[error("token is not in the expected state")]
    BadState,
    #[error("validation attempted too soon after token creation")]
    TooFast,
    #[error("bypass suspected: validate called against a MINTED token")]
    BypassSuspected,
}

impl TokenInvalidReason {
    /// `BadState` and `TooFast` (and `BypassSuspected`) render the
    /// bypass-detected screen per spec.md §7.
    pub fn is_bypass_suspected(&self) -> bool {
        matches!(
            self,
            TokenInvalidReason::BadState
                | TokenInvalidReason::TooFast
                | TokenInvalidReason::BypassSuspected
        )
    }
}

pub type Result<T> = std::result::Result<T, GatekeeperError>;
