use gatekeeper_core::{
    GatekeeperError, Timestamp, TokenId, TokenInvalidReason, TokenStatus, UserId,
    VerificationToken,
};
use gatekeeper_crypto::mint_token_id;
use gatekeeper_store::StateDb;
use tracing::warn;

/// Governs the verification token state machine (spec.md §4.3):
/// `MINTED → IN_FLIGHT → {COMPLETED, EXPIRED}`.
///
/// Every transition goes through `StateDb::update_token`'s CAS retry loop —
/// there is no read-then-write anywhere in this file — mirroring the
/// recovery crate's convention of a thin query/mutation struct wrapping a
/// `&StateDb` reference (`chronx-recovery::VerifierRegistry`).
pub struct TokenManager<'a> {
    db: &'a StateDb,
}

impl<'a> TokenManager<'a> {
    pub fn new(db: &'a StateDb) -> Self {
        Self { db }
    }

    /// Mint a fresh token for `user_id`. Enforces the single-outstanding-
    /// token invariant: any previous non-terminal token for this user is
    /// force-expired first, so a user can never hold two live tokens.
    pub fn mint(
        &self,
        user_id: UserId,
        now: Timestamp,
        ttl_seconds: i64,
    ) -> Result<VerificationToken, GatekeeperError> {
        if let Some(previous_id) = self.db.current_token_id(user_id)? {
            let _ = self.db.update_token(previous_id, |existing| {
                let mut t = existing.ok_or_else(|| GatekeeperError::NotFound(format!("token {previous_id}")))?;
                if !t.status.is_terminal() {
                    t.status = TokenStatus::Expired;
                }
                Ok(t)
            });
        }

        let token = VerificationToken {
            token_id: mint_token_id(),
            user_id,
            status: TokenStatus::Minted,
            created_at: now,
            expires_at: now + ttl_seconds,
            advanced_at: None,
        };
        self.db.insert_token(&token)?;
        self.db.set_current_token_id(user_id, token.token_id)?;
        Ok(token)
    }

    /// The sole entry point reachable from `GET /r` (DESIGN.md Open
    /// Question #2): MINTED → IN_FLIGHT, enforcing the traversal dwell
    /// floor. A token already IN_FLIGHT is left untouched and returned as-is
    /// — the landing link is idempotent under a reload or a double-tap
    /// (spec.md §4.4), it just isn't a state transition the second time.
    /// Any other observed status is rejected without mutating state.
    pub fn advance(
        &self,
        token_id: TokenId,
        now: Timestamp,
        min_traversal_seconds: i64,
    ) -> Result<VerificationToken, GatekeeperError> {
        self.db.update_token(token_id, move |existing| {
            let token = existing.ok_or(TokenInvalidReason::NotFound)?;
            match token.effective_status(now) {
                TokenStatus::Expired => Err(TokenInvalidReason::Expired.into()),
                TokenStatus::Completed => Err(TokenInvalidReason::Reused.into()),
                TokenStatus::InFlight => Ok(token),
                TokenStatus::Minted => {
                    if now - token.created_at < min_traversal_seconds {
                        return Err(TokenInvalidReason::TooFast.into());
                    }
                    let mut next = token;
                    next.status = TokenStatus::InFlight;
                    next.advanced_at = Some(now);
                    Ok(next)
                }
            }
        })
    }

    /// Read-only re-check used by `GET /v` (spec.md §4.4): confirms the
    /// token is IN_FLIGHT and not expired without mutating anything. The
    /// COMPLETED transition only ever happens through `validate`, which is
    /// reachable solely from the chat gateway's `verify-<token_id>`
    /// callback — never from this (unauthenticated, URL-only) HTTP path.
    pub fn peek_in_flight(&self, token_id: TokenId, now: Timestamp) -> Result<VerificationToken, GatekeeperError> {
        let token = self
            .db
            .get_token(token_id)?
            .ok_or(GatekeeperError::from(TokenInvalidReason::NotFound))?;
        match token.effective_status(now) {
            TokenStatus::InFlight => Ok(token),
            TokenStatus::Expired => Err(TokenInvalidReason::Expired.into()),
            TokenStatus::Completed => Err(TokenInvalidReason::Reused.into()),
            TokenStatus::Minted => Err(TokenInvalidReason::BadState.into()),
        }
    }

    /// Re-validates an in-flight token belonging to `user_id` and, if all
    /// checks pass, retires it to COMPLETED (spec.md §4.3's 5 ACCEPT
    /// conditions). A validate call against a still-MINTED token means the
    /// shortlink traversal was skipped entirely — classified as
    /// `BYPASS_SUSPECTED` rather than the milder `BadState`.
    pub fn validate(
        &self,
        token_id: TokenId,
        user_id: UserId,
        now: Timestamp,
        min_dwell_seconds: i64,
    ) -> Result<VerificationToken, GatekeeperError> {
        self.db.update_token(token_id, move |existing| {
            let token = existing.ok_or(TokenInvalidReason::NotFound)?;

            if token.user_id != user_id {
                return Err(TokenInvalidReason::UserMismatch.into());
            }

            match token.effective_status(now) {
                TokenStatus::Expired => Err(TokenInvalidReason::Expired.into()),
                TokenStatus::Completed => Err(TokenInvalidReason::Reused.into()),
                TokenStatus::Minted => {
                    warn!(%token_id, %user_id, "validate called against a MINTED token");
                    Err(TokenInvalidReason::BypassSuspected.into())
                }
                TokenStatus::InFlight => {
                    let advanced_at = token.advanced_at.unwrap_or(token.created_at);
                    if now - advanced_at < min_dwell_seconds {
                        return Err(TokenInvalidReason::TooFast.into());
                    }
                    let mut next = token;
                    next.status = TokenStatus::Completed;
                    Ok(next)
                }
            }
        })
    }

    /// Idempotent terminal transition used by the expiry sweep; a token
    /// already in a terminal state is left untouched.
    pub fn retire(&self, token_id: TokenId, now: Timestamp) -> Result<VerificationToken, GatekeeperError> {
        self.db.update_token(token_id, move |existing| {
            let mut token = existing.ok_or(TokenInvalidReason::NotFound)?;
            if !token.status.is_terminal() {
                token.status = token.effective_status(now);
                if !token.status.is_terminal() {
                    token.status = TokenStatus::Expired;
                }
            }
            Ok(token)
        })
    }
}
