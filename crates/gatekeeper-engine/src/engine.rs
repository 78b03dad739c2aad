use std::sync::Arc;
use std::time::Duration;

use gatekeeper_core::{
    ArchiveStore, Button, ChatGateway, FileRecord, GatekeeperError, MessageCoordinate, PostNo,
    RuntimeConfig, Timestamp, TokenId, UserEntitlement, UserId, VerificationToken,
    TRANSIENT_RETRY_BACKOFFS_MS,
};
use gatekeeper_membership::MembershipChecker;
use gatekeeper_store::StateDb;
use gatekeeper_token::TokenManager;
use tracing::{error, info, warn};

use crate::outcome::DeliveryOutcome;

/// Orchestrates the verification and access pipelines over a shared
/// `StateDb`, the way `chronx_state::StateEngine` orchestrates transaction
/// application over the same database: validate, stage the risky external
/// step, then commit.
pub struct EntitlementEngine<G: ChatGateway + 'static, A: ArchiveStore + 'static> {
    db: Arc<StateDb>,
    gateway: Arc<G>,
    archive: Arc<A>,
    membership: MembershipChecker<G>,
    bot_username: String,
}

impl<G: ChatGateway + 'static, A: ArchiveStore + 'static> EntitlementEngine<G, A> {
    pub fn new(db: Arc<StateDb>, gateway: Arc<G>, archive: Arc<A>, bot_username: String) -> Self {
        let membership = MembershipChecker::new(gateway.clone());
        Self { db, gateway, archive, membership, bot_username }
    }

    /// `GET /r`'s sole mutation: MINTED → IN_FLIGHT (idempotent if the
    /// token is already IN_FLIGHT).
    pub fn advance_token(
        &self,
        token_id: TokenId,
        now: Timestamp,
        min_traversal_seconds: i64,
    ) -> Result<VerificationToken, GatekeeperError> {
        TokenManager::new(&self.db).advance(token_id, now, min_traversal_seconds)
    }

    /// `GET /v`'s read-only re-check (spec.md §4.4): confirms IN_FLIGHT and
    /// not expired without mutating anything. This is the *only* thing the
    /// web tier is allowed to do with a token — it has no way to tell the
    /// difference between the real user's browser and an attacker replaying
    /// the URL, so it must never be the thing that completes verification.
    pub fn check_in_flight(&self, token_id: TokenId, now: Timestamp) -> Result<VerificationToken, GatekeeperError> {
        TokenManager::new(&self.db).peek_in_flight(token_id, now)
    }

    /// IN_FLIGHT → COMPLETED, then grants the user a fresh verification
    /// window (spec.md §4.5.2). Reachable only from the chat gateway's
    /// `verify-<token_id>` callback (spec.md §4.4, §6): `user_id` there is
    /// the bot's own authenticated sender, never a caller-supplied value,
    /// which is what makes this transition unforgeable over plain HTTP.
    pub fn complete_verification(
        &self,
        token_id: TokenId,
        user_id: UserId,
        now: Timestamp,
        cfg: &RuntimeConfig,
    ) -> Result<UserEntitlement, GatekeeperError> {
        TokenManager::new(&self.db).validate(token_id, user_id, now, cfg.min_dwell_seconds)?;
        self.db.ensure_user(user_id, now)?;

        let period = cfg.verification_period_seconds();
        self.db.update_user(user_id, move |existing| {
            let mut u = existing.ok_or_else(|| GatekeeperError::NotFound(format!("user {user_id}")))?;
            u.verified = true;
            u.verified_at = Some(now);
            u.expires_at = Some(now + period);
            // A fresh verification window starts a fresh quota (spec.md
            // §4.5.2) — otherwise a user re-verifying mid-window stays
            // stuck at whatever files_consumed/files_seen they left off at.
            u.files_consumed = 0;
            u.files_seen.clear();
            u.last_seen = now;
            Ok(u)
        })
    }

    /// The full access pipeline (spec.md §4.5):
    /// resolve file → ensure user row → membership gate → verification gate
    /// → quota gate → deliver → enroll scheduled deletion.
    pub async fn deliver_file(
        &self,
        user_id: UserId,
        post_no: PostNo,
        now: Timestamp,
        cfg: &RuntimeConfig,
    ) -> Result<DeliveryOutcome, GatekeeperError> {
        let file = self
            .db
            .get_file(post_no)?
            .ok_or_else(|| GatekeeperError::NotFound(format!("file {}", post_no.0)))?;

        let user = self.db.ensure_user(user_id, now)?;

        let channels = self.db.list_active_channels()?;
        let unsubscribed = self.membership.unsubscribed(user_id, &channels, now).await;
        if !unsubscribed.is_empty() {
            return Ok(DeliveryOutcome::NeedsSubscription(unsubscribed));
        }

        if !user.is_verification_current(now) {
            return Ok(DeliveryOutcome::NeedsVerification);
        }

        // Re-access (spec.md §4.5.1): a file already recorded in
        // `files_seen` may be re-delivered without charging the quota again.
        let re_access = user.files_seen.contains(&post_no);
        if !re_access && user.files_consumed >= cfg.file_access_limit {
            return Ok(DeliveryOutcome::QuotaExceeded);
        }

        // Pure analytics counter — counted on every delivery, re-access or not.
        let _ = self.db.increment_downloads(post_no);

        let coordinate = self.deliver_with_retry(&file, user_id).await?;

        if re_access {
            let _ = self.db.update_user(user_id, move |existing| {
                let mut u = existing.ok_or_else(|| GatekeeperError::NotFound(format!("user {user_id}")))?;
                u.last_seen = now;
                Ok(u)
            });
        } else if let Err(e) = self.db.update_user(user_id, move |existing| {
            let mut u = existing.ok_or_else(|| GatekeeperError::NotFound(format!("user {user_id}")))?;
            u.files_consumed += 1;
            u.files_seen.insert(post_no);
            u.last_seen = now;
            Ok(u)
        }) {
            // The archive copy already landed in the user's chat at this
            // point — the failure below is bookkeeping falling out of sync
            // with what was actually delivered, not a delivery failure.
            error!(
                %user_id, post_no = post_no.0, error = %e,
                "DELIVERY_INCONSISTENT: file delivered but quota/seen-state commit failed"
            );
        }

        let auto_delete_at = if cfg.auto_delete_seconds > 0 {
            let warning_text = format!(
                "This file will be automatically deleted in {} seconds.",
                cfg.auto_delete_seconds
            );
            let warning_coordinate = match self.gateway.send_with_keyboard(user_id.0, &warning_text, None).await {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(error = %e, %user_id, post_no = post_no.0, "failed to send auto-delete warning message");
                    None
                }
            };
            self.schedule_deletion(coordinate, warning_coordinate, cfg.auto_delete_seconds, user_id.0, post_no);
            Some(now + cfg.auto_delete_seconds)
        } else {
            None
        };

        Ok(DeliveryOutcome::Delivered { coordinate, auto_delete_at, re_access })
    }

    /// Copy the archive item with a bounded retry on `Transient` failures
    /// (spec.md §7): the first attempt plus one retry at each backoff in
    /// `TRANSIENT_RETRY_BACKOFFS_MS`.
    async fn deliver_with_retry(
        &self,
        file: &FileRecord,
        dest_chat_id_user: UserId,
    ) -> Result<MessageCoordinate, GatekeeperError> {
        let caption = file.extra.clone().map(|extra| format!("{}\n{extra}", file.title)).unwrap_or_else(|| file.title.clone());

        let mut attempt = 0usize;
        loop {
            match self
                .archive
                .copy_to_chat(file.archive_coordinate, dest_chat_id_user.0, &caption)
                .await
            {
                Ok(coordinate) => return Ok(coordinate),
                Err(GatekeeperError::Transient { collaborator, detail }) if attempt < TRANSIENT_RETRY_BACKOFFS_MS.len() => {
                    let backoff = TRANSIENT_RETRY_BACKOFFS_MS[attempt];
                    warn!(post_no = file.post_no.0, collaborator, detail, attempt, backoff_ms = backoff, "delivery attempt failed, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Deletes the delivered file and its companion warning message, then
    /// sends a re-access message bearing a `get-<post_no>` deep link back
    /// into this same file (spec.md §4.5 step 7, §1's re-fetch affordance).
    fn schedule_deletion(
        &self,
        file_coordinate: MessageCoordinate,
        warning_coordinate: Option<MessageCoordinate>,
        delay_seconds: i64,
        chat_id: i64,
        post_no: PostNo,
    ) {
        let gateway = self.gateway.clone();
        let bot_username = self.bot_username.clone();
        let delay = Duration::from_secs(delay_seconds.max(0) as u64);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if let Err(e) = gateway.delete_message(file_coordinate).await {
                warn!(error = %e, "scheduled auto-delete failed");
            } else {
                info!(chat_id = file_coordinate.chat_id, message_id = file_coordinate.message_id, "auto-deleted delivered file");
            }

            if let Some(warning) = warning_coordinate {
                if let Err(e) = gateway.delete_message(warning).await {
                    warn!(error = %e, "scheduled warning-message delete failed");
                }
            }

            let payload = gatekeeper_crypto::encode_start_payload(&format!("get-{}", post_no.0));
            let re_access_url = format!("https://t.me/{bot_username}?start={payload}");
            let keyboard = vec![vec![Button::Url { label: "Get it again".into(), url: re_access_url }]];
            if let Err(e) = gateway
                .send_with_keyboard(chat_id, "This file was removed. Tap below to get it again.", Some(keyboard))
                .await
            {
                warn!(error = %e, "failed to send re-access message after auto-delete");
            }
        });
    }
}
