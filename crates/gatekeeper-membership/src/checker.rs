use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use gatekeeper_core::{
    CACHE_TTL_SECONDS, ChannelEntry, ChatGateway, GatekeeperError, Timestamp, UserId,
};
use tracing::warn;

/// Evaluates the "must-join" gate (spec.md §4.2) against a user's live
/// membership in every active channel.
///
/// Holds a short-TTL cache keyed by `(user_id, channel handle)` so a user
/// re-entering the flow seconds later doesn't refire a gateway call per
/// channel — mirrors the recovery query's read-through pattern in
/// `chronx-recovery::RecoveryQuery`, with a cache layer added because the
/// gateway call here is a network round trip, not a local DB read.
pub struct MembershipChecker<G: ChatGateway> {
    gateway: Arc<G>,
    cache: DashMap<(UserId, String), (bool, Timestamp)>,
}

impl<G: ChatGateway> MembershipChecker<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            cache: DashMap::new(),
        }
    }

    /// Returns the subset of `channels` the user is *not* currently a member
    /// of, in the same display order they were given in. An empty result
    /// means the gate passes.
    pub async fn unsubscribed(
        &self,
        user_id: UserId,
        channels: &[ChannelEntry],
        now: Timestamp,
    ) -> Vec<ChannelEntry> {
        let checks = channels.iter().map(|channel| self.is_member(user_id, channel, now));
        let results = join_all(checks).await;

        channels
            .iter()
            .zip(results)
            .filter_map(|(channel, is_member)| (!is_member).then(|| channel.clone()))
            .collect()
    }

    async fn is_member(&self, user_id: UserId, channel: &ChannelEntry, now: Timestamp) -> bool {
        let cache_key = (user_id, channel.handle.clone());
        if let Some(entry) = self.cache.get(&cache_key) {
            let (cached, cached_at) = *entry;
            if now - cached_at < CACHE_TTL_SECONDS {
                return cached;
            }
        }

        let is_member = match self.gateway.get_chat_member(&channel.handle, user_id).await {
            Ok(Some(status)) => status.is_member(),
            Ok(None) => {
                // Gateway-level UNKNOWN (spec.md §4.2): fail closed, treat as
                // NOT_MEMBER, but log it distinctly from a confirmed non-member.
                warn!(%user_id, channel = %channel.handle, "membership check returned UNKNOWN; treating as NOT_MEMBER");
                false
            }
            Err(GatekeeperError::Transient { collaborator, detail }) => {
                warn!(%user_id, channel = %channel.handle, collaborator, detail, "transient membership check failure; treating as NOT_MEMBER");
                false
            }
            Err(e) => {
                warn!(%user_id, channel = %channel.handle, error = %e, "membership check failed; treating as NOT_MEMBER");
                false
            }
        };

        self.cache.insert(cache_key, (is_member, now));
        is_member
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gatekeeper_core::{MessageCoordinate, RawMemberStatus};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeGateway {
        statuses: Mutex<HashMap<(String, i64), Option<RawMemberStatus>>>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl ChatGateway for FakeGateway {
        async fn send_with_keyboard(
            &self,
            _chat_id: i64,
            _text: &str,
            _keyboard: Option<gatekeeper_core::Keyboard>,
        ) -> gatekeeper_core::Result<MessageCoordinate> {
            unimplemented!()
        }

        async fn delete_message(&self, _coordinate: MessageCoordinate) -> gatekeeper_core::Result<()> {
            unimplemented!()
        }

        async fn get_chat_member(
            &self,
            channel_handle: &str,
            user_id: UserId,
        ) -> gatekeeper_core::Result<Option<RawMemberStatus>> {
            *self.calls.lock().unwrap() += 1;
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .get(&(channel_handle.to_string(), user_id.0))
                .cloned()
                .unwrap_or(None))
        }
    }

    fn channel(handle: &str, order: i32) -> ChannelEntry {
        ChannelEntry {
            handle: handle.into(),
            public_link: format!("https://t.me/{handle}"),
            cta_label: handle.into(),
            display_order: order,
            active: true,
            inserted_at: 0,
        }
    }

    #[tokio::test]
    async fn returns_unsubscribed_subset_in_order() {
        let mut statuses = HashMap::new();
        statuses.insert(("a".to_string(), 7), Some(RawMemberStatus::Member));
        statuses.insert(("b".to_string(), 7), Some(RawMemberStatus::Left));
        let gateway = Arc::new(FakeGateway { statuses: Mutex::new(statuses), calls: Mutex::new(0) });
        let checker = MembershipChecker::new(gateway);

        let channels = vec![channel("a", 1), channel("b", 2), channel("c", 3)];
        let unsubscribed = checker.unsubscribed(UserId(7), &channels, 1000).await;

        let handles: Vec<_> = unsubscribed.into_iter().map(|c| c.handle).collect();
        assert_eq!(handles, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn caches_within_ttl() {
        let mut statuses = HashMap::new();
        statuses.insert(("a".to_string(), 1), Some(RawMemberStatus::Member));
        let gateway = Arc::new(FakeGateway { statuses: Mutex::new(statuses), calls: Mutex::new(0) });
        let checker = MembershipChecker::new(gateway.clone());
        let channels = vec![channel("a", 1)];

        checker.unsubscribed(UserId(1), &channels, 1000).await;
        checker.unsubscribed(UserId(1), &channels, 1010).await;
        assert_eq!(*gateway.calls.lock().unwrap(), 1, "second call within TTL should hit the cache");

        checker.unsubscribed(UserId(1), &channels, 1000 + CACHE_TTL_SECONDS + 1).await;
        assert_eq!(*gateway.calls.lock().unwrap(), 2, "call past TTL should refresh");
    }
}
