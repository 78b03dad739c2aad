pub mod db;

pub use db::StateDb;

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_core::{ChannelEntry, FileRecord, MessageCoordinate, PostNo, TokenId, TokenStatus, UserId, VerificationToken};

    fn db() -> StateDb {
        StateDb::open_temporary().expect("open temporary sled db")
    }

    #[test]
    fn ensure_user_is_idempotent() {
        let store = db();
        let a = store.ensure_user(UserId(1), 100).unwrap();
        let b = store.ensure_user(UserId(1), 200).unwrap();
        assert_eq!(a.last_seen, b.last_seen, "second call must not overwrite the first");
    }

    #[test]
    fn insert_user_rejects_duplicate() {
        let store = db();
        let u = gatekeeper_core::UserEntitlement::new(UserId(5), 0);
        store.insert_user(&u).unwrap();
        assert!(matches!(store.insert_user(&u), Err(gatekeeper_core::GatekeeperError::Conflict(_))));
    }

    #[test]
    fn increment_downloads_is_atomic_per_call() {
        let store = db();
        let record = FileRecord {
            post_no: PostNo(0),
            title: "x".into(),
            extra: None,
            archive_coordinate: MessageCoordinate { chat_id: 1, message_id: 1 },
            public_post_coordinate: None,
            password: "p".into(),
            downloads: 0,
            created_at: 0,
        };
        let inserted = store.insert_file(record).unwrap();
        for _ in 0..10 {
            store.increment_downloads(inserted.post_no).unwrap();
        }
        let current = store.get_file(inserted.post_no).unwrap().unwrap();
        assert_eq!(current.downloads, 10);
    }

    #[test]
    fn active_channels_are_ordered() {
        let store = db();
        for (handle, order) in [("b", 2), ("a", 1), ("c", 1)] {
            store
                .put_channel(&ChannelEntry {
                    handle: handle.into(),
                    public_link: format!("https://t.me/{handle}"),
                    cta_label: handle.into(),
                    display_order: order,
                    active: true,
                    inserted_at: order as i64,
                })
                .unwrap();
        }
        let ordered: Vec<_> = store.list_active_channels().unwrap().into_iter().map(|c| c.handle).collect();
        assert_eq!(ordered, vec!["a", "c", "b"]);
    }

    #[test]
    fn update_token_enforces_not_found() {
        let store = db();
        let missing = TokenId::from_bytes([1u8; 16]);
        assert!(matches!(
            store.update_token(missing, |_| unreachable!()),
            Err(gatekeeper_core::GatekeeperError::NotFound(_))
        ));
    }

    #[test]
    fn token_cas_transition() {
        let store = db();
        let token_id = TokenId::from_bytes([2u8; 16]);
        store
            .insert_token(&VerificationToken {
                token_id,
                user_id: UserId(1),
                status: TokenStatus::Minted,
                created_at: 0,
                expires_at: 600,
                advanced_at: None,
            })
            .unwrap();

        let advanced = store
            .update_token(token_id, |existing| {
                let mut t = existing.unwrap();
                assert_eq!(t.status, TokenStatus::Minted);
                t.status = TokenStatus::InFlight;
                t.advanced_at = Some(10);
                Ok(t)
            })
            .unwrap();
        assert_eq!(advanced.status, TokenStatus::InFlight);
    }
}
