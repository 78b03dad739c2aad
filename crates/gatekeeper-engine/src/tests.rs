#![cfg(test)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gatekeeper_core::{
    ArchiveStore, ChannelEntry, ChatGateway, FileRecord, GatekeeperError, Keyboard,
    MessageCoordinate, PostNo, RawMemberStatus, RuntimeConfig, UserId,
};
use gatekeeper_store::StateDb;

use crate::engine::EntitlementEngine;
use crate::outcome::DeliveryOutcome;

struct FakeGateway {
    member: Mutex<bool>,
    deletes: AtomicU32,
}

#[async_trait]
impl ChatGateway for FakeGateway {
    async fn send_with_keyboard(
        &self,
        chat_id: i64,
        _text: &str,
        _keyboard: Option<Keyboard>,
    ) -> gatekeeper_core::Result<MessageCoordinate> {
        Ok(MessageCoordinate { chat_id, message_id: 0 })
    }

    async fn delete_message(&self, _coordinate: MessageCoordinate) -> gatekeeper_core::Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_chat_member(
        &self,
        _channel_handle: &str,
        _user_id: UserId,
    ) -> gatekeeper_core::Result<Option<RawMemberStatus>> {
        Ok(if *self.member.lock().unwrap() {
            Some(RawMemberStatus::Member)
        } else {
            Some(RawMemberStatus::Left)
        })
    }
}

struct FakeArchive {
    fail_times: Mutex<u32>,
    copies: AtomicU32,
}

#[async_trait]
impl ArchiveStore for FakeArchive {
    async fn copy_to_chat(
        &self,
        _source: MessageCoordinate,
        dest_chat_id: i64,
        _caption: &str,
    ) -> gatekeeper_core::Result<MessageCoordinate> {
        let mut remaining = self.fail_times.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(GatekeeperError::Transient {
                collaborator: "archive".into(),
                detail: "simulated".into(),
            });
        }
        let n = self.copies.fetch_add(1, Ordering::SeqCst);
        Ok(MessageCoordinate { chat_id: dest_chat_id, message_id: n as i32 })
    }
}

fn setup(member: bool, fail_times: u32) -> (Arc<StateDb>, EntitlementEngine<FakeGateway, FakeArchive>) {
    let db = Arc::new(StateDb::open_temporary().unwrap());
    let gateway = Arc::new(FakeGateway { member: Mutex::new(member), deletes: AtomicU32::new(0) });
    let archive = Arc::new(FakeArchive { fail_times: Mutex::new(fail_times), copies: AtomicU32::new(0) });
    let engine = EntitlementEngine::new(db.clone(), gateway, archive, "testbot".into());
    (db, engine)
}

fn seed_channel(db: &StateDb) {
    db.put_channel(&ChannelEntry {
        handle: "chan".into(),
        public_link: "https://t.me/chan".into(),
        cta_label: "Join".into(),
        display_order: 0,
        active: true,
        inserted_at: 0,
    })
    .unwrap();
}

fn seed_file(db: &StateDb) -> PostNo {
    let record = FileRecord {
        post_no: PostNo(0),
        title: "movie".into(),
        extra: None,
        archive_coordinate: MessageCoordinate { chat_id: 99, message_id: 1 },
        public_post_coordinate: None,
        password: "pw".into(),
        downloads: 0,
        created_at: 0,
    };
    db.insert_file(record).unwrap().post_no
}

#[tokio::test]
async fn blocks_on_missing_subscription() {
    let (db, engine) = setup(false, 0);
    seed_channel(&db);
    let post_no = seed_file(&db);

    let outcome = engine.deliver_file(UserId(1), post_no, 0, &RuntimeConfig::default()).await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::NeedsSubscription(chans) if chans.len() == 1));
}

#[tokio::test]
async fn blocks_on_missing_verification() {
    let (db, engine) = setup(true, 0);
    let post_no = seed_file(&db);

    let outcome = engine.deliver_file(UserId(1), post_no, 0, &RuntimeConfig::default()).await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::NeedsVerification));
}

#[tokio::test]
async fn delivers_after_verification_and_enforces_quota() {
    let (db, engine) = setup(true, 0);
    let post_no = seed_file(&db);
    let cfg = RuntimeConfig::default().with_file_access_limit(1);

    db.ensure_user(UserId(1), 0).unwrap();
    db.update_user(UserId(1), |existing| {
        let mut u = existing.unwrap();
        u.verified = true;
        u.verified_at = Some(0);
        u.expires_at = Some(10_000);
        Ok(u)
    })
    .unwrap();

    let first = engine.deliver_file(UserId(1), post_no, 1, &cfg).await.unwrap();
    assert!(matches!(first, DeliveryOutcome::Delivered { re_access: false, .. }));

    // Re-access to the same file never counts against the quota.
    let again = engine.deliver_file(UserId(1), post_no, 2, &cfg).await.unwrap();
    assert!(matches!(again, DeliveryOutcome::Delivered { re_access: true, .. }));

    let other_file = db
        .insert_file(FileRecord {
            post_no: PostNo(0),
            title: "other".into(),
            extra: None,
            archive_coordinate: MessageCoordinate { chat_id: 99, message_id: 2 },
            public_post_coordinate: None,
            password: "pw".into(),
            downloads: 0,
            created_at: 0,
        })
        .unwrap()
        .post_no;
    let blocked = engine.deliver_file(UserId(1), other_file, 3, &cfg).await.unwrap();
    assert!(matches!(blocked, DeliveryOutcome::QuotaExceeded));
}

#[tokio::test]
async fn retries_transient_delivery_failures() {
    let (db, engine) = setup(true, 2);
    let post_no = seed_file(&db);
    db.ensure_user(UserId(1), 0).unwrap();
    db.update_user(UserId(1), |existing| {
        let mut u = existing.unwrap();
        u.verified = true;
        u.verified_at = Some(0);
        u.expires_at = Some(10_000);
        Ok(u)
    })
    .unwrap();

    let outcome = engine.deliver_file(UserId(1), post_no, 1, &RuntimeConfig::default()).await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Delivered { .. }));
}
