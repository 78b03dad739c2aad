pub mod routes;
pub mod state;
pub mod templates;

pub use routes::router;
pub use state::AppState;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use gatekeeper_core::{
        ArchiveStore, ChatGateway, Keyboard, MessageCoordinate, RawMemberStatus, RuntimeConfig,
        UserId,
    };
    use gatekeeper_crypto::encode_token_id;
    use gatekeeper_engine::EntitlementEngine;
    use gatekeeper_store::StateDb;
    use gatekeeper_token::TokenManager;
    use tower::ServiceExt;

    use super::*;

    struct NoopGateway;

    #[async_trait]
    impl ChatGateway for NoopGateway {
        async fn send_with_keyboard(
            &self,
            _chat_id: i64,
            _text: &str,
            _keyboard: Option<Keyboard>,
        ) -> gatekeeper_core::Result<MessageCoordinate> {
            unimplemented!()
        }
        async fn delete_message(&self, _coordinate: MessageCoordinate) -> gatekeeper_core::Result<()> {
            Ok(())
        }
        async fn get_chat_member(
            &self,
            _channel_handle: &str,
            _user_id: UserId,
        ) -> gatekeeper_core::Result<Option<RawMemberStatus>> {
            Ok(Some(RawMemberStatus::Member))
        }
    }

    struct NoopArchive;

    #[async_trait]
    impl ArchiveStore for NoopArchive {
        async fn copy_to_chat(
            &self,
            _source: MessageCoordinate,
            dest_chat_id: i64,
            _caption: &str,
        ) -> gatekeeper_core::Result<MessageCoordinate> {
            Ok(MessageCoordinate { chat_id: dest_chat_id, message_id: 1 })
        }
    }

    fn test_state() -> (Arc<StateDb>, AppState<NoopGateway, NoopArchive>) {
        let db = Arc::new(StateDb::open_temporary().unwrap());
        let engine = Arc::new(EntitlementEngine::new(db.clone(), Arc::new(NoopGateway), Arc::new(NoopArchive), "testbot".into()));
        (db.clone(), AppState { engine, cfg: RuntimeConfig::default(), bot_username: "testbot".into() })
    }

    #[tokio::test]
    async fn health_check_ok() {
        let (_db, state) = test_state();
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn redirect_unknown_token_is_not_found() {
        let (_db, state) = test_state();
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/r?t=AAAAAAAAAAAAAAAAAAAAAA").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn redirect_then_verify_happy_path() {
        let (db, state) = test_state();
        let user = UserId(42);
        let token = TokenManager::new(&db).mint(user, 0, 600).unwrap();

        let app = router(state);
        let encoded = encode_token_id(&token.token_id);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/r?t={encoded}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
    }
}
