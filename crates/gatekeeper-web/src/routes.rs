use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use gatekeeper_core::{ArchiveStore, ChatGateway, GatekeeperError, TokenInvalidReason};
use gatekeeper_crypto::{decode_token_id, encode_start_payload, encode_token_id};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::state::AppState;
use crate::templates;

pub fn router<G: ChatGateway + 'static, A: ArchiveStore + 'static>(state: AppState<G, A>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/r", get(redirect_handler::<G, A>))
        .route("/v", get(verify_handler::<G, A>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

#[derive(Deserialize)]
pub struct RedirectQuery {
    t: String,
}

/// `GET /r?t=<token>` — the single entry point that can advance a token
/// out of MINTED (DESIGN.md Open Question #2). On success the browser is
/// sent on to `/v`; the shortlink traversal the user just completed is
/// exactly what `advance` uses as its dwell floor start. A reload against an
/// already-IN_FLIGHT token is not an error — `advance` is idempotent in
/// that case, so the second load still lands on `/v`.
async fn redirect_handler<G: ChatGateway + 'static, A: ArchiveStore + 'static>(
    State(state): State<AppState<G, A>>,
    Query(query): Query<RedirectQuery>,
) -> Response {
    let token_id = match decode_token_id(&query.t) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };

    match state.engine.advance_token(token_id, now(), state.cfg.min_traversal_seconds) {
        Ok(token) => {
            let next = format!("/v?t={}", encode_token_id(&token.token_id));
            (StatusCode::FOUND, [(header::LOCATION, next)]).into_response()
        }
        Err(e) => {
            warn!(error = %e, "token advance rejected");
            error_response(e)
        }
    }
}

#[derive(Deserialize)]
pub struct VerifyQuery {
    t: String,
}

/// `GET /v?t=<token>` — countdown page. Re-validates that the token is
/// IN_FLIGHT and not expired, then renders a page that deep-links back into
/// the bot with `verify-<token_id>` (spec.md §4.4, §6).
///
/// This handler performs no user mutation beyond the `/r` advance CAS — the
/// COMPLETED transition only ever happens when the user's own Telegram
/// client calls the bot with that deep link, so the `user_id` driving it is
/// the bot's authenticated sender rather than anything carried in this URL.
async fn verify_handler<G: ChatGateway + 'static, A: ArchiveStore + 'static>(
    State(state): State<AppState<G, A>>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let token_id = match decode_token_id(&query.t) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };

    match state.engine.check_in_flight(token_id, now()) {
        Ok(token) => {
            let payload = encode_start_payload(&format!("verify-{}", token.token_id));
            let deep_link = format!("https://t.me/{}?start={}", state.bot_username, payload);
            axum::response::Html(templates::verified_page(&deep_link).into_string()).into_response()
        }
        Err(e) => {
            warn!(error = %e, "token re-check rejected");
            error_response(e)
        }
    }
}

fn error_response(e: GatekeeperError) -> Response {
    let (status, message) = match &e {
        GatekeeperError::NotFound(_) => (StatusCode::NOT_FOUND, "This link no longer exists."),
        GatekeeperError::Serialization(_) => (StatusCode::BAD_REQUEST, "This link is malformed."),
        GatekeeperError::TokenInvalid(reason) => match reason {
            TokenInvalidReason::NotFound => (StatusCode::NOT_FOUND, "This link no longer exists."),
            TokenInvalidReason::Expired | TokenInvalidReason::Reused => {
                (StatusCode::GONE, "This link has already been used or has expired.")
            }
            TokenInvalidReason::UserMismatch
            | TokenInvalidReason::BadState
            | TokenInvalidReason::TooFast
            | TokenInvalidReason::BypassSuspected => {
                (StatusCode::BAD_REQUEST, "This verification attempt could not be completed.")
            }
        },
        _ => (StatusCode::BAD_REQUEST, "This verification attempt could not be completed."),
    };

    (status, axum::response::Html(templates::error_page(message).into_string())).into_response()
}
