//! End-to-end smoke test for the verification web flow.
//!
//! Seeds a token directly into the state database, starts a real
//! `verify-web` process against it, and drives `/r` then `/v` over HTTP —
//! mirroring the teacher's spawn-a-real-binary-and-poll-RPC style, adapted
//! to this system's HTTP surface instead of JSON-RPC.
//!
//! `verify-web` never completes a verification by itself (spec.md §4.4) —
//! that transition only ever fires from the bot's `verify-<token_id>`
//! callback, which needs a real Telegram client to drive. This test
//! exercises the HTTP half (`/r` advances, `/v` re-checks and renders the
//! bot deep link) and exercises the COMPLETED transition directly against
//! `TokenManager`, the same entry point the bot uses.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use gatekeeper_core::{TokenStatus, UserId};
use gatekeeper_crypto::encode_token_id;
use gatekeeper_store::StateDb;
use gatekeeper_token::TokenManager;

struct ServerGuard {
    child: Child,
    data_dir: PathBuf,
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

async fn wait_for_health(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.get(url).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

#[tokio::test]
async fn smoke_redirect_then_verify() {
    let data_dir = std::env::temp_dir().join(format!("gatekeeper_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&data_dir);
    std::fs::create_dir_all(&data_dir).unwrap();

    let user_id = UserId(424242);
    let token_id;
    {
        // Seed the token with a `created_at` far enough in the past that
        // the traversal dwell floor is already satisfied when /r is hit.
        let db = StateDb::open(&data_dir).expect("open state db");
        let seeded_now = unix_now() - 60;
        let token = TokenManager::new(&db).mint(user_id, seeded_now, 600).expect("mint token");
        token_id = token.token_id;
        assert_eq!(token.status, TokenStatus::Minted);
        db.flush().expect("flush before handing off to the server process");
    }

    let web_port = free_port();
    let web_addr = format!("127.0.0.1:{web_port}");
    let bin = env!("CARGO_BIN_EXE_verify-web");
    let child = Command::new(bin)
        .args([
            "--data-dir", data_dir.to_str().unwrap(),
            "--web-addr", &web_addr,
            "--bot-token", "000000:smoke-test-token",
            "--bot-username", "smoke_test_bot",
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn verify-web");

    let mut guard = ServerGuard { child, data_dir };

    let http = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build().unwrap();
    let health_url = format!("http://{web_addr}/health");
    assert!(wait_for_health(&http, &health_url, Duration::from_secs(10)).await, "verify-web did not become ready");

    // `/r` advances MINTED -> IN_FLIGHT and redirects to `/v`.
    let encoded = encode_token_id(&token_id);
    let redirect_url = format!("http://{web_addr}/r?t={encoded}");
    let resp = http.get(&redirect_url).send().await.expect("GET /r");
    assert_eq!(resp.status(), reqwest::StatusCode::FOUND);
    let location = resp.headers().get(reqwest::header::LOCATION).unwrap().to_str().unwrap().to_string();
    assert!(location.starts_with("/v?t="), "unexpected redirect target: {location}");

    // A reload of `/r` against the now-IN_FLIGHT token is idempotent, not
    // an error (spec.md §4.4) — it lands on the same countdown page.
    let resp = http.get(&redirect_url).send().await.expect("GET /r again");
    assert_eq!(resp.status(), reqwest::StatusCode::FOUND);

    let verify_url = format!("http://{web_addr}{location}");
    let resp = http.get(&verify_url).send().await.expect("GET /v");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("t.me/smoke_test_bot"), "countdown page should deep-link back to the bot");
    assert!(body.contains("start="), "countdown page should carry a verify-<token_id> start payload");

    // `/v` never mutates the token — a second load still renders the same
    // countdown page instead of erroring or completing verification.
    let resp = http.get(&verify_url).send().await.expect("GET /v again");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    // The COMPLETED transition is only reachable through `TokenManager`,
    // the same call the bot's `verify-<token_id>` handler makes — `/v` has
    // no path to it at all. Stop the server first: sled only allows one
    // process to hold the database open at a time.
    let _ = guard.child.kill();
    let _ = guard.child.wait();

    tokio::time::sleep(Duration::from_secs(4)).await;
    let db = StateDb::open(&guard.data_dir).expect("reopen state db");
    let completed = TokenManager::new(&db)
        .validate(token_id, user_id, unix_now(), 3)
        .expect("bot-side validate should succeed on an IN_FLIGHT, dwelled token");
    assert_eq!(completed.status, TokenStatus::Completed);

    // A second validate against the now-COMPLETED token must be rejected.
    assert!(TokenManager::new(&db).validate(token_id, user_id, unix_now(), 3).is_err());
}
