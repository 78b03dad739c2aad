use std::sync::Arc;

use gatekeeper_core::{ArchiveStore, ChatGateway, RuntimeConfig};
use gatekeeper_engine::EntitlementEngine;

/// Shared application state threaded through every axum handler, the way
/// `converge-server`'s `AppState` wraps its store behind an `Arc` and is
/// cloned into the router with `.with_state`.
pub struct AppState<G: ChatGateway + 'static, A: ArchiveStore + 'static> {
    pub engine: Arc<EntitlementEngine<G, A>>,
    pub cfg: RuntimeConfig,
    /// `@handle` of the bot the success page deep-links back to.
    pub bot_username: String,
}

// Written by hand rather than `#[derive(Clone)]`: the derive macro would add
// a `G: Clone, A: Clone` bound neither parameter needs — every field here is
// already cheap to clone through its own `Arc`/`String`/`RuntimeConfig`.
impl<G: ChatGateway + 'static, A: ArchiveStore + 'static> Clone for AppState<G, A> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            cfg: self.cfg.clone(),
            bot_username: self.bot_username.clone(),
        }
    }
}
