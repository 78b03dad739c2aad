use async_trait::async_trait;
use gatekeeper_core::{GatekeeperError, Result, ShortlinkMinter};
use serde::Deserialize;

/// `ShortlinkMinter` backed by a third-party shortener's HTTP API.
///
/// Mirrors `chronx-wallet::WalletRpcClient`'s shape — one `reqwest::Client`,
/// one base URL, a single thin call method wrapped by the public API.
pub struct HttpShortlinkMinter {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

#[derive(Deserialize)]
struct MintResponse {
    shortened_url: String,
}

impl HttpShortlinkMinter {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ShortlinkMinter for HttpShortlinkMinter {
    async fn mint(&self, destination_url: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/api", self.api_base))
            .query(&[("api", self.api_key.as_str()), ("url", destination_url)])
            .send()
            .await
            .map_err(|e| GatekeeperError::Transient {
                collaborator: "shortlink".into(),
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(GatekeeperError::Transient {
                collaborator: "shortlink".into(),
                detail: format!("unexpected status {}", response.status()),
            });
        }

        let parsed: MintResponse = response
            .json()
            .await
            .map_err(|e| GatekeeperError::Serialization(format!("parsing shortlink response: {e}")))?;
        Ok(parsed.shortened_url)
    }
}
