//! Wallet-has-username probe used only by the privileged unlock path. A
//! small `reqwest` client wrapper in the same style as the leaderboard
//! aggregator's page fetcher.

use ethers::types::Address;

pub struct WalletProbe {
    http: reqwest::Client,
    base: String,
}

impl WalletProbe {
    pub fn new(http: reqwest::Client, base: String) -> Self {
        Self { http, base }
    }

    /// `true` if the upstream site has a username registered for this
    /// wallet. Any transport or decode error is surfaced to the caller as
    /// `CHECK_WALLET_ERROR`.
    pub async fn has_username(&self, wallet_address: Address) -> eyre::Result<bool> {
        let url = format!(
            "{}/api/wallet/{:#x}/username",
            self.base.trim_end_matches('/'),
            wallet_address
        );
        let resp = self.http.get(&url).send().await?.error_for_status()?;
        let body: serde_json::Value = resp.json().await?;

        let has_username = body
            .get("hasUsername")
            .and_then(|v| v.as_bool())
            .unwrap_or_else(|| {
                body.get("username")
                    .and_then(|v| v.as_str())
                    .map(|s| !s.is_empty())
                    .unwrap_or(false)
            });
        Ok(has_username)
    }
}
