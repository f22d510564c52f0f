//! Provider/signer bootstrap: connects to a single RPC endpoint, loads the
//! signing wallet, and wires up the contract binding. This service issues
//! periodic JSON-RPC calls from the batch tick rather than subscribing to a
//! live event stream, so a plain `Http` transport is the right fit.

use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Eip1559TransactionRequest, TransactionRequest, H256, U256};
use std::sync::Arc;
use tracing::{info, warn};

/// Fallback gas limit when estimation fails.
pub const FALLBACK_GAS_LIMIT: u64 = 120_000;

use crate::chain::contract::ScoreContract;
use crate::config::Config;

pub type ChainProvider = Provider<Http>;
pub type SignedClient = SignerMiddleware<Arc<ChainProvider>, LocalWallet>;

/// Chain id, latest block, gas fee quote - bundled for the health endpoint
/// and the dispatcher's per-tick fee lookup.
#[derive(Debug, Clone, Copy)]
pub struct FeeData {
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub legacy_gas_price: Option<U256>,
}

pub struct ChainContext {
    pub provider: Arc<ChainProvider>,
    pub client: Arc<SignedClient>,
    pub contract: ScoreContract<SignedClient>,
    pub signer_address: Address,
    pub contract_address: Address,
    pub chain_id: u64,
}

impl ChainContext {
    pub async fn connect(config: &Config) -> eyre::Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| eyre::eyre!("invalid RPC_URL: {e}"))?;
        let chain_id = provider.get_chainid().await?.as_u64();

        let wallet: LocalWallet = config
            .private_key
            .parse::<LocalWallet>()
            .map_err(|e| eyre::eyre!("invalid PRIVATE_KEY: {e}"))?
            .with_chain_id(chain_id);
        let signer_address = wallet.address();

        let provider = Arc::new(provider);
        let client = Arc::new(SignerMiddleware::new(provider.clone(), wallet));
        let contract = ScoreContract::new(config.contract_address, client.clone());

        info!("Connected to RPC, chain id {chain_id}");
        info!("Signer address: {signer_address:?}");

        // GAME_ROLE / hasRole is read at boot and logged; lacking the role
        // is a warning, not a hard boot failure - the signer might be
        // granted the role out-of-band after deploy.
        match contract.game_role().call().await {
            Ok(role) => match contract.has_role(role, signer_address).call().await {
                Ok(true) => info!("Signer holds GAME_ROLE"),
                Ok(false) => warn!("Signer does NOT hold GAME_ROLE - updatePlayerData calls will likely revert"),
                Err(e) => warn!("Could not check GAME_ROLE membership: {e:?}"),
            },
            Err(e) => warn!("Could not read GAME_ROLE constant: {e:?}"),
        }

        Ok(Self {
            provider,
            client,
            contract,
            signer_address,
            contract_address: config.contract_address,
            chain_id,
        })
    }

    /// Base nonce for the next batch: the signer's tx count at the
    /// `pending` block tag.
    pub async fn base_nonce(&self) -> Result<U256, ProviderError> {
        self.provider
            .get_transaction_count(self.signer_address, Some(BlockNumber::Pending.into()))
            .await
    }

    /// EIP-1559 fee quote, falling back to legacy gas price if the node
    /// doesn't support fee history.
    pub async fn fee_data(&self) -> FeeData {
        match self.provider.estimate_eip1559_fees(None).await {
            Ok((max_fee, max_priority_fee)) => FeeData {
                max_fee_per_gas: Some(max_fee),
                max_priority_fee_per_gas: Some(max_priority_fee),
                legacy_gas_price: None,
            },
            Err(e) => {
                warn!("EIP-1559 fee estimation unavailable, falling back to legacy gas price: {e:?}");
                let legacy = self.provider.get_gas_price().await.ok();
                FeeData {
                    max_fee_per_gas: None,
                    max_priority_fee_per_gas: None,
                    legacy_gas_price: legacy,
                }
            }
        }
    }

    pub async fn latest_block_number(&self) -> Result<u64, ProviderError> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    /// Build the `updatePlayerData(wallet, score, 1)` call; `transactionAmount`
    /// is always passed as `1`.
    fn build_tx(
        &self,
        wallet: Address,
        score: u64,
        nonce: u64,
        gas_limit: U256,
        fee: &FeeData,
    ) -> eyre::Result<TypedTransaction> {
        let calldata = self
            .contract
            .update_player_data(wallet, U256::from(score), U256::from(1u64))
            .calldata()
            .ok_or_else(|| eyre::eyre!("failed to encode updatePlayerData calldata"))?;

        let tx = if let Some(max_fee) = fee.max_fee_per_gas {
            TypedTransaction::Eip1559(Eip1559TransactionRequest {
                from: Some(self.signer_address),
                to: Some(self.contract_address.into()),
                data: Some(calldata),
                gas: Some(gas_limit),
                max_fee_per_gas: Some(max_fee),
                max_priority_fee_per_gas: fee.max_priority_fee_per_gas,
                nonce: Some(nonce.into()),
                chain_id: Some(self.chain_id.into()),
                ..Default::default()
            })
        } else {
            TypedTransaction::Legacy(TransactionRequest {
                from: Some(self.signer_address),
                to: Some(self.contract_address.into()),
                data: Some(calldata),
                gas: Some(gas_limit),
                gas_price: fee.legacy_gas_price,
                nonce: Some(nonce.into()),
                chain_id: Some(self.chain_id.into()),
                ..Default::default()
            })
        };

        Ok(tx)
    }

    /// Estimate gas for the call, falling back to `FALLBACK_GAS_LIMIT` on
    /// error. Returns `estimate * 1.2 + 5000`.
    pub async fn estimate_gas_limit(&self, wallet: Address, score: u64, fee: &FeeData) -> U256 {
        let probe = match self.build_tx(wallet, score, 0, U256::from(FALLBACK_GAS_LIMIT), fee) {
            Ok(tx) => tx,
            Err(_) => return U256::from(FALLBACK_GAS_LIMIT),
        };
        let estimate = self
            .client
            .estimate_gas(&probe, None)
            .await
            .unwrap_or_else(|_| U256::from(FALLBACK_GAS_LIMIT));

        estimate * U256::from(120u64) / U256::from(100u64) + U256::from(5_000u64)
    }

    /// Submit the transaction and return its hash as soon as it's
    /// acknowledged by the node - does NOT wait for a receipt.
    pub async fn send_update(
        &self,
        wallet: Address,
        score: u64,
        nonce: u64,
        gas_limit: U256,
        fee: &FeeData,
    ) -> eyre::Result<H256> {
        let tx = self.build_tx(wallet, score, nonce, gas_limit, fee)?;
        let pending = self.client.send_transaction(tx, None).await?;
        Ok(*pending)
    }

    /// Poll for a mined receipt with the configured confirmation depth.
    /// Manual polling (rather than holding the borrowed `PendingTransaction`)
    /// so the wait can run in a detached `tokio::spawn` task.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        confirmations: u64,
    ) -> Result<TransactionReceipt, ProviderError> {
        loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
                if confirmations <= 1 {
                    return Ok(receipt);
                }
                if let Some(block) = receipt.block_number {
                    let latest = self.provider.get_block_number().await?;
                    if latest.as_u64().saturating_sub(block.as_u64()) + 1 >= confirmations {
                        return Ok(receipt);
                    }
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    }
}
