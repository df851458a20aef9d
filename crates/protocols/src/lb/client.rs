//! Liquidity Book pair client.
//!
//! Reads pair state over JSON-RPC and submits router transactions signed by
//! the operator wallet.

use std::collections::BTreeMap;

use alloy::network::{Ethereum, EthereumWallet, ReceiptResponse};
use alloy::primitives::aliases::U24;
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use chrono::Utc;
use lb_lp_domain::entities::{BinId, MAX_BIN_ID, PositionPlan, Token};
use lb_lp_domain::value_objects::{Amount, TokenBalances};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::config::LbClientConfig;
use super::contracts::{IERC20, ILBPair, ILBRouter};
use super::params::{apply_slippage, deposit_layout, from_alloy};
use crate::error::ChainError;
use crate::receipt::TxReceipt;
use crate::{ChainReader, ChainWriter};

/// Bins queried per `balanceOfBatch` call.
const SHARE_BATCH_SIZE: usize = 200;

/// Reserves held in one bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinReserves {
    pub bin_id: BinId,
    pub reserve_x: Decimal,
    pub reserve_y: Decimal,
}

/// Pair overview for operators.
#[derive(Debug, Clone)]
pub struct PoolInfo {
    pub pair_address: String,
    pub token_x: Token,
    pub token_y: Token,
    pub bin_step: u16,
    pub active_bin: BinId,
    pub reserve_x: Decimal,
    pub reserve_y: Decimal,
    /// Reserves of the bins surrounding the active bin, ascending.
    pub bins: Vec<BinReserves>,
}

/// Client for a single LB pair and the operator wallet.
pub struct LbPairClient {
    /// Signing provider.
    provider: DynProvider,
    /// Connection settings.
    config: LbClientConfig,
    /// Operator address; receives withdrawals and refunds.
    owner: Address,
    /// Token X metadata, cached at connect.
    token_x: Token,
    /// Token Y metadata, cached at connect.
    token_y: Token,
    token_x_address: Address,
    token_y_address: Address,
    /// Bin step of the pair in basis points.
    bin_step: u16,
}

impl LbPairClient {
    /// Connects to the RPC endpoint and caches immutable pair metadata.
    ///
    /// # Errors
    /// Returns `ChainError::Contract` when the endpoint serves a different
    /// chain than configured, or any RPC failure while loading metadata.
    pub async fn connect(
        config: LbClientConfig,
        signer: PrivateKeySigner,
    ) -> Result<Self, ChainError> {
        let owner = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(&config.rpc_url)
            .await
            .map_err(map_transport_error)?
            .erased();

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(map_transport_error)?;
        if chain_id != config.chain_id {
            return Err(ChainError::Contract(format!(
                "connected to chain {chain_id}, expected {}",
                config.chain_id
            )));
        }

        let pair = ILBPair::new(config.pair_address, provider.clone());
        let token_x_address = pair.getTokenX().call().await.map_err(map_contract_error)?;
        let token_y_address = pair.getTokenY().call().await.map_err(map_contract_error)?;
        let bin_step = pair.getBinStep().call().await.map_err(map_contract_error)?;

        let token_x = load_token(&provider, token_x_address).await?;
        let token_y = load_token(&provider, token_y_address).await?;

        info!(
            pair = %config.pair_address,
            owner = %owner,
            token_x = %token_x.symbol,
            token_y = %token_y.symbol,
            bin_step,
            "Connected to LB pair"
        );

        Ok(Self {
            provider,
            config,
            owner,
            token_x,
            token_y,
            token_x_address,
            token_y_address,
            bin_step,
        })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn token_x(&self) -> &Token {
        &self.token_x
    }

    pub fn token_y(&self) -> &Token {
        &self.token_y
    }

    pub fn bin_step(&self) -> u16 {
        self.bin_step
    }

    pub fn config(&self) -> &LbClientConfig {
        &self.config
    }

    fn pair(&self) -> ILBPair::ILBPairInstance<DynProvider> {
        ILBPair::new(self.config.pair_address, self.provider.clone())
    }

    fn router(&self) -> ILBRouter::ILBRouterInstance<DynProvider> {
        ILBRouter::new(self.config.router_address, self.provider.clone())
    }

    fn deadline(&self) -> U256 {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        U256::from(now + self.config.deadline.as_secs())
    }

    /// Reserves of a single bin.
    pub async fn bin_reserves(&self, bin_id: BinId) -> Result<BinReserves, ChainError> {
        let bin = self
            .pair()
            .getBin(bin_u24(bin_id)?)
            .call()
            .await
            .map_err(map_contract_error)?;
        Ok(BinReserves {
            bin_id,
            reserve_x: raw_to_decimal(bin.binReserveX, self.token_x.decimals)?,
            reserve_y: raw_to_decimal(bin.binReserveY, self.token_y.decimals)?,
        })
    }

    /// Pair overview including the `around` bins on each side of the active bin.
    pub async fn pool_info(&self, around: u32) -> Result<PoolInfo, ChainError> {
        let active_bin = self.active_bin().await?;
        let (reserve_x, reserve_y) = self.reserves().await?;

        let lo = active_bin.saturating_sub(around);
        let hi = active_bin.saturating_add(around).min(MAX_BIN_ID);
        let mut bins = Vec::with_capacity((hi - lo + 1) as usize);
        for bin_id in lo..=hi {
            bins.push(self.bin_reserves(bin_id).await?);
        }

        Ok(PoolInfo {
            pair_address: self.config.pair_address.to_string(),
            token_x: self.token_x.clone(),
            token_y: self.token_y.clone(),
            bin_step: self.bin_step,
            active_bin,
            reserve_x,
            reserve_y,
            bins,
        })
    }

    async fn raw_shares(&self, bin_ids: &[BinId]) -> Result<Vec<U256>, ChainError> {
        let pair = self.pair();
        let mut shares = Vec::with_capacity(bin_ids.len());
        for chunk in bin_ids.chunks(SHARE_BATCH_SIZE) {
            let accounts = vec![self.owner; chunk.len()];
            let ids: Vec<U256> = chunk.iter().map(|id| U256::from(*id)).collect();
            let batch = pair
                .balanceOfBatch(accounts, ids)
                .call()
                .await
                .map_err(map_contract_error)?;
            if batch.len() != chunk.len() {
                return Err(ChainError::Contract(format!(
                    "balanceOfBatch returned {} entries for {} bins",
                    batch.len(),
                    chunk.len()
                )));
            }
            shares.extend(batch);
        }
        Ok(shares)
    }

    /// Token amounts the given shares currently redeem for.
    async fn expected_withdrawal(
        &self,
        held: &[(BinId, U256)],
    ) -> Result<(U256, U256), ChainError> {
        let pair = self.pair();
        let mut amount_x = U256::ZERO;
        let mut amount_y = U256::ZERO;
        for (bin_id, shares) in held {
            let bin = pair
                .getBin(bin_u24(*bin_id)?)
                .call()
                .await
                .map_err(map_contract_error)?;
            let supply = pair
                .totalSupply(U256::from(*bin_id))
                .call()
                .await
                .map_err(map_contract_error)?;
            if supply.is_zero() {
                continue;
            }
            amount_x += pro_rata(bin.binReserveX, *shares, supply);
            amount_y += pro_rata(bin.binReserveY, *shares, supply);
        }
        Ok((amount_x, amount_y))
    }

    async fn ensure_allowance(&self, token: Address, amount: U256) -> Result<(), ChainError> {
        if amount.is_zero() {
            return Ok(());
        }
        let erc20 = IERC20::new(token, self.provider.clone());
        let current = erc20
            .allowance(self.owner, self.config.router_address)
            .call()
            .await
            .map_err(map_contract_error)?;
        if current >= amount {
            debug!(token = %token, "Router allowance sufficient");
            return Ok(());
        }

        info!(token = %token, amount = %amount, "Approving router allowance");
        let pending = erc20
            .approve(self.config.router_address, amount)
            .send()
            .await
            .map_err(map_contract_error)?;
        self.confirm(pending, "approve").await.map(|_| ())
    }

    async fn ensure_lp_approval(&self) -> Result<(), ChainError> {
        let pair = self.pair();
        let approved = pair
            .isApprovedForAll(self.owner, self.config.router_address)
            .call()
            .await
            .map_err(map_contract_error)?;
        if approved {
            return Ok(());
        }

        info!("Approving router for LP shares");
        let pending = pair
            .approveForAll(self.config.router_address, true)
            .send()
            .await
            .map_err(map_contract_error)?;
        self.confirm(pending, "approve_for_all").await.map(|_| ())
    }

    /// Waits for a broadcast transaction. Any failure after broadcast leaves
    /// the outcome unknown and is reported as a timeout.
    async fn confirm(
        &self,
        pending: PendingTransactionBuilder<Ethereum>,
        action: &'static str,
    ) -> Result<TxReceipt, ChainError> {
        let tx_hash = pending.tx_hash().to_string();
        info!(action, tx_hash = %tx_hash, "Transaction submitted");

        let receipt = pending
            .with_timeout(Some(self.config.confirmation_timeout))
            .get_receipt()
            .await
            .map_err(|e| {
                warn!(action, tx_hash = %tx_hash, error = %e, "Receipt not obtained");
                ChainError::TxTimeout {
                    tx_hash: tx_hash.clone(),
                }
            })?;

        if !receipt.status() {
            warn!(action, tx_hash = %tx_hash, "Transaction reverted");
            return Err(ChainError::Reverted {
                tx_hash: Some(tx_hash),
                reason: format!("{action} receipt status failed"),
            });
        }

        let block_number = receipt.block_number();
        info!(action, tx_hash = %tx_hash, block = ?block_number, "Transaction confirmed");
        Ok(TxReceipt::confirmed(tx_hash, block_number))
    }
}

#[async_trait]
impl ChainReader for LbPairClient {
    async fn active_bin(&self) -> Result<BinId, ChainError> {
        let id = self
            .pair()
            .getActiveId()
            .call()
            .await
            .map_err(map_contract_error)?;
        Ok(id.to::<u32>())
    }

    async fn reserves(&self) -> Result<(Decimal, Decimal), ChainError> {
        let reserves = self
            .pair()
            .getReserves()
            .call()
            .await
            .map_err(map_contract_error)?;
        Ok((
            raw_to_decimal(reserves.reserveX, self.token_x.decimals)?,
            raw_to_decimal(reserves.reserveY, self.token_y.decimals)?,
        ))
    }

    async fn user_bin_balances(
        &self,
        bin_ids: &[BinId],
    ) -> Result<BTreeMap<BinId, primitive_types::U256>, ChainError> {
        if bin_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let shares = self.raw_shares(bin_ids).await?;
        Ok(bin_ids
            .iter()
            .copied()
            .zip(shares.into_iter().map(from_alloy))
            .collect())
    }

    async fn wallet_balances(&self) -> Result<TokenBalances, ChainError> {
        let x = IERC20::new(self.token_x_address, self.provider.clone())
            .balanceOf(self.owner)
            .call()
            .await
            .map_err(map_contract_error)?;
        let y = IERC20::new(self.token_y_address, self.provider.clone())
            .balanceOf(self.owner)
            .call()
            .await
            .map_err(map_contract_error)?;
        Ok(TokenBalances::new(
            Amount::new(from_alloy(x), self.token_x.decimals).to_decimal()?,
            Amount::new(from_alloy(y), self.token_y.decimals).to_decimal()?,
        ))
    }
}

#[async_trait]
impl ChainWriter for LbPairClient {
    async fn add_liquidity(&self, plan: &PositionPlan) -> Result<TxReceipt, ChainError> {
        if plan.is_empty() {
            return Err(ChainError::Contract("refusing to submit an empty plan".into()));
        }
        let layout = deposit_layout(plan, self.token_x.decimals, self.token_y.decimals)?;

        self.ensure_allowance(self.token_x_address, layout.amount_x)
            .await?;
        self.ensure_allowance(self.token_y_address, layout.amount_y)
            .await?;

        let params = ILBRouter::LiquidityParameters {
            tokenX: self.token_x_address,
            tokenY: self.token_y_address,
            binStep: U256::from(self.bin_step),
            amountX: layout.amount_x,
            amountY: layout.amount_y,
            amountXMin: apply_slippage(layout.amount_x, self.config.slippage_bps),
            amountYMin: apply_slippage(layout.amount_y, self.config.slippage_bps),
            activeIdDesired: U256::from(plan.active_bin),
            idSlippage: U256::from(self.config.id_slippage),
            deltaIds: layout.delta_ids,
            distributionX: layout.distribution_x,
            distributionY: layout.distribution_y,
            to: self.owner,
            refundTo: self.owner,
            deadline: self.deadline(),
        };

        info!(
            active_bin = plan.active_bin,
            bins = ?plan.bin_ids(),
            amount_x = %layout.amount_x,
            amount_y = %layout.amount_y,
            "Adding liquidity"
        );
        let pending = self
            .router()
            .addLiquidity(params)
            .send()
            .await
            .map_err(map_contract_error)?;
        self.confirm(pending, "add_liquidity").await
    }

    async fn remove_liquidity(&self, bin_ids: &[BinId]) -> Result<TxReceipt, ChainError> {
        let shares = self.raw_shares(bin_ids).await?;
        let held: Vec<(BinId, U256)> = bin_ids
            .iter()
            .copied()
            .zip(shares)
            .filter(|(_, s)| !s.is_zero())
            .collect();
        if held.is_empty() {
            return Err(ChainError::Contract(format!(
                "no shares held in bins {bin_ids:?}"
            )));
        }

        self.ensure_lp_approval().await?;
        let (expected_x, expected_y) = self.expected_withdrawal(&held).await?;

        let ids: Vec<U256> = held.iter().map(|(id, _)| U256::from(*id)).collect();
        let amounts: Vec<U256> = held.iter().map(|(_, s)| *s).collect();

        info!(
            bins = ?held.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            expected_x = %expected_x,
            expected_y = %expected_y,
            "Removing liquidity"
        );
        let pending = self
            .router()
            .removeLiquidity(
                self.token_x_address,
                self.token_y_address,
                self.bin_step,
                apply_slippage(expected_x, self.config.slippage_bps),
                apply_slippage(expected_y, self.config.slippage_bps),
                ids,
                amounts,
                self.owner,
                self.deadline(),
            )
            .send()
            .await
            .map_err(map_contract_error)?;
        self.confirm(pending, "remove_liquidity").await
    }
}

async fn load_token(provider: &DynProvider, address: Address) -> Result<Token, ChainError> {
    let erc20 = IERC20::new(address, provider.clone());
    let decimals = erc20.decimals().call().await.map_err(map_contract_error)?;
    let symbol = erc20.symbol().call().await.map_err(map_contract_error)?;
    Ok(Token::new(address.to_string(), symbol, decimals))
}

fn bin_u24(bin_id: BinId) -> Result<U24, ChainError> {
    if bin_id > MAX_BIN_ID {
        return Err(ChainError::Contract(format!("bin id {bin_id} exceeds uint24")));
    }
    Ok(U24::from(bin_id))
}

fn raw_to_decimal(raw: u128, decimals: u8) -> Result<Decimal, ChainError> {
    Ok(Amount::new(primitive_types::U256::from(raw), decimals).to_decimal()?)
}

/// `reserve * shares / supply`, zero when the product does not fit.
fn pro_rata(reserve: u128, shares: U256, supply: U256) -> U256 {
    U256::from(reserve)
        .checked_mul(shares)
        .map(|v| v / supply)
        .unwrap_or(U256::ZERO)
}

fn map_contract_error(err: alloy::contract::Error) -> ChainError {
    match err {
        alloy::contract::Error::TransportError(e) => map_transport_error(e),
        other => ChainError::Contract(other.to_string()),
    }
}

fn map_transport_error(err: TransportError) -> ChainError {
    match &err {
        RpcError::ErrorResp(payload) => {
            let message = payload.message.to_string();
            if message.contains("revert") {
                ChainError::Reverted {
                    tx_hash: None,
                    reason: message,
                }
            } else if message.contains("limit") || message.contains("timeout") {
                ChainError::Rpc(message)
            } else {
                ChainError::Contract(message)
            }
        }
        _ => ChainError::Rpc(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pro_rata() {
        let out = pro_rata(1_000, U256::from(25u64), U256::from(100u64));
        assert_eq!(out, U256::from(250u64));
    }

    #[test]
    fn test_bin_u24_bounds() {
        assert!(bin_u24(MAX_BIN_ID).is_ok());
        assert!(bin_u24(MAX_BIN_ID + 1).is_err());
    }

    #[test]
    fn test_transport_errors_map_to_retryable_rpc() {
        let err = map_transport_error(TransportError::local_usage_str("connection refused"));
        assert!(err.is_retryable());
    }
}
