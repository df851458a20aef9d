//! Scriptable in-process chain used by the controller tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lb_lp_domain::entities::{BinId, PositionPlan};
use lb_lp_domain::enums::Asset;
use lb_lp_domain::value_objects::TokenBalances;
use lb_lp_protocols::{ChainError, ChainReader, ChainWriter, TxReceipt};
use primitive_types::U256;
use rust_decimal::Decimal;

/// Shares credited per deposited bin.
pub const SHARES_PER_DEPOSIT: u64 = 1_000;

#[derive(Debug, Default)]
struct FakeState {
    active_bin: BinId,
    wallet: TokenBalances,
    shares: BTreeMap<BinId, U256>,
    deposits: BTreeMap<BinId, (Asset, Decimal)>,
    add_errors: VecDeque<ChainError>,
    remove_errors: VecDeque<ChainError>,
    read_errors: usize,
    broken_reads: Option<ChainError>,
    add_delay: Option<Duration>,
    land_on_timeout: bool,
    adds: usize,
    removes: usize,
    tx_counter: u64,
}

/// Pair plus wallet kept in memory.
#[derive(Debug, Default)]
pub struct FakeChain {
    state: Mutex<FakeState>,
}

impl FakeChain {
    pub fn new(active_bin: BinId, wallet: TokenBalances) -> Self {
        Self {
            state: Mutex::new(FakeState {
                active_bin,
                wallet,
                ..FakeState::default()
            }),
        }
    }

    pub fn set_active_bin(&self, bin: BinId) {
        self.state.lock().unwrap().active_bin = bin;
    }

    pub fn set_shares(&self, bin: BinId, shares: u64) {
        self.state
            .lock()
            .unwrap()
            .shares
            .insert(bin, U256::from(shares));
    }

    pub fn shares(&self) -> BTreeMap<BinId, U256> {
        let state = self.state.lock().unwrap();
        state
            .shares
            .iter()
            .filter(|(_, s)| !s.is_zero())
            .map(|(b, s)| (*b, *s))
            .collect()
    }

    pub fn wallet(&self) -> TokenBalances {
        self.state.lock().unwrap().wallet
    }

    /// The next `add_liquidity` call fails with `err`.
    pub fn fail_next_add(&self, err: ChainError) {
        self.state.lock().unwrap().add_errors.push_back(err);
    }

    /// The next `remove_liquidity` call fails with `err`.
    pub fn fail_next_remove(&self, err: ChainError) {
        self.state.lock().unwrap().remove_errors.push_back(err);
    }

    /// The next `count` reads fail with a transient RPC error.
    pub fn fail_reads(&self, count: usize) {
        self.state.lock().unwrap().read_errors = count;
    }

    /// Every read fails with `err` until further notice.
    pub fn break_reads(&self, err: ChainError) {
        self.state.lock().unwrap().broken_reads = Some(err);
    }

    /// `add_liquidity` waits `delay` before it is mined.
    pub fn slow_adds(&self, delay: Duration) {
        self.state.lock().unwrap().add_delay = Some(delay);
    }

    /// Timed-out transactions still take effect.
    pub fn land_on_timeout(&self, land: bool) {
        self.state.lock().unwrap().land_on_timeout = land;
    }

    pub fn add_calls(&self) -> usize {
        self.state.lock().unwrap().adds
    }

    pub fn remove_calls(&self) -> usize {
        self.state.lock().unwrap().removes
    }

    fn check_read(&self) -> Result<(), ChainError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.broken_reads {
            return Err(err.clone());
        }
        if state.read_errors > 0 {
            state.read_errors -= 1;
            return Err(ChainError::Rpc("connection reset".to_string()));
        }
        Ok(())
    }
}

impl FakeState {
    fn next_hash(&mut self) -> String {
        self.tx_counter += 1;
        format!("0x{:064x}", self.tx_counter)
    }

    fn apply_add(&mut self, plan: &PositionPlan) {
        for bin in &plan.bins {
            let entry = self.shares.entry(bin.bin_id).or_default();
            *entry = *entry + U256::from(SHARES_PER_DEPOSIT);
            let deposit = self
                .deposits
                .entry(bin.bin_id)
                .or_insert((bin.asset, Decimal::ZERO));
            deposit.1 += bin.amount;
        }
        self.wallet.x -= plan.total(Asset::X);
        self.wallet.y -= plan.total(Asset::Y);
    }

    fn apply_remove(&mut self, bin_ids: &[BinId]) {
        for bin in bin_ids {
            self.shares.remove(bin);
            match self.deposits.remove(bin) {
                Some((Asset::X, amount)) => self.wallet.x += amount,
                Some((Asset::Y, amount)) => self.wallet.y += amount,
                None => {}
            }
        }
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn active_bin(&self) -> Result<BinId, ChainError> {
        self.check_read()?;
        Ok(self.state.lock().unwrap().active_bin)
    }

    async fn reserves(&self) -> Result<(Decimal, Decimal), ChainError> {
        Ok((Decimal::ONE_HUNDRED, Decimal::ONE_HUNDRED))
    }

    async fn user_bin_balances(
        &self,
        bin_ids: &[BinId],
    ) -> Result<BTreeMap<BinId, U256>, ChainError> {
        self.check_read()?;
        let state = self.state.lock().unwrap();
        Ok(bin_ids
            .iter()
            .map(|b| (*b, state.shares.get(b).copied().unwrap_or_default()))
            .collect())
    }

    async fn wallet_balances(&self) -> Result<TokenBalances, ChainError> {
        self.check_read()?;
        Ok(self.state.lock().unwrap().wallet)
    }
}

#[async_trait]
impl ChainWriter for FakeChain {
    async fn add_liquidity(&self, plan: &PositionPlan) -> Result<TxReceipt, ChainError> {
        let delay = self.state.lock().unwrap().add_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state.adds += 1;
        if let Some(err) = state.add_errors.pop_front() {
            if err.is_timeout() && state.land_on_timeout {
                state.apply_add(plan);
            }
            return Err(err);
        }
        state.apply_add(plan);
        let hash = state.next_hash();
        Ok(TxReceipt::confirmed(hash, Some(1)))
    }

    async fn remove_liquidity(&self, bin_ids: &[BinId]) -> Result<TxReceipt, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.removes += 1;
        if let Some(err) = state.remove_errors.pop_front() {
            if err.is_timeout() && state.land_on_timeout {
                state.apply_remove(bin_ids);
            }
            return Err(err);
        }
        state.apply_remove(bin_ids);
        let hash = state.next_hash();
        Ok(TxReceipt::confirmed(hash, Some(1)))
    }
}
