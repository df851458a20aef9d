use std::collections::BTreeMap;

use alloy::primitives::{I256, U256};
use lb_lp_domain::entities::{BinId, PositionPlan};
use lb_lp_domain::enums::Asset;
use lb_lp_domain::value_objects::Amount;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::ChainError;

/// Distribution precision used by the LB router.
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

const BPS_DENOMINATOR: u32 = 10_000;

/// Router-ready description of a deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositLayout {
    pub delta_ids: Vec<I256>,
    pub distribution_x: Vec<U256>,
    pub distribution_y: Vec<U256>,
    pub amount_x: U256,
    pub amount_y: U256,
}

/// Builds delta ids and 1e18-scaled distributions for `plan`.
///
/// Each asset's distribution sums to exactly [`PRECISION`] when that asset is
/// deposited; the last bin holding it absorbs rounding.
pub fn deposit_layout(
    plan: &PositionPlan,
    decimals_x: u8,
    decimals_y: u8,
) -> Result<DepositLayout, ChainError> {
    let mut per_bin: BTreeMap<BinId, (Decimal, Decimal)> = BTreeMap::new();
    for bin in &plan.bins {
        let entry = per_bin.entry(bin.bin_id).or_default();
        match bin.asset {
            Asset::X => entry.0 += bin.amount,
            Asset::Y => entry.1 += bin.amount,
        }
    }

    let total_x = plan.total(Asset::X);
    let total_y = plan.total(Asset::Y);

    let mut delta_ids = Vec::with_capacity(per_bin.len());
    let mut x_shares = Vec::with_capacity(per_bin.len());
    let mut y_shares = Vec::with_capacity(per_bin.len());
    for (bin_id, (x, y)) in &per_bin {
        let delta = I256::try_from(plan.delta_of(*bin_id))
            .map_err(|e| ChainError::Contract(format!("delta id out of range: {e}")))?;
        delta_ids.push(delta);
        x_shares.push(*x);
        y_shares.push(*y);
    }

    Ok(DepositLayout {
        delta_ids,
        distribution_x: distribution(&x_shares, total_x)?,
        distribution_y: distribution(&y_shares, total_y)?,
        amount_x: raw_amount(total_x, decimals_x)?,
        amount_y: raw_amount(total_y, decimals_y)?,
    })
}

fn distribution(amounts: &[Decimal], total: Decimal) -> Result<Vec<U256>, ChainError> {
    if total <= Decimal::ZERO {
        return Ok(vec![U256::ZERO; amounts.len()]);
    }
    let precision = Decimal::from(PRECISION as u64);
    let last_used = amounts.iter().rposition(|a| *a > Decimal::ZERO);

    let mut assigned: u128 = 0;
    let mut out = Vec::with_capacity(amounts.len());
    for (i, amount) in amounts.iter().enumerate() {
        let share = if Some(i) == last_used {
            PRECISION.saturating_sub(assigned)
        } else if *amount > Decimal::ZERO {
            (*amount / total * precision)
                .trunc()
                .to_u128()
                .ok_or_else(|| ChainError::Contract(format!("bad distribution for {amount}")))?
        } else {
            0
        };
        assigned += share;
        out.push(U256::from(share));
    }
    Ok(out)
}

/// Converts a decimal token amount to raw units as an alloy integer.
pub fn raw_amount(amount: Decimal, decimals: u8) -> Result<U256, ChainError> {
    let raw = Amount::from_decimal(amount, decimals)?.raw;
    Ok(to_alloy(raw))
}

/// Lowers `amount` by `slippage_bps`.
pub fn apply_slippage(amount: U256, slippage_bps: u32) -> U256 {
    let keep = BPS_DENOMINATOR - slippage_bps.min(BPS_DENOMINATOR);
    amount * U256::from(keep) / U256::from(BPS_DENOMINATOR)
}

pub fn to_alloy(value: primitive_types::U256) -> U256 {
    U256::from_limbs(value.0)
}

pub fn from_alloy(value: U256) -> primitive_types::U256 {
    primitive_types::U256(value.into_limbs())
}
