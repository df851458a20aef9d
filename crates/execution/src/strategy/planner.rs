//! Bin placement planner.

use lb_lp_domain::entities::{BinId, MAX_BIN_ID, PlannedBin, PositionPlan};
use lb_lp_domain::enums::Asset;
use lb_lp_domain::value_objects::{BinOffsets, TokenBalances};
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::config::StrategyConfig;

/// Finest amount granularity the planner splits to.
const SPLIT_SCALE: u32 = 18;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("insufficient balance to deploy (spendable x={x}, y={y})")]
    InsufficientBalance { x: Decimal, y: Decimal },
    #[error("bin {active} offset by {offset} leaves the valid bin range")]
    BinOutOfRange { active: BinId, offset: i64 },
}

/// Computes where to place both assets around the active bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinPlanner {
    offsets: BinOffsets,
    bins_per_side: u32,
    reserve: TokenBalances,
    min_deposit: TokenBalances,
}

impl BinPlanner {
    pub fn new(offsets: BinOffsets) -> Self {
        Self {
            offsets,
            bins_per_side: 1,
            reserve: TokenBalances::zero(),
            min_deposit: TokenBalances::zero(),
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            offsets: config.offsets,
            bins_per_side: config.bins_per_side.max(1),
            reserve: config.reserve,
            min_deposit: config.min_deposit,
        }
    }

    #[must_use]
    pub fn with_bins_per_side(mut self, n: u32) -> Self {
        self.bins_per_side = n.max(1);
        self
    }

    #[must_use]
    pub fn with_reserve(mut self, reserve: TokenBalances) -> Self {
        self.reserve = reserve;
        self
    }

    #[must_use]
    pub fn with_min_deposit(mut self, min_deposit: TokenBalances) -> Self {
        self.min_deposit = min_deposit;
        self
    }

    /// Amounts actually available for deployment after reserves and minimums.
    pub fn spendable(&self, balances: &TokenBalances) -> TokenBalances {
        let after_reserve = balances.saturating_sub(&self.reserve);
        let keep = |amount: Decimal, min: Decimal| {
            if amount > Decimal::ZERO && amount >= min {
                amount
            } else {
                Decimal::ZERO
            }
        };
        TokenBalances::new(
            keep(after_reserve.x, self.min_deposit.x),
            keep(after_reserve.y, self.min_deposit.y),
        )
    }

    /// Builds the deployment plan for `balances` around `active_bin`.
    ///
    /// X goes above the active bin, Y below it. An asset with nothing
    /// spendable is left out.
    pub fn plan(
        &self,
        active_bin: BinId,
        balances: &TokenBalances,
    ) -> Result<PositionPlan, PlanError> {
        let spendable = self.spendable(balances);
        if spendable.is_empty() {
            return Err(PlanError::InsufficientBalance {
                x: spendable.x,
                y: spendable.y,
            });
        }

        let mut bins = Vec::new();
        if spendable.x > Decimal::ZERO {
            let first = i64::from(self.offsets.x_offset);
            let offsets = (0..self.bins_per_side).map(|i| first + i64::from(i));
            self.spread(active_bin, Asset::X, spendable.x, offsets, &mut bins)?;
        }
        if spendable.y > Decimal::ZERO {
            let first = -i64::from(self.offsets.y_offset);
            let offsets = (0..self.bins_per_side).map(|i| first - i64::from(i));
            self.spread(active_bin, Asset::Y, spendable.y, offsets, &mut bins)?;
        }

        Ok(PositionPlan::new(active_bin, bins))
    }

    fn spread(
        &self,
        active_bin: BinId,
        asset: Asset,
        amount: Decimal,
        offsets: impl Iterator<Item = i64>,
        out: &mut Vec<PlannedBin>,
    ) -> Result<(), PlanError> {
        let ids = offsets
            .map(|offset| shift(active_bin, offset))
            .collect::<Result<Vec<_>, _>>()?;

        let per_bin = (amount / Decimal::from(ids.len() as u64))
            .round_dp_with_strategy(SPLIT_SCALE, RoundingStrategy::ToZero);
        if per_bin.is_zero() {
            // Too small to split; the nearest bin takes everything.
            out.push(PlannedBin {
                bin_id: ids[0],
                asset,
                amount,
            });
            return Ok(());
        }

        let last = ids.len() - 1;
        for (i, bin_id) in ids.into_iter().enumerate() {
            let bin_amount = if i == last {
                amount - per_bin * Decimal::from(last as u64)
            } else {
                per_bin
            };
            out.push(PlannedBin {
                bin_id,
                asset,
                amount: bin_amount,
            });
        }
        Ok(())
    }
}

fn shift(active_bin: BinId, offset: i64) -> Result<BinId, PlanError> {
    let target = i64::from(active_bin) + offset;
    if target < 0 || target > i64::from(MAX_BIN_ID) {
        return Err(PlanError::BinOutOfRange {
            active: active_bin,
            offset,
        });
    }
    Ok(target as BinId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn planner() -> BinPlanner {
        BinPlanner::new(BinOffsets::default())
    }

    fn placed(bin_id: BinId, asset: Asset, amount: Decimal) -> PlannedBin {
        PlannedBin {
            bin_id,
            asset,
            amount,
        }
    }

    #[test]
    fn test_only_x_goes_one_bin_above() {
        let plan = planner()
            .plan(100, &TokenBalances::new(dec!(5), dec!(0)))
            .unwrap();
        assert_eq!(plan.active_bin, 100);
        assert_eq!(plan.bins, vec![placed(101, Asset::X, dec!(5))]);
    }

    #[test]
    fn test_both_assets_straddle_active_bin() {
        let plan = planner()
            .plan(8_388_608, &TokenBalances::new(dec!(2), dec!(0.01)))
            .unwrap();
        assert_eq!(
            plan.bins,
            vec![
                placed(8_388_607, Asset::Y, dec!(0.01)),
                placed(8_388_609, Asset::X, dec!(2)),
            ]
        );
    }

    #[test]
    fn test_zero_balances_are_insufficient() {
        let err = planner()
            .plan(100, &TokenBalances::new(dec!(0), dec!(0)))
            .unwrap_err();
        assert!(matches!(err, PlanError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_custom_offsets() {
        let planner = BinPlanner::new(BinOffsets::new(3, 2).unwrap());
        let plan = planner
            .plan(50, &TokenBalances::new(dec!(1), dec!(1)))
            .unwrap();
        assert_eq!(plan.bin_ids(), vec![48, 53]);
    }

    #[test]
    fn test_spread_remainder_goes_to_last_bin() {
        let planner = planner().with_bins_per_side(3);
        let plan = planner
            .plan(100, &TokenBalances::new(dec!(1), dec!(0.5)))
            .unwrap();

        assert_eq!(plan.bin_ids(), vec![97, 98, 99, 101, 102, 103]);
        assert_eq!(plan.total(Asset::X), dec!(1));
        assert_eq!(plan.total(Asset::Y), dec!(0.5));
        let far_x = plan.bins.iter().find(|b| b.bin_id == 103).unwrap();
        assert_eq!(far_x.amount, dec!(0.333333333333333334));
        assert!(plan.bins.iter().all(|b| b.amount > Decimal::ZERO));
    }

    #[test]
    fn test_reserve_and_minimum_deposit() {
        let planner = planner()
            .with_reserve(TokenBalances::new(dec!(0.000001), dec!(0.0000000001)))
            .with_min_deposit(TokenBalances::new(dec!(0.01), dec!(0.0001)));

        let plan = planner
            .plan(100, &TokenBalances::new(dec!(1.000001), dec!(0.00005)))
            .unwrap();
        assert_eq!(plan.bins, vec![placed(101, Asset::X, dec!(1))]);

        let err = planner
            .plan(100, &TokenBalances::new(dec!(0.005), dec!(0.00005)))
            .unwrap_err();
        assert!(matches!(err, PlanError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_bin_out_of_range() {
        let err = planner()
            .plan(0, &TokenBalances::new(dec!(0), dec!(1)))
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::BinOutOfRange {
                active: 0,
                offset: -1
            }
        );
        assert!(
            planner()
                .plan(MAX_BIN_ID, &TokenBalances::new(dec!(1), dec!(0)))
                .is_err()
        );
    }

    #[test]
    fn test_deterministic() {
        let balances = TokenBalances::new(dec!(7.77), dec!(0.123));
        let planner = planner().with_bins_per_side(4);
        assert_eq!(
            planner.plan(1_000, &balances).unwrap(),
            planner.plan(1_000, &balances).unwrap()
        );
    }
}
