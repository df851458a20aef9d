//! Lifecycle tracker for position history.

use super::{
    CloseReason, EventData, FailureData, LifecycleEvent, LifecycleEventType, PositionClosedData,
    PositionOpenedData, WithdrawStartedData,
};
use lb_lp_domain::entities::{BinId, PositionId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Summary of a position's lifecycle.
#[derive(Debug, Clone)]
pub struct PositionSummary {
    /// Position id.
    pub position: PositionId,
    /// Pool address.
    pub pool: String,
    /// When position was opened.
    pub opened_at: chrono::DateTime<chrono::Utc>,
    /// When position was closed (if closed).
    pub closed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Bins the position covered.
    pub bin_ids: Vec<BinId>,
    /// Asset X deposited.
    pub amount_x: Decimal,
    /// Asset Y deposited.
    pub amount_y: Decimal,
    /// How the position ended.
    pub close_reason: Option<CloseReason>,
    /// Whether position is still open.
    pub is_open: bool,
    /// Whether the controller halted on this position.
    pub failed: bool,
}

/// Tracks lifecycle events for the positions this process handled.
pub struct LifecycleTracker {
    /// Events by position.
    events: Arc<RwLock<HashMap<PositionId, Vec<LifecycleEvent>>>>,
    /// Position summaries.
    summaries: Arc<RwLock<HashMap<PositionId, PositionSummary>>>,
}

impl LifecycleTracker {
    /// Creates a new lifecycle tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
            summaries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Records a position opened event.
    pub async fn record_position_opened(
        &self,
        position: &PositionId,
        pool: &str,
        tx_hash: Option<String>,
        data: PositionOpenedData,
    ) {
        let event = LifecycleEvent::new(
            LifecycleEventType::PositionOpened,
            position.clone(),
            pool,
            EventData::PositionOpened(data.clone()),
        )
        .with_tx_hash(tx_hash.clone());
        let opened_at = event.timestamp;
        self.add_event(position, event).await;

        let summary = PositionSummary {
            position: position.clone(),
            pool: pool.to_string(),
            opened_at,
            closed_at: None,
            bin_ids: data.bin_ids.clone(),
            amount_x: data.amount_x,
            amount_y: data.amount_y,
            close_reason: None,
            is_open: true,
            failed: false,
        };
        self.summaries
            .write()
            .await
            .insert(position.clone(), summary);

        info!(
            position = %position,
            active_bin = data.active_bin,
            bins = ?data.bin_ids,
            amount_x = %data.amount_x,
            amount_y = %data.amount_y,
            tx_hash = tx_hash.as_deref().unwrap_or("-"),
            "Position opened"
        );
    }

    /// Records the start of a withdrawal.
    pub async fn record_withdraw_started(
        &self,
        position: &PositionId,
        pool: &str,
        data: WithdrawStartedData,
    ) {
        let event = LifecycleEvent::new(
            LifecycleEventType::WithdrawStarted,
            position.clone(),
            pool,
            EventData::WithdrawStarted(data.clone()),
        );
        self.add_event(position, event).await;

        info!(
            position = %position,
            active_bin = ?data.active_bin,
            distance = ?data.distance,
            reason = ?data.reason,
            "Withdrawal started"
        );
    }

    /// Records a position closed event.
    pub async fn record_position_closed(
        &self,
        position: &PositionId,
        pool: &str,
        tx_hash: Option<String>,
        data: PositionClosedData,
    ) {
        let event = LifecycleEvent::new(
            LifecycleEventType::PositionClosed,
            position.clone(),
            pool,
            EventData::PositionClosed(data.clone()),
        )
        .with_tx_hash(tx_hash.clone());
        let closed_at = event.timestamp;
        self.add_event(position, event).await;

        if let Some(summary) = self.summaries.write().await.get_mut(position) {
            summary.closed_at = Some(closed_at);
            summary.is_open = false;
            summary.close_reason = Some(data.reason);
        }

        info!(
            position = %position,
            bins = ?data.bin_ids,
            reason = ?data.reason,
            tx_hash = tx_hash.as_deref().unwrap_or("-"),
            "Position closed"
        );
    }

    /// Records that the controller halted on a position.
    pub async fn record_failure(&self, position: &PositionId, pool: &str, data: FailureData) {
        let event = LifecycleEvent::new(
            LifecycleEventType::Failed,
            position.clone(),
            pool,
            EventData::Failed(data.clone()),
        );
        self.add_event(position, event).await;

        if let Some(summary) = self.summaries.write().await.get_mut(position) {
            summary.failed = true;
        }

        error!(
            position = %position,
            phase = %data.phase,
            reason = %data.reason,
            "Position failed"
        );
    }

    /// Adds an event to the tracker.
    async fn add_event(&self, position: &PositionId, event: LifecycleEvent) {
        let mut events = self.events.write().await;
        events.entry(position.clone()).or_default().push(event);
    }

    /// Gets all events for a position.
    pub async fn get_events(&self, position: &PositionId) -> Vec<LifecycleEvent> {
        self.events
            .read()
            .await
            .get(position)
            .cloned()
            .unwrap_or_default()
    }

    /// Gets all position summaries.
    pub async fn get_all_summaries(&self) -> Vec<PositionSummary> {
        self.summaries.read().await.values().cloned().collect()
    }

    /// Gets aggregate statistics.
    pub async fn get_aggregate_stats(&self) -> AggregateStats {
        let summaries = self.summaries.read().await;
        let events = self.events.read().await;

        let mut stats = AggregateStats::default();
        for summary in summaries.values() {
            stats.total_positions += 1;
            if summary.is_open {
                stats.open_positions += 1;
            } else {
                stats.closed_positions += 1;
            }
            if summary.close_reason == Some(CloseReason::Rebalance) {
                stats.total_rebalances += 1;
            }
        }
        stats.total_failures = events
            .values()
            .flatten()
            .filter(|e| e.event_type == LifecycleEventType::Failed)
            .count() as u32;

        stats
    }
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate statistics across all positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateStats {
    /// Total positions opened by this process.
    pub total_positions: u32,
    /// Currently open positions.
    pub open_positions: u32,
    /// Closed positions.
    pub closed_positions: u32,
    /// Positions closed to be redeployed.
    pub total_rebalances: u32,
    /// FAILED transitions recorded.
    pub total_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_lifecycle_tracker() {
        let tracker = LifecycleTracker::new();
        let position = PositionId::new();

        tracker
            .record_position_opened(
                &position,
                "0xpool",
                Some("0xadd".into()),
                PositionOpenedData {
                    active_bin: 100,
                    bin_ids: vec![99, 101],
                    amount_x: dec!(5),
                    amount_y: dec!(0.1),
                },
            )
            .await;

        let events = tracker.get_events(&position).await;
        assert_eq!(events.len(), 1);
        let summaries = tracker.get_all_summaries().await;
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].is_open);

        tracker
            .record_position_closed(
                &position,
                "0xpool",
                Some("0xremove".into()),
                PositionClosedData {
                    bin_ids: vec![99, 101],
                    reason: CloseReason::Rebalance,
                },
            )
            .await;

        let stats = tracker.get_aggregate_stats().await;
        assert_eq!(
            stats,
            AggregateStats {
                total_positions: 1,
                open_positions: 0,
                closed_positions: 1,
                total_rebalances: 1,
                total_failures: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_failure_is_reported_in_summary_and_events() {
        let tracker = LifecycleTracker::new();
        let position = PositionId::new();
        tracker
            .record_position_opened(
                &position,
                "0xpool",
                None,
                PositionOpenedData {
                    active_bin: 100,
                    bin_ids: vec![100],
                    amount_x: dec!(1),
                    amount_y: dec!(1),
                },
            )
            .await;

        tracker
            .record_failure(
                &position,
                "0xpool",
                FailureData {
                    phase: "WITHDRAWING".to_string(),
                    reason: "LBPair__ZeroShares".to_string(),
                },
            )
            .await;

        let summaries = tracker.get_all_summaries().await;
        assert!(summaries[0].failed);
        assert!(summaries[0].is_open);
        let events = tracker.get_events(&position).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1].data,
            EventData::Failed(data) if data.reason == "LBPair__ZeroShares"
        ));
        assert_eq!(tracker.get_aggregate_stats().await.total_failures, 1);
    }
}
