//! Spend, quota and budget accounting.
//!
//! [`AccountingState`] is owned by the caller and handed to the batch
//! executor by `&mut`; it is only changed at two points: when a
//! generation response carries a fresh [`BudgetStatus`], and once after a
//! batch finishes.

mod preflight;

pub use preflight::{preflight, ValidationError};

use crate::image::ImageQuality;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Number of generations a fresh session may spend.
pub const DEFAULT_QUOTA: u32 = 10;

/// Price of one standard-quality image, in USD.
pub const STANDARD_COST: Decimal = dec!(0.04);

/// Price of one HD image, in USD.
pub const HD_COST: Decimal = dec!(0.08);

/// Returns the unit price for the given quality.
pub fn cost_per_image(quality: ImageQuality) -> Decimal {
    match quality {
        ImageQuality::Standard => STANDARD_COST,
        ImageQuality::Hd => HD_COST,
    }
}

/// Snapshot of the relay's monthly spend cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    /// Monthly limit in USD.
    pub limit: Decimal,
    /// Spent this month in USD.
    pub spent: Decimal,
    /// `limit - spent`, never negative.
    pub remaining: Decimal,
    /// True once nothing more can be spent this month.
    #[serde(alias = "is_limited")]
    pub is_exhausted: bool,
    /// Share of the limit used, 0-100.
    pub percent_used: f64,
}

impl BudgetStatus {
    /// Builds a snapshot from a limit and the amount spent so far.
    pub fn new(limit: Decimal, spent: Decimal) -> Self {
        let remaining = (limit - spent).max(Decimal::ZERO);
        let percent_used = if limit > Decimal::ZERO {
            let pct = (spent / limit * dec!(100)).min(dec!(100)).round_dp(2);
            pct.to_f64().unwrap_or(100.0)
        } else {
            100.0
        };
        Self {
            limit,
            spent,
            remaining,
            is_exhausted: remaining <= Decimal::ZERO,
            percent_used,
        }
    }

    /// Returns true if `amount` fits in what is left of the budget.
    pub fn can_afford(&self, amount: Decimal) -> bool {
        !self.is_exhausted && amount <= self.remaining
    }
}

/// Client-side accounting for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingState {
    /// Total spent this session in USD.
    pub session_spend: Decimal,
    /// Generations left in the demo allowance.
    pub quota_remaining: u32,
    /// Last known relay budget; `None` when it could not be fetched.
    pub server_budget: Option<BudgetStatus>,
}

impl Default for AccountingState {
    fn default() -> Self {
        Self {
            session_spend: Decimal::ZERO,
            quota_remaining: DEFAULT_QUOTA,
            server_budget: None,
        }
    }
}

impl AccountingState {
    /// Creates state from persisted counters, clamping the quota to the allowance.
    pub fn new(session_spend: Decimal, quota_remaining: u32) -> Self {
        Self {
            session_spend: session_spend.max(Decimal::ZERO),
            quota_remaining: quota_remaining.min(DEFAULT_QUOTA),
            server_budget: None,
        }
    }

    /// Replaces the budget snapshot; the relay is authoritative.
    pub fn refresh_budget(&mut self, status: BudgetStatus) {
        self.server_budget = Some(status);
    }

    /// Applies the aggregate result of a batch run.
    pub fn record_batch(&mut self, spent: Decimal, succeeded: u32) {
        self.session_spend += spent;
        self.quota_remaining = self.quota_remaining.saturating_sub(succeeded);
    }

    /// Zeroes the session spend. Quota is left alone.
    pub fn reset_spend(&mut self) {
        self.session_spend = Decimal::ZERO;
    }

    /// Returns true when the relay reported its budget as exhausted.
    pub fn is_budget_exhausted(&self) -> bool {
        self.server_budget
            .as_ref()
            .is_some_and(|budget| budget.is_exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_per_image() {
        assert_eq!(cost_per_image(ImageQuality::Standard), dec!(0.04));
        assert_eq!(cost_per_image(ImageQuality::Hd), dec!(0.08));
    }

    #[test]
    fn test_budget_status_derived_fields() {
        let status = BudgetStatus::new(dec!(10.00), dec!(2.50));
        assert_eq!(status.remaining, dec!(7.50));
        assert!(!status.is_exhausted);
        assert_eq!(status.percent_used, 25.0);

        let over = BudgetStatus::new(dec!(1.00), dec!(1.04));
        assert_eq!(over.remaining, Decimal::ZERO);
        assert!(over.is_exhausted);
        assert_eq!(over.percent_used, 100.0);
    }

    #[test]
    fn test_can_afford() {
        let status = BudgetStatus::new(dec!(1.00), dec!(0.90));
        assert!(status.can_afford(dec!(0.08)));
        assert!(status.can_afford(dec!(0.10)));
        assert!(!status.can_afford(dec!(0.24)));
    }

    #[test]
    fn test_budget_status_accepts_legacy_flag() {
        let json = r#"{"limit": 5.0, "spent": 5.0, "remaining": 0.0, "is_limited": true, "percent_used": 100.0}"#;
        let status: BudgetStatus = serde_json::from_str(json).unwrap();
        assert!(status.is_exhausted);
    }

    #[test]
    fn test_record_batch_saturates_quota() {
        let mut state = AccountingState::new(dec!(0.12), 1);
        state.record_batch(dec!(0.16), 2);
        assert_eq!(state.session_spend, dec!(0.28));
        assert_eq!(state.quota_remaining, 0);
    }

    #[test]
    fn test_new_clamps_to_allowance() {
        let state = AccountingState::new(dec!(-1), 50);
        assert_eq!(state.session_spend, Decimal::ZERO);
        assert_eq!(state.quota_remaining, DEFAULT_QUOTA);
    }

    #[test]
    fn test_reset_spend_keeps_quota() {
        let mut state = AccountingState::new(dec!(0.40), 4);
        state.reset_spend();
        assert_eq!(state.session_spend, Decimal::ZERO);
        assert_eq!(state.quota_remaining, 4);
    }
}
