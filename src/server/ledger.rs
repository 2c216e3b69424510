//! Monthly spend ledger kept by the relay.

use crate::accounting::BudgetStatus;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Calendar month in UTC, as `(year, month)`.
type MonthKey = (i32, u32);

fn month_of(now: DateTime<Utc>) -> MonthKey {
    (now.year(), now.month())
}

#[derive(Debug)]
struct LedgerInner {
    month: MonthKey,
    spent: Decimal,
    /// Cost of generations currently in flight.
    pending: Decimal,
}

impl LedgerInner {
    fn roll_over(&mut self, now: DateTime<Utc>) {
        let month = month_of(now);
        if month != self.month {
            tracing::info!(
                previous_spend = %self.spent,
                year = month.0,
                month = month.1,
                "budget month rolled over"
            );
            self.month = month;
            self.spent = Decimal::ZERO;
        }
    }
}

/// Cost held against the budget while a generation is in flight.
///
/// Charge it with [`Reservation::commit`]. Dropping it uncommitted, including
/// when the request future is cancelled, returns the cost to the budget.
#[derive(Debug)]
#[must_use = "dropping a reservation releases it"]
pub struct Reservation {
    ledger: Arc<BudgetLedger>,
    cost: Decimal,
}

impl Reservation {
    pub fn cost(&self) -> Decimal {
        self.cost
    }

    /// Charges the reserved cost and returns the budget after the charge.
    pub fn commit(self) -> BudgetStatus {
        self.commit_at(Utc::now())
    }

    fn commit_at(mut self, now: DateTime<Utc>) -> BudgetStatus {
        let cost = std::mem::take(&mut self.cost);
        let mut inner = self.ledger.lock();
        inner.roll_over(now);
        inner.pending = (inner.pending - cost).max(Decimal::ZERO);
        inner.spent += cost;
        BudgetStatus::new(self.ledger.limit, inner.spent)
    }

    /// Returns the reserved cost to the budget.
    pub fn release(self) {}
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.cost.is_zero() {
            return;
        }
        let mut inner = self.ledger.lock();
        inner.pending = (inner.pending - self.cost).max(Decimal::ZERO);
        tracing::debug!(cost = %self.cost, "reservation released");
    }
}

/// Spend against a monthly limit, reset at the start of each UTC month.
///
/// In-flight generations are reserved up front so concurrent requests
/// cannot overspend the limit together.
#[derive(Debug)]
pub struct BudgetLedger {
    limit: Decimal,
    inner: Mutex<LedgerInner>,
}

impl BudgetLedger {
    /// Creates an empty ledger for the current month.
    pub fn new(limit: Decimal) -> Self {
        Self::starting_at(limit, Utc::now())
    }

    fn starting_at(limit: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            limit,
            inner: Mutex::new(LedgerInner {
                month: month_of(now),
                spent: Decimal::ZERO,
                pending: Decimal::ZERO,
            }),
        }
    }

    pub fn limit(&self) -> Decimal {
        self.limit
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        // The guarded values are plain numbers; a panic elsewhere cannot
        // leave them half-written.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Budget as of now. In-flight reservations are not counted as spent.
    pub fn snapshot(&self) -> BudgetStatus {
        self.snapshot_at(Utc::now())
    }

    fn snapshot_at(&self, now: DateTime<Utc>) -> BudgetStatus {
        let mut inner = self.lock();
        inner.roll_over(now);
        BudgetStatus::new(self.limit, inner.spent)
    }

    /// Holds `cost` against the budget.
    ///
    /// Fails with the current snapshot when the budget left after spent and
    /// in-flight costs cannot cover it.
    pub fn reserve(self: &Arc<Self>, cost: Decimal) -> Result<Reservation, BudgetStatus> {
        self.reserve_at(cost, Utc::now())
    }

    fn reserve_at(
        self: &Arc<Self>,
        cost: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Reservation, BudgetStatus> {
        let mut inner = self.lock();
        inner.roll_over(now);
        let available = self.limit - inner.spent - inner.pending;
        if cost > available || inner.spent >= self.limit {
            return Err(BudgetStatus::new(self.limit, inner.spent));
        }
        inner.pending += cost;
        Ok(Reservation {
            ledger: Arc::clone(self),
            cost,
        })
    }
}
