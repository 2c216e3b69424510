//! Checks a batch against quota and budget before anything is sent.

use crate::accounting::AccountingState;
use crate::batch::CostEstimate;
use rust_decimal::Decimal;

/// Reasons a batch is refused before any generation call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Prompt is empty after trimming.
    #[error("prompt is required")]
    EmptyPrompt,

    /// Plan has no slots.
    #[error("nothing to generate")]
    EmptyPlan,

    /// Not enough quota left for every slot.
    #[error("batch needs {requested} images but only {remaining} remain in the quota")]
    QuotaExceeded { requested: usize, remaining: u32 },

    /// The relay reported its monthly budget as spent.
    #[error("monthly budget exhausted")]
    BudgetExhausted,

    /// Projected cost is more than the relay has left.
    #[error("batch costs ${projected} but only ${remaining} of the monthly budget remains")]
    BudgetExceeded {
        projected: Decimal,
        remaining: Decimal,
    },
}

/// Validates a planned batch against the current accounting state.
///
/// A missing budget snapshot skips the budget checks; the quota is then
/// the only limit enforced here and the relay still refuses requests it
/// cannot pay for.
pub fn preflight(
    prompt: &str,
    estimate: &CostEstimate,
    accounting: &AccountingState,
) -> Result<(), ValidationError> {
    if prompt.trim().is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    if estimate.count == 0 {
        return Err(ValidationError::EmptyPlan);
    }
    if estimate.count > accounting.quota_remaining as usize {
        return Err(ValidationError::QuotaExceeded {
            requested: estimate.count,
            remaining: accounting.quota_remaining,
        });
    }
    if let Some(budget) = &accounting.server_budget {
        if budget.is_exhausted {
            return Err(ValidationError::BudgetExhausted);
        }
        if estimate.total > budget.remaining {
            return Err(ValidationError::BudgetExceeded {
                projected: estimate.total,
                remaining: budget.remaining,
            });
        }
    }
    Ok(())
}
