//! Batch comparison: planning and sequential execution.

mod executor;
mod planner;

pub use executor::{
    BatchExecutor, BatchOutcome, BatchProgress, FailedSlot, GeneratedSlot, CANCELLED_MESSAGE,
};
pub use planner::{
    estimate_cost, estimate_plan_cost, plan, BatchConfig, BatchPlan, BatchType, CostEstimate,
};
