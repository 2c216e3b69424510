//! Runs a batch plan one generation at a time.

use crate::accounting::AccountingState;
use crate::batch::planner::{BatchConfig, BatchPlan};
use crate::error::{ImageGenError, Result};
use crate::image::{GenerationResult, ImageProvider};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Message recorded for slots skipped after cancellation.
pub const CANCELLED_MESSAGE: &str = "batch cancelled";

/// Position of a running batch. `{0, 0}` means idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchProgress {
    /// 1-based index of the slot being generated.
    pub current: usize,
    pub total: usize,
}

impl BatchProgress {
    /// No batch running.
    pub const IDLE: BatchProgress = BatchProgress {
        current: 0,
        total: 0,
    };

    pub fn is_idle(&self) -> bool {
        *self == Self::IDLE
    }
}

/// A slot that produced an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSlot {
    pub label: String,
    pub config: BatchConfig,
    #[serde(flatten)]
    pub result: GenerationResult,
}

/// A slot whose generation call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSlot {
    pub label: String,
    pub config: BatchConfig,
    /// Human-readable failure message.
    pub error: String,
}

/// Outcome of one slot of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchOutcome {
    Success(GeneratedSlot),
    Failed(FailedSlot),
}

impl BatchOutcome {
    fn failed(config: &BatchConfig, message: impl Into<String>) -> Self {
        Self::Failed(FailedSlot {
            label: config.label.clone(),
            config: config.clone(),
            error: message.into(),
        })
    }

    /// The planned slot this outcome belongs to.
    pub fn config(&self) -> &BatchConfig {
        match self {
            Self::Success(slot) => &slot.config,
            Self::Failed(slot) => &slot.config,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Success(slot) => &slot.label,
            Self::Failed(slot) => &slot.label,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The generated image, if the slot succeeded.
    pub fn result(&self) -> Option<&GenerationResult> {
        match self {
            Self::Success(slot) => Some(&slot.result),
            Self::Failed(_) => None,
        }
    }

    /// The failure message, if the slot failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failed(slot) => Some(&slot.error),
        }
    }
}

/// Sequential batch runner.
///
/// Exactly one generation call is in flight at any time. A failed slot is
/// recorded and the run moves on; nothing is retried or rolled back.
pub struct BatchExecutor<P> {
    provider: P,
    cancel: CancellationToken,
}

impl<P: ImageProvider> BatchExecutor<P> {
    /// Creates an executor generating through `provider`.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` to stop the run between slots.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels the remaining slots of the current run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs every slot of `plan` in order.
    ///
    /// `results[i]` always belongs to `plan[i]`. Budget snapshots carried
    /// by responses and by budget refusals are applied as they arrive; spend and quota are
    /// updated once after the last slot. Slots not started before
    /// cancellation are recorded as failed with [`CANCELLED_MESSAGE`].
    pub async fn execute<F>(
        &self,
        plan: &BatchPlan,
        prompt: &str,
        accounting: &mut AccountingState,
        mut on_progress: F,
    ) -> Result<Vec<BatchOutcome>>
    where
        F: FnMut(BatchProgress) + Send,
    {
        if plan.is_empty() {
            return Err(ImageGenError::InvalidRequest(
                "batch plan has no slots".into(),
            ));
        }

        let total = plan.len();
        let start = Instant::now();
        let mut results = Vec::with_capacity(total);
        let mut accrued = Decimal::ZERO;
        let mut succeeded: u32 = 0;

        tracing::info!(
            provider = self.provider.name(),
            slots = total,
            "starting batch"
        );

        for (i, config) in plan.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(slot = i + 1, label = %config.label, "skipping slot, batch cancelled");
                results.push(BatchOutcome::failed(config, CANCELLED_MESSAGE));
                continue;
            }

            on_progress(BatchProgress {
                current: i + 1,
                total,
            });

            let request = config.to_request(prompt);
            match self.provider.generate(&request).await {
                Ok(result) => {
                    tracing::debug!(slot = i + 1, label = %config.label, cost = %result.cost, "slot generated");
                    accrued += result.cost;
                    succeeded += 1;
                    if let Some(status) = &result.cost_status {
                        accounting.refresh_budget(status.clone());
                    }
                    results.push(BatchOutcome::Success(GeneratedSlot {
                        label: config.label.clone(),
                        config: config.clone(),
                        result,
                    }));
                }
                Err(e) => {
                    tracing::warn!(slot = i + 1, label = %config.label, "slot failed: {e}");
                    if let Some(status) = e.budget_status() {
                        accounting.refresh_budget(status.clone());
                    }
                    results.push(BatchOutcome::failed(config, e.to_string()));
                }
            }
        }

        accounting.record_batch(accrued, succeeded);
        on_progress(BatchProgress::IDLE);

        tracing::info!(
            succeeded,
            failed = total - succeeded as usize,
            spent = %accrued,
            duration_ms = start.elapsed().as_millis() as u64,
            "batch finished"
        );

        Ok(results)
    }
}
