//! Provider traits the batch executor and the relay are written against.

use crate::accounting::BudgetStatus;
use crate::error::Result;
use crate::image::types::{GenerationRequest, GenerationResult};
use async_trait::async_trait;

/// Something that can turn one request into one generated image.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generates a single image. One network round trip; may take a while.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult>;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str;
}

/// Read-only view of the relay's monthly spend.
#[async_trait]
pub trait BudgetSource: Send + Sync {
    /// Fetches the current budget snapshot.
    async fn fetch_budget_status(&self) -> Result<BudgetStatus>;
}

#[async_trait]
impl<T: ImageProvider + ?Sized> ImageProvider for std::sync::Arc<T> {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
