//! Client-side session: spend, quota and gallery persisted between runs.

mod store;

pub use store::{LocalStore, GALLERY_KEY, IMAGES_REMAINING_KEY, SESSION_COST_KEY};

use crate::accounting::{preflight, AccountingState, BudgetStatus, ValidationError};
use crate::batch::{
    estimate_plan_cost, BatchExecutor, BatchOutcome, BatchPlan, BatchProgress, CostEstimate,
};
use crate::error::Result;
use crate::image::{BudgetSource, GenerationRequest, GenerationResult, ImageProvider};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Most images kept in the gallery.
pub const GALLERY_LIMIT: usize = 50;

/// Accounting state and gallery backed by a [`LocalStore`].
#[derive(Debug)]
pub struct Session {
    store: LocalStore,
    accounting: AccountingState,
    gallery: Vec<GenerationResult>,
}

impl Session {
    /// Loads the session from `store`. Absent keys take their defaults.
    pub fn load(store: LocalStore) -> Self {
        let spend = store.get::<Decimal>(SESSION_COST_KEY).unwrap_or_default();
        let quota = store
            .get::<u32>(IMAGES_REMAINING_KEY)
            .unwrap_or(crate::accounting::DEFAULT_QUOTA);
        let mut gallery: Vec<GenerationResult> = store.get(GALLERY_KEY).unwrap_or_default();
        gallery.truncate(GALLERY_LIMIT);

        Self {
            store,
            accounting: AccountingState::new(spend, quota),
            gallery,
        }
    }

    /// Opens the state file at `path` and loads the session from it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::load(LocalStore::open(path)?))
    }

    pub fn accounting(&self) -> &AccountingState {
        &self.accounting
    }

    /// Saved images, newest first.
    pub fn gallery(&self) -> &[GenerationResult] {
        &self.gallery
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Writes spend, quota and gallery to disk.
    ///
    /// The server budget snapshot is not persisted; it is fetched fresh
    /// each session.
    pub fn save(&mut self) -> Result<()> {
        self.store
            .set(SESSION_COST_KEY, &self.accounting.session_spend)?;
        self.store
            .set(IMAGES_REMAINING_KEY, &self.accounting.quota_remaining)?;
        self.store.set(GALLERY_KEY, &self.gallery)?;
        self.store.flush()
    }

    /// Pulls the server's budget snapshot.
    ///
    /// A failed fetch keeps the previous snapshot and is only logged, so an
    /// unreachable relay never blocks the user from trying.
    pub async fn refresh_budget<B>(&mut self, source: &B) -> Option<&BudgetStatus>
    where
        B: BudgetSource + ?Sized,
    {
        match source.fetch_budget_status().await {
            Ok(status) => self.accounting.refresh_budget(status),
            Err(e) => tracing::warn!("could not refresh budget status: {e}"),
        }
        self.accounting.server_budget.as_ref()
    }

    /// Estimates `plan` and checks it against quota and budget.
    pub fn preflight(
        &self,
        prompt: &str,
        plan: &BatchPlan,
    ) -> std::result::Result<CostEstimate, ValidationError> {
        let estimate = estimate_plan_cost(plan);
        preflight(prompt, &estimate, &self.accounting)?;
        Ok(estimate)
    }

    /// Validates and runs `plan`, then saves the new images and totals.
    ///
    /// Once the provider has been called the outcomes are always returned;
    /// a failed save is logged and the in-memory session stays current.
    pub async fn run_batch<P, F>(
        &mut self,
        executor: &BatchExecutor<P>,
        plan: &BatchPlan,
        prompt: &str,
        on_progress: F,
    ) -> Result<Vec<BatchOutcome>>
    where
        P: ImageProvider,
        F: FnMut(BatchProgress) + Send,
    {
        self.preflight(prompt, plan)?;
        let outcomes = executor
            .execute(plan, prompt, &mut self.accounting, on_progress)
            .await?;

        let fresh: Vec<GenerationResult> = outcomes
            .iter()
            .filter_map(BatchOutcome::result)
            .cloned()
            .collect();
        self.add_to_gallery(fresh);
        if let Err(e) = self.save() {
            tracing::error!(
                path = %self.store.path().display(),
                "could not save session after batch: {e}"
            );
        }
        Ok(outcomes)
    }

    /// Generates one image with the request's own settings.
    pub async fn generate_single<P>(
        &mut self,
        executor: &BatchExecutor<P>,
        request: &GenerationRequest,
    ) -> Result<BatchOutcome>
    where
        P: ImageProvider,
    {
        let plan = BatchPlan::single(request.size, request.quality, request.style);
        let mut outcomes = self
            .run_batch(executor, &plan, &request.prompt, |_| {})
            .await?;
        // One slot in, one outcome out.
        Ok(outcomes.remove(0))
    }

    /// Zeroes the session spend. Quota is left alone.
    pub fn reset_spend(&mut self) -> Result<()> {
        self.accounting.reset_spend();
        self.save()
    }

    pub fn clear_gallery(&mut self) -> Result<()> {
        self.gallery.clear();
        self.save()
    }

    /// Prepends a batch's images in slot order, keeping the newest.
    fn add_to_gallery(&mut self, mut fresh: Vec<GenerationResult>) {
        if fresh.is_empty() {
            return;
        }
        fresh.append(&mut self.gallery);
        fresh.truncate(GALLERY_LIMIT);
        self.gallery = fresh;
    }
}
