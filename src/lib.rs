//! imagegen - DALL-E 3 batch generation with quota and cost accounting.
//!
//! A session plans a batch of variations of one prompt (styles, sizes or
//! the full style × size matrix), checks it against the local quota and the
//! relay's monthly budget, then runs it one generation at a time.
//!
//! # Quick Start
//!
//! ```no_run
//! use imagegen::{BatchExecutor, BatchPlan, BatchType, RelayClient, Session};
//! use imagegen::{ImageQuality, ImageSize, ImageStyle};
//!
//! #[tokio::main]
//! async fn main() -> imagegen::Result<()> {
//!     let relay = RelayClient::builder().build()?;
//!     let mut session = Session::open("state.json")?;
//!     session.refresh_budget(&relay).await;
//!
//!     let plan = BatchPlan::new(
//!         BatchType::Styles,
//!         ImageSize::Square,
//!         ImageQuality::Standard,
//!         ImageStyle::Vivid,
//!     );
//!     let executor = BatchExecutor::new(relay);
//!     let outcomes = session
//!         .run_batch(&executor, &plan, "A lighthouse at dusk", |p| {
//!             println!("{}/{}", p.current, p.total);
//!         })
//!         .await?;
//!     for outcome in &outcomes {
//!         println!("{}: {:?}", outcome.label(), outcome.result().map(|r| &r.url));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `cli`: the `imagegen` command-line interface
//! - `server`: the axum relay that holds the provider key and the monthly budget

mod error;

pub mod accounting;
pub mod batch;
pub mod config;
pub mod image;
pub mod session;

#[cfg(feature = "server")]
pub mod server;

// Re-export error types at crate root
pub use error::{ImageGenError, Result};

pub use accounting::{
    cost_per_image, preflight, AccountingState, BudgetStatus, ValidationError, DEFAULT_QUOTA,
};
pub use batch::{
    estimate_cost, estimate_plan_cost, plan, BatchConfig, BatchExecutor, BatchOutcome, BatchPlan,
    BatchProgress, BatchType, CostEstimate,
};
pub use config::{ClientConfig, ServerConfig};
pub use image::providers::{
    DalleBackend, DalleProvider, DalleProviderBuilder, RelayClient, RelayClientBuilder,
};
pub use image::{
    BudgetSource, GenerationParameters, GenerationRequest, GenerationResult, ImageProvider,
    ImageQuality, ImageSize, ImageStyle,
};
pub use session::{LocalStore, Session};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::accounting::{AccountingState, BudgetStatus};
    pub use crate::batch::{BatchExecutor, BatchOutcome, BatchPlan, BatchType};
    pub use crate::error::{ImageGenError, Result};
    pub use crate::image::providers::{DalleProvider, RelayClient};
    pub use crate::image::{
        BudgetSource, GenerationRequest, GenerationResult, ImageProvider, ImageQuality,
        ImageSize, ImageStyle,
    };
    pub use crate::session::Session;
}
