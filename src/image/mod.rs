//! Image generation module.

mod provider;
pub mod providers;
mod types;

pub use provider::{BudgetSource, ImageProvider};
pub use types::{
    GenerationParameters, GenerationRequest, GenerationResult, ImageQuality, ImageSize,
    ImageStyle,
};
