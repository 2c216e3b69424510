//! Expands a batch type into an ordered plan of generation slots.

use crate::accounting::cost_per_image;
use crate::image::{GenerationRequest, ImageQuality, ImageSize, ImageStyle};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of side-by-side comparison to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchType {
    /// Base size and quality, both styles.
    Styles,
    /// Base quality and style, all three sizes.
    Sizes,
    /// Every style crossed with every size.
    Matrix,
}

impl BatchType {
    /// Returns the batch type as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Styles => "styles",
            Self::Sizes => "sizes",
            Self::Matrix => "matrix",
        }
    }
}

impl std::fmt::Display for BatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One planned slot of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub size: ImageSize,
    pub quality: ImageQuality,
    pub style: ImageStyle,
    /// Display label distinguishing this slot from its siblings.
    pub label: String,
}

impl BatchConfig {
    /// Creates a slot with an explicit label.
    pub fn new(
        size: ImageSize,
        quality: ImageQuality,
        style: ImageStyle,
        label: impl Into<String>,
    ) -> Self {
        Self {
            size,
            quality,
            style,
            label: label.into(),
        }
    }

    /// Builds the single-image request for this slot.
    pub fn to_request(&self, prompt: &str) -> GenerationRequest {
        GenerationRequest::new(prompt)
            .with_size(self.size)
            .with_quality(self.quality)
            .with_style(self.style)
    }
}

/// Ordered slots of a batch. Order is execution and display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    configs: Vec<BatchConfig>,
}

impl BatchPlan {
    /// Expands `batch_type` around the base parameters.
    ///
    /// Quality is never varied, so every slot of a plan shares one unit
    /// price. The base size is ignored by `Sizes` and `Matrix`, the base
    /// style by `Styles` and `Matrix`.
    pub fn new(
        batch_type: BatchType,
        base_size: ImageSize,
        base_quality: ImageQuality,
        base_style: ImageStyle,
    ) -> Self {
        let configs = match batch_type {
            BatchType::Styles => ImageStyle::ALL
                .iter()
                .map(|&style| BatchConfig::new(base_size, base_quality, style, style.label()))
                .collect(),
            BatchType::Sizes => ImageSize::ALL
                .iter()
                .map(|&size| BatchConfig::new(size, base_quality, base_style, size.label()))
                .collect(),
            BatchType::Matrix => ImageStyle::ALL
                .iter()
                .flat_map(|&style| {
                    ImageSize::ALL.iter().map(move |&size| {
                        BatchConfig::new(
                            size,
                            base_quality,
                            style,
                            format!("{} - {}", style.label(), size.label()),
                        )
                    })
                })
                .collect(),
        };
        Self { configs }
    }

    /// A one-slot plan, used for plain single generations.
    pub fn single(size: ImageSize, quality: ImageQuality, style: ImageStyle) -> Self {
        Self {
            configs: vec![BatchConfig::new(size, quality, style, style.label())],
        }
    }

    /// Builds a plan from explicit slots.
    pub fn from_configs(configs: Vec<BatchConfig>) -> Self {
        Self { configs }
    }

    pub fn configs(&self) -> &[BatchConfig] {
        &self.configs
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BatchConfig> {
        self.configs.iter()
    }
}

impl<'a> IntoIterator for &'a BatchPlan {
    type Item = &'a BatchConfig;
    type IntoIter = std::slice::Iter<'a, BatchConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.configs.iter()
    }
}

/// Expands a batch request into its plan.
pub fn plan(
    batch_type: BatchType,
    base_size: ImageSize,
    base_quality: ImageQuality,
    base_style: ImageStyle,
) -> BatchPlan {
    BatchPlan::new(batch_type, base_size, base_quality, base_style)
}

/// Projected cost of running a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Number of images.
    pub count: usize,
    /// `count * per_image`, in USD.
    pub total: Decimal,
    /// Unit price in USD.
    pub per_image: Decimal,
}

/// Computes the projected cost of `plan` at `cost_per_image` per slot.
pub fn estimate_cost(plan: &BatchPlan, cost_per_image: Decimal) -> CostEstimate {
    let count = plan.len();
    CostEstimate {
        count,
        total: Decimal::from(count) * cost_per_image,
        per_image: cost_per_image,
    }
}

/// Computes the projected cost of `plan` from the pricing table.
///
/// All slots of a planned batch share one quality; an empty plan costs nothing.
pub fn estimate_plan_cost(plan: &BatchPlan) -> CostEstimate {
    let per_image = plan
        .configs()
        .first()
        .map(|config| cost_per_image(config.quality))
        .unwrap_or(Decimal::ZERO);
    estimate_cost(plan, per_image)
}
