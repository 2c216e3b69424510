//! Core types for image generation.

use crate::accounting::BudgetStatus;
use crate::error::{ImageGenError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Output dimensions supported by DALL-E 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageSize {
    /// 1024x1024 square.
    #[default]
    #[serde(rename = "1024x1024")]
    Square,
    /// 1792x1024 landscape.
    #[serde(rename = "1792x1024")]
    Landscape,
    /// 1024x1792 portrait.
    #[serde(rename = "1024x1792")]
    Portrait,
}

impl ImageSize {
    /// All sizes, in the order batches use them.
    pub const ALL: [ImageSize; 3] = [Self::Square, Self::Landscape, Self::Portrait];

    /// Returns the size as the API string (e.g., "1792x1024").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1024x1024",
            Self::Landscape => "1792x1024",
            Self::Portrait => "1024x1792",
        }
    }

    /// Human-readable name used in batch labels.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Square => "Square",
            Self::Landscape => "Landscape",
            Self::Portrait => "Portrait",
        }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImageSize {
    type Err = ImageGenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1024x1024" => Ok(Self::Square),
            "1792x1024" => Ok(Self::Landscape),
            "1024x1792" => Ok(Self::Portrait),
            _ => Err(ImageGenError::InvalidRequest(format!(
                "Invalid size. Must be one of: {}",
                Self::ALL.map(|s| s.as_str()).join(", ")
            ))),
        }
    }
}

/// Rendering quality. Determines the price per image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    /// Standard quality.
    #[default]
    Standard,
    /// HD quality, finer detail.
    Hd,
}

impl ImageQuality {
    /// All qualities.
    pub const ALL: [ImageQuality; 2] = [Self::Standard, Self::Hd];

    /// Returns the quality as the API string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Hd => "hd",
        }
    }
}

impl std::fmt::Display for ImageQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImageQuality {
    type Err = ImageGenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" => Ok(Self::Standard),
            "hd" => Ok(Self::Hd),
            _ => Err(ImageGenError::InvalidRequest(
                "Invalid quality. Must be one of: standard, hd".into(),
            )),
        }
    }
}

/// Rendering style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    /// Hyper-real, dramatic images.
    #[default]
    Vivid,
    /// More natural, less hyper-real images.
    Natural,
}

impl ImageStyle {
    /// All styles, in the order batches use them.
    pub const ALL: [ImageStyle; 2] = [Self::Vivid, Self::Natural];

    /// Returns the style as the API string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vivid => "vivid",
            Self::Natural => "natural",
        }
    }

    /// Human-readable name used in batch labels.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Vivid => "Vivid",
            Self::Natural => "Natural",
        }
    }
}

impl std::fmt::Display for ImageStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImageStyle {
    type Err = ImageGenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "vivid" => Ok(Self::Vivid),
            "natural" => Ok(Self::Natural),
            _ => Err(ImageGenError::InvalidRequest(
                "Invalid style. Must be one of: vivid, natural".into(),
            )),
        }
    }
}

/// A request to generate a single image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The text prompt describing the desired image.
    pub prompt: String,
    /// Output dimensions.
    pub size: ImageSize,
    /// Rendering quality.
    pub quality: ImageQuality,
    /// Rendering style.
    pub style: ImageStyle,
}

impl GenerationRequest {
    /// Creates a new request with default parameters.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: ImageSize::default(),
            quality: ImageQuality::default(),
            style: ImageStyle::default(),
        }
    }

    /// Sets the output size.
    pub fn with_size(mut self, size: ImageSize) -> Self {
        self.size = size;
        self
    }

    /// Sets the quality.
    pub fn with_quality(mut self, quality: ImageQuality) -> Self {
        self.quality = quality;
        self
    }

    /// Sets the style.
    pub fn with_style(mut self, style: ImageStyle) -> Self {
        self.style = style;
        self
    }

    /// Rejects prompts that are empty after trimming.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(ImageGenError::InvalidRequest("Prompt is required".into()));
        }
        Ok(())
    }

    /// Parameters echoed back in the result.
    pub fn parameters(&self) -> GenerationParameters {
        GenerationParameters {
            size: self.size,
            quality: self.quality,
            style: self.style,
            n: 1,
        }
    }
}

/// Parameters a result was generated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub size: ImageSize,
    pub quality: ImageQuality,
    pub style: ImageStyle,
    /// Always 1: DALL-E 3 generates one image per call.
    #[serde(default = "default_n")]
    pub n: u32,
}

fn default_n() -> u32 {
    1
}

/// A generated image as returned by the provider or the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Temporary URL of the generated image.
    pub url: String,
    /// Prompt as submitted.
    pub original_prompt: String,
    /// Prompt as rewritten by the provider.
    #[serde(default)]
    pub revised_prompt: String,
    pub parameters: GenerationParameters,
    /// Price charged for this image, in USD.
    pub cost: Decimal,
    /// Provider creation time.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    /// Relay budget snapshot taken after this image was charged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_status: Option<BudgetStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_size_round_trips_api_strings() {
        for size in ImageSize::ALL {
            assert_eq!(size.as_str().parse::<ImageSize>().unwrap(), size);
        }
        assert!("512x512".parse::<ImageSize>().is_err());
    }

    #[test]
    fn test_quality_and_style_parse() {
        assert_eq!("hd".parse::<ImageQuality>().unwrap(), ImageQuality::Hd);
        assert_eq!("natural".parse::<ImageStyle>().unwrap(), ImageStyle::Natural);
        assert!("ultra".parse::<ImageQuality>().is_err());
        assert!("anime".parse::<ImageStyle>().is_err());
    }

    #[test]
    fn test_size_serializes_as_dimensions() {
        let json = serde_json::to_value(ImageSize::Landscape).unwrap();
        assert_eq!(json, "1792x1024");
    }

    #[test]
    fn test_blank_prompt_is_rejected() {
        assert!(GenerationRequest::new("   ").validate().is_err());
        assert!(GenerationRequest::new("a lighthouse").validate().is_ok());
    }

    #[test]
    fn test_result_deserializes_relay_payload() {
        let json = r#"{
            "url": "https://example.com/img.png",
            "revised_prompt": "A tall lighthouse at dusk",
            "original_prompt": "lighthouse",
            "parameters": {"size": "1024x1792", "quality": "hd", "style": "natural", "n": 1},
            "cost": 0.08,
            "timestamp": 1700000000
        }"#;
        let result: GenerationResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.parameters.size, ImageSize::Portrait);
        assert_eq!(result.cost, dec!(0.08));
        assert!(result.cost_status.is_none());
        assert_eq!(result.timestamp.unwrap().timestamp(), 1_700_000_000);
    }
}
