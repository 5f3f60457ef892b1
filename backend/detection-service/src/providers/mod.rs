//! Vision provider implementations
use async_trait::async_trait;

use crate::models::{DetectionResult, ImageReference};
use crate::DetectionError;

pub mod openai_vision;

pub use openai_vision::OpenAiVisionClient;

/// Capability seam for vision-model detection.
///
/// The orchestrator only depends on this trait; the OpenAI client is the
/// production implementation and tests substitute their own.
#[async_trait]
pub trait VisionDetector: Send + Sync {
    /// Detect household items across a batch of images.
    async fn detect_items(
        &self,
        images: &[ImageReference],
    ) -> Result<DetectionResult, DetectionError>;

    /// Whether a real API credential is configured.
    fn is_configured(&self) -> bool;
}
