use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jobs::ProgressHandle;

pub mod mock;
pub mod openai;

pub use mock::MockGenerator;
pub use openai::OpenAiGenerator;

/// What a submitted job asks for. Stored verbatim as the job payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarouselRequest {
    pub prompt: String,
    pub slide_count: Option<u8>,
    pub tone: Option<String>,
}

impl CarouselRequest {
    pub const DEFAULT_SLIDE_COUNT: u8 = 5;
    pub const MAX_SLIDE_COUNT: u8 = 10;

    pub fn from_payload(payload: &Value) -> Result<Self, GenerateError> {
        serde_json::from_value(payload.clone())
            .map_err(|e| GenerateError::new("BAD_PAYLOAD", e.to_string()))
    }

    /// Requested slide count, defaulted and clamped to the supported range.
    pub fn slide_count(&self) -> u8 {
        self.slide_count
            .unwrap_or(Self::DEFAULT_SLIDE_COUNT)
            .clamp(1, Self::MAX_SLIDE_COUNT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub heading: String,
    pub body: String,
}

/// The generated artifact, persisted as the job result on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarouselDeck {
    pub title: String,
    pub slides: Vec<Slide>,
    pub caption: Option<String>,
}

/// Generation failure with a stable code; the code drives retry
/// classification.
#[derive(Debug)]
pub struct GenerateError {
    pub code: &'static str,
    pub message: String,
}

impl GenerateError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait CarouselGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &CarouselRequest,
        progress: &ProgressHandle,
    ) -> Result<CarouselDeck, GenerateError>;
}
