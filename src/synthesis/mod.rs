//! The synthesis collaborator.
//!
//! Synthesis is a black box: up to two reference images plus free-text
//! instructions go in, one image (or a typed failure) comes out. The
//! orchestrator only sees the [`Synthesizer`] trait.

pub mod chain;
pub mod command;
pub mod prompts;

use async_trait::async_trait;

use crate::asset::{AspectRatio, ImageData, ImageSize};
use crate::errors::SynthesisError;
use crate::phase::Stage;

pub use chain::{default_chain, ChainError, Directive, InstructionChain};
pub use command::CommandSynthesizer;
pub use prompts::{build_instructions, BackgroundStyle, DEFAULT_EXTRACTION_PROMPT};

/// Maximum number of reference images per request.
pub const MAX_REFERENCES: usize = 2;

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisParams {
    pub model: String,
    pub aspect_ratio: AspectRatio,
    /// Only set for models that honour an output size
    pub size_hint: Option<ImageSize>,
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub stage: Stage,
    /// Ordered: the locked base first, then the optional current-gear state
    pub references: Vec<ImageData>,
    pub instructions: String,
    pub params: SynthesisParams,
}

impl SynthesisRequest {
    pub fn new(
        stage: Stage,
        references: Vec<ImageData>,
        instructions: String,
        params: SynthesisParams,
    ) -> Result<Self, SynthesisError> {
        if references.is_empty() || references.len() > MAX_REFERENCES {
            return Err(SynthesisError::ReferenceCount(references.len()));
        }
        Ok(Self {
            stage,
            references,
            instructions,
            params,
        })
    }
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Produce one composed image. No retries, no timeout.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<ImageData, SynthesisError>;
}

/// Everything the orchestrator needs to build a request, as configured.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisSettings {
    pub model: String,
    pub aspect_ratio: AspectRatio,
    pub size: ImageSize,
    pub background: BackgroundStyle,
    pub chain: InstructionChain,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            aspect_ratio: AspectRatio::default(),
            size: ImageSize::default(),
            background: BackgroundStyle::default(),
            chain: default_chain(),
        }
    }
}

/// Whether `model` honours an explicit output size.
pub fn model_accepts_size(model: &str) -> bool {
    model.contains("-pro-")
}

impl SynthesisSettings {
    pub fn params(&self) -> SynthesisParams {
        SynthesisParams {
            model: self.model.clone(),
            aspect_ratio: self.aspect_ratio,
            size_hint: model_accepts_size(&self.model).then_some(self.size),
        }
    }

    pub fn instructions(&self, stage: Stage, prompt: &str, has_gear_state: bool) -> String {
        build_instructions(&self.chain, stage, prompt, self.background, has_gear_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SynthesisParams {
        SynthesisSettings::default().params()
    }

    #[test]
    fn test_request_requires_one_or_two_references() {
        let img = ImageData::png(vec![1]);
        assert!(matches!(
            SynthesisRequest::new(Stage::Gear, vec![], String::new(), params()),
            Err(SynthesisError::ReferenceCount(0))
        ));
        assert!(SynthesisRequest::new(Stage::Gear, vec![img.clone()], String::new(), params()).is_ok());
        assert!(
            SynthesisRequest::new(Stage::Gear, vec![img.clone(), img.clone()], String::new(), params())
                .is_ok()
        );
        assert!(matches!(
            SynthesisRequest::new(Stage::Gear, vec![img.clone(), img.clone(), img], String::new(), params()),
            Err(SynthesisError::ReferenceCount(3))
        ));
    }

    #[test]
    fn test_size_hint_only_for_pro_models() {
        let mut settings = SynthesisSettings::default();
        assert_eq!(settings.params().size_hint, None);
        settings.model = "gemini-3-pro-image-preview".into();
        settings.size = ImageSize::FourK;
        assert_eq!(settings.params().size_hint, Some(ImageSize::FourK));
    }

    #[test]
    fn test_settings_instructions_use_chain() {
        let settings = SynthesisSettings::default();
        let text = settings.instructions(Stage::Extraction, "", false);
        assert!(text.starts_with("ROLE: Professional JRPG Pixel Artist"));
        assert!(text.contains(DEFAULT_EXTRACTION_PROMPT));
    }
}
