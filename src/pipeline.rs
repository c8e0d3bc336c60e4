//! The summarization pipeline.
//!
//! A linear state machine: content extraction, then summary generation, then
//! key-point extraction. The run state is moved by value through the stage
//! functions; a stage either hands back an updated state or a tagged error
//! that ends the run. Extraction and summary failures are fatal. Key-point
//! failures are not — that stage degrades to an empty list internally, so
//! its transition always succeeds.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::extract::{ContentExtractor, ExtractError};
use crate::keypoints::KeyPointExtractor;
use crate::llm::{LanguageModel, LlmError};
use crate::summarize::{SummaryGenerator, SummaryType};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("content extraction failed: {0}")]
    Extraction(#[from] ExtractError),
    #[error("summary generation failed: {0}")]
    Generation(#[from] LlmError),
}

/// State threaded through one run. Owned by the run, discarded after it.
#[derive(Debug, Clone)]
struct PipelineState {
    url: String,
    summary_type: SummaryType,
    title: String,
    text: String,
    summary: String,
    key_points: Vec<String>,
}

impl PipelineState {
    fn new(url: &str, summary_type: SummaryType) -> Self {
        Self {
            url: url.to_string(),
            summary_type,
            title: String::new(),
            text: String::new(),
            summary: String::new(),
            key_points: Vec::new(),
        }
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct ArticleDigest {
    pub url: String,
    pub title: String,
    pub text: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub summary_type: SummaryType,
}

impl From<PipelineState> for ArticleDigest {
    fn from(state: PipelineState) -> Self {
        Self {
            url: state.url,
            title: state.title,
            text: state.text,
            summary: state.summary,
            key_points: state.key_points,
            summary_type: state.summary_type,
        }
    }
}

/// Orchestrates one article from URL to digest.
pub struct SummarizationPipeline {
    extractor: ContentExtractor,
    summarizer: SummaryGenerator,
    keypoints: KeyPointExtractor,
}

impl SummarizationPipeline {
    /// Wire the default stages around one shared generation backend.
    pub fn new(extractor: ContentExtractor, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            extractor,
            summarizer: SummaryGenerator::new(model.clone()),
            keypoints: KeyPointExtractor::new(model),
        }
    }

    /// Run the full pipeline. On failure the caller gets one tagged error
    /// and no partial result.
    #[instrument(skip(self), fields(url = %url, summary_type = summary_type.as_str()))]
    pub async fn run(
        &self,
        url: &str,
        summary_type: SummaryType,
    ) -> Result<ArticleDigest, PipelineError> {
        let state = PipelineState::new(url, summary_type);
        let state = self.extract_content(state).await?;
        let state = self.generate_summary(state).await?;
        let state = self.extract_key_points(state).await;
        Ok(state.into())
    }

    async fn extract_content(
        &self,
        mut state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let content = self.extractor.extract(&state.url).await?;
        info!(
            title = %content.title,
            chars = content.text.len(),
            "content extracted"
        );
        state.title = content.title;
        state.text = content.text;
        Ok(state)
    }

    async fn generate_summary(
        &self,
        mut state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let summary = self
            .summarizer
            .generate(&state.title, &state.text, state.summary_type)
            .await?;
        info!(chars = summary.len(), "summary generated");
        state.summary = summary;
        Ok(state)
    }

    /// Always succeeds: the extractor absorbs its own failures.
    async fn extract_key_points(&self, mut state: PipelineState) -> PipelineState {
        state.key_points = self
            .keypoints
            .extract_points(&state.title, &state.text)
            .await;
        info!(count = state.key_points.len(), "key points extracted");
        state
    }
}
