//! # Skimmer
//!
//! A CLI application that turns web articles into stored, searchable digests.
//!
//! ## Features
//!
//! - **Tiered Extraction**: readability-style scoring with a raw-HTML fallback
//! - **LLM Digests**: brief, comprehensive, or detailed summaries plus key points
//! - **Semantic Search**: embeddings in a Chroma vector store, sled for the archive
//! - **Provider Agnostic**: any OpenAI-compatible server, or Anthropic

pub mod chroma;
pub mod config;
pub mod extract;
pub mod index;
pub mod keypoints;
pub mod llm;
pub mod pipeline;
pub mod store;
pub mod summarize;

pub use config::Config;
pub use index::EmbeddingIndex;
pub use pipeline::{ArticleDigest, SummarizationPipeline};
pub use store::ArticleStore;
pub use summarize::SummaryType;
