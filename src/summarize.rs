//! Summary generation.
//!
//! A fixed instruction template per summary type, one generation request per
//! article. The backend's reply is taken as plain prose.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::llm::{LanguageModel, LlmError};

/// How thorough the generated summary should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    Brief,
    Comprehensive,
    Detailed,
}

/// Unrecognized names deserialize as comprehensive rather than erroring,
/// matching [`SummaryType::from_name`].
impl<'de> Deserialize<'de> for SummaryType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(SummaryType::from_name(&name))
    }
}

impl SummaryType {
    /// Lenient name lookup; anything unrecognized means comprehensive.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "brief" => Self::Brief,
            "detailed" => Self::Detailed,
            _ => Self::Comprehensive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brief => "brief",
            Self::Comprehensive => "comprehensive",
            Self::Detailed => "detailed",
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Self::Brief => "Provide a brief 2-3 sentence summary of the main points.",
            Self::Comprehensive => {
                "Provide a comprehensive summary that covers all major points and key insights."
            }
            Self::Detailed => "Provide a detailed summary with in-depth analysis and context.",
        }
    }
}

impl Default for SummaryType {
    fn default() -> Self {
        Self::Comprehensive
    }
}

fn system_prompt(summary_type: SummaryType) -> String {
    format!(
        "You are an expert content summarizer. {}\n\n\
         Guidelines:\n\
         - Focus on the most important information\n\
         - Maintain the original tone and context\n\
         - Be clear and concise\n\
         - Ensure factual accuracy",
        summary_type.instruction()
    )
}

fn user_prompt(title: &str, text: &str) -> String {
    format!("Please summarize the following article:\n\nTitle: {title}\n\nContent: {text}")
}

/// Issues the single summary request for a pipeline run.
pub struct SummaryGenerator {
    model: Arc<dyn LanguageModel>,
}

impl SummaryGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn generate(
        &self,
        title: &str,
        text: &str,
        summary_type: SummaryType,
    ) -> Result<String, LlmError> {
        let summary = self
            .model
            .complete(&system_prompt(summary_type), &user_prompt(title, text))
            .await?;
        Ok(summary.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn templates_differ_per_type() {
        let brief = system_prompt(SummaryType::Brief);
        let comprehensive = system_prompt(SummaryType::Comprehensive);
        let detailed = system_prompt(SummaryType::Detailed);
        assert_ne!(brief, comprehensive);
        assert_ne!(comprehensive, detailed);
        assert_ne!(brief, detailed);
        assert!(brief.contains("2-3 sentence"));
        assert!(detailed.contains("in-depth"));
    }

    #[test]
    fn unknown_names_mean_comprehensive() {
        assert_eq!(SummaryType::from_name("brief"), SummaryType::Brief);
        assert_eq!(SummaryType::from_name("Detailed"), SummaryType::Detailed);
        assert_eq!(SummaryType::from_name("exhaustive"), SummaryType::Comprehensive);
        assert_eq!(SummaryType::from_name(""), SummaryType::Comprehensive);
    }

    #[test]
    fn summary_type_survives_serde_with_unknown_fallback() {
        let t: SummaryType = serde_json::from_str("\"brief\"").unwrap();
        assert_eq!(t, SummaryType::Brief);
        let t: SummaryType = serde_json::from_str("\"whatever\"").unwrap();
        assert_eq!(t, SummaryType::Comprehensive);
    }

    struct RecordingModel {
        seen: Mutex<Vec<(String, String)>>,
        reply: String,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
            self.seen
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            Ok(self.reply.clone())
        }

        fn model_id(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn generate_sends_template_and_article() {
        let model = Arc::new(RecordingModel {
            seen: Mutex::new(Vec::new()),
            reply: "  the summary  ".to_string(),
        });
        let generator = SummaryGenerator::new(model.clone());

        let summary = generator
            .generate("A Title", "Body text", SummaryType::Brief)
            .await
            .unwrap();
        assert_eq!(summary, "the summary");

        let seen = model.seen.lock().unwrap();
        let (system, user) = &seen[0];
        assert!(system.contains("2-3 sentence"));
        assert!(user.contains("Title: A Title"));
        assert!(user.contains("Content: Body text"));
    }
}
