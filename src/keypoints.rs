//! Key-point extraction.
//!
//! The backend is asked for a JSON array of strings, but generation backends
//! do not reliably honor structured-output instructions, so the reply goes
//! through a lenient list decoder: strict JSON first, then line-splitting
//! heuristics. Key points are an enhancement, not critical path — any failure
//! here degrades to an empty list instead of failing the run.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::LanguageModel;

/// Hard cap on returned key points, regardless of how many the backend emits.
pub const MAX_KEY_POINTS: usize = 7;

const SYSTEM_PROMPT: &str = "You are an expert at extracting key points from articles. \
Extract 3-7 key points from the content. Each point should be:\n\
- A complete, standalone insight\n\
- Clear and concise (1-2 sentences max)\n\
- Covering different aspects of the article\n\n\
Return only the key points as a JSON array of strings.";

/// Strip ```json fences some backends insist on wrapping their output in.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    {
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim();
        }
    }
    trimmed
}

/// Strict tier: the reply is a well-formed JSON array of strings.
fn strict_decode(raw: &str) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_str::<Vec<String>>(strip_code_fences(raw))
}

/// Heuristic tier: split lines, drop empties and bracket lines, strip
/// leading bullet markers and surrounding quotes.
fn heuristic_decode(raw: &str) -> Vec<String> {
    raw.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('[') || line.starts_with(']') {
                return None;
            }
            let mut point = line.trim_start_matches(['-', '•', '*', ' ']).trim();
            if point.starts_with('"') && point.ends_with('"') && point.len() >= 2 {
                point = &point[1..point.len() - 1];
            }
            if point.is_empty() {
                None
            } else {
                Some(point.to_string())
            }
        })
        .collect()
}

/// Lenient list decoder: strict JSON parsing with a deterministic line-based
/// fallback, capped at [`MAX_KEY_POINTS`] on either path.
pub fn decode_point_list(raw: &str) -> Vec<String> {
    let mut points = match strict_decode(raw) {
        Ok(points) => points,
        Err(err) => {
            debug!(error = %err, "reply is not a JSON array, using line heuristics");
            heuristic_decode(raw)
        }
    };
    points.truncate(MAX_KEY_POINTS);
    points
}

/// Requests and decodes key points for a pipeline run.
pub struct KeyPointExtractor {
    model: Arc<dyn LanguageModel>,
}

impl KeyPointExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Extract up to seven key points. Never fails: a backend error is
    /// logged and absorbed into an empty list.
    pub async fn extract_points(&self, title: &str, text: &str) -> Vec<String> {
        let user = format!(
            "Extract key points from this article:\n\nTitle: {title}\n\nContent: {text}"
        );
        match self.model.complete(SYSTEM_PROMPT, &user).await {
            Ok(reply) => decode_point_list(&reply),
            Err(err) => {
                warn!(error = %err, "key-point extraction failed, continuing without");
                Vec::new()
            }
        }
    }
}
