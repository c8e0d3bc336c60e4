//! Article content extraction.
//!
//! An ordered chain of extraction tiers shares one HTTP client: a
//! readability-style tier that scores content containers by paragraph mass,
//! then a raw-fetch tier that works through known content selectors. Each
//! tier is tried only when the previous one failed or came back empty, and
//! the first usable text wins. Post-conditions (length cap, quality gate)
//! apply to whichever tier produced the text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

/// Browser-like User-Agent; many sites reject unidentified clients outright.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default timeout for article fetches, applied to every tier.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Content is capped before it reaches any generation backend.
const MAX_TEXT_CHARS: usize = 100_000;

/// Anything shorter than this is treated as a failed extraction rather than
/// an article; it is not worth a generation call.
const MIN_TEXT_CHARS: usize = 100;

const TRUNCATION_MARKER: &str = "...";

/// Elements that carry navigation or machinery rather than article text.
const NOISE_SELECTORS: [&str; 5] = ["script", "style", "nav", "footer", "header"];

/// Content-area selectors tried in priority order by the raw tier.
const CONTENT_SELECTORS: [&str; 6] = [
    "article",
    "main",
    ".content",
    ".post-content",
    ".entry-content",
    ".article-body",
];

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to fetch URL: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("no usable text found at {0}")]
    NoContent(String),
    #[error("article text too short ({chars} chars) after extraction")]
    TooShort { chars: usize },
}

/// What a single tier managed to pull out of the page. Empty text means the
/// tier has nothing and the chain should move on.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub title: Option<String>,
    pub text: String,
}

/// Final normalized extraction result.
#[derive(Debug, Clone)]
pub struct ArticleContent {
    pub title: String,
    pub text: String,
}

/// One strategy for pulling readable text out of a URL.
#[async_trait]
pub trait ExtractTier: Send + Sync {
    async fn try_extract(&self, url: &str) -> Result<Extracted, ExtractError>;

    /// Tier name, for logging.
    fn name(&self) -> &'static str;
}

fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
}

async fn fetch_html(client: &Client, url: &str) -> Result<String, ExtractError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ExtractError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.text().await?)
}

/// Collapse runs of whitespace (including newlines) into single spaces.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Serialize the document with noise elements removed, so that whole-page
/// text extraction does not drown in scripts and navigation.
fn strip_noise(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut cleaned = document.root_element().html();
    for selector_str in NOISE_SELECTORS {
        let selector = Selector::parse(selector_str).unwrap();
        for element in document.select(&selector) {
            cleaned = cleaned.replace(&element.html(), "");
        }
    }
    cleaned
}

/// Prefer the Open Graph title over `<title>`; both are frequently missing.
fn resolve_title(document: &Html) -> Option<String> {
    let og_selector = Selector::parse(r#"meta[property="og:title"]"#).unwrap();
    if let Some(element) = document.select(&og_selector).next() {
        if let Some(content) = element.value().attr("content") {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    let title_selector = Selector::parse("title").unwrap();
    if let Some(element) = document.select(&title_selector).next() {
        let title: String = element.text().collect();
        let trimmed = title.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    None
}

/// Readability-style tier: fetches the page and picks the container with the
/// highest paragraph mass. Fast and precise on news-like pages, empty-handed
/// on pages built from markup it does not recognize.
pub struct ReadabilityTier {
    client: Client,
}

impl ReadabilityTier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Score candidate containers by the total length of their paragraph
    /// text; ties go to the later (tighter) container.
    fn best_container_text(document: &Html) -> String {
        let candidate_selector = Selector::parse("article, main, section, div").unwrap();
        let p_selector = Selector::parse("p").unwrap();

        let mut best_score = 0usize;
        let mut best_text = String::new();

        for container in document.select(&candidate_selector) {
            let mut score = 0usize;
            let mut paragraphs: Vec<String> = Vec::new();
            for p in container.select(&p_selector) {
                let text = collapse_whitespace(&p.text().collect::<Vec<_>>().join(" "));
                if text.len() > 20 {
                    score += text.len();
                    paragraphs.push(text);
                }
            }
            if score >= best_score && score > 0 {
                best_score = score;
                best_text = paragraphs.join(" ");
            }
        }

        best_text
    }
}

#[async_trait]
impl ExtractTier for ReadabilityTier {
    async fn try_extract(&self, url: &str) -> Result<Extracted, ExtractError> {
        let html = fetch_html(&self.client, url).await?;
        let document = Html::parse_document(&strip_noise(&html));
        Ok(Extracted {
            title: resolve_title(&document),
            text: Self::best_container_text(&document),
        })
    }

    fn name(&self) -> &'static str {
        "readability"
    }
}

/// Raw-fetch tier: strips noise, then walks the content selectors in priority
/// order, falling back to all paragraphs and finally to whole-page text.
pub struct RawHtmlTier {
    client: Client,
}

impl RawHtmlTier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn extract_text(document: &Html) -> String {
        for selector_str in CONTENT_SELECTORS {
            let selector = Selector::parse(selector_str).unwrap();
            if let Some(element) = document.select(&selector).next() {
                let text = collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "));
                if !text.is_empty() {
                    return text;
                }
            }
        }

        // No recognized content area: join every paragraph on the page.
        let p_selector = Selector::parse("p").unwrap();
        let paragraphs: Vec<String> = document
            .select(&p_selector)
            .map(|p| collapse_whitespace(&p.text().collect::<Vec<_>>().join(" ")))
            .filter(|text| !text.is_empty())
            .collect();
        if !paragraphs.is_empty() {
            return paragraphs.join(" ");
        }

        // Last resort: whole-page text.
        collapse_whitespace(&document.root_element().text().collect::<Vec<_>>().join(" "))
    }
}

#[async_trait]
impl ExtractTier for RawHtmlTier {
    async fn try_extract(&self, url: &str) -> Result<Extracted, ExtractError> {
        let html = fetch_html(&self.client, url).await?;
        let document = Html::parse_document(&strip_noise(&html));
        Ok(Extracted {
            title: resolve_title(&document),
            text: Self::extract_text(&document),
        })
    }

    fn name(&self) -> &'static str {
        "raw-html"
    }
}

/// The full extraction chain with post-conditions applied.
pub struct ContentExtractor {
    tiers: Vec<Box<dyn ExtractTier>>,
}

impl ContentExtractor {
    /// Build the default two-tier chain sharing one HTTP client.
    pub fn new(timeout: Duration) -> Result<Self, ExtractError> {
        let client = build_client(timeout)?;
        Ok(Self::with_tiers(vec![
            Box::new(ReadabilityTier::new(client.clone())),
            Box::new(RawHtmlTier::new(client)),
        ]))
    }

    /// Build a chain from explicit tiers; adding a tier is a one-line change.
    pub fn with_tiers(tiers: Vec<Box<dyn ExtractTier>>) -> Self {
        Self { tiers }
    }

    /// Run the chain and normalize the winner. No retries happen here; a
    /// caller that wants another attempt re-runs the whole pipeline.
    pub async fn extract(&self, url: &str) -> Result<ArticleContent, ExtractError> {
        let mut last_error: Option<ExtractError> = None;

        for tier in &self.tiers {
            match tier.try_extract(url).await {
                Ok(extracted) if !extracted.text.trim().is_empty() => {
                    debug!(tier = tier.name(), chars = extracted.text.len(), "tier produced text");
                    return Self::finalize(extracted);
                }
                Ok(_) => {
                    debug!(tier = tier.name(), "tier came back empty, trying next");
                }
                Err(err) => {
                    warn!(tier = tier.name(), error = %err, "tier failed, trying next");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ExtractError::NoContent(url.to_string())))
    }

    /// Apply title default, length cap, and the minimum-length quality gate.
    fn finalize(extracted: Extracted) -> Result<ArticleContent, ExtractError> {
        let mut text = extracted.text.trim().to_string();
        if text.chars().count() > MAX_TEXT_CHARS {
            text = text.chars().take(MAX_TEXT_CHARS).collect();
            text.push_str(TRUNCATION_MARKER);
        }

        let chars = text.chars().count();
        if chars < MIN_TEXT_CHARS {
            return Err(ExtractError::TooShort { chars });
        }

        let title = extracted
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled Article".to_string());

        Ok(ArticleContent { title, text })
    }
}
