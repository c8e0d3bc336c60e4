//! Skimmer CLI - article summarisation and semantic search
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use skimmer::chroma::ChromaStore;
use skimmer::extract::ContentExtractor;
use skimmer::index::{ArticleMeta, EmbeddingIndex, CONNECT_BACKOFF_BASE};
use skimmer::llm::{Embedder, ModelHandles};
use skimmer::store::{ArticleStore, StoredArticle};
use skimmer::{Config, SummarizationPipeline, SummaryType};

#[derive(Parser)]
#[command(name = "skimmer")]
#[command(author, version, about = "Article summariser with semantic search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise an article by URL and store the digest
    Summarise {
        /// URL to summarise
        url: String,
        /// Summary style: brief, comprehensive, or detailed
        #[arg(long, default_value = "comprehensive")]
        summary_type: String,
        /// Show raw extracted text instead of a digest
        #[arg(long)]
        raw: bool,
        /// Skip indexing the result for semantic search
        #[arg(long)]
        no_index: bool,
    },
    /// Search stored articles by meaning
    Search {
        /// Search query
        query: String,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List all stored articles
    List,
    /// Show one stored article in full
    Show {
        /// Article id, as printed by `list`
        id: u64,
    },
    /// Delete a stored article and its index entry
    Delete {
        /// Article id, as printed by `list`
        id: u64,
    },
    /// Archive and index counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skimmer=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Summarise {
            url,
            summary_type,
            raw,
            no_index,
        } => {
            let summary_type = SummaryType::from_name(&summary_type);
            let extractor =
                ContentExtractor::new(Duration::from_secs(config.extraction.timeout_secs))?;
            println!("Fetching: {}", url);

            if raw {
                let content = extractor.extract(&url).await?;
                println!("\n=== {} ===\n", content.title);
                println!("{}", content.text);
                println!("\n--- Extracted {} characters ---", content.text.len());
                return Ok(());
            }

            let handles = ModelHandles::from_config(&config)?;
            let pipeline = SummarizationPipeline::new(extractor, handles.language.clone());
            let digest = pipeline.run(&url, summary_type).await?;

            let store = ArticleStore::open(&config.storage.path)?;
            let stored = store.save(&digest)?;

            if !no_index {
                let index = connect_index(&config, handles.embedder.clone()).await?;
                let meta = ArticleMeta {
                    title: &stored.title,
                    url: &stored.url,
                    summary_type: stored.summary_type,
                };
                if !index
                    .add_article(stored.id, &digest.text, &stored.summary, meta)
                    .await
                {
                    eprintln!("Warning: article stored but not indexed for search");
                }
            }

            print_article(&stored);
        }
        Commands::Search { query, limit } => {
            let embedder = ModelHandles::embedder_from_config(&config)?;
            let index = connect_index(&config, embedder).await?;
            let limit = limit.unwrap_or(config.index.search_limit);

            let results = index.search(&query, limit).await;
            if results.is_empty() {
                println!("No results found for: {}", query);
            } else {
                println!("Search results for '{}':\n", query);
                for hit in &results {
                    println!("📄 [{}] {} (score {:.3})", hit.article_id, hit.title, hit.score);
                    println!("   {}", hit.url);
                    println!("   {}\n", hit.excerpt);
                }
            }
        }
        Commands::List => {
            let store = ArticleStore::open(&config.storage.path)?;
            let articles = store.list_all()?;

            if articles.is_empty() {
                println!("No stored articles found.");
            } else {
                println!("Stored articles ({}):\n", articles.len());
                for article in articles {
                    println!(
                        "📄 [{}] {} ({})",
                        article.id,
                        article.title,
                        article.created_at.format("%Y-%m-%d %H:%M")
                    );
                    println!("   {}", article.url);
                    println!("   {}\n", preview(&article.summary));
                }
            }
        }
        Commands::Show { id } => {
            let store = ArticleStore::open(&config.storage.path)?;
            match store.get_by_id(id)? {
                Some(article) => print_article(&article),
                None => println!("No article with id {}", id),
            }
        }
        Commands::Delete { id } => {
            let store = ArticleStore::open(&config.storage.path)?;
            match store.delete_by_id(id)? {
                Some(article) => {
                    let embedder = ModelHandles::embedder_from_config(&config)?;
                    let index = connect_index(&config, embedder).await?;
                    if !index.delete_article(article.id).await {
                        eprintln!(
                            "Warning: article removed from archive but not from the search index"
                        );
                    }
                    println!("Deleted: {} ({})", article.title, article.url);
                }
                None => println!("No article with id {}", id),
            }
        }
        Commands::Stats => {
            let store = ArticleStore::open(&config.storage.path)?;
            println!("Stored articles:  {}", store.count());

            let embedder = ModelHandles::embedder_from_config(&config)?;
            let index = connect_index(&config, embedder).await?;
            if index.is_enabled() {
                println!("Indexed articles: {}", index.count().await);
            } else {
                println!("Indexed articles: unavailable (vector store unreachable)");
            }
        }
    }

    Ok(())
}

/// Stand up the embedding index against the configured vector store. The
/// index itself absorbs connection failures and comes back disabled.
async fn connect_index(
    config: &Config,
    embedder: Arc<dyn Embedder>,
) -> anyhow::Result<EmbeddingIndex> {
    let store = ChromaStore::new(
        &config.index.host,
        config.index.port,
        &config.index.collection,
    )?;
    Ok(EmbeddingIndex::connect_with_backoff(
        embedder,
        Arc::new(store),
        config.index.similarity_threshold,
        CONNECT_BACKOFF_BASE,
    )
    .await)
}

fn print_article(article: &StoredArticle) {
    println!("\n=== {} ===\n", article.title);
    println!("📝 Summary ({}):", article.summary_type.as_str());
    println!("  {}\n", article.summary);

    if !article.key_points.is_empty() {
        println!("📌 Key Points:");
        for point in &article.key_points {
            println!("  • {}", point);
        }
        println!();
    }

    println!(
        "#{} · {} · {}",
        article.id,
        article.url,
        article.created_at.format("%Y-%m-%d %H:%M")
    );
}

/// First line of a summary, clipped for list output.
fn preview(summary: &str) -> String {
    let line = summary.lines().next().unwrap_or_default();
    if line.chars().count() <= 100 {
        line.to_string()
    } else {
        let mut clipped: String = line.chars().take(100).collect();
        clipped.push_str("...");
        clipped
    }
}
