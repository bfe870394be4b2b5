//! # dagsorden CLI (`dgs`)
//!
//! The `dgs` binary is the operational interface for the dagsorden search
//! engine: database initialization, feed synchronization, hybrid search,
//! document retrieval, embedding backfill, enrichment, index rebuild, and
//! statistics.
//!
//! ## Usage
//!
//! ```bash
//! dgs --config ./config/dagsorden.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dgs init` | Create the SQLite database and run schema migrations |
//! | `dgs sync` | Pull the publication change feed and index new versions |
//! | `dgs search "<query>"` | Hybrid search with facet filters |
//! | `dgs get <id>` | Retrieve a document version with chunks and facets |
//! | `dgs case <number>` | Case history across meetings, newest first |
//! | `dgs embed` | Backfill missing or stale embeddings |
//! | `dgs enrich` | Re-run enrichment over all stored chunks |
//! | `dgs reindex` | Rebuild both indexes from the document store |
//! | `dgs stats` | Store and index health overview |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use dagsorden::config::{load_config, Config};
use dagsorden::db;
use dagsorden::embedding::create_provider;
use dagsorden::enrich::EnrichmentEngine;
use dagsorden::get::{case_history, get_document};
use dagsorden::migrate;
use dagsorden::models::{SearchFilter, SourceType};
use dagsorden::pipeline::IngestionPipeline;
use dagsorden::query::{QueryEngine, QueryRequest};
use dagsorden::reindex;
use dagsorden::source::{HttpChangeFeed, PlainTextExtractor};
use dagsorden::stats::run_stats;
use dagsorden::store::DocumentStore;

/// dagsorden — hybrid search over municipal council meeting records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with the store path, feed URL, and retrieval settings.
#[derive(Parser)]
#[command(
    name = "dgs",
    about = "dagsorden — hybrid search over municipal council meeting records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dagsorden.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Pull the publication change feed and index the changes.
    ///
    /// Fetches new document versions, stores them, chunks and embeds
    /// them, updates both indexes, and runs enrichment. Incremental by
    /// default via the persisted feed cursor.
    Sync {
        /// Ignore the feed cursor — re-pull the feed from the beginning.
        #[arg(long)]
        full: bool,

        /// Maximum number of feed items to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Search indexed chunks with hybrid ranking.
    Search {
        /// The search query string.
        query: String,

        /// Filter by committee (repeatable).
        #[arg(long = "committee")]
        committees: Vec<String>,

        /// Filter by record type: agenda, minutes, or attachment.
        #[arg(long = "type")]
        source_type: Option<String>,

        /// Filter by case number (repeatable).
        #[arg(long = "case")]
        case_numbers: Vec<String>,

        /// Only chunks published on or after this date (YYYY-MM-DD).
        #[arg(long)]
        after: Option<String>,

        /// Only chunks published on or before this date (YYYY-MM-DD).
        #[arg(long)]
        before: Option<String>,

        /// Require an authoritative enrichment facet, as `facet=value`
        /// (repeatable), e.g. `enrich:decision=approved`.
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Include chunks of superseded document versions.
        #[arg(long)]
        include_superseded: bool,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Pagination offset into the ranking.
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Fusion weight override: 1.0 = pure lexical, 0.0 = pure vector.
        #[arg(long)]
        alpha: Option<f64>,
    },

    /// Retrieve a document version with its chunks and facets.
    Get {
        /// Document id.
        id: String,

        /// Specific version; defaults to the open version.
        #[arg(long)]
        version: Option<u64>,
    },

    /// Show all open documents for a case, newest first.
    Case {
        /// Case number, e.g. SAG-2024-12345.
        case_number: String,
    },

    /// Backfill missing or stale embeddings and update the vector index.
    Embed,

    /// Re-run enrichment over all stored chunks.
    Enrich,

    /// Rebuild both indexes from the document store.
    ///
    /// The new generations are built while queries continue against the
    /// old ones, then swapped in atomically.
    Reindex {
        /// Only check index/store consistency; exit non-zero on mismatch.
        #[arg(long)]
        verify: bool,
    },

    /// Print store and index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Sync { full, limit } => run_sync(&config, full, limit).await,
        Commands::Search {
            query,
            committees,
            source_type,
            case_numbers,
            after,
            before,
            tags,
            include_superseded,
            limit,
            offset,
            alpha,
        } => {
            let filter = build_filter(
                committees,
                source_type,
                case_numbers,
                after,
                before,
                tags,
                include_superseded,
            )?;
            run_search(&config, query, filter, limit, offset, alpha).await
        }
        Commands::Get { id, version } => run_get(&config, &id, version).await,
        Commands::Case { case_number } => run_case(&config, &case_number).await,
        Commands::Embed => run_embed(&config).await,
        Commands::Enrich => run_enrich(&config).await,
        Commands::Reindex { verify } => run_reindex(&config, verify).await,
        Commands::Stats => run_stats_cmd(&config).await,
    }
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    std::fs::create_dir_all(&config.store.index_dir)?;
    pool.close().await;
    println!("initialized {}", config.store.path.display());
    Ok(())
}

async fn build_pipeline(config: &Config) -> Result<(DocumentStore, IngestionPipeline)> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool);

    let (lexical, vector, seq) = reindex::load_or_rebuild(config, &store).await?;
    let embedder = create_provider(&config.embedding)?;
    let feed = Arc::new(HttpChangeFeed::new(&config.feed)?);
    let extractor = Arc::new(PlainTextExtractor::new(config.feed.timeout_secs)?);
    let enrichment = Arc::new(EnrichmentEngine::with_builtins(
        config.enrichment.confidence_threshold,
    ));

    let pipeline = IngestionPipeline::new(
        store.clone(),
        lexical,
        vector,
        embedder,
        feed,
        extractor,
        enrichment,
        config.ingest.clone(),
        config.chunking.clone(),
        config.enrichment.clone(),
        config.feed.page_size,
        config.store.index_dir.clone(),
        seq,
    );

    Ok((store, pipeline))
}

async fn run_sync(config: &Config, full: bool, limit: Option<usize>) -> Result<()> {
    let (store, pipeline) = build_pipeline(config).await?;

    let report = pipeline.run_sync(limit, full).await?;

    println!("sync");
    println!("  fetched:            {}", report.fetched);
    println!("  stored versions:    {}", report.stored);
    println!("  unchanged:          {}", report.unchanged);
    println!("  version conflicts:  {}", report.conflicts);
    println!("  fetch failures:     {}", report.fetch_failures);
    println!("  indexed:            {}", report.indexed);
    println!("  embedding failures: {}", report.embed_failures);
    println!("  index cursor:       {}", report.index_seq);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

async fn run_search(
    config: &Config,
    query: String,
    filter: SearchFilter,
    limit: Option<usize>,
    offset: usize,
    alpha: Option<f64>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool);
    let (lexical, vector, _seq) = reindex::load_or_rebuild(config, &store).await?;
    let embedder = create_provider(&config.embedding)?;

    let engine = QueryEngine::new(
        store.clone(),
        lexical,
        vector,
        embedder,
        config.retrieval.clone(),
        config.vector.ef_search,
    );

    let response = engine
        .query(QueryRequest {
            text: query,
            filter,
            k: limit.unwrap_or(0),
            offset,
            alpha,
        })
        .await?;

    if response.results.is_empty() {
        println!("No results.");
    }

    for (i, result) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} / {}{}",
            offset + i + 1,
            result.score,
            result.provenance.committee,
            result.provenance.case_number,
            if result.superseded { "  (superseded)" } else { "" }
        );
        println!(
            "    doc: {} v{}  date: {}",
            result.provenance.document_id, result.provenance.version, result.provenance.published_at
        );
        println!("    snippet: \"{}\"", result.snippet);
        println!("    chunk: {}", result.chunk_id);
        println!();
    }

    if response.partial {
        println!(
            "note: partial response — degraded signals: {}",
            response.degraded_signals.join(", ")
        );
    }

    store.pool().close().await;
    Ok(())
}

async fn run_get(config: &Config, id: &str, version: Option<u64>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool);

    let doc = get_document(&store, id, version).await?;
    println!("{}", serde_json::to_string_pretty(&doc)?);

    store.pool().close().await;
    Ok(())
}

async fn run_case(config: &Config, case_number: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool);

    let entries = case_history(&store, case_number).await?;
    if entries.is_empty() {
        println!("No documents for case {case_number}.");
    }
    for entry in entries {
        println!(
            "{}  {:<10} {:<28} {} (v{})",
            entry.published_at, entry.source_type, entry.committee, entry.document_id, entry.version
        );
    }

    store.pool().close().await;
    Ok(())
}

async fn run_embed(config: &Config) -> Result<()> {
    let (store, pipeline) = build_pipeline(config).await?;

    let (embedded, failed) = pipeline.embed_pending().await?;
    println!("embed");
    println!("  embedded: {}", embedded);
    println!("  failed:   {}", failed);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

async fn run_enrich(config: &Config) -> Result<()> {
    let (store, pipeline) = build_pipeline(config).await?;

    let enriched = pipeline.enrich_all().await?;
    println!("enrich");
    println!("  chunks enriched: {}", enriched);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

async fn run_reindex(config: &Config, verify: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool);

    if verify {
        let (lexical, vector, _seq) = reindex::load_or_rebuild(config, &store).await?;
        reindex::verify(&store, &lexical, &vector).await?;
        println!("indexes consistent with store");
    } else {
        let (lexical, vector) = reindex::build_indexes(config)?;
        let seq = reindex::rebuild(&store, &lexical, &vector).await?;

        std::fs::create_dir_all(&config.store.index_dir)?;
        lexical.save(&config.store.index_dir.join("lexical.idx"), seq)?;
        vector.save(&config.store.index_dir.join("vector.idx"), seq)?;

        println!("rebuilt indexes through cursor {seq}");
        println!("  lexical: {} chunks", lexical.len());
        println!("  vector:  {} embeddings", vector.len());
    }

    store.pool().close().await;
    Ok(())
}

async fn run_stats_cmd(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = DocumentStore::new(pool);
    let (lexical, vector, _seq) = reindex::load_or_rebuild(config, &store).await?;

    run_stats(config, &store, &lexical, &vector).await?;

    store.pool().close().await;
    Ok(())
}

fn build_filter(
    committees: Vec<String>,
    source_type: Option<String>,
    case_numbers: Vec<String>,
    after: Option<String>,
    before: Option<String>,
    tags: Vec<String>,
    include_superseded: bool,
) -> Result<SearchFilter> {
    let source_types = match source_type {
        Some(value) => vec![SourceType::parse(&value)
            .with_context(|| format!("invalid --type value: {value}"))?],
        None => Vec::new(),
    };

    let published_after = after.map(|s| parse_date(&s, false)).transpose()?;
    let published_before = before.map(|s| parse_date(&s, true)).transpose()?;

    let tags = tags
        .into_iter()
        .map(|raw| {
            raw.split_once('=')
                .map(|(facet, value)| (facet.to_string(), value.to_string()))
                .with_context(|| format!("invalid --tag value (expected facet=value): {raw}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SearchFilter {
        committees,
        source_types,
        case_numbers,
        published_after,
        published_before,
        tags,
        include_superseded,
    })
}

fn parse_date(s: &str, end_of_day: bool) -> Result<i64> {
    let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date (expected YYYY-MM-DD): {s}"))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time
        .expect("valid wall-clock time")
        .and_utc()
        .timestamp())
}
