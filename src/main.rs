//! # CodeAsk CLI (`codeask`)
//!
//! The `codeask` binary is the interface to the question-answering engine:
//! index a source tree, run raw hybrid retrieval, ask one-shot or
//! interactive role-conditioned questions, and locate page elements from
//! free-text descriptions.
//!
//! ## Usage
//!
//! ```bash
//! codeask --config ./config/codeask.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `codeask ingest` | Build (or rebuild) the index from the source tree |
//! | `codeask search "<query>"` | Hybrid retrieval with per-channel scores |
//! | `codeask ask "<question>"` | One-shot role-conditioned answer |
//! | `codeask chat` | Interactive conversational session |
//! | `codeask locate <url> "<descriptor>"` | Fuzzy-match a DOM element |
//! | `codeask elements <url>` | List every element on a page |

use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::path::PathBuf;

use codeask::config;
use codeask::context::AppContext;
use codeask::retrieve::RetrievalOptions;
use codeask::session::{ExternalContext, Role};
use codeask::trace::read_trace_excerpt;

/// CodeAsk CLI — question answering over a source tree.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/codeask.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "codeask",
    about = "CodeAsk — hybrid-retrieval question answering over a source tree",
    version,
    long_about = "CodeAsk ingests a codebase into a single-file index combining embeddings \
    with lexical term statistics, answers questions through fused vector + lexical retrieval, \
    and conditions its answers on a user role (developer, tester, user)."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/codeask.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Build the index from the configured source tree.
    ///
    /// Scans the tree, chunks and embeds every ingestible file, and writes
    /// a fresh index that atomically replaces the previous one. A failed
    /// run leaves the previous index untouched.
    Ingest {
        /// Override the source root from config.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Run hybrid retrieval and print ranked chunks with scores.
    Search {
        /// The query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Vector channel weight in [0, 1].
        #[arg(long)]
        vector_weight: Option<f64>,

        /// Lexical channel weight in [0, 1].
        #[arg(long)]
        lexical_weight: Option<f64>,
    },

    /// Ask a single question and print the answer.
    Ask {
        /// The question.
        question: String,

        /// Answering persona: developer, tester, or user.
        #[arg(long, default_value = "developer")]
        role: String,

        /// Also print the retrieved chunks and their scores.
        #[arg(long)]
        debug: bool,

        /// Page URL whose DOM should be added as context.
        #[arg(long)]
        page_url: Option<String>,

        /// Element descriptor to locate on the page (requires --page-url).
        #[arg(long, requires = "page_url")]
        element: Option<String>,

        /// JSON trace log whose tail should be added as context.
        #[arg(long)]
        trace_log: Option<PathBuf>,
    },

    /// Start an interactive conversational session.
    ///
    /// Reads questions from stdin until EOF or an empty line. History is
    /// kept across turns up to the configured cap.
    Chat {
        /// Answering persona: developer, tester, or user.
        #[arg(long, default_value = "developer")]
        role: String,
    },

    /// Locate a page element from a free-text description.
    Locate {
        /// Page URL to fetch.
        url: String,

        /// Free-text element description, e.g. "submit order button".
        descriptor: String,
    },

    /// List every element on a page with tag, id, class, and path.
    Elements {
        /// Page URL to fetch.
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("codeask=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { root } => {
            if let Some(root) = root {
                cfg.ingest.root = root;
            }
            let ctx = AppContext::new(cfg)?;
            let report = ctx.ingest().await?;
            println!(
                "Indexed {} documents into {} chunks.",
                report.document_count, report.chunk_count
            );
            for err in &report.errors {
                println!("  skipped: {}", err);
            }
        }
        Commands::Search {
            query,
            limit,
            vector_weight,
            lexical_weight,
        } => {
            let ctx = AppContext::new(cfg)?;
            let mut opts = ctx.retrieval_options();
            if let Some(limit) = limit {
                opts.final_limit = limit;
            }
            if let Some(w) = vector_weight {
                opts.vector_weight = w;
            }
            if let Some(w) = lexical_weight {
                opts.lexical_weight = w;
            }
            run_search(&ctx, &query, &opts).await?;
        }
        Commands::Ask {
            question,
            role,
            debug,
            page_url,
            element,
            trace_log,
        } => {
            let ctx = AppContext::new(cfg)?;
            run_ask(&ctx, &question, &role, debug, page_url, element, trace_log).await?;
        }
        Commands::Chat { role } => {
            let ctx = AppContext::new(cfg)?;
            run_chat(&ctx, &role).await?;
        }
        Commands::Locate { url, descriptor } => {
            let ctx = AppContext::new(cfg)?;
            let response = ctx.locate(&url, &descriptor).await;
            if let Some(message) = &response.message {
                println!("{}", message);
            }
            for (i, m) in response.matches.iter().enumerate() {
                println!("{}. <{}> {:.2}% match", i + 1, m.tag, m.confidence);
                if let Some(id) = &m.id {
                    println!("    id: {}", id);
                }
                if let Some(class) = &m.class {
                    println!("    class: {}", class);
                }
                if !m.text.is_empty() {
                    println!("    text: {}", m.text);
                }
                println!("    path: {}", m.path);
            }
        }
        Commands::Elements { url } => {
            let ctx = AppContext::new(cfg)?;
            match ctx.enumerate_elements(&url).await {
                Ok(elements) => {
                    for el in elements {
                        let id = el.id.map(|i| format!(" id={}", i)).unwrap_or_default();
                        let class = el.class.map(|c| format!(" class={}", c)).unwrap_or_default();
                        println!("<{}>{}{}  {}", el.tag, id, class, el.path);
                    }
                }
                Err(message) => println!("{}", message),
            }
        }
    }

    Ok(())
}

async fn run_search(
    ctx: &AppContext,
    query: &str,
    opts: &RetrievalOptions,
) -> anyhow::Result<()> {
    let store = ctx.open_index().await?;
    let results = ctx.retrieve(&store, query, opts).await?;

    if results.is_empty() {
        println!("No results.");
    }
    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. {}#{}  (fused {:.4} | vector {:.4} | lexical {:.4})",
            i + 1,
            r.document_path,
            r.chunk_index,
            r.fused_score,
            r.vector_score,
            r.lexical_score
        );
        println!("    {}", snippet(&r.text, 160));
    }
    store.close().await;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_ask(
    ctx: &AppContext,
    question: &str,
    role: &str,
    debug: bool,
    page_url: Option<String>,
    element: Option<String>,
    trace_log: Option<PathBuf>,
) -> anyhow::Result<()> {
    let store = ctx.open_index().await?;
    let mut session = ctx.session(Role::parse(role));
    let external = gather_external(ctx, page_url, element, trace_log).await?;
    let opts = ctx.retrieval_options();

    if debug {
        let result = session
            .ask_debug(
                &store,
                ctx.embedder.as_ref(),
                ctx.generator.as_ref(),
                &opts,
                question,
                &external,
            )
            .await?;
        println!("{}", result.answer);
        println!("\n--- retrieved context ---");
        for (i, source) in result.sources.iter().enumerate() {
            let score = &result.scores[i];
            println!(
                "{}. {}  (fused {:.4} | vector {:.4} | lexical {:.4})",
                i + 1,
                source,
                score.fused,
                score.vector,
                score.lexical
            );
            println!("    {}", snippet(&result.chunks[i], 160));
        }
    } else {
        let answer = session
            .ask(
                &store,
                ctx.embedder.as_ref(),
                ctx.generator.as_ref(),
                &opts,
                question,
                &external,
            )
            .await?;
        println!("{}", answer);
    }

    store.close().await;
    Ok(())
}

async fn run_chat(ctx: &AppContext, role: &str) -> anyhow::Result<()> {
    let store = ctx.open_index().await?;
    let mut session = ctx.session(Role::parse(role));
    let opts = ctx.retrieval_options();
    let external = ExternalContext::default();

    println!("CodeAsk chat ({}). Empty line or EOF to quit.", role);
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            break;
        }

        match session
            .ask(
                &store,
                ctx.embedder.as_ref(),
                ctx.generator.as_ref(),
                &opts,
                question,
                &external,
            )
            .await
        {
            Ok(answer) => println!("{}\n", answer),
            // A failed turn is reported and the session keeps going
            Err(e) => println!("error: {}\n", e),
        }
    }

    store.close().await;
    Ok(())
}

/// Resolve the optional `--page-url`/`--element`/`--trace-log` flags into
/// prompt context. Locator failures degrade into their message text.
async fn gather_external(
    ctx: &AppContext,
    page_url: Option<String>,
    element: Option<String>,
    trace_log: Option<PathBuf>,
) -> anyhow::Result<ExternalContext> {
    let mut external = ExternalContext::default();

    if let Some(url) = page_url {
        let descriptor = element.unwrap_or_default();
        let response = ctx.locate(&url, &descriptor).await;
        let rendered = if response.matches.is_empty() {
            response
                .message
                .unwrap_or_else(|| "No matching element found.".to_string())
        } else {
            response
                .matches
                .iter()
                .map(|m| {
                    format!(
                        "<{}> id={} class={} path={} text={}",
                        m.tag,
                        m.id.as_deref().unwrap_or("-"),
                        m.class.as_deref().unwrap_or("-"),
                        m.path,
                        m.text
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        external.dom = Some(rendered);
    }

    if let Some(path) = trace_log {
        external.trace = Some(read_trace_excerpt(&path)?);
    }

    Ok(external)
}

/// First `max_chars` characters on a single line.
fn snippet(text: &str, max_chars: usize) -> String {
    let one_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if one_line.chars().count() <= max_chars {
        one_line
    } else {
        let cut: String = one_line.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}
