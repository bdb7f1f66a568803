use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use pdfqa_client::ApiClient;
use pdfqa_core::{
    derive_snippet, ChatSource, HighlightLocator, LocationBackend, LocatorError, MatchLocation,
    ViewSession,
};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod browse;
mod config;

use config::CliConfig;

#[derive(Debug, Parser)]
#[command(
    name = "pdfqa",
    version,
    about = "Ask questions about uploaded PDFs and jump to the passages that answer them"
)]
struct Args {
    /// Backend base URL, overriding the config file
    #[arg(long, env = "PDFQA_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Upload a PDF for processing
    Upload {
        file: PathBuf,
        /// Store the file without starting vectorization
        #[arg(long)]
        no_process: bool,
    },
    /// Show the processing status of an uploaded document
    Status { document_id: String },
    /// Restart processing of a document that failed
    Retry { document_id: String },
    /// List documents that are ready for questions
    Documents,
    /// Show document metadata
    Show { document_id: String },
    /// Ask a question and optionally browse the matches of one source
    Ask {
        question: String,
        #[arg(long)]
        max_results: Option<u32>,
        /// Restrict retrieval to these documents
        #[arg(long = "document")]
        documents: Vec<String>,
        /// Source to locate (1-based)
        #[arg(long, default_value_t = 1)]
        source: usize,
        #[arg(long)]
        browse: bool,
    },
    /// Retrieve matching chunks without generating an answer
    Search {
        query: String,
        /// Restrict retrieval to these documents
        #[arg(long = "document")]
        documents: Vec<String>,
        #[arg(long, default_value_t = 10)]
        limit: u32,
        /// Hit to locate (1-based)
        #[arg(long, default_value_t = 1)]
        hit: usize,
        #[arg(long)]
        browse: bool,
    },
    /// Find a passage inside a document
    Locate {
        document_id: String,
        text: String,
        #[arg(long)]
        browse: bool,
    },
    /// Request a highlighted copy of a page
    Highlight {
        document_id: String,
        page: u32,
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pdfqa", "pdfqa")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let mut config = CliConfig::load(&config_path)?;
    if let Some(base_url) = &args.base_url {
        config.client.base_url = base_url.clone();
    }

    let client = Arc::new(
        ApiClient::new(config.client.clone()).context("failed to construct backend client")?,
    );
    info!(base_url = %config.client.base_url, "using backend");

    match args.command {
        CliCommand::Upload { file, no_process } => {
            let receipt = client
                .upload(&file, !no_process)
                .await
                .with_context(|| format!("upload of {:?} failed", file))?;
            println!("{} ({} bytes)", receipt.filename, receipt.file_size);
            println!("document id: {}", receipt.document_id);
            if receipt.processing {
                println!(
                    "processing started; check with `pdfqa status {}`",
                    receipt.document_id
                );
            }
        }
        CliCommand::Status { document_id } => {
            let status = client.upload_status(&document_id).await?;
            println!("{}: {}", status.filename, status.processing_status);
            if let Some(processed_at) = status.processed_at {
                println!("processed at {processed_at}");
            }
        }
        CliCommand::Retry { document_id } => {
            let receipt = client
                .retry_processing(&document_id)
                .await
                .with_context(|| format!("retry of {document_id} failed"))?;
            println!("{}: {}", receipt.document_id, receipt.message);
        }
        CliCommand::Documents => {
            let documents = client.available_documents().await?;
            if documents.is_empty() {
                println!("no processed documents");
            }
            for doc in documents {
                println!("{}  {}", doc.id, doc.filename);
            }
        }
        CliCommand::Show { document_id } => {
            let record = client.document(&document_id).await?;
            println!("{} [{}]", record.filename, record.status);
            if !record.is_processed() {
                println!("not searchable yet; check with `pdfqa status {document_id}`");
            }
            if let Some(url) = record.url {
                println!("{url}");
            }
            if let Some(chunks) = record.chunk_count {
                println!("{chunks} chunks indexed");
            }
        }
        CliCommand::Ask {
            question,
            max_results,
            documents,
            source,
            browse,
        } => {
            let answer = client
                .chat(
                    &question,
                    max_results.unwrap_or(config.max_results),
                    &documents,
                )
                .await?;
            println!("{}\n", answer.answer);
            for (index, item) in answer.sources.iter().enumerate() {
                println!(
                    "[{}] {} (relevance {:.2}): {}",
                    index + 1,
                    item.filename,
                    item.relevance_score,
                    derive_snippet(&item.content_preview)
                );
            }

            let mut session = new_session(&client, &config);
            session.record_turn(question, answer.clone());
            if !browse {
                return Ok(());
            }
            let chosen = source
                .checked_sub(1)
                .and_then(|index| answer.sources.get(index))
                .ok_or_else(|| anyhow!("answer has no source #{source}"))?;
            browse_source(&mut session, chosen).await?;
        }
        CliCommand::Search {
            query,
            documents,
            limit,
            hit,
            browse,
        } => {
            let hits = client.search_chunks(&query, limit, &documents).await?;
            if hits.is_empty() {
                println!("no matching passages");
                return Ok(());
            }
            for (index, item) in hits.iter().enumerate() {
                println!(
                    "[{}] {} #{} (relevance {:.2}): {}",
                    index + 1,
                    item.filename,
                    item.chunk_index,
                    item.relevance_score,
                    derive_snippet(&item.content)
                );
            }
            if !browse {
                return Ok(());
            }
            let chosen = hit
                .checked_sub(1)
                .and_then(|index| hits.get(index))
                .ok_or_else(|| anyhow!("search returned no hit #{hit}"))?;
            let mut session = new_session(&client, &config);
            browse_source(&mut session, &chosen.to_source()).await?;
        }
        CliCommand::Locate {
            document_id,
            text,
            browse,
        } => {
            let record = client.document(&document_id).await?;
            if !record.is_processed() {
                println!("{document_id} is {}; locations may be missing", record.status);
            }
            let mut session = new_session(&client, &config);
            session.open_document(record);
            match session.locate(&text).await {
                Ok(_) => {}
                Err(LocatorError::NotFound { query, .. }) => {
                    println!("\"{query}\" was not found in {document_id}");
                    return Ok(());
                }
                Err(err) => return Err(lookup_failure(err)),
            }
            if browse {
                browse::run(&mut session).await?;
            } else {
                print_matches(&session);
            }
        }
        CliCommand::Highlight {
            document_id,
            page,
            text,
        } => {
            let locator = HighlightLocator::with_max_query_chars(
                client.clone() as Arc<dyn LocationBackend>,
                config.max_query_chars,
            );
            let url = locator
                .request_highlight(&document_id, page, &text)
                .await?;
            println!("{url}");
        }
    }

    Ok(())
}

fn new_session(client: &Arc<ApiClient>, config: &CliConfig) -> ViewSession {
    let locator = HighlightLocator::with_max_query_chars(
        Arc::clone(client) as Arc<dyn LocationBackend>,
        config.max_query_chars,
    );
    ViewSession::with_scale(locator, config.scale)
}

/// Locate a retrieved passage, then hand the session to the match browser.
async fn browse_source(session: &mut ViewSession, source: &ChatSource) -> Result<()> {
    match session.locate_source(source).await {
        Ok(_) | Err(LocatorError::NotFound { .. }) => browse::run(session).await,
        Err(err) => Err(lookup_failure(err)),
    }
}

fn lookup_failure(err: LocatorError) -> anyhow::Error {
    let context = if err.is_retryable() {
        "location lookup failed; the backend may be busy, try again"
    } else {
        "location lookup failed"
    };
    anyhow::Error::new(err).context(context)
}

fn print_matches(session: &ViewSession) {
    let state = session.locator().snapshot();
    if let Some(query) = &state.query {
        println!("query: {query}");
    }
    for (index, location) in state.results.iter().enumerate() {
        println!("{}", format_match(index, location, session.scale()));
    }
}

fn format_match(index: usize, location: &MatchLocation, scale: f32) -> String {
    let bbox = location.bbox.scaled(f64::from(scale));
    let mut line = format!(
        "{:>3}. page {:<4} ({:.0}, {:.0})-({:.0}, {:.0})",
        index + 1,
        location.page_number,
        bbox.x0,
        bbox.y0,
        bbox.x1,
        bbox.y1
    );
    let context = location.context.trim();
    if !context.is_empty() {
        line.push_str("  ");
        line.push_str(&context.split_whitespace().collect::<Vec<_>>().join(" "));
    }
    line
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pdfqa.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    if !project_dirs.config_dir().exists() {
        debug!(dir = ?project_dirs.config_dir(), "config directory missing, using defaults");
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfqa_core::{BackendError, BoundingBox};

    #[test]
    fn ask_arguments_parse() {
        let args = Args::try_parse_from([
            "pdfqa",
            "ask",
            "How long is probation?",
            "--document",
            "doc-1",
            "--document",
            "doc-2",
            "--browse",
        ])
        .unwrap();
        match args.command {
            CliCommand::Ask {
                documents,
                browse,
                source,
                max_results,
                ..
            } => {
                assert_eq!(documents, vec!["doc-1", "doc-2"]);
                assert!(browse);
                assert_eq!(source, 1);
                assert_eq!(max_results, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn search_arguments_parse() {
        let args = Args::try_parse_from([
            "pdfqa", "search", "probation", "--limit", "3", "--hit", "2", "--browse",
        ])
        .unwrap();
        match args.command {
            CliCommand::Search {
                query,
                documents,
                limit,
                hit,
                browse,
            } => {
                assert_eq!(query, "probation");
                assert!(documents.is_empty());
                assert_eq!(limit, 3);
                assert_eq!(hit, 2);
                assert!(browse);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(Args::try_parse_from(["pdfqa", "retry", "doc-7"]).is_ok());
        assert!(Args::try_parse_from(["pdfqa", "retry"]).is_err());
    }

    #[test]
    fn retryable_lookup_failures_suggest_trying_again() {
        let busy = lookup_failure(LocatorError::Backend(BackendError::http(503, "busy")));
        assert!(busy.to_string().contains("try again"));
        let empty = lookup_failure(LocatorError::EmptyQuery);
        assert_eq!(empty.to_string(), "location lookup failed");
    }

    #[test]
    fn highlight_requires_numeric_page() {
        assert!(Args::try_parse_from(["pdfqa", "highlight", "doc", "seven", "text"]).is_err());
        assert!(Args::try_parse_from(["pdfqa", "highlight", "doc", "7", "text"]).is_ok());
    }

    #[test]
    fn match_line_scales_bbox_and_flattens_context() {
        let location = MatchLocation {
            page_number: 7,
            bbox: BoundingBox::new(10.0, 20.0, 200.0, 40.0),
            context: "must submit\n proof of   service".to_string(),
            matched_text: "proof".to_string(),
        };
        assert_eq!(
            format_match(0, &location, 2.0),
            "  1. page 7    (20, 40)-(400, 80)  must submit proof of service"
        );
    }
}
