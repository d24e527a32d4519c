mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graph::{GraphStream, StreamEvent, StreamOutcome};
use revgraph_core::{GitRef, GraphConfig, RecordFilter, RefIndex, RepositorySource};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use render::{Charset, RowPrinter};

#[derive(Parser)]
#[command(name = "revgraph")]
#[command(about = "Streaming lane layout for commit histories", long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lay out the commit graph and print one line per commit
    Layout {
        /// Path to the repository
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Read NUL-separated records from a file instead (`-` for stdin)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Stop after this many commits
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Only show commits whose author name or email contains this
        #[arg(long)]
        author: Option<String>,
        /// Only show commits whose message contains this
        #[arg(long)]
        grep: Option<String>,
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Draw lanes with ASCII characters
        #[arg(long)]
        ascii: bool,
        /// Line width (defaults to $COLUMNS, then 120)
        #[arg(long)]
        width: Option<usize>,
    },
    /// List the refs attached to commits
    Refs {
        /// Path to the repository
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Layout {
            path,
            input,
            limit,
            author,
            grep,
            config,
            ascii,
            width,
        } => {
            let config = match config {
                Some(file) => GraphConfig::load(&file)
                    .with_context(|| format!("Failed to load config from {}", file.display()))?,
                None => GraphConfig::default(),
            };

            let (source, refs) = match input {
                Some(file) => (open_input(&file)?, RefIndex::empty()),
                None => {
                    // git2 work stays off the runtime threads; the walk itself runs on the export thread
                    let (log, refs) = tokio::task::spawn_blocking(move || -> Result<_> {
                        let repo = RepositorySource::open(&path)?;
                        let refs = RefIndex::new(repo.refs()?);
                        debug!(refs = refs.len(), path = %repo.path().display(), "streaming history");
                        Ok((repo.log_reader(limit)?, refs))
                    })
                    .await
                    .context("Repository setup did not finish")??;
                    (Box::new(log) as Box<dyn Read + Send>, refs)
                }
            };

            let width = width
                .or_else(|| std::env::var("COLUMNS").ok().and_then(|c| c.parse().ok()))
                .unwrap_or(120);
            let charset = if ascii { Charset::Ascii } else { Charset::Unicode };
            let printer = RowPrinter::new(charset, width);

            let stream = GraphStream::new(config).with_refs(refs);
            let mut handle = stream.start(source, build_filter(author, grep));

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let mut printed = 0;
            while let Some(event) = handle.next().await {
                match event {
                    StreamEvent::Row(row) => {
                        if limit.is_some_and(|limit| printed >= limit) {
                            handle.cancel();
                            continue;
                        }
                        writeln!(out, "{}", printer.format(&row))?;
                        printed += 1;
                    }
                    StreamEvent::Finished(StreamOutcome::Completed(summary)) => {
                        info!(
                            records = summary.records,
                            rows = summary.rows,
                            dangling = summary.dangling.len(),
                            anomalies = summary.anomalies,
                            "done"
                        );
                        if summary.anomalies > 0 {
                            warn!(count = summary.anomalies, "history had layout inconsistencies");
                        }
                    }
                    StreamEvent::Finished(StreamOutcome::Cancelled { rows }) => {
                        debug!(rows, "stopped at limit");
                    }
                    StreamEvent::Finished(StreamOutcome::Failed(e)) => {
                        return Err(e).context("Layout failed");
                    }
                }
            }
            out.flush()?;
        }
        Commands::Refs { path } => {
            let repo = RepositorySource::open(&path)?;
            let index = RefIndex::new(repo.refs()?);

            let mut refs: Vec<&GitRef> = index.iter().flat_map(|(_, refs)| refs.iter()).collect();
            refs.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));

            if refs.is_empty() {
                println!("No refs in {}", repo.path().display());
            }
            for r in refs {
                println!("{} {:<6} {}", r.target.short(), format!("{:?}", r.kind).to_lowercase(), r.name);
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_input(file: &Path) -> Result<Box<dyn Read + Send>> {
    if file.as_os_str() == "-" {
        return Ok(Box::new(std::io::stdin()));
    }
    let handle = File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    Ok(Box::new(handle))
}

fn build_filter(author: Option<String>, grep: Option<String>) -> Option<RecordFilter> {
    let mut filters: Vec<RecordFilter> = author
        .map(RecordFilter::Author)
        .into_iter()
        .chain(grep.map(RecordFilter::Message))
        .collect();
    match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(RecordFilter::All(filters)),
    }
}
