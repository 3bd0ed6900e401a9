pub mod catalog;
pub mod config;
pub mod model;
pub mod preview;
pub mod publish;
pub mod search;
pub mod session;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;

use catalog::AnyCatalogSource;
use config::SearchConfig;
use model::StyleRecord;
use preview::PreviewClient;
use search::{Query, QueryDelta, ResultSnapshot, SearchWorker};
use session::{MemoryLocation, SearchSession};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "stylesearch",
    version,
    about = "Search and filter a citation style repository"
)]
pub struct Cli {
    /// Catalog location: listing URL or local JSON file
    #[arg(long, global = true, env = "STYLE_SEARCH_CATALOG_URL")]
    pub catalog: Option<String>,

    /// Site root for the listing and previews
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Filter the catalog and list matching styles
    Search {
        /// Search words; `id:<name>` selects a single style
        text: Vec<String>,

        /// Start from a serialized query string, e.g. '?q=apa&format=author-date'
        #[arg(long)]
        query: Option<String>,

        /// Only styles with this citation format
        #[arg(long)]
        format: Option<String>,

        /// Only styles covering all of these fields (comma separated)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Hide dependent styles
        #[arg(long, default_value_t = false)]
        unique: bool,

        /// Print at most this many styles
        #[arg(long)]
        limit: Option<usize>,

        /// Emit JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show the formats and fields available under a query
    Facets {
        #[arg(long)]
        query: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Fetch the rendered preview of one style
    Preview {
        name: String,

        /// Preview of a dependent style
        #[arg(long, default_value_t = false)]
        dependent: bool,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli);

    match cli.command {
        Commands::Search {
            text,
            query,
            format,
            fields,
            unique,
            limit,
            json,
        } => {
            let mut delta = QueryDelta::default();
            if !text.is_empty() {
                delta = delta.with_search(text.join(" "));
            }
            if format.is_some() {
                delta = delta.with_format(format);
            }
            if !fields.is_empty() {
                delta = delta.with_fields(fields);
            }
            if unique {
                delta = delta.with_dependent(Some(0));
            }
            let query = Query::parse(query.as_deref().unwrap_or_default()).merge(&delta);
            let snapshot = evaluate_once(&config, &query).await?;
            if json {
                print_json(&SearchOutput::new(&query, &snapshot, limit))
            } else {
                print_results(&snapshot, limit)
            }
        }
        Commands::Facets { query, json } => {
            let query = Query::parse(query.as_deref().unwrap_or_default());
            let snapshot = evaluate_once(&config, &query).await?;
            if json {
                print_json(&FacetOutput {
                    count: snapshot.count,
                    formats: &snapshot.facet_formats,
                    fields: &snapshot.facet_fields,
                })
            } else {
                print_facets(&snapshot)
            }
        }
        Commands::Preview {
            name,
            dependent,
            json,
        } => {
            let client = PreviewClient::new(&config)?;
            let preview = client
                .fetch(&name, dependent)
                .await
                .with_context(|| format!("fetching preview for {name}"))?;
            if json {
                print_json(preview.as_ref())
            } else {
                let mut out = std::io::stdout().lock();
                for citation in &preview.citation {
                    writeln!(out, "{citation}")?;
                }
                writeln!(out)?;
                writeln!(out, "{}", preview.bibliography)?;
                Ok(())
            }
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "stylesearch", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

fn resolve_config(cli: &Cli) -> SearchConfig {
    let mut config = SearchConfig::from_env();
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url.as_str());
    }
    if let Some(catalog) = &cli.catalog {
        config = config.with_catalog(catalog.as_str());
    }
    config
}

/// Load the catalog into a fresh session and wait for its first result.
async fn evaluate_once(config: &SearchConfig, query: &Query) -> Result<Arc<ResultSnapshot>> {
    let worker = SearchWorker::spawn().context("starting search worker")?;
    let mut session = SearchSession::new(
        config,
        &query.serialize(),
        worker,
        MemoryLocation::default(),
    );
    let location = config.catalog_location();
    let source = AnyCatalogSource::from_location(&location, config.http_timeout);
    session
        .load(&source)
        .await
        .with_context(|| format!("could not load style catalog from {location}"))?;
    session.publisher().settled().await;
    session
        .snapshot()
        .context("search finished without producing a result")
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: String,
    count: usize,
    styles: &'a [Arc<StyleRecord>],
    formats: &'a [String],
    fields: &'a [String],
}

impl<'a> SearchOutput<'a> {
    fn new(query: &Query, snapshot: &'a ResultSnapshot, limit: Option<usize>) -> Self {
        let shown = limit.unwrap_or(snapshot.count).min(snapshot.matched.len());
        Self {
            query: query.serialize(),
            count: snapshot.count,
            styles: &snapshot.matched[..shown],
            formats: &snapshot.facet_formats,
            fields: &snapshot.facet_fields,
        }
    }
}

#[derive(Serialize)]
struct FacetOutput<'a> {
    count: usize,
    formats: &'a [String],
    fields: &'a [String],
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    println!("{body}");
    Ok(())
}

fn print_results(snapshot: &ResultSnapshot, limit: Option<usize>) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if snapshot.is_empty() {
        writeln!(out, "No styles found.")?;
        return Ok(());
    }

    let shown = limit.unwrap_or(snapshot.count).min(snapshot.count);
    for record in snapshot.matched.iter().take(shown) {
        let mut line = format!("{}  {}", record.name.bold(), record.display_title());
        if let Some(format) = &record.categories.format {
            line.push_str(&format!("  [{}]", format.cyan()));
        }
        if record.dependent {
            line.push_str(&format!("  {}", "(dependent)".dimmed()));
        }
        writeln!(out, "{line}")?;
    }

    let noun = if snapshot.count == 1 { "style" } else { "styles" };
    if shown < snapshot.count {
        writeln!(out, "{shown} of {} {noun} shown", snapshot.count)?;
    } else {
        writeln!(out, "{} {noun}", snapshot.count)?;
    }
    Ok(())
}

fn print_facets(snapshot: &ResultSnapshot) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{} {}", "Formats:".bold(), snapshot.facet_formats.join(", "))?;
    writeln!(out, "{} {}", "Fields:".bold(), snapshot.facet_fields.join(", "))?;
    writeln!(out, "{} matching styles", snapshot.count)?;
    Ok(())
}
