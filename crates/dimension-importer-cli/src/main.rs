//! Dimension Importer CLI
//!
//! Composition root for the importer:
//! - `run`: stream new-instance events (JSON lines) through the handler
//! - `load-codelist`: load a code list into the graph snapshot
//! - `config`: print the effective configuration
//!
//! Configuration comes from the environment (see `Config::from_env`);
//! command-line flags take precedence. Logs go to stderr so that stdout can
//! carry completion events.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use dimension_importer::client::HttpDatasetClient;
use dimension_importer::graph::{CodeList, GraphStore, Storer};
use dimension_importer::{
    read_events, Config, ErrorReporter, EventConsumer, InstanceEventHandler, JsonLinesWriter,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "dimension-importer")]
#[command(
    author,
    version,
    about = "Import dataset instances and their dimensions into a graph store"
)]
struct Cli {
    #[command(flatten)]
    overrides: ConfigArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import every instance named in an event stream.
    ///
    /// Events are JSON lines: `{"instance_id": "...", "file_url": "..."}`.
    Run {
        /// Event input (`-` for stdin)
        #[arg(long, default_value = "-")]
        events: PathBuf,
        /// Where completion events are written (stdout when omitted)
        #[arg(long)]
        completed: Option<PathBuf>,
        /// Where failure reports are written (not reported when omitted)
        #[arg(long)]
        reports: Option<PathBuf>,
    },

    /// Load a code list (JSON) into the graph snapshot.
    LoadCodelist {
        /// Code list JSON: `{"id": "...", "codes": [{"code": "...", "order": 0}]}`
        input: PathBuf,
    },

    /// Print the effective configuration (token redacted).
    Config,
}

/// Flags that override environment configuration.
#[derive(Args)]
struct ConfigArgs {
    /// Dataset API base URL
    #[arg(long, global = true)]
    dataset_api_url: Option<String>,
    /// Dimension workers per instance
    #[arg(long, global = true)]
    max_workers: Option<usize>,
    /// Instances imported concurrently
    #[arg(long, global = true)]
    max_concurrent_instances: Option<usize>,
    /// Dimension options fetched per dataset API request
    #[arg(long, global = true)]
    batch_size: Option<usize>,
    /// Graph snapshot file
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

impl ConfigArgs {
    fn apply(&self, mut config: Config) -> Result<Config> {
        if let Some(url) = &self.dataset_api_url {
            config.dataset_api_url = url.clone();
        }
        if let Some(workers) = self.max_workers {
            config.max_workers = workers;
        }
        if let Some(instances) = self.max_concurrent_instances {
            config.max_concurrent_instances = instances;
        }
        if let Some(batch_size) = self.batch_size {
            config.dimensions_batch_size = batch_size;
        }
        if let Some(snapshot) = &self.snapshot {
            config.graph_snapshot_path = Some(snapshot.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.overrides.log_json);

    let config = cli.overrides.apply(Config::from_env()?)?;

    match cli.command {
        Commands::Run {
            events,
            completed,
            reports,
        } => cmd_run(&config, &events, completed.as_deref(), reports.as_deref()).await,
        Commands::LoadCodelist { input } => cmd_load_codelist(&config, &input),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            Ok(())
        }
    }
}

fn init_logging(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_run(
    config: &Config,
    events: &Path,
    completed: Option<&Path>,
    reports: Option<&Path>,
) -> Result<()> {
    let dataset = HttpDatasetClient::new(config.client_config())
        .context("failed to build dataset API client")?;
    let store = Arc::new(open_store(config)?);
    let completions = Arc::new(JsonLinesWriter::new(open_output(completed).await?));

    let handler = InstanceEventHandler::builder()
        .dataset_client(Arc::new(dataset))
        .store(Arc::clone(&store) as Arc<dyn Storer>)
        .producer(completions)
        .max_workers(config.max_workers)
        .build()?;

    let mut consumer = EventConsumer::new(Arc::new(handler), config.service_name.clone())
        .with_max_in_flight(config.max_concurrent_instances);
    if let Some(path) = reports {
        let reporter = JsonLinesWriter::new(open_output(Some(path)).await?);
        consumer = consumer.with_reporter(Arc::new(reporter) as Arc<dyn ErrorReporter>);
    }

    let input = open_input(events).await?;
    let (tx, rx) = mpsc::channel(config.max_concurrent_instances * 2);
    let reader = tokio::spawn(read_events(input, tx));

    let summary = consumer.run(rx).await;
    let read = reader
        .await
        .map_err(|err| anyhow!("event reader failed: {err}"))?
        .context("failed to read events")?;

    if store.save()? {
        if let Some(path) = &config.graph_snapshot_path {
            eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
        }
    }

    eprintln!(
        "{} {} events: {} completed, {} skipped, {} failed",
        "done".green().bold(),
        read,
        summary.completed,
        summary.skipped.to_string().yellow(),
        summary.failed.to_string().red(),
    );
    if summary.failed > 0 {
        bail!("{} instance(s) failed to import", summary.failed);
    }
    Ok(())
}

fn cmd_load_codelist(config: &Config, input: &Path) -> Result<()> {
    let Some(snapshot) = &config.graph_snapshot_path else {
        bail!("a graph snapshot is required (--snapshot or GRAPH_SNAPSHOT_PATH)");
    };

    let contents = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let code_list: CodeList = serde_json::from_str(&contents)
        .with_context(|| format!("invalid code list in {}", input.display()))?;

    let store = GraphStore::open(snapshot)?;
    let codes = store.import_code_list(&code_list)?;
    store.save()?;

    eprintln!(
        "{} code list {} ({} codes) → {}",
        "ok".green().bold(),
        code_list.id.yellow(),
        codes,
        snapshot.display().to_string().bold()
    );
    Ok(())
}

// ============================================================================
// I/O helpers
// ============================================================================

fn open_store(config: &Config) -> Result<GraphStore> {
    match &config.graph_snapshot_path {
        Some(path) => GraphStore::open(path)
            .with_context(|| format!("failed to open graph snapshot {}", path.display())),
        None => Ok(GraphStore::new()),
    }
}

async fn open_input(path: &Path) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

async fn open_output(path: Option<&Path>) -> Result<Box<dyn AsyncWrite + Unpin + Send>> {
    let Some(path) = path.filter(|p| *p != Path::new("-")) else {
        return Ok(Box::new(tokio::io::stdout()));
    };
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok(Box::new(file))
}
