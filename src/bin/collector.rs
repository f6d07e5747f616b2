//! collector CLI: run a batch of commands against the data file.

use std::fs::File;
use std::io::{BufRead, BufReader, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use collector::config::{Config, threads_from_hint};
use collector::dispatch::Dispatcher;
use collector::engine::WorkerPool;
use collector::model::Person;
use collector::output::{Output, TerminalOutput};
use collector::storage::CollectionStore;
use collector::telemetry::{TelemetryConfig, init_telemetry};
use tracing::info;

#[derive(Parser)]
#[command(name = "collector", about = "Run collection commands on a worker pool")]
struct Cli {
    /// Command file, one command per line (reads stdin when omitted)
    input: Option<PathBuf>,
    /// Worker threads: negative = one per core, 0 = run commands inline
    #[arg(short = 'j', long, allow_negative_numbers = true)]
    threads: Option<i64>,
    /// Binary data file to load at start and save at exit
    #[arg(long)]
    data: Option<PathBuf>,
    /// TOML config file (environment variables are used otherwise)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(hint) = cli.threads {
        config.threads = threads_from_hint(hint);
    }
    if let Some(data) = cli.data {
        config.data_file = data;
    }

    init_telemetry(TelemetryConfig {
        log_level: config.log_level.clone(),
        ansi: std::io::stderr().is_terminal(),
    })?;

    let store = Arc::new(CollectionStore::<Person>::new(&config.data_file));
    load_store(&store, &config)?;

    let output: Arc<dyn Output> = Arc::new(TerminalOutput);
    let dispatcher = Dispatcher::new(Arc::clone(&store), Arc::clone(&output), config.limits);

    let input: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(File::open(path).with_context(|| {
            format!("cannot open command file '{}'", path.display())
        })?)),
        None => Box::new(std::io::stdin().lock()),
    };

    let mut pool = WorkerPool::new(config.threads);
    pool.start().context("cannot start worker pool")?;

    let fed = dispatcher.feed(input, &pool);
    info!(
        pool_size = pool.size(),
        queued = pool.queue_len(),
        submitted = ?fed.as_ref().ok(),
        "input finished, draining"
    );
    pool.stop();

    // Work already applied is saved even when reading input failed.
    store.save().with_context(|| {
        format!("cannot save data file '{}'", store.file_name().display())
    })?;
    fed.context("reading commands failed")?;

    output.emit("All commands executed");
    Ok(())
}

/// Load the data file. A missing file means a fresh, empty collection.
fn load_store(store: &CollectionStore<Person>, config: &Config) -> anyhow::Result<()> {
    store
        .load_or_empty(&config.data_file)
        .with_context(|| format!("cannot load data file '{}'", config.data_file.display()))?;
    Ok(())
}
