use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use apify_client::ApifyClient;
use stocktalk_common::Config;
use stocktalk_harvest::analysis::SentimentSummary;
use stocktalk_harvest::sources::{ApifyTweetSource, MockTweetSource};
use stocktalk_harvest::{
    storage, BatchAccumulator, Consolidator, HarvestConfig, Harvester, ParquetBatchStore,
    RecordSource, SearchQuery, ShutdownController,
};

#[derive(Parser)]
#[command(name = "stocktalk", about = "Harvest recent stock-market hashtag posts to Parquet")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Collect posts into batch files, then consolidate them (default)
    Collect(CollectArgs),
    /// Consolidate every batch file found in a directory
    Consolidate {
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the sentiment distribution of a dataset or batch file
    Analyze { file: PathBuf },
}

#[derive(clap::Args, Default)]
struct CollectArgs {
    #[arg(long, value_enum, default_value_t = SourceKind::Mock)]
    source: SourceKind,
    #[arg(long)]
    target: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Seed for the mock source
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum SourceKind {
    #[default]
    Mock,
    Apify,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("stocktalk=info".parse()?)
                .add_directive("apify_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Collect(CollectArgs::default())) {
        Command::Collect(args) => collect(&mut config, args).await,
        Command::Consolidate { output_dir } => {
            let dir = output_dir.unwrap_or(config.output_dir);
            let files = storage::discover_batch_files(&dir)?;
            info!(dir = %dir.display(), files = files.len(), "Consolidating batch files");
            let outcome = Consolidator::new(&dir).consolidate(&files, Utc::now())?;
            println!("{outcome}");
            Ok(())
        }
        Command::Analyze { file } => {
            let records = storage::read_records(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            println!("{}", SentimentSummary::from_records(&records));
            Ok(())
        }
    }
}

async fn collect(config: &mut Config, args: CollectArgs) -> Result<()> {
    if let Some(target) = args.target {
        config.target_count = target;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    config.log_redacted();

    let source: Arc<dyn RecordSource> = match args.source {
        SourceKind::Mock => {
            let mock = MockTweetSource::new(config.target_count);
            Arc::new(match args.seed {
                Some(seed) => mock.with_seed(seed),
                None => mock,
            })
        }
        SourceKind::Apify => {
            let token = config.require_apify_api_key()?.to_string();
            let max_items = u32::try_from(config.target_count).unwrap_or(u32::MAX);
            Arc::new(ApifyTweetSource::new(ApifyClient::new(token), max_items))
        }
    };

    let shutdown = ShutdownController::new();
    let signals = shutdown.listen_for_signals();

    let harvester = Harvester::new(source, HarvestConfig::from(&*config), shutdown)?;
    let store = ParquetBatchStore::open(&config.output_dir)?;
    let mut accumulator = BatchAccumulator::new(store, config.batch_size);
    let consolidator = Consolidator::new(&config.output_dir);
    let query = SearchQuery::last_day(&config.hashtags, Utc::now());

    let report = harvester
        .run(&query, &mut accumulator, &consolidator)
        .await?;
    signals.abort();

    println!("{report}");
    Ok(())
}
