use std::{env, fs::File, io, path::Path};

use tracing_subscriber::EnvFilter;

use purse_engine::dlq::TracingDlq;
use purse_engine::ingestion::CsvReader;
use purse_engine::notifier::MemoryNotifier;
use purse_engine::replay::Replay;
use purse_engine::repository::MemoryRepository;
use purse_engine::{Engine, Settings};

#[tokio::main] // using Tokio runtime for async
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let commands = args
        .next()
        .ok_or("usage: purse_engine <commands.csv> [settings.toml]")?;
    let settings = Settings::load(args.next().as_deref().map(Path::new))?;

    // Set up the components
    let file = File::open(Path::new(&commands))?;
    let mut ingestion = CsvReader::new(file)?;
    let engine = Engine::new(
        MemoryRepository::new(),
        MemoryNotifier::new(),
        TracingDlq::default(),
        &settings,
    );

    let mut replay = Replay::new(engine);
    replay.run(&mut ingestion).await?;

    replay
        .engine()
        .repository()
        .flush(io::stdout().lock())
        .await?;

    Ok(())
}
