use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use iceplant::clock::SystemClock;
use iceplant::config::Config;
use iceplant::logbook::{LogWriter, DEFAULT_DATA_DIR, DEFAULT_FILE_PREFIX};
use iceplant::sim::{SimulatedMonitor, SimulatorConfig};
use iceplant::transport::open_serial;
use iceplant::viewer::{Viewer, ViewerOptions};
use iceplant::{Acquisition, Result};

#[derive(Parser, Debug)]
#[command(name = "iceplant", version)]
#[command(about = "Bedside monitor acquisition with hour-bucketed CSV logging")]
struct Cli {
    #[command(subcommand)]
    command: AppCommand,
}

#[derive(Subcommand, Debug)]
enum AppCommand {
    /// Poll the monitor on the serial port and log every validated payload
    Run(RunArgs),
    /// Run the acquisition loop against a simulated monitor
    Simulate(SimulateArgs),
    /// Draw one payload byte of the newest log file as a live sparkline
    Tail(TailArgs),
}

#[derive(Args, Debug, Clone)]
struct StorageArgs {
    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    file_prefix: Option<String>,
    #[arg(long)]
    max_files: Option<usize>,
    #[arg(long)]
    min_free_bytes: Option<u64>,
    /// Run retention every N logged payloads (0 disables)
    #[arg(long)]
    retention_every: Option<u64>,
}

impl StorageArgs {
    fn load(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.storage.data_dir = dir.clone();
        }
        if let Some(prefix) = &self.file_prefix {
            config.storage.file_prefix = prefix.clone();
        }
        if let Some(max_files) = self.max_files {
            config.storage.max_files = max_files;
        }
        if let Some(min_free_bytes) = self.min_free_bytes {
            config.storage.min_free_bytes = min_free_bytes;
        }
        if let Some(every) = self.retention_every {
            config.acquisition.retention_every = every;
        }
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[command(flatten)]
    storage: StorageArgs,
    /// Serial device
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    baud: Option<u32>,
}

#[derive(Args, Debug, Clone)]
struct SimulateArgs {
    #[command(flatten)]
    storage: StorageArgs,
    #[arg(long, default_value_t = 1_000)]
    block_interval_ms: u64,
    /// Send every N-th block with a broken checksum (0 never)
    #[arg(long, default_value_t = 0)]
    corrupt_every: u64,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
struct TailArgs {
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    #[arg(long, default_value = DEFAULT_FILE_PREFIX)]
    file_prefix: String,
    /// Payload byte index to plot
    #[arg(long, default_value_t = 0)]
    byte: usize,
    /// Plot width in characters
    #[arg(long, default_value_t = 80)]
    width: usize,
    /// Start from the first row of the current file
    #[arg(long, default_value_t = false)]
    from_start: bool,
    #[arg(long, default_value_t = 200)]
    poll_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        AppCommand::Run(args) => run(args).await,
        AppCommand::Simulate(args) => simulate(args).await,
        AppCommand::Tail(args) => tail(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves on Ctrl+C. If the handler cannot be installed it never resolves.
async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Interrupt received, shutting down"),
        Err(e) => {
            tracing::warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = args.storage.load()?;
    if let Some(port) = args.port {
        config.serial.port = port;
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    config.validate()?;

    let link = open_serial(&config.serial)?;
    let writer = LogWriter::new(config.storage.writer_config());
    let mut acquisition = Acquisition::new(link, SystemClock, writer, config.acquisition);

    let stats = acquisition.run(interrupted()).await?;
    tracing::info!(?stats, "Done");
    Ok(())
}

async fn simulate(args: SimulateArgs) -> Result<()> {
    let config = args.storage.load()?;
    config.validate()?;

    let link = SimulatedMonitor::new(SimulatorConfig {
        block_interval: Duration::from_millis(args.block_interval_ms.max(1)),
        corrupt_every: args.corrupt_every,
        seed: args.seed,
        ..SimulatorConfig::default()
    });
    tracing::info!(
        data_dir = %config.storage.data_dir.display(),
        "Running against simulated monitor"
    );

    let writer = LogWriter::new(config.storage.writer_config());
    let mut acquisition = Acquisition::new(link, SystemClock, writer, config.acquisition);

    let stats = acquisition.run(interrupted()).await?;
    tracing::info!(?stats, "Done");
    Ok(())
}

async fn tail(args: TailArgs) -> Result<()> {
    let mut viewer = Viewer::new(ViewerOptions {
        data_dir: args.data_dir,
        file_prefix: args.file_prefix,
        byte_index: args.byte,
        width: args.width,
        from_start: args.from_start,
        poll_interval: Duration::from_millis(args.poll_ms.max(1)),
    });

    let mut stdout = std::io::stdout();
    viewer.run(&mut stdout, interrupted()).await
}
