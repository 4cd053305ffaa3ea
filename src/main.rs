use archive_harvest::agent::{
    AgentProvisioner, ChromeDriverLauncher, DriverService, DriverSupervisor, WebDriverProvisioner,
};
use archive_harvest::{
    BatchOrchestrator, Config, Error, Event, OutcomeClass, Result, RunSummary, TargetResolver,
    read_targets,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Download every document of a Gallica URL list through a real browser
#[derive(Parser, Debug)]
#[command(name = "archive-harvest", version, about)]
struct Cli {
    /// CSV/text file with one source URL per line (first column)
    input: Option<PathBuf>,

    /// Directory the browser downloads into
    output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "ARCHIVE_HARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Existing WebDriver endpoint (e.g. http://127.0.0.1:9515); spawns chromedriver when absent
    #[arg(long, env = "WEBDRIVER_URL")]
    webdriver_url: Option<String>,

    /// chromedriver binary to spawn instead of the one found in PATH
    #[arg(long, env = "CHROMEDRIVER")]
    chromedriver: Option<PathBuf>,

    /// Attempts served by one browser session before it is replaced
    #[arg(long)]
    recycle_after: Option<usize>,

    /// Accept invalid TLS certificates in the browser session only
    #[arg(long)]
    accept_insecure_certs: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(summary) => {
            println!(
                "\nDone: {} processed, {} successful, {} failed",
                summary.total, summary.successful, summary.failed
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            eprintln!("\nFailed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };

    if let Some(input) = &cli.input {
        config.input_path = input.clone();
    }
    if let Some(output) = &cli.output {
        config.download_dir = output.clone();
    }
    if let Some(url) = &cli.webdriver_url {
        config.session.webdriver_url = Some(url.clone());
    }
    if let Some(path) = &cli.chromedriver {
        config.session.chromedriver_path = Some(path.clone());
    }
    if let Some(n) = cli.recycle_after {
        config.session.recycle_after = n;
    }
    if cli.accept_insecure_certs {
        config.session.transport.accept_insecure_certs = true;
    }

    config.validate()?;
    Ok(config)
}

async fn build_provisioner(config: &Config) -> Result<Arc<dyn AgentProvisioner>> {
    let request_timeout = config.session.request_timeout;
    let provisioner = match &config.session.webdriver_url {
        Some(url) => {
            let provisioner =
                WebDriverProvisioner::new(url, request_timeout).map_err(Error::Provision)?;
            tracing::info!(endpoint = %url, "Using WebDriver endpoint");
            provisioner
        }
        None => {
            let binary = DriverService::locate(config.session.chromedriver_path.as_deref())
                .map_err(Error::Provision)?;
            let supervisor = DriverSupervisor::new(ChromeDriverLauncher::new(
                binary,
                config.session.driver_startup_timeout,
            ));
            // Fail before the first target if the driver cannot start at all
            supervisor.ensure_running().await.map_err(Error::Provision)?;
            WebDriverProvisioner::supervised(supervisor, request_timeout)
        }
    };
    Ok(Arc::new(provisioner))
}

async fn run(cli: Cli) -> Result<RunSummary> {
    let config = load_config(&cli)?;

    let resolver = TargetResolver::new(&config.target);
    let targets = read_targets(&config.input_path, &resolver)?;
    println!("Found {} URLs in {}", targets.len(), config.input_path.display());

    tokio::fs::create_dir_all(&config.download_dir).await?;

    let provisioner = build_provisioner(&config).await?;
    let mut orchestrator = BatchOrchestrator::from_config(&config, provisioner)?;

    let progress = tokio::spawn(print_progress(orchestrator.subscribe()));
    let result = orchestrator.run(targets).await;
    // Dropping the orchestrator closes the channel and ends the printer
    drop(orchestrator);
    progress.await.ok();

    result
}

async fn print_progress(mut events: broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(Event::AttemptStarted {
                index,
                total,
                identifier,
            }) => {
                println!(
                    "\n[{index}/{total}] {}",
                    identifier.as_deref().unwrap_or("(no identifier)")
                );
            }
            Ok(Event::AttemptFinished { report }) => {
                let mark = match report.class() {
                    OutcomeClass::Successful => "✓",
                    OutcomeClass::Failed => "✗",
                };
                println!("  {mark} {}", report.outcome);
            }
            Ok(Event::SessionRecycled { reason }) => {
                println!("  Restarting browser ({reason:?})");
            }
            Ok(Event::RunStarted { .. }) | Ok(Event::RunFinished { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Progress printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
