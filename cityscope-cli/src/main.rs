mod hub;
mod index;
mod render;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{debug, info};

use cityscope_core::authority::RemoteAuthority;
use cityscope_core::config::CityscopeConfig;
use cityscope_core::controller::{DEFAULT_TIMEOUT, LifecycleController};
use cityscope_core::dataset::{DatasetIndex, DatasetSelector};
use cityscope_core::error::LifecycleError;
use cityscope_core::fake::{FakeAuthority, FakeIndex, Instance};
use cityscope_core::model::{DatasetCandidate, DatasetSelection, Resource, ServiceKind};

use hub::HubClient;
use index::GithubIndex;

#[derive(Parser)]
#[command(name = "cityscope", version)]
#[command(about = "Manage your CityScope hub services", long_about = None)]
struct Cli {
    /// Path to the config file (default: discover cityscope.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-memory hub and dataset index
    #[arg(long, global = true)]
    demo: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every service and the actions available
    Status,
    /// Provision a service that does not exist yet
    Create { service: ServiceKind },
    /// Start a stopped service
    Start { service: ServiceKind },
    /// Stop a running service
    Stop { service: ServiceKind },
    /// Print the credential of a running service
    Credential { service: ServiceKind },
    /// List datasets the API service can import
    Datasets,
    /// Import datasets into the API service
    Configure {
        #[arg(required = true)]
        repos: Vec<String>,
    },
    /// Poll service status until interrupted
    Watch {
        #[arg(long, default_value_t = 5_000)]
        interval_ms: u64,
    },
}

struct Session {
    controller: Arc<LifecycleController>,
    selector: DatasetSelector,
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn demo_session() -> Session {
    let hub = Arc::new(
        FakeAuthority::new()
            .with_latency(Duration::from_millis(250))
            .with_instance(Resource::Loopback, Instance::Running)
            .with_instance(Resource::Mysql, Instance::Running)
            .with_instance(Resource::Wordpress, Instance::Stopped),
    );
    let index: Arc<dyn DatasetIndex> = Arc::new(FakeIndex::sample());
    let user = "demo";
    info!(backend = hub.name(), user, "Session ready");

    Session {
        controller: Arc::new(LifecycleController::new(hub.clone(), user)),
        selector: DatasetSelector::new(index, hub, user, DEFAULT_TIMEOUT),
    }
}

fn hub_session(config: &CityscopeConfig) -> anyhow::Result<Session> {
    let timeout = config.timeout();
    let hub: Arc<dyn RemoteAuthority> = Arc::new(HubClient::new(
        &config.hub.base_url,
        config.hub.token.clone(),
        timeout,
    )?);
    let index: Arc<dyn DatasetIndex> = Arc::new(GithubIndex::new(
        &config.datasets.search_url,
        &config.datasets.owner,
        timeout,
    )?);
    let user = config.hub.user.as_str();
    info!(backend = hub.name(), user, "Session ready");

    Ok(Session {
        controller: Arc::new(LifecycleController::new(hub.clone(), user).with_timeout(timeout)),
        selector: DatasetSelector::new(index, hub, user, timeout)
            .with_excluded(config.datasets.exclude.iter().cloned()),
    })
}

fn open_session(cli: &Cli) -> anyhow::Result<Session> {
    if cli.demo {
        return Ok(demo_session());
    }

    let (path, config) = match &cli.config {
        Some(path) => (path.clone(), CityscopeConfig::load(path)?),
        None => CityscopeConfig::discover(&std::env::current_dir()?)
            .context("run with --demo to try without a hub")?,
    };
    info!(path = %path.display(), user = %config.hub.user, "Loaded config");
    hub_session(&config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let session = open_session(&cli)?;
    let controller = session.controller.clone();
    controller.refresh().await;

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => render::print_status(&controller.snapshot()),
        Commands::Create { service } => {
            run_command(&controller, service, controller.create(service).await)?
        }
        Commands::Start { service } => {
            run_command(&controller, service, controller.start(service).await)?
        }
        Commands::Stop { service } => {
            run_command(&controller, service, controller.stop(service).await)?
        }
        Commands::Credential { service } => {
            let credential = controller.reveal(service).await?;
            println!("{}", credential.expose());
        }
        Commands::Datasets => {
            let candidates: Vec<DatasetCandidate> =
                session.selector.fetch_candidates().await?.collect();
            render::print_candidates(&candidates);
        }
        Commands::Configure { repos } => configure(&session.selector, repos).await?,
        Commands::Watch { interval_ms } => {
            watch(controller, Duration::from_millis(interval_ms.max(500))).await
        }
    }

    Ok(())
}

fn run_command(
    controller: &LifecycleController,
    service: ServiceKind,
    result: Result<cityscope_core::CommandOutcome, LifecycleError>,
) -> anyhow::Result<()> {
    match result {
        Ok(outcome) => {
            match outcome.message.filter(|m| !m.is_empty()) {
                Some(message) => println!("{}: {} ({})", service, outcome.state, message),
                None => println!("{}: {}", service, outcome.state),
            }
            Ok(())
        }
        Err(err) => {
            render::print_status(&[controller.model(service)]);
            if let Some(hint) = render::hint(&err) {
                eprintln!("{}", hint);
            }
            Err(err.into())
        }
    }
}

async fn configure(selector: &DatasetSelector, repos: Vec<String>) -> anyhow::Result<()> {
    let wanted: BTreeSet<String> = repos.into_iter().collect();
    let mut selection = DatasetSelection::new();
    let mut available = Vec::new();

    for candidate in selector.fetch_candidates().await? {
        if wanted.contains(&candidate.id) {
            selection.pick(&candidate);
        }
        available.push(candidate.id);
    }

    let missing: Vec<&String> = wanted.iter().filter(|r| !available.contains(*r)).collect();
    if !missing.is_empty() {
        anyhow::bail!(
            "unknown dataset(s): {:?}; available: {}",
            missing,
            available.join(", ")
        );
    }

    debug!(datasets = selection.len(), "Selection built");
    let message = selector.submit(selection).await?;
    println!("{}", message);
    Ok(())
}

async fn watch(controller: Arc<LifecycleController>, interval: Duration) {
    let mut events = controller.subscribe();
    render::print_status(&controller.snapshot());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                controller.refresh().await;
            }
            event = events.recv() => match event {
                Ok(env) => {
                    if let Some(line) = render::describe_event(&env) {
                        println!("{}", line);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }
}
