#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bucketeer::config::{AppConfig, SAMPLE_CONFIG};
use bucketeer::identity::{FileIdentity, IdentityProvider};
use bucketeer::simulate::simulate;
use bucketeer::state::{ServiceState, shared_state};
use bucketeer::{KeyPart, Lab, build_key, server};

#[derive(Parser)]
#[command(name = "bucketeer", about = "Deterministic experiment bucketing")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "bucketeer.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP assignment service (default)
    Serve,
    /// Print the assignment for one identity
    Assign {
        /// Experiment name from the config file
        #[arg(short, long)]
        experiment: String,
        /// Identity to assign; defaults to the locally stored identity
        #[arg(short, long)]
        identity: Option<String>,
    },
    /// Print the key built from the given parts
    Key { parts: Vec<String> },
    /// Assign random identities and print the resulting distribution
    Simulate {
        #[arg(short, long)]
        experiment: String,
        #[arg(short, long, default_value_t = 1000)]
        samples: usize,
    },
    /// Forget the locally stored identity
    ResetIdentity,
    /// Print a sample configuration file and exit
    GenerateConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::GenerateConfig) => {
            print!("{}", SAMPLE_CONFIG);
            return Ok(());
        }
        Some(Command::Key { parts }) => {
            let parts: Vec<KeyPart> = parts.into_iter().map(KeyPart::from).collect();
            println!("{}", build_key(&parts));
            return Ok(());
        }
        _ => {}
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Assign {
            experiment,
            identity,
        } => {
            let lab = Lab::new(config.settings(), FileIdentity::new(&config.identity_file));
            let experiment = config
                .experiment(&experiment)
                .with_context(|| format!("unknown experiment: {experiment}"))?;
            let identity = match identity {
                Some(id) => id,
                None => lab.resolve_identity()?,
            };
            let request = experiment.request(Some(identity.clone()))?;
            let assignment = lab.assign(&request)?;
            println!(
                "{}",
                serde_json::json!({
                    "experiment": experiment.name,
                    "identity": identity,
                    "assignment": assignment.as_i64(),
                    "control": assignment.is_control(),
                })
            );
            Ok(())
        }
        Command::Simulate {
            experiment,
            samples,
        } => {
            let experiment = config
                .experiment(&experiment)
                .with_context(|| format!("unknown experiment: {experiment}"))?;
            let template = experiment.request(None)?;
            let identities = (0..samples).map(|_| uuid::Uuid::new_v4().to_string());
            let distribution = simulate(&template, &config.settings(), identities)?;
            println!("{}", serde_json::to_string_pretty(&distribution)?);
            Ok(())
        }
        Command::ResetIdentity => {
            let provider = FileIdentity::new(&config.identity_file);
            provider.reset()?;
            info!(path = %provider.path().display(), "identity reset");
            Ok(())
        }
        Command::Key { .. } | Command::GenerateConfig => Ok(()),
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    info!(
        listen = %config.listen,
        groups = ?config.groups,
        hash = ?config.hash,
        experiments = config.experiments.len(),
        "starting bucketeer"
    );

    let state = shared_state(ServiceState::from_config(&config));
    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!(addr = %config.listen, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
