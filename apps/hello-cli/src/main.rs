use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_contract::ClientDescriptor;
use hello_sdk::{HelloClient, HelloClientConfig, HttpHelloClient};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Hello CLI - calls the versioned hello service
#[derive(Parser)]
#[command(name = "hello-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL override (overrides config and HELLO__BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Print effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Greet NAME through API version 1 (blocking call)
    Hello { name: String },
    /// Greet NAME through API version 2 (deferred call)
    HelloTwo { name: String },
    /// Print the operations of the hello client
    Describe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = effective_config(&cli)?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let Some(command) = cli.command else {
        anyhow::bail!("no command given; run with --help for usage");
    };

    tracing::debug!(base_url = %config.base_url, "running {}", command.operation());
    match command {
        Commands::Hello { name } => {
            let client = HttpHelloClient::new(&config)?;
            let greeting = client
                .say_hello(&name)
                .with_context(|| format!("sayHello failed for '{name}'"))?;
            println!("{greeting}");
        }
        Commands::HelloTwo { name } => {
            let client = HttpHelloClient::new(&config)?;
            let greeting = client
                .say_hello_two(&name)
                .await
                .with_context(|| format!("sayHelloTwo failed for '{name}'"))?;
            println!("{greeting}");
        }
        Commands::Describe => println!("{}", describe(hello_sdk::descriptor())?),
    }
    Ok(())
}

impl Commands {
    fn operation(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "sayHello",
            Self::HelloTwo { .. } => "sayHelloTwo",
            Self::Describe => "describe",
        }
    }
}

/// defaults -> YAML (if provided) -> env (HELLO__*) -> CLI overrides
fn effective_config(cli: &Cli) -> Result<HelloClientConfig> {
    let mut config = HelloClientConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = &cli.base_url {
        tracing::info!(base_url = %base_url, "base URL overridden from command line");
        config.base_url.clone_from(base_url);
    }
    tracing::info!(
        config_file = ?cli.config,
        base_url = %config.base_url,
        max_retries = config.max_retries,
        "configuration loaded"
    );
    Ok(config)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn describe(descriptor: &ClientDescriptor) -> Result<String> {
    let operations = descriptor
        .operations
        .iter()
        .map(|op| {
            let path = descriptor.path_template(op)?;
            Ok(serde_json::json!({
                "name": op.name,
                "method": op.method.as_str(),
                "path": path.as_str(),
                "version": descriptor.effective_version(op),
                "explicit_version": op.version.is_some(),
                "return_mode": op.return_mode,
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "client": descriptor.id,
        "base_path": descriptor.base_path,
        "default_version": descriptor.default_version,
        "operations": operations,
    }))?)
}
