// attentid-cli — BLE identity channel CLI
//
// Serves the AttentID GATT peripheral over BlueZ, runs passive scan windows,
// and manages the persisted configuration.

mod config;

use anyhow::{Context, Result};
use attentid_core::config::AuthPolicy;
use attentid_core::gatt::Exportable;
use attentid_core::identity;
use attentid_core::message::InboundMessage;
use attentid_core::AttentId;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(name = "attentid")]
#[command(about = "AttentID — BLE identity channel", long_about = None)]
#[command(version)]
struct Cli {
    /// Also write daily-rotated logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the GATT peripheral and advertisement, then serve until Ctrl+C
    Serve {
        #[arg(short, long)]
        adapter: Option<String>,
        #[arg(long, value_enum)]
        auth_policy: Option<PolicyArg>,
        /// Known address (repeatable); replaces the configured list
        #[arg(short, long)]
        known: Vec<String>,
        #[arg(long)]
        local_name: Option<String>,
    },
    /// Run one passive scan window for manufacturer data
    Scan {
        /// Scan window in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Print the object tree that would be exported
    Tree {
        /// Include descriptor objects in the managed-objects report
        #[arg(long)]
        descriptors: bool,
    },
    /// Compare an address against known addresses
    Verify {
        received: String,
        /// Known address (repeatable); defaults to the configured list
        #[arg(short, long)]
        known: Vec<String>,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
    /// Show the config file location
    Path,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Disabled,
    Audit,
    Enforce,
}

impl From<PolicyArg> for AuthPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Disabled => AuthPolicy::Disabled,
            PolicyArg::Audit => AuthPolicy::Audit,
            PolicyArg::Enforce => AuthPolicy::Enforce,
        }
    }
}

fn init_tracing(level: &str, log_dir: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).context("Failed to create log directory")?;
            let appender = tracing_appender::rolling::daily(dir, "attentid.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let level = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    let _guard = init_tracing(&level, cli.log_dir.as_ref())?;

    match cli.command {
        Commands::Serve {
            adapter,
            auth_policy,
            known,
            local_name,
        } => cmd_serve(config, adapter, auth_policy, known, local_name).await,
        Commands::Scan { timeout } => cmd_scan(config, timeout).await,
        Commands::Tree { descriptors } => cmd_tree(config, descriptors),
        Commands::Verify { received, known } => cmd_verify(config, received, known),
        Commands::Config { action } => cmd_config(config, action),
    }
}

fn print_message(msg: &InboundMessage) {
    let verdict = match msg.verified {
        Some(true) => " verified".green().to_string(),
        Some(false) => " unverified".yellow().to_string(),
        None => String::new(),
    };
    println!(
        "  {} {}{} {}",
        "←".bright_cyan(),
        msg.device.bright_cyan(),
        verdict,
        msg.payload
    );
}

async fn print_messages(mut rx: broadcast::Receiver<InboundMessage>) {
    loop {
        match rx.recv().await {
            Ok(msg) => print_message(&msg),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Skipped {} inbound messages", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn cmd_serve(
    mut config: config::Config,
    adapter: Option<String>,
    auth_policy: Option<PolicyArg>,
    known: Vec<String>,
    local_name: Option<String>,
) -> Result<()> {
    if adapter.is_some() {
        config.peripheral.adapter = adapter;
    }
    if let Some(policy) = auth_policy {
        config.peripheral.auth_policy = policy.into();
    }
    if !known.is_empty() {
        config.peripheral.known_addresses = known;
    }
    if let Some(name) = local_name {
        config.peripheral.local_name = name;
    }

    let core = AttentId::new(config.peripheral, config.scan)?;

    println!("{}", "Starting AttentID peripheral...".bold());
    let printer = tokio::spawn(print_messages(core.subscribe()));

    let running = core.serve().await.context("Failed to start peripheral")?;

    println!("  {} Adapter: {}", "✓".green(), running.adapter());
    println!(
        "  {} Application: {}",
        "✓".green(),
        core.peripheral_config().application_path()
    );
    if running.advertising() {
        println!(
            "  {} Advertising as {}",
            "✓".green(),
            core.peripheral_config().local_name.bright_cyan()
        );
    } else {
        println!(
            "  {} Advertisement rejected; serving GATT only",
            "!".yellow()
        );
    }
    println!();
    println!("{}", "Press Ctrl+C to stop".dimmed());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            println!();
            println!("{}", "Shutting down...".bold());
        }
        _ = running.wait() => {
            tracing::warn!("GATT dispatcher stopped unexpectedly");
        }
    }

    running.shutdown().await.context("Shutdown failed")?;
    printer.abort();
    println!("  {} Unregistered", "✓".green());
    Ok(())
}

async fn cmd_scan(mut config: config::Config, timeout: Option<u64>) -> Result<()> {
    if let Some(secs) = timeout {
        config.scan.timeout_secs = secs;
    }

    let core = AttentId::new(config.peripheral, config.scan)?;

    println!(
        "{} {}s",
        "Scanning for".bold(),
        core.scan_config().timeout_secs
    );
    let printer = tokio::spawn(print_messages(core.subscribe()));

    let report = core.scan().await.context("Scan failed")?;
    printer.abort();

    println!();
    println!("{}", "Scan Report".bold());
    println!("  Detections:  {}", report.detections);
    println!("  Dispatched:  {}", report.dispatched);
    println!("  Completed:   {}", report.completed);
    if report.failed > 0 {
        println!("  Failed:      {}", report.failed.to_string().yellow());
    }
    if report.dropped > 0 {
        println!("  Dropped:     {}", report.dropped.to_string().yellow());
    }
    if report.abandoned > 0 {
        println!("  Abandoned:   {}", report.abandoned.to_string().yellow());
    }
    println!("  Devices:     {}", report.seen.len());

    let seen: Vec<&String> = report.seen.iter().collect();
    let nearby = core.router().verifier().known_nearby(&seen);
    if !core.peripheral_config().known_addresses.is_empty() {
        println!();
        if nearby.is_empty() {
            println!("  {} No known devices nearby", "✗".red());
        } else {
            for address in nearby {
                println!("  {} {} nearby", "✓".green(), address.bright_cyan());
            }
        }
    }

    Ok(())
}

fn cmd_tree(config: config::Config, descriptors: bool) -> Result<()> {
    let core = AttentId::new(config.peripheral, config.scan)?;
    let app = core.tree();
    let ad = core.advertisement();

    println!("{}", "Object Tree".bold());
    println!("  {}", app.path().bright_cyan());

    let report = if descriptors {
        app.get_managed_objects_with_descriptors()
    } else {
        app.get_managed_objects()
    };
    for (path, interfaces) in &report {
        for (interface, properties) in interfaces {
            println!("  {} {}", path.bright_cyan(), interface.dimmed());
            for (name, value) in properties {
                println!("      {}: {:?}", name, value);
            }
        }
    }

    println!();
    println!("  {} {}", ad.path().bright_cyan(), ad.interface().name().dimmed());
    for (name, value) in ad.properties() {
        println!("      {}: {:?}", name, value);
    }

    Ok(())
}

fn cmd_verify(config: config::Config, received: String, known: Vec<String>) -> Result<()> {
    let known = if known.is_empty() {
        config.peripheral.known_addresses
    } else {
        known
    };
    if known.is_empty() {
        anyhow::bail!("No known addresses; pass --known or set known_addresses");
    }

    let normalized = identity::normalize(Some(&received));
    println!("  Received:    {} ({})", received, normalized.dimmed());

    let verifier = identity::IdentityVerifier::new(known);
    match verifier.find_match(&received) {
        Some(matched) => {
            println!("  {} Matches {}", "✓".green(), matched.bright_cyan());
            Ok(())
        }
        None => {
            println!("  {} No known address matches", "✗".red());
            std::process::exit(1);
        }
    }
}

fn cmd_config(mut config: config::Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} {} = {}", "✓".green(), key.bright_cyan(), value);
        }
        ConfigAction::Get { key } => match config.get(&key) {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("Unknown config key: {}", key),
        },
        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            for (key, value) in config.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }
        }
        ConfigAction::Path => {
            println!("{}", config::Config::config_file()?.display());
        }
    }
    Ok(())
}
