//! Hooks runner - loads hooks for a set of transactions and runs them.
//!
//! No HTTP traffic is sent. Useful for checking hook files and worker setups
//! against recorded transactions.

use std::path::Path;
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

use contract_hooks::HookLanguage;
use contract_hooks::HookRunner;
use contract_hooks::HookfilesPattern;
use contract_hooks::HooksConfig;
use contract_hooks::NoExchange;
use contract_hooks::RunnerContext;
use contract_hooks::config::load_config_from_file;
use contract_hooks::resolver::resolve_hookfiles;
use contract_hooks_protocol::Transaction;
use tracing::info;

#[derive(Parser)]
#[command(name = "hooks-runner")]
#[command(about = "Load contract test hooks and run them against transactions")]
struct Cli {
    /// Directory relative hookfiles patterns are resolved against
    #[arg(short = 'C', long, default_value = ".")]
    workdir: PathBuf,

    /// Path to a hooks TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hookfiles glob, may be repeated (overrides the config file)
    #[arg(long = "hookfiles")]
    hookfiles: Vec<String>,

    /// Hook language (overrides the config file)
    #[arg(long)]
    language: Option<String>,

    /// Evaluate hook files in the sandbox
    #[arg(long)]
    sandbox: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every hook phase over the transactions in a JSON file
    Run {
        /// JSON array of transactions
        transactions: PathBuf,

        /// Print the hook log after the transactions
        #[arg(long)]
        logs: bool,
    },

    /// List the hook files the configuration resolves to
    Files,

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("contract_hooks=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let workdir = cli.workdir.canonicalize().unwrap_or(cli.workdir.clone());
    let config = effective_config(&cli)?;

    match cli.command {
        Command::Run { transactions, logs } => {
            cmd_run(config, &workdir, &transactions, logs).await
        }
        Command::Files => cmd_files(&config, &workdir),
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn effective_config(cli: &Cli) -> anyhow::Result<HooksConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            eprintln!("Using config: {}", path.display());
            load_config_from_file(path)?
        }
        None => HooksConfig::default(),
    };

    if !cli.hookfiles.is_empty() {
        config.hookfiles = Some(HookfilesPattern::from(cli.hookfiles.clone()));
    }
    if let Some(language) = &cli.language {
        config.language = HookLanguage::new(language.as_str());
    }
    if cli.sandbox {
        config.sandbox = true;
    }
    config.validate()?;
    Ok(config)
}

async fn cmd_run(
    config: HooksConfig,
    workdir: &Path,
    transactions_path: &Path,
    print_logs: bool,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(transactions_path).await?;
    let mut transactions: Vec<Transaction> = serde_json::from_str(&raw)?;

    let mut runner = RunnerContext::new(config, workdir);
    contract_hooks::add_hooks(&mut runner, &transactions).await?;

    let Some(registry) = &runner.hooks else {
        anyhow::bail!("no hook registry was attached");
    };
    info!("{} hook(s) registered", registry.hooks.len());

    let failures = HookRunner::new(registry)
        .run(&mut transactions, &NoExchange)
        .await;
    registry.shutdown().await?;

    println!("{}", serde_json::to_string_pretty(&transactions)?);
    if print_logs {
        for entry in runner.logs.entries() {
            println!("[{}] {}", entry.timestamp, entry.content);
        }
    }

    let failed = transactions.iter().filter(|t| t.is_failed()).count();
    if failed > 0 {
        anyhow::bail!("{failed} transaction(s) failed ({failures} hook failure(s))");
    }
    Ok(())
}

fn cmd_files(config: &HooksConfig, workdir: &Path) -> anyhow::Result<()> {
    let files = resolve_hookfiles(config.hookfiles.as_ref(), workdir)?;
    if files.is_empty() {
        println!("No hook files configured.");
    }
    for path in files {
        println!("{}", path.display());
    }
    Ok(())
}
