//! # synctrust CLI Application
//!
//! Entry point for administering the trust store and the event registry
//! of a file synchronization node.

use anyhow::Result;
use clap::Parser;
use colored::*;
use synctrust::cli::{self, Cli, Commands};
use synctrust::TrustContext;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "synctrust=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command).await {
        eprintln!("{} {}\n{}", "Error:".red().bold(), e.to_string().red(), "Tip: Run with --help for usage information.".yellow());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Commands) -> Result<()> {
    // Fingerprinting needs no master key
    if let Commands::Fingerprint { path } = &command {
        return cli::fingerprint(path);
    }

    // A missing or malformed master key stops the process here
    let context = TrustContext::from_env()?;

    let result = match command {
        Commands::Init => cli::init(&context),
        Commands::Keys { action } => cli::keys(&context, action),
        Commands::Connections { action } => cli::connections(&context, action),
        Commands::Encrypt { host, message } => cli::encrypt(&context, &host, &message),
        Commands::Decrypt { key, ciphertext } => cli::decrypt(&context, &key, &ciphertext),
        Commands::Events { action } => cli::events(&context, action),
        Commands::Listeners { action } => cli::listeners(&context, action),
        Commands::Subscribe { item, listener } => cli::subscribe(&context, &item, &listener),
        Commands::Unsubscribe { item, listener } => cli::unsubscribe(&context, &item, &listener),
        Commands::Items { action } => cli::items(&context, action),
        Commands::Trigger { item, path } => cli::trigger(&context, &item, path),
        Commands::Watch { debounce_ms } => cli::watch(&context, debounce_ms).await,
        Commands::Fingerprint { path } => cli::fingerprint(&path),
    };

    context.shutdown();
    result
}
