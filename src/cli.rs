//! # Command Line Interface
//!
//! Administration commands for the trust store and the event registry.
//!
//! ## Commands
//!
//! - `init` - Write default settings and provision the key store
//! - `keys` - Generate, list, show and delete key pairs
//! - `connections` - Manage trusted host public keys
//! - `encrypt` / `decrypt` - Seal a message for a host, open one with a key
//! - `events` / `listeners` - Edit the event registry
//! - `subscribe` / `unsubscribe` - Route item changes to listeners
//! - `items` - Manage the sync items the watcher follows
//! - `trigger` - Fire the jobs subscribed to an item
//! - `fingerprint` - Print the content fingerprint of a path
//! - `watch` - Trigger items as their files change

use crate::context::TrustContext;
use crate::crypto;
use crate::debounce::DebouncerConfig;
use crate::item::SyncItem;
use crate::job::Job;
use crate::watcher::ItemWatcher;
use anyhow::{Context, Result};
use base64::prelude::*;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "synctrust")]
#[command(about = "Trust store and event dispatch for file synchronization")]
#[command(version = "1.0.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write default settings and provision the key store
    Init,

    /// Manage key pairs
    Keys {
        #[command(subcommand)]
        action: KeyCommand,
    },

    /// Manage trusted hosts
    Connections {
        #[command(subcommand)]
        action: ConnectionCommand,
    },

    /// Encrypt a message for a trusted host (prints base64)
    Encrypt {
        host: String,
        message: String,
    },

    /// Decrypt a base64 message with one of our key pairs
    Decrypt {
        /// Name of the key pair
        #[arg(short, long, default_value = "default")]
        key: String,
        ciphertext: String,
    },

    /// Manage events
    Events {
        #[command(subcommand)]
        action: EventCommand,
    },

    /// Manage listeners
    Listeners {
        #[command(subcommand)]
        action: ListenerCommand,
    },

    /// Route changes of an item to a listener
    Subscribe { item: String, listener: String },

    /// Stop routing changes of an item to a listener
    Unsubscribe { item: String, listener: String },

    /// Manage watched sync items
    Items {
        #[command(subcommand)]
        action: ItemCommand,
    },

    /// Fire the jobs subscribed to an item
    Trigger {
        item: String,
        /// Path of the item when it is not a configured sync item
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Print the content fingerprint of a file or directory
    Fingerprint { path: PathBuf },

    /// Watch configured items and trigger them on change
    Watch {
        /// Quiet period in milliseconds before an item fires
        #[arg(long, default_value_t = 200)]
        debounce_ms: u64,
    },
}

#[derive(Subcommand)]
pub enum KeyCommand {
    /// Generate a key pair
    New {
        name: String,
        /// Fail instead of replacing an existing key pair
        #[arg(long)]
        strict: bool,
    },
    /// List key pair names
    List,
    /// Print the public key of a key pair
    Show { name: String },
    /// Delete a key pair
    Delete { name: String },
}

#[derive(Subcommand)]
pub enum ConnectionCommand {
    /// Trust a host's PEM public key
    Add { host: String, public_key: PathBuf },
    /// List trusted hosts
    List,
    /// Stop trusting a host
    Delete { host: String },
}

#[derive(Subcommand)]
pub enum EventCommand {
    /// Register an event that logs a message
    AddLog {
        name: String,
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Register an event that runs a program
    AddCommand {
        name: String,
        program: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Register an event that verifies the item fingerprint
    AddVerify { name: String },
    /// Remove an event
    Remove { name: String },
    /// Show events, listeners and subscriptions
    List,
}

#[derive(Subcommand)]
pub enum ListenerCommand {
    /// Register a listener for an item firing the given events in order
    Add {
        name: String,
        item: String,
        #[arg(required = true)]
        events: Vec<String>,
    },
    /// Remove a listener and its subscriptions
    Remove { name: String },
}

#[derive(Subcommand)]
pub enum ItemCommand {
    /// Add a sync item and record its fingerprint
    Add {
        path: PathBuf,
        /// Item name; defaults to the current timestamp
        #[arg(short, long)]
        name: Option<String>,
        #[arg(long, default_value = "localhost")]
        host: String,
    },
    /// List sync items
    List,
}

/// Create the configuration directory and the key store.
pub fn init(context: &TrustContext) -> Result<()> {
    let settings = context.settings();
    if !settings.config_dir.join("config.toml").exists() {
        settings.save()?;
    }

    let keys = context.keys().key_names()?;
    info!("Key store ready at {}", settings.keystore_path().display());

    println!("✅ synctrust initialized at {}", settings.config_dir.display());
    println!("   Keys: {}", keys.join(", "));
    Ok(())
}

pub fn keys(context: &TrustContext, action: KeyCommand) -> Result<()> {
    let store = context.keys();
    match action {
        KeyCommand::New { name, strict } => {
            let pair = if strict {
                store.create_key(&name)?
            } else {
                store.new_key(&name)?
            };
            println!("🔑 Generated key pair '{}'", pair.name);
            print!("{}", pair.public_key);
        }
        KeyCommand::List => {
            for name in store.key_names()? {
                println!("{}", name);
            }
        }
        KeyCommand::Show { name } => {
            let pair = store
                .get_key(&name)?
                .with_context(|| format!("No key pair named '{}'", name))?;
            print!("{}", pair.public_key);
        }
        KeyCommand::Delete { name } => {
            if store.delete_key(&name)? {
                println!("🗑  Deleted key pair '{}'", name);
            } else {
                println!("{}", format!("No key pair named '{}'", name).yellow());
            }
        }
    }
    Ok(())
}

pub fn connections(context: &TrustContext, action: ConnectionCommand) -> Result<()> {
    let store = context.keys();
    match action {
        ConnectionCommand::Add { host, public_key } => {
            let pem = std::fs::read_to_string(&public_key)
                .with_context(|| format!("Failed to read {}", public_key.display()))?;
            store.add_connection(&host, &crypto::parse_public_key(&pem)?)?;
            println!("🔐 Trusted '{}'", host);
        }
        ConnectionCommand::List => {
            for host in store.connection_hosts()? {
                println!("{}", host);
            }
        }
        ConnectionCommand::Delete { host } => {
            if store.delete_connection(&host)? {
                println!("🗑  Removed '{}'", host);
            } else {
                println!("{}", format!("'{}' is not trusted", host).yellow());
            }
        }
    }
    Ok(())
}

pub fn encrypt(context: &TrustContext, host: &str, message: &str) -> Result<()> {
    let sealed = context
        .keys()
        .encrypt_for(host, message.as_bytes())?
        .with_context(|| format!("'{}' is not a trusted host", host))?;
    println!("{}", BASE64_STANDARD.encode(sealed));
    Ok(())
}

pub fn decrypt(context: &TrustContext, key: &str, ciphertext: &str) -> Result<()> {
    let pair = context
        .keys()
        .get_key(key)?
        .with_context(|| format!("No key pair named '{}'", key))?;
    let sealed = BASE64_STANDARD
        .decode(ciphertext.trim())
        .context("Ciphertext is not valid base64")?;
    let plaintext = pair.decrypt(&sealed)?;
    println!("{}", String::from_utf8_lossy(&plaintext));
    Ok(())
}

pub fn events(context: &TrustContext, action: EventCommand) -> Result<()> {
    let registry = context.events();
    match action {
        EventCommand::AddLog { name, message } => registry.add_event(&name, Job::Log { message })?,
        EventCommand::AddCommand { name, program, args } => {
            registry.add_event(&name, Job::Command { program, args })?
        }
        EventCommand::AddVerify { name } => registry.add_event(&name, Job::Verify)?,
        EventCommand::Remove { name } => {
            if !registry.remove_event(&name)? {
                println!("{}", format!("No event named '{}'", name).yellow());
            }
        }
        EventCommand::List => {
            let handle = registry.acquire()?;
            let snapshot = handle.read();

            println!("{}", "Events".bold());
            for event in snapshot.events.values() {
                println!("  {} {:?}", event.name, event.job);
            }
            println!("{}", "Listeners".bold());
            for (name, listener) in &snapshot.listeners {
                println!("  {} ({}) -> {}", name, listener.sync_item_name, listener.event_names.join(", "));
            }
            println!("{}", "Subscriptions".bold());
            for (item, listeners) in &snapshot.subscribes {
                println!("  {} -> {}", item, listeners.join(", "));
            }
        }
    }
    Ok(())
}

pub fn listeners(context: &TrustContext, action: ListenerCommand) -> Result<()> {
    let registry = context.events();
    match action {
        ListenerCommand::Add { name, item, events } => {
            for event in &events {
                if registry.find_event(event)?.is_none() {
                    println!("{}", format!("Warning: event '{}' is not registered yet", event).yellow());
                }
            }
            registry.add_listener(&name, &item, events)?;
            println!("👂 Listener '{}' subscribed to '{}'", name, item);
        }
        ListenerCommand::Remove { name } => {
            if !registry.remove_listener(&name)? {
                println!("{}", format!("No listener named '{}'", name).yellow());
            }
        }
    }
    Ok(())
}

pub fn subscribe(context: &TrustContext, item: &str, listener: &str) -> Result<()> {
    context.events().subscribe(item, listener)?;
    println!("'{}' -> '{}'", item, listener);
    Ok(())
}

pub fn unsubscribe(context: &TrustContext, item: &str, listener: &str) -> Result<()> {
    if !context.events().unsubscribe(item, listener)? {
        println!("{}", format!("'{}' was not subscribed to '{}'", listener, item).yellow());
    }
    Ok(())
}

pub fn items(context: &TrustContext, action: ItemCommand) -> Result<()> {
    let settings = context.settings();
    let mut items = settings.load_items()?;
    match action {
        ItemCommand::Add { path, name, host } => {
            if !path.exists() {
                anyhow::bail!("Path does not exist: {}", path.display());
            }
            let canonical = path.canonicalize()?;
            let mut item = match name {
                Some(name) => SyncItem::new(name, canonical, path.is_dir()),
                None => SyncItem::unnamed(canonical, path.is_dir()),
            }
            .with_host(host);
            item.set_hash()?;

            let name = item.name.clone();
            items.retain(|existing| existing.name != name);
            items.push(item);
            settings.save_items(&items)?;
            println!("✅ Added item '{}'", name);
        }
        ItemCommand::List => {
            if items.is_empty() {
                println!("No sync items. Add one with: synctrust items add <path> --name <name>");
            }
            for item in items {
                let kind = if item.is_dir { "dir" } else { "file" };
                println!("  {} ({}, {}) {}", item.name, kind, item.host, item.path.display());
            }
        }
    }
    Ok(())
}

pub fn trigger(context: &TrustContext, name: &str, path: Option<PathBuf>) -> Result<()> {
    let configured = context.settings().load_items()?.into_iter().find(|item| item.name == name);
    let item = match (configured, path) {
        (_, Some(path)) => SyncItem::new(name, &path, path.is_dir()),
        (Some(item), None) => item,
        (None, None) => SyncItem::new(name, ".", true),
    };

    let report = context.dispatcher().trigger(&item)?;
    if report.invoked() == 0 {
        println!("No jobs subscribed to '{}'", name);
        return Ok(());
    }

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(()) => println!("  {} {} ({})", "✔".green(), outcome.event, outcome.listener),
            Err(e) => println!("  {} {} ({}): {}", "✘".red(), outcome.event, outcome.listener, e),
        }
    }

    let failed = report.failures().count();
    if failed > 0 {
        anyhow::bail!("{} of {} job(s) failed for '{}'", failed, report.invoked(), name);
    }
    Ok(())
}

pub fn fingerprint(path: &std::path::Path) -> Result<()> {
    let digest = crate::fingerprint::fingerprint(path, path.is_dir())
        .with_context(|| format!("Failed to fingerprint {}", path.display()))?;
    println!("{}", digest);
    Ok(())
}

pub async fn watch(context: &TrustContext, debounce_ms: u64) -> Result<()> {
    let items = context.settings().load_items()?;
    if items.is_empty() {
        anyhow::bail!("No sync items to watch. Add one with 'synctrust items add <path> --name <name>'");
    }

    let watcher = ItemWatcher::new(items)?;
    println!("👀 Watching {} item(s). Press Ctrl+C to stop.", watcher.watched_items());

    let config = DebouncerConfig {
        debounce_delay: std::time::Duration::from_millis(debounce_ms),
        ..Default::default()
    };
    watcher.run(context.dispatcher().clone(), config).await
}
