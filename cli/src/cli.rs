//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::config::FleetPaths;
use crate::infra::inventory::InventoryStore;
use crate::infra::known_hosts::KnownHostsStore;
use crate::infra::ssh::SshTransport;
use crate::output::{OutputContext, json};

/// Manage a fleet of remote agent nodes over SSH
#[derive(Parser)]
#[command(
    name = "flotilla",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Register a node in the inventory
    Add(commands::add::AddArgs),

    /// List registered nodes
    List,

    /// Show one node in detail
    Show(commands::show::ShowArgs),

    /// Remove a node and its pinned host keys
    Remove(commands::remove::RemoveArgs),

    /// Verify connectivity and pin the node's host key
    Ping(commands::ping::PingArgs),

    /// Install and start the agent on a node
    Bootstrap(commands::bootstrap::BootstrapArgs),

    /// Check agent health on one node or the whole fleet
    Status(commands::status::StatusArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails; in `--json` mode a
    /// structured error object is also printed to stdout.
    pub async fn run(self) -> Result<()> {
        let Cli { json, quiet, no_color, command } = self;
        let ctx = OutputContext::new(no_color, quiet);
        let result = dispatch(&ctx, command, json).await;
        if json {
            if let Err(e) = &result {
                println!("{}", json::format_error(&format!("{e:#}"), "error")?);
            }
        }
        result
    }
}

async fn dispatch(ctx: &OutputContext, command: Command, json: bool) -> Result<()> {
    if let Command::Version = command {
        commands::version::run(json);
        return Ok(());
    }

    let paths = FleetPaths::from_env()?;
    let store = InventoryStore::new(&paths);
    let hosts = KnownHostsStore::new(&paths);
    let transport = SshTransport;

    match command {
        Command::Add(args) => commands::add::run(ctx, &store, &args, json),
        Command::List => commands::list::run(ctx, &store, json),
        Command::Show(args) => commands::show::run(ctx, &store, &hosts, &args, json),
        Command::Remove(args) => commands::remove::run(ctx, &store, &hosts, &args, json),
        Command::Ping(args) => {
            commands::ping::run(ctx, &transport, &store, &hosts, &args, json).await
        }
        Command::Bootstrap(args) => {
            commands::bootstrap::run(ctx, &transport, &store, &hosts, &args, json).await
        }
        Command::Status(args) => {
            commands::status::run(ctx, &std::sync::Arc::new(transport), &store, &hosts, &args, json)
                .await
        }
        // Handled before any fleet state is touched.
        Command::Version => Ok(()),
    }
}
