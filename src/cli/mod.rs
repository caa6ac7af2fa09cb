//! CLI module - Command-line interface for Sorbet
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Overrides;

/// Sorbet - a small self-hosted web console
#[derive(Parser)]
#[command(name = "sorbet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Use during development, not production
    #[arg(long, global = true)]
    pub debug: bool,

    /// Port for webserver to bind to
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Interface for webserver to bind to
    #[arg(long, global = true)]
    pub interface: Option<String>,

    /// Database driver (sqlite, postgres, mysql)
    #[arg(long, global = true)]
    pub driver: Option<String>,

    /// Database string
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Path to a config file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            debug: self.debug,
            port: self.port,
            interface: self.interface.clone(),
            driver: self.driver.clone(),
            database: self.database.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web console (default)
    Web,

    /// Manage game servers reachable over RCON
    Servers {
        #[command(subcommand)]
        command: ServerCommands,
    },
}

#[derive(Subcommand)]
pub enum ServerCommands {
    /// List stored servers
    #[command(alias = "ls")]
    List,
    /// Store a new server
    Add {
        /// Hostname or IP address
        host: String,
        /// RCON port
        #[arg(long, default_value_t = 25575)]
        port: u16,
        /// RCON password
        #[arg(long)]
        password: String,
    },
    /// Remove a stored server
    #[command(alias = "rm")]
    Remove {
        /// Server ID
        id: i32,
    },
    /// Send a single console command and print the response
    Cmd {
        /// Server ID
        id: i32,
        /// Command to run, e.g. `list`
        #[arg(required = true)]
        command: Vec<String>,
    },
}

pub use commands::*;
