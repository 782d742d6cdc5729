// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! nclink CLI
//!
//! Command-line interface for inspecting the nclink size contract and
//! exercising the link handshake.

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

use nclink_core::StructKind;

/// nclink - link handshake between an event monitor and its client
#[derive(Parser)]
#[command(name = "nclink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Structure kinds whose declared size can be corrupted in a handshake run.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CorruptKind {
    ImageEvent,
    ProcessEvent,
    ThreadEvent,
    ImageContainer,
    ProcessContainer,
    ThreadContainer,
    Return,
}

impl From<CorruptKind> for StructKind {
    fn from(kind: CorruptKind) -> Self {
        match kind {
            CorruptKind::ImageEvent => StructKind::ImageEvent,
            CorruptKind::ProcessEvent => StructKind::ProcessEvent,
            CorruptKind::ThreadEvent => StructKind::ThreadEvent,
            CorruptKind::ImageContainer => StructKind::ImageContainer,
            CorruptKind::ProcessContainer => StructKind::ProcessContainer,
            CorruptKind::ThreadContainer => StructKind::ThreadContainer,
            CorruptKind::Return => StructKind::ConnectOutput,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },

    /// Print the structure size contract
    Sizes {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run a registration against an in-process controller
    Handshake {
        /// Configuration file supplying the verifier secret
        #[arg(short, long)]
        config: Option<String>,

        /// Declare a wrong size for this structure
        #[arg(long, value_enum)]
        corrupt: Option<CorruptKind>,

        /// Sign the request with the wrong secret
        #[arg(long)]
        deny: bool,

        /// Send a second registration after the first
        #[arg(long)]
        twice: bool,
    },

    /// Show the encryption settings of this build
    Encryption,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match cli.command {
        Commands::Validate { file } => commands::validate::execute(&file).await,
        Commands::Sizes { json } => commands::sizes::execute(json).await,
        Commands::Handshake {
            config,
            corrupt,
            deny,
            twice,
        } => {
            let options = commands::handshake::HandshakeOptions {
                config,
                corrupt: corrupt.map(StructKind::from),
                deny,
                twice,
            };
            commands::handshake::execute(options).await
        }
        Commands::Encryption => commands::encryption::execute().await,
    }
}
