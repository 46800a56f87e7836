//! Command-line interface definition for passport-spa
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to sign in, complete a redirect, and inspect tokens.

use clap::{Parser, Subcommand};

/// passport-spa - sign in against a Laravel Passport server
///
/// Runs the authorization code + PKCE flow, persisting the in-flight
/// request so that a later `callback` invocation can complete it.
#[derive(Parser, Debug, Clone)]
#[command(name = "passport-spa")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "passport-spa.yaml")]
    pub config: Option<String>,

    /// Path to the correlation store database
    #[arg(long = "store", env = "PASSPORT_SPA_STORE")]
    pub store_path: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for passport-spa
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in, silently if possible, otherwise through the browser
    Login {
        /// Scope to request instead of the configured one
        #[arg(short, long)]
        scope: Option<String>,

        /// Only print the authorize URL; do not try a silent sign-in or
        /// open the browser
        #[arg(long)]
        no_open: bool,
    },

    /// Complete a sign-in from the URL the browser was redirected to
    Callback {
        /// Full redirect URL including its query string
        url: String,
    },

    /// Print the claims of an access token
    Decode {
        /// The raw token
        token: String,

        /// Seconds to subtract from the expiration
        #[arg(short, long)]
        leeway: Option<i64>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
