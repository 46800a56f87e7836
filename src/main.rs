//! passport-spa - OAuth 2.0 authorization code + PKCE CLI
//!
#![doc = "passport-spa - OAuth 2.0 authorization code + PKCE CLI"]
#![doc = "Main entry point for the passport-spa application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use passport_spa::cli::{Cli, Commands};
use passport_spa::commands;
use passport_spa::config::ClientOptions;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    let config_path = cli.config.as_deref().unwrap_or("passport-spa.yaml");

    match cli.command {
        Commands::Login { scope, no_open } => {
            tracing::info!("Starting sign-in");
            let options = ClientOptions::load(config_path)?;
            options.validate()?;
            if let Some(s) = &scope {
                tracing::debug!("Using scope override: {}", s);
            }

            let store = commands::open_store(cli.store_path.as_deref())?;
            commands::login::run_login(options, store, scope, no_open).await?;
            Ok(())
        }
        Commands::Callback { url } => {
            tracing::info!("Completing sign-in from redirect");
            let options = ClientOptions::load(config_path)?;
            options.validate()?;

            let store = commands::open_store(cli.store_path.as_deref())?;
            commands::callback::run_callback(options, store, &url).await?;
            Ok(())
        }
        Commands::Decode { token, leeway } => {
            commands::decode::run_decode(&token, leeway)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "passport_spa=debug"
    } else {
        "passport_spa=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
