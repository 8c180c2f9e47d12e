use clap::Parser;
use lamino_core::providers::Provider;
use lamino_core::LaminoConfig;
use lamino_server::http::HttpState;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "lamino.toml")]
    config: String,

    /// Check configuration and provider credentials, then exit.
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match LaminoConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    if args.health {
        let state = match HttpState::from_config(config.clone()) {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to initialise gateway: {}", e);
                std::process::exit(1);
            }
        };

        if config.sso.dev_mode() {
            println!("⚠️  SSO client secret not set: every request runs as the developer identity");
        } else {
            println!("✅ SSO issuer: {}", config.sso.issuer);
        }
        for provider in Provider::ALL {
            let mark = if state.providers.key_configured(provider) {
                "✅"
            } else {
                "❌"
            };
            println!(
                "{} {} ({})",
                mark,
                provider.info().name,
                config.providers.endpoint(provider).base_url
            );
        }
        println!("✅ Lamino config check passed");
        return Ok(());
    }

    if config.sso.dev_mode() {
        tracing::warn!(
            "SSO client secret not configured; all requests are authenticated as the developer identity"
        );
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    lamino_server::http::start_http_server(config, tx.subscribe()).await?;

    Ok(())
}
