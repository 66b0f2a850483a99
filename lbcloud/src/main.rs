use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lbcloud::api;
use lbcloud::config::Config;
use lbcloud::utils::cli::Args;
use lbcloud::utils::state::AppState;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = validate_config(&args).await;

    tracing::info!("Starting lbcloud with root {}", config.root_dir.display());
    let state = Arc::new(AppState::new(config));
    let coordinator = state.coordinator.clone();
    coordinator.startup().await?;

    let app = api::create_router(state.clone());
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", state.config.host, state.config.port)).await?;
    tracing::info!(
        "listening on {}, {} entries in credential store",
        listener.local_addr()?,
        coordinator.account_count().await
    );

    let mut durability = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run_durability().await })
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    tokio::select! {
        served = server => served?,
        saved = &mut durability => {
            // the loop only ends when persisting failed
            saved??;
            anyhow::bail!("credential durability loop stopped");
        }
    }

    // no background save may overlap the final one
    durability.abort();
    if let Ok(Err(e)) = durability.await {
        tracing::warn!("Durability loop failed during shutdown: {e}");
    }
    coordinator.flush().await?;
    tracing::info!("Credential store flushed, bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down...");
}

async fn validate_config(args: &Args) -> Config {
    let mut validation_errors = Vec::new();

    let root_dir = PathBuf::from(&args.root);
    match tokio::fs::metadata(&root_dir).await {
        Ok(meta) => {
            if !meta.is_dir() {
                validation_errors.push(format!(
                    "LBCLOUD_ROOTDIR `{}` exists but is not a directory",
                    args.root,
                ));
            }
        }
        Err(_) => {
            if let Err(e) = tokio::fs::create_dir_all(&root_dir).await {
                validation_errors.push(format!(
                    "LBCLOUD_ROOTDIR `{}` does not exist and cannot be created: {e}",
                    args.root,
                ));
            }
        }
    }

    for (name, value) in [
        ("LBCLOUD_QUOTA_BYTES", args.quota_bytes),
        ("LBCLOUD_MAX_ACCOUNTS", args.max_accounts as u64),
        ("LBCLOUD_SAVE_DEBOUNCE_MS", args.save_debounce_ms),
        ("LBCLOUD_CACHE_LIMIT", args.cache_limit as u64),
    ] {
        if value == 0 {
            validation_errors.push(format!("{name} must be greater than zero"));
        }
    }

    if !validation_errors.is_empty() {
        eprintln!("{}", validation_errors.join("\n"));
        std::process::exit(1);
    }

    Config {
        host: args.host.clone(),
        port: args.port,
        root_dir,
        quota_bytes: args.quota_bytes,
        max_accounts: args.max_accounts,
        save_debounce: Duration::from_millis(args.save_debounce_ms),
        cache_limit: args.cache_limit,
        lock_timeout: Duration::from_millis(args.lock_timeout_ms),
        digest: args.digest,
    }
}
