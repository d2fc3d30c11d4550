use clap::Parser;
use exn::ResultExt;
use pdf_renderer::error::{ErrorKind, Result};
use pdf_renderer::{AppState, router, telemetry};
use pdf_renderer_config::{Config, Overrides};
use pdf_renderer_render::{CdpEngine, Chrome, Renderer, SettleOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, env = "PDF_RENDERER_CONFIG")]
    config: Option<PathBuf>,
    /// Address to listen on.
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let overrides = Overrides { host: cli.host, port: cli.port };
    let config = Config::load(cli.config.as_deref(), &overrides).or_raise(|| ErrorKind::Config)?;
    telemetry::init(&config.log)?;

    let chrome = Chrome::discover(config.chrome.executable.as_deref()).or_raise(|| ErrorKind::Browser)?;
    tracing::info!(path = %chrome.path().display(), "Using Chrome");
    let engine = CdpEngine::new(chrome).with_sandbox(config.chrome.sandbox).with_args(config.chrome.args.clone());
    let settle = SettleOptions {
        fonts: config.settle.fonts,
        before_print: config.settle.before_print,
        eager_images: config.settle.eager_images,
        asset_timeout: config.settle.asset_timeout(),
        delay: config.settle.delay(),
    };
    let renderer = Renderer::new(Arc::new(engine)).with_settle(settle);
    let state = AppState::new(config.auth.clone(), renderer).with_body_limit(config.server.body_limit);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.or_raise(|| ErrorKind::Bind(addr.clone()))?;
    tracing::info!(addr = %addr, "pdf-renderer listening on {}", config.server.port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .or_raise(|| ErrorKind::Serve)?;
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
