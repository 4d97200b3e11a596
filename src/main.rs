use anyhow::Context;

use decode_agent::agent;
use decode_agent::config::WorkerConfig;
use decode_agent::identity::WorkerIdentity;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env for local runs
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = WorkerConfig::from_env().context("Invalid configuration")?;

    let http = reqwest::Client::new();
    let identity = WorkerIdentity::resolve(&http, &config.ipv4_lookup_url).await;
    let agent = agent::start(&config, http, identity)
        .await
        .context("Failed to start agent")?;

    eprintln!("Decode agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Worker: {}", agent.worker);
    eprintln!("   Controller: {}", config.controller_url);
    eprintln!(
        "   Queue: {} ({}, {})",
        config.queue, config.language, config.sampling_rate
    );
    eprintln!("   Storage: {}", config.storage.backend_name());
    eprintln!("   Work dir: {}", config.work_dir.display());
    eprintln!(
        "   Polling every {:?}, decoder start timeout {:?}",
        config.poll_interval, config.decoder_start_timeout
    );
    eprintln!("   Callbacks: http://0.0.0.0:{}/status\n", config.port);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Agent server started");
    axum::serve(listener, agent.routes()).await?;

    Ok(())
}
