//! SmartSkill - quiz backend

use smartskill::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Rustls 0.23+ needs a process-wide crypto provider for HTTPS
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        tracing::debug!("Rustls crypto provider already installed");
    }

    // RUST_LOG overrides; smartskill=info otherwise
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("smartskill=info,tower_http=info")),
        )
        .init();

    cli::run().await
}
