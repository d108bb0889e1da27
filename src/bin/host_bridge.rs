//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! Reads `InboundEnvelope` messages as newline-delimited JSON from stdin,
//! routes them through the background router, and writes `OutboundEnvelope`
//! messages to stdout.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.
//!
//! `meanai-host --init-config` writes the default configuration file and
//! exits.

use meanai::config::{MeanAiConfig, write_config_atomic};
use meanai::host::stdio::run_stdio_bridge;
use meanai::model::ollama::{OllamaConfig, OllamaModel};
use meanai::paths;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = paths::config_file();
    if std::env::args().skip(1).any(|arg| arg == "--init-config") {
        write_config_atomic(&config_path, &MeanAiConfig::default())?;
        tracing::info!(path = %config_path.display(), "wrote default config");
        return Ok(());
    }

    let config = MeanAiConfig::load_or_default(&config_path)?;
    tracing::info!(
        endpoint = %config.model.endpoint_url,
        model = %config.model.model_name,
        "meanai-host starting"
    );

    let model = Arc::new(OllamaModel::new(OllamaConfig::from(&config.model)));
    run_stdio_bridge(&config, model).await.map_err(|e| {
        tracing::error!(error = %e, "meanai-host exited with error");
        anyhow::anyhow!("meanai-host failed: {e}")
    })?;

    tracing::info!("meanai-host shut down cleanly");
    Ok(())
}
