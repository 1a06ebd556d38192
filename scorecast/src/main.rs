use anyhow::Context;
use clap::Parser;
use scorecast::{
    Application, Config,
    auth::password,
    model::training::{self, Dataset},
    telemetry,
};
use std::path::{Path, PathBuf};

/// Fit a model artifact from `data` and write it to `output`
fn train(data: &Path, output: &Path, version: Option<String>) -> anyhow::Result<()> {
    let dataset = Dataset::from_path(data).with_context(|| format!("reading {}", data.display()))?;
    let report = training::fit(&dataset, version)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&report.artifact)?;
    std::fs::write(output, json + "\n").with_context(|| format!("writing {}", output.display()))?;

    println!(
        "Trained on {} rows, held out {} (R² {}). Wrote {}",
        report.train_rows,
        report.holdout_rows,
        report.holdout_r2.map_or_else(|| "n/a".to_string(), |r2| format!("{r2:.4}")),
        output.display()
    );
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before anything else that might build a TLS client
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let args = scorecast::config::Args::parse();

    // Hashing needs no configuration file
    if let Some(plaintext) = args.hash_password.as_deref() {
        println!("{}", password::hash_password(plaintext)?);
        return Ok(());
    }

    if let Some(data) = args.train.as_deref() {
        let output = args
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from("models/student_score_model.json"));
        return train(data, &output, args.model_version.clone());
    }

    let config = Config::load(&args)?;

    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry(config.enable_otel_export)?;

    tracing::debug!("{:?}", args);

    let shutdown = shutdown_signal();
    Application::new(config).await?.serve(shutdown).await
}
