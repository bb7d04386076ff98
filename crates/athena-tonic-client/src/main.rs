use athena_tonic_client::{
    AthenaClient, ImageData, TokenCache,
    config::{ClientConfig, CliArgs, CorrelationStrategy},
    output::{error_code_name, log_output_errors},
    proto::ClassificationOutput,
    telemetry::init_telemetry,
};
use clap::Parser;
use futures::{StreamExt, stream};
use std::{collections::HashMap, path::PathBuf};
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ClientConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let result = tokio::select! {
        res = run(config) => res,
        () = shutdown_signal() => {
            tracing::info!("Shutdown signal received, stopping classification");
            Ok(())
        }
    };

    providers.shutdown();
    result
}

async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let cache = TokenCache::with_options(
        config.client_id.clone(),
        config.client_secret.clone(),
        config.auth.clone(),
    )?;

    tracing::info!(
        "Connecting to {} (deployment {}, affiliate {})",
        config.client.host,
        config.client.deployment_id,
        config.client.affiliate
    );
    let client = AthenaClient::connect(config.client.clone(), cache)?;

    if config.list_deployments {
        let response = client.list_deployments().await?;
        for deployment in response.deployments {
            println!("{}\tbacklog={}", deployment.deployment_id, deployment.backlog);
        }
        return Ok(());
    }

    let (images, names) = load_images(&config.images, config.client.correlation).await;
    if images.is_empty() {
        anyhow::bail!("None of the given images could be read");
    }

    let expected = images.len();
    let mut received = 0;
    let mut responses = client.classify_images(stream::iter(images))?;

    // Keepalives continue after the last image, so stop once every output is
    // in.
    while received < expected {
        let Some(response) = responses.next().await else {
            tracing::warn!("Stream ended with {received} of {expected} outputs");
            break;
        };
        let response = response?;
        log_output_errors(&response);
        for output in &response.outputs {
            println!("{}", format_output(output, &names));
        }
        received += response.outputs.len();
    }

    Ok(())
}

/// Reads every path, skipping unreadable files. With hash correlation ids the
/// returned map resolves an id back to its file.
async fn load_images(
    paths: &[PathBuf],
    correlation: CorrelationStrategy,
) -> (Vec<ImageData>, HashMap<String, PathBuf>) {
    let mut images = Vec::with_capacity(paths.len());
    let mut names = HashMap::new();

    for path in paths {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let image = ImageData::new(bytes);
                if correlation == CorrelationStrategy::Hash {
                    names.insert(image.sha256_hashes()[0].clone(), path.clone());
                }
                images.push(image);
            }
            Err(e) => tracing::warn!("Skipping {}: {e}", path.display()),
        }
    }

    (images, names)
}

fn format_output(output: &ClassificationOutput, names: &HashMap<String, PathBuf>) -> String {
    let name = names.get(&output.correlation_id).map_or_else(
        || output.correlation_id.clone(),
        |path| path.display().to_string(),
    );

    match output.error.as_ref().filter(|e| !e.message.is_empty()) {
        Some(error) => format!("{name}\terror={} {}", error_code_name(error.code), error.message),
        None => {
            let labels: Vec<_> = output
                .classifications
                .iter()
                .map(|c| format!("{}={:.3}", c.label, c.weight))
                .collect();
            format!("{name}\t{}", labels.join(","))
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
