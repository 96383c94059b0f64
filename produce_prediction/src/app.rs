use crate::{
    classifier::Classifier,
    config::{Config, Credentials, CredentialsError},
    labels::LabelSet,
    object_store::{ObjectLocator, S3ObjectStore},
    ort_service::OrtModelService,
    prediction::PredictionService,
    preprocessing::ImageFetcher,
    server::{HttpServer, SharedState},
    telemetry::Metrics,
};
use std::{error::Error, sync::Arc};
use thiserror::Error;
use tokio::{signal, sync::broadcast};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Cloud credentials unavailable: {0}")]
    Credentials(#[from] CredentialsError),
    #[error("Failed to load labels: {0}")]
    Labels(#[from] std::io::Error),
    #[error("Failed to load model: {0}")]
    Model(String),
}

fn load_labels(config: &Config) -> Result<LabelSet, StartupError> {
    match &config.model.labels_file {
        Some(labels_file) => Ok(LabelSet::from_file(labels_file)?),
        None => Ok(LabelSet::builtin()),
    }
}

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::error!("Failed to resolve cloud credentials: {}", e);
            return Err(Box::new(StartupError::from(e)));
        }
    };

    let labels = load_labels(&config)?;
    let model_service = OrtModelService::new(&config.model)
        .map_err(|e| StartupError::Model(e.to_string()))?;
    let classifier = match Classifier::new(
        model_service,
        labels,
        config.preprocessing.target_size(),
    ) {
        Ok(classifier) => classifier,
        Err(e) => {
            tracing::error!("Model failed the startup probe: {}", e);
            return Err(Box::new(e));
        }
    };

    let store = S3ObjectStore::new(&credentials, &config.storage);
    let locator = ObjectLocator::new(
        store,
        &config.storage.bucket,
        config.storage.presign_expiry(),
    );
    let fetcher = ImageFetcher::new(&config.preprocessing)?;
    let prediction_service = Arc::new(PredictionService::new(
        locator,
        fetcher,
        classifier,
        &config.preprocessing,
    ));

    let metrics = Arc::new(Metrics::new()?);
    let state = SharedState::new(prediction_service, metrics);
    let server = HttpServer::new(state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();
    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
