use crate::{
    classifier::{Classifier, ClassifierError, Prediction},
    config::PreprocessingConfig,
    model_service::ModelService,
    object_store::{LocatorError, ObjectLocator, ObjectStore},
    preprocessing::{decode_image, resize_and_pad, ImageFetcher, PreprocessError},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error(transparent)]
    Locator(#[from] LocatorError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("Prediction task failed: {0}")]
    Task(String),
}

/// Locate, download, preprocess and classify the most recent upload.
pub struct PredictionService<S: ObjectStore, M: ModelService> {
    locator: ObjectLocator<S>,
    fetcher: ImageFetcher,
    classifier: Arc<Classifier<M>>,
    max_dimension: u32,
    target_size: (u32, u32),
}

impl<S: ObjectStore, M: ModelService> PredictionService<S, M> {
    pub fn new(
        locator: ObjectLocator<S>,
        fetcher: ImageFetcher,
        classifier: Classifier<M>,
        preprocessing_config: &PreprocessingConfig,
    ) -> Self {
        Self {
            locator,
            fetcher,
            classifier: Arc::new(classifier),
            max_dimension: preprocessing_config.max_dimension,
            target_size: preprocessing_config.target_size(),
        }
    }

    pub fn bucket(&self) -> &str {
        self.locator.bucket()
    }

    pub fn label_count(&self) -> usize {
        self.classifier.labels().len()
    }

    #[instrument(skip(self), fields(bucket = %self.locator.bucket()))]
    pub async fn predict_latest(&self) -> Result<Prediction, PredictionError> {
        let reference = self.locator.locate_latest().await?;
        tracing::debug!(
            key = %reference.key,
            expires_in_secs = reference.expires_in.as_secs(),
            "Downloading through pre-signed URL"
        );
        let image_data = self.fetcher.fetch(&reference.url).await?;

        let classifier = self.classifier.clone();
        let max_dimension = self.max_dimension;
        let target_size = self.target_size;

        let prediction = tokio::task::spawn_blocking(move || {
            let image = decode_image(&image_data)?;
            let canvas = resize_and_pad(&image, max_dimension, target_size);
            Ok::<_, PredictionError>(classifier.classify(&canvas)?)
        })
        .await
        .map_err(|e| PredictionError::Task(e.to_string()))??;

        tracing::info!(
            key = %reference.key,
            label = %prediction.label,
            index = prediction.index,
            score = prediction.score,
            "Classified most recent upload"
        );

        Ok(prediction)
    }
}
