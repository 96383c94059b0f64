use crate::{labels::LabelSet, model_service::ModelService};
use image::{Rgb, RgbImage};
use ndarray::{Array, Array4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Model failure: {0}")]
    Model(String),
    #[error("Model and labels disagree: {0}")]
    Integrity(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub index: usize,
    pub score: f32,
}

/// Converts an RGB canvas into a single-item NHWC batch with values in `[0, 1]`.
pub fn to_input_tensor(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut input = Array::zeros((1, height as usize, width as usize, 3));
    for (x, y, pixel) in image.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, y, x, 0]] = (r as f32) / 255.;
        input[[0, y, x, 1]] = (g as f32) / 255.;
        input[[0, y, x, 2]] = (b as f32) / 255.;
    }
    input
}

/// Index and value of the highest score; the lowest index wins ties.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
}

pub struct Classifier<M: ModelService> {
    model: M,
    labels: LabelSet,
    input_size: (u32, u32),
}

impl<M: ModelService> Classifier<M> {
    /// Fails unless the model's output length matches the label count on a
    /// blank probe image.
    pub fn new(
        model: M,
        labels: LabelSet,
        input_size: (u32, u32),
    ) -> Result<Self, ClassifierError> {
        if labels.is_empty() {
            return Err(ClassifierError::Integrity("label list is empty".to_string()));
        }

        let classifier = Self {
            model,
            labels,
            input_size,
        };

        let probe = RgbImage::from_pixel(input_size.0, input_size.1, Rgb([255, 255, 255]));
        let prediction = classifier.classify(&probe)?;
        tracing::info!(
            labels = classifier.labels.len(),
            probe_label = %prediction.label,
            "Model output matches label list"
        );

        Ok(classifier)
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn classify(&self, image: &RgbImage) -> Result<Prediction, ClassifierError> {
        if image.dimensions() != self.input_size {
            return Err(ClassifierError::Integrity(format!(
                "expected a {}x{} image, got {}x{}",
                self.input_size.0,
                self.input_size.1,
                image.width(),
                image.height()
            )));
        }

        let input = to_input_tensor(image);
        let scores = self.model.predict(&input)?;

        if scores.len() != self.labels.len() {
            return Err(ClassifierError::Integrity(format!(
                "model produced {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }
        if let Some(position) = scores.iter().position(|score| !score.is_finite()) {
            return Err(ClassifierError::Integrity(format!(
                "non-finite score at index {}",
                position
            )));
        }

        let (index, score) = argmax(&scores)
            .ok_or_else(|| ClassifierError::Integrity("model produced no scores".to_string()))?;
        let label = self
            .labels
            .get(index)
            .ok_or_else(|| ClassifierError::Integrity(format!("no label for index {}", index)))?;

        Ok(Prediction {
            label: label.to_string(),
            index,
            score,
        })
    }
}
