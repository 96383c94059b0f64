use crate::config::PreprocessingConfig;
use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use thiserror::Error;
use tracing::instrument;

const CANVAS_FILL: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Failed to fetch image: {0}")]
    Fetch(String),
    #[error("Image exceeds the {0} byte limit")]
    TooLarge(usize),
    #[error("Error decoding image: {0}")]
    Decode(String),
}

/// Size of the source image once scaled so its longer side equals `max_dimension`.
///
/// The shorter side is rounded half away from zero, so 200x5 at 100 becomes 100x3.
pub fn fit_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let aspect_ratio = width as f64 / height as f64;
    let (new_width, new_height) = if width >= height {
        (
            max_dimension as f64,
            (max_dimension as f64 / aspect_ratio).round(),
        )
    } else {
        (
            (max_dimension as f64 * aspect_ratio).round(),
            max_dimension as f64,
        )
    };

    ((new_width as u32).max(1), (new_height as u32).max(1))
}

/// Top-left corner of an item of `size` centered in `target`, floor-divided.
pub fn paste_offset(size: (u32, u32), target: (u32, u32)) -> (i64, i64) {
    let x = (target.0 as i64 - size.0 as i64).div_euclid(2);
    let y = (target.1 as i64 - size.1 as i64).div_euclid(2);
    (x, y)
}

pub fn decode_image(image_data: &[u8]) -> Result<DynamicImage, PreprocessError> {
    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;

    image_reader
        .decode()
        .map_err(|e| PreprocessError::Decode(e.to_string()))
}

pub fn resize_and_pad(
    image: &DynamicImage,
    max_dimension: u32,
    target_size: (u32, u32),
) -> RgbImage {
    let (target_width, target_height) = target_size;
    let mut canvas = RgbImage::from_pixel(target_width, target_height, CANVAS_FILL);

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return canvas;
    }

    let (new_width, new_height) = fit_dimensions(width, height, max_dimension);
    let resized = image
        .resize_exact(new_width, new_height, FilterType::Lanczos3)
        .to_rgb8();

    let (x, y) = paste_offset((new_width, new_height), target_size);
    imageops::replace(&mut canvas, &resized, x, y);

    canvas
}

#[derive(Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
    max_image_bytes: usize,
}

impl ImageFetcher {
    pub fn new(preprocessing_config: &PreprocessingConfig) -> Result<Self, PreprocessError> {
        let client = reqwest::Client::builder()
            .timeout(preprocessing_config.fetch_timeout())
            .build()
            .map_err(|e| PreprocessError::Fetch(e.to_string()))?;

        Ok(Self {
            client,
            max_image_bytes: preprocessing_config.max_image_bytes,
        })
    }

    #[instrument(skip(self, url))]
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, PreprocessError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PreprocessError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PreprocessError::Fetch(format!(
                "object download returned {}",
                status
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_image_bytes as u64 {
                return Err(PreprocessError::TooLarge(self.max_image_bytes));
            }
        }

        let mut image_data = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PreprocessError::Fetch(e.to_string()))?
        {
            if image_data.len() + chunk.len() > self.max_image_bytes {
                return Err(PreprocessError::TooLarge(self.max_image_bytes));
            }
            image_data.extend_from_slice(&chunk);
        }

        tracing::debug!("Downloaded {} bytes", image_data.len());
        Ok(image_data)
    }
}
