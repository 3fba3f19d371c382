//! External image source.
//!
//! Starting and mask images are fetched by URL and decoded into a standard
//! 3-channel RGB format before entering any pipeline.

use image::RgbImage;

use crate::error::{ErrorCode, Result, WorkerError};

/// Fetch-by-URL interface for input images.
pub trait ImageSource: Send + Sync {
    /// Fetches and decodes an image into 3-channel RGB.
    fn fetch(&self, url: &str) -> Result<RgbImage>;
}

/// HTTP-backed image source.
pub struct HttpImageSource {
    client: reqwest::blocking::Client,
}

impl HttpImageSource {
    /// Creates an image source with a bounded request timeout.
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| {
                WorkerError::new(
                    ErrorCode::ImageFetchFailed,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self { client })
    }
}

impl ImageSource for HttpImageSource {
    fn fetch(&self, url: &str) -> Result<RgbImage> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| WorkerError::image_fetch_failed(url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(WorkerError::image_fetch_failed(
                url,
                format!("HTTP {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .map_err(|e| WorkerError::image_fetch_failed(url, e.to_string()))?;

        decode_image(&bytes).map_err(|e| WorkerError::image_fetch_failed(url, e.to_string()))
    }
}

/// Decodes raw image bytes into 3-channel RGB.
pub fn decode_image(bytes: &[u8]) -> std::result::Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    #[test]
    fn decode_roundtrips_png() {
        let mut original = RgbImage::new(4, 3);
        original.put_pixel(1, 2, Rgb([200, 50, 10]));

        let mut bytes = Vec::new();
        original
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(1, 2), &Rgb([200, 50, 10]));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_image(b"not an image").is_err());
    }

    #[test]
    fn decode_converts_to_rgb() {
        // Grayscale input comes out as 3-channel RGB
        let gray = image::GrayImage::from_pixel(2, 2, image::Luma([128]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageLuma8(gray)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([128, 128, 128]));
    }
}
