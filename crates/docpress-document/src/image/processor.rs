// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — resize and JPEG re-compression of uploaded images using
// the `image` crate.

use std::io::Cursor;

use docpress_core::error::DocpressError;
use image::{DynamicImage, ImageFormat};
use tracing::{debug, info, instrument};

/// Formats written back unchanged by [`ImageProcessor::resize`]. Anything
/// else decodes fine but is re-encoded as JPEG.
const PASSTHROUGH_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::Bmp,
];

/// Largest resize target box, in pixels. Resizing fits the image to the
/// box, so the output never exceeds this either.
pub const MAX_RESIZE_PIXELS: u64 = 100_000_000;

/// A decoded upload plus the format it arrived in.
///
/// Operations consume `self` and hand back a new processor so they chain:
///
/// ```ignore
/// let thumb = ImageProcessor::from_bytes(&upload)?
///     .resize(320, 240)
///     .to_bytes()?;
/// ```
pub struct ImageProcessor {
    image: DynamicImage,
    format: ImageFormat,
}

impl ImageProcessor {
    /// Decode an upload, sniffing its format from the leading bytes.
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, DocpressError> {
        let format = image::guess_format(data).map_err(|err| {
            DocpressError::UnsupportedDocument(format!("not a recognised image: {err}"))
        })?;
        let image = image::load_from_memory_with_format(data, format).map_err(|err| {
            DocpressError::ImageError(format!("failed to decode image: {err}"))
        })?;
        debug!(
            width = image.width(),
            height = image.height(),
            ?format,
            "Image decoded from bytes"
        );
        Ok(Self { image, format })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// The format [`ImageProcessor::to_bytes`] will write.
    pub fn output_format(&self) -> ImageFormat {
        if PASSTHROUGH_FORMATS.contains(&self.format) {
            self.format
        } else {
            ImageFormat::Jpeg
        }
    }

    /// Scale to fit within `max_width` x `max_height`, preserving aspect
    /// ratio. Smaller images are scaled up.
    #[instrument(skip(self))]
    pub fn resize(self, max_width: u32, max_height: u32) -> Self {
        info!(
            from_w = self.image.width(),
            from_h = self.image.height(),
            max_width,
            max_height,
            "Resizing image"
        );
        let resized = self
            .image
            .resize(max_width, max_height, image::imageops::FilterType::Lanczos3);
        debug!(new_w = resized.width(), new_h = resized.height(), "Resize complete");
        Self {
            image: resized,
            format: self.format,
        }
    }

    /// Encode in [`ImageProcessor::output_format`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, DocpressError> {
        match self.output_format() {
            ImageFormat::Jpeg => self.compress(DEFAULT_JPEG_QUALITY),
            format => encode_to_format(&self.image, format),
        }
    }

    /// Re-encode as JPEG at `quality` (clamped to 1-100). Alpha is dropped.
    #[instrument(skip(self))]
    pub fn compress(&self, quality: u8) -> Result<Vec<u8>, DocpressError> {
        let quality = quality.clamp(1, 100);
        let mut buffer = Vec::new();
        let rgb = self.image.to_rgb8();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
        rgb.write_with_encoder(encoder).map_err(|err| {
            DocpressError::ImageError(format!("JPEG encoding failed: {err}"))
        })?;
        debug!(output_bytes = buffer.len(), "JPEG encoded");
        Ok(buffer)
    }
}

/// Quality used when a resized image is written back as JPEG.
const DEFAULT_JPEG_QUALITY: u8 = 90;

fn encode_to_format(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, DocpressError> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, format).map_err(|err| {
        DocpressError::ImageError(format!("image encoding failed: {err}"))
    })?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    /// A noisy gradient so JPEG quality has something to throw away.
    pub(crate) fn sample_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let noise = ((x * 7919 + y * 104_729) % 251) as u8;
            Rgb([(x % 256) as u8, (y % 256) as u8, noise])
        });
        encode_to_format(&DynamicImage::ImageRgb8(img), format).unwrap()
    }

    #[test]
    fn resize_fits_within_box_and_keeps_aspect() {
        let processor = ImageProcessor::from_bytes(&sample_image(200, 100, ImageFormat::Png))
            .unwrap()
            .resize(50, 50);
        assert_eq!(processor.width(), 50);
        assert_eq!(processor.height(), 25);
    }

    #[test]
    fn png_stays_png() {
        let out = ImageProcessor::from_bytes(&sample_image(40, 40, ImageFormat::Png))
            .unwrap()
            .resize(20, 20)
            .to_bytes()
            .unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn unusual_formats_fall_back_to_jpeg() {
        let tiff = sample_image(16, 16, ImageFormat::Tiff);
        let processor = ImageProcessor::from_bytes(&tiff).unwrap();
        assert_eq!(processor.output_format(), ImageFormat::Jpeg);
        let out = processor.to_bytes().unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn lower_quality_means_fewer_bytes() {
        let processor =
            ImageProcessor::from_bytes(&sample_image(128, 128, ImageFormat::Png)).unwrap();
        let high = processor.compress(95).unwrap();
        let low = processor.compress(10).unwrap();
        assert!(low.len() < high.len(), "{} >= {}", low.len(), high.len());
    }

    #[test]
    fn non_image_bytes_are_unsupported() {
        assert!(matches!(
            ImageProcessor::from_bytes(b"definitely not pixels"),
            Err(DocpressError::UnsupportedDocument(_))
        ));
    }
}
