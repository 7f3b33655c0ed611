// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metered document transforms — the four operations a caller pays quota
// for, and the engine that runs them over uploaded bytes.

use docpress_core::error::DocpressError;
use docpress_core::types::FeatureType;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::image::ImageProcessor;
use crate::image::processor::MAX_RESIZE_PIXELS;
use crate::pdf::PdfReader;

/// One requested transform with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transform {
    /// Concatenate every input PDF in upload order.
    MergePdf,
    /// One PDF per page, zipped.
    SplitPdf,
    /// Pages `start..=end` (1-indexed) as a single PDF.
    SplitPdfRange { start: u32, end: u32 },
    ResizeImage { width: u32, height: u32 },
    /// `quality` is a fraction in 0.0..=1.0; `None` uses the engine default.
    CompressImage { quality: Option<f32> },
}

impl Transform {
    /// The counter this transform is metered against.
    pub fn feature(&self) -> FeatureType {
        match self {
            Self::MergePdf => FeatureType::PdfMerge,
            Self::SplitPdf | Self::SplitPdfRange { .. } => FeatureType::PdfSplit,
            Self::ResizeImage { .. } => FeatureType::ImageResize,
            Self::CompressImage { .. } => FeatureType::ImageCompress,
        }
    }

    /// Suggested download name for the result.
    pub fn output_file_name(&self) -> String {
        match self {
            Self::MergePdf => "merged.pdf".into(),
            Self::SplitPdf => "split_pages.zip".into(),
            Self::SplitPdfRange { start, end } => format!("pages_{start}_to_{end}.pdf"),
            Self::ResizeImage { .. } => "resized".into(),
            Self::CompressImage { .. } => "compressed.jpg".into(),
        }
    }

    /// Reject requests that cannot succeed, before any decoding or
    /// metering: the wrong number of uploads, or a resize box that is empty
    /// or larger than [`MAX_RESIZE_PIXELS`].
    pub fn validate(&self, inputs: usize) -> Result<(), DocpressError> {
        let arity_ok = match self {
            Self::MergePdf => inputs >= 2,
            _ => inputs == 1,
        };
        if !arity_ok {
            let wanted = match self {
                Self::MergePdf => "at least two PDF files",
                _ => "exactly one file",
            };
            return Err(DocpressError::InvalidRequest(format!(
                "{} needs {wanted}, got {inputs}",
                self.feature().label()
            )));
        }

        if let Self::ResizeImage { width, height } = self {
            if *width == 0 || *height == 0 {
                return Err(DocpressError::InvalidRequest(
                    "resize dimensions must be positive".into(),
                ));
            }
            let pixels = u64::from(*width) * u64::from(*height);
            if pixels > MAX_RESIZE_PIXELS {
                return Err(DocpressError::InvalidRequest(format!(
                    "resize target {width}x{height} exceeds {MAX_RESIZE_PIXELS} pixels"
                )));
            }
        }
        Ok(())
    }
}

/// Runs a [`Transform`] over uploaded bytes. The request layer depends on
/// this seam rather than on the PDF and image code directly.
pub trait TransformEngine: Send + Sync {
    fn apply(&self, transform: &Transform, inputs: &[Vec<u8>]) -> Result<Vec<u8>, DocpressError>;
}

/// The production engine backed by `lopdf` and `image`.
#[derive(Debug, Clone)]
pub struct DocumentEngine {
    default_jpeg_quality: u8,
}

impl DocumentEngine {
    pub fn new(default_jpeg_quality: u8) -> Self {
        Self {
            default_jpeg_quality: default_jpeg_quality.clamp(1, 100),
        }
    }

    fn jpeg_quality(&self, fraction: Option<f32>) -> Result<u8, DocpressError> {
        match fraction {
            None => Ok(self.default_jpeg_quality),
            Some(q) if (0.0..=1.0).contains(&q) => Ok(((q * 100.0).round() as u8).max(1)),
            Some(q) => Err(DocpressError::InvalidRequest(format!(
                "quality {q} is outside 0.0-1.0"
            ))),
        }
    }
}

impl Default for DocumentEngine {
    fn default() -> Self {
        Self::new(75)
    }
}

impl TransformEngine for DocumentEngine {
    #[instrument(skip(self, inputs), fields(feature = %transform.feature(), inputs = inputs.len()))]
    fn apply(&self, transform: &Transform, inputs: &[Vec<u8>]) -> Result<Vec<u8>, DocpressError> {
        transform.validate(inputs.len())?;

        let output = match transform {
            Transform::MergePdf => PdfReader::from_bytes(&inputs[0])?.merge(&inputs[1..])?,
            Transform::SplitPdf => PdfReader::from_bytes(&inputs[0])?.split_pages()?,
            Transform::SplitPdfRange { start, end } => {
                PdfReader::from_bytes(&inputs[0])?.extract_range(*start, *end)?
            }
            Transform::ResizeImage { width, height } => {
                ImageProcessor::from_bytes(&inputs[0])?
                    .resize(*width, *height)
                    .to_bytes()?
            }
            Transform::CompressImage { quality } => {
                let quality = self.jpeg_quality(*quality)?;
                ImageProcessor::from_bytes(&inputs[0])?.compress(quality)?
            }
        };

        info!(output_bytes = output.len(), "Transform complete");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use image::ImageFormat;

    use super::*;
    use crate::image::processor::tests::sample_image;
    use crate::pdf::reader::tests::sample_pdf;

    #[test]
    fn split_variants_share_a_counter() {
        assert_eq!(Transform::SplitPdf.feature(), FeatureType::PdfSplit);
        assert_eq!(
            Transform::SplitPdfRange { start: 1, end: 2 }.feature(),
            FeatureType::PdfSplit
        );
        assert_eq!(
            Transform::CompressImage { quality: None }.feature(),
            FeatureType::ImageCompress
        );
    }

    #[test]
    fn merge_needs_two_inputs() {
        let engine = DocumentEngine::default();
        let err = engine
            .apply(&Transform::MergePdf, &[sample_pdf(1)])
            .unwrap_err();
        assert!(matches!(err, DocpressError::InvalidRequest(_)));
    }

    #[test]
    fn merge_runs_end_to_end() {
        let engine = DocumentEngine::default();
        let out = engine
            .apply(&Transform::MergePdf, &[sample_pdf(1), sample_pdf(2)])
            .unwrap();
        assert_eq!(PdfReader::from_bytes(&out).unwrap().page_count(), 3);
    }

    #[test]
    fn range_split_runs_end_to_end() {
        let engine = DocumentEngine::default();
        let out = engine
            .apply(&Transform::SplitPdfRange { start: 2, end: 3 }, &[sample_pdf(4)])
            .unwrap();
        assert_eq!(PdfReader::from_bytes(&out).unwrap().page_count(), 2);
    }

    #[test]
    fn compress_outputs_jpeg() {
        let engine = DocumentEngine::default();
        let out = engine
            .apply(
                &Transform::CompressImage { quality: Some(0.5) },
                &[sample_image(32, 32, ImageFormat::Png)],
            )
            .unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn compress_rejects_out_of_range_quality() {
        let engine = DocumentEngine::default();
        let err = engine
            .apply(
                &Transform::CompressImage { quality: Some(1.5) },
                &[sample_image(8, 8, ImageFormat::Png)],
            )
            .unwrap_err();
        assert!(matches!(err, DocpressError::InvalidRequest(_)));
    }

    #[test]
    fn zero_sized_resize_is_rejected() {
        let engine = DocumentEngine::default();
        let err = engine
            .apply(
                &Transform::ResizeImage { width: 0, height: 10 },
                &[sample_image(8, 8, ImageFormat::Png)],
            )
            .unwrap_err();
        assert!(matches!(err, DocpressError::InvalidRequest(_)));
    }

    #[test]
    fn oversized_resize_box_is_rejected_before_decoding() {
        let engine = DocumentEngine::default();
        let huge = Transform::ResizeImage { width: 100_000, height: 100_000 };

        let err = engine
            .apply(&huge, &[sample_image(1, 1, ImageFormat::Png)])
            .unwrap_err();
        assert!(matches!(err, DocpressError::InvalidRequest(_)));

        // Bytes are never looked at.
        let err = engine.apply(&huge, &[b"not an image".to_vec()]).unwrap_err();
        assert!(matches!(err, DocpressError::InvalidRequest(_)));
    }

    #[test]
    fn resize_box_at_the_pixel_budget_is_allowed() {
        let at_budget = Transform::ResizeImage { width: 10_000, height: 10_000 };
        assert_eq!(u64::from(10_000u32 * 10_000), MAX_RESIZE_PIXELS);
        at_budget.validate(1).unwrap();
        assert!(
            Transform::ResizeImage { width: 10_000, height: 10_001 }
                .validate(1)
                .is_err()
        );
        assert!(Transform::ResizeImage { width: u32::MAX, height: u32::MAX }.validate(1).is_err());
    }

    #[test]
    fn transforms_deserialize_from_tagged_json() {
        let t: Transform =
            serde_json::from_str(r#"{"op":"split_pdf_range","start":1,"end":3}"#).unwrap();
        assert_eq!(t, Transform::SplitPdfRange { start: 1, end: 3 });
        assert_eq!(t.output_file_name(), "pages_1_to_3.pdf");
    }
}
