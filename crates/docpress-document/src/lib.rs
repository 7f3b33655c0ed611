// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docpress-document — Document transforms for the Docpress backend.
//
// Provides PDF operations (inspect, merge, split into pages, extract a page
// range) and image operations (resize, JPEG compression), plus the
// `TransformEngine` seam the request layer drives them through.

pub mod image;
pub mod pdf;
pub mod transform;

// Re-export the primary structs so callers can use `docpress_document::PdfReader` etc.
pub use image::processor::ImageProcessor;
pub use pdf::reader::{PdfInfo, PdfReader};
pub use transform::{DocumentEngine, Transform, TransformEngine};
