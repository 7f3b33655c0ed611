// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — inspecting, merging and splitting PDFs.

pub mod reader;

pub use reader::{PdfInfo, PdfReader};
