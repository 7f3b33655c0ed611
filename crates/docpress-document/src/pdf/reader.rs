// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — inspect, merge, split into single pages, and extract page
// ranges from in-memory PDFs using the `lopdf` crate.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use docpress_core::error::DocpressError;
use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use zip::write::SimpleFileOptions;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against malformed page trees with /Parent cycles.
const MAX_TREE_DEPTH: usize = 32;

/// Source object id to the id of its copy in the target document. One map
/// per source document per operation, so every object is copied once.
type CopiedObjects = BTreeMap<ObjectId, ObjectId>;

/// Basic facts about an uploaded PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfInfo {
    pub file_name: String,
    pub page_count: usize,
    pub file_size: u64,
}

/// Reads and manipulates an uploaded PDF.
pub struct PdfReader {
    document: Document,
    byte_len: u64,
}

impl PdfReader {
    /// Parse a PDF already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, DocpressError> {
        let document = Document::load_mem(data).map_err(|err| {
            DocpressError::PdfError(format!("failed to load PDF: {err}"))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self {
            document,
            byte_len: data.len() as u64,
        })
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Page count and size, labelled with the name the file was uploaded as.
    pub fn info(&self, file_name: &str) -> PdfInfo {
        PdfInfo {
            file_name: file_name.to_string(),
            page_count: self.page_count(),
            file_size: self.byte_len,
        }
    }

    /// Append the pages of every PDF in `others`, in order, after this
    /// document's pages.
    #[instrument(skip_all, fields(additional_count = others.len()))]
    pub fn merge<T: AsRef<[u8]>>(&self, others: &[T]) -> Result<Vec<u8>, DocpressError> {
        info!(
            base_pages = self.page_count(),
            additional_documents = others.len(),
            "Merging PDFs"
        );

        let mut merged = self.document.clone();

        for (index, other_bytes) in others.iter().enumerate() {
            let other_doc = Document::load_mem(other_bytes.as_ref()).map_err(|err| {
                DocpressError::PdfError(format!(
                    "failed to load PDF #{}: {err}",
                    index + 2
                ))
            })?;

            // get_pages is keyed by page number, so iteration is in page order.
            let mut copied = CopiedObjects::new();
            for page_id in other_doc.get_pages().into_values() {
                clone_page_into(&other_doc, &mut merged, page_id, &mut copied)?;
            }
        }

        let output = serialise(&mut merged, "merged PDF")?;
        debug!(output_bytes = output.len(), "Merge complete");
        Ok(output)
    }

    /// Split into one single-page PDF per page, packed as `page_<n>.pdf`
    /// entries of a ZIP archive.
    #[instrument(skip(self))]
    pub fn split_pages(&self) -> Result<Vec<u8>, DocpressError> {
        let total = self.page_count() as u32;
        if total == 0 {
            return Err(DocpressError::PdfError("document has no pages".into()));
        }
        info!(total, "Splitting PDF into single pages");

        let mut archive = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for page_number in 1..=total {
            let page_pdf = self.extract_range(page_number, page_number)?;
            archive
                .start_file(format!("page_{page_number}.pdf"), options)
                .map_err(zip_err)?;
            archive.write_all(&page_pdf)?;
        }

        let output = archive.finish().map_err(zip_err)?.into_inner();
        debug!(output_bytes = output.len(), "Split archive complete");
        Ok(output)
    }

    /// Copy pages `start..=end` (1-indexed) into a new PDF.
    #[instrument(skip(self))]
    pub fn extract_range(&self, start: u32, end: u32) -> Result<Vec<u8>, DocpressError> {
        let pages = self.document.get_pages();
        if start == 0 || start > end || end as usize > pages.len() {
            return Err(DocpressError::InvalidRequest(format!(
                "page range {start}-{end} is invalid for a {} page document",
                pages.len()
            )));
        }

        let mut new_doc = empty_document();
        let mut copied = CopiedObjects::new();
        for page_number in start..=end {
            let page_id = *pages.get(&page_number).ok_or_else(|| {
                DocpressError::PdfError(format!("page {page_number} not found in page tree"))
            })?;
            clone_page_into(&self.document, &mut new_doc, page_id, &mut copied)?;
        }

        serialise(&mut new_doc, "page range")
    }
}

fn zip_err(err: zip::result::ZipError) -> DocpressError {
    DocpressError::PdfError(format!("failed to build split archive: {err}"))
}

fn serialise(doc: &mut Document, what: &str) -> Result<Vec<u8>, DocpressError> {
    let mut output = Vec::new();
    doc.save_to(&mut output).map_err(|err| {
        DocpressError::PdfError(format!("failed to serialise {what}: {err}"))
    })?;
    Ok(output)
}

/// A document with an empty page tree and a catalog pointing at it.
fn empty_document() -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => Vec::<Object>::new(),
        "Count" => Object::Integer(0),
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

/// Deep-copy one page from `source` and append it to `target`'s root page
/// tree node.
///
/// The page's id is reserved in `copied` before its contents are walked, so
/// back-references such as an annotation's /P resolve to the new page.
fn clone_page_into(
    source: &Document,
    target: &mut Document,
    page_id: ObjectId,
    copied: &mut CopiedObjects,
) -> Result<(), DocpressError> {
    let page_object = source.get_object(page_id).map_err(|err| {
        DocpressError::PdfError(format!("cannot read page object {page_id:?}: {err}"))
    })?;

    let cloned_id = *copied
        .entry(page_id)
        .or_insert_with(|| target.new_object_id());
    let mut cloned = deep_clone_object(source, target, page_object, copied)?;

    // Attributes normally inherited from the source's /Pages node would be
    // lost once /Parent is rewritten, so pin them on the page itself.
    if let Object::Dictionary(page_dict) = &mut cloned {
        for key in INHERITABLE_KEYS {
            if page_dict.has(key) {
                continue;
            }
            if let Some(value) = inherited_attribute(source, page_id, key) {
                let value = deep_clone_object(source, target, &value, copied)?;
                page_dict.set(key.to_vec(), value);
            }
        }
    }

    target.objects.insert(cloned_id, cloned);

    let pages_id = target
        .catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|err| DocpressError::PdfError(format!("target has no page tree: {err}")))?;

    if let Ok(Object::Dictionary(pages_dict)) = target.get_object_mut(pages_id) {
        if let Ok(Object::Array(kids)) = pages_dict.get_mut(b"Kids") {
            kids.push(Object::Reference(cloned_id));
        }
        if let Ok(Object::Integer(count)) = pages_dict.get_mut(b"Count") {
            *count += 1;
        }
    }

    if let Ok(Object::Dictionary(page_dict)) = target.get_object_mut(cloned_id) {
        page_dict.set("Parent", Object::Reference(pages_id));
    }

    Ok(())
}

/// Walk up the /Parent chain of `page_id` looking for `key`.
fn inherited_attribute(source: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = source.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        let parent_id = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        let parent: &Dictionary = source.get_dictionary(parent_id).ok()?;
        if let Ok(value) = parent.get(key) {
            return Some(value.clone());
        }
        current = parent;
    }
    None
}

/// Deep-clone an object, resolving references into objects in `target`.
/// A reference already in `copied` reuses its copy, which also ends
/// reference cycles. /Parent keys are skipped; the caller patches them.
fn deep_clone_object(
    source: &Document,
    target: &mut Document,
    object: &Object,
    copied: &mut CopiedObjects,
) -> Result<Object, DocpressError> {
    match object {
        Object::Dictionary(dict) => Ok(Object::Dictionary(clone_dictionary(
            source, target, dict, copied,
        )?)),
        Object::Array(items) => {
            let mut cloned = Vec::with_capacity(items.len());
            for item in items {
                cloned.push(deep_clone_object(source, target, item, copied)?);
            }
            Ok(Object::Array(cloned))
        }
        Object::Reference(ref_id) => {
            if let Some(&existing) = copied.get(ref_id) {
                return Ok(Object::Reference(existing));
            }
            match source.get_object(*ref_id) {
                Ok(referenced) => {
                    let new_id = target.new_object_id();
                    copied.insert(*ref_id, new_id);
                    let cloned = deep_clone_object(source, target, referenced, copied)?;
                    target.objects.insert(new_id, cloned);
                    Ok(Object::Reference(new_id))
                }
                Err(err) => {
                    warn!(?ref_id, %err, "Cannot resolve reference, using Null");
                    Ok(Object::Null)
                }
            }
        }
        Object::Stream(stream) => {
            let dict = clone_dictionary(source, target, &stream.dict, copied)?;
            Ok(Object::Stream(lopdf::Stream::new(dict, stream.content.clone())))
        }
        other => Ok(other.clone()),
    }
}

fn clone_dictionary(
    source: &Document,
    target: &mut Document,
    dict: &Dictionary,
    copied: &mut CopiedObjects,
) -> Result<Dictionary, DocpressError> {
    let mut cloned = Dictionary::new();
    for (key, value) in dict.iter() {
        if key == b"Parent" {
            continue;
        }
        cloned.set(key.clone(), deep_clone_object(source, target, value, copied)?);
    }
    Ok(cloned)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Read;

    use super::*;

    /// Build an `n`-page PDF whose MediaBox lives on the /Pages node so the
    /// inheritance path is exercised.
    pub(crate) fn sample_pdf(n: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for i in 0..n {
            let content = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", i + 1);
            let content_id =
                doc.add_object(lopdf::Stream::new(Dictionary::new(), content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(n as i64),
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save sample pdf");
        out
    }

    #[test]
    fn info_reports_pages_and_size() {
        let bytes = sample_pdf(3);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        let info = reader.info("report.pdf");
        assert_eq!(info.file_name, "report.pdf");
        assert_eq!(info.page_count, 3);
        assert_eq!(info.file_size, bytes.len() as u64);
    }

    #[test]
    fn merge_concatenates_pages() {
        let reader = PdfReader::from_bytes(&sample_pdf(2)).unwrap();
        let merged = reader.merge(&[sample_pdf(3), sample_pdf(1)]).unwrap();
        assert_eq!(PdfReader::from_bytes(&merged).unwrap().page_count(), 6);
    }

    #[test]
    fn merge_rejects_garbage_input() {
        let reader = PdfReader::from_bytes(&sample_pdf(1)).unwrap();
        let err = reader.merge(&[b"not a pdf".to_vec()]).unwrap_err();
        assert!(matches!(err, DocpressError::PdfError(_)));
    }

    #[test]
    fn extract_range_keeps_inherited_media_box() {
        let reader = PdfReader::from_bytes(&sample_pdf(5)).unwrap();
        let bytes = reader.extract_range(2, 4).unwrap();

        let extracted = Document::load_mem(&bytes).unwrap();
        let pages = extracted.get_pages();
        assert_eq!(pages.len(), 3);
        let first = extracted.get_dictionary(pages[&1]).unwrap();
        assert!(first.has(b"MediaBox"));
    }

    #[test]
    fn extract_range_validates_bounds() {
        let reader = PdfReader::from_bytes(&sample_pdf(3)).unwrap();
        for (start, end) in [(0, 1), (2, 1), (1, 4)] {
            let err = reader.extract_range(start, end).unwrap_err();
            assert!(matches!(err, DocpressError::InvalidRequest(_)), "{start}-{end}");
        }
    }

    #[test]
    fn split_pages_zips_one_pdf_per_page() {
        let reader = PdfReader::from_bytes(&sample_pdf(3)).unwrap();
        let zipped = reader.split_pages().unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(zipped)).unwrap();
        assert_eq!(archive.len(), 3);
        for n in 1..=3 {
            let mut entry = archive.by_name(&format!("page_{n}.pdf")).unwrap();
            let mut page = Vec::new();
            entry.read_to_end(&mut page).unwrap();
            assert_eq!(PdfReader::from_bytes(&page).unwrap().page_count(), 1);
        }
    }

    /// Two pages sharing one font, each with a link annotation whose /P
    /// points back at its page.
    fn annotated_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let mut kids = Vec::new();
        for _ in 0..2 {
            let page_id = doc.new_object_id();
            let annot_id = doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Link",
                "Rect" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(10),
                    Object::Integer(10),
                ],
                "P" => page_id,
            });
            let content_id = doc.add_object(lopdf::Stream::new(
                Dictionary::new(),
                b"BT /F1 12 Tf 72 720 Td (Hi) Tj ET".to_vec(),
            ));
            doc.objects.insert(
                page_id,
                Object::Dictionary(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "Contents" => content_id,
                    "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
                    "Annots" => vec![Object::Reference(annot_id)],
                    "MediaBox" => vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(595),
                        Object::Integer(842),
                    ],
                }),
            );
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(2),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save annotated pdf");
        out
    }

    fn count_fonts(doc: &Document) -> usize {
        doc.objects
            .values()
            .filter(|object| match object {
                Object::Dictionary(dict) => {
                    matches!(dict.get(b"Type"), Ok(Object::Name(name)) if name == b"Font")
                }
                _ => false,
            })
            .count()
    }

    #[test]
    fn annotation_back_references_are_copied_once() {
        let bytes = annotated_pdf();
        let reader = PdfReader::from_bytes(&bytes).unwrap();

        let extracted = Document::load_mem(&reader.extract_range(1, 2).unwrap()).unwrap();
        let pages = extracted.get_pages();
        assert_eq!(pages.len(), 2);
        for page_id in pages.values() {
            let page = extracted.get_dictionary(*page_id).unwrap();
            let annots = page.get(b"Annots").and_then(Object::as_array).unwrap();
            let annot_id = annots[0].as_reference().unwrap();
            let annot = extracted.get_dictionary(annot_id).unwrap();
            assert_eq!(annot.get(b"P").and_then(Object::as_reference).unwrap(), *page_id);
        }
        assert_eq!(count_fonts(&extracted), 1);

        let merged = reader.merge(&[bytes.clone()]).unwrap();
        assert_eq!(PdfReader::from_bytes(&merged).unwrap().page_count(), 4);

        let zipped = reader.split_pages().unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(zipped)).unwrap();
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn garbage_is_a_pdf_error() {
        assert!(matches!(
            PdfReader::from_bytes(b"%PDF-garbage"),
            Err(DocpressError::PdfError(_))
        ));
    }
}
