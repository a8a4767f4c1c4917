use std::path::{Path, PathBuf};

use lopdf::{Document, ObjectId};

use crate::error::{CompressError, Result};
use crate::pdf::objects::{page_box, page_rotation};
use crate::pdf::Rect;

/// A parsed input file together with what is known about it on disk
pub struct SourceDocument {
    path: PathBuf,
    size_bytes: u64,
    doc: Document,
}

/// One page of a [`SourceDocument`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourcePage {
    /// Zero-based position in the page tree
    pub index: usize,
    pub id: ObjectId,
    /// Visible box in points
    pub rect: Rect,
    pub rotation: i64,
}

impl SourceDocument {
    /// Read and parse `path`.
    ///
    /// Unreadable files are `Io`; anything lopdf cannot parse, encrypted
    /// files, and files with no pages are `UnsupportedDocument`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| CompressError::io(path, e))?;
        let size_bytes = bytes.len() as u64;

        let doc = Document::load_mem(&bytes)
            .map_err(|e| CompressError::unsupported(path, e.to_string()))?;
        drop(bytes);

        Self::from_document(path, size_bytes, doc)
    }

    /// Wrap an already parsed document
    pub fn from_document(path: impl AsRef<Path>, size_bytes: u64, doc: Document) -> Result<Self> {
        let path = path.as_ref();
        if doc.is_encrypted() || doc.trailer.has(b"Encrypt") {
            return Err(CompressError::unsupported(path, "document is encrypted"));
        }
        if doc.get_pages().is_empty() {
            return Err(CompressError::unsupported(path, "document has no pages"));
        }

        Ok(Self {
            path: path.to_path_buf(),
            size_bytes,
            doc,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Pages in document order
    pub fn pages(&self) -> Vec<SourcePage> {
        self.doc
            .get_pages()
            .into_values()
            .enumerate()
            .map(|(index, id)| SourcePage {
                index,
                id,
                rect: page_box(&self.doc, id),
                rotation: page_rotation(&self.doc, id),
            })
            .collect()
    }
}
