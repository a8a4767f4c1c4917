//! Synthetic PDF fixtures written with lopdf.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

pub struct Fixture {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    font_id: ObjectId,
}

impl Fixture {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            font_id,
        }
    }

    /// A page with `lines` text runs, a filled rectangle and `annotations` notes
    pub fn text_page(mut self, lines: usize, annotations: usize) -> Self {
        let mut content = String::from("0.9 0.2 0.2 rg 40 40 120 60 re f\n");
        for line in 0..lines {
            content.push_str(&format!(
                "BT /F1 {} Tf 72 {} Td (Line {} of a synthetic page) Tj ET\n",
                10 + line % 3,
                720 - line as i64 * 18,
                line + 1
            ));
        }
        let resources = dictionary! {
            "Font" => dictionary! { "F1" => self.font_id },
        };
        let annots = (0..annotations)
            .map(|i| {
                Object::Reference(self.doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Text",
                    "Rect" => vec![(i as i64 * 20).into(), 0.into(), (i as i64 * 20 + 16).into(), 16.into()],
                    "Contents" => Object::string_literal(format!("Note {}", i)),
                }))
            })
            .collect::<Vec<_>>();
        self.push_page([612, 792], content.into_bytes(), resources, annots)
    }

    /// A page showing a raw 8-bit gray image of `width` x `height` pixels
    /// stretched over a `page_w` x `page_h` point page, plus one invisible
    /// text run the way OCR tools layer text over a scan
    pub fn image_page(mut self, width: u32, height: u32, page_w: i64, page_h: i64) -> Self {
        let pixels: Vec<u8> = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x / 7 + y / 5) % 256) as u8))
            .collect();
        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            pixels,
        ));
        let content = format!(
            "q {} 0 0 {} 0 0 cm /Im1 Do Q\nBT 3 Tr /F1 14 Tf 36 36 Td (Caption) Tj ET\n",
            page_w, page_h
        );
        let resources = dictionary! {
            "Font" => dictionary! { "F1" => self.font_id },
            "XObject" => dictionary! { "Im1" => image_id },
        };
        self.push_page([page_w, page_h], content.into_bytes(), resources, Vec::new())
    }

    /// An unreferenced stream of `bytes` zeros, to make the file large on disk
    pub fn padding(mut self, bytes: usize) -> Self {
        self.doc.add_object(Stream::new(dictionary! {}, vec![0u8; bytes]));
        self
    }

    fn push_page(
        mut self,
        size: [i64; 2],
        content: Vec<u8>,
        resources: lopdf::Dictionary,
        annots: Vec<Object>,
    ) -> Self {
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), size[0].into(), size[1].into()],
            "Resources" => resources,
            "Contents" => content_id,
        };
        if !annots.is_empty() {
            page.set("Annots", annots);
        }
        let page_id = self.doc.add_object(page);
        self.kids.push(Object::Reference(page_id));
        self
    }

    pub fn build(mut self) -> Document {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc
    }

    pub fn write(self, path: &Path) -> PathBuf {
        let mut doc = self.build();
        doc.save(path).expect("Failed to write fixture");
        path.to_path_buf()
    }
}

/// A text document with `pages` pages of `lines` runs each
pub fn text_document(dir: &Path, name: &str, pages: usize, lines: usize) -> PathBuf {
    let mut fixture = Fixture::new();
    for _ in 0..pages {
        fixture = fixture.text_page(lines, 0);
    }
    fixture.write(&dir.join(name))
}

/// A scanned-looking document: `pages` image pages on letter paper
pub fn scan_document(dir: &Path, name: &str, pages: usize) -> PathBuf {
    let mut fixture = Fixture::new();
    for _ in 0..pages {
        fixture = fixture.image_page(85, 110, 612, 792);
    }
    fixture.write(&dir.join(name))
}

/// Every image XObject in a document as (width, height, filter)
pub fn image_xobjects(doc: &Document) -> Vec<(i64, i64, Vec<u8>)> {
    doc.objects
        .values()
        .filter_map(|object| match object {
            Object::Stream(stream) => Some(stream),
            _ => None,
        })
        .filter(|stream| {
            stream
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .map(|n| n == b"Image")
                .unwrap_or(false)
        })
        .map(|stream| {
            let int = |key: &[u8]| stream.dict.get(key).and_then(Object::as_i64).unwrap_or(0);
            let filter = stream
                .dict
                .get(b"Filter")
                .and_then(Object::as_name)
                .map(|n| n.to_vec())
                .unwrap_or_default();
            (int(b"Width"), int(b"Height"), filter)
        })
        .collect()
}

pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).expect("Failed to stat file").len()
}
