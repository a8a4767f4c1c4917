//! Container-level save profiles and the writer that applies them.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::process::Command;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId, SaveOptions, Stream};
use tempfile::NamedTempFile;

use crate::cli::CompressionLevel;
use crate::error::{CompressError, Result};
use crate::pdf::objects::{name_of, page_content};

/// qpdf exits with 3 when it succeeded with warnings
const QPDF_EXIT_WARNINGS: i32 = 3;

/// Container rewrite settings for one compression level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveProfile {
    /// 1 prunes unreferenced objects, 2 also drops empty streams and
    /// renumbers, 3 also merges duplicate streams, 4 also packs object streams
    pub compaction_level: u8,
    pub linearize: bool,
    /// Re-encode page content into one normalised stream
    pub clean: bool,
    pub deflate_streams: bool,
    pub deflate_images: bool,
    pub deflate_fonts: bool,
    pub pretty_print: bool,
}

impl SaveProfile {
    /// Fixed profile for `level`; `compress_fonts` only matters below Max
    pub fn for_level(level: CompressionLevel, compress_fonts: bool) -> Self {
        match level {
            CompressionLevel::Max => Self {
                compaction_level: 4,
                linearize: true,
                clean: true,
                deflate_streams: true,
                deflate_images: true,
                deflate_fonts: true,
                pretty_print: false,
            },
            CompressionLevel::High => Self {
                compaction_level: 3,
                linearize: false,
                clean: true,
                deflate_streams: true,
                deflate_images: true,
                deflate_fonts: compress_fonts,
                pretty_print: false,
            },
            CompressionLevel::Normal => Self {
                compaction_level: 1,
                linearize: false,
                clean: true,
                deflate_streams: true,
                deflate_images: true,
                deflate_fonts: compress_fonts,
                pretty_print: false,
            },
        }
    }

    fn zlib_level(&self) -> Compression {
        if self.compaction_level >= 4 {
            Compression::best()
        } else {
            Compression::default()
        }
    }

    /// Rewrite `doc` in memory according to the profile
    pub fn apply(&self, doc: &mut Document) -> Result<()> {
        if self.clean {
            let cleaned = clean_page_contents(doc)?;
            log::debug!("Normalised content of {} page(s)", cleaned);
        }

        if self.compaction_level >= 1 {
            let pruned = doc.prune_objects();
            log::debug!("Pruned {} unreferenced object(s)", pruned.len());
        }
        if self.compaction_level >= 3 {
            let merged = merge_duplicate_streams(doc);
            log::debug!("Merged {} duplicate stream(s)", merged);
        }
        if self.compaction_level >= 2 {
            let empty = doc.delete_zero_length_streams();
            log::debug!("Deleted {} empty stream(s)", empty.len());
            doc.renumber_objects();
        }

        let deflated = self.deflate(doc)?;
        log::debug!("Deflated {} stream(s)", deflated);
        Ok(())
    }

    fn deflate(&self, doc: &mut Document) -> Result<usize> {
        let fonts = font_program_ids(doc);
        let level = self.zlib_level();
        let mut count = 0;

        for (id, object) in doc.objects.iter_mut() {
            let Object::Stream(stream) = object else {
                continue;
            };
            let wanted = if is_image(stream) {
                self.deflate_images
            } else if fonts.contains(id) {
                self.deflate_fonts
            } else {
                self.deflate_streams
            };
            if wanted && deflate_stream(stream, level)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Apply the profile and write the result to `path`.
    ///
    /// The bytes land in a temporary file next to `path` that is only
    /// persisted once the write is complete, so a failed write leaves
    /// nothing behind.
    pub fn write(&self, doc: &mut Document, path: &Path) -> Result<()> {
        self.apply(doc)?;

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CompressError::io(dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            if self.compaction_level >= 4 {
                let options = SaveOptions::builder()
                    .use_object_streams(true)
                    .use_xref_streams(true)
                    .max_objects_per_stream(200)
                    .compression_level(9)
                    .build();
                doc.save_with_options(&mut writer, options)
                    .map_err(|e| write_failed(path, e))?;
            } else {
                doc.save_to(&mut writer).map_err(|e| write_failed(path, e))?;
            }
            writer.flush().map_err(|e| CompressError::io(path, e))?;
        }

        if self.linearize {
            linearize_in_place(tmp.path());
        }

        tmp.persist(path)
            .map_err(|e| CompressError::io(path, e.error))?;
        Ok(())
    }
}

fn write_failed(path: &Path, e: impl std::fmt::Display) -> CompressError {
    CompressError::io(path, std::io::Error::other(e.to_string()))
}

/// Decode and re-encode each page's content into a single stream.
///
/// Pages whose content does not parse are left as they are.
fn clean_page_contents(doc: &mut Document) -> Result<usize> {
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let mut cleaned = 0;

    for page_id in pages {
        let raw = match page_content(doc, page_id) {
            Ok(raw) => raw,
            Err(e) => {
                log::debug!("Keeping content of page {:?}: {}", page_id, e);
                continue;
            }
        };
        let content = match Content::decode(&raw) {
            Ok(content) if !content.operations.is_empty() => content,
            _ => continue,
        };
        let Ok(encoded) = content.encode() else {
            continue;
        };

        let stream_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), encoded));
        doc.get_dictionary_mut(page_id)?
            .set("Contents", Object::Reference(stream_id));
        cleaned += 1;
    }
    Ok(cleaned)
}

fn is_image(stream: &Stream) -> bool {
    stream.dict.get(b"Subtype").ok().and_then(name_of) == Some(b"Image".as_slice())
}

/// Streams a PDF writer must not pack or re-encode itself
fn is_structural(stream: &Stream) -> bool {
    matches!(
        stream.dict.get(b"Type").ok().and_then(name_of),
        Some(b"XRef") | Some(b"ObjStm")
    )
}

/// Ids of embedded font programs referenced from font descriptors
fn font_program_ids(doc: &Document) -> BTreeSet<ObjectId> {
    let mut ids = BTreeSet::new();
    for object in doc.objects.values() {
        let dict = match object {
            Object::Dictionary(dict) => dict,
            _ => continue,
        };
        for key in [b"FontFile".as_slice(), b"FontFile2".as_slice(), b"FontFile3".as_slice()] {
            if let Ok(id) = dict.get(key).and_then(Object::as_reference) {
                ids.insert(id);
            }
        }
    }
    ids
}

/// Flate-compress an unfiltered stream; returns whether it was changed
fn deflate_stream(stream: &mut Stream, level: Compression) -> Result<bool> {
    if !stream.allows_compression
        || stream.dict.has(b"Filter")
        || stream.content.is_empty()
        || is_structural(stream)
    {
        return Ok(false);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    let compressed = encoder
        .write_all(&stream.content)
        .and_then(|_| encoder.finish())
        .map_err(|e| CompressError::EncodingFailure(format!("deflate failed: {}", e)))?;
    if compressed.len() >= stream.content.len() {
        return Ok(false);
    }

    stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    stream.set_content(compressed);
    Ok(true)
}

/// Merge byte-identical streams into the lowest-numbered copy and rewrite
/// every reference to the others. Returns the number of streams removed.
fn merge_duplicate_streams(doc: &mut Document) -> usize {
    let mut buckets: HashMap<u64, Vec<ObjectId>> = HashMap::new();
    for (id, object) in &doc.objects {
        if let Object::Stream(stream) = object {
            if is_structural(stream) {
                continue;
            }
            buckets.entry(stream_fingerprint(stream)).or_default().push(*id);
        }
    }

    let mut remap: BTreeMap<ObjectId, ObjectId> = BTreeMap::new();
    for ids in buckets.values().filter(|ids| ids.len() > 1) {
        for (i, id) in ids.iter().enumerate() {
            let canonical = ids[..i]
                .iter()
                .find(|earlier| !remap.contains_key(*earlier) && same_stream(doc, **earlier, *id));
            if let Some(canonical) = canonical {
                remap.insert(*id, *canonical);
            }
        }
    }
    if remap.is_empty() {
        return 0;
    }

    for object in doc.objects.values_mut() {
        rewrite_references(object, &remap);
    }
    for value in doc.trailer.iter_mut().map(|(_, v)| v) {
        rewrite_references(value, &remap);
    }
    for id in remap.keys() {
        doc.objects.remove(id);
    }
    remap.len()
}

fn stream_fingerprint(stream: &Stream) -> u64 {
    let mut hasher = DefaultHasher::new();
    format!("{:?}", stream.dict).hash(&mut hasher);
    stream.content.hash(&mut hasher);
    hasher.finish()
}

fn same_stream(doc: &Document, a: ObjectId, b: ObjectId) -> bool {
    match (doc.objects.get(&a), doc.objects.get(&b)) {
        (Some(Object::Stream(a)), Some(Object::Stream(b))) => {
            a.content == b.content && format!("{:?}", a.dict) == format!("{:?}", b.dict)
        }
        _ => false,
    }
}

fn rewrite_references(object: &mut Object, remap: &BTreeMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            if let Some(target) = remap.get(id) {
                *id = *target;
            }
        }
        Object::Array(items) => {
            for item in items {
                rewrite_references(item, remap);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                rewrite_references(value, remap);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                rewrite_references(value, remap);
            }
        }
        _ => {}
    }
}

/// Linearize with qpdf when it is installed; otherwise keep the file as is
fn linearize_in_place(path: &Path) {
    let output = Command::new("qpdf")
        .arg("--linearize")
        .arg("--replace-input")
        .arg(path)
        .output();

    match output {
        Ok(result) if result.status.success() => log::debug!("Linearized with qpdf"),
        Ok(result) if result.status.code() == Some(QPDF_EXIT_WARNINGS) => {
            log::debug!("Linearized with qpdf (warnings)")
        }
        Ok(result) => log::warn!(
            "qpdf could not linearize the output, writing it unlinearized: {}",
            String::from_utf8_lossy(&result.stderr).trim()
        ),
        Err(e) => log::warn!("qpdf not available ({}), writing output unlinearized", e),
    }
}
