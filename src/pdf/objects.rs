use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::geometry::Rect;

/// Reference chains deeper than this are treated as broken
const MAX_REFERENCE_DEPTH: usize = 32;

/// Page trees deeper than this are treated as cyclic
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// Numeric operands of a content stream operator, in order
pub fn operand_numbers(operands: &[Object]) -> Vec<f32> {
    operands.iter().filter_map(number).collect()
}

/// Follow indirect references until a direct object is reached
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    let mut current = obj;
    for _ in 0..MAX_REFERENCE_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

/// Dictionary behind an object, looking through references and stream headers
pub fn dict_of<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

pub fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

pub fn name_of(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

/// Look up `key` on the page or the nearest ancestor in the page tree
pub fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn rect_of(doc: &Document, obj: &Object) -> Option<Rect> {
    let values = match resolve(doc, obj)? {
        Object::Array(values) => values,
        _ => return None,
    };
    let nums: Vec<f32> = values
        .iter()
        .filter_map(|v| resolve(doc, v).and_then(number))
        .collect();
    match nums.as_slice() {
        [x0, y0, x1, y1] => Some(Rect::new(*x0, *y0, *x1, *y1).normalized()),
        _ => None,
    }
}

/// Visible page rectangle: CropBox when present, else MediaBox
pub fn page_box(doc: &Document, page_id: ObjectId) -> Rect {
    inherited(doc, page_id, b"CropBox")
        .and_then(|obj| rect_of(doc, obj))
        .or_else(|| inherited(doc, page_id, b"MediaBox").and_then(|obj| rect_of(doc, obj)))
        .filter(|r| r.width() > 0.0 && r.height() > 0.0)
        .unwrap_or_else(Rect::letter)
}

/// Page rotation in degrees, normalised to 0, 90, 180 or 270
pub fn page_rotation(doc: &Document, page_id: ObjectId) -> i64 {
    inherited(doc, page_id, b"Rotate")
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_i64().ok())
        .map(|r| r.rem_euclid(360) / 90 * 90)
        .unwrap_or(0)
}

pub fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    inherited(doc, page_id, b"Resources").and_then(|obj| dict_of(doc, obj))
}

/// Named entry from a resource category such as `/XObject` or `/Font`
pub fn resource_entry<'a>(
    doc: &'a Document,
    resources: Option<&'a Dictionary>,
    category: &[u8],
    name: &[u8],
) -> Option<&'a Object> {
    let category = resources?.get(category).ok()?;
    dict_of(doc, category)?.get(name).ok()
}

/// Decoded bytes of a stream; unfiltered streams are returned as stored
pub fn stream_bytes(stream: &Stream) -> Result<Vec<u8>, lopdf::Error> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content()
    } else {
        Ok(stream.content.clone())
    }
}

/// Concatenated, decoded content streams of a page
pub fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, lopdf::Error> {
    let page = doc.get_dictionary(page_id)?;
    let contents = match page.get(b"Contents") {
        Ok(obj) => obj,
        Err(_) => return Ok(Vec::new()),
    };

    let parts: Vec<&Object> = match resolve(doc, contents) {
        Some(Object::Array(items)) => items.iter().collect(),
        Some(_) => vec![contents],
        None => Vec::new(),
    };

    let mut content = Vec::new();
    for part in parts {
        if let Some(Object::Stream(stream)) = resolve(doc, part) {
            content.extend(stream_bytes(stream)?);
            // Streams may split operators at arbitrary boundaries
            content.push(b'\n');
        }
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn two_level_doc() -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Rotate" => 450,
            }),
        );
        (doc, page_id)
    }

    #[test]
    fn test_inherited_media_box() {
        let (doc, page_id) = two_level_doc();
        let rect = page_box(&doc, page_id);
        assert_eq!(rect, Rect::new(0.0, 0.0, 595.0, 842.0));
    }

    #[test]
    fn test_rotation_normalized() {
        let (doc, page_id) = two_level_doc();
        assert_eq!(page_rotation(&doc, page_id), 90);
    }

    #[test]
    fn test_missing_box_falls_back_to_letter() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        assert_eq!(page_box(&doc, page_id), Rect::letter());
    }

    #[test]
    fn test_resolve_follows_references() {
        let mut doc = Document::with_version("1.5");
        let inner = doc.add_object(Object::Integer(7));
        let outer = doc.add_object(Object::Reference(inner));
        let obj = Object::Reference(outer);
        assert_eq!(resolve(&doc, &obj).and_then(number), Some(7.0));
    }

    #[test]
    fn test_page_content_concatenates_parts() {
        let mut doc = Document::with_version("1.5");
        let a = doc.add_object(Stream::new(dictionary! {}, b"q".to_vec()));
        let b = doc.add_object(Stream::new(dictionary! {}, b"Q".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => vec![a.into(), b.into()],
        });
        assert_eq!(page_content(&doc, page_id).unwrap(), b"q\nQ\n".to_vec());
    }
}
