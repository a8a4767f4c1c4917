use std::collections::BTreeSet;

use lopdf::{Document, Object, ObjectId};

use crate::error::Result;

/// Counts from one stripping pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StripReport {
    pub pages_touched: usize,
    pub annotations_removed: usize,
}

/// Delete every annotation from every page of `doc`.
///
/// All annotation references are collected before anything is deleted, so
/// removal never walks a list it is mutating. Popups owned by a removed
/// annotation go with it, and AcroForm fields that pointed at removed widgets
/// are unlinked so the document keeps no dangling references.
pub fn strip_annotations(doc: &mut Document) -> Result<StripReport> {
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();

    // Snapshot first: (page, annotation ids, indirect Annots array id)
    let mut snapshot = Vec::new();
    for page_id in pages {
        let page = doc.get_dictionary(page_id)?;
        let Ok(annots) = page.get(b"Annots") else {
            continue;
        };
        let (array_id, items) = match annots {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(Object::Array(items)) => (Some(*id), items.clone()),
                _ => (Some(*id), Vec::new()),
            },
            Object::Array(items) => (None, items.clone()),
            _ => (None, Vec::new()),
        };
        let ids: Vec<ObjectId> = items
            .iter()
            .filter_map(|item| item.as_reference().ok())
            .collect();
        snapshot.push((page_id, ids, array_id));
    }

    let mut removed: BTreeSet<ObjectId> = BTreeSet::new();
    let mut report = StripReport::default();

    for (page_id, ids, array_id) in snapshot {
        for id in &ids {
            if let Ok(popup) = doc
                .get_dictionary(*id)
                .and_then(|annot| annot.get(b"Popup"))
                .and_then(Object::as_reference)
            {
                removed.insert(popup);
            }
            removed.insert(*id);
        }
        if let Some(array_id) = array_id {
            removed.insert(array_id);
        }

        doc.get_dictionary_mut(page_id)?.remove(b"Annots");
        report.pages_touched += 1;
        report.annotations_removed += ids.len();
    }

    for id in &removed {
        doc.objects.remove(id);
    }
    if !removed.is_empty() {
        unlink_form_fields(doc, &removed);
    }

    log::debug!(
        "Removed {} annotation(s) from {} page(s)",
        report.annotations_removed,
        report.pages_touched
    );
    Ok(report)
}

/// Drop deleted widgets from `/AcroForm /Fields` and from field `/Kids`
fn unlink_form_fields(doc: &mut Document, removed: &BTreeSet<ObjectId>) {
    let Ok(root_id) = doc.trailer.get(b"Root").and_then(Object::as_reference) else {
        return;
    };
    let acroform_id = match doc.get_dictionary(root_id).and_then(|root| root.get(b"AcroForm")) {
        Ok(Object::Reference(id)) => Some(*id),
        Ok(_) => None,
        Err(_) => return,
    };

    let mut pending: Vec<ObjectId> = Vec::new();
    let fields = match acroform_id {
        Some(id) => doc.get_dictionary_mut(id).ok(),
        None => doc
            .get_dictionary_mut(root_id)
            .ok()
            .and_then(|root| root.get_mut(b"AcroForm").ok())
            .and_then(|form| form.as_dict_mut().ok()),
    }
    .and_then(|form| form.get_mut(b"Fields").ok())
    .and_then(|fields| fields.as_array_mut().ok());
    if let Some(fields) = fields {
        retain_live(fields, removed, &mut pending);
    }

    // Walk the surviving field tree once, pruning Kids
    let mut seen = BTreeSet::new();
    while let Some(id) = pending.pop() {
        if !seen.insert(id) {
            continue;
        }
        let kids = doc
            .get_dictionary_mut(id)
            .ok()
            .and_then(|field| field.get_mut(b"Kids").ok())
            .and_then(|kids| kids.as_array_mut().ok());
        if let Some(kids) = kids {
            retain_live(kids, removed, &mut pending);
        }
    }
}

fn retain_live(items: &mut Vec<Object>, removed: &BTreeSet<ObjectId>, live: &mut Vec<ObjectId>) {
    items.retain(|item| match item.as_reference() {
        Ok(id) if removed.contains(&id) => false,
        Ok(id) => {
            live.push(id);
            true
        }
        Err(_) => true,
    });
}

/// Number of annotations still attached to each page, in page order
pub fn annotation_counts(doc: &Document) -> Vec<usize> {
    doc.get_pages()
        .into_values()
        .map(|page_id| {
            doc.get_dictionary(page_id)
                .and_then(|page| page.get(b"Annots"))
                .ok()
                .and_then(|annots| match annots {
                    Object::Reference(id) => doc.get_object(*id).ok(),
                    other => Some(other),
                })
                .and_then(|annots| annots.as_array().ok())
                .map_or(0, Vec::len)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn annotated_doc(per_page: &[usize]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        let mut widgets = Vec::new();

        for (n, count) in per_page.iter().enumerate() {
            let mut annots = Vec::new();
            for i in 0..*count {
                let popup = doc.add_object(dictionary! { "Type" => "Annot", "Subtype" => "Popup" });
                let annot = doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => if i == 0 { "Widget" } else { "Text" },
                    "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()],
                    "Popup" => popup,
                });
                if i == 0 {
                    widgets.push(Object::Reference(annot));
                }
                annots.push(Object::Reference(annot));
            }
            // Alternate between direct and indirect Annots arrays
            let annots_obj = if n % 2 == 0 {
                Object::Array(annots)
            } else {
                Object::Reference(doc.add_object(Object::Array(annots)))
            };
            kids.push(Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Annots" => annots_obj,
            })));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => count }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "AcroForm" => dictionary! { "Fields" => widgets },
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn test_every_page_ends_with_zero_annotations() {
        let mut doc = annotated_doc(&[3, 0, 5, 1]);
        let report = strip_annotations(&mut doc).unwrap();
        assert_eq!(report.annotations_removed, 9);
        assert_eq!(report.pages_touched, 4);
        assert_eq!(annotation_counts(&doc), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_removed_objects_and_form_fields() {
        let mut doc = annotated_doc(&[2, 2]);
        let before = doc.objects.len();
        strip_annotations(&mut doc).unwrap();

        // 4 annotations, 4 popups, one indirect Annots array
        assert_eq!(doc.objects.len(), before - 9);
        let root = doc.catalog().unwrap();
        let fields = root
            .get(b"AcroForm")
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Fields")
            .unwrap()
            .as_array()
            .unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn test_document_without_annotations_is_untouched() {
        let mut doc = annotated_doc(&[0]);
        let before = doc.objects.len();
        let report = strip_annotations(&mut doc).unwrap();
        assert_eq!(report.annotations_removed, 0);
        assert_eq!(doc.objects.len(), before);
    }
}
