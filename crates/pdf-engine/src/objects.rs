use crate::PageGeometry;
use lopdf::{Dictionary, Document, Object, ObjectId};

const MAX_TREE_DEPTH: usize = 32;

pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

/// Looks `key` up on the page, then up the `/Parent` chain.
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn number(doc: &Document, object: &Object) -> Option<f32> {
    match resolve(doc, object) {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

pub(crate) fn page_geometry(doc: &Document, page_id: ObjectId) -> PageGeometry {
    let mut geometry = PageGeometry::LETTER;

    let media_box = inherited(doc, page_id, b"MediaBox")
        .and_then(|object| object.as_array().ok())
        .filter(|array| array.len() == 4)
        .and_then(|array| {
            let values = array.iter().map(|item| number(doc, item)).collect::<Option<Vec<_>>>()?;
            Some((values[0], values[1], values[2], values[3]))
        });

    if let Some((x0, y0, x1, y1)) = media_box {
        geometry.origin_x = x0.min(x1);
        geometry.origin_y = y0.min(y1);
        geometry.width_pt = (x1 - x0).abs();
        geometry.height_pt = (y1 - y0).abs();
    }

    geometry.rotation = inherited(doc, page_id, b"Rotate")
        .and_then(|object| number(doc, object))
        .map(|degrees| (degrees.round() as i64).rem_euclid(360))
        .unwrap_or(0);

    geometry
}

/// Effective `/Resources` of a page as an owned dictionary.
pub(crate) fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    inherited(doc, page_id, b"Resources")
        .and_then(|object| object.as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new)
}

/// Content stream references of a page, flattened from whichever form it uses.
pub(crate) fn page_contents(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}
