use crate::error::{FieldIssue, FieldIssueKind, Stage};
use crate::form_schema::{CurrentValues, FormSchema, Rect};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use pdf_writer::{Content, Name, Str};
use std::collections::BTreeMap;

/// Largest check mark, in points.
pub const MAX_MARK_SIZE: f64 = 12.0;
const MARK_HEIGHT_RATIO: f64 = 0.8;
/// ZapfDingbats "4" is a check mark.
const CHECK_GLYPH: &[u8] = b"4";
const FONT_KEY: &str = "FmZaDb";
const LETTER: Rect = Rect { x1: 0.0, y1: 0.0, x2: 612.0, y2: 792.0 };

// page trees are shallow; the bound only guards against /Parent cycles
const MAX_TREE_DEPTH: usize = 32;

fn as_f64(n: &Object) -> Option<f64> {
    match n {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// An inheritable page attribute: the page's own value or the nearest
/// ancestor's, with one level of indirection resolved.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return doc.dereference(value).ok().map(|(_, obj)| obj);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn owned_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    let (_, obj) = doc.dereference(obj).ok()?;
    obj.as_dict().ok().cloned()
}

fn effective_resources(doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
    inherited(doc, page_id, b"Resources")?.as_dict().ok().cloned()
}

fn effective_mediabox(doc: &Document, page_id: ObjectId) -> Option<Rect> {
    let bounds = inherited(doc, page_id, b"MediaBox")?.as_array().ok()?;
    let [x1, y1, x2, y2] = bounds.as_slice() else {
        return None;
    };
    let num = |obj: &Object| doc.dereference(obj).ok().and_then(|(_, n)| as_f64(n));
    Some(Rect {
        x1: num(x1)?,
        y1: num(y1)?,
        x2: num(x2)?,
        y2: num(y2)?,
    })
}

/// Where and how large to draw a mark for a field rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkPlacement {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

/// Centered placement; `None` for an empty or inverted rectangle.
pub fn mark_placement(rect: &Rect) -> Option<MarkPlacement> {
    if rect.width() <= 0.0 || rect.height() <= 0.0 {
        return None;
    }
    let size = (rect.height() * MARK_HEIGHT_RATIO).min(MAX_MARK_SIZE);
    let (cx, cy) = rect.center();
    // the glyph origin sits at its lower left, about a third of the size off center
    Some(MarkPlacement {
        x: cx - size / 3.0,
        y: cy - size / 3.0,
        size,
    })
}

#[derive(Debug, Default)]
pub struct OverlayReport {
    pub marks_drawn: usize,
    pub pages_touched: usize,
    pub issues: Vec<FieldIssue>,
}

impl OverlayReport {
    fn fail(&mut self, field_id: &str, detail: String) {
        tracing::warn!(field_id, stage = %Stage::Overlay, "{detail}");
        self.issues
            .push(FieldIssue::new(field_id, FieldIssueKind::OverlayFailure, detail));
    }
}

fn overlay_content(marks: &[(&str, MarkPlacement)]) -> Vec<u8> {
    let mut content = Content::new();
    content.save_state();
    content.set_fill_gray(0.0);
    for (_, mark) in marks {
        content.begin_text();
        content.set_font(Name(FONT_KEY.as_bytes()), mark.size as f32);
        content.next_line(mark.x as f32, mark.y as f32);
        content.show(Str(CHECK_GLYPH));
        content.end_text();
    }
    content.restore_state();
    content.finish().to_vec()
}

fn add_stream(doc: &mut Document, bytes: Vec<u8>) -> ObjectId {
    doc.add_object(Stream::new(Dictionary::new(), bytes))
}

/// Composite `overlay` above the page's existing content.
fn merge_overlay(
    doc: &mut Document,
    page_id: ObjectId,
    overlay: Vec<u8>,
    font_id: ObjectId,
) -> lopdf::Result<()> {
    // --- existing content, as references ---
    let old_contents = doc.get_dictionary(page_id)?.get(b"Contents").ok().cloned();
    let mut old_refs: Vec<Object> = Vec::new();
    match old_contents {
        Some(Object::Reference(cid)) => match doc.get_object(cid)? {
            Object::Array(arr) => old_refs.extend(arr.iter().cloned()),
            _ => old_refs.push(Object::Reference(cid)),
        },
        Some(Object::Array(arr)) => old_refs.extend(arr),
        Some(Object::Stream(s)) => old_refs.push(Object::Reference(doc.add_object(s))),
        _ => {}
    }

    // --- resources: copy the effective dictionary and add our font ---
    let mut resources = effective_resources(doc, page_id).unwrap_or_else(Dictionary::new);
    let mut fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|fonts| owned_dict(doc, fonts))
        .unwrap_or_else(Dictionary::new);
    fonts.set(FONT_KEY, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));

    // --- existing content bracketed by q/Q so its state cannot leak, overlay last ---
    let mut contents_refs: Vec<Object> = Vec::new();
    if !old_refs.is_empty() {
        contents_refs.push(Object::Reference(add_stream(doc, b"q\n".to_vec())));
        contents_refs.extend(old_refs);
        contents_refs.push(Object::Reference(add_stream(doc, b"\nQ\n".to_vec())));
    }
    contents_refs.push(Object::Reference(add_stream(doc, overlay)));

    let page = doc.get_dictionary_mut(page_id)?;
    page.set("Resources", Object::Dictionary(resources));
    if contents_refs.len() == 1 {
        page.set("Contents", contents_refs.remove(0));
    } else {
        page.set("Contents", Object::Array(contents_refs));
    }
    Ok(())
}

/// Draw a check mark for every checkbox/radio field with a truthy value and
/// merge the marks above each page's content. Pages without marks are left
/// untouched. Problems are confined to the field (or page) they concern.
pub(crate) fn render_overlays(
    doc: &mut Document,
    schema: &FormSchema,
    values: &CurrentValues,
) -> OverlayReport {
    let mut report = OverlayReport::default();
    let pages = doc.get_pages();
    let mut per_page: BTreeMap<u32, Vec<(&str, MarkPlacement)>> = BTreeMap::new();

    for field in schema.fields.iter().filter(|f| f.field_type.is_toggle()) {
        let Some(value) = values.get(&field.id) else {
            continue;
        };
        if !value.is_truthy() {
            continue;
        }
        let Some(&page_id) = pages.get(&field.page) else {
            report.fail(
                &field.id,
                format!("page {} not in document ({} pages)", field.page, pages.len()),
            );
            continue;
        };
        let Some(placement) = mark_placement(&field.rect) else {
            report.fail(&field.id, format!("degenerate rect {:?}", field.rect));
            continue;
        };
        let media_box = effective_mediabox(doc, page_id).unwrap_or(LETTER);
        if !field.rect.within(&media_box) {
            report.fail(
                &field.id,
                format!("rect {:?} outside page box {:?}", field.rect, media_box),
            );
            continue;
        }
        per_page.entry(field.page).or_default().push((&field.id, placement));
    }

    if per_page.is_empty() {
        return report;
    }

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "ZapfDingbats",
    });

    for (page_no, marks) in per_page {
        let page_id = pages[&page_no];
        match merge_overlay(doc, page_id, overlay_content(&marks), font_id) {
            Ok(()) => {
                report.pages_touched += 1;
                report.marks_drawn += marks.len();
                for (field_id, mark) in &marks {
                    tracing::debug!(
                        field_id,
                        stage = %Stage::Overlay,
                        page = page_no,
                        x = mark.x,
                        y = mark.y,
                        size = mark.size,
                        "drew mark"
                    );
                }
            }
            Err(e) => {
                for (field_id, _) in &marks {
                    report.fail(field_id, format!("cannot merge overlay on page {page_no}: {e}"));
                }
            }
        }
    }
    report
}
