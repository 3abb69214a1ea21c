//! Small form PDFs for unit tests.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Checkbox,
}

#[derive(Debug, Clone)]
pub(crate) struct FixtureField {
    name: String,
    kind: Kind,
    page: u32,
    rect: [f64; 4],
    widget_only: bool,
    parent: Option<String>,
}

impl FixtureField {
    fn new(name: &str, kind: Kind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            page: 1,
            rect: [100.0, 600.0, 300.0, 620.0],
            widget_only: false,
            parent: None,
        }
    }

    pub(crate) fn text(name: &str) -> Self {
        Self::new(name, Kind::Text)
    }

    pub(crate) fn checkbox(name: &str) -> Self {
        Self::new(name, Kind::Checkbox).at([100.0, 100.0, 120.0, 120.0])
    }

    pub(crate) fn on_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub(crate) fn at(mut self, rect: [f64; 4]) -> Self {
        self.rect = rect;
        self
    }

    /// Only a page widget, not listed in `/AcroForm /Fields`.
    pub(crate) fn widget_only(mut self) -> Self {
        self.widget_only = true;
        self
    }

    /// Nest the widget under a named, non-widget parent field.
    pub(crate) fn under_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }
}

fn rect_obj(r: [f64; 4]) -> Object {
    Object::Array(r.iter().map(|v| (*v).into()).collect())
}

fn appearance(doc: &mut Document, rect: [f64; 4], body: &[u8]) -> ObjectId {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "BBox" => rect_obj([0.0, 0.0, rect[2] - rect[0], rect[3] - rect[1]]),
    };
    doc.add_object(Stream::new(dict, body.to_vec()))
}

/// A letter-sized document with `pages` pages, each carrying a line of
/// Helvetica text, and the given fields.
pub(crate) fn form_pdf(fields: &[FixtureField], pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let page_ids: Vec<ObjectId> = (0..pages).map(|_| doc.new_object_id()).collect();
    let mut annots: Vec<Vec<Object>> = vec![Vec::new(); pages as usize];
    let mut acro_fields: Vec<Object> = Vec::new();

    for field in fields {
        let page_id = page_ids[(field.page - 1) as usize];
        let mut widget = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "T" => Object::string_literal(field.name.as_str()),
            "Rect" => rect_obj(field.rect),
            "P" => page_id,
        };
        match field.kind {
            Kind::Text => {
                let ap = appearance(&mut doc, field.rect, b"/Tx BMC EMC");
                widget.set("FT", "Tx");
                widget.set("AP", dictionary! { "N" => ap });
            }
            Kind::Checkbox => {
                let on = appearance(&mut doc, field.rect, b"0 g 2 2 12 12 re f");
                let off = appearance(&mut doc, field.rect, b"");
                widget.set("FT", "Btn");
                widget.set("V", "Off");
                widget.set("AS", "Off");
                widget.set("AP", dictionary! { "N" => dictionary! { "Yes" => on, "Off" => off } });
            }
        }

        let widget_id = doc.new_object_id();
        let top_id = match &field.parent {
            Some(parent) => {
                let parent_id = doc.add_object(dictionary! {
                    "T" => Object::string_literal(parent.as_str()),
                    "Kids" => vec![Object::Reference(widget_id)],
                });
                widget.set("Parent", parent_id);
                parent_id
            }
            None => widget_id,
        };
        doc.objects.insert(widget_id, Object::Dictionary(widget));

        annots[(field.page - 1) as usize].push(Object::Reference(widget_id));
        if !field.widget_only {
            acro_fields.push(Object::Reference(top_id));
        }
    }

    for (i, (page_id, page_annots)) in page_ids.iter().zip(annots).enumerate() {
        let body = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET\n", i + 1);
        let contents_id = doc.add_object(Stream::new(Dictionary::new(), body.into_bytes()));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => rect_obj([0.0, 0.0, 612.0, 792.0]),
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "Contents" => contents_id,
        };
        if !page_annots.is_empty() {
            page.set("Annots", page_annots);
        }
        doc.objects.insert(*page_id, Object::Dictionary(page));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => Object::Integer(pages as i64),
        }),
    );

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };
    if !acro_fields.is_empty() {
        let form_id = doc.add_object(dictionary! {
            "Fields" => acro_fields,
            "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
        });
        catalog.set("AcroForm", form_id);
    }
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("fixture serializes");
    out
}
