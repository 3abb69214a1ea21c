#![allow(dead_code)]

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

pub enum Widget {
    Text(&'static str),
    Checkbox(&'static str, [f64; 4]),
}

fn rect(r: [f64; 4]) -> Object {
    Object::Array(r.iter().map(|v| (*v).into()).collect())
}

/// One letter page. Widgets are listed in `/AcroForm /Fields` only when
/// `with_form` is set; they always appear in the page's `/Annots`.
pub fn one_page_form(widgets: &[Widget], with_form: bool) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.new_object_id();

    let mut annots = Vec::new();
    for widget in widgets {
        let dict = match widget {
            Widget::Text(name) => dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "FT" => "Tx",
                "T" => Object::string_literal(*name),
                "Rect" => rect([100.0, 600.0, 300.0, 620.0]),
                "P" => page_id,
            },
            Widget::Checkbox(name, r) => {
                let on = doc.add_object(Stream::new(Dictionary::new(), b"0 g 0 0 10 10 re f".to_vec()));
                dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Widget",
                    "FT" => "Btn",
                    "T" => Object::string_literal(*name),
                    "Rect" => rect(*r),
                    "P" => page_id,
                    "V" => "Off",
                    "AS" => "Off",
                    "AP" => dictionary! { "N" => dictionary! { "Yes" => on } },
                }
            }
        };
        annots.push(Object::Reference(doc.add_object(dict)));
    }

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let contents = doc.add_object(Stream::new(
        Dictionary::new(),
        b"BT /F1 12 Tf 72 720 Td (Application) Tj ET".to_vec(),
    ));
    let mut page = dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => rect([0.0, 0.0, 612.0, 792.0]),
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        "Contents" => contents,
    };
    if !annots.is_empty() {
        page.set("Annots", annots.clone());
    }
    doc.objects.insert(page_id, Object::Dictionary(page));
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
        }),
    );

    let mut catalog = dictionary! { "Type" => "Catalog", "Pages" => pages_id };
    if with_form {
        let form = doc.add_object(dictionary! { "Fields" => annots });
        catalog.set("AcroForm", form);
    }
    let root = doc.add_object(catalog);
    doc.trailer.set("Root", root);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn number(obj: &Object) -> f64 {
    match obj {
        Object::Integer(i) => *i as f64,
        Object::Real(r) => *r as f64,
        other => panic!("not a number: {other:?}"),
    }
}

/// Text origins `(x, y)` drawn with the overlay's ZapfDingbats resource.
pub fn mark_origins(bytes: &[u8], page_no: u32) -> Vec<(f64, f64)> {
    let doc = Document::load_mem(bytes).unwrap();
    let page_id: ObjectId = doc.get_pages()[&page_no];
    let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();

    let mut font = Vec::new();
    let mut pos = (0.0, 0.0);
    let mut marks = Vec::new();
    for op in &content.operations {
        match op.operator.as_str() {
            "Tf" => font = op.operands[0].as_name().unwrap().to_vec(),
            "Td" => pos = (number(&op.operands[0]), number(&op.operands[1])),
            "Tj" if font == b"FmZaDb" => marks.push(pos),
            _ => {}
        }
    }
    marks
}
