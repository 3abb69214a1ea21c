//! Owned wrapper over the `lopdf` object graph.
//!
//! Callers outside the crate only see [`FieldNode`] handles; every mutation
//! goes through [`FormDocument`].

use crate::assign::{self, Assignment, decode_text_string};
use crate::error::AssignError;
use crate::flatten;
use crate::form_schema::{CurrentValues, FieldDefinition, FieldType, FieldValue, FormSchema};
use crate::overlay::{self, OverlayReport};
use crate::resolver::{FieldResolver, MatchRule};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashSet;

// deep enough for any real field hierarchy, bounded against cycles
const MAX_FIELD_DEPTH: usize = 32;

/// Opaque handle to a field or widget node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldNode(ObjectId);

/// Where a candidate node was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSource {
    /// `/AcroForm /Fields` and its `/Kids`.
    InteractiveForm,
    /// A widget in a page's `/Annots`.
    PageAnnotation,
}

impl NodeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeSource::InteractiveForm => "acroform",
            NodeSource::PageAnnotation => "annotation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub node: FieldNode,
    pub source: NodeSource,
}

/// A successful lookup of a schema id.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub node: FieldNode,
    pub name: String,
    pub rule: MatchRule,
    pub source: NodeSource,
}

/// A schema field paired with the node it resolved to, if any.
#[derive(Debug, Clone)]
pub struct ResolvedField<'s> {
    pub definition: &'s FieldDefinition,
    pub resolution: Option<Resolution>,
}

pub struct FormDocument {
    doc: Document,
}

impl FormDocument {
    pub fn open(bytes: &[u8]) -> Result<Self, lopdf::Error> {
        Ok(Self {
            doc: Document::load_mem(bytes)?,
        })
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    pub fn has_interactive_form(&self) -> bool {
        self.doc
            .catalog()
            .is_ok_and(|catalog| catalog.has(b"AcroForm"))
    }

    fn acroform(&self) -> Option<&Dictionary> {
        let catalog = self.doc.catalog().ok()?;
        let acroform = catalog.get(b"AcroForm").ok()?;
        self.doc.dereference(acroform).ok()?.1.as_dict().ok()
    }

    /// Named nodes in search order: the field tree first, then page widgets.
    pub fn candidates(&self) -> Vec<Candidate> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();

        if let Some(fields) = self
            .acroform()
            .and_then(|form| form.get(b"Fields").ok())
            .and_then(|f| self.doc.dereference(f).ok())
            .and_then(|(_, f)| f.as_array().ok())
        {
            for field in fields {
                if let Object::Reference(id) = field {
                    self.walk_fields(*id, 0, &mut visited, &mut out);
                }
            }
        }

        for page_id in self.doc.get_pages().into_values() {
            let Some(annots) = self
                .doc
                .get_dictionary(page_id)
                .ok()
                .and_then(|page| page.get(b"Annots").ok())
                .and_then(|a| self.doc.dereference(a).ok())
                .and_then(|(_, a)| a.as_array().ok())
            else {
                continue;
            };
            for annot in annots {
                let Object::Reference(id) = annot else {
                    continue;
                };
                let Ok(dict) = self.doc.get_dictionary(*id) else {
                    continue;
                };
                let is_widget = dict
                    .get(b"Subtype")
                    .and_then(Object::as_name)
                    .is_ok_and(|s| s == b"Widget");
                if let (true, Some(name)) = (is_widget, partial_name(dict)) {
                    out.push(Candidate {
                        name,
                        node: FieldNode(*id),
                        source: NodeSource::PageAnnotation,
                    });
                }
            }
        }
        out
    }

    fn walk_fields(
        &self,
        id: ObjectId,
        depth: usize,
        visited: &mut HashSet<ObjectId>,
        out: &mut Vec<Candidate>,
    ) {
        if depth >= MAX_FIELD_DEPTH || !visited.insert(id) {
            return;
        }
        let Ok(dict) = self.doc.get_dictionary(id) else {
            return;
        };
        if let Some(name) = partial_name(dict) {
            out.push(Candidate {
                name,
                node: FieldNode(id),
                source: NodeSource::InteractiveForm,
            });
        }
        if let Some(kids) = dict
            .get(b"Kids")
            .ok()
            .and_then(|k| self.doc.dereference(k).ok())
            .and_then(|(_, k)| k.as_array().ok())
        {
            for kid in kids {
                if let Object::Reference(kid_id) = kid {
                    self.walk_fields(*kid_id, depth + 1, visited, out);
                }
            }
        }
    }

    /// Distinct candidate names, in search order.
    pub fn field_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.candidates()
            .into_iter()
            .filter(|c| seen.insert(c.name.clone()))
            .map(|c| c.name)
            .collect()
    }

    pub fn resolve(&self, resolver: &FieldResolver, field_id: &str) -> Option<Resolution> {
        let candidates = self.candidates();
        resolver
            .find(field_id, candidates.iter().map(|c| (c.name.as_str(), c)))
            .map(|(c, rule)| Resolution {
                node: c.node,
                name: c.name.clone(),
                rule,
                source: c.source,
            })
    }

    pub fn resolve_field<'s>(
        &self,
        resolver: &FieldResolver,
        definition: &'s FieldDefinition,
    ) -> ResolvedField<'s> {
        ResolvedField {
            definition,
            resolution: self.resolve(resolver, &definition.id),
        }
    }

    pub fn assign(
        &mut self,
        node: FieldNode,
        field_type: FieldType,
        value: &FieldValue,
    ) -> Result<Assignment, AssignError> {
        assign::assign_value(&mut self.doc, node.0, field_type, value)
    }

    /// Ask viewers to rebuild appearances for fields whose `/AP` was dropped.
    pub fn set_need_appearances(&mut self) -> Result<(), lopdf::Error> {
        let root = self.doc.trailer.get(b"Root")?.as_reference()?;
        let acroform = self.doc.get_dictionary(root)?.get(b"AcroForm")?.clone();
        let form = match acroform {
            Object::Reference(id) => self.doc.get_dictionary_mut(id)?,
            _ => self
                .doc
                .get_dictionary_mut(root)?
                .get_mut(b"AcroForm")?
                .as_dict_mut()?,
        };
        form.set("NeedAppearances", Object::Boolean(true));
        Ok(())
    }

    /// `/V` of a node, as text.
    pub fn field_value(&self, node: FieldNode) -> Option<String> {
        let dict = self.doc.get_dictionary(node.0).ok()?;
        match dict.get(b"V").ok()? {
            Object::String(bytes, _) => Some(decode_text_string(bytes)),
            Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        }
    }

    /// `/AS` of a node.
    pub fn appearance_state(&self, node: FieldNode) -> Option<String> {
        let dict = self.doc.get_dictionary(node.0).ok()?;
        let name = dict.get(b"AS").and_then(Object::as_name).ok()?;
        Some(String::from_utf8_lossy(name).into_owned())
    }

    pub fn has_appearance_stream(&self, node: FieldNode) -> bool {
        self.doc
            .get_dictionary(node.0)
            .is_ok_and(|dict| dict.has(b"AP"))
    }

    /// Draw check marks for truthy checkbox/radio values.
    pub fn render_overlay(&mut self, schema: &FormSchema, values: &CurrentValues) -> OverlayReport {
        overlay::render_overlays(&mut self.doc, schema, values)
    }

    /// Remove the interactive field tree. Returns whether one existed.
    pub fn flatten(&mut self) -> Result<bool, lopdf::Error> {
        flatten::flatten(&mut self.doc)
    }

    pub fn serialize(&mut self) -> Result<Vec<u8>, lopdf::Error> {
        let mut out = Vec::new();
        self.doc.save_to(&mut out)?;
        Ok(out)
    }
}

fn partial_name(dict: &Dictionary) -> Option<String> {
    match dict.get(b"T").ok()? {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        _ => None,
    }
}
