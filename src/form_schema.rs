use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Field kinds produced by the extraction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Date,
    Number,
    Phone,
    Ssn,
    Checkbox,
    Radio,
    #[serde(other)]
    Other,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Date => "date",
            FieldType::Number => "number",
            FieldType::Phone => "phone",
            FieldType::Ssn => "ssn",
            FieldType::Checkbox => "checkbox",
            FieldType::Radio => "radio",
            FieldType::Other => "other",
        }
    }

    /// Fields whose value is written as a string into `/V`.
    pub fn is_text_like(&self) -> bool {
        matches!(
            self,
            FieldType::Text | FieldType::Date | FieldType::Number | FieldType::Phone | FieldType::Ssn
        )
    }

    /// Checkbox and radio fields, which get a drawn mark.
    pub fn is_toggle(&self) -> bool {
        matches!(self, FieldType::Checkbox | FieldType::Radio)
    }
}

/// Field rectangle in page user space (origin bottom-left, y up).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Rect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl From<[f64; 4]> for Rect {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Rect { x1, y1, x2, y2 }
    }
}

impl From<Rect> for [f64; 4] {
    fn from(r: Rect) -> Self {
        [r.x1, r.y1, r.x2, r.y2]
    }
}

impl Rect {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x1 + self.width() / 2.0, self.y1 + self.height() / 2.0)
    }

    /// True when `self` lies fully inside `outer`.
    pub fn within(&self, outer: &Rect) -> bool {
        self.x1 >= outer.x1 && self.y1 >= outer.y1 && self.x2 <= outer.x2 && self.y2 <= outer.y2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// 1-indexed page number
    pub page: u32,
    pub rect: Rect,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormSchema {
    pub fields: Vec<FieldDefinition>,
}

// Accept both `{"fields": [...]}` and a bare array of definitions.
impl<'de> Deserialize<'de> for FormSchema {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Wrapped { fields: Vec<FieldDefinition> },
            Bare(Vec<FieldDefinition>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Wrapped { fields } | Repr::Bare(fields) => FormSchema { fields },
        })
    }
}

impl FormSchema {
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        Self { fields }
    }

    /// Index by id. The first definition wins when ids repeat.
    pub fn lookup(&self) -> HashMap<&str, &FieldDefinition> {
        let mut map = HashMap::with_capacity(self.fields.len());
        for field in &self.fields {
            map.entry(field.id.as_str()).or_insert(field);
        }
        map
    }

    /// Human-readable problems: duplicate ids and zero page numbers.
    pub fn validate(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut problems = Vec::new();
        for field in &self.fields {
            if !seen.insert(field.id.as_str()) {
                problems.push(format!("duplicate field id {:?}", field.id));
            }
            if field.page == 0 {
                problems.push(format!("field {:?} has page 0 (pages are 1-indexed)", field.id));
            }
        }
        problems
    }
}

/// A single entry of the sparse value map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Null,
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Null => String::new(),
        }
    }

    /// Permissive boolean parse used for checkbox and radio values.
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Null => false,
            other => matches!(
                other.as_text().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Sparse id -> value map; only touched fields appear.
pub type CurrentValues = BTreeMap<String, FieldValue>;
