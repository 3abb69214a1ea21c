use crate::error::AssignError;
use crate::form_schema::{FieldType, FieldValue};
use lopdf::{Document, Object, ObjectId, StringFormat};

const STATE_ON: &[u8] = b"Yes";
const STATE_ON_ALT: &[u8] = b"On";
const STATE_OFF: &[u8] = b"Off";

/// What an assignment did to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// Empty value or unsupported type, node untouched.
    Skipped,
    /// `/V` set to text, cached appearance dropped.
    Text(String),
    /// `/V` and `/AS` set to the named appearance state.
    State(String),
}

/// Encode a text string: PDFDocEncoding-compatible text as a literal,
/// anything else as UTF-16BE with a byte order mark.
pub(crate) fn encode_text_string(text: &str) -> Object {
    if text.chars().all(|c| (c as u32) < 0x80) {
        Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

/// Decode a PDF text string, handling the UTF-16BE BOM.
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Pick the "on" state among the names in `/AP /N`.
pub(crate) fn select_on_state<'a, I>(states: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let states: Vec<&[u8]> = states.into_iter().collect();
    [STATE_ON, STATE_ON_ALT]
        .into_iter()
        .find(|preferred| states.contains(preferred))
        .or_else(|| states.iter().copied().find(|s| *s != STATE_OFF))
        .unwrap_or(STATE_ON)
        .to_vec()
}

/// Names of the normal appearance states, if the node has any.
fn appearance_states(doc: &Document, node: ObjectId) -> Result<Vec<Vec<u8>>, AssignError> {
    let dict = doc
        .get_object(node)?
        .as_dict()
        .map_err(|_| AssignError::NotADictionary)?;
    let Ok(ap) = dict.get(b"AP") else {
        return Ok(Vec::new());
    };
    let Ok(ap) = doc.dereference(ap).and_then(|(_, o)| o.as_dict()) else {
        return Ok(Vec::new());
    };
    let Ok(normal) = ap.get(b"N") else {
        return Ok(Vec::new());
    };
    match doc.dereference(normal).and_then(|(_, o)| o.as_dict()) {
        Ok(states) => Ok(states.iter().map(|(k, _)| k.clone()).collect()),
        // a single stream instead of a state dictionary
        Err(_) => Ok(Vec::new()),
    }
}

/// Apply `value` to the field node `node` according to `field_type`.
pub fn assign_value(
    doc: &mut Document,
    node: ObjectId,
    field_type: FieldType,
    value: &FieldValue,
) -> Result<Assignment, AssignError> {
    if value.is_empty() {
        return Ok(Assignment::Skipped);
    }

    if field_type.is_text_like() {
        let text = value.as_text();
        let dict = doc
            .get_object_mut(node)?
            .as_dict_mut()
            .map_err(|_| AssignError::NotADictionary)?;
        dict.set("V", encode_text_string(&text));
        dict.remove(b"AP");
        return Ok(Assignment::Text(text));
    }

    if field_type.is_toggle() {
        let state = if value.is_truthy() {
            let states = appearance_states(doc, node)?;
            select_on_state(states.iter().map(Vec::as_slice))
        } else {
            STATE_OFF.to_vec()
        };
        let dict = doc
            .get_object_mut(node)?
            .as_dict_mut()
            .map_err(|_| AssignError::NotADictionary)?;
        dict.set("V", Object::Name(state.clone()));
        dict.set("AS", Object::Name(state.clone()));
        return Ok(Assignment::State(String::from_utf8_lossy(&state).into_owned()));
    }

    Ok(Assignment::Skipped)
}
