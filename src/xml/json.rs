// xml/json.rs
//! Deterministic XML ⇄ JSON transform.
//!
//! Each element maps to an object with `#name` (string), `#attributes`
//! (object of strings) and `#nodes` (ordered array of child objects or
//! text strings). The transform is mechanical in both directions, so
//! JSON → XML → JSON is an identity on structure.

use serde_json::{json, Map, Value};

use crate::error::{Result, SiError};
use crate::xml::{Element, Node};

pub fn element_to_json(elem: &Element) -> Value {
    let mut attrs = Map::new();
    for (k, v) in elem.attrs() {
        attrs.insert(k.to_string(), Value::String(v.to_string()));
    }
    let nodes: Vec<Value> = elem
        .nodes()
        .iter()
        .map(|node| match node {
            Node::Element(e) => element_to_json(e),
            Node::Text(t) => Value::String(t.clone()),
        })
        .collect();
    json!({
        "#name": elem.name(),
        "#attributes": Value::Object(attrs),
        "#nodes": Value::Array(nodes),
    })
}

pub fn json_to_element(value: &Value) -> Result<Element> {
    let obj = value
        .as_object()
        .ok_or_else(|| SiError::Json("element is not an object".to_string()))?;
    let name = obj
        .get("#name")
        .and_then(Value::as_str)
        .ok_or_else(|| SiError::Json("element has no #name".to_string()))?;
    let mut elem = Element::new(name);
    if let Some(attrs) = obj.get("#attributes").and_then(Value::as_object) {
        for (k, v) in attrs {
            let text = v
                .as_str()
                .ok_or_else(|| SiError::Json(format!("attribute '{k}' is not a string")))?;
            elem.set_attr(k, text);
        }
    }
    if let Some(nodes) = obj.get("#nodes").and_then(Value::as_array) {
        for node in nodes {
            match node {
                Value::String(text) => elem.push_text(text),
                Value::Object(_) => elem.push_child(json_to_element(node)?),
                other => {
                    return Err(SiError::Json(format!("unexpected node {other}")));
                }
            }
        }
    }
    Ok(elem)
}

/// Pretty-printed JSON document for a root element.
pub fn to_document_string(root: &Element) -> String {
    let mut out = serde_json::to_string_pretty(&element_to_json(root))
        .unwrap_or_else(|_| "{}".to_string());
    out.push('\n');
    out
}

/// Parses a JSON document produced by [`to_document_string`].
pub fn parse_document(text: &str) -> Result<Element> {
    let value: Value = serde_json::from_str(text).map_err(|e| SiError::Json(e.to_string()))?;
    json_to_element(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Element {
        let mut root = Element::new("tsduck");
        let mut table = Element::new("generic_short_table");
        table.set_attr_hex8("table_id", 0xAB);
        table.set_attr_bool("private", false);
        table.set_hex_text(&[1, 2, 3]);
        root.push_child(table);
        root
    }

    #[test]
    fn test_shape() {
        let value = element_to_json(&sample());
        assert_eq!(value["#name"], "tsduck");
        let table = &value["#nodes"][0];
        assert_eq!(table["#name"], "generic_short_table");
        // attributes are always strings
        assert_eq!(table["#attributes"]["table_id"], "0xAB");
        assert_eq!(table["#attributes"]["private"], "false");
        assert_eq!(table["#nodes"][0], "01 02 03");
    }

    #[test]
    fn test_json_round_trip_is_identity() {
        let root = sample();
        let value = element_to_json(&root);
        let back = json_to_element(&value).unwrap();
        assert_eq!(back, root);
        assert_eq!(element_to_json(&back), value);
    }
}
