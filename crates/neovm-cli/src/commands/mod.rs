//! Subcommands and the helpers they share

pub mod disasm;
pub mod run;

use std::fs;
use std::path::Path;

use anyhow::Context;
use neovm::heap::Heap;
use neovm::{ExecutionEngineLimits, ObjectId, StackItem};
use serde_json::{json, Value};

/// Read a script given as hex text or as a path to a binary or hex file
pub fn read_script(input: &str) -> anyhow::Result<Vec<u8>> {
    let path = Path::new(input);
    if path.is_file() {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let hex_text = std::str::from_utf8(&bytes).ok().and_then(|text| decode_hex(text).ok());
        return Ok(hex_text.unwrap_or(bytes));
    }
    decode_hex(input).with_context(|| format!("'{input}' is neither a file nor a hex script"))
}

fn decode_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let text = text.trim();
    hex::decode(text.strip_prefix("0x").unwrap_or(text))
}

/// Load engine limits from a TOML file, or the defaults
pub fn read_limits(path: Option<&Path>) -> anyhow::Result<ExecutionEngineLimits> {
    let Some(path) = path else {
        return Ok(ExecutionEngineLimits::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read limits from {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid limits file {}", path.display()))
}

/// JSON view of a stack item: `{"type": ..., "value": ...}`
pub fn item_json(item: &StackItem, heap: &Heap) -> Value {
    render(item, heap, &mut Vec::new())
}

/// One-line text view of a stack item
pub fn item_text(item: &StackItem, heap: &Heap) -> String {
    let value = item_json(item, heap);
    match value.get("value") {
        Some(inner) => format!("{} {}", item.item_type(), inner),
        None => item.item_type().to_string(),
    }
}

fn render(item: &StackItem, heap: &Heap, ancestors: &mut Vec<ObjectId>) -> Value {
    let kind = item.item_type().to_string();
    if let Some(id) = item.object_id() {
        if ancestors.contains(&id) {
            return json!({ "type": kind, "value": "<cycle>" });
        }
    }

    let value = match item {
        StackItem::Null | StackItem::InteropInterface(_) => return json!({ "type": kind }),
        StackItem::Boolean(value) => json!(value),
        StackItem::Integer(value) => json!(value.to_string()),
        StackItem::ByteString(bytes) => json!(hex::encode(bytes)),
        StackItem::Pointer(pointer) => json!(pointer.position()),
        StackItem::Buffer(id) => match heap.buffer(*id) {
            Ok(bytes) => json!(hex::encode(bytes)),
            Err(error) => json!(error.to_string()),
        },
        StackItem::Array(id) | StackItem::Struct(id) => {
            ancestors.push(*id);
            let elements = match heap.items(*id) {
                Ok(items) => items.iter().map(|child| render(child, heap, ancestors)).collect(),
                Err(error) => vec![json!(error.to_string())],
            };
            ancestors.pop();
            Value::Array(elements)
        }
        StackItem::Map(id) => {
            ancestors.push(*id);
            let entries = match heap.map(*id) {
                Ok(map) => map
                    .iter()
                    .map(|(key, value)| {
                        json!({
                            "key": render(&key.to_item(), heap, ancestors),
                            "value": render(value, heap, ancestors),
                        })
                    })
                    .collect(),
                Err(error) => vec![json!(error.to_string())],
            };
            ancestors.pop();
            Value::Array(entries)
        }
    };
    json!({ "type": kind, "value": value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use neovm::ReferenceCounter;

    #[test]
    fn test_hex_input() {
        assert_eq!(read_script("0x1112").unwrap(), vec![0x11, 0x12]);
        assert_eq!(read_script(" 40 ").unwrap(), vec![0x40]);
        assert!(read_script("not hex").is_err());
    }

    #[test]
    fn test_item_json() {
        let mut rc = ReferenceCounter::new();
        let array = rc.new_array(vec![StackItem::from(3), StackItem::from("hi")]);
        let value = item_json(&array, rc.heap());
        assert_eq!(
            value,
            json!({
                "type": "Array",
                "value": [
                    { "type": "Integer", "value": "3" },
                    { "type": "ByteString", "value": "6869" },
                ]
            })
        );
        assert_eq!(item_text(&StackItem::Null, rc.heap()), "Any");
    }

    #[test]
    fn test_cycles_are_marked() {
        let mut rc = ReferenceCounter::new();
        let array = rc.new_array(Vec::new());
        let id = array.object_id().unwrap();
        rc.append(id, array.clone()).unwrap();
        let value = item_json(&array, rc.heap());
        assert_eq!(value["value"][0]["value"], json!("<cycle>"));
    }

    #[test]
    fn test_default_limits() {
        assert_eq!(read_limits(None).unwrap(), ExecutionEngineLimits::default());
    }
}
