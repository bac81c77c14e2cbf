//! Wire format of the HTTP endpoints
//!
//! The snapshot body is `{"servo": [{"number", "remainingPills", "pillName"}, ...]}`.
//! Command acknowledgements are `{"message": "..."}`.

use dispensekit_core::{RawSlot, SlotId, TransportError};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct SnapshotEntry {
    #[serde(default)]
    number: Value,
    #[serde(rename = "remainingPills", default)]
    remaining_pills: Value,
    #[serde(rename = "pillName", default)]
    pill_name: Value,
}

#[derive(Debug, Deserialize)]
struct AckBody {
    message: String,
}

/// Decode a snapshot body into un-normalized slot entries
///
/// The body is decoded lossily; invalid UTF-8 becomes U+FFFD and is left for
/// label normalization to catch.
pub fn parse_snapshot(body: &[u8]) -> Result<Vec<RawSlot>, TransportError> {
    let text = String::from_utf8_lossy(body);
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| TransportError::malformed(format!("body is not JSON: {}", e)))?;

    let list = match value.get("servo") {
        Some(Value::Array(list)) => list.clone(),
        Some(_) => return Err(TransportError::malformed("`servo` is not a list")),
        None => return Err(TransportError::malformed("missing `servo` list")),
    };

    list.into_iter()
        .enumerate()
        .map(|(position, item)| {
            let entry: SnapshotEntry = serde_json::from_value(item).map_err(|e| {
                TransportError::malformed(format!("entry {} is not an object: {}", position, e))
            })?;
            let id = slot_number(&entry.number).ok_or_else(|| {
                TransportError::malformed(format!(
                    "entry {} has invalid slot number {}",
                    position, entry.number
                ))
            })?;
            let label = entry.pill_name.as_str().map(str::to_string);
            Ok(RawSlot::new(id, label, entry.remaining_pills))
        })
        .collect()
}

/// Extract the acknowledgement text from a command response body
///
/// Falls back to the trimmed body, then to `fallback`, when the body does
/// not carry a `message` field.
pub fn parse_ack(body: &[u8], fallback: &str) -> String {
    let text = String::from_utf8_lossy(body);
    if let Ok(ack) = serde_json::from_str::<AckBody>(&text) {
        return ack.message;
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn slot_number(value: &Value) -> Option<SlotId> {
    let number = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u32::try_from(number).ok().and_then(SlotId::new)
}
