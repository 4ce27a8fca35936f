//! Subscription filter matching.
//!
//! A `filter` is a top-level-key conjunction: every key present in the
//! filter must be present in the event's `data` object with a structurally
//! equal JSON value. `serde_json::Value`'s `PartialEq` is already a deep,
//! order-independent structural comparison, so matching a key is a direct
//! value comparison rather than a string compare on serialized bytes.

use serde_json::Value as Json;

/// Returns true if `data` satisfies `filter`. A missing or empty filter
/// matches everything; a non-object `data` (or a filter that isn't itself
/// an object) never matches.
pub fn matches(filter: Option<&Json>, data: &Json) -> bool {
    let filter = match filter {
        None => return true,
        Some(Json::Null) => return true,
        Some(f) => f,
    };

    let filter_obj = match filter.as_object() {
        Some(obj) if obj.is_empty() => return true,
        Some(obj) => obj,
        None => return false,
    };

    let data_obj = match data.as_object() {
        Some(obj) => obj,
        None => return false,
    };

    filter_obj
        .iter()
        .all(|(key, expected)| data_obj.get(key).map_or(false, |actual| actual == expected))
}
