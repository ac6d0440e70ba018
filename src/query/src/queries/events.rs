use serde_json::Map;
use serde_json::Value;
use tracing::warn;

use crate::queries::decode_data;

pub const LIST_URL: &str = "/api/2/events/list";

pub fn chart_url(chart_id: &str) -> String {
    format!("/api/3/chart/{chart_id}/query")
}

/// Event types known to the project, one record per event.
pub fn normalize_list(response: &Value) -> Vec<Map<String, Value>> {
    decode_data::<Vec<Value>>("events/list", response)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|event| match event {
            Value::Object(event) => Some(event),
            other => {
                warn!("events/list: record is not an object, skipping: {other}");
                None
            }
        })
        .collect()
}
