use arrow::datatypes::DataType;
use arrow::datatypes::Field;
use arrow::datatypes::Schema;
use serde::ser::Error as _;
use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::data_table::TableRow;
use crate::encoding::encode_value;
use crate::queries::decode;

pub const DEFAULT_LIMIT: usize = 1000;

// kept in their own columns, the rest of the event goes to the header
const OWN_COLUMNS: [&str; 5] = [
    "user_id",
    "event_type",
    "server_received_time",
    "user_properties",
    "event_properties",
];

#[derive(Clone, Debug)]
pub struct UserActivityRequest {
    pub amplitude_id: String,
    pub offset: usize,
    pub limit: usize,
}

impl UserActivityRequest {
    pub fn new(amplitude_id: impl Into<String>) -> Self {
        UserActivityRequest {
            amplitude_id: amplitude_id.into(),
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn url(&self) -> String {
        format!(
            "/api/2/useractivity?user={}&offset={}&limit={}",
            encode_value(&self.amplitude_id),
            self.offset,
            self.limit
        )
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ActivityResponse {
    user_data: Map<String, Value>,
    #[serde(default)]
    events: Vec<Value>,
}

// nested values go to the table as JSON text
fn json_text<T, S>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    let text = serde_json::to_string(value).map_err(S::Error::custom)?;
    serializer.serialize_str(&text)
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct UserEventRow {
    pub amplitude_id: Option<String>,
    pub user_id: Option<String>,
    pub event_type: String,
    pub timestamp: String,
    pub paying: bool,
    /// Remaining event fields.
    #[serde(serialize_with = "json_text")]
    pub header: Map<String, Value>,
    #[serde(serialize_with = "json_text")]
    pub user_properties: Value,
    #[serde(serialize_with = "json_text")]
    pub event_properties: Value,
}

impl TableRow for UserEventRow {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("amplitude_id", DataType::Utf8, true),
            Field::new("user_id", DataType::Utf8, true),
            Field::new("event_type", DataType::Utf8, false),
            Field::new("timestamp", DataType::Utf8, false),
            Field::new("paying", DataType::Boolean, false),
            Field::new("header", DataType::Utf8, false),
            Field::new("user_properties", DataType::Utf8, false),
            Field::new("event_properties", DataType::Utf8, false),
        ])
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct UserActivity {
    /// `userData` as returned by the API.
    pub user: Map<String, Value>,
    pub events: Vec<UserEventRow>,
}

/// Paying flag arrives either as a bool or as its string form.
pub fn is_paying(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(v)) => *v,
        Some(Value::String(v)) => v == "true" || v == "True",
        _ => false,
    }
}

fn as_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(v)) => Some(v.to_owned()),
        Some(Value::Null) | None => None,
        Some(v) => Some(v.to_string()),
    }
}

pub fn normalize(response: &Value) -> UserActivity {
    let Some(resp) = decode::<ActivityResponse>("useractivity", response) else {
        return UserActivity::default();
    };

    let amplitude_id = as_string(resp.user_data.get("canonical_amplitude_id"));
    let paying = is_paying(resp.user_data.get("paying"));

    let events: Vec<_> = resp
        .events
        .into_iter()
        .filter_map(|event| match event {
            Value::Object(event) => Some(event),
            other => {
                warn!("useractivity: event is not an object, skipping: {other}");
                None
            }
        })
        .map(|mut event| {
            let user_id = as_string(event.get("user_id"));
            let event_type = as_string(event.get("event_type")).unwrap_or_default();
            let timestamp = as_string(event.get("server_received_time")).unwrap_or_default();
            let user_properties = event.remove("user_properties").unwrap_or(Value::Null);
            let event_properties = event.remove("event_properties").unwrap_or(Value::Null);
            for key in OWN_COLUMNS {
                event.remove(key);
            }

            UserEventRow {
                amplitude_id: amplitude_id.clone(),
                user_id,
                event_type,
                timestamp,
                paying,
                header: event,
                user_properties,
                event_properties,
            }
        })
        .collect();
    debug!("useractivity rows: {}", events.len());

    UserActivity {
        user: resp.user_data,
        events,
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::Array;
    use arrow::array::StringArray;
    use serde_json::json;

    use crate::data_table::record_batch;
    use crate::queries::user_activity::is_paying;
    use crate::queries::user_activity::normalize;
    use crate::queries::user_activity::UserActivityRequest;

    #[test]
    fn test_url() {
        let mut req = UserActivityRequest::new("12345");
        assert_eq!(req.url(), "/api/2/useractivity?user=12345&offset=0&limit=1000");

        req.offset = 100;
        req.limit = 10;
        assert_eq!(req.url(), "/api/2/useractivity?user=12345&offset=100&limit=10");

        let req = UserActivityRequest::new("a&b#1");
        assert_eq!(req.url(), "/api/2/useractivity?user=a%26b%231&offset=0&limit=1000");
    }

    #[test]
    fn test_is_paying() {
        assert!(is_paying(Some(&json!(true))));
        assert!(is_paying(Some(&json!("true"))));
        assert!(is_paying(Some(&json!("True"))));
        assert!(!is_paying(Some(&json!("TRUE"))));
        assert!(!is_paying(Some(&json!(false))));
        assert!(!is_paying(Some(&json!(null))));
        assert!(!is_paying(None));
    }

    #[test]
    fn test_normalize() {
        let resp = json!({
            "userData": {"canonical_amplitude_id": 42, "paying": "True", "country": "US"},
            "events": [{
                "user_id": "u1",
                "event_type": "login",
                "server_received_time": "2023-01-01 10:00:00.000000",
                "session_id": 7,
                "platform": "iOS",
                "user_properties": {"plan": "pro"},
                "event_properties": {"source": "push"}
            }]
        });

        let activity = normalize(&resp);
        assert_eq!(activity.user["country"], json!("US"));
        assert_eq!(activity.events.len(), 1);

        let event = &activity.events[0];
        assert_eq!(event.amplitude_id.as_deref(), Some("42"));
        assert_eq!(event.user_id.as_deref(), Some("u1"));
        assert_eq!(event.event_type, "login");
        assert_eq!(event.timestamp, "2023-01-01 10:00:00.000000");
        assert!(event.paying);
        assert_eq!(event.user_properties, json!({"plan": "pro"}));
        assert_eq!(event.event_properties, json!({"source": "push"}));

        let mut header_keys: Vec<_> = event.header.keys().cloned().collect();
        header_keys.sort();
        assert_eq!(header_keys, vec!["platform", "session_id"]);
    }

    #[test]
    fn test_record_batch_keeps_nested_fields() {
        let resp = json!({
            "userData": {"canonical_amplitude_id": 42},
            "events": [
                {
                    "user_id": "u1",
                    "event_type": "login",
                    "server_received_time": "2023-01-01 10:00:00.000000",
                    "session_id": 7,
                    "user_properties": {"plan": "pro"},
                    "event_properties": {"source": "push"}
                },
                null,
                {"event_type": "logout", "server_received_time": "2023-01-01 11:00:00.000000"}
            ]
        });

        let activity = normalize(&resp);
        assert_eq!(activity.events.len(), 2);

        let batch = record_batch(&activity.events).unwrap();
        assert_eq!(batch.num_columns(), 8);
        assert_eq!(batch.num_rows(), 2);

        let column = |name: &str| {
            batch
                .column_by_name(name)
                .unwrap()
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap()
                .clone()
        };
        assert_eq!(column("header").value(0), r#"{"session_id":7}"#);
        assert_eq!(column("user_properties").value(0), r#"{"plan":"pro"}"#);
        assert_eq!(column("event_properties").value(0), r#"{"source":"push"}"#);
        assert_eq!(column("header").value(1), "{}");
        assert_eq!(column("event_properties").value(1), "null");
        assert!(column("user_id").is_null(1));
    }

    #[test]
    fn test_normalize_without_user_data() {
        let activity = normalize(&json!({"events": []}));
        assert!(activity.user.is_empty());
        assert!(activity.events.is_empty());
    }
}
