use std::fmt;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Deserializer;
use serde_json::Value;
use tracing::warn;

use crate::error::QueryError;
use crate::error::Result;
use crate::segment::PropertyGroupBy;
use crate::segment::Segment;

pub mod annotations;
pub mod event_segmentation;
pub mod events;
pub mod funnel;
pub mod ltv;
pub mod retention;
pub mod sessions;
pub mod user_activity;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
const URL_DATE_FORMAT: &str = "%Y%m%d";

pub fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|err| QueryError::InvalidDate(date.to_string(), err))
}

/// Inclusive date range, given as `YYYY-MM-DD` and sent as `YYYYMMDD`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryTime {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl QueryTime {
    pub fn between(from: &str, to: &str) -> Result<Self> {
        Ok(QueryTime {
            from: parse_date(from)?,
            to: parse_date(to)?,
        })
    }

    pub fn start(&self) -> String {
        self.from.format(URL_DATE_FORMAT).to_string()
    }

    pub fn end(&self) -> String {
        self.to.format(URL_DATE_FORMAT).to_string()
    }
}

/// Bucket size of time series, rendered as the numeric `i` parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Frequency {
    Realtime,
    Hourly,
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn value(&self) -> i64 {
        match self {
            Frequency::Realtime => -300000,
            Frequency::Hourly => -3600000,
            Frequency::Daily => 1,
            Frequency::Weekly => 7,
            Frequency::Monthly => 30,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// `{segment}{groupby}` part shared by most endpoints.
pub(crate) fn segment_params(
    segment: Option<&Segment>,
    group_by: Option<&PropertyGroupBy>,
) -> Result<String> {
    let mut out = String::new();
    if let Some(segment) = segment {
        out.push_str(&segment.conditions_url()?);
    }
    if let Some(group_by) = group_by {
        out.push_str(&group_by.conditions_url());
    }

    Ok(out)
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Decodes a response of the expected shape. Anything else is reported and
/// turned into `None` so that callers return an empty table.
pub(crate) fn decode<T: DeserializeOwned>(endpoint: &str, response: &Value) -> Option<T> {
    match T::deserialize(response) {
        Ok(v) => Some(v),
        Err(err) => {
            let err = QueryError::ShapeMismatch(format!("{endpoint}: {err}"));
            warn!("{err}");
            None
        }
    }
}

/// Same as [decode] for payloads wrapped in `{"data": ...}`.
pub(crate) fn decode_data<T: DeserializeOwned>(endpoint: &str, response: &Value) -> Option<T> {
    decode::<Envelope<T>>(endpoint, response).map(|envelope| envelope.data)
}

/// Reads any value as an optional number, so a `null` or a string in one
/// field leaves the rest of the payload usable.
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_f64())
}

/// Series labels come either as a scalar or as the list of group-by values.
pub fn label_to_string(label: &Value) -> String {
    match label {
        Value::String(v) => v.to_owned(),
        Value::Array(values) => values
            .iter()
            .map(label_to_string)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        v => v.to_string(),
    }
}

/// Point of a series: a bare number or a `{"value": n}` object.
pub fn series_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(obj) => obj.get("value").and_then(series_value),
        _ => None,
    }
}

/// `seriesLabels` + parallel `series` + shared `xValues`.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SeriesData {
    #[serde(default)]
    pub series_labels: Vec<Value>,
    #[serde(default)]
    pub series: Vec<Vec<Value>>,
    #[serde(default)]
    pub x_values: Vec<String>,
}

impl SeriesData {
    /// (segment, x, value) triples, series by series.
    pub fn points(&self) -> Vec<(String, String, Option<f64>)> {
        self.series_labels
            .iter()
            .zip(self.series.iter())
            .flat_map(|(label, series)| {
                let segment = label_to_string(label);
                self.x_values
                    .iter()
                    .zip(series.iter())
                    .map(move |(x, v)| (segment.clone(), x.to_owned(), series_value(v)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tracing_test::traced_test;

    use crate::error::QueryError;
    use crate::queries::decode_data;
    use crate::queries::label_to_string;
    use crate::queries::segment_params;
    use crate::queries::series_value;
    use crate::queries::Frequency;
    use crate::queries::QueryTime;
    use crate::queries::SeriesData;
    use crate::segment::PropertyGroupBy;
    use crate::segment::Segment;

    #[test]
    fn test_query_time() {
        let t = QueryTime::between("2023-01-01", "2023-02-15").unwrap();
        assert_eq!(t.start(), "20230101");
        assert_eq!(t.end(), "20230215");

        assert!(matches!(
            QueryTime::between("2023-13-01", "2023-02-15").unwrap_err(),
            QueryError::InvalidDate(_, _)
        ));
        assert!(QueryTime::between("20230101", "2023-02-15").is_err());
    }

    #[test]
    fn test_frequency() {
        assert_eq!(Frequency::default().to_string(), "1");
        assert_eq!(Frequency::Realtime.to_string(), "-300000");
        assert_eq!(Frequency::Hourly.to_string(), "-3600000");
        assert_eq!(Frequency::Weekly.to_string(), "7");
        assert_eq!(Frequency::Monthly.to_string(), "30");
    }

    #[test]
    fn test_segment_params() {
        assert_eq!(segment_params(None, None).unwrap(), "");

        let s = Segment::new().and_is("country", ["US"]);
        let g = PropertyGroupBy::try_new(["plan"]).unwrap();
        assert_eq!(
            segment_params(Some(&s), Some(&g)).unwrap(),
            r#"&s=[{"prop":"country","op":"is","values":["US"]}]&g=gp:plan"#
        );
    }

    #[test]
    fn test_label_to_string() {
        assert_eq!(label_to_string(&json!("US")), "US");
        assert_eq!(label_to_string(&json!(["US", "ios"])), "US, ios");
        assert_eq!(label_to_string(&json!([0, "ios"])), "0, ios");
        assert_eq!(label_to_string(&json!(12)), "12");
    }

    #[test]
    fn test_series_value() {
        assert_eq!(series_value(&json!(3)), Some(3.));
        assert_eq!(series_value(&json!(2.5)), Some(2.5));
        assert_eq!(series_value(&json!({"setId": "", "value": 4})), Some(4.));
        assert_eq!(series_value(&json!(null)), None);
        assert_eq!(series_value(&json!("x")), None);
    }

    #[test]
    #[traced_test]
    fn test_decode_shape_mismatch() {
        assert!(decode_data::<SeriesData>("test", &json!({"error": "x"})).is_none());
        assert!(logs_contain("response shape mismatch: test"));
        assert!(decode_data::<SeriesData>("test", &json!({"data": {"series": "x"}})).is_none());

        let data = decode_data::<SeriesData>("test", &json!({"data": {}})).unwrap();
        assert!(data.points().is_empty());
    }
}
