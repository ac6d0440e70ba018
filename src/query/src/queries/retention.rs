use std::collections::BTreeMap;
use std::fmt;

use arrow::datatypes::DataType;
use arrow::datatypes::Field;
use arrow::datatypes::Schema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::data_table::TableRow;
use crate::encoding::encode_value;
use crate::error::Result;
use crate::event::EventQuery;
use crate::queries::decode_data;
use crate::queries::label_to_string;
use crate::queries::segment_params;
use crate::queries::Frequency;
use crate::queries::QueryTime;
use crate::segment::PropertyGroupBy;
use crate::segment::Segment;

pub const NEW_USER_EVENT: &str = "_new";
pub const ANY_EVENT: &str = "_all";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetentionMode {
    Bracket,
    Rolling,
    NDay,
}

impl fmt::Display for RetentionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionMode::Bracket => write!(f, "bracket"),
            RetentionMode::Rolling => write!(f, "rolling"),
            RetentionMode::NDay => write!(f, "n-day"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetentionRequest {
    pub start_event: EventQuery,
    pub return_event: EventQuery,
    pub mode: Option<RetentionMode>,
    // e.g. `[[0,4]]`, used with the bracket mode
    pub bracket: Option<String>,
    pub time: QueryTime,
    pub frequency: Frequency,
    pub segment: Option<Segment>,
    pub group_by: Option<PropertyGroupBy>,
}

impl RetentionRequest {
    /// New users retained by any activity.
    pub fn new(time: QueryTime) -> Self {
        RetentionRequest {
            start_event: EventQuery::new(NEW_USER_EVENT),
            return_event: EventQuery::new(ANY_EVENT),
            mode: None,
            bracket: None,
            time,
            frequency: Frequency::default(),
            segment: None,
            group_by: None,
        }
    }

    pub fn url(&self) -> Result<String> {
        let mode = self
            .mode
            .map(|mode| format!("&rm={mode}"))
            .unwrap_or_default();
        let bracket = self
            .bracket
            .as_ref()
            .map(|bracket| format!("&rb={}", encode_value(bracket)))
            .unwrap_or_default();

        Ok(format!(
            "/api/2/retention?se={}&re={}{}{}&start={}&end={}&i={}{}",
            self.start_event.event_url()?,
            self.return_event.event_url()?,
            mode,
            bracket,
            self.time.start(),
            self.time.end(),
            self.frequency,
            segment_params(self.segment.as_ref(), self.group_by.as_ref())?,
        ))
    }
}

#[derive(Debug)]
struct RetentionValue {
    count: i64,
    outof: i64,
    incomplete: bool,
}

impl RetentionValue {
    fn from_value(value: &Value) -> Option<Self> {
        Some(RetentionValue {
            count: value.get("count")?.as_f64()? as i64,
            outof: value.get("outof")?.as_f64()? as i64,
            incomplete: value
                .get("incomplete")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

#[derive(Deserialize, Debug, Default)]
struct RetentionSeries {
    #[serde(default)]
    values: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    combined: Vec<Value>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct RetentionData {
    #[serde(default)]
    series_labels: Vec<Value>,
    #[serde(default)]
    series: Vec<Value>,
}

/// Yields `(age, value)` from age 1 on, skipping entries without counts.
fn ages<'a>(
    segment: &'a str,
    values: &'a [Value],
) -> impl Iterator<Item = (i64, RetentionValue)> + 'a {
    values
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(move |(age, value)| match RetentionValue::from_value(value) {
            Some(value) => Some((age as i64, value)),
            None => {
                warn!("retention value of {segment:?} at age {age} is malformed, skipping");
                None
            }
        })
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RetentionRow {
    pub segment: String,
    pub date: String,
    pub age: i64,
    pub retained: i64,
    pub cohort_size: i64,
    pub completed: bool,
}

impl TableRow for RetentionRow {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("segment", DataType::Utf8, false),
            Field::new("date", DataType::Utf8, false),
            Field::new("age", DataType::Int64, false),
            Field::new("retained", DataType::Int64, false),
            Field::new("cohort_size", DataType::Int64, false),
            Field::new("completed", DataType::Boolean, false),
        ])
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct CombinedRetentionRow {
    pub segment: String,
    pub age: i64,
    pub retained: i64,
    pub cohort_size: i64,
    pub completed: bool,
}

impl TableRow for CombinedRetentionRow {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("segment", DataType::Utf8, false),
            Field::new("age", DataType::Int64, false),
            Field::new("retained", DataType::Int64, false),
            Field::new("cohort_size", DataType::Int64, false),
            Field::new("completed", DataType::Boolean, false),
        ])
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Retention {
    pub by_day: Vec<RetentionRow>,
    pub combined: Vec<CombinedRetentionRow>,
}

/// Position in a day's list is the age. Age 0 repeats age 1 and is dropped.
pub fn normalize(response: &Value) -> Retention {
    let Some(data) = decode_data::<RetentionData>("retention", response) else {
        return Retention::default();
    };

    let mut out = Retention::default();
    for (label, series) in data.series_labels.iter().zip(data.series.iter()) {
        let segment = label_to_string(label);
        let series = match RetentionSeries::deserialize(series) {
            Ok(series) => series,
            Err(err) => {
                warn!("malformed retention series of {segment:?}, skipping: {err}");
                continue;
            }
        };
        for (date, values) in series.values.iter() {
            for (age, value) in ages(&segment, values) {
                out.by_day.push(RetentionRow {
                    segment: segment.clone(),
                    date: date.to_owned(),
                    age,
                    retained: value.count,
                    cohort_size: value.outof,
                    completed: !value.incomplete,
                });
            }
        }

        for (age, value) in ages(&segment, &series.combined) {
            out.combined.push(CombinedRetentionRow {
                segment: segment.clone(),
                age,
                retained: value.count,
                cohort_size: value.outof,
                completed: !value.incomplete,
            });
        }
    }
    debug!(
        "retention rows: {} by day, {} combined",
        out.by_day.len(),
        out.combined.len()
    );

    out
}
