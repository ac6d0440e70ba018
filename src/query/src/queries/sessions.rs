use std::fmt;

use arrow::datatypes::DataType;
use arrow::datatypes::Field;
use arrow::datatypes::Schema;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::data_table::TableRow;
use crate::error::Result;
use crate::queries::decode_data;
use crate::queries::segment_params;
use crate::queries::QueryTime;
use crate::queries::SeriesData;
use crate::segment::PropertyGroupBy;
use crate::segment::Segment;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionsEndpoint {
    Length,
    Average,
    PerUser,
}

impl fmt::Display for SessionsEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionsEndpoint::Length => write!(f, "length"),
            SessionsEndpoint::Average => write!(f, "average"),
            SessionsEndpoint::PerUser => write!(f, "peruser"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionsRequest {
    pub time: QueryTime,
    pub segment: Option<Segment>,
    pub group_by: Option<PropertyGroupBy>,
}

impl SessionsRequest {
    pub fn new(time: QueryTime) -> Self {
        SessionsRequest {
            time,
            segment: None,
            group_by: None,
        }
    }

    pub fn url(&self, endpoint: SessionsEndpoint) -> Result<String> {
        Ok(format!(
            "/api/2/sessions/{endpoint}?start={}&end={}{}",
            self.time.start(),
            self.time.end(),
            segment_params(self.segment.as_ref(), self.group_by.as_ref())?,
        ))
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SessionLengthRow {
    pub segment: String,
    /// Duration bucket label as returned by the API.
    pub duration: String,
    pub sessions: f64,
    pub pct_of_total: f64,
}

impl TableRow for SessionLengthRow {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("segment", DataType::Utf8, false),
            Field::new("duration", DataType::Utf8, false),
            Field::new("sessions", DataType::Float64, false),
            Field::new("pct_of_total", DataType::Float64, false),
        ])
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SessionsRow {
    pub segment: String,
    pub date: String,
    pub value: Option<f64>,
}

impl TableRow for SessionsRow {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("segment", DataType::Utf8, false),
            Field::new("date", DataType::Utf8, false),
            Field::new("value", DataType::Float64, true),
        ])
    }
}

/// One row per (segment, duration), keeping the max when a bucket repeats.
pub fn normalize_length(response: &Value) -> Vec<SessionLengthRow> {
    let Some(data) = decode_data::<SeriesData>("sessions/length", response) else {
        return vec![];
    };

    let mut buckets: IndexMap<(String, String), f64> = IndexMap::new();
    for (segment, duration, value) in data.points() {
        let value = value.unwrap_or_default();
        buckets
            .entry((segment, duration))
            .and_modify(|v| *v = v.max(value))
            .or_insert(value);
    }
    buckets.sort_keys();

    let mut totals: IndexMap<&str, f64> = IndexMap::new();
    for ((segment, _), sessions) in buckets.iter() {
        *totals.entry(segment.as_str()).or_default() += sessions;
    }

    let rows: Vec<_> = buckets
        .iter()
        .map(|((segment, duration), sessions)| {
            let total = totals.get(segment.as_str()).copied().unwrap_or_default();
            SessionLengthRow {
                segment: segment.to_owned(),
                duration: duration.to_owned(),
                sessions: *sessions,
                pct_of_total: if total == 0. { 0. } else { sessions / total },
            }
        })
        .collect();
    debug!("sessions/length rows: {}", rows.len());

    rows
}

/// Average session length in seconds and sessions per user share the same shape.
pub fn normalize(response: &Value) -> Vec<SessionsRow> {
    let Some(data) = decode_data::<SeriesData>("sessions", response) else {
        return vec![];
    };

    data.points()
        .into_iter()
        .map(|(segment, date, value)| SessionsRow {
            segment,
            date,
            value,
        })
        .collect()
}
