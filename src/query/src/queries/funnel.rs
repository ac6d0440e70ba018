use std::fmt;

use arrow::datatypes::DataType;
use arrow::datatypes::Field;
use arrow::datatypes::Schema;
use common::types::MILLIS_IN_MINUTE;
use common::types::SECONDS_IN_DAY;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::data_table::TableRow;
use crate::error::Result;
use crate::event::EventQuery;
use crate::queries::decode_data;
use crate::queries::label_to_string;
use crate::queries::segment_params;
use crate::queries::QueryTime;
use crate::segment::PropertyGroupBy;
use crate::segment::Segment;

pub const DEFAULT_CONVERSION_WINDOW_SECONDS: u64 = 2592000;
pub const DEFAULT_LIMIT: usize = 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FunnelMode {
    #[default]
    Ordered,
    Unordered,
    Sequential,
}

impl fmt::Display for FunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunnelMode::Ordered => write!(f, "ordered"),
            FunnelMode::Unordered => write!(f, "unordered"),
            FunnelMode::Sequential => write!(f, "sequential"),
        }
    }
}

/// Which users enter the funnel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FunnelUsers {
    #[default]
    New,
    Active,
}

impl fmt::Display for FunnelUsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunnelUsers::New => write!(f, "new"),
            FunnelUsers::Active => write!(f, "active"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FunnelRequest {
    pub steps: Vec<EventQuery>,
    pub time: QueryTime,
    pub mode: FunnelMode,
    pub users: FunnelUsers,
    pub segment: Option<Segment>,
    pub group_by: Option<PropertyGroupBy>,
    pub conversion_window_seconds: u64,
    pub limit: usize,
}

impl FunnelRequest {
    pub fn new(steps: Vec<EventQuery>, time: QueryTime) -> Self {
        FunnelRequest {
            steps,
            time,
            mode: FunnelMode::default(),
            users: FunnelUsers::default(),
            segment: None,
            group_by: None,
            conversion_window_seconds: DEFAULT_CONVERSION_WINDOW_SECONDS,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn horizon_days(&self) -> u64 {
        self.conversion_window_seconds.div_ceil(SECONDS_IN_DAY)
    }

    pub fn url(&self) -> Result<String> {
        let steps = self
            .steps
            .iter()
            .map(|step| Ok(format!("e={}", step.event_url()?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(format!(
            "/api/2/funnels?{}&start={}&end={}{}&mode={}&n={}&cs={}&limit={}",
            steps.join("&"),
            self.time.start(),
            self.time.end(),
            segment_params(self.segment.as_ref(), self.group_by.as_ref())?,
            self.mode,
            self.users,
            self.conversion_window_seconds,
            self.limit,
        ))
    }
}

/// Stats arrays are kept as raw values so that one missing number drops a
/// single step instead of the whole response.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FunnelGroup {
    #[serde(default)]
    group_value: Value,
    #[serde(default)]
    events: Vec<Value>,
    #[serde(default)]
    cumulative_raw: Vec<Value>,
    #[serde(default)]
    cumulative: Vec<Value>,
    #[serde(default)]
    step_by_step: Vec<Value>,
    #[serde(default)]
    avg_trans_times: Vec<Value>,
    #[serde(default)]
    median_trans_times: Vec<Value>,
}

fn stat(values: &[Value], idx: usize) -> Option<f64> {
    values.get(idx).and_then(Value::as_f64)
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FunnelRow {
    pub segment: String,
    pub step: String,
    pub unique_users: i64,
    pub pct_passed: f64,
    pub pct_from_prev: f64,
    pub avg_trans_time_min: f64,
    pub median_trans_time_min: f64,
    pub horizon_days: i64,
}

impl TableRow for FunnelRow {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("segment", DataType::Utf8, false),
            Field::new("step", DataType::Utf8, false),
            Field::new("unique_users", DataType::Int64, false),
            Field::new("pct_passed", DataType::Float64, false),
            Field::new("pct_from_prev", DataType::Float64, false),
            Field::new("avg_trans_time_min", DataType::Float64, false),
            Field::new("median_trans_time_min", DataType::Float64, false),
            Field::new("horizon_days", DataType::Int64, false),
        ])
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.).round() / 100.
}

pub fn normalize(response: &Value, horizon_days: u64) -> Vec<FunnelRow> {
    let Some(groups) = decode_data::<Vec<Value>>("funnels", response) else {
        return vec![];
    };

    let mut rows = vec![];
    for group in groups {
        let group = match FunnelGroup::deserialize(&group) {
            Ok(group) => group,
            Err(err) => {
                warn!("malformed funnel group, skipping: {err}");
                continue;
            }
        };
        let segment = label_to_string(&group.group_value);
        for (idx, step) in group.events.iter().enumerate() {
            let step = label_to_string(step);
            let (
                Some(unique_users),
                Some(cumulative),
                Some(step_by_step),
                Some(avg_trans_time),
                Some(median_trans_time),
            ) = (
                stat(&group.cumulative_raw, idx),
                stat(&group.cumulative, idx),
                stat(&group.step_by_step, idx),
                stat(&group.avg_trans_times, idx),
                stat(&group.median_trans_times, idx),
            )
            else {
                warn!("funnel step {step:?} of {segment:?} has no stats, skipping");
                continue;
            };

            rows.push(FunnelRow {
                segment: segment.clone(),
                step,
                unique_users: unique_users as i64,
                pct_passed: round2(cumulative * 100.),
                pct_from_prev: step_by_step,
                avg_trans_time_min: avg_trans_time / MILLIS_IN_MINUTE,
                median_trans_time_min: median_trans_time / MILLIS_IN_MINUTE,
                horizon_days: horizon_days as i64,
            });
        }
    }
    debug!("funnel rows: {}", rows.len());

    rows
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::event::EventQuery;
    use crate::property::PropertyRef;
    use crate::queries::funnel::normalize;
    use crate::queries::funnel::FunnelMode;
    use crate::queries::funnel::FunnelRequest;
    use crate::queries::funnel::FunnelRow;
    use crate::queries::funnel::FunnelUsers;
    use crate::queries::QueryTime;
    use crate::segment::PropertyGroupBy;

    fn request() -> FunnelRequest {
        FunnelRequest::new(
            vec![
                EventQuery::new("Open App"),
                EventQuery::new("purchase").and_is(PropertyRef::event("sku"), ["a"]),
            ],
            QueryTime::between("2023-01-01", "2023-01-31").unwrap(),
        )
    }

    #[test]
    fn test_url() {
        let mut req = request();
        assert_eq!(
            req.url().unwrap(),
            concat!(
                r#"/api/2/funnels?e={"event_type":"Open%20App"}"#,
                r#"&e={"event_type":"purchase","filters":[{"subprop_type":"event","subprop_key":"sku","subprop_op":"is","subprop_value":["a"]}]}"#,
                r#"&start=20230101&end=20230131&mode=ordered&n=new&cs=2592000&limit=1000"#
            )
        );

        req.mode = FunnelMode::Unordered;
        req.users = FunnelUsers::Active;
        req.group_by = Some(PropertyGroupBy::try_new(["country"]).unwrap());
        req.conversion_window_seconds = 86400;
        req.limit = 5;
        let url = req.url().unwrap();
        assert!(url.ends_with(
            "&start=20230101&end=20230131&g=country&mode=unordered&n=active&cs=86400&limit=5"
        ));
    }

    #[test]
    fn test_horizon_days() {
        let mut req = request();
        assert_eq!(req.horizon_days(), 30);
        req.conversion_window_seconds = 86401;
        assert_eq!(req.horizon_days(), 2);
        req.conversion_window_seconds = 3600;
        assert_eq!(req.horizon_days(), 1);
    }

    #[test]
    fn test_normalize() {
        let resp = json!({
            "data": [
                {
                    "groupValue": "US",
                    "events": ["Open App", "purchase"],
                    "cumulativeRaw": [100, 25],
                    "cumulative": [1.0, 0.25333],
                    "stepByStep": [1.0, 0.25],
                    "avgTransTimes": [0, 120000],
                    "medianTransTimes": [0, 60000]
                }
            ]
        });

        let rows = normalize(&resp, 30);
        assert_eq!(rows, vec![
            FunnelRow {
                segment: "US".to_string(),
                step: "Open App".to_string(),
                unique_users: 100,
                pct_passed: 100.,
                pct_from_prev: 1.,
                avg_trans_time_min: 0.,
                median_trans_time_min: 0.,
                horizon_days: 30,
            },
            FunnelRow {
                segment: "US".to_string(),
                step: "purchase".to_string(),
                unique_users: 25,
                pct_passed: 25.33,
                pct_from_prev: 0.25,
                avg_trans_time_min: 2.,
                median_trans_time_min: 1.,
                horizon_days: 30,
            },
        ]);
    }

    #[test]
    fn test_normalize_short_arrays() {
        let resp = json!({
            "data": [
                {
                    "groupValue": ["US", "ios"],
                    "events": ["a", "b"],
                    "cumulativeRaw": [10],
                    "cumulative": [1.0],
                    "stepByStep": [1.0],
                    "avgTransTimes": [0],
                    "medianTransTimes": [0]
                }
            ]
        });

        let rows = normalize(&resp, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].segment, "US, ios");
        assert!(rows.iter().all(|row| row.horizon_days == 1));
    }

    #[test]
    fn test_normalize_null_stat() {
        let resp = json!({
            "data": [
                {
                    "groupValue": "CA",
                    "events": ["Open App", "purchase"],
                    "cumulativeRaw": [40, 10],
                    "cumulative": [1.0, 0.25],
                    "stepByStep": [1.0, 0.25],
                    "avgTransTimes": [null, 60000],
                    "medianTransTimes": [0, 60000]
                },
                null,
                {
                    "groupValue": "US",
                    "events": ["Open App", "purchase"],
                    "cumulativeRaw": [100, 25],
                    "cumulative": [1.0, 0.25],
                    "stepByStep": [1.0, 0.25],
                    "avgTransTimes": [0, 120000],
                    "medianTransTimes": [0, 60000]
                }
            ]
        });

        let rows = normalize(&resp, 30);
        let steps = rows
            .iter()
            .map(|row| (row.segment.as_str(), row.step.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(steps, vec![
            ("CA", "purchase"),
            ("US", "Open App"),
            ("US", "purchase"),
        ]);
        assert_eq!(rows[2].unique_users, 25);
        assert_eq!(rows[2].avg_trans_time_min, 2.);
    }

    #[test]
    fn test_normalize_missing_data() {
        assert!(normalize(&json!({"error": "bad"}), 30).is_empty());
    }
}
