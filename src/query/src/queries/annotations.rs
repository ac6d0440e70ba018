use arrow::datatypes::DataType;
use arrow::datatypes::Field;
use arrow::datatypes::Schema;
use chrono::Days;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::data_table::TableRow;
use crate::queries::decode_data;
use crate::queries::parse_date;

pub const URL: &str = "/api/2/annotations";

lazy_static! {
    /// Major releases: `12.3`.
    pub static ref MAJOR_VERSION: Regex = Regex::new(r"^[0-9]+\.[0-9]+$").unwrap();
}

#[derive(Deserialize, Debug)]
struct AnnotationRecord {
    id: i64,
    date: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Annotation together with the period it stays in effect.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub id: i64,
    pub start_dt: NaiveDate,
    pub finish_dt: NaiveDate,
    pub duration: i64,
    pub label: String,
    pub details: String,
}

impl TableRow for Annotation {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("start_dt", DataType::Utf8, false),
            Field::new("finish_dt", DataType::Utf8, false),
            Field::new("duration", DataType::Int64, false),
            Field::new("label", DataType::Utf8, false),
            Field::new("details", DataType::Utf8, false),
        ])
    }
}

/// Keeps annotations whose label matches `label_filter` and stretches each
/// one until the day before the next, the last one until yesterday.
pub fn normalize(response: &Value, label_filter: &Regex, today: NaiveDate) -> Vec<Annotation> {
    let Some(records) = decode_data::<Vec<Value>>("annotations", response) else {
        return vec![];
    };

    let mut started: Vec<(NaiveDate, AnnotationRecord)> = records
        .iter()
        .filter_map(|rec| match AnnotationRecord::deserialize(rec) {
            Ok(rec) => Some(rec),
            Err(err) => {
                warn!("malformed annotation, skipping: {err}");
                None
            }
        })
        .filter(|rec| label_filter.is_match(rec.label.as_deref().unwrap_or_default()))
        .filter_map(|rec| {
            // date may carry a time part
            let day = rec.date.get(..10).unwrap_or(&rec.date);
            match parse_date(day) {
                Ok(start) => Some((start, rec)),
                Err(err) => {
                    warn!("annotation {}: {err}, skipping", rec.id);
                    None
                }
            }
        })
        .collect();
    started.sort_by_key(|(start, _)| *start);

    let next_starts: Vec<NaiveDate> = started
        .iter()
        .skip(1)
        .map(|(start, _)| *start)
        .chain(std::iter::once(today))
        .collect();

    let out: Vec<_> = started
        .into_iter()
        .zip(next_starts)
        .map(|((start_dt, rec), next)| {
            let finish_dt = next - Days::new(1);
            Annotation {
                id: rec.id,
                start_dt,
                finish_dt,
                duration: (finish_dt - start_dt).num_days(),
                label: rec.label.unwrap_or_default(),
                details: rec.details.unwrap_or_default(),
            }
        })
        .collect();
    debug!("annotations rows: {}", out.len());

    out
}
