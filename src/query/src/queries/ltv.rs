use std::collections::BTreeMap;
use std::collections::HashMap;

use arrow::datatypes::DataType;
use arrow::datatypes::Field;
use arrow::datatypes::Schema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::data_table::TableRow;
use crate::error::Result;
use crate::queries::decode_data;
use crate::queries::label_to_string;
use crate::queries::lenient_number;
use crate::queries::segment_params;
use crate::queries::Frequency;
use crate::queries::QueryTime;
use crate::segment::PropertyGroupBy;
use crate::segment::Segment;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LtvMetric {
    Arpu,
    // everything else can be derived from it
    #[default]
    Arppu,
    TotalRevenue,
    PayingUsers,
}

impl LtvMetric {
    pub fn value(&self) -> u8 {
        match self {
            LtvMetric::Arpu => 0,
            LtvMetric::Arppu => 1,
            LtvMetric::TotalRevenue => 2,
            LtvMetric::PayingUsers => 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LtvRequest {
    pub time: QueryTime,
    pub frequency: Frequency,
    pub metric: LtvMetric,
    pub segment: Option<Segment>,
    pub group_by: Option<PropertyGroupBy>,
}

impl LtvRequest {
    pub fn new(time: QueryTime) -> Self {
        LtvRequest {
            time,
            frequency: Frequency::default(),
            metric: LtvMetric::default(),
            segment: None,
            group_by: None,
        }
    }

    pub fn url(&self) -> Result<String> {
        Ok(format!(
            "/api/2/revenue/ltv?m={}&start={}&end={}&i={}{}",
            self.metric.value(),
            self.time.start(),
            self.time.end(),
            self.frequency,
            segment_params(self.segment.as_ref(), self.group_by.as_ref())?,
        ))
    }
}

// aggregates are named, everything else is an age-indexed series
#[derive(Deserialize, Debug, Default)]
struct LtvDay {
    #[serde(default, deserialize_with = "lenient_number")]
    count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    paid: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    total_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    rtotalnew: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    rtotal: Option<f64>,
    #[serde(flatten)]
    ages: BTreeMap<String, Value>,
}

#[derive(Deserialize, Debug, Default)]
struct LtvCombined {
    #[serde(default, deserialize_with = "lenient_number")]
    paid: Option<f64>,
    #[serde(flatten)]
    ages: BTreeMap<String, Value>,
}

#[derive(Deserialize, Debug, Default)]
struct LtvSeries {
    #[serde(default)]
    values: BTreeMap<String, Value>,
    #[serde(default)]
    complete: BTreeMap<String, Value>,
    #[serde(default)]
    combined: Option<LtvCombined>,
    #[serde(default)]
    combined_complete: BTreeMap<String, Value>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct LtvData {
    #[serde(default)]
    series_labels: Vec<Value>,
    #[serde(default)]
    series: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgeKey {
    // `r5new`: payers converted at this age, not cumulative
    NewPayers(i64),
    // `r5d`: cumulative spend per payer up to this age
    Cumulative(i64),
}

fn parse_age_key(key: &str) -> Option<AgeKey> {
    let rest = key.strip_prefix('r')?;
    if let Some(age) = rest.strip_suffix("new") {
        return age.parse().ok().map(AgeKey::NewPayers);
    }
    if let Some(age) = rest.strip_suffix('d') {
        return age.parse().ok().map(AgeKey::Cumulative);
    }

    None
}

fn cumulative_ages<'a>(
    values: impl IntoIterator<Item = (&'a String, &'a Value)>,
) -> impl Iterator<Item = (i64, &'a Value)> {
    values.into_iter().filter_map(|(key, value)| match parse_age_key(key) {
        Some(AgeKey::Cumulative(age)) => Some((age, value)),
        _ => None,
    })
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct LtvTotalsRow {
    pub segment: String,
    pub date: String,
    pub cohort_size: i64,
    pub payers: i64,
    pub total_amount: Option<f64>,
    pub rtotalnew: Option<f64>,
    pub rtotal: Option<f64>,
}

impl TableRow for LtvTotalsRow {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("segment", DataType::Utf8, false),
            Field::new("date", DataType::Utf8, false),
            Field::new("cohort_size", DataType::Int64, false),
            Field::new("payers", DataType::Int64, false),
            Field::new("total_amount", DataType::Float64, true),
            Field::new("rtotalnew", DataType::Float64, true),
            Field::new("rtotal", DataType::Float64, true),
        ])
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct LtvSpendRow {
    pub segment: String,
    pub date: String,
    pub age: i64,
    pub cohort_size: i64,
    pub payers: i64,
    pub rev_ppu: f64,
    pub tot_rev: f64,
    pub completed: Option<bool>,
}

impl TableRow for LtvSpendRow {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("segment", DataType::Utf8, false),
            Field::new("date", DataType::Utf8, false),
            Field::new("age", DataType::Int64, false),
            Field::new("cohort_size", DataType::Int64, false),
            Field::new("payers", DataType::Int64, false),
            Field::new("rev_ppu", DataType::Float64, false),
            Field::new("tot_rev", DataType::Float64, false),
            Field::new("completed", DataType::Boolean, true),
        ])
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct LtvConversionRow {
    pub segment: String,
    pub date: String,
    pub age: i64,
    pub cohort_size: i64,
    pub payers: i64,
    pub new_payers: i64,
    pub conv: i64,
    pub completed: Option<bool>,
}

impl TableRow for LtvConversionRow {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("segment", DataType::Utf8, false),
            Field::new("date", DataType::Utf8, false),
            Field::new("age", DataType::Int64, false),
            Field::new("cohort_size", DataType::Int64, false),
            Field::new("payers", DataType::Int64, false),
            Field::new("new_payers", DataType::Int64, false),
            Field::new("conv", DataType::Int64, false),
            Field::new("completed", DataType::Boolean, true),
        ])
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct LtvCombinedRow {
    pub segment: String,
    pub age: i64,
    pub payers: i64,
    pub rev_ppu: f64,
    pub completed: Option<bool>,
}

impl TableRow for LtvCombinedRow {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("segment", DataType::Utf8, false),
            Field::new("age", DataType::Int64, false),
            Field::new("payers", DataType::Int64, false),
            Field::new("rev_ppu", DataType::Float64, false),
            Field::new("completed", DataType::Boolean, true),
        ])
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct Ltv {
    /// Cumulative spend per paying user by (segment, date, age).
    pub spend: Vec<LtvSpendRow>,
    /// Cumulative conversions by (segment, date, age).
    pub conversions: Vec<LtvConversionRow>,
    pub totals: Vec<LtvTotalsRow>,
    /// Spend per paying user by (segment, age) without the by-day split.
    pub combined: Vec<LtvCombinedRow>,
}

type DayKey = (String, String);
type AgeKeyed = (String, String, i64);

pub fn normalize(response: &Value) -> Ltv {
    let Some(data) = decode_data::<LtvData>("revenue/ltv", response) else {
        return Ltv::default();
    };

    let mut out = Ltv::default();
    let mut completed: HashMap<AgeKeyed, bool> = HashMap::new();
    let mut totals: HashMap<DayKey, (i64, i64)> = HashMap::new();
    let mut new_payers: BTreeMap<DayKey, Vec<(i64, i64)>> = BTreeMap::new();
    let mut spend: Vec<(AgeKeyed, f64)> = vec![];

    for (label, series) in data.series_labels.iter().zip(data.series.iter()) {
        let segment = label_to_string(label);
        let series = match LtvSeries::deserialize(series) {
            Ok(series) => series,
            Err(err) => {
                warn!("ltv: malformed series of {segment:?}, skipping: {err}");
                continue;
            }
        };

        for (date, day) in series.values.iter() {
            let day = match LtvDay::deserialize(day) {
                Ok(day) => day,
                Err(err) => {
                    warn!("ltv: malformed day {date} of {segment:?}, skipping: {err}");
                    continue;
                }
            };
            let (Some(cohort_size), Some(payers)) = (day.count, day.paid) else {
                warn!("ltv: no cohort counts for {date} of {segment:?}, skipping");
                continue;
            };
            let (cohort_size, payers) = (cohort_size as i64, payers as i64);
            let key = (segment.clone(), date.to_owned());
            totals.insert(key.clone(), (cohort_size, payers));
            out.totals.push(LtvTotalsRow {
                segment: segment.clone(),
                date: date.to_owned(),
                cohort_size,
                payers,
                total_amount: day.total_amount,
                rtotalnew: day.rtotalnew,
                rtotal: day.rtotal,
            });

            for (age_key, value) in day.ages.iter() {
                let Some(age) = parse_age_key(age_key) else {
                    warn!("ltv: unknown key {age_key:?} for {date}, skipping");
                    continue;
                };
                let Some(value) = value.as_f64() else {
                    warn!("ltv: non-numeric {age_key:?} for {date}, skipping");
                    continue;
                };
                match age {
                    AgeKey::NewPayers(age) => new_payers
                        .entry(key.clone())
                        .or_default()
                        .push((age, value as i64)),
                    AgeKey::Cumulative(age) => {
                        spend.push(((segment.clone(), date.to_owned(), age), value))
                    }
                }
            }
        }

        for (date, flags) in series.complete.iter() {
            let Some(flags) = flags.as_object() else {
                continue;
            };
            for (age, flag) in cumulative_ages(flags) {
                if let Some(flag) = flag.as_bool() {
                    completed.insert((segment.clone(), date.to_owned(), age), flag);
                }
            }
        }

        let Some(all_days) = series.combined else {
            continue;
        };
        let Some(combined_payers) = all_days.paid.map(|paid| paid as i64) else {
            if !all_days.ages.is_empty() {
                warn!("ltv: no combined payers for {segment:?}, skipping");
            }
            continue;
        };
        let mut combined: Vec<_> = cumulative_ages(&all_days.ages)
            .filter_map(|(age, value)| value.as_f64().map(|v| (age, v)))
            .collect();
        combined.sort_by_key(|(age, _)| *age);
        for (age, rev_ppu) in combined {
            let completed = series
                .combined_complete
                .iter()
                .find(|(key, _)| parse_age_key(key) == Some(AgeKey::Cumulative(age)))
                .and_then(|(_, flag)| flag.as_bool());
            out.combined.push(LtvCombinedRow {
                segment: segment.clone(),
                age,
                payers: combined_payers,
                rev_ppu,
                completed,
            });
        }
    }

    for ((segment, date), mut ages) in new_payers {
        ages.sort_by_key(|(age, _)| *age);
        let (cohort_size, payers) = totals
            .get(&(segment.clone(), date.clone()))
            .copied()
            .unwrap_or_default();
        let mut conv = 0;
        for (age, new_payers) in ages {
            conv += new_payers;
            out.conversions.push(LtvConversionRow {
                segment: segment.clone(),
                date: date.clone(),
                age,
                cohort_size,
                payers,
                new_payers,
                conv,
                completed: completed.get(&(segment.clone(), date.clone(), age)).copied(),
            });
        }
    }

    spend.sort_by(|(a, _), (b, _)| a.cmp(b));
    for ((segment, date, age), rev_ppu) in spend {
        let (cohort_size, payers) = totals
            .get(&(segment.clone(), date.clone()))
            .copied()
            .unwrap_or_default();
        let completed = completed.get(&(segment.clone(), date.clone(), age)).copied();
        out.spend.push(LtvSpendRow {
            segment,
            date,
            age,
            cohort_size,
            payers,
            rev_ppu,
            tot_rev: rev_ppu * payers as f64,
            completed,
        });
    }
    debug!(
        "ltv rows: {} spend, {} conversions, {} combined",
        out.spend.len(),
        out.conversions.len(),
        out.combined.len()
    );

    out
}
