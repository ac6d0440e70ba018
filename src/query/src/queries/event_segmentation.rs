use std::fmt;

use arrow::datatypes::DataType;
use arrow::datatypes::Field;
use arrow::datatypes::Schema;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::data_table::TableRow;
use crate::encoding::encode_value;
use crate::error::Result;
use crate::event::EventQuery;
use crate::property::PropertyRef;
use crate::queries::decode_data;
use crate::queries::segment_params;
use crate::queries::Frequency;
use crate::queries::QueryTime;
use crate::queries::SeriesData;
use crate::segment::PropertyGroupBy;
use crate::segment::Segment;

pub const DEFAULT_LIMIT: usize = 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Metric {
    Uniques,
    Totals,
    PropSum,
    #[default]
    Formula,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Uniques => write!(f, "uniques"),
            Metric::Totals => write!(f, "totals"),
            Metric::PropSum => write!(f, "sums"),
            Metric::Formula => write!(f, "formula"),
        }
    }
}

/// Only a single formula over event `A` is supported.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Formula {
    #[default]
    Uniques,
    Totals,
    PropSum,
    Custom(String),
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Uniques => write!(f, "UNIQUES(A)"),
            Formula::Totals => write!(f, "TOTALS(A)"),
            Formula::PropSum => write!(f, "PROPSUM(A)"),
            Formula::Custom(formula) => write!(f, "{formula}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SegmentationRequest {
    pub event: EventQuery,
    pub time: QueryTime,
    pub frequency: Frequency,
    pub metric: Metric,
    // number of group-by values returned
    pub limit: usize,
    pub segment: Option<Segment>,
    pub group_by: Option<PropertyGroupBy>,
    pub formula: Formula,
    pub rolling_window: Option<u32>,
    pub rolling_average: Option<u32>,
}

impl SegmentationRequest {
    pub fn new(event: EventQuery, time: QueryTime) -> Self {
        SegmentationRequest {
            event,
            time,
            frequency: Frequency::default(),
            metric: Metric::default(),
            limit: DEFAULT_LIMIT,
            segment: None,
            group_by: None,
            formula: Formula::default(),
            rolling_window: None,
            rolling_average: None,
        }
    }

    pub fn with_event(self, event: EventQuery) -> Self {
        Self { event, ..self }
    }

    pub fn with_formula(self, formula: Formula) -> Self {
        Self { formula, ..self }
    }

    pub fn uniques(&self) -> Self {
        Self {
            metric: Metric::Formula,
            formula: Formula::Uniques,
            ..self.clone()
        }
    }

    pub fn totals(&self) -> Self {
        Self {
            metric: Metric::Formula,
            formula: Formula::Totals,
            ..self.clone()
        }
    }

    /// Sum of `sum_property`, optionally split by `group_property`. The event's
    /// own group-by is replaced.
    pub fn prop_sum(
        &self,
        sum_property: PropertyRef,
        group_property: Option<PropertyRef>,
    ) -> Result<Self> {
        let event = self.event.clone().reset_group_by().group_by(sum_property)?;
        let event = match group_property {
            Some(prop) => event.group_by(prop)?,
            None => event,
        };

        Ok(Self {
            event,
            metric: Metric::Formula,
            formula: Formula::PropSum,
            ..self.clone()
        })
    }

    /// Same request with the event grouped by `group_property` only.
    pub fn regrouped(&self, group_property: Option<PropertyRef>) -> Result<Self> {
        let event = self.event.clone().reset_group_by();
        let event = match group_property {
            Some(prop) => event.group_by(prop)?,
            None => event,
        };

        Ok(self.clone().with_event(event))
    }

    pub fn url(&self) -> Result<String> {
        let formula = match self.metric {
            Metric::Formula => format!("&formula={}", encode_value(&self.formula.to_string())),
            _ => String::new(),
        };
        let mut rolling = String::new();
        if let Some(window) = self.rolling_window {
            rolling.push_str(&format!("&rollingWindow={window}"));
        }
        if let Some(average) = self.rolling_average {
            rolling.push_str(&format!("&rollingAverage={average}"));
        }

        Ok(format!(
            "/api/2/events/segmentation?e={}&start={}&end={}&i={}&m={}{}&limit={}{}{}",
            self.event.event_url()?,
            self.time.start(),
            self.time.end(),
            self.frequency,
            self.metric,
            segment_params(self.segment.as_ref(), self.group_by.as_ref())?,
            self.limit,
            formula,
            rolling,
        ))
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SegmentationRow {
    pub segment: String,
    pub x: String,
    pub y: Option<f64>,
}

impl TableRow for SegmentationRow {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("segment", DataType::Utf8, false),
            Field::new("x", DataType::Utf8, false),
            Field::new("y", DataType::Float64, true),
        ])
    }
}

pub fn normalize(response: &Value) -> Vec<SegmentationRow> {
    let Some(data) = decode_data::<SeriesData>("events/segmentation", response) else {
        return vec![];
    };

    let rows: Vec<_> = data
        .points()
        .into_iter()
        .map(|(segment, x, y)| SegmentationRow { segment, x, y })
        .collect();
    debug!("segmentation rows: {}", rows.len());

    rows
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct EventFullDataRow {
    pub segment: String,
    pub x: String,
    pub uniques: Option<f64>,
    pub totals: Option<f64>,
    pub prop_sum: Option<f64>,
}

impl TableRow for EventFullDataRow {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("segment", DataType::Utf8, false),
            Field::new("x", DataType::Utf8, false),
            Field::new("uniques", DataType::Float64, true),
            Field::new("totals", DataType::Float64, true),
            Field::new("prop_sum", DataType::Float64, true),
        ])
    }
}

/// Outer join of the three passes on (segment, x), in order of first appearance.
pub fn join_full_data(
    prop_sum: &[SegmentationRow],
    uniques: &[SegmentationRow],
    totals: &[SegmentationRow],
) -> Vec<EventFullDataRow> {
    let mut joined: IndexMap<(String, String), EventFullDataRow> = IndexMap::new();
    let mut merge = |rows: &[SegmentationRow], set: fn(&mut EventFullDataRow, Option<f64>)| {
        for row in rows {
            let entry = joined
                .entry((row.segment.clone(), row.x.clone()))
                .or_insert_with(|| EventFullDataRow {
                    segment: row.segment.clone(),
                    x: row.x.clone(),
                    ..Default::default()
                });
            set(entry, row.y);
        }
    };

    merge(prop_sum, |row, v| row.prop_sum = v);
    merge(uniques, |row, v| row.uniques = v);
    merge(totals, |row, v| row.totals = v);

    joined.into_values().collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::event::EventQuery;
    use crate::property::PropertyRef;
    use crate::queries::event_segmentation::join_full_data;
    use crate::queries::event_segmentation::normalize;
    use crate::queries::event_segmentation::EventFullDataRow;
    use crate::queries::event_segmentation::Formula;
    use crate::queries::event_segmentation::Metric;
    use crate::queries::event_segmentation::SegmentationRequest;
    use crate::queries::event_segmentation::SegmentationRow;
    use crate::queries::Frequency;
    use crate::queries::QueryTime;
    use crate::segment::PropertyGroupBy;
    use crate::segment::Segment;

    fn row(segment: &str, x: &str, y: f64) -> SegmentationRow {
        SegmentationRow {
            segment: segment.to_string(),
            x: x.to_string(),
            y: Some(y),
        }
    }

    #[test]
    fn test_url() {
        let req = SegmentationRequest::new(
            EventQuery::new("Open App"),
            QueryTime::between("2023-01-01", "2023-01-31").unwrap(),
        );
        assert_eq!(
            req.url().unwrap(),
            r#"/api/2/events/segmentation?e={"event_type":"Open%20App"}&start=20230101&end=20230131&i=1&m=formula&limit=1000&formula=UNIQUES(A)"#
        );
    }

    #[test]
    fn test_url_full() {
        let mut req = SegmentationRequest::new(
            EventQuery::new("purchase"),
            QueryTime::between("2023-01-01", "2023-01-31").unwrap(),
        );
        req.metric = Metric::Totals;
        req.frequency = Frequency::Weekly;
        req.limit = 10;
        req.segment = Some(Segment::new().and_is("country", ["US"]));
        req.group_by = Some(PropertyGroupBy::try_new(["plan"]).unwrap());
        req.rolling_window = Some(7);

        assert_eq!(
            req.url().unwrap(),
            concat!(
                r#"/api/2/events/segmentation?e={"event_type":"purchase"}&start=20230101&end=20230131&i=7&m=totals"#,
                r#"&s=[{"prop":"country","op":"is","values":["US"]}]&g=gp:plan&limit=10&rollingWindow=7"#
            )
        );
    }

    #[test]
    fn test_formula_url() {
        let req = SegmentationRequest::new(
            EventQuery::new("purchase")
                .group_by(PropertyRef::event("price"))
                .unwrap(),
            QueryTime::between("2023-01-01", "2023-01-02").unwrap(),
        )
        .with_formula(Formula::PropSum);
        assert!(req.url().unwrap().ends_with("&limit=1000&formula=PROPSUM(A)"));
        assert_eq!(
            Formula::Custom("TOTALS(A)/UNIQUES(A)".to_string()).to_string(),
            "TOTALS(A)/UNIQUES(A)"
        );
    }

    #[test]
    fn test_url_reserved_characters() {
        let req = SegmentationRequest::new(
            EventQuery::new("purchase").and_is(PropertyRef::event("sku"), ["C#", "a&b"]),
            QueryTime::between("2023-01-01", "2023-01-02").unwrap(),
        )
        .with_formula(Formula::Custom("TOTALS(A)+UNIQUES(A)".to_string()));
        let url = req.url().unwrap();

        assert!(!url.contains('#'));
        assert!(url.contains(r#""subprop_value":["C%23","a%26b"]"#));

        let query = url.split_once('?').unwrap().1;
        let params = query
            .split('&')
            .map(|pair| pair.split_once('=').unwrap())
            .collect::<Vec<_>>();
        let names = params.iter().map(|(name, _)| *name).collect::<Vec<_>>();
        assert_eq!(names, vec!["e", "start", "end", "i", "m", "limit", "formula"]);
        assert_eq!(params[1].1, "20230101");
        assert_eq!(params[6].1, "TOTALS(A)%2BUNIQUES(A)");
    }

    #[test]
    fn test_derived_requests() {
        let event = EventQuery::new("purchase")
            .group_by(PropertyRef::user("plan"))
            .unwrap();
        let mut req = SegmentationRequest::new(
            event,
            QueryTime::between("2023-01-01", "2023-01-02").unwrap(),
        );
        req.metric = Metric::Totals;

        let uniques = req.uniques();
        assert_eq!(uniques.metric, Metric::Formula);
        assert_eq!(uniques.formula, Formula::Uniques);
        assert_eq!(req.totals().formula, Formula::Totals);

        let sum = req
            .prop_sum(PropertyRef::event("price"), Some(PropertyRef::event("sku")))
            .unwrap();
        assert_eq!(sum.formula, Formula::PropSum);
        assert_eq!(
            sum.event.event_url().unwrap(),
            r#"{"event_type":"purchase","group_by":[{"type":"event","value":"price"},{"type":"event","value":"sku"}]}"#
        );

        let regrouped = req.regrouped(Some(PropertyRef::event("sku"))).unwrap();
        assert_eq!(
            regrouped.event.event_url().unwrap(),
            EventQuery::new("purchase")
                .group_by(PropertyRef::event("sku"))
                .unwrap()
                .event_url()
                .unwrap()
        );

        // the original request is untouched
        assert_eq!(req.metric, Metric::Totals);
        assert_eq!(req.event.dimensions().len(), 1);
    }

    #[test]
    fn test_normalize() {
        let resp = json!({
            "data": {
                "seriesLabels": ["US"],
                "series": [[10, 20]],
                "xValues": ["2023-01-01", "2023-01-02"]
            }
        });

        assert_eq!(normalize(&resp), vec![
            row("US", "2023-01-01", 10.),
            row("US", "2023-01-02", 20.),
        ]);
    }

    #[test]
    fn test_normalize_grouped() {
        let resp = json!({
            "data": {
                "seriesLabels": [[0, "US"], [0, "CA"]],
                "series": [[1, 2], [3, {"value": 4}]],
                "xValues": ["2023-01-01", "2023-01-02"]
            }
        });

        assert_eq!(normalize(&resp), vec![
            row("0, US", "2023-01-01", 1.),
            row("0, US", "2023-01-02", 2.),
            row("0, CA", "2023-01-01", 3.),
            row("0, CA", "2023-01-02", 4.),
        ]);
    }

    #[test]
    fn test_normalize_empty() {
        let resp = json!({"data": {"series": [], "seriesLabels": [], "xValues": []}});
        assert!(normalize(&resp).is_empty());
        assert!(normalize(&json!({"data": []})).is_empty());
        assert!(normalize(&json!(null)).is_empty());
    }

    #[test]
    fn test_join_full_data() {
        let uniques = vec![row("US", "d1", 1.), row("US", "d2", 2.)];
        let totals = vec![row("US", "d1", 10.), row("US", "d2", 20.), row("CA", "d1", 5.)];
        let prop_sum = vec![row("US", "d2", 99.)];

        let joined = join_full_data(&prop_sum, &uniques, &totals);
        assert_eq!(joined, vec![
            EventFullDataRow {
                segment: "US".to_string(),
                x: "d2".to_string(),
                uniques: Some(2.),
                totals: Some(20.),
                prop_sum: Some(99.),
            },
            EventFullDataRow {
                segment: "US".to_string(),
                x: "d1".to_string(),
                uniques: Some(1.),
                totals: Some(10.),
                prop_sum: None,
            },
            EventFullDataRow {
                segment: "CA".to_string(),
                x: "d1".to_string(),
                uniques: None,
                totals: Some(5.),
                prop_sum: None,
            },
        ]);
    }
}
