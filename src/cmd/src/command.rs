use std::path::PathBuf;

use arrow::record_batch::RecordBatch;
use clap::Args;
use clap::Subcommand;
use clap::ValueEnum;
use client::ApiClient;
use query::queries::annotations::MAJOR_VERSION;
use query::queries::event_segmentation;
use query::queries::event_segmentation::SegmentationRequest;
use query::queries::funnel;
use query::queries::funnel::FunnelRequest;
use query::queries::ltv;
use query::queries::ltv::LtvRequest;
use query::queries::retention;
use query::queries::retention::RetentionRequest;
use query::queries::sessions::SessionsRequest;
use query::queries::user_activity::UserActivityRequest;
use query::record_batch;
use query::EventQuery;
use query::Frequency;
use query::PropValueOperation;
use query::PropertyGroupBy;
use query::PropertyRef;
use query::QueryTime;
use query::Segment;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::Error;
use crate::error::Result;

#[derive(Args, Clone, Debug)]
pub struct Cfg {
    /// JSON or TOML file with `api_key` and `secret_key`
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FrequencyArg {
    Realtime,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl From<FrequencyArg> for Frequency {
    fn from(f: FrequencyArg) -> Self {
        match f {
            FrequencyArg::Realtime => Frequency::Realtime,
            FrequencyArg::Hourly => Frequency::Hourly,
            FrequencyArg::Daily => Frequency::Daily,
            FrequencyArg::Weekly => Frequency::Weekly,
            FrequencyArg::Monthly => Frequency::Monthly,
        }
    }
}

/// Date range with the top-level segment and group-by.
#[derive(Args, Clone, Debug)]
pub struct Range {
    /// First day, YYYY-MM-DD
    #[arg(long)]
    pub start: String,
    /// Last day, YYYY-MM-DD
    #[arg(long)]
    pub end: String,
    #[arg(long, value_enum, default_value = "daily")]
    pub frequency: FrequencyArg,
    /// `property=value1,value2`, users whose property is one of the values
    #[arg(long = "where")]
    pub conditions: Vec<String>,
    /// User property to split by, at most two
    #[arg(long)]
    pub group_by: Vec<String>,
}

impl Range {
    pub fn time(&self) -> Result<QueryTime> {
        Ok(QueryTime::between(&self.start, &self.end)?)
    }

    pub fn segment(&self) -> Result<Option<Segment>> {
        if self.conditions.is_empty() {
            return Ok(None);
        }

        let mut segment = Segment::new();
        for cond in self.conditions.iter() {
            let (prop, values) = parse_condition(cond)?;
            segment = segment.and(prop, PropValueOperation::Is, values);
        }

        Ok(Some(segment))
    }

    pub fn group_by(&self) -> Result<Option<PropertyGroupBy>> {
        if self.group_by.is_empty() {
            return Ok(None);
        }

        Ok(Some(PropertyGroupBy::try_new(self.group_by.iter())?))
    }
}

pub fn parse_condition(cond: &str) -> Result<(&str, Vec<&str>)> {
    match cond.split_once('=') {
        Some((prop, values)) if !prop.is_empty() => Ok((prop, values.split(',').collect())),
        _ => Err(Error::BadRequest(format!(
            "condition {cond:?} is not in property=values form"
        ))),
    }
}

/// `name` or `user:name` / `event:name`. Bare names are event properties.
pub fn parse_property(prop: &str) -> PropertyRef {
    match prop.split_once(':') {
        Some(("user", name)) => PropertyRef::user(name),
        Some(("event", name)) => PropertyRef::event(name),
        _ => PropertyRef::event(prop),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum MetricArg {
    Uniques,
    Totals,
    Sums,
    Formula,
}

impl From<MetricArg> for event_segmentation::Metric {
    fn from(m: MetricArg) -> Self {
        match m {
            MetricArg::Uniques => event_segmentation::Metric::Uniques,
            MetricArg::Totals => event_segmentation::Metric::Totals,
            MetricArg::Sums => event_segmentation::Metric::PropSum,
            MetricArg::Formula => event_segmentation::Metric::Formula,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FunnelModeArg {
    Ordered,
    Unordered,
    Sequential,
}

impl From<FunnelModeArg> for funnel::FunnelMode {
    fn from(m: FunnelModeArg) -> Self {
        match m {
            FunnelModeArg::Ordered => funnel::FunnelMode::Ordered,
            FunnelModeArg::Unordered => funnel::FunnelMode::Unordered,
            FunnelModeArg::Sequential => funnel::FunnelMode::Sequential,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RetentionModeArg {
    Bracket,
    Rolling,
    NDay,
}

impl From<RetentionModeArg> for retention::RetentionMode {
    fn from(m: RetentionModeArg) -> Self {
        match m {
            RetentionModeArg::Bracket => retention::RetentionMode::Bracket,
            RetentionModeArg::Rolling => retention::RetentionMode::Rolling,
            RetentionModeArg::NDay => retention::RetentionMode::NDay,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LtvMetricArg {
    Arpu,
    Arppu,
    TotalRevenue,
    PayingUsers,
}

impl From<LtvMetricArg> for ltv::LtvMetric {
    fn from(m: LtvMetricArg) -> Self {
        match m {
            LtvMetricArg::Arpu => ltv::LtvMetric::Arpu,
            LtvMetricArg::Arppu => ltv::LtvMetric::Arppu,
            LtvMetricArg::TotalRevenue => ltv::LtvMetric::TotalRevenue,
            LtvMetricArg::PayingUsers => ltv::LtvMetric::PayingUsers,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LtvTable {
    Spend,
    Conversions,
    Totals,
    Combined,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SessionsKind {
    Length,
    Average,
    PerUser,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Event types of the project
    Events,
    /// Raw result of a saved chart
    Chart { id: String },
    /// Annotations with their effective periods
    Annotations {
        /// Label regex, major versions by default
        #[arg(long)]
        label_filter: Option<String>,
    },
    /// Events of a single user
    UserActivity {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 1000)]
        limit: usize,
    },
    /// Event segmentation
    Segmentation {
        #[command(flatten)]
        range: Range,
        #[arg(long)]
        event: String,
        #[arg(long, value_enum, default_value = "formula")]
        metric: MetricArg,
        /// Custom formula, `UNIQUES(A)` by default
        #[arg(long)]
        formula: Option<String>,
        #[arg(long, default_value_t = event_segmentation::DEFAULT_LIMIT)]
        limit: usize,
        #[arg(long)]
        rolling_window: Option<u32>,
        #[arg(long)]
        rolling_average: Option<u32>,
        /// Uniques, totals and the sum of `--sum-property` in one table
        #[arg(long)]
        full: bool,
        #[arg(long)]
        sum_property: Option<String>,
        #[arg(long)]
        group_property: Option<String>,
    },
    /// Conversion funnel
    Funnel {
        #[command(flatten)]
        range: Range,
        /// Funnel step, in order
        #[arg(long = "step", required = true)]
        steps: Vec<String>,
        #[arg(long, value_enum, default_value = "ordered")]
        mode: FunnelModeArg,
        /// Count active instead of new users
        #[arg(long)]
        active: bool,
        #[arg(long, default_value_t = funnel::DEFAULT_CONVERSION_WINDOW_SECONDS)]
        conversion_window: u64,
        #[arg(long, default_value_t = funnel::DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Retention of users starting with `--start-event`
    Retention {
        #[command(flatten)]
        range: Range,
        #[arg(long, default_value = retention::NEW_USER_EVENT)]
        start_event: String,
        #[arg(long, default_value = retention::ANY_EVENT)]
        return_event: String,
        #[arg(long, value_enum)]
        mode: Option<RetentionModeArg>,
        #[arg(long)]
        bracket: Option<String>,
        /// Cohorts merged instead of by day
        #[arg(long)]
        combined: bool,
    },
    /// Lifetime value of cohorts
    Ltv {
        #[command(flatten)]
        range: Range,
        #[arg(long, value_enum, default_value = "arppu")]
        metric: LtvMetricArg,
        #[arg(long, value_enum, default_value = "spend")]
        table: LtvTable,
    },
    /// Session statistics
    Sessions {
        #[command(flatten)]
        range: Range,
        #[arg(value_enum)]
        kind: SessionsKind,
    },
}

pub enum Output {
    Table(RecordBatch),
    Json(Value),
}

pub async fn run(api: &ApiClient, cmd: &Commands) -> Result<Output> {
    debug!("running {cmd:?}");

    let out = match cmd {
        Commands::Events => Output::Json(serde_json::to_value(api.events().await?)?),
        Commands::Chart { id } => Output::Json(api.chart(id).await?),
        Commands::Annotations { label_filter } => {
            let rows = match label_filter {
                Some(filter) => api.annotations(&Regex::new(filter)?).await?,
                None => api.annotations(&MAJOR_VERSION).await?,
            };
            Output::Table(record_batch(&rows)?)
        }
        Commands::UserActivity {
            user,
            offset,
            limit,
        } => {
            let mut req = UserActivityRequest::new(user.to_owned());
            req.offset = *offset;
            req.limit = *limit;
            let activity = api.user_activity(&req).await?;
            Output::Table(record_batch(&activity.events)?)
        }
        Commands::Segmentation {
            range,
            event,
            metric,
            formula,
            limit,
            rolling_window,
            rolling_average,
            full,
            sum_property,
            group_property,
        } => {
            let mut req = SegmentationRequest::new(EventQuery::new(event), range.time()?);
            req.frequency = range.frequency.into();
            req.metric = (*metric).into();
            req.limit = *limit;
            req.segment = range.segment()?;
            req.group_by = range.group_by()?;
            req.rolling_window = *rolling_window;
            req.rolling_average = *rolling_average;
            if let Some(formula) = formula {
                req = req.with_formula(event_segmentation::Formula::Custom(formula.to_owned()));
            }

            if *full {
                let rows = api
                    .event_full_data(
                        &req,
                        sum_property.as_deref().map(parse_property),
                        group_property.as_deref().map(parse_property),
                    )
                    .await?;
                Output::Table(record_batch(&rows)?)
            } else {
                Output::Table(record_batch(&api.event_segmentation(&req).await?)?)
            }
        }
        Commands::Funnel {
            range,
            steps,
            mode,
            active,
            conversion_window,
            limit,
        } => {
            let steps = steps.iter().map(EventQuery::new).collect();
            let mut req = FunnelRequest::new(steps, range.time()?);
            req.mode = (*mode).into();
            if *active {
                req.users = funnel::FunnelUsers::Active;
            }
            req.conversion_window_seconds = *conversion_window;
            req.limit = *limit;
            req.segment = range.segment()?;
            req.group_by = range.group_by()?;
            Output::Table(record_batch(&api.funnel(&req).await?)?)
        }
        Commands::Retention {
            range,
            start_event,
            return_event,
            mode,
            bracket,
            combined,
        } => {
            let mut req = RetentionRequest::new(range.time()?);
            req.start_event = EventQuery::new(start_event);
            req.return_event = EventQuery::new(return_event);
            req.mode = mode.map(Into::into);
            req.bracket = bracket.clone();
            req.frequency = range.frequency.into();
            req.segment = range.segment()?;
            req.group_by = range.group_by()?;

            let res = api.retention_full(&req).await?;
            if *combined {
                Output::Table(record_batch(&res.combined)?)
            } else {
                Output::Table(record_batch(&res.by_day)?)
            }
        }
        Commands::Ltv {
            range,
            metric,
            table,
        } => {
            let mut req = LtvRequest::new(range.time()?);
            req.metric = (*metric).into();
            req.frequency = range.frequency.into();
            req.segment = range.segment()?;
            req.group_by = range.group_by()?;

            let res = api.ltv(&req).await?;
            let batch = match table {
                LtvTable::Spend => record_batch(&res.spend)?,
                LtvTable::Conversions => record_batch(&res.conversions)?,
                LtvTable::Totals => record_batch(&res.totals)?,
                LtvTable::Combined => record_batch(&res.combined)?,
            };
            Output::Table(batch)
        }
        Commands::Sessions { range, kind } => {
            let mut req = SessionsRequest::new(range.time()?);
            req.segment = range.segment()?;
            req.group_by = range.group_by()?;

            let batch = match kind {
                SessionsKind::Length => {
                    record_batch(&api.session_length_distribution(&req).await?)?
                }
                SessionsKind::Average => record_batch(&api.session_average_length(&req).await?)?,
                SessionsKind::PerUser => {
                    record_batch(&api.session_average_per_user(&req).await?)?
                }
            };
            Output::Table(batch)
        }
    };

    Ok(out)
}
