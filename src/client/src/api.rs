use std::sync::Arc;

use chrono::Local;
use common::config::Config;
use common::config::Credentials;
use query::queries::annotations;
use query::queries::annotations::Annotation;
use query::queries::event_segmentation;
use query::queries::event_segmentation::join_full_data;
use query::queries::event_segmentation::EventFullDataRow;
use query::queries::event_segmentation::SegmentationRequest;
use query::queries::event_segmentation::SegmentationRow;
use query::queries::events;
use query::queries::funnel;
use query::queries::funnel::FunnelRequest;
use query::queries::funnel::FunnelRow;
use query::queries::ltv;
use query::queries::ltv::Ltv;
use query::queries::ltv::LtvRequest;
use query::queries::retention;
use query::queries::retention::Retention;
use query::queries::retention::RetentionRequest;
use query::queries::retention::RetentionRow;
use query::queries::sessions;
use query::queries::sessions::SessionLengthRow;
use query::queries::sessions::SessionsEndpoint;
use query::queries::sessions::SessionsRequest;
use query::queries::sessions::SessionsRow;
use query::queries::user_activity;
use query::queries::user_activity::UserActivity;
use query::queries::user_activity::UserActivityRequest;
use query::PropertyRef;
use regex::Regex;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;
use crate::error::Result;
use crate::http::HttpTransport;
use crate::http::ReqwestTransport;

/// Bodies are single-byte encoded, every byte maps to the same code point.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// One method per endpoint. Requests are issued one at a time and nothing
/// but the credentials is kept between calls.
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    credentials: Credentials,
    host: String,
}

impl ApiClient {
    pub fn new(cfg: Config) -> Result<Self> {
        Self::with_transport(cfg, Arc::new(ReqwestTransport::default()))
    }

    pub fn with_transport(cfg: Config, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let cfg = cfg.validate()?;

        Ok(Self {
            transport,
            credentials: cfg.credentials,
            host: cfg.host,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// GETs `path` relative to the host and parses the body as JSON.
    pub async fn query_api(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.host, path);
        debug!("querying {url}");

        let body = decode_latin1(&self.transport.get(&url, &self.credentials).await?);
        serde_json::from_str(&body)
            .map_err(|source| ClientError::MalformedResponse { url, body, source })
    }

    pub async fn events(&self) -> Result<Vec<Map<String, Value>>> {
        let resp = self.query_api(events::LIST_URL).await?;

        Ok(events::normalize_list(&resp))
    }

    /// Raw result of a saved chart.
    pub async fn chart(&self, chart_id: &str) -> Result<Value> {
        self.query_api(&events::chart_url(chart_id)).await
    }

    pub async fn annotations(&self, label_filter: &Regex) -> Result<Vec<Annotation>> {
        let resp = self.query_api(annotations::URL).await?;

        Ok(annotations::normalize(
            &resp,
            label_filter,
            Local::now().date_naive(),
        ))
    }

    pub async fn user_activity(&self, req: &UserActivityRequest) -> Result<UserActivity> {
        let resp = self.query_api(&req.url()).await?;

        Ok(user_activity::normalize(&resp))
    }

    pub async fn ltv(&self, req: &LtvRequest) -> Result<Ltv> {
        let resp = self.query_api(&req.url()?).await?;

        Ok(ltv::normalize(&resp))
    }

    pub async fn retention(&self, req: &RetentionRequest) -> Result<Vec<RetentionRow>> {
        Ok(self.retention_full(req).await?.by_day)
    }

    /// By-day and combined retention.
    pub async fn retention_full(&self, req: &RetentionRequest) -> Result<Retention> {
        let resp = self.query_api(&req.url()?).await?;

        Ok(retention::normalize(&resp))
    }

    pub async fn funnel(&self, req: &FunnelRequest) -> Result<Vec<FunnelRow>> {
        let resp = self.query_api(&req.url()?).await?;

        Ok(funnel::normalize(&resp, req.horizon_days()))
    }

    pub async fn event_segmentation(
        &self,
        req: &SegmentationRequest,
    ) -> Result<Vec<SegmentationRow>> {
        let resp = self.query_api(&req.url()?).await?;

        Ok(event_segmentation::normalize(&resp))
    }

    pub async fn event_uniques(&self, req: &SegmentationRequest) -> Result<Vec<SegmentationRow>> {
        self.event_segmentation(&req.uniques()).await
    }

    pub async fn event_totals(&self, req: &SegmentationRequest) -> Result<Vec<SegmentationRow>> {
        self.event_segmentation(&req.totals()).await
    }

    pub async fn event_prop_sum(
        &self,
        req: &SegmentationRequest,
        sum_property: PropertyRef,
        group_property: Option<PropertyRef>,
    ) -> Result<Vec<SegmentationRow>> {
        self.event_segmentation(&req.prop_sum(sum_property, group_property)?)
            .await
    }

    /// Uniques, totals and, when `sum_property` is set, the property sum joined
    /// on (segment, x). With a sum the event-level group-by of the other two
    /// passes is `group_property` alone.
    pub async fn event_full_data(
        &self,
        req: &SegmentationRequest,
        sum_property: Option<PropertyRef>,
        group_property: Option<PropertyRef>,
    ) -> Result<Vec<EventFullDataRow>> {
        let (prop_sum, counted) = match sum_property {
            Some(sum_property) => {
                let prop_sum = self
                    .event_prop_sum(req, sum_property, group_property.clone())
                    .await?;
                (prop_sum, req.regrouped(group_property)?)
            }
            None => (vec![], req.clone()),
        };

        let uniques = self.event_uniques(&counted).await?;
        let totals = self.event_totals(&counted).await?;

        Ok(join_full_data(&prop_sum, &uniques, &totals))
    }

    pub async fn session_length_distribution(
        &self,
        req: &SessionsRequest,
    ) -> Result<Vec<SessionLengthRow>> {
        let resp = self.query_api(&req.url(SessionsEndpoint::Length)?).await?;

        Ok(sessions::normalize_length(&resp))
    }

    pub async fn session_average_length(&self, req: &SessionsRequest) -> Result<Vec<SessionsRow>> {
        let resp = self.query_api(&req.url(SessionsEndpoint::Average)?).await?;

        Ok(sessions::normalize(&resp))
    }

    pub async fn session_average_per_user(
        &self,
        req: &SessionsRequest,
    ) -> Result<Vec<SessionsRow>> {
        let resp = self.query_api(&req.url(SessionsEndpoint::PerUser)?).await?;

        Ok(sessions::normalize(&resp))
    }
}

#[cfg(test)]
mod tests {
    use crate::api::decode_latin1;

    #[test]
    fn test_decode_latin1() {
        assert_eq!(decode_latin1(b"{\"a\":1}"), "{\"a\":1}");
        assert_eq!(decode_latin1(&[0x63, 0x61, 0x66, 0xe9]), "caf\u{e9}");
        // utf-8 input is not reinterpreted
        assert_eq!(decode_latin1("é".as_bytes()), "\u{c3}\u{a9}");
    }
}
