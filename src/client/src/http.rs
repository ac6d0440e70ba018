use async_trait::async_trait;
use common::config::Credentials;
use reqwest::Client;

use crate::Result;

/// Authenticated GET returning the raw body.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, credentials: &Credentials) -> Result<Vec<u8>>;
}

#[derive(Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, credentials: &Credentials) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .basic_auth(&credentials.api_key, Some(&credentials.secret_key))
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.bytes().await?.to_vec())
    }
}
