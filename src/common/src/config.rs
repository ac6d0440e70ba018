use std::fmt;

use tracing::level_filters::LevelFilter;
use url::Url;

use crate::error::CommonError;
use crate::error::Result;
use crate::types::DEFAULT_HOST;

#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

// keeps the secret out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Log {
    pub level: LevelFilter,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub host: String,
    pub log: Log,
}

impl Config {
    pub fn new(credentials: Credentials) -> Self {
        Config {
            credentials,
            host: DEFAULT_HOST.to_string(),
            log: Log {
                level: LevelFilter::INFO,
            },
        }
    }

    pub fn with_host(self, host: impl Into<String>) -> Self {
        Self {
            credentials: self.credentials,
            host: host.into(),
            log: self.log,
        }
    }

    /// Checks credentials and normalizes the host (no trailing slash).
    pub fn validate(self) -> Result<Self> {
        if self.credentials.api_key.is_empty() {
            return Err(CommonError::InvalidConfig("api key is empty".to_string()));
        }
        if self.credentials.secret_key.is_empty() {
            return Err(CommonError::InvalidConfig(
                "secret key is empty".to_string(),
            ));
        }

        let url = Url::parse(&self.host)?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(CommonError::InvalidConfig(format!(
                "unsupported host scheme {:?}",
                url.scheme()
            )));
        }

        Ok(Self {
            host: self.host.trim_end_matches('/').to_string(),
            ..self
        })
    }
}
