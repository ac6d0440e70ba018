use clap::ValueEnum;
use common::config::Credentials;
use common::DEFAULT_HOST;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing::Level;

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct Log {
    pub level: LogLevel,
}

/// Config file layout. Keys may also come from `AMPL_`-prefixed env vars.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(alias = "apiKey", alias = "apikey")]
    pub api_key: String,
    #[serde(alias = "secretKey", alias = "secretkey")]
    pub secret_key: String,
    pub host: Option<String>,
    pub log: Option<Log>,
}

impl TryInto<common::config::Config> for Config {
    type Error = crate::error::Error;

    fn try_into(self) -> Result<common::config::Config, Self::Error> {
        let mut cfg = common::config::Config::new(Credentials::new(self.api_key, self.secret_key))
            .with_host(self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()));
        if let Some(log) = self.log {
            cfg.log.level = log.level.into();
        }

        Ok(cfg.validate()?)
    }
}

#[derive(Deserialize, Copy, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    #[serde(rename = "trace")]
    Trace,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
        .into()
    }
}
