use std::result;

use arrow::error::ArrowError;
use client::error::ClientError;
use common::error::CommonError;
use query::error::QueryError;
use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;

pub type Result<T> = result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("client: {0:?}")]
    Client(#[from] ClientError),
    #[error("query: {0:?}")]
    Query(#[from] QueryError),
    #[error("common: {0:?}")]
    Common(#[from] CommonError),
    #[error("config: {0:?}")]
    Config(#[from] config::ConfigError),
    #[error("arrow: {0:?}")]
    Arrow(#[from] ArrowError),
    #[error("serde: {0:?}")]
    Serde(#[from] serde_json::Error),
    #[error("regex: {0:?}")]
    Regex(#[from] regex::Error),
    #[error("StdIO: {0:?}")]
    StdIO(#[from] std::io::Error),
    #[error("set global default subscriber: {0:?}")]
    SetGlobalDefaultError(#[from] SetGlobalDefaultError),
}
