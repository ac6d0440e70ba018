use std::result;

use common::error::CommonError;
use query::error::QueryError;
use thiserror::Error;

pub type Result<T> = result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport: {0:?}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response from {url}: {source}, body: {body}")]
    MalformedResponse {
        url: String,
        body: String,
        source: serde_json::Error,
    },
    #[error("query: {0:?}")]
    Query(#[from] QueryError),
    #[error("common: {0:?}")]
    Common(#[from] CommonError),
}
