use std::result;

use arrow::error::ArrowError;
use common::error::CommonError;
use thiserror::Error;

pub type Result<T> = result::Result<T, QueryError>;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("too many dimensions: {0} is the maximum")]
    TooManyDimensions(usize),
    #[error("invalid date {0:?}: {1}")]
    InvalidDate(String, chrono::ParseError),
    #[error("response shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("regex {0:?}")]
    Regex(#[from] regex::Error),
    #[error("serde {0:?}")]
    Serde(#[from] serde_json::Error),
    #[error("arrow {0:?}")]
    Arrow(#[from] ArrowError),
    #[error("common {0:?}")]
    Common(#[from] CommonError),
}
