use std::result;

use thiserror::Error;

pub type Result<T> = result::Result<T, CommonError>;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("url: {0:?}")]
    Url(#[from] url::ParseError),
}
