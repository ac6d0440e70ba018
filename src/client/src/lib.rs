pub mod api;
pub mod error;
pub mod http;

pub use api::ApiClient;
pub use error::ClientError;
pub use error::Result;
pub use http::HttpTransport;
pub use http::ReqwestTransport;
