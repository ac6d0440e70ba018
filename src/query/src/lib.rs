pub mod data_table;
pub mod encoding;
pub mod error;
pub mod event;
pub mod filter;
pub mod property;
pub mod queries;
pub mod segment;

pub use data_table::record_batch;
pub use data_table::TableRow;
pub use error::QueryError;
pub use error::Result;
pub use event::EventQuery;
pub use filter::PropValueOperation;
pub use property::PropertyRef;
pub use queries::Frequency;
pub use queries::QueryTime;
pub use segment::PropertyGroupBy;
pub use segment::Segment;
