//! Query batch types shared by the builder, the dispatcher and the client adapter.

pub mod backend_request;
pub mod frame;
pub mod query;
pub mod result;
pub mod time_range;

pub use backend_request::{BackendRequest, RequestKind};
pub use frame::{DataFrame, Field};
pub use query::{
    BucketAgg, BucketAggType, MetricAgg, MetricType, Query, QueryEntry, QueryRequest,
};
pub use result::{ErrorKind, QueryDataResponse, QueryResult, QueryStatus};
pub use time_range::TimeRange;
