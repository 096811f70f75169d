pub mod http_search_client;
pub mod response_parser;
pub mod search_client;

pub use http_search_client::HttpSearchClient;
pub use search_client::{SearchClient, SearchClientError};
