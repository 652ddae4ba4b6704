pub mod circuit_breaker;
pub mod decompression;
pub mod http_client;
pub mod http_client_factory;
pub mod status_code_matcher;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerManager};
pub use decompression::{CompressionFormat, DecompressionService};
pub use http_client::ServiceHttpClient;
pub use http_client_factory::HttpClientFactory;
