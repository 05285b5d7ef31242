pub mod cache_layer;
pub mod extract;
pub mod http;

pub use cache_layer::CacheMiddleware;
pub use extract::{
    RequestClassifier, DEFAULT_PROVIDERS, DEFAULT_REQUEST_TYPES, UNKNOWN,
};
pub use http::{
    CacheStatus, GatewayResponse, UpstreamError, UpstreamHandler,
    UpstreamRequest, UpstreamResponse,
};
