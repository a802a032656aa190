//! HTTP layer for the Expensee backend.
//!
//! - `transport`: request/response values and the [`Transport`] seam
//! - `pipeline`: bearer injection, refresh-and-retry, forced logout
//! - `client`: typed service calls built on the pipeline
//! - `error`: error taxonomy shared by all of the above

pub mod client;
pub mod endpoints;
pub mod error;
pub mod pipeline;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::ApiClient;
pub use error::{ApiError, AuthFailure, AuthenticationError, TransportError};
pub use pipeline::{Attempt, AuthPipeline, PipelineOptions, RefreshPolicy};
pub use transport::{
    ApiRequest, ApiResponse, AuthMode, MultipartPart, RequestBody, ReqwestTransport, Transport,
};
