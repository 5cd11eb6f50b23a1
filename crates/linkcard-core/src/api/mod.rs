//! Outbound HTTP for the app shell.
//!
//! Every call goes through the `AuthInterceptor`, which attaches the bearer
//! token and recovers once from an authorization failure. `ApiClient` adds
//! typed JSON helpers and rate-limit backoff on top.

pub mod client;
pub mod error;
pub mod interceptor;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use interceptor::AuthInterceptor;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
