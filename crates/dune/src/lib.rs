//! Dune Analytics execution API client.
//!
//! [`RemoteQueryClient`] submits queries, polls their status and downloads
//! results. Every individual call goes through the bounded exponential
//! [`RetryPolicy`]; the HTTP layer sits behind the [`Transport`] trait so the
//! client can be driven in-process by tests.

pub mod client;
pub mod config;
pub mod retry;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{RemoteQueryClient, WaitOutcome};
pub use config::ClientSettings;
pub use retry::RetryPolicy;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport, TransportError};
pub use types::{ExecutionState, ExecutionStatusResponse, ResultSet, Row};
