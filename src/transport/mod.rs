//! Network boundary.
//!
//! The dispatcher talks to the network only through the [`Transport`] trait, so
//! retry and rate-limit discipline stay in one place and tests can swap in a
//! scripted fake.

mod http;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::error_handling::TransportError;

pub use http::{HttpTransport, RIOT_TOKEN_HEADER};

/// One outbound GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub timeout: Duration,
}

/// A response that produced a status code, whatever that code was.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        RawResponse {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Sends a single request. Implementations must not retry or rate limit.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &TransportRequest) -> Result<RawResponse, TransportError>;
}
