//! HTTP transport seam
//!
//! The client builds fully formed [`reqwest::Request`]s and hands them to a
//! [`Transport`]. Production uses [`ReqwestTransport`], which shares one
//! connection pool across every client of the process.

use async_trait::async_trait;
use parcel_core::{Error, Result};

/// Status and body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Executes a request and returns the raw reply
///
/// Implementations map transport failures onto the error taxonomy:
/// a timeout is `Error::Request` without status, anything else is
/// `Error::Unexpected`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Shared client that requests are built with
    fn client(&self) -> &reqwest::Client;

    async fn execute(&self, request: reqwest::Request) -> Result<HttpReply>;
}

/// Transport backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with its own connection pool
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::unexpected(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn execute(&self, request: reqwest::Request) -> Result<HttpReply> {
        let response = self.client.execute(request).await.map_err(map_transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_transport_error)?;

        Ok(HttpReply { status, body })
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::request_without_status(format!("Timeout while contacting DHL API: {}", e))
    } else {
        Error::unexpected(format!("Error contacting DHL API: {}", e))
    }
}
