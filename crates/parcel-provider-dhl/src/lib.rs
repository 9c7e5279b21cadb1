// # DHL Shipment Provider
//
// This crate provides the DHL Shipment Tracking (Unified) API client for the
// parcel tracker.
//
// ## Behaviour
//
// - One HTTP GET per `fetch()` call, no retries, no pagination, no caching
// - Fixed 20 second total timeout per request
// - Error taxonomy:
//   - 401, or 403 with a secret configured → `Error::Authentication`
//   - any other status ≥ 400 → `Error::Request` (status + body)
//   - invalid JSON body → `Error::Unexpected`
//   - empty `shipments` envelope → `Error::Request`
//   - timeout → `Error::Request`, other transport failures → `Error::Unexpected`
//
// ## Security Requirements
//
// - API key and secret NEVER appear in logs or Debug output
//
// ## API Reference
//
// - GET `https://api-<region>.dhl.com/track/shipments?trackingNumber=<n>`

mod transport;

pub use transport::{HttpReply, ReqwestTransport, Transport};

use async_trait::async_trait;
use parcel_core::config::Credentials;
use parcel_core::traits::{ShipmentSource, ShipmentSourceFactory, TrackingResult};
use parcel_core::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Default API region
pub const DEFAULT_REGION: &str = "eu";

/// Total timeout for a single tracking request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "DHL-API-Key";

/// Header carrying the API secret
pub const API_SECRET_HEADER: &str = "DHL-API-Secret";

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("parcel-trackd/", env!("CARGO_PKG_VERSION"));

/// Tracking endpoint for a region
pub fn endpoint_for(region: &str) -> String {
    format!("https://api-{}.dhl.com/track/shipments", region)
}

/// Response envelope; only `shipments` is used
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    shipments: Option<Vec<serde_json::Value>>,
}

/// DHL shipment tracking client
///
/// Stateless apart from its credentials; the transport (and with it the
/// HTTP connection pool) is shared with every other client of the process.
pub struct DhlClient {
    /// API credentials
    /// ⚠️ NEVER log these values
    credentials: Credentials,

    /// Tracking endpoint URL
    endpoint: String,

    /// Builds and executes requests
    transport: Arc<dyn Transport>,
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for DhlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhlClient")
            .field("credentials", &self.credentials)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl DhlClient {
    /// Create a new client
    ///
    /// # Parameters
    ///
    /// - `credentials`: API key and optional secret
    /// - `region`: API region (`eu`, ...)
    /// - `transport`: Shared transport used to execute requests
    pub fn new(credentials: Credentials, region: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        if credentials.api_key.trim().is_empty() {
            return Err(Error::config("DHL API key cannot be empty"));
        }

        Ok(Self {
            credentials,
            endpoint: endpoint_for(region),
            transport,
        })
    }

    /// Tracking endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the request for a tracking number without sending it
    pub fn build_request(&self, tracking_number: &str) -> Result<reqwest::Request> {
        let mut request = self
            .transport
            .client()
            .get(&self.endpoint)
            .query(&[("trackingNumber", tracking_number)])
            .header(reqwest::header::ACCEPT, "application/json")
            .header(API_KEY_HEADER, &self.credentials.api_key)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(REQUEST_TIMEOUT);

        if let Some(secret) = &self.credentials.api_secret {
            request = request
                .basic_auth(&self.credentials.api_key, Some(secret))
                .header(API_SECRET_HEADER, secret);
        }

        request
            .build()
            .map_err(|e| Error::unexpected(format!("Failed to build request: {}", e)))
    }

    /// Map a reply to a tracking result
    fn interpret(&self, tracking_number: &str, reply: HttpReply) -> Result<TrackingResult> {
        let status = reply.status;

        if status == 401 || (status == 403 && self.credentials.has_secret()) {
            return Err(Error::auth(
                "Authentication failed. Please check your DHL API credentials.",
            ));
        }

        if status >= 400 {
            return Err(Error::request(
                status,
                format!(
                    "DHL API request failed for {}: {}",
                    tracking_number, reply.body
                ),
            ));
        }

        let envelope: Envelope = serde_json::from_str(&reply.body).map_err(|e| {
            Error::unexpected(format!(
                "Invalid JSON in response for {}: {}",
                tracking_number, e
            ))
        })?;

        let raw = envelope
            .shipments
            .and_then(|shipments| shipments.into_iter().next())
            .ok_or_else(|| {
                Error::request(
                    status,
                    format!(
                        "No shipment data returned for tracking number {}.",
                        tracking_number
                    ),
                )
            })?;

        Ok(TrackingResult::new(tracking_number, raw))
    }
}

#[async_trait]
impl ShipmentSource for DhlClient {
    async fn fetch(&self, tracking_number: &str) -> Result<TrackingResult> {
        tracing::debug!("Requesting DHL shipment {}", tracking_number);

        let request = self.build_request(tracking_number)?;
        let reply = self.transport.execute(request).await?;

        tracing::debug!(
            "DHL answered {} for {} ({} bytes)",
            reply.status,
            tracking_number,
            reply.body.len()
        );

        self.interpret(tracking_number, reply)
    }

    fn source_name(&self) -> &'static str {
        "dhl"
    }
}

/// Factory for creating DHL clients over a shared transport
pub struct DhlClientFactory {
    region: String,
    transport: Arc<dyn Transport>,
}

impl DhlClientFactory {
    /// Create a factory for the given region and transport
    pub fn new(region: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            region: region.into(),
            transport,
        }
    }
}

impl ShipmentSourceFactory for DhlClientFactory {
    fn create(&self, credentials: &Credentials) -> Result<Box<dyn ShipmentSource>> {
        Ok(Box::new(DhlClient::new(
            credentials.clone(),
            &self.region,
            Arc::clone(&self.transport),
        )?))
    }
}
