// # Shipment Source Trait
//
// Defines the interface for fetching shipment records from a provider API.
//
// ## Implementations
//
// - DHL: `parcel-provider-dhl` crate
//
// ## Usage
//
// ```rust,ignore
// use parcel_core::ShipmentSource;
//
// #[tokio::main]
// async fn main() -> parcel_core::Result<()> {
//     let source = /* ShipmentSource implementation */;
//
//     let result = source.fetch("00340434161094042557").await?;
//     println!("{}", result.raw["status"]["description"]);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::config::Credentials;

/// A single shipment record returned by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingResult {
    /// The tracking number that was requested
    pub tracking_number: String,
    /// The first shipment record of the provider envelope, untouched
    pub raw: serde_json::Value,
}

impl TrackingResult {
    /// Create a new tracking result
    pub fn new(tracking_number: impl Into<String>, raw: serde_json::Value) -> Self {
        Self {
            tracking_number: tracking_number.into(),
            raw,
        }
    }
}

/// Trait for shipment source implementations
///
/// Sources are single-shot: one call, one network round trip. They do not
/// retry, paginate, cache or spawn tasks. Scheduling and failure handling
/// belong to the `PollCoordinator`.
///
/// # Errors
///
/// Implementations must report failures using the taxonomy of
/// [`crate::Error`]:
///
/// - [`crate::Error::Authentication`]: credentials rejected
/// - [`crate::Error::Request`]: error status, empty envelope or timeout
/// - [`crate::Error::Unexpected`]: anything else
#[async_trait]
pub trait ShipmentSource: Send + Sync {
    /// Fetch the shipment record for a tracking number
    ///
    /// # Parameters
    ///
    /// - `tracking_number`: The provider-assigned shipment identifier
    ///
    /// # Returns
    ///
    /// - `Ok(TrackingResult)`: `tracking_number` equals the requested number
    /// - `Err(Error)`: If the request failed
    async fn fetch(&self, tracking_number: &str) -> Result<TrackingResult, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing shipment sources from credentials
///
/// The setup wizard uses this to validate credentials before anything is
/// persisted; the daemon uses it to build one source per config entry.
pub trait ShipmentSourceFactory: Send + Sync {
    /// Create a ShipmentSource instance
    ///
    /// # Parameters
    ///
    /// - `credentials`: API key and optional secret
    fn create(&self, credentials: &Credentials) -> Result<Box<dyn ShipmentSource>, crate::Error>;
}
