//! Configuration types for the parcel tracker
//!
//! A [`TrackerConfig`] is produced by the setup wizard and never edited in
//! place afterwards; changing it means running the wizard again. The
//! persisted form is a [`ConfigEntry`], keyed by [`unique_id_for`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier prefix used for config entries and entity ids
pub const DOMAIN: &str = "parcel_tracker";

/// Default poll interval (in minutes)
pub const DEFAULT_POLL_INTERVAL_MINUTES: u32 = 30;

/// Smallest accepted poll interval (in minutes)
pub const MIN_POLL_INTERVAL_MINUTES: u32 = 5;

/// Largest accepted poll interval (in minutes)
pub const MAX_POLL_INTERVAL_MINUTES: u32 = 720;

/// API credentials for the shipment provider
///
/// The Debug implementation does NOT expose the key or the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// API key (sent on every request)
    pub api_key: String,

    /// Optional API secret; switches on Basic auth
    #[serde(default)]
    pub api_secret: Option<String>,
}

impl Credentials {
    /// Create credentials from a key and an optional secret
    pub fn new(api_key: impl Into<String>, api_secret: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret,
        }
    }

    /// Whether a secret is configured
    pub fn has_secret(&self) -> bool {
        self.api_secret.is_some()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<REDACTED>")
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

/// Configuration record for one set of tracked shipments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Provider credentials
    #[serde(flatten)]
    pub credentials: Credentials,

    /// Tracking numbers, in the order the user entered them
    pub tracking_numbers: Vec<String>,

    /// Poll interval in minutes
    #[serde(default = "default_poll_interval_minutes")]
    pub poll_interval_minutes: u32,
}

impl TrackerConfig {
    /// Create a new configuration record
    pub fn new(
        credentials: Credentials,
        tracking_numbers: Vec<String>,
        poll_interval_minutes: u32,
    ) -> Self {
        Self {
            credentials,
            tracking_numbers,
            poll_interval_minutes,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.credentials.api_key.trim().is_empty() {
            return Err(crate::Error::config("API key cannot be empty"));
        }

        if self.tracking_numbers.is_empty() {
            return Err(crate::Error::config("No tracking numbers configured"));
        }

        for number in &self.tracking_numbers {
            if number.is_empty() || number.trim() != number {
                return Err(crate::Error::config(format!(
                    "Tracking number must be non-empty and trimmed: {:?}",
                    number
                )));
            }
        }

        validate_poll_interval(self.poll_interval_minutes)?;

        Ok(())
    }

    /// The poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.poll_interval_minutes) * 60)
    }

    /// Unique identity of this configuration
    pub fn unique_id(&self) -> String {
        unique_id_for(&self.tracking_numbers)
    }
}

/// Check that a poll interval lies within the accepted bounds
pub fn validate_poll_interval(minutes: u32) -> Result<(), crate::Error> {
    if !(MIN_POLL_INTERVAL_MINUTES..=MAX_POLL_INTERVAL_MINUTES).contains(&minutes) {
        return Err(crate::Error::config(format!(
            "Poll interval must be between {} and {} minutes. Got: {}",
            MIN_POLL_INTERVAL_MINUTES, MAX_POLL_INTERVAL_MINUTES, minutes
        )));
    }
    Ok(())
}

/// Compute the unique identity for a set of tracking numbers
///
/// The identity is independent of input order: numbers are sorted before
/// being joined.
pub fn unique_id_for(tracking_numbers: &[String]) -> String {
    let mut sorted: Vec<&str> = tracking_numbers.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("{}_{}", DOMAIN, sorted.join("_"))
}

/// A persisted configuration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identity (see [`unique_id_for`])
    pub unique_id: String,

    /// Human readable title
    pub title: String,

    /// The configuration itself
    pub data: TrackerConfig,

    /// When the entry was created
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ConfigEntry {
    /// Create an entry for a configuration, deriving id and title
    pub fn new(data: TrackerConfig) -> Self {
        Self {
            unique_id: data.unique_id(),
            title: format!("DHL ({} shipments)", data.tracking_numbers.len()),
            data,
            created_at: chrono::Utc::now(),
        }
    }
}

fn default_poll_interval_minutes() -> u32 {
    DEFAULT_POLL_INTERVAL_MINUTES
}
