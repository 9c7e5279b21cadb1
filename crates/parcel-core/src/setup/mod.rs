//! Setup wizard
//!
//! Two linear steps turn user input into a persisted [`ConfigEntry`]:
//!
//! 1. **Credentials** (`user`): API key, optional secret, poll interval
//! 2. **Tracking** (`tracking`): tracking numbers, validated with one fetch
//!
//! Every failure is reported as a [`FormError`] code on the re-shown form;
//! nothing escapes a step as an error.
//!
//! ## Validation policy
//!
//! A non-authentication request error during validation is ambiguous: the
//! provider may answer 404 for a shipment that is simply not visible yet.
//! [`ValidationPolicy::Lenient`] accepts the entry anyway,
//! [`ValidationPolicy::Strict`] rejects it with `cannot_connect`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{
    ConfigEntry, Credentials, DEFAULT_POLL_INTERVAL_MINUTES, MAX_POLL_INTERVAL_MINUTES,
    MIN_POLL_INTERVAL_MINUTES, TrackerConfig, unique_id_for, validate_poll_interval,
};
use crate::error::Error;
use crate::traits::{ConfigStore, ShipmentSourceFactory};

/// Form field names
pub const FIELD_API_KEY: &str = "api_key";
pub const FIELD_API_SECRET: &str = "api_secret";
pub const FIELD_POLL_INTERVAL: &str = "poll_interval_minutes";
pub const FIELD_TRACKING_NUMBERS: &str = "tracking_numbers";

/// How a non-authentication request error during validation is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Request errors do not block creating the entry
    #[default]
    Lenient,
    /// Request errors are reported as `cannot_connect`
    Strict,
}

impl FromStr for ValidationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(Error::config(format!(
                "Unknown validation policy '{}'. Valid: lenient, strict",
                other
            ))),
        }
    }
}

/// Wizard options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupOptions {
    /// Treatment of request errors during validation
    pub validation_policy: ValidationPolicy,
    /// Whether the credentials form offers an API secret field
    pub offer_secret: bool,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            validation_policy: ValidationPolicy::default(),
            offer_secret: true,
        }
    }
}

/// Wizard step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Credentials,
    Tracking,
}

impl SetupStep {
    /// Step identifier
    pub fn step_id(&self) -> &'static str {
        match self {
            SetupStep::Credentials => "user",
            SetupStep::Tracking => "tracking",
        }
    }
}

/// Form-level error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormError {
    InvalidAuth,
    InvalidPollInterval,
    MissingTrackingNumbers,
    CannotConnect,
    Unknown,
}

impl FormError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            FormError::InvalidAuth => "invalid_auth",
            FormError::InvalidPollInterval => "invalid_poll_interval",
            FormError::MissingTrackingNumbers => "missing_tracking_numbers",
            FormError::CannotConnect => "cannot_connect",
            FormError::Unknown => "unknown",
        }
    }

    /// Message shown to the user
    pub fn message(&self) -> &'static str {
        match self {
            FormError::InvalidAuth => "Invalid API credentials.",
            FormError::InvalidPollInterval => "Poll interval must be between 5 and 720 minutes.",
            FormError::MissingTrackingNumbers => "Enter at least one tracking number.",
            FormError::CannotConnect => "Could not reach the tracking API.",
            FormError::Unknown => "Unexpected error.",
        }
    }
}

/// Why the wizard aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The same set of tracking numbers is already configured
    AlreadyConfigured,
}

impl AbortReason {
    pub fn code(&self) -> &'static str {
        match self {
            AbortReason::AlreadyConfigured => "already_configured",
        }
    }
}

/// Kind of a form field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer { min: u32, max: u32 },
    Multiline,
}

/// A field of a wizard form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<String>,
}

/// Input of the credentials step
#[derive(Debug, Clone, Default)]
pub struct CredentialsInput {
    pub api_key: String,
    pub api_secret: Option<String>,
    /// `None` selects the default interval
    pub poll_interval_minutes: Option<u32>,
}

/// Input of the tracking step
#[derive(Debug, Clone, Default)]
pub struct TrackingInput {
    /// Comma- or newline-separated tracking numbers
    pub tracking_numbers: String,
}

/// What the wizard wants to happen next
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Show (or re-show) a form
    Form {
        step: SetupStep,
        fields: Vec<FormField>,
        error: Option<FormError>,
    },
    /// An entry was created and persisted
    Created(ConfigEntry),
    /// The wizard stopped without creating anything
    Aborted(AbortReason),
}

/// Split free text into tracking numbers
///
/// Commas and newlines both separate; every part is trimmed and empty parts
/// are dropped. Order is preserved.
pub fn parse_tracking_numbers(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Two-step setup wizard
///
/// The factory and the store are injected; the wizard never reaches for
/// process-wide state.
pub struct SetupFlow {
    factory: Arc<dyn ShipmentSourceFactory>,
    store: Arc<dyn ConfigStore>,
    options: SetupOptions,
    step: SetupStep,
    credentials: Option<(Credentials, u32)>,
}

impl SetupFlow {
    /// Create a new wizard positioned on the credentials step
    pub fn new(
        factory: Arc<dyn ShipmentSourceFactory>,
        store: Arc<dyn ConfigStore>,
        options: SetupOptions,
    ) -> Self {
        Self {
            factory,
            store,
            options,
            step: SetupStep::Credentials,
            credentials: None,
        }
    }

    /// Current step
    pub fn step(&self) -> SetupStep {
        self.step
    }

    /// Wizard options
    pub fn options(&self) -> SetupOptions {
        self.options
    }

    /// The form for the current step
    pub fn start(&self) -> StepOutcome {
        self.form(self.step, None)
    }

    /// Submit the credentials step
    pub fn submit_credentials(&mut self, input: CredentialsInput) -> StepOutcome {
        let api_key = input.api_key.trim().to_string();
        if api_key.is_empty() {
            return self.form(SetupStep::Credentials, Some(FormError::InvalidAuth));
        }

        let api_secret = if self.options.offer_secret {
            input
                .api_secret
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        } else {
            None
        };

        let poll_interval = input
            .poll_interval_minutes
            .unwrap_or(DEFAULT_POLL_INTERVAL_MINUTES);
        if validate_poll_interval(poll_interval).is_err() {
            return self.form(SetupStep::Credentials, Some(FormError::InvalidPollInterval));
        }

        debug!(
            "Credentials accepted (secret: {}, interval: {} min)",
            api_secret.is_some(),
            poll_interval
        );
        self.credentials = Some((Credentials::new(api_key, api_secret), poll_interval));
        self.step = SetupStep::Tracking;
        self.form(SetupStep::Tracking, None)
    }

    /// Submit the tracking step
    ///
    /// Validates the credentials with one fetch of the first tracking number,
    /// then persists the entry unless its identity is already configured.
    pub async fn submit_tracking(&mut self, input: TrackingInput) -> StepOutcome {
        let Some((credentials, poll_interval)) = self.credentials.clone() else {
            self.step = SetupStep::Credentials;
            return self.form(SetupStep::Credentials, None);
        };

        let tracking_numbers = parse_tracking_numbers(&input.tracking_numbers);
        let Some(first) = tracking_numbers.first() else {
            return self.form(SetupStep::Tracking, Some(FormError::MissingTrackingNumbers));
        };

        if let Err(form_error) = self.validate(&credentials, first).await {
            return self.form(SetupStep::Tracking, Some(form_error));
        }

        let unique_id = unique_id_for(&tracking_numbers);
        match self.store.contains(&unique_id).await {
            Ok(true) => {
                info!("Tracking numbers already configured: {}", unique_id);
                return StepOutcome::Aborted(AbortReason::AlreadyConfigured);
            }
            Ok(false) => {}
            Err(e) => {
                error!("Failed to query config store: {}", e);
                return self.form(SetupStep::Tracking, Some(FormError::Unknown));
            }
        }

        let config = TrackerConfig::new(credentials, tracking_numbers, poll_interval);
        if let Err(e) = config.validate() {
            error!("Refusing to persist invalid configuration: {}", e);
            return self.form(SetupStep::Tracking, Some(FormError::Unknown));
        }

        let entry = ConfigEntry::new(config);
        if let Err(e) = self.store.insert(entry.clone()).await {
            // Another flow may have stored the same identity in the meantime
            if self.store.contains(&entry.unique_id).await.unwrap_or(false) {
                info!("Entry configured concurrently: {}", e);
                return StepOutcome::Aborted(AbortReason::AlreadyConfigured);
            }
            error!("Failed to persist config entry: {}", e);
            return self.form(SetupStep::Tracking, Some(FormError::Unknown));
        }

        info!("Created config entry {} ({})", entry.unique_id, entry.title);
        StepOutcome::Created(entry)
    }

    /// One validation fetch, mapped to a form error
    async fn validate(&self, credentials: &Credentials, tracking_number: &str) -> Result<(), FormError> {
        let source = match self.factory.create(credentials) {
            Ok(source) => source,
            Err(e) => {
                error!("Failed to create shipment source: {}", e);
                return Err(FormError::Unknown);
            }
        };

        match source.fetch(tracking_number).await {
            Ok(_) => Ok(()),
            Err(Error::Authentication(msg)) => {
                warn!("Validation rejected credentials: {}", msg);
                Err(FormError::InvalidAuth)
            }
            Err(e @ Error::Request { .. }) => match self.options.validation_policy {
                ValidationPolicy::Lenient => {
                    warn!("Ignoring validation error for {}: {}", tracking_number, e);
                    Ok(())
                }
                ValidationPolicy::Strict => {
                    warn!("Validation failed for {}: {}", tracking_number, e);
                    Err(FormError::CannotConnect)
                }
            },
            Err(e) => {
                error!("Unexpected validation error for {}: {}", tracking_number, e);
                Err(FormError::Unknown)
            }
        }
    }

    fn form(&self, step: SetupStep, error: Option<FormError>) -> StepOutcome {
        StepOutcome::Form {
            step,
            fields: self.fields(step),
            error,
        }
    }

    fn fields(&self, step: SetupStep) -> Vec<FormField> {
        match step {
            SetupStep::Credentials => {
                let mut fields = vec![FormField {
                    name: FIELD_API_KEY,
                    kind: FieldKind::Text,
                    required: true,
                    default: None,
                }];
                if self.options.offer_secret {
                    fields.push(FormField {
                        name: FIELD_API_SECRET,
                        kind: FieldKind::Text,
                        required: false,
                        default: None,
                    });
                }
                fields.push(FormField {
                    name: FIELD_POLL_INTERVAL,
                    kind: FieldKind::Integer {
                        min: MIN_POLL_INTERVAL_MINUTES,
                        max: MAX_POLL_INTERVAL_MINUTES,
                    },
                    required: false,
                    default: Some(DEFAULT_POLL_INTERVAL_MINUTES.to_string()),
                });
                fields
            }
            SetupStep::Tracking => vec![FormField {
                name: FIELD_TRACKING_NUMBERS,
                kind: FieldKind::Multiline,
                required: true,
                default: None,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_separators() {
        assert_eq!(
            parse_tracking_numbers("123, 456\n789"),
            vec!["123", "456", "789"]
        );
    }

    #[test]
    fn test_parse_only_separators() {
        assert!(parse_tracking_numbers("  ,  \n").is_empty());
        assert!(parse_tracking_numbers("").is_empty());
    }

    #[test]
    fn test_parse_windows_newlines() {
        assert_eq!(parse_tracking_numbers("1\r\n2\r\n"), vec!["1", "2"]);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("strict".parse::<ValidationPolicy>().unwrap(), ValidationPolicy::Strict);
        assert_eq!("Lenient".parse::<ValidationPolicy>().unwrap(), ValidationPolicy::Lenient);
        assert!("sometimes".parse::<ValidationPolicy>().is_err());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(FormError::InvalidAuth.code(), "invalid_auth");
        assert_eq!(FormError::MissingTrackingNumbers.code(), "missing_tracking_numbers");
        assert_eq!(FormError::CannotConnect.code(), "cannot_connect");
        assert_eq!(FormError::Unknown.code(), "unknown");
        assert_eq!(AbortReason::AlreadyConfigured.code(), "already_configured");
        assert_eq!(SetupStep::Credentials.step_id(), "user");
    }
}
