//! Test doubles shared by the contract tests
//!
//! The scripted source answers from a table that tests can change between
//! cycles, and records every tracking number it was asked for.

#![allow(dead_code)]

use parcel_core::config::{Credentials, TrackerConfig};
use parcel_core::error::{Error, Result};
use parcel_core::traits::{ShipmentSource, ShipmentSourceFactory, TrackingResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted reply for one tracking number
#[derive(Debug, Clone)]
pub enum Reply {
    Shipment(serde_json::Value),
    AuthError,
    RequestError(u16),
    Unexpected,
}

impl Reply {
    fn into_result(self, tracking_number: &str) -> Result<TrackingResult> {
        match self {
            Reply::Shipment(raw) => Ok(TrackingResult::new(tracking_number, raw)),
            Reply::AuthError => Err(Error::auth("Invalid API key")),
            Reply::RequestError(status) => Err(Error::request(status, "scripted failure")),
            Reply::Unexpected => Err(Error::unexpected("connection reset")),
        }
    }
}

/// A ShipmentSource answering from a shared table
#[derive(Clone, Default)]
pub struct ScriptedSource {
    replies: Arc<Mutex<HashMap<String, Reply>>>,
    calls: Arc<Mutex<Vec<String>>>,
    delay: Arc<Mutex<Duration>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reply for a tracking number
    pub fn set(&self, tracking_number: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(tracking_number.to_string(), reply);
    }

    /// Reply with a minimal shipment record carrying the given status
    pub fn set_status(&self, tracking_number: &str, status: &str) {
        self.set(
            tracking_number,
            Reply::Shipment(serde_json::json!({
                "id": tracking_number,
                "status": {"status": status},
            })),
        );
    }

    /// Tracking numbers requested so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every fetch take at least `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait::async_trait]
impl ShipmentSource for ScriptedSource {
    async fn fetch(&self, tracking_number: &str) -> Result<TrackingResult> {
        self.calls.lock().unwrap().push(tracking_number.to_string());

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(tracking_number)
            .cloned()
            .unwrap_or(Reply::RequestError(404));
        reply.into_result(tracking_number)
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// Factory handing out clones of one scripted source, recording credentials
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    pub source: ScriptedSource,
    credentials: Arc<Mutex<Vec<Credentials>>>,
}

impl ScriptedFactory {
    pub fn new(source: ScriptedSource) -> Self {
        Self {
            source,
            credentials: Arc::default(),
        }
    }

    /// Credentials passed to create(), in order
    pub fn credentials(&self) -> Vec<Credentials> {
        self.credentials.lock().unwrap().clone()
    }
}

impl ShipmentSourceFactory for ScriptedFactory {
    fn create(&self, credentials: &Credentials) -> Result<Box<dyn ShipmentSource>> {
        self.credentials.lock().unwrap().push(credentials.clone());
        Ok(Box::new(self.source.clone()))
    }
}

/// Configuration for the given numbers with the default interval
pub fn config_for(numbers: &[&str]) -> TrackerConfig {
    TrackerConfig::new(
        Credentials::new("test-key", None),
        numbers.iter().map(|s| s.to_string()).collect(),
        30,
    )
}
