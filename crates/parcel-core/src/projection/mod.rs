//! Entity projection
//!
//! Read-only view of a [`Snapshot`]: one [`ShipmentEntity`] per configured
//! tracking number, each deriving a display name, a scalar state and an
//! attribute bag from the raw provider record. Nothing here touches the
//! network; a missing record yields absent fields rather than an error.

use serde::Serialize;
use serde_json::Value;

use crate::config::{DOMAIN, TrackerConfig};
use crate::coordinator::Snapshot;

/// Prefix of every entity display name
pub const NAME_PREFIX: &str = "Shipment";

/// Icon reported for shipment entities
pub const ICON: &str = "mdi:package-variant";

/// Maximum number of events exposed per shipment
pub const MAX_EVENTS: usize = 10;

/// Number of trailing tracking-number characters used in the display name
const NAME_SUFFIX_LEN: usize = 6;

/// One tracked shipment, as registered with the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentEntity {
    tracking_number: String,
    name: String,
    unique_id: String,
}

/// Event history entry reduced to the displayed fields
///
/// Values are passed through as the provider sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub timestamp: Option<Value>,
    pub description: Option<Value>,
    pub status: Option<Value>,
    pub location: Option<Value>,
}

/// Attribute bag of a shipment entity
///
/// Provider fields are passed through unchanged; only `origin` and
/// `destination` are composed (and collapse to absent when empty).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShipmentAttributes {
    pub tracking_number: String,
    pub status_code: Option<Value>,
    pub status_description: Option<Value>,
    pub service: Option<Value>,
    pub estimated_delivery: Option<Value>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub events: Vec<EventSummary>,
}

/// Fully rendered entity state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityState {
    pub unique_id: String,
    pub name: String,
    pub icon: &'static str,
    pub state: Option<String>,
    pub attributes: ShipmentAttributes,
}

impl ShipmentEntity {
    /// Create the entity for a tracking number
    pub fn new(tracking_number: impl Into<String>) -> Self {
        let tracking_number = tracking_number.into();
        let name = format!("{} {}", NAME_PREFIX, name_suffix(&tracking_number));
        let unique_id = format!("{}_{}", DOMAIN, tracking_number);
        Self {
            tracking_number,
            name,
            unique_id,
        }
    }

    pub fn tracking_number(&self) -> &str {
        &self.tracking_number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn icon(&self) -> &'static str {
        ICON
    }

    /// Scalar state: `status.status`, falling back to `status.description`
    pub fn native_value(&self, snapshot: &Snapshot) -> Option<String> {
        let shipment = snapshot.get(&self.tracking_number)?;
        text_at(shipment, "/status/status").or_else(|| text_at(shipment, "/status/description"))
    }

    /// Attribute bag derived from the shipment record
    pub fn attributes(&self, snapshot: &Snapshot) -> ShipmentAttributes {
        let Some(shipment) = snapshot.get(&self.tracking_number) else {
            return ShipmentAttributes {
                tracking_number: self.tracking_number.clone(),
                ..Default::default()
            };
        };

        let events = shipment
            .get("events")
            .and_then(Value::as_array)
            .map(|events| events.iter().take(MAX_EVENTS).map(summarize_event).collect())
            .unwrap_or_default();

        ShipmentAttributes {
            tracking_number: self.tracking_number.clone(),
            status_code: raw_at(shipment, "/status/status"),
            status_description: raw_at(shipment, "/status/description"),
            service: raw_at(shipment, "/service"),
            estimated_delivery: raw_at(shipment, "/estimatedTimeOfDelivery"),
            origin: place(shipment.pointer("/origin/address")),
            destination: place(shipment.pointer("/destination/address")),
            events,
        }
    }

    /// Render name, state and attributes in one go
    pub fn render(&self, snapshot: &Snapshot) -> EntityState {
        EntityState {
            unique_id: self.unique_id.clone(),
            name: self.name.clone(),
            icon: ICON,
            state: self.native_value(snapshot),
            attributes: self.attributes(snapshot),
        }
    }
}

/// Entity descriptors for every tracking number of a configuration
pub fn entities_for(config: &TrackerConfig) -> Vec<ShipmentEntity> {
    config
        .tracking_numbers
        .iter()
        .map(ShipmentEntity::new)
        .collect()
}

fn name_suffix(tracking_number: &str) -> &str {
    let count = tracking_number.chars().count();
    if count <= NAME_SUFFIX_LEN {
        return tracking_number;
    }
    let skip = count - NAME_SUFFIX_LEN;
    match tracking_number.char_indices().nth(skip) {
        Some((idx, _)) => &tracking_number[idx..],
        None => tracking_number,
    }
}

/// Scalar at a JSON pointer, rendered as text; empty strings count as absent
fn text_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Value at a JSON pointer as sent; null counts as absent
fn raw_at(value: &Value, pointer: &str) -> Option<Value> {
    value.pointer(pointer).filter(|v| !v.is_null()).cloned()
}

/// "locality, countryCode" with missing parts dropped
fn place(address: Option<&Value>) -> Option<String> {
    let address = address?;
    let parts: Vec<String> = ["/addressLocality", "/countryCode"]
        .iter()
        .filter_map(|pointer| text_at(address, pointer))
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn summarize_event(event: &Value) -> EventSummary {
    EventSummary {
        timestamp: raw_at(event, "/timestamp"),
        description: raw_at(event, "/description"),
        status: raw_at(event, "/status"),
        location: raw_at(event, "/location/address/addressLocality"),
    }
}
