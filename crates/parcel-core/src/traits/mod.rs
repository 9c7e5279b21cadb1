//! Core traits for the parcel tracker
//!
//! - [`ShipmentSource`]: Fetch one shipment record from a provider
//! - [`ShipmentSourceFactory`]: Build a source from credentials
//! - [`ConfigStore`]: Persist configuration entries by unique identity

pub mod shipment_source;
pub mod config_store;

pub use shipment_source::{ShipmentSource, ShipmentSourceFactory, TrackingResult};
pub use config_store::ConfigStore;
