// # parcel-core
//
// Core library for the parcel tracker.
//
// ## Architecture Overview
//
// - **ShipmentSource**: Trait for fetching one shipment record from a provider
// - **PollCoordinator**: Polls every configured tracking number on a fixed
//   interval and publishes all-or-nothing snapshots
// - **SetupFlow**: Two-step wizard that validates credentials and persists a
//   configuration entry
// - **ShipmentEntity**: Read-only projection of a snapshot into display
//   name, state and attributes
// - **ConfigStore**: Persistence for configuration entries
//
// ## Data Flow
//
// ```text
// SetupFlow ──► ConfigStore ──► PollCoordinator ──► Snapshot ──► ShipmentEntity
//                                     │
//                                     └── owns one ShipmentSource
// ```

pub mod traits;
pub mod coordinator;
pub mod setup;
pub mod projection;
pub mod config;
pub mod error;
pub mod store;

// Re-export core types for convenience
pub use traits::{ConfigStore, ShipmentSource, ShipmentSourceFactory, TrackingResult};
pub use coordinator::{CoordinatorEvent, CoordinatorState, CoordinatorStatus, CycleFailure, PollCoordinator, Snapshot};
pub use setup::{SetupFlow, SetupOptions, StepOutcome, ValidationPolicy};
pub use projection::{EntityState, ShipmentEntity, entities_for};
pub use config::{ConfigEntry, Credentials, TrackerConfig};
pub use error::{Error, Result};
pub use store::{FileConfigStore, MemoryConfigStore};
