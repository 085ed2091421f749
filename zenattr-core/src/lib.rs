//! zenattr core library
//!
//! Maps named, typed attributes onto raw fieldbus registers at runtime:
//!
//! - [`catalog`] - Supported scalar types and access modes
//! - [`value`] - Caller-facing scalar values
//! - [`marshal`] - Little-endian register images to/from values
//! - [`descriptor`] - Attribute descriptors and registration records
//! - [`registry`] - Concurrent name → descriptor table
//! - [`bus`] - Raw register access trait and bus faults
//! - [`simulated`] - In-memory bus for tests and dry runs
//! - [`bridge`] - Attribute reads and writes over a bus
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zenattr_core::{AttributeBridge, AttributeDescriptor, ScalarKind, SimulatedBus};
//!
//! let bridge = AttributeBridge::new(Arc::new(SimulatedBus::new()));
//! bridge.register_attribute(
//!     AttributeDescriptor::new("temp", 0x6000, ScalarKind::Int16)
//!         .with_bounds(Some(-400.0), Some(1500.0)),
//! )?;
//! bridge.write_attribute("temp", 1500.into()).await?;
//! ```

pub mod bridge;
pub mod bus;
pub mod catalog;
pub mod descriptor;
pub mod marshal;
pub mod registry;
pub mod simulated;
pub mod value;

pub use bridge::{AttributeBridge, AttributeReading, BridgeError, Operation, Quality};
pub use bus::{BusFacade, BusFault, BusFaultKind};
pub use catalog::{AccessMode, CatalogError, ScalarKind, TypeDescriptor};
pub use descriptor::{AttributeDescriptor, AttributeRecord, RecordError, RegisterAddress};
pub use marshal::MarshalError;
pub use registry::{BatchError, RegistrationError, Registry, RegistryError, is_valid_chunk};
pub use simulated::SimulatedBus;
pub use value::ScalarValue;

/// Current time in milliseconds since the Unix epoch.
///
/// Returns 0 if the system clock is set before the epoch.
pub fn current_timestamp_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
