//! Dynamic attribute bridge: attribute reads and writes in terms of
//! register transactions.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bus::{BusFacade, BusFault};
use crate::catalog::AccessMode;
use crate::descriptor::{AttributeDescriptor, AttributeRecord, RegisterAddress, within};
use crate::marshal::{self, MarshalError};
use crate::registry::{BatchError, Registry, RegistryError};
use crate::value::ScalarValue;

/// Direction of an attribute access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Read => "read",
            Operation::Write => "write",
        })
    }
}

/// Errors returned by attribute reads and writes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("attribute '{attribute}': {source}")]
    Marshal {
        attribute: String,
        #[source]
        source: MarshalError,
    },

    #[error("attribute '{attribute}' is {access}, {operation} denied")]
    AccessDenied {
        attribute: String,
        access: AccessMode,
        operation: Operation,
    },

    #[error(
        "attribute '{attribute}': value {value} outside [{}, {}]",
        fmt_bound(.min, "-inf"),
        fmt_bound(.max, "+inf")
    )]
    ValueOutOfBounds {
        attribute: String,
        value: ScalarValue,
        min: Option<f64>,
        max: Option<f64>,
    },

    #[error("attribute '{attribute}' at {register}: {source}")]
    Bus {
        attribute: String,
        register: RegisterAddress,
        #[source]
        source: BusFault,
    },
}

fn fmt_bound(bound: &Option<f64>, open: &str) -> String {
    bound.map_or_else(|| open.to_string(), |b| b.to_string())
}

impl BridgeError {
    /// Stable identifier of the error class, for replies to remote callers.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Registry(e) => e.kind(),
            BridgeError::Marshal { source, .. } => source.kind(),
            BridgeError::AccessDenied { .. } => "access_denied",
            BridgeError::ValueOutOfBounds { .. } => "value_out_of_bounds",
            BridgeError::Bus { .. } => "bus_error",
        }
    }
}

/// Alarm state of a value relative to its descriptor's thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Valid,
    Warning,
    Alarm,
}

impl Quality {
    /// Alarm thresholds win over warning thresholds.
    pub fn evaluate(descriptor: &AttributeDescriptor, value: &ScalarValue) -> Self {
        let Some(v) = value.as_f64() else {
            return Quality::Valid;
        };

        let has_alarm = descriptor.min_alarm.is_some() || descriptor.max_alarm.is_some();
        let has_warning = descriptor.min_warning.is_some() || descriptor.max_warning.is_some();

        if has_alarm && !within(v, descriptor.min_alarm, descriptor.max_alarm) {
            Quality::Alarm
        } else if has_warning && !within(v, descriptor.min_warning, descriptor.max_warning) {
            Quality::Warning
        } else {
            Quality::Valid
        }
    }
}

/// A decoded value with its quality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeReading {
    pub attribute: String,
    pub value: ScalarValue,
    pub quality: Quality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Unix epoch milliseconds when the register was read.
    pub timestamp: i64,
}

/// Exposes the registers of one bus as named attributes.
#[derive(Debug)]
pub struct AttributeBridge<B> {
    registry: Arc<Registry>,
    bus: Arc<B>,
}

impl<B> Clone for AttributeBridge<B> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<B: BusFacade> AttributeBridge<B> {
    /// Create a bridge with an empty registry.
    pub fn new(bus: Arc<B>) -> Self {
        Self::with_registry(Arc::new(Registry::new()), bus)
    }

    /// Create a bridge over an existing registry.
    pub fn with_registry(registry: Arc<Registry>, bus: Arc<B>) -> Self {
        Self { registry, bus }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    pub fn register_attribute(
        &self,
        descriptor: AttributeDescriptor,
    ) -> Result<Arc<AttributeDescriptor>, RegistryError> {
        self.registry.register(descriptor)
    }

    pub fn register_batch<I>(&self, descriptors: I) -> Result<usize, BatchError>
    where
        I: IntoIterator<Item = AttributeDescriptor>,
    {
        self.registry.register_batch(descriptors)
    }

    pub fn register_records<I>(&self, records: I) -> Result<usize, BatchError>
    where
        I: IntoIterator<Item = AttributeRecord>,
    {
        self.registry.register_records(records)
    }

    pub fn describe(&self, name: &str) -> Result<Arc<AttributeDescriptor>, BridgeError> {
        Ok(self.registry.lookup(name)?)
    }

    /// All registered attributes, sorted by name.
    pub fn attributes(&self) -> Vec<Arc<AttributeDescriptor>> {
        self.registry.descriptors()
    }

    /// Read and decode the attribute's register.
    pub async fn read_attribute(&self, name: &str) -> Result<ScalarValue, BridgeError> {
        let descriptor = self.registry.lookup(name)?;
        self.read_descriptor(&descriptor).await
    }

    /// Read the attribute and evaluate its alarm/warning thresholds.
    pub async fn read_with_quality(&self, name: &str) -> Result<AttributeReading, BridgeError> {
        let descriptor = self.registry.lookup(name)?;
        let value = self.read_descriptor(&descriptor).await?;
        let quality = Quality::evaluate(&descriptor, &value);

        if quality != Quality::Valid {
            warn!(attribute = %name, value = %value, quality = ?quality, "Attribute outside thresholds");
        }

        Ok(AttributeReading {
            attribute: descriptor.name.clone(),
            value,
            quality,
            unit: descriptor.unit.clone(),
            timestamp: crate::current_timestamp_millis(),
        })
    }

    /// Validate, encode and write a value to the attribute's register.
    pub async fn write_attribute(&self, name: &str, value: ScalarValue) -> Result<(), BridgeError> {
        let descriptor = self.registry.lookup(name)?;

        if !descriptor.access.is_writable() {
            return Err(BridgeError::AccessDenied {
                attribute: descriptor.name.clone(),
                access: descriptor.access,
                operation: Operation::Write,
            });
        }

        // Text has no numeric view and is rejected by the encoder instead.
        if let Some(v) = value.as_f64() {
            if !descriptor.in_bounds(v) {
                return Err(BridgeError::ValueOutOfBounds {
                    attribute: descriptor.name.clone(),
                    value,
                    min: descriptor.min_value,
                    max: descriptor.max_value,
                });
            }
        }

        let bytes = marshal::encode(&value, descriptor.kind).map_err(|source| {
            BridgeError::Marshal {
                attribute: descriptor.name.clone(),
                source,
            }
        })?;

        self.bus
            .write_raw(descriptor.register, &bytes)
            .await
            .map_err(|source| BridgeError::Bus {
                attribute: descriptor.name.clone(),
                register: descriptor.register,
                source,
            })?;

        debug!(
            attribute = %descriptor.name,
            register = %descriptor.register,
            value = %value,
            bytes = ?bytes,
            "Wrote attribute"
        );

        Ok(())
    }

    async fn read_descriptor(
        &self,
        descriptor: &AttributeDescriptor,
    ) -> Result<ScalarValue, BridgeError> {
        if !descriptor.access.is_readable() {
            return Err(BridgeError::AccessDenied {
                attribute: descriptor.name.clone(),
                access: descriptor.access,
                operation: Operation::Read,
            });
        }

        let bytes = self
            .bus
            .read_raw(descriptor.register, descriptor.kind.byte_width())
            .await
            .map_err(|source| BridgeError::Bus {
                attribute: descriptor.name.clone(),
                register: descriptor.register,
                source,
            })?;

        let value =
            marshal::decode(&bytes, descriptor.kind).map_err(|source| BridgeError::Marshal {
                attribute: descriptor.name.clone(),
                source,
            })?;

        debug!(
            attribute = %descriptor.name,
            register = %descriptor.register,
            value = %value,
            "Read attribute"
        );

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusFaultKind;
    use crate::catalog::ScalarKind;
    use crate::simulated::SimulatedBus;

    fn bridge() -> AttributeBridge<SimulatedBus> {
        AttributeBridge::new(Arc::new(SimulatedBus::new()))
    }

    #[tokio::test]
    async fn test_write_only_cannot_be_read() {
        let bridge = bridge();
        bridge
            .register_attribute(
                AttributeDescriptor::new("setpoint", 0x7000, ScalarKind::Uint16)
                    .with_access(AccessMode::WriteOnly),
            )
            .unwrap();

        let err = bridge.read_attribute("setpoint").await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::AccessDenied {
                operation: Operation::Read,
                ..
            }
        ));
        assert_eq!(err.kind(), "access_denied");
        assert_eq!(bridge.bus().transactions(), 0);

        bridge
            .write_attribute("setpoint", ScalarValue::UInt(500))
            .await
            .unwrap();
        assert_eq!(bridge.bus().writes(), 1);
    }

    #[tokio::test]
    async fn test_read_only_cannot_be_written() {
        let bridge = bridge();
        bridge
            .register_attribute(
                AttributeDescriptor::new("status", 0x6041, ScalarKind::Uint16)
                    .with_access(AccessMode::ReadOnly),
            )
            .unwrap();

        let err = bridge
            .write_attribute("status", ScalarValue::UInt(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::AccessDenied {
                operation: Operation::Write,
                ..
            }
        ));
        assert_eq!(bridge.bus().transactions(), 0);
    }

    #[tokio::test]
    async fn test_read_with_write_is_both() {
        let bridge = bridge();
        bridge
            .register_attribute(
                AttributeDescriptor::new("mode", 0x6060, ScalarKind::Int8)
                    .with_access(AccessMode::ReadWithWrite),
            )
            .unwrap();

        bridge
            .write_attribute("mode", ScalarValue::Int(-3))
            .await
            .unwrap();
        assert_eq!(
            bridge.read_attribute("mode").await.unwrap(),
            ScalarValue::Int(-3)
        );
    }

    #[tokio::test]
    async fn test_bus_fault_propagates() {
        let bridge = bridge();
        bridge
            .register_attribute(AttributeDescriptor::new("temp", 0x6000, ScalarKind::Int16))
            .unwrap();
        bridge.bus().fail_next(BusFault::timeout("no SDO response"));

        let err = bridge.read_attribute("temp").await.unwrap_err();
        match &err {
            BridgeError::Bus {
                attribute, source, ..
            } => {
                assert_eq!(attribute, "temp");
                assert_eq!(source.kind, BusFaultKind::Timeout);
            }
            other => panic!("expected bus error, got {:?}", other),
        }
        assert_eq!(err.kind(), "bus_error");
        assert!(err.to_string().contains("0x6000:0"));
    }

    #[tokio::test]
    async fn test_truncated_register_image() {
        let bridge = bridge();
        bridge
            .register_attribute(AttributeDescriptor::new("count", 0x6100, ScalarKind::Uint32))
            .unwrap();
        bridge.bus().set(RegisterAddress::new(0x6100, 0), vec![0x01, 0x02]);

        let err = bridge.read_attribute("count").await.unwrap_err();
        assert_eq!(err.kind(), "truncated_buffer");
    }

    #[tokio::test]
    async fn test_text_value_is_type_mismatch() {
        let bridge = bridge();
        bridge
            .register_attribute(
                AttributeDescriptor::new("temp", 0x6000, ScalarKind::Int16)
                    .with_bounds(Some(-400.0), Some(1500.0)),
            )
            .unwrap();

        let err = bridge
            .write_attribute("temp", ScalarValue::from("warm"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "type_mismatch");
        assert_eq!(bridge.bus().transactions(), 0);
    }

    #[tokio::test]
    async fn test_unbounded_value_outside_width() {
        let bridge = bridge();
        bridge
            .register_attribute(AttributeDescriptor::new("offset", 0x6070, ScalarKind::Int8))
            .unwrap();

        let err = bridge
            .write_attribute("offset", ScalarValue::Int(300))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Marshal {
                source: MarshalError::ValueOutOfRange { .. },
                ..
            }
        ));
        assert_eq!(err.kind(), "value_out_of_range");
        assert_eq!(bridge.bus().transactions(), 0);
    }

    #[tokio::test]
    async fn test_quality_thresholds() {
        let bridge = bridge();
        bridge
            .register_attribute(
                AttributeDescriptor::new("temp", 0x6000, ScalarKind::Int16)
                    .with_alarm_range(Some(-300.0), Some(1200.0))
                    .with_warning_range(None, Some(1000.0))
                    .with_unit("0.1 C"),
            )
            .unwrap();
        let address = RegisterAddress::new(0x6000, 0);

        bridge.bus().set(address, 900i16.to_le_bytes());
        let reading = bridge.read_with_quality("temp").await.unwrap();
        assert_eq!(reading.quality, Quality::Valid);
        assert_eq!(reading.unit.as_deref(), Some("0.1 C"));

        bridge.bus().set(address, 1100i16.to_le_bytes());
        let reading = bridge.read_with_quality("temp").await.unwrap();
        assert_eq!(reading.quality, Quality::Warning);

        bridge.bus().set(address, (-301i16).to_le_bytes());
        let reading = bridge.read_with_quality("temp").await.unwrap();
        assert_eq!(reading.quality, Quality::Alarm);
    }

    #[test]
    fn test_out_of_bounds_message() {
        let err = BridgeError::ValueOutOfBounds {
            attribute: "temp".to_string(),
            value: ScalarValue::Int(2000),
            min: Some(-400.0),
            max: None,
        };
        assert_eq!(
            err.to_string(),
            "attribute 'temp': value 2000 outside [-400, +inf]"
        );
    }

    #[test]
    fn test_bridge_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AttributeBridge<SimulatedBus>>();
    }
}
