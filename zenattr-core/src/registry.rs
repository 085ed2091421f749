//! Attribute registry: the name → descriptor table shared by all callers.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::descriptor::{AttributeDescriptor, AttributeRecord, RecordError};

/// Registry-level errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("attribute '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("attribute '{name}': {field} range is invalid (min {min}, max {max})")]
    InvalidBounds {
        name: String,
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("invalid attribute name '{name}': must be non-empty without '/', '*', '$', '?' or '#'")]
    InvalidName { name: String },
}

impl RegistryError {
    /// Stable identifier of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::DuplicateName { .. } => "duplicate_name",
            RegistryError::InvalidBounds { .. } => "invalid_bounds",
            RegistryError::UnknownAttribute { .. } => "unknown_attribute",
            RegistryError::InvalidName { .. } => "invalid_name",
        }
    }
}

/// Why a single entry of a batch could not be registered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RegistrationError {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationError::Record(e) => e.kind(),
            RegistrationError::Registry(e) => e.kind(),
        }
    }
}

/// A batch registration stopped at entry `index`.
///
/// Entries before `index` stay registered.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("batch entry {index} ('{name}') rejected after {registered} registered: {source}")]
pub struct BatchError {
    pub index: usize,
    pub name: String,
    pub registered: usize,
    #[source]
    pub source: RegistrationError,
}

/// Runtime name → descriptor mapping.
///
/// Grows only; lookups take a shared lock and return a cheap handle.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, Arc<AttributeDescriptor>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor. Visible to lookups as soon as this returns.
    pub fn register(
        &self,
        descriptor: AttributeDescriptor,
    ) -> Result<Arc<AttributeDescriptor>, RegistryError> {
        validate(&descriptor)?;

        let mut entries = self.entries.write();
        match entries.entry(descriptor.name.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateName {
                name: descriptor.name,
            }),
            Entry::Vacant(slot) => {
                let descriptor = Arc::new(descriptor);
                slot.insert(descriptor.clone());
                tracing::info!(
                    attribute = %descriptor.name,
                    register = %descriptor.register,
                    data_type = %descriptor.kind,
                    access = %descriptor.access,
                    "Registered attribute"
                );
                Ok(descriptor)
            }
        }
    }

    /// Register descriptors in order, stopping at the first failure.
    ///
    /// Returns the number registered.
    pub fn register_batch<I>(&self, descriptors: I) -> Result<usize, BatchError>
    where
        I: IntoIterator<Item = AttributeDescriptor>,
    {
        let mut registered = 0;
        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let name = descriptor.name.clone();
            self.register(descriptor).map_err(|e| BatchError {
                index,
                name,
                registered,
                source: e.into(),
            })?;
            registered += 1;
        }
        Ok(registered)
    }

    /// Resolve and register records in order, stopping at the first failure.
    ///
    /// Same best-effort policy as [`register_batch`](Self::register_batch):
    /// earlier records stay registered.
    pub fn register_records<I>(&self, records: I) -> Result<usize, BatchError>
    where
        I: IntoIterator<Item = AttributeRecord>,
    {
        let mut registered = 0;
        for (index, record) in records.into_iter().enumerate() {
            let name = record.name.clone();
            let fail = |source: RegistrationError| BatchError {
                index,
                name: name.clone(),
                registered,
                source,
            };

            let descriptor = record.into_descriptor().map_err(|e| fail(e.into()))?;
            self.register(descriptor).map_err(|e| fail(e.into()))?;
            registered += 1;
        }
        Ok(registered)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<AttributeDescriptor>, RegistryError> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownAttribute {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered descriptors, sorted by name.
    pub fn descriptors(&self) -> Vec<Arc<AttributeDescriptor>> {
        let mut descriptors: Vec<_> = self.entries.read().values().cloned().collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }
}

/// Characters that cannot appear inside a single key expression chunk.
pub const RESERVED_CHARS: &[char] = &['/', '*', '$', '?', '#'];

/// Whether `name` can be used as a single key expression chunk.
///
/// Attribute names must pass so that each one maps onto exactly one key.
pub fn is_valid_chunk(name: &str) -> bool {
    !name.is_empty() && !name.contains(RESERVED_CHARS)
}

fn validate(descriptor: &AttributeDescriptor) -> Result<(), RegistryError> {
    if !is_valid_chunk(&descriptor.name) {
        return Err(RegistryError::InvalidName {
            name: descriptor.name.clone(),
        });
    }

    let ranges = [
        ("value", descriptor.min_value, descriptor.max_value),
        ("alarm", descriptor.min_alarm, descriptor.max_alarm),
        ("warning", descriptor.min_warning, descriptor.max_warning),
    ];
    for (field, min, max) in ranges {
        // Written so that a NaN on either side fails.
        let ordered = match (min, max) {
            (Some(min), Some(max)) => min <= max,
            (Some(bound), None) | (None, Some(bound)) => !bound.is_nan(),
            (None, None) => true,
        };
        if !ordered {
            return Err(RegistryError::InvalidBounds {
                name: descriptor.name.clone(),
                field,
                min: min.unwrap_or(f64::NEG_INFINITY),
                max: max.unwrap_or(f64::INFINITY),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ScalarKind;

    fn temp() -> AttributeDescriptor {
        AttributeDescriptor::new("temp", 0x6000, ScalarKind::Int16)
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = Registry::new();
        assert!(registry.is_empty());

        registry.register(temp()).unwrap();

        let found = registry.lookup("temp").unwrap();
        assert_eq!(found.kind, ScalarKind::Int16);
        assert!(registry.contains("temp"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let registry = Registry::new();
        registry.register(temp()).unwrap();

        let err = registry
            .register(AttributeDescriptor::new("temp", 0x7000, ScalarKind::Uint8))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateName {
                name: "temp".to_string()
            }
        );

        let found = registry.lookup("temp").unwrap();
        assert_eq!(found.register.index, 0x6000);
        assert_eq!(found.kind, ScalarKind::Int16);
    }

    #[test]
    fn test_inverted_bounds() {
        let registry = Registry::new();
        let err = registry
            .register(temp().with_bounds(Some(10.0), Some(5.0)))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidBounds { field: "value", .. }
        ));
        assert!(!registry.contains("temp"));
    }

    #[test]
    fn test_equal_bounds_allowed() {
        let registry = Registry::new();
        registry
            .register(temp().with_bounds(Some(5.0), Some(5.0)))
            .unwrap();
    }

    #[test]
    fn test_nan_bounds_rejected() {
        let registry = Registry::new();
        let err = registry
            .register(temp().with_bounds(Some(f64::NAN), Some(1500.0)))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidBounds { field: "value", .. }
        ));

        let err = registry
            .register(temp().with_warning_range(None, Some(f64::NAN)))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidBounds { field: "warning", .. }
        ));
        assert!(!registry.contains("temp"));
    }

    #[test]
    fn test_inverted_alarm_range() {
        let registry = Registry::new();
        let err = registry
            .register(temp().with_alarm_range(Some(100.0), Some(0.0)))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidBounds { field: "alarm", .. }
        ));
    }

    #[test]
    fn test_invalid_names() {
        let registry = Registry::new();
        for name in ["", "a/b", "speed*"] {
            let err = registry
                .register(AttributeDescriptor::new(name, 1, ScalarKind::Bool))
                .unwrap_err();
            assert!(matches!(err, RegistryError::InvalidName { .. }), "{}", name);
        }
    }

    #[test]
    fn test_valid_chunk() {
        assert!(is_valid_chunk("motor_speed"));
        assert!(!is_valid_chunk(""));
        assert!(!is_valid_chunk("a/b"));
        assert!(!is_valid_chunk("speed*"));
        assert!(!is_valid_chunk("$x"));
    }

    #[test]
    fn test_unknown_attribute() {
        let registry = Registry::new();
        assert_eq!(
            registry.lookup("missing").unwrap_err(),
            RegistryError::UnknownAttribute {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_batch_stops_and_keeps_prior() {
        let registry = Registry::new();
        let batch = vec![
            AttributeDescriptor::new("a", 1, ScalarKind::Int8),
            AttributeDescriptor::new("b", 2, ScalarKind::Int8),
            AttributeDescriptor::new("a", 3, ScalarKind::Int8),
            AttributeDescriptor::new("c", 4, ScalarKind::Int8),
        ];

        let err = registry.register_batch(batch).unwrap_err();
        assert_eq!(err.index, 2);
        assert_eq!(err.name, "a");
        assert_eq!(err.registered, 2);
        assert!(matches!(
            err.source,
            RegistrationError::Registry(RegistryError::DuplicateName { .. })
        ));

        assert_eq!(registry.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_records_batch() {
        let registry = Registry::new();
        let records: Vec<AttributeRecord> = json5::from_str(
            r#"[
                { name: "temp", register: "0x6000", data_type: "int16" },
                { name: "raw", register: "0x6002" },
                { name: "flag", register: "0x6001", data_type: "bool" },
            ]"#,
        )
        .unwrap();

        let err = registry.register_records(records).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.name, "raw");
        assert!(matches!(
            err.source,
            RegistrationError::Record(RecordError::MissingDataType { .. })
        ));
        assert_eq!(registry.names(), vec!["temp"]);
    }

    #[test]
    fn test_descriptors_sorted() {
        let registry = Registry::new();
        registry
            .register_batch([
                AttributeDescriptor::new("zeta", 1, ScalarKind::Int8),
                AttributeDescriptor::new("alpha", 2, ScalarKind::Int8),
            ])
            .unwrap();

        let names: Vec<_> = registry
            .descriptors()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_concurrent_lookups() {
        let registry = Arc::new(Registry::new());
        registry.register(temp()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry
                        .register(AttributeDescriptor::new(
                            format!("attr{}", i),
                            i as u16,
                            ScalarKind::Uint8,
                        ))
                        .unwrap();
                    registry.lookup("temp").unwrap().register.index
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 0x6000);
        }
        assert_eq!(registry.len(), 9);
    }
}
