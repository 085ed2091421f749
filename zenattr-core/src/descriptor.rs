//! Attribute descriptors and the registration records they are built from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::catalog::{AccessMode, CatalogError, ScalarKind};

/// Errors raised while turning a registration record into a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("attribute '{attribute}': data_type is required")]
    MissingDataType { attribute: String },

    #[error("invalid register address '{value}': {reason}")]
    InvalidRegister { value: String, reason: String },

    #[error("attribute '{attribute}': {field} is not a number: '{value}'")]
    InvalidNumber {
        attribute: String,
        field: &'static str,
        value: String,
    },

    #[error("attribute '{attribute}': {source}")]
    Catalog {
        attribute: String,
        #[source]
        source: CatalogError,
    },
}

impl RecordError {
    /// Stable identifier of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::MissingDataType { .. } => "missing_data_type",
            RecordError::InvalidRegister { .. } => "invalid_register",
            RecordError::InvalidNumber { .. } => "invalid_number",
            RecordError::Catalog { source, .. } => source.kind(),
        }
    }
}

/// Bus address of a register: object index plus sub-index.
///
/// Opaque to the bridge; only the bus facade gives it meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "AddressSpec", into = "String")]
pub struct RegisterAddress {
    pub index: u16,
    pub sub_index: u8,
}

impl RegisterAddress {
    pub fn new(index: u16, sub_index: u8) -> Self {
        Self { index, sub_index }
    }
}

impl From<u16> for RegisterAddress {
    fn from(index: u16) -> Self {
        Self::new(index, 0)
    }
}

impl fmt::Display for RegisterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}:{}", self.index, self.sub_index)
    }
}

impl From<RegisterAddress> for String {
    fn from(address: RegisterAddress) -> Self {
        address.to_string()
    }
}

fn parse_number<T: TryFrom<u64>>(text: &str) -> Option<T> {
    let text = text.trim();
    let raw = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => text.parse::<u64>().ok()?,
    };
    T::try_from(raw).ok()
}

impl FromStr for RegisterAddress {
    type Err = RecordError;

    /// Parses `"0x6000"`, `"0x6000:1"`, `"24576"` or `"24576:0x02"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RecordError::InvalidRegister {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (index, sub_index) = match s.split_once(':') {
            Some((index, sub)) => (index, Some(sub)),
            None => (s, None),
        };

        let index = parse_number::<u16>(index)
            .ok_or_else(|| invalid("index must be an integer in 0..=0xFFFF"))?;
        let sub_index = match sub_index {
            Some(sub) => {
                parse_number::<u8>(sub).ok_or_else(|| invalid("sub-index must be in 0..=255"))?
            }
            None => 0,
        };

        Ok(Self { index, sub_index })
    }
}

/// Serialized forms accepted for a register address.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AddressSpec {
    Number(f64),
    Text(String),
}

impl TryFrom<AddressSpec> for RegisterAddress {
    type Error = RecordError;

    fn try_from(spec: AddressSpec) -> Result<Self, Self::Error> {
        match spec {
            AddressSpec::Number(n) if n.fract() == 0.0 && (0.0..=u16::MAX as f64).contains(&n) => {
                Ok(RegisterAddress::from(n as u16))
            }
            AddressSpec::Number(n) => Err(RecordError::InvalidRegister {
                value: n.to_string(),
                reason: "index must be an integer in 0..=0xFFFF".to_string(),
            }),
            AddressSpec::Text(text) => text.parse(),
        }
    }
}

/// Immutable binding of a named attribute to a register.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub register: RegisterAddress,
    #[serde(rename = "data_type")]
    pub kind: ScalarKind,
    pub access: AccessMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_alarm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_alarm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_warning: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_warning: Option<f64>,
}

impl AttributeDescriptor {
    /// Create a descriptor for sub-index 0 of `index`, with the kind's
    /// default access and no bounds.
    pub fn new(name: impl Into<String>, index: u16, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            register: RegisterAddress::from(index),
            kind,
            access: kind.default_access(),
            min_value: None,
            max_value: None,
            unit: None,
            label: None,
            min_alarm: None,
            max_alarm: None,
            min_warning: None,
            max_warning: None,
        }
    }

    pub fn with_sub_index(mut self, sub_index: u8) -> Self {
        self.register.sub_index = sub_index;
        self
    }

    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    /// Set the valid write range. Either side may be open.
    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    pub fn with_alarm_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_alarm = min;
        self.max_alarm = max;
        self
    }

    pub fn with_warning_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_warning = min;
        self.max_warning = max;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Whether `value` lies inside the valid write range.
    pub fn in_bounds(&self, value: f64) -> bool {
        within(value, self.min_value, self.max_value)
    }
}

/// `true` when `value` is inside the (possibly half-open) range.
pub(crate) fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
}

/// Numeric record field: a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberSpec {
    Number(f64),
    Text(String),
}

/// Declarative registration input, as found in configuration files and
/// runtime registration commands.
///
/// Optional text fields treat the empty string as absent.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeRecord {
    pub name: String,
    pub register: RegisterAddress,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub write_type: Option<String>,
    #[serde(default)]
    pub min_value: Option<NumberSpec>,
    #[serde(default)]
    pub max_value: Option<NumberSpec>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub min_alarm: Option<NumberSpec>,
    #[serde(default)]
    pub max_alarm: Option<NumberSpec>,
    #[serde(default)]
    pub min_warning: Option<NumberSpec>,
    #[serde(default)]
    pub max_warning: Option<NumberSpec>,
}

impl AttributeRecord {
    /// Resolve the record against the type catalog.
    ///
    /// `data_type` has no default: a record without one is rejected.
    pub fn into_descriptor(self) -> Result<AttributeDescriptor, RecordError> {
        let name = self.name;

        let data_type = non_empty(self.data_type).ok_or_else(|| RecordError::MissingDataType {
            attribute: name.clone(),
        })?;
        let catalog_err = |source| RecordError::Catalog {
            attribute: name.clone(),
            source,
        };
        let kind = ScalarKind::from_name(&data_type).map_err(catalog_err)?;
        let access = match non_empty(self.write_type) {
            Some(mode) => AccessMode::parse(&mode).map_err(catalog_err)?,
            None => kind.default_access(),
        };

        let number = |field: &'static str, spec: Option<NumberSpec>| -> Result<Option<f64>, RecordError> {
            let invalid = |value: String| RecordError::InvalidNumber {
                attribute: name.clone(),
                field,
                value,
            };
            let value = match spec {
                None => return Ok(None),
                Some(NumberSpec::Number(v)) => v,
                Some(NumberSpec::Text(text)) if text.trim().is_empty() => return Ok(None),
                Some(NumberSpec::Text(text)) => match text.trim().parse::<f64>() {
                    Ok(v) => v,
                    Err(_) => return Err(invalid(text)),
                },
            };
            // Bounds and thresholds must be finite.
            if value.is_finite() {
                Ok(Some(value))
            } else {
                Err(invalid(value.to_string()))
            }
        };

        Ok(AttributeDescriptor {
            register: self.register,
            kind,
            access,
            min_value: number("min_value", self.min_value)?,
            max_value: number("max_value", self.max_value)?,
            unit: non_empty(self.unit),
            label: non_empty(self.label),
            min_alarm: number("min_alarm", self.min_alarm)?,
            max_alarm: number("max_alarm", self.max_alarm)?,
            min_warning: number("min_warning", self.min_warning)?,
            max_warning: number("max_warning", self.max_warning)?,
            name,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
