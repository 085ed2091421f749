//! Type catalog: the closed set of scalar kinds a register can hold.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while resolving catalog identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unsupported data type '{name}', supported are: {supported}")]
    UnsupportedType { name: String, supported: String },

    #[error("unsupported access mode '{name}', supported are: {supported}")]
    UnsupportedAccessMode { name: String, supported: String },
}

impl CatalogError {
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::UnsupportedType { .. } => "unsupported_type",
            CatalogError::UnsupportedAccessMode { .. } => "unsupported_access_mode",
        }
    }
}

/// Scalar kind stored in a single register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

/// Flattened properties of a [`ScalarKind`].
///
/// Exactly one of `signed`, `unsigned`, `is_float` and `is_boolean` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeDescriptor {
    pub kind: ScalarKind,
    pub byte_width: usize,
    pub signed: bool,
    pub unsigned: bool,
    pub is_float: bool,
    pub is_boolean: bool,
}

impl ScalarKind {
    /// Every supported kind, in catalog order.
    pub const ALL: [ScalarKind; 11] = [
        ScalarKind::Bool,
        ScalarKind::Int8,
        ScalarKind::Int16,
        ScalarKind::Int32,
        ScalarKind::Int64,
        ScalarKind::Uint8,
        ScalarKind::Uint16,
        ScalarKind::Uint32,
        ScalarKind::Uint64,
        ScalarKind::Float32,
        ScalarKind::Float64,
    ];

    /// Canonical identifier.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int8 => "int8",
            ScalarKind::Int16 => "int16",
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::Uint8 => "uint8",
            ScalarKind::Uint16 => "uint16",
            ScalarKind::Uint32 => "uint32",
            ScalarKind::Uint64 => "uint64",
            ScalarKind::Float32 => "float32",
            ScalarKind::Float64 => "float64",
        }
    }

    /// Resolve a type identifier.
    ///
    /// Accepts the canonical names plus the EtherCAT ESI names (`INT`,
    /// `UDINT`, `REAL`, ...) and the device-server names (`DevShort`,
    /// `DevULong`, ...). Matching is case-sensitive.
    pub fn from_name(name: &str) -> Result<Self, CatalogError> {
        let kind = match name {
            "bool" | "BOOL" | "DevBoolean" => ScalarKind::Bool,
            "int8" | "SINT" | "DevChar" => ScalarKind::Int8,
            "int16" | "INT" | "DevShort" => ScalarKind::Int16,
            "int32" | "DINT" | "DevLong" => ScalarKind::Int32,
            "int64" | "LINT" | "DevLong64" => ScalarKind::Int64,
            "uint8" | "USINT" | "DevUChar" => ScalarKind::Uint8,
            "uint16" | "UINT" | "DevUShort" => ScalarKind::Uint16,
            "uint32" | "UDINT" | "DevULong" => ScalarKind::Uint32,
            "uint64" | "ULINT" | "DevULong64" => ScalarKind::Uint64,
            "float32" | "REAL" | "DevFloat" => ScalarKind::Float32,
            "float64" | "LREAL" | "DevDouble" => ScalarKind::Float64,
            other => {
                return Err(CatalogError::UnsupportedType {
                    name: other.to_string(),
                    supported: Self::supported_names(),
                });
            }
        };
        Ok(kind)
    }

    /// Comma-separated list of canonical names, for error messages.
    pub fn supported_names() -> String {
        Self::ALL
            .iter()
            .map(ScalarKind::name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Width of the register image in bytes.
    pub fn byte_width(&self) -> usize {
        match self {
            ScalarKind::Bool | ScalarKind::Int8 | ScalarKind::Uint8 => 1,
            ScalarKind::Int16 | ScalarKind::Uint16 => 2,
            ScalarKind::Int32 | ScalarKind::Uint32 | ScalarKind::Float32 => 4,
            ScalarKind::Int64 | ScalarKind::Uint64 | ScalarKind::Float64 => 8,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ScalarKind::Int8 | ScalarKind::Int16 | ScalarKind::Int32 | ScalarKind::Int64
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            ScalarKind::Uint8 | ScalarKind::Uint16 | ScalarKind::Uint32 | ScalarKind::Uint64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ScalarKind::Float32 | ScalarKind::Float64)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, ScalarKind::Bool)
    }

    /// Access mode used when a descriptor does not name one.
    pub fn default_access(&self) -> AccessMode {
        AccessMode::ReadWrite
    }

    pub fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor {
            kind: *self,
            byte_width: self.byte_width(),
            signed: self.is_signed(),
            unsigned: self.is_unsigned(),
            is_float: self.is_float(),
            is_boolean: self.is_boolean(),
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Access policy of an attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    #[default]
    ReadWrite,
    /// Readable, with an associated write value.
    ReadWithWrite,
}

impl AccessMode {
    const SUPPORTED: &'static str = "ReadOnly, WriteOnly, ReadWrite, ReadWithWrite";

    /// Parse an access-mode identifier. Empty input means `ReadWrite`.
    ///
    /// The device-server spellings (`READ`, `WRITE`, `READ_WRITE`,
    /// `READ_WITH_WRITE`) are accepted too.
    pub fn parse(name: &str) -> Result<Self, CatalogError> {
        match name {
            "" => Ok(AccessMode::default()),
            "ReadOnly" | "READ" => Ok(AccessMode::ReadOnly),
            "WriteOnly" | "WRITE" => Ok(AccessMode::WriteOnly),
            "ReadWrite" | "READ_WRITE" => Ok(AccessMode::ReadWrite),
            "ReadWithWrite" | "READ_WITH_WRITE" => Ok(AccessMode::ReadWithWrite),
            other => Err(CatalogError::UnsupportedAccessMode {
                name: other.to_string(),
                supported: Self::SUPPORTED.to_string(),
            }),
        }
    }

    pub fn is_readable(&self) -> bool {
        !matches!(self, AccessMode::WriteOnly)
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::ReadOnly => "ReadOnly",
            AccessMode::WriteOnly => "WriteOnly",
            AccessMode::ReadWrite => "ReadWrite",
            AccessMode::ReadWithWrite => "ReadWithWrite",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
