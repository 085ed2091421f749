//! Raw register access.
//!
//! The bridge never talks to hardware itself: it hands register images to
//! a [`BusFacade`] and gets register images back. Facades are responsible
//! for serializing transactions if the underlying bus cannot run them
//! concurrently, and for any retry or timeout policy.

use std::fmt;
use std::future::Future;

use serde::Serialize;
use thiserror::Error;

use crate::descriptor::RegisterAddress;

/// Broad class of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusFaultKind {
    /// The transaction did not complete in time.
    Timeout,
    /// No device (or no object) answered at the address.
    DeviceAbsent,
    /// Any other transport or protocol failure.
    Fault,
    /// The facade cannot express the requested transaction.
    Unsupported,
}

impl fmt::Display for BusFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BusFaultKind::Timeout => "timeout",
            BusFaultKind::DeviceAbsent => "device absent",
            BusFaultKind::Fault => "bus fault",
            BusFaultKind::Unsupported => "unsupported",
        })
    }
}

/// Failure reported by a bus facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct BusFault {
    pub kind: BusFaultKind,
    pub message: String,
}

impl BusFault {
    pub fn new(kind: BusFaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BusFaultKind::Timeout, message)
    }

    pub fn device_absent(message: impl Into<String>) -> Self {
        Self::new(BusFaultKind::DeviceAbsent, message)
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self::new(BusFaultKind::Fault, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(BusFaultKind::Unsupported, message)
    }
}

/// Byte-level register access on a fieldbus.
///
/// Each call is exactly one bus transaction.
pub trait BusFacade: Send + Sync {
    /// Read `len` bytes from the register at `address`.
    fn read_raw(
        &self,
        address: RegisterAddress,
        len: usize,
    ) -> impl Future<Output = Result<Vec<u8>, BusFault>> + Send;

    /// Write `data` to the register at `address` (index and sub-index).
    fn write_raw(
        &self,
        address: RegisterAddress,
        data: &[u8],
    ) -> impl Future<Output = Result<(), BusFault>> + Send;
}
