//! Zenoh bridge for fieldbus attributes.
//!
//! This bridge exposes the registers of one fieldbus device (Modbus TCP,
//! Modbus RTU, or a simulated register map) as named, typed attributes.
//! Attributes come from the configuration file and can be added at
//! runtime.
//!
//! # Key Expressions
//!
//! ```text
//! zenattr/fieldbus/<device>/attr/<attribute>   read (no payload) / write (payload)
//! zenattr/fieldbus/<device>/@/register         runtime registration
//! zenattr/fieldbus/<device>/@/attributes       attribute listing
//! zenattr/fieldbus/@/status                    bridge status
//! zenattr/fieldbus/@/time                      bridge clock
//! ```

pub mod bus;
pub mod config;
pub mod exposer;
pub mod modbus;
