//! Configuration for the fieldbus attribute bridge.

use serde::Deserialize;
use std::collections::BTreeMap;
use zenattr_common::config::{BridgeConfig, LoggingConfig, ZenohConfig};
use zenattr_common::{Error, Format, KEY_PREFIX, Result, is_valid_chunk};
use zenattr_core::{AttributeRecord, RegisterAddress};

/// Complete bridge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldbusBridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Bridge-specific settings
    pub bridge: FieldbusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device, bus and startup attributes.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldbusConfig {
    /// Key expression prefix (default: "zenattr/fieldbus")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Device name (used in key expressions)
    pub device: String,

    /// Reply and status encoding (default: json)
    #[serde(default)]
    pub serialization: Format,

    /// Bus the device is reached through
    pub bus: BusConfig,

    /// Attributes registered at startup
    #[serde(default)]
    pub attributes: Vec<AttributeRecord>,
}

fn default_key_prefix() -> String {
    KEY_PREFIX.to_string()
}

/// Bus configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusConfig {
    /// In-memory register map, for dry runs
    Simulated {
        /// Initial register images, keyed by address ("0x6000", "0x6000:1")
        #[serde(default)]
        registers: BTreeMap<RegisterAddress, Vec<u8>>,
    },
    /// Modbus TCP connection
    ModbusTcp {
        /// Host address (IP or hostname)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
        /// Modbus unit/slave ID (1-247)
        #[serde(default = "default_unit_id")]
        unit_id: u8,
        /// Transaction timeout in milliseconds
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    /// Modbus RTU (serial) connection
    ModbusRtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Parity: "none", "even", or "odd" (default: "none")
        #[serde(default = "default_parity")]
        parity: String,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
        /// Modbus unit/slave ID (1-247)
        #[serde(default = "default_unit_id")]
        unit_id: u8,
        /// Transaction timeout in milliseconds
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

impl BusConfig {
    /// Short name of the bus type, for status messages.
    pub fn kind(&self) -> &'static str {
        match self {
            BusConfig::Simulated { .. } => "simulated",
            BusConfig::ModbusTcp { .. } => "modbus_tcp",
            BusConfig::ModbusRtu { .. } => "modbus_rtu",
        }
    }
}

fn default_modbus_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

impl BridgeConfig for FieldbusBridgeConfig {
    fn zenoh(&self) -> &ZenohConfig {
        &self.zenoh
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn key_prefix(&self) -> &str {
        &self.bridge.key_prefix
    }

    fn format(&self) -> Format {
        self.bridge.serialization
    }

    fn validate(&self) -> Result<()> {
        let bridge = &self.bridge;

        if bridge.key_prefix.is_empty()
            || bridge.key_prefix.starts_with('/')
            || bridge.key_prefix.ends_with('/')
            || !bridge.key_prefix.split('/').all(is_valid_chunk)
        {
            return Err(Error::Config(format!(
                "invalid key_prefix '{}'",
                bridge.key_prefix
            )));
        }

        if !is_valid_chunk(&bridge.device) {
            return Err(Error::Config(format!(
                "invalid device name '{}': must be a single key chunk",
                bridge.device
            )));
        }

        match &bridge.bus {
            BusConfig::Simulated { .. } => {}
            BusConfig::ModbusTcp {
                host,
                unit_id,
                timeout_ms,
                ..
            } => {
                if host.is_empty() {
                    return Err(Error::Config("modbus_tcp: host cannot be empty".to_string()));
                }
                validate_modbus(*unit_id, *timeout_ms)?;
            }
            BusConfig::ModbusRtu {
                port,
                data_bits,
                parity,
                stop_bits,
                unit_id,
                timeout_ms,
                ..
            } => {
                if port.is_empty() {
                    return Err(Error::Config("modbus_rtu: port cannot be empty".to_string()));
                }
                match parity.to_lowercase().as_str() {
                    "none" | "even" | "odd" => {}
                    _ => {
                        return Err(Error::Config(format!(
                            "modbus_rtu: invalid parity '{}' (use none, even, or odd)",
                            parity
                        )));
                    }
                }
                if !(5..=8).contains(data_bits) {
                    return Err(Error::Config(format!(
                        "modbus_rtu: data_bits must be 5-8, got {}",
                        data_bits
                    )));
                }
                if !matches!(stop_bits, 1 | 2) {
                    return Err(Error::Config(format!(
                        "modbus_rtu: stop_bits must be 1 or 2, got {}",
                        stop_bits
                    )));
                }
                validate_modbus(*unit_id, *timeout_ms)?;
            }
        }

        Ok(())
    }
}

fn validate_modbus(unit_id: u8, timeout_ms: u64) -> Result<()> {
    if !(1..=247).contains(&unit_id) {
        return Err(Error::Config(format!(
            "unit_id must be 1-247, got {}",
            unit_id
        )));
    }
    if timeout_ms == 0 {
        return Err(Error::Config("timeout_ms must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zenattr_common::parse_config;

    #[test]
    fn test_parse_tcp_config() {
        let json = r#"{
            zenoh: { mode: "peer" },
            bridge: {
                device: "drive01",
                bus: { type: "modbus_tcp", host: "192.168.1.10" },
                attributes: [
                    { name: "temp", register: "0x6000", data_type: "int16", min_value: -400, max_value: 1500 }
                ]
            }
        }"#;

        let config: FieldbusBridgeConfig = parse_config(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.bridge.device, "drive01");
        assert_eq!(config.bridge.key_prefix, "zenattr/fieldbus");
        assert_eq!(config.bridge.serialization, Format::Json);
        assert_eq!(config.bridge.attributes.len(), 1);

        if let BusConfig::ModbusTcp {
            host,
            port,
            unit_id,
            timeout_ms,
        } = &config.bridge.bus
        {
            assert_eq!(host, "192.168.1.10");
            assert_eq!(*port, 502); // default
            assert_eq!(*unit_id, 1);
            assert_eq!(*timeout_ms, 1000);
        } else {
            panic!("Expected modbus_tcp bus");
        }
    }

    #[test]
    fn test_parse_rtu_config() {
        let json = r#"{
            bridge: {
                device: "sensor01",
                serialization: "cbor",
                bus: {
                    type: "modbus_rtu",
                    port: "/dev/ttyUSB0",
                    baud_rate: 19200,
                    parity: "even",
                    unit_id: 5
                }
            }
        }"#;

        let config: FieldbusBridgeConfig = parse_config(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.format(), Format::Cbor);
        assert_eq!(config.zenoh.mode, "peer");

        if let BusConfig::ModbusRtu {
            port,
            baud_rate,
            parity,
            unit_id,
            ..
        } = &config.bridge.bus
        {
            assert_eq!(port, "/dev/ttyUSB0");
            assert_eq!(*baud_rate, 19200);
            assert_eq!(parity, "even");
            assert_eq!(*unit_id, 5);
        } else {
            panic!("Expected modbus_rtu bus");
        }
    }

    #[test]
    fn test_parse_simulated_registers() {
        let json = r#"{
            bridge: {
                device: "bench",
                key_prefix: "lab/bench",
                bus: {
                    type: "simulated",
                    registers: { "0x6000": [232, 3], "0x6001:1": [0] }
                }
            }
        }"#;

        let config: FieldbusBridgeConfig = parse_config(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.key_prefix(), "lab/bench");

        if let BusConfig::Simulated { registers } = &config.bridge.bus {
            assert_eq!(
                registers.get(&RegisterAddress::new(0x6000, 0)),
                Some(&vec![0xE8, 0x03])
            );
            assert_eq!(registers.get(&RegisterAddress::new(0x6001, 1)), Some(&vec![0]));
        } else {
            panic!("Expected simulated bus");
        }
    }

    #[test]
    fn test_validate_device_name() {
        let json = r#"{
            bridge: { device: "drive/01", bus: { type: "simulated" } }
        }"#;

        let config: FieldbusBridgeConfig = parse_config(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_key_prefix() {
        for prefix in ["", "/abs", "trailing/", "wild/*"] {
            let json = format!(
                r#"{{ bridge: {{ device: "d", key_prefix: "{}", bus: {{ type: "simulated" }} }} }}"#,
                prefix
            );
            let config: FieldbusBridgeConfig = parse_config(&json).unwrap();
            assert!(config.validate().is_err(), "prefix {:?}", prefix);
        }
    }

    #[test]
    fn test_validate_unit_id() {
        let json = r#"{
            bridge: {
                device: "plc01",
                bus: { type: "modbus_tcp", host: "10.0.0.1", unit_id: 0 }
            }
        }"#;

        let config: FieldbusBridgeConfig = parse_config(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_parity() {
        let json = r#"{
            bridge: {
                device: "plc01",
                bus: { type: "modbus_rtu", port: "/dev/ttyS0", parity: "mark" }
            }
        }"#;

        let config: FieldbusBridgeConfig = parse_config(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_bus_type() {
        let json = r#"{
            bridge: { device: "plc01", bus: { type: "canopen" } }
        }"#;

        let result: Result<FieldbusBridgeConfig> = parse_config(json);
        assert!(result.is_err());
    }
}
