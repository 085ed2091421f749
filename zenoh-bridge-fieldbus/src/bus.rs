//! Bus selected by configuration.

use std::time::Duration;

use zenattr_core::{BusFacade, BusFault, RegisterAddress, SimulatedBus};

use crate::config::BusConfig;
use crate::modbus::{ModbusBus, ModbusEndpoint};

/// The bus a bridge instance talks to.
pub enum FieldBus {
    Simulated(SimulatedBus),
    Modbus(ModbusBus),
}

impl FieldBus {
    /// Build the bus described by `config` and connect to the device.
    ///
    /// Fails when a real bus cannot reach its device.
    pub async fn open(config: &BusConfig) -> Result<Self, BusFault> {
        let bus = Self::from_config(config);
        if let FieldBus::Modbus(modbus) = &bus {
            modbus.open().await?;
        }
        Ok(bus)
    }

    /// Build the bus described by `config` without connecting.
    ///
    /// A Modbus bus connects on its first transaction.
    pub fn from_config(config: &BusConfig) -> Self {
        match config {
            BusConfig::Simulated { registers } => FieldBus::Simulated(SimulatedBus::with_registers(
                registers.iter().map(|(address, bytes)| (*address, bytes.clone())),
            )),
            BusConfig::ModbusTcp {
                host,
                port,
                unit_id,
                timeout_ms,
            } => FieldBus::Modbus(ModbusBus::new(
                ModbusEndpoint::Tcp {
                    host: host.clone(),
                    port: *port,
                },
                *unit_id,
                Duration::from_millis(*timeout_ms),
            )),
            BusConfig::ModbusRtu {
                port,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
                unit_id,
                timeout_ms,
            } => FieldBus::Modbus(ModbusBus::new(
                ModbusEndpoint::Rtu {
                    port: port.clone(),
                    baud_rate: *baud_rate,
                    data_bits: *data_bits,
                    parity: parity.clone(),
                    stop_bits: *stop_bits,
                },
                *unit_id,
                Duration::from_millis(*timeout_ms),
            )),
        }
    }
}

impl BusFacade for FieldBus {
    async fn read_raw(&self, address: RegisterAddress, len: usize) -> Result<Vec<u8>, BusFault> {
        match self {
            FieldBus::Simulated(bus) => bus.read_raw(address, len).await,
            FieldBus::Modbus(bus) => bus.read_raw(address, len).await,
        }
    }

    async fn write_raw(&self, address: RegisterAddress, data: &[u8]) -> Result<(), BusFault> {
        match self {
            FieldBus::Simulated(bus) => bus.write_raw(address, data).await,
            FieldBus::Modbus(bus) => bus.write_raw(address, data).await,
        }
    }
}
