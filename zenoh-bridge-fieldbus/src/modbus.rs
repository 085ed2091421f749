//! Modbus holding-register bus.
//!
//! An attribute's register index is the first holding register of its
//! value. Each 16-bit register carries two consecutive bytes of the
//! little-endian image, low byte first. Sub-indices have no Modbus
//! equivalent and are rejected.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::error::Elapsed;
use tokio_modbus::ExceptionCode;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};
use zenattr_core::{BusFacade, BusFault, RegisterAddress};

/// Largest register count of a single write request.
const MAX_REGISTERS: usize = 123;

/// Where the Modbus device is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusEndpoint {
    Tcp {
        host: String,
        port: u16,
    },
    Rtu {
        port: String,
        baud_rate: u32,
        data_bits: u8,
        parity: String,
        stop_bits: u8,
    },
}

/// Holding-register facade over one Modbus unit.
///
/// The connection is opened by [`open`](Self::open) or on first use, and
/// dropped after any transport failure; the next transaction reconnects.
/// Transactions are serialized.
pub struct ModbusBus {
    endpoint: ModbusEndpoint,
    slave: Slave,
    timeout: Duration,
    context: Mutex<Option<Context>>,
}

impl ModbusBus {
    pub fn new(endpoint: ModbusEndpoint, unit_id: u8, timeout: Duration) -> Self {
        Self {
            endpoint,
            slave: Slave(unit_id),
            timeout,
            context: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &ModbusEndpoint {
        &self.endpoint
    }

    /// Connect to the Modbus device.
    async fn connect(&self) -> Result<Context, BusFault> {
        match &self.endpoint {
            ModbusEndpoint::Tcp { host, port } => {
                let addr = tokio::net::lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|e| BusFault::device_absent(format!("{}:{}: {}", host, port, e)))?
                    .next()
                    .ok_or_else(|| {
                        BusFault::device_absent(format!("{}:{}: no address", host, port))
                    })?;

                let ctx = tokio::time::timeout(self.timeout, tcp::connect_slave(addr, self.slave))
                    .await
                    .map_err(|_| BusFault::timeout(format!("connecting to {}", addr)))?
                    .map_err(|e| BusFault::device_absent(format!("{}: {}", addr, e)))?;

                info!(address = %addr, unit_id = self.slave.0, "Connected to Modbus TCP device");
                Ok(ctx)
            }
            ModbusEndpoint::Rtu {
                port,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => {
                let parity = match parity.to_lowercase().as_str() {
                    "even" => tokio_serial::Parity::Even,
                    "odd" => tokio_serial::Parity::Odd,
                    _ => tokio_serial::Parity::None,
                };

                let stop_bits = match stop_bits {
                    2 => tokio_serial::StopBits::Two,
                    _ => tokio_serial::StopBits::One,
                };

                let data_bits = match data_bits {
                    5 => tokio_serial::DataBits::Five,
                    6 => tokio_serial::DataBits::Six,
                    7 => tokio_serial::DataBits::Seven,
                    _ => tokio_serial::DataBits::Eight,
                };

                let builder = tokio_serial::new(port, *baud_rate)
                    .parity(parity)
                    .stop_bits(stop_bits)
                    .data_bits(data_bits);

                let serial = tokio_serial::SerialStream::open(&builder)
                    .map_err(|e| BusFault::device_absent(format!("{}: {}", port, e)))?;

                info!(port = %port, unit_id = self.slave.0, "Opened Modbus RTU port");
                Ok(rtu::attach_slave(serial, self.slave))
            }
        }
    }

    /// Open the connection now rather than on first use.
    ///
    /// Fails when the device cannot be reached. Later transport failures
    /// still drop the connection and reconnect lazily.
    pub async fn open(&self) -> Result<(), BusFault> {
        let mut slot = self.context.lock().await;
        if slot.is_none() {
            *slot = Some(self.connect().await?);
        }
        Ok(())
    }

    /// Take the open connection, or open a new one.
    async fn take_context(&self, slot: &mut Option<Context>) -> Result<Context, BusFault> {
        match slot.take() {
            Some(ctx) => Ok(ctx),
            None => self.connect().await,
        }
    }

    /// Turn a timed transaction result into a value, returning the
    /// connection to `slot` unless the transport failed.
    fn settle<T, E: std::fmt::Display>(
        &self,
        result: Result<Result<Result<T, ExceptionCode>, E>, Elapsed>,
        ctx: Context,
        slot: &mut Option<Context>,
    ) -> Result<T, BusFault> {
        match result {
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Modbus transaction timed out, dropping connection"
                );
                Err(BusFault::timeout(format!(
                    "no response within {} ms",
                    self.timeout.as_millis()
                )))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Modbus transport error, dropping connection");
                Err(BusFault::fault(e.to_string()))
            }
            Ok(Ok(Err(exception))) => {
                *slot = Some(ctx);
                Err(exception_fault(exception))
            }
            Ok(Ok(Ok(value))) => {
                *slot = Some(ctx);
                Ok(value)
            }
        }
    }
}

impl BusFacade for ModbusBus {
    async fn read_raw(&self, address: RegisterAddress, len: usize) -> Result<Vec<u8>, BusFault> {
        let start = start_register(address)?;
        let count = register_count(len)?;

        let mut slot = self.context.lock().await;
        let mut ctx = self.take_context(&mut slot).await?;
        let result =
            tokio::time::timeout(self.timeout, ctx.read_holding_registers(start, count)).await;
        let registers = self.settle(result, ctx, &mut slot)?;

        debug!(register = start, count, "Read holding registers");
        Ok(unpack_registers(&registers, len))
    }

    async fn write_raw(&self, address: RegisterAddress, data: &[u8]) -> Result<(), BusFault> {
        let start = start_register(address)?;
        register_count(data.len())?;
        let words = pack_registers(data);

        let mut slot = self.context.lock().await;
        let mut ctx = self.take_context(&mut slot).await?;
        let result =
            tokio::time::timeout(self.timeout, ctx.write_multiple_registers(start, &words)).await;
        self.settle(result, ctx, &mut slot)?;

        debug!(register = start, count = words.len(), "Wrote holding registers");
        Ok(())
    }
}

fn start_register(address: RegisterAddress) -> Result<u16, BusFault> {
    if address.sub_index != 0 {
        return Err(BusFault::unsupported(format!(
            "{}: Modbus registers have no sub-index",
            address
        )));
    }
    Ok(address.index)
}

/// Number of 16-bit registers holding `len` bytes.
pub fn register_count(len: usize) -> Result<u16, BusFault> {
    let count = len.div_ceil(2);
    if count == 0 || count > MAX_REGISTERS {
        return Err(BusFault::unsupported(format!(
            "{} bytes do not fit in 1-{} registers",
            len, MAX_REGISTERS
        )));
    }
    // Bounded by MAX_REGISTERS above.
    Ok(count as u16)
}

/// Pack a byte image into registers, low byte first.
///
/// An odd trailing byte is padded with a zero high byte.
pub fn pack_registers(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect()
}

/// Unpack registers into a byte image of at most `len` bytes.
pub fn unpack_registers(registers: &[u16], len: usize) -> Vec<u8> {
    let mut bytes: Vec<u8> = registers.iter().flat_map(|r| r.to_le_bytes()).collect();
    bytes.truncate(len);
    bytes
}

fn exception_fault(exception: ExceptionCode) -> BusFault {
    match exception {
        ExceptionCode::IllegalDataAddress | ExceptionCode::GatewayTargetDevice => {
            BusFault::device_absent(format!("exception: {:?}", exception))
        }
        other => BusFault::fault(format!("exception: {:?}", other)),
    }
}
