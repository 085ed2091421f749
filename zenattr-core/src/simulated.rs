//! In-memory object dictionary implementing [`BusFacade`].
//!
//! Used by tests and by bridges configured without real hardware. Every
//! call counts as one transaction, including calls that fail.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::bus::{BusFacade, BusFault};
use crate::descriptor::RegisterAddress;

#[derive(Debug, Default)]
struct State {
    registers: HashMap<RegisterAddress, Vec<u8>>,
    reads: usize,
    writes: usize,
    write_log: Vec<(RegisterAddress, Vec<u8>)>,
    pending_fault: Option<BusFault>,
}

/// Simulated bus device.
#[derive(Debug, Default)]
pub struct SimulatedBus {
    state: Mutex<State>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a device pre-populated with register images.
    pub fn with_registers<I>(registers: I) -> Self
    where
        I: IntoIterator<Item = (RegisterAddress, Vec<u8>)>,
    {
        let bus = Self::new();
        bus.state.lock().registers.extend(registers);
        bus
    }

    /// Set a register image without counting a transaction.
    pub fn set(&self, address: RegisterAddress, bytes: impl Into<Vec<u8>>) {
        self.state.lock().registers.insert(address, bytes.into());
    }

    /// Current register image, if any.
    pub fn get(&self, address: RegisterAddress) -> Option<Vec<u8>> {
        self.state.lock().registers.get(&address).cloned()
    }

    /// Make the next transaction fail with `fault`.
    pub fn fail_next(&self, fault: BusFault) {
        self.state.lock().pending_fault = Some(fault);
    }

    /// Number of read transactions attempted.
    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }

    /// Number of write transactions attempted.
    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }

    /// Total transactions attempted.
    pub fn transactions(&self) -> usize {
        let state = self.state.lock();
        state.reads + state.writes
    }

    /// Successful writes, oldest first.
    pub fn write_log(&self) -> Vec<(RegisterAddress, Vec<u8>)> {
        self.state.lock().write_log.clone()
    }
}

impl BusFacade for SimulatedBus {
    async fn read_raw(&self, address: RegisterAddress, len: usize) -> Result<Vec<u8>, BusFault> {
        let mut state = self.state.lock();
        state.reads += 1;

        if let Some(fault) = state.pending_fault.take() {
            return Err(fault);
        }

        let image = state
            .registers
            .get(&address)
            .ok_or_else(|| BusFault::device_absent(format!("no object at {}", address)))?;

        // Short images are returned as-is; the caller reports truncation.
        Ok(image[..len.min(image.len())].to_vec())
    }

    async fn write_raw(&self, address: RegisterAddress, data: &[u8]) -> Result<(), BusFault> {
        let mut state = self.state.lock();
        state.writes += 1;

        if let Some(fault) = state.pending_fault.take() {
            return Err(fault);
        }

        state.registers.insert(address, data.to_vec());
        state.write_log.push((address, data.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[test]
    fn test_read_stored_image() {
        let address = RegisterAddress::new(0x6000, 0);
        let bus = SimulatedBus::with_registers([(address, vec![0xE8, 0x03])]);

        assert_eq!(block_on(bus.read_raw(address, 2)).unwrap(), vec![0xE8, 0x03]);
        assert_eq!(block_on(bus.read_raw(address, 1)).unwrap(), vec![0xE8]);
        assert_eq!(block_on(bus.read_raw(address, 4)).unwrap(), vec![0xE8, 0x03]);
        assert_eq!(bus.reads(), 3);
    }

    #[test]
    fn test_absent_object() {
        let bus = SimulatedBus::new();
        let err = block_on(bus.read_raw(RegisterAddress::new(0x1000, 0), 2)).unwrap_err();
        assert_eq!(err.kind, crate::bus::BusFaultKind::DeviceAbsent);
        assert_eq!(bus.reads(), 1);
    }

    #[test]
    fn test_write_and_log() {
        let bus = SimulatedBus::new();
        let address = RegisterAddress::new(0x7000, 1);

        block_on(bus.write_raw(address, &[0x01])).unwrap();

        assert_eq!(bus.get(address), Some(vec![0x01]));
        assert_eq!(bus.write_log(), vec![(address, vec![0x01])]);
        assert_eq!(bus.transactions(), 1);
    }

    #[test]
    fn test_fault_injection_is_one_shot() {
        let bus = SimulatedBus::new();
        let address = RegisterAddress::new(0x7000, 0);
        bus.fail_next(BusFault::timeout("no response"));

        assert!(block_on(bus.write_raw(address, &[0x01])).is_err());
        assert!(block_on(bus.write_raw(address, &[0x02])).is_ok());
        assert_eq!(bus.write_log().len(), 1);
        assert_eq!(bus.writes(), 2);
    }
}
