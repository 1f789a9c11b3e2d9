//! Simulated coupler
//!
//! In-memory register banks behind the [`RegisterTransport`] interface,
//! for exercising bindings and decoders without hardware. Clones share the
//! same banks, so a test can keep one handle while the [`Coupler`] owns
//! another.
//!
//! [`Coupler`]: super::coupler::Coupler

use super::address;
use super::coupler::TERMINAL_ID_BASE;
use super::terminal::Terminal;
use super::transport::{RegisterSpace, RegisterTransport, TransportError};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Model id the coupler reports for itself in slot 0
pub const COUPLER_ID: u16 = 9000;

#[derive(Debug, Default)]
struct Banks {
    registers: HashMap<(RegisterSpace, u16), u16>,
    link_down: bool,
    failures: VecDeque<TransportError>,
    reads: u64,
    writes: u64,
}

/// Shared handle to a simulated coupler
#[derive(Debug, Clone, Default)]
pub struct SimulatedCoupler {
    banks: Arc<Mutex<Banks>>,
}

impl SimulatedCoupler {
    /// Create an empty simulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the terminal id table for `terminals`
    pub fn install(&self, terminals: &[Terminal]) {
        self.set_terminal_id(0, COUPLER_ID);
        for terminal in terminals {
            self.set_terminal_id(terminal.slot(), terminal.model_id());
        }
    }

    /// Set the id reported for `slot`
    pub fn set_terminal_id(&self, slot: u16, id: u16) {
        self.set(RegisterSpace::HoldingRegisters, TERMINAL_ID_BASE + slot, id);
    }

    /// Place raw PDO registers for `channel` of `terminal`
    pub fn set_pdo(&self, terminal: &Terminal, channel: u16, registers: &[u16]) {
        let range = address::resolve(terminal, channel);
        for (offset, value) in registers.iter().enumerate() {
            self.set(range.space, range.address + offset as u16, *value);
        }
    }

    /// Set a discrete input bit
    pub fn set_discrete_input(&self, address: u16, state: bool) {
        self.set(RegisterSpace::DiscreteInputs, address, u16::from(state));
    }

    /// Set any register
    pub fn set(&self, space: RegisterSpace, address: u16, value: u16) {
        self.banks.lock().registers.insert((space, address), value);
    }

    /// Current value of any register (0 if never written)
    pub fn get(&self, space: RegisterSpace, address: u16) -> u16 {
        self.banks
            .lock()
            .registers
            .get(&(space, address))
            .copied()
            .unwrap_or(0)
    }

    /// Take the link down or bring it back up
    pub fn set_link(&self, up: bool) {
        self.banks.lock().link_down = !up;
    }

    /// Fail the next transfer with `error`
    pub fn fail_next(&self, error: TransportError) {
        self.banks.lock().failures.push_back(error);
    }

    /// Reads served so far
    pub fn read_count(&self) -> u64 {
        self.banks.lock().reads
    }

    /// Writes served so far
    pub fn write_count(&self) -> u64 {
        self.banks.lock().writes
    }
}

impl Banks {
    fn check(&mut self) -> Result<(), TransportError> {
        if self.link_down {
            return Err(TransportError::NotConnected);
        }
        match self.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl RegisterTransport for SimulatedCoupler {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.banks.lock().link_down {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    fn read(
        &mut self,
        space: RegisterSpace,
        address: u16,
        out: &mut [u16],
    ) -> Result<(), TransportError> {
        let mut banks = self.banks.lock();
        banks.check()?;
        banks.reads += 1;
        for (offset, slot) in out.iter_mut().enumerate() {
            let key = (space, address.wrapping_add(offset as u16));
            *slot = banks.registers.get(&key).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn write(
        &mut self,
        space: RegisterSpace,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        let mut banks = self.banks.lock();
        banks.check()?;
        if !space.is_writable() {
            return Err(TransportError::Exception(
                super::transport::ExceptionCode::IllegalFunction,
            ));
        }
        banks.writes += 1;
        for (offset, value) in values.iter().enumerate() {
            banks
                .registers
                .insert((space, address.wrapping_add(offset as u16)), *value);
        }
        Ok(())
    }
}
