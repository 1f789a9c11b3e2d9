//! Channel bindings
//!
//! A [`ChannelBinding`] pins one logical channel to a terminal and channel
//! number on a coupler. [`ChannelTable`] keeps the bindings of a host
//! application in a flat arena indexed by [`ChannelId`], together with each
//! channel's verification state.

use super::address::{self, RegisterRange};
use super::coupler::{BusGuard, Coupler};
use super::error::CouplerError;
use super::pdo::Reading;
use super::terminal::Terminal;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Largest per-channel PDO footprint, in registers
pub const MAX_CHANNEL_REGISTERS: usize = 8;

/// Logical channel pinned to a terminal on a coupler
#[derive(Debug, Clone)]
pub struct ChannelBinding {
    coupler: Arc<Coupler>,
    terminal: usize,
    channel: u16,
}

impl ChannelBinding {
    /// Bind `channel` of the terminal named `terminal`.
    ///
    /// Fails when the terminal is unknown or the channel number is not
    /// valid for its family.
    pub fn new(coupler: Arc<Coupler>, terminal: &str, channel: u16) -> Result<Self, CouplerError> {
        let index = coupler
            .terminal_index(terminal)
            .ok_or_else(|| CouplerError::UnknownTerminal(terminal.to_string()))?;
        if !coupler.terminals()[index].channels().contains(&channel) {
            return Err(CouplerError::ChannelOutOfRange {
                terminal: terminal.to_string(),
                channel,
            });
        }
        Ok(Self {
            coupler,
            terminal: index,
            channel,
        })
    }

    /// Owning coupler
    pub fn coupler(&self) -> &Arc<Coupler> {
        &self.coupler
    }

    /// Bound terminal
    pub fn terminal(&self) -> &Terminal {
        &self.coupler.terminals()[self.terminal]
    }

    /// Channel number
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Register range of this channel
    pub fn range(&self) -> RegisterRange {
        address::resolve(self.terminal(), self.channel)
    }

    /// Check the physical terminal against the configured model using a
    /// bus guard the caller already holds.
    ///
    /// # Panics
    ///
    /// Panics if `bus` belongs to a different coupler.
    pub fn verify_locked(&self, bus: &mut BusGuard<'_>) -> Result<(), CouplerError> {
        assert!(
            std::ptr::eq(bus.coupler(), Arc::as_ptr(&self.coupler)),
            "bus guard belongs to another coupler"
        );
        let terminal = self.terminal();
        let found = bus.read_terminal_id(terminal.slot())?;
        if found == 0 || found != terminal.model_id() {
            return Err(CouplerError::IdentityMismatch {
                slot: terminal.slot(),
                expected: terminal.model_id(),
                found,
            });
        }
        tracing::debug!(
            coupler = self.coupler.name(),
            terminal = terminal.name(),
            model = found,
            "Terminal identity verified"
        );
        Ok(())
    }

    /// Acquire the bus and verify the terminal identity
    pub fn verify(&self) -> Result<(), CouplerError> {
        if !self.coupler.verify_connection() {
            return Err(CouplerError::NotConnected(self.coupler.name().to_string()));
        }
        let mut bus = self.coupler.lock(self.coupler.lock_timeout())?;
        self.verify_locked(&mut bus)
    }

    /// Read and decode this channel.
    ///
    /// The bus is held only for the transfer; decoding runs after release.
    pub fn read(&self) -> Result<Reading, CouplerError> {
        if !self.coupler.verify_connection() {
            return Err(CouplerError::NotConnected(self.coupler.name().to_string()));
        }

        let terminal = self.terminal();
        let support = terminal.family().support();
        let range = support.resolve(terminal, self.channel);
        let mut scratch = [0u16; MAX_CHANNEL_REGISTERS];
        let buffer = &mut scratch[..usize::from(range.count)];

        {
            let mut bus = self.coupler.lock(self.coupler.lock_timeout())?;
            bus.perform_io(support.read_function(), range.address, buffer)?;
        }

        Ok(support.decode(terminal.model_id(), buffer)?)
    }
}

impl fmt::Display for ChannelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ch{}",
            self.coupler.name(),
            self.terminal().name(),
            self.channel
        )
    }
}

/// Split a record name into terminal name and channel number.
///
/// The last `:`-separated segment carries the channel as trailing digits,
/// everything before it names the terminal: `"IOC:EK1:DI1:BI3"` yields
/// `("IOC:EK1:DI1", 3)`.
pub fn parse_record_name(name: &str) -> Option<(&str, u16)> {
    let (terminal, suffix) = name.rsplit_once(':')?;
    let digits = suffix.len() - suffix.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if terminal.is_empty() || digits == 0 {
        return None;
    }
    let channel = suffix[suffix.len() - digits..].parse().ok()?;
    Some((terminal, channel))
}

/// Verification state of a bound channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// Terminal identity not yet confirmed
    Unverified,
    /// Identity confirmed; reads are decoded
    Ready,
    /// Disabled until reset
    Invalid(String),
}

/// Handle into a [`ChannelTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(usize);

/// State plus a counter bumped by every reset. Outcomes of an operation
/// that started under an older epoch are discarded.
#[derive(Debug)]
struct Slot {
    state: ChannelState,
    epoch: u64,
}

struct ChannelRecord {
    name: String,
    binding: ChannelBinding,
    slot: Mutex<Slot>,
}

impl ChannelRecord {
    fn invalid(&self, reason: String) -> CouplerError {
        CouplerError::ChannelInvalid {
            channel: self.name.clone(),
            reason,
        }
    }
}

/// Arena of channel bindings.
///
/// Records are added during setup and never removed. Reads and
/// verification take `&self` so the table can be shared between the
/// threads that service triggers.
#[derive(Default)]
pub struct ChannelTable {
    records: Vec<ChannelRecord>,
    by_name: HashMap<String, ChannelId>,
}

impl ChannelTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named channel
    pub fn bind(
        &mut self,
        name: impl Into<String>,
        coupler: &Arc<Coupler>,
        terminal: &str,
        channel: u16,
    ) -> Result<ChannelId, CouplerError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(CouplerError::Config(format!("channel {} bound twice", name)));
        }
        let binding = ChannelBinding::new(Arc::clone(coupler), terminal, channel)?;
        let id = ChannelId(self.records.len());
        tracing::debug!(channel = %name, %binding, "Channel bound");
        self.by_name.insert(name.clone(), id);
        self.records.push(ChannelRecord {
            name,
            binding,
            slot: Mutex::new(Slot {
                state: ChannelState::Unverified,
                epoch: 0,
            }),
        });
        Ok(id)
    }

    /// Add a channel whose terminal and channel number are encoded in its
    /// record name (see [`parse_record_name`])
    pub fn bind_record(&mut self, record: &str, coupler: &Arc<Coupler>) -> Result<ChannelId, CouplerError> {
        let (terminal, channel) = parse_record_name(record)
            .ok_or_else(|| CouplerError::Config(format!("malformed record name {}", record)))?;
        self.bind(record, coupler, terminal, channel)
    }

    /// Look up a channel by name
    pub fn get(&self, name: &str) -> Option<ChannelId> {
        self.by_name.get(name).copied()
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no channel is bound
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Binding of a channel
    pub fn binding(&self, id: ChannelId) -> &ChannelBinding {
        &self.records[id.0].binding
    }

    /// Current state of a channel
    pub fn state(&self, id: ChannelId) -> ChannelState {
        self.records[id.0].slot.lock().state.clone()
    }

    /// Verify the terminal identity of a channel.
    ///
    /// A mismatch disables the channel; lock and connectivity failures
    /// leave it unverified for the next attempt.
    pub fn verify(&self, id: ChannelId) -> Result<(), CouplerError> {
        let record = &self.records[id.0];
        let epoch = {
            let slot = record.slot.lock();
            if let ChannelState::Invalid(reason) = &slot.state {
                return Err(record.invalid(reason.clone()));
            }
            slot.epoch
        };
        self.settle(record, epoch, record.binding.verify())
    }

    /// Verify every unverified channel, returning the failures
    pub fn verify_all(&self) -> Vec<(ChannelId, CouplerError)> {
        (0..self.records.len())
            .map(ChannelId)
            .filter(|id| self.state(*id) == ChannelState::Unverified)
            .filter_map(|id| self.verify(id).err().map(|err| (id, err)))
            .collect()
    }

    /// Read a channel, verifying it first if needed
    pub fn read(&self, id: ChannelId) -> Result<Reading, CouplerError> {
        let record = &self.records[id.0];
        let (state, epoch) = {
            let slot = record.slot.lock();
            (slot.state.clone(), slot.epoch)
        };
        match state {
            ChannelState::Invalid(reason) => return Err(record.invalid(reason)),
            ChannelState::Unverified => self.verify(id)?,
            ChannelState::Ready => {}
        }
        record
            .binding
            .read()
            .map_err(|err| self.fail(record, epoch, err, "read"))
    }

    /// Re-enable a channel after reconfiguration.
    ///
    /// Verifications and reads still in flight on other threads no longer
    /// change the channel's state.
    pub fn reset(&self, id: ChannelId) {
        let mut slot = self.records[id.0].slot.lock();
        slot.state = ChannelState::Unverified;
        slot.epoch = slot.epoch.wrapping_add(1);
    }

    fn settle(
        &self,
        record: &ChannelRecord,
        epoch: u64,
        outcome: Result<(), CouplerError>,
    ) -> Result<(), CouplerError> {
        if let Err(err) = outcome {
            return Err(self.fail(record, epoch, err, "verify"));
        }
        let mut slot = record.slot.lock();
        if slot.epoch != epoch {
            tracing::debug!(channel = %record.name, "Channel reset during verification");
            return Ok(());
        }
        if let ChannelState::Invalid(reason) = &slot.state {
            return Err(record.invalid(reason.clone()));
        }
        if slot.state == ChannelState::Unverified {
            slot.state = ChannelState::Ready;
            tracing::info!(channel = %record.name, terminal = record.binding.terminal().name(), "Channel ready");
        }
        Ok(())
    }

    fn fail(&self, record: &ChannelRecord, epoch: u64, err: CouplerError, context: &str) -> CouplerError {
        let coupler = record.binding.coupler();
        coupler.report_error(&err, &format!("{} {}", context, record.name));
        if err.invalidates_channel() {
            let mut slot = record.slot.lock();
            if slot.epoch == epoch {
                slot.state = ChannelState::Invalid(err.to_string());
            }
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pdo::{self, Fault};
    use crate::core::simulator::SimulatedCoupler;
    use crate::core::terminal::ProcessImage;

    fn setup() -> (SimulatedCoupler, Arc<Coupler>) {
        let mut image = ProcessImage::new();
        image.push("IOC:DI1", 1004).unwrap();
        image.push("IOC:ENC1", 5001).unwrap();
        image.push("IOC:POS1", 5042).unwrap();
        let terminals = image.into_terminals();

        let sim = SimulatedCoupler::new();
        sim.install(&terminals);
        let coupler = Arc::new(Coupler::new("ek1", sim.clone(), terminals).unwrap());
        coupler.lock(coupler.lock_timeout()).unwrap().connect().unwrap();
        (sim, coupler)
    }

    #[test]
    fn test_parse_record_name() {
        assert_eq!(parse_record_name("IOC:EK1:DI1:BI3"), Some(("IOC:EK1:DI1", 3)));
        assert_eq!(parse_record_name("T:12"), Some(("T", 12)));
        assert_eq!(parse_record_name("T:BI"), None);
        assert_eq!(parse_record_name(":BI1"), None);
        assert_eq!(parse_record_name("nochannel"), None);
    }

    #[test]
    fn test_binding_bounds() {
        let (_, coupler) = setup();
        assert!(ChannelBinding::new(Arc::clone(&coupler), "IOC:DI1", 2).is_ok());
        assert!(ChannelBinding::new(Arc::clone(&coupler), "IOC:DI1", 5).is_ok());
        assert!(matches!(
            ChannelBinding::new(Arc::clone(&coupler), "IOC:DI1", 1),
            Err(CouplerError::ChannelOutOfRange { channel: 1, .. })
        ));
        assert!(matches!(
            ChannelBinding::new(Arc::clone(&coupler), "IOC:POS1", 0),
            Err(CouplerError::ChannelOutOfRange { .. })
        ));
        assert!(matches!(
            ChannelBinding::new(Arc::clone(&coupler), "IOC:POS1", 3),
            Err(CouplerError::ChannelOutOfRange { .. })
        ));
        assert!(matches!(
            ChannelBinding::new(coupler, "IOC:AI9", 1),
            Err(CouplerError::UnknownTerminal(_))
        ));
    }

    #[test]
    fn test_verify_and_read() {
        let (sim, coupler) = setup();
        let binding = ChannelBinding::new(Arc::clone(&coupler), "IOC:ENC1", 1).unwrap();
        sim.set_pdo(binding.terminal(), 1, &pdo::EL5001.encode(66, 0));

        binding.verify().unwrap();
        let reading = binding.read().unwrap();
        assert_eq!(reading.value, 66);
        assert!(reading.is_clean());
    }

    #[test]
    fn test_verify_locked_with_held_guard() {
        let (_, coupler) = setup();
        let binding = ChannelBinding::new(Arc::clone(&coupler), "IOC:POS1", 2).unwrap();
        let mut bus = coupler.lock(coupler.lock_timeout()).unwrap();
        binding.verify_locked(&mut bus).unwrap();
    }

    #[test]
    fn test_empty_slot_is_mismatch() {
        let (sim, coupler) = setup();
        let binding = ChannelBinding::new(Arc::clone(&coupler), "IOC:ENC1", 1).unwrap();
        sim.set_terminal_id(binding.terminal().slot(), 0);
        let err = binding.verify().unwrap_err();
        assert!(matches!(
            err,
            CouplerError::IdentityMismatch {
                slot: 2,
                expected: 5001,
                found: 0
            }
        ));
    }

    #[test]
    fn test_mismatch_disables_channel_before_decode() {
        let (sim, coupler) = setup();
        let mut table = ChannelTable::new();
        let id = table.bind_record("IOC:ENC1:CNT1", &coupler).unwrap();
        sim.set_terminal_id(2, 5002);

        let err = table.read(id).unwrap_err();
        assert!(matches!(err, CouplerError::IdentityMismatch { found: 5002, .. }));
        assert!(matches!(table.state(id), ChannelState::Invalid(_)));

        let reads_before = sim.read_count();
        let err = table.read(id).unwrap_err();
        assert!(matches!(err, CouplerError::ChannelInvalid { .. }));
        assert_eq!(sim.read_count(), reads_before);

        assert_eq!(coupler.error_stats().count(crate::ErrorKind::IdentityMismatch), 1);

        sim.set_terminal_id(2, 5001);
        table.reset(id);
        assert!(table.read(id).is_ok());
        assert_eq!(table.state(id), ChannelState::Ready);
    }

    #[test]
    fn test_connectivity_failure_keeps_unverified() {
        let (_, coupler) = setup();
        let mut table = ChannelTable::new();
        let id = table.bind("enc", &coupler, "IOC:ENC1", 1).unwrap();
        coupler.lock(coupler.lock_timeout()).unwrap().disconnect();

        let err = table.read(id).unwrap_err();
        assert!(matches!(err, CouplerError::NotConnected(_)));
        assert_eq!(table.state(id), ChannelState::Unverified);
    }

    #[test]
    fn test_table_read_faults() {
        let (sim, coupler) = setup();
        let mut table = ChannelTable::new();
        let ch1 = table.bind("pos1", &coupler, "IOC:POS1", 1).unwrap();
        let ch2 = table.bind("pos2", &coupler, "IOC:POS1", 2).unwrap();
        let terminal = coupler.terminal("IOC:POS1").unwrap();
        sim.set_pdo(terminal, 1, &pdo::EL5042.encode(1000, 0));
        sim.set_pdo(terminal, 2, &pdo::EL5042.encode(2000, 0x0001));

        assert!(table.verify_all().is_empty());
        assert_eq!(table.read(ch1).unwrap().value, 1000);
        let reading = table.read(ch2).unwrap();
        assert_eq!(reading.value, 2000);
        assert!(reading.flags.contains(Fault::Warning));
    }

    #[test]
    fn test_digital_input_read() {
        let (sim, coupler) = setup();
        let mut table = ChannelTable::new();
        let id = table.bind_record("IOC:DI1:BI3", &coupler).unwrap();
        sim.set_discrete_input(1, true);
        assert_eq!(table.read(id).unwrap().value, 1);
        sim.set_discrete_input(1, false);
        assert_eq!(table.read(id).unwrap().value, 0);
    }

    #[test]
    fn test_stale_verification_does_not_override_reset() {
        let (_, coupler) = setup();
        let mut table = ChannelTable::new();
        let id = table.bind("enc", &coupler, "IOC:ENC1", 1).unwrap();
        let record = &table.records[id.0];
        let epoch = record.slot.lock().epoch;

        table.reset(id);
        assert!(table.settle(record, epoch, Ok(())).is_ok());
        assert_eq!(table.state(id), ChannelState::Unverified);

        let mismatch = CouplerError::IdentityMismatch {
            slot: 2,
            expected: 5001,
            found: 0,
        };
        assert!(table.settle(record, epoch, Err(mismatch)).is_err());
        assert_eq!(table.state(id), ChannelState::Unverified);
    }

    #[test]
    fn test_success_does_not_override_concurrent_invalidation() {
        let (_, coupler) = setup();
        let mut table = ChannelTable::new();
        let id = table.bind("enc", &coupler, "IOC:ENC1", 1).unwrap();
        let record = &table.records[id.0];
        let epoch = record.slot.lock().epoch;

        let mismatch = CouplerError::IdentityMismatch {
            slot: 2,
            expected: 5001,
            found: 5002,
        };
        table.fail(record, epoch, mismatch, "verify");
        let err = table.settle(record, epoch, Ok(())).unwrap_err();
        assert!(matches!(err, CouplerError::ChannelInvalid { .. }));
        assert!(matches!(table.state(id), ChannelState::Invalid(_)));
    }

    #[test]
    fn test_duplicate_channel_name() {
        let (_, coupler) = setup();
        let mut table = ChannelTable::new();
        table.bind("x", &coupler, "IOC:ENC1", 1).unwrap();
        assert!(table.bind("x", &coupler, "IOC:ENC1", 1).is_err());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("x"), Some(ChannelId(0)));
    }
}
