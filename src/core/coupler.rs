//! Coupler bus arbitration
//!
//! A [`Coupler`] owns the transport to one physical bus coupler and the
//! descriptors of the terminals plugged into it. All register traffic is
//! serialized through a timed mutex: [`Coupler::lock`] hands out a
//! [`BusGuard`], and only the guard can issue I/O. Dropping the guard
//! releases the bus on every path, including early returns through `?`.
//!
//! Connection state is a plain flag. It may be read at any time without
//! touching the bus, but it only changes while the bus is held.

use super::error::{CouplerError, ErrorKind};
use super::terminal::Terminal;
use super::transport::{FunctionCode, RegisterTransport};
use crate::config::CouplerConfig;
use chrono::{DateTime, Local};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Holding register of the coupler's own id; terminal `n` reports at `TERMINAL_ID_BASE + n`
pub const TERMINAL_ID_BASE: u16 = 0x6000;

/// Bus lock budget used when the configuration does not set one
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

struct Bus {
    transport: Box<dyn RegisterTransport>,
}

/// Last error seen by the error sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Category
    pub kind: ErrorKind,
    /// Rendered error
    pub message: String,
    /// Caller-supplied context
    pub context: String,
    /// When it was reported
    pub at: DateTime<Local>,
}

/// Error accounting snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorStats {
    /// Reports per category
    pub counts: BTreeMap<ErrorKind, u64>,
    /// Most recent report
    pub last: Option<ErrorRecord>,
}

impl ErrorStats {
    /// Total number of reports
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Reports of one category
    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

/// One bus coupler and its terminals
pub struct Coupler {
    name: String,
    bus: Mutex<Bus>,
    connected: AtomicBool,
    terminals: Vec<Terminal>,
    lock_timeout: Duration,
    errors: Mutex<ErrorStats>,
}

impl std::fmt::Debug for Coupler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coupler")
            .field("name", &self.name)
            .field("connected", &self.verify_connection())
            .field("terminals", &self.terminals.len())
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl Coupler {
    /// Create a coupler in the disconnected state.
    ///
    /// Terminal names and slots must be unique.
    pub fn new(
        name: impl Into<String>,
        transport: impl RegisterTransport + 'static,
        terminals: Vec<Terminal>,
    ) -> Result<Self, CouplerError> {
        let name = name.into();
        let mut names = HashSet::new();
        let mut slots = HashSet::new();
        for terminal in &terminals {
            if !names.insert(terminal.name()) {
                return Err(CouplerError::Config(format!(
                    "duplicate terminal name {} on {}",
                    terminal.name(),
                    name
                )));
            }
            if terminal.slot() == 0
                || TERMINAL_ID_BASE.checked_add(terminal.slot()).is_none()
                || !slots.insert(terminal.slot())
            {
                return Err(CouplerError::Config(format!(
                    "invalid or duplicate slot {} on {}",
                    terminal.slot(),
                    name
                )));
            }
            if u32::from(terminal.input_start()) + u32::from(terminal.input_size()) > 0x1_0000 {
                return Err(CouplerError::Config(format!(
                    "input image of {} at {} exceeds the address space on {}",
                    terminal.name(),
                    terminal.input_start(),
                    name
                )));
            }
        }

        Ok(Self {
            name,
            bus: Mutex::new(Bus {
                transport: Box::new(transport),
            }),
            connected: AtomicBool::new(false),
            terminals,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            errors: Mutex::new(ErrorStats::default()),
        })
    }

    /// Create a coupler from its configuration section
    pub fn from_config(
        config: &CouplerConfig,
        transport: impl RegisterTransport + 'static,
    ) -> Result<Self, CouplerError> {
        let terminals = config.terminals()?;
        Ok(Self::new(&config.name, transport, terminals)?.with_lock_timeout(config.lock_timeout()))
    }

    /// Set the bus lock budget used by channel operations
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Coupler name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bus lock budget used by channel operations
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Terminals in slot order
    pub fn terminals(&self) -> &[Terminal] {
        &self.terminals
    }

    /// Find a terminal by name
    pub fn terminal(&self, name: &str) -> Option<&Terminal> {
        self.terminals.iter().find(|t| t.name() == name)
    }

    pub(crate) fn terminal_index(&self, name: &str) -> Option<usize> {
        self.terminals.iter().position(|t| t.name() == name)
    }

    /// Acquire exclusive bus access, waiting at most `timeout`.
    ///
    /// On timeout nothing has been done and the caller holds nothing.
    pub fn lock(&self, timeout: Duration) -> Result<BusGuard<'_>, CouplerError> {
        match self.bus.try_lock_for(timeout) {
            Some(bus) => Ok(BusGuard { coupler: self, bus }),
            None => Err(CouplerError::LockTimeout {
                coupler: self.name.clone(),
                timeout,
            }),
        }
    }

    /// Release bus access. Equivalent to dropping the guard.
    pub fn unlock(&self, guard: BusGuard<'_>) {
        debug_assert!(std::ptr::eq(guard.coupler, self), "guard from another coupler");
        drop(guard);
    }

    /// Current liveness. Never blocks.
    pub fn verify_connection(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Record an error. Logs and counts; never alters control flow.
    pub fn report_error(&self, error: &CouplerError, context: &str) {
        let kind = error.kind();
        match kind {
            ErrorKind::LockTimeout | ErrorKind::Connectivity => {
                tracing::warn!(coupler = %self.name, %kind, "{}: {}", context, error);
            }
            _ => {
                tracing::error!(coupler = %self.name, %kind, "{}: {}", context, error);
            }
        }

        let mut stats = self.errors.lock();
        *stats.counts.entry(kind).or_insert(0) += 1;
        stats.last = Some(ErrorRecord {
            kind,
            message: error.to_string(),
            context: context.to_string(),
            at: Local::now(),
        });
    }

    /// Snapshot of reported errors
    pub fn error_stats(&self) -> ErrorStats {
        self.errors.lock().clone()
    }
}

/// Exclusive access to a coupler's bus.
///
/// Register I/O is only reachable through a guard, so it cannot be issued
/// without holding the lock:
///
/// ```compile_fail
/// # use ekbus_core::{Coupler, FunctionCode};
/// # fn read(coupler: &Coupler) {
/// let mut buf = [0u16; 1];
/// coupler.perform_io(FunctionCode::ReadInputRegisters, 0, &mut buf);
/// # }
/// ```
pub struct BusGuard<'a> {
    coupler: &'a Coupler,
    bus: MutexGuard<'a, Bus>,
}

impl std::fmt::Debug for BusGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusGuard")
            .field("coupler", &self.coupler.name)
            .finish_non_exhaustive()
    }
}

impl<'a> BusGuard<'a> {
    /// Coupler this guard belongs to
    pub fn coupler(&self) -> &'a Coupler {
        self.coupler
    }

    /// Run the transport handshake and mark the coupler connected
    pub fn connect(&mut self) -> Result<(), CouplerError> {
        self.bus
            .transport
            .connect()
            .map_err(|source| CouplerError::Transport {
                coupler: self.coupler.name.clone(),
                function: "Connect",
                address: 0,
                source,
            })?;
        if !self.coupler.connected.swap(true, Ordering::AcqRel) {
            tracing::info!(coupler = %self.coupler.name, "Coupler connected");
        }
        Ok(())
    }

    /// Mark the coupler disconnected
    pub fn disconnect(&mut self) {
        if self.coupler.connected.swap(false, Ordering::AcqRel) {
            tracing::info!(coupler = %self.coupler.name, "Coupler disconnected");
        }
    }

    /// Read the model id reported for `slot` (0 for an empty slot)
    pub fn read_terminal_id(&mut self, slot: u16) -> Result<u16, CouplerError> {
        let address = TERMINAL_ID_BASE.checked_add(slot).ok_or_else(|| {
            CouplerError::InvalidRequest(format!("terminal id of slot {}", slot))
        })?;
        let mut id = [0u16; 1];
        self.perform_io(FunctionCode::ReadHoldingRegisters, address, &mut id)?;
        Ok(id[0])
    }

    /// Transfer `buffer.len()` registers at `address`.
    ///
    /// Reads fill `buffer`; writes send it. There is no retry: a transport
    /// failure marks the coupler disconnected and is returned as is.
    pub fn perform_io(
        &mut self,
        function: FunctionCode,
        address: u16,
        buffer: &mut [u16],
    ) -> Result<(), CouplerError> {
        if !self.coupler.verify_connection() {
            return Err(CouplerError::NotConnected(self.coupler.name.clone()));
        }
        if buffer.is_empty() || usize::from(address) + buffer.len() > 0x1_0000 {
            return Err(CouplerError::InvalidRequest(format!(
                "{} of {} registers at {}",
                function.name(),
                buffer.len(),
                address
            )));
        }

        tracing::debug!(
            coupler = %self.coupler.name,
            function = function.name(),
            address,
            count = buffer.len(),
            "Register I/O"
        );

        let space = function.space();
        let result = if function.is_write() {
            self.bus.transport.write(space, address, buffer)
        } else {
            self.bus.transport.read(space, address, buffer)
        };

        result.map_err(|source| {
            self.disconnect();
            CouplerError::Transport {
                coupler: self.coupler.name.clone(),
                function: function.name(),
                address,
                source,
            }
        })
    }
}
