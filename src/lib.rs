//! # Ekbus Core Library
//!
//! Terminal communication and process-data decoding for Modbus bus
//! couplers with plug-in I/O terminals:
//! - Bus arbitration over one shared connection per coupler
//! - Terminal identity verification
//! - Register address resolution per terminal family
//! - Decoding of packed PDOs into values, faults and alarms
//!
//! The Modbus transport itself is supplied by the host through
//! [`RegisterTransport`]; record scheduling lives in the host as well.
//!
//! ## Example
//!
//! ```rust
//! use ekbus_core::{ChannelTable, Coupler, CouplerConfig, SimulatedCoupler, pdo};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), ekbus_core::CouplerError> {
//! let config = CouplerConfig::new("ek1", "192.168.1.3")
//!     .terminal("DI1", 1008)
//!     .terminal("ENC1", 5001);
//!
//! let sim = SimulatedCoupler::new();
//! sim.install(&config.terminals()?);
//! let coupler = Arc::new(Coupler::from_config(&config, sim.clone())?);
//! coupler.lock(coupler.lock_timeout())?.connect()?;
//!
//! let mut channels = ChannelTable::new();
//! let enc = channels.bind("enc", &coupler, "ENC1", 1)?;
//! sim.set_pdo(coupler.terminal("ENC1").unwrap(), 1, &pdo::EL5001.encode(42, 0));
//!
//! let reading = channels.read(enc)?;
//! assert_eq!(reading.value, 42);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::config::{Config, CouplerConfig, LoggingConfig, TerminalConfig};
pub use crate::core::address::{resolve, RegisterRange};
pub use crate::core::binding::{parse_record_name, ChannelBinding, ChannelId, ChannelState, ChannelTable};
pub use crate::core::coupler::{BusGuard, Coupler, ErrorRecord, ErrorStats};
pub use crate::core::error::{CouplerError, ErrorKind};
pub use crate::core::family::{FamilySupport, TerminalFamily};
pub use crate::core::pdo::{self, decode, Alarm, AlarmCondition, DecodeError, Fault, FaultFlags, Reading, Severity};
pub use crate::core::simulator::SimulatedCoupler;
pub use crate::core::terminal::{ProcessImage, Terminal, TerminalModel};
pub use crate::core::transport::{ExceptionCode, FunctionCode, RegisterSpace, RegisterTransport, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
