//! Terminal family capabilities
//!
//! Each family knows how to locate a channel in the coupler's memory map,
//! which function reads it, and how to turn the raw registers into a
//! [`Reading`]. Host glue dispatches through [`FamilySupport`] instead of
//! naming concrete terminal types.

use super::address::{self, RegisterRange};
use super::pdo::{self, DecodeError, Reading};
use super::terminal::Terminal;
use super::transport::FunctionCode;
use std::fmt;

/// Terminal family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalFamily {
    /// EL1xxx single-bit digital inputs
    DigitalInput,
    /// EL5001/EL5002 single-channel encoders
    EncoderCounter,
    /// EL5042 multi-channel position interfaces
    MultiChannelPosition,
}

impl TerminalFamily {
    /// Lowest channel number used by this family
    pub fn first_channel(&self) -> u16 {
        match self {
            Self::DigitalInput => 2,
            Self::EncoderCounter | Self::MultiChannelPosition => 1,
        }
    }

    /// Capability implementation for this family
    pub fn support(&self) -> &'static dyn FamilySupport {
        match self {
            Self::DigitalInput => &DigitalInput,
            Self::EncoderCounter => &EncoderCounter,
            Self::MultiChannelPosition => &MultiChannelPosition,
        }
    }
}

impl fmt::Display for TerminalFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DigitalInput => write!(f, "digital input"),
            Self::EncoderCounter => write!(f, "encoder"),
            Self::MultiChannelPosition => write!(f, "multi-channel position"),
        }
    }
}

/// Per-family I/O behaviour
pub trait FamilySupport: Send + Sync {
    /// Register range holding `channel`
    fn resolve(&self, terminal: &Terminal, channel: u16) -> RegisterRange;

    /// Function used to fetch the range
    fn read_function(&self) -> FunctionCode {
        FunctionCode::ReadInputRegisters
    }

    /// Decode one channel's registers
    fn decode(&self, model_id: u16, registers: &[u16]) -> Result<Reading, DecodeError> {
        pdo::decode(model_id, registers)
    }
}

/// EL1xxx digital inputs
#[derive(Debug, Clone, Copy, Default)]
pub struct DigitalInput;

impl FamilySupport for DigitalInput {
    fn resolve(&self, terminal: &Terminal, channel: u16) -> RegisterRange {
        address::digital_input(terminal, channel)
    }

    fn read_function(&self) -> FunctionCode {
        FunctionCode::ReadDiscreteInputs
    }
}

/// Single-channel encoder interfaces
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderCounter;

impl FamilySupport for EncoderCounter {
    fn resolve(&self, terminal: &Terminal, channel: u16) -> RegisterRange {
        address::encoder(terminal, channel)
    }
}

/// Multi-channel position interfaces
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiChannelPosition;

impl FamilySupport for MultiChannelPosition {
    fn resolve(&self, terminal: &Terminal, channel: u16) -> RegisterRange {
        address::multi_channel(terminal, channel)
    }
}
