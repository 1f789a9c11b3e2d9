//! Register transport seam
//!
//! The coupler speaks Modbus, but framing, sockets and wire-level retries
//! belong to the host. This module defines the synchronous register
//! primitive the core consumes, plus the function and exception codes
//! needed to describe what went wrong on the wire.

use std::fmt;
use thiserror::Error;

/// Addressable region of the coupler's memory map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterSpace {
    /// Output bits (read/write)
    Coils,
    /// Input bits (read only)
    DiscreteInputs,
    /// Input registers (read only)
    InputRegisters,
    /// Holding registers (read/write)
    HoldingRegisters,
}

impl RegisterSpace {
    /// Whether the host may write into this space
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Coils | Self::HoldingRegisters)
    }
}

impl fmt::Display for RegisterSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coils => write!(f, "coils"),
            Self::DiscreteInputs => write!(f, "discrete inputs"),
            Self::InputRegisters => write!(f, "input registers"),
            Self::HoldingRegisters => write!(f, "holding registers"),
        }
    }
}

/// Modbus function codes used for terminal I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read Coils (0x01)
    ReadCoils = 0x01,
    /// Read Discrete Inputs (0x02)
    ReadDiscreteInputs = 0x02,
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (0x04)
    ReadInputRegisters = 0x04,
    /// Write Multiple Coils (0x0F)
    WriteMultipleCoils = 0x0F,
    /// Write Multiple Registers (0x10)
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    /// Get function code from u8
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::ReadCoils),
            0x02 => Some(Self::ReadDiscreteInputs),
            0x03 => Some(Self::ReadHoldingRegisters),
            0x04 => Some(Self::ReadInputRegisters),
            0x0F => Some(Self::WriteMultipleCoils),
            0x10 => Some(Self::WriteMultipleRegisters),
            _ => None,
        }
    }

    /// Register space this function operates on
    pub fn space(&self) -> RegisterSpace {
        match self {
            Self::ReadCoils | Self::WriteMultipleCoils => RegisterSpace::Coils,
            Self::ReadDiscreteInputs => RegisterSpace::DiscreteInputs,
            Self::ReadInputRegisters => RegisterSpace::InputRegisters,
            Self::ReadHoldingRegisters | Self::WriteMultipleRegisters => {
                RegisterSpace::HoldingRegisters
            }
        }
    }

    /// Whether this function transfers data towards the coupler
    pub fn is_write(&self) -> bool {
        matches!(self, Self::WriteMultipleCoils | Self::WriteMultipleRegisters)
    }

    /// Get name of function code
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadCoils => "Read Coils",
            Self::ReadDiscreteInputs => "Read Discrete Inputs",
            Self::ReadHoldingRegisters => "Read Holding Registers",
            Self::ReadInputRegisters => "Read Input Registers",
            Self::WriteMultipleCoils => "Write Multiple Coils",
            Self::WriteMultipleRegisters => "Write Multiple Registers",
        }
    }
}

/// Modbus exception codes reported by the coupler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    SlaveDeviceFailure = 0x04,
    Acknowledge = 0x05,
    SlaveDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDeviceFailedToRespond = 0x0B,
}

impl ExceptionCode {
    /// Get exception from u8
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x04 => Some(Self::SlaveDeviceFailure),
            0x05 => Some(Self::Acknowledge),
            0x06 => Some(Self::SlaveDeviceBusy),
            0x08 => Some(Self::MemoryParityError),
            0x0A => Some(Self::GatewayPathUnavailable),
            0x0B => Some(Self::GatewayTargetDeviceFailedToRespond),
            _ => None,
        }
    }

    /// Get name of exception
    pub fn name(&self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal Function",
            Self::IllegalDataAddress => "Illegal Data Address",
            Self::IllegalDataValue => "Illegal Data Value",
            Self::SlaveDeviceFailure => "Slave Device Failure",
            Self::Acknowledge => "Acknowledge",
            Self::SlaveDeviceBusy => "Slave Device Busy",
            Self::MemoryParityError => "Memory Parity Error",
            Self::GatewayPathUnavailable => "Gateway Path Unavailable",
            Self::GatewayTargetDeviceFailedToRespond => "Gateway Target Failed to Respond",
        }
    }

    /// Exceptions caused by the request itself rather than device load
    pub fn is_request_fault(&self) -> bool {
        matches!(
            self,
            Self::IllegalFunction | Self::IllegalDataAddress | Self::IllegalDataValue
        )
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), *self as u8)
    }
}

/// Protocol-level failure of a register transfer
#[derive(Error, Debug)]
pub enum TransportError {
    /// Device answered with an exception response
    #[error("Modbus exception: {0}")]
    Exception(ExceptionCode),

    /// Response could not be parsed or had the wrong length
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// No response within the transport's own deadline
    #[error("Response timeout")]
    Timeout,

    /// Underlying link is down
    #[error("Not connected")]
    NotConnected,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether repeating the same request later may succeed.
    ///
    /// `false` means the request itself is wrong (bad address, unsupported
    /// function, garbage framing) and the binding should be reviewed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Exception(code) => !code.is_request_fault(),
            Self::Malformed(_) => false,
            Self::Timeout | Self::NotConnected | Self::Io(_) => true,
        }
    }
}

/// Synchronous register primitive supplied by the host.
///
/// Implementations are expected to be connection-aware and to perform no
/// retries of their own beyond what the wire protocol mandates.
#[cfg_attr(test, mockall::automock)]
pub trait RegisterTransport: Send {
    /// Establish the low-level link
    fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Read `out.len()` registers (or bits, one per element) starting at `address`
    fn read(
        &mut self,
        space: RegisterSpace,
        address: u16,
        out: &mut [u16],
    ) -> Result<(), TransportError>;

    /// Write `values` starting at `address`
    fn write(
        &mut self,
        space: RegisterSpace,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_code_round_trip() {
        for code in [0x01, 0x02, 0x03, 0x04, 0x0F, 0x10] {
            let function = FunctionCode::from_u8(code).unwrap();
            assert_eq!(function as u8, code);
        }
        assert!(FunctionCode::from_u8(0x05).is_none());
    }

    #[test]
    fn test_function_code_space() {
        assert_eq!(
            FunctionCode::ReadDiscreteInputs.space(),
            RegisterSpace::DiscreteInputs
        );
        assert_eq!(
            FunctionCode::WriteMultipleRegisters.space(),
            RegisterSpace::HoldingRegisters
        );
        assert!(FunctionCode::WriteMultipleCoils.is_write());
        assert!(!FunctionCode::ReadInputRegisters.is_write());
        assert!(!RegisterSpace::InputRegisters.is_writable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Exception(ExceptionCode::SlaveDeviceBusy).is_retryable());
        assert!(!TransportError::Exception(ExceptionCode::IllegalDataAddress).is_retryable());
        assert!(!TransportError::Malformed("short frame".into()).is_retryable());
    }

    #[test]
    fn test_exception_display() {
        let text = ExceptionCode::GatewayPathUnavailable.to_string();
        assert_eq!(text, "Gateway Path Unavailable (0x0A)");
    }
}
