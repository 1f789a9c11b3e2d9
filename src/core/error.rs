//! Coupler error taxonomy

use super::pdo::DecodeError;
use super::transport::TransportError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error raised by coupler, binding or channel operations
#[derive(Error, Debug)]
pub enum CouplerError {
    /// Bus access not granted within the timeout; nothing was performed
    #[error("Coupler {coupler}: bus lock not acquired within {timeout:?}")]
    LockTimeout {
        /// Coupler name
        coupler: String,
        /// Budget that elapsed
        timeout: Duration,
    },

    /// Coupler is disconnected; I/O fails fast until it reconnects
    #[error("Coupler {0} is not connected")]
    NotConnected(String),

    /// Register transfer failed at the protocol level
    #[error("Coupler {coupler}: {function} at {address} failed: {source}")]
    Transport {
        /// Coupler name
        coupler: String,
        /// Function name
        function: &'static str,
        /// Start address of the transfer
        address: u16,
        /// Transport failure
        #[source]
        source: TransportError,
    },

    /// Physical terminal differs from the configured one
    #[error("Terminal id mismatch in slot {slot}: expected {expected}, found {found}")]
    IdentityMismatch {
        /// Slot index
        slot: u16,
        /// Configured model id
        expected: u16,
        /// Id read back from the coupler (0 for an empty slot)
        found: u16,
    },

    /// Process data could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Channel number not valid for the terminal
    #[error("Channel {channel} out of range for terminal {terminal}")]
    ChannelOutOfRange {
        /// Terminal name
        terminal: String,
        /// Requested channel
        channel: u16,
    },

    /// No terminal with this name on the coupler
    #[error("Unknown terminal: {0}")]
    UnknownTerminal(String),

    /// Malformed I/O request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Channel disabled by an earlier identity or decode failure
    #[error("Channel {channel} is invalid: {reason}")]
    ChannelInvalid {
        /// Channel record name
        channel: String,
        /// Failure that disabled the channel
        reason: String,
    },

    /// Terminal list could not be built from configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error category, used for error accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Lock timeout
    LockTimeout,
    /// Connectivity
    Connectivity,
    /// Transport
    Transport,
    /// Identity mismatch
    IdentityMismatch,
    /// Decode failure
    Decode,
    /// Caller or configuration mistake
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LockTimeout => "lock timeout",
            Self::Connectivity => "connectivity",
            Self::Transport => "transport",
            Self::IdentityMismatch => "identity mismatch",
            Self::Decode => "decode",
            Self::Configuration => "configuration",
        };
        write!(f, "{}", name)
    }
}

impl CouplerError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LockTimeout { .. } => ErrorKind::LockTimeout,
            Self::NotConnected(_) => ErrorKind::Connectivity,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::IdentityMismatch { .. } => ErrorKind::IdentityMismatch,
            Self::Decode(_) => ErrorKind::Decode,
            Self::ChannelOutOfRange { .. }
            | Self::UnknownTerminal(_)
            | Self::InvalidRequest(_)
            | Self::ChannelInvalid { .. }
            | Self::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Whether the next trigger may succeed without reconfiguration
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LockTimeout { .. } | Self::NotConnected(_) => true,
            Self::Transport { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether the failure disables the channel until it is reconfigured
    pub fn invalidates_channel(&self) -> bool {
        matches!(self.kind(), ErrorKind::IdentityMismatch | ErrorKind::Decode)
    }
}
