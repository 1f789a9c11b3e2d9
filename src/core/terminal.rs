//! Terminal descriptors and the model catalogue
//!
//! A [`Terminal`] is the static description of one plug-in module: which
//! model it is, where it sits on the coupler, and where its input image
//! starts. Descriptors are built once and never change afterwards.

use super::family::TerminalFamily;
use super::pdo::DecodeError;
use std::fmt;

/// Catalogue entry for a supported terminal model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalModel {
    /// Numeric model identifier as reported by the coupler (e.g. 5001)
    pub id: u16,
    /// Order name
    pub name: &'static str,
    /// Terminal family
    pub family: TerminalFamily,
    /// Number of channels
    pub channels: u16,
    /// Input image size: bits for digital inputs, registers otherwise
    pub input_size: u16,
}

const fn digital(id: u16, name: &'static str, channels: u16) -> TerminalModel {
    TerminalModel {
        id,
        name,
        family: TerminalFamily::DigitalInput,
        channels,
        input_size: channels,
    }
}

/// All supported models
pub static MODELS: &[TerminalModel] = &[
    digital(1001, "EL1001", 1),
    digital(1002, "EL1002", 2),
    digital(1004, "EL1004", 4),
    digital(1008, "EL1008", 8),
    digital(1012, "EL1012", 2),
    digital(1014, "EL1014", 4),
    digital(1018, "EL1018", 8),
    digital(1024, "EL1024", 4),
    digital(1034, "EL1034", 4),
    digital(1084, "EL1084", 4),
    digital(1088, "EL1088", 8),
    digital(1104, "EL1104", 4),
    digital(1114, "EL1114", 4),
    digital(1124, "EL1124", 4),
    digital(1144, "EL1144", 4),
    digital(1804, "EL1804", 4),
    digital(1808, "EL1808", 8),
    digital(1809, "EL1809", 16),
    digital(1819, "EL1819", 16),
    TerminalModel {
        id: 5001,
        name: "EL5001",
        family: TerminalFamily::EncoderCounter,
        channels: 1,
        input_size: super::pdo::EL5001.register_count(),
    },
    TerminalModel {
        id: 5002,
        name: "EL5002",
        family: TerminalFamily::EncoderCounter,
        channels: 1,
        input_size: super::pdo::EL5002.register_count(),
    },
    TerminalModel {
        id: 5042,
        name: "EL5042",
        family: TerminalFamily::MultiChannelPosition,
        channels: 2,
        input_size: 2 * super::pdo::EL5042.register_count(),
    },
];

/// Look up a model by identifier
pub fn lookup(id: u16) -> Option<&'static TerminalModel> {
    MODELS.iter().find(|m| m.id == id)
}

/// Whether `id` names a supported digital-input model
pub fn is_digital_input(id: u16) -> bool {
    lookup(id).is_some_and(|m| m.family == TerminalFamily::DigitalInput)
}

/// Static descriptor of one terminal on a coupler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminal {
    name: String,
    slot: u16,
    model: &'static TerminalModel,
    input_start: u16,
}

impl Terminal {
    /// Describe the terminal in `slot` (1-based) whose input image begins
    /// at `input_start`.
    pub fn new(
        name: impl Into<String>,
        slot: u16,
        model_id: u16,
        input_start: u16,
    ) -> Result<Self, DecodeError> {
        let model = lookup(model_id).ok_or(DecodeError::UnknownModel(model_id))?;
        Ok(Self {
            name: name.into(),
            slot,
            model,
            input_start,
        })
    }

    /// Terminal name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position on the coupler, 1-based
    pub fn slot(&self) -> u16 {
        self.slot
    }

    /// Configured model identifier
    pub fn model_id(&self) -> u16 {
        self.model.id
    }

    /// Catalogue entry
    pub fn model(&self) -> &'static TerminalModel {
        self.model
    }

    /// Terminal family
    pub fn family(&self) -> TerminalFamily {
        self.model.family
    }

    /// First input bit/register
    pub fn input_start(&self) -> u16 {
        self.input_start
    }

    /// Input image size (bits for digital inputs, registers otherwise)
    pub fn input_size(&self) -> u16 {
        self.model.input_size
    }

    /// Number of channels
    pub fn channel_count(&self) -> u16 {
        self.model.channels
    }

    /// Valid channel numbers for this terminal
    pub fn channels(&self) -> std::ops::RangeInclusive<u16> {
        let first = self.family().first_channel();
        first..=first + self.channel_count() - 1
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} @ slot {})", self.name, self.model.name, self.slot)
    }
}

/// Assigns slots and input offsets to terminals in wiring order.
///
/// Digital terminals are packed into the discrete-input bit image and
/// every other family into the input-register image; the two images are
/// numbered independently from zero.
#[derive(Debug, Default)]
pub struct ProcessImage {
    terminals: Vec<Terminal>,
    next_bit: u16,
    next_register: u16,
}

impl ProcessImage {
    /// Start an empty image
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next terminal on the bus
    pub fn push(&mut self, name: impl Into<String>, model_id: u16) -> Result<&Terminal, DecodeError> {
        let model = lookup(model_id).ok_or(DecodeError::UnknownModel(model_id))?;
        let slot = self.terminals.len() as u16 + 1;
        let cursor = match model.family {
            TerminalFamily::DigitalInput => &mut self.next_bit,
            _ => &mut self.next_register,
        };
        let start = *cursor;
        *cursor += model.input_size;

        self.terminals.push(Terminal::new(name, slot, model_id, start)?);
        Ok(&self.terminals[self.terminals.len() - 1])
    }

    /// Finish and return the terminals in slot order
    pub fn into_terminals(self) -> Vec<Terminal> {
        self.terminals
    }
}
