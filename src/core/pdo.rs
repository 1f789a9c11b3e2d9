//! Process Data Object codec
//!
//! Pure decoding of the packed input images the coupler exposes for each
//! terminal model. Layouts mirror the hardware memory maps bit for bit and
//! are expressed as explicit byte offsets and bit positions; nothing here
//! relies on in-memory struct layout.
//!
//! The coupler hands back 16-bit registers. The byte view of a buffer is
//! each register's low byte followed by its high byte, which is the order
//! the terminal's PDO bytes were packed in.

use std::fmt;
use thiserror::Error;

/// Fault condition raised by a status bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Fault {
    /// Terminal reports a warning
    Warning = 0x01,
    /// Data on this channel is not valid
    Error = 0x02,
    /// Framing error on the sensor link
    FrameError = 0x04,
    /// Sensor link lost synchronisation
    SyncError = 0x08,
    /// Communication with the sensor failed
    CommError = 0x10,
}

impl Fault {
    /// All faults in bit order
    pub const ALL: [Fault; 5] = [
        Fault::Warning,
        Fault::Error,
        Fault::FrameError,
        Fault::SyncError,
        Fault::CommError,
    ];

    /// Get name of fault
    pub fn name(&self) -> &'static str {
        match self {
            Fault::Warning => "warning",
            Fault::Error => "error",
            Fault::FrameError => "frame error",
            Fault::SyncError => "sync error",
            Fault::CommError => "comm error",
        }
    }
}

/// Set of [`Fault`]s
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FaultFlags(u8);

impl FaultFlags {
    /// No faults
    pub const EMPTY: FaultFlags = FaultFlags(0);

    /// Build a set from a list of faults
    pub const fn of(faults: &[Fault]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < faults.len() {
            bits |= faults[i] as u8;
            i += 1;
        }
        FaultFlags(bits)
    }

    /// Check membership
    pub fn contains(&self, fault: Fault) -> bool {
        self.0 & fault as u8 != 0
    }

    /// Add every fault in `other`
    pub fn insert(&mut self, other: FaultFlags) {
        self.0 |= other.0;
    }

    /// True when no fault is set
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate set faults in bit order
    pub fn iter(&self) -> impl Iterator<Item = Fault> + '_ {
        Fault::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl fmt::Display for FaultFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "ok");
        }
        let names: Vec<_> = self.iter().map(|fault| fault.name()).collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Alarm severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Value usable, attention advised
    Minor,
    /// Value questionable
    Major,
    /// Value must not be used
    Invalid,
}

/// What part of the chain raised the alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmCondition {
    /// Terminal flagged the sample itself
    Read,
    /// Link between terminal and sensor
    Comm,
}

/// Alarm derived from a reading's status bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alarm {
    /// Condition
    pub condition: AlarmCondition,
    /// Severity
    pub severity: Severity,
}

/// Payload width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// 16-bit unsigned
    U16,
    /// 32-bit unsigned
    U32,
}

impl Width {
    /// Width in bytes
    pub const fn bytes(&self) -> usize {
        match self {
            Width::U16 => 2,
            Width::U32 => 4,
        }
    }
}

/// One row of a model's status mapping table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusBit {
    /// Bit position within the little-endian status word
    pub bit: u8,
    /// Hardware name of the bit
    pub name: &'static str,
    /// Faults raised when the bit is set
    pub faults: FaultFlags,
    /// Alarm raised when the bit is set
    pub alarm: Alarm,
}

const fn status(
    bit: u8,
    name: &'static str,
    faults: &[Fault],
    condition: AlarmCondition,
    severity: Severity,
) -> StatusBit {
    StatusBit {
        bit,
        name,
        faults: FaultFlags::of(faults),
        alarm: Alarm {
            condition,
            severity,
        },
    }
}

/// Binary layout of one PDO (one channel's slice for multi-channel models)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdoLayout {
    /// Layout name
    pub name: &'static str,
    /// Bytes of status at offset 0 (0, 1 or 2)
    pub status_bytes: usize,
    /// Mapped status bits
    pub status_bits: &'static [StatusBit],
    /// Byte offset of the numeric payload
    pub value_offset: usize,
    /// Width of the numeric payload
    pub value_width: Width,
    /// Packed size in bytes, before rounding to whole registers
    pub size: usize,
}

impl PdoLayout {
    /// Registers occupied on the coupler; odd byte counts round up
    pub const fn register_count(&self) -> u16 {
        ((self.size + 1) / 2) as u16
    }

    /// Build the raw registers the coupler would return for `value` and a
    /// raw status word. Bits outside `status_bytes` are dropped.
    pub fn encode(&self, value: u32, status: u16) -> Vec<u16> {
        let mut bytes = vec![0u8; usize::from(self.register_count()) * 2];
        let status = status.to_le_bytes();
        bytes[..self.status_bytes].copy_from_slice(&status[..self.status_bytes]);
        let value = value.to_le_bytes();
        let width = self.value_width.bytes();
        bytes[self.value_offset..self.value_offset + width].copy_from_slice(&value[..width]);
        registers_from_bytes(&bytes)
    }

    fn decode(&self, model_id: u16, registers: &[u16]) -> Result<Reading, DecodeError> {
        let needed = usize::from(self.register_count());
        if registers.len() < needed {
            return Err(DecodeError::ShortBuffer {
                model_id,
                expected: needed,
                actual: registers.len(),
            });
        }

        let bytes = register_bytes(&registers[..needed]);
        tracing::trace!(model_id, pdo = %hex::encode(&bytes), "decoding {}", self.name);

        let mut word = [0u8; 2];
        word[..self.status_bytes].copy_from_slice(&bytes[..self.status_bytes]);
        let status = u16::from_le_bytes(word);

        let mut raw = [0u8; 4];
        let width = self.value_width.bytes();
        raw[..width].copy_from_slice(&bytes[self.value_offset..self.value_offset + width]);
        let value = u32::from_le_bytes(raw);

        let mut flags = FaultFlags::EMPTY;
        let mut alarm: Option<Alarm> = None;
        for entry in self.status_bits {
            if status & (1 << entry.bit) == 0 {
                continue;
            }
            flags.insert(entry.faults);
            if alarm.map_or(true, |a| entry.alarm.severity > a.severity) {
                alarm = Some(entry.alarm);
            }
        }

        Ok(Reading {
            value,
            flags,
            alarm,
        })
    }
}

/// Single-bit digital input: one register slot holding the input state
pub const DIGITAL_INPUT: PdoLayout = PdoLayout {
    name: "EL1xxx input",
    status_bytes: 0,
    status_bits: &[],
    value_offset: 0,
    value_width: Width::U16,
    size: 2,
};

/// EL5001 SSI encoder: status byte, u32 position, one pad byte
pub const EL5001: PdoLayout = PdoLayout {
    name: "EL5001 input",
    status_bytes: 1,
    status_bits: &[
        status(0, "data_error", &[Fault::Error], AlarmCondition::Read, Severity::Invalid),
        status(1, "frame_error", &[Fault::FrameError], AlarmCondition::Read, Severity::Major),
        status(
            5,
            "sync_err",
            &[Fault::SyncError, Fault::Error],
            AlarmCondition::Read,
            Severity::Invalid,
        ),
    ],
    value_offset: 1,
    value_width: Width::U32,
    size: 6,
};

/// EL5002 SSI encoder with the extended 16-bit status word
pub const EL5002: PdoLayout = PdoLayout {
    name: "EL5002 input",
    status_bytes: 2,
    status_bits: &[
        status(0, "data_error", &[Fault::Error], AlarmCondition::Read, Severity::Invalid),
        status(1, "frame_error", &[Fault::CommError], AlarmCondition::Comm, Severity::Major),
    ],
    value_offset: 2,
    value_width: Width::U32,
    size: 6,
};

/// EL5042 BiSS-C interface, one channel
pub const EL5042: PdoLayout = PdoLayout {
    name: "EL5042 channel input",
    status_bytes: 2,
    status_bits: &[
        status(0, "warning", &[Fault::Warning], AlarmCondition::Read, Severity::Minor),
        status(1, "error", &[Fault::Error], AlarmCondition::Read, Severity::Major),
    ],
    value_offset: 2,
    value_width: Width::U32,
    size: 6,
};

/// Layout for a model identifier, if the model is supported
pub fn layout_for(model_id: u16) -> Option<&'static PdoLayout> {
    match model_id {
        5001 => Some(&EL5001),
        5002 => Some(&EL5002),
        5042 => Some(&EL5042),
        id if crate::core::terminal::is_digital_input(id) => Some(&DIGITAL_INPUT),
        _ => None,
    }
}

/// Decoded value and fault state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Unsigned payload, zero-extended
    pub value: u32,
    /// Faults raised by status bits
    pub flags: FaultFlags,
    /// Most severe alarm raised by status bits
    pub alarm: Option<Alarm>,
}

impl Reading {
    /// True when no fault bit was set
    pub fn is_clean(&self) -> bool {
        self.flags.is_empty()
    }
}

/// PDO decode failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No layout known for this model
    #[error("Unknown terminal model {0}")]
    UnknownModel(u16),

    /// Buffer smaller than the model's footprint
    #[error("Short PDO buffer for model {model_id}: expected {expected} registers, got {actual}")]
    ShortBuffer {
        /// Model identifier
        model_id: u16,
        /// Registers required
        expected: usize,
        /// Registers supplied
        actual: usize,
    },
}

/// Decode a raw register buffer for `model_id`.
///
/// Unknown models are an error, never a zero reading.
pub fn decode(model_id: u16, registers: &[u16]) -> Result<Reading, DecodeError> {
    layout_for(model_id)
        .ok_or(DecodeError::UnknownModel(model_id))?
        .decode(model_id, registers)
}

/// Byte view of a register buffer (low byte first)
pub fn register_bytes(registers: &[u16]) -> Vec<u8> {
    registers.iter().flat_map(|r| r.to_le_bytes()).collect()
}

/// Pack bytes into registers (low byte first); a trailing odd byte is padded
pub fn registers_from_bytes(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk.get(1).copied().unwrap_or(0)]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODER_MODELS: [(u16, &PdoLayout); 3] = [(5001, &EL5001), (5002, &EL5002), (5042, &EL5042)];

    #[test]
    fn test_el5001_scenario_buffer() {
        // status 0x00, value 0x00000042, pad
        let bytes = [0x00, 0x42, 0x00, 0x00, 0x00, 0x00];
        let registers = registers_from_bytes(&bytes);
        assert_eq!(registers, vec![0x4200, 0x0000, 0x0000]);

        let reading = decode(5001, &registers).unwrap();
        assert_eq!(reading.value, 66);
        assert!(reading.flags.is_empty());
        assert_eq!(reading.alarm, None);
    }

    #[test]
    fn test_el5001_unaligned_value() {
        let bytes = [0x00, 0x78, 0x56, 0x34, 0x12, 0xAA];
        let reading = decode(5001, &registers_from_bytes(&bytes)).unwrap();
        assert_eq!(reading.value, 0x1234_5678);
    }

    #[test]
    fn test_encode_exact_bytes() {
        assert_eq!(
            register_bytes(&EL5001.encode(0x0102_0304, 0x21)),
            vec![0x21, 0x04, 0x03, 0x02, 0x01, 0x00]
        );
        assert_eq!(
            register_bytes(&EL5002.encode(0x0102_0304, 0x0003)),
            vec![0x03, 0x00, 0x04, 0x03, 0x02, 0x01]
        );
        assert_eq!(
            register_bytes(&EL5042.encode(7, 0x1002)),
            vec![0x02, 0x10, 0x07, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_clean_status_returns_value() {
        for (model, layout) in ENCODER_MODELS {
            let reading = decode(model, &layout.encode(0xDEAD_BEEF, 0)).unwrap();
            assert_eq!(reading.value, 0xDEAD_BEEF, "model {}", model);
            assert!(reading.is_clean(), "model {}", model);
        }
        let reading = decode(1008, &DIGITAL_INPUT.encode(1, 0)).unwrap();
        assert_eq!(reading.value, 1);
        assert!(reading.is_clean());
    }

    #[test]
    fn test_value_is_not_sign_extended() {
        let reading = decode(5002, &EL5002.encode(u32::MAX, 0)).unwrap();
        assert_eq!(reading.value, u32::MAX);
    }

    #[test]
    fn test_el5001_single_bits() {
        let cases = [
            (0, FaultFlags::of(&[Fault::Error]), Severity::Invalid),
            (1, FaultFlags::of(&[Fault::FrameError]), Severity::Major),
            (5, FaultFlags::of(&[Fault::SyncError, Fault::Error]), Severity::Invalid),
        ];
        for (bit, flags, severity) in cases {
            let reading = decode(5001, &EL5001.encode(0, 1 << bit)).unwrap();
            assert_eq!(reading.flags, flags, "bit {}", bit);
            assert_eq!(reading.alarm.unwrap().severity, severity);
            assert_eq!(reading.alarm.unwrap().condition, AlarmCondition::Read);
        }
        // power_fail, data_mismatch, txpdo bits are not mapped
        for bit in [2, 3, 4, 6, 7] {
            let reading = decode(5001, &EL5001.encode(0, 1 << bit)).unwrap();
            assert!(reading.is_clean(), "bit {}", bit);
        }
    }

    #[test]
    fn test_el5002_single_bits() {
        let reading = decode(5002, &EL5002.encode(0, 0x0001)).unwrap();
        assert_eq!(reading.flags, FaultFlags::of(&[Fault::Error]));
        assert_eq!(reading.alarm.unwrap().severity, Severity::Invalid);

        let reading = decode(5002, &EL5002.encode(0, 0x0002)).unwrap();
        assert_eq!(reading.flags, FaultFlags::of(&[Fault::CommError]));
        assert_eq!(
            reading.alarm,
            Some(Alarm {
                condition: AlarmCondition::Comm,
                severity: Severity::Major
            })
        );

        for bit in 2..16 {
            assert!(decode(5002, &EL5002.encode(0, 1 << bit)).unwrap().is_clean());
        }
    }

    #[test]
    fn test_el5042_single_bits() {
        let reading = decode(5042, &EL5042.encode(10, 0x0001)).unwrap();
        assert_eq!(reading.flags, FaultFlags::of(&[Fault::Warning]));
        assert_eq!(reading.alarm.unwrap().severity, Severity::Minor);

        let reading = decode(5042, &EL5042.encode(10, 0x0002)).unwrap();
        assert_eq!(reading.flags, FaultFlags::of(&[Fault::Error]));
        assert_eq!(reading.alarm.unwrap().severity, Severity::Major);

        // ready, diag, txpdo state, cycle counter
        for bit in [2, 12, 13, 14, 15] {
            assert!(decode(5042, &EL5042.encode(10, 1 << bit)).unwrap().is_clean());
        }
    }

    #[test]
    fn test_highest_severity_wins() {
        let reading = decode(5042, &EL5042.encode(0, 0x0003)).unwrap();
        assert_eq!(reading.flags, FaultFlags::of(&[Fault::Warning, Fault::Error]));
        assert_eq!(reading.alarm.unwrap().severity, Severity::Major);

        let reading = decode(5001, &EL5001.encode(0, 0x03)).unwrap();
        assert_eq!(reading.alarm.unwrap().severity, Severity::Invalid);
    }

    #[test]
    fn test_unknown_model() {
        assert_eq!(decode(4132, &[0; 8]), Err(DecodeError::UnknownModel(4132)));
        assert_eq!(decode(0, &[0; 8]), Err(DecodeError::UnknownModel(0)));
    }

    #[test]
    fn test_short_buffer() {
        let err = decode(5001, &[0, 0]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ShortBuffer {
                model_id: 5001,
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_register_count_rounds_up() {
        let odd = PdoLayout { size: 5, ..EL5001 };
        assert_eq!(odd.register_count(), 3);
        assert_eq!(EL5001.register_count(), 3);
        assert_eq!(DIGITAL_INPUT.register_count(), 1);
    }

    #[test]
    fn test_fault_flags_display() {
        assert_eq!(FaultFlags::EMPTY.to_string(), "ok");
        assert_eq!(
            FaultFlags::of(&[Fault::SyncError, Fault::Error]).to_string(),
            "error|sync error"
        );
    }
}
