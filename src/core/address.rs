//! Register address resolution
//!
//! Maps a (terminal, channel) pair to the slice of the coupler's memory map
//! that holds that channel's process data. Every rule is a pure function of
//! the terminal descriptor.

use super::pdo;
use super::terminal::Terminal;
use super::transport::RegisterSpace;
use std::fmt;

/// Contiguous run of registers (or bits) in one register space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterRange {
    /// Register space
    pub space: RegisterSpace,
    /// First address
    pub address: u16,
    /// Number of registers
    pub count: u16,
}

impl RegisterRange {
    /// One past the last address
    pub fn end(&self) -> u32 {
        u32::from(self.address) + u32::from(self.count)
    }

    /// Whether two ranges share any address
    pub fn overlaps(&self, other: &RegisterRange) -> bool {
        self.space == other.space
            && u32::from(self.address) < other.end()
            && u32::from(other.address) < self.end()
    }
}

impl fmt::Display for RegisterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}+{}", self.space, self.address, self.count)
    }
}

fn check_channel(terminal: &Terminal, channel: u16) {
    assert!(
        terminal.channels().contains(&channel),
        "channel {} out of range {:?} for terminal {}",
        channel,
        terminal.channels(),
        terminal
    );
    assert!(
        u32::from(terminal.input_start()) + u32::from(terminal.input_size()) <= 0x1_0000,
        "input image of terminal {} out of range",
        terminal
    );
}

/// Single-bit digital inputs: one discrete input per channel.
///
/// Channel numbers for this family start at 2, so the first input sits at
/// `input_start + 0`.
///
/// # Panics
///
/// Panics when `channel` is outside [`Terminal::channels`] or the input
/// image does not fit the address space.
pub fn digital_input(terminal: &Terminal, channel: u16) -> RegisterRange {
    check_channel(terminal, channel);
    RegisterRange {
        space: RegisterSpace::DiscreteInputs,
        address: terminal.input_start() + (channel - 2),
        count: 1,
    }
}

/// Single-channel encoders: the whole terminal PDO in one read.
///
/// # Panics
///
/// Panics when `channel` is outside [`Terminal::channels`] or the input
/// image does not fit the address space.
pub fn encoder(terminal: &Terminal, channel: u16) -> RegisterRange {
    check_channel(terminal, channel);
    let count = pdo::layout_for(terminal.model_id())
        .map_or(terminal.input_size(), |layout| layout.register_count());
    RegisterRange {
        space: RegisterSpace::InputRegisters,
        address: terminal.input_start(),
        count,
    }
}

/// Multi-channel position interfaces: fixed per-channel footprint.
///
/// # Panics
///
/// Panics when `channel` is outside [`Terminal::channels`] or the input
/// image does not fit the address space.
pub fn multi_channel(terminal: &Terminal, channel: u16) -> RegisterRange {
    check_channel(terminal, channel);
    let per_channel = terminal.input_size() / terminal.channel_count();
    RegisterRange {
        space: RegisterSpace::InputRegisters,
        address: terminal.input_start() + (channel - 1) * per_channel,
        count: per_channel,
    }
}

/// Resolve the register range of `channel` on `terminal`.
///
/// # Panics
///
/// Panics when `channel` is outside [`Terminal::channels`] or the input
/// image does not fit the address space; callers are expected to have
/// validated the binding.
pub fn resolve(terminal: &Terminal, channel: u16) -> RegisterRange {
    terminal.family().support().resolve(terminal, channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminal(model: u16, start: u16) -> Terminal {
        Terminal::new("t", 1, model, start).unwrap()
    }

    #[test]
    fn test_digital_input_scenario() {
        let range = resolve(&terminal(1008, 0), 3);
        assert_eq!(
            range,
            RegisterRange {
                space: RegisterSpace::DiscreteInputs,
                address: 1,
                count: 1
            }
        );
    }

    #[test]
    fn test_encoder_scenario() {
        let range = resolve(&terminal(5001, 10), 1);
        assert_eq!(range.address, 10);
        assert_eq!(range.count, 3);
        assert_eq!(range.space, RegisterSpace::InputRegisters);
    }

    #[test]
    fn test_multi_channel_scenario() {
        let t = terminal(5042, 20);
        assert_eq!(resolve(&t, 1).address, 20);
        assert_eq!(resolve(&t, 2).address, 23);
        assert_eq!(resolve(&t, 2).count, 3);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let t = terminal(5042, 7);
        assert_eq!(resolve(&t, 2), resolve(&t, 2));
    }

    #[test]
    fn test_channels_never_overlap() {
        for model in [1002, 1004, 1008, 1809, 5042] {
            let t = terminal(model, 5);
            let ranges: Vec<_> = t.channels().map(|ch| resolve(&t, ch)).collect();
            for (i, a) in ranges.iter().enumerate() {
                for b in &ranges[i + 1..] {
                    assert!(!a.overlaps(b), "model {}: {} overlaps {}", model, a, b);
                }
                assert!(a.address >= t.input_start());
                assert!(a.end() <= u32::from(t.input_start() + t.input_size()));
            }
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_channel_zero_panics() {
        resolve(&terminal(5042, 0), 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_channel_beyond_count_panics() {
        resolve(&terminal(5042, 0), 3);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_digital_reserved_channel_panics() {
        resolve(&terminal(1004, 4), 1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_image_past_address_space_panics() {
        resolve(&terminal(1008, 0xFFFC), 9);
    }

    #[test]
    fn test_overlap_requires_same_space() {
        let a = RegisterRange {
            space: RegisterSpace::InputRegisters,
            address: 0,
            count: 3,
        };
        let b = RegisterRange {
            space: RegisterSpace::DiscreteInputs,
            ..a
        };
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&RegisterRange { address: 2, ..a }));
        assert!(!a.overlaps(&RegisterRange { address: 3, ..a }));
    }
}
