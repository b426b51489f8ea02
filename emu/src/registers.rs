use serde::{Deserialize, Serialize};

/// Bit 0 of the status register: gates the whole controller output.
pub const GLOBAL_IRQ_ENABLED: u32 = 0x0000_0001;

/// Bit 0 of a line register: the source currently asserts its interrupt.
pub const IRQ_ACTIVE: u8 = 0x01;

/// Bit 7 of a line register: the line may contribute to aggregation.
pub const IRQ_ENABLED: u8 = 0x80;

/// Byte offset of the first per-line register. The 32-bit status register
/// conceptually occupies offsets 0..4, but only offset 0 is decoded.
pub const LINE_REGS_OFFSET: usize = 4;

/// Register bank of the interrupt aggregator: one 32-bit status register
/// plus one 8-bit register per interrupt line.
///
/// Bounds on the line index are the caller's contract, the bank indexes
/// directly. Bits other than [`IRQ_ACTIVE`] and [`IRQ_ENABLED`] are
/// reserved and round-trip unchanged through read/write.
#[derive(Serialize, Deserialize)]
pub struct IrqRegisters {
    status: u32,
    lines: Vec<u8>,
}

impl IrqRegisters {
    #[must_use]
    pub fn new(num_lines: usize) -> Self {
        Self {
            status: 0,
            lines: vec![0; num_lines],
        }
    }

    #[must_use]
    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub const fn read_status(&self) -> u32 {
        self.status
    }

    pub const fn write_status(&mut self, value: u32) {
        self.status = value;
    }

    #[must_use]
    pub fn read_line(&self, line: usize) -> u8 {
        self.lines[line]
    }

    pub fn write_line(&mut self, line: usize, value: u8) {
        self.lines[line] = value;
    }

    #[must_use]
    pub const fn global_enabled(&self) -> bool {
        self.status & GLOBAL_IRQ_ENABLED != 0
    }

    /// Total number of byte offsets the controller decodes.
    #[must_use]
    pub fn address_space_size(&self) -> usize {
        self.lines.len() + LINE_REGS_OFFSET
    }
}
