use crate::bitwise::Bits;
use crate::error::IrqError;
use crate::io_device::MmioDevice;
use crate::irq_line::IrqLine;
use crate::registers::{IRQ_ACTIVE, IRQ_ENABLED, IrqRegisters, LINE_REGS_OFFSET};

pub const DEFAULT_NUM_LINES: usize = 64;

const fn width_mask(size: usize) -> u64 {
    match size {
        1 => 0xFF,
        2 => 0xFFFF,
        4 => 0xFFFF_FFFF,
        _ => u64::MAX,
    }
}

/// Level-triggered interrupt aggregator.
///
/// Tracks the active/enabled state of `num_lines` independent sources and
/// drives a single downstream [`IrqLine`] with
/// `global_enabled && any(active && enabled)`. The output is re-evaluated
/// and pushed after every register write, every line-level change, every
/// management call, and also after every register read (an inherited quirk,
/// see [`MmioDevice::read`] below).
///
/// Single-threaded by contract: the surrounding machine serializes all
/// device accesses, so every entry point takes `&mut self` and runs to
/// completion without blocking.
pub struct IrqController {
    regs: IrqRegisters,
    output: Box<dyn IrqLine>,
}

impl IrqController {
    /// Builds a controller with `num_lines` sources, all inactive and
    /// disabled, wired to the given downstream output.
    ///
    /// # Errors
    ///
    /// Returns [`IrqError::ZeroLines`] when `num_lines` is 0.
    pub fn new(num_lines: usize, output: Box<dyn IrqLine>) -> Result<Self, IrqError> {
        if num_lines == 0 {
            return Err(IrqError::ZeroLines);
        }

        Ok(Self {
            regs: IrqRegisters::new(num_lines),
            output,
        })
    }

    /// Builds a controller with the default line count of 64.
    ///
    /// # Errors
    ///
    /// Never fails in practice, kept as `Result` for symmetry with
    /// [`Self::new`].
    pub fn with_default_lines(output: Box<dyn IrqLine>) -> Result<Self, IrqError> {
        Self::new(DEFAULT_NUM_LINES, output)
    }

    #[must_use]
    pub fn num_lines(&self) -> usize {
        self.regs.num_lines()
    }

    /// Side-effect-free view of the register bank, meant for inspectors
    /// and snapshots. Unlike an MMIO read this does not re-evaluate the
    /// output line.
    #[must_use]
    pub const fn registers(&self) -> &IrqRegisters {
        &self.regs
    }

    /// Level input for one interrupt source: `true` raises the line,
    /// `false` lowers it. Only the ACTIVE bit is touched, the ENABLED bit
    /// belongs to the management interface.
    ///
    /// The caller owns the bound: `line` must be below `num_lines`, the
    /// signal path fails fast instead of recovering.
    pub fn set_level(&mut self, line: usize, level: bool) {
        assert!(
            line < self.regs.num_lines(),
            "irq line {line} out of range"
        );

        let reg = self.regs.read_line(line);
        let reg = if level {
            reg | IRQ_ACTIVE
        } else {
            reg & !IRQ_ACTIVE
        };
        self.regs.write_line(line, reg);
        tracing::trace!("line {line} level set to {}", u8::from(level));
        self.update_irq();
    }

    /// Raises the given line, as if the source asserted its interrupt.
    ///
    /// # Errors
    ///
    /// Returns [`IrqError::LineOutOfRange`] without mutating any register
    /// when `line` is out of bounds.
    pub fn set_line(&mut self, line: usize) -> Result<(), IrqError> {
        self.check_line(line)?;
        self.set_level(line, true);
        Ok(())
    }

    /// Lowers the given line.
    ///
    /// # Errors
    ///
    /// Returns [`IrqError::LineOutOfRange`] without mutating any register
    /// when `line` is out of bounds.
    pub fn clear_line(&mut self, line: usize) -> Result<(), IrqError> {
        self.check_line(line)?;
        self.set_level(line, false);
        Ok(())
    }

    /// Lets the given line contribute to aggregation (sets its ENABLED
    /// bit). The ACTIVE bit is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`IrqError::LineOutOfRange`] without mutating any register
    /// when `line` is out of bounds.
    pub fn enable_line(&mut self, line: usize) -> Result<(), IrqError> {
        self.check_line(line)?;
        let reg = self.regs.read_line(line) | IRQ_ENABLED;
        self.regs.write_line(line, reg);
        tracing::debug!("line {line} enabled");
        self.update_irq();
        Ok(())
    }

    /// Masks the given line out of aggregation (clears its ENABLED bit).
    ///
    /// # Errors
    ///
    /// Returns [`IrqError::LineOutOfRange`] without mutating any register
    /// when `line` is out of bounds.
    pub fn disable_line(&mut self, line: usize) -> Result<(), IrqError> {
        self.check_line(line)?;
        let reg = self.regs.read_line(line) & !IRQ_ENABLED;
        self.regs.write_line(line, reg);
        tracing::debug!("line {line} disabled");
        self.update_irq();
        Ok(())
    }

    fn check_line(&self, line: usize) -> Result<(), IrqError> {
        if line < self.regs.num_lines() {
            Ok(())
        } else {
            Err(IrqError::LineOutOfRange {
                line,
                num_lines: self.regs.num_lines(),
            })
        }
    }

    fn decode_line(&self, offset: usize) -> Option<usize> {
        (LINE_REGS_OFFSET..self.regs.address_space_size())
            .contains(&offset)
            .then(|| offset - LINE_REGS_OFFSET)
    }

    /// Aggregation pass: recomputes the output level from the committed
    /// register state and pushes it downstream. The push is unconditional,
    /// identical consecutive levels are not suppressed.
    fn update_irq(&mut self) {
        let mut any_pending = false;
        for line in 0..self.regs.num_lines() {
            let reg = self.regs.read_line(line);
            let pending = reg & IRQ_ACTIVE != 0 && reg & IRQ_ENABLED != 0;
            if pending {
                tracing::trace!("line {line} pending, reg=0x{reg:02X}");
            }
            any_pending |= pending;
        }

        let level = any_pending && self.regs.global_enabled();
        tracing::debug!("aggregated output level: {}", u8::from(level));
        self.output.set_level(level);
    }
}

impl MmioDevice for IrqController {
    /// Reads the status register (offset 0, masked to the access width) or
    /// one line register (offsets 4..4+num_lines, masked to 0xFF).
    ///
    /// Every decoded read also re-runs the aggregation pass, so the output
    /// level is re-pushed as a read side effect. This mirrors the original
    /// hardware model and is observable; kept as documented behavior rather
    /// than silently fixed.
    ///
    /// Reads outside the decoded range return 0.
    fn read(&mut self, offset: usize, size: usize) -> u64 {
        debug_assert!(matches!(size, 1 | 2 | 4 | 8));

        if offset == 0 {
            let value = u64::from(self.regs.read_status()) & width_mask(size);
            tracing::trace!("status read, size {size}: 0x{value:08X}");
            self.update_irq();
            value
        } else if let Some(line) = self.decode_line(offset) {
            let value = u64::from(self.regs.read_line(line));
            tracing::trace!("line {line} read: 0x{value:02X}");
            self.update_irq();
            value
        } else {
            tracing::warn!("read from unmapped offset 0x{offset:X}, returning 0");
            0
        }
    }

    /// Writes the status register (offset 0, the low bytes of `value` are
    /// composed little-byte-first and replace the register) or one line
    /// register (offsets 4..4+num_lines, only the low byte of `value` is
    /// stored regardless of the access width).
    ///
    /// Writes outside the decoded range are ignored. Guest software probing
    /// unmapped offsets is tolerated, not fatal.
    fn write(&mut self, offset: usize, value: u64, size: usize) {
        debug_assert!(matches!(size, 1 | 2 | 4 | 8));

        if offset == 0 {
            let mut status: u32 = 0;
            for byte_nth in 0..size.min(4) {
                status.set_byte(byte_nth as u8, value.get_byte(byte_nth as u8));
            }
            self.regs.write_status(status);
            tracing::trace!("status write, size {size}: 0x{status:08X}");
            self.update_irq();
        } else if let Some(line) = self.decode_line(offset) {
            self.regs.write_line(line, value.get_byte(0));
            tracing::trace!("line {line} write: 0x{:02X}", value.get_byte(0));
            self.update_irq();
        } else {
            tracing::warn!("write to unmapped offset 0x{offset:X} ignored");
        }
    }

    fn address_space_size(&self) -> usize {
        self.regs.address_space_size()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::registers::GLOBAL_IRQ_ENABLED;

    /// Downstream consumer recording the last pushed level and how many
    /// times a level was pushed at all.
    struct Probe {
        level: Rc<Cell<bool>>,
        pushes: Rc<Cell<u32>>,
    }

    fn controller(num_lines: usize) -> (IrqController, Probe) {
        let level = Rc::new(Cell::new(false));
        let pushes = Rc::new(Cell::new(0));

        let (out_level, out_pushes) = (Rc::clone(&level), Rc::clone(&pushes));
        let ctl = IrqController::new(
            num_lines,
            Box::new(move |new_level: bool| {
                out_level.set(new_level);
                out_pushes.set(out_pushes.get() + 1);
            }),
        )
        .unwrap();

        (ctl, Probe { level, pushes })
    }

    #[test]
    fn zero_lines_is_rejected() {
        let result = IrqController::new(0, Box::new(|_: bool| {}));
        assert_eq!(result.err(), Some(IrqError::ZeroLines));
    }

    #[test]
    fn default_line_count() {
        let ctl = IrqController::with_default_lines(Box::new(|_: bool| {})).unwrap();
        assert_eq!(ctl.num_lines(), 64);
        assert_eq!(ctl.address_space_size(), 68);
    }

    #[test]
    fn set_line_touches_only_bit0() {
        let (mut ctl, _) = controller(4);

        // Preload reserved bits through the mmio path.
        ctl.write(LINE_REGS_OFFSET + 1, 0x7E, 1);
        ctl.set_line(1).unwrap();

        assert_eq!(ctl.registers().read_line(1), 0x7F);
    }

    #[test]
    fn clear_line_touches_only_bit0() {
        let (mut ctl, _) = controller(4);

        ctl.write(LINE_REGS_OFFSET + 1, 0xFF, 1);
        ctl.clear_line(1).unwrap();

        assert_eq!(ctl.registers().read_line(1), 0xFE);
    }

    #[test]
    fn enable_disable_touch_only_bit7() {
        let (mut ctl, _) = controller(4);

        ctl.set_line(3).unwrap();
        ctl.enable_line(3).unwrap();
        assert_eq!(ctl.registers().read_line(3), IRQ_ACTIVE | IRQ_ENABLED);

        ctl.disable_line(3).unwrap();
        assert_eq!(ctl.registers().read_line(3), IRQ_ACTIVE);
    }

    #[test]
    fn output_follows_aggregation_formula() {
        // Exhaustive truth table on one line of a 3-line controller:
        // output == global && (active && enabled).
        for global in [false, true] {
            for active in [false, true] {
                for enabled in [false, true] {
                    let (mut ctl, probe) = controller(3);

                    if enabled {
                        ctl.enable_line(1).unwrap();
                    }
                    ctl.set_level(1, active);
                    ctl.write(0, u64::from(global), 4);

                    let expected = global && active && enabled;
                    assert_eq!(
                        probe.level.get(),
                        expected,
                        "global={global} active={active} enabled={enabled}"
                    );
                }
            }
        }
    }

    #[test]
    fn any_single_pending_line_drives_the_output() {
        let (mut ctl, probe) = controller(3);
        ctl.write(0, u64::from(GLOBAL_IRQ_ENABLED), 4);

        // Active but masked line does not count.
        ctl.set_line(0).unwrap();
        assert!(!probe.level.get());

        // Enabled but inactive line does not count either.
        ctl.enable_line(2).unwrap();
        assert!(!probe.level.get());

        // One line with both bits is enough.
        ctl.set_line(2).unwrap();
        assert!(probe.level.get());
    }

    #[test]
    fn set_line_is_idempotent() {
        let (mut ctl, probe) = controller(4);
        ctl.write(0, u64::from(GLOBAL_IRQ_ENABLED), 4);
        ctl.enable_line(0).unwrap();

        ctl.set_line(0).unwrap();
        let reg_after_first = ctl.registers().read_line(0);
        let level_after_first = probe.level.get();

        ctl.set_line(0).unwrap();
        assert_eq!(ctl.registers().read_line(0), reg_after_first);
        assert_eq!(probe.level.get(), level_after_first);
    }

    #[test]
    fn status_round_trips_at_every_width() {
        let (mut ctl, _) = controller(4);

        ctl.write(0, 0xAB, 1);
        assert_eq!(ctl.read(0, 1), 0xAB);

        ctl.write(0, 0xBEEF, 2);
        assert_eq!(ctl.read(0, 2), 0xBEEF);

        ctl.write(0, 0xDEAD_BEEF, 4);
        assert_eq!(ctl.read(0, 4), 0xDEAD_BEEF);
    }

    #[test]
    fn narrow_status_read_masks_to_width() {
        let (mut ctl, _) = controller(4);

        ctl.write(0, 0xDEAD_BEEF, 4);
        assert_eq!(ctl.read(0, 1), 0xEF);
        assert_eq!(ctl.read(0, 2), 0xBEEF);
    }

    #[test]
    fn wide_line_write_stores_only_the_low_byte() {
        let (mut ctl, _) = controller(4);

        ctl.write(LINE_REGS_OFFSET, 0x1234_56AB, 4);
        assert_eq!(ctl.registers().read_line(0), 0xAB);
        assert_eq!(ctl.read(LINE_REGS_OFFSET, 4), 0xAB);
    }

    #[test]
    fn last_valid_offset_is_decoded() {
        let (mut ctl, _) = controller(4);

        // num_lines + 3 is the last line register.
        ctl.write(7, 0xFF, 1);
        assert_eq!(ctl.registers().read_line(3), 0xFF);
        assert_eq!(ctl.read(7, 1), 0xFF);
    }

    #[test]
    fn out_of_range_offset_is_ignored() {
        let (mut ctl, probe) = controller(4);

        // num_lines + 4 is one past the last line register.
        ctl.write(8, 0xFF, 1);
        for line in 0..4 {
            assert_eq!(ctl.registers().read_line(line), 0);
        }

        let pushes_before = probe.pushes.get();
        assert_eq!(ctl.read(8, 1), 0);
        // An unmapped access does not run the aggregation pass.
        assert_eq!(probe.pushes.get(), pushes_before);
    }

    #[test]
    fn read_repushes_the_output_level() {
        // Inherited quirk: a plain register read re-runs aggregation and
        // re-pushes the (unchanged) output level.
        let (mut ctl, probe) = controller(4);

        let pushes_before = probe.pushes.get();
        let _ = ctl.read(0, 4);
        assert_eq!(probe.pushes.get(), pushes_before + 1);
        assert!(!probe.level.get());
    }

    #[test]
    fn enable_then_raise_then_unmask_globally() {
        let (mut ctl, probe) = controller(4);

        ctl.enable_line(2).unwrap();
        assert!(!probe.level.get());

        ctl.set_line(2).unwrap();
        // Pending line, but the global gate is still closed.
        assert!(!probe.level.get());

        ctl.write(0, 0x1, 4);
        assert!(probe.level.get());

        ctl.clear_line(2).unwrap();
        assert!(!probe.level.get());
    }

    #[test]
    fn management_rejects_out_of_range_line() {
        let (mut ctl, probe) = controller(4);
        let pushes_before = probe.pushes.get();

        assert_eq!(
            ctl.enable_line(10),
            Err(IrqError::LineOutOfRange {
                line: 10,
                num_lines: 4
            })
        );
        assert!(ctl.set_line(10).is_err());
        assert!(ctl.clear_line(10).is_err());
        assert!(ctl.disable_line(10).is_err());

        // No register moved and no output was pushed.
        assert_eq!(ctl.registers().read_status(), 0);
        for line in 0..4 {
            assert_eq!(ctl.registers().read_line(line), 0);
        }
        assert_eq!(probe.pushes.get(), pushes_before);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn line_signal_out_of_range_fails_fast() {
        let (mut ctl, _) = controller(4);
        ctl.set_level(4, true);
    }

    #[test]
    fn global_disable_forces_output_low() {
        let (mut ctl, probe) = controller(4);

        ctl.enable_line(0).unwrap();
        ctl.set_line(0).unwrap();
        ctl.write(0, 0x1, 4);
        assert!(probe.level.get());

        // Clearing the global gate drops the output even though the line
        // is still pending.
        ctl.write(0, 0x0, 4);
        assert!(!probe.level.get());
        assert_eq!(ctl.registers().read_line(0), IRQ_ACTIVE | IRQ_ENABLED);
    }
}
