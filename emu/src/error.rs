use std::error::Error;
use std::fmt;

/// Errors surfaced by the controller's management interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqError {
    /// The requested line index is outside `0..num_lines`. The request is
    /// rejected before any register is touched.
    LineOutOfRange { line: usize, num_lines: usize },

    /// A controller cannot be built without at least one interrupt source.
    ZeroLines,
}

impl fmt::Display for IrqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LineOutOfRange { line, num_lines } => {
                write!(
                    f,
                    "irq line {line} is out of range, controller has {num_lines} lines"
                )
            }
            Self::ZeroLines => write!(f, "controller needs at least one irq line"),
        }
    }
}

impl Error for IrqError {}
