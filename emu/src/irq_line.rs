/// Single downstream interrupt output of a controller, wired like a gpio
/// output toward the interrupt consumer (cpu model, parent controller, ...).
///
/// The level is pushed on every aggregation pass, including passes that do
/// not change it, so implementations must tolerate repeated identical
/// levels.
pub trait IrqLine {
    fn set_level(&mut self, level: bool);
}

impl<F> IrqLine for F
where
    F: FnMut(bool),
{
    fn set_level(&mut self, level: bool) {
        self(level);
    }
}
