//! Hardware capabilities the servo bus depends on.
//!
//! The scheduling algorithm only needs a free-running timer with one compare channel and a way
//! to set output pins high or low. Board support implements [`PulseTimer`]; any array of
//! [`embedded_hal`] output pins already implements [`OutputBank`].

use embedded_hal::digital::{OutputPin, PinState};

/// A free-running countdown/compare timer that raises one interrupt when it reaches
/// [`compare`](Self::compare).
///
/// Implementations are called both from main-line code (inside a critical section) and from the
/// timer interrupt itself. None of the methods may block.
pub trait PulseTimer {
    /// Timer ticks per microsecond.
    const TICKS_PER_US: u32;

    /// Longest delay the compare register can represent in one step.
    const MAX_DELAY_TICKS: u32;

    /// One-time peripheral setup (clock gating, prescaler, interrupt priority).
    ///
    /// Called before the first channel becomes active. Must leave the interrupt disabled.
    fn init(&mut self);

    /// Current counter value.
    fn count(&self) -> u32;

    /// Currently programmed compare value.
    fn compare(&self) -> u32;

    /// Program the next compare value. Counter arithmetic wraps at the register width.
    fn set_compare(&mut self, compare: u32);

    /// Clear the pending compare flag so the interrupt can fire again.
    fn acknowledge(&mut self);

    /// Allow the compare interrupt to reach the CPU.
    fn enable_interrupt(&mut self);

    /// Stop the compare interrupt from reaching the CPU.
    fn disable_interrupt(&mut self);
}

/// A bank of digital outputs addressed by small integer pin numbers.
pub trait OutputBank {
    /// Prepare `pin` for use as a servo output. Out-of-range pins are ignored.
    fn configure_output(&mut self, pin: u8);

    /// Drive `pin` to `level`. Out-of-range pins are ignored.
    fn set_level(&mut self, pin: u8, level: PinState);
}

impl<O: OutputPin, const N: usize> OutputBank for [O; N] {
    fn configure_output(&mut self, pin: u8) {
        self.set_level(pin, PinState::Low);
    }

    fn set_level(&mut self, pin: u8, level: PinState) {
        if let Some(output) = self.get_mut(usize::from(pin)) {
            // Called from the timer interrupt; there is nowhere to report a pin error.
            let _ = output.set_state(level);
        }
    }
}
