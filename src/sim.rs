//! A simulated timer and pin bank for exercising the servo bus on the host.
//!
//! The two halves share one clock. [`SimTimer`] never advances on its own: tests move time
//! forward with [`SimTimer::run_until`] (or [`SimTimer::advance_to_compare`]), which calls the
//! interrupt handler at each compare point. [`SimPins`] records every level change with the
//! tick it happened on so tests can measure pulse widths exactly.
//!
//! ```
//! use servo_mux::hardware::PulseTimer;
//! use servo_mux::sim::sim_board;
//!
//! let (mut timer, _pins) = sim_board();
//! timer.set_compare(800);
//! timer.enable_interrupt();
//! let mut fired = 0;
//! timer.run_until(800, || fired += 1);
//! assert_eq!(fired, 1);
//! assert_eq!(timer.now(), 800);
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::vec::Vec;

use embedded_hal::digital::PinState;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::hardware::{OutputBank, PulseTimer};

/// Ticks per microsecond of the simulated timer, matching an 8 MHz low-power timer.
pub const SIM_TICKS_PER_US: u32 = 8;

/// Longest single delay the simulated compare register accepts.
pub const SIM_MAX_DELAY_TICKS: u32 = 60_000;

/// Number of pins in the simulated bank.
pub const SIM_PIN_COUNT: usize = 32;

/// One recorded level change.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PinEvent {
    /// Pin number.
    pub pin: u8,
    /// New level.
    pub level: PinState,
    /// Clock value when the change happened.
    pub at_ticks: u32,
}

/// One complete high pulse reconstructed from the event log.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Pulse {
    /// Pin number.
    pub pin: u8,
    /// Rising edge time.
    pub start_ticks: u32,
    /// Time spent high.
    pub width_ticks: u32,
}

#[derive(Default)]
struct SimState {
    now: AtomicU32,
    compare: AtomicU32,
    interrupt_enabled: AtomicBool,
    init_calls: AtomicU32,
    acknowledge_calls: AtomicU32,
    levels: Mutex<[bool; SIM_PIN_COUNT]>,
    configured: Mutex<Vec<u8>>,
    events: Mutex<Vec<PinEvent>>,
}

/// Create a timer and pin bank sharing one simulated clock.
#[must_use]
pub fn sim_board() -> (SimTimer, SimPins) {
    let state = Arc::new(SimState::default());
    (
        SimTimer {
            state: Arc::clone(&state),
        },
        SimPins { state },
    )
}

/// Simulated compare timer. Clones share the same state.
#[derive(Clone)]
pub struct SimTimer {
    state: Arc<SimState>,
}

impl SimTimer {
    /// Current clock value.
    #[must_use]
    pub fn now(&self) -> u32 {
        self.state.now.load(Ordering::Acquire)
    }

    /// Whether the compare interrupt is enabled.
    #[must_use]
    pub fn is_interrupt_enabled(&self) -> bool {
        self.state.interrupt_enabled.load(Ordering::Acquire)
    }

    /// How many times [`PulseTimer::init`] ran.
    #[must_use]
    pub fn init_calls(&self) -> u32 {
        self.state.init_calls.load(Ordering::Acquire)
    }

    /// How many times the compare flag was acknowledged.
    #[must_use]
    pub fn acknowledge_calls(&self) -> u32 {
        self.state.acknowledge_calls.load(Ordering::Acquire)
    }

    /// Ticks from now until the compare point.
    #[must_use]
    pub fn ticks_until_expiry(&self) -> u32 {
        self.state
            .compare
            .load(Ordering::Acquire)
            .wrapping_sub(self.now())
    }

    /// Move the clock to the compare point without running any handler.
    pub fn advance_to_compare(&self) {
        let compare = self.state.compare.load(Ordering::Acquire);
        self.state.now.store(compare, Ordering::Release);
    }

    /// Advance the clock to `end_ticks`, calling `isr` at every compare point reached on the
    /// way while the interrupt is enabled.
    ///
    /// Returns the number of interrupts delivered. Stops early if a handler leaves the compare
    /// point where it was, since the timer would otherwise fire forever.
    pub fn run_until(&self, end_ticks: u32, mut isr: impl FnMut()) -> u32 {
        let mut delivered = 0u32;
        loop {
            let remaining = end_ticks.wrapping_sub(self.now());
            if !self.is_interrupt_enabled() || self.ticks_until_expiry() > remaining {
                self.state.now.store(end_ticks, Ordering::Release);
                return delivered;
            }
            self.advance_to_compare();
            let compare_before = self.state.compare.load(Ordering::Acquire);
            isr();
            delivered = delivered.saturating_add(1);
            if self.is_interrupt_enabled()
                && self.state.compare.load(Ordering::Acquire) == compare_before
            {
                return delivered;
            }
        }
    }
}

impl PulseTimer for SimTimer {
    const TICKS_PER_US: u32 = SIM_TICKS_PER_US;
    const MAX_DELAY_TICKS: u32 = SIM_MAX_DELAY_TICKS;

    fn init(&mut self) {
        self.state.init_calls.fetch_add(1, Ordering::AcqRel);
    }

    fn count(&self) -> u32 {
        self.now()
    }

    fn compare(&self) -> u32 {
        self.state.compare.load(Ordering::Acquire)
    }

    fn set_compare(&mut self, compare: u32) {
        self.state.compare.store(compare, Ordering::Release);
    }

    fn acknowledge(&mut self) {
        self.state.acknowledge_calls.fetch_add(1, Ordering::AcqRel);
    }

    fn enable_interrupt(&mut self) {
        self.state.interrupt_enabled.store(true, Ordering::Release);
    }

    fn disable_interrupt(&mut self) {
        self.state.interrupt_enabled.store(false, Ordering::Release);
    }
}

/// Simulated output pins. Clones share the same state.
#[derive(Clone)]
pub struct SimPins {
    state: Arc<SimState>,
}

impl SimPins {
    /// Current level of `pin`. Unknown pins read low.
    #[must_use]
    pub fn level(&self, pin: u8) -> PinState {
        let levels = self
            .state
            .levels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        PinState::from(levels.get(usize::from(pin)).copied().unwrap_or(false))
    }

    /// Pins passed to [`OutputBank::configure_output`], in call order.
    #[must_use]
    pub fn configured_pins(&self) -> Vec<u8> {
        self.state
            .configured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every level change so far.
    #[must_use]
    pub fn events(&self) -> Vec<PinEvent> {
        self.state
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget recorded events. Pin levels are kept.
    pub fn clear_events(&self) {
        self.state
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Completed high pulses, ordered by rising edge.
    #[must_use]
    pub fn pulses(&self) -> Vec<Pulse> {
        let mut rising: [Option<u32>; SIM_PIN_COUNT] = [None; SIM_PIN_COUNT];
        let mut pulses = Vec::new();
        for event in self.events() {
            let Some(slot) = rising.get_mut(usize::from(event.pin)) else {
                continue;
            };
            match event.level {
                PinState::High => *slot = Some(event.at_ticks),
                PinState::Low => {
                    if let Some(start_ticks) = slot.take() {
                        pulses.push(Pulse {
                            pin: event.pin,
                            start_ticks,
                            width_ticks: event.at_ticks.wrapping_sub(start_ticks),
                        });
                    }
                }
            }
        }
        pulses.sort_by_key(|pulse| pulse.start_ticks);
        pulses
    }
}

impl OutputBank for SimPins {
    fn configure_output(&mut self, pin: u8) {
        self.state
            .configured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pin);
        self.set_level(pin, PinState::Low);
    }

    fn set_level(&mut self, pin: u8, level: PinState) {
        let mut levels = self
            .state
            .levels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(current) = levels.get_mut(usize::from(pin)) else {
            return;
        };
        let high = level == PinState::High;
        if *current == high {
            return;
        }
        *current = high;
        self.state
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PinEvent {
                pin,
                level,
                at_ticks: self.state.now.load(Ordering::Acquire),
            });
    }
}
