//! RP2040 board support: the system timer's alarm 1 as a [`PulseTimer`].
//!
//! The embassy time driver owns alarm 0, so the servo bus takes alarm 1 and its
//! `TIMER_IRQ_1` vector. Bind the vector to [`ServoBus::on_timer_interrupt`] in firmware:
//!
//! ```rust,ignore
//! use embassy_rp::interrupt;
//! use embassy_rp::gpio::Output;
//! use servo_mux::rp::RpAlarmTimer;
//! use servo_mux::servo_bus::ServoBus;
//!
//! static SERVOS: ServoBus<RpAlarmTimer, [Output<'static>; 3]> = ServoBus::new_static();
//!
//! #[interrupt]
//! fn TIMER_IRQ_1() {
//!     SERVOS.on_timer_interrupt();
//! }
//! ```
//!
//! [`ServoBus::on_timer_interrupt`]: crate::servo_bus::ServoBus::on_timer_interrupt

use embassy_rp::interrupt::{self, InterruptExt, Priority};
use embassy_rp::pac;

use crate::hardware::PulseTimer;

const ALARM: usize = 1;
const ALARM_MASK: u8 = 0b0010;

/// Alarm 1 of the RP2040 microsecond timer.
///
/// The counter runs at 1 MHz from the reference clock, so one tick is one microsecond and pulse
/// widths resolve to 1 µs.
#[derive(Debug, Default)]
pub struct RpAlarmTimer {
    compare: u32,
}

impl RpAlarmTimer {
    /// Create the adapter. The alarm is left alone until the bus starts it.
    #[must_use]
    pub const fn new() -> Self {
        Self { compare: 0 }
    }
}

impl PulseTimer for RpAlarmTimer {
    const TICKS_PER_US: u32 = 1;
    const MAX_DELAY_TICKS: u32 = 60_000;

    fn init(&mut self) {
        interrupt::TIMER_IRQ_1.disable();
        pac::TIMER.inte().modify(|w| w.set_alarm(ALARM, true));
        interrupt::TIMER_IRQ_1.set_priority(Priority::P1);
    }

    fn count(&self) -> u32 {
        pac::TIMER.timerawl().read()
    }

    fn compare(&self) -> u32 {
        self.compare
    }

    fn set_compare(&mut self, compare: u32) {
        self.compare = compare;
        // Writing the alarm register also arms it.
        pac::TIMER.alarm(ALARM).write_value(compare);
    }

    fn acknowledge(&mut self) {
        pac::TIMER.intr().write(|w| w.set_alarm(ALARM, true));
        interrupt::TIMER_IRQ_1.unpend();
    }

    fn enable_interrupt(&mut self) {
        #[expect(
            unsafe_code,
            reason = "The handler only touches the servo bus, which guards its state with a critical section"
        )]
        // SAFETY: Enabling an interrupt is unsafe only because it can break critical sections.
        // The servo bus handler takes the same critical section as main-line callers.
        unsafe {
            interrupt::TIMER_IRQ_1.enable();
        }
    }

    fn disable_interrupt(&mut self) {
        interrupt::TIMER_IRQ_1.disable();
        pac::TIMER.armed().write(|w| w.set_armed(ALARM_MASK));
    }
}
