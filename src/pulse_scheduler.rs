//! The timer-interrupt half of the servo bus.
//!
//! One hardware timer cannot run several pulses at once, so channels take turns: each
//! interrupt lowers the channel raised by the previous interrupt, raises the next active
//! channel, and arms the timer for that channel's pulse width. Once the scan runs off the end of
//! the channel range, the timer is armed for whatever is left of the refresh interval, and the
//! next cycle starts again at channel 0.
//!
//! ```text
//!  pin A  ‾‾‾‾|____________________________________|‾‾‾‾
//!  pin B  ____|‾‾‾‾‾‾|_____________________________|____
//!  pin C  ___________|‾‾‾‾‾‾‾‾|________________________
//!             A      B        C      pad ...        A
//!         |<---------------- refresh interval --------->|
//! ```
//!
//! The scan resumes where the previous interrupt left off instead of restarting at zero, so each
//! interrupt does a bounded amount of work: at most one pin lowered, one pin raised, and a scan
//! over [`MAX_CHANNELS`] bits.

use embedded_hal::digital::PinState;

use crate::channel_table::{ChannelTable, MAX_CHANNELS};
use crate::hardware::{OutputBank, PulseTimer};
use crate::ticks::us_to_ticks;

/// Default minimum period of one full cycle (microseconds).
pub const REFRESH_INTERVAL_US_DEFAULT: u32 = 20_000;

/// Default shortest delay the scheduler will ever arm (microseconds).
///
/// Re-arming closer than this risks the compare point passing before the write lands.
pub const MIN_WAIT_US_DEFAULT: u32 = 100;

/// Timing configuration for a servo bus.
#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
pub struct BusConfig {
    /// Minimum period of one full cycle (microseconds).
    pub refresh_interval_us: u32,
    /// Shortest padding delay armed at the end of a cycle (microseconds).
    pub min_wait_us: u32,
}

impl BusConfig {
    /// The default timing: 20 ms refresh, 100 µs minimum wait.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            refresh_interval_us: REFRESH_INTERVAL_US_DEFAULT,
            min_wait_us: MIN_WAIT_US_DEFAULT,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The channel currently driven high, waiting for the next interrupt to lower it.
///
/// The pin is remembered alongside the index so a slot reused for a different pin cannot strand
/// the old pin high.
#[derive(Clone, Copy, Debug, Eq, PartialEq, defmt::Format)]
pub struct PendingLow {
    /// Channel index.
    pub channel: usize,
    /// Pin the channel drove high.
    pub pin: u8,
}

/// Scheduler position within the current cycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, defmt::Format)]
pub struct Cursor {
    /// Channel raised by the previous interrupt, if any.
    pub pending_low: Option<PendingLow>,
    /// Channel index the next scan starts from.
    pub scan_position: usize,
    /// Ticks already armed in the current cycle.
    pub accumulated_ticks: u32,
}

/// Owns the timer and pins and runs the per-interrupt state machine.
pub struct PulseScheduler<T, P> {
    timer: T,
    pins: P,
    refresh_ticks: u32,
    min_wait_ticks: u32,
    cursor: Cursor,
    timer_initialized: bool,
    running: bool,
}

impl<T: PulseTimer, P: OutputBank> PulseScheduler<T, P> {
    /// Create an idle scheduler. The timer is not touched until [`start`](Self::start).
    #[must_use]
    pub fn new(timer: T, pins: P, config: BusConfig) -> Self {
        let min_wait_ticks = us_to_ticks(config.min_wait_us, T::TICKS_PER_US)
            .clamp(1, T::MAX_DELAY_TICKS.max(1));
        Self {
            timer,
            pins,
            refresh_ticks: us_to_ticks(config.refresh_interval_us, T::TICKS_PER_US),
            min_wait_ticks,
            cursor: Cursor::default(),
            timer_initialized: false,
            running: false,
        }
    }

    /// Current cursor state.
    #[must_use]
    pub const fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Whether the timer interrupt is enabled.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Leave idle: initialize the timer (first time only), start a fresh cycle, and enable the
    /// interrupt. Does nothing if already running.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        if !self.timer_initialized {
            self.timer.init();
            self.timer_initialized = true;
        }
        self.cursor = Cursor::default();
        let first_expiry = self.timer.count().wrapping_add(self.min_wait_ticks);
        self.timer.set_compare(first_expiry);
        self.timer.acknowledge();
        self.timer.enable_interrupt();
        self.running = true;
    }

    /// Go idle: disable the interrupt, lower any pin still high, and forget the cursor.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.timer.disable_interrupt();
        if let Some(pending) = self.cursor.pending_low.take() {
            self.pins.set_level(pending.pin, PinState::Low);
        }
        self.cursor = Cursor::default();
        self.running = false;
    }

    /// Prepare a newly attached channel's pin.
    pub(crate) fn configure_output(&mut self, pin: u8) {
        self.pins.configure_output(pin);
    }

    /// Lower a released channel's pin now rather than waiting for the next interrupt.
    pub(crate) fn release_channel(&mut self, channel: usize, pin: u8) {
        if self
            .cursor
            .pending_low
            .is_some_and(|pending| pending.channel == channel)
        {
            self.cursor.pending_low = None;
        }
        self.pins.set_level(pin, PinState::Low);
    }

    /// Timer expiry handler. Call once per compare interrupt, with interrupts for this timer
    /// masked (the hardware guarantees this inside the handler).
    pub fn on_expiry(&mut self, table: &ChannelTable) {
        if let Some(pending) = self.cursor.pending_low.take() {
            self.pins.set_level(pending.pin, PinState::Low);
        }

        let active = table.active();
        while self.cursor.scan_position < MAX_CHANNELS {
            let channel = self.cursor.scan_position;
            self.cursor.scan_position = channel.saturating_add(1);
            if !active.contains(channel) {
                continue;
            }
            let Some(slot) = table.slot(channel) else {
                continue;
            };
            self.pins.set_level(slot.pin, PinState::High);
            self.cursor.pending_low = Some(PendingLow {
                channel,
                pin: slot.pin,
            });
            let armed = self.arm(slot.pulse_ticks);
            self.cursor.accumulated_ticks = self.cursor.accumulated_ticks.saturating_add(armed);
            return;
        }

        // Every active channel has had its pulse; pad out to the refresh interval.
        let residual = self
            .refresh_ticks
            .saturating_sub(self.cursor.accumulated_ticks);
        let residual = if residual < self.min_wait_ticks {
            self.min_wait_ticks
        } else if residual > T::MAX_DELAY_TICKS {
            T::MAX_DELAY_TICKS
        } else {
            residual
        };
        let armed = self.arm(residual);
        self.cursor.accumulated_ticks = self.cursor.accumulated_ticks.saturating_add(armed);
        if self.cursor.accumulated_ticks >= self.refresh_ticks {
            self.cursor.accumulated_ticks = 0;
            self.cursor.scan_position = 0;
        }
    }

    fn arm(&mut self, ticks: u32) -> u32 {
        let ticks = ticks.clamp(1, T::MAX_DELAY_TICKS.max(1));
        let compare = self.timer.compare().wrapping_add(ticks);
        self.timer.set_compare(compare);
        self.timer.acknowledge();
        ticks
    }
}

#[cfg(all(test, feature = "host"))]
mod tests {
    use super::*;
    use crate::sim::{SimPins, SimTimer, sim_board};

    fn scheduler() -> (PulseScheduler<SimTimer, SimPins>, SimTimer, SimPins) {
        let (timer, pins) = sim_board();
        let scheduler = PulseScheduler::new(timer.clone(), pins.clone(), BusConfig::new());
        (scheduler, timer, pins)
    }

    fn expire(scheduler: &mut PulseScheduler<SimTimer, SimPins>, timer: &SimTimer, table: &ChannelTable) {
        timer.advance_to_compare();
        scheduler.on_expiry(table);
    }

    fn publish(table: &ChannelTable, pin: u8, pulse_ticks: u32) {
        let handle = table.claim(pin, 0, 60_000, pulse_ticks);
        assert!(handle.is_some_and(|handle| table.activate(handle)));
    }

    #[test]
    fn start_initializes_timer_once() {
        let (mut scheduler, timer, _pins) = scheduler();
        scheduler.start();
        scheduler.stop();
        scheduler.start();
        assert_eq!(timer.init_calls(), 1);
        assert!(timer.is_interrupt_enabled());
        assert_eq!(timer.compare(), 800);
    }

    #[test]
    fn one_interrupt_raises_one_channel() {
        let (mut scheduler, timer, pins) = scheduler();
        let table = ChannelTable::new();
        publish(&table, 3, 8000);
        publish(&table, 4, 12_000);
        scheduler.start();

        expire(&mut scheduler, &timer, &table);
        assert_eq!(pins.level(3), PinState::High);
        assert_eq!(pins.level(4), PinState::Low);
        assert_eq!(timer.compare(), 800 + 8000);
        assert_eq!(
            scheduler.cursor(),
            Cursor {
                pending_low: Some(PendingLow { channel: 0, pin: 3 }),
                scan_position: 1,
                accumulated_ticks: 8000,
            }
        );

        expire(&mut scheduler, &timer, &table);
        assert_eq!(pins.level(3), PinState::Low);
        assert_eq!(pins.level(4), PinState::High);
        assert_eq!(scheduler.cursor().accumulated_ticks, 20_000);
    }

    #[test]
    fn padding_is_split_across_interrupts_when_longer_than_the_timer_allows() {
        let (mut scheduler, timer, _pins) = scheduler();
        let table = ChannelTable::new();
        publish(&table, 0, 8000);
        scheduler.start();

        expire(&mut scheduler, &timer, &table); // pulse: 8000
        expire(&mut scheduler, &timer, &table); // pad: 60000 (capped)
        assert_eq!(scheduler.cursor().accumulated_ticks, 68_000);
        assert_eq!(scheduler.cursor().scan_position, MAX_CHANNELS);
        expire(&mut scheduler, &timer, &table); // pad: 60000 (capped)
        expire(&mut scheduler, &timer, &table); // pad: 32000, cycle complete
        assert_eq!(scheduler.cursor().accumulated_ticks, 0);
        assert_eq!(scheduler.cursor().scan_position, 0);
    }

    #[test]
    fn overfull_cycle_pads_by_the_minimum_wait() {
        let (timer, pins) = sim_board();
        let config = BusConfig {
            refresh_interval_us: 1000,
            min_wait_us: 100,
        };
        let mut scheduler = PulseScheduler::new(timer.clone(), pins, config);
        let table = ChannelTable::new();
        publish(&table, 0, 16_000);
        scheduler.start();

        expire(&mut scheduler, &timer, &table);
        let before_pad = timer.compare();
        expire(&mut scheduler, &timer, &table);
        assert_eq!(timer.compare(), before_pad + 800);
        assert_eq!(scheduler.cursor(), Cursor::default());
    }

    #[test]
    fn released_pending_channel_is_lowered_immediately() {
        let (mut scheduler, timer, pins) = scheduler();
        let table = ChannelTable::new();
        publish(&table, 5, 8000);
        scheduler.start();
        expire(&mut scheduler, &timer, &table);
        assert_eq!(pins.level(5), PinState::High);

        scheduler.release_channel(0, 5);
        assert_eq!(pins.level(5), PinState::Low);
        assert_eq!(scheduler.cursor().pending_low, None);
    }

    #[test]
    fn stop_lowers_the_pending_pin_and_resets_the_cursor() {
        let (mut scheduler, timer, pins) = scheduler();
        let table = ChannelTable::new();
        publish(&table, 2, 8000);
        scheduler.start();
        expire(&mut scheduler, &timer, &table);

        scheduler.stop();
        assert!(!timer.is_interrupt_enabled());
        assert_eq!(pins.level(2), PinState::Low);
        assert_eq!(scheduler.cursor(), Cursor::default());
    }
}
