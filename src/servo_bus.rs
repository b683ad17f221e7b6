//! Attach, command, and detach servos on a shared timer.
//!
//! A [`ServoBus`] owns the channel table and the pulse scheduler. Firmware places one in a
//! `static`, hands it the timer and pins with [`ServoBus::install`], and forwards the timer
//! interrupt to [`ServoBus::on_timer_interrupt`]. Everything else is plain method calls from
//! main-line code.
//!
//! Use the [`servo!`] macro for a keyword-driven constructor with defaults.
//!
//! # Example
//!
//! ```
//! use servo_mux::servo_bus::ServoBus;
//! use servo_mux::sim::{SimPins, SimTimer, sim_board};
//!
//! static SERVOS: ServoBus<SimTimer, SimPins> = ServoBus::new_static();
//!
//! let (timer, pins) = sim_board();
//! SERVOS.install(timer.clone(), pins);
//!
//! let turret = SERVOS.allocate(3);
//! assert!(SERVOS.is_attached(turret));
//! SERVOS.write_degrees(turret, 90);
//! assert_eq!(SERVOS.read_microseconds(turret), 1472);
//!
//! // The board's timer interrupt handler calls this.
//! timer.run_until(160_000, || SERVOS.on_timer_interrupt());
//!
//! SERVOS.release(turret);
//! assert!(!timer.is_interrupt_enabled());
//! ```

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::channel_table::{ChannelHandle, ChannelTable};
use crate::hardware::{OutputBank, PulseTimer};
use crate::logging::{log_debug, log_info};
pub use crate::pulse_scheduler::{BusConfig, MIN_WAIT_US_DEFAULT, REFRESH_INTERVAL_US_DEFAULT};
use crate::pulse_scheduler::{Cursor, PulseScheduler};
use crate::ticks::{MAX_DEGREES, degrees_to_ticks, ticks_to_degrees, ticks_to_us, us_to_ticks};
use crate::{Error, Result};

/// Default minimum pulse width for hobby servos (microseconds).
///
/// Also the threshold at which [`ServoBus::write_degrees`] treats its argument as microseconds.
pub const SERVO_MIN_US_DEFAULT: u32 = 544;

/// Default maximum pulse width for hobby servos (microseconds).
pub const SERVO_MAX_US_DEFAULT: u32 = 2_400;

/// Pulse width a freshly attached channel starts at, before clamping (microseconds).
pub const SERVO_CENTER_US_DEFAULT: u32 = 1_500;

/// Create a [`Servo`] on a bus with keyword arguments and default pulse widths.
///
/// Required fields: `bus`, `pin`.
///
/// Optional fields: `min_us`, `max_us` (defaults to
/// [`SERVO_MIN_US_DEFAULT`]/[`SERVO_MAX_US_DEFAULT`]).
///
/// Evaluates to `Result<Servo, Error>`.
///
/// ```
/// use servo_mux::servo;
/// use servo_mux::servo_bus::ServoBus;
/// use servo_mux::sim::{SimPins, SimTimer, sim_board};
///
/// static SERVOS: ServoBus<SimTimer, SimPins> = ServoBus::new_static();
///
/// let (timer, pins) = sim_board();
/// SERVOS.install(timer, pins);
///
/// let mut gun = servo! {
///     bus: SERVOS,
///     pin: 7,
///     min_us: 1000,
///     max_us: 2000,
/// }?;
/// gun.set_degrees(180);
/// assert_eq!(gun.pulse_us(), 2000);
/// # Ok::<(), servo_mux::Error>(())
/// ```
#[macro_export]
macro_rules! servo {
    ($($tt:tt)*) => { $crate::__servo_impl! { $($tt)* } };
}
#[doc(inline)]
pub use servo;

// Public for macro expansion in downstream crates.
#[doc(hidden)]
#[macro_export]
macro_rules! __servo_impl {
    (@__fill_defaults
        bus: $bus:tt,
        pin: $pin:tt,
        min_us: $min_us:expr,
        max_us: $max_us:expr,
        fields: [ ]
    ) => {
        $crate::__servo_impl! {
            @__build
            bus: $bus,
            pin: $pin,
            min_us: $min_us,
            max_us: $max_us
        }
    };

    (@__fill_defaults
        bus: $bus:tt,
        pin: $pin:tt,
        min_us: $min_us:expr,
        max_us: $max_us:expr,
        fields: [ bus: $bus_value:expr $(, $($rest:tt)*)? ]
    ) => {
        $crate::__servo_impl! {
            @__fill_defaults
            bus: $bus_value,
            pin: $pin,
            min_us: $min_us,
            max_us: $max_us,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        bus: $bus:tt,
        pin: $pin:tt,
        min_us: $min_us:expr,
        max_us: $max_us:expr,
        fields: [ pin: $pin_value:expr $(, $($rest:tt)*)? ]
    ) => {
        $crate::__servo_impl! {
            @__fill_defaults
            bus: $bus,
            pin: $pin_value,
            min_us: $min_us,
            max_us: $max_us,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        bus: $bus:tt,
        pin: $pin:tt,
        min_us: $min_us:expr,
        max_us: $max_us:expr,
        fields: [ min_us: $min_us_value:expr $(, $($rest:tt)*)? ]
    ) => {
        $crate::__servo_impl! {
            @__fill_defaults
            bus: $bus,
            pin: $pin,
            min_us: $min_us_value,
            max_us: $max_us,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        bus: $bus:tt,
        pin: $pin:tt,
        min_us: $min_us:expr,
        max_us: $max_us:expr,
        fields: [ max_us: $max_us_value:expr $(, $($rest:tt)*)? ]
    ) => {
        $crate::__servo_impl! {
            @__fill_defaults
            bus: $bus,
            pin: $pin,
            min_us: $min_us,
            max_us: $max_us_value,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__build
        bus: _UNSET_,
        pin: $pin:tt,
        min_us: $min_us:expr,
        max_us: $max_us:expr
    ) => {
        compile_error!("servo! requires `bus: ...`");
    };

    (@__build
        bus: $bus:expr,
        pin: _UNSET_,
        min_us: $min_us:expr,
        max_us: $max_us:expr
    ) => {
        compile_error!("servo! requires `pin: ...`");
    };

    (@__build
        bus: $bus:expr,
        pin: $pin:expr,
        min_us: $min_us:expr,
        max_us: $max_us:expr
    ) => {
        ($bus).servo_with_range($pin, $min_us, $max_us)
    };

    (
        $($fields:tt)*
    ) => {
        $crate::__servo_impl! {
            @__fill_defaults
            bus: _UNSET_,
            pin: _UNSET_,
            min_us: $crate::servo_bus::SERVO_MIN_US_DEFAULT,
            max_us: $crate::servo_bus::SERVO_MAX_US_DEFAULT,
            fields: [ $($fields)* ]
        }
    };
}

/// A bank of up to [`MAX_CHANNELS`](crate::channel_table::MAX_CHANNELS) servos pulsed from one
/// timer interrupt.
///
/// Handles returned by [`allocate`](Self::allocate) are plain indices. Operations on an invalid
/// or detached handle do nothing and reads return 0; use [`check`](Self::check) when the caller
/// wants to know. For scoped ownership, [`servo`](Self::servo) returns a [`Servo`] that detaches
/// itself on drop.
pub struct ServoBus<T, P> {
    table: ChannelTable,
    config: BusConfig,
    scheduler: Mutex<CriticalSectionRawMutex, RefCell<Option<PulseScheduler<T, P>>>>,
}

impl<T, P> ServoBus<T, P> {
    /// An empty bus with default timing, suitable for a `static`.
    #[must_use]
    pub const fn new_static() -> Self {
        Self::new(BusConfig::new())
    }

    /// An empty bus with the given timing.
    #[must_use]
    pub const fn new(config: BusConfig) -> Self {
        Self {
            table: ChannelTable::new(),
            config,
            scheduler: Mutex::new(RefCell::new(None)),
        }
    }

    /// The channel table, for inspection.
    #[must_use]
    pub const fn table(&self) -> &ChannelTable {
        &self.table
    }

    /// Timing this bus was created with.
    #[must_use]
    pub const fn config(&self) -> BusConfig {
        self.config
    }
}

impl<T: PulseTimer, P: OutputBank> ServoBus<T, P> {
    /// Give the bus its timer and pins. The timer stays untouched until the first attach.
    ///
    /// Only the first call takes effect.
    pub fn install(&self, timer: T, pins: P) {
        let config = self.config;
        let installed = self.scheduler.lock(|cell| {
            let Ok(mut slot) = cell.try_borrow_mut() else {
                return false;
            };
            if slot.is_some() {
                return false;
            }
            *slot = Some(PulseScheduler::new(timer, pins, config));
            true
        });
        if installed {
            log_info!(
                "servo bus installed: refresh={}us min_wait={}us",
                config.refresh_interval_us, config.min_wait_us
            );
        } else {
            log_debug!("servo bus already installed; ignoring");
        }
    }

    /// Attach a servo on `pin` with the default pulse range.
    ///
    /// Returns [`ChannelHandle::INVALID`] when every channel is taken.
    pub fn allocate(&self, pin: u8) -> ChannelHandle {
        self.allocate_with_range(pin, SERVO_MIN_US_DEFAULT, SERVO_MAX_US_DEFAULT)
    }

    /// Attach a servo on `pin` with pulse widths limited to `min_us..=max_us`.
    ///
    /// Returns [`ChannelHandle::INVALID`] when every channel is taken.
    pub fn allocate_with_range(&self, pin: u8, min_us: u32, max_us: u32) -> ChannelHandle {
        self.try_allocate_with_range(pin, min_us, max_us)
            .unwrap_or(ChannelHandle::INVALID)
    }

    /// Like [`allocate`](Self::allocate), but reports exhaustion as an error.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceExhausted`] if no channel is free or the bus has not been installed.
    pub fn try_allocate(&self, pin: u8) -> Result<ChannelHandle> {
        self.try_allocate_with_range(pin, SERVO_MIN_US_DEFAULT, SERVO_MAX_US_DEFAULT)
    }

    /// Like [`allocate_with_range`](Self::allocate_with_range), but reports exhaustion as an
    /// error.
    ///
    /// Bounds given in the wrong order are swapped. The channel starts at
    /// [`SERVO_CENTER_US_DEFAULT`] clamped into the bounds and is pulsed from the next cycle on.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceExhausted`] if no channel is free or the bus has not been installed.
    pub fn try_allocate_with_range(
        &self,
        pin: u8,
        min_us: u32,
        max_us: u32,
    ) -> Result<ChannelHandle> {
        let (min_us, max_us) = if min_us <= max_us {
            (min_us, max_us)
        } else {
            (max_us, min_us)
        };
        let min_ticks = us_to_ticks(min_us, T::TICKS_PER_US).min(T::MAX_DELAY_TICKS);
        let max_ticks = us_to_ticks(max_us, T::TICKS_PER_US).min(T::MAX_DELAY_TICKS);
        let start_ticks = us_to_ticks(SERVO_CENTER_US_DEFAULT, T::TICKS_PER_US);

        let attached = self
            .with_scheduler(|scheduler| {
                let handle = self.table.claim(pin, min_ticks, max_ticks, start_ticks)?;
                scheduler.configure_output(pin);
                self.table.activate(handle);
                let starting = !scheduler.is_running();
                if starting {
                    scheduler.start();
                }
                Some((handle, starting))
            })
            .flatten();

        let Some((handle, starting)) = attached else {
            log_info!("servo attach on pin {} failed: no free channel", pin);
            return Err(Error::ResourceExhausted);
        };
        if starting {
            log_debug!("servo timer started");
        }
        log_info!(
            "servo channel {} attached: pin={} range={}..={}us",
            handle.raw(),
            pin,
            min_us,
            max_us
        );
        Ok(handle)
    }

    /// Detach a channel and drive its pin low. Stops the timer when no channel remains.
    ///
    /// Invalid or already-detached handles are ignored.
    pub fn release(&self, handle: ChannelHandle) {
        let Some(index) = handle.index() else {
            return;
        };
        let released = self
            .with_scheduler(|scheduler| {
                let pin = self.table.release(handle)?;
                scheduler.release_channel(index, pin);
                let idle = self.table.active().is_empty();
                if idle {
                    scheduler.stop();
                }
                Some((pin, idle))
            })
            .flatten();

        if let Some((pin, idle)) = released {
            log_info!("servo channel {} detached from pin {}", handle.raw(), pin);
            if idle {
                log_debug!("servo timer stopped");
            }
        }
    }

    /// Command a position in degrees.
    ///
    /// Values of at least [`SERVO_MIN_US_DEFAULT`] are taken as a pulse width in microseconds.
    /// Smaller values are clamped to `0..=180` and mapped onto the channel's pulse range.
    pub fn write_degrees(&self, handle: ChannelHandle, value: i32) {
        if i64::from(value) >= i64::from(SERVO_MIN_US_DEFAULT) {
            self.write_microseconds(handle, value);
            return;
        }
        let Some((min_ticks, max_ticks)) = self.table.bounds(handle) else {
            return;
        };
        let degrees = u16::try_from(value.clamp(0, i32::from(MAX_DEGREES))).unwrap_or(0);
        self.table
            .store_pulse_ticks(handle, degrees_to_ticks(degrees, min_ticks, max_ticks));
    }

    /// Command a pulse width in microseconds, clamped to the channel's range.
    pub fn write_microseconds(&self, handle: ChannelHandle, us: i32) {
        let us = u32::try_from(us).unwrap_or(0);
        self.table
            .store_pulse_ticks(handle, us_to_ticks(us, T::TICKS_PER_US));
    }

    /// Commanded position in degrees, or 0 for an invalid handle.
    #[must_use]
    pub fn read_degrees(&self, handle: ChannelHandle) -> u16 {
        let (Some(ticks), Some((min_ticks, max_ticks))) =
            (self.table.pulse_ticks(handle), self.table.bounds(handle))
        else {
            return 0;
        };
        ticks_to_degrees(ticks, min_ticks, max_ticks)
    }

    /// Commanded pulse width in microseconds, or 0 for an invalid handle.
    #[must_use]
    pub fn read_microseconds(&self, handle: ChannelHandle) -> u32 {
        self.table
            .pulse_ticks(handle)
            .map_or(0, |ticks| ticks_to_us(ticks, T::TICKS_PER_US))
    }

    /// Whether `handle` is currently being pulsed.
    #[must_use]
    pub fn is_attached(&self, handle: ChannelHandle) -> bool {
        self.table.is_active(handle)
    }

    /// Command the midpoint of the channel's pulse range.
    pub fn center(&self, handle: ChannelHandle) {
        let Some((min_ticks, max_ticks)) = self.table.bounds(handle) else {
            return;
        };
        let middle = min_ticks.saturating_add(max_ticks.saturating_sub(min_ticks) / 2);
        self.table.store_pulse_ticks(handle, middle);
    }

    /// Confirm `handle` names an attached channel.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidHandle`] if it is invalid or detached.
    pub fn check(&self, handle: ChannelHandle) -> Result<ChannelHandle> {
        if self.table.is_allocated(handle) {
            Ok(handle)
        } else {
            Err(Error::InvalidHandle)
        }
    }

    /// Attach a self-detaching [`Servo`] on `pin` with the default pulse range.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceExhausted`] if no channel is free or the bus has not been installed.
    pub fn servo(&self, pin: u8) -> Result<Servo<'_, T, P>> {
        self.servo_with_range(pin, SERVO_MIN_US_DEFAULT, SERVO_MAX_US_DEFAULT)
    }

    /// Attach a self-detaching [`Servo`] on `pin` limited to `min_us..=max_us`.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceExhausted`] if no channel is free or the bus has not been installed.
    pub fn servo_with_range(&self, pin: u8, min_us: u32, max_us: u32) -> Result<Servo<'_, T, P>> {
        let handle = self.try_allocate_with_range(pin, min_us, max_us)?;
        Ok(Servo { bus: self, handle })
    }

    /// Timer compare interrupt handler body. Call from the board's interrupt vector.
    pub fn on_timer_interrupt(&self) {
        self.with_scheduler(|scheduler| scheduler.on_expiry(&self.table));
    }

    /// Scheduler position, or `None` before [`install`](Self::install).
    #[must_use]
    pub fn cursor(&self) -> Option<Cursor> {
        self.with_scheduler(|scheduler| scheduler.cursor())
    }

    /// Whether the timer interrupt is currently enabled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.with_scheduler(|scheduler| scheduler.is_running())
            .unwrap_or(false)
    }

    fn with_scheduler<R>(&self, f: impl FnOnce(&mut PulseScheduler<T, P>) -> R) -> Option<R> {
        self.scheduler.lock(|cell| {
            let mut slot = cell.try_borrow_mut().ok()?;
            slot.as_mut().map(f)
        })
    }
}

/// One attached servo channel that detaches itself when dropped.
///
/// Created by [`ServoBus::servo`], [`ServoBus::servo_with_range`], or the [`servo!`] macro.
pub struct Servo<'a, T: PulseTimer, P: OutputBank> {
    bus: &'a ServoBus<T, P>,
    handle: ChannelHandle,
}

impl<T: PulseTimer, P: OutputBank> Servo<'_, T, P> {
    /// Set position in degrees, clamped to 0..=180.
    pub fn set_degrees(&mut self, degrees: u16) {
        let degrees = degrees.min(MAX_DEGREES);
        self.bus.write_degrees(self.handle, i32::from(degrees));
    }

    /// Set raw pulse width in microseconds, clamped to the servo's range.
    pub fn set_pulse_us(&mut self, us: u32) {
        self.bus
            .write_microseconds(self.handle, i32::try_from(us).unwrap_or(i32::MAX));
    }

    /// Center (midpoint of min/max).
    pub fn center(&mut self) {
        self.bus.center(self.handle);
    }

    /// Commanded position in degrees.
    #[must_use]
    pub fn degrees(&self) -> u16 {
        self.bus.read_degrees(self.handle)
    }

    /// Commanded pulse width in microseconds.
    #[must_use]
    pub fn pulse_us(&self) -> u32 {
        self.bus.read_microseconds(self.handle)
    }

    /// Whether the servo is still being pulsed.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.bus.is_attached(self.handle)
    }

    /// The underlying channel handle.
    #[must_use]
    pub const fn handle(&self) -> ChannelHandle {
        self.handle
    }

    /// Stop pulsing and free the channel.
    pub fn detach(self) {
        drop(self);
    }
}

impl<T: PulseTimer, P: OutputBank> Drop for Servo<'_, T, P> {
    fn drop(&mut self) {
        self.bus.release(self.handle);
    }
}

#[cfg(all(test, feature = "host"))]
mod tests {
    use super::*;
    use crate::sim::{SimPins, SimTimer, sim_board};

    fn installed_bus() -> (ServoBus<SimTimer, SimPins>, SimTimer, SimPins) {
        let bus = ServoBus::new_static();
        let (timer, pins) = sim_board();
        bus.install(timer.clone(), pins.clone());
        (bus, timer, pins)
    }

    #[test]
    fn allocate_without_install_is_exhausted() {
        let bus: ServoBus<SimTimer, SimPins> = ServoBus::new_static();
        assert_eq!(bus.allocate(1), ChannelHandle::INVALID);
        assert_eq!(bus.try_allocate(1), Err(Error::ResourceExhausted));
        assert!(!bus.is_running());
        assert_eq!(bus.cursor(), None);
    }

    #[test]
    fn second_install_is_ignored() {
        let (bus, timer, _pins) = installed_bus();
        let (other_timer, other_pins) = sim_board();
        bus.install(other_timer.clone(), other_pins);
        let handle = bus.allocate(0);
        assert!(bus.is_attached(handle));
        assert_eq!(timer.init_calls(), 1);
        assert_eq!(other_timer.init_calls(), 0);
    }

    #[test]
    fn attach_configures_the_pin_and_starts_the_timer() {
        let (bus, timer, pins) = installed_bus();
        let handle = bus.allocate(9);
        assert_eq!(pins.configured_pins(), vec![9]);
        assert!(timer.is_interrupt_enabled());
        assert!(bus.is_running());
        assert_eq!(bus.read_microseconds(handle), SERVO_CENTER_US_DEFAULT);
    }

    #[test]
    fn start_pulse_is_clamped_into_narrow_range() {
        let (bus, _timer, _pins) = installed_bus();
        let handle = bus.allocate_with_range(0, 600, 1000);
        assert_eq!(bus.read_microseconds(handle), 1000);
    }

    #[test]
    fn reversed_bounds_are_swapped() {
        let (bus, _timer, _pins) = installed_bus();
        let handle = bus.allocate_with_range(0, 2000, 1000);
        bus.write_microseconds(handle, 500);
        assert_eq!(bus.read_microseconds(handle), 1000);
        bus.write_microseconds(handle, 2500);
        assert_eq!(bus.read_microseconds(handle), 2000);
    }

    #[test]
    fn large_angles_are_microseconds() {
        let (bus, _timer, _pins) = installed_bus();
        let handle = bus.allocate(0);
        bus.write_degrees(handle, 1800);
        assert_eq!(bus.read_microseconds(handle), 1800);
        bus.write_degrees(handle, 543);
        assert_eq!(bus.read_degrees(handle), 180);
        bus.write_degrees(handle, -20);
        assert_eq!(bus.read_microseconds(handle), SERVO_MIN_US_DEFAULT);
    }

    #[test]
    fn center_uses_the_channel_range() {
        let (bus, _timer, _pins) = installed_bus();
        let handle = bus.allocate_with_range(0, 1000, 2000);
        bus.write_microseconds(handle, 1000);
        bus.center(handle);
        assert_eq!(bus.read_microseconds(handle), 1500);
    }

    #[test]
    fn check_reports_detached_handles() {
        let (bus, _timer, _pins) = installed_bus();
        let handle = bus.allocate(0);
        assert_eq!(bus.check(handle), Ok(handle));
        bus.release(handle);
        assert_eq!(bus.check(handle), Err(Error::InvalidHandle));
        assert_eq!(bus.check(ChannelHandle::INVALID), Err(Error::InvalidHandle));
    }

    #[test]
    fn dropping_a_servo_detaches_it() {
        let (bus, timer, _pins) = installed_bus();
        {
            let mut servo = bus.servo(4).unwrap_or_else(|err| panic!("attach failed: {err}"));
            servo.set_degrees(200);
            assert_eq!(servo.degrees(), 180);
            assert!(servo.is_attached());
        }
        assert!(bus.table().allocated().is_empty());
        assert!(!timer.is_interrupt_enabled());
    }

    #[test]
    fn servo_macro_fills_default_range() {
        let (bus, _timer, _pins) = installed_bus();
        let servo = servo! { pin: 2, bus: &bus };
        let servo = servo.unwrap_or_else(|err| panic!("attach failed: {err}"));
        assert_eq!(
            bus.table().bounds(servo.handle()),
            Some((SERVO_MIN_US_DEFAULT * 8, SERVO_MAX_US_DEFAULT * 8))
        );
        servo.detach();
        assert!(!bus.is_running());
    }
}
