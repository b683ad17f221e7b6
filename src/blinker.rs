//! Non-blocking status LED effects.
//!
//! A [`Blinker`] wraps one output pin and advances its effect whenever [`Blinker::update`] is
//! called with the current time in milliseconds. Call it from the main loop as often as
//! convenient; effects are timed from the first update after they start.
//!
//! ```
//! use core::convert::Infallible;
//! use embedded_hal::digital::{ErrorType, OutputPin};
//! use servo_mux::blinker::Blinker;
//!
//! # #[derive(Default)]
//! # struct Led(bool);
//! # impl ErrorType for Led { type Error = Infallible; }
//! # impl OutputPin for Led {
//! #     fn set_low(&mut self) -> Result<(), Infallible> { self.0 = false; Ok(()) }
//! #     fn set_high(&mut self) -> Result<(), Infallible> { self.0 = true; Ok(()) }
//! # }
//! let mut led = Blinker::new(Led::default(), false);
//! led.blink(2, 100);
//! led.update(0);
//! assert!(led.is_on());
//! led.update(100);
//! assert!(!led.is_on());
//! led.update(200);
//! assert!(led.is_on());
//! led.update(300);
//! led.update(400);
//! assert!(!led.is_blinking());
//! ```

use embedded_hal::digital::{OutputPin, PinState};
use heapless::Vec;

/// On and off time used when the caller does not choose one (milliseconds).
pub const DEFAULT_BLINK_INTERVAL: u16 = 200;

/// Most steps a [`BlinkStream`] can hold. One on/off blink takes two steps.
pub const MAX_STREAM_STEPS: usize = 10;

/// Heartbeat blink rate (milliseconds).
pub const BLINK_RATE_HEARTBEAT: u16 = 750;

/// Lost-signal blink rate (milliseconds).
pub const BLINK_RATE_LOST_SIGNAL: u16 = 40;

const TAP_ON_MS: u16 = 80;
const TAP_GAP_MS: u16 = 120;
const TAP_PAUSE_MS: u16 = 1000;

/// A custom blink pattern: alternating on and off durations, starting with on.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlinkStream {
    steps: Vec<u16, MAX_STREAM_STEPS>,
    repeat: bool,
}

impl BlinkStream {
    /// Build a stream from step durations. Returns `None` for more than [`MAX_STREAM_STEPS`]
    /// steps.
    #[must_use]
    pub fn new(steps: &[u16], repeat: bool) -> Option<Self> {
        Some(Self {
            steps: Vec::from_slice(steps).ok()?,
            repeat,
        })
    }

    /// Step durations in milliseconds.
    #[must_use]
    pub fn steps(&self) -> &[u16] {
        &self.steps
    }

    /// Whether the stream starts over after its last step.
    #[must_use]
    pub const fn repeats(&self) -> bool {
        self.repeat
    }

    fn taps(count: usize, repeat: bool) -> Self {
        let mut steps = Vec::new();
        for tap in 0..count {
            let gap = if tap.saturating_add(1) == count {
                TAP_PAUSE_MS
            } else {
                TAP_GAP_MS
            };
            // At most four taps, so eight steps always fit.
            let _ = steps.push(TAP_ON_MS);
            let _ = steps.push(gap);
        }
        Self { steps, repeat }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Effect {
    /// Alternate `on_ms`/`off_ms`. `steps_left` of `None` runs until stopped.
    Fixed {
        on_ms: u16,
        off_ms: u16,
        steps_left: Option<u16>,
    },
    Stream(BlinkStream),
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Running {
    effect: Effect,
    step: usize,
    step_started_ms: Option<u32>,
}

/// A status LED with blink effects.
pub struct Blinker<P> {
    pin: P,
    invert: bool,
    on: bool,
    running: Option<Running>,
    expire_after_ms: Option<u16>,
    expire_started_ms: Option<u32>,
}

impl<P: OutputPin> Blinker<P> {
    /// Take over `pin` and turn the LED off. With `invert`, the LED is lit by driving the pin
    /// low.
    pub fn new(pin: P, invert: bool) -> Self {
        let mut blinker = Self {
            pin,
            invert,
            on: false,
            running: None,
            expire_after_ms: None,
            expire_started_ms: None,
        };
        blinker.drive(false);
        blinker
    }

    /// Whether the LED is lit right now.
    #[must_use]
    pub const fn is_on(&self) -> bool {
        self.on
    }

    /// Whether an effect is running.
    #[must_use]
    pub const fn is_blinking(&self) -> bool {
        self.running.is_some()
    }

    /// Give the pin back.
    pub fn into_inner(self) -> P {
        self.pin
    }

    /// Stop any effect and light the LED.
    pub fn on(&mut self) {
        self.running = None;
        self.drive(true);
    }

    /// Stop any effect and turn the LED off.
    pub fn off(&mut self) {
        self.running = None;
        self.drive(false);
    }

    /// Stop any effect and flip the LED.
    pub fn toggle(&mut self) {
        self.running = None;
        self.drive(!self.on);
    }

    /// Turn the LED off `ms` milliseconds after the next update, whatever it is doing then.
    pub fn expire_in(&mut self, ms: u16) {
        self.expire_after_ms = Some(ms);
        self.expire_started_ms = None;
    }

    /// One blink: on for `interval_ms`, then off for `interval_ms`.
    pub fn blink_once(&mut self, interval_ms: u16) {
        self.blink(1, interval_ms);
    }

    /// `times` blinks, each on and off for `interval_ms`.
    pub fn blink(&mut self, times: u8, interval_ms: u16) {
        if times == 0 {
            return;
        }
        self.start(Effect::Fixed {
            on_ms: interval_ms,
            off_ms: interval_ms,
            steps_left: Some(u16::from(times).saturating_mul(2)),
        });
    }

    /// Blink until [`stop_blinking`](Self::stop_blinking).
    pub fn start_blinking(&mut self, on_ms: u16, off_ms: u16) {
        self.start(Effect::Fixed {
            on_ms,
            off_ms,
            steps_left: None,
        });
    }

    /// End the current effect and turn the LED off.
    pub fn stop_blinking(&mut self) {
        self.off();
    }

    /// Slow steady blink that says "alive".
    pub fn heartbeat(&mut self) {
        self.start_blinking(BLINK_RATE_HEARTBEAT, BLINK_RATE_HEARTBEAT);
    }

    /// Fast flicker that says "radio signal lost".
    pub fn lost_signal(&mut self) {
        self.start_blinking(BLINK_RATE_LOST_SIGNAL, BLINK_RATE_LOST_SIGNAL);
    }

    /// Two quick flashes and a pause.
    pub fn double_tap(&mut self, repeat: bool) {
        self.stream_blink(BlinkStream::taps(2, repeat));
    }

    /// Three quick flashes and a pause.
    pub fn triple_tap(&mut self, repeat: bool) {
        self.stream_blink(BlinkStream::taps(3, repeat));
    }

    /// Four quick flashes and a pause.
    pub fn quad_tap(&mut self, repeat: bool) {
        self.stream_blink(BlinkStream::taps(4, repeat));
    }

    /// Play a custom pattern. An empty stream turns the LED off.
    pub fn stream_blink(&mut self, stream: BlinkStream) {
        if stream.steps.is_empty() {
            self.off();
            return;
        }
        self.start(Effect::Stream(stream));
    }

    /// Advance the current effect to `now_ms`. The clock may wrap.
    pub fn update(&mut self, now_ms: u32) {
        if let Some(expire_after_ms) = self.expire_after_ms {
            let started = *self.expire_started_ms.get_or_insert(now_ms);
            if now_ms.wrapping_sub(started) >= u32::from(expire_after_ms) {
                self.expire_after_ms = None;
                self.expire_started_ms = None;
                self.off();
                return;
            }
        }

        let Some(mut running) = self.running.take() else {
            return;
        };
        let started = *running.step_started_ms.get_or_insert(now_ms);
        let Some(wait_ms) = Self::step_duration(&running) else {
            self.drive(false);
            return;
        };
        if now_ms.wrapping_sub(started) < u32::from(wait_ms) {
            self.running = Some(running);
            return;
        }

        running.step = running.step.saturating_add(1);
        running.step_started_ms = Some(now_ms);
        match &mut running.effect {
            Effect::Fixed {
                steps_left: Some(steps_left),
                ..
            } => {
                *steps_left = steps_left.saturating_sub(1);
                if *steps_left == 0 {
                    self.drive(false);
                    return;
                }
            }
            Effect::Fixed {
                steps_left: None, ..
            } => {}
            Effect::Stream(stream) => {
                if running.step >= stream.steps.len() {
                    if !stream.repeat {
                        self.drive(false);
                        return;
                    }
                    running.step = 0;
                }
            }
        }
        self.drive(running.step.is_multiple_of(2));
        self.running = Some(running);
    }

    fn start(&mut self, effect: Effect) {
        self.running = Some(Running {
            effect,
            step: 0,
            step_started_ms: None,
        });
        self.drive(true);
    }

    fn step_duration(running: &Running) -> Option<u16> {
        match &running.effect {
            Effect::Fixed { on_ms, off_ms, .. } => {
                Some(if running.step.is_multiple_of(2) { *on_ms } else { *off_ms })
            }
            Effect::Stream(stream) => stream.steps.get(running.step).copied(),
        }
    }

    fn drive(&mut self, on: bool) {
        self.on = on;
        // Nowhere to report a failed LED write.
        let _ = self.pin.set_state(PinState::from(on != self.invert));
    }
}
