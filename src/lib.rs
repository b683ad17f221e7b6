//! Drive many hobby servos from a single hardware timer interrupt.
//!
//! A [`ServoBus`](servo_bus::ServoBus) time-multiplexes up to
//! [`MAX_CHANNELS`](channel_table::MAX_CHANNELS) servo outputs onto one countdown timer. Each
//! timer expiry lowers the previous channel, raises the next one, and re-arms the timer for that
//! channel's pulse width. When every active channel has pulsed, the timer is armed once more to
//! pad the cycle out to the refresh interval (20 ms by default).
//!
//! See [`servo_bus`] for usage examples.
//!
//! # Glossary
//!
//! - **Tick:** smallest unit of timer time, a fixed multiple of one microsecond for a given
//!   timer peripheral ([`PulseTimer::TICKS_PER_US`](hardware::PulseTimer::TICKS_PER_US)).
//! - **Refresh interval:** minimum period a full cycle (every active channel pulsed once)
//!   must occupy.
//! - **Active set:** channels currently eligible to be pulsed.
//! - **Cursor:** the scheduler's remembered scan position and per-cycle tick accumulator.
//! - **Pending-low channel:** the channel raised by the previous interrupt, lowered by the next.
//!
//! The controller board around the servos also talks to a sound card and blinks status LEDs;
//! [`sound_card`], [`function_trigger`], and [`blinker`] cover those pieces.
#![cfg_attr(not(feature = "host"), no_std)]
#![cfg_attr(not(feature = "host"), no_main)]

// Compile-time checks: host simulation and real boards are mutually exclusive
#[cfg(all(feature = "host", any(feature = "pico1", feature = "arm")))]
compile_error!("The 'host' feature cannot be combined with 'pico1' or 'arm'; use --no-default-features");

pub mod blinker;
pub mod channel_table;
mod error;
pub mod function_trigger;
pub mod hardware;
mod logging;
pub mod pulse_scheduler;
#[cfg(feature = "pico1")]
pub mod rp;
pub mod servo_bus;
#[cfg(feature = "host")]
pub mod sim;
pub mod sound_card;
pub mod ticks;

// Re-export error types and result (used throughout)
pub use crate::error::{Error, Result};
