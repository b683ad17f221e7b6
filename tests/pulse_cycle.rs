#![allow(missing_docs)]
//! Host-level tests for the pulse train a servo bus produces.

use embedded_hal::digital::PinState;
use servo_mux::channel_table::{ChannelHandle, MAX_CHANNELS};
use servo_mux::servo_bus::{BusConfig, ServoBus};
use servo_mux::sim::{Pulse, SimPins, SimTimer, sim_board};

// The simulated timer counts 8 ticks per microsecond.
const REFRESH_TICKS: u32 = 160_000;
const FIRST_EXPIRY: u32 = 800;

type Bench = (ServoBus<SimTimer, SimPins>, SimTimer, SimPins, Vec<ChannelHandle>);

fn bus_with(pulse_widths_us: &[i32]) -> Bench {
    let bus = ServoBus::new(BusConfig::default());
    let (timer, pins) = sim_board();
    bus.install(timer.clone(), pins.clone());
    let handles = pulse_widths_us
        .iter()
        .zip(1u8..)
        .map(|(&us, pin)| {
            let handle = bus.allocate(pin);
            bus.write_microseconds(handle, us);
            handle
        })
        .collect();
    (bus, timer, pins, handles)
}

fn rising_edges(pins: &SimPins, pin: u8) -> Vec<u32> {
    pins.pulses()
        .into_iter()
        .filter(|pulse| pulse.pin == pin)
        .map(|pulse| pulse.start_ticks)
        .collect()
}

fn widths(pins: &SimPins, pin: u8) -> Vec<u32> {
    pins.pulses()
        .into_iter()
        .filter(|pulse| pulse.pin == pin)
        .map(|pulse| pulse.width_ticks)
        .collect()
}

fn periods(edges: &[u32]) -> Vec<u32> {
    edges
        .iter()
        .zip(edges.iter().skip(1))
        .map(|(earlier, later)| later.saturating_sub(*earlier))
        .collect()
}

fn handle(handles: &[ChannelHandle], index: usize) -> ChannelHandle {
    handles.get(index).copied().unwrap_or(ChannelHandle::INVALID)
}

#[test]
fn three_channels_pulse_in_order_then_pad_to_the_refresh_interval() {
    let (bus, timer, pins, _handles) = bus_with(&[1000, 1500, 2000]);

    timer.run_until(170_000, || bus.on_timer_interrupt());

    let pulses = pins.pulses();
    assert_eq!(
        pulses,
        vec![
            Pulse { pin: 1, start_ticks: 800, width_ticks: 8_000 },
            Pulse { pin: 2, start_ticks: 8_800, width_ticks: 12_000 },
            Pulse { pin: 3, start_ticks: 20_800, width_ticks: 16_000 },
            Pulse { pin: 1, start_ticks: 160_800, width_ticks: 8_000 },
        ]
    );

    // C falls at 36 800; A rises again 124 000 ticks (15 500 µs) later.
    let c_falls = 20_800 + 16_000;
    assert_eq!(160_800 - c_falls, 124_000);
    assert_eq!((160_800 - c_falls) / 8, 15_500);
}

#[test]
fn every_active_channel_pulses_once_per_refresh_interval() {
    let (bus, timer, pins, _handles) = bus_with(&[544, 1200, 2400, 1500, 900]);

    timer.run_until(FIRST_EXPIRY + 10 * REFRESH_TICKS, || bus.on_timer_interrupt());

    for pin in 1..=5 {
        let edges = rising_edges(&pins, pin);
        assert!(edges.len() >= 10, "pin {pin} pulsed {} times", edges.len());
        for period in periods(&edges) {
            assert_eq!(period, REFRESH_TICKS, "pin {pin}");
        }
    }
}

#[test]
fn at_most_one_pin_is_high_at_a_time() {
    let (bus, timer, pins, _handles) = bus_with(&[2400, 2400, 2400, 2400]);

    timer.run_until(3 * REFRESH_TICKS, || bus.on_timer_interrupt());

    let mut high = 0i32;
    for event in pins.events() {
        high = if event.level == PinState::High {
            high.saturating_add(1)
        } else {
            high.saturating_sub(1)
        };
        assert!((0..=1).contains(&high), "overlap at tick {}", event.at_ticks);
    }
}

#[test]
fn overfull_cycle_pads_by_the_minimum_wait() {
    let widths = [2400; MAX_CHANNELS];
    let (bus, timer, pins, _handles) = bus_with(&widths);

    timer.run_until(3 * 240_000, || bus.on_timer_interrupt());

    // Twelve 19 200-tick pulses overrun 20 ms, so the pad is 100 µs.
    let expected_period = 12 * 19_200 + 800;
    let edges = rising_edges(&pins, 1);
    assert!(edges.len() >= 3);
    for period in periods(&edges) {
        assert_eq!(period, expected_period);
    }
}

#[test]
fn every_expiry_acknowledges_the_compare_flag() {
    let (bus, timer, _pins, _handles) = bus_with(&[1000, 1500, 2000]);

    // Starting the bus clears any stale flag once.
    assert_eq!(timer.acknowledge_calls(), 1);
    let delivered = timer.run_until(2 * REFRESH_TICKS, || bus.on_timer_interrupt());
    assert!(delivered >= 8, "only {delivered} interrupts");
    assert_eq!(timer.acknowledge_calls(), delivered.saturating_add(1));
}

#[test]
fn width_change_takes_effect_on_the_next_pulse() {
    let (bus, timer, pins, handles) = bus_with(&[1000, 1500, 2000]);

    // B is high from 8 800 to 20 800.
    timer.run_until(10_000, || bus.on_timer_interrupt());
    bus.write_microseconds(handle(&handles, 1), 2000);
    timer.run_until(REFRESH_TICKS + 30_000, || bus.on_timer_interrupt());

    assert_eq!(widths(&pins, 2), vec![12_000, 16_000]);
}

#[test]
fn detaching_a_high_channel_drops_its_pin_at_once() {
    let (bus, timer, pins, handles) = bus_with(&[1000, 1500, 2000]);

    timer.run_until(10_000, || bus.on_timer_interrupt());
    bus.release(handle(&handles, 1));
    timer.run_until(2 * REFRESH_TICKS + 30_000, || bus.on_timer_interrupt());

    let pulses = pins.pulses();
    let b_pulses: Vec<&Pulse> = pulses.iter().filter(|pulse| pulse.pin == 2).collect();
    assert_eq!(
        b_pulses,
        vec![&Pulse { pin: 2, start_ticks: 8_800, width_ticks: 1_200 }]
    );

    // C keeps its slot in the first cycle; later cycles skip B.
    assert_eq!(rising_edges(&pins, 3), vec![20_800, 168_800, 328_800]);
    assert_eq!(rising_edges(&pins, 1), vec![800, 160_800, 320_800]);
    assert_eq!(widths(&pins, 1), vec![8_000; 3]);
    assert_eq!(widths(&pins, 3), vec![16_000; 3]);
}

#[test]
fn detaching_the_last_channel_goes_idle() {
    let (bus, timer, pins, handles) = bus_with(&[1500, 1500]);

    timer.run_until(FIRST_EXPIRY + 100, || bus.on_timer_interrupt());
    for handle in handles {
        bus.release(handle);
    }

    assert!(!timer.is_interrupt_enabled());
    assert!(!bus.is_running());
    let last = pins.events().last().copied();
    assert!(last.is_some_and(|event| event.pin == 1 && event.level == PinState::Low));

    pins.clear_events();
    let delivered = timer.run_until(REFRESH_TICKS * 2, || bus.on_timer_interrupt());
    assert_eq!(delivered, 0);
    assert!(pins.events().is_empty());
    assert_eq!(pins.level(1), PinState::Low);

    // Attaching again restarts the cycle without re-initializing the timer.
    let handle = bus.allocate(7);
    assert!(bus.is_attached(handle));
    assert!(timer.is_interrupt_enabled());
    assert_eq!(timer.init_calls(), 1);
}

#[test]
fn released_slot_is_reused_for_a_new_pin() {
    let (bus, timer, pins, handles) = bus_with(&[1000, 1500]);

    bus.release(handle(&handles, 0));
    let reused = bus.allocate(9);
    assert_eq!(reused.index(), Some(0));
    assert_eq!(bus.table().pin(reused), Some(9));
    bus.write_microseconds(reused, 1000);

    timer.run_until(REFRESH_TICKS, || bus.on_timer_interrupt());
    assert_eq!(rising_edges(&pins, 9), vec![800]);
    assert!(rising_edges(&pins, 1).is_empty());
}

#[test]
fn shorter_refresh_interval_is_honoured() {
    let bus = ServoBus::new(BusConfig {
        refresh_interval_us: 10_000,
        min_wait_us: 100,
    });
    let (timer, pins) = sim_board();
    bus.install(timer.clone(), pins.clone());
    let handle = bus.allocate(4);
    bus.write_microseconds(handle, 1000);

    timer.run_until(FIRST_EXPIRY + 3 * 80_000 + 8_000, || bus.on_timer_interrupt());
    let edges = rising_edges(&pins, 4);
    assert_eq!(edges, vec![800, 80_800, 160_800, 240_800]);
}
