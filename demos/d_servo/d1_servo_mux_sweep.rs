#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]

use core::{convert::Infallible, future, panic};
use embassy_executor::Spawner;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::interrupt;
use embassy_time::Timer;
use servo_mux::{Result, rp::RpAlarmTimer, servo, servo_bus::ServoBus};
use {defmt::info, defmt_rtt as _, panic_probe as _};

static SERVOS: ServoBus<RpAlarmTimer, [Output<'static>; 3]> = ServoBus::new_static();

#[interrupt]
fn TIMER_IRQ_1() {
    SERVOS.on_timer_interrupt();
}

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    panic!("{err}");
}

async fn inner_main(_spawner: Spawner) -> Result<Infallible> {
    let p = embassy_rp::init(Default::default());

    // Bank index 0, 1, 2 → GPIO 11, 12, 13
    SERVOS.install(
        RpAlarmTimer::new(),
        [
            Output::new(p.PIN_11, Level::Low),
            Output::new(p.PIN_12, Level::Low),
            Output::new(p.PIN_13, Level::Low),
        ],
    );

    let mut turret = servo! { bus: SERVOS, pin: 0 }?;
    let mut barrel = servo! {
        bus: SERVOS,
        pin: 1,
        min_us: 1000,
        max_us: 2000,
    }?;
    let mut hatch = servo! { bus: SERVOS, pin: 2 }?;
    hatch.center();
    info!("servos attached, sweeping");

    // Sweep out and back by 10 degrees, the barrel mirroring the turret.
    let sweep = (0..=180).step_by(10).chain((0..180).step_by(10).rev());
    for degrees in sweep.cycle() {
        turret.set_degrees(degrees);
        barrel.set_degrees(180u16.saturating_sub(degrees));
        Timer::after_millis(100).await;
    }

    future::pending().await
}
